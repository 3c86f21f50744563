//! Containers and their lifecycle.

mod addr;
mod options;
mod run;

pub use addr::PublishedAddr;
pub use options::RunOptions;

use crate::engine::{ContainerDetails, EngineClient};
use crate::poll;
use crate::stream::Completion;
use dockling_shared::constants::{ids, poll::DEFAULT_SLEEP};
use dockling_shared::{DocklingError, DocklingResult};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A container, typically one started by [`Session::run`](crate::Session::run).
#[derive(Clone)]
pub struct Container {
    name: String,
    id: String,
    details: ContainerDetails,
    engine: Arc<dyn EngineClient>,
    done: Completion,
}

impl Container {
    pub(crate) fn new(
        engine: Arc<dyn EngineClient>,
        details: ContainerDetails,
        done: Completion,
    ) -> Self {
        let name = details
            .name
            .strip_prefix('/')
            .unwrap_or(&details.name)
            .to_string();
        Self {
            name,
            id: details.id.clone(),
            details,
            engine,
            done,
        }
    }

    /// Name without the leading slash the engine reports.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The first 10 hex digits of the ID.
    pub fn abbreviated_id(&self) -> &str {
        abbreviate(&self.id)
    }

    /// Inspection details, as of start or the last [`refresh`](Self::refresh).
    pub fn details(&self) -> &ContainerDetails {
        &self.details
    }

    pub(crate) fn engine(&self) -> &Arc<dyn EngineClient> {
        &self.engine
    }

    /// Signal firing once the container's output has been fully copied and
    /// the attach connection released.
    pub fn done(&self) -> Completion {
        self.done.clone()
    }

    /// Inspect the container again, updating [`details`](Self::details).
    pub async fn refresh(&mut self) -> DocklingResult<()> {
        self.details = self
            .engine
            .inspect_container(&self.id)
            .await
            .map_err(|e| self.engine_error("cannot refresh details of container", e))?;
        Ok(())
    }

    /// Wait for the container to be not running anymore, returning its exit
    /// code.
    ///
    /// Also waits for [`done`](Self::done), so all output has been written
    /// to the sinks when this returns.
    pub async fn wait(&self, cancel: &CancellationToken) -> DocklingResult<i64> {
        let finished = async {
            let code = self
                .engine
                .wait_container(&self.id)
                .await
                .map_err(|e| self.engine_error("waiting for container to finish failed", e))?;
            self.done.wait().await;
            Ok::<_, DocklingError>(code)
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(DocklingError::Cancelled),
            result = finished => result,
        }
    }

    /// PID of the container's initial process, waiting for it to show up.
    ///
    /// Gives up right away once the container is dead or was OOM-killed
    /// without a restart pending.
    pub async fn pid(&self, cancel: &CancellationToken) -> DocklingResult<i64> {
        loop {
            let details = self
                .engine
                .inspect_container(&self.id)
                .await
                .map_err(|e| self.engine_error("cannot determine PID of container", e))?;
            let state = &details.state;
            if state.pid != 0 {
                return Ok(state.pid);
            }
            if state.is_terminal() {
                return Err(DocklingError::TerminalState {
                    container: self.display_name(),
                    status: state.status.clone(),
                });
            }
            tracing::trace!(container_id = %self.abbreviated_id(), "No PID yet");
            poll::sleep(cancel, DEFAULT_SLEEP).await?;
        }
    }

    /// Stop the container, ignoring any errors.
    pub async fn stop(&self) {
        if let Err(e) = self.engine.stop_container(&self.id, None).await {
            tracing::debug!(container_id = %self.abbreviated_id(), error = %e, "Stopping container failed");
        }
    }

    /// Kill and remove the container together with its anonymous volumes,
    /// ignoring any errors.
    pub async fn kill(&self) {
        if let Err(e) = self.engine.kill_container(&self.id).await {
            tracing::debug!(container_id = %self.abbreviated_id(), error = %e, "Killing container failed");
        }
    }

    /// Host addresses a container port is published on.
    ///
    /// `port` is "PORT" or "PORT/PROTO", with "tcp" as the default protocol.
    /// Addresses are taken from the current [`details`](Self::details).
    pub fn published_port(&self, port: &str) -> Vec<PublishedAddr> {
        let port = if port.contains('/') {
            port.to_string()
        } else {
            format!("{}/tcp", port)
        };
        let proto = port.split_once('/').map_or("tcp", |(_, proto)| proto);
        self.details
            .ports
            .get(&port)
            .into_iter()
            .flatten()
            .filter_map(|binding| PublishedAddr::parse(&binding.host_ip, &binding.host_port, proto))
            .collect()
    }

    /// IP address to reach the container at from the host, if any.
    ///
    /// Goes through the networks in the current [`details`](Self::details)
    /// in name order. Networks using the macvlan driver are skipped, as the
    /// host cannot reach them. Host networking yields the IPv4 loopback
    /// address, while a container without networking has no address.
    pub async fn ip(&self) -> Option<IpAddr> {
        for endpoint in &self.details.networks {
            let network = match self.engine.inspect_network(&endpoint.network_id).await {
                Ok(network) => network,
                Err(e) => {
                    tracing::debug!(network = %endpoint.name, error = %e, "Cannot inspect network");
                    continue;
                }
            };
            match network.driver.as_str() {
                "macvlan" => continue,
                "host" => return Some(IpAddr::V4(Ipv4Addr::LOCALHOST)),
                "null" => return None,
                _ => {}
            }
            if let Ok(ip) = endpoint.ip_address.parse() {
                return Some(ip);
            }
        }
        None
    }

    /// "name"/abbreviated-id, for error messages.
    fn display_name(&self) -> String {
        format!("{:?}/{}", self.name, self.abbreviated_id())
    }

    fn engine_error(&self, what: &str, source: dockling_shared::EngineError) -> DocklingError {
        DocklingError::engine(format!("{} {}", what, self.display_name()), source)
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("done", &self.done.is_done())
            .finish_non_exhaustive()
    }
}

/// Shorten an engine ID for display.
pub(crate) fn abbreviate(id: &str) -> &str {
    id.get(..ids::ABBREVIATED_ID_LENGTH).unwrap_or(id)
}

//! Custom networks.

use crate::engine::{EngineClient, NetworkDetails, NetworkSpec};
use crate::labels::{self, Labels};
use crate::session::Session;
use dockling_shared::{DocklingError, DocklingResult};
use std::sync::Arc;

/// Default driver of custom networks.
const DEFAULT_DRIVER: &str = "bridge";

/// How to create a network.
#[derive(Clone, Debug, Default)]
pub struct NetworkOptions {
    driver: Option<String>,
    internal: bool,
    attachable: bool,
    enable_ipv6: bool,
    labels: Vec<String>,
    options: Vec<String>,
}

impl NetworkOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Network driver, such as "macvlan"; "bridge" when not set.
    pub fn driver(mut self, driver: impl Into<String>) -> Self {
        self.driver = Some(driver.into());
        self
    }

    /// Restrict external access to the network.
    pub fn internal(mut self) -> Self {
        self.internal = true;
        self
    }

    pub fn attachable(mut self) -> Self {
        self.attachable = true;
        self
    }

    pub fn ipv6(mut self) -> Self {
        self.enable_ipv6 = true;
        self
    }

    /// Add a label in "KEY=VALUE" or "KEY=" form, in addition to the
    /// session labels.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }

    pub fn labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels.extend(labels.into_iter().map(Into::into));
        self
    }

    /// Add a driver-specific option in "KEY=VALUE" form, such as
    /// "com.docker.network.bridge.name=br-test".
    pub fn option(mut self, option: impl Into<String>) -> Self {
        self.options.push(option.into());
        self
    }

    fn into_spec(self, name: &str, session_labels: &Labels) -> DocklingResult<NetworkSpec> {
        if name.is_empty() {
            return Err(DocklingError::Config(
                "network name must not be empty".to_string(),
            ));
        }
        let mut labels = session_labels.clone();
        for label in &self.labels {
            labels::add_label(&mut labels, label)?;
        }
        let options = labels::make_labels(&self.options)
            .map_err(|e| DocklingError::Config(format!("invalid network option: {}", e)))?;

        Ok(NetworkSpec {
            name: name.to_string(),
            driver: self.driver.unwrap_or_else(|| DEFAULT_DRIVER.to_string()),
            internal: self.internal,
            attachable: self.attachable,
            enable_ipv6: self.enable_ipv6,
            labels,
            options,
        })
    }
}

impl Session {
    /// Create a custom network.
    ///
    /// The network gets removed again if it cannot be inspected after
    /// creation.
    pub async fn create_network(
        &self,
        name: &str,
        options: NetworkOptions,
    ) -> DocklingResult<Network> {
        let spec = options.into_spec(name, self.labels())?;
        let engine = self.engine();

        let id = engine.create_network(&spec).await.map_err(|e| {
            DocklingError::engine(format!("cannot create new network {:?}", name), e)
        })?;
        tracing::debug!(network_id = %id, name, driver = %spec.driver, "Created network");

        match engine.inspect_network(&id).await {
            Ok(details) => Ok(Network::new(engine.clone(), details)),
            Err(e) => {
                if let Err(e) = engine.remove_network(&id).await {
                    tracing::warn!(network_id = %id, error = %e, "Removing network after failed create failed");
                }
                Err(DocklingError::engine(
                    format!("cannot inspect newly created network {:?}", name),
                    e,
                ))
            }
        }
    }
}

/// A network, created by [`Session::create_network`] or looked up with
/// [`Session::network`].
#[derive(Clone)]
pub struct Network {
    details: NetworkDetails,
    engine: Arc<dyn EngineClient>,
}

impl Network {
    pub(crate) fn new(engine: Arc<dyn EngineClient>, details: NetworkDetails) -> Self {
        Self { details, engine }
    }

    pub fn name(&self) -> &str {
        &self.details.name
    }

    pub fn id(&self) -> &str {
        &self.details.id
    }

    pub fn details(&self) -> &NetworkDetails {
        &self.details
    }

    /// Remove the network; containers still connected make this fail.
    pub async fn remove(&self) -> DocklingResult<()> {
        self.engine
            .remove_network(&self.details.id)
            .await
            .map_err(|e| DocklingError::engine(format!("cannot remove network {:?}", self.name()), e))
    }
}

impl std::fmt::Debug for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Network")
            .field("details", &self.details)
            .finish_non_exhaustive()
    }
}

//! Test sessions.
//!
//! A [`Session`] bundles an engine client with the labels to stick onto
//! everything created through it. Containers are run with [`Session::run`],
//! networks created with [`Session::create_network`].

mod options;

pub use options::SessionOptions;

use crate::container::Container;
use crate::engine::{DockerEngine, EngineClient};
use crate::labels::Labels;
use crate::network::Network;
use crate::stream::Completion;
use dockling_shared::{DocklingError, DocklingResult};
use std::sync::Arc;

/// Connection to a container engine plus the configuration inherited by newly
/// created containers and networks.
#[derive(Clone)]
pub struct Session {
    engine: Arc<dyn EngineClient>,
    labels: Labels,
    auto_cleaning: Option<String>,
}

impl Session {
    /// Connect to the engine and start a session.
    ///
    /// With auto-cleaning enabled, left-over containers and networks from
    /// earlier sessions are removed before returning.
    pub async fn new(options: SessionOptions) -> DocklingResult<Self> {
        let resolved = options.resolve()?;
        let engine = DockerEngine::connect(options.transport.as_ref())
            .await
            .map_err(|e| DocklingError::engine("cannot connect to container engine", e))?;
        let session = Self {
            engine: Arc::new(engine),
            labels: resolved.labels,
            auto_cleaning: resolved.auto_cleaning,
        };
        session.auto_clean().await;
        Ok(session)
    }

    /// Start a session on top of an existing engine client.
    pub async fn with_engine(
        engine: Arc<dyn EngineClient>,
        options: SessionOptions,
    ) -> DocklingResult<Self> {
        let resolved = options.resolve()?;
        let session = Self {
            engine,
            labels: resolved.labels,
            auto_cleaning: resolved.auto_cleaning,
        };
        session.auto_clean().await;
        Ok(session)
    }

    /// End the session, removing left-overs if auto-cleaning is enabled.
    pub async fn close(self) {
        self.auto_clean().await;
    }

    pub fn engine(&self) -> &Arc<dyn EngineClient> {
        &self.engine
    }

    /// Labels attached to containers and networks created in this session.
    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    /// Forcefully remove all containers and then all networks carrying the
    /// auto-cleaning label. Does nothing without an auto-cleaning label.
    ///
    /// This is best effort: the first failure ends the sweep.
    pub async fn auto_clean(&self) {
        let Some(filter) = self.auto_cleaning.as_deref() else {
            return;
        };

        let containers = match self.engine.list_containers(filter).await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::debug!(label = filter, error = %e, "Listing containers to clean failed");
                return;
            }
        };
        for id in containers {
            if let Err(e) = self.engine.kill_container(&id).await {
                tracing::debug!(container_id = %id, error = %e, "Removing container failed");
                return;
            }
            tracing::debug!(container_id = %id, "Removed left-over container");
        }

        // Networks come last, after their containers are gone.
        let networks = match self.engine.list_networks(filter).await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::debug!(label = filter, error = %e, "Listing networks to clean failed");
                return;
            }
        };
        for id in networks {
            if let Err(e) = self.engine.remove_network(&id).await {
                tracing::debug!(network_id = %id, error = %e, "Removing network failed");
                return;
            }
            tracing::debug!(network_id = %id, "Removed left-over network");
        }
    }

    /// Look up an existing container by name or ID.
    ///
    /// The returned container isn't attached to, so its completion signal has
    /// already fired.
    pub async fn container(&self, name_or_id: &str) -> DocklingResult<Container> {
        let details = self.engine.inspect_container(name_or_id).await.map_err(|e| {
            DocklingError::engine(format!("cannot inspect container {:?}", name_or_id), e)
        })?;
        Ok(Container::new(
            self.engine.clone(),
            details,
            Completion::done(),
        ))
    }

    /// Look up an existing network by name or ID.
    pub async fn network(&self, name_or_id: &str) -> DocklingResult<Network> {
        let details = self.engine.inspect_network(name_or_id).await.map_err(|e| {
            DocklingError::engine(format!("cannot inspect network {:?}", name_or_id), e)
        })?;
        Ok(Network::new(self.engine.clone(), details))
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("labels", &self.labels)
            .field("auto_cleaning", &self.auto_cleaning)
            .finish_non_exhaustive()
    }
}

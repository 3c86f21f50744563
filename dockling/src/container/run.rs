//! Running containers: create, attach, start.

use super::{Container, RunOptions, abbreviate};
use crate::engine::{AttachStreams, ContainerSpec};
use crate::session::Session;
use crate::stream::{PumpIo, pump};
use dockling_shared::{DocklingError, DocklingResult};

impl Session {
    /// Create and start a container from `image`, pulling the image first if
    /// necessary.
    ///
    /// The container's streams are attached before it gets started, so no
    /// output goes missing. If anything fails after the container has been
    /// created, it is forcefully removed again.
    pub async fn run(&self, image: &str, options: RunOptions) -> DocklingResult<Container> {
        let (spec, io) = options.into_parts(image, self.labels())?;

        if !self.has_image(image).await? {
            self.pull_image(image).await?;
        }

        let id = self.engine().create_container(&spec).await.map_err(|e| {
            DocklingError::engine(format!("cannot create container from image {}", image), e)
        })?;
        tracing::debug!(container_id = %abbreviate(&id), image, "Created container");

        match self.attach_and_start(&id, &spec, io).await {
            Ok(container) => Ok(container),
            Err(e) => {
                self.remove_failed(&id).await;
                Err(e)
            }
        }
    }

    async fn attach_and_start(
        &self,
        id: &str,
        spec: &ContainerSpec,
        io: PumpIo,
    ) -> DocklingResult<Container> {
        let short_id = abbreviate(id);
        let engine = self.engine();

        let conn = engine
            .attach_container(id, AttachStreams::with_stdin(io.input.is_some()))
            .await
            .map_err(|e| DocklingError::engine(format!("cannot attach to container {}", short_id), e))?;
        tracing::debug!(container_id = %short_id, tty = spec.tty, "Attached to container");

        let done = pump::spawn(conn, io, spec.tty, short_id);

        engine
            .start_container(id)
            .await
            .map_err(|e| DocklingError::engine(format!("cannot start container {}", short_id), e))?;
        tracing::debug!(container_id = %short_id, "Started container");

        let details = engine.inspect_container(id).await.map_err(|e| {
            DocklingError::engine(
                format!("cannot inspect newly started container {}", short_id),
                e,
            )
        })?;

        Ok(Container::new(engine.clone(), details, done))
    }

    async fn remove_failed(&self, id: &str) {
        match self.engine().remove_container(id).await {
            Ok(()) => tracing::debug!(container_id = %abbreviate(id), "Removed container after failed run"),
            Err(e) => tracing::warn!(
                container_id = %abbreviate(id),
                error = %e,
                "Removing container after failed run failed"
            ),
        }
    }
}

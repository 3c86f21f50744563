//! Local images.

use crate::engine::{RemoveImageSpec, RemovedImage};
use crate::session::Session;
use dockling_shared::{DocklingError, DocklingResult, EngineError};

/// How to remove an image.
#[derive(Clone, Copy, Debug, Default)]
pub struct RemoveImageOptions {
    spec: RemoveImageSpec,
}

impl RemoveImageOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove the image even when stopped containers use it or it has
    /// further tags.
    pub fn force(mut self) -> Self {
        self.spec.force = true;
        self
    }

    /// Also delete untagged parent images.
    pub fn prune_children(mut self) -> Self {
        self.spec.prune_children = true;
        self
    }
}

impl Session {
    /// Check whether an image is available locally.
    pub async fn has_image(&self, reference: &str) -> DocklingResult<bool> {
        self.engine()
            .has_image(reference)
            .await
            .map_err(|source| image_error(reference, source))
    }

    /// Pull an image, waiting for the pull to complete.
    pub async fn pull_image(&self, reference: &str) -> DocklingResult<()> {
        tracing::debug!(image = reference, "Pulling image");
        self.engine()
            .pull_image(reference)
            .await
            .map_err(|source| image_error(reference, source))
    }

    /// Remove a local image, returning the tags removed and the images
    /// deleted.
    pub async fn remove_image(
        &self,
        reference: &str,
        options: RemoveImageOptions,
    ) -> DocklingResult<Vec<RemovedImage>> {
        let removed = self
            .engine()
            .remove_image(reference, options.spec)
            .await
            .map_err(|source| image_error(reference, source))?;
        tracing::debug!(image = reference, removed = removed.len(), "Removed image");
        Ok(removed)
    }
}

fn image_error(reference: &str, source: EngineError) -> DocklingError {
    DocklingError::Image {
        reference: reference.to_string(),
        source,
    }
}

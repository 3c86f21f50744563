//! Container engine API surface.
//!
//! [`EngineClient`] is the narrow set of engine capabilities the library
//! depends on. [`DockerEngine`] implements it on top of bollard; tests plug
//! in scripted engines instead.

mod connection;
mod docker;
mod types;

pub use connection::{HijackedConnection, InputSink, OutputStream};
pub use docker::DockerEngine;
pub use dockling_shared::errors::{EngineError, EngineResult};
pub use types::{
    AttachStreams, CgroupnsMode, ConsoleSize, ContainerDetails, ContainerSpec, ContainerState,
    DeviceSpec, ExecDetails, ExecSpec, HostSpec, MountKind, MountSpec, NetworkDetails,
    NetworkEndpoint, NetworkSpec, PortBinding, RemoveImageSpec, RemovedImage, RestartPolicy,
    TtyOptions,
};

use async_trait::async_trait;
use std::time::Duration;

/// Operations against a container engine.
#[async_trait]
pub trait EngineClient: Send + Sync {
    /// Create a container, returning its ID.
    async fn create_container(&self, spec: &ContainerSpec) -> EngineResult<String>;

    async fn inspect_container(&self, id: &str) -> EngineResult<ContainerDetails>;

    /// Attach to the streams of a (not yet started) container.
    async fn attach_container(
        &self,
        id: &str,
        streams: AttachStreams,
    ) -> EngineResult<HijackedConnection>;

    async fn start_container(&self, id: &str) -> EngineResult<()>;

    /// Stop a container, killing it when it doesn't terminate within
    /// `timeout` (engine default when `None`).
    async fn stop_container(&self, id: &str, timeout: Option<Duration>) -> EngineResult<()>;

    /// Kill a container and remove it together with its anonymous volumes.
    async fn kill_container(&self, id: &str) -> EngineResult<()>;

    /// Forcefully remove a container.
    async fn remove_container(&self, id: &str) -> EngineResult<()>;

    /// Wait for a container to be not running anymore, returning its exit
    /// code.
    async fn wait_container(&self, id: &str) -> EngineResult<i64>;

    /// IDs of all containers, running or not, carrying the given label
    /// (`key` or `key=value`).
    async fn list_containers(&self, label: &str) -> EngineResult<Vec<String>>;

    /// Create a command execution inside a container, returning its ID.
    async fn create_exec(&self, container_id: &str, spec: &ExecSpec) -> EngineResult<String>;

    /// Attach to a command execution, which starts it.
    async fn attach_exec(
        &self,
        exec_id: &str,
        tty: TtyOptions,
    ) -> EngineResult<HijackedConnection>;

    async fn inspect_exec(&self, exec_id: &str) -> EngineResult<ExecDetails>;

    /// Check whether an image is available locally.
    async fn has_image(&self, reference: &str) -> EngineResult<bool>;

    /// Pull an image, waiting for the pull to finish.
    async fn pull_image(&self, reference: &str) -> EngineResult<()>;

    async fn remove_image(
        &self,
        reference: &str,
        spec: RemoveImageSpec,
    ) -> EngineResult<Vec<RemovedImage>>;

    /// Create a network, returning its ID.
    async fn create_network(&self, spec: &NetworkSpec) -> EngineResult<String>;

    async fn inspect_network(&self, id: &str) -> EngineResult<NetworkDetails>;

    async fn remove_network(&self, id: &str) -> EngineResult<()>;

    /// IDs of all networks carrying the given label.
    async fn list_networks(&self, label: &str) -> EngineResult<Vec<String>>;
}

//! Engine-side configuration and inspection types.
//!
//! They carry what the library sets when creating things and what it reads
//! back when inspecting them, nothing more.

use std::collections::HashMap;
use std::time::Duration;

/// Width and height of a pseudo TTY.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConsoleSize {
    pub width: u16,
    pub height: u16,
}

/// Restart policy of a container.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum RestartPolicy {
    #[default]
    No,
    Always,
    UnlessStopped,
    OnFailure {
        max_retries: u32,
    },
}

/// Kind of a mount, see [`MountSpec`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MountKind {
    Bind,
    #[default]
    Volume,
    Tmpfs,
}

/// A mount in the engine's "type=...,source=...,target=..." terms.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MountSpec {
    pub kind: MountKind,
    /// Host path or volume name; anonymous volumes and tmpfs have none.
    pub source: Option<String>,
    pub target: String,
    pub read_only: bool,
}

/// A host device made available inside a container.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceSpec {
    pub path_on_host: String,
    pub path_in_container: String,
    /// Some of "r", "w" and "m", such as "rwm".
    pub cgroup_permissions: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CgroupnsMode {
    Private,
    Host,
}

/// Host-side configuration of a container.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HostSpec {
    pub auto_remove: bool,
    pub privileged: bool,
    pub cap_add: Vec<String>,
    pub cap_drop: Vec<String>,
    pub network_mode: Option<String>,
    pub pid_mode: Option<String>,
    pub ipc_mode: Option<String>,
    pub cgroupns_mode: Option<CgroupnsMode>,
    pub binds: Vec<String>,
    pub mounts: Vec<MountSpec>,
    pub devices: Vec<DeviceSpec>,
    pub tmpfs: HashMap<String, String>,
    pub restart_policy: RestartPolicy,
    pub publish_all_ports: bool,
    pub read_only_rootfs: bool,
    pub security_opt: Vec<String>,
    /// Run an init process as PID 1 inside the container.
    pub init: bool,
    pub console_size: Option<ConsoleSize>,
}

/// Everything needed to create a container.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: Option<String>,
    pub image: String,
    pub cmd: Option<Vec<String>>,
    pub env: Vec<String>,
    pub labels: HashMap<String, String>,
    /// Anonymous volumes, given by their path inside the container.
    pub volumes: Vec<String>,
    /// Networks to connect the container to when creating it.
    pub networks: Vec<String>,
    pub hostname: Option<String>,
    pub tty: bool,
    /// Allocate a stdin for the container, closing it after the first attach
    /// detaches.
    pub open_stdin: bool,
    pub stop_signal: Option<String>,
    pub stop_timeout: Option<Duration>,
    pub host: HostSpec,
}

/// Runtime state of a container as reported by the engine.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContainerState {
    /// Engine status string, such as "created", "running" or "exited".
    pub status: String,
    pub running: bool,
    pub restarting: bool,
    pub dead: bool,
    pub oom_killed: bool,
    /// PID of the initial process, zero when there is none.
    pub pid: i64,
    pub exit_code: i64,
}

impl ContainerState {
    /// Check whether the container is in a state from which it won't come
    /// back with a new PID anymore.
    pub fn is_terminal(&self) -> bool {
        (self.dead || self.oom_killed) && !self.restarting
    }
}

/// Host address a container port is published on.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PortBinding {
    pub host_ip: String,
    pub host_port: String,
}

/// A network a container is connected to.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NetworkEndpoint {
    /// Network name, as used as key by the engine.
    pub name: String,
    pub network_id: String,
    /// IPv4 address on this network, empty when there is none.
    pub ip_address: String,
}

/// Container inspection details.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContainerDetails {
    pub id: String,
    /// Name as reported by the engine, including its leading slash.
    pub name: String,
    pub image: String,
    pub labels: HashMap<String, String>,
    pub state: ContainerState,
    /// Published ports, keyed by "port/proto" such as "80/tcp".
    pub ports: HashMap<String, Vec<PortBinding>>,
    /// Connected networks, ordered by name.
    pub networks: Vec<NetworkEndpoint>,
}

/// Which container streams to attach to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttachStreams {
    pub stdin: bool,
    pub stdout: bool,
    pub stderr: bool,
}

impl AttachStreams {
    /// Always attach stdout and stderr, stdin only when there is input.
    pub fn with_stdin(stdin: bool) -> Self {
        Self {
            stdin,
            stdout: true,
            stderr: true,
        }
    }
}

/// Everything needed to create a command execution inside a container.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecSpec {
    pub cmd: Vec<String>,
    pub env: Vec<String>,
    pub working_dir: Option<String>,
    pub user: Option<String>,
    pub privileged: bool,
    pub tty: bool,
    pub console_size: Option<ConsoleSize>,
    pub attach_stdin: bool,
    pub attach_stdout: bool,
    pub attach_stderr: bool,
}

impl ExecSpec {
    /// TTY settings to use when attaching to this execution.
    pub fn tty_options(&self) -> TtyOptions {
        TtyOptions {
            tty: self.tty,
            console_size: self.console_size,
        }
    }
}

/// TTY settings when attaching to (and thus starting) an execution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TtyOptions {
    pub tty: bool,
    pub console_size: Option<ConsoleSize>,
}

/// Command execution inspection details.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExecDetails {
    pub running: bool,
    /// PID of the executing command, zero when not (yet) running.
    pub pid: i64,
    /// Exit code, only known after the command has terminated.
    pub exit_code: Option<i64>,
}

/// How to remove an image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RemoveImageSpec {
    /// Remove the image even when stopped containers use it or it has
    /// further tags.
    pub force: bool,
    /// Also delete untagged parent images.
    pub prune_children: bool,
}

/// What removing an image did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RemovedImage {
    /// A tag got removed from an image, given by its reference.
    Untagged(String),
    /// An image got deleted, given by its ID.
    Deleted(String),
}

/// Everything needed to create a network.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NetworkSpec {
    pub name: String,
    pub driver: String,
    pub internal: bool,
    pub attachable: bool,
    pub enable_ipv6: bool,
    pub labels: HashMap<String, String>,
    pub options: HashMap<String, String>,
}

/// Network inspection details.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NetworkDetails {
    pub id: String,
    pub name: String,
    pub driver: String,
    pub labels: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_state_requires_dead_or_oom_and_not_restarting() {
        let mut state = ContainerState {
            status: "exited".into(),
            ..Default::default()
        };
        assert!(!state.is_terminal(), "plain exit leaves room for a restart");

        state.dead = true;
        assert!(state.is_terminal());

        state.restarting = true;
        assert!(!state.is_terminal());

        state.dead = false;
        state.restarting = false;
        state.oom_killed = true;
        assert!(state.is_terminal());
    }

    #[test]
    fn attach_streams_always_include_output() {
        let streams = AttachStreams::with_stdin(false);
        assert!(streams.stdout && streams.stderr);
        assert!(!streams.stdin);
        assert!(AttachStreams::with_stdin(true).stdin);
    }
}

//! Options for running containers.

use crate::engine::{
    CgroupnsMode, ConsoleSize, ContainerSpec, DeviceSpec, MountKind, MountSpec, RestartPolicy,
};
use crate::labels::{self, Labels};
use crate::stream::{BoxedReader, OutputSinks, PumpIo};
use dockling_shared::{DocklingError, DocklingResult};
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};

/// How to run a container.
///
/// Built by chaining methods; invalid values are remembered and reported by
/// [`Session::run`](crate::Session::run) before anything gets created.
#[derive(Default)]
pub struct RunOptions {
    spec: ContainerSpec,
    labels: Vec<String>,
    clear_session_labels: bool,
    input: Option<BoxedReader>,
    output: OutputSinks,
    errors: Vec<String>,
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name the container instead of letting the engine pick one.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.spec.name = Some(name.into());
        self
    }

    /// Command to run instead of the image's default command.
    pub fn command<I, S>(mut self, cmd: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.spec.cmd = Some(cmd.into_iter().map(Into::into).collect());
        self
    }

    /// Environment variables in "NAME=VALUE" form.
    pub fn env<I, S>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.spec.env.extend(vars.into_iter().map(Into::into));
        self
    }

    /// Add a label in "KEY=VALUE" or "KEY=" form.
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

    /// Drop the labels inherited from the session as well as all labels
    /// added so far.
    pub fn clear_labels(mut self) -> Self {
        self.clear_session_labels = true;
        self.labels.clear();
        self
    }

    /// Feed the container's stdin from `input`, closing stdin on EOF.
    ///
    /// The reader must reach EOF at some point, otherwise the task copying it
    /// never finishes.
    pub fn input<R>(mut self, input: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        self.input = Some(Box::new(input));
        self.spec.open_stdin = true;
        self
    }

    /// Send stdout and stderr to the same writer.
    pub fn combined_output<W>(mut self, out: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        self.output = OutputSinks::Combined(Box::new(out));
        self
    }

    /// Send stdout and stderr to separate writers. Switches off the TTY,
    /// as there is no separate stderr with a TTY.
    pub fn demuxed_output<O, E>(mut self, stdout: O, stderr: E) -> Self
    where
        O: AsyncWrite + Send + Unpin + 'static,
        E: AsyncWrite + Send + Unpin + 'static,
    {
        self.output = OutputSinks::Demuxed {
            stdout: Box::new(stdout),
            stderr: Box::new(stderr),
        };
        self.spec.tty = false;
        self
    }

    /// Allocate a pseudo TTY; all output then arrives as stdout.
    pub fn tty(mut self) -> Self {
        self.spec.tty = true;
        self
    }

    /// Signal to stop the container with, such as "SIGTERM".
    pub fn stop_signal(mut self, signal: impl Into<String>) -> Self {
        self.spec.stop_signal = Some(signal.into());
        self
    }

    /// Time to wait for the container to stop before killing it.
    pub fn stop_timeout(mut self, timeout: Duration) -> Self {
        self.spec.stop_timeout = Some(timeout);
        self
    }

    /// Remove the container automatically once it has stopped.
    pub fn auto_remove(mut self) -> Self {
        self.spec.host.auto_remove = true;
        self
    }

    pub fn privileged(mut self) -> Self {
        self.spec.host.privileged = true;
        self
    }

    /// Add a kernel capability, such as "CAP_SYS_ADMIN".
    pub fn cap_add(mut self, cap: impl Into<String>) -> Self {
        self.spec.host.cap_add.push(cap.into());
        self
    }

    pub fn cap_drop_all(mut self) -> Self {
        self.spec.host.cap_drop = vec!["ALL".to_string()];
        self
    }

    /// Network mode, such as "none", "host" or "container:NAME".
    pub fn network_mode(mut self, mode: impl Into<String>) -> Self {
        self.spec.host.network_mode = Some(mode.into());
        self
    }

    /// Connect the container to a network when creating it.
    pub fn network(mut self, name_or_id: impl Into<String>) -> Self {
        let net = name_or_id.into();
        if net.is_empty() {
            self.errors.push("network name must not be empty".to_string());
        } else {
            self.spec.networks.push(net);
        }
        self
    }

    /// PID namespace mode, such as "host".
    pub fn pid_mode(mut self, mode: impl Into<String>) -> Self {
        self.spec.host.pid_mode = Some(mode.into());
        self
    }

    /// Cgroup namespace mode: "private", "host", or "" for the engine's
    /// default.
    pub fn cgroupns_mode(mut self, mode: &str) -> Self {
        match mode {
            "" => self.spec.host.cgroupns_mode = None,
            "private" => self.spec.host.cgroupns_mode = Some(CgroupnsMode::Private),
            "host" => self.spec.host.cgroupns_mode = Some(CgroupnsMode::Host),
            other => self
                .errors
                .push(format!("invalid cgroup namespace mode {:?}", other)),
        }
        self
    }

    /// IPC namespace mode, such as "private" or "host".
    pub fn ipc_mode(mut self, mode: impl Into<String>) -> Self {
        self.spec.host.ipc_mode = Some(mode.into());
        self
    }

    /// Add a volume.
    ///
    /// "SRC:DST[:OPTS]" binds a host path or named volume; host paths
    /// starting with "./" are taken relative to the current directory. A
    /// plain "DST" creates an anonymous volume.
    pub fn volume(mut self, volume: impl Into<String>) -> Self {
        let volume = volume.into();
        let parsed = volume
            .split_once(':')
            .map(|(source, rest)| (source.to_string(), rest.to_string()));
        match parsed {
            _ if volume.is_empty() => {
                self.errors.push("volume must not be empty".to_string());
            }
            None => self.spec.volumes.push(volume),
            Some((source, rest)) if source.is_empty() || rest.is_empty() => {
                self.errors.push(format!("malformed volume {:?}", volume));
            }
            Some((source, rest)) => {
                let bind = match absolute_bind_source(&source) {
                    Some(abs) => format!("{}:{}", abs, rest),
                    None => volume,
                };
                self.spec.host.binds.push(bind);
            }
        }
        self
    }

    /// Add a mount in "type=bind,source=/src,target=/dst,readonly" form.
    ///
    /// The type is one of "bind", "volume" (the default) and "tmpfs";
    /// "src", "destination", "dst" and "ro" are accepted as aliases.
    pub fn mount(mut self, mount: &str) -> Self {
        match parse_mount(mount) {
            Ok(spec) => self.spec.host.mounts.push(spec),
            Err(reason) => self
                .errors
                .push(format!("invalid mount {:?}: {}", mount, reason)),
        }
        self
    }

    /// Make a host device available, given as "/dev/foo",
    /// "/dev/foo:/dev/bar" or "/dev/foo:/dev/bar:rwm".
    ///
    /// The container path defaults to the host path, the cgroup permissions
    /// to "rwm".
    pub fn device(mut self, device: &str) -> Self {
        match parse_device(device) {
            Ok(spec) => self.spec.host.devices.push(spec),
            Err(reason) => self
                .errors
                .push(format!("malformed device {:?}: {}", device, reason)),
        }
        self
    }

    /// Mount a tmpfs at `path`.
    pub fn tmpfs(self, path: impl Into<String>) -> Self {
        self.tmpfs_opts(path, "")
    }

    /// Mount a tmpfs at `path` with mount options such as "size=64m".
    pub fn tmpfs_opts(mut self, path: impl Into<String>, opts: impl Into<String>) -> Self {
        self.spec.host.tmpfs.insert(path.into(), opts.into());
        self
    }

    pub fn read_only_rootfs(mut self) -> Self {
        self.spec.host.read_only_rootfs = true;
        self
    }

    /// Add a security option, such as "apparmor=unconfined".
    pub fn security_opt(mut self, opt: impl Into<String>) -> Self {
        self.spec.host.security_opt.push(opt.into());
        self
    }

    /// Run an init process inside the container that forwards signals and
    /// reaps processes.
    pub fn custom_init(mut self) -> Self {
        self.spec.host.init = true;
        self
    }

    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.spec.hostname = Some(hostname.into());
        self
    }

    pub fn restart_policy(mut self, policy: RestartPolicy) -> Self {
        self.spec.host.restart_policy = policy;
        self
    }

    /// Publish all exposed ports to random host ports.
    pub fn publish_all(mut self) -> Self {
        self.spec.host.publish_all_ports = true;
        self
    }

    /// Initial console size of the TTY.
    pub fn console_size(mut self, width: u16, height: u16) -> Self {
        self.spec.host.console_size = Some(ConsoleSize { width, height });
        self
    }

    /// Validate the options and split them into what gets sent to the engine
    /// and what stays with the stream pump.
    pub(crate) fn into_parts(
        self,
        image: &str,
        session_labels: &Labels,
    ) -> DocklingResult<(ContainerSpec, PumpIo)> {
        if let Some(err) = self.errors.into_iter().next() {
            return Err(DocklingError::Config(err));
        }
        if image.is_empty() {
            return Err(DocklingError::Config("image must not be empty".to_string()));
        }

        let mut spec = self.spec;
        spec.image = image.to_string();
        spec.labels = if self.clear_session_labels {
            Labels::new()
        } else {
            session_labels.clone()
        };
        for label in &self.labels {
            labels::add_label(&mut spec.labels, label)?;
        }

        Ok((
            spec,
            PumpIo {
                input: self.input,
                output: self.output,
            },
        ))
    }
}

impl std::fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunOptions")
            .field("spec", &self.spec)
            .field("labels", &self.labels)
            .field("clear_session_labels", &self.clear_session_labels)
            .field("input", &self.input.is_some())
            .field("output", &self.output)
            .finish()
    }
}

/// Make "./" relative bind sources absolute; other sources are left alone.
fn absolute_bind_source(source: &str) -> Option<String> {
    if source != "." && !source.starts_with("./") {
        return None;
    }
    std::path::absolute(Path::new(source))
        .ok()
        .map(|p| p.to_string_lossy().into_owned())
}

fn parse_mount(mount: &str) -> Result<MountSpec, String> {
    let mut spec = MountSpec::default();
    let mut target = None;
    for field in mount.split(',').filter(|f| !f.is_empty()) {
        let (key, value) = match field.split_once('=') {
            Some((key, value)) => (key.trim(), Some(value.trim())),
            None => (field.trim(), None),
        };
        match (key, value) {
            ("type", Some(kind)) => {
                spec.kind = match kind {
                    "bind" => MountKind::Bind,
                    "volume" => MountKind::Volume,
                    "tmpfs" => MountKind::Tmpfs,
                    other => return Err(format!("unsupported type {:?}", other)),
                }
            }
            ("source" | "src", Some(source)) => spec.source = Some(source.to_string()),
            ("target" | "destination" | "dst", Some(dst)) => target = Some(dst.to_string()),
            ("readonly" | "ro", None) => spec.read_only = true,
            ("readonly" | "ro", Some(flag)) => {
                spec.read_only = match flag {
                    "1" | "true" => true,
                    "0" | "false" => false,
                    other => return Err(format!("invalid readonly value {:?}", other)),
                }
            }
            (key, _) => return Err(format!("unexpected field {:?}", key)),
        }
    }

    spec.target = target
        .filter(|t| !t.is_empty())
        .ok_or_else(|| "target is required".to_string())?;
    match spec.kind {
        MountKind::Bind if spec.source.as_deref().is_none_or(str::is_empty) => {
            Err("bind mounts need a source".to_string())
        }
        MountKind::Tmpfs if spec.source.is_some() => {
            Err("tmpfs mounts take no source".to_string())
        }
        _ => Ok(spec),
    }
}

fn parse_device(device: &str) -> Result<DeviceSpec, String> {
    let mut fields = device.split(':');
    let host = fields.next().unwrap_or_default();
    let container = fields.next().unwrap_or_default();
    let perms = fields.next().unwrap_or_default();
    if fields.next().is_some() {
        return Err("too many fields".to_string());
    }
    if host.is_empty() {
        return Err("host path must not be empty".to_string());
    }
    if !perms.chars().all(|c| matches!(c, 'r' | 'w' | 'm')) {
        return Err(format!("invalid cgroup permissions {:?}", perms));
    }
    Ok(DeviceSpec {
        path_on_host: host.to_string(),
        path_in_container: if container.is_empty() { host } else { container }.to_string(),
        cgroup_permissions: if perms.is_empty() { "rwm" } else { perms }.to_string(),
    })
}

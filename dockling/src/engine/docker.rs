//! [`EngineClient`] backed by the Docker engine API, via bollard.

use super::{
    AttachStreams, CgroupnsMode, ContainerDetails, ContainerSpec, ContainerState, DeviceSpec,
    EngineClient, EngineError, EngineResult, ExecDetails, ExecSpec, HijackedConnection,
    InputSink, MountKind, MountSpec, NetworkDetails, NetworkEndpoint, NetworkSpec, PortBinding,
    RemoveImageSpec, RemovedImage, RestartPolicy, TtyOptions,
};
use crate::stream::frame::OutputChunk;
use async_trait::async_trait;
use bollard::container::{
    AttachContainerOptions, Config, CreateContainerOptions, InspectContainerOptions,
    ListContainersOptions, LogOutput, NetworkingConfig, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions, WaitContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::exec::{CreateExecOptions, ResizeExecOptions, StartExecOptions, StartExecResults};
use bollard::image::{CreateImageOptions, RemoveImageOptions};
use bollard::models::{
    DeviceMapping, EndpointSettings, HostConfig, HostConfigCgroupnsModeEnum, Mount,
    MountTypeEnum, RestartPolicy as BollardRestartPolicy, RestartPolicyNameEnum,
};
use bollard::network::{CreateNetworkOptions, InspectNetworkOptions, ListNetworksOptions};
use bollard::{API_DEFAULT_VERSION, Docker};
use dockling_shared::Transport;
use dockling_shared::constants::engine::WAIT_NOT_RUNNING;
use futures::{Stream, StreamExt};
use std::collections::HashMap;
use std::io;
use std::pin::Pin;
use std::time::Duration;

/// Seconds to wait for engine API responses.
const CONNECT_TIMEOUT_SECS: u64 = 120;

type LogStream = Pin<Box<dyn Stream<Item = Result<LogOutput, BollardError>> + Send>>;

/// Docker engine client.
#[derive(Clone, Debug)]
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    /// Wrap an already configured bollard client.
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }

    /// Connect to the engine and negotiate the API version.
    ///
    /// Without an explicit transport, `DOCKER_HOST` is honored, falling back
    /// to the engine's local default socket.
    pub async fn connect(transport: Option<&Transport>) -> EngineResult<Self> {
        let transport = match transport {
            Some(t) => Some(t.clone()),
            None => Transport::from_env()
                .transpose()
                .map_err(EngineError::Transport)?,
        };

        let docker = match &transport {
            Some(Transport::Unix { socket_path }) => {
                tracing::debug!("Connecting to engine via Unix: {}", socket_path.display());
                Docker::connect_with_unix(
                    &socket_path.to_string_lossy(),
                    CONNECT_TIMEOUT_SECS,
                    API_DEFAULT_VERSION,
                )
            }
            Some(t @ Transport::Tcp { .. }) => {
                tracing::debug!("Connecting to engine via TCP: {}", t);
                Docker::connect_with_http(&t.to_uri(), CONNECT_TIMEOUT_SECS, API_DEFAULT_VERSION)
            }
            None => {
                tracing::debug!("Connecting to engine using local defaults");
                Docker::connect_with_local_defaults()
            }
        }
        .map_err(map_err)?;

        let docker = docker.negotiate_version().await.map_err(map_err)?;
        tracing::debug!("Connected to engine");
        Ok(Self { docker })
    }

    /// The underlying bollard client.
    pub fn docker(&self) -> &Docker {
        &self.docker
    }
}

#[async_trait]
impl EngineClient for DockerEngine {
    async fn create_container(&self, spec: &ContainerSpec) -> EngineResult<String> {
        let options = spec.name.as_ref().map(|name| CreateContainerOptions {
            name: name.clone(),
            platform: None,
        });
        let response = self
            .docker
            .create_container(options, container_config(spec))
            .await
            .map_err(map_err)?;
        for warning in &response.warnings {
            tracing::warn!(container_id = %response.id, "Engine warning: {}", warning);
        }
        Ok(response.id)
    }

    async fn inspect_container(&self, id: &str) -> EngineResult<ContainerDetails> {
        let response = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(map_err)?;

        let state = response.state.unwrap_or_default();
        let config = response.config.unwrap_or_default();
        let settings = response.network_settings.unwrap_or_default();
        let mut networks: Vec<NetworkEndpoint> = settings
            .networks
            .unwrap_or_default()
            .into_iter()
            .map(|(name, endpoint)| NetworkEndpoint {
                name,
                network_id: endpoint.network_id.unwrap_or_default(),
                ip_address: endpoint.ip_address.unwrap_or_default(),
            })
            .collect();
        networks.sort_by(|a, b| a.name.cmp(&b.name));
        let ports = settings
            .ports
            .unwrap_or_default()
            .into_iter()
            .map(|(port, bindings)| {
                let bindings = bindings
                    .unwrap_or_default()
                    .into_iter()
                    .map(|b| PortBinding {
                        host_ip: b.host_ip.unwrap_or_default(),
                        host_port: b.host_port.unwrap_or_default(),
                    })
                    .collect();
                (port, bindings)
            })
            .collect();

        Ok(ContainerDetails {
            id: response.id.unwrap_or_else(|| id.to_string()),
            name: response.name.unwrap_or_default(),
            image: config.image.unwrap_or_default(),
            labels: config.labels.unwrap_or_default(),
            state: ContainerState {
                status: state.status.map(|s| s.to_string()).unwrap_or_default(),
                running: state.running.unwrap_or(false),
                restarting: state.restarting.unwrap_or(false),
                dead: state.dead.unwrap_or(false),
                oom_killed: state.oom_killed.unwrap_or(false),
                pid: state.pid.unwrap_or(0),
                exit_code: state.exit_code.unwrap_or(0),
            },
            ports,
            networks,
        })
    }

    async fn attach_container(
        &self,
        id: &str,
        streams: AttachStreams,
    ) -> EngineResult<HijackedConnection> {
        let options = AttachContainerOptions::<String> {
            stdin: Some(streams.stdin),
            stdout: Some(streams.stdout),
            stderr: Some(streams.stderr),
            stream: Some(true),
            logs: Some(false),
            detach_keys: None,
        };
        let results = self
            .docker
            .attach_container(id, Some(options))
            .await
            .map_err(map_err)?;
        Ok(hijacked(results.output, results.input))
    }

    async fn start_container(&self, id: &str) -> EngineResult<()> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(map_err)
    }

    async fn stop_container(&self, id: &str, timeout: Option<Duration>) -> EngineResult<()> {
        let options = timeout.map(|t| StopContainerOptions {
            t: t.as_secs() as i64,
        });
        self.docker
            .stop_container(id, options)
            .await
            .map_err(map_err)
    }

    async fn kill_container(&self, id: &str) -> EngineResult<()> {
        let options = RemoveContainerOptions {
            force: true,
            v: true,
            ..Default::default()
        };
        self.docker
            .remove_container(id, Some(options))
            .await
            .map_err(map_err)
    }

    async fn remove_container(&self, id: &str) -> EngineResult<()> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        self.docker
            .remove_container(id, Some(options))
            .await
            .map_err(map_err)
    }

    async fn wait_container(&self, id: &str) -> EngineResult<i64> {
        let options = WaitContainerOptions {
            condition: WAIT_NOT_RUNNING,
        };
        let mut results = self.docker.wait_container(id, Some(options));
        match results.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // Non-zero exit codes are reported as errors by bollard.
            Some(Err(BollardError::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(map_err(e)),
            None => Err(EngineError::Unexpected(format!(
                "wait on container {} ended without a result",
                id
            ))),
        }
    }

    async fn list_containers(&self, label: &str) -> EngineResult<Vec<String>> {
        let options = ListContainersOptions::<String> {
            all: true,
            filters: label_filter(label),
            ..Default::default()
        };
        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(map_err)?;
        Ok(containers.into_iter().filter_map(|c| c.id).collect())
    }

    async fn create_exec(&self, container_id: &str, spec: &ExecSpec) -> EngineResult<String> {
        let options = CreateExecOptions::<String> {
            cmd: Some(spec.cmd.clone()),
            env: (!spec.env.is_empty()).then(|| spec.env.clone()),
            working_dir: spec.working_dir.clone(),
            user: spec.user.clone(),
            privileged: Some(spec.privileged),
            tty: Some(spec.tty),
            attach_stdin: Some(spec.attach_stdin),
            attach_stdout: Some(spec.attach_stdout),
            attach_stderr: Some(spec.attach_stderr),
            ..Default::default()
        };
        let response = self
            .docker
            .create_exec(container_id, options)
            .await
            .map_err(map_err)?;
        Ok(response.id)
    }

    async fn attach_exec(
        &self,
        exec_id: &str,
        tty: TtyOptions,
    ) -> EngineResult<HijackedConnection> {
        let options = StartExecOptions {
            detach: false,
            tty: tty.tty,
            output_capacity: None,
        };
        let results = self
            .docker
            .start_exec(exec_id, Some(options))
            .await
            .map_err(map_err)?;
        let conn = match results {
            StartExecResults::Attached { output, input } => hijacked(output, input),
            StartExecResults::Detached => {
                return Err(EngineError::Unexpected(format!(
                    "command execution {} started detached",
                    exec_id
                )));
            }
        };

        if let Some(size) = tty.console_size {
            let options = ResizeExecOptions {
                width: size.width,
                height: size.height,
            };
            if let Err(e) = self.docker.resize_exec(exec_id, options).await {
                tracing::debug!(exec_id, "Resizing console failed: {}", e);
            }
        }
        Ok(conn)
    }

    async fn inspect_exec(&self, exec_id: &str) -> EngineResult<ExecDetails> {
        let response = self.docker.inspect_exec(exec_id).await.map_err(map_err)?;
        Ok(ExecDetails {
            running: response.running.unwrap_or(false),
            pid: response.pid.unwrap_or(0),
            exit_code: response.exit_code,
        })
    }

    async fn has_image(&self, reference: &str) -> EngineResult<bool> {
        match self.docker.inspect_image(reference).await {
            Ok(_) => Ok(true),
            Err(e) => match map_err(e) {
                e if e.is_not_found() => Ok(false),
                e => Err(e),
            },
        }
    }

    async fn pull_image(&self, reference: &str) -> EngineResult<()> {
        let (from_image, tag) = split_reference(reference);
        let options = CreateImageOptions::<String> {
            from_image: from_image.to_string(),
            tag: tag.to_string(),
            ..Default::default()
        };
        let mut progress = self.docker.create_image(Some(options), None, None);
        while let Some(info) = progress.next().await {
            let info = info.map_err(map_err)?;
            if let Some(status) = info.status {
                tracing::trace!(image = reference, "Pull progress: {}", status);
            }
        }
        Ok(())
    }

    async fn remove_image(
        &self,
        reference: &str,
        spec: RemoveImageSpec,
    ) -> EngineResult<Vec<RemovedImage>> {
        let options = RemoveImageOptions {
            force: spec.force,
            noprune: !spec.prune_children,
        };
        let items = self
            .docker
            .remove_image(reference, Some(options), None)
            .await
            .map_err(map_err)?;
        Ok(items
            .into_iter()
            .flat_map(|item| {
                item.untagged
                    .map(RemovedImage::Untagged)
                    .into_iter()
                    .chain(item.deleted.map(RemovedImage::Deleted))
            })
            .collect())
    }

    async fn create_network(&self, spec: &NetworkSpec) -> EngineResult<String> {
        let options = CreateNetworkOptions::<String> {
            name: spec.name.clone(),
            driver: spec.driver.clone(),
            internal: spec.internal,
            attachable: spec.attachable,
            enable_ipv6: spec.enable_ipv6,
            labels: spec.labels.clone(),
            options: spec.options.clone(),
            ..Default::default()
        };
        let response = self
            .docker
            .create_network(options)
            .await
            .map_err(map_err)?;
        if !response.warning.is_empty() {
            tracing::warn!(name = %spec.name, warning = %response.warning, "Network created with warning");
        }
        Ok(response.id)
    }

    async fn inspect_network(&self, id: &str) -> EngineResult<NetworkDetails> {
        let network = self
            .docker
            .inspect_network(id, None::<InspectNetworkOptions<String>>)
            .await
            .map_err(map_err)?;
        Ok(NetworkDetails {
            id: network.id.unwrap_or_else(|| id.to_string()),
            name: network.name.unwrap_or_default(),
            driver: network.driver.unwrap_or_default(),
            labels: network.labels.unwrap_or_default(),
        })
    }

    async fn remove_network(&self, id: &str) -> EngineResult<()> {
        self.docker.remove_network(id).await.map_err(map_err)
    }

    async fn list_networks(&self, label: &str) -> EngineResult<Vec<String>> {
        let options = ListNetworksOptions::<String> {
            filters: label_filter(label),
        };
        let networks = self
            .docker
            .list_networks(Some(options))
            .await
            .map_err(map_err)?;
        Ok(networks.into_iter().filter_map(|n| n.id).collect())
    }
}

fn container_config(spec: &ContainerSpec) -> Config<String> {
    let host = &spec.host;
    let restart_policy = match &host.restart_policy {
        RestartPolicy::No => None,
        RestartPolicy::Always => Some(BollardRestartPolicy {
            name: Some(RestartPolicyNameEnum::ALWAYS),
            maximum_retry_count: None,
        }),
        RestartPolicy::UnlessStopped => Some(BollardRestartPolicy {
            name: Some(RestartPolicyNameEnum::UNLESS_STOPPED),
            maximum_retry_count: None,
        }),
        RestartPolicy::OnFailure { max_retries } => Some(BollardRestartPolicy {
            name: Some(RestartPolicyNameEnum::ON_FAILURE),
            maximum_retry_count: Some(i64::from(*max_retries)),
        }),
    };

    Config {
        image: Some(spec.image.clone()),
        cmd: spec.cmd.clone(),
        env: (!spec.env.is_empty()).then(|| spec.env.clone()),
        labels: Some(spec.labels.clone()),
        volumes: (!spec.volumes.is_empty()).then(|| {
            spec.volumes
                .iter()
                .map(|path| (path.clone(), HashMap::new()))
                .collect()
        }),
        networking_config: (!spec.networks.is_empty()).then(|| NetworkingConfig {
            endpoints_config: spec
                .networks
                .iter()
                .map(|net| (net.clone(), EndpointSettings::default()))
                .collect(),
        }),
        hostname: spec.hostname.clone(),
        tty: Some(spec.tty),
        open_stdin: Some(spec.open_stdin),
        stdin_once: Some(spec.open_stdin),
        stop_signal: spec.stop_signal.clone(),
        stop_timeout: spec.stop_timeout.map(|t| t.as_secs() as i64),
        host_config: Some(HostConfig {
            auto_remove: Some(host.auto_remove),
            privileged: Some(host.privileged),
            cap_add: (!host.cap_add.is_empty()).then(|| host.cap_add.clone()),
            cap_drop: (!host.cap_drop.is_empty()).then(|| host.cap_drop.clone()),
            network_mode: host.network_mode.clone(),
            cgroupns_mode: host.cgroupns_mode.map(|mode| match mode {
                CgroupnsMode::Private => HostConfigCgroupnsModeEnum::PRIVATE,
                CgroupnsMode::Host => HostConfigCgroupnsModeEnum::HOST,
            }),
            pid_mode: host.pid_mode.clone(),
            ipc_mode: host.ipc_mode.clone(),
            binds: (!host.binds.is_empty()).then(|| host.binds.clone()),
            mounts: (!host.mounts.is_empty()).then(|| host.mounts.iter().map(mount).collect()),
            devices: (!host.devices.is_empty())
                .then(|| host.devices.iter().map(device_mapping).collect()),
            tmpfs: (!host.tmpfs.is_empty()).then(|| host.tmpfs.clone()),
            restart_policy,
            publish_all_ports: Some(host.publish_all_ports),
            readonly_rootfs: Some(host.read_only_rootfs),
            security_opt: (!host.security_opt.is_empty()).then(|| host.security_opt.clone()),
            init: host.init.then_some(true),
            console_size: host
                .console_size
                .map(|size| vec![i32::from(size.height), i32::from(size.width)]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn mount(spec: &MountSpec) -> Mount {
    Mount {
        typ: Some(match spec.kind {
            MountKind::Bind => MountTypeEnum::BIND,
            MountKind::Volume => MountTypeEnum::VOLUME,
            MountKind::Tmpfs => MountTypeEnum::TMPFS,
        }),
        source: spec.source.clone(),
        target: Some(spec.target.clone()),
        read_only: spec.read_only.then_some(true),
        ..Default::default()
    }
}

fn device_mapping(spec: &DeviceSpec) -> DeviceMapping {
    DeviceMapping {
        path_on_host: Some(spec.path_on_host.clone()),
        path_in_container: Some(spec.path_in_container.clone()),
        cgroup_permissions: Some(spec.cgroup_permissions.clone()),
    }
}

fn hijacked(output: LogStream, input: InputSink) -> HijackedConnection {
    let output = output.map(|item| match item {
        Ok(LogOutput::StdOut { message }) => Ok(OutputChunk::Stdout(message)),
        Ok(LogOutput::StdErr { message }) => Ok(OutputChunk::Stderr(message)),
        Ok(LogOutput::StdIn { message }) => Ok(OutputChunk::Stdin(message)),
        Ok(LogOutput::Console { message }) => Ok(OutputChunk::Console(message)),
        Err(e) => Err(io::Error::other(e.to_string())),
    });
    HijackedConnection::new(Box::pin(output), input)
}

fn label_filter(label: &str) -> HashMap<String, Vec<String>> {
    HashMap::from([("label".to_string(), vec![label.to_string()])])
}

/// Split an image reference into name and tag, defaulting to "latest".
///
/// References pinned by digest are passed on as they are.
fn split_reference(reference: &str) -> (&str, &str) {
    if reference.contains('@') {
        return (reference, "");
    }
    let name_start = reference.rfind('/').map_or(0, |i| i + 1);
    match reference[name_start..].rfind(':') {
        Some(i) => (
            &reference[..name_start + i],
            &reference[name_start + i + 1..],
        ),
        None => (reference, "latest"),
    }
}

fn map_err(err: BollardError) -> EngineError {
    match err {
        BollardError::DockerResponseServerError {
            status_code: 404,
            message,
        } => EngineError::NotFound(message),
        BollardError::DockerResponseServerError {
            status_code,
            message,
        } => EngineError::Api {
            status: status_code,
            message,
        },
        BollardError::IOError { err } => EngineError::Io(err),
        other => EngineError::Transport(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ConsoleSize;

    #[test]
    fn image_references_get_default_tag() {
        assert_eq!(split_reference("busybox"), ("busybox", "latest"));
        assert_eq!(split_reference("busybox:1.36"), ("busybox", "1.36"));
        assert_eq!(
            split_reference("localhost:5000/team/busybox"),
            ("localhost:5000/team/busybox", "latest")
        );
        assert_eq!(
            split_reference("localhost:5000/busybox:musl"),
            ("localhost:5000/busybox", "musl")
        );
        assert_eq!(
            split_reference("busybox@sha256:abcd"),
            ("busybox@sha256:abcd", "")
        );
    }

    #[test]
    fn server_errors_map_to_engine_errors() {
        let err = map_err(BollardError::DockerResponseServerError {
            status_code: 404,
            message: "No such container: foo".into(),
        });
        assert!(err.is_not_found());

        let err = map_err(BollardError::DockerResponseServerError {
            status_code: 409,
            message: "conflict".into(),
        });
        assert!(matches!(err, EngineError::Api { status: 409, .. }));
    }

    #[test]
    fn container_config_carries_host_settings() {
        let spec = ContainerSpec {
            image: "busybox".into(),
            cmd: Some(vec!["/bin/sleep".into(), "30s".into()]),
            open_stdin: true,
            host: super::super::HostSpec {
                auto_remove: true,
                cap_drop: vec!["ALL".into()],
                restart_policy: RestartPolicy::OnFailure { max_retries: 3 },
                console_size: Some(ConsoleSize {
                    width: 80,
                    height: 25,
                }),
                ..Default::default()
            },
            ..Default::default()
        };

        let config = container_config(&spec);
        assert_eq!(config.image.as_deref(), Some("busybox"));
        assert_eq!(config.stdin_once, Some(true));
        let host = config.host_config.unwrap();
        assert_eq!(host.auto_remove, Some(true));
        assert_eq!(host.cap_drop, Some(vec!["ALL".to_string()]));
        assert_eq!(host.console_size, Some(vec![25, 80]));
        let policy = host.restart_policy.unwrap();
        assert_eq!(policy.name, Some(RestartPolicyNameEnum::ON_FAILURE));
        assert_eq!(policy.maximum_retry_count, Some(3));
        assert!(host.mounts.is_none());
        assert!(host.devices.is_none());
        assert!(host.cgroupns_mode.is_none());
    }

    #[test]
    fn container_config_carries_mounts_devices_and_cgroupns() {
        let spec = ContainerSpec {
            image: "busybox".into(),
            host: super::super::HostSpec {
                cgroupns_mode: Some(CgroupnsMode::Host),
                mounts: vec![MountSpec {
                    kind: MountKind::Bind,
                    source: Some("/srv".into()),
                    target: "/data".into(),
                    read_only: true,
                }],
                devices: vec![DeviceSpec {
                    path_on_host: "/dev/fuse".into(),
                    path_in_container: "/dev/fuse".into(),
                    cgroup_permissions: "rwm".into(),
                }],
                ..Default::default()
            },
            ..Default::default()
        };

        let host = container_config(&spec).host_config.unwrap();
        assert_eq!(host.cgroupns_mode, Some(HostConfigCgroupnsModeEnum::HOST));
        let mounts = host.mounts.unwrap();
        assert_eq!(mounts.len(), 1);
        assert_eq!(mounts[0].typ, Some(MountTypeEnum::BIND));
        assert_eq!(mounts[0].source.as_deref(), Some("/srv"));
        assert_eq!(mounts[0].target.as_deref(), Some("/data"));
        assert_eq!(mounts[0].read_only, Some(true));
        let devices = host.devices.unwrap();
        assert_eq!(devices[0].path_on_host.as_deref(), Some("/dev/fuse"));
        assert_eq!(devices[0].cgroup_permissions.as_deref(), Some("rwm"));
    }
}

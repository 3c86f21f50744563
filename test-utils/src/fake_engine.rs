//! Scripted in-memory container engine.
//!
//! [`FakeEngine`] keeps containers, command executions, images and networks
//! in memory. What a container or command does once started is described by
//! a [`Program`]: the output it emits, whether it echoes its stdin, how long
//! it takes to report a PID and which exit code it finishes with.

use async_trait::async_trait;
use bytes::Bytes;
use dockling::engine::{
    AttachStreams, ContainerDetails, ContainerSpec, ContainerState, EngineClient, EngineError,
    EngineResult, ExecDetails, ExecSpec, HijackedConnection, NetworkDetails, NetworkEndpoint,
    NetworkSpec, PortBinding, RemoveImageSpec, RemovedImage, TtyOptions,
};
use dockling::stream::OutputChunk;
use dockling::stream::frame::encode_chunk;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};
use tokio::sync::watch;

const PIPE_CAPACITY: usize = 64 * 1024;

/// Exit code of a process terminated by SIGKILL.
pub const KILLED_EXIT_CODE: i64 = 137;

/// Exit code of a process terminated by SIGTERM.
pub const STOPPED_EXIT_CODE: i64 = 143;

/// Engine operations, for failure injection and call inspection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Op {
    CreateContainer,
    InspectContainer,
    AttachContainer,
    StartContainer,
    StopContainer,
    KillContainer,
    RemoveContainer,
    WaitContainer,
    ListContainers,
    CreateExec,
    AttachExec,
    InspectExec,
    HasImage,
    PullImage,
    RemoveImage,
    CreateNetwork,
    InspectNetwork,
    RemoveNetwork,
    ListNetworks,
}

/// Keeps a finished program's output stream open until opened.
#[derive(Clone, Debug)]
pub struct Gate(Arc<watch::Sender<bool>>);

impl Default for Gate {
    fn default() -> Self {
        Self(Arc::new(watch::channel(false).0))
    }
}

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self) {
        self.0.send_replace(true);
    }

    async fn opened(&self) {
        let mut open = self.0.subscribe();
        let _ = open.wait_for(|open| *open).await;
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Emit {
    Stdout(Bytes),
    Stderr(Bytes),
}

/// What a container's initial process or an executed command does.
///
/// The default program emits nothing and exits with code 0.
#[derive(Clone, Debug)]
pub struct Program {
    emits: Vec<Emit>,
    echo_stdin: bool,
    hang: bool,
    exit_code: i64,
    pid: i64,
    pid_delay: usize,
    ports: Vec<(String, PortBinding)>,
    hold: Option<Gate>,
}

impl Default for Program {
    fn default() -> Self {
        Self {
            emits: vec![],
            echo_stdin: false,
            hang: false,
            exit_code: 0,
            pid: 42,
            pid_delay: 0,
            ports: vec![],
            hold: None,
        }
    }
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stdout(mut self, data: impl Into<Bytes>) -> Self {
        self.emits.push(Emit::Stdout(data.into()));
        self
    }

    pub fn stderr(mut self, data: impl Into<Bytes>) -> Self {
        self.emits.push(Emit::Stderr(data.into()));
        self
    }

    /// Copy stdin to stdout until stdin is closed, then exit.
    pub fn echo_stdin(mut self) -> Self {
        self.echo_stdin = true;
        self
    }

    /// Keep running until stopped or killed.
    pub fn hang(mut self) -> Self {
        self.hang = true;
        self
    }

    pub fn exit_code(mut self, code: i64) -> Self {
        self.exit_code = code;
        self
    }

    pub fn pid(mut self, pid: i64) -> Self {
        self.pid = pid;
        self
    }

    /// Report PID 0 for the first `inspections` inspections while running.
    pub fn pid_after(mut self, inspections: usize) -> Self {
        self.pid_delay = inspections;
        self
    }

    /// After exiting, keep the output stream open until `gate` is opened.
    /// The exit is visible on inspection in the meantime.
    pub fn hold_streams_until(mut self, gate: Gate) -> Self {
        self.hold = Some(gate);
        self
    }

    /// Publish container `port` ("80/tcp") on the host.
    pub fn publish(
        mut self,
        port: impl Into<String>,
        host_ip: impl Into<String>,
        host_port: impl Into<String>,
    ) -> Self {
        self.ports.push((
            port.into(),
            PortBinding {
                host_ip: host_ip.into(),
                host_port: host_port.into(),
            },
        ));
        self
    }
}

struct FakeContainer {
    details: ContainerDetails,
    tty: bool,
    program: Program,
    pipe: Option<DuplexStream>,
    inspections: VecDeque<ContainerState>,
    pid_delay: usize,
    started: bool,
    signal: Arc<watch::Sender<Option<i64>>>,
    exit: Arc<watch::Sender<Option<i64>>>,
}

struct FakeExec {
    container_id: String,
    spec: ExecSpec,
    program: Program,
    details: ExecDetails,
    inspections: VecDeque<ExecDetails>,
    pid_delay: usize,
    started: bool,
    signal: Arc<watch::Sender<Option<i64>>>,
}

#[derive(Default)]
struct State {
    next_id: u64,
    containers: HashMap<String, FakeContainer>,
    execs: HashMap<String, FakeExec>,
    images: HashSet<String>,
    networks: HashMap<String, NetworkDetails>,
    image_programs: HashMap<String, Program>,
    command_programs: HashMap<String, Program>,
    failures: HashMap<Op, usize>,
    calls: Vec<(Op, String)>,
}

impl State {
    fn new_id(&mut self) -> String {
        self.next_id += 1;
        let n = self.next_id.wrapping_mul(0x9e37_79b9_7f4a_7c15);
        format!(
            "{:016x}{:016x}{:016x}{:016x}",
            n,
            n.rotate_left(17),
            n.rotate_left(31),
            n.rotate_left(47)
        )
    }

    fn container_id(&self, id_or_name: &str) -> EngineResult<String> {
        self.containers
            .values()
            .find(|c| {
                c.details.id == id_or_name || c.details.name.trim_start_matches('/') == id_or_name
            })
            .map(|c| c.details.id.clone())
            .ok_or_else(|| EngineError::NotFound(format!("No such container: {}", id_or_name)))
    }

    fn container_mut(&mut self, id_or_name: &str) -> EngineResult<&mut FakeContainer> {
        let id = self.container_id(id_or_name)?;
        self.containers
            .get_mut(&id)
            .ok_or_else(|| EngineError::NotFound(format!("No such container: {}", id_or_name)))
    }

    fn exec_mut(&mut self, id: &str) -> EngineResult<&mut FakeExec> {
        self.execs
            .get_mut(id)
            .ok_or_else(|| EngineError::NotFound(format!("No such exec instance: {}", id)))
    }

    fn network_id(&self, id_or_name: &str) -> EngineResult<String> {
        self.networks
            .values()
            .find(|n| n.id == id_or_name || n.name == id_or_name)
            .map(|n| n.id.clone())
            .ok_or_else(|| EngineError::NotFound(format!("network {} not found", id_or_name)))
    }

    /// Kill a container's processes and forget about it.
    fn remove_container(&mut self, id_or_name: &str) -> EngineResult<()> {
        let id = self.container_id(id_or_name)?;
        for exec in self.execs.values().filter(|e| e.container_id == id) {
            exec.signal.send_replace(Some(KILLED_EXIT_CODE));
        }
        if let Some(container) = self.containers.remove(&id) {
            container.signal.send_replace(Some(KILLED_EXIT_CODE));
        }
        Ok(())
    }
}

/// In-memory [`EngineClient`] running scripted programs.
///
/// Clones share the same state, so keep one around to script and inspect
/// the engine while a session uses another.
#[derive(Clone, Default)]
pub struct FakeEngine {
    state: Arc<Mutex<State>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `reference` available locally.
    pub fn with_image(self, reference: impl Into<String>) -> Self {
        self.state.lock().images.insert(reference.into());
        self
    }

    pub fn has_local_image(&self, reference: &str) -> bool {
        self.state.lock().images.contains(reference)
    }

    /// Run `program` in containers created from `image`.
    pub fn program_for_image(&self, image: impl Into<String>, program: Program) {
        self.state.lock().image_programs.insert(image.into(), program);
    }

    /// Run `program` for executed commands whose program name is `command`.
    pub fn program_for_command(&self, command: impl Into<String>, program: Program) {
        self.state
            .lock()
            .command_programs
            .insert(command.into(), program);
    }

    /// Fail the next call of `op`; calling this repeatedly fails as many calls.
    pub fn fail_next(&self, op: Op) {
        *self.state.lock().failures.entry(op).or_default() += 1;
    }

    /// Answer the next inspections of a container with `states`, in order.
    pub fn script_container<I>(&self, id: &str, states: I)
    where
        I: IntoIterator<Item = ContainerState>,
    {
        if let Some(container) = self.state.lock().containers.get_mut(id) {
            container.inspections.extend(states);
        }
    }

    /// Answer the next inspections of a command execution with `details`, in
    /// order.
    pub fn script_exec<I>(&self, id: &str, details: I)
    where
        I: IntoIterator<Item = ExecDetails>,
    {
        if let Some(exec) = self.state.lock().execs.get_mut(id) {
            exec.inspections.extend(details);
        }
    }

    /// Add a created, never started container.
    pub fn add_container(&self, name: &str, labels: &[(&str, &str)]) -> String {
        let mut state = self.state.lock();
        let id = state.new_id();
        let (signal, _) = watch::channel(None);
        let (exit, _) = watch::channel(None);
        state.containers.insert(
            id.clone(),
            FakeContainer {
                details: ContainerDetails {
                    id: id.clone(),
                    name: format!("/{}", name),
                    labels: to_map(labels),
                    state: ContainerState {
                        status: "created".to_string(),
                        ..Default::default()
                    },
                    ..Default::default()
                },
                tty: false,
                program: Program::default(),
                pipe: None,
                inspections: VecDeque::new(),
                pid_delay: 0,
                started: false,
                signal: Arc::new(signal),
                exit: Arc::new(exit),
            },
        );
        id
    }

    pub fn add_network(&self, name: &str, labels: &[(&str, &str)]) -> String {
        self.add_network_with_driver(name, "bridge", labels)
    }

    /// Add a network using `driver`, such as "macvlan", "host" or "null".
    pub fn add_network_with_driver(
        &self,
        name: &str,
        driver: &str,
        labels: &[(&str, &str)],
    ) -> String {
        let mut state = self.state.lock();
        let id = state.new_id();
        state.networks.insert(
            id.clone(),
            NetworkDetails {
                id: id.clone(),
                name: name.to_string(),
                driver: driver.to_string(),
                labels: to_map(labels),
            },
        );
        id
    }

    pub fn container_ids(&self) -> Vec<String> {
        self.state.lock().containers.keys().cloned().collect()
    }

    pub fn network_ids(&self) -> Vec<String> {
        self.state.lock().networks.keys().cloned().collect()
    }

    /// Labels a container was created with.
    pub fn container_labels(&self, id: &str) -> Option<HashMap<String, String>> {
        self.state
            .lock()
            .containers
            .get(id)
            .map(|c| c.details.labels.clone())
    }

    /// Spec a command execution was created with.
    pub fn exec_spec(&self, id: &str) -> Option<ExecSpec> {
        self.state.lock().execs.get(id).map(|e| e.spec.clone())
    }

    /// All calls so far, with the entity each one targeted.
    pub fn calls(&self) -> Vec<(Op, String)> {
        self.state.lock().calls.clone()
    }

    /// Targets of all calls of `op` so far.
    pub fn calls_of(&self, op: Op) -> Vec<String> {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|(o, _)| *o == op)
            .map(|(_, target)| target.clone())
            .collect()
    }

    /// Record a call, failing it when a failure has been injected.
    fn record(&self, op: Op, target: &str) -> EngineResult<()> {
        let mut state = self.state.lock();
        state.calls.push((op, target.to_string()));
        match state.failures.get_mut(&op) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(EngineError::Api {
                    status: 500,
                    message: format!("injected {:?} failure", op),
                })
            }
            _ => Ok(()),
        }
    }

    async fn run_container(
        self,
        id: String,
        pipe: DuplexStream,
        program: Program,
        tty: bool,
        signal: watch::Receiver<Option<i64>>,
        exit: Arc<watch::Sender<Option<i64>>>,
    ) {
        let hold = program.hold.clone();
        let (code, mut writer) = run_program(pipe, program, tty, signal).await;
        if let Some(container) = self.state.lock().containers.get_mut(&id) {
            container.details.state = ContainerState {
                status: "exited".to_string(),
                exit_code: code,
                ..Default::default()
            };
        }
        exit.send_replace(Some(code));
        if let Some(gate) = hold {
            gate.opened().await;
        }
        let _ = writer.shutdown().await;
    }

    async fn run_exec(
        self,
        id: String,
        pipe: DuplexStream,
        program: Program,
        tty: bool,
        signal: watch::Receiver<Option<i64>>,
    ) {
        let hold = program.hold.clone();
        let (code, mut writer) = run_program(pipe, program, tty, signal).await;
        // The engine reports the exit before the attach stream closes.
        if let Some(exec) = self.state.lock().execs.get_mut(&id) {
            exec.details = ExecDetails {
                running: false,
                pid: 0,
                exit_code: Some(code),
            };
        }
        if let Some(gate) = hold {
            gate.opened().await;
        }
        let _ = writer.shutdown().await;
    }
}

impl std::fmt::Debug for FakeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("FakeEngine")
            .field("containers", &state.containers.len())
            .field("execs", &state.execs.len())
            .field("networks", &state.networks.len())
            .finish_non_exhaustive()
    }
}

fn to_map(labels: &[(&str, &str)]) -> HashMap<String, String> {
    labels
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn matches_label(labels: &HashMap<String, String>, filter: &str) -> bool {
    match filter.split_once('=') {
        Some((key, value)) => labels.get(key).is_some_and(|v| v == value),
        None => labels.contains_key(filter),
    }
}

fn conflict(message: String) -> EngineError {
    EngineError::Api {
        status: 409,
        message,
    }
}

/// Play a program over the engine side of an attach pipe, returning its exit
/// code and the still open output side.
async fn run_program(
    pipe: DuplexStream,
    program: Program,
    tty: bool,
    mut signal: watch::Receiver<Option<i64>>,
) -> (i64, WriteHalf<DuplexStream>) {
    let (mut reader, mut writer) = tokio::io::split(pipe);
    for emit in &program.emits {
        write_emit(&mut writer, emit.clone(), tty).await;
    }

    if program.echo_stdin {
        let mut buf = vec![0u8; 4096];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    let data = Bytes::copy_from_slice(&buf[..n]);
                    write_emit(&mut writer, Emit::Stdout(data), tty).await;
                }
            }
        }
    } else {
        tokio::spawn(drain(reader));
    }

    let code = if program.hang {
        match signal.wait_for(Option::is_some).await {
            Ok(signalled) => {
                let signalled: Option<i64> = *signalled;
                signalled.unwrap_or(KILLED_EXIT_CODE)
            }
            Err(_) => KILLED_EXIT_CODE,
        }
    } else {
        program.exit_code
    };
    (code, writer)
}

async fn drain(mut reader: ReadHalf<DuplexStream>) {
    let _ = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await;
}

async fn write_emit(writer: &mut WriteHalf<DuplexStream>, emit: Emit, tty: bool) {
    let data = match (emit, tty) {
        (Emit::Stdout(data) | Emit::Stderr(data), true) => data,
        (Emit::Stdout(data), false) => match encode_chunk(OutputChunk::Stdout(data)) {
            Ok(frame) => frame,
            Err(_) => return,
        },
        (Emit::Stderr(data), false) => match encode_chunk(OutputChunk::Stderr(data)) {
            Ok(frame) => frame,
            Err(_) => return,
        },
    };
    let _ = writer.write_all(&data).await;
}

fn hijack(tty: bool) -> (HijackedConnection, DuplexStream) {
    let (ours, theirs) = tokio::io::duplex(PIPE_CAPACITY);
    let (reader, writer) = tokio::io::split(ours);
    (HijackedConnection::from_raw(reader, writer, tty), theirs)
}

#[async_trait]
impl EngineClient for FakeEngine {
    async fn create_container(&self, spec: &ContainerSpec) -> EngineResult<String> {
        self.record(Op::CreateContainer, &spec.image)?;
        let mut state = self.state.lock();
        if !state.images.contains(&spec.image) {
            return Err(EngineError::NotFound(format!(
                "No such image: {}",
                spec.image
            )));
        }

        let id = state.new_id();
        let name = spec
            .name
            .clone()
            .unwrap_or_else(|| format!("fake_{}", state.next_id));
        if state.container_id(&name).is_ok() {
            return Err(conflict(format!(
                "container name \"/{}\" is already in use",
                name
            )));
        }

        let mut networks = Vec::new();
        let mode = spec
            .host
            .network_mode
            .as_ref()
            .filter(|mode| !mode.starts_with("container:"));
        for net in spec.networks.iter().chain(mode) {
            let network_id = state.network_id(net)?;
            let driver = &state.networks[&network_id].driver;
            let ip_address = match driver.as_str() {
                "host" | "null" => String::new(),
                _ => format!("172.18.0.{}", networks.len() + 2),
            };
            networks.push(NetworkEndpoint {
                name: net.clone(),
                network_id,
                ip_address,
            });
        }
        networks.sort_by(|a, b| a.name.cmp(&b.name));

        let program = state
            .image_programs
            .get(&spec.image)
            .cloned()
            .unwrap_or_default();
        let mut ports: HashMap<String, Vec<PortBinding>> = HashMap::new();
        for (port, binding) in &program.ports {
            ports.entry(port.clone()).or_default().push(binding.clone());
        }
        let (signal, _) = watch::channel(None);
        let (exit, _) = watch::channel(None);
        state.containers.insert(
            id.clone(),
            FakeContainer {
                details: ContainerDetails {
                    id: id.clone(),
                    name: format!("/{}", name),
                    image: spec.image.clone(),
                    labels: spec.labels.clone(),
                    state: ContainerState {
                        status: "created".to_string(),
                        ..Default::default()
                    },
                    ports,
                    networks,
                },
                tty: spec.tty,
                program,
                pipe: None,
                inspections: VecDeque::new(),
                pid_delay: 0,
                started: false,
                signal: Arc::new(signal),
                exit: Arc::new(exit),
            },
        );
        Ok(id)
    }

    async fn inspect_container(&self, id: &str) -> EngineResult<ContainerDetails> {
        self.record(Op::InspectContainer, id)?;
        let mut state = self.state.lock();
        let container = state.container_mut(id)?;
        let mut details = container.details.clone();
        if let Some(scripted) = container.inspections.pop_front() {
            details.state = scripted;
        } else if details.state.running && container.pid_delay > 0 {
            container.pid_delay -= 1;
            details.state.pid = 0;
        }
        Ok(details)
    }

    async fn attach_container(
        &self,
        id: &str,
        _streams: AttachStreams,
    ) -> EngineResult<HijackedConnection> {
        self.record(Op::AttachContainer, id)?;
        let mut state = self.state.lock();
        let container = state.container_mut(id)?;
        if container.started {
            return Err(conflict(format!("container {} already started", id)));
        }
        let (conn, theirs) = hijack(container.tty);
        container.pipe = Some(theirs);
        Ok(conn)
    }

    async fn start_container(&self, id: &str) -> EngineResult<()> {
        self.record(Op::StartContainer, id)?;
        let mut state = self.state.lock();
        let container = state.container_mut(id)?;
        if container.started {
            return Ok(());
        }
        container.started = true;
        container.pid_delay = container.program.pid_delay;
        container.details.state = ContainerState {
            status: "running".to_string(),
            running: true,
            pid: container.program.pid,
            ..Default::default()
        };

        // Unattached output goes nowhere.
        let pipe = match container.pipe.take() {
            Some(pipe) => pipe,
            None => tokio::io::duplex(PIPE_CAPACITY).1,
        };
        tokio::spawn(self.clone().run_container(
            container.details.id.clone(),
            pipe,
            container.program.clone(),
            container.tty,
            container.signal.subscribe(),
            container.exit.clone(),
        ));
        Ok(())
    }

    async fn stop_container(&self, id: &str, _timeout: Option<Duration>) -> EngineResult<()> {
        self.record(Op::StopContainer, id)?;
        let mut state = self.state.lock();
        let container = state.container_mut(id)?;
        container.signal.send_replace(Some(STOPPED_EXIT_CODE));
        Ok(())
    }

    async fn kill_container(&self, id: &str) -> EngineResult<()> {
        self.record(Op::KillContainer, id)?;
        self.state.lock().remove_container(id)
    }

    async fn remove_container(&self, id: &str) -> EngineResult<()> {
        self.record(Op::RemoveContainer, id)?;
        self.state.lock().remove_container(id)
    }

    async fn wait_container(&self, id: &str) -> EngineResult<i64> {
        self.record(Op::WaitContainer, id)?;
        let mut exit = {
            let mut state = self.state.lock();
            state.container_mut(id)?.exit.subscribe()
        };
        let code = exit
            .wait_for(Option::is_some)
            .await
            .map(|code| *code)
            .map_err(|_| EngineError::NotFound(format!("No such container: {}", id)))?;
        Ok(code.unwrap_or_default())
    }

    async fn list_containers(&self, label: &str) -> EngineResult<Vec<String>> {
        self.record(Op::ListContainers, label)?;
        let state = self.state.lock();
        Ok(state
            .containers
            .values()
            .filter(|c| matches_label(&c.details.labels, label))
            .map(|c| c.details.id.clone())
            .collect())
    }

    async fn create_exec(&self, container_id: &str, spec: &ExecSpec) -> EngineResult<String> {
        self.record(Op::CreateExec, container_id)?;
        let mut state = self.state.lock();
        let container_id = state.container_id(container_id)?;
        let running = state
            .containers
            .get(&container_id)
            .is_some_and(|c| c.details.state.running);
        if !running {
            return Err(conflict(format!(
                "container {} is not running",
                container_id
            )));
        }

        let program = spec
            .cmd
            .first()
            .and_then(|cmd| state.command_programs.get(cmd))
            .cloned()
            .unwrap_or_default();
        let id = state.new_id();
        let (signal, _) = watch::channel(None);
        state.execs.insert(
            id.clone(),
            FakeExec {
                container_id,
                spec: spec.clone(),
                program,
                details: ExecDetails::default(),
                inspections: VecDeque::new(),
                pid_delay: 0,
                started: false,
                signal: Arc::new(signal),
            },
        );
        Ok(id)
    }

    async fn attach_exec(&self, exec_id: &str, tty: TtyOptions) -> EngineResult<HijackedConnection> {
        self.record(Op::AttachExec, exec_id)?;
        let mut state = self.state.lock();
        let exec = state.exec_mut(exec_id)?;
        if exec.started {
            return Err(conflict(format!("exec {} already started", exec_id)));
        }
        exec.started = true;
        exec.pid_delay = exec.program.pid_delay;
        exec.details = ExecDetails {
            running: true,
            pid: exec.program.pid,
            exit_code: None,
        };

        let (conn, theirs) = hijack(tty.tty);
        tokio::spawn(self.clone().run_exec(
            exec_id.to_string(),
            theirs,
            exec.program.clone(),
            tty.tty,
            exec.signal.subscribe(),
        ));
        Ok(conn)
    }

    async fn inspect_exec(&self, exec_id: &str) -> EngineResult<ExecDetails> {
        self.record(Op::InspectExec, exec_id)?;
        let mut state = self.state.lock();
        let exec = state.exec_mut(exec_id)?;
        if let Some(scripted) = exec.inspections.pop_front() {
            return Ok(scripted);
        }
        let mut details = exec.details;
        if details.running && exec.pid_delay > 0 {
            exec.pid_delay -= 1;
            details.pid = 0;
        }
        Ok(details)
    }

    async fn has_image(&self, reference: &str) -> EngineResult<bool> {
        self.record(Op::HasImage, reference)?;
        Ok(self.state.lock().images.contains(reference))
    }

    async fn pull_image(&self, reference: &str) -> EngineResult<()> {
        self.record(Op::PullImage, reference)?;
        self.state.lock().images.insert(reference.to_string());
        Ok(())
    }

    async fn remove_image(
        &self,
        reference: &str,
        spec: RemoveImageSpec,
    ) -> EngineResult<Vec<RemovedImage>> {
        self.record(Op::RemoveImage, reference)?;
        let mut state = self.state.lock();
        if !state.images.contains(reference) {
            return Err(EngineError::NotFound(format!("No such image: {}", reference)));
        }
        let in_use = state
            .containers
            .values()
            .any(|c| c.details.image == reference);
        if in_use && !spec.force {
            return Err(conflict(format!(
                "unable to remove image {}: image is being used by a container",
                reference
            )));
        }
        state.images.remove(reference);
        Ok(vec![
            RemovedImage::Untagged(reference.to_string()),
            RemovedImage::Deleted(format!("sha256:{}", state.new_id())),
        ])
    }

    async fn create_network(&self, spec: &NetworkSpec) -> EngineResult<String> {
        self.record(Op::CreateNetwork, &spec.name)?;
        let mut state = self.state.lock();
        if state.network_id(&spec.name).is_ok() {
            return Err(conflict(format!("network with name {} already exists", spec.name)));
        }
        let id = state.new_id();
        state.networks.insert(
            id.clone(),
            NetworkDetails {
                id: id.clone(),
                name: spec.name.clone(),
                driver: spec.driver.clone(),
                labels: spec.labels.clone(),
            },
        );
        Ok(id)
    }

    async fn inspect_network(&self, id: &str) -> EngineResult<NetworkDetails> {
        self.record(Op::InspectNetwork, id)?;
        let state = self.state.lock();
        let id = state.network_id(id)?;
        state
            .networks
            .get(&id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("network {} not found", id)))
    }

    async fn remove_network(&self, id: &str) -> EngineResult<()> {
        self.record(Op::RemoveNetwork, id)?;
        let mut state = self.state.lock();
        let id = state.network_id(id)?;
        state.networks.remove(&id);
        Ok(())
    }

    async fn list_networks(&self, label: &str) -> EngineResult<Vec<String>> {
        self.record(Op::ListNetworks, label)?;
        let state = self.state.lock();
        Ok(state
            .networks
            .values()
            .filter(|n| matches_label(&n.labels, label))
            .map(|n| n.id.clone())
            .collect())
    }
}

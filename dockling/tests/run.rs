//! Integration tests for running containers (create, attach, start, wait).

use dockling::engine::ContainerState;
use dockling::{CancellationToken, DocklingError, RunOptions, SessionOptions, SharedBuffer};
use dockling_test_utils::{Op, Program, STOPPED_EXIT_CODE, TEST_IMAGE, engine, session};
use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use std::time::Duration;
use tokio::io::AsyncWrite;

// ============================================================================
// OUTPUT TESTS
// ============================================================================

#[tokio::test]
async fn run_collects_all_output_before_done() {
    let engine = engine();
    engine.program_for_image(TEST_IMAGE, Program::new().stdout("hello\n").exit_code(0));
    let session = session(&engine, SessionOptions::new()).await;

    let out = SharedBuffer::new();
    let container = session
        .run(TEST_IMAGE, RunOptions::new().combined_output(out.clone()))
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    assert_eq!(container.wait(&cancel).await.unwrap(), 0);
    assert_eq!(out.to_string_lossy(), "hello\n");
}

/// Sink taking a millisecond per write.
struct SlowSink {
    inner: SharedBuffer,
    delay: Option<Pin<Box<tokio::time::Sleep>>>,
}

impl SlowSink {
    fn new(inner: SharedBuffer) -> Self {
        Self { inner, delay: None }
    }
}

impl AsyncWrite for SlowSink {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let delay = self
            .delay
            .get_or_insert_with(|| Box::pin(tokio::time::sleep(Duration::from_millis(1))));
        ready!(delay.as_mut().poll(cx));
        self.delay = None;
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn wait_returns_only_after_slow_sink_got_everything() {
    let engine = engine();
    let program = (0..20).fold(Program::new(), |program, _| program.stdout(vec![b'x'; 100]));
    engine.program_for_image(TEST_IMAGE, program);
    let session = session(&engine, SessionOptions::new()).await;

    for _ in 0..5 {
        let out = SharedBuffer::new();
        let container = session
            .run(
                TEST_IMAGE,
                RunOptions::new().combined_output(SlowSink::new(out.clone())),
            )
            .await
            .unwrap();

        assert_eq!(container.wait(&CancellationToken::new()).await.unwrap(), 0);
        assert_eq!(out.len(), 20 * 100);
        assert!(container.done().is_done());
    }
}

#[tokio::test]
async fn demuxed_output_keeps_streams_apart() {
    let engine = engine();
    engine.program_for_image(TEST_IMAGE, Program::new().stdout("out").stderr("err"));
    let session = session(&engine, SessionOptions::new()).await;

    let stdout = SharedBuffer::new();
    let stderr = SharedBuffer::new();
    let container = session
        .run(
            TEST_IMAGE,
            RunOptions::new().demuxed_output(stdout.clone(), stderr.clone()),
        )
        .await
        .unwrap();

    container.done().wait().await;
    assert_eq!(stdout.to_string_lossy(), "out");
    assert_eq!(stderr.to_string_lossy(), "err");
}

#[tokio::test]
async fn tty_output_is_combined_in_emission_order() {
    let engine = engine();
    engine.program_for_image(
        TEST_IMAGE,
        Program::new().stdout("a").stderr("b").stdout("c"),
    );
    let session = session(&engine, SessionOptions::new()).await;

    let out = SharedBuffer::new();
    let container = session
        .run(TEST_IMAGE, RunOptions::new().tty().combined_output(out.clone()))
        .await
        .unwrap();

    container.done().wait().await;
    assert_eq!(out.to_string_lossy(), "abc");
}

#[tokio::test]
async fn input_is_fed_to_container() {
    let engine = engine();
    engine.program_for_image(TEST_IMAGE, Program::new().echo_stdin().exit_code(3));
    let session = session(&engine, SessionOptions::new()).await;

    let out = SharedBuffer::new();
    let container = session
        .run(
            TEST_IMAGE,
            RunOptions::new()
                .input(&b"ping"[..])
                .combined_output(out.clone()),
        )
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    assert_eq!(container.wait(&cancel).await.unwrap(), 3);
    container.done().wait().await;
    assert_eq!(out.to_string_lossy(), "ping");
}

// ============================================================================
// IMAGE TESTS
// ============================================================================

#[tokio::test]
async fn missing_image_is_pulled_first() {
    let engine = engine();
    let session = session(&engine, SessionOptions::new()).await;

    session.run("alpine:3.20", RunOptions::new()).await.unwrap();

    assert_eq!(engine.calls_of(Op::PullImage), vec!["alpine:3.20"]);
    assert!(engine.has_local_image("alpine:3.20"));
}

#[tokio::test]
async fn local_image_is_not_pulled() {
    let engine = engine();
    let session = session(&engine, SessionOptions::new()).await;

    session.run(TEST_IMAGE, RunOptions::new()).await.unwrap();

    assert!(engine.calls_of(Op::PullImage).is_empty());
}

#[tokio::test]
async fn failed_pull_creates_nothing() {
    let engine = engine();
    engine.fail_next(Op::PullImage);
    let session = session(&engine, SessionOptions::new()).await;

    let err = session.run("alpine:3.20", RunOptions::new()).await.unwrap_err();

    assert!(matches!(err, DocklingError::Image { .. }));
    assert!(engine.calls_of(Op::CreateContainer).is_empty());
}

// ============================================================================
// CLEANUP TESTS
// ============================================================================

#[tokio::test]
async fn failed_start_removes_container() {
    let engine = engine();
    engine.fail_next(Op::StartContainer);
    let session = session(&engine, SessionOptions::new()).await;

    let err = session.run(TEST_IMAGE, RunOptions::new()).await.unwrap_err();
    assert!(err.to_string().contains("cannot start container"));

    let removed = engine.calls_of(Op::RemoveContainer);
    assert_eq!(removed.len(), 1);
    assert!(engine.container_ids().is_empty());
    let lookup = session.container(&removed[0]).await.unwrap_err();
    assert!(lookup.is_not_found());
}

#[tokio::test]
async fn failed_attach_removes_container_without_starting() {
    let engine = engine();
    engine.fail_next(Op::AttachContainer);
    let session = session(&engine, SessionOptions::new()).await;

    session.run(TEST_IMAGE, RunOptions::new()).await.unwrap_err();

    assert!(engine.calls_of(Op::StartContainer).is_empty());
    assert_eq!(engine.calls_of(Op::RemoveContainer).len(), 1);
    assert!(engine.container_ids().is_empty());
}

#[tokio::test]
async fn failed_inspect_after_start_removes_container() {
    let engine = engine();
    engine.program_for_image(TEST_IMAGE, Program::new().hang());
    engine.fail_next(Op::InspectContainer);
    let session = session(&engine, SessionOptions::new()).await;

    let err = session.run(TEST_IMAGE, RunOptions::new()).await.unwrap_err();

    assert!(err.to_string().contains("cannot inspect newly started container"));
    assert!(engine.container_ids().is_empty());
}

#[tokio::test]
async fn failed_removal_does_not_mask_start_error() {
    let engine = engine();
    engine.fail_next(Op::StartContainer);
    engine.fail_next(Op::RemoveContainer);
    let session = session(&engine, SessionOptions::new()).await;

    let err = session.run(TEST_IMAGE, RunOptions::new()).await.unwrap_err();

    assert!(err.to_string().contains("cannot start container"));
}

#[tokio::test]
async fn invalid_options_fail_before_any_engine_call() {
    let engine = engine();
    let session = session(&engine, SessionOptions::new()).await;

    let err = session
        .run(TEST_IMAGE, RunOptions::new().label("no-equals-sign"))
        .await
        .unwrap_err();

    assert!(matches!(err, DocklingError::Config(_)));
    assert!(engine.calls().is_empty());
}

// ============================================================================
// PID TESTS
// ============================================================================

#[tokio::test]
async fn pid_is_polled_until_it_shows_up() {
    let engine = engine();
    engine.program_for_image(TEST_IMAGE, Program::new().hang().pid(1234));
    let session = session(&engine, SessionOptions::new()).await;
    let container = session.run(TEST_IMAGE, RunOptions::new()).await.unwrap();

    let starting = ContainerState {
        status: "running".into(),
        running: true,
        ..Default::default()
    };
    engine.script_container(container.id(), vec![starting.clone(), starting.clone(), starting]);
    let inspections = engine.calls_of(Op::InspectContainer).len();

    let cancel = CancellationToken::new();
    assert_eq!(container.pid(&cancel).await.unwrap(), 1234);
    assert_eq!(engine.calls_of(Op::InspectContainer).len() - inspections, 4);

    container.kill().await;
}

#[tokio::test]
async fn pid_gives_up_on_dead_container() {
    let engine = engine();
    engine.program_for_image(TEST_IMAGE, Program::new().hang());
    let session = session(&engine, SessionOptions::new()).await;
    let container = session.run(TEST_IMAGE, RunOptions::new()).await.unwrap();

    engine.script_container(
        container.id(),
        vec![ContainerState {
            status: "dead".into(),
            dead: true,
            ..Default::default()
        }],
    );
    let inspections = engine.calls_of(Op::InspectContainer).len();

    let cancel = CancellationToken::new();
    let err = container.pid(&cancel).await.unwrap_err();
    assert!(matches!(err, DocklingError::TerminalState { .. }));
    assert_eq!(engine.calls_of(Op::InspectContainer).len() - inspections, 1);

    container.kill().await;
}

#[tokio::test]
async fn pid_keeps_polling_oom_killed_container_while_restarting() {
    let engine = engine();
    engine.program_for_image(TEST_IMAGE, Program::new().hang().pid(7));
    let session = session(&engine, SessionOptions::new()).await;
    let container = session.run(TEST_IMAGE, RunOptions::new()).await.unwrap();

    engine.script_container(
        container.id(),
        vec![ContainerState {
            status: "restarting".into(),
            restarting: true,
            oom_killed: true,
            ..Default::default()
        }],
    );

    let cancel = CancellationToken::new();
    assert_eq!(container.pid(&cancel).await.unwrap(), 7);

    container.kill().await;
}

#[tokio::test]
async fn pid_returns_promptly_when_cancelled() {
    let engine = engine();
    engine.program_for_image(TEST_IMAGE, Program::new().hang().pid_after(usize::MAX));
    let session = session(&engine, SessionOptions::new()).await;
    let container = session.run(TEST_IMAGE, RunOptions::new()).await.unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = tokio::time::timeout(Duration::from_secs(5), container.pid(&cancel))
        .await
        .expect("pid should return promptly")
        .unwrap_err();
    assert!(err.is_cancelled());

    container.kill().await;
}

// ============================================================================
// WAIT / STOP / KILL TESTS
// ============================================================================

#[tokio::test]
async fn wait_returns_promptly_when_cancelled() {
    let engine = engine();
    engine.program_for_image(TEST_IMAGE, Program::new().hang());
    let session = session(&engine, SessionOptions::new()).await;
    let container = session.run(TEST_IMAGE, RunOptions::new()).await.unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = container.wait(&cancel).await.unwrap_err();
    assert!(err.is_cancelled());

    container.kill().await;
}

#[tokio::test]
async fn stop_terminates_container() {
    let engine = engine();
    engine.program_for_image(TEST_IMAGE, Program::new().hang());
    let session = session(&engine, SessionOptions::new()).await;
    let mut container = session.run(TEST_IMAGE, RunOptions::new()).await.unwrap();
    assert!(container.details().state.running);

    container.stop().await;
    let cancel = CancellationToken::new();
    assert_eq!(container.wait(&cancel).await.unwrap(), STOPPED_EXIT_CODE);
    container.done().wait().await;

    container.refresh().await.unwrap();
    assert!(!container.details().state.running);
    assert_eq!(container.details().state.exit_code, STOPPED_EXIT_CODE);
}

#[tokio::test]
async fn kill_removes_container_and_releases_streams() {
    let engine = engine();
    engine.program_for_image(TEST_IMAGE, Program::new().hang());
    let session = session(&engine, SessionOptions::new()).await;
    let container = session.run(TEST_IMAGE, RunOptions::new()).await.unwrap();

    container.kill().await;

    container.done().wait().await;
    assert!(engine.container_ids().is_empty());
    // Killing twice is fine.
    container.kill().await;
}

// ============================================================================
// DETAILS TESTS
// ============================================================================

#[tokio::test]
async fn container_reports_name_without_slash() {
    let engine = engine();
    let session = session(&engine, SessionOptions::new()).await;

    let container = session
        .run(TEST_IMAGE, RunOptions::new().name("db"))
        .await
        .unwrap();

    assert_eq!(container.name(), "db");
    assert_eq!(container.abbreviated_id().len(), 10);
    assert!(container.id().starts_with(container.abbreviated_id()));

    let found = session.container("db").await.unwrap();
    assert_eq!(found.id(), container.id());
    assert!(found.done().is_done());
}

#[tokio::test]
async fn published_ports_are_resolved() {
    let engine = engine();
    engine.program_for_image(
        TEST_IMAGE,
        Program::new()
            .hang()
            .publish("80/tcp", "0.0.0.0", "32768")
            .publish("80/tcp", "::", "32768")
            .publish("53/udp", "127.0.0.1", "32769"),
    );
    let session = session(&engine, SessionOptions::new()).await;
    let container = session.run(TEST_IMAGE, RunOptions::new()).await.unwrap();

    let web = container.published_port("80");
    assert_eq!(web.len(), 2);
    assert!(web.iter().all(|addr| addr.port() == 32768));
    assert_eq!(
        web[0].unspecified_as_loopback().ip(),
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    );

    let dns = container.published_port("53/udp");
    assert_eq!(dns.len(), 1);
    assert_eq!(dns[0].to_string(), "127.0.0.1:32769");

    assert!(container.published_port("8080").is_empty());

    container.kill().await;
}

#[tokio::test]
async fn ip_skips_macvlan_networks() {
    let engine = engine();
    engine.add_network_with_driver("a-macvlan", "macvlan", &[]);
    engine.add_network("b-bridge", &[]);
    engine.program_for_image(TEST_IMAGE, Program::new().hang());
    let session = session(&engine, SessionOptions::new()).await;

    let container = session
        .run(
            TEST_IMAGE,
            RunOptions::new().network("a-macvlan").network("b-bridge"),
        )
        .await
        .unwrap();

    let networks = &container.details().networks;
    assert_eq!(networks.len(), 2);
    let bridge_ip: IpAddr = networks[1].ip_address.parse().unwrap();
    assert_eq!(container.ip().await, Some(bridge_ip));

    container.kill().await;
}

#[tokio::test]
async fn ip_of_host_and_none_networking() {
    let engine = engine();
    engine.add_network_with_driver("host", "host", &[]);
    engine.add_network_with_driver("none", "null", &[]);
    engine.program_for_image(TEST_IMAGE, Program::new().hang());
    let session = session(&engine, SessionOptions::new()).await;

    let host = session
        .run(TEST_IMAGE, RunOptions::new().network_mode("host"))
        .await
        .unwrap();
    assert_eq!(host.ip().await, Some(IpAddr::V4(Ipv4Addr::LOCALHOST)));

    let isolated = session
        .run(TEST_IMAGE, RunOptions::new().network_mode("none"))
        .await
        .unwrap();
    assert_eq!(isolated.ip().await, None);

    host.kill().await;
    isolated.kill().await;
}

#[tokio::test]
async fn ip_skips_networks_that_cannot_be_inspected() {
    let engine = engine();
    engine.add_network("a-flaky", &[]);
    engine.add_network("b-bridge", &[]);
    engine.program_for_image(TEST_IMAGE, Program::new().hang());
    let session = session(&engine, SessionOptions::new()).await;

    let container = session
        .run(
            TEST_IMAGE,
            RunOptions::new().network("a-flaky").network("b-bridge"),
        )
        .await
        .unwrap();

    engine.fail_next(Op::InspectNetwork);
    let bridge_ip: IpAddr = container.details().networks[1].ip_address.parse().unwrap();
    assert_eq!(container.ip().await, Some(bridge_ip));

    container.kill().await;
}

// Exec sessions: cumulative output, re-attach, graceful-then-forceful termination

mod common;

use common::{ExecScript, FakeBackend, RecordingPublisher};
use dockerbridge::docker_repo::{ExecEvent, ExecSignal};
use dockerbridge::exec::{ExecSessionManager, ExecState};
use dockerbridge::models::{ExecOutput, PushMessage};
use std::sync::Arc;
use tokio::time::{Duration, sleep};

fn manager(backend: Arc<FakeBackend>, publisher: Arc<RecordingPublisher>) -> ExecSessionManager {
    ExecSessionManager::new(backend, publisher, Duration::from_secs(2))
}

fn long_running(obey_terminate: bool) -> ExecScript {
    ExecScript {
        output: vec![ExecEvent::Stdout("started\n".into())],
        exit: None,
        obey_terminate,
        spawn_error: None,
    }
}

fn stopped_code(messages: &[PushMessage]) -> Option<Option<i32>> {
    messages.iter().find_map(|m| match m {
        PushMessage::Stopped { data, .. } => Some(data.code),
        _ => None,
    })
}

#[tokio::test(start_paused = true)]
async fn test_output_is_pushed_cumulatively_then_stopped() {
    let backend = Arc::new(FakeBackend::new());
    backend.set_exec(ExecScript {
        output: vec![
            ExecEvent::Stdout("a".into()),
            ExecEvent::Stderr("oops".into()),
            ExecEvent::Stdout("b".into()),
        ],
        exit: Some(0),
        ..Default::default()
    });
    let publisher = Arc::new(RecordingPublisher::default());
    let exec = manager(backend.clone(), publisher.clone());

    exec.start("c1", "abc", "ls -la");
    sleep(Duration::from_millis(10)).await;

    let out = |stdout: &str, stderr: &str, code: Option<i32>| ExecOutput {
        stdout: stdout.into(),
        stderr: stderr.into(),
        code,
    };
    let exec_msg = |data| PushMessage::Exec {
        container: "abc".into(),
        data,
    };
    assert_eq!(
        publisher.for_client("c1"),
        vec![
            exec_msg(out("a", "", None)),
            exec_msg(out("a", "oops", None)),
            exec_msg(out("ab", "oops", None)),
            PushMessage::Stopped {
                container: "abc".into(),
                data: out("ab", "oops", Some(0)),
            },
        ]
    );
    assert_eq!(exec.session_count(), 0);
    assert!(backend.called("container_exec abc ls -la"));
}

#[tokio::test(start_paused = true)]
async fn test_empty_command_is_ignored() {
    let backend = Arc::new(FakeBackend::new());
    let publisher = Arc::new(RecordingPublisher::default());
    let exec = manager(backend.clone(), publisher.clone());

    exec.start("c1", "abc", "   ");
    sleep(Duration::from_millis(10)).await;
    assert_eq!(exec.session_count(), 0);
    assert!(!backend.called("container_exec"));
    assert!(publisher.for_client("c1").is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_second_start_reattaches_instead_of_spawning() {
    let backend = Arc::new(FakeBackend::new());
    backend.set_exec(long_running(true));
    let publisher = Arc::new(RecordingPublisher::default());
    let exec = manager(backend.clone(), publisher.clone());

    exec.start("c1", "abc", "top");
    sleep(Duration::from_millis(10)).await;
    exec.start("c1", "abc", "top");
    sleep(Duration::from_millis(10)).await;

    let spawns = backend
        .calls()
        .iter()
        .filter(|c| c.starts_with("container_exec"))
        .count();
    assert_eq!(spawns, 1);
    assert_eq!(exec.session_count(), 1);
    assert_eq!(exec.state_of("c1"), Some(ExecState::Streaming));
}

#[tokio::test(start_paused = true)]
async fn test_sessions_of_different_clients_are_independent() {
    let backend = Arc::new(FakeBackend::new());
    backend.set_exec(long_running(true));
    let publisher = Arc::new(RecordingPublisher::default());
    let exec = manager(backend.clone(), publisher.clone());

    exec.start("c1", "abc", "top");
    exec.start("c2", "abc", "top");
    sleep(Duration::from_millis(10)).await;
    assert_eq!(exec.session_count(), 2);

    assert!(exec.terminate("c1", true, false));
    sleep(Duration::from_millis(10)).await;
    assert_eq!(exec.session_count(), 1);
    assert_eq!(exec.state_of("c2"), Some(ExecState::Streaming));
    assert!(stopped_code(&publisher.for_client("c2")).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_graceful_terminate_escalates_after_two_seconds() {
    let backend = Arc::new(FakeBackend::new());
    backend.set_exec(long_running(false));
    let publisher = Arc::new(RecordingPublisher::default());
    let exec = manager(backend.clone(), publisher.clone());

    exec.start("c1", "abc", "sleep 1000");
    sleep(Duration::from_millis(10)).await;
    assert!(exec.terminate("c1", false, false));
    assert_eq!(exec.state_of("c1"), Some(ExecState::Terminating));

    sleep(Duration::from_millis(1900)).await;
    assert_eq!(backend.signals(), vec![ExecSignal::Terminate]);
    assert!(stopped_code(&publisher.for_client("c1")).is_none());

    sleep(Duration::from_millis(200)).await;
    assert_eq!(backend.signals(), vec![ExecSignal::Terminate, ExecSignal::Kill]);
    assert_eq!(stopped_code(&publisher.for_client("c1")), Some(Some(-1)));
    assert_eq!(exec.session_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_force_terminate_skips_escalation() {
    let backend = Arc::new(FakeBackend::new());
    backend.set_exec(long_running(false));
    let publisher = Arc::new(RecordingPublisher::default());
    let exec = manager(backend.clone(), publisher.clone());

    exec.start("c1", "abc", "sleep 1000");
    sleep(Duration::from_millis(10)).await;
    assert!(exec.terminate("c1", true, false));
    sleep(Duration::from_millis(10)).await;

    assert_eq!(backend.signals(), vec![ExecSignal::Kill]);
    assert_eq!(stopped_code(&publisher.for_client("c1")), Some(Some(-1)));
    sleep(Duration::from_secs(5)).await;
    assert_eq!(backend.signals(), vec![ExecSignal::Kill]);
}

#[tokio::test(start_paused = true)]
async fn test_exit_before_deadline_clears_escalation() {
    let backend = Arc::new(FakeBackend::new());
    backend.set_exec(long_running(true));
    let publisher = Arc::new(RecordingPublisher::default());
    let exec = manager(backend.clone(), publisher.clone());

    exec.start("c1", "abc", "tail -f /var/log/app.log");
    sleep(Duration::from_millis(10)).await;
    assert!(exec.terminate("c1", false, false));
    sleep(Duration::from_millis(10)).await;
    assert_eq!(stopped_code(&publisher.for_client("c1")), Some(Some(143)));

    sleep(Duration::from_secs(5)).await;
    assert_eq!(backend.signals(), vec![ExecSignal::Terminate]);
}

#[tokio::test(start_paused = true)]
async fn test_terminate_without_session_returns_false() {
    let backend = Arc::new(FakeBackend::new());
    let publisher = Arc::new(RecordingPublisher::default());
    let exec = manager(backend, publisher);
    assert!(!exec.terminate("nobody", false, false));
    assert!(!exec.terminate("nobody", true, true));
}

#[tokio::test(start_paused = true)]
async fn test_spawn_failure_reports_synthetic_exit_code() {
    let backend = Arc::new(FakeBackend::new());
    backend.set_exec(ExecScript {
        spawn_error: Some("docker: executable file not found".into()),
        ..Default::default()
    });
    let publisher = Arc::new(RecordingPublisher::default());
    let exec = manager(backend, publisher.clone());

    exec.start("c1", "abc", "ls");
    sleep(Duration::from_millis(10)).await;

    let messages = publisher.for_client("c1");
    assert_eq!(messages.len(), 2, "{:?}", messages);
    match &messages[0] {
        PushMessage::Exec { container, data } => {
            assert_eq!(container, "abc");
            assert_eq!(data.code, Some(-1));
            assert!(data.stderr.contains("executable file not found"), "{}", data.stderr);
        }
        other => panic!("expected exec message, got {:?}", other),
    }
    match &messages[1] {
        PushMessage::Stopped { container, data } => {
            assert_eq!(container, "abc");
            assert_eq!(data.code, Some(-1));
            assert!(data.stderr.contains("executable file not found"), "{}", data.stderr);
        }
        other => panic!("expected stopped message, got {:?}", other),
    }
    assert_eq!(exec.session_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_suppressed_session_pushes_nothing_more() {
    let backend = Arc::new(FakeBackend::new());
    backend.set_exec(long_running(true));
    let publisher = Arc::new(RecordingPublisher::default());
    let exec = manager(backend.clone(), publisher.clone());

    exec.start("c1", "abc", "top");
    sleep(Duration::from_millis(10)).await;
    let before = publisher.for_client("c1").len();
    assert_eq!(before, 1);

    assert!(exec.terminate("c1", false, true));
    sleep(Duration::from_millis(10)).await;
    assert_eq!(publisher.for_client("c1").len(), before);
    assert_eq!(exec.session_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_kills_every_session() {
    let backend = Arc::new(FakeBackend::new());
    backend.set_exec(long_running(false));
    let publisher = Arc::new(RecordingPublisher::default());
    let exec = manager(backend.clone(), publisher.clone());

    exec.start("c1", "abc", "top");
    exec.start("c2", "def", "top");
    sleep(Duration::from_millis(10)).await;
    exec.shutdown();
    sleep(Duration::from_millis(10)).await;

    assert_eq!(exec.session_count(), 0);
    assert_eq!(backend.signals(), vec![ExecSignal::Kill, ExecSignal::Kill]);
    assert!(stopped_code(&publisher.for_client("c1")).is_none());
}

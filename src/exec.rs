// Interactive exec sessions, one per client.
//
// Lifecycle: Starting -> Streaming -> Terminating -> Exited. The escalation
// timer only exists in Terminating and is aborted on the way to Exited.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Duration;

use crate::docker_repo::{DockerBackend, ExecEvent, ExecHandle, ExecSignal};
use crate::hub::Publisher;
use crate::models::{ClientId, ExecOutput, PushMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecState {
    /// Backend call in progress; no process handle yet.
    Starting,
    Streaming,
    /// A terminate was requested; waiting for the process to exit.
    Terminating,
    Exited,
}

struct Session {
    generation: u64,
    container: String,
    state: ExecState,
    control: Option<mpsc::Sender<ExecSignal>>,
    /// Signal requested before the process handle existed.
    pending: Option<ExecSignal>,
    escalation: Option<JoinHandle<()>>,
    suppressed: bool,
}

impl Session {
    fn signal(&mut self, signal: ExecSignal) {
        match &self.control {
            Some(control) => {
                if let Err(e) = control.try_send(signal) {
                    tracing::debug!(container = %self.container, error = %e, "exec signal not delivered");
                }
            }
            None => {
                // Kill wins over Terminate.
                if self.pending != Some(ExecSignal::Kill) {
                    self.pending = Some(signal);
                }
            }
        }
    }

    fn clear_escalation(&mut self) {
        if let Some(timer) = self.escalation.take() {
            timer.abort();
        }
    }
}

type Sessions = Arc<Mutex<HashMap<ClientId, Session>>>;

fn lock(sessions: &Sessions) -> MutexGuard<'_, HashMap<ClientId, Session>> {
    sessions.lock().unwrap_or_else(|e| e.into_inner())
}

pub struct ExecSessionManager {
    backend: Arc<dyn DockerBackend>,
    publisher: Arc<dyn Publisher>,
    kill_timeout: Duration,
    sessions: Sessions,
    generation: AtomicU64,
}

impl ExecSessionManager {
    pub fn new(
        backend: Arc<dyn DockerBackend>,
        publisher: Arc<dyn Publisher>,
        kill_timeout: Duration,
    ) -> Self {
        Self {
            backend,
            publisher,
            kill_timeout,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
        }
    }

    /// Starts `command` in `container` for `client`. A client that already has
    /// a session keeps streaming it; no second process is spawned.
    pub fn start(&self, client: &str, container: &str, command: &str) {
        if command.trim().is_empty() {
            tracing::debug!(client_id = client, container, "empty exec command ignored");
            return;
        }
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        {
            let mut sessions = lock(&self.sessions);
            if let Some(existing) = sessions.get(client) {
                tracing::debug!(
                    client_id = client,
                    container = %existing.container,
                    state = ?existing.state,
                    "exec session already running; re-attached"
                );
                return;
            }
            sessions.insert(
                client.to_string(),
                Session {
                    generation,
                    container: container.to_string(),
                    state: ExecState::Starting,
                    control: None,
                    pending: None,
                    escalation: None,
                    suppressed: false,
                },
            );
        }
        tracing::info!(client_id = client, container, "exec session starting");

        let backend = self.backend.clone();
        let publisher = self.publisher.clone();
        let sessions = self.sessions.clone();
        let client = client.to_string();
        let container = container.to_string();
        let command = command.to_string();
        tokio::spawn(async move {
            match backend.container_exec(&container, &command).await {
                Ok(handle) => {
                    stream(handle, &sessions, publisher.as_ref(), &client, &container, generation)
                        .await
                }
                Err(e) => {
                    tracing::warn!(client_id = %client, container = %container, error = %e, "exec failed to start");
                    let output = ExecOutput {
                        stdout: String::new(),
                        stderr: e.to_string(),
                        code: Some(-1),
                    };
                    // Same shape as a process that exited: one output push, then stopped.
                    if !is_suppressed(&sessions, &client, generation) {
                        publisher.send(
                            &client,
                            PushMessage::Exec {
                                container: container.clone(),
                                data: output.clone(),
                            },
                        );
                    }
                    finish(&sessions, publisher.as_ref(), &client, &container, generation, output);
                }
            }
        });
    }

    /// Returns false when `client` has no session. A graceful terminate arms a
    /// timer that force-kills after the kill timeout; `force` kills at once.
    /// `suppress` stops all further pushes for the session, including the final one.
    pub fn terminate(&self, client: &str, force: bool, suppress: bool) -> bool {
        let mut sessions = lock(&self.sessions);
        let Some(session) = sessions.get_mut(client) else {
            return false;
        };
        if suppress {
            session.suppressed = true;
        }
        if force {
            session.clear_escalation();
            session.signal(ExecSignal::Kill);
            session.state = ExecState::Terminating;
            tracing::info!(client_id = client, container = %session.container, "exec session killed");
            return true;
        }
        if session.escalation.is_some() {
            return true;
        }
        session.signal(ExecSignal::Terminate);
        session.state = ExecState::Terminating;
        let generation = session.generation;
        let sessions_ref = self.sessions.clone();
        let client_id = client.to_string();
        let kill_timeout = self.kill_timeout;
        session.escalation = Some(tokio::spawn(async move {
            tokio::time::sleep(kill_timeout).await;
            let mut sessions = lock(&sessions_ref);
            if let Some(session) = sessions.get_mut(&client_id) {
                if session.generation == generation {
                    tracing::info!(
                        client_id = %client_id,
                        container = %session.container,
                        "exec session did not exit in time; killing"
                    );
                    session.escalation = None;
                    session.signal(ExecSignal::Kill);
                }
            }
        }));
        tracing::info!(client_id = client, container = %session.container, "exec session terminating");
        true
    }

    pub fn state_of(&self, client: &str) -> Option<ExecState> {
        lock(&self.sessions).get(client).map(|s| s.state)
    }

    pub fn session_count(&self) -> usize {
        lock(&self.sessions).len()
    }

    /// Force-kills every session without further pushes.
    pub fn shutdown(&self) {
        let clients: Vec<ClientId> = lock(&self.sessions).keys().cloned().collect();
        for client in clients {
            self.terminate(&client, true, true);
        }
    }
}

async fn stream(
    mut handle: ExecHandle,
    sessions: &Sessions,
    publisher: &dyn Publisher,
    client: &str,
    container: &str,
    generation: u64,
) {
    {
        let mut sessions = lock(sessions);
        let Some(session) = sessions.get_mut(client).filter(|s| s.generation == generation) else {
            return;
        };
        session.control = Some(handle.control.clone());
        match session.pending.take() {
            Some(signal) => session.signal(signal),
            None => session.state = ExecState::Streaming,
        }
    }

    let mut output = ExecOutput::default();
    while let Some(event) = handle.events.recv().await {
        match event {
            ExecEvent::Stdout(chunk) => output.stdout.push_str(&chunk),
            ExecEvent::Stderr(chunk) => output.stderr.push_str(&chunk),
            ExecEvent::Exited(code) => {
                output.code = Some(code);
                break;
            }
        }
        if !is_suppressed(sessions, client, generation) {
            publisher.send(
                client,
                PushMessage::Exec {
                    container: container.to_string(),
                    data: output.clone(),
                },
            );
        }
    }
    if output.code.is_none() {
        output.code = Some(-1);
    }
    finish(sessions, publisher, client, container, generation, output);
}

fn is_suppressed(sessions: &Sessions, client: &str, generation: u64) -> bool {
    lock(sessions)
        .get(client)
        .filter(|s| s.generation == generation)
        .is_none_or(|s| s.suppressed)
}

/// Exited transition: drops the session and its timer, then sends the final message.
fn finish(
    sessions: &Sessions,
    publisher: &dyn Publisher,
    client: &str,
    container: &str,
    generation: u64,
    output: ExecOutput,
) {
    let suppressed = {
        let mut sessions = lock(sessions);
        let current = sessions
            .get(client)
            .is_some_and(|s| s.generation == generation);
        if !current {
            return;
        }
        match sessions.remove(client) {
            Some(mut session) => {
                session.clear_escalation();
                session.state = ExecState::Exited;
                session.suppressed
            }
            None => true,
        }
    };
    tracing::info!(client_id = client, container, code = ?output.code, "exec session exited");
    if !suppressed {
        publisher.send(
            client,
            PushMessage::Stopped {
                container: container.to_string(),
                data: output,
            },
        );
    }
}

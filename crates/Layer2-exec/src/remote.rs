//! Remote backend - client of the sandboxed executor server
//!
//! One lazily opened WebSocket carries every job of this client. Outgoing
//! frames go through a writer task; a reader task routes incoming frames to
//! the owning job by `jobId`. When the connection drops, every in-flight job
//! receives a connection diagnostic and `Exit(1)` and the next job reconnects.

use crate::backend::ExecutionBackend;
use crate::job::{ExecutionHandle, ExecutionRequest, JobControl, JobSink, JobStream};
use futures::{SinkExt, StreamExt};
use orbit_foundation::{BackendId, ClientMessage, Error, JobId, Result, ServerMessage};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

/// In-flight job: where its output goes and how to release its forwarder
struct Pending {
    sink: JobSink,
    done: CancellationToken,
}

type JobTable = Arc<Mutex<HashMap<JobId, Pending>>>;

/// Live connection
#[derive(Clone)]
struct Connection {
    outgoing: mpsc::UnboundedSender<ClientMessage>,
    alive: CancellationToken,
}

/// Execution backend that forwards jobs to a remote executor
pub struct RemoteBackend {
    url: String,
    connection: Arc<tokio::sync::Mutex<Option<Connection>>>,
    jobs: JobTable,
}

impl RemoteBackend {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connection: Arc::new(tokio::sync::Mutex::new(None)),
            jobs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Number of jobs waiting for their `exit`
    pub fn in_flight(&self) -> usize {
        self.jobs.lock().len()
    }
}

impl ExecutionBackend for RemoteBackend {
    fn id(&self) -> BackendId {
        BackendId::Remote
    }

    fn run(&self, request: ExecutionRequest) -> (ExecutionHandle, JobStream) {
        let (handle, control) = ExecutionHandle::pair(request.job_id);
        let (sink, stream) = JobSink::channel();
        let span = info_span!(
            "remote",
            job_id = %request.job_id,
            session_id = %request.session_id
        );
        let url = self.url.clone();
        let connection = Arc::clone(&self.connection);
        let jobs = Arc::clone(&self.jobs);

        tokio::spawn(
            async move {
                let conn = match connect(&url, &connection, &jobs).await {
                    Ok(conn) => conn,
                    Err(err) => {
                        warn!("{}", err);
                        return sink.fail(&err);
                    }
                };
                forward(conn, request, control, sink, jobs).await;
            }
            .instrument(span),
        );

        (handle, stream)
    }
}

/// Reuse the live connection or open a new one
async fn connect(
    url: &str,
    slot: &tokio::sync::Mutex<Option<Connection>>,
    jobs: &JobTable,
) -> Result<Connection> {
    let mut slot = slot.lock().await;
    if let Some(conn) = slot.as_ref() {
        if !conn.alive.is_cancelled() {
            return Ok(conn.clone());
        }
    }

    let (ws, _resp) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|e| Error::Connection(format!("Connection failed: {}", e)))?;
    info!(%url, "connected to remote executor");
    let (mut ws_tx, mut ws_rx) = ws.split();

    let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<ClientMessage>();
    let alive = CancellationToken::new();

    // writer
    let writer_alive = alive.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = writer_alive.cancelled() => break,
                msg = outgoing_rx.recv() => {
                    let Some(msg) = msg else { break };
                    let text = match serde_json::to_string(&msg) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("failed to encode frame: {}", e);
                            continue;
                        }
                    };
                    if ws_tx.send(Message::Text(text.into())).await.is_err() {
                        writer_alive.cancel();
                        break;
                    }
                }
            }
        }
        let _ = ws_tx.close().await;
    });

    // reader
    let reader_alive = alive.clone();
    let jobs = Arc::clone(jobs);
    tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                _ = reader_alive.cancelled() => break,
                frame = ws_rx.next() => frame,
            };
            match frame {
                Some(Ok(msg)) if msg.is_text() => match msg.to_text() {
                    Ok(text) => dispatch(&jobs, text),
                    Err(e) => warn!("invalid text frame: {}", e),
                },
                Some(Ok(msg)) if msg.is_close() => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("remote executor connection error: {}", e);
                    break;
                }
                None => break,
            }
        }
        reader_alive.cancel();
        fail_all(&jobs, "Connection failed: remote executor closed the connection");
    });

    let conn = Connection { outgoing, alive };
    *slot = Some(conn.clone());
    Ok(conn)
}

/// Route one server frame to its job
fn dispatch(jobs: &JobTable, text: &str) {
    let msg: ServerMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!("malformed frame from remote executor: {}", e);
            return;
        }
    };

    let mut jobs = jobs.lock();
    match msg {
        ServerMessage::Stdout { job_id, data } => match jobs.get(&job_id) {
            Some(job) => job.sink.stdout(data),
            None => debug!(%job_id, "stdout for unknown job"),
        },
        ServerMessage::Stderr { job_id, data } => match jobs.get(&job_id) {
            Some(job) => job.sink.stderr(data),
            None => debug!(%job_id, "stderr for unknown job"),
        },
        ServerMessage::Exit { job_id, code } => match jobs.remove(&job_id) {
            Some(job) => {
                job.done.cancel();
                job.sink.exit(code);
            }
            None => debug!(%job_id, "exit for unknown job"),
        },
    }
}

fn fail_all(jobs: &JobTable, message: &str) {
    let pending: Vec<(JobId, Pending)> = jobs.lock().drain().collect();
    for (job_id, job) in pending {
        debug!(%job_id, "failing in-flight job");
        job.done.cancel();
        job.sink.fail(&Error::Connection(message.to_string()));
    }
}

/// Register the job, send `execute`, then relay stdin and kill until the
/// job's `exit` arrives (or the connection dies)
async fn forward(
    conn: Connection,
    request: ExecutionRequest,
    mut control: JobControl,
    sink: JobSink,
    jobs: JobTable,
) {
    let job_id = request.job_id;
    let done = CancellationToken::new();
    jobs.lock().insert(
        job_id,
        Pending {
            sink,
            done: done.clone(),
        },
    );

    let execute = ClientMessage::Execute {
        job_id,
        entry_path: request.entry_path.clone(),
        workspace_snapshot: request.workspace_snapshot.to_nodes(),
    };
    if conn.outgoing.send(execute).is_err() || conn.alive.is_cancelled() {
        if let Some(job) = jobs.lock().remove(&job_id) {
            job.sink
                .fail(&Error::Connection("Connection failed: remote executor unavailable".into()));
        }
        return;
    }
    info!(entry = %request.entry_path, "job sent to remote executor");

    let mut kill_sent = false;
    loop {
        tokio::select! {
            _ = done.cancelled() => break,
            _ = control.cancel.cancelled(), if !kill_sent => {
                kill_sent = true;
                let _ = conn.outgoing.send(ClientMessage::Kill { job_id });
            }
            data = control.stdin.recv() => match data {
                Some(bytes) => {
                    let data = String::from_utf8_lossy(&bytes).into_owned();
                    let _ = conn.outgoing.send(ClientMessage::Stdin { job_id, data });
                }
                None => {
                    // handle dropped; keep waiting for exit
                    done.cancelled().await;
                    break;
                }
            },
        }
    }
}

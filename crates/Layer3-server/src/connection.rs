//! One client connection of the remote executor
//!
//! A connection owns at most one active job. A new `execute` replaces it:
//! the running job is killed and its `exit` is flushed before the next
//! workspace is provisioned. `stdin` and `kill` frames naming any other job
//! are ignored. Closing the connection kills the active job; its workspace
//! is still removed by the sandbox.

use crate::state::AppState;
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use orbit_exec::{ExecEvent, ExecutionHandle, ExecutionRequest, JobStream, Utf8Chunker};
use orbit_foundation::{BackendId, ClientMessage, Error, FsNode, JobId, ServerMessage, Vfs};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument};

/// How long a replaced job may take to report its exit
const REPLACE_GRACE: Duration = Duration::from_secs(5);

struct ActiveJob {
    job_id: JobId,
    handle: ExecutionHandle,
    forwarder: JoinHandle<()>,
}

pub(crate) struct Connection {
    id: String,
    state: AppState,
    outgoing: mpsc::UnboundedSender<ServerMessage>,
    active: Option<ActiveJob>,
}

/// Serve one upgraded socket until the client goes away
pub(crate) async fn serve(socket: WebSocket, state: AppState) {
    let id = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();
    let span = info_span!("connection", conn = %id);
    async move {
        info!("client connected");
        let (mut ws_tx, mut ws_rx) = socket.split();
        let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<ServerMessage>();

        let writer = tokio::spawn(async move {
            while let Some(msg) = outgoing_rx.recv().await {
                let text = match serde_json::to_string(&msg) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("failed to encode frame: {}", e);
                        continue;
                    }
                };
                if ws_tx.send(Message::Text(text.into())).await.is_err() {
                    debug!("client stopped reading");
                    break;
                }
            }
            let _ = ws_tx.close().await;
        });

        let mut conn = Connection {
            id,
            state,
            outgoing,
            active: None,
        };

        while let Some(frame) = ws_rx.next().await {
            match frame {
                Ok(Message::Text(text)) => conn.handle_frame(text.as_str()).await,
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!("connection error: {}", e);
                    break;
                }
            }
        }

        conn.shutdown().await;
        if tokio::time::timeout(REPLACE_GRACE, writer).await.is_err() {
            debug!("writer still draining after close");
        }
        info!("client disconnected");
    }
    .instrument(span)
    .await
}

impl Connection {
    async fn handle_frame(&mut self, text: &str) {
        let msg: ClientMessage = match serde_json::from_str(text) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("malformed client frame: {}", e);
                return;
            }
        };

        match msg {
            ClientMessage::Execute {
                job_id,
                entry_path,
                workspace_snapshot,
            } => {
                self.replace_active().await;
                self.execute(job_id, entry_path, workspace_snapshot);
            }
            ClientMessage::Stdin { job_id, data } => match &self.active {
                Some(job) if job.job_id == job_id => {
                    if !job.handle.write(data) {
                        debug!(%job_id, "stdin after the job stopped reading");
                    }
                }
                _ => debug!(%job_id, "stdin for inactive job ignored"),
            },
            ClientMessage::Kill { job_id } => match &self.active {
                Some(job) if job.job_id == job_id => {
                    info!(%job_id, "kill requested by client");
                    job.handle.kill();
                }
                _ => debug!(%job_id, "kill for inactive job ignored"),
            },
        }
    }

    /// Kill the running job and wait for its exit to be forwarded
    async fn replace_active(&mut self) {
        let Some(prev) = self.active.take() else {
            return;
        };
        info!(job_id = %prev.job_id, "replacing running job");
        prev.handle.kill();
        if tokio::time::timeout(REPLACE_GRACE, prev.forwarder).await.is_err() {
            warn!(job_id = %prev.job_id, "replaced job did not exit in time");
        }
    }

    fn execute(&mut self, job_id: JobId, entry_path: String, snapshot: Vec<FsNode>) {
        let vfs = match Vfs::from_nodes(&snapshot) {
            Ok(vfs) => vfs,
            Err(err) => {
                warn!(%job_id, "invalid workspace snapshot: {}", err);
                self.reject(job_id, &err);
                return;
            }
        };

        info!(%job_id, entry = %entry_path, "execute");
        let request = ExecutionRequest::new(BackendId::Remote, entry_path, Arc::new(vfs))
            .with_job_id(job_id)
            .with_session(self.id.clone());
        let (handle, stream) = self.state.sandbox.spawn(request);
        let forwarder = tokio::spawn(forward(job_id, stream, self.outgoing.clone()));

        self.active = Some(ActiveJob {
            job_id,
            handle,
            forwarder,
        });
    }

    fn reject(&self, job_id: JobId, err: &Error) {
        if let Some(data) = err.diagnostic() {
            let _ = self.outgoing.send(ServerMessage::Stderr { job_id, data });
        }
        let _ = self.outgoing.send(ServerMessage::Exit {
            job_id,
            code: err.exit_code(),
        });
    }

    /// Client gone: kill the active job and let it clean up
    async fn shutdown(mut self) {
        if let Some(job) = self.active.take() {
            info!(job_id = %job.job_id, "killing job of closed connection");
            job.handle.kill();
            if tokio::time::timeout(REPLACE_GRACE, job.forwarder).await.is_err() {
                warn!(job_id = %job.job_id, "job of closed connection did not exit in time");
            }
        }
    }
}

/// Relay one job's stream as protocol messages, stopping after `exit`
async fn forward(job_id: JobId, mut stream: JobStream, outgoing: mpsc::UnboundedSender<ServerMessage>) {
    let mut stdout = Utf8Chunker::new();
    let mut stderr = Utf8Chunker::new();

    while let Some(event) = stream.recv().await {
        let msg = match event {
            ExecEvent::Stdout(bytes) => {
                let data = stdout.push(&bytes);
                if data.is_empty() {
                    continue;
                }
                ServerMessage::Stdout { job_id, data }
            }
            ExecEvent::Stderr(bytes) => {
                let data = stderr.push(&bytes);
                if data.is_empty() {
                    continue;
                }
                ServerMessage::Stderr { job_id, data }
            }
            ExecEvent::Exit(code) => {
                let rest = stdout.finish();
                if !rest.is_empty() {
                    let _ = outgoing.send(ServerMessage::Stdout { job_id, data: rest });
                }
                let rest = stderr.finish();
                if !rest.is_empty() {
                    let _ = outgoing.send(ServerMessage::Stderr { job_id, data: rest });
                }
                info!(%job_id, code, "job exited");
                let _ = outgoing.send(ServerMessage::Exit { job_id, code });
                return;
            }
        };
        if outgoing.send(msg).is_err() {
            debug!(%job_id, "connection writer gone");
        }
    }
}

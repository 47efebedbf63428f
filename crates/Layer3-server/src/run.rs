//! `POST /run`: one-shot execution with the combined output in the reply

use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use orbit_exec::{job, ExecutionHandle, ExecutionRequest};
use orbit_foundation::{BackendId, JobId, RunRequest, RunResponse, Vfs};
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) async fn run(
    State(state): State<AppState>,
    Json(req): Json<RunRequest>,
) -> (StatusCode, Json<RunResponse>) {
    let (Some(snapshot), Some(entry_path)) = (req.workspace_snapshot, req.entry_path) else {
        return bad_request("workspaceSnapshot and entryPath are required");
    };
    let vfs = match Vfs::from_nodes(&snapshot) {
        Ok(vfs) => vfs,
        Err(err) => {
            warn!("invalid workspace snapshot: {}", err);
            return bad_request(err.to_string());
        }
    };

    let job_id = JobId::new();
    info!(%job_id, entry = %entry_path, "one-shot run");
    let request = ExecutionRequest::new(BackendId::Remote, entry_path, Arc::new(vfs))
        .with_job_id(job_id)
        .with_session("run");
    let (handle, stream) = state.sandbox.spawn(request);
    // hyper drops this future when the client disconnects mid-request
    let guard = KillOnDrop(Some(handle));
    let (output, code) = job::collect(stream).await;
    guard.disarm();

    if code == 0 {
        (StatusCode::OK, Json(RunResponse::ok(output)))
    } else {
        let error = if output.is_empty() {
            format!("process exited with code {}", code)
        } else {
            output
        };
        (StatusCode::INTERNAL_SERVER_ERROR, Json(RunResponse::failed(error)))
    }
}

/// Kills the job unless disarmed after it exits
struct KillOnDrop(Option<ExecutionHandle>);

impl KillOnDrop {
    fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for KillOnDrop {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            info!(job_id = %handle.job_id(), "client went away, killing one-shot job");
            handle.kill();
        }
    }
}

fn bad_request(error: impl Into<String>) -> (StatusCode, Json<RunResponse>) {
    (StatusCode::BAD_REQUEST, Json(RunResponse::failed(error)))
}

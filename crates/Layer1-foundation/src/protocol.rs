//! Wire protocol between terminal clients and the remote executor
//!
//! JSON text frames, tagged by `type`. Every streaming message names the job
//! it belongs to so a just-killed job can never be confused with its
//! replacement.

use crate::vfs::FsNode;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Job identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Client → server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    Execute {
        job_id: JobId,
        entry_path: String,
        workspace_snapshot: Vec<FsNode>,
    },

    #[serde(rename_all = "camelCase")]
    Stdin { job_id: JobId, data: String },

    #[serde(rename_all = "camelCase")]
    Kill { job_id: JobId },
}

/// Server → client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    Stdout { job_id: JobId, data: String },

    #[serde(rename_all = "camelCase")]
    Stderr { job_id: JobId, data: String },

    #[serde(rename_all = "camelCase")]
    Exit { job_id: JobId, code: i32 },
}

impl ServerMessage {
    pub fn job_id(&self) -> JobId {
        match self {
            ServerMessage::Stdout { job_id, .. }
            | ServerMessage::Stderr { job_id, .. }
            | ServerMessage::Exit { job_id, .. } => *job_id,
        }
    }
}

/// `POST /run` body. Fields are optional so a missing one can be reported
/// as a bad request instead of a decode failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    #[serde(default)]
    pub workspace_snapshot: Option<Vec<FsNode>>,
    #[serde(default)]
    pub entry_path: Option<String>,
}

/// `POST /run` response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunResponse {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: Some(output.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_execute_wire_shape() {
        let id = JobId::new();
        let raw = json!({
            "type": "execute",
            "jobId": id.0.to_string(),
            "entryPath": "/main.py",
            "workspaceSnapshot": [{
                "type": "folder", "name": "/", "path": "/",
                "children": [{"type": "file", "name": "main.py", "path": "/main.py", "content": "print(1)"}]
            }]
        });
        let msg: ClientMessage = serde_json::from_value(raw).unwrap();
        match msg {
            ClientMessage::Execute {
                job_id,
                entry_path,
                workspace_snapshot,
            } => {
                assert_eq!(job_id, id);
                assert_eq!(entry_path, "/main.py");
                assert_eq!(workspace_snapshot[0].children.as_ref().unwrap().len(), 1);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_server_message_tags() {
        let id = JobId::new();
        let exit = serde_json::to_value(ServerMessage::Exit { job_id: id, code: 1 }).unwrap();
        assert_eq!(exit["type"], "exit");
        assert_eq!(exit["code"], 1);
        assert_eq!(exit["jobId"], id.0.to_string());

        let out = serde_json::to_value(ServerMessage::Stdout {
            job_id: id,
            data: "hi\n".into(),
        })
        .unwrap();
        assert_eq!(out["type"], "stdout");
        assert_eq!(out["data"], "hi\n");
    }

    #[test]
    fn test_run_request_missing_fields() {
        let req: RunRequest = serde_json::from_str(r#"{"entryPath":"/a.py"}"#).unwrap();
        assert!(req.workspace_snapshot.is_none());
        assert_eq!(req.entry_path.as_deref(), Some("/a.py"));
    }

    #[test]
    fn test_run_response_shape() {
        let ok = serde_json::to_value(RunResponse::ok("out")).unwrap();
        assert_eq!(ok, json!({"success": true, "output": "out"}));
        let failed = serde_json::to_value(RunResponse::failed("boom")).unwrap();
        assert_eq!(failed, json!({"success": false, "error": "boom"}));
    }
}

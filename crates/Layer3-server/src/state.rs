//! Shared server state

use orbit_exec::{Sandbox, ToolchainTable};
use orbit_foundation::OrbitConfig;
use std::path::PathBuf;
use std::sync::Arc;

/// State cloned into every request handler
#[derive(Debug, Clone)]
pub struct AppState {
    pub sandbox: Arc<Sandbox>,
    /// Largest accepted WebSocket frame (snapshots travel inline)
    pub max_message_bytes: usize,
}

impl AppState {
    pub fn new(sandbox: Sandbox) -> Self {
        Self {
            sandbox: Arc::new(sandbox),
            max_message_bytes: OrbitConfig::default().server.max_message_bytes(),
        }
    }

    pub fn from_config(config: &OrbitConfig) -> Self {
        let toolchains = Arc::new(ToolchainTable::from_config(config));
        let sandbox = Sandbox::new(config.server.workspace_root(), toolchains);
        Self {
            sandbox: Arc::new(sandbox),
            max_message_bytes: config.server.max_message_bytes(),
        }
    }

    pub fn with_max_message_bytes(mut self, bytes: usize) -> Self {
        self.max_message_bytes = bytes;
        self
    }

    pub fn workspace_root(&self) -> PathBuf {
        self.sandbox.root().to_path_buf()
    }
}

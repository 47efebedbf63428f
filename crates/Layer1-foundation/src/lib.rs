//! # orbit-foundation
//!
//! Foundation layer for Orbit:
//! - Error: 공통 에러 분류 (Validation, Path, Spawn, Compile, ...)
//! - Config: 통합 설정 (OrbitConfig, 설정 계층, 툴체인 테이블, 라우팅)
//! - Vfs: 공유 가상 파일 트리 (copy-on-write)
//! - Protocol: 원격 실행기 와이어 메시지
//!
//! ## 아키텍처
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │  Terminal Sessions ──► Command Router                │
//! │                           │                          │
//! │            ┌──────────────┼──────────────┐           │
//! │            ▼              ▼              ▼           │
//! │     Interpreter      Compiled         Remote         │
//! │     (embedded)       (embedded)     (WebSocket)      │
//! │            └──────────────┼──────────────┘           │
//! │                           ▼                          │
//! │                   VfsStore (snapshot)                │
//! └──────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod protocol;
pub mod vfs;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result, CANCELLED_EXIT_CODE};

// ============================================================================
// Config (설정)
// ============================================================================
pub use config::{
    BackendId, ClientConfig, ConfigLayer, ConfigScope, OrbitConfig, ServerConfig, ToolchainKind,
    ToolchainSpec, CURRENT_CONFIG_VERSION, ORBIT_CONFIG_FILE,
};

// ============================================================================
// VFS (가상 파일 시스템)
// ============================================================================
pub use vfs::{FsNode, NodeKind, NodeRef, Vfs, VfsStore};

// ============================================================================
// Protocol (와이어 메시지)
// ============================================================================
pub use protocol::{ClientMessage, JobId, RunRequest, RunResponse, ServerMessage};

//! # orbit-terminal
//!
//! 멀티 세션 터미널 레이어:
//! - Session: 세션별 cwd, 입력 모드(PROMPT / EXECUTING), 라인/입력 버퍼
//! - Router: 한 줄 파싱 → builtin 실행 또는 백엔드 디스패치
//! - Manager: 세션 생성/종료, 키 입력 처리, 작업 이벤트 반영
//! - Vcs: 버전 관리 협력자 (표시 전용 상태 마커)
//!
//! ## 데이터 흐름
//!
//! ```text
//! keystroke ─► TerminalManager::handle_input
//!                 │ Enter (PROMPT)
//!                 ▼
//!           CommandRouter::route ──► builtin ──► VfsStore::update
//!                 │ runtime command
//!                 ▼
//!           BackendRegistry::run ──► JobStream ──► JobEvent ──► TerminalEvent
//! ```

pub mod manager;
pub mod router;
pub mod session;
pub mod style;
pub mod vcs;

pub use manager::{JobEvent, TerminalEvent, TerminalManager};
pub use router::{Command, CommandRouter, Dispatch, Routed};
pub use session::{ActiveJob, InputMode, SessionId, TerminalSession};
pub use style::{Color, Palette};
pub use vcs::{Credentials, UnavailableVcs, VcsCollaborator, VcsOutcome, VcsRequest};

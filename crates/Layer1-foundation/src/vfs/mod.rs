//! Virtual file system
//!
//! - `path`: 경로 정규화 / 해석
//! - `tree`: copy-on-write 트리 ([`Vfs`], [`FsNode`])
//! - `store`: 변경 알림을 가진 공유 소유자 ([`VfsStore`])

pub mod path;
mod store;
mod tree;

pub use store::VfsStore;
pub use tree::{FsNode, NodeKind, NodeRef, Vfs};

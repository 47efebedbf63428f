//! Config - 통합 설정 관리
//!
//! - `orbit.rs` - OrbitConfig 통합 설정 (server / client / toolchains / routes)
//! - `layer.rs` - 글로벌 / 프로젝트 설정 파일과 버전 업그레이드
//! - `toolchain.rs` - 확장자별 툴체인 및 백엔드 라우팅 타입

mod layer;
mod orbit;
mod toolchain;

pub use layer::{ConfigLayer, ConfigScope, CURRENT_CONFIG_VERSION, ORBIT_CONFIG_FILE};
pub use orbit::{ClientConfig, OrbitConfig, ServerConfig};
pub use toolchain::{BackendId, ToolchainKind, ToolchainSpec};

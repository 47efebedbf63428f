//! Orbit Config - 통합 설정
//!
//! 글로벌 설정과 프로젝트 설정을 병합해서 사용하는 OrbitConfig

use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use super::layer::{ConfigLayer, CURRENT_CONFIG_VERSION};
use super::{BackendId, ToolchainSpec};

const DEFAULT_BIND: &str = "127.0.0.1:3001";
const DEFAULT_SERVER_URL: &str = "ws://127.0.0.1:3001/ws";
const DEFAULT_PROMPT_USER: &str = "orbit";
const DEFAULT_MAX_MESSAGE_BYTES: usize = 16 * 1024 * 1024;

// ============================================================================
// Orbit Config (통합)
// ============================================================================

/// Orbit 통합 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrbitConfig {
    /// 버전 (마이그레이션용)
    #[serde(default = "default_version")]
    pub version: u32,

    /// 원격 실행 서버 설정
    #[serde(default)]
    pub server: ServerConfig,

    /// 터미널 클라이언트 설정
    #[serde(default)]
    pub client: ClientConfig,

    /// 확장자 → 툴체인 (내장 테이블 override)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub toolchains: BTreeMap<String, ToolchainSpec>,

    /// 확장자 → 백엔드 (기본 라우팅 override)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub routes: BTreeMap<String, BackendId>,
}

impl Default for OrbitConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            server: ServerConfig::default(),
            client: ClientConfig::default(),
            toolchains: BTreeMap::new(),
            routes: BTreeMap::new(),
        }
    }
}

impl OrbitConfig {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Load
    // ========================================================================

    /// 글로벌 + 프로젝트 병합 로드
    pub fn load() -> Result<Self> {
        Self::load_layers(&ConfigLayer::discover())
    }

    /// 주어진 계층들을 순서대로 병합 (뒤가 우선)
    pub fn load_layers(layers: &[ConfigLayer]) -> Result<Self> {
        let mut config = Self::new();
        for layer in layers {
            if let Some(found) = layer.read()? {
                tracing::debug!(scope = %layer.scope(), path = %layer.path().display(), "config loaded");
                config.merge(found);
            }
        }
        Ok(config)
    }

    // ========================================================================
    // Merge
    // ========================================================================

    /// 다른 설정과 병합 (other가 우선)
    pub fn merge(&mut self, other: OrbitConfig) {
        self.version = self.version.max(other.version);
        self.server.merge(other.server);
        self.client.merge(other.client);
        self.toolchains.extend(other.toolchains);
        self.routes.extend(other.routes);
    }

    // ========================================================================
    // Builder
    // ========================================================================

    pub fn bind(mut self, bind: impl Into<String>) -> Self {
        self.server.bind = Some(bind.into());
        self
    }

    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.client.server_url = Some(url.into());
        self
    }

    pub fn workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.server.workspace_root = Some(root.into());
        self
    }
}

// ============================================================================
// Server Config
// ============================================================================

/// 원격 실행 서버 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// 바인드 주소
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,

    /// 작업별 임시 디렉토리가 만들어지는 위치
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,

    /// WebSocket 메시지 최대 크기
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_message_bytes: Option<usize>,
}

impl ServerConfig {
    pub fn bind(&self) -> &str {
        self.bind.as_deref().unwrap_or(DEFAULT_BIND)
    }

    pub fn workspace_root(&self) -> PathBuf {
        self.workspace_root
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }

    pub fn max_message_bytes(&self) -> usize {
        self.max_message_bytes.unwrap_or(DEFAULT_MAX_MESSAGE_BYTES)
    }

    fn merge(&mut self, other: ServerConfig) {
        if other.bind.is_some() {
            self.bind = other.bind;
        }
        if other.workspace_root.is_some() {
            self.workspace_root = other.workspace_root;
        }
        if other.max_message_bytes.is_some() {
            self.max_message_bytes = other.max_message_bytes;
        }
    }
}

// ============================================================================
// Client Config
// ============================================================================

/// 터미널 클라이언트 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// 원격 실행 서버 WebSocket 주소
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_url: Option<String>,

    /// 프롬프트에 표시되는 사용자 이름
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,

    /// ANSI 색상 사용 여부
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<bool>,

    /// 내장 JavaScript 엔진 힙 상한 (바이트, 없으면 무제한)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script_memory_limit: Option<usize>,
}

impl ClientConfig {
    pub fn server_url(&self) -> &str {
        self.server_url.as_deref().unwrap_or(DEFAULT_SERVER_URL)
    }

    pub fn prompt(&self) -> &str {
        self.prompt.as_deref().unwrap_or(DEFAULT_PROMPT_USER)
    }

    pub fn color(&self) -> bool {
        self.color.unwrap_or(true)
    }

    fn merge(&mut self, other: ClientConfig) {
        if other.server_url.is_some() {
            self.server_url = other.server_url;
        }
        if other.prompt.is_some() {
            self.prompt = other.prompt;
        }
        if other.color.is_some() {
            self.color = other.color;
        }
        if other.script_memory_limit.is_some() {
            self.script_memory_limit = other.script_memory_limit;
        }
    }
}

fn default_version() -> u32 {
    CURRENT_CONFIG_VERSION
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ToolchainKind;

    #[test]
    fn test_defaults() {
        let config = OrbitConfig::default();
        assert_eq!(config.server.bind(), "127.0.0.1:3001");
        assert_eq!(config.client.server_url(), "ws://127.0.0.1:3001/ws");
        assert_eq!(config.client.prompt(), "orbit");
        assert!(config.client.color());
    }

    #[test]
    fn test_merge_project_wins() {
        let mut global = OrbitConfig::new().bind("0.0.0.0:9000");
        global.client.prompt = Some("me".to_string());

        let mut project = OrbitConfig::new().server_url("ws://sandbox:3001/ws");
        project.client.color = Some(false);
        project.client.script_memory_limit = Some(8 << 20);
        project
            .routes
            .insert("go".to_string(), BackendId::Remote);

        global.merge(project);
        assert_eq!(global.server.bind(), "0.0.0.0:9000");
        assert_eq!(global.client.server_url(), "ws://sandbox:3001/ws");
        assert_eq!(global.client.prompt(), "me");
        assert!(!global.client.color());
        assert_eq!(global.client.script_memory_limit, Some(8 << 20));
        assert_eq!(global.routes.get("go"), Some(&BackendId::Remote));
    }

    #[test]
    fn test_parse_camel_case_file() {
        let json = r#"{
            "server": { "workspaceRoot": "/srv/orbit" },
            "toolchains": {
                "rs": { "kind": "compiled", "compile": ["rustc", "{entry}", "-o", "{bin}"], "run": ["{bin}"] }
            },
            "routes": { "rs": "remote" }
        }"#;
        let config: OrbitConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.version, 1);
        assert_eq!(config.server.workspace_root(), PathBuf::from("/srv/orbit"));
        let rs = config.toolchains.get("rs").unwrap();
        assert_eq!(rs.kind, ToolchainKind::Compiled);
        assert_eq!(rs.run, vec!["{bin}".to_string()]);
        assert_eq!(config.routes.get("rs"), Some(&BackendId::Remote));
    }

    #[test]
    fn test_default_matches_empty_file() {
        let parsed: OrbitConfig = serde_json::from_str("{}").unwrap();
        let built = OrbitConfig::default();
        assert_eq!(built.version, CURRENT_CONFIG_VERSION);
        assert_eq!(built.version, parsed.version);
        assert_eq!(
            serde_json::to_value(&built).unwrap(),
            serde_json::to_value(&parsed).unwrap()
        );
    }

    #[test]
    fn test_load_layers_project_wins() {
        let home = tempfile::tempdir().unwrap();
        let project = tempfile::tempdir().unwrap();
        let outer = ConfigLayer::project(home.path());
        let inner = ConfigLayer::project(project.path());

        let mut global = OrbitConfig::new().bind("10.0.0.1:1");
        global.client.prompt = Some("ada".to_string());
        outer.write(&global).unwrap();
        inner.write(&OrbitConfig::new().bind("10.0.0.2:2")).unwrap();

        let loaded = OrbitConfig::load_layers(&[outer, inner]).unwrap();
        assert_eq!(loaded.server.bind(), "10.0.0.2:2");
        assert_eq!(loaded.client.prompt(), "ada");
    }

    #[test]
    fn test_load_layers_skips_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = OrbitConfig::load_layers(&[ConfigLayer::project(dir.path())]).unwrap();
        assert_eq!(loaded.version, CURRENT_CONFIG_VERSION);
        assert_eq!(loaded.server.bind(), "127.0.0.1:3001");
    }
}

//! Config layers - 설정 파일 위치와 버전 관리
//!
//! 설정은 두 계층에서 읽습니다 (뒤가 우선):
//! 1. 글로벌 `~/.config/orbit/config.json`
//! 2. 프로젝트 `./.orbit/config.json`
//!
//! 파일의 `version`이 현재보다 낮으면 읽을 때 현재 버전으로 올려서 다시
//! 저장하고, 현재보다 높으면 거부합니다.

use super::OrbitConfig;
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// 설정 파일명
pub const ORBIT_CONFIG_FILE: &str = "config.json";

/// 이 빌드가 읽고 쓰는 설정 버전
pub const CURRENT_CONFIG_VERSION: u32 = 1;

const GLOBAL_DIR: &str = "orbit";
const PROJECT_DIR: &str = ".orbit";

/// 설정 계층
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigScope {
    Global,
    Project,
}

impl std::fmt::Display for ConfigScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigScope::Global => write!(f, "global"),
            ConfigScope::Project => write!(f, "project"),
        }
    }
}

/// 한 계층의 `config.json`
#[derive(Debug, Clone)]
pub struct ConfigLayer {
    scope: ConfigScope,
    path: PathBuf,
}

impl ConfigLayer {
    /// 글로벌 설정 (~/.config/orbit/config.json)
    pub fn global() -> Result<Self> {
        let dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("cannot find config directory".to_string()))?;
        Ok(Self {
            scope: ConfigScope::Global,
            path: dir.join(GLOBAL_DIR).join(ORBIT_CONFIG_FILE),
        })
    }

    /// 프로젝트 설정 (<root>/.orbit/config.json)
    pub fn project(root: &Path) -> Self {
        Self {
            scope: ConfigScope::Project,
            path: root.join(PROJECT_DIR).join(ORBIT_CONFIG_FILE),
        }
    }

    /// 현재 디렉토리 프로젝트 설정
    pub fn current_project() -> Result<Self> {
        let cwd = std::env::current_dir()
            .map_err(|e| Error::Config(format!("cannot get current directory: {}", e)))?;
        Ok(Self::project(&cwd))
    }

    /// 병합 순서대로 (우선순위 낮은 것부터) 찾을 수 있는 계층들
    pub fn discover() -> Vec<Self> {
        let mut layers = Vec::new();
        match Self::global() {
            Ok(layer) => layers.push(layer),
            Err(e) => debug!("no global config layer: {}", e),
        }
        match Self::current_project() {
            Ok(layer) => layers.push(layer),
            Err(e) => debug!("no project config layer: {}", e),
        }
        layers
    }

    pub fn scope(&self) -> ConfigScope {
        self.scope
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 파일이 없으면 `None`. 예전 버전 파일은 현재 버전으로 올려서 다시 저장합니다.
    pub fn read(&self) -> Result<Option<OrbitConfig>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(Error::Config(format!(
                    "failed to read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        let mut config: OrbitConfig = serde_json::from_str(&content).map_err(|e| {
            Error::Config(format!("failed to parse {}: {}", self.path.display(), e))
        })?;

        if config.version > CURRENT_CONFIG_VERSION {
            return Err(Error::Config(format!(
                "{} has version {}, newer than the supported version {}",
                self.path.display(),
                config.version,
                CURRENT_CONFIG_VERSION
            )));
        }
        if config.version < CURRENT_CONFIG_VERSION {
            debug!(
                scope = %self.scope,
                from = config.version,
                to = CURRENT_CONFIG_VERSION,
                "upgrading config file"
            );
            config.version = CURRENT_CONFIG_VERSION;
            // the upgraded values are still used when the file is read-only
            if let Err(e) = self.write(&config) {
                warn!(path = %self.path.display(), "could not rewrite upgraded config: {}", e);
            }
        }

        Ok(Some(config))
    }

    /// 현재 버전으로 저장. 같은 디렉토리의 임시 파일에 쓴 뒤 교체합니다.
    pub fn write(&self, config: &OrbitConfig) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)
                .map_err(|e| Error::Config(format!("failed to create {}: {}", dir.display(), e)))?;
        }

        let mut stamped = config.clone();
        stamped.version = CURRENT_CONFIG_VERSION;
        let content = serde_json::to_string_pretty(&stamped)?;

        let staging = self.path.with_extension("json.tmp");
        std::fs::write(&staging, content)
            .map_err(|e| Error::Config(format!("failed to write {}: {}", staging.display(), e)))?;
        std::fs::rename(&staging, &self.path).map_err(|e| {
            Error::Config(format!("failed to replace {}: {}", self.path.display(), e))
        })
    }
}

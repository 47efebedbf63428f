//! Backend Registry - 백엔드 등록 및 확장자 라우팅
//!
//! Router는 확장자만 알고, 어떤 백엔드가 처리하는지는 여기서 결정합니다.
//!
//! ```ignore
//! let mut registry = BackendRegistry::with_default_routes();
//! registry.register(Arc::new(interpreter));
//!
//! let backend = registry.route("py");           // Some(BackendId::Interpreter)
//! let (handle, stream) = registry.run(request);  // 미등록 백엔드 → Exit(1)
//! ```

use super::ExecutionBackend;
use crate::job::{self, ExecutionHandle, ExecutionRequest, JobStream};
use orbit_foundation::{BackendId, Error, OrbitConfig};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// 백엔드 레지스트리
pub struct BackendRegistry {
    backends: HashMap<BackendId, Arc<dyn ExecutionBackend>>,
    routes: HashMap<String, BackendId>,
}

impl BackendRegistry {
    /// 빈 레지스트리 생성
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
            routes: HashMap::new(),
        }
    }

    /// 기본 라우팅 테이블을 포함한 레지스트리
    pub fn with_default_routes() -> Self {
        let mut registry = Self::new();
        for (ext, id) in [
            ("py", BackendId::Interpreter),
            ("js", BackendId::Interpreter),
            ("cpp", BackendId::Compiled),
            ("c", BackendId::Compiled),
            ("java", BackendId::Remote),
            ("go", BackendId::Remote),
        ] {
            registry.set_route(ext, id);
        }
        registry
    }

    /// 기본 라우팅 + 설정 파일의 `routes` override
    pub fn from_config(config: &OrbitConfig) -> Self {
        let mut registry = Self::with_default_routes();
        for (ext, id) in &config.routes {
            registry.set_route(ext.trim_start_matches('.'), *id);
        }
        registry
    }

    /// 백엔드 등록 (같은 id는 교체)
    pub fn register(&mut self, backend: Arc<dyn ExecutionBackend>) {
        debug!(backend = %backend.id(), "backend registered");
        self.backends.insert(backend.id(), backend);
    }

    /// 확장자 라우팅 설정
    pub fn set_route(&mut self, ext: &str, id: BackendId) {
        self.routes.insert(ext.to_ascii_lowercase(), id);
    }

    /// 백엔드 조회
    pub fn get(&self, id: BackendId) -> Option<Arc<dyn ExecutionBackend>> {
        self.backends.get(&id).cloned()
    }

    /// 확장자 → 백엔드 id
    pub fn route(&self, ext: &str) -> Option<BackendId> {
        self.routes.get(&ext.to_ascii_lowercase()).copied()
    }

    /// 등록된 백엔드 id 목록
    pub fn ids(&self) -> Vec<BackendId> {
        let mut ids: Vec<BackendId> = self.backends.keys().copied().collect();
        ids.sort();
        ids
    }

    /// 요청의 backend_id로 디스패치
    pub fn run(&self, request: ExecutionRequest) -> (ExecutionHandle, JobStream) {
        match self.backends.get(&request.backend_id) {
            Some(backend) => backend.run(request),
            None => job::rejected(
                request.job_id,
                Error::validation(format!("{} backend is not available", request.backend_id)),
            ),
        }
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::with_default_routes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orbit_foundation::Vfs;

    #[test]
    fn test_default_routes() {
        let registry = BackendRegistry::with_default_routes();
        assert_eq!(registry.route("py"), Some(BackendId::Interpreter));
        assert_eq!(registry.route("CPP"), Some(BackendId::Compiled));
        assert_eq!(registry.route("java"), Some(BackendId::Remote));
        assert_eq!(registry.route("rs"), None);
    }

    #[test]
    fn test_config_routes_override() {
        let mut config = OrbitConfig::default();
        config.routes.insert(".cpp".into(), BackendId::Remote);
        let registry = BackendRegistry::from_config(&config);
        assert_eq!(registry.route("cpp"), Some(BackendId::Remote));
        assert_eq!(registry.route("py"), Some(BackendId::Interpreter));
    }

    #[tokio::test]
    async fn test_missing_backend_exits_once() {
        let registry = BackendRegistry::new();
        let request =
            ExecutionRequest::new(BackendId::Remote, "/main.go", Arc::new(Vfs::new()));
        let (_handle, stream) = registry.run(request);
        let (output, code) = job::collect(stream).await;
        assert_eq!(code, 1);
        assert!(output.contains("remote backend is not available"));
    }
}

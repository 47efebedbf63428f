//! Backend wiring shared by `orbit shell` and `orbit run`

use orbit_exec::{BackendRegistry, EmbeddedPermit, EmbeddedRuntime, RemoteBackend, ToolchainTable};
use orbit_foundation::OrbitConfig;
use std::sync::Arc;

/// Registry plus the interpreter runtime that also serves `pip install`
pub struct Backends {
    pub registry: Arc<BackendRegistry>,
    pub interpreter: Arc<EmbeddedRuntime>,
}

/// Both embedded runtimes share one permit; remote jobs go to `client.serverUrl`
pub fn build(config: &OrbitConfig) -> anyhow::Result<Backends> {
    let toolchains = Arc::new(ToolchainTable::from_config(config));
    let permit = EmbeddedPermit::new();

    let mut interpreter = EmbeddedRuntime::interpreter(permit.clone(), Arc::clone(&toolchains))?;
    if let Some(limit) = config.client.script_memory_limit {
        interpreter = interpreter.with_script_memory_limit(limit);
    }
    let interpreter = Arc::new(interpreter);
    let compiled = Arc::new(EmbeddedRuntime::compiled(permit, toolchains));

    let mut registry = BackendRegistry::from_config(config);
    registry.register(interpreter.clone());
    registry.register(compiled);
    registry.register(Arc::new(RemoteBackend::new(config.client.server_url())));

    Ok(Backends {
        registry: Arc::new(registry),
        interpreter,
    })
}

//! `orbit serve` - remote sandboxed executor

use orbit_foundation::OrbitConfig;
use orbit_server::AppState;
use tokio::net::TcpListener;

pub async fn run(config: &OrbitConfig) -> anyhow::Result<()> {
    let bind = config.server.bind();
    let root = config.server.workspace_root();
    std::fs::create_dir_all(&root)?;

    let listener = TcpListener::bind(bind).await?;
    println!("Orbit executor listening on {}", listener.local_addr()?);

    let state = AppState::from_config(config);
    tracing::info!(
        root = %root.display(),
        toolchains = %state.sandbox.toolchains().extensions().join(","),
        "executor ready"
    );
    orbit_server::serve(listener, state, async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
        tracing::info!("shutdown requested");
    })
    .await?;

    Ok(())
}

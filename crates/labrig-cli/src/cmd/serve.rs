use anyhow::Context;
use labrig_core::config::{ServerConfig, WarnLevel};
use labrig_server::state::{AppState, Backends};
use std::path::Path;

/// Load and check the config, wire the backends, then serve until ctrl-c.
pub fn run(config_path: &Path, port: u16) -> anyhow::Result<()> {
    let config = ServerConfig::load(config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    let warnings = config.validate();
    for w in &warnings {
        match w.level {
            WarnLevel::Warning => tracing::warn!("{}", w.message),
            WarnLevel::Error => tracing::error!("{}", w.message),
        }
    }
    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("refusing to start: run `labrig config check` for details");
    }

    let backends = Backends::from_config(&config).context("failed to initialise backends")?;
    tracing::info!(
        user_id = %config.identity.user_id,
        subscription_id = %config.identity.subscription_id,
        root_dir = %config.root_dir.display(),
        "starting labrig server"
    );
    let state = AppState::new(config, backends);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
        tokio::select! {
            res = labrig_server::serve_on(state, listener) => res,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                Ok(())
            }
        }
    })
}

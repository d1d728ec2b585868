use std::process::ExitCode;

use clap::Parser;
use textgen_runtime::build_engine;
use textgen_server::{run_server, AppState, Args};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let configs = args
        .engine_config()
        .and_then(|engine| Ok((engine, args.server_config()?)));
    let (engine_config, server_config) = match configs {
        Ok(configs) => configs,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    // Model loading reads the whole file; keep it off the async workers.
    let engine = match tokio::task::spawn_blocking(move || build_engine(&engine_config)).await {
        Ok(Ok(engine)) => engine,
        Ok(Err(e)) => {
            tracing::error!(error = %e, "failed to construct engine");
            return ExitCode::FAILURE;
        }
        Err(e) => {
            tracing::error!(error = %e, "engine construction task failed");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(
        engine = engine.name(),
        max_concurrent = server_config.max_concurrent,
        "engine ready"
    );

    let addr = server_config.listen;
    let state = AppState::new(engine, server_config);
    if let Err(e) = run_server(state, addr).await {
        tracing::error!(error = %e, "server error");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

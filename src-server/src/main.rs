//! Servidor HTTP de StripClean.

mod config;
mod handler;

use anyhow::Result;
use clap::Parser;
use config::ServerConfig;
use std::path::PathBuf;
use std::sync::Arc;
use stripclean::{Engine, logging};
use tracing::info;

#[derive(Parser)]
#[command(name = "stripclean-server")]
#[command(version)]
#[command(about = "Servidor HTTP de StripClean: POST /analyze y POST /clean")]
struct Cli {
    /// Archivo de configuración TOML
    #[arg(short, long, env = "STRIPCLEAN_CONFIG")]
    config: Option<PathBuf>,

    /// Dirección de escucha
    #[arg(long, env = "STRIPCLEAN_HOST")]
    host: Option<String>,

    /// Puerto de escucha
    #[arg(long, env = "STRIPCLEAN_PORT")]
    port: Option<u16>,

    /// Desactiva CORS
    #[arg(long)]
    no_cors: bool,

    /// Registro en JSON
    #[arg(long)]
    json_logs: bool,

    /// Registro detallado
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.json_logs {
        logging::init_tracing_json(cli.verbose);
    } else {
        logging::init_tracing(cli.verbose);
    }

    let mut config = match &cli.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if cli.no_cors {
        config.cors = false;
    }

    let engine = Arc::new(Engine::new(config.engine.clone())?);
    let app = handler::router(handler::AppState { engine }, config.cors);

    let address = config.address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!(%address, "StripClean escuchando: /clean y /analyze listos");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("servidor detenido");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(%error, "no se pudo escuchar Ctrl+C");
        std::future::pending::<()>().await;
    }
}

//! Entry point of the `bgremove-server` binary

use super::args::SessionArgs;
use crate::{
    config::ServerConfig,
    processor::RemovalSession,
    server,
    tracing_config::{init_cli_tracing, spans},
};
use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::Instrument;

/// Background removal HTTP server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "bgremove-server")]
pub struct ServerCli {
    /// Address to listen on
    #[arg(short, long, env = "BGREMOVE_BIND", default_value = ServerConfig::DEFAULT_BIND)]
    pub bind: SocketAddr,

    /// Largest accepted upload in bytes
    #[arg(long, env = "BGREMOVE_MAX_UPLOAD_BYTES", default_value_t = ServerConfig::DEFAULT_MAX_UPLOAD_BYTES)]
    pub max_upload_bytes: usize,

    #[command(flatten)]
    pub session: SessionArgs,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl ServerCli {
    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            bind: self.bind,
            max_upload_bytes: self.max_upload_bytes,
        }
    }
}

pub async fn main() -> Result<()> {
    let cli = ServerCli::parse();

    let session_id = init_cli_tracing(cli.verbose).context("Failed to initialize tracing")?;
    let config = cli.session.to_config()?;
    let server_config = cli.server_config();

    let span = spans::session(&session_id, &config.model);
    async move {
        let session = RemovalSession::from_config(&config)
            .await
            .with_context(|| format!("Failed to create session for model '{}'", config.model))?;
        tracing::info!(
            "Model '{}' loaded on {} backend",
            session.descriptor().name(),
            session.backend_name()
        );

        server::serve(Arc::new(session), &server_config)
            .await
            .context("Server failed")
    }
    .instrument(span)
    .await
}

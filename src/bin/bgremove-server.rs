//! Background removal HTTP server

use bgremove_service::cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::server_main().await
}

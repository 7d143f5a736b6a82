//! Background removal CLI tool

use bgremove_service::cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

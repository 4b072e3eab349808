use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    voxchat::cli::run_cli().await
}

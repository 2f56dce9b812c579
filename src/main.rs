#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tapline_cli::cli::run().await
}

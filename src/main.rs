use clap::Parser;
use drug_discovery_agent::{cli, utils::init_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = cli::Cli::parse();
    cli::run(cli).await
}

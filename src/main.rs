use anyhow::Result;
use clap::Parser;
use divvy::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    divvy::telemetry::init(cli.verbose);
    cli.run().await
}

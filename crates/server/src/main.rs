use anyhow::Context as _;
use clap::Parser as _;
use specmill::cli::{Cli, init_logging};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.log_format).context("init logging")?;

    specmill::run(&cli)
        .await
        .with_context(|| format!("serve {}", cli.spec.display()))
}

use anyhow::Context;
use clap::Parser;
use repere::{Cli, Command, Paths, create_database, create_kdtree, decompress, download};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Ok(()) = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init()
    {};
    info!("Subscriber initialized.");

    let paths = Paths::new(&cli.data);
    match cli.command {
        Command::Download => download(&paths).context("Download step failed.")?,
        Command::Decompress => decompress(&paths).context("Decompress step failed.")?,
        Command::Index => create_database(&paths).context("Index step failed.")?,
        Command::Reverse => create_kdtree(&paths).context("Reverse step failed.")?,
        Command::Update => {
            download(&paths).context("Download step failed.")?;
            decompress(&paths).context("Decompress step failed.")?;
            create_database(&paths).context("Index step failed.")?;
            create_kdtree(&paths).context("Reverse step failed.")?;
        }
    }
    Ok(())
}

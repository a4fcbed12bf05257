use clap::Parser;
use std::path::Path;

use skymood::cli::{commands, config, Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init(args) => {
            let path = cli
                .config
                .as_deref()
                .unwrap_or(Path::new(config::CONFIG_FILENAME));
            commands::execute_init(path, args.force)?
        }
        Commands::Run(args) => {
            skymood::native::init_tracing();
            let cfg = config::resolve_config(cli.config.as_deref())?;
            commands::execute_run(cfg, args, cli.api_key).await?
        }
        Commands::Serve(args) => {
            skymood::native::init_tracing();
            let cfg = config::resolve_config(cli.config.as_deref())?;
            commands::execute_serve(cfg, args, cli.api_key).await?
        }
    }

    Ok(())
}

use clap::Parser;

use servicehub::cli::{self, ServiceHubArgs};
use servicehub::config::ConfigLoader;
use servicehub::logging::{init_logging, LoggingConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ServiceHubArgs::parse();

    init_logging(LoggingConfig::production().with_verbosity(args.verbose))
        .map_err(|e| anyhow::anyhow!(e))?;

    let loader = ConfigLoader::new();
    let config = if args.config.is_empty() {
        loader.load_default()?
    } else {
        loader.load_layers(&args.config)?
    };

    let manager = cli::build_manager(config)?;
    let mut stdout = std::io::stdout().lock();
    cli::run(&args.command, &manager, &mut stdout).await
}

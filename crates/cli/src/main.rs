use clap::Parser;
use sqlbox_cli::{logging, Cli};
use sqlbox_service::{ConfigLoader, ExecutionService, Handler, StoreConfig};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    logging::init(cli.global.debug)?;

    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.global.config {
        loader = loader.config_file(path);
    }
    let config = ConfigLoader::apply_cli_args(loader.load()?, cli.global.overrides())?;
    tracing::debug!(?config, "resolved configuration");

    if config.store == StoreConfig::Memory && cli.command.reads_existing_handles() {
        tracing::warn!("using the in-process store; handles from other runs are not visible");
    }

    let service = Arc::new(ExecutionService::from_config(&config).await?);
    let handler = Handler::new(service);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let mut stdout = std::io::stdout().lock();
    let result = cli.command.execute(&handler, cancel, &mut stdout).await;
    if cli.global.stats {
        eprintln!("{}", handler.service().stats());
    }
    result
}

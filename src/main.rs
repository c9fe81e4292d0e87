mod ai;
mod bots;
mod config;
mod error;
mod export;
mod impls;
mod persistent;
mod scheduler;
mod screenshot;
mod server;

use std::path::Path;
use std::sync::Arc;

use clap::Parser;

use bots::shop::App;
use config::{Cli, Commands, Config};
use persistent::{CatalogFile, Storage};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let Cli { command, config } = Cli::parse();
    init_logger(config.log_level())?;
    let storage = Storage::new(&config.db_url).await?;
    let result = match command.unwrap_or(Commands::Run) {
        Commands::Run => run(config, storage.clone()).await,
        Commands::ImportCatalog { path } => import_catalog(&storage, &path).await,
        Commands::Export { path } => {
            let path = path.unwrap_or(config.export_path);
            let rows = storage.warranty_rows().await?;
            export::write_workbook(&path, &rows)?;
            log::info!("{} warranties written to {}", rows.len(), path.display());
            Ok(())
        },
    };
    storage.close().await;
    result
}

async fn run(config: Config, storage: Arc<Storage>) -> anyhow::Result<()> {
    if config.token.is_empty() {
        anyhow::bail!("Please, set env variable TELEGRAM_BOT_TOKEN");
    }
    if config.admins.is_empty() {
        log::warn!("ADMIN_IDS is empty, support tickets will reach nobody");
    }
    let export = export::worker(storage.clone(), config.export_path.clone()).await?;
    let app = App::new(config, storage, export)?;
    bots::shop::bot::start(app).await
}

async fn import_catalog(storage: &Storage, path: &Path) -> anyhow::Result<()> {
    let raw = tokio::fs::read_to_string(path).await?;
    let catalog: CatalogFile = serde_json::from_str(&raw)?;
    let (categories, products) = storage.import_catalog(catalog).await?;
    log::info!("catalog imported: {} categories, {} products", categories, products);
    Ok(())
}

fn init_logger(level: log::LevelFilter) -> anyhow::Result<()> {
    use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};
    let config = ConfigBuilder::new()
        .add_filter_ignore_str("hyper")
        .add_filter_ignore_str("reqwest")
        .build();
    TermLogger::init(level, config, TerminalMode::Mixed, ColorChoice::Auto)?;
    Ok(())
}

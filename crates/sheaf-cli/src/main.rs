use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use dotenvy::dotenv;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use sheaf_cli::config::{load_base_config, resolve_sync_config};
use sheaf_cli::{report, shutdown, Command, Config, SyncArgs};
use sheaf_client::{CmsCatalogClient, HttpFetcher};
use sheaf_core::{AppError, DownloadScheduler, StateStore, SyncEngine};
use sheaf_store::{CsvDirectoryWriter, JsonStateStore};

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables from .env file
    dotenv().ok();

    let config = Config::parse();

    // Setup logging (stderr to keep stdout for the summary)
    let level = if config.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Cannot install logger: {e}");
    }

    match run(config).await {
        Ok(code) => code,
        Err(err) => match err.downcast_ref::<AppError>() {
            Some(app_err) => {
                error!("{}", app_err.user_message());
                ExitCode::from(report::exit_code(app_err))
            }
            None => {
                error!("{:#}", err);
                ExitCode::from(report::EXIT_CONFIG)
            }
        },
    }
}

async fn run(config: Config) -> anyhow::Result<ExitCode> {
    match config.command {
        Command::Sync(args) => sync(config.config, &args).await,
        Command::Status { state_file } => {
            status(config.config, state_file)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Run one incremental sync pass
async fn sync(config_path: Option<PathBuf>, args: &SyncArgs) -> anyhow::Result<ExitCode> {
    let config = resolve_sync_config(config_path.as_deref(), args)?;

    info!(
        "Syncing theme \"{}\" from {} ({} concurrent downloads)",
        config.theme, config.catalog_url, config.concurrency_limit
    );

    let catalog = CmsCatalogClient::new(
        &config.catalog_url,
        &config.user_agent,
        config.request_timeout,
        config.retry.clone(),
    )?;
    let fetcher = HttpFetcher::new(&config.user_agent, config.request_timeout)?;
    let scheduler = DownloadScheduler::new(
        config.concurrency_limit,
        config.retry.clone(),
        config.request_timeout,
    )?;

    let engine = SyncEngine::new(
        Arc::new(catalog),
        Arc::new(fetcher),
        Arc::new(CsvDirectoryWriter::new(&config.output_directory)),
        Arc::new(JsonStateStore::new(&config.state_file_path)),
        scheduler,
        config.theme.clone(),
    );

    let cancel = shutdown::install_signal_handler();
    let run_report = engine.run(&cancel).await?;

    print!("{}", report::render_summary(&run_report));
    println!("\nOutput: {}", config.output_directory.display());

    Ok(ExitCode::from(report::run_exit_code(&run_report)))
}

/// Print the stored cursor
fn status(config_path: Option<PathBuf>, state_file: Option<PathBuf>) -> anyhow::Result<()> {
    let base = load_base_config(config_path.as_deref())?;
    let path = state_file.unwrap_or(base.state_file_path);

    if !path.exists() {
        println!("No state file at {}. Run: sheaf sync", path.display());
        return Ok(());
    }

    let store = JsonStateStore::new(&path);
    let state = store.load();
    print!("{}", report::render_status(&state, store.path()));
    Ok(())
}

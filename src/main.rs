use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use shipment_tracker::browser::{BrowserLauncher, WebDriverLauncher};
use shipment_tracker::captcha::TwoCaptchaClient;
use shipment_tracker::config::AppConfig;
use shipment_tracker::cruz_del_sur::CruzDelSurLookup;
use shipment_tracker::http_status::{build_client, CorreosLookup, FedExLookup};
use shipment_tracker::logging::{init_logging, OperationTimer};
use shipment_tracker::starken::StarkenLookup;
use shipment_tracker::validation::InputValidator;
use shipment_tracker::{ReconcileService, StatusLookups, XlsxRepository};

/// Merge carrier manifests into the master shipment table and refresh statuses
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Folder with carrier PDF/XLSX manifests
    folder: PathBuf,

    /// Master table where results are stored
    #[arg(long, default_value = "envios.xlsx")]
    excel: PathBuf,

    /// Extra configuration file layered over the defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Also write logs to this file (daily rotation)
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Append new shipments without looking up any status
    #[arg(long)]
    no_refresh: bool,
}

fn build_lookups(config: &AppConfig) -> Result<StatusLookups> {
    let client = build_client(&config.http).context("Failed to build HTTP client")?;
    let launcher: Arc<dyn BrowserLauncher> = Arc::new(WebDriverLauncher::new(&config.browser));

    let mut lookups = StatusLookups::new()
        .with(Box::new(FedExLookup::new(client.clone(), &config.http)))
        .with(Box::new(CorreosLookup::new(client.clone(), &config.http)))
        .with(Box::new(StarkenLookup::new(Arc::clone(&launcher), &config.browser)));

    match config.solver_api_key() {
        Some(api_key) => {
            let solver = Arc::new(TwoCaptchaClient::new(client, &config.solver, api_key));
            lookups.register(Box::new(CruzDelSurLookup::new(
                launcher,
                solver,
                &config.cruz_del_sur,
                &config.solver,
            )));
        },
        None => warn!(
            "Captcha solver API key not set ({}); Cruz del Sur statuses will not be queried",
            config.solver.api_key_env
        ),
    }

    Ok(lookups)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Load configuration
    let config = AppConfig::load_from(cli.config.as_deref()).context("Failed to load configuration")?;

    // Initialize logging
    let log_file = cli
        .log_file
        .clone()
        .or_else(|| config.logging.file_path.as_ref().map(PathBuf::from));
    let _guard = init_logging(
        Some(&config.get_log_level()),
        log_file.as_deref(),
        config.logging.format == "json",
    )?;

    info!("Starting shipment tracker");

    InputValidator::validate_source_dir(&cli.folder)?;
    InputValidator::validate_master_path(&cli.excel)?;

    let lookups = build_lookups(&config)?;
    let service = ReconcileService::new(Box::new(XlsxRepository::new(&cli.excel)), lookups);

    let timer = OperationTimer::new("reconcile");
    let report = service
        .run(&cli.folder, !cli.no_refresh)
        .await
        .with_context(|| format!("Failed to reconcile {}", cli.folder.display()))?;
    let elapsed_ms = timer.finish();

    info!(
        files = report.files_processed,
        extracted = report.records_extracted,
        appended = report.rows_appended,
        refreshed = report.rows_refreshed,
        total = report.total_rows,
        elapsed_ms,
        "Master table saved to {}",
        cli.excel.display()
    );
    if let Some((tracking_number, status)) = &report.cruz_del_sur {
        info!(
            "Cruz del Sur {tracking_number}: {}",
            status.as_deref().unwrap_or("no status obtained")
        );
    }

    Ok(())
}

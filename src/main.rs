use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use shelfscan::browser;
use shelfscan::config::{AppConfig, BrowserBackend};
use shelfscan::coordinator;
use shelfscan::results_view::{LogResultsView, TerminalResultsView};
use shelfscan::storage::{SharedState, SqliteStateStore};
use shelfscan::web::{AppState, create_router};
use shelfscan::{SearchRequest, SearchSettings, StoreId, StoreRegistry};

/// Search several grocery storefronts at once and compare what they list.
#[derive(Debug, Parser)]
#[command(name = "shelfscan", version, about)]
struct Cli {
    /// Base configuration file (defaults to config/default).
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one search and print the merged results.
    Search {
        #[arg(required = true, num_args = 1..)]
        term: Vec<String>,

        /// Only search these stores. Repeat for several.
        #[arg(short, long = "store", value_name = "STORE")]
        stores: Vec<StoreId>,

        /// Leave each store's page open after it reports.
        #[arg(long)]
        keep_open: bool,

        /// Override the configured browser backend.
        #[arg(long, value_enum)]
        backend: Option<BrowserBackend>,
    },

    /// Serve the JSON API.
    Serve,

    /// List the supported stores.
    Stores,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let mut config = AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    let _guard = init_tracing(&config)?;

    if config.metrics.enabled {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics.port));
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("failed to install the Prometheus exporter")?;
        info!("Metrics exported on {}", addr);
    }

    match cli.command {
        Command::Search {
            term,
            stores,
            keep_open,
            backend,
        } => {
            if let Some(backend) = backend {
                config.browser.backend = backend;
            }
            run_search(config, term.join(" "), stores, keep_open).await
        }
        Command::Serve => serve(config).await,
        Command::Stores => list_stores(),
    }
}

/// Keep the returned guard alive for as long as file logging should flush.
fn init_tracing(config: &AppConfig) -> Result<Option<WorkerGuard>> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.logging.filter)?,
    };

    let (file_layer, guard) = match &config.logging.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, "shelfscan.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    Ok(guard)
}

async fn open_state(config: &AppConfig) -> Result<SharedState> {
    let store = SqliteStateStore::connect(&config.storage)
        .await
        .with_context(|| format!("failed to open state store at {}", config.storage.url))?;
    Ok(SharedState::new(Arc::new(store)))
}

async fn run_search(config: AppConfig, term: String, stores: Vec<StoreId>, keep_open: bool) -> Result<()> {
    let state = open_state(&config).await?;
    let registry = StoreRegistry::new()?;
    let browser = browser::from_config(&config.browser)?;
    let view = Arc::new(TerminalResultsView::new(
        state.clone(),
        config.search.results_poll_interval(),
    ));

    let (handle, task) = coordinator::spawn(registry, browser, state, view.clone(), &config.search);

    let settings = if stores.is_empty() {
        if keep_open {
            SearchSettings::only(StoreId::ALL, false)
        } else {
            SearchSettings::default()
        }
    } else {
        SearchSettings::only(stores, !keep_open)
    };

    let session = handle.search(SearchRequest::new(&term, settings)?).await?;
    info!("Search {} started for '{}'", session, term);

    tokio::select! {
        _ = view.wait() => {}
        _ = tokio::signal::ctrl_c() => warn!("Interrupted before results were published"),
    }

    handle.shutdown();
    task.await?;
    Ok(())
}

async fn serve(config: AppConfig) -> Result<()> {
    let state = open_state(&config).await?;
    let registry = StoreRegistry::new()?;
    let browser = browser::from_config(&config.browser)?;
    let view = Arc::new(LogResultsView::new(&config.server.base_url));

    let (handle, task) = coordinator::spawn(registry.clone(), browser, state.clone(), view, &config.search);

    let app = create_router(AppState {
        coordinator: handle.clone(),
        shared: state,
        registry: Arc::new(registry),
    });

    let address = config.server_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {}", address))?;
    info!("Listening on {}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl+C, shutting down...");
            }
        })
        .await?;

    handle.shutdown();
    task.await?;
    Ok(())
}

fn list_stores() -> Result<()> {
    let registry = StoreRegistry::new()?;
    for store in registry.summaries() {
        println!(
            "{:<8} {:<8} {:<18} {} attempts every {} ms",
            store.id.as_str(),
            store.name,
            store.host,
            store.polling.max_attempts,
            store.polling.interval.as_millis()
        );
    }
    Ok(())
}

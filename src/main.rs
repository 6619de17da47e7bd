use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::{sync::watch, task::JoinSet};
use warehouse_ingest::{
    ingester::Ingester,
    metrics::IngestMetrics,
    model::RecordKind,
    monitor::Monitor,
    publisher::{kafka::KafkaTransport, memory::MemoryTransport, BatchPublisher, Transport},
    server::{self, AppState},
    settings::Settings,
    telemetry::{self, LogFormat, RequestContext},
};

const FLUSH_TIMEOUT: Duration = Duration::from_secs(10);
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[doc(hidden)]
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[arg(short, long)]
    config: String,
    #[arg(long, value_enum, default_value = "json")]
    log_format: LogFormat,
    #[command(subcommand)]
    command: Option<Command>,
}

#[doc(hidden)]
#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service (default)
    Serve,
    /// Publish a single inventory or products file and wait for every record
    Publish {
        #[arg(short, long, value_enum)]
        kind: RecordKind,
        /// keep messages in memory instead of sending them to Kafka
        #[arg(long)]
        dry_run: bool,
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let args = Args::parse();
    telemetry::init(args.log_format);
    let settings = Settings::new(&args.config)
        .with_context(|| format!("cannot load config {}", args.config))?;

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(settings).await,
        Command::Publish {
            kind,
            dry_run,
            file,
        } => publish(settings, kind, dry_run, file).await,
    }
}

async fn serve(settings: Settings) -> Result<(), anyhow::Error> {
    let metrics = Arc::new(IngestMetrics::new()?);
    let kafka = Arc::new(KafkaTransport::new(&settings.kafka)?);
    let publisher = BatchPublisher::new(kafka.clone(), metrics.clone());
    let ingester = Arc::new(Ingester::from_settings(
        &settings,
        publisher.clone(),
        metrics,
    ));
    let app = server::router(AppState { ingester }, settings.max_body_bytes());

    let (stop, stopped) = watch::channel(false);
    let mut background = JoinSet::new();
    if settings.monitor.enabled {
        let monitor = Monitor::new(&settings)?;
        let mut stopped = stopped.clone();
        background.spawn(async move {
            monitor
                .run(async move {
                    let _ = stopped.changed().await;
                })
                .await
        });
    }

    let listener = tokio::net::TcpListener::bind(settings.listen())
        .await
        .with_context(|| format!("binding {}", settings.listen()))?;
    tracing::info!(listen = settings.listen(), "warehouse-ingest started");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving http")?;

    let _ = stop.send(true);
    while background.join_next().await.is_some() {}

    // requests answered before shutdown may still have sends and dead letters pending
    if !publisher.drain(DRAIN_TIMEOUT).await {
        tracing::warn!(
            timeout_secs = DRAIN_TIMEOUT.as_secs(),
            "batches still in flight after drain timeout"
        );
    }
    tracing::info!("flushing kafka producer");
    tokio::task::spawn_blocking(move || kafka.flush(FLUSH_TIMEOUT)).await??;
    tracing::info!("warehouse-ingest stopped");
    Ok(())
}

async fn publish(
    settings: Settings,
    kind: RecordKind,
    dry_run: bool,
    file: PathBuf,
) -> Result<(), anyhow::Error> {
    let bytes = tokio::fs::read(&file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;

    let metrics = Arc::new(IngestMetrics::new()?);
    let (transport, kafka): (Arc<dyn Transport>, Option<Arc<KafkaTransport>>) = if dry_run {
        (Arc::new(MemoryTransport::new()), None)
    } else {
        let kafka = Arc::new(KafkaTransport::new(&settings.kafka)?);
        (kafka.clone(), Some(kafka))
    };
    let ingester = Ingester::from_settings(
        &settings,
        BatchPublisher::new(transport, metrics.clone()),
        metrics,
    );

    let ctx = RequestContext::detached("CLI_PUBLISH");
    let accepted = ingester.ingest_upload(&ctx, kind, Some(bytes.as_slice()))?;
    let report = accepted.batch.completed().await?;
    if let Some(kafka) = kafka {
        tokio::task::spawn_blocking(move || kafka.flush(FLUSH_TIMEOUT)).await??;
    }

    println!(
        "{}: {} {} records, {} delivered, {} dead-lettered, {} lost (trace id {})",
        file.display(),
        report.outcomes.len(),
        kind,
        report.delivered(),
        report.failed() - report.lost(),
        report.lost(),
        ctx.trace_id
    );
    if report.lost() > 0 {
        anyhow::bail!("{} records could not be delivered nor dead-lettered", report.lost());
    }
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown requested"),
        Err(e) => tracing::error!("cannot listen for ctrl-c: {e}"),
    }
}

use std::io;
use std::io::BufReader;
use std::sync::Arc;
use std::time::Duration;

use etcd_bridge::dispatch::Dispatcher;
use etcd_bridge::host::stdio::LineQueue;
use etcd_bridge::metrics;
use etcd_bridge::registry::ConnectionRegistry;
use etcd_bridge::store::EtcdConnector;
use etcd_bridge::Error;
use etcd_bridge::LogConfig;
use etcd_bridge::Result;
use etcd_bridge::Settings;
use tokio::runtime::Handle;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::RollingFileAppender;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

fn main() -> Result<()> {
    let config_path = std::env::args().nth(1);
    let settings = Settings::load(config_path.as_deref())?;

    // Initializing Logs
    let _guard = init_observability(&settings.log)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(settings.dispatch.worker_threads)
        .thread_name("bridge-worker")
        .enable_all()
        .build()
        .map_err(|e| Error::Fatal(format!("failed to build runtime: {}", e)))?;

    let result = runtime.block_on(serve(settings));

    // The dispatch thread may still be parked on stdin
    runtime.shutdown_timeout(SHUTDOWN_GRACE);

    match &result {
        Err(e) if e.is_fatal() => error!("fatal error, exiting: {}", e),
        Err(e) => error!("bridge stopped: {}", e),
        Ok(()) => {}
    }
    info!("Exiting program.");
    result
}

async fn serve(settings: Settings) -> Result<()> {
    // Initializing Shutdown Signal
    let (graceful_tx, graceful_rx) = watch::channel(());

    if settings.monitoring.prometheus_enabled {
        tokio::spawn(metrics::start_server(
            settings.monitoring.prometheus_port,
            graceful_rx.clone(),
        ));
    }

    let connector = Arc::new(EtcdConnector::new(settings.store.clone()));
    let registry = Arc::new(ConnectionRegistry::new(connector));
    let dispatcher = Dispatcher::new(registry.clone(), Handle::current(), &settings.dispatch);

    let mut dispatch_loop = tokio::task::spawn_blocking(move || {
        let mut queue = LineQueue::new(BufReader::new(io::stdin()), io::stdout());
        dispatcher.run(&mut queue)
    });

    info!("Bridge started. Reading tasks from stdin...");
    let result = tokio::select! {
        joined = &mut dispatch_loop => joined.map_err(Error::from).and_then(|r| r),
        signaled = wait_for_signal() => signaled,
    };

    graceful_tx.send(()).map_err(|e| {
        error!("Failed to send shutdown signal: {}", e);
        Error::SignalSenderClosed(format!("Failed to send shutdown signal: {}", e))
    })?;

    registry.shutdown().await;
    info!("Shutdown completed");
    result
}

async fn wait_for_signal() -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| Error::Fatal(format!("failed to install SIGINT handler: {}", e)))?;
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| Error::Fatal(format!("failed to install SIGTERM handler: {}", e)))?;
    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT detected.");
        },
        _ = sigterm.recv() => {
            info!("SIGTERM detected.");
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C detected.");
        },
    }
    Ok(())
}

/// Log to `<dir>/<file_name>` when a directory is configured, stderr
/// otherwise. stdout carries completions.
fn init_observability(log: &LogConfig) -> Result<WorkerGuard> {
    let (non_blocking, guard) = match &log.dir {
        Some(dir) => {
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::NEVER)
                .filename_prefix(&log.file_name)
                .build(dir)
                .map_err(|e| Error::InvalidConfig(format!("log.dir {}: {}", dir.display(), e)))?;
            tracing_appender::non_blocking(appender)
        }
        None => tracing_appender::non_blocking(io::stderr()),
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));
    let base_subscriber = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(log.dir.is_none())
        .with_filter(filter);
    tracing_subscriber::registry().with(base_subscriber).init();

    Ok(guard)
}

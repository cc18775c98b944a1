use lazy_static::lazy_static;
use prometheus::Encoder;
use prometheus::IntCounter;
use prometheus::IntCounterVec;
use prometheus::IntGauge;
use prometheus::Opts;
use prometheus::Registry;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use warp::Filter;
use warp::Rejection;
use warp::Reply;

#[cfg(test)]
mod metrics_test;

lazy_static! {
    pub static ref CONNECTIONS: IntGauge =
        IntGauge::new("bridge_connections", "Open store connections")
            .expect("metric can not be created");

    pub static ref WATCHES: IntGauge =
        IntGauge::new("bridge_watches", "Open watches across all connections")
            .expect("metric can not be created");

    pub static ref COMMANDS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("bridge_commands_total", "Commands dequeued from the host, by kind"),
        &["kind"]
    )
    .expect("metric can not be created");

    pub static ref RECEIVE_REJECTED_TOTAL: IntCounter = IntCounter::new(
        "bridge_receive_rejected_total",
        "Receives refused because one was already outstanding"
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = {
        let registry = Registry::new();
        registry
            .register(Box::new(CONNECTIONS.clone()))
            .expect("collector can be registered");
        registry
            .register(Box::new(WATCHES.clone()))
            .expect("collector can be registered");
        registry
            .register(Box::new(COMMANDS_TOTAL.clone()))
            .expect("collector can be registered");
        registry
            .register(Box::new(RECEIVE_REJECTED_TOTAL.clone()))
            .expect("collector can be registered");
        registry
    };
}

/// Serve `/metrics` until `shutdown_signal` fires
pub async fn start_server(
    port: u16,
    mut shutdown_signal: watch::Receiver<()>,
) {
    let metrics_route = warp::path!("metrics").and_then(metrics_handler);

    info!(port, "metrics server listening");
    let (_, server) =
        warp::serve(metrics_route).bind_with_graceful_shutdown(([0, 0, 0, 0], port), async move {
            let _ = shutdown_signal.changed().await;
        });
    server.await;
}

async fn metrics_handler() -> Result<impl Reply, Rejection> {
    Ok(encode_metrics())
}

/// Text exposition of every bridge metric
pub fn encode_metrics() -> String {
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        error!("could not encode metrics: {}", e);
    }
    match String::from_utf8(buffer) {
        Ok(v) => v,
        Err(e) => {
            error!("metrics could not be from_utf8'd: {}", e);
            String::default()
        }
    }
}

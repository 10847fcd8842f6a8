use anyhow::Context;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// `RUST_LOG` wins over the configured default filter. With `file` set, logs are
/// written there as well as to stdout; keep the guard alive until exit or the
/// tail of the log is lost.
pub fn init_tracing(default_filter: &str, file: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    let (file_layer, guard) = match file {
        Some(path) => {
            let (dir, name) = split_log_path(path)?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .with(file_layer)
        .try_init()
        .context("installing tracing subscriber")?;
    Ok(guard)
}

fn split_log_path(path: &Path) -> anyhow::Result<(PathBuf, PathBuf)> {
    let name = path
        .file_name()
        .with_context(|| format!("log file {} has no file name", path.display()))?;
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((dir, PathBuf::from(name)))
}

#[cfg(feature = "metrics-exporter")]
pub fn init_metrics(port: u16) -> anyhow::Result<()> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()?;

    tracing::info!(port, "Prometheus exporter listening on /metrics");
    describe();
    metrics::gauge!("fairmm_up").set(1.0);
    Ok(())
}

#[cfg(feature = "metrics-exporter")]
fn describe() {
    use metrics::{describe_counter, describe_gauge};

    describe_counter!("fairmm_cycles_total", "Quoting cycles that reached the venue");
    describe_counter!("fairmm_cycles_skipped_total", "Cycles skipped for missing or invalid reference prices");
    describe_counter!("fairmm_orders_placed_total", "Orders acknowledged by the venue");
    describe_counter!("fairmm_orders_rejected_total", "Placements rejected by the venue");
    describe_counter!("fairmm_cancel_failures_total", "Cancels rejected or with unknown outcome");
    describe_counter!("fairmm_stale_updates_total", "Venue order updates discarded as stale");
    describe_counter!("fairmm_risk_halts_total", "Times the risk guard halted trading");
    describe_counter!("fairmm_price_updates_total", "Reference ticker updates applied");
    describe_counter!("fairmm_feed_reconnects_total", "WebSocket reconnects by feed");
    describe_gauge!("fairmm_fair_price", "Last computed fair price");
}

#[cfg(not(feature = "metrics-exporter"))]
pub fn init_metrics(_port: u16) -> anyhow::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_path_is_split_into_dir_and_name() {
        let (dir, name) = split_log_path(Path::new("/var/log/fairmm.log")).unwrap();
        assert_eq!(dir, Path::new("/var/log"));
        assert_eq!(name, Path::new("fairmm.log"));

        let (dir, name) = split_log_path(Path::new("fairmm.log")).unwrap();
        assert_eq!(dir, Path::new("."));
        assert_eq!(name, Path::new("fairmm.log"));

        assert!(split_log_path(Path::new("/")).is_err());
    }
}

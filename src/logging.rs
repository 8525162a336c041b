//! Human-readable console output plus a JSON-lines file log
//!
//! The file (catastro_viewer.log.YYYY-MM-DD in the log dir) holds one JSON
//! object per event so load failures and selections can be grepped or fed
//! to jq after a session.

use std::path::Path;
use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_FILTER: &str = "info,catastro_viewer=debug";
const LOG_FILE_PREFIX: &str = "catastro_viewer.log";

/// Initialize logging. Keep the returned guard alive until exit or the file
/// writer stops flushing.
pub fn init_logging(log_dir: &str) -> anyhow::Result<WorkerGuard> {
    let log_path = Path::new(log_dir);
    if !log_path.exists() {
        std::fs::create_dir_all(log_path)?;
    }

    let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // RUST_LOG wins over the default
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let console_layer = fmt::layer().compact().with_target(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(json_file_layer(non_blocking))
        .try_init()?;

    tracing::info!("Logging initialized. JSON log in {}", log_dir);
    Ok(guard)
}

/// One flat JSON object per event, with source location and thread
fn json_file_layer<S, W>(writer: W) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    fmt::layer()
        .json()
        .with_current_span(false)
        .with_span_list(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_writer(writer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl io::Write for SharedBuf {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(data);
            Ok(data.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_file_layer_writes_json_lines() {
        let buf = SharedBuf(Arc::new(Mutex::new(Vec::new())));
        let make = {
            let buf = buf.clone();
            move || buf.clone()
        };
        let subscriber = tracing_subscriber::registry().with(json_file_layer(make));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(parcel = 7, "Parcel selected");
            tracing::warn!("Sections unavailable");
        });

        let text = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["level"], "INFO");
        assert_eq!(lines[0]["fields"]["message"], "Parcel selected");
        assert_eq!(lines[0]["fields"]["parcel"], 7);
        assert!(lines[0]["target"].as_str().unwrap().starts_with("catastro_viewer"));
        assert!(lines[0]["line_number"].is_number());
        assert_eq!(lines[1]["level"], "WARN");
    }

    #[test]
    fn test_default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }
}

//! Logging Infrastructure
//!
//! Console output plus, when a log directory is configured:
//! - Daily rotating application logs (deleted after 14 days)
//! - Permanent audit logs (`target: "audit"`: payments, verification, cancellations)
//! - Permanent security logs (`target: "security"`: signature and amount mismatches)

use std::fs;
use std::path::{Path, PathBuf};
use tracing::Metadata;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Layer, Registry, filter::filter_fn, fmt, prelude::*};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Application logs older than this are removed
const APP_LOG_RETENTION_DAYS: i64 = 14;

/// Delete `app.YYYY-MM-DD.log` files older than the retention window
///
/// Audit and security logs are never touched.
pub fn cleanup_old_logs(log_dir: &Path) -> anyhow::Result<usize> {
    let cutoff = (chrono::Utc::now() - chrono::Duration::days(APP_LOG_RETENTION_DAYS)).date_naive();
    let app_log_dir = log_dir.join("app");
    if !app_log_dir.exists() {
        return Ok(0);
    }

    let mut removed = 0;
    for entry in fs::read_dir(app_log_dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if let Some(date_part) = name
            .strip_prefix("app.")
            .and_then(|d| d.strip_suffix(".log"))
            && let Ok(date) = chrono::NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
            && date < cutoff
        {
            fs::remove_file(&path)?;
            tracing::info!(file = %name, "Deleted old log file");
            removed += 1;
        }
    }
    Ok(removed)
}

fn is_app_target(meta: &Metadata<'_>) -> bool {
    meta.target() != "audit" && meta.target() != "security"
}

fn is_audit_target(meta: &Metadata<'_>) -> bool {
    meta.target() == "audit"
}

fn is_security_target(meta: &Metadata<'_>) -> bool {
    meta.target() == "security"
}

fn file_layer(
    log_dir: &Path,
    name: &str,
    json_format: bool,
    accept: fn(&Metadata<'_>) -> bool,
) -> anyhow::Result<BoxedLayer> {
    let dir = log_dir.join(name);
    fs::create_dir_all(&dir)?;
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(name)
        .filename_suffix("log")
        .build(dir)?;

    let layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .with_writer(std::sync::Mutex::new(appender));

    Ok(if json_format {
        layer
            .json()
            .with_current_span(true)
            .with_filter(filter_fn(accept))
            .boxed()
    } else {
        layer.with_filter(filter_fn(accept)).boxed()
    })
}

/// Initialize logging
///
/// # Arguments
/// * `level` - default filter when `RUST_LOG` is unset (e.g. "info")
/// * `json_format` - JSON lines (production) or pretty output (development)
/// * `log_dir` - optional directory for the rotating file logs
pub fn init_logger_with_file(
    level: &str,
    json_format: bool,
    log_dir: Option<&str>,
) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let console: BoxedLayer = if json_format {
        fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    };

    let mut layers = vec![console];
    if let Some(dir) = log_dir {
        let log_dir = Path::new(dir);
        layers.push(file_layer(log_dir, "app", json_format, is_app_target)?);
        layers.push(file_layer(log_dir, "audit", json_format, is_audit_target)?);
        layers.push(file_layer(log_dir, "security", json_format, is_security_target)?);

        tokio::spawn(periodic_cleanup(log_dir.to_path_buf()));
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init()?;
    Ok(())
}

/// Hourly cleanup of old application logs
async fn periodic_cleanup(log_dir: PathBuf) {
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(3600));
    loop {
        ticker.tick().await;
        if let Err(e) = cleanup_old_logs(&log_dir) {
            tracing::error!(error = %e, "Failed to cleanup old logs");
        }
    }
}

/// Security log helper
///
/// ```ignore
/// security_log!(WARN, "webhook_signature_invalid", reason = "mismatch");
/// ```
#[macro_export]
macro_rules! security_log {
    (WARN, $event:expr, $($arg:tt)*) => {
        tracing::warn!(
            target: "security",
            event = $event,
            timestamp = chrono::Utc::now().to_rfc3339(),
            $($arg)*
        );
    };
    (ERROR, $event:expr, $($arg:tt)*) => {
        tracing::error!(
            target: "security",
            event = $event,
            timestamp = chrono::Utc::now().to_rfc3339(),
            $($arg)*
        );
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cleanup_removes_only_old_app_logs() {
        let dir = tempfile::tempdir().unwrap();
        let app = dir.path().join("app");
        let audit = dir.path().join("audit");
        fs::create_dir_all(&app).unwrap();
        fs::create_dir_all(&audit).unwrap();

        let old = (chrono::Utc::now() - chrono::Duration::days(30)).format("%Y-%m-%d");
        let today = chrono::Utc::now().format("%Y-%m-%d");
        fs::write(app.join(format!("app.{old}.log")), "old").unwrap();
        fs::write(app.join(format!("app.{today}.log")), "new").unwrap();
        fs::write(app.join("notes.txt"), "keep").unwrap();
        fs::write(audit.join(format!("audit.{old}.log")), "keep").unwrap();

        assert_eq!(cleanup_old_logs(dir.path()).unwrap(), 1);
        assert!(!app.join(format!("app.{old}.log")).exists());
        assert!(app.join(format!("app.{today}.log")).exists());
        assert!(app.join("notes.txt").exists());
        assert!(audit.join(format!("audit.{old}.log")).exists());
    }

    #[test]
    fn test_cleanup_without_app_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(cleanup_old_logs(dir.path()).unwrap(), 0);
    }
}

use std::io::Write;
use std::time::Instant;

use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use parking_lot::Mutex;

/// Log records from other crates (reqwest, hyper, rustls) are capped at this level.
const DEPENDENCY_FILTER: LevelFilter = LevelFilter::Warn;

struct ExplorerLogger {
    file: Option<Mutex<std::fs::File>>,
    filter: LevelFilter,
    start: Instant,
}

impl ExplorerLogger {
    fn is_own_target(target: &str) -> bool {
        target == "intune_explorer" || target.starts_with("intune_explorer::")
    }

    fn format(&self, record: &Record) -> String {
        let elapsed = self.start.elapsed().as_secs_f64();
        format!(
            "[{elapsed:.3}s] [{}] {} - {}",
            record.level(),
            record.target(),
            record.args()
        )
    }
}

impl Log for ExplorerLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        let filter = if Self::is_own_target(metadata.target()) {
            self.filter
        } else {
            self.filter.min(DEPENDENCY_FILTER)
        };
        metadata.level() <= filter
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let line = self.format(record);
        let _ = writeln!(std::io::stderr().lock(), "{line}");
        if let Some(ref file) = self.file {
            let _ = writeln!(file.lock(), "{line}");
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
        if let Some(ref file) = self.file {
            let _ = file.lock().flush();
        }
    }
}

/// Level selected by the number of `-v` flags
#[must_use]
pub fn verbosity_filter(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// `RUST_LOG` (a plain level name) takes precedence over the CLI verbosity.
fn effective_filter(default: LevelFilter, env: Option<&str>) -> LevelFilter {
    env.and_then(|s| s.trim().parse().ok()).unwrap_or(default)
}

/// Initialize the global logger. Must be called once before any logging.
///
/// # Errors
///
/// Returns `SetLoggerError` if a logger was already installed.
pub fn init(default: LevelFilter, log_file: Option<std::fs::File>) -> Result<(), SetLoggerError> {
    let filter = effective_filter(default, std::env::var("RUST_LOG").ok().as_deref());

    let logger = ExplorerLogger {
        file: log_file.map(Mutex::new),
        filter,
        start: Instant::now(),
    };

    log::set_boxed_logger(Box::new(logger))?;
    log::set_max_level(filter);
    Ok(())
}

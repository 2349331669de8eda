//! Stderr logger for the `stereo_calib*` crates.
//!
//! Prints `[elapsed LEVEL module] message`. Records from the workspace crates
//! are filtered at the level given to [`init_with_level`]; records from other
//! crates (decoders, the corner detector backend) are capped at `warn`.
//! Library code only talks to the `log` facade.

use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

use log::{Level, LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::fmt::format::FmtSpan;
#[cfg(feature = "tracing")]
use tracing_subscriber::util::SubscriberInitExt;
#[cfg(feature = "tracing")]
use tracing_subscriber::{fmt, EnvFilter};

const WORKSPACE_TARGET: &str = "stereo_calib";
const DEPENDENCY_LEVEL: LevelFilter = LevelFilter::Warn;

struct CalibLogger {
    level: LevelFilter,
    started: Instant,
}

/// Level filter applied to records from `target`.
fn target_level(target: &str, level: LevelFilter) -> LevelFilter {
    if target.starts_with(WORKSPACE_TARGET) {
        level
    } else {
        level.min(DEPENDENCY_LEVEL)
    }
}

/// `stereo_calib_solve::mono` → `solve::mono`.
fn short_target(target: &str) -> &str {
    target
        .strip_prefix(WORKSPACE_TARGET)
        .map(|rest| rest.trim_start_matches(['_', ':']))
        .filter(|rest| !rest.is_empty())
        .unwrap_or(target)
}

fn enabled_for(target: &str, record_level: Level, level: LevelFilter) -> bool {
    record_level <= target_level(target, level)
}

impl Log for CalibLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        enabled_for(metadata.target(), metadata.level(), self.level)
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let elapsed = self.started.elapsed().as_secs_f64();
        let _ = writeln!(
            std::io::stderr(),
            "[{:7.3}s {:>5} {}] {}",
            elapsed,
            record.level(),
            short_target(record.target()),
            record.args()
        );
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static LOGGER: OnceLock<CalibLogger> = OnceLock::new();

/// Install the stderr logger; `level` applies to the `stereo_calib*` crates.
///
/// Repeated calls after the first successful one are no-ops.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_none() {
        let logger = LOGGER.get_or_init(|| CalibLogger {
            level,
            started: Instant::now(),
        });
        log::set_logger(logger)?;
        log::set_max_level(level);
    }
    Ok(())
}

/// Install a `tracing` subscriber honouring `RUST_LOG` (default `info`).
///
/// `json = true` emits one JSON object per event, with span close timings.
#[cfg(feature = "tracing")]
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE);
    if json {
        let _ = builder.json().flatten_event(true).finish().try_init();
    } else {
        let _ = builder
            .with_timer(fmt::time::Uptime::default())
            .finish()
            .try_init();
    }
}

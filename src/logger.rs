//! Logging setup for programs built on this crate.
//!
//! The library itself only emits `tracing` events: accepted iterations at `debug`,
//! damping trials at `trace`, exhaustion of the damping range at `warn` and every
//! logged error at `error`. Installing a subscriber is left to the application; the
//! helpers here install the `tracing-subscriber` formatter used by the demos.

use tracing::Level;

/// Install the subscriber with `INFO` as default level.
///
/// Output looks like `[INFO 2025-01-31 12:00:00 manifold_lm::observers] message`;
/// `DEBUG` and `TRACE` events show `file:line` instead of the module path.
///
/// ```no_run
/// manifold_lm::init_logger();
/// tracing::info!("ready");
/// ```
///
/// `RUST_LOG` overrides the default, e.g. `RUST_LOG=manifold_lm=debug` prints the
/// per-iteration table of the optimizer.
pub fn init_logger() {
    init_logger_with_level(Level::INFO)
}

/// Install the subscriber with a custom default level.
///
/// Does nothing if a global subscriber is already installed, so tests and demos may
/// call it more than once.
pub fn init_logger_with_level(default_level: Level) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(default_level.into())
                .from_env_lossy(),
        )
        .event_format(BracketFormatter)
        .try_init();
}

/// `[LEVEL timestamp location] message`
struct BracketFormatter;

impl<S, N> tracing_subscriber::fmt::FormatEvent<S, N> for BracketFormatter
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    N: for<'a> tracing_subscriber::fmt::FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &tracing_subscriber::fmt::FmtContext<'_, S, N>,
        mut writer: tracing_subscriber::fmt::format::Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let metadata = event.metadata();
        write!(
            writer,
            "[{} {} {}] ",
            level_tag(*metadata.level()),
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            location(metadata)
        )?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Level name wrapped in its ANSI color.
fn level_tag(level: Level) -> &'static str {
    match level {
        Level::ERROR => "\x1b[31mERROR\x1b[0m",
        Level::WARN => "\x1b[33mWARN\x1b[0m",
        Level::INFO => "\x1b[32mINFO\x1b[0m",
        Level::DEBUG => "\x1b[34mDEBUG\x1b[0m",
        Level::TRACE => "\x1b[35mTRACE\x1b[0m",
    }
}

fn location(metadata: &tracing::Metadata<'_>) -> String {
    let verbose = matches!(*metadata.level(), Level::DEBUG | Level::TRACE);
    match (verbose, metadata.file()) {
        (true, Some(file)) => {
            let name = file.rsplit(['/', '\\']).next().unwrap_or(file);
            match metadata.line() {
                Some(line) => format!("{name}:{line}"),
                None => name.to_string(),
            }
        }
        _ => metadata.target().to_string(),
    }
}

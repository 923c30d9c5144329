//!
//! Structured logging setup, matching the density and tone of this
//! crate's own lineage: notable lifecycle events at `info`, recoverable
//! failures at `warn`, fatal conditions at `error`.
//!

use tracing::{Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

use nu_ansi_term::{Color, Style};

/// Installs a global `tracing` subscriber using [`HostFormat`].
///
/// `default_level` is used unless `RUST_LOG` is set, in which case the
/// environment takes precedence — matching the CLI's `--log_level` flag
/// being an override, not the sole source of truth.
pub fn init(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .event_format(HostFormat)
        .with_env_filter(filter)
        .try_init();
}

/// A terse, level-colored event formatter: `LEVEL target: message`, with
/// no timestamp (the host's own `model_time` is a more meaningful clock
/// than wall time, and call sites that care log it as a field) and no
/// span tree — this runtime's call graph is a single flat step loop, not
/// the nested scopes a formatter needs span context for.
pub struct HostFormat;

impl<S, N> FormatEvent<S, N> for HostFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &tracing_subscriber::fmt::FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let meta = event.metadata();
        let ansi = writer.has_ansi_escapes();

        let style = match *meta.level() {
            Level::TRACE => Style::new().fg(Color::Cyan),
            Level::DEBUG => Style::new().fg(Color::Purple),
            Level::INFO => Style::new().fg(Color::Green),
            Level::WARN => Style::new().fg(Color::Yellow),
            Level::ERROR => Style::new().fg(Color::Red).bold(),
        };

        if ansi {
            write!(writer, "{}", style.prefix())?;
            write!(writer, "{:>5}", meta.level().as_str())?;
            write!(writer, "{}", style.suffix())?;
        } else {
            write!(writer, "{:>5}", meta.level().as_str())?;
        }
        write!(writer, " {}: ", meta.target())?;

        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

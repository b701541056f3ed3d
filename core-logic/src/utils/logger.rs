use chrono::Utc;
use chrono_tz::Tz;
use nu_ansi_term::{Color, Style};
use std::fmt;
use tracing::{Event, Level, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{format::Writer, FmtContext, FormatEvent, FormatFields, FormattedFields},
    prelude::*,
    registry::LookupSpan,
    EnvFilter, Layer,
};

/// Console + hourly-rotated file logging. Timestamps are rendered in
/// `display_zone`. `RUST_LOG` overrides the console filter.
pub fn setup_logger(display_zone: Tz) -> Option<WorkerGuard> {
    std::fs::create_dir_all("logs").ok();

    let file_appender = tracing_appender::rolling::hourly("logs", "app");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // File layer: INFO for task_result and the crates, WARN for dependencies
    let file_filter = tracing_subscriber::filter::Targets::new()
        .with_target("task_result", Level::INFO)
        .with_target("core_logic", Level::INFO)
        .with_target("pharos_swapper", Level::INFO)
        .with_default(Level::WARN);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .event_format(FileFormatter { display_zone })
        .with_filter(file_filter);

    let console_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("warn,task_result=info,core_logic=info,pharos_swapper=info")
    });

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_ansi(true)
        .event_format(TerminalFormatter { display_zone })
        .with_filter(console_filter);

    let installed = tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .try_init();

    // A second call (tests) keeps the first subscriber
    if installed.is_err() {
        return None;
    }

    // Guard must be kept alive by the caller
    Some(guard)
}

// --- Formatters ---

struct MessageVisitor {
    message: String,
}

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        }
    }
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        }
    }
}

fn event_message(event: &Event<'_>) -> String {
    let mut visitor = MessageVisitor {
        message: String::new(),
    };
    event.record(&mut visitor);
    visitor.message
}

/// `W3` for an event inside `worker{id=W3}`; values only, keys dropped.
fn span_prefix<S, N>(ctx: &FmtContext<'_, S, N>) -> Option<String>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    let scope = ctx.event_scope()?;
    let mut parts = Vec::new();
    for span in scope.from_root() {
        let ext = span.extensions();
        if let Some(fields) = ext.get::<FormattedFields<N>>() {
            parts.extend(
                fields
                    .fields
                    .split_whitespace()
                    .map(|kv| kv.split_once('=').map_or(kv, |(_, v)| v).to_string()),
            );
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

pub struct TerminalFormatter {
    display_zone: Tz,
}

impl<S, N> FormatEvent<S, N> for TerminalFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let timestamp = Utc::now()
            .with_timezone(&self.display_zone)
            .format("%H:%M:%S");
        let dim = Style::new().dimmed();
        write!(writer, "{} ", dim.paint(timestamp.to_string()))?;

        let marker = match *event.metadata().level() {
            Level::ERROR => Color::LightRed.bold().paint("✖"),
            Level::WARN => Color::Yellow.bold().paint("!"),
            Level::INFO => Color::LightCyan.paint("•"),
            _ => Color::DarkGray.paint("·"),
        };
        write!(writer, "{} ", marker)?;

        if let Some(prefix) = span_prefix(ctx) {
            write!(writer, "{} ", Color::LightBlue.bold().paint(format!("[{}]", prefix)))?;
        }

        let msg = event_message(event);

        // Colorization for SUCCESS and FAILED
        let colored_msg = if msg.contains("SUCCESS") || msg.contains("Success") {
            let green_text = Style::new().fg(Color::LightGreen).bold();
            msg.replace("SUCCESS", &format!("{}", green_text.paint("SUCCESS")))
                .replace("Success", &format!("{}", green_text.paint("Success")))
        } else if msg.contains("FAILED") || msg.contains("Failed") {
            let red_text = Style::new().fg(Color::LightRed).bold();
            msg.replace("FAILED", &format!("{}", red_text.paint("FAILED")))
                .replace("Failed", &format!("{}", red_text.paint("Failed")))
        } else {
            msg
        };

        write!(writer, "{}", colored_msg)?;
        writeln!(writer)
    }
}

pub struct FileFormatter {
    display_zone: Tz,
}

impl<S, N> FormatEvent<S, N> for FileFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let timestamp = Utc::now()
            .with_timezone(&self.display_zone)
            .format("%Y-%m-%d %H:%M:%S %Z");
        let level = event.metadata().level();

        write!(writer, "{} [{}] ", timestamp, level)?;
        if let Some(prefix) = span_prefix(ctx) {
            write!(writer, "[{}] ", prefix)?;
        }
        writeln!(writer, "{}", event_message(event))
    }
}

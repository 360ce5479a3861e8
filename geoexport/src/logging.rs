//! Configuration des logs (toujours sur stderr, stdout porte les résultats)

use std::fmt;

use clap::ValueEnum;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

/// Format des logs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Texte lisible
    Text,
    /// Un objet JSON par ligne
    Json,
    /// `LEVEL - message`, une ligne par événement, lu par le processus appelant
    #[default]
    Pipe,
}

/// Niveau à partir des options `-v` / `-q`
pub fn level_for(verbose: u8, quiet: bool) -> Level {
    match (quiet, verbose) {
        (true, _) => Level::WARN,
        (_, 0) => Level::INFO,
        (_, 1) => Level::DEBUG,
        (_, _) => Level::TRACE,
    }
}

pub fn init_logging(verbose: u8, quiet: bool, format: LogFormat) {
    let filter = EnvFilter::from_default_env().add_directive(level_for(verbose, quiet).into());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder
            .with_target(true)
            .with_file(false)
            .with_line_number(false)
            .init(),
        LogFormat::Json => builder.json().with_current_span(false).init(),
        LogFormat::Pipe => builder.event_format(PipeFormat).init(),
    }
}

/// Format `LEVEL - message champ=valeur`
pub struct PipeFormat;

impl PipeFormat {
    fn label(level: &Level) -> &'static str {
        match *level {
            Level::ERROR => "ERROR",
            Level::WARN => "WARNING",
            Level::INFO => "INFO",
            Level::DEBUG => "DEBUG",
            Level::TRACE => "TRACE",
        }
    }
}

impl<S, N> FormatEvent<S, N> for PipeFormat
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
        write!(writer, "{} - ", Self::label(event.metadata().level()))?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

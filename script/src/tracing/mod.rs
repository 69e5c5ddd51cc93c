use chrono::{Local, Utc};
use once_cell::sync::Lazy;
use serde_json::{Map, Value};
use std::fmt::Write as _;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::{self, format::Writer, FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// Short identifier shared by every line this process logs
static RUN_ID: Lazy<String> = Lazy::new(|| {
    use uuid::Uuid;
    Uuid::new_v4().to_string().chars().take(6).collect()
});

pub fn run_id() -> &'static str {
    &RUN_ID
}

/// Collects the message and the structured fields of an event.
#[derive(Default)]
struct EventFields {
    message: String,
    fields: Map<String, Value>,
}

impl EventFields {
    fn of(event: &Event<'_>) -> Self {
        let mut visitor = EventFields::default();
        event.record(&mut visitor);
        visitor
    }

    fn insert(&mut self, field: &Field, value: Value) {
        if field.name() == "message" {
            match value {
                Value::String(s) => self.message = s,
                other => self.message = other.to_string(),
            }
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }
}

impl Visit for EventFields {
    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::from(value));
    }
    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::from(value));
    }
    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::from(value));
    }
    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, Value::from(value));
    }
    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.insert(field, Value::from(value.to_string()));
    }
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.insert(field, Value::from(format!("{:?}", value)));
    }
}

fn severity(level: &Level) -> &'static str {
    match *level {
        Level::ERROR => "ERROR",
        Level::WARN => "WARNING",
        Level::INFO => "INFO",
        Level::DEBUG | Level::TRACE => "DEBUG",
    }
}

// One JSON object per line, in the shape Cloud Logging picks up
struct GcpJson;

impl<S, N> FormatEvent<S, N> for GcpJson
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut w: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let meta = event.metadata();
        let EventFields { message, fields } = EventFields::of(event);

        let mut top = Map::new();
        top.insert("time".to_string(), Value::from(Utc::now().to_rfc3339()));
        top.insert("severity".to_string(), Value::from(severity(meta.level())));
        top.insert("target".to_string(), Value::from(meta.target()));
        top.insert("run_id".to_string(), Value::from(run_id()));
        top.insert("message".to_string(), Value::from(message));
        top.extend(fields);

        let line = serde_json::to_string(&Value::Object(top))
            .unwrap_or_else(|_| r#"{"message":"<json-serde-error>"}"#.to_string());
        writeln!(w, "{}", line)
    }
}

// Single-line console output: time, run id, level, target, message, fields
struct ConsoleCompact;

impl<S, N> FormatEvent<S, N> for ConsoleCompact
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut w: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let meta = event.metadata();
        let EventFields { message, fields } = EventFields::of(event);

        write!(
            w,
            "[{}] [{}] [{:<5}] [{}] {}",
            Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
            run_id(),
            meta.level(),
            meta.target(),
            message
        )?;
        if !fields.is_empty() {
            write!(w, " {}", Value::Object(fields))?;
        }
        writeln!(w)
    }
}

/// Installs the global subscriber. `RUST_LOG` filters, defaulting to `info`.
/// On Cloud Run (`K_SERVICE` set) logs go to stdout as JSON, otherwise to
/// stderr in compact form so stdout stays free for command output.
pub fn init_tracing() -> anyhow::Result<()> {
    let default_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    let base = tracing_subscriber::registry().with(default_filter);

    if std::env::var_os("K_SERVICE").is_some() {
        let fmt_layer = fmt::layer()
            .event_format(GcpJson)
            .with_ansi(false)
            .with_writer(std::io::stdout);
        base.with(fmt_layer).try_init()?;
    } else {
        let fmt_layer = fmt::layer()
            .event_format(ConsoleCompact)
            .with_writer(std::io::stderr);
        base.with(fmt_layer).try_init()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_is_stable_and_short() {
        assert_eq!(6, run_id().len());
        assert_eq!(run_id(), run_id());
    }

    #[test]
    fn warn_maps_to_cloud_logging_severity() {
        assert_eq!("WARNING", severity(&Level::WARN));
        assert_eq!("DEBUG", severity(&Level::TRACE));
    }
}

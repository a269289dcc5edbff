//! Logging integration.
//!
//! Configures the global [`tracing`] subscriber from [`Settings`] and provides
//! the span used around every executed statement.

use crate::settings::Settings;

/// Tracing target for executed-statement traces.
pub const QUERY_TARGET: &str = "strata::query";

/// Installs the global tracing subscriber.
///
/// The filter comes from `settings.log_level`; an unparseable directive falls
/// back to `info`. Debug mode uses pretty output, otherwise JSON lines are
/// written. A second call is a no-op.
pub fn setup_logging(settings: &Settings) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&settings.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    if settings.debug {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .pretty()
            .try_init()
            .ok();
    } else {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .try_init()
            .ok();
    }
}

/// Creates a span for one statement.
///
/// ```
/// use strata_core::logging::query_span;
///
/// let span = query_span("sqlite", "select");
/// let _guard = span.enter();
/// tracing::debug!("running");
/// ```
pub fn query_span(dialect: &str, verb: &str) -> tracing::Span {
    tracing::debug_span!("query", dialect = dialect, verb = verb)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_logging_twice_is_harmless() {
        let settings = Settings {
            log_level: "not a valid [directive".to_string(),
            ..Settings::default()
        };
        setup_logging(&settings);
        setup_logging(&settings);
    }

    #[test]
    fn test_query_span_enters() {
        let span = query_span("mysql", "insert");
        let _guard = span.enter();
        tracing::debug!(target: QUERY_TARGET, "inside span");
    }
}

use std::str::FromStr;

use tracing::metadata::LevelFilter;
use tracing_subscriber::{
    Layer, filter::FilterFn, prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt,
};

/// Environment variable consulted by [`init`] for the log level.
pub const LOG_LEVEL_ENV: &str = "LOG_LEVEL";

#[macro_export]
macro_rules! log {
    ($level:expr, $span:expr, $($msg:tt)*) => {{
        let span = $crate::tracing::span!($level, $span);
        let _enter = span.enter();

        $crate::tracing::event!($level, $($msg)*)
    }};
}

/// Events about traffic leaving the gateway (transport calls).
#[macro_export]
macro_rules! outgoing {
    (level = $level:ident, $($msg:tt)*) => {
        $crate::log!($crate::tracing::Level::$level, "outgoing", $($msg)*)
    };

    ($($msg:tt)*) => {
        $crate::outgoing!(level = TRACE, $($msg)*)
    };
}

/// Events about traffic entering the gateway (inbound session turns).
#[macro_export]
macro_rules! incoming {
    (level = $level:ident, $($msg:tt)*) => {
        $crate::log!($crate::tracing::Level::$level, "incoming", $($msg)*)
    };

    ($($msg:tt)*) => {
        $crate::incoming!(level = TRACE, $($msg)*)
    };
}

/// Events about the gateway's own bookkeeping (queue, throttle, cache).
#[macro_export]
macro_rules! internal {
    (level = $level:ident, $($msg:tt)*) => {
        $crate::log!($crate::tracing::Level::$level, "internal", $($msg)*)
    };

    ($($msg:tt)*) => {
        $crate::internal!(level = TRACE, $($msg)*)
    };
}

const fn default_level() -> LevelFilter {
    if cfg!(debug_assertions) {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    }
}

fn parse_level(value: Option<&str>) -> LevelFilter {
    let default = default_level();

    value.map_or(default, |level| {
        LevelFilter::from_str(level).unwrap_or_else(|_| {
            eprintln!("Invalid log level specified {level}, defaulting to {default}");
            default
        })
    })
}

/// Install the global subscriber.
///
/// Only events emitted from `smsgate*` targets are kept, at the level named by
/// `LOG_LEVEL` (falling back to `TRACE` in debug builds and `INFO` otherwise).
/// Calling this more than once is harmless; later calls are ignored.
pub fn init() {
    let level = parse_level(std::env::var(LOG_LEVEL_ENV).ok().as_deref());

    let _ = tracing_subscriber::Registry::default()
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(false)
                .with_line_number(false)
                .compact()
                .with_ansi(true)
                .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339())
                .with_filter(level)
                .with_filter(FilterFn::new(|metadata| {
                    metadata.target().starts_with("smsgate")
                })),
        )
        .try_init();
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn parses_explicit_levels() {
        assert_eq!(parse_level(Some("warn")), LevelFilter::WARN);
        assert_eq!(parse_level(Some("DEBUG")), LevelFilter::DEBUG);
    }

    #[test]
    fn falls_back_on_garbage() {
        assert_eq!(parse_level(Some("loud")), default_level());
        assert_eq!(parse_level(None), default_level());
    }

    #[test]
    fn macros_expand_with_fields() {
        let count = 3;
        crate::internal!("plain message");
        crate::internal!(level = DEBUG, count, "message with {count} field");
        crate::outgoing!(level = INFO, recipient = "94770000000", "sent");
        crate::incoming!("turn received");
    }
}

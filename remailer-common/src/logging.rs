use std::{io::IsTerminal, str::FromStr};

use tracing::{Level, metadata::LevelFilter};
use tracing_subscriber::{
    Layer, filter::FilterFn, prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt,
};

/// Emit an event tagged with the `channel` it belongs to.
#[macro_export]
macro_rules! log {
    ($level:expr, $channel:expr, $($msg:tt)*) => {
        $crate::tracing::event!($level, channel = $channel, $($msg)*)
    };
}

/// SMTP commands and message data written to a remote server.
#[macro_export]
macro_rules! smtp_sent {
    (level = $level:ident, $($msg:tt)*) => {
        $crate::log!($crate::tracing::Level::$level, "smtp.sent", $($msg)*)
    };

    ($($msg:tt)*) => {
        $crate::smtp_sent!(level = TRACE, $($msg)*)
    };
}

/// Replies read back from a remote server.
#[macro_export]
macro_rules! smtp_received {
    (level = $level:ident, $($msg:tt)*) => {
        $crate::log!($crate::tracing::Level::$level, "smtp.received", $($msg)*)
    };

    ($($msg:tt)*) => {
        $crate::smtp_received!(level = TRACE, $($msg)*)
    };
}

/// Spool, tracker and supervisor lifecycle.
#[macro_export]
macro_rules! lifecycle {
    (level = $level:ident, $($msg:tt)*) => {
        $crate::log!($crate::tracing::Level::$level, "lifecycle", $($msg)*)
    };

    ($($msg:tt)*) => {
        $crate::lifecycle!(level = DEBUG, $($msg)*)
    };
}

/// Dependencies are held at WARN unless everything is being traced.
const DEPENDENCY_CEILING: LevelFilter = LevelFilter::WARN;

/// Resolve the level from the `debug` flag and a `LOG_LEVEL` value.
///
/// `debug` wins; an unparseable value falls back to INFO.
pub fn resolve_level(debug: bool, configured: Option<&str>) -> LevelFilter {
    if debug {
        return LevelFilter::DEBUG;
    }

    let default = LevelFilter::INFO;
    configured.map_or(default, |level| {
        LevelFilter::from_str(level.trim()).unwrap_or_else(|_| {
            eprintln!("LOG_LEVEL={level} is not a level, using {default}");
            default
        })
    })
}

/// Whether an event at `level` from `target` passes under `filter`.
pub fn admits(filter: LevelFilter, target: &str, level: &Level) -> bool {
    let ceiling = if target.starts_with("remailer") || filter == LevelFilter::TRACE {
        filter
    } else {
        filter.min(DEPENDENCY_CEILING)
    };
    ceiling >= *level
}

pub fn init(debug: bool) {
    let filter = resolve_level(debug, std::env::var("LOG_LEVEL").ok().as_deref());

    let _ = tracing_subscriber::Registry::default()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_names(filter >= LevelFilter::DEBUG)
                .compact()
                .with_ansi(std::io::stderr().is_terminal())
                .with_writer(std::io::stderr)
                .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339())
                .with_filter(FilterFn::new(move |metadata| {
                    admits(filter, metadata.target(), metadata.level())
                })),
        )
        .try_init();
}

/// Logs a line tagged with a component, which becomes the record's target.
/// The dispatcher set up in [`crate::logging`] adds timestamp, level, pid and tid.
/// Usage:
/// ```ignore
/// agent_log!(Level::Info, "host", "Loaded {} module(s)", n);
/// agent_log!(Level::Error, "config", "Config load failed: {}", err);
/// ```
/// Logs like:
/// [2025-04-25T16:32:10+02:00][INFO ][host][pid=4568][tid=ThreadId(1)] Loaded 3 module(s)
#[macro_export]
macro_rules! agent_log {
    ($level:expr, $component:expr, $fmt:expr $(, $($arg:tt)+)?) => {
        log::log!(target: $component, $level, $fmt $(, $($arg)+)?)
    };
}

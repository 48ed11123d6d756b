//! `printk`-style logging for driver code.

/// Log one line tagged with the emitting driver, the way the kernel log
/// reads when a module prefixes its messages with its own name:
///
/// ```text
/// pr!(Level::Info, "dummydriver", "open was called!");
/// // dummydriver - open was called!
/// ```
///
/// Expands to [`log::log!`], so whatever logger the host installed
/// (fern in the agent, a memory logger in tests) receives the record.
#[macro_export]
macro_rules! pr {
    ($lvl:expr, $who:expr, $fmt:literal $(, $($arg:tt)+)?) => {
        $crate::__log::log!(
            $lvl,
            concat!("{} - ", $fmt),
            $who
            $(, $($arg)+)?
        )
    };
}

#[cfg(test)]
mod tests {
    use log::{Level, LevelFilter, Log, Metadata, Record};
    use std::sync::Mutex;

    struct MemoryLogger(Mutex<Vec<String>>);

    impl Log for MemoryLogger {
        fn enabled(&self, _: &Metadata) -> bool {
            true
        }
        fn log(&self, r: &Record) {
            self.0.lock().unwrap().push(format!("{} {}", r.level(), r.args()));
        }
        fn flush(&self) {}
    }

    static LOGGER: MemoryLogger = MemoryLogger(Mutex::new(Vec::new()));

    #[test]
    fn pr_prefixes_driver_name() {
        let _ = log::set_logger(&LOGGER);
        log::set_max_level(LevelFilter::Trace);

        pr!(Level::Info, "dummydriver", "open was called!");
        pr!(Level::Warn, "LKM_poll", "answer = {}", 42);

        let lines = LOGGER.0.lock().unwrap().clone();
        assert!(lines.iter().any(|l| l == "INFO dummydriver - open was called!"));
        assert!(lines.iter().any(|l| l == "WARN LKM_poll - answer = 42"));
    }
}

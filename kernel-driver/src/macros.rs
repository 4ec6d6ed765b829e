/// Log a line tagged with the engine component it came from.
///
/// ```ignore
/// drv_log!(Level::Info, "worker", "started as {:?}", name);
/// ```
/// The `log` target becomes `unhooker::<component>`, so sinks can filter per
/// component; the line itself reads `[component] message`.
#[macro_export]
macro_rules! drv_log {
    ($level:expr, $component:literal, $fmt:literal $(, $($arg:tt)+)?) => {
        log::log!(
            target: concat!("unhooker::", $component),
            $level,
            concat!("[", $component, "] ", $fmt)
            $(, $($arg)+)?
        )
    };
}

#[cfg(test)]
mod tests {
    use log::{Level, LevelFilter, Log, Metadata, Record};
    use std::sync::Mutex;

    /// A tiny in-memory logger that captures up to DEBUG.
    struct MemoryLogger {
        lines: Mutex<Vec<(String, String)>>,
    }

    impl MemoryLogger {
        const fn new() -> Self {
            MemoryLogger { lines: Mutex::new(Vec::new()) }
        }
    }

    static LOGGER: MemoryLogger = MemoryLogger::new();

    impl Log for MemoryLogger {
        fn enabled(&self, metadata: &Metadata) -> bool {
            metadata.level() <= Level::Debug
        }
        fn log(&self, record: &Record) {
            if self.enabled(record.metadata()) {
                self.lines
                    .lock()
                    .unwrap()
                    .push((record.target().to_owned(), record.args().to_string()));
            }
        }
        fn flush(&self) {}
    }

    #[test]
    fn drv_log_tags_target_and_text() {
        // other tests in this binary do not install a logger
        let _ = log::set_logger(&LOGGER);
        log::set_max_level(LevelFilter::Debug);

        drv_log!(Level::Debug, "scan", "answer={}!", 42);

        let lines = LOGGER.lines.lock().unwrap();
        assert!(
            lines.iter().any(|(target, text)| target == "unhooker::scan" && text == "[scan] answer=42!"),
            "missing line: {:?}",
            *lines
        );
    }
}

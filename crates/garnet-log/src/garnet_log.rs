use chrono::Local;
use log::{Level, Log, SetLoggerError};

pub static GARNET_LOGGER: GarnetLogger = GarnetLogger;

pub struct GarnetLogger;

impl GarnetLogger {
    /// Installs the logger with the given maximum level. Call once at startup.
    pub fn init(level: Level) -> Result<(), SetLoggerError> {
        log::set_logger(&GARNET_LOGGER)?;
        log::set_max_level(level.to_level_filter());
        Ok(())
    }
}

impl Log for GarnetLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level().to_level_filter() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            let now = Local::now();
            let line = format!(
                "{} {} {}",
                now.format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            );
            if record.level() <= Level::Warn {
                eprintln!("{}", line);
            } else {
                println!("{}", line);
            }
        }
    }

    fn flush(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enabled_respects_max_level() {
        let _ = GarnetLogger::init(Level::Info);
        log::set_max_level(log::LevelFilter::Info);
        let info = log::Metadata::builder().level(Level::Info).build();
        let debug = log::Metadata::builder().level(Level::Debug).build();
        assert!(GARNET_LOGGER.enabled(&info));
        assert!(!GARNET_LOGGER.enabled(&debug));
    }
}

//! Logger set-up shared by the examples and applications built on the solvers.
use crate::linalg::errors::LinAlgError;
use chrono::Local;
use log::LevelFilter;
use simplelog::{
    ColorChoice, CombinedLogger, Config, SharedLogger, TermLogger, TerminalMode, WriteLogger,
};
use std::fs::File;

/// "off", "error", "warn", "info", "debug" or "trace"; `None` means info.
pub fn parse_loglevel(loglevel: Option<&str>) -> Result<LevelFilter, LinAlgError> {
    match loglevel.map(|s| s.trim().to_ascii_lowercase()) {
        None => Ok(LevelFilter::Info),
        Some(level) => match level.as_str() {
            "off" | "none" => Ok(LevelFilter::Off),
            "error" => Ok(LevelFilter::Error),
            "warn" => Ok(LevelFilter::Warn),
            "info" => Ok(LevelFilter::Info),
            "debug" => Ok(LevelFilter::Debug),
            "trace" => Ok(LevelFilter::Trace),
            _ => Err(LinAlgError::InputParam(format!(
                "loglevel must be off, error, warn, info, debug or trace, got '{}'",
                level
            ))),
        },
    }
}

/// Terminal logger, plus a `log_<date>_<time>.txt` file when `log_file` is set.
///
/// Returns the name of the log file. Only the first call in a process installs a
/// logger; later calls are accepted and leave the installed one in place.
pub fn init_logger(loglevel: Option<&str>, log_file: bool) -> Result<Option<String>, LinAlgError> {
    let level = parse_loglevel(loglevel)?;
    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )];
    let mut name = None;
    if log_file && level != LevelFilter::Off {
        let date_and_time = Local::now().format("%Y-%m-%d_%H-%M-%S");
        let file_name = format!("log_{}.txt", date_and_time);
        let file = File::create(&file_name)?;
        loggers.push(WriteLogger::new(level, Config::default(), file));
        name = Some(file_name);
    }
    if CombinedLogger::init(loggers).is_err() {
        log::debug!("logger already initialised, keeping the existing one");
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_loglevel() {
        assert_eq!(parse_loglevel(None).unwrap(), LevelFilter::Info);
        assert_eq!(parse_loglevel(Some("DEBUG")).unwrap(), LevelFilter::Debug);
        assert_eq!(parse_loglevel(Some("off")).unwrap(), LevelFilter::Off);
        assert!(parse_loglevel(Some("verbose")).is_err());
    }

    #[test]
    fn test_repeated_init_is_tolerated() {
        assert!(init_logger(Some("warn"), false).is_ok());
        assert!(init_logger(Some("info"), false).is_ok());
        assert!(init_logger(Some("loud"), false).is_err());
    }
}

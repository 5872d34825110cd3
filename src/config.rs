//! Runtime configuration taken from the kernel command line.
//!
//! The command line is a whitespace separated list of `key=value` options. Unknown options are
//! ignored so the bootloader can pass whatever else it likes (e.g. the kernel's path).

use log::{warn, LevelFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootConfig {
    /// `loglevel=<off|error|warn|info|debug|trace>`
    pub log_level: LevelFilter,
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            log_level: LevelFilter::Info,
        }
    }
}

impl BootConfig {
    pub fn from_command_line(cmdline: &str) -> Self {
        let mut config = Self::default();
        let options = cmdline
            .split_ascii_whitespace()
            .filter_map(|option| option.split_once('='));
        for (key, value) in options {
            if key != "loglevel" {
                continue;
            }
            match value.parse() {
                Ok(level) => config.log_level = level,
                Err(_) => warn!("Ignoring invalid log level `{value}`"),
            }
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_info() {
        assert_eq!(BootConfig::from_command_line("").log_level, LevelFilter::Info);
        assert_eq!(BootConfig::default().log_level, LevelFilter::Info);
    }

    #[test]
    fn parses_log_level() {
        let config = BootConfig::from_command_line("/boot/kernel loglevel=debug quiet");
        assert_eq!(config.log_level, LevelFilter::Debug);

        let config = BootConfig::from_command_line("loglevel=TRACE");
        assert_eq!(config.log_level, LevelFilter::Trace);

        let config = BootConfig::from_command_line("loglevel=off");
        assert_eq!(config.log_level, LevelFilter::Off);
    }

    #[test]
    fn invalid_level_keeps_default() {
        let config = BootConfig::from_command_line("loglevel=loud");
        assert_eq!(config.log_level, LevelFilter::Info);
    }

    #[test]
    fn last_option_wins() {
        let config = BootConfig::from_command_line("loglevel=warn foo=bar loglevel=error");
        assert_eq!(config.log_level, LevelFilter::Error);
    }
}

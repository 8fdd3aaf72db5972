//! Process configuration: database location, server mode, log verbosity.

use std::path::{Path, PathBuf};

/// Engine-wide configuration, threaded explicitly from the CLI entry
/// point down to the loader and server — never read from a global.
#[derive(Clone, Debug)]
pub struct Config {
    /// Directory holding `database.csv` and the per-cube fact files.
    pub path: PathBuf,

    /// Toggles the named-pipe server loop instead of the interactive shell.
    pub server_mode: bool,

    /// `0..=4`, mapped to `ERROR..=TRACE` by the CLI's tracing subscriber.
    pub log_level: u8,
}

impl Config {
    /// Initializes a new config for the database at `path`.
    #[must_use]
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            server_mode: false,
            log_level: 2,
        }
    }

    #[must_use]
    pub fn server_mode(mut self, server_mode: bool) -> Self {
        self.server_mode = server_mode;
        self
    }

    /// Clamps to the `0..=4` verbosity range.
    #[must_use]
    pub fn log_level(mut self, log_level: u8) -> Self {
        self.log_level = log_level.min(4);
        self
    }

    #[must_use]
    pub fn log_filter(&self) -> &'static str {
        match self.log_level {
            0 => "error",
            1 => "warn",
            2 => "info",
            3 => "debug",
            _ => "trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn log_level_clamps_to_trace() {
        let config = Config::new("/tmp/db").log_level(9);
        assert_eq!(config.log_level, 4);
        assert_eq!(config.log_filter(), "trace");
    }

    #[test]
    fn builder_methods_compose() {
        let config = Config::new("/tmp/db").server_mode(true).log_level(0);
        assert!(config.server_mode);
        assert_eq!(config.log_filter(), "error");
    }
}

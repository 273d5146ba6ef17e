//! Subscriber setup for binaries and tests.
//!
//! Library code only emits events; installing a subscriber is left to the
//! process that embeds the stages.
use tracing::Level;

#[derive(Debug, Clone, Copy, Default)]
pub struct LogOptions {
    pub verbose: bool,
    pub debug: bool,
}

impl LogOptions {
    pub fn level(&self) -> Level {
        if self.debug {
            Level::DEBUG
        } else if self.verbose {
            Level::INFO
        } else {
            Level::WARN
        }
    }
}

/// Install a fmt subscriber. Returns false if one was already installed.
pub fn init_logging(options: LogOptions) -> bool {
    tracing_subscriber::fmt()
        .with_max_level(options.level())
        .with_target(true)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels() {
        assert_eq!(LogOptions::default().level(), Level::WARN);
        let verbose = LogOptions {
            verbose: true,
            debug: false,
        };
        assert_eq!(verbose.level(), Level::INFO);
        let debug = LogOptions {
            verbose: false,
            debug: true,
        };
        assert_eq!(debug.level(), Level::DEBUG);
    }
}

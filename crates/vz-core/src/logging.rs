//! Logging context built from [`LogConfig`]
//!
//! A scene owns its `LogContext` and runs every redraw under it, so two scenes
//! in one process can log at different levels without touching global state.

use tracing::level_filters::LevelFilter;
use tracing::Dispatch;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

use crate::config::{Appender, LogConfig};

/// A configured tracing dispatcher
#[derive(Clone)]
pub struct LogContext {
    dispatch: Dispatch,
    level: LevelFilter,
}

impl std::fmt::Debug for LogContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogContext").field("level", &self.level).finish()
    }
}

impl LogContext {
    /// Build a dispatcher with one formatting layer per configured appender
    pub fn from_config(config: &LogConfig) -> Self {
        let level = LevelFilter::from(config.level);

        let stdout = config.appenders.contains(&Appender::Stdout).then(|| {
            fmt::layer()
                .with_writer(std::io::stdout)
                .with_target(config.with_target)
        });
        let stderr = config.appenders.contains(&Appender::Stderr).then(|| {
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(config.with_target)
        });

        let subscriber = tracing_subscriber::registry()
            .with(level)
            .with(stdout)
            .with(stderr);

        Self {
            dispatch: Dispatch::new(subscriber),
            level,
        }
    }

    /// A context that discards everything
    pub fn disabled() -> Self {
        Self {
            dispatch: Dispatch::none(),
            level: LevelFilter::OFF,
        }
    }

    pub fn level(&self) -> LevelFilter {
        self.level
    }

    /// Run `f` with this context as the thread's default dispatcher
    pub fn scope<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }

    /// Install this context as the process-wide default
    ///
    /// Returns `false` if a global dispatcher was already set.
    pub fn install_global(&self) -> bool {
        tracing::dispatcher::set_global_default(self.dispatch.clone()).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;

    #[test]
    fn test_scope_runs_closure() {
        let context = LogContext::from_config(&LogConfig {
            level: LogLevel::Warn,
            appenders: Vec::new(),
            with_target: false,
        });
        assert_eq!(context.level(), LevelFilter::WARN);

        let value = context.scope(|| {
            tracing::warn!("inside scoped dispatcher");
            42
        });
        assert_eq!(value, 42);
    }

    #[test]
    fn test_disabled() {
        assert_eq!(LogContext::disabled().level(), LevelFilter::OFF);
    }
}

use std::path::PathBuf;

use serde::Serialize;

use crate::args::Args;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    ZeroCount(&'static str),
    #[error("trace file path is empty")]
    EmptyTracePath,
}

/// Session configuration, read once at startup and shared read-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TracerConfig {
    pub trace_file: PathBuf,
    /// Replace record values with a fixed placeholder in the trace.
    pub mock_values: bool,
    pub record_count: u64,
    pub user_count: u64,
    pub purpose_count: u64,
    pub objection_start: u64,
    pub objection_count: u64,
}

impl TracerConfig {
    pub fn from_args(args: &Args) -> Result<Self, ConfigError> {
        let config = Self {
            trace_file: args.trace_file.clone(),
            mock_values: args.mock_values,
            record_count: args.record_count,
            user_count: args.user_count,
            purpose_count: args.purpose_count,
            objection_start: args.objection_start,
            objection_count: args.objection_count,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.trace_file.as_os_str().is_empty() {
            return Err(ConfigError::EmptyTracePath);
        }
        let counts = [
            ("record count", self.record_count),
            ("user count", self.user_count),
            ("purpose count", self.purpose_count),
            ("objection count", self.objection_count),
        ];
        for (name, count) in counts {
            if count == 0 {
                return Err(ConfigError::ZeroCount(name));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn test_config(trace_file: impl Into<PathBuf>) -> TracerConfig {
    TracerConfig {
        trace_file: trace_file.into(),
        mock_values: true,
        record_count: 100,
        user_count: 10,
        purpose_count: 4,
        objection_start: 25,
        objection_count: 5,
    }
}

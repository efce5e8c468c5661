// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::fmt;

/// Errors that can occur while loading or validating the server configuration
#[derive(Debug)]
pub enum ConfigError {
    /// The configuration file could not be read
    Io {
        /// Path that was being read
        path: String,
        /// Underlying I/O error
        source: std::io::Error,
    },
    /// The configuration file is not valid YAML for this schema
    Parse {
        /// Path that was being parsed
        path: String,
        /// Underlying parser error
        source: serde_yaml::Error,
    },
    /// A setting holds a value the server cannot run with
    Invalid {
        /// Dotted name of the offending setting
        setting: &'static str,
        /// What is wrong with it
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "Failed to read configuration '{}': {}", path, source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "Failed to parse configuration '{}': {}", path, source)
            }
            ConfigError::Invalid { setting, reason } => {
                write!(f, "Invalid setting '{}': {}", setting, reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::Invalid { .. } => None,
        }
    }
}

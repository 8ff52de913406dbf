//! Error types for CLI operations.

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// A collaborator could not be built from configuration
    #[error("Failed to start {component}: {message}")]
    Startup { component: String, message: String },
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn startup(component: impl Into<String>, message: impl ToString) -> Self {
        Self::Startup {
            component: component.into(),
            message: message.to_string(),
        }
    }
}

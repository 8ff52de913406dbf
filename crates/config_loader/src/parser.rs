//! Configuration parsing
//!
//! Parse errors carry the 1-based line of the offending key so operators can
//! find it in a long route table.

use std::path::Path;

use contracts::{ContractError, ServiceConfig};

/// Configuration file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    /// Infer format from a file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    /// Infer format from a config path
    pub fn from_path(path: &Path) -> Result<Self, ContractError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            ContractError::config_parse(format!(
                "cannot determine config format of {}",
                path.display()
            ))
        })?;

        Self::from_extension(ext)
            .ok_or_else(|| ContractError::config_parse(format!("unsupported config format: .{ext}")))
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Toml => "TOML",
            Self::Json => "JSON",
        }
    }
}

/// Parse according to `format`
pub fn parse(content: &str, format: ConfigFormat) -> Result<ServiceConfig, ContractError> {
    match format {
        ConfigFormat::Toml => toml::from_str(content).map_err(|e| {
            let line = e.span().map(|span| line_at(content, span.start));
            parse_error(format, line, e.message().to_string(), e)
        }),
        ConfigFormat::Json => serde_json::from_str(content).map_err(|e| {
            let line = (e.line() > 0).then(|| e.line());
            parse_error(format, line, e.to_string(), e)
        }),
    }
}

fn parse_error<E>(format: ConfigFormat, line: Option<usize>, detail: String, source: E) -> ContractError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let message = match line {
        Some(line) => format!("{} parse error at line {line}: {detail}", format.label()),
        None => format!("{} parse error: {detail}", format.label()),
    };
    ContractError::ConfigParse {
        message,
        source: Some(Box::new(source)),
    }
}

fn line_at(content: &str, offset: usize) -> usize {
    let end = offset.min(content.len());
    content.as_bytes()[..end].iter().filter(|&&b| b == b'\n').count() + 1
}

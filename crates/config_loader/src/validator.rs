//! Configuration validation
//!
//! Rules:
//! - server.bind is a socket address, base_path is `/segment[/segment]`
//! - dispatch.workers > 0, dispatch.queue_capacity > 0
//! - dispatch identity fields and release types are non-empty
//! - routes are unique per (content_type, message_type) and name defined targets
//! - every URL is http(s)

use std::collections::HashSet;
use std::net::SocketAddr;

use contracts::{ContractError, ServiceConfig};

/// Validate a parsed ServiceConfig
///
/// Returns the first error encountered, or Ok(()).
pub fn validate(config: &ServiceConfig) -> Result<(), ContractError> {
    validate_server(config)?;
    validate_dispatch(config)?;
    validate_routes(config)?;
    validate_targets(config)?;
    validate_endpoints(config)?;
    Ok(())
}

fn validate_server(config: &ServiceConfig) -> Result<(), ContractError> {
    let server = &config.server;

    if server.bind.parse::<SocketAddr>().is_err() {
        return Err(ContractError::config_validation(
            "server.bind",
            format!("'{}' is not a socket address", server.bind),
        ));
    }

    let path = &server.base_path;
    if !path.starts_with('/') || path.ends_with('/') || path.contains("//") {
        return Err(ContractError::config_validation(
            "server.base_path",
            format!("'{path}' must start with '/' and have no trailing slash"),
        ));
    }

    Ok(())
}

fn validate_dispatch(config: &ServiceConfig) -> Result<(), ContractError> {
    let dispatch = &config.dispatch;

    if dispatch.workers == 0 {
        return Err(ContractError::config_validation(
            "dispatch.workers",
            "workers must be > 0",
        ));
    }
    if dispatch.queue_capacity == 0 {
        return Err(ContractError::config_validation(
            "dispatch.queue_capacity",
            "queue_capacity must be > 0",
        ));
    }
    if dispatch.source_type.trim().is_empty() {
        return Err(ContractError::config_validation(
            "dispatch.source_type",
            "source_type cannot be empty",
        ));
    }
    if dispatch.source.trim().is_empty() {
        return Err(ContractError::config_validation(
            "dispatch.source",
            "source cannot be empty",
        ));
    }
    if dispatch.settlement_code.trim().is_empty() {
        return Err(ContractError::config_validation(
            "dispatch.settlement_code",
            "settlement_code cannot be empty",
        ));
    }
    for (idx, message_type) in dispatch.release_message_types.iter().enumerate() {
        if message_type.trim().is_empty() {
            return Err(ContractError::config_validation(
                format!("dispatch.release_message_types[{idx}]"),
                "message type cannot be empty",
            ));
        }
    }

    Ok(())
}

fn validate_routes(config: &ServiceConfig) -> Result<(), ContractError> {
    let mut seen = HashSet::new();

    for (idx, route) in config.mapping.routes.iter().enumerate() {
        if route.content_type.trim().is_empty() {
            return Err(ContractError::config_validation(
                format!("mapping.routes[{idx}].content_type"),
                "content_type cannot be empty",
            ));
        }
        if route.message_type.trim().is_empty() {
            return Err(ContractError::config_validation(
                format!("mapping.routes[{idx}].message_type"),
                "message_type cannot be empty",
            ));
        }
        if !seen.insert((
            route.content_type.to_ascii_lowercase(),
            route.message_type.as_str(),
        )) {
            return Err(ContractError::config_validation(
                format!("mapping.routes[{idx}]"),
                format!(
                    "duplicate route for ({}, {})",
                    route.content_type, route.message_type
                ),
            ));
        }
        for target in &route.targets {
            if !config.targets.contains_key(target) {
                return Err(ContractError::config_validation(
                    format!("mapping.routes[{idx}].targets"),
                    format!("target '{target}' is not defined in [targets]"),
                ));
            }
        }
    }

    Ok(())
}

fn validate_targets(config: &ServiceConfig) -> Result<(), ContractError> {
    for (id, target) in &config.targets {
        if id.trim().is_empty() {
            return Err(ContractError::config_validation(
                "targets",
                "target id cannot be empty",
            ));
        }
        check_http_url(&format!("targets.{id}.url"), &target.url)?;
        if target.timeout_ms == 0 {
            return Err(ContractError::config_validation(
                format!("targets.{id}.timeout_ms"),
                "timeout_ms must be > 0",
            ));
        }
    }
    Ok(())
}

fn validate_endpoints(config: &ServiceConfig) -> Result<(), ContractError> {
    if let Some(url) = &config.mapping.remote_url {
        check_http_url("mapping.remote_url", url)?;
    }
    if let Some(url) = &config.ledger.url {
        check_http_url("ledger.url", url)?;
    }
    if config.storage.base_path.trim().is_empty() {
        return Err(ContractError::config_validation(
            "storage.base_path",
            "base_path cannot be empty",
        ));
    }
    Ok(())
}

fn check_http_url(field: &str, url: &str) -> Result<(), ContractError> {
    let rest = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"));
    match rest {
        Some(host) if !host.is_empty() => Ok(()),
        _ => Err(ContractError::config_validation(
            field,
            format!("'{url}' is not an http(s) URL"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{RouteConfig, TargetConfig};

    fn minimal_config() -> ServiceConfig {
        let mut config = ServiceConfig::default();
        config.targets.insert(
            "rtp-out".into(),
            TargetConfig {
                url: "http://rtp.local/in".into(),
                timeout_ms: 1_000,
            },
        );
        config.mapping.routes.push(RouteConfig {
            content_type: "application/xml".into(),
            message_type: "pacs.008".into(),
            targets: vec!["rtp-out".into()],
        });
        config
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&minimal_config()).is_ok());
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&ServiceConfig::default()).is_ok());
    }

    #[test]
    fn test_zero_workers() {
        let mut config = minimal_config();
        config.dispatch.workers = 0;
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("dispatch.workers"));
    }

    #[test]
    fn test_zero_queue_capacity() {
        let mut config = minimal_config();
        config.dispatch.queue_capacity = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_bad_bind_address() {
        let mut config = minimal_config();
        config.server.bind = "localhost".into();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("server.bind"));
    }

    #[test]
    fn test_base_path_trailing_slash() {
        let mut config = minimal_config();
        config.server.base_path = "/msa/out/".into();
        assert!(validate(&config).is_err());

        config.server.base_path = "msa/out".into();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_route_to_undefined_target() {
        let mut config = minimal_config();
        config.mapping.routes[0].targets.push("ghost".into());
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_duplicate_route() {
        let mut config = minimal_config();
        let mut dup = config.mapping.routes[0].clone();
        dup.content_type = "APPLICATION/XML".into();
        config.mapping.routes.push(dup);
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_target_url_scheme() {
        let mut config = minimal_config();
        config.targets.get_mut("rtp-out").unwrap().url = "ftp://rtp.local".into();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("targets.rtp-out.url"));
    }

    #[test]
    fn test_empty_release_type() {
        let mut config = minimal_config();
        config.dispatch.release_message_types.push(" ".into());
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_ledger_url_scheme() {
        let mut config = minimal_config();
        config.ledger.url = Some("ledger.local".into());
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("ledger.url"));
    }
}

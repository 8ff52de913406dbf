//! Target resolvers
//!
//! - `StaticTargetResolver`: route table from configuration
//! - `RemoteTargetResolver`: mapping service over HTTP
//! - `MappingResolver`: selects one of the above from `MappingConfig`

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, instrument, warn};

use contracts::{
    ContractError, MappingConfig, MappingQuery, RequestContext, RouteConfig, TargetId,
    TargetResolver, REQUEST_ID_HEADER,
};

/// Wildcard accepted in `RouteConfig::content_type`
pub const ANY_CONTENT_TYPE: &str = "*";

/// Resolver backed by a fixed route table
#[derive(Debug, Clone, Default)]
pub struct StaticTargetResolver {
    routes: Vec<RouteConfig>,
}

impl StaticTargetResolver {
    pub fn new(routes: Vec<RouteConfig>) -> Self {
        Self { routes }
    }

    /// Exact content type match wins over the wildcard route
    fn lookup(&self, query: &MappingQuery<'_>) -> Option<&RouteConfig> {
        let for_message = || {
            self.routes
                .iter()
                .filter(|route| route.message_type == query.message_type)
        };

        for_message()
            .find(|route| route.content_type.eq_ignore_ascii_case(query.content_type))
            .or_else(|| for_message().find(|route| route.content_type == ANY_CONTENT_TYPE))
    }
}

impl TargetResolver for StaticTargetResolver {
    #[instrument(
        name = "static_resolver_resolve",
        skip(self, _context),
        fields(content_type = %query.content_type, message_type = %query.message_type)
    )]
    async fn resolve(
        &self,
        _context: &RequestContext,
        query: &MappingQuery<'_>,
    ) -> Result<Vec<TargetId>, ContractError> {
        match self.lookup(query) {
            Some(route) => Ok(route.targets.iter().map(|t| TargetId::new(t)).collect()),
            None => {
                warn!("No route configured, nothing to post");
                Ok(Vec::new())
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct MappingResponse {
    #[serde(default)]
    data: Vec<MappingEntry>,
}

#[derive(Debug, Deserialize)]
struct MappingEntry {
    target: String,
}

/// Resolver backed by the mapping service
///
/// `GET <url>?source_type=..&source=..&content_type=..&message_type=..`
/// answering `{"data": [{"target": "..."}]}`.
#[derive(Debug, Clone)]
pub struct RemoteTargetResolver {
    client: reqwest::Client,
    url: String,
}

impl RemoteTargetResolver {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ContractError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ContractError::mapping(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl TargetResolver for RemoteTargetResolver {
    #[instrument(
        name = "remote_resolver_resolve",
        skip(self, context),
        fields(content_type = %query.content_type, message_type = %query.message_type)
    )]
    async fn resolve(
        &self,
        context: &RequestContext,
        query: &MappingQuery<'_>,
    ) -> Result<Vec<TargetId>, ContractError> {
        let response = self
            .client
            .get(&self.url)
            .header(REQUEST_ID_HEADER, context.request_id.to_string())
            .query(&[
                ("source_type", query.source_type),
                ("source", query.source),
                ("content_type", query.content_type),
                ("message_type", query.message_type),
            ])
            .send()
            .await
            .map_err(|e| ContractError::mapping(format!("mapping request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ContractError::mapping(format!(
                "mapping service answered {status}"
            )));
        }

        let body: MappingResponse = response
            .json()
            .await
            .map_err(|e| ContractError::mapping(format!("invalid mapping response: {e}")))?;

        debug!(targets = body.data.len(), "Targets resolved");
        Ok(body.data.into_iter().map(|e| TargetId::from(e.target)).collect())
    }
}

/// Resolver selected by configuration
#[derive(Debug, Clone)]
pub enum MappingResolver {
    Static(StaticTargetResolver),
    Remote(RemoteTargetResolver),
}

impl MappingResolver {
    /// `remote_url` selects the mapping service, otherwise the route table
    pub fn from_config(config: &MappingConfig) -> Result<Self, ContractError> {
        match &config.remote_url {
            Some(url) => Ok(Self::Remote(RemoteTargetResolver::new(
                url.clone(),
                Duration::from_millis(config.timeout_ms),
            )?)),
            None => Ok(Self::Static(StaticTargetResolver::new(config.routes.clone()))),
        }
    }
}

impl TargetResolver for MappingResolver {
    async fn resolve(
        &self,
        context: &RequestContext,
        query: &MappingQuery<'_>,
    ) -> Result<Vec<TargetId>, ContractError> {
        match self {
            Self::Static(resolver) => resolver.resolve(context, query).await,
            Self::Remote(resolver) => resolver.resolve(context, query).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::Method::GET;
    use httpmock::MockServer;
    use serde_json::json;

    fn query<'a>(content_type: &'a str, message_type: &'a str) -> MappingQuery<'a> {
        MappingQuery {
            source_type: "message_out",
            source: "msg_out",
            content_type,
            message_type,
        }
    }

    fn routes() -> Vec<RouteConfig> {
        vec![
            RouteConfig {
                content_type: "*".into(),
                message_type: "pacs.008".into(),
                targets: vec!["fallback".into()],
            },
            RouteConfig {
                content_type: "application/xml".into(),
                message_type: "pacs.008".into(),
                targets: vec!["rtp-out".into(), "audit".into()],
            },
        ]
    }

    #[tokio::test]
    async fn test_static_exact_match_preferred() {
        let resolver = StaticTargetResolver::new(routes());
        let ctx = RequestContext::new("tx-1");

        let targets = resolver
            .resolve(&ctx, &query("application/xml", "pacs.008"))
            .await
            .unwrap();
        assert_eq!(targets, vec![TargetId::new("rtp-out"), TargetId::new("audit")]);

        let targets = resolver
            .resolve(&ctx, &query("application/json", "pacs.008"))
            .await
            .unwrap();
        assert_eq!(targets, vec![TargetId::new("fallback")]);
    }

    #[tokio::test]
    async fn test_static_resolution_is_stable() {
        let resolver = StaticTargetResolver::new(routes());
        let ctx = RequestContext::new("tx-1");
        let q = query("application/xml", "pacs.008");

        let first = resolver.resolve(&ctx, &q).await.unwrap();
        let second = resolver.resolve(&ctx, &q).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_static_unknown_route_is_empty() {
        let resolver = StaticTargetResolver::new(routes());
        let ctx = RequestContext::new("tx-1");
        let targets = resolver
            .resolve(&ctx, &query("application/xml", "camt.056"))
            .await
            .unwrap();
        assert!(targets.is_empty());
    }

    #[tokio::test]
    async fn test_remote_resolver() {
        let server = MockServer::start_async().await;
        let mapping_mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/mapping")
                    .query_param("source_type", "message_out")
                    .query_param("source", "msg_out")
                    .query_param("content_type", "application/xml")
                    .query_param("message_type", "pacs.008.failed");
                then.status(200).json_body(json!({
                    "data": [{"target": "exceptions"}, {"target": "audit"}]
                }));
            })
            .await;

        let resolver =
            RemoteTargetResolver::new(server.url("/mapping"), Duration::from_secs(2)).unwrap();
        let ctx = RequestContext::new("tx-1");
        let targets = resolver
            .resolve(&ctx, &query("application/xml", "pacs.008.failed"))
            .await
            .unwrap();

        assert_eq!(targets, vec![TargetId::new("exceptions"), TargetId::new("audit")]);
        mapping_mock.assert_hits(1);
    }

    #[tokio::test]
    async fn test_remote_resolver_error_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/mapping");
                then.status(503);
            })
            .await;

        let resolver =
            RemoteTargetResolver::new(server.url("/mapping"), Duration::from_secs(2)).unwrap();
        let err = resolver
            .resolve(&RequestContext::new("tx-1"), &query("application/xml", "pacs.008"))
            .await
            .unwrap_err();
        assert!(matches!(err, ContractError::Mapping { .. }));
    }

    #[test]
    fn test_from_config_selects_resolver() {
        let config = MappingConfig::default();
        assert!(matches!(
            MappingResolver::from_config(&config).unwrap(),
            MappingResolver::Static(_)
        ));

        let config = MappingConfig {
            remote_url: Some("http://mapping.local/api".into()),
            ..MappingConfig::default()
        };
        assert!(matches!(
            MappingResolver::from_config(&config).unwrap(),
            MappingResolver::Remote(_)
        ));
    }
}

//! HTTP downstream clients (reqwest)

use std::collections::HashMap;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use tracing::{debug, instrument, warn};

use contracts::{
    ContractError, DownstreamClient, DownstreamClientFactory, ForwardHeaders, OutboundPayload,
    TargetConfig, TargetId,
};

#[derive(Debug, Clone)]
struct Endpoint {
    url: String,
    timeout: Duration,
}

/// Builds clients from the `[targets]` table.
///
/// All clients share one connection pool.
#[derive(Debug, Clone)]
pub struct HttpClientFactory {
    client: reqwest::Client,
    endpoints: HashMap<TargetId, Endpoint>,
}

impl HttpClientFactory {
    pub fn new<'a, I>(targets: I) -> Result<Self, ContractError>
    where
        I: IntoIterator<Item = (&'a String, &'a TargetConfig)>,
    {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ContractError::Other(format!("failed to build HTTP client: {e}")))?;

        let endpoints = targets
            .into_iter()
            .map(|(id, config)| {
                (
                    TargetId::new(id),
                    Endpoint {
                        url: config.url.clone(),
                        timeout: Duration::from_millis(config.timeout_ms),
                    },
                )
            })
            .collect();

        Ok(Self { client, endpoints })
    }

    pub fn target_count(&self) -> usize {
        self.endpoints.len()
    }
}

impl DownstreamClientFactory for HttpClientFactory {
    type Client = HttpDownstreamClient;

    fn client_for(&self, target: &TargetId) -> Result<Self::Client, ContractError> {
        let endpoint = self
            .endpoints
            .get(target.as_str())
            .ok_or_else(|| ContractError::UnknownTarget {
                target: target.to_string(),
            })?;

        Ok(HttpDownstreamClient {
            target: target.clone(),
            url: endpoint.url.clone(),
            timeout: endpoint.timeout,
            client: self.client.clone(),
        })
    }
}

/// Client bound to one target URL
#[derive(Debug, Clone)]
pub struct HttpDownstreamClient {
    target: TargetId,
    url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpDownstreamClient {
    fn header_map(&self, headers: &ForwardHeaders) -> HeaderMap {
        let mut map = HeaderMap::with_capacity(headers.len() + 1);
        for (name, value) in headers.iter() {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    map.append(name, value);
                }
                _ => warn!(target_id = %self.target, header = name, "Skipping unforwardable header"),
            }
        }
        map
    }
}

impl DownstreamClient for HttpDownstreamClient {
    fn target(&self) -> &TargetId {
        &self.target
    }

    #[instrument(
        name = "http_downstream_post",
        skip(self, payload, headers),
        fields(target_id = %self.target, representation = %payload.representation())
    )]
    async fn post(
        &self,
        payload: OutboundPayload<'_>,
        headers: &ForwardHeaders,
    ) -> Result<(), ContractError> {
        let request = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .headers(self.header_map(headers));

        let request = match payload {
            OutboundPayload::Xml(xml) => request
                .header(CONTENT_TYPE, "application/xml")
                .body(xml.to_owned()),
            OutboundPayload::Json(structured) => request.json(structured),
        };

        let response = request
            .send()
            .await
            .map_err(|e| ContractError::downstream(self.target.as_str(), e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ContractError::DownstreamStatus {
                target: self.target.to_string(),
                status: status.as_u16(),
            });
        }

        debug!(status = status.as_u16(), "Posted");
        Ok(())
    }
}

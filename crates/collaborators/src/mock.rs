//! Mock downstream clients
//!
//! Records every post and supports injecting failures per target.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::instrument;

use contracts::{
    ContractError, DownstreamClient, DownstreamClientFactory, ForwardHeaders, OutboundPayload,
    Representation, TargetId,
};

/// Mock factory configuration
#[derive(Debug, Default, Clone)]
pub struct MockConfig {
    /// Targets whose posts fail
    pub fail_targets: Vec<String>,
    /// Targets no client can be built for
    pub unknown_targets: Vec<String>,
    /// Delay applied to every post
    pub post_delay: Option<Duration>,
}

/// One recorded post
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedPost {
    pub target: TargetId,
    pub representation: Representation,
    pub body: String,
    pub headers: ForwardHeaders,
}

#[derive(Debug, Default)]
struct Recorder {
    config: MockConfig,
    posts: Mutex<Vec<RecordedPost>>,
}

/// Factory handing out recording clients
///
/// Clones share the same recording.
#[derive(Debug, Clone, Default)]
pub struct RecordingClientFactory {
    recorder: Arc<Recorder>,
}

impl RecordingClientFactory {
    pub fn new() -> Self {
        Self::with_config(MockConfig::default())
    }

    pub fn with_config(config: MockConfig) -> Self {
        Self {
            recorder: Arc::new(Recorder {
                config,
                posts: Mutex::new(Vec::new()),
            }),
        }
    }

    /// All recorded posts, in order
    pub fn posts(&self) -> Vec<RecordedPost> {
        self.recorder.posts.lock().unwrap().clone()
    }

    /// Recorded posts to one target
    pub fn posts_to(&self, target: &str) -> Vec<RecordedPost> {
        self.posts()
            .into_iter()
            .filter(|post| post.target == target)
            .collect()
    }

    /// Targets posted to, in order, one entry per post
    pub fn posted_targets(&self) -> Vec<String> {
        self.posts()
            .into_iter()
            .map(|post| post.target.to_string())
            .collect()
    }
}

impl DownstreamClientFactory for RecordingClientFactory {
    type Client = RecordingClient;

    fn client_for(&self, target: &TargetId) -> Result<Self::Client, ContractError> {
        if self
            .recorder
            .config
            .unknown_targets
            .iter()
            .any(|t| target == t.as_str())
        {
            return Err(ContractError::UnknownTarget {
                target: target.to_string(),
            });
        }
        Ok(RecordingClient {
            target: target.clone(),
            recorder: Arc::clone(&self.recorder),
        })
    }
}

/// Client recording into its factory
#[derive(Debug, Clone)]
pub struct RecordingClient {
    target: TargetId,
    recorder: Arc<Recorder>,
}

impl DownstreamClient for RecordingClient {
    fn target(&self) -> &TargetId {
        &self.target
    }

    #[instrument(
        name = "mock_downstream_post",
        skip(self, payload, headers),
        fields(target_id = %self.target)
    )]
    async fn post(
        &self,
        payload: OutboundPayload<'_>,
        headers: &ForwardHeaders,
    ) -> Result<(), ContractError> {
        if let Some(delay) = self.recorder.config.post_delay {
            tokio::time::sleep(delay).await;
        }

        let body = match payload {
            OutboundPayload::Xml(xml) => xml.to_string(),
            OutboundPayload::Json(structured) => serde_json::to_string(structured)
                .map_err(|e| ContractError::downstream(self.target.as_str(), e.to_string()))?,
        };

        self.recorder.posts.lock().unwrap().push(RecordedPost {
            target: self.target.clone(),
            representation: payload.representation(),
            body,
            headers: headers.clone(),
        });

        if self
            .recorder
            .config
            .fail_targets
            .iter()
            .any(|t| self.target == t.as_str())
        {
            return Err(ContractError::downstream(self.target.as_str(), "mock failure"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recording_and_failure_injection() {
        let factory = RecordingClientFactory::with_config(MockConfig {
            fail_targets: vec!["bad".into()],
            unknown_targets: vec!["ghost".into()],
            post_delay: None,
        });

        let good = factory.client_for(&TargetId::new("good")).unwrap();
        good.post(OutboundPayload::Xml("<a/>"), &ForwardHeaders::new())
            .await
            .unwrap();

        let bad = factory.client_for(&TargetId::new("bad")).unwrap();
        assert!(bad
            .post(OutboundPayload::Xml("<a/>"), &ForwardHeaders::new())
            .await
            .is_err());

        assert!(matches!(
            factory.client_for(&TargetId::new("ghost")),
            Err(ContractError::UnknownTarget { .. })
        ));

        // Failed posts are still recorded as attempts
        assert_eq!(factory.posted_targets(), vec!["good", "bad"]);
        assert_eq!(factory.posts_to("good")[0].body, "<a/>");
    }
}

//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 示例配置可加载
//! - 真实 HTTP 栈的 e2e 测试（httpmock 充当目标服务与账本）
//! - 优雅关闭排空队列

#[cfg(test)]
mod contract_tests {
    use config_loader::{ConfigFormat, ConfigLoader};

    #[test]
    fn test_contracts_compile() {
        let _ = contracts::ConfigVersion::V1;
    }

    #[test]
    fn test_sample_config_is_valid() {
        let config = ConfigLoader::load_from_str(
            include_str!("../../../config/msg-out.toml"),
            ConfigFormat::Toml,
        )
        .unwrap();

        assert_eq!(config.server.base_path, "/msa/out");
        assert!(config.is_release_eligible("pacs.008"));
        assert!(config.routed_targets().all(|t| config.targets.contains_key(t)));
    }
}

#[cfg(test)]
mod support {
    use std::sync::Arc;
    use std::time::Duration;

    use collaborators::{
        FileEnvelopeStorage, HttpClientFactory, Iso20022Inspector, MappingResolver,
    };
    use contracts::{ServiceConfig, TransactionFinalizer, TransactionLookup};
    use dispatcher::{DispatchCoordinator, DispatchPolicy, DispatchPool, MetricsSnapshot};
    use gateway::AppState;
    use tokio::sync::oneshot;
    use tokio::task::JoinHandle;

    pub const PACS_008: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Document xmlns="urn:iso:std:iso:20022:tech:xsd:pacs.008.001.08">
  <FIToFICstmrCdtTrf>
    <GrpHdr><MsgId>E2E-0001</MsgId></GrpHdr>
    <CdtTrfTxInf>
      <IntrBkSttlmAmt Ccy="EUR">1250.75</IntrBkSttlmAmt>
    </CdtTrfTxInf>
  </FIToFICstmrCdtTrf>
</Document>"#;

    /// Service listening on an ephemeral port
    pub struct RunningService {
        pub endpoint: String,
        stop_tx: oneshot::Sender<()>,
        handle: JoinHandle<MetricsSnapshot>,
    }

    impl RunningService {
        /// Stop HTTP, drain the pool, return the final counters
        pub async fn stop(self) -> MetricsSnapshot {
            let _ = self.stop_tx.send(());
            self.handle.await.unwrap()
        }
    }

    pub async fn start<L>(config: &ServiceConfig, ledger: Arc<L>) -> RunningService
    where
        L: TransactionLookup + TransactionFinalizer + Send + Sync + 'static,
    {
        let coordinator = Arc::new(DispatchCoordinator::new(
            Arc::new(FileEnvelopeStorage::new(&config.storage.base_path).unwrap()),
            Arc::new(MappingResolver::from_config(&config.mapping).unwrap()),
            Arc::new(HttpClientFactory::new(&config.targets).unwrap()),
            Arc::clone(&ledger),
            DispatchPolicy::from_config(&config.dispatch),
        ));
        let pool = DispatchPool::start(
            coordinator,
            config.dispatch.workers,
            config.dispatch.queue_capacity,
        );
        let state = AppState::new(Arc::new(Iso20022Inspector::new()), ledger, pool.queue());
        let router = gateway::router(state, &config.server.base_path);

        let listener = gateway::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let grace = Duration::from_secs(config.dispatch.shutdown_grace_secs);
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            gateway::serve(listener, router, async {
                let _ = stop_rx.await;
            })
            .await
            .unwrap();
            pool.shutdown(grace).await
        });

        RunningService {
            endpoint: format!("http://{addr}{}", config.server.base_path),
            stop_tx,
            handle,
        }
    }

    /// Poll a mock until it has at least `hits` hits
    pub async fn wait_for_hits(mock: &httpmock::Mock<'_>, hits: usize) -> bool {
        for _ in 0..200 {
            if mock.hits_async().await >= hits {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        false
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use collaborators::{Ledger, LedgerCall, MemoryLedger};
    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{RouteConfig, ServiceConfig, TRANSACTION_ID_HEADER};
    use gateway::{ApiResponse, ResponseStatus};
    use httpmock::Method::{GET, POST};
    use httpmock::MockServer;
    use serde_json::json;
    use tempfile::TempDir;

    use crate::support::{start, wait_for_hits, PACS_008};

    /// Service config routing pacs.008 to `rtp-out` then `audit`, and
    /// its failure type to `exceptions`, all on `targets`.
    fn config(targets: &MockServer, ledger_url: Option<String>, storage: &TempDir) -> ServiceConfig {
        let ledger = ledger_url
            .map(|url| format!("url = \"{url}\""))
            .unwrap_or_default();
        let toml = format!(
            r#"
[server]
bind = "127.0.0.1:0"
base_path = "/msa/out"

[dispatch]
workers = 2
queue_capacity = 16
shutdown_grace_secs = 10

[[mapping.routes]]
content_type = "*"
message_type = "pacs.008"
targets = ["rtp-out", "audit"]

[[mapping.routes]]
content_type = "*"
message_type = "pacs.008.failed"
targets = ["exceptions"]

[targets.rtp-out]
url = "{rtp}"

[targets.audit]
url = "{audit}"

[targets.exceptions]
url = "{exceptions}"

[storage]
base_path = '{storage}'

[ledger]
{ledger}
"#,
            rtp = targets.url("/rtp"),
            audit = targets.url("/audit"),
            exceptions = targets.url("/exceptions"),
            storage = storage.path().display(),
        );
        ConfigLoader::load_from_str(&toml, ConfigFormat::Toml).unwrap()
    }

    async fn post_message(
        endpoint: &str,
        transaction_id: &str,
        content_type: &str,
        body: &str,
    ) -> (u16, ApiResponse) {
        let response = reqwest::Client::new()
            .post(endpoint)
            .header(TRANSACTION_ID_HEADER, transaction_id)
            .header("content-type", content_type)
            .body(body.to_string())
            .send()
            .await
            .unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap())
    }

    /// Every target accepts, transaction released
    #[tokio::test]
    async fn test_e2e_release() {
        let targets = MockServer::start_async().await;
        let ledger = MockServer::start_async().await;
        let storage = tempfile::tempdir().unwrap();

        let rtp = targets
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/rtp")
                    .header("content-type", "application/xml")
                    .header("x-transaction-id", "tx-100")
                    .body(PACS_008);
                then.status(200);
            })
            .await;
        let audit = targets
            .mock_async(|when, then| {
                when.method(POST).path("/audit");
                then.status(202);
            })
            .await;
        let exceptions = targets
            .mock_async(|when, then| {
                when.method(POST).path("/exceptions");
                then.status(200);
            })
            .await;
        ledger
            .mock_async(|when, then| {
                when.method(GET).path("/transactions/tx-100");
                then.status(200);
            })
            .await;
        let release = ledger
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/transactions/tx-100/release")
                    .json_body_partial(
                        r#"{"response_code":"ACSC","response_message":"ACSC","currency":"EUR","message_version":"pacs.008.001.08"}"#,
                    );
                then.status(200);
            })
            .await;
        let fail = ledger
            .mock_async(|when, then| {
                when.method(POST).path("/transactions/tx-100/fail");
                then.status(200);
            })
            .await;

        let config = config(&targets, Some(ledger.base_url()), &storage);
        let service = start(&config, Arc::new(Ledger::from_config(&config.ledger).unwrap())).await;

        let (status, body) =
            post_message(&service.endpoint, "tx-100", "application/xml", PACS_008).await;
        assert_eq!(status, 201);
        assert_eq!(body.status, ResponseStatus::Ok);
        assert_eq!(body.message, "Request was received");

        assert!(wait_for_hits(&release, 1).await);
        assert_eq!(rtp.hits_async().await, 1);
        assert_eq!(audit.hits_async().await, 1);
        assert_eq!(exceptions.hits_async().await, 0);
        assert_eq!(fail.hits_async().await, 0);

        let stored = storage
            .path()
            .join(format!("out/tx-100/{}.xml", body.request_id));
        assert_eq!(std::fs::read_to_string(stored).unwrap(), PACS_008);

        let snapshot = service.stop().await;
        assert_eq!(snapshot.released, 1);
        assert_eq!(snapshot.failed, 0);
    }

    /// A target refuses, failure message sent, transaction failed
    #[tokio::test]
    async fn test_e2e_target_failure_compensates() {
        let targets = MockServer::start_async().await;
        let ledger = MockServer::start_async().await;
        let storage = tempfile::tempdir().unwrap();

        let rtp = targets
            .mock_async(|when, then| {
                when.method(POST).path("/rtp");
                then.status(200);
            })
            .await;
        let audit = targets
            .mock_async(|when, then| {
                when.method(POST).path("/audit");
                then.status(500);
            })
            .await;
        let exceptions = targets
            .mock_async(|when, then| {
                when.method(POST).path("/exceptions").body(PACS_008);
                then.status(200);
            })
            .await;
        ledger
            .mock_async(|when, then| {
                when.method(GET).path("/transactions/tx-200");
                then.status(200);
            })
            .await;
        let release = ledger
            .mock_async(|when, then| {
                when.method(POST).path("/transactions/tx-200/release");
                then.status(200);
            })
            .await;
        let fail = ledger
            .mock_async(|when, then| {
                when.method(POST).path("/transactions/tx-200/fail");
                then.status(200);
            })
            .await;

        let config = config(&targets, Some(ledger.base_url()), &storage);
        let service = start(&config, Arc::new(Ledger::from_config(&config.ledger).unwrap())).await;

        let (status, _) =
            post_message(&service.endpoint, "tx-200", "application/xml", PACS_008).await;
        // Acknowledged before the dispatch fails
        assert_eq!(status, 201);

        assert!(wait_for_hits(&fail, 1).await);
        assert_eq!(rtp.hits_async().await, 1);
        assert_eq!(audit.hits_async().await, 1);
        assert_eq!(exceptions.hits_async().await, 1);
        assert_eq!(release.hits_async().await, 0);

        let snapshot = service.stop().await;
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.compensation_failures, 0);
        assert_eq!(fail.hits_async().await, 1);
    }

    /// The failure fan-out fails too, `fail` still issued once
    #[tokio::test]
    async fn test_e2e_compensation_failure_still_fails_once() {
        let targets = MockServer::start_async().await;
        let storage = tempfile::tempdir().unwrap();

        targets
            .mock_async(|when, then| {
                when.method(POST).path("/rtp");
                then.status(503);
            })
            .await;
        let exceptions = targets
            .mock_async(|when, then| {
                when.method(POST).path("/exceptions");
                then.status(500);
            })
            .await;

        let config = config(&targets, None, &storage);
        let ledger = Arc::new(MemoryLedger::permissive());
        let service = start(&config, Arc::clone(&ledger)).await;

        let (status, _) =
            post_message(&service.endpoint, "tx-300", "application/xml", PACS_008).await;
        assert_eq!(status, 201);

        assert!(ledger.wait_for_calls(1, Duration::from_secs(5)).await);
        let snapshot = service.stop().await;

        assert_eq!(exceptions.hits_async().await, 1);
        assert_eq!(snapshot.compensation_failures, 1);
        let calls = ledger.calls_for("tx-300");
        assert_eq!(calls.len(), 1);
        match &calls[0] {
            LedgerCall::Fail {
                storage_reference, ..
            } => assert!(storage_reference.is_some()),
            other => panic!("unexpected call {other:?}"),
        }
    }

    /// The 201 is returned while the first target is still answering
    #[tokio::test]
    async fn test_e2e_acknowledged_before_delivery() {
        let targets = MockServer::start_async().await;
        let ledger = MockServer::start_async().await;
        let storage = tempfile::tempdir().unwrap();

        let rtp = targets
            .mock_async(|when, then| {
                when.method(POST).path("/rtp");
                then.status(200).delay(Duration::from_secs(3));
            })
            .await;
        targets
            .mock_async(|when, then| {
                when.method(POST).path("/audit");
                then.status(200);
            })
            .await;
        ledger
            .mock_async(|when, then| {
                when.method(GET).path("/transactions/tx-150");
                then.status(200);
            })
            .await;
        let release = ledger
            .mock_async(|when, then| {
                when.method(POST).path("/transactions/tx-150/release");
                then.status(200);
            })
            .await;

        let config = config(&targets, Some(ledger.base_url()), &storage);
        let service = start(&config, Arc::new(Ledger::from_config(&config.ledger).unwrap())).await;

        let started = std::time::Instant::now();
        let (status, _) =
            post_message(&service.endpoint, "tx-150", "application/xml", PACS_008).await;
        let ack = started.elapsed();

        assert_eq!(status, 201);
        assert!(ack < Duration::from_secs(1), "acknowledged after {ack:?}");
        assert_eq!(release.hits_async().await, 0);

        assert!(wait_for_hits(&release, 1).await);
        assert_eq!(rtp.hits_async().await, 1);
        assert!(started.elapsed() >= Duration::from_secs(3));

        let snapshot = service.stop().await;
        assert_eq!(snapshot.released, 1);
    }

    /// Delivered but not release-eligible, no ledger call at all
    #[tokio::test]
    async fn test_e2e_not_release_eligible() {
        let targets = MockServer::start_async().await;
        let storage = tempfile::tempdir().unwrap();

        let audit = targets
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/audit")
                    .header("content-type", "application/json")
                    .json_body_partial(r#"{"message_type":"camt.056"}"#);
                then.status(200);
            })
            .await;
        let exceptions = targets
            .mock_async(|when, then| {
                when.method(POST).path("/exceptions");
                then.status(200);
            })
            .await;

        let mut config = config(&targets, None, &storage);
        config.mapping.routes.push(RouteConfig {
            content_type: "*".into(),
            message_type: "camt.056".into(),
            targets: vec!["audit".into()],
        });
        let ledger = Arc::new(MemoryLedger::permissive());
        let service = start(&config, Arc::clone(&ledger)).await;

        let body = r#"{"message_type":"camt.056","message_version":"camt.056.001.08","currency":"EUR","amount":"75.00"}"#;
        let (status, _) = post_message(&service.endpoint, "tx-600", "application/json", body).await;
        assert_eq!(status, 201);

        assert!(wait_for_hits(&audit, 1).await);
        let snapshot = service.stop().await;

        assert_eq!(snapshot.delivered, 1);
        assert_eq!(snapshot.released, 0);
        assert_eq!(snapshot.failed, 0);
        assert_eq!(exceptions.hits_async().await, 0);
        assert!(ledger.calls().is_empty());
    }

    #[tokio::test]
    async fn test_e2e_unknown_transaction_rejected() {
        let targets = MockServer::start_async().await;
        let ledger = MockServer::start_async().await;
        let storage = tempfile::tempdir().unwrap();

        let any_target = targets
            .mock_async(|when, then| {
                when.method(POST);
                then.status(200);
            })
            .await;
        ledger
            .mock_async(|when, then| {
                when.method(GET).path("/transactions/tx-missing");
                then.status(404);
            })
            .await;

        let config = config(&targets, Some(ledger.base_url()), &storage);
        let service = start(&config, Arc::new(Ledger::from_config(&config.ledger).unwrap())).await;

        let (status, body) =
            post_message(&service.endpoint, "tx-missing", "application/xml", PACS_008).await;
        assert_eq!(status, 404);
        assert_eq!(body.status, ResponseStatus::Rejected);
        assert_eq!(body.message, "Could not find such transaction");

        let snapshot = service.stop().await;
        assert_eq!(snapshot.submitted, 0);
        assert_eq!(any_target.hits_async().await, 0);
    }

    /// A content type matching both rules posts both representations
    #[tokio::test]
    async fn test_e2e_dual_representation() {
        let targets = MockServer::start_async().await;
        let storage = tempfile::tempdir().unwrap();

        let rtp_xml = targets
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/rtp")
                    .header("content-type", "application/xml");
                then.status(200);
            })
            .await;
        let rtp_json = targets
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/rtp")
                    .header("content-type", "application/json")
                    .json_body_partial(r#"{"message_type":"pacs.008","currency":"EUR"}"#);
                then.status(200);
            })
            .await;
        let audit = targets
            .mock_async(|when, then| {
                when.method(POST).path("/audit");
                then.status(200);
            })
            .await;

        let config = config(&targets, None, &storage);
        let ledger = Arc::new(MemoryLedger::permissive());
        let service = start(&config, Arc::clone(&ledger)).await;

        let (status, _) = post_message(
            &service.endpoint,
            "tx-400",
            "application/vnd.iso20022.xml+json",
            PACS_008,
        )
        .await;
        assert_eq!(status, 201);

        assert!(ledger.wait_for_calls(1, Duration::from_secs(5)).await);
        service.stop().await;

        assert_eq!(rtp_xml.hits_async().await, 1);
        assert_eq!(rtp_json.hits_async().await, 1);
        assert_eq!(audit.hits_async().await, 2);
        assert!(matches!(ledger.calls()[0], LedgerCall::Release { .. }));
    }

    #[tokio::test]
    async fn test_e2e_remote_mapping() {
        let targets = MockServer::start_async().await;
        let mapping = MockServer::start_async().await;
        let storage = tempfile::tempdir().unwrap();

        let mapping_mock = mapping
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/mappings")
                    .query_param("source_type", "message_out")
                    .query_param("source", "msg_out")
                    .query_param("content_type", "application/xml")
                    .query_param("message_type", "pacs.008");
                then.status(200)
                    .json_body(json!({"data": [{"target": "audit"}]}));
            })
            .await;
        let rtp = targets
            .mock_async(|when, then| {
                when.method(POST).path("/rtp");
                then.status(200);
            })
            .await;
        let audit = targets
            .mock_async(|when, then| {
                when.method(POST).path("/audit");
                then.status(200);
            })
            .await;

        let mut config = config(&targets, None, &storage);
        config.mapping.remote_url = Some(mapping.url("/mappings"));
        let ledger = Arc::new(MemoryLedger::permissive());
        let service = start(&config, Arc::clone(&ledger)).await;

        let (status, _) =
            post_message(&service.endpoint, "tx-500", "application/xml", PACS_008).await;
        assert_eq!(status, 201);

        assert!(ledger.wait_for_calls(1, Duration::from_secs(5)).await);
        service.stop().await;

        mapping_mock.assert_hits(1);
        assert_eq!(audit.hits_async().await, 1);
        assert_eq!(rtp.hits_async().await, 0);
    }

    /// Accepted work is finished before shutdown completes
    #[tokio::test]
    async fn test_e2e_shutdown_drains_accepted_work() {
        let targets = MockServer::start_async().await;
        let storage = tempfile::tempdir().unwrap();

        targets
            .mock_async(|when, then| {
                when.method(POST);
                then.status(200).delay(Duration::from_millis(50));
            })
            .await;

        let mut config = config(&targets, None, &storage);
        config.dispatch.workers = 1;
        let ledger = Arc::new(MemoryLedger::permissive());
        let service = start(&config, Arc::clone(&ledger)).await;

        for i in 0..5 {
            let (status, _) = post_message(
                &service.endpoint,
                &format!("tx-drain-{i}"),
                "application/xml",
                PACS_008,
            )
            .await;
            assert_eq!(status, 201);
        }

        let endpoint = service.endpoint.clone();
        let snapshot = service.stop().await;

        assert_eq!(snapshot.submitted, 5);
        assert_eq!(snapshot.released, 5);
        assert_eq!(ledger.calls().len(), 5);

        // Listener is gone once stopped
        let late = reqwest::Client::new()
            .post(&endpoint)
            .header(TRANSACTION_ID_HEADER, "tx-late")
            .body(PACS_008)
            .send()
            .await;
        assert!(late.is_err());
    }

    #[tokio::test]
    async fn test_e2e_validation_order() {
        let targets = MockServer::start_async().await;
        let storage = tempfile::tempdir().unwrap();
        let config = config(&targets, None, &storage);
        let service = start(&config, Arc::new(MemoryLedger::permissive())).await;
        let client = reqwest::Client::new();

        let response = client
            .post(&service.endpoint)
            .header("content-type", "application/xml")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 400);
        let body: ApiResponse = response.json().await.unwrap();
        assert_eq!(body.message, "Missing message body");

        let response = client
            .post(&service.endpoint)
            .header("content-type", "application/xml")
            .body(PACS_008)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 400);
        let body: ApiResponse = response.json().await.unwrap();
        assert_eq!(body.message, "Missing X-Transaction-Id HTTP header");

        let (status, body) =
            post_message(&service.endpoint, "tx-1", "application/json", "{}").await;
        assert_eq!(status, 400);
        assert_eq!(body.message, "Received an invalid incoming message");

        let health: ApiResponse = client
            .get(format!("{}/_healthy", service.endpoint))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health.message, "Healthy");

        let trailing = client
            .post(format!("{}/", service.endpoint))
            .header(TRANSACTION_ID_HEADER, "tx-1")
            .header("content-type", "application/xml")
            .body(PACS_008)
            .send()
            .await
            .unwrap();
        assert_eq!(trailing.status().as_u16(), 404);

        let snapshot = service.stop().await;
        assert_eq!(snapshot.submitted, 0);
    }
}

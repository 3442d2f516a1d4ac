//! Pipeline against an HTTP npm registry stand-in

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use version_lens::config::{PipelineConfig, QueueConfig};
use version_lens::orchestrator::{DependencyOutcome, Pipeline, ResolveRequest};
use version_lens::parser::{ManifestParser, PackageJsonParser};
use version_lens::version::classifier::{UpgradeAnnouncement, UpgradeTier};
use version_lens::version::registries::NpmRegistry;

fn npm_body(latest: &str, versions: &[&str]) -> String {
    let versions: serde_json::Map<String, serde_json::Value> = versions
        .iter()
        .map(|v| (v.to_string(), json!({ "version": v })))
        .collect();
    json!({ "dist-tags": { "latest": latest }, "versions": versions }).to_string()
}

#[tokio::test]
async fn resolves_manifest_against_http_registry() {
    let mut server = mockito::Server::new_async().await;
    let express = server
        .mock("GET", "/express")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(npm_body(
            "5.0.1",
            &["4.17.1", "4.18.2", "4.19.0", "5.0.0-beta.3", "5.0.1"],
        ))
        .expect(1)
        .create_async()
        .await;
    let types_node = server
        .mock("GET", "/@types%2Fnode")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(npm_body("20.11.0", &["20.10.0", "20.11.0"]))
        .expect(1)
        .create_async()
        .await;
    let missing = server
        .mock("GET", "/does-not-exist")
        .with_status(404)
        .expect(1)
        .create_async()
        .await;
    let forbidden = server
        .mock("GET", "/private-pkg")
        .with_status(403)
        .expect(1)
        .create_async()
        .await;

    let content = r#"{
  "dependencies": {
    "express": "^4.17.1",
    "does-not-exist": "1.0.0",
    "private-pkg": "1.0.0"
  },
  "devDependencies": {
    "@types/node": "~20.11.0"
  }
}"#;
    let dependencies = PackageJsonParser::new().parse(content).unwrap();

    let mut config = PipelineConfig::default();
    config.registry.url = server.url();
    let registry = NpmRegistry::new(&config.registry.url);
    let handle = Pipeline::start(config, Arc::new(registry));

    let report = handle
        .orchestrator()
        .resolve_scope(ResolveRequest::new("file:///app/package.json", dependencies))
        .await;

    assert_eq!(
        report.outcome_of("express"),
        Some(&DependencyOutcome::Upgrades(vec![
            UpgradeAnnouncement::new(UpgradeTier::Major, "5.0.1"),
            UpgradeAnnouncement::new(UpgradeTier::Minor, "4.19.0"),
        ]))
    );
    assert_eq!(report.outcome_of("@types/node"), Some(&DependencyOutcome::UpToDate));
    assert!(matches!(
        report.outcome_of("does-not-exist"),
        Some(DependencyOutcome::Failed(_))
    ));
    // 403 is permanent: a single request, no retries
    assert!(matches!(
        report.outcome_of("private-pkg"),
        Some(DependencyOutcome::Failed(message)) if message.contains("403")
    ));

    handle.shutdown().await;

    express.assert_async().await;
    types_node.assert_async().await;
    missing.assert_async().await;
    forbidden.assert_async().await;
}

#[tokio::test]
async fn connection_dropped_mid_body_is_retried() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));

    let server = tokio::spawn({
        let hits = Arc::clone(&hits);
        async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                hits.fetch_add(1, Ordering::SeqCst);
                let mut request = [0u8; 1024];
                let _ = socket.read(&mut request).await;
                let _ = socket
                    .write_all(
                        b"HTTP/1.1 200 OK\r\ncontent-type: application/json\r\n\
                          content-length: 5000\r\nconnection: close\r\n\r\n{\"dist-tags\":",
                    )
                    .await;
            }
        }
    });

    let mut config = PipelineConfig {
        queue: QueueConfig {
            max_retries: 3,
            base_retry_delay_ms: 10,
            ..QueueConfig::default()
        },
        ..PipelineConfig::default()
    };
    config.registry.url = format!("http://{}", addr);
    let registry = NpmRegistry::new(&config.registry.url);
    let handle = Pipeline::start(config, Arc::new(registry));

    let dependencies = PackageJsonParser::new()
        .parse(r#"{ "dependencies": { "lodash": "4.17.21" } }"#)
        .unwrap();
    let report = handle
        .orchestrator()
        .resolve_scope(ResolveRequest::new("file:///app/package.json", dependencies))
        .await;

    assert!(matches!(
        report.outcome_of("lodash"),
        Some(DependencyOutcome::Failed(message)) if message.contains("4 attempt")
    ));
    assert_eq!(hits.load(Ordering::SeqCst), 4);

    handle.shutdown().await;
    server.abort();
}

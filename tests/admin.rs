//! Admin listener endpoints on a running node.

use serde_json::Value;
use std::time::Duration;

mod common;
use common::{eventually, TestNode};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn health_ready_and_metrics() {
    let node = TestNode::start(&[]).await;
    let client = reqwest::Client::new();
    let admin = node.admin_url();

    let health: Value = client
        .get(format!("{admin}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");

    {
        let client = client.clone();
        let url = format!("{admin}/ready");
        eventually("node ready", Duration::from_secs(5), move || {
            let client = client.clone();
            let url = url.clone();
            async move {
                client
                    .get(url)
                    .send()
                    .await
                    .is_ok_and(|r| r.status().is_success())
            }
        })
        .await;
    }

    // One unrouted request so the proxy series exist.
    let response = client
        .get(node.proxy_url())
        .header("x-endpoint-id", "missing")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    let response = client.get(format!("{admin}/metrics")).send().await.unwrap();
    assert_eq!(response.status(), 200);
    let text = response.text().await.unwrap();
    assert!(text.contains("proxy_requests_total"), "{text}");

    node.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn status_pages() {
    let node = TestNode::start(&[]).await;
    let client = reqwest::Client::new();
    let admin = node.admin_url();

    let netmap: Value = client
        .get(format!("{admin}/status/netmap"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(netmap["local_id"], node.id.as_str());
    assert_eq!(netmap["nodes"].as_array().unwrap().len(), 1);

    let local: Value = client
        .get(format!("{admin}/status/netmap/nodes/{}", node.id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(local["id"], node.id.as_str());

    for page in ["gossip", "proxy"] {
        let response = client
            .get(format!("{admin}/status/{page}"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200, "{page}");
    }

    let response = client
        .get(format!("{admin}/status/unknown"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    node.stop().await;
}

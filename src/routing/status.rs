//! Proxy status for the admin server, mounted at `/status/proxy`.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::admin::StatusProvider;
use crate::routing::router::ProxyRouter;

#[derive(Serialize)]
struct EndpointView {
    endpoint_id: String,
    connections: usize,
}

#[derive(Serialize)]
struct ProxyView {
    node_id: String,
    endpoints: Vec<EndpointView>,
    in_flight: u64,
    outcomes: BTreeMap<&'static str, u64>,
}

impl StatusProvider for ProxyRouter {
    fn status(&self, path: &str) -> Option<Value> {
        if !path.is_empty() {
            return None;
        }
        let view = ProxyView {
            node_id: self.map.local_id().to_string(),
            endpoints: self
                .registry
                .endpoints()
                .into_iter()
                .map(|(endpoint_id, connections)| EndpointView {
                    endpoint_id,
                    connections,
                })
                .collect(),
            in_flight: self.in_flight.count(),
            outcomes: self
                .outcomes
                .iter()
                .map(|entry| (*entry.key(), *entry.value()))
                .collect(),
        };
        serde_json::to_value(view).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProxyConfig;
    use crate::netmap::{NetworkMap, Node};
    use crate::upstream::UpstreamRegistry;
    use std::sync::Arc;

    #[test]
    fn reports_outcomes() {
        let map = Arc::new(NetworkMap::with_version(Node::new("n1", "p", "a", "g"), 1));
        let registry = Arc::new(UpstreamRegistry::new(map.clone()));
        let router = ProxyRouter::new(map, registry, &ProxyConfig::default());
        router.count("no_upstream");
        router.count("no_upstream");

        let status = router.status("").unwrap();
        assert_eq!(status["node_id"], "n1");
        assert_eq!(status["outcomes"]["no_upstream"], 2);
        assert_eq!(status["in_flight"], 0);
        assert!(status["endpoints"].as_array().unwrap().is_empty());
        assert!(router.status("endpoints").is_none());
    }
}

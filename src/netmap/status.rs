//! Read-only snapshots of the network map for the admin server.
//!
//! Mounted at `/status/netmap`:
//! - `""` - every node, every endpoint and the graveyard
//! - `local` - the local node and its registrations
//! - `nodes/{id}` - one node and its registrations

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::admin::StatusProvider;
use crate::netmap::map::NetworkMap;
use crate::netmap::node::{Node, NodeStatus};
use crate::netmap::state::NetworkState;

#[derive(Serialize)]
struct NodeView<'a> {
    id: &'a str,
    status: NodeStatus,
    version: u64,
    proxy_addr: &'a str,
    admin_addr: &'a str,
    gossip_addr: &'a str,
    endpoints: BTreeMap<&'a str, EndpointView>,
}

#[derive(Serialize)]
struct EndpointView {
    listeners: u32,
    version: u64,
}

#[derive(Serialize)]
struct OwnerView<'a> {
    node_id: &'a str,
    listeners: u32,
    version: u64,
    routable: bool,
}

#[derive(Serialize)]
struct MapView<'a> {
    local_id: &'a str,
    nodes: Vec<NodeView<'a>>,
    endpoints: BTreeMap<&'a str, Vec<OwnerView<'a>>>,
    graveyard: BTreeMap<&'a str, u64>,
}

fn node_view<'a>(state: &'a NetworkState, node: &'a Node) -> NodeView<'a> {
    NodeView {
        id: &node.id,
        status: node.status,
        version: node.version,
        proxy_addr: &node.proxy_addr,
        admin_addr: &node.admin_addr,
        gossip_addr: &node.gossip_addr,
        endpoints: state
            .registrations_of(&node.id)
            .map(|reg| {
                (
                    reg.endpoint_id.as_str(),
                    EndpointView {
                        listeners: reg.listeners,
                        version: reg.version,
                    },
                )
            })
            .collect(),
    }
}

fn map_view<'a>(local_id: &'a str, state: &'a NetworkState) -> MapView<'a> {
    let mut endpoints: BTreeMap<&str, Vec<OwnerView>> = BTreeMap::new();
    for reg in state.registrations() {
        let routable = state
            .node(&reg.node_id)
            .is_some_and(|n| n.status.is_routable());
        endpoints
            .entry(reg.endpoint_id.as_str())
            .or_default()
            .push(OwnerView {
                node_id: &reg.node_id,
                listeners: reg.listeners,
                version: reg.version,
                routable: routable && reg.is_active(),
            });
    }

    MapView {
        local_id,
        nodes: state.nodes().map(|node| node_view(state, node)).collect(),
        endpoints,
        graveyard: state.graveyard().collect(),
    }
}

impl StatusProvider for NetworkMap {
    fn status(&self, path: &str) -> Option<Value> {
        let state = self.load();
        let view = match path {
            "" => serde_json::to_value(map_view(self.local_id(), &state)),
            "local" => serde_json::to_value(node_view(&state, state.node(self.local_id())?)),
            _ => {
                let id = path.strip_prefix("nodes/")?;
                serde_json::to_value(node_view(&state, state.node(id)?))
            }
        };
        view.ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netmap::node::Record;

    fn map() -> NetworkMap {
        NetworkMap::with_version(Node::new("a", "a:8080", "a:8081", "a:7000"), 10)
    }

    #[test]
    fn full_view_lists_nodes_and_endpoints() {
        let map = map();
        map.add_local_endpoint("svc");
        map.merge(Record::Node(Node {
            version: 1,
            status: NodeStatus::Suspect,
            ..Node::new("b", "b:8080", "b:8081", "b:7000")
        }));

        let status = map.status("").unwrap();
        assert_eq!(status["local_id"], "a");
        assert_eq!(status["nodes"].as_array().unwrap().len(), 2);
        assert_eq!(status["nodes"][1]["status"], "suspect");
        assert_eq!(status["endpoints"]["svc"][0]["node_id"], "a");
        assert_eq!(status["endpoints"]["svc"][0]["routable"], true);
    }

    #[test]
    fn node_paths() {
        let map = map();
        map.add_local_endpoint("svc");

        let local = map.status("local").unwrap();
        assert_eq!(local["id"], "a");
        assert_eq!(local["endpoints"]["svc"]["listeners"], 1);

        assert_eq!(map.status("nodes/a").unwrap()["id"], "a");
        assert!(map.status("nodes/missing").is_none());
        assert!(map.status("bogus").is_none());
    }
}

use std::{cmp::Ordering, sync::Arc};

use crate::node::Node;

/// How a node is picked among the open ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceStrategy {
    /// Fewest REST calls first; used for search and decode.
    LeastUsed,
    /// Lowest CPU load per core first; used for player placement.
    LeastLoad,
}

impl BalanceStrategy {
    /// Open nodes in preference order. Ties keep registration order.
    pub fn rank(self, nodes: &[Arc<Node>]) -> Vec<Arc<Node>> {
        let mut open: Vec<Arc<Node>> = nodes
            .iter()
            .filter(|node| node.is_connected())
            .cloned()
            .collect();

        match self {
            Self::LeastUsed => open.sort_by_key(|node| node.calls()),
            Self::LeastLoad => open.sort_by(|a, b| {
                a.penalty_load()
                    .partial_cmp(&b.penalty_load())
                    .unwrap_or(Ordering::Equal)
            }),
        }
        open
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        configs::{ManagerConfig, NodeOptions},
        manager::{Manager, tests::noop_send},
        protocol::{Cpu, NodeStats},
    };

    fn manager(ports: &[u16]) -> Arc<Manager> {
        let nodes = ports
            .iter()
            .map(|port| NodeOptions::new("localhost", *port))
            .collect();
        Manager::new(ManagerConfig::default(), nodes, noop_send()).unwrap()
    }

    fn ids(nodes: &[Arc<Node>]) -> Vec<String> {
        nodes.iter().map(|n| n.id().to_string()).collect()
    }

    fn load(node: &Node, cores: u32, system_load: f64) {
        node.store_stats(NodeStats {
            cpu: Cpu {
                cores,
                system_load,
                lavalink_load: 0.0,
            },
            ..Default::default()
        });
    }

    #[test]
    fn test_only_open_nodes_are_ranked() {
        let manager = manager(&[1, 2, 3]);
        let nodes = manager.nodes();
        let _a = nodes[0].attach_test_socket();
        let _c = nodes[2].attach_test_socket();

        assert_eq!(
            ids(&BalanceStrategy::LeastUsed.rank(&nodes)),
            vec!["localhost:1", "localhost:3"]
        );
    }

    #[test]
    fn test_least_used_orders_by_calls_stably() {
        let manager = manager(&[1, 2, 3]);
        let nodes = manager.nodes();
        let _sockets: Vec<_> = nodes.iter().map(|n| n.attach_test_socket()).collect();

        nodes[0].set_calls(5);
        nodes[1].set_calls(2);
        nodes[2].set_calls(2);

        assert_eq!(
            ids(&manager.least_used_nodes()),
            vec!["localhost:2", "localhost:3", "localhost:1"]
        );
    }

    #[test]
    fn test_least_load_treats_missing_cpu_stats_as_idle() {
        let manager = manager(&[1, 2, 3]);
        let nodes = manager.nodes();
        let _sockets: Vec<_> = nodes.iter().map(|n| n.attach_test_socket()).collect();

        load(&nodes[0], 4, 2.0);
        load(&nodes[1], 2, 0.5);

        assert_eq!(
            ids(&manager.least_load_nodes()),
            vec!["localhost:3", "localhost:2", "localhost:1"]
        );
    }
}

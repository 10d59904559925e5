//! Stack topology: an undirected graph over datapaths with stack ports as
//! edges. Every Valve in a stack holds an identical copy and computes
//! shortest-path-to-root deterministically from it.

use std::collections::{HashMap, HashSet, VecDeque};
use valve_types::{DpId, PortNo};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StackEdge {
    pub a: (DpId, PortNo),
    pub b: (DpId, PortNo),
}

#[derive(Debug, Clone, Default)]
pub struct StackTopology {
    root: Option<DpId>,
    edges: Vec<StackEdge>,
    /// Edges whose link is currently down and excluded from path computation.
    down: HashSet<(DpId, PortNo)>,
}

impl StackTopology {
    pub fn new(root: DpId, edges: Vec<StackEdge>) -> Self {
        Self { root: Some(root), edges, down: HashSet::new() }
    }

    pub fn root(&self) -> Option<DpId> {
        self.root
    }

    pub fn set_link_state(&mut self, dp: DpId, port: PortNo, up: bool) {
        if up {
            self.down.remove(&(dp, port));
        } else {
            self.down.insert((dp, port));
        }
    }

    pub fn is_link_up(&self, dp: DpId, port: PortNo) -> bool {
        !self.down.contains(&(dp, port))
    }

    fn adjacency(&self) -> HashMap<DpId, Vec<(DpId, PortNo)>> {
        let mut adj: HashMap<DpId, Vec<(DpId, PortNo)>> = HashMap::new();
        for edge in &self.edges {
            let (dp_a, port_a) = edge.a;
            let (dp_b, port_b) = edge.b;
            if !self.is_link_up(dp_a, port_a) || !self.is_link_up(dp_b, port_b) {
                continue;
            }
            adj.entry(dp_a).or_default().push((dp_b, port_a));
            adj.entry(dp_b).or_default().push((dp_a, port_b));
        }
        adj
    }

    /// Breadth-first shortest path from `dp` to the root, returning the
    /// local port to use as the next hop. `None` if unreachable or no root.
    pub fn shortest_path_port(&self, dp: DpId) -> Option<PortNo> {
        self.path_port(dp, self.root?)
    }

    /// Breadth-first shortest path from `from` to `to`, returning the local
    /// port on `from` to use as the next hop. `None` if unreachable or if
    /// `from == to`.
    pub fn path_port(&self, from: DpId, to: DpId) -> Option<PortNo> {
        if from == to {
            return None;
        }
        let adj = self.adjacency();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back((from, None));
        visited.insert(from);
        while let Some((current, first_hop_port)) = queue.pop_front() {
            if current == to {
                return first_hop_port;
            }
            for &(neighbor, via_port) in adj.get(&current).into_iter().flatten() {
                if visited.insert(neighbor) {
                    let hop = first_hop_port.or(Some(via_port));
                    queue.push_back((neighbor, hop));
                }
            }
        }
        None
    }

    /// True if every non-root DP can reach the root — i.e. the stack has
    /// no partition given the current link-state view.
    pub fn is_connected(&self) -> bool {
        let Some(root) = self.root else { return false };
        let adj = self.adjacency();
        let mut reachable = HashSet::new();
        reachable.insert(root);
        let mut queue = VecDeque::from([root]);
        while let Some(current) = queue.pop_front() {
            for &(neighbor, _) in adj.get(&current).into_iter().flatten() {
                if reachable.insert(neighbor) {
                    queue.push_back(neighbor);
                }
            }
        }
        let mut all_dps: HashSet<DpId> = HashSet::new();
        for edge in &self.edges {
            all_dps.insert(edge.a.0);
            all_dps.insert(edge.b.0);
        }
        all_dps.iter().all(|dp| reachable.contains(dp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dp(n: u64) -> DpId {
        DpId::new(n)
    }

    fn port(n: u32) -> PortNo {
        PortNo::new(n).unwrap()
    }

    fn chain_topology() -> StackTopology {
        StackTopology::new(
            dp(1),
            vec![
                StackEdge { a: (dp(1), port(1)), b: (dp(2), port(1)) },
                StackEdge { a: (dp(2), port(2)), b: (dp(3), port(1)) },
            ],
        )
    }

    #[test]
    fn shortest_path_from_leaf_to_root() {
        let topo = chain_topology();
        assert_eq!(topo.shortest_path_port(dp(3)), Some(port(1)));
        assert_eq!(topo.shortest_path_port(dp(2)), Some(port(1)));
        assert_eq!(topo.shortest_path_port(dp(1)), None);
    }

    #[test]
    fn path_port_between_two_non_root_leaves_routes_via_the_shared_branch() {
        let topo = chain_topology();
        assert_eq!(topo.path_port(dp(3), dp(1)), Some(port(1)));
        assert_eq!(topo.path_port(dp(1), dp(3)), Some(port(1)));
        assert_eq!(topo.path_port(dp(2), dp(3)), Some(port(2)));
        assert_eq!(topo.path_port(dp(1), dp(1)), None);
    }

    #[test]
    fn down_link_breaks_connectivity() {
        let mut topo = chain_topology();
        topo.set_link_state(dp(2), port(2), false);
        assert!(!topo.is_connected());
        assert_eq!(topo.shortest_path_port(dp(3)), None);
    }

    #[test]
    fn relinking_restores_path() {
        let mut topo = chain_topology();
        topo.set_link_state(dp(2), port(2), false);
        topo.set_link_state(dp(2), port(2), true);
        assert!(topo.is_connected());
        assert_eq!(topo.shortest_path_port(dp(3)), Some(port(1)));
    }
}

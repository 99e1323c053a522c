#![warn(missing_docs)]

//! The undirected layer graph and its three shortest-path algorithms:
//! simple (single-path Dijkstra), LFA, and ECMP.

use std::collections::HashMap;
use std::sync::Mutex;
use unicast_core::Address;

/// Opaque per-edge QoS annotation. Hop count (weight 1) is the only metric
/// shortest-path uses; `QosSpec` is carried as an annotation on the edge,
/// never weighed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QosSpec(pub u64);

/// Which shortest-path algorithm to compute a routing table with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingAlgo {
    /// Single-path Dijkstra.
    Simple,
    /// Dijkstra plus loop-free alternates.
    Lfa,
    /// Dijkstra plus equal-cost multipath.
    Ecmp,
}

#[derive(Debug, Clone)]
struct Edge {
    neighbor: Address,
    qos: QosSpec,
    announced: u8,
}

#[derive(Debug, Clone, Default)]
struct Vertex {
    /// Insertion-ordered list of outgoing edges.
    edges: Vec<Edge>,
}

#[derive(Default)]
struct GraphState {
    /// Insertion order of vertices, used to break Dijkstra ties.
    order: Vec<Address>,
    vertices: HashMap<Address, Vertex>,
}

impl GraphState {
    fn vertex_or_insert(&mut self, addr: Address) {
        if !self.vertices.contains_key(&addr) {
            self.order.push(addr);
            self.vertices.insert(addr, Vertex::default());
        }
    }

    fn edge_mut(&mut self, src: Address, dst: Address) -> &mut Edge {
        let vertex = self.vertices.get_mut(&src).expect("vertex must exist");
        if let Some(idx) = vertex.edges.iter().position(|e| e.neighbor == dst) {
            &mut vertex.edges[idx]
        } else {
            vertex.edges.push(Edge {
                neighbor: dst,
                qos: QosSpec::default(),
                announced: 0,
            });
            vertex.edges.last_mut().unwrap()
        }
    }

    fn drop_vertex_if_isolated(&mut self, addr: Address) {
        if self
            .vertices
            .get(&addr)
            .map(|v| v.edges.is_empty())
            .unwrap_or(false)
        {
            self.vertices.remove(&addr);
            self.order.retain(|&a| a != addr);
        }
    }
}

/// The undirected layer graph.
///
/// A single internal mutex serializes every mutation and the entire
/// `routing_table` computation; allocations for intermediate Dijkstra
/// state happen outside the lock where possible but the computation
/// itself holds it for the duration.
pub struct Graph {
    state: Mutex<GraphState>,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GraphState::default()),
        }
    }

    /// Creates vertices as needed and increments the announced count of
    /// both the `src -> dst` and `dst -> src` edges (one call records one
    /// side's announcement of the link, and the edge becomes traversable
    /// once both sides have each called this once).
    pub fn add_or_update_edge(&self, src: Address, dst: Address, qs: QosSpec) {
        let mut state = self.state.lock().expect("graph lock poisoned");
        state.vertex_or_insert(src);
        state.vertex_or_insert(dst);

        let e = state.edge_mut(src, dst);
        e.announced += 1;
        e.qos = qs;

        let nb_e = state.edge_mut(dst, src);
        nb_e.announced += 1;
        nb_e.qos = qs;
    }

    /// Decrements both directions' announced count; deletes an edge once
    /// its count reaches zero, and deletes a vertex once it loses its last
    /// edge.
    pub fn remove_edge(&self, src: Address, dst: Address) {
        let mut state = self.state.lock().expect("graph lock poisoned");
        if !state.vertices.contains_key(&src) || !state.vertices.contains_key(&dst) {
            return;
        }

        if let Some(vertex) = state.vertices.get_mut(&src) {
            if let Some(idx) = vertex.edges.iter().position(|e| e.neighbor == dst) {
                vertex.edges[idx].announced = vertex.edges[idx].announced.saturating_sub(1);
                if vertex.edges[idx].announced == 0 {
                    vertex.edges.remove(idx);
                }
            }
        }
        if let Some(vertex) = state.vertices.get_mut(&dst) {
            if let Some(idx) = vertex.edges.iter().position(|e| e.neighbor == src) {
                vertex.edges[idx].announced = vertex.edges[idx].announced.saturating_sub(1);
                if vertex.edges[idx].announced == 0 {
                    vertex.edges.remove(idx);
                }
            }
        }

        state.drop_vertex_if_isolated(src);
        state.drop_vertex_if_isolated(dst);
    }

    /// Number of vertices currently in the graph.
    pub fn vertex_count(&self) -> usize {
        self.state.lock().expect("graph lock poisoned").order.len()
    }

    /// Computes the routing table for `algo` rooted at `src`: for every
    /// reachable destination other than `src`, the ordered list of next
    /// hops to use.
    pub fn routing_table(&self, algo: RoutingAlgo, src: Address) -> Vec<(Address, Vec<Address>)> {
        let state = self.state.lock().expect("graph lock poisoned");
        match algo {
            RoutingAlgo::Simple => routing_table_simple(&state, src),
            RoutingAlgo::Lfa => routing_table_lfa(&state, src),
            RoutingAlgo::Ecmp => routing_table_ecmp(&state, src),
        }
    }
}

/// `(distance, next-hop-towards-src)` for every vertex, computed from `src`.
struct DijkstraResult {
    dist: HashMap<Address, u32>,
    nhop: HashMap<Address, Option<Address>>,
}

fn dijkstra(state: &GraphState, src: Address) -> DijkstraResult {
    let mut dist: HashMap<Address, u32> = state.order.iter().map(|&a| (a, u32::MAX)).collect();
    let mut nhop: HashMap<Address, Option<Address>> =
        state.order.iter().map(|&a| (a, None)).collect();
    let mut used: HashMap<Address, bool> = state.order.iter().map(|&a| (a, false)).collect();

    if let Some(d) = dist.get_mut(&src) {
        *d = 0;
    } else {
        // src isn't in the graph: nothing reachable.
        return DijkstraResult { dist, nhop };
    }

    loop {
        let mut best: Option<Address> = None;
        let mut best_dist = u32::MAX;
        for &addr in &state.order {
            if !used[&addr] && dist[&addr] < best_dist {
                best_dist = dist[&addr];
                best = Some(addr);
            }
        }
        let v = match best {
            Some(v) => v,
            None => break,
        };
        used.insert(v, true);

        let vertex = &state.vertices[&v];
        for edge in &vertex.edges {
            // Only traverse fully-announced edges.
            if edge.announced != 2 {
                continue;
            }
            let alt = dist[&v].saturating_add(1);
            if alt < dist[&edge.neighbor] {
                dist.insert(edge.neighbor, alt);
                let next = if v == src { Some(edge.neighbor) } else { nhop[&v] };
                nhop.insert(edge.neighbor, next);
            }
        }
    }

    DijkstraResult { dist, nhop }
}

fn routing_table_simple(state: &GraphState, src: Address) -> Vec<(Address, Vec<Address>)> {
    let d = dijkstra(state, src);
    state
        .order
        .iter()
        .filter(|&&v| v != src)
        .filter_map(|&v| d.nhop[&v].map(|nh| (v, vec![nh])))
        .collect()
}

fn routing_table_lfa(state: &GraphState, src: Address) -> Vec<(Address, Vec<Address>)> {
    let mut table = routing_table_simple(state, src);
    let s_dist = dijkstra(state, src).dist;

    let mut neighbors: Vec<(Address, DijkstraResult)> = Vec::new();
    if let Some(src_vertex) = state.vertices.get(&src) {
        for edge in &src_vertex.edges {
            if edge.announced != 2 {
                continue;
            }
            let from_n = dijkstra(state, edge.neighbor);
            neighbors.push((edge.neighbor, from_n));
        }
    }
    // "Append every LFA to the destination's nhop list in address order."
    neighbors.sort_by_key(|(addr, _)| *addr);

    for &dst in &state.order {
        if dst == src {
            continue;
        }
        let d_s_dst = match s_dist.get(&dst) {
            Some(&d) if d != u32::MAX => d,
            _ => continue,
        };
        let primary_nhop = table
            .iter()
            .find(|(d, _)| *d == dst)
            .and_then(|(_, nhops)| nhops.first().copied());

        for (n_addr, n_result) in &neighbors {
            if *n_addr == dst || Some(*n_addr) == primary_nhop {
                continue;
            }
            let d_s_n = match s_dist.get(n_addr) {
                Some(&d) if d != u32::MAX => d,
                _ => continue,
            };
            let d_n_dst = match n_result.dist.get(&dst) {
                Some(&d) if d != u32::MAX => d,
                _ => continue,
            };
            if d_n_dst < d_s_n + d_s_dst {
                if let Some(entry) = table.iter_mut().find(|(d, _)| *d == dst) {
                    entry.1.push(*n_addr);
                }
            }
        }
    }

    table
}

fn routing_table_ecmp(state: &GraphState, src: Address) -> Vec<(Address, Vec<Address>)> {
    if state.order.len() < 2 {
        return Vec::new();
    }

    let s_dist = dijkstra(state, src).dist;
    let mut per_dst: HashMap<Address, Vec<Address>> = HashMap::new();

    if let Some(src_vertex) = state.vertices.get(&src) {
        for edge in &src_vertex.edges {
            if edge.announced != 2 {
                continue;
            }
            let n_dist = dijkstra(state, edge.neighbor).dist;
            for &v in &state.order {
                let d_s_v = match s_dist.get(&v) {
                    Some(&d) if d != u32::MAX => d,
                    _ => continue,
                };
                let d_n_v = match n_dist.get(&v) {
                    Some(&d) if d != u32::MAX => d,
                    _ => continue,
                };
                if d_n_v + 1 == d_s_v {
                    per_dst.entry(v).or_default().push(edge.neighbor);
                }
            }
        }
    }

    state
        .order
        .iter()
        .filter(|&&v| v != src)
        .filter_map(|&v| per_dst.get(&v).cloned().map(|nhops| (v, nhops)))
        .collect()
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        // Idempotence law: announcing an edge from both sides and then
        // withdrawing it from both sides leaves the graph exactly as
        // empty as it started, for any pair of distinct addresses and any
        // carried QosSpec annotation.
        #[test]
        fn announce_then_withdraw_restores_empty_graph(
            x in 1u64..1000,
            y_offset in 1u64..1000,
            qos in any::<u64>(),
        ) {
            let x = Address::new(x);
            let y = Address::new(x.as_u64() + y_offset);
            let g = Graph::new();

            g.add_or_update_edge(x, y, QosSpec(qos));
            g.add_or_update_edge(y, x, QosSpec(qos));
            prop_assert_eq!(g.vertex_count(), 2);

            g.remove_edge(x, y);
            g.remove_edge(y, x);
            prop_assert_eq!(g.vertex_count(), 0);
        }

        // Repeating the same announcement is additive (each call bumps the
        // announced count on both sides), so withdrawing it the same number
        // of times it was announced must return to empty too.
        #[test]
        fn repeated_announce_needs_matching_withdrawals(
            x in 1u64..1000,
            y_offset in 1u64..1000,
            times in 1usize..5,
        ) {
            let x = Address::new(x);
            let y = Address::new(x.as_u64() + y_offset);
            let g = Graph::new();

            for _ in 0..times {
                g.add_or_update_edge(x, y, QosSpec::default());
                g.add_or_update_edge(y, x, QosSpec::default());
            }
            for _ in 0..times {
                g.remove_edge(x, y);
                g.remove_edge(y, x);
            }
            prop_assert_eq!(g.vertex_count(), 0);
        }
    }
}

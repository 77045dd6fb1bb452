//! Centrality computation and criticality fusion.
//!
//! Projections are fetched from the store as edge lists over internal Node
//! ids, the metrics are computed in-process, and the scores are written back
//! onto the `Node` properties. The topology projection keeps only
//! `IS_CONNECTED_TO` edges with `hops = 1`; the flow projection takes every
//! `IS_CONNECTED_TO` edge, parallel edges counting towards degree.

use std::collections::{HashMap, VecDeque};

use neo4rs::query;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;
use tracing::info;

use sitrep_core::error::Result;

use crate::client::{store_err, GraphClient};

#[derive(Debug, Serialize)]
struct NodeScore {
    id: i64,
    score: f64,
}

/// Build a petgraph projection from an edge list of internal node ids.
fn build_graph(edges: &[(i64, i64)]) -> (DiGraph<i64, ()>, HashMap<i64, NodeIndex>) {
    let mut graph = DiGraph::new();
    let mut indices: HashMap<i64, NodeIndex> = HashMap::new();
    for &(source, target) in edges {
        let s = *indices.entry(source).or_insert_with(|| graph.add_node(source));
        let t = *indices.entry(target).or_insert_with(|| graph.add_node(target));
        graph.add_edge(s, t, ());
    }
    (graph, indices)
}

/// Brandes betweenness centrality on an unweighted directed projection.
pub fn betweenness_scores(edges: &[(i64, i64)]) -> HashMap<i64, f64> {
    let (graph, indices) = build_graph(edges);
    let n = graph.node_count();
    let mut centrality = vec![0.0f64; n];

    for start in graph.node_indices() {
        let mut stack: Vec<NodeIndex> = Vec::with_capacity(n);
        let mut predecessors: Vec<Vec<NodeIndex>> = vec![Vec::new(); n];
        let mut sigma = vec![0.0f64; n];
        let mut dist = vec![-1i64; n];
        sigma[start.index()] = 1.0;
        dist[start.index()] = 0;

        let mut queue = VecDeque::new();
        queue.push_back(start);
        while let Some(v) = queue.pop_front() {
            stack.push(v);
            for w in graph.neighbors(v) {
                if dist[w.index()] < 0 {
                    dist[w.index()] = dist[v.index()] + 1;
                    queue.push_back(w);
                }
                if dist[w.index()] == dist[v.index()] + 1 {
                    sigma[w.index()] += sigma[v.index()];
                    predecessors[w.index()].push(v);
                }
            }
        }

        let mut delta = vec![0.0f64; n];
        while let Some(w) = stack.pop() {
            for &v in &predecessors[w.index()] {
                delta[v.index()] +=
                    sigma[v.index()] / sigma[w.index()] * (1.0 + delta[w.index()]);
            }
            if w != start {
                centrality[w.index()] += delta[w.index()];
            }
        }
    }

    indices
        .into_iter()
        .map(|(id, idx)| (id, centrality[idx.index()]))
        .collect()
}

/// Out-degree per node; parallel edges each count once.
pub fn degree_scores(edges: &[(i64, i64)]) -> HashMap<i64, f64> {
    let mut scores: HashMap<i64, f64> = HashMap::new();
    for &(source, target) in edges {
        *scores.entry(source).or_insert(0.0) += 1.0;
        scores.entry(target).or_insert(0.0);
    }
    scores
}

/// Iterative PageRank with dangling-mass redistribution.
pub fn pagerank_scores(edges: &[(i64, i64)], damping: f64, iterations: usize) -> HashMap<i64, f64> {
    let (graph, indices) = build_graph(edges);
    let n = graph.node_count();
    if n == 0 {
        return HashMap::new();
    }
    let n_f = n as f64;
    let mut rank = vec![1.0 / n_f; n];
    let out_degree: Vec<f64> = graph
        .node_indices()
        .map(|idx| graph.neighbors(idx).count() as f64)
        .collect();

    for _ in 0..iterations {
        let mut next = vec![(1.0 - damping) / n_f; n];
        let dangling: f64 = graph
            .node_indices()
            .filter(|idx| out_degree[idx.index()] == 0.0)
            .map(|idx| rank[idx.index()])
            .sum();
        for idx in graph.node_indices() {
            next[idx.index()] += damping * dangling / n_f;
        }
        for edge in graph.edge_indices() {
            if let Some((source, target)) = graph.edge_endpoints(edge) {
                next[target.index()] += damping * rank[source.index()] / out_degree[source.index()];
            }
        }
        rank = next;
    }

    indices
        .into_iter()
        .map(|(id, idx)| (id, rank[idx.index()]))
        .collect()
}

const COMBINE_CRITICALITY_QUERY: &str = r#"
MATCH (n:Node)
WITH max(n.topology_betweenness) AS max_betweenness,
     min(n.topology_betweenness) AS min_betweenness,
     count(n) AS count_of_nodes
MATCH (n:Node)
WITH n, max_betweenness, min_betweenness, count_of_nodes,
CASE
  WHEN n.topology_degree IS NULL THEN 1
  ELSE 9 * (n.topology_degree / count_of_nodes) + 1
END AS topology_degree_norm,
CASE
  WHEN n.topology_betweenness IS NULL OR max_betweenness = min_betweenness THEN 1
  ELSE 9 * ((n.topology_betweenness - min_betweenness) / (max_betweenness - min_betweenness)) + 1
END AS topology_betweenness_norm,
CASE
  WHEN n.mission_criticality IS NULL THEN 1
  ELSE n.mission_criticality
END AS mission_criticality
SET n.topology_degree_norm = topology_degree_norm
SET n.topology_betweenness_norm = topology_betweenness_norm
SET n.mission_criticality = mission_criticality
SET n.final_criticality =
    ((9 * n.topology_degree_norm * n.topology_betweenness_norm / 100) + 1) * n.mission_criticality
"#;

impl GraphClient {
    async fn fetch_connection_edges(&self, hops_one_only: bool) -> Result<Vec<(i64, i64)>> {
        let cypher = if hops_one_only {
            "MATCH (s:Node)-[r:IS_CONNECTED_TO]->(t:Node) WHERE r.hops = 1 \
             RETURN id(s) AS source, id(t) AS target"
        } else {
            "MATCH (s:Node)-[:IS_CONNECTED_TO]->(t:Node) \
             RETURN id(s) AS source, id(t) AS target"
        };
        let mut rows = self.graph().execute(query(cypher)).await.map_err(store_err)?;
        let mut edges = Vec::new();
        while let Some(row) = rows.next().await.map_err(store_err)? {
            let read = |e: neo4rs::DeError| {
                sitrep_core::Error::StoreTransient(format!("row decode failed: {e}"))
            };
            edges.push((
                row.get::<i64>("source").map_err(read)?,
                row.get::<i64>("target").map_err(read)?,
            ));
        }
        Ok(edges)
    }

    async fn write_scores(&self, property: &str, scores: &HashMap<i64, f64>) -> Result<()> {
        let rows: Vec<NodeScore> = scores
            .iter()
            .map(|(&id, &score)| NodeScore { id, score })
            .collect();
        let json = serde_json::to_string(&rows)?;
        let cypher = format!(
            "WITH apoc.convert.fromJsonList($json_string) AS scores\n\
             UNWIND scores AS row\n\
             MATCH (n:Node) WHERE id(n) = row.id\n\
             SET n.{property} = row.score"
        );
        self.run(query(&cypher).param("json_string", json)).await
    }

    /// Betweenness on the hops-1 topology projection.
    pub async fn compute_topology_betweenness(&self) -> Result<()> {
        let edges = self.fetch_connection_edges(true).await?;
        info!(edges = edges.len(), "computing topology betweenness");
        self.write_scores("topology_betweenness", &betweenness_scores(&edges))
            .await
    }

    /// Degree on the hops-1 topology projection.
    pub async fn compute_topology_degree(&self) -> Result<()> {
        let edges = self.fetch_connection_edges(true).await?;
        self.write_scores("topology_degree", &degree_scores(&edges))
            .await
    }

    /// Degree over all connection edges (flow view).
    pub async fn compute_flow_degree(&self) -> Result<()> {
        let edges = self.fetch_connection_edges(false).await?;
        self.write_scores("degree_centrality", &degree_scores(&edges))
            .await
    }

    /// PageRank over all connection edges (flow view).
    pub async fn compute_flow_pagerank(&self) -> Result<()> {
        let edges = self.fetch_connection_edges(false).await?;
        self.write_scores("pagerank_centrality", &pagerank_scores(&edges, 0.85, 20))
            .await
    }

    /// Fuse normalized centralities with mission criticality into
    /// `final_criticality` on every Node.
    pub async fn combine_criticality(&self) -> Result<()> {
        self.run(query(COMBINE_CRITICALITY_QUERY)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 1 -> 2 -> 3, plus 1 -> 3 shortcut via 4: 1->4, 4->3
    fn diamond() -> Vec<(i64, i64)> {
        vec![(1, 2), (2, 3), (1, 4), (4, 3)]
    }

    #[test]
    fn test_betweenness_middle_node_dominates_path() {
        let edges = vec![(1, 2), (2, 3)];
        let scores = betweenness_scores(&edges);
        assert_eq!(scores[&2], 1.0);
        assert_eq!(scores[&1], 0.0);
        assert_eq!(scores[&3], 0.0);
    }

    #[test]
    fn test_betweenness_split_paths_share_credit() {
        let scores = betweenness_scores(&diamond());
        // two shortest 1->3 paths, each middle node carries half
        assert!((scores[&2] - 0.5).abs() < 1e-9);
        assert!((scores[&4] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_degree_counts_outgoing_edges() {
        let scores = degree_scores(&diamond());
        assert_eq!(scores[&1], 2.0);
        assert_eq!(scores[&2], 1.0);
        assert_eq!(scores[&3], 0.0);
    }

    #[test]
    fn test_degree_counts_parallel_edges() {
        let scores = degree_scores(&[(1, 2), (1, 2), (1, 3)]);
        assert_eq!(scores[&1], 3.0);
    }

    #[test]
    fn test_pagerank_sums_to_one_and_ranks_sink_highest() {
        let edges = vec![(1, 3), (2, 3)];
        let scores = pagerank_scores(&edges, 0.85, 50);
        let total: f64 = scores.values().sum();
        assert!((total - 1.0).abs() < 1e-6);
        assert!(scores[&3] > scores[&1]);
        assert!(scores[&3] > scores[&2]);
    }

    #[test]
    fn test_pagerank_empty_projection() {
        assert!(pagerank_scores(&[], 0.85, 20).is_empty());
    }
}

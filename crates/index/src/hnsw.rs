//! `HNSWVectorIndex`: a Hierarchical Navigable Small World graph giving
//! approximate nearest-neighbor search in roughly `O(log n)` per query
//! (spec §4.6). Falls back transparently to [`ExactVectorIndex`] when the
//! `hnsw` feature is compiled out, behind the same `QueryableIndex`
//! contract.
//!
//! Level assignment uses a fixed-seed SplitMix64 counter rather than a
//! real RNG so that building the same vectors in the same order always
//! yields the same graph — useful for reproducing a query plan's results
//! in tests.

use crate::definition::{ExtractedKey, HnswParams, IndexDefinition};
use crate::error::{IndexError, Result};
use crate::exact_vector::ExactVectorIndex;
use crate::queryable::QueryableIndex;
use protobase_atom::{AtomId, MetricHint};
use protobase_collections::vector;
use protobase_txn::AtomReader;
use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

fn score(metric: MetricHint, a: &[f32], b: &[f32]) -> Result<f32> {
    Ok(match metric {
        MetricHint::Cosine => vector::cosine_similarity(a, b)?,
        MetricHint::L2 => 1.0 / (1.0 + vector::l2_distance(a, b)?),
    })
}

#[derive(Debug, Clone, PartialEq)]
struct Scored {
    score: f32,
    id: u32,
}
impl Eq for Scored {}
impl PartialOrd for Scored {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Scored {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score.partial_cmp(&other.score).unwrap_or(Ordering::Equal).then_with(|| other.id.cmp(&self.id))
    }
}

struct Node {
    neighbors: Vec<BTreeSet<u32>>,
    max_layer: usize,
}

/// The graph-building half of the index: internal `u32` node ids,
/// insertion, and beam search. Kept separate from id/vector bookkeeping so
/// [`HnswVectorIndex::save`]/[`HnswVectorIndex::load`] can serialize just
/// this part plus a small metadata sidecar.
struct Graph {
    params: HnswParams,
    ml: f64,
    nodes: BTreeMap<u32, Node>,
    entry_point: Option<u32>,
    max_level: usize,
    rng_seed: u64,
    rng_counter: u64,
}

impl Graph {
    fn new(params: HnswParams) -> Self {
        Graph {
            ml: 1.0 / (params.m as f64).ln(),
            params,
            nodes: BTreeMap::new(),
            entry_point: None,
            max_level: 0,
            rng_seed: 42,
            rng_counter: 0,
        }
    }

    fn max_connections(&self, layer: usize) -> usize {
        if layer == 0 { self.params.m * 2 } else { self.params.m }
    }

    fn splitmix64(mut x: u64) -> u64 {
        x = x.wrapping_add(0x9e3779b97f4a7c15);
        x = (x ^ (x >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
        x = (x ^ (x >> 27)).wrapping_mul(0x94d049bb133111eb);
        x ^ (x >> 31)
    }

    fn assign_level(&mut self) -> usize {
        self.rng_counter += 1;
        let hash = Self::splitmix64(self.rng_seed.wrapping_add(self.rng_counter));
        let uniform = ((hash as f64) / (u64::MAX as f64)).max(1e-15);
        (-uniform.ln() * self.ml) as usize
    }

    fn search_layer(&self, metric: MetricHint, query: &[f32], entry: u32, ef: usize, layer: usize, vectors: &BTreeMap<u32, Vec<f32>>) -> Result<Vec<Scored>> {
        let entry_score = score(metric, query, &vectors[&entry])?;
        let mut visited = BTreeSet::new();
        visited.insert(entry);
        let mut candidates = BinaryHeap::new();
        candidates.push(Scored { score: entry_score, id: entry });
        let mut results: BinaryHeap<Reverse<Scored>> = BinaryHeap::new();
        results.push(Reverse(Scored { score: entry_score, id: entry }));

        while let Some(nearest) = candidates.pop() {
            let worst = results.peek().map(|r| r.0.score).unwrap_or(f32::NEG_INFINITY);
            if nearest.score < worst && results.len() >= ef {
                break;
            }
            if let Some(node) = self.nodes.get(&nearest.id) {
                if layer < node.neighbors.len() {
                    for &neighbor in &node.neighbors[layer] {
                        if !visited.insert(neighbor) {
                            continue;
                        }
                        let s = score(metric, query, &vectors[&neighbor])?;
                        let worst = results.peek().map(|r| r.0.score).unwrap_or(f32::NEG_INFINITY);
                        if results.len() < ef || s > worst {
                            candidates.push(Scored { score: s, id: neighbor });
                            results.push(Reverse(Scored { score: s, id: neighbor }));
                            if results.len() > ef {
                                results.pop();
                            }
                        }
                    }
                }
            }
        }

        let mut out: Vec<Scored> = results.into_iter().map(|r| r.0).collect();
        out.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal).then_with(|| a.id.cmp(&b.id)));
        Ok(out)
    }

    fn greedy_search_to_layer(&self, metric: MetricHint, query: &[f32], entry: u32, from_layer: usize, to_layer: usize, vectors: &BTreeMap<u32, Vec<f32>>) -> Result<u32> {
        let mut current = entry;
        for layer in (to_layer..=from_layer).rev() {
            loop {
                let current_score = score(metric, query, &vectors[&current])?;
                let mut best = (current_score, current);
                if let Some(node) = self.nodes.get(&current) {
                    if layer < node.neighbors.len() {
                        for &neighbor in &node.neighbors[layer] {
                            let s = score(metric, query, &vectors[&neighbor])?;
                            if s > best.0 || (s == best.0 && neighbor < best.1) {
                                best = (s, neighbor);
                            }
                        }
                    }
                }
                if best.1 == current {
                    break;
                }
                current = best.1;
            }
        }
        Ok(current)
    }

    fn insert(&mut self, metric: MetricHint, id: u32, embedding: &[f32], vectors: &BTreeMap<u32, Vec<f32>>) -> Result<()> {
        let level = self.assign_level();
        self.nodes.insert(id, Node { neighbors: (0..=level).map(|_| BTreeSet::new()).collect(), max_layer: level });

        let Some(entry) = self.entry_point else {
            self.entry_point = Some(id);
            self.max_level = level;
            return Ok(());
        };

        let mut current_entry = entry;
        if self.max_level > level {
            current_entry = self.greedy_search_to_layer(metric, embedding, entry, self.max_level, level + 1, vectors)?;
        }

        for layer in (0..=level.min(self.max_level)).rev() {
            let candidates = self.search_layer(metric, embedding, current_entry, self.params.ef_construction, layer, vectors)?;
            let selected: Vec<u32> = candidates.iter().take(self.params.m).map(|s| s.id).collect();

            if let Some(node) = self.nodes.get_mut(&id) {
                if layer < node.neighbors.len() {
                    node.neighbors[layer].extend(selected.iter().copied());
                }
            }

            let max_conn = self.max_connections(layer);
            for &neighbor in &selected {
                let needs_prune = if let Some(n) = self.nodes.get_mut(&neighbor) {
                    if layer < n.neighbors.len() {
                        n.neighbors[layer].insert(id);
                        n.neighbors[layer].len() > max_conn
                    } else {
                        false
                    }
                } else {
                    false
                };
                if needs_prune {
                    self.prune(metric, neighbor, layer, max_conn, vectors)?;
                }
            }

            if let Some(closest) = candidates.first() {
                current_entry = closest.id;
            }
        }

        if level > self.max_level {
            self.entry_point = Some(id);
            self.max_level = level;
        }
        Ok(())
    }

    fn prune(&mut self, metric: MetricHint, id: u32, layer: usize, max_conn: usize, vectors: &BTreeMap<u32, Vec<f32>>) -> Result<()> {
        let Some(node) = self.nodes.get(&id) else { return Ok(()) };
        if layer >= node.neighbors.len() {
            return Ok(());
        }
        let embedding = &vectors[&id];
        let mut scored: Vec<Scored> = node.neighbors[layer]
            .iter()
            .map(|&n| Ok(Scored { score: score(metric, embedding, &vectors[&n])?, id: n }))
            .collect::<Result<Vec<_>>>()?;
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal).then_with(|| a.id.cmp(&b.id)));
        let keep: BTreeSet<u32> = scored.into_iter().take(max_conn).map(|s| s.id).collect();
        self.nodes.get_mut(&id).unwrap().neighbors[layer] = keep;
        Ok(())
    }

    fn search(&self, metric: MetricHint, query: &[f32], ef: usize, vectors: &BTreeMap<u32, Vec<f32>>) -> Result<Vec<Scored>> {
        let Some(entry) = self.entry_point else { return Ok(Vec::new()) };
        let mut current = entry;
        if self.max_level > 0 {
            current = self.greedy_search_to_layer(metric, query, entry, self.max_level, 1, vectors)?;
        }
        self.search_layer(metric, query, current, ef, 0, vectors)
    }
}

/// An HNSW-backed vector index, or its transparent Exact fallback.
pub enum HnswVectorIndex {
    /// Approximate search via the HNSW graph.
    Graph {
        name: String,
        metric: MetricHint,
        dim: u32,
        params: HnswParams,
        graph: Graph,
        vectors: BTreeMap<u32, Vec<f32>>,
        record_by_internal: BTreeMap<u32, AtomId>,
        next_internal_id: u32,
    },
    /// Used when the `hnsw` feature is disabled at build time.
    Fallback(ExactVectorIndex),
}

impl HnswVectorIndex {
    /// Scan `records`, extracting a vector from each, and build the graph
    /// (or its Exact fallback, if the `hnsw` feature is off).
    pub fn build(
        atoms: &dyn AtomReader,
        definition: &IndexDefinition,
        metric: MetricHint,
        dim: u32,
        records: impl IntoIterator<Item = AtomId>,
    ) -> Result<Self> {
        #[cfg(not(feature = "hnsw"))]
        {
            return Ok(HnswVectorIndex::Fallback(ExactVectorIndex::build(atoms, definition, metric, dim, records)?));
        }
        #[cfg(feature = "hnsw")]
        {
            let mut graph = Graph::new(definition.hnsw_params);
            let mut vectors = BTreeMap::new();
            let mut record_by_internal = BTreeMap::new();
            let mut next_internal_id = 0u32;

            for record in records {
                match (definition.extractor)(atoms, record)? {
                    ExtractedKey::Vector(values) => {
                        if values.len() as u32 != dim {
                            return Err(IndexError::DimensionMismatch { index_dim: dim, query_dim: values.len() as u32 });
                        }
                        let internal_id = next_internal_id;
                        next_internal_id += 1;
                        vectors.insert(internal_id, values.clone());
                        record_by_internal.insert(internal_id, record);
                        graph.insert(metric, internal_id, &values, &vectors)?;
                    }
                    ExtractedKey::Scalar(_) => {
                        tracing::warn!(index = %definition.name, "scalar key extracted for a vector index, ignoring");
                    }
                }
            }

            Ok(HnswVectorIndex::Graph {
                name: definition.name.clone(),
                metric,
                dim,
                params: definition.hnsw_params,
                graph,
                vectors,
                record_by_internal,
                next_internal_id,
            })
        }
    }
}

impl QueryableIndex for HnswVectorIndex {
    fn name(&self) -> &str {
        match self {
            HnswVectorIndex::Graph { name, .. } => name,
            HnswVectorIndex::Fallback(e) => e.name(),
        }
    }

    fn lookup(&self, key: AtomId) -> Vec<AtomId> {
        match self {
            HnswVectorIndex::Graph { .. } => Vec::new(),
            HnswVectorIndex::Fallback(e) => e.lookup(key),
        }
    }

    fn cost_estimate(&self, key: AtomId) -> usize {
        match self {
            HnswVectorIndex::Graph { vectors, .. } => vectors.len().min(64),
            HnswVectorIndex::Fallback(e) => e.cost_estimate(key),
        }
    }

    fn len(&self) -> usize {
        match self {
            HnswVectorIndex::Graph { vectors, .. } => vectors.len(),
            HnswVectorIndex::Fallback(e) => e.len(),
        }
    }

    fn supports_vector_search(&self) -> bool {
        true
    }

    fn search(&self, query: &[f32], k: Option<usize>, threshold: Option<f32>) -> Result<Vec<(AtomId, f32)>> {
        match self {
            HnswVectorIndex::Fallback(e) => e.search(query, k, threshold),
            HnswVectorIndex::Graph { metric, dim, params, graph, vectors, record_by_internal, .. } => {
                if query.len() as u32 != *dim {
                    return Err(IndexError::DimensionMismatch { index_dim: *dim, query_dim: query.len() as u32 });
                }
                let ef = params.ef_search.max(k.unwrap_or(params.ef_search));
                let mut results = graph.search(*metric, query, ef, vectors)?;
                if let Some(threshold) = threshold {
                    results.retain(|s| s.score >= threshold);
                }
                if let Some(k) = k {
                    results.truncate(k);
                }
                Ok(results.into_iter().map(|s| (record_by_internal[&s.id], s.score)).collect())
            }
        }
    }
}

mod persist {
    use super::*;
    use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
    use serde::{Deserialize, Serialize};
    use std::io::{Cursor, Read, Write};
    use std::path::Path;

    #[derive(Serialize, Deserialize)]
    struct Sidecar {
        metric: String,
        dim: u32,
        m: usize,
        ef_construction: usize,
        ef_search: usize,
        /// `id_mapping[i]` is the `AtomId` (hex) of internal node `i`.
        id_mapping: Vec<String>,
    }

    fn metric_name(m: MetricHint) -> &'static str {
        match m {
            MetricHint::Cosine => "cosine",
            MetricHint::L2 => "l2",
        }
    }

    fn metric_from_name(s: &str) -> Result<MetricHint> {
        match s {
            "cosine" => Ok(MetricHint::Cosine),
            "l2" => Ok(MetricHint::L2),
            other => Err(IndexError::CorruptSidecar(format!("unknown metric {other:?}"))),
        }
    }

    impl HnswVectorIndex {
        /// Write `<path_prefix>.graph` (the graph and embeddings) and
        /// `<path_prefix>.meta.json` (metric, dim, params, id mapping).
        pub fn save(&self, path_prefix: &Path) -> Result<()> {
            let HnswVectorIndex::Graph { metric, dim, params, graph, vectors, record_by_internal, next_internal_id } = self
            else {
                return Err(IndexError::CorruptSidecar("cannot persist a fallback Exact index as HNSW".into()));
            };

            let mut id_mapping = Vec::with_capacity(*next_internal_id as usize);
            for i in 0..*next_internal_id {
                id_mapping.push(record_by_internal.get(&i).map(|id| id.to_string()).unwrap_or_default());
            }
            let sidecar = Sidecar {
                metric: metric_name(*metric).to_string(),
                dim: *dim,
                m: params.m,
                ef_construction: params.ef_construction,
                ef_search: params.ef_search,
                id_mapping,
            };
            let meta_path = path_prefix.with_extension("meta.json");
            std::fs::write(meta_path, serde_json::to_vec_pretty(&sidecar)?)?;

            let mut body = Vec::new();
            body.write_u8(graph.entry_point.is_some() as u8)?;
            if let Some(ep) = graph.entry_point {
                body.write_u32::<LittleEndian>(ep)?;
            }
            body.write_u64::<LittleEndian>(graph.max_level as u64)?;
            body.write_u64::<LittleEndian>(graph.rng_seed)?;
            body.write_u64::<LittleEndian>(graph.rng_counter)?;
            body.write_u32::<LittleEndian>(graph.nodes.len() as u32)?;
            for (&id, node) in &graph.nodes {
                body.write_u32::<LittleEndian>(id)?;
                body.write_u32::<LittleEndian>(node.max_layer as u32)?;
                body.write_u32::<LittleEndian>(node.neighbors.len() as u32)?;
                for layer in &node.neighbors {
                    body.write_u32::<LittleEndian>(layer.len() as u32)?;
                    for &n in layer {
                        body.write_u32::<LittleEndian>(n)?;
                    }
                }
            }
            body.write_u32::<LittleEndian>(vectors.len() as u32)?;
            for (&id, v) in vectors {
                body.write_u32::<LittleEndian>(id)?;
                body.write_u32::<LittleEndian>(v.len() as u32)?;
                for &f in v {
                    body.write_f32::<LittleEndian>(f)?;
                }
            }

            let graph_path = path_prefix.with_extension("graph");
            std::fs::write(graph_path, body)?;
            Ok(())
        }

        /// Reconstruct an index previously written by [`Self::save`].
        pub fn load(path_prefix: &Path) -> Result<Self> {
            let meta_path = path_prefix.with_extension("meta.json");
            let sidecar: Sidecar = serde_json::from_slice(&std::fs::read(meta_path)?)?;
            let metric = metric_from_name(&sidecar.metric)?;
            let params = HnswParams { m: sidecar.m, ef_construction: sidecar.ef_construction, ef_search: sidecar.ef_search };

            let graph_path = path_prefix.with_extension("graph");
            let bytes = std::fs::read(graph_path)?;
            let mut cursor = Cursor::new(bytes);

            let has_entry = read_u8(&mut cursor)?;
            let entry_point = if has_entry == 1 { Some(cursor.read_u32::<LittleEndian>()?) } else { None };
            let max_level = cursor.read_u64::<LittleEndian>()? as usize;
            let rng_seed = cursor.read_u64::<LittleEndian>()?;
            let rng_counter = cursor.read_u64::<LittleEndian>()?;

            let node_count = cursor.read_u32::<LittleEndian>()?;
            let mut nodes = BTreeMap::new();
            for _ in 0..node_count {
                let id = cursor.read_u32::<LittleEndian>()?;
                let max_layer = cursor.read_u32::<LittleEndian>()? as usize;
                let layer_count = cursor.read_u32::<LittleEndian>()?;
                let mut neighbors = Vec::with_capacity(layer_count as usize);
                for _ in 0..layer_count {
                    let n = cursor.read_u32::<LittleEndian>()?;
                    let mut set = BTreeSet::new();
                    for _ in 0..n {
                        set.insert(cursor.read_u32::<LittleEndian>()?);
                    }
                    neighbors.push(set);
                }
                nodes.insert(id, Node { neighbors, max_layer });
            }

            let vector_count = cursor.read_u32::<LittleEndian>()?;
            let mut vectors = BTreeMap::new();
            for _ in 0..vector_count {
                let id = cursor.read_u32::<LittleEndian>()?;
                let dim = cursor.read_u32::<LittleEndian>()?;
                let mut values = Vec::with_capacity(dim as usize);
                for _ in 0..dim {
                    values.push(cursor.read_f32::<LittleEndian>()?);
                }
                vectors.insert(id, values);
            }

            let mut record_by_internal = BTreeMap::new();
            for (i, hex) in sidecar.id_mapping.iter().enumerate() {
                if !hex.is_empty() {
                    let id: AtomId = hex.parse().map_err(|_| IndexError::CorruptSidecar(format!("bad atom id {hex:?}")))?;
                    record_by_internal.insert(i as u32, id);
                }
            }

            let graph = Graph {
                params,
                ml: 1.0 / (params.m as f64).ln(),
                nodes,
                entry_point,
                max_level,
                rng_seed,
                rng_counter,
            };

            Ok(HnswVectorIndex::Graph {
                name: path_prefix.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default(),
                metric,
                dim: sidecar.dim,
                params,
                graph,
                vectors,
                record_by_internal,
                next_internal_id: sidecar.id_mapping.len() as u32,
            })
        }
    }

    fn read_u8(cursor: &mut Cursor<Vec<u8>>) -> Result<u8> {
        let mut buf = [0u8; 1];
        cursor.read_exact(&mut buf)?;
        Ok(buf[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protobase_storage::{BlockProvider, MemoryBlockProvider};
    use protobase_txn::{ObjectSpace, Transaction};
    use std::sync::Arc;

    fn vector_extractor() -> Arc<crate::definition::ExtractorFn> {
        Arc::new(|atoms, record| {
            let (values, _) = vector::load(atoms, record)?;
            Ok(ExtractedKey::Vector(values))
        })
    }

    fn make_vector(txn: &mut Transaction<'_>, values: Vec<f32>) -> AtomId {
        vector::build(txn, values, MetricHint::Cosine)
    }

    #[test]
    fn search_finds_the_nearest_vector() {
        let provider: Arc<dyn BlockProvider> = Arc::new(MemoryBlockProvider::new(4096));
        let space = ObjectSpace::open(provider, 8).unwrap();
        let mut txn = space.new_transaction();

        let mut records = Vec::new();
        for i in 0..200u32 {
            let angle = (i as f32) * 0.03;
            records.push(make_vector(&mut txn, vec![angle.cos(), angle.sin(), 0.0]));
        }

        let def = IndexDefinition::hnsw_vector("by_embedding", vector_extractor(), HnswParams::default());
        let index = HnswVectorIndex::build(&txn, &def, MetricHint::Cosine, 3, records.clone()).unwrap();

        let results = index.search(&[1.0, 0.0, 0.0], Some(5), None).unwrap();
        assert!(!results.is_empty());
        // The exact match (angle 0, i.e. records[0]) should be among the top few.
        assert!(results.iter().take(5).any(|(id, _)| *id == records[0]));
    }

    #[test]
    fn save_and_load_round_trips_search_results() {
        let provider: Arc<dyn BlockProvider> = Arc::new(MemoryBlockProvider::new(4096));
        let space = ObjectSpace::open(provider, 8).unwrap();
        let mut txn = space.new_transaction();

        let mut records = Vec::new();
        for i in 0..50u32 {
            let angle = (i as f32) * 0.1;
            records.push(make_vector(&mut txn, vec![angle.cos(), angle.sin()]));
        }

        let def = IndexDefinition::hnsw_vector("by_embedding", vector_extractor(), HnswParams::default());
        let index = HnswVectorIndex::build(&txn, &def, MetricHint::Cosine, 2, records).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("idx");
        index.save(&prefix).unwrap();
        let reloaded = HnswVectorIndex::load(&prefix).unwrap();

        let before = index.search(&[1.0, 0.0], Some(5), None).unwrap();
        let after = reloaded.search(&[1.0, 0.0], Some(5), None).unwrap();
        assert_eq!(before, after);
    }
}

//! `ExactVectorIndex`: linear scan over stored vectors using the declared
//! metric (spec §4.6). The baseline every `HNSWVectorIndex` result is
//! checked against, and the fallback used when the HNSW backend is
//! compiled out.

use crate::definition::{ExtractedKey, IndexDefinition};
use crate::error::{IndexError, Result};
use crate::queryable::QueryableIndex;
use protobase_atom::{AtomId, MetricHint};
use protobase_collections::vector;
use protobase_txn::AtomReader;

/// Turn a metric-specific distance into "higher is more similar", so
/// ranking is uniform across cosine and L2 without the caller needing to
/// know which metric an index was built with.
fn score(metric: MetricHint, a: &[f32], b: &[f32]) -> Result<f32> {
    Ok(match metric {
        MetricHint::Cosine => vector::cosine_similarity(a, b)?,
        MetricHint::L2 => 1.0 / (1.0 + vector::l2_distance(a, b)?),
    })
}

struct Entry {
    record: AtomId,
    values: Vec<f32>,
}

/// A built exact vector index: every indexed vector kept in memory,
/// searched by linear scan.
pub struct ExactVectorIndex {
    name: String,
    metric: MetricHint,
    dim: u32,
    entries: Vec<Entry>,
}

impl ExactVectorIndex {
    /// Scan `records`, extracting a vector from each via `definition`'s
    /// extractor.
    pub fn build(
        atoms: &dyn AtomReader,
        definition: &IndexDefinition,
        metric: MetricHint,
        dim: u32,
        records: impl IntoIterator<Item = AtomId>,
    ) -> Result<Self> {
        let mut entries = Vec::new();
        for record in records {
            match (definition.extractor)(atoms, record)? {
                ExtractedKey::Vector(values) => {
                    if values.len() as u32 != dim {
                        return Err(IndexError::DimensionMismatch { index_dim: dim, query_dim: values.len() as u32 });
                    }
                    entries.push(Entry { record, values });
                }
                ExtractedKey::Scalar(_) => {
                    tracing::warn!(index = %definition.name, "scalar key extracted for a vector index, ignoring");
                }
            }
        }
        Ok(ExactVectorIndex { name: definition.name.clone(), metric, dim, entries })
    }

    /// Declared vector dimension.
    pub fn dim(&self) -> u32 {
        self.dim
    }
}

impl QueryableIndex for ExactVectorIndex {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookup(&self, _key: AtomId) -> Vec<AtomId> {
        Vec::new()
    }

    fn cost_estimate(&self, _key: AtomId) -> usize {
        self.entries.len()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn supports_vector_search(&self) -> bool {
        true
    }

    fn search(&self, query: &[f32], k: Option<usize>, threshold: Option<f32>) -> Result<Vec<(AtomId, f32)>> {
        if query.len() as u32 != self.dim {
            return Err(IndexError::DimensionMismatch { index_dim: self.dim, query_dim: query.len() as u32 });
        }
        let mut scored: Vec<(AtomId, f32)> = self
            .entries
            .iter()
            .map(|e| Ok((e.record, score(self.metric, query, &e.values)?)))
            .collect::<Result<Vec<_>>>()?;
        if let Some(threshold) = threshold {
            scored.retain(|(_, s)| *s >= threshold);
        }
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.0.cmp(&b.0)));
        if let Some(k) = k {
            scored.truncate(k);
        }
        Ok(scored)
    }
}

//! Immutable dense float vectors (spec §4.5, §6): a `VectorHeader` atom
//! referencing a `VectorBlob` atom of raw IEEE-754 components. Stored
//! whole — there is no persistent update in place, only replace.

use crate::error::{CollectionError, Result};
use protobase_atom::{AtomId, MetricHint, VectorBlobData, VectorHeaderData};
use protobase_txn::{AtomReader, Transaction};

/// Stage a new vector, returning the header atom's id.
pub fn build(txn: &mut Transaction<'_>, values: Vec<f32>, metric: MetricHint) -> AtomId {
    let dim = values.len() as u32;
    let blob = txn.put_atom(VectorBlobData { values }.to_atom());
    txn.put_atom(VectorHeaderData { dim, metric, data: blob }.to_atom())
}

/// Load a vector's components and declared metric.
pub fn load(atoms: &dyn AtomReader, header_id: AtomId) -> Result<(Vec<f32>, MetricHint)> {
    let header_atom = atoms
        .get_atom(&header_id)
        .ok_or_else(|| CollectionError::CorruptNode(format!("missing vector header atom {header_id}")))?;
    let header = VectorHeaderData::from_atom(&header_atom)?;
    let blob_atom = atoms
        .get_atom(&header.data)
        .ok_or_else(|| CollectionError::CorruptNode(format!("missing vector blob atom {}", header.data)))?;
    let blob = VectorBlobData::from_atom(&blob_atom)?;
    Ok((blob.values, header.metric))
}

/// Declared dimensionality without loading the backing blob.
pub fn dim(atoms: &dyn AtomReader, header_id: AtomId) -> Result<u32> {
    let header_atom = atoms
        .get_atom(&header_id)
        .ok_or_else(|| CollectionError::CorruptNode(format!("missing vector header atom {header_id}")))?;
    Ok(VectorHeaderData::from_atom(&header_atom)?.dim)
}

fn check_dims(a: &[f32], b: &[f32]) -> Result<()> {
    if a.len() != b.len() {
        return Err(CollectionError::DimensionMismatch { a: a.len() as u32, b: b.len() as u32 });
    }
    Ok(())
}

/// Cosine similarity in `[-1, 1]`. `1.0` for identical direction.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    check_dims(a, b)?;
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }
    Ok(dot / (norm_a * norm_b))
}

/// Euclidean (L2) distance. `0.0` for identical vectors.
pub fn l2_distance(a: &[f32], b: &[f32]) -> Result<f32> {
    check_dims(a, b)?;
    let sum: f32 = a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum();
    Ok(sum.sqrt())
}

/// Distance under `metric`, where smaller always means "closer" — cosine
/// similarity is inverted to `1.0 - similarity` so ranking is consistent
/// with [`l2_distance`] regardless of which metric a vector declares.
pub fn distance(metric: MetricHint, a: &[f32], b: &[f32]) -> Result<f32> {
    match metric {
        MetricHint::Cosine => Ok(1.0 - cosine_similarity(a, b)?),
        MetricHint::L2 => l2_distance(a, b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protobase_storage::{BlockProvider, MemoryBlockProvider};
    use protobase_txn::ObjectSpace;
    use std::sync::Arc;

    fn space() -> ObjectSpace {
        let provider: Arc<dyn BlockProvider> = Arc::new(MemoryBlockProvider::new(4096));
        ObjectSpace::open(provider, 8).unwrap()
    }

    #[test]
    fn build_then_load_round_trips() {
        let space = space();
        let mut txn = space.new_transaction();
        let id = build(&mut txn, vec![1.0, 2.0, 3.0], MetricHint::Cosine);
        let (values, metric) = load(&txn, id).unwrap();
        assert_eq!(values, vec![1.0, 2.0, 3.0]);
        assert_eq!(metric, MetricHint::Cosine);
        assert_eq!(dim(&txn, id).unwrap(), 3);
    }

    #[test]
    fn identical_vectors_have_similarity_one_and_distance_zero() {
        let a = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &a).unwrap() - 1.0).abs() < 1e-6);
        assert!(l2_distance(&a, &a).unwrap().abs() < 1e-6);
    }

    #[test]
    fn orthogonal_vectors_have_zero_cosine_similarity() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).unwrap().abs() < 1e-6);
    }

    #[test]
    fn mismatched_dimensions_are_rejected() {
        let a = vec![1.0, 2.0];
        let b = vec![1.0, 2.0, 3.0];
        assert!(matches!(cosine_similarity(&a, &b), Err(CollectionError::DimensionMismatch { a: 2, b: 3 })));
    }
}

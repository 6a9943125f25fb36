//! The Apache Arrow / Parquet handshake (spec §6), gated behind the
//! `arrow-bridge` feature. With the feature disabled — the default, since
//! `arrow`/`parquet` are heavyweight optional dependencies, matching the
//! teacher's `comparison-benchmarks`/`usearch-enabled` optional-feature
//! pattern — every entry point here returns [`crate::Error::ArrowNotAvailable`]
//! rather than failing to compile.

use crate::error::{Error, Result};
use protobase_atom::{AtomId, Value};
use protobase_collections::{dictionary, vector};
use protobase_txn::Transaction;

/// Convert `records` (each a `Dictionary` root) into an Arrow `RecordBatch`
/// with one column per name in `fields`, reading each record's value for
/// that field and coercing it to the column's inferred Arrow type.
#[cfg(feature = "arrow-bridge")]
pub fn to_arrow(txn: &Transaction<'_>, records: &[AtomId], fields: &[&str]) -> Result<arrow::record_batch::RecordBatch> {
    use arrow::array::{ArrayRef, BooleanBuilder, Float64Builder, Int64Builder, StringBuilder};
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc as StdArc;

    let mut columns: Vec<ArrayRef> = Vec::with_capacity(fields.len());
    let mut schema_fields = Vec::with_capacity(fields.len());

    for &field in fields {
        let values: Vec<Option<Value>> = records
            .iter()
            .map(|record| {
                let field_id = dictionary::get(txn, *record, field).ok().flatten()?;
                let atom = txn.get_atom(&field_id).ok()?;
                Value::decode(&atom.body).ok().map(|(value, _consumed)| value)
            })
            .collect();

        let data_type = values.iter().flatten().next().map(arrow_type_of).unwrap_or(DataType::Utf8);
        let array: ArrayRef = match data_type {
            DataType::Int64 => {
                let mut b = Int64Builder::with_capacity(values.len());
                for v in &values {
                    match v {
                        Some(Value::I64(n)) => b.append_value(*n),
                        _ => b.append_null(),
                    }
                }
                StdArc::new(b.finish())
            }
            DataType::Float64 => {
                let mut b = Float64Builder::with_capacity(values.len());
                for v in &values {
                    match v {
                        Some(Value::F64(n)) => b.append_value(*n),
                        _ => b.append_null(),
                    }
                }
                StdArc::new(b.finish())
            }
            DataType::Boolean => {
                let mut b = BooleanBuilder::with_capacity(values.len());
                for v in &values {
                    match v {
                        Some(Value::Bool(bv)) => b.append_value(*bv),
                        _ => b.append_null(),
                    }
                }
                StdArc::new(b.finish())
            }
            _ => {
                let mut b = StringBuilder::new();
                for v in &values {
                    match v {
                        Some(Value::Str(s)) => b.append_value(s),
                        _ => b.append_null(),
                    }
                }
                StdArc::new(b.finish())
            }
        };

        schema_fields.push(Field::new(*field, data_type, true));
        columns.push(array);
    }

    let schema = StdArc::new(Schema::new(schema_fields));
    arrow::record_batch::RecordBatch::try_new(schema, columns).map_err(|e| Error::InvariantViolated(e.to_string()))
}

#[cfg(not(feature = "arrow-bridge"))]
#[allow(missing_docs, clippy::missing_errors_doc)]
pub fn to_arrow(_txn: &Transaction<'_>, _records: &[AtomId], _fields: &[&str]) -> Result<()> {
    Err(Error::ArrowNotAvailable)
}

/// Write `batch` (from [`to_arrow`]) to a Parquet file at `path`.
#[cfg(feature = "arrow-bridge")]
pub fn table_to_parquet(batch: &arrow::record_batch::RecordBatch, path: impl AsRef<std::path::Path>) -> Result<()> {
    use parquet::arrow::ArrowWriter;
    let file = std::fs::File::create(path).map_err(protobase_storage::StorageError::Io)?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None).map_err(|e| Error::InvariantViolated(e.to_string()))?;
    writer.write(batch).map_err(|e| Error::InvariantViolated(e.to_string()))?;
    writer.close().map_err(|e| Error::InvariantViolated(e.to_string()))?;
    Ok(())
}

#[cfg(not(feature = "arrow-bridge"))]
#[allow(missing_docs)]
pub fn table_to_parquet(_path: impl AsRef<std::path::Path>) -> Result<()> {
    Err(Error::ArrowNotAvailable)
}

/// Read every row group of a Parquet file at `path` back into Arrow
/// `RecordBatch`es.
#[cfg(feature = "arrow-bridge")]
pub fn scan_parquet(path: impl AsRef<std::path::Path>) -> Result<Vec<arrow::record_batch::RecordBatch>> {
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    let file = std::fs::File::open(path).map_err(protobase_storage::StorageError::Io)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(|e| Error::InvariantViolated(e.to_string()))?
        .build()
        .map_err(|e| Error::InvariantViolated(e.to_string()))?;
    reader
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::InvariantViolated(e.to_string()))
}

#[cfg(not(feature = "arrow-bridge"))]
#[allow(missing_docs)]
pub fn scan_parquet(_path: impl AsRef<std::path::Path>) -> Result<()> {
    Err(Error::ArrowNotAvailable)
}

/// Build a fixed-size-list Arrow array of `dim`-wide float32 vectors from
/// `Vector` atoms, for handing embeddings to Arrow-consuming tooling.
#[cfg(feature = "arrow-bridge")]
pub fn vectors_fixed_size_list(txn: &Transaction<'_>, vector_ids: &[AtomId], dim: usize) -> Result<arrow::array::FixedSizeListArray> {
    use arrow::array::{FixedSizeListArray, Float32Array};
    use arrow::datatypes::{DataType, Field};
    use std::sync::Arc as StdArc;

    let mut flat = Vec::with_capacity(vector_ids.len() * dim);
    for id in vector_ids {
        let (values, _metric) = vector::load(txn, *id)?;
        if values.len() != dim {
            return Err(Error::InvariantViolated(format!("vector {id} has dimension {} but table dimension is {dim}", values.len())));
        }
        flat.extend_from_slice(&values);
    }

    let field = StdArc::new(Field::new("item", DataType::Float32, false));
    let values = StdArc::new(Float32Array::from(flat));
    FixedSizeListArray::try_new(field, dim as i32, values, None).map_err(|e| Error::InvariantViolated(e.to_string()))
}

#[cfg(not(feature = "arrow-bridge"))]
#[allow(missing_docs)]
pub fn vectors_fixed_size_list(_vector_ids: &[AtomId], _dim: usize) -> Result<()> {
    Err(Error::ArrowNotAvailable)
}

#[cfg(feature = "arrow-bridge")]
fn arrow_type_of(value: &Value) -> arrow::datatypes::DataType {
    use arrow::datatypes::DataType;
    match value {
        Value::I64(_) => DataType::Int64,
        Value::F64(_) => DataType::Float64,
        Value::Bool(_) => DataType::Boolean,
        Value::Str(_) | Value::Bytes(_) | Value::Null | Value::AtomRef(_) => DataType::Utf8,
    }
}

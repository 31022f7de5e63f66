//! Per-node operator implementations.
//!
//! Each operator consumes fully evaluated child outputs and returns an
//! [`ExecOutput`] whose batches match the node's inferred schema exactly.

use arrow::array::{ArrayRef, Int64Array, UInt32Array};
use arrow::compute::{concat_batches, take};
use arrow::record_batch::RecordBatch;
use arrow_schema::SchemaRef;
use std::sync::Arc;
use tessera_common::{Result, TesseraError};

use crate::schema::PlanSchema;

pub mod aggregate;
pub mod dml;
pub mod filter;
pub mod join;
pub mod limit;
pub mod project;
pub mod scan;
pub mod sort;

/// Evaluated node output: its schema and ordered batches.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub schema: PlanSchema,
    pub batches: Vec<RecordBatch>,
}

impl ExecOutput {
    pub fn new(schema: PlanSchema, batches: Vec<RecordBatch>) -> Self {
        Self { schema, batches }
    }

    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(RecordBatch::num_rows).sum()
    }

    /// All batches as one. Used by materializing operators.
    pub fn concat(&self) -> Result<RecordBatch> {
        concat_batches(&self.schema.arrow_schema(), &self.batches)
            .map_err(|e| TesseraError::Execution(format!("concat batches failed: {e}")))
    }
}

pub(crate) fn batch_with_schema(schema: &SchemaRef, columns: Vec<ArrayRef>) -> Result<RecordBatch> {
    RecordBatch::try_new(schema.clone(), columns)
        .map_err(|e| TesseraError::Execution(format!("build batch failed: {e}")))
}

/// Gathers `indices` from `batch`, splitting the result into batches of at
/// most `max_rows` rows.
pub(crate) fn take_split(
    batch: &RecordBatch,
    schema: &SchemaRef,
    indices: &[u32],
    max_rows: usize,
) -> Result<Vec<RecordBatch>> {
    indices
        .chunks(max_rows.max(1))
        .map(|part| {
            let idx = UInt32Array::from(part.to_vec());
            let columns = batch
                .columns()
                .iter()
                .map(|c| take(c.as_ref(), &idx, None))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| TesseraError::Execution(format!("take failed: {e}")))?;
            batch_with_schema(schema, columns)
        })
        .collect()
}

/// Zero-copy split of `batch` into slices of at most `max_rows` rows. Empty
/// input yields no batches.
pub(crate) fn split_batch(batch: RecordBatch, max_rows: usize) -> Vec<RecordBatch> {
    let max_rows = max_rows.max(1);
    let rows = batch.num_rows();
    if rows <= max_rows {
        return if rows == 0 { Vec::new() } else { vec![batch] };
    }
    (0..rows)
        .step_by(max_rows)
        .map(|offset| batch.slice(offset, max_rows.min(rows - offset)))
        .collect()
}

/// One-row `rows_affected` result of a DML node.
pub(crate) fn rows_affected_output(rows: usize) -> Result<ExecOutput> {
    let schema = PlanSchema::rows_affected();
    let batch = batch_with_schema(
        &schema.arrow_schema(),
        vec![Arc::new(Int64Array::from(vec![rows as i64]))],
    )?;
    Ok(ExecOutput::new(schema, vec![batch]))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::Int64Array;
    use arrow::record_batch::RecordBatch;
    use arrow_schema::{DataType, Field, Schema};

    use super::split_batch;

    #[test]
    fn split_respects_the_row_cap() {
        let schema = Arc::new(Schema::new(vec![Field::new("v", DataType::Int64, false)]));
        let batch = RecordBatch::try_new(
            schema,
            vec![Arc::new(Int64Array::from((0..10).collect::<Vec<i64>>()))],
        )
        .expect("batch");
        let parts = split_batch(batch, 4);
        let sizes: Vec<usize> = parts.iter().map(RecordBatch::num_rows).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
    }
}

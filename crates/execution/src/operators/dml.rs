//! INSERT, UPDATE and DELETE.
//!
//! Updates and deletes rebuild only the chunks they touch and publish the
//! successor chunk set in one swap under the table's writer lock. A failure
//! anywhere leaves the table as it was.

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, BooleanArray};
use arrow::compute::kernels::boolean::not;
use arrow::compute::{filter_record_batch, interleave};
use arrow::record_batch::RecordBatch;
use arrow_schema::DataType;
use tessera_common::{Result, SessionState, TesseraError};
use tessera_planner::{DeleteProperties, Expr, InsertProperties, PlanType, UpdateProperties};
use tessera_storage::{Chunk, ColumnMeta, DataManager, TableMeta};

use crate::expressions::{
    cast_array, compile_expr, evaluate_constant, expect_predicate, predicate_mask, PhysicalExpr,
};
use crate::schema::PlanSchema;

/// What a DML node did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DmlOutcome {
    pub rows_affected: usize,
    pub chunks_written: usize,
}

pub fn run_insert(
    insert: &InsertProperties,
    session: &SessionState,
    data: &DataManager,
) -> Result<DmlOutcome> {
    let database = session.resolve_database(insert.database.as_deref())?;
    let rows = insert
        .values
        .iter()
        .map(|row| {
            row.iter()
                .map(|v| evaluate_constant(v, PlanType::InsertPlan))
                .collect::<Result<Vec<_>>>()
        })
        .collect::<Result<Vec<_>>>()?;
    let n = data.insert_data(database, &insert.table, &insert.columns, &rows)?;
    Ok(DmlOutcome {
        rows_affected: n,
        chunks_written: usize::from(n > 0),
    })
}

/// Rewrites matching rows per assigned column. Assignment values are
/// computed on the matching rows only, as they were before the statement.
pub fn run_update(
    update: &UpdateProperties,
    session: &SessionState,
    data: &DataManager,
) -> Result<DmlOutcome> {
    let database = session.resolve_database(update.database.as_deref())?;
    data.replace_chunks(database, &update.table, |meta, current| {
        let schema = PlanSchema::for_table(meta, update.relation());
        let predicate =
            compile_condition(update.condition.as_ref(), &schema, PlanType::UpdatePlan)?;

        let mut assignments: Vec<(usize, Arc<dyn PhysicalExpr>)> = Vec::new();
        for a in &update.assignments {
            let idx = schema.resolve(&a.column, PlanType::UpdatePlan)?;
            if assignments.iter().any(|(i, _)| *i == idx) {
                return Err(TesseraError::DuplicateColumn {
                    table: meta.name.clone(),
                    column: meta.columns[idx].name.clone(),
                });
            }
            let value = compile_expr(&a.value, &schema, PlanType::UpdatePlan)?;
            check_assignable(&value.data_type(), &meta.columns[idx])?;
            assignments.push((idx, value));
        }

        let arrow_schema = meta.arrow_schema();
        let mut outcome = DmlOutcome::default();
        let mut chunks = Vec::with_capacity(current.len());
        for chunk in &current.chunks {
            let batch = &chunk.batch;
            let mask = selection(predicate.as_deref(), batch)?;
            let hits = mask.true_count();
            if hits == 0 {
                chunks.push(Arc::clone(chunk));
                continue;
            }
            // Assignments are evaluated on the matching rows only.
            let matched = filter_record_batch(batch, &mask)
                .map_err(|e| TesseraError::Execution(format!("filter batch failed: {e}")))?;
            let mut columns: Vec<ArrayRef> = batch.columns().to_vec();
            for (idx, value) in &assignments {
                let col = &meta.columns[*idx];
                let new = cast_array(&value.evaluate(&matched)?, &col.column_type.to_arrow())?;
                if col.not_null && new.null_count() > 0 {
                    return Err(TesseraError::TypeMismatch {
                        column: col.name.clone(),
                        expected: format!("non-null {}", col.column_type),
                        actual: "Null".to_string(),
                    });
                }
                columns[*idx] = scatter(&mask, &new, batch.column(*idx))?;
            }
            let rebuilt = RecordBatch::try_new(arrow_schema.clone(), columns)
                .map_err(|e| schema_mismatch(meta, e))?;
            chunks.push(Arc::new(Chunk::new(rebuilt)));
            outcome.rows_affected += hits;
            outcome.chunks_written += 1;
        }
        Ok((chunks, outcome))
    })
}

/// Keeps the complement of the matching rows. Chunks left empty are dropped.
pub fn run_delete(
    delete: &DeleteProperties,
    session: &SessionState,
    data: &DataManager,
) -> Result<DmlOutcome> {
    let database = session.resolve_database(delete.database.as_deref())?;
    data.replace_chunks(database, &delete.table, |meta, current| {
        let schema = PlanSchema::for_table(meta, delete.relation());
        let predicate =
            compile_condition(delete.condition.as_ref(), &schema, PlanType::DeletePlan)?;

        let mut outcome = DmlOutcome::default();
        let mut chunks = Vec::with_capacity(current.len());
        for chunk in &current.chunks {
            let batch = &chunk.batch;
            let mask = selection(predicate.as_deref(), batch)?;
            let hits = mask.true_count();
            if hits == 0 {
                chunks.push(Arc::clone(chunk));
                continue;
            }
            outcome.rows_affected += hits;
            if hits == batch.num_rows() {
                continue;
            }
            let keep =
                not(&mask).map_err(|e| TesseraError::Execution(format!("not failed: {e}")))?;
            let kept = filter_record_batch(batch, &keep)
                .map_err(|e| TesseraError::Execution(format!("filter batch failed: {e}")))?;
            chunks.push(Arc::new(Chunk::new(kept)));
            outcome.chunks_written += 1;
        }
        Ok((chunks, outcome))
    })
}

fn compile_condition(
    condition: Option<&Expr>,
    schema: &PlanSchema,
    plan: PlanType,
) -> Result<Option<Arc<dyn PhysicalExpr>>> {
    condition
        .map(|c| {
            let compiled = compile_expr(c, schema, plan)?;
            expect_predicate(&compiled, c)?;
            Ok(compiled)
        })
        .transpose()
}

/// Rows the statement applies to. No condition selects every row.
fn selection(predicate: Option<&dyn PhysicalExpr>, batch: &RecordBatch) -> Result<BooleanArray> {
    match predicate {
        Some(p) => predicate_mask(p, batch),
        None => Ok(BooleanArray::from(vec![true; batch.num_rows()])),
    }
}

/// Puts `matched[k]` at the k-th selected row of `old`.
fn scatter(mask: &BooleanArray, matched: &ArrayRef, old: &ArrayRef) -> Result<ArrayRef> {
    let mut next = 0;
    let indices: Vec<(usize, usize)> = (0..old.len())
        .map(|row| {
            if mask.value(row) {
                next += 1;
                (1, next - 1)
            } else {
                (0, row)
            }
        })
        .collect();
    interleave(&[old.as_ref(), matched.as_ref()], &indices)
        .map_err(|e| TesseraError::Execution(format!("interleave failed: {e}")))
}

fn check_assignable(from: &DataType, column: &ColumnMeta) -> Result<()> {
    use DataType::*;
    let to = column.column_type.to_arrow();
    let ok = match (from, &to) {
        _ if *from == to => true,
        (Null, _) => true,
        (Int32 | Int64, Int32 | Int64 | Float64) => true,
        (Int64 | Utf8, Timestamp(..)) => true,
        _ => false,
    };
    if ok {
        Ok(())
    } else {
        Err(TesseraError::TypeMismatch {
            column: column.name.clone(),
            expected: format!("{to:?}"),
            actual: format!("{from:?}"),
        })
    }
}

fn schema_mismatch(meta: &TableMeta, e: arrow_schema::ArrowError) -> TesseraError {
    TesseraError::SchemaMismatch {
        table: meta.name.clone(),
        detail: e.to_string(),
    }
}

use std::collections::HashMap;

use arrow::array::ArrayRef;
use arrow::record_batch::RecordBatch;
use arrow_schema::DataType;
use tessera_common::{Result, TesseraError};
use tessera_planner::{BinaryOp, Expr, FilterProperties, JoinProperties, JoinStrategy, PlanType};
use tessera_storage::value::scalar_from_array;
use tessera_storage::ScalarValue;
use tracing::debug;

use super::filter::run_filter;
use super::{batch_with_schema, ExecOutput};
use crate::expressions::{cast_array, common_type, compile_expr, PhysicalExpr};

/// Inner equi-join. The left child is the build side and the right child is
/// probed, so matches come out in probe order, then build order. Both
/// strategies produce identical rows in identical order.
pub fn run_join(
    join: &JoinProperties,
    left: ExecOutput,
    right: ExecOutput,
    batch_size_rows: usize,
) -> Result<ExecOutput> {
    let build = left.concat()?;
    let probe = right.concat()?;
    let left_key = compile_expr(&join.left_key, &left.schema, PlanType::JoinPlan)?;
    let right_key = compile_expr(&join.right_key, &right.schema, PlanType::JoinPlan)?;
    let shared = common_type(&left_key.data_type(), &right_key.data_type()).ok_or_else(|| {
        TesseraError::TypeMismatch {
            column: join.condition.to_string(),
            expected: format!("{:?}", left_key.data_type()),
            actual: format!("{:?}", right_key.data_type()),
        }
    })?;
    let build_keys = key_values(left_key.as_ref(), &build, &shared)?;
    let probe_keys = key_values(right_key.as_ref(), &probe, &shared)?;

    let pairs = match join.strategy {
        JoinStrategy::Hash => hash_join_pairs(&build_keys, &probe_keys),
        JoinStrategy::NestedLoop => nested_loop_pairs(&build_keys, &probe_keys),
    };
    debug!(
        strategy = ?join.strategy,
        build_rows = build.num_rows(),
        probe_rows = probe.num_rows(),
        matches = pairs.len(),
        "join matched"
    );

    let schema = left.schema.join(&right.schema);
    let arrow_schema = schema.arrow_schema();
    let mut batches = Vec::new();
    for part in pairs.chunks(batch_size_rows.max(1)) {
        let build_idx: Vec<u32> = part.iter().map(|(b, _)| *b).collect();
        let probe_idx: Vec<u32> = part.iter().map(|(_, p)| *p).collect();
        let mut columns = gather(&build, &build_idx)?;
        columns.extend(gather(&probe, &probe_idx)?);
        batches.push(batch_with_schema(&arrow_schema, columns)?);
    }
    let joined = ExecOutput::new(schema, batches);

    match residual_condition(join) {
        Some(condition) => run_filter(&FilterProperties { condition }, joined),
        None => Ok(joined),
    }
}

/// The ON condition when it says more than `left_key = right_key`.
fn residual_condition(join: &JoinProperties) -> Option<Expr> {
    let forward = Expr::binary(join.left_key.clone(), BinaryOp::Eq, join.right_key.clone());
    let backward = Expr::binary(join.right_key.clone(), BinaryOp::Eq, join.left_key.clone());
    if join.condition == forward || join.condition == backward {
        None
    } else {
        Some(join.condition.clone())
    }
}

/// Per-row key values, cast to the type shared with the other side so equal
/// keys hash equally.
fn key_values(
    key: &dyn PhysicalExpr,
    batch: &RecordBatch,
    shared: &DataType,
) -> Result<Vec<ScalarValue>> {
    let arr = cast_array(&key.evaluate(batch)?, shared)?;
    (0..batch.num_rows())
        .map(|row| scalar_from_array(&arr, row))
        .collect()
}

/// NULL and NaN keys never match anything, themselves included.
fn joinable(key: &ScalarValue) -> bool {
    !key.is_null() && !key.is_nan()
}

fn hash_join_pairs(build: &[ScalarValue], probe: &[ScalarValue]) -> Vec<(u32, u32)> {
    let mut table: HashMap<&ScalarValue, Vec<u32>> = HashMap::new();
    for (row, key) in build.iter().enumerate() {
        if joinable(key) {
            table.entry(key).or_default().push(row as u32);
        }
    }
    let mut pairs = Vec::new();
    for (p, key) in probe.iter().enumerate() {
        if !joinable(key) {
            continue;
        }
        if let Some(rows) = table.get(key) {
            pairs.extend(rows.iter().map(|b| (*b, p as u32)));
        }
    }
    pairs
}

fn nested_loop_pairs(build: &[ScalarValue], probe: &[ScalarValue]) -> Vec<(u32, u32)> {
    let mut pairs = Vec::new();
    for (p, pk) in probe.iter().enumerate() {
        if !joinable(pk) {
            continue;
        }
        for (b, bk) in build.iter().enumerate() {
            if bk == pk {
                pairs.push((b as u32, p as u32));
            }
        }
    }
    pairs
}

fn gather(batch: &RecordBatch, indices: &[u32]) -> Result<Vec<ArrayRef>> {
    let idx = arrow::array::UInt32Array::from(indices.to_vec());
    batch
        .columns()
        .iter()
        .map(|c| {
            arrow::compute::take(c.as_ref(), &idx, None)
                .map_err(|e| TesseraError::Execution(format!("take failed: {e}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use tessera_storage::ScalarValue;

    use super::{hash_join_pairs, nested_loop_pairs};

    #[test]
    fn strategies_agree_on_pairs_and_order() {
        let build = vec![
            ScalarValue::Int64(1),
            ScalarValue::Int64(2),
            ScalarValue::Null,
            ScalarValue::Int64(1),
        ];
        let probe = vec![
            ScalarValue::Int64(1),
            ScalarValue::Null,
            ScalarValue::Int64(3),
            ScalarValue::Int64(2),
        ];
        let hashed = hash_join_pairs(&build, &probe);
        assert_eq!(hashed, vec![(0, 0), (3, 0), (1, 3)]);
        assert_eq!(nested_loop_pairs(&build, &probe), hashed);
    }

    #[test]
    fn signed_zeros_match_and_nan_never_does() {
        let build = vec![
            ScalarValue::float(-0.0),
            ScalarValue::float(f64::NAN),
        ];
        let probe = vec![ScalarValue::float(f64::NAN), ScalarValue::float(0.0)];
        let hashed = hash_join_pairs(&build, &probe);
        assert_eq!(hashed, vec![(0, 1)]);
        assert_eq!(nested_loop_pairs(&build, &probe), hashed);
    }
}

use arrow::compute::filter_record_batch;
use tessera_common::{Result, TesseraError};
use tessera_planner::{FilterProperties, PlanType};

use super::ExecOutput;
use crate::expressions::{compile_expr, predicate_mask};

/// Keeps rows whose condition is true. NULL counts as false and batches left
/// empty are dropped.
pub fn run_filter(filter: &FilterProperties, input: ExecOutput) -> Result<ExecOutput> {
    let predicate = compile_expr(&filter.condition, &input.schema, PlanType::FilterPlan)?;
    let mut out = Vec::with_capacity(input.batches.len());
    for batch in &input.batches {
        let mask = predicate_mask(predicate.as_ref(), batch)?;
        let kept = filter_record_batch(batch, &mask)
            .map_err(|e| TesseraError::Execution(format!("filter batch failed: {e}")))?;
        if kept.num_rows() > 0 {
            out.push(kept);
        }
    }
    Ok(ExecOutput::new(input.schema, out))
}

use tessera_planner::LimitProperties;

use super::ExecOutput;

/// Skips `offset` rows, then keeps at most `limit` rows, slicing batches at
/// the boundaries.
pub fn run_limit(limit: &LimitProperties, input: ExecOutput) -> ExecOutput {
    let mut skip = usize::try_from(limit.offset).unwrap_or(usize::MAX);
    let mut remaining = limit
        .limit
        .map(|n| usize::try_from(n).unwrap_or(usize::MAX))
        .unwrap_or(usize::MAX);
    let mut out = Vec::new();
    for batch in input.batches {
        if remaining == 0 {
            break;
        }
        let rows = batch.num_rows();
        if skip >= rows {
            skip -= rows;
            continue;
        }
        let take = (rows - skip).min(remaining);
        out.push(batch.slice(skip, take));
        remaining -= take;
        skip = 0;
    }
    ExecOutput::new(input.schema, out)
}

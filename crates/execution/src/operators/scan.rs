use tessera_common::{Result, SessionState};
use tessera_planner::TableScanProperties;
use tessera_storage::DataManager;

use super::{batch_with_schema, ExecOutput};
use crate::schema::PlanSchema;

/// Emits the table's chunks in chunk-set order, relabelled with the scan's
/// output schema.
pub fn run_table_scan(
    scan: &TableScanProperties,
    schema: PlanSchema,
    session: &SessionState,
    data: &DataManager,
) -> Result<ExecOutput> {
    let database = session.resolve_database(scan.database.as_deref())?;
    let arrow_schema = schema.arrow_schema();
    let batches = data
        .scan(database, &scan.table)?
        .filter(|b| b.num_rows() > 0)
        .map(|b| batch_with_schema(&arrow_schema, b.columns().to_vec()))
        .collect::<Result<Vec<_>>>()?;
    Ok(ExecOutput::new(schema, batches))
}

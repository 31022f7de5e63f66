use std::sync::Arc;

use arrow::array::ArrayRef;
use tessera_common::Result;
use tessera_planner::{PlanType, SelectItem, SelectProperties};

use super::{batch_with_schema, ExecOutput};
use crate::expressions::{cast_array, compile_expr, PhysicalExpr};
use crate::schema::PlanSchema;

enum Projection {
    AllColumns,
    Expr(Arc<dyn PhysicalExpr>),
}

/// Evaluates the select list per batch. `*` expands to the input columns.
pub fn run_select(
    select: &SelectProperties,
    input: ExecOutput,
    schema: PlanSchema,
) -> Result<ExecOutput> {
    let projections = select
        .items
        .iter()
        .map(|item| match item {
            SelectItem::Wildcard => Ok(Projection::AllColumns),
            SelectItem::Expr { expr, .. } => {
                compile_expr(expr, &input.schema, PlanType::SelectPlan).map(Projection::Expr)
            }
        })
        .collect::<Result<Vec<_>>>()?;

    let arrow_schema = schema.arrow_schema();
    let mut out = Vec::with_capacity(input.batches.len());
    for batch in &input.batches {
        let mut columns: Vec<ArrayRef> = Vec::with_capacity(schema.len());
        for p in &projections {
            match p {
                Projection::AllColumns => columns.extend(batch.columns().iter().cloned()),
                Projection::Expr(e) => {
                    let dt = arrow_schema.field(columns.len()).data_type().clone();
                    columns.push(cast_array(&e.evaluate(batch)?, &dt)?);
                }
            }
        }
        out.push(batch_with_schema(&arrow_schema, columns)?);
    }
    Ok(ExecOutput::new(schema, out))
}

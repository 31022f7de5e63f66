use std::sync::Arc;
use std::time::Instant;

use arrow::record_batch::RecordBatch;
use arrow_schema::{Schema, SchemaRef};
use tessera_common::{EngineConfig, MetricsRegistry, Result, SessionState, TesseraError};
use tessera_planner::{LogicalPlan, PlanProperties};
use tessera_storage::value::scalar_from_array;
use tessera_storage::{DataManager, ScalarValue};
use tracing::{debug, info_span};

use crate::operators::aggregate::run_group;
use crate::operators::dml::{run_delete, run_insert, run_update, DmlOutcome};
use crate::operators::filter::run_filter;
use crate::operators::join::run_join;
use crate::operators::limit::run_limit;
use crate::operators::project::run_select;
use crate::operators::scan::run_table_scan;
use crate::operators::sort::run_order;
use crate::operators::{rows_affected_output, ExecOutput};
use crate::schema::{infer_schema, node_schema, PlanSchema, ROWS_AFFECTED};

/// Final output of one plan: column headers and ordered batches sharing one
/// schema.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub headers: Vec<String>,
    pub schema: SchemaRef,
    pub batches: Vec<RecordBatch>,
}

impl QueryResult {
    /// Result of a statement that produces no rows, such as DDL or USE.
    pub fn empty() -> Self {
        Self {
            headers: Vec::new(),
            schema: Arc::new(Schema::empty()),
            batches: Vec::new(),
        }
    }

    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(RecordBatch::num_rows).sum()
    }

    /// Row-wise view of the result, mostly for tests and small outputs.
    pub fn rows(&self) -> Result<Vec<Vec<ScalarValue>>> {
        let mut rows = Vec::with_capacity(self.num_rows());
        for batch in &self.batches {
            for row in 0..batch.num_rows() {
                rows.push(
                    batch
                        .columns()
                        .iter()
                        .map(|c| scalar_from_array(c, row))
                        .collect::<Result<Vec<_>>>()?,
                );
            }
        }
        Ok(rows)
    }

    /// The count reported by an INSERT, UPDATE or DELETE.
    pub fn rows_affected(&self) -> Option<i64> {
        if self.headers != [ROWS_AFFECTED] {
            return None;
        }
        match self.rows().ok()?.first()?.first()? {
            ScalarValue::Int64(n) => Some(*n),
            _ => None,
        }
    }
}

/// Runs logical plans with a single post-order traversal.
///
/// Each node is typed by [`node_schema`] before its operator runs, so
/// execution output always matches [`Executor::infer_schema`].
#[derive(Debug, Clone)]
pub struct Executor {
    data: DataManager,
    metrics: MetricsRegistry,
    batch_size_rows: usize,
}

impl Executor {
    pub fn new(data: DataManager, metrics: MetricsRegistry, config: &EngineConfig) -> Self {
        Self {
            data,
            metrics,
            batch_size_rows: config.batch_size_rows.max(1),
        }
    }

    pub fn data(&self) -> &DataManager {
        &self.data
    }

    /// Output schema of `plan` without executing it.
    pub fn infer_schema(&self, plan: &LogicalPlan, session: &SessionState) -> Result<PlanSchema> {
        infer_schema(plan, session, &self.data)
    }

    /// Executes `plan`. Any failure aborts the whole call and no partial
    /// result is returned.
    pub fn execute(&self, plan: &LogicalPlan, session: &SessionState) -> Result<QueryResult> {
        let out = self.eval(plan, session)?;
        Ok(QueryResult {
            headers: out.schema.names(),
            schema: out.schema.arrow_schema(),
            batches: out.batches,
        })
    }

    fn eval(&self, plan: &LogicalPlan, session: &SessionState) -> Result<ExecOutput> {
        plan.check_node()?;
        let children = plan
            .children
            .iter()
            .map(|c| self.eval(c, session))
            .collect::<Result<Vec<_>>>()?;

        let operator = plan.plan_type.name();
        let started = Instant::now();
        let _span = info_span!("operator_execute", operator).entered();

        let child_schemas: Vec<PlanSchema> = children.iter().map(|c| c.schema.clone()).collect();
        let schema = node_schema(plan, &child_schemas, session, &self.data)?;
        let rows_in: usize = children.iter().map(ExecOutput::num_rows).sum();
        let mut inputs = children.into_iter();

        let out = match &plan.properties {
            PlanProperties::TableScan(scan) => run_table_scan(scan, schema, session, &self.data)?,
            PlanProperties::Filter(filter) => run_filter(filter, next_input(&mut inputs, plan)?)?,
            PlanProperties::Join(join) => {
                let left = next_input(&mut inputs, plan)?;
                let right = next_input(&mut inputs, plan)?;
                run_join(join, left, right, self.batch_size_rows)?
            }
            PlanProperties::Group(group) => run_group(
                group,
                next_input(&mut inputs, plan)?,
                schema,
                self.batch_size_rows,
            )?,
            PlanProperties::Order(order) => {
                run_order(order, next_input(&mut inputs, plan)?, self.batch_size_rows)?
            }
            PlanProperties::Limit(limit) => run_limit(limit, next_input(&mut inputs, plan)?),
            PlanProperties::Select(select) => {
                run_select(select, next_input(&mut inputs, plan)?, schema)?
            }
            PlanProperties::Insert(insert) => {
                let outcome = run_insert(insert, session, &self.data)?;
                self.dml_output(&insert.table, outcome)?
            }
            PlanProperties::Update(update) => {
                let outcome = run_update(update, session, &self.data)?;
                self.dml_output(&update.table, outcome)?
            }
            PlanProperties::Delete(delete) => {
                let outcome = run_delete(delete, session, &self.data)?;
                self.dml_output(&delete.table, outcome)?
            }
        };

        let rows_out = out.num_rows();
        self.metrics.record_operator(
            operator,
            rows_in as u64,
            rows_out as u64,
            out.batches.len() as u64,
            started.elapsed().as_secs_f64(),
        );
        debug!(
            operator,
            rows_in,
            rows_out,
            batches = out.batches.len(),
            "operator finished"
        );
        Ok(out)
    }

    fn dml_output(&self, table: &str, outcome: DmlOutcome) -> Result<ExecOutput> {
        if outcome.chunks_written > 0 {
            self.metrics
                .record_chunks_written(table, outcome.chunks_written as u64);
        }
        rows_affected_output(outcome.rows_affected)
    }
}

fn next_input(
    inputs: &mut impl Iterator<Item = ExecOutput>,
    plan: &LogicalPlan,
) -> Result<ExecOutput> {
    inputs.next().ok_or_else(|| {
        TesseraError::Execution(format!("{} is missing an input", plan.plan_type))
    })
}

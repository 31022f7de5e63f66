//! Output schemas of plan nodes.
//!
//! [`node_schema`] is the single place that types a node from its children.
//! The executor calls it before running each operator and [`infer_schema`]
//! calls it without touching row data, so both always agree.

use std::sync::Arc;

use arrow_schema::{DataType, Field, Schema, SchemaRef};
use tessera_common::{Result, SessionState, TesseraError};
use tessera_planner::{
    AggregateFunction, Expr, LogicalPlan, PlanProperties, PlanType, SelectItem,
};
use tessera_storage::{DataManager, TableMeta};

use crate::expressions::{compile_expr, expect_predicate};

/// Header text of the single column produced by DML plans.
pub const ROWS_AFFECTED: &str = "rows_affected";

/// One output column of a plan node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnHeader {
    /// Alias or table name that qualifies the column, if any.
    pub relation: Option<String>,
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl ColumnHeader {
    pub fn new(
        relation: Option<String>,
        name: impl Into<String>,
        data_type: DataType,
        nullable: bool,
    ) -> Self {
        Self {
            relation,
            name: name.into(),
            data_type,
            nullable,
        }
    }

    fn to_field(&self) -> Field {
        Field::new(&self.name, self.data_type.clone(), self.nullable)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanSchema {
    pub columns: Vec<ColumnHeader>,
}

impl PlanSchema {
    pub fn new(columns: Vec<ColumnHeader>) -> Self {
        Self { columns }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Table columns qualified by `relation`.
    pub fn for_table(meta: &TableMeta, relation: &str) -> Self {
        Self::new(
            meta.columns
                .iter()
                .map(|c| {
                    ColumnHeader::new(
                        Some(relation.to_string()),
                        c.name.clone(),
                        c.column_type.to_arrow(),
                        !c.not_null,
                    )
                })
                .collect(),
        )
    }

    pub fn rows_affected() -> Self {
        Self::new(vec![ColumnHeader::new(
            None,
            ROWS_AFFECTED,
            DataType::Int64,
            false,
        )])
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column(&self, index: usize) -> &ColumnHeader {
        &self.columns[index]
    }

    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn arrow_schema(&self) -> SchemaRef {
        Arc::new(Schema::new(
            self.columns.iter().map(ColumnHeader::to_field).collect::<Vec<_>>(),
        ))
    }

    /// Concatenation used by joins: `self` columns then `other` columns.
    pub fn join(&self, other: &PlanSchema) -> PlanSchema {
        let mut columns = self.columns.clone();
        columns.extend(other.columns.iter().cloned());
        PlanSchema::new(columns)
    }

    /// Resolves a column reference to its index.
    ///
    /// An exact header match wins, which is how aggregate outputs such as
    /// `SUM(u.salary)` are found. Otherwise `rel.col` must match the
    /// column's relation and `col` must match exactly one column.
    pub fn resolve(&self, column: &str, plan: PlanType) -> Result<usize> {
        let exact: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.name == column)
            .map(|(i, _)| i)
            .collect();
        let candidates = if !exact.is_empty() {
            exact
        } else if let Some((relation, name)) = column.split_once('.') {
            self.columns
                .iter()
                .enumerate()
                .filter(|(_, c)| c.name == name && c.relation.as_deref() == Some(relation))
                .map(|(i, _)| i)
                .collect()
        } else {
            Vec::new()
        };
        match candidates.as_slice() {
            [i] => Ok(*i),
            [] => Err(TesseraError::ColumnNotFound {
                column: column.to_string(),
                plan: plan.to_string(),
            }),
            _ => Err(TesseraError::AmbiguousColumn {
                column: column.to_string(),
                plan: plan.to_string(),
            }),
        }
    }
}

/// Types `plan` without reading any rows.
pub fn infer_schema(
    plan: &LogicalPlan,
    session: &SessionState,
    data: &DataManager,
) -> Result<PlanSchema> {
    plan.check_node()?;
    let children = plan
        .children
        .iter()
        .map(|c| infer_schema(c, session, data))
        .collect::<Result<Vec<_>>>()?;
    node_schema(plan, &children, session, data)
}

/// Output schema of one node given the schemas of its children.
///
/// Every expression the node carries is compiled here so unresolved or
/// mistyped references fail before execution starts.
pub fn node_schema(
    plan: &LogicalPlan,
    children: &[PlanSchema],
    session: &SessionState,
    data: &DataManager,
) -> Result<PlanSchema> {
    let pt = plan.plan_type;
    match &plan.properties {
        PlanProperties::TableScan(scan) => {
            let database = session.resolve_database(scan.database.as_deref())?;
            let meta = data.catalog().get_table(database, &scan.table)?;
            Ok(PlanSchema::for_table(&meta, scan.relation()))
        }
        PlanProperties::Filter(f) => {
            let input = &children[0];
            expect_predicate(&compile_expr(&f.condition, input, pt)?, &f.condition)?;
            Ok(input.clone())
        }
        PlanProperties::Join(j) => {
            let (left, right) = (&children[0], &children[1]);
            compile_expr(&j.left_key, left, pt)?;
            compile_expr(&j.right_key, right, pt)?;
            let joined = left.join(right);
            expect_predicate(&compile_expr(&j.condition, &joined, pt)?, &j.condition)?;
            Ok(joined)
        }
        PlanProperties::Group(g) => {
            let input = &children[0];
            let mut columns = Vec::with_capacity(g.keys.len() + g.aggregates.len());
            for key in &g.keys {
                columns.push(input.column(input.resolve(key, pt)?).clone());
            }
            for agg in &g.aggregates {
                let (data_type, nullable) = aggregate_output_type(agg, input, pt)?;
                columns.push(ColumnHeader::new(None, agg.to_string(), data_type, nullable));
            }
            Ok(PlanSchema::new(columns))
        }
        PlanProperties::Order(o) => {
            let input = &children[0];
            for key in &o.keys {
                input.resolve(&key.column, pt)?;
            }
            Ok(input.clone())
        }
        PlanProperties::Limit(_) => Ok(children[0].clone()),
        PlanProperties::Select(s) => {
            let input = &children[0];
            let mut columns = Vec::with_capacity(s.items.len());
            for item in &s.items {
                match item {
                    SelectItem::Wildcard => columns.extend(input.columns.iter().cloned()),
                    SelectItem::Expr { expr, .. } => {
                        let header = item.header().unwrap_or_else(|| expr.display_name());
                        columns.push(projected_column(expr, header, input, pt)?);
                    }
                }
            }
            Ok(PlanSchema::new(columns))
        }
        PlanProperties::Insert(i) => {
            let database = session.resolve_database(i.database.as_deref())?;
            data.catalog().get_table(database, &i.table)?;
            let constants = PlanSchema::empty();
            for row in &i.values {
                for value in row {
                    compile_expr(value, &constants, pt)?;
                }
            }
            Ok(PlanSchema::rows_affected())
        }
        PlanProperties::Update(u) => {
            let database = session.resolve_database(u.database.as_deref())?;
            let meta = data.catalog().get_table(database, &u.table)?;
            let input = PlanSchema::for_table(&meta, u.relation());
            if let Some(cond) = &u.condition {
                expect_predicate(&compile_expr(cond, &input, pt)?, cond)?;
            }
            for a in &u.assignments {
                input.resolve(&a.column, pt)?;
                compile_expr(&a.value, &input, pt)?;
            }
            Ok(PlanSchema::rows_affected())
        }
        PlanProperties::Delete(d) => {
            let database = session.resolve_database(d.database.as_deref())?;
            let meta = data.catalog().get_table(database, &d.table)?;
            if let Some(cond) = &d.condition {
                let input = PlanSchema::for_table(&meta, d.relation());
                expect_predicate(&compile_expr(cond, &input, pt)?, cond)?;
            }
            Ok(PlanSchema::rows_affected())
        }
    }
}

fn projected_column(
    expr: &Expr,
    header: String,
    input: &PlanSchema,
    plan: PlanType,
) -> Result<ColumnHeader> {
    let compiled = compile_expr(expr, input, plan)?;
    if let Expr::Column(c) = expr {
        let source = input.column(input.resolve(c, plan)?);
        return Ok(ColumnHeader::new(
            source.relation.clone(),
            header,
            source.data_type.clone(),
            source.nullable,
        ));
    }
    Ok(ColumnHeader::new(None, header, compiled.data_type(), true))
}

/// Result type and nullability of one aggregate over `input`.
pub(crate) fn aggregate_output_type(
    agg: &Expr,
    input: &PlanSchema,
    plan: PlanType,
) -> Result<(DataType, bool)> {
    let Expr::Aggregate { func, arg } = agg else {
        return Err(TesseraError::Planning(format!(
            "group aggregate list holds a non-aggregate expression: {agg}"
        )));
    };
    let arg_type = match arg {
        Some(a) => Some(compile_expr(a, input, plan)?.data_type()),
        None => None,
    };
    let numeric = |dt: &DataType| -> Result<()> {
        match dt {
            DataType::Int32 | DataType::Int64 | DataType::Float64 | DataType::Null => Ok(()),
            other => Err(TesseraError::TypeMismatch {
                column: agg.to_string(),
                expected: "numeric".to_string(),
                actual: format!("{other:?}"),
            }),
        }
    };
    match (func, arg_type) {
        (AggregateFunction::Count, _) => Ok((DataType::Int64, false)),
        (_, None) => Err(TesseraError::Planning(format!("{func}(*) is not supported"))),
        (AggregateFunction::Sum, Some(dt)) => {
            numeric(&dt)?;
            let out = if dt == DataType::Float64 {
                DataType::Float64
            } else {
                DataType::Int64
            };
            Ok((out, true))
        }
        (AggregateFunction::Avg, Some(dt)) => {
            numeric(&dt)?;
            Ok((DataType::Float64, true))
        }
        (AggregateFunction::Min | AggregateFunction::Max, Some(dt)) => Ok((dt, true)),
    }
}

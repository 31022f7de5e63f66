use sqlparser::ast::{
    AssignmentTarget, BinaryOperator as SqlBinaryOp, Delete, Expr as SqlExpr, FromTable,
    FunctionArg, FunctionArgExpr, FunctionArguments, GroupByExpr, Ident, Insert, JoinConstraint,
    JoinOperator, ObjectName, Query, SelectItem as SqlSelectItem, SetExpr, Statement,
    TableFactor, TableWithJoins, UnaryOperator, Value,
};
use tessera_common::{Result, TesseraError};

use crate::logical_plan::{
    AggregateFunction, Assignment, BinaryOp, DeleteProperties, Expr, FilterProperties,
    GroupProperties, GroupStrategy, InsertProperties, JoinProperties, JoinStrategy, JoinType,
    LimitProperties, LiteralValue, LogicalPlan, OrderKey, OrderProperties, PlanProperties,
    SelectItem, SelectProperties, SortDirection, TableScanProperties, UpdateProperties,
};

/// Translate one parsed statement into an unhinted logical plan.
///
/// Strategy fields are left at their defaults; the optimizer's hint passes
/// fill them in afterwards.
pub fn statement_to_logical(stmt: &Statement) -> Result<LogicalPlan> {
    match stmt {
        Statement::Query(q) => query_to_logical(q),
        Statement::Insert(ins) => insert_to_logical(ins),
        Statement::Update {
            table,
            assignments,
            from,
            selection,
            ..
        } => {
            if from.is_some() {
                return Err(TesseraError::UnsupportedStatement(
                    "UPDATE ... FROM is not supported".to_string(),
                ));
            }
            let scan = single_table(table)?;
            let assignments = assignments
                .iter()
                .map(|a| {
                    let column = match &a.target {
                        AssignmentTarget::ColumnName(name) => last_ident(name),
                        AssignmentTarget::Tuple(_) => {
                            return Err(TesseraError::UnsupportedStatement(
                                "tuple assignments are not supported".to_string(),
                            ))
                        }
                    };
                    Ok(Assignment {
                        column,
                        value: sql_expr_to_expr(&a.value)?,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(LogicalPlan::leaf(PlanProperties::Update(UpdateProperties {
                table: scan.table,
                database: scan.database,
                alias: scan.alias,
                assignments,
                condition: selection.as_ref().map(sql_expr_to_expr).transpose()?,
            })))
        }
        Statement::Delete(del) => delete_to_logical(del),
        other => Err(TesseraError::UnsupportedStatement(statement_kind(other))),
    }
}

/// Leading keywords of a statement, used in error messages.
pub fn statement_kind(stmt: &Statement) -> String {
    stmt.to_string()
        .split_whitespace()
        .take(2)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Low-cardinality statement label used for metrics.
pub fn statement_label(stmt: &Statement) -> &'static str {
    match stmt {
        Statement::Query(_) => "select",
        Statement::Insert(_) => "insert",
        Statement::Update { .. } => "update",
        Statement::Delete(_) => "delete",
        Statement::CreateTable(_) => "create_table",
        Statement::CreateDatabase { .. } => "create_database",
        Statement::Drop { .. } => "drop",
        Statement::Explain { .. } => "explain",
        Statement::Use(_) => "use",
        _ => "other",
    }
}

fn query_to_logical(q: &Query) -> Result<LogicalPlan> {
    let select = match &*q.body {
        SetExpr::Select(s) => s.as_ref(),
        _ => {
            return Err(TesseraError::UnsupportedStatement(
                "only simple SELECT is supported (no UNION/EXCEPT/INTERSECT/VALUES)".to_string(),
            ))
        }
    };

    // FROM + JOIN
    let mut plan = from_to_plan(&select.from)?;

    // WHERE
    if let Some(selection) = &select.selection {
        plan = plan.wrap(PlanProperties::Filter(FilterProperties {
            condition: sql_expr_to_expr(selection)?,
        }));
    }

    let keys = group_by_keys(&select.group_by)?;
    let items = select
        .projection
        .iter()
        .map(select_item)
        .collect::<Result<Vec<_>>>()?;
    let having = select.having.as_ref().map(sql_expr_to_expr).transpose()?;
    let order_keys = match &q.order_by {
        Some(ob) => ob
            .exprs
            .iter()
            .map(|o| {
                let (column, agg) = order_key_column(&o.expr, &items)?;
                let direction = if o.asc == Some(false) {
                    SortDirection::Desc
                } else {
                    SortDirection::Asc
                };
                Ok((OrderKey { column, direction }, agg))
            })
            .collect::<Result<Vec<_>>>()?,
        None => Vec::new(),
    };

    // GROUP BY (also for aggregate-only select lists)
    let mut aggregates = Vec::new();
    for item in &items {
        if let SelectItem::Expr { expr, .. } = item {
            expr.collect_aggregates(&mut aggregates);
        }
    }
    if let Some(h) = &having {
        h.collect_aggregates(&mut aggregates);
    }
    for (_, agg) in &order_keys {
        if let Some(agg) = agg {
            agg.collect_aggregates(&mut aggregates);
        }
    }
    if !keys.is_empty() || !aggregates.is_empty() {
        plan = plan.wrap(PlanProperties::Group(GroupProperties {
            keys,
            aggregates,
            strategy: GroupStrategy::Hash,
        }));
    } else if having.is_some() {
        return Err(TesseraError::UnsupportedStatement(
            "HAVING requires GROUP BY or an aggregate".to_string(),
        ));
    }

    // HAVING
    if let Some(condition) = having {
        plan = plan.wrap(PlanProperties::Filter(FilterProperties { condition }));
    }

    // ORDER BY
    if !order_keys.is_empty() {
        plan = plan.wrap(PlanProperties::Order(OrderProperties {
            keys: order_keys.into_iter().map(|(k, _)| k).collect(),
        }));
    }

    // LIMIT / OFFSET
    let limit = q.limit.as_ref().map(sql_limit_to_u64).transpose()?;
    let offset = q
        .offset
        .as_ref()
        .map(|o| sql_limit_to_u64(&o.value))
        .transpose()?
        .unwrap_or(0);
    if limit.is_some() || offset > 0 {
        plan = plan.wrap(PlanProperties::Limit(LimitProperties { limit, offset }));
    }

    Ok(plan.wrap(PlanProperties::Select(SelectProperties { items })))
}

fn select_item(item: &SqlSelectItem) -> Result<SelectItem> {
    match item {
        SqlSelectItem::UnnamedExpr(e) => Ok(SelectItem::Expr {
            expr: sql_expr_to_expr(e)?,
            alias: None,
        }),
        SqlSelectItem::ExprWithAlias { expr, alias } => Ok(SelectItem::Expr {
            expr: sql_expr_to_expr(expr)?,
            alias: Some(alias.value.clone()),
        }),
        SqlSelectItem::Wildcard(_) => Ok(SelectItem::Wildcard),
        SqlSelectItem::QualifiedWildcard(_, _) => Err(TesseraError::UnsupportedStatement(
            "qualified wildcard (t.*) is not supported".to_string(),
        )),
    }
}

/// ORDER BY target as a column name of the node below the projection.
///
/// Select-list aliases of plain columns and aggregates are substituted, so
/// `ORDER BY n` works for `COUNT(*) AS n`.
fn order_key_column(e: &SqlExpr, items: &[SelectItem]) -> Result<(String, Option<Expr>)> {
    let expr = sql_expr_to_expr(e)?;
    match expr {
        Expr::Column(name) => {
            let aliased = items.iter().find_map(|item| match item {
                SelectItem::Expr {
                    expr,
                    alias: Some(a),
                } if *a == name => Some(expr),
                _ => None,
            });
            match aliased {
                Some(Expr::Column(c)) => Ok((c.clone(), None)),
                Some(agg @ Expr::Aggregate { .. }) => Ok((agg.to_string(), Some(agg.clone()))),
                _ => Ok((name, None)),
            }
        }
        agg @ Expr::Aggregate { .. } => Ok((agg.to_string(), Some(agg))),
        other => Err(TesseraError::UnsupportedStatement(format!(
            "ORDER BY supports columns and aggregates, got {other}"
        ))),
    }
}

fn from_to_plan(from: &[TableWithJoins]) -> Result<LogicalPlan> {
    if from.len() != 1 {
        return Err(TesseraError::UnsupportedStatement(
            "exactly one FROM source is required".to_string(),
        ));
    }
    let twj = &from[0];
    let first = table_factor_to_scan(&twj.relation)?;
    match twj.joins.as_slice() {
        [] => Ok(LogicalPlan::leaf(PlanProperties::TableScan(first))),
        [j] => {
            let second = table_factor_to_scan(&j.relation)?;
            match &j.join_operator {
                JoinOperator::Inner(JoinConstraint::On(on)) => join_to_plan(first, second, on),
                JoinOperator::Inner(_) => Err(TesseraError::UnsupportedStatement(
                    "JOIN requires an ON condition".to_string(),
                )),
                other => Err(TesseraError::UnsupportedStatement(format!(
                    "only INNER JOIN is supported, got {other:?}"
                ))),
            }
        }
        _ => Err(TesseraError::UnsupportedStatement(
            "only one JOIN per query is supported".to_string(),
        )),
    }
}

/// Builds a JoinPlan whose children follow the operand order of the ON key
/// equality: the left operand's table is read by the first child.
fn join_to_plan(
    first: TableScanProperties,
    second: TableScanProperties,
    on: &SqlExpr,
) -> Result<LogicalPlan> {
    let condition = sql_expr_to_expr(on)?;
    let (left_key, right_key) = first_equi_pair(&condition).ok_or_else(|| {
        TesseraError::UnsupportedStatement(format!(
            "JOIN ... ON must contain a column equality, got {condition}"
        ))
    })?;

    let side = |key: &Expr| -> Option<usize> {
        let Expr::Column(name) = key else {
            return None;
        };
        let (qualifier, _) = name.rsplit_once('.')?;
        [&first, &second]
            .iter()
            .position(|s| s.relation() == qualifier || s.table == qualifier)
    };
    let (l_side, r_side) = (side(&left_key), side(&right_key));
    if l_side.is_some() && l_side == r_side {
        return Err(TesseraError::UnsupportedStatement(format!(
            "join condition must compare columns of both tables: {condition}"
        )));
    }
    let swapped = l_side == Some(1) || r_side == Some(0);
    let (left, right) = if swapped {
        (second, first)
    } else {
        (first, second)
    };

    let props = JoinProperties {
        join_type: JoinType::Inner,
        left: left.table.clone(),
        right: right.table.clone(),
        left_key,
        right_key,
        condition,
        strategy: JoinStrategy::Hash,
    };
    Ok(LogicalPlan::new(
        PlanProperties::Join(props),
        vec![
            LogicalPlan::leaf(PlanProperties::TableScan(left)),
            LogicalPlan::leaf(PlanProperties::TableScan(right)),
        ],
    ))
}

fn first_equi_pair(e: &Expr) -> Option<(Expr, Expr)> {
    match e {
        Expr::BinaryOp {
            left,
            op: BinaryOp::Eq,
            right,
        } if matches!(**left, Expr::Column(_)) && matches!(**right, Expr::Column(_)) => {
            Some(((**left).clone(), (**right).clone()))
        }
        Expr::And(a, b) => first_equi_pair(a).or_else(|| first_equi_pair(b)),
        _ => None,
    }
}

fn table_factor_to_scan(tf: &TableFactor) -> Result<TableScanProperties> {
    match tf {
        TableFactor::Table { name, alias, .. } => {
            let (database, table) = split_object_name(name)?;
            Ok(TableScanProperties {
                table,
                database,
                alias: alias.as_ref().map(|a| a.name.value.clone()),
            })
        }
        _ => Err(TesseraError::UnsupportedStatement(
            "only simple table names in FROM are supported".to_string(),
        )),
    }
}

fn single_table(twj: &TableWithJoins) -> Result<TableScanProperties> {
    if !twj.joins.is_empty() {
        return Err(TesseraError::UnsupportedStatement(
            "joins are not supported in UPDATE/DELETE".to_string(),
        ));
    }
    table_factor_to_scan(&twj.relation)
}

fn insert_to_logical(ins: &Insert) -> Result<LogicalPlan> {
    let (database, table) = split_object_name(&ins.table_name)?;
    let Some(source) = &ins.source else {
        return Err(TesseraError::UnsupportedStatement(
            "INSERT requires a VALUES list".to_string(),
        ));
    };
    let values = match &*source.body {
        SetExpr::Values(v) => v
            .rows
            .iter()
            .map(|row| row.iter().map(sql_expr_to_expr).collect::<Result<Vec<_>>>())
            .collect::<Result<Vec<_>>>()?,
        _ => {
            return Err(TesseraError::UnsupportedStatement(
                "INSERT ... SELECT is not supported".to_string(),
            ))
        }
    };
    Ok(LogicalPlan::leaf(PlanProperties::Insert(InsertProperties {
        table,
        database,
        columns: ins.columns.iter().map(|c| c.value.clone()).collect(),
        values,
    })))
}

fn delete_to_logical(del: &Delete) -> Result<LogicalPlan> {
    let from = match &del.from {
        FromTable::WithFromKeyword(v) | FromTable::WithoutKeyword(v) => v,
    };
    let [twj] = from.as_slice() else {
        return Err(TesseraError::UnsupportedStatement(
            "DELETE requires exactly one table".to_string(),
        ));
    };
    let scan = single_table(twj)?;
    Ok(LogicalPlan::leaf(PlanProperties::Delete(DeleteProperties {
        table: scan.table,
        database: scan.database,
        alias: scan.alias,
        condition: del.selection.as_ref().map(sql_expr_to_expr).transpose()?,
    })))
}

fn group_by_keys(g: &GroupByExpr) -> Result<Vec<String>> {
    match g {
        GroupByExpr::Expressions(es, _mods) => es
            .iter()
            .map(|e| match sql_expr_to_expr(e)? {
                Expr::Column(c) => Ok(c),
                other => Err(TesseraError::UnsupportedStatement(format!(
                    "GROUP BY supports column references only, got {other}"
                ))),
            })
            .collect(),
        GroupByExpr::All(_mods) => Err(TesseraError::UnsupportedStatement(
            "GROUP BY ALL is not supported".to_string(),
        )),
    }
}

fn try_parse_agg(func: &sqlparser::ast::Function) -> Result<Option<Expr>> {
    let fname = object_name_to_string(&func.name).to_uppercase();
    let agg = match fname.as_str() {
        "COUNT" => AggregateFunction::Count,
        "SUM" => AggregateFunction::Sum,
        "MIN" => AggregateFunction::Min,
        "MAX" => AggregateFunction::Max,
        "AVG" => AggregateFunction::Avg,
        _ => return Ok(None),
    };
    let args: &[FunctionArg] = match &func.args {
        FunctionArguments::List(list) => &list.args,
        _ => &[],
    };
    let [arg] = args else {
        return Err(TesseraError::Unsupported(format!(
            "{fname}() requires exactly one argument"
        )));
    };
    let arg = match arg {
        FunctionArg::Unnamed(FunctionArgExpr::Wildcard) if agg == AggregateFunction::Count => None,
        FunctionArg::Unnamed(FunctionArgExpr::Expr(e)) => {
            let inner = sql_expr_to_expr(e)?;
            if inner.contains_aggregate() {
                return Err(TesseraError::Unsupported(format!(
                    "nested aggregate in {fname}()"
                )));
            }
            Some(Box::new(inner))
        }
        _ => {
            return Err(TesseraError::Unsupported(format!(
                "unsupported argument form in {fname}()"
            )))
        }
    };
    Ok(Some(Expr::Aggregate { func: agg, arg }))
}

pub(crate) fn sql_expr_to_expr(e: &SqlExpr) -> Result<Expr> {
    match e {
        SqlExpr::Identifier(id) => Ok(Expr::Column(id.value.clone())),
        SqlExpr::CompoundIdentifier(parts) => Ok(Expr::Column(compound_ident_to_string(parts))),
        SqlExpr::Value(v) => sql_value_to_literal(v).map(Expr::Literal),
        SqlExpr::Nested(inner) => sql_expr_to_expr(inner),
        SqlExpr::IsNull(inner) => Ok(Expr::IsNull {
            expr: Box::new(sql_expr_to_expr(inner)?),
            negated: false,
        }),
        SqlExpr::IsNotNull(inner) => Ok(Expr::IsNull {
            expr: Box::new(sql_expr_to_expr(inner)?),
            negated: true,
        }),
        SqlExpr::BinaryOp { left, op, right } => {
            // AND/OR are represented as BinaryOp too
            let l = Box::new(sql_expr_to_expr(left)?);
            let r = Box::new(sql_expr_to_expr(right)?);
            match op {
                SqlBinaryOp::And => Ok(Expr::And(l, r)),
                SqlBinaryOp::Or => Ok(Expr::Or(l, r)),
                _ => Ok(Expr::BinaryOp {
                    left: l,
                    op: sql_binop_to_binop(op)?,
                    right: r,
                }),
            }
        }
        SqlExpr::UnaryOp { op, expr } => {
            let inner = sql_expr_to_expr(expr)?;
            match op {
                UnaryOperator::Not => Ok(Expr::Not(Box::new(inner))),
                UnaryOperator::Plus => Ok(inner),
                UnaryOperator::Minus => Ok(match inner {
                    Expr::Literal(LiteralValue::Int64(v)) => {
                        Expr::Literal(LiteralValue::Int64(-v))
                    }
                    Expr::Literal(LiteralValue::Float64(v)) => {
                        Expr::Literal(LiteralValue::Float64(-v))
                    }
                    other => Expr::BinaryOp {
                        left: Box::new(Expr::Literal(LiteralValue::Int64(0))),
                        op: BinaryOp::Minus,
                        right: Box::new(other),
                    },
                }),
                other => Err(TesseraError::Unsupported(format!(
                    "unsupported unary operator: {other}"
                ))),
            }
        }
        SqlExpr::Function(f) => match try_parse_agg(f)? {
            Some(agg) => Ok(agg),
            None => Err(TesseraError::Unsupported(format!(
                "unsupported function: {}",
                object_name_to_string(&f.name)
            ))),
        },
        _ => Err(TesseraError::Unsupported(format!(
            "unsupported SQL expression: {e}"
        ))),
    }
}

fn sql_value_to_literal(v: &Value) -> Result<LiteralValue> {
    match v {
        Value::Number(s, _) => {
            if s.contains(['.', 'e', 'E']) {
                let f: f64 = s
                    .parse()
                    .map_err(|_| TesseraError::Planning(format!("bad number: {s}")))?;
                Ok(LiteralValue::Float64(f))
            } else {
                let i: i64 = s
                    .parse()
                    .map_err(|_| TesseraError::Planning(format!("bad number: {s}")))?;
                Ok(LiteralValue::Int64(i))
            }
        }
        Value::SingleQuotedString(s) => Ok(LiteralValue::Utf8(s.clone())),
        Value::Boolean(b) => Ok(LiteralValue::Boolean(*b)),
        Value::Null => Ok(LiteralValue::Null),
        _ => Err(TesseraError::Unsupported(format!(
            "unsupported SQL literal: {v}"
        ))),
    }
}

fn sql_limit_to_u64(e: &SqlExpr) -> Result<u64> {
    match sql_expr_to_expr(e)? {
        Expr::Literal(LiteralValue::Int64(i)) if i >= 0 => Ok(i as u64),
        Expr::Literal(LiteralValue::Int64(_)) => Err(TesseraError::Planning(
            "LIMIT/OFFSET must be non-negative".to_string(),
        )),
        _ => Err(TesseraError::Planning(
            "LIMIT/OFFSET must be a literal integer".to_string(),
        )),
    }
}

fn sql_binop_to_binop(op: &SqlBinaryOp) -> Result<BinaryOp> {
    Ok(match op {
        SqlBinaryOp::Eq => BinaryOp::Eq,
        SqlBinaryOp::NotEq => BinaryOp::NotEq,
        SqlBinaryOp::Lt => BinaryOp::Lt,
        SqlBinaryOp::LtEq => BinaryOp::LtEq,
        SqlBinaryOp::Gt => BinaryOp::Gt,
        SqlBinaryOp::GtEq => BinaryOp::GtEq,
        SqlBinaryOp::Plus => BinaryOp::Plus,
        SqlBinaryOp::Minus => BinaryOp::Minus,
        SqlBinaryOp::Multiply => BinaryOp::Multiply,
        SqlBinaryOp::Divide => BinaryOp::Divide,
        _ => {
            return Err(TesseraError::Unsupported(format!(
                "unsupported binary operator: {op}"
            )))
        }
    })
}

/// `[db.]table` into its parts.
pub(crate) fn split_object_name(n: &ObjectName) -> Result<(Option<String>, String)> {
    match n.0.as_slice() {
        [t] => Ok((None, t.value.clone())),
        [d, t] => Ok((Some(d.value.clone()), t.value.clone())),
        _ => Err(TesseraError::UnsupportedStatement(format!(
            "unsupported object name: {n}"
        ))),
    }
}

pub(crate) fn object_name_to_string(n: &ObjectName) -> String {
    n.0.iter()
        .map(|i| i.value.clone())
        .collect::<Vec<_>>()
        .join(".")
}

fn last_ident(n: &ObjectName) -> String {
    n.0.last().map(|i| i.value.clone()).unwrap_or_default()
}

fn compound_ident_to_string(parts: &[Ident]) -> String {
    parts
        .iter()
        .map(|i| i.value.clone())
        .collect::<Vec<_>>()
        .join(".")
}

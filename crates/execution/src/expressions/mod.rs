//! Expression compilation and evaluation for execution operators.
//!
//! Input contract:
//! - column references are resolved against the [`PlanSchema`] of the
//!   operator's input, using the same rules schema inference uses;
//! - aggregate calls are only valid above a group node, where they resolve to
//!   the group output column carrying their display text.
//!
//! Output contract:
//! - each evaluation returns an `ArrayRef` aligned to input batch row count.

use std::sync::Arc;

use arrow::array::{
    new_null_array, Array, ArrayRef, BooleanArray, BooleanBuilder, Float64Builder, Int64Builder,
    StringBuilder,
};
use arrow::compute::kernels::{
    boolean::{and_kleene, is_not_null, is_null, not, or_kleene},
    cast::{cast_with_options, CastOptions},
    cmp::{eq, gt, gt_eq, lt, lt_eq, neq},
    numeric::{add, div, mul, sub},
};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use arrow_schema::{DataType, Schema};
use tessera_common::{Result, TesseraError};
use tessera_planner::{BinaryOp, Expr, LiteralValue, PlanType};
use tessera_storage::value::scalar_from_array;
use tessera_storage::ScalarValue;

use crate::schema::PlanSchema;

/// Executable expression for the execution engine.
///
/// The executor compiles planner `Expr` trees into `PhysicalExpr` once per
/// operator and evaluates them batch by batch.
pub trait PhysicalExpr: Send + Sync {
    /// Static output data type of this expression.
    fn data_type(&self) -> DataType;
    /// Evaluate the expression for every row in `batch`.
    fn evaluate(&self, batch: &RecordBatch) -> Result<ArrayRef>;
}

/// Compiles `expr` against `input`. `plan` names the node in resolution
/// errors.
pub fn compile_expr(
    expr: &Expr,
    input: &PlanSchema,
    plan: PlanType,
) -> Result<Arc<dyn PhysicalExpr>> {
    match expr {
        Expr::Column(name) => {
            let index = input.resolve(name, plan)?;
            Ok(Arc::new(ColumnExpr {
                index,
                dt: input.column(index).data_type.clone(),
            }))
        }

        Expr::Aggregate { .. } => {
            let name = expr.to_string();
            let index = input
                .resolve(&name, plan)
                .map_err(|_| TesseraError::ColumnNotFound {
                    column: name,
                    plan: plan.to_string(),
                })?;
            Ok(Arc::new(ColumnExpr {
                index,
                dt: input.column(index).data_type.clone(),
            }))
        }

        Expr::Literal(v) => Ok(Arc::new(LiteralExpr {
            v: v.clone(),
            dt: literal_type(v),
        })),

        Expr::Not(e) => {
            let inner = boolean_operand(compile_expr(e, input, plan)?, expr)?;
            Ok(Arc::new(NotExpr { inner }))
        }

        Expr::And(a, b) | Expr::Or(a, b) => {
            let left = boolean_operand(compile_expr(a, input, plan)?, expr)?;
            let right = boolean_operand(compile_expr(b, input, plan)?, expr)?;
            let op = if matches!(expr, Expr::And(..)) {
                BoolOp::And
            } else {
                BoolOp::Or
            };
            Ok(Arc::new(BoolBinaryExpr { left, right, op }))
        }

        Expr::IsNull { expr: e, negated } => Ok(Arc::new(IsNullExpr {
            inner: compile_expr(e, input, plan)?,
            negated: *negated,
        })),

        Expr::BinaryOp { left, op, right } => {
            let l = compile_expr(left, input, plan)?;
            let r = compile_expr(right, input, plan)?;
            let mismatch = || TesseraError::TypeMismatch {
                column: expr.to_string(),
                expected: format!("{:?}", l.data_type()),
                actual: format!("{:?}", r.data_type()),
            };
            let operand = if op.is_comparison() {
                common_type(&l.data_type(), &r.data_type()).ok_or_else(mismatch)?
            } else {
                arithmetic_type(&l.data_type(), &r.data_type()).ok_or_else(mismatch)?
            };
            let out = if op.is_comparison() {
                DataType::Boolean
            } else {
                operand.clone()
            };
            Ok(Arc::new(BinaryExpr {
                left: cast_to(l, &operand),
                right: cast_to(r, &operand),
                op: *op,
                out,
            }))
        }
    }
}

/// Fails with `TypeMismatch` unless `compiled` yields booleans (or NULL).
pub fn expect_predicate(compiled: &Arc<dyn PhysicalExpr>, expr: &Expr) -> Result<()> {
    match compiled.data_type() {
        DataType::Boolean | DataType::Null => Ok(()),
        other => Err(TesseraError::TypeMismatch {
            column: expr.to_string(),
            expected: "Boolean".to_string(),
            actual: format!("{other:?}"),
        }),
    }
}

/// Evaluates a predicate into a selection vector where NULL counts as false.
pub fn predicate_mask(predicate: &dyn PhysicalExpr, batch: &RecordBatch) -> Result<BooleanArray> {
    let arr = predicate.evaluate(batch)?;
    if arr.data_type() == &DataType::Null {
        return Ok(BooleanArray::from(vec![false; batch.num_rows()]));
    }
    let mask = as_boolean(&arr, "predicate")?;
    if mask.null_count() == 0 {
        return Ok(mask.clone());
    }
    Ok(mask.iter().map(|v| Some(v.unwrap_or(false))).collect())
}

/// Evaluates an expression that must not reference columns, such as an
/// `INSERT ... VALUES` item.
pub fn evaluate_constant(expr: &Expr, plan: PlanType) -> Result<ScalarValue> {
    let compiled = compile_expr(expr, &PlanSchema::empty(), plan)?;
    let one_row = RecordBatch::try_new_with_options(
        Arc::new(Schema::empty()),
        vec![],
        &RecordBatchOptions::new().with_row_count(Some(1)),
    )
    .map_err(|e| TesseraError::Execution(format!("constant batch failed: {e}")))?;
    scalar_from_array(&compiled.evaluate(&one_row)?, 0)
}

/// Shared operand type for a comparison or join key pair.
pub fn common_type(l: &DataType, r: &DataType) -> Option<DataType> {
    use DataType::*;
    match (l, r) {
        _ if l == r => Some(l.clone()),
        (Null, other) | (other, Null) => Some(other.clone()),
        (Float64, Int32 | Int64) | (Int32 | Int64, Float64) => Some(Float64),
        (Int32, Int64) | (Int64, Int32) => Some(Int64),
        (Timestamp(..), Utf8) | (Utf8, Timestamp(..)) => {
            Some(Timestamp(arrow_schema::TimeUnit::Microsecond, None))
        }
        (Timestamp(..), Int32 | Int64) | (Int32 | Int64, Timestamp(..)) => Some(Int64),
        _ => None,
    }
}

fn arithmetic_type(l: &DataType, r: &DataType) -> Option<DataType> {
    use DataType::*;
    match (l, r) {
        (Float64, Int32 | Int64 | Float64 | Null) | (Int32 | Int64 | Null, Float64) => {
            Some(Float64)
        }
        (Int32 | Int64 | Null, Int32 | Int64 | Null) => Some(Int64),
        _ => None,
    }
}

// =====================
// Standard expressions
// =====================

struct ColumnExpr {
    index: usize,
    dt: DataType,
}

impl PhysicalExpr for ColumnExpr {
    fn data_type(&self) -> DataType {
        self.dt.clone()
    }

    fn evaluate(&self, batch: &RecordBatch) -> Result<ArrayRef> {
        Ok(batch.column(self.index).clone())
    }
}

struct LiteralExpr {
    v: LiteralValue,
    dt: DataType,
}

impl PhysicalExpr for LiteralExpr {
    fn data_type(&self) -> DataType {
        self.dt.clone()
    }

    fn evaluate(&self, batch: &RecordBatch) -> Result<ArrayRef> {
        literal_to_array(&self.v, batch.num_rows())
    }
}

struct CastExpr {
    inner: Arc<dyn PhysicalExpr>,
    to_type: DataType,
}

impl PhysicalExpr for CastExpr {
    fn data_type(&self) -> DataType {
        self.to_type.clone()
    }

    fn evaluate(&self, batch: &RecordBatch) -> Result<ArrayRef> {
        let arr = self.inner.evaluate(batch)?;
        cast_array(&arr, &self.to_type)
    }
}

struct NotExpr {
    inner: Arc<dyn PhysicalExpr>,
}

impl PhysicalExpr for NotExpr {
    fn data_type(&self) -> DataType {
        DataType::Boolean
    }

    fn evaluate(&self, batch: &RecordBatch) -> Result<ArrayRef> {
        let arr = self.inner.evaluate(batch)?;
        let b = as_boolean(&arr, "NOT")?;
        let out = not(b).map_err(|e| TesseraError::Execution(format!("not failed: {e}")))?;
        Ok(Arc::new(out))
    }
}

#[derive(Clone, Copy)]
enum BoolOp {
    And,
    Or,
}

struct BoolBinaryExpr {
    left: Arc<dyn PhysicalExpr>,
    right: Arc<dyn PhysicalExpr>,
    op: BoolOp,
}

impl PhysicalExpr for BoolBinaryExpr {
    fn data_type(&self) -> DataType {
        DataType::Boolean
    }

    fn evaluate(&self, batch: &RecordBatch) -> Result<ArrayRef> {
        let l = self.left.evaluate(batch)?;
        let r = self.right.evaluate(batch)?;
        let lb = as_boolean(&l, "AND/OR")?;
        let rb = as_boolean(&r, "AND/OR")?;

        let out = match self.op {
            BoolOp::And => and_kleene(lb, rb),
            BoolOp::Or => or_kleene(lb, rb),
        }
        .map_err(|e| TesseraError::Execution(format!("boolean kernel failed: {e}")))?;

        Ok(Arc::new(out))
    }
}

struct IsNullExpr {
    inner: Arc<dyn PhysicalExpr>,
    negated: bool,
}

impl PhysicalExpr for IsNullExpr {
    fn data_type(&self) -> DataType {
        DataType::Boolean
    }

    fn evaluate(&self, batch: &RecordBatch) -> Result<ArrayRef> {
        let arr = self.inner.evaluate(batch)?;
        let out = if self.negated {
            is_not_null(arr.as_ref())
        } else {
            is_null(arr.as_ref())
        }
        .map_err(|e| TesseraError::Execution(format!("null check failed: {e}")))?;
        Ok(Arc::new(out))
    }
}

struct BinaryExpr {
    left: Arc<dyn PhysicalExpr>,
    right: Arc<dyn PhysicalExpr>,
    op: BinaryOp,
    out: DataType,
}

impl PhysicalExpr for BinaryExpr {
    fn data_type(&self) -> DataType {
        self.out.clone()
    }

    fn evaluate(&self, batch: &RecordBatch) -> Result<ArrayRef> {
        let l = self.left.evaluate(batch)?;
        let r = self.right.evaluate(batch)?;
        if l.data_type() == &DataType::Null {
            return Ok(new_null_array(&self.out, batch.num_rows()));
        }

        match self.op {
            // arithmetic
            BinaryOp::Plus | BinaryOp::Minus | BinaryOp::Multiply | BinaryOp::Divide => {
                let res = match self.op {
                    BinaryOp::Plus => add(&l, &r),
                    BinaryOp::Minus => sub(&l, &r),
                    BinaryOp::Multiply => mul(&l, &r),
                    _ => div(&l, &r),
                };
                res.map_err(|e| TesseraError::Execution(format!("arith kernel failed: {e}")))
            }
            // comparisons
            BinaryOp::Eq
            | BinaryOp::NotEq
            | BinaryOp::Lt
            | BinaryOp::LtEq
            | BinaryOp::Gt
            | BinaryOp::GtEq => {
                let res = match self.op {
                    BinaryOp::Eq => eq(&l, &r),
                    BinaryOp::NotEq => neq(&l, &r),
                    BinaryOp::Lt => lt(&l, &r),
                    BinaryOp::LtEq => lt_eq(&l, &r),
                    BinaryOp::Gt => gt(&l, &r),
                    _ => gt_eq(&l, &r),
                }
                .map_err(|e| TesseraError::Execution(format!("cmp kernel failed: {e}")))?;
                Ok(Arc::new(res))
            }
        }
    }
}

// ------------------ helpers ------------------

fn cast_to(expr: Arc<dyn PhysicalExpr>, to_type: &DataType) -> Arc<dyn PhysicalExpr> {
    if &expr.data_type() == to_type || to_type == &DataType::Null {
        expr
    } else {
        Arc::new(CastExpr {
            inner: expr,
            to_type: to_type.clone(),
        })
    }
}

fn boolean_operand(expr: Arc<dyn PhysicalExpr>, parent: &Expr) -> Result<Arc<dyn PhysicalExpr>> {
    match expr.data_type() {
        DataType::Boolean => Ok(expr),
        DataType::Null => Ok(cast_to(expr, &DataType::Boolean)),
        other => Err(TesseraError::TypeMismatch {
            column: parent.to_string(),
            expected: "Boolean".to_string(),
            actual: format!("{other:?}"),
        }),
    }
}

/// Strict cast: values that do not convert are errors, not NULLs.
pub fn cast_array(arr: &ArrayRef, to_type: &DataType) -> Result<ArrayRef> {
    if arr.data_type() == to_type {
        return Ok(arr.clone());
    }
    let options = CastOptions {
        safe: false,
        ..Default::default()
    };
    cast_with_options(arr, to_type, &options)
        .map_err(|e| TesseraError::Execution(format!("cast failed: {e}")))
}

fn as_boolean<'a>(arr: &'a ArrayRef, what: &str) -> Result<&'a BooleanArray> {
    arr.as_any()
        .downcast_ref::<BooleanArray>()
        .ok_or_else(|| TesseraError::Execution(format!("{what} expects boolean")))
}

fn literal_type(v: &LiteralValue) -> DataType {
    match v {
        LiteralValue::Int64(_) => DataType::Int64,
        LiteralValue::Float64(_) => DataType::Float64,
        LiteralValue::Utf8(_) => DataType::Utf8,
        LiteralValue::Boolean(_) => DataType::Boolean,
        LiteralValue::Null => DataType::Null,
    }
}

fn literal_to_array(v: &LiteralValue, len: usize) -> Result<ArrayRef> {
    match v {
        LiteralValue::Int64(x) => {
            let mut b = Int64Builder::with_capacity(len);
            for _ in 0..len {
                b.append_value(*x);
            }
            Ok(Arc::new(b.finish()))
        }
        LiteralValue::Float64(x) => {
            let mut b = Float64Builder::with_capacity(len);
            for _ in 0..len {
                b.append_value(*x);
            }
            Ok(Arc::new(b.finish()))
        }
        LiteralValue::Boolean(x) => {
            let mut b = BooleanBuilder::with_capacity(len);
            for _ in 0..len {
                b.append_value(*x);
            }
            Ok(Arc::new(b.finish()))
        }
        LiteralValue::Utf8(s) => {
            let mut b = StringBuilder::with_capacity(len, s.len() * len);
            for _ in 0..len {
                b.append_value(s);
            }
            Ok(Arc::new(b.finish()))
        }
        LiteralValue::Null => Ok(new_null_array(&DataType::Null, len)),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{Array, BooleanArray, Float64Array, Int32Array, Int64Array, StringArray};
    use arrow::record_batch::RecordBatch;
    use arrow_schema::{DataType, Field, Schema};
    use tessera_common::TesseraError;
    use tessera_planner::{AggregateFunction, BinaryOp, Expr, LiteralValue, PlanType};
    use tessera_storage::ScalarValue;

    use super::{compile_expr, evaluate_constant, predicate_mask};
    use crate::schema::{ColumnHeader, PlanSchema};

    fn people() -> (PlanSchema, RecordBatch) {
        let schema = PlanSchema::new(vec![
            ColumnHeader::new(Some("p".into()), "age", DataType::Int32, true),
            ColumnHeader::new(Some("p".into()), "name", DataType::Utf8, false),
        ]);
        let batch = RecordBatch::try_new(
            Arc::new(Schema::new(vec![
                Field::new("age", DataType::Int32, true),
                Field::new("name", DataType::Utf8, false),
            ])),
            vec![
                Arc::new(Int32Array::from(vec![Some(17), Some(18), None, Some(40)])),
                Arc::new(StringArray::from(vec!["a", "b", "c", "d"])),
            ],
        )
        .expect("batch");
        (schema, batch)
    }

    #[test]
    fn int32_column_compares_with_int64_literal() {
        let (schema, batch) = people();
        let expr = Expr::binary(Expr::column("p.age"), BinaryOp::Gt, Expr::lit_i64(17));
        let compiled = compile_expr(&expr, &schema, PlanType::FilterPlan).expect("compile");
        let mask = predicate_mask(compiled.as_ref(), &batch).expect("mask");
        assert_eq!(mask, BooleanArray::from(vec![false, true, false, true]));
    }

    #[test]
    fn arithmetic_promotes_to_float() {
        let (schema, batch) = people();
        let expr = Expr::binary(
            Expr::column("age"),
            BinaryOp::Multiply,
            Expr::Literal(LiteralValue::Float64(0.5)),
        );
        let compiled = compile_expr(&expr, &schema, PlanType::SelectPlan).expect("compile");
        assert_eq!(compiled.data_type(), DataType::Float64);
        let out = compiled.evaluate(&batch).expect("eval");
        let out = out.as_any().downcast_ref::<Float64Array>().expect("f64");
        assert_eq!(out.value(0), 8.5);
        assert!(out.is_null(2));
    }

    #[test]
    fn string_against_number_is_a_type_mismatch() {
        let (schema, _) = people();
        let expr = Expr::binary(Expr::column("name"), BinaryOp::Eq, Expr::lit_i64(1));
        let err = compile_expr(&expr, &schema, PlanType::FilterPlan)
            .err()
            .expect("mismatch");
        assert!(matches!(err, TesseraError::TypeMismatch { .. }));
    }

    #[test]
    fn aggregate_without_group_output_is_not_found() {
        let (schema, _) = people();
        let expr = Expr::Aggregate {
            func: AggregateFunction::Count,
            arg: None,
        };
        let err = compile_expr(&expr, &schema, PlanType::FilterPlan)
            .err()
            .expect("no group");
        assert!(
            matches!(err, TesseraError::ColumnNotFound { ref column, .. } if column == "COUNT(*)")
        );
    }

    #[test]
    fn is_null_and_not_follow_kleene_logic() {
        let (schema, batch) = people();
        let expr = Expr::Not(Box::new(Expr::IsNull {
            expr: Box::new(Expr::column("age")),
            negated: false,
        }));
        let compiled = compile_expr(&expr, &schema, PlanType::FilterPlan).expect("compile");
        let mask = predicate_mask(compiled.as_ref(), &batch).expect("mask");
        assert_eq!(mask, BooleanArray::from(vec![true, true, false, true]));
    }

    #[test]
    fn constants_evaluate_without_columns() {
        let v = evaluate_constant(
            &Expr::binary(Expr::lit_i64(2), BinaryOp::Plus, Expr::lit_i64(3)),
            PlanType::InsertPlan,
        )
        .expect("constant");
        assert_eq!(v, ScalarValue::Int64(5));
        let err = evaluate_constant(&Expr::column("id"), PlanType::InsertPlan)
            .expect_err("no columns");
        assert!(matches!(err, TesseraError::ColumnNotFound { .. }));
        let null = evaluate_constant(&Expr::Literal(LiteralValue::Null), PlanType::InsertPlan)
            .expect("null");
        assert!(null.is_null());
    }

    #[test]
    fn integer_sum_stays_integral() {
        let (schema, batch) = people();
        let expr = Expr::binary(Expr::column("age"), BinaryOp::Plus, Expr::lit_i64(1));
        let compiled = compile_expr(&expr, &schema, PlanType::SelectPlan).expect("compile");
        let out = compiled.evaluate(&batch).expect("eval");
        let out = out.as_any().downcast_ref::<Int64Array>().expect("i64");
        assert_eq!(out.value(3), 41);
    }
}

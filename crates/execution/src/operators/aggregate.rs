use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use arrow::array::ArrayRef;
use arrow_schema::DataType;
use tessera_common::{Result, TesseraError};
use tessera_planner::{AggregateFunction, Expr, GroupProperties, GroupStrategy, PlanType};
use tessera_storage::value::{scalar_from_array, scalars_to_array};
use tessera_storage::ScalarValue;

use super::{batch_with_schema, split_batch, ExecOutput};
use crate::expressions::{compile_expr, PhysicalExpr};
use crate::schema::PlanSchema;

#[derive(Debug, Clone)]
enum AggState {
    CountStar(i64),
    Count(i64),
    SumInt(Option<i64>),
    SumFloat(Option<f64>),
    Min(Option<ScalarValue>),
    Max(Option<ScalarValue>),
    Avg { sum: f64, count: i64 },
}

struct AggSpec {
    name: String,
    func: AggregateFunction,
    arg: Option<Arc<dyn PhysicalExpr>>,
    out_type: DataType,
}

struct GroupEntry {
    key: Vec<ScalarValue>,
    rows: Vec<usize>,
}

/// Groups rows by the key tuple and evaluates the aggregates per group.
///
/// Groups are emitted in the order their first row appears in the input,
/// whichever strategy is used. With no keys exactly one row is produced,
/// even for empty input.
pub fn run_group(
    group: &GroupProperties,
    input: ExecOutput,
    schema: PlanSchema,
    batch_size_rows: usize,
) -> Result<ExecOutput> {
    let batch = input.concat()?;
    let key_idx = group
        .keys
        .iter()
        .map(|k| input.schema.resolve(k, PlanType::GroupPlan))
        .collect::<Result<Vec<_>>>()?;
    let specs = build_agg_specs(&group.aggregates, &input.schema, &schema, key_idx.len())?;

    let rows = batch.num_rows();
    let mut keys = Vec::with_capacity(rows);
    for row in 0..rows {
        keys.push(
            key_idx
                .iter()
                .map(|i| scalar_from_array(batch.column(*i), row))
                .collect::<Result<Vec<_>>>()?,
        );
    }

    let mut groups = match group.strategy {
        GroupStrategy::Hash => hash_groups(keys),
        GroupStrategy::Sort => sort_groups(keys),
    };
    if key_idx.is_empty() && groups.is_empty() {
        groups.push(GroupEntry {
            key: Vec::new(),
            rows: Vec::new(),
        });
    }

    let args = specs
        .iter()
        .map(|s| s.arg.as_ref().map(|a| a.evaluate(&batch)).transpose())
        .collect::<Result<Vec<Option<ArrayRef>>>>()?;

    let n = groups.len();
    let mut key_columns: Vec<Vec<ScalarValue>> = vec![Vec::with_capacity(n); key_idx.len()];
    let mut agg_columns: Vec<Vec<ScalarValue>> = vec![Vec::with_capacity(n); specs.len()];
    for entry in &groups {
        for (col, v) in key_columns.iter_mut().zip(&entry.key) {
            col.push(v.clone());
        }
        for (i, spec) in specs.iter().enumerate() {
            let mut state = init_state(spec);
            for row in &entry.rows {
                let value = match &args[i] {
                    Some(arr) => scalar_from_array(arr, *row)?,
                    None => ScalarValue::Null,
                };
                update_state(&mut state, value, &spec.name)?;
            }
            agg_columns[i].push(finish_state(state));
        }
    }

    let mut columns = Vec::with_capacity(schema.len());
    let all_values = key_columns.iter().chain(agg_columns.iter());
    for (values, header) in all_values.zip(&schema.columns) {
        columns.push(scalars_to_array(values, &header.data_type, &header.name)?);
    }
    let out = batch_with_schema(&schema.arrow_schema(), columns)?;
    Ok(ExecOutput::new(schema, split_batch(out, batch_size_rows)))
}

fn build_agg_specs(
    aggregates: &[Expr],
    input: &PlanSchema,
    output: &PlanSchema,
    key_count: usize,
) -> Result<Vec<AggSpec>> {
    aggregates
        .iter()
        .enumerate()
        .map(|(i, agg)| {
            let Expr::Aggregate { func, arg } = agg else {
                return Err(TesseraError::Planning(format!(
                    "group aggregate list holds a non-aggregate expression: {agg}"
                )));
            };
            let arg = arg
                .as_ref()
                .map(|a| compile_expr(a, input, PlanType::GroupPlan))
                .transpose()?;
            Ok(AggSpec {
                name: agg.to_string(),
                func: *func,
                arg,
                out_type: output.column(key_count + i).data_type.clone(),
            })
        })
        .collect()
}

fn hash_groups(keys: Vec<Vec<ScalarValue>>) -> Vec<GroupEntry> {
    let mut index: HashMap<Vec<ScalarValue>, usize> = HashMap::new();
    let mut groups: Vec<GroupEntry> = Vec::new();
    for (row, key) in keys.into_iter().enumerate() {
        match index.get(&key) {
            Some(g) => groups[*g].rows.push(row),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push(GroupEntry {
                    key,
                    rows: vec![row],
                });
            }
        }
    }
    groups
}

/// Stable-sorts row indices by key, cuts runs of equal keys, then restores
/// first-seen order using each run's smallest row index.
fn sort_groups(keys: Vec<Vec<ScalarValue>>) -> Vec<GroupEntry> {
    let mut order: Vec<usize> = (0..keys.len()).collect();
    order.sort_by(|a, b| compare_keys(&keys[*a], &keys[*b]));

    let mut groups: Vec<GroupEntry> = Vec::new();
    for row in order {
        match groups.last_mut() {
            Some(g) if g.key == keys[row] => g.rows.push(row),
            _ => groups.push(GroupEntry {
                key: keys[row].clone(),
                rows: vec![row],
            }),
        }
    }
    groups.sort_by_key(|g| g.rows[0]);
    groups
}

fn compare_keys(a: &[ScalarValue], b: &[ScalarValue]) -> Ordering {
    a.iter()
        .zip(b)
        .map(|(x, y)| x.total_cmp(y))
        .find(|o| *o != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

fn init_state(spec: &AggSpec) -> AggState {
    match (spec.func, &spec.arg) {
        (AggregateFunction::Count, None) => AggState::CountStar(0),
        (AggregateFunction::Count, Some(_)) => AggState::Count(0),
        (AggregateFunction::Sum, _) if spec.out_type == DataType::Float64 => {
            AggState::SumFloat(None)
        }
        (AggregateFunction::Sum, _) => AggState::SumInt(None),
        (AggregateFunction::Min, _) => AggState::Min(None),
        (AggregateFunction::Max, _) => AggState::Max(None),
        (AggregateFunction::Avg, _) => AggState::Avg { sum: 0.0, count: 0 },
    }
}

fn update_state(state: &mut AggState, value: ScalarValue, name: &str) -> Result<()> {
    if let AggState::CountStar(n) = state {
        *n += 1;
        return Ok(());
    }
    if value.is_null() {
        return Ok(());
    }
    match state {
        AggState::CountStar(_) => {}
        AggState::Count(n) => *n += 1,
        AggState::SumInt(acc) => {
            let v = as_i64(&value, name)?;
            let next = acc.unwrap_or(0).checked_add(v).ok_or_else(|| {
                TesseraError::Execution(format!("integer overflow in {name}"))
            })?;
            *acc = Some(next);
        }
        AggState::SumFloat(acc) => *acc = Some(acc.unwrap_or(0.0) + as_f64(&value, name)?),
        AggState::Min(acc) => {
            if acc.as_ref().map_or(true, |m| value.total_cmp(m) == Ordering::Less) {
                *acc = Some(value);
            }
        }
        AggState::Max(acc) => {
            if acc
                .as_ref()
                .map_or(true, |m| value.total_cmp(m) == Ordering::Greater)
            {
                *acc = Some(value);
            }
        }
        AggState::Avg { sum, count } => {
            *sum += as_f64(&value, name)?;
            *count += 1;
        }
    }
    Ok(())
}

fn finish_state(state: AggState) -> ScalarValue {
    match state {
        AggState::CountStar(n) | AggState::Count(n) => ScalarValue::Int64(n),
        AggState::SumInt(v) => v.map_or(ScalarValue::Null, ScalarValue::Int64),
        AggState::SumFloat(v) => v.map_or(ScalarValue::Null, ScalarValue::float),
        AggState::Min(v) | AggState::Max(v) => v.unwrap_or(ScalarValue::Null),
        AggState::Avg { sum, count } => {
            if count == 0 {
                ScalarValue::Null
            } else {
                ScalarValue::float(sum / count as f64)
            }
        }
    }
}

fn as_i64(v: &ScalarValue, name: &str) -> Result<i64> {
    match v {
        ScalarValue::Int64(x) => Ok(*x),
        other => Err(TesseraError::TypeMismatch {
            column: name.to_string(),
            expected: "Int64".to_string(),
            actual: other.type_name().to_string(),
        }),
    }
}

fn as_f64(v: &ScalarValue, name: &str) -> Result<f64> {
    match v {
        ScalarValue::Int64(x) => Ok(*x as f64),
        ScalarValue::Float64Bits(x) => Ok(f64::from_bits(*x)),
        other => Err(TesseraError::TypeMismatch {
            column: name.to_string(),
            expected: "numeric".to_string(),
            actual: other.type_name().to_string(),
        }),
    }
}

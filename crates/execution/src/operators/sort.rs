use std::cmp::Ordering;

use tessera_common::Result;
use tessera_planner::{OrderProperties, PlanType, SortDirection};
use tessera_storage::value::scalar_from_array;
use tessera_storage::ScalarValue;

use super::{take_split, ExecOutput};

/// Materializes the input and stable-sorts it by the keys in order.
///
/// NULLs sort last ascending and first descending.
pub fn run_order(
    order: &OrderProperties,
    input: ExecOutput,
    batch_size_rows: usize,
) -> Result<ExecOutput> {
    let batch = input.concat()?;
    let mut keys = Vec::with_capacity(order.keys.len());
    for key in &order.keys {
        let idx = input.schema.resolve(&key.column, PlanType::OrderPlan)?;
        let column = batch.column(idx);
        let values = (0..batch.num_rows())
            .map(|row| scalar_from_array(column, row))
            .collect::<Result<Vec<_>>>()?;
        keys.push((values, key.direction));
    }

    let mut indices: Vec<u32> = (0..batch.num_rows() as u32).collect();
    indices.sort_by(|a, b| {
        keys.iter()
            .map(|(values, dir)| compare(&values[*a as usize], &values[*b as usize], *dir))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });

    let schema = input.schema;
    let batches = take_split(&batch, &schema.arrow_schema(), &indices, batch_size_rows)?;
    Ok(ExecOutput::new(schema, batches))
}

fn compare(a: &ScalarValue, b: &ScalarValue, direction: SortDirection) -> Ordering {
    let asc_nulls_last = match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.total_cmp(b),
    };
    match direction {
        SortDirection::Asc => asc_nulls_last,
        SortDirection::Desc => asc_nulls_last.reverse(),
    }
}

#[cfg(test)]
mod tests {
    use std::cmp::Ordering;

    use tessera_planner::SortDirection;
    use tessera_storage::ScalarValue;

    use super::compare;

    #[test]
    fn nulls_go_last_ascending_and_first_descending() {
        let null = ScalarValue::Null;
        let one = ScalarValue::Int64(1);
        assert_eq!(compare(&null, &one, SortDirection::Asc), Ordering::Greater);
        assert_eq!(compare(&null, &one, SortDirection::Desc), Ordering::Less);
        assert_eq!(
            compare(&one, &ScalarValue::Int64(2), SortDirection::Desc),
            Ordering::Greater
        );
    }
}

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, BooleanArray, BooleanBuilder, Float64Array, Float64Builder, Int32Array,
    Int32Builder, Int64Array, Int64Builder, StringArray, StringBuilder, TimestampMicrosecondArray,
    TimestampMicrosecondBuilder,
};
use arrow::compute::kernels::cast::cast;
use arrow_schema::{DataType, TimeUnit};
use serde::{Deserialize, Serialize};
use tessera_common::{Result, TesseraError};

/// Row-level value used for hashing keys, building chunks from literals and
/// materializing small generated tables.
///
/// Int32 and Timestamp columns read back as `Int64`; floats are kept as bits
/// so the value can be hashed and compared for equality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalarValue {
    Int64(i64),
    Float64Bits(u64),
    Utf8(String),
    Boolean(bool),
    Null,
}

impl Hash for ScalarValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Self::Int64(v) => {
                0_u8.hash(state);
                v.hash(state);
            }
            Self::Float64Bits(v) => {
                1_u8.hash(state);
                v.hash(state);
            }
            Self::Utf8(v) => {
                2_u8.hash(state);
                v.hash(state);
            }
            Self::Boolean(v) => {
                3_u8.hash(state);
                v.hash(state);
            }
            Self::Null => 4_u8.hash(state),
        }
    }
}

impl ScalarValue {
    /// Float key in canonical form: `-0.0` is stored as `0.0` and every NaN
    /// as the same quiet NaN, so equal values hash and compare equal.
    pub fn float(v: f64) -> Self {
        let v = if v.is_nan() {
            f64::NAN
        } else if v == 0.0 {
            0.0
        } else {
            v
        };
        Self::Float64Bits(v.to_bits())
    }

    pub fn is_nan(&self) -> bool {
        matches!(self, Self::Float64Bits(v) if f64::from_bits(*v).is_nan())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Int64(_) => "Int64",
            Self::Float64Bits(_) => "Float64",
            Self::Utf8(_) => "Utf8",
            Self::Boolean(_) => "Boolean",
            Self::Null => "Null",
        }
    }

    /// Total order used by sorting and sort-based grouping. NULL sorts first;
    /// callers flip it for NULLS LAST.
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        use ScalarValue::*;
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Null, _) => Ordering::Less,
            (_, Null) => Ordering::Greater,
            (Int64(x), Int64(y)) => x.cmp(y),
            (Float64Bits(x), Float64Bits(y)) => f64::from_bits(*x).total_cmp(&f64::from_bits(*y)),
            (Int64(x), Float64Bits(y)) => (*x as f64).total_cmp(&f64::from_bits(*y)),
            (Float64Bits(x), Int64(y)) => f64::from_bits(*x).total_cmp(&(*y as f64)),
            (Utf8(x), Utf8(y)) => x.cmp(y),
            (Boolean(x), Boolean(y)) => x.cmp(y),
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Boolean(_) => 1,
            Self::Int64(_) | Self::Float64Bits(_) => 2,
            Self::Utf8(_) => 3,
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int64(v) => write!(f, "{v}"),
            Self::Float64Bits(v) => write!(f, "{}", f64::from_bits(*v)),
            Self::Utf8(v) => write!(f, "{v}"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Null => f.write_str("NULL"),
        }
    }
}

pub fn scalar_from_array(array: &ArrayRef, row: usize) -> Result<ScalarValue> {
    if array.is_null(row) {
        return Ok(ScalarValue::Null);
    }
    match array.data_type() {
        DataType::Int32 => {
            let a = downcast::<Int32Array>(array, "Int32Array")?;
            Ok(ScalarValue::Int64(a.value(row) as i64))
        }
        DataType::Int64 => {
            let a = downcast::<Int64Array>(array, "Int64Array")?;
            Ok(ScalarValue::Int64(a.value(row)))
        }
        DataType::Float64 => {
            let a = downcast::<Float64Array>(array, "Float64Array")?;
            Ok(ScalarValue::float(a.value(row)))
        }
        DataType::Utf8 => {
            let a = downcast::<StringArray>(array, "StringArray")?;
            Ok(ScalarValue::Utf8(a.value(row).to_string()))
        }
        DataType::Boolean => {
            let a = downcast::<BooleanArray>(array, "BooleanArray")?;
            Ok(ScalarValue::Boolean(a.value(row)))
        }
        DataType::Timestamp(TimeUnit::Microsecond, _) => {
            let a = downcast::<TimestampMicrosecondArray>(array, "TimestampMicrosecondArray")?;
            Ok(ScalarValue::Int64(a.value(row)))
        }
        DataType::Null => Ok(ScalarValue::Null),
        other => Err(TesseraError::Unsupported(format!(
            "scalar type not supported: {other:?}"
        ))),
    }
}

fn downcast<'a, T: 'static>(array: &'a ArrayRef, what: &str) -> Result<&'a T> {
    array
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| TesseraError::Execution(format!("expected {what}")))
}

/// Builds an array of type `dt` from `values`, failing with `TypeMismatch`
/// attributed to `column` on the first incompatible value.
pub fn scalars_to_array(values: &[ScalarValue], dt: &DataType, column: &str) -> Result<ArrayRef> {
    let mismatch = |v: &ScalarValue| TesseraError::TypeMismatch {
        column: column.to_string(),
        expected: format!("{dt:?}"),
        actual: v.type_name().to_string(),
    };
    match dt {
        DataType::Int32 => {
            let mut b = Int32Builder::with_capacity(values.len());
            for v in values {
                match v {
                    ScalarValue::Int64(x) => {
                        let x = i32::try_from(*x).map_err(|_| TesseraError::TypeMismatch {
                            column: column.to_string(),
                            expected: "Int32".to_string(),
                            actual: format!("Int64 value {x} out of range"),
                        })?;
                        b.append_value(x)
                    }
                    ScalarValue::Null => b.append_null(),
                    other => return Err(mismatch(other)),
                }
            }
            Ok(Arc::new(b.finish()))
        }
        DataType::Int64 => {
            let mut b = Int64Builder::with_capacity(values.len());
            for v in values {
                match v {
                    ScalarValue::Int64(x) => b.append_value(*x),
                    ScalarValue::Null => b.append_null(),
                    other => return Err(mismatch(other)),
                }
            }
            Ok(Arc::new(b.finish()))
        }
        DataType::Float64 => {
            let mut b = Float64Builder::with_capacity(values.len());
            for v in values {
                match v {
                    ScalarValue::Float64Bits(x) => b.append_value(f64::from_bits(*x)),
                    ScalarValue::Int64(x) => b.append_value(*x as f64),
                    ScalarValue::Null => b.append_null(),
                    other => return Err(mismatch(other)),
                }
            }
            Ok(Arc::new(b.finish()))
        }
        DataType::Utf8 => {
            let mut b = StringBuilder::with_capacity(values.len(), values.len() * 8);
            for v in values {
                match v {
                    ScalarValue::Utf8(x) => b.append_value(x),
                    ScalarValue::Null => b.append_null(),
                    other => return Err(mismatch(other)),
                }
            }
            Ok(Arc::new(b.finish()))
        }
        DataType::Boolean => {
            let mut b = BooleanBuilder::with_capacity(values.len());
            for v in values {
                match v {
                    ScalarValue::Boolean(x) => b.append_value(*x),
                    ScalarValue::Null => b.append_null(),
                    other => return Err(mismatch(other)),
                }
            }
            Ok(Arc::new(b.finish()))
        }
        DataType::Timestamp(TimeUnit::Microsecond, None) => {
            let mut b = TimestampMicrosecondBuilder::with_capacity(values.len());
            for v in values {
                match v {
                    ScalarValue::Int64(x) => b.append_value(*x),
                    ScalarValue::Utf8(s) => b.append_value(parse_timestamp_micros(s, column)?),
                    ScalarValue::Null => b.append_null(),
                    other => return Err(mismatch(other)),
                }
            }
            Ok(Arc::new(b.finish()))
        }
        other => Err(TesseraError::Unsupported(format!(
            "column type not supported: {other:?}"
        ))),
    }
}

/// Parses an ISO-8601 style timestamp literal into microseconds since epoch.
pub fn parse_timestamp_micros(s: &str, column: &str) -> Result<i64> {
    let input: ArrayRef = Arc::new(StringArray::from(vec![s]));
    let parsed = cast(&input, &DataType::Timestamp(TimeUnit::Microsecond, None))
        .ok()
        .filter(|a| !a.is_null(0));
    let Some(parsed) = parsed else {
        return Err(TesseraError::TypeMismatch {
            column: column.to_string(),
            expected: "Timestamp".to_string(),
            actual: format!("Utf8 '{s}'"),
        });
    };
    let a = downcast::<TimestampMicrosecondArray>(&parsed, "TimestampMicrosecondArray")?;
    Ok(a.value(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int32_column_rejects_out_of_range_values() {
        let err = scalars_to_array(&[ScalarValue::Int64(i64::MAX)], &DataType::Int32, "age")
            .expect_err("overflow");
        assert!(matches!(err, TesseraError::TypeMismatch { ref column, .. } if column == "age"));
    }

    #[test]
    fn float_column_accepts_integers() {
        let arr = scalars_to_array(
            &[ScalarValue::Int64(3), ScalarValue::Null],
            &DataType::Float64,
            "score",
        )
        .expect("build");
        assert_eq!(scalar_from_array(&arr, 0).expect("read"), ScalarValue::float(3.0));
        assert!(scalar_from_array(&arr, 1).expect("read").is_null());
    }

    #[test]
    fn float_keys_are_canonical() {
        assert_eq!(ScalarValue::float(-0.0), ScalarValue::float(0.0));
        let quiet = ScalarValue::float(f64::NAN);
        let other_nan = ScalarValue::float(f64::from_bits(f64::NAN.to_bits() ^ 1));
        assert_eq!(quiet, other_nan);
        assert!(quiet.is_nan());
        assert!(!ScalarValue::float(1.5).is_nan());

        let arr = scalars_to_array(&[ScalarValue::float(-0.0)], &DataType::Float64, "x")
            .expect("build");
        assert_eq!(scalar_from_array(&arr, 0).expect("read"), ScalarValue::float(0.0));
    }

    #[test]
    fn string_into_int_is_a_type_mismatch() {
        let err = scalars_to_array(&[ScalarValue::Utf8("x".into())], &DataType::Int64, "id")
            .expect_err("mismatch");
        assert!(err.to_string().contains("id"));
    }

    #[test]
    fn timestamp_literals_are_parsed() {
        let dt = DataType::Timestamp(TimeUnit::Microsecond, None);
        let arr = scalars_to_array(&[ScalarValue::Utf8("1970-01-01T00:00:01".into())], &dt, "ts")
            .expect("parse");
        assert_eq!(scalar_from_array(&arr, 0).expect("read"), ScalarValue::Int64(1_000_000));
        assert!(scalars_to_array(&[ScalarValue::Utf8("yesterday".into())], &dt, "ts").is_err());
    }

    #[test]
    fn nulls_order_first_and_numbers_compare_across_types() {
        assert_eq!(
            ScalarValue::Null.total_cmp(&ScalarValue::Int64(0)),
            Ordering::Less
        );
        assert_eq!(
            ScalarValue::Int64(2).total_cmp(&ScalarValue::float(1.5)),
            Ordering::Greater
        );
    }
}

//! Conversions between Arrow array values and dynamic MessagePack values,
//! used for table-function parameters (spec.md §4.4 "endpoints") and
//! `column_statistics` min/max values (spec.md §4.4).

use crate::error::{AirportError, Result};
use arrow_array::{
    Array, ArrayRef, BinaryArray, BooleanArray, Date32Array, Float32Array, Float64Array,
    Int16Array, Int32Array, Int64Array, Int8Array, IntervalMonthDayNanoArray, StringArray,
    Time64MicrosecondArray, TimestampMicrosecondArray, UInt16Array, UInt32Array, UInt64Array,
    UInt8Array,
};
use arrow_schema::{DataType, TimeUnit};
use rmpv::Value;
use std::sync::Arc;

/// Read the value at `row` out of `array` as a dynamic MessagePack value.
/// Used to decode table-function parameters from a one-row Arrow batch
/// (spec.md §4.4 "endpoints").
pub fn scalar_value_at(array: &ArrayRef, row: usize) -> Result<Value> {
    if array.is_null(row) {
        return Ok(Value::Nil);
    }
    Ok(match array.data_type() {
        DataType::Boolean => Value::from(array.as_any().downcast_ref::<BooleanArray>().unwrap().value(row)),
        DataType::Int8 => Value::from(array.as_any().downcast_ref::<Int8Array>().unwrap().value(row)),
        DataType::Int16 => Value::from(array.as_any().downcast_ref::<Int16Array>().unwrap().value(row)),
        DataType::Int32 => Value::from(array.as_any().downcast_ref::<Int32Array>().unwrap().value(row)),
        DataType::Int64 => Value::from(array.as_any().downcast_ref::<Int64Array>().unwrap().value(row)),
        DataType::UInt8 => Value::from(array.as_any().downcast_ref::<UInt8Array>().unwrap().value(row)),
        DataType::UInt16 => Value::from(array.as_any().downcast_ref::<UInt16Array>().unwrap().value(row)),
        DataType::UInt32 => Value::from(array.as_any().downcast_ref::<UInt32Array>().unwrap().value(row)),
        DataType::UInt64 => Value::from(array.as_any().downcast_ref::<UInt64Array>().unwrap().value(row)),
        DataType::Float32 => Value::from(array.as_any().downcast_ref::<Float32Array>().unwrap().value(row)),
        DataType::Float64 => Value::from(array.as_any().downcast_ref::<Float64Array>().unwrap().value(row)),
        DataType::Utf8 => Value::from(array.as_any().downcast_ref::<StringArray>().unwrap().value(row)),
        DataType::Binary => Value::from(array.as_any().downcast_ref::<BinaryArray>().unwrap().value(row)),
        other => {
            return Err(AirportError::MalformedPayload(format!(
                "unsupported parameter column type: {other}"
            )))
        }
    })
}

fn single_value_array(value: &Value, data_type: &DataType) -> Result<ArrayRef> {
    let unsupported = || {
        AirportError::MalformedPayload(format!(
            "unsupported value type for column statistics: {data_type}"
        ))
    };
    Ok(match data_type {
        DataType::Boolean => Arc::new(BooleanArray::from(vec![value.as_bool().ok_or_else(unsupported)?])),
        DataType::Int8 => Arc::new(Int8Array::from(vec![value.as_i64().ok_or_else(unsupported)? as i8])),
        DataType::Int16 => Arc::new(Int16Array::from(vec![value.as_i64().ok_or_else(unsupported)? as i16])),
        DataType::Int32 => Arc::new(Int32Array::from(vec![value.as_i64().ok_or_else(unsupported)? as i32])),
        DataType::Int64 => Arc::new(Int64Array::from(vec![value.as_i64().unwrap_or(0)])),
        DataType::UInt8 => Arc::new(UInt8Array::from(vec![value.as_u64().unwrap_or(0) as u8])),
        DataType::UInt16 => Arc::new(UInt16Array::from(vec![value.as_u64().unwrap_or(0) as u16])),
        DataType::UInt32 => Arc::new(UInt32Array::from(vec![value.as_u64().unwrap_or(0) as u32])),
        DataType::UInt64 => Arc::new(UInt64Array::from(vec![value.as_u64().unwrap_or(0)])),
        DataType::Float32 => Arc::new(Float32Array::from(vec![value.as_f64().unwrap_or(0.0) as f32])),
        DataType::Float64 => Arc::new(Float64Array::from(vec![value.as_f64().unwrap_or(0.0)])),
        DataType::Utf8 => Arc::new(StringArray::from(vec![value.as_str().unwrap_or("").to_string()])),
        DataType::Binary => Arc::new(BinaryArray::from_vec(vec![value
            .as_slice()
            .unwrap_or(&[])])),
        DataType::Date32 => Arc::new(Date32Array::from(vec![value.as_i64().unwrap_or(0) as i32])),
        DataType::Time64(TimeUnit::Microsecond) => {
            Arc::new(Time64MicrosecondArray::from(vec![value.as_i64().unwrap_or(0)]))
        }
        DataType::Timestamp(TimeUnit::Microsecond, tz) => Arc::new(
            TimestampMicrosecondArray::from(vec![value.as_i64().unwrap_or(0)])
                .with_timezone_opt(tz.clone()),
        ),
        DataType::Interval(arrow_schema::IntervalUnit::MonthDayNano) => {
            Arc::new(IntervalMonthDayNanoArray::from(vec![arrow_buffer::IntervalMonthDayNano::new(
                0, 0, 0,
            )]))
        }
        DataType::FixedSizeBinary(16) => {
            let bytes = value.as_slice().unwrap_or(&[0u8; 16]);
            Arc::new(
                arrow_array::FixedSizeBinaryArray::try_from_sparse_iter_with_size(
                    std::iter::once(Some(bytes)),
                    16,
                )
                .map_err(AirportError::from)?,
            )
        }
        _ => return Err(unsupported()),
    })
}

/// Build single-row `(min, max)` arrays for `column_statistics`
/// (spec.md §4.4).
pub fn value_pair_to_arrays(min: &Value, max: &Value, data_type: &DataType) -> Result<(ArrayRef, ArrayRef)> {
    Ok((single_value_array(min, data_type)?, single_value_array(max, data_type)?))
}

//! Result rows and pagination metadata.
//!
//! Rows are ordered maps from column name to a JSON-ready value, so numeric
//! columns stay numbers, arrays stay arrays, and the serialized shape matches
//! the column order of the query plan's projection.

use arrow::array::{
    Array, BooleanArray, Float32Array, Float64Array, Int16Array, Int32Array, Int64Array,
    Int8Array, LargeListArray, LargeStringArray, ListArray, RecordBatch, StringArray,
    StringViewArray, UInt16Array, UInt32Array, UInt64Array, UInt8Array,
};
use arrow::datatypes::DataType;
use arrow::util::display::array_value_to_string;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use crate::error::SearchError;
use crate::registry::DatasetDescriptor;

/// One result row: column name to JSON-ready value, in projection order.
pub type Row = IndexMap<String, Value>;

/// Pagination metadata reported alongside a page of rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PaginationInfo {
    /// 1-based page the caller effectively received. When the requested page
    /// lies past the end of the result set this is clamped to the last page
    /// that exists (or 1 for an empty result set), while the rows themselves
    /// stay those of the requested window.
    pub current_page: u64,
    pub total_pages: u64,
    pub total_count: u64,
    pub page_size: u64,
}

impl PaginationInfo {
    /// Computes the metadata for a request window against a known total.
    pub fn for_request(requested_page: u64, page_size: u64, total_count: u64) -> Self {
        let total_pages = if page_size == 0 {
            0
        } else {
            total_count.div_ceil(page_size)
        };
        PaginationInfo {
            current_page: requested_page.clamp(1, total_pages.max(1)),
            total_pages,
            total_count,
            page_size,
        }
    }
}

/// One page of search results.
#[derive(Debug, Clone, Serialize)]
pub struct ResultPage {
    pub rows: Vec<Row>,
    pub pagination: PaginationInfo,
}

/// Converts collected record batches into JSON-ready rows.
///
/// Scalar columns map to their natural JSON type. String values in columns
/// the descriptor declares numeric are parsed back into numbers when they
/// parse cleanly, covering files where a numeric column was written as text.
/// Anything without a native mapping falls back to the engine's display
/// rendering, so dates and timestamps come out as their canonical strings.
pub fn shape_rows(
    batches: &[RecordBatch],
    descriptor: &DatasetDescriptor,
) -> Result<Vec<Row>, SearchError> {
    let mut rows = Vec::new();
    for batch in batches {
        let schema = batch.schema();
        for row_index in 0..batch.num_rows() {
            let mut row = Row::with_capacity(batch.num_columns());
            for (column_index, field) in schema.fields().iter().enumerate() {
                let column = batch.column(column_index);
                let value = cell_value(column.as_ref(), row_index)?;
                let value = coerce_declared_numeric(descriptor, field.name(), value);
                row.insert(field.name().clone(), value);
            }
            rows.push(row);
        }
    }
    Ok(rows)
}

/// Re-parses string cells of declared numeric columns into JSON numbers.
fn coerce_declared_numeric(descriptor: &DatasetDescriptor, field: &str, value: Value) -> Value {
    if !descriptor.field_type(field).is_numeric() {
        return value;
    }
    match value {
        Value::String(text) => {
            let trimmed = text.trim();
            if let Ok(int) = trimmed.parse::<i64>() {
                return Value::Number(int.into());
            }
            if let Ok(float) = trimmed.parse::<f64>() {
                if let Some(number) = serde_json::Number::from_f64(float) {
                    return Value::Number(number);
                }
            }
            Value::String(text)
        }
        other => other,
    }
}

/// JSON value of one cell, by the column's physical type.
fn cell_value(column: &dyn Array, row: usize) -> Result<Value, SearchError> {
    if column.is_null(row) {
        return Ok(Value::Null);
    }

    macro_rules! int_value {
        ($array_type:ty) => {{
            // downcast cannot fail: the arm is selected by the data type
            let array = column.as_any().downcast_ref::<$array_type>();
            match array {
                Some(array) => Ok(Value::Number(i64::from(array.value(row)).into())),
                None => fallback_string(column, row),
            }
        }};
    }

    match column.data_type() {
        DataType::Utf8 => match column.as_any().downcast_ref::<StringArray>() {
            Some(array) => Ok(Value::String(array.value(row).to_string())),
            None => fallback_string(column, row),
        },
        DataType::LargeUtf8 => match column.as_any().downcast_ref::<LargeStringArray>() {
            Some(array) => Ok(Value::String(array.value(row).to_string())),
            None => fallback_string(column, row),
        },
        DataType::Utf8View => match column.as_any().downcast_ref::<StringViewArray>() {
            Some(array) => Ok(Value::String(array.value(row).to_string())),
            None => fallback_string(column, row),
        },
        DataType::Boolean => match column.as_any().downcast_ref::<BooleanArray>() {
            Some(array) => Ok(Value::Bool(array.value(row))),
            None => fallback_string(column, row),
        },
        DataType::Int8 => int_value!(Int8Array),
        DataType::Int16 => int_value!(Int16Array),
        DataType::Int32 => int_value!(Int32Array),
        DataType::Int64 => int_value!(Int64Array),
        DataType::UInt8 => int_value!(UInt8Array),
        DataType::UInt16 => int_value!(UInt16Array),
        DataType::UInt32 => int_value!(UInt32Array),
        DataType::UInt64 => match column.as_any().downcast_ref::<UInt64Array>() {
            Some(array) => Ok(Value::Number(array.value(row).into())),
            None => fallback_string(column, row),
        },
        DataType::Float32 => match column.as_any().downcast_ref::<Float32Array>() {
            Some(array) => Ok(float_value(f64::from(array.value(row)))),
            None => fallback_string(column, row),
        },
        DataType::Float64 => match column.as_any().downcast_ref::<Float64Array>() {
            Some(array) => Ok(float_value(array.value(row))),
            None => fallback_string(column, row),
        },
        DataType::List(_) => match column.as_any().downcast_ref::<ListArray>() {
            Some(array) => list_value(array.value(row).as_ref()),
            None => fallback_string(column, row),
        },
        DataType::LargeList(_) => match column.as_any().downcast_ref::<LargeListArray>() {
            Some(array) => list_value(array.value(row).as_ref()),
            None => fallback_string(column, row),
        },
        _ => fallback_string(column, row),
    }
}

fn float_value(value: f64) -> Value {
    // NaN and infinities have no JSON number form
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn list_value(elements: &dyn Array) -> Result<Value, SearchError> {
    let mut values = Vec::with_capacity(elements.len());
    for index in 0..elements.len() {
        values.push(cell_value(elements, index)?);
    }
    Ok(Value::Array(values))
}

fn fallback_string(column: &dyn Array, row: usize) -> Result<Value, SearchError> {
    array_value_to_string(column, row)
        .map(Value::String)
        .map_err(SearchError::retrieval)
}

use std::sync::Arc;

use chrono::NaiveDateTime;
use serde_json::Value;
use tokio_postgres::{Row, Statement};

use crate::error::CrudMiddlewareError;
use crate::results::ResultSet;
use crate::types::RowValues;

fn extract_error(idx: usize, err: &tokio_postgres::Error) -> CrudMiddlewareError {
    CrudMiddlewareError::ExecutionError(format!("postgres column {idx}: {err}"))
}

/// Extracts a `RowValues` from a `tokio_postgres` row at the given index.
///
/// # Errors
/// Returns `ExecutionError` if the column cannot be read as its declared type.
pub fn postgres_extract_value(row: &Row, idx: usize) -> Result<RowValues, CrudMiddlewareError> {
    let type_name = row.columns()[idx].type_().name();
    let value = match type_name {
        "int2" => row
            .try_get::<_, Option<i16>>(idx)
            .map(|v| v.map_or(RowValues::Null, |v| RowValues::Int(i64::from(v)))),
        "int4" => row
            .try_get::<_, Option<i32>>(idx)
            .map(|v| v.map_or(RowValues::Null, |v| RowValues::Int(i64::from(v)))),
        "int8" => row
            .try_get::<_, Option<i64>>(idx)
            .map(|v| v.map_or(RowValues::Null, RowValues::Int)),
        "float4" => row
            .try_get::<_, Option<f32>>(idx)
            .map(|v| v.map_or(RowValues::Null, |v| RowValues::Float(f64::from(v)))),
        "float8" => row
            .try_get::<_, Option<f64>>(idx)
            .map(|v| v.map_or(RowValues::Null, RowValues::Float)),
        "bool" => row
            .try_get::<_, Option<bool>>(idx)
            .map(|v| v.map_or(RowValues::Null, RowValues::Bool)),
        "timestamp" => row
            .try_get::<_, Option<NaiveDateTime>>(idx)
            .map(|v| v.map_or(RowValues::Null, RowValues::Timestamp)),
        "json" | "jsonb" => row
            .try_get::<_, Option<Value>>(idx)
            .map(|v| v.map_or(RowValues::Null, RowValues::JSON)),
        "bytea" => row
            .try_get::<_, Option<Vec<u8>>>(idx)
            .map(|v| v.map_or(RowValues::Null, RowValues::Blob)),
        // Everything else is read as text.
        _ => row
            .try_get::<_, Option<String>>(idx)
            .map(|v| v.map_or(RowValues::Null, RowValues::Text)),
    };
    value.map_err(|err| extract_error(idx, &err))
}

fn push_rows(
    result_set: &mut ResultSet,
    rows: &[Row],
    column_count: usize,
) -> Result<(), CrudMiddlewareError> {
    for row in rows {
        let mut row_values = Vec::with_capacity(column_count);
        for idx in 0..column_count {
            row_values.push(postgres_extract_value(row, idx)?);
        }
        result_set.add_row_values(row_values);
    }
    Ok(())
}

/// Build a result set from rows of an unnamed statement. Column names come from the first row,
/// so an empty result carries none.
///
/// # Errors
/// Returns errors from value extraction.
pub fn build_result_set_from_rows(rows: &[Row]) -> Result<ResultSet, CrudMiddlewareError> {
    let mut result_set = ResultSet::with_capacity(rows.len());
    let Some(first) = rows.first() else {
        return Ok(result_set);
    };
    let names: Vec<String> = first.columns().iter().map(|c| c.name().to_string()).collect();
    let column_count = names.len();
    result_set.set_column_names(Arc::new(names));
    push_rows(&mut result_set, rows, column_count)?;
    Ok(result_set)
}

/// Build a result set using the column metadata of a prepared statement.
///
/// # Errors
/// Returns errors from value extraction.
pub fn build_result_set_from_statement(
    stmt: &Statement,
    rows: &[Row],
) -> Result<ResultSet, CrudMiddlewareError> {
    let names: Vec<String> = stmt
        .columns()
        .iter()
        .map(|col| col.name().to_string())
        .collect();
    let column_count = names.len();

    let mut result_set = ResultSet::with_capacity(rows.len());
    result_set.set_column_names(Arc::new(names));
    push_rows(&mut result_set, rows, column_count)?;
    Ok(result_set)
}

//! Decoding of dynamically typed MySQL rows.

use sqlx::mysql::MySqlRow;
use sqlx::types::chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use sqlx::types::BigDecimal;
use sqlx::{Column, Row as _, TypeInfo};

use crate::errors::SourceError;
use relational_indexer_shared::{Row, Scalar};

/// Convert a MySQL row into a source row of `table`.
pub(crate) fn decode_row(table: &str, row: &MySqlRow) -> Result<Row, SourceError> {
    let mut decoded = Row::new(table);
    for column in row.columns() {
        let value = decode_column(row, column.ordinal(), column.type_info().name())?;
        decoded.values.insert(column.name().to_string(), value);
    }
    Ok(decoded)
}

fn decode_column(
    row: &MySqlRow,
    index: usize,
    type_name: &str,
) -> Result<Option<Scalar>, SourceError> {
    let value = match type_name {
        "BOOLEAN" => row.try_get::<Option<bool>, _>(index)?.map(Scalar::Bool),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
            row.try_get::<Option<i64>, _>(index)?.map(Scalar::Int)
        }
        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
        | "BIGINT UNSIGNED" => row.try_get::<Option<u64>, _>(index)?.map(Scalar::UInt),
        "FLOAT" => row
            .try_get::<Option<f32>, _>(index)?
            .map(|v| Scalar::Float(f64::from(v))),
        "DOUBLE" => row.try_get::<Option<f64>, _>(index)?.map(Scalar::Float),
        "DECIMAL" => row
            .try_get::<Option<BigDecimal>, _>(index)?
            .map(|v| Scalar::Text(v.to_string())),
        "DATETIME" | "TIMESTAMP" => row
            .try_get::<Option<NaiveDateTime>, _>(index)?
            .map(|v| Scalar::Text(v.format("%Y-%m-%dT%H:%M:%S").to_string())),
        "DATE" => row
            .try_get::<Option<NaiveDate>, _>(index)?
            .map(|v| Scalar::Text(v.to_string())),
        "TIME" => row
            .try_get::<Option<NaiveTime>, _>(index)?
            .map(|v| Scalar::Text(v.to_string())),
        "JSON" => row
            .try_get::<Option<serde_json::Value>, _>(index)?
            .map(|v| Scalar::Text(v.to_string())),
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT" => row
            .try_get::<Option<Vec<u8>>, _>(index)?
            .map(|v| Scalar::Text(String::from_utf8_lossy(&v).into_owned())),
        _ => match row.try_get::<Option<String>, _>(index) {
            Ok(value) => value.map(Scalar::Text),
            Err(_) => row
                .try_get::<Option<Vec<u8>>, _>(index)?
                .map(|v| Scalar::Text(String::from_utf8_lossy(&v).into_owned())),
        },
    };
    Ok(value)
}

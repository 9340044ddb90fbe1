use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

use super::BoxFuture;
use crate::error::DomainError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DbError {
    #[error("db unavailable: {0}")]
    Unavailable(String),
    #[error("db operation failed: {0}")]
    Operation(String),
}

impl From<DbError> for DomainError {
    fn from(err: DbError) -> Self {
        DomainError::Persistence(err.to_string())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl SqlValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Integer(value) => Value::from(*value),
            Self::Real(value) => Value::from(*value),
            Self::Text(value) => Value::from(value.as_str()),
        }
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::Null)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
    pub rows_affected: usize,
}

impl RowSet {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn record(&self, index: usize) -> Option<Map<String, Value>> {
        let row = self.rows.get(index)?;
        Some(
            self.columns
                .iter()
                .cloned()
                .zip(row.iter().map(SqlValue::to_json))
                .collect(),
        )
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<Vec<T>, DbError> {
        (0..self.rows.len())
            .filter_map(|index| self.record(index))
            .map(|record| {
                serde_json::from_value(Value::Object(record))
                    .map_err(|err| DbError::Operation(format!("invalid row: {err}")))
            })
            .collect()
    }

    pub fn decode_first<T: DeserializeOwned>(&self) -> Result<Option<T>, DbError> {
        let Some(record) = self.record(0) else {
            return Ok(None);
        };
        serde_json::from_value(Value::Object(record))
            .map(Some)
            .map_err(|err| DbError::Operation(format!("invalid row: {err}")))
    }

    pub fn scalar_i64(&self) -> Option<i64> {
        self.rows.first()?.first()?.as_i64()
    }
}

pub trait SqlExecutor: Send + Sync {
    fn name(&self) -> &'static str;

    fn execute(
        &self,
        statement: &str,
        params: Vec<SqlValue>,
    ) -> BoxFuture<'_, Result<RowSet, DbError>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Sample {
        id: i64,
        name: String,
        parent_id: Option<i64>,
    }

    fn sample_rows() -> RowSet {
        RowSet {
            columns: vec!["id".into(), "name".into(), "parent_id".into()],
            rows: vec![
                vec![SqlValue::Integer(1), SqlValue::from("home"), SqlValue::Null],
                vec![SqlValue::Integer(2), SqlValue::from("daycare"), SqlValue::Integer(1)],
            ],
            rows_affected: 0,
        }
    }

    #[test]
    fn decodes_records_through_serde() {
        let decoded: Vec<Sample> = sample_rows().decode().unwrap();
        assert_eq!(
            decoded,
            vec![
                Sample {
                    id: 1,
                    name: "home".into(),
                    parent_id: None
                },
                Sample {
                    id: 2,
                    name: "daycare".into(),
                    parent_id: Some(1)
                },
            ]
        );
    }

    #[test]
    fn scalar_reads_first_cell() {
        assert_eq!(sample_rows().scalar_i64(), Some(1));
        assert_eq!(RowSet::default().scalar_i64(), None);
    }

    #[test]
    fn decode_reports_shape_mismatch() {
        let rows = RowSet {
            columns: vec!["id".into()],
            rows: vec![vec![SqlValue::from("not-a-number")]],
            rows_affected: 0,
        };
        let err = rows.decode::<Sample>().unwrap_err();
        assert!(matches!(err, DbError::Operation(msg) if msg.starts_with("invalid row")));
    }
}

//! Source-side values: scalars, primary keys, rows and selections.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A single non-null column value read from the relational source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
}

impl Scalar {
    /// Compare two scalars by value, treating signed and unsigned integers alike.
    pub fn same_value(&self, other: &Scalar) -> bool {
        match (self, other) {
            (Scalar::Int(a), Scalar::UInt(b)) | (Scalar::UInt(b), Scalar::Int(a)) => {
                u64::try_from(*a).map(|a| a == *b).unwrap_or(false)
            }
            (a, b) => a == b,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(v) => write!(f, "{}", v),
            Scalar::Int(v) => write!(f, "{}", v),
            Scalar::UInt(v) => write!(f, "{}", v),
            Scalar::Float(v) => write!(f, "{}", v),
            Scalar::Text(v) => f.write_str(v),
        }
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Text(value)
    }
}

/// Primary-key value of a row in the primary table.
///
/// Keys are totally ordered so the cursor can page through them. Integers
/// are kept in one canonical form: `UInt` only holds values above `i64::MAX`,
/// so the variant order matches numeric order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrimaryKey {
    Int(i64),
    UInt(u64),
    Text(String),
}

impl PrimaryKey {
    /// Convert a column value into a key, if the value can act as one.
    pub fn from_scalar(value: &Scalar) -> Option<Self> {
        match value {
            Scalar::Int(v) => Some(PrimaryKey::Int(*v)),
            Scalar::UInt(v) => Some(match i64::try_from(*v) {
                Ok(v) => PrimaryKey::Int(v),
                Err(_) => PrimaryKey::UInt(*v),
            }),
            Scalar::Text(v) => Some(PrimaryKey::Text(v.clone())),
            Scalar::Bool(_) | Scalar::Float(_) => None,
        }
    }

    /// The key as a column value, for binding into queries.
    pub fn to_scalar(&self) -> Scalar {
        match self {
            PrimaryKey::Int(v) => Scalar::Int(*v),
            PrimaryKey::UInt(v) => Scalar::UInt(*v),
            PrimaryKey::Text(v) => Scalar::Text(v.clone()),
        }
    }
}

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimaryKey::Int(v) => write!(f, "{}", v),
            PrimaryKey::UInt(v) => write!(f, "{}", v),
            PrimaryKey::Text(v) => f.write_str(v),
        }
    }
}

impl From<i64> for PrimaryKey {
    fn from(value: i64) -> Self {
        PrimaryKey::Int(value)
    }
}

/// A row as loaded from the source.
///
/// `values` holds only the columns the source actually returned; a `None`
/// value is SQL `NULL`. Columns that were not loaded are simply absent.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    pub table: String,
    pub values: BTreeMap<String, Option<Scalar>>,
}

impl Row {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            values: BTreeMap::new(),
        }
    }

    /// Builder-style column setter.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Option<Scalar>>) -> Self {
        self.values.insert(column.into(), value.into());
        self
    }

    /// Non-null value of a column.
    pub fn get(&self, column: &str) -> Option<&Scalar> {
        self.values.get(column).and_then(Option::as_ref)
    }

    /// Value of a column interpreted as a primary key.
    pub fn key(&self, column: &str) -> Option<PrimaryKey> {
        self.get(column).and_then(PrimaryKey::from_scalar)
    }
}

/// Selection predicate over the primary table.
///
/// The predicate is a static SQL fragment taken from configuration; `None`
/// selects every row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub predicate: Option<String>,
}

impl Selection {
    /// Select every row.
    pub fn all() -> Self {
        Self { predicate: None }
    }

    /// Select rows matching a SQL predicate.
    pub fn matching(predicate: impl Into<String>) -> Self {
        Self {
            predicate: Some(predicate.into()),
        }
    }

    /// The predicate as a SQL boolean expression.
    pub fn sql(&self) -> &str {
        self.predicate.as_deref().unwrap_or("TRUE")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_get_skips_nulls() {
        let row = Row::new("categories")
            .with("id", Scalar::Int(1))
            .with("parent_id", None::<Scalar>);

        assert_eq!(row.get("id"), Some(&Scalar::Int(1)));
        assert_eq!(row.get("parent_id"), None);
        assert_eq!(row.get("missing"), None);
        assert_eq!(row.key("id"), Some(PrimaryKey::Int(1)));
    }

    #[test]
    fn test_primary_key_from_scalar() {
        assert_eq!(
            PrimaryKey::from_scalar(&Scalar::UInt(7)),
            Some(PrimaryKey::Int(7))
        );
        assert_eq!(PrimaryKey::from_scalar(&Scalar::Float(1.5)), None);
        assert_eq!(PrimaryKey::Int(3).to_scalar(), Scalar::Int(3));
    }

    #[test]
    fn test_unsigned_keys_above_i64_range() {
        let big = u64::MAX - 1;
        let key = PrimaryKey::from_scalar(&Scalar::UInt(big));

        assert_eq!(key, Some(PrimaryKey::UInt(big)));
        assert_eq!(key.map(|k| k.to_scalar()), Some(Scalar::UInt(big)));

        let mut keys = vec![
            PrimaryKey::from_scalar(&Scalar::UInt(big)),
            PrimaryKey::from_scalar(&Scalar::UInt(i64::MAX as u64)),
            PrimaryKey::from_scalar(&Scalar::UInt(3)),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                Some(PrimaryKey::Int(3)),
                Some(PrimaryKey::Int(i64::MAX)),
                Some(PrimaryKey::UInt(big)),
            ]
        );
    }

    #[test]
    fn test_same_value_across_signedness() {
        assert!(Scalar::Int(5).same_value(&Scalar::UInt(5)));
        assert!(!Scalar::Int(-1).same_value(&Scalar::UInt(u64::MAX)));
        assert!(!Scalar::Int(5).same_value(&Scalar::Text("5".into())));
    }

    #[test]
    fn test_selection_sql() {
        assert_eq!(Selection::all().sql(), "TRUE");
        assert_eq!(Selection::matching("active = 1").sql(), "active = 1");
    }
}

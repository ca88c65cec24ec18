//! Query Key Module
//!
//! Structural identifiers for logical queries.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

// == Key Part ==
/// One primitive component of a query key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyPart {
    /// Absent value (`null`)
    Null,
    /// Integer component
    Int(i64),
    /// String component
    Str(String),
}

impl From<&str> for KeyPart {
    fn from(value: &str) -> Self {
        KeyPart::Str(value.to_string())
    }
}

impl From<String> for KeyPart {
    fn from(value: String) -> Self {
        KeyPart::Str(value)
    }
}

impl From<&String> for KeyPart {
    fn from(value: &String) -> Self {
        KeyPart::Str(value.clone())
    }
}

impl From<i64> for KeyPart {
    fn from(value: i64) -> Self {
        KeyPart::Int(value)
    }
}

impl From<i32> for KeyPart {
    fn from(value: i32) -> Self {
        KeyPart::Int(i64::from(value))
    }
}

impl From<u32> for KeyPart {
    fn from(value: u32) -> Self {
        KeyPart::Int(i64::from(value))
    }
}

impl<T: Into<KeyPart>> From<Option<T>> for KeyPart {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(KeyPart::Null)
    }
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPart::Null => f.write_str("null"),
            KeyPart::Int(n) => write!(f, "{}", n),
            KeyPart::Str(s) => write!(f, "{:?}", s),
        }
    }
}

// == Query Key ==
/// Ordered, immutable sequence of key parts identifying one logical query.
///
/// Equality and hashing are structural and order-sensitive. Cloning is cheap
/// since the parts are shared.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryKey(Arc<[KeyPart]>);

impl QueryKey {
    /// Builds a key from its parts.
    pub fn new<I, P>(parts: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<KeyPart>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }

    /// Returns the key parts in order.
    pub fn parts(&self) -> &[KeyPart] {
        &self.0
    }

    /// Returns true if `prefix` matches the leading parts of this key.
    pub fn starts_with(&self, prefix: &[KeyPart]) -> bool {
        self.0.starts_with(prefix)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", part)?;
        }
        f.write_str("]")
    }
}

/// Builds a [`QueryKey`] from a list of primitive values.
///
/// ```ignore
/// let key = query_key!["product", "42"];
/// ```
#[macro_export]
macro_rules! query_key {
    ($($part:expr),* $(,)?) => {
        $crate::cache::QueryKey::new(::std::vec![$($crate::cache::KeyPart::from($part)),*])
    };
}

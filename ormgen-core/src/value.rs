use crate::error::{OrmError, OrmResult};
use std::fmt;

/// A positional SQL argument.
///
/// Every predicate, insert and update carries its arguments as `BindValue`s so
/// that the same query state can be bound against any [`Backend`](crate::Backend).
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    String(String),
    I64(i64),
    F64(f64),
    Bool(bool),
    Uuid(uuid::Uuid),
    DateTime(chrono::DateTime<chrono::Utc>),
    Null,
}

impl BindValue {
    /// Reports whether the value is the zero value of its type.
    ///
    /// `Update` uses this to refuse rows whose primary key was never assigned.
    pub fn is_zero(&self) -> bool {
        match self {
            BindValue::String(v) => v.is_empty(),
            BindValue::I64(v) => *v == 0,
            BindValue::F64(v) => *v == 0.0,
            BindValue::Bool(v) => !*v,
            BindValue::Uuid(v) => v.is_nil(),
            BindValue::DateTime(v) => *v == chrono::DateTime::<chrono::Utc>::UNIX_EPOCH,
            BindValue::Null => true,
        }
    }

    /// Log rendering: text payloads are masked, other scalars print as-is.
    pub fn to_log_string(&self) -> String {
        match self {
            BindValue::String(_) => "***".to_owned(),
            other => other.to_string(),
        }
    }
}

pub(crate) fn format_args_for_log(args: &[BindValue]) -> String {
    let rendered = args
        .iter()
        .map(BindValue::to_log_string)
        .collect::<Vec<_>>()
        .join(", ");
    format!("[{}]", rendered)
}

impl fmt::Display for BindValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindValue::String(v) => write!(f, "{:?}", v),
            BindValue::I64(v) => write!(f, "{}", v),
            BindValue::F64(v) => write!(f, "{}", v),
            BindValue::Bool(v) => write!(f, "{}", v),
            BindValue::Uuid(v) => write!(f, "{}", v),
            BindValue::DateTime(v) => f.write_str(&v.to_rfc3339()),
            BindValue::Null => f.write_str("NULL"),
        }
    }
}

impl From<String> for BindValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&String> for BindValue {
    fn from(value: &String) -> Self {
        Self::String(value.clone())
    }
}

impl From<&str> for BindValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<i16> for BindValue {
    fn from(value: i16) -> Self {
        Self::I64(i64::from(value))
    }
}

impl From<i32> for BindValue {
    fn from(value: i32) -> Self {
        Self::I64(i64::from(value))
    }
}

impl From<u32> for BindValue {
    fn from(value: u32) -> Self {
        Self::I64(i64::from(value))
    }
}

impl From<i64> for BindValue {
    fn from(value: i64) -> Self {
        Self::I64(value)
    }
}

impl From<f64> for BindValue {
    fn from(value: f64) -> Self {
        Self::F64(value)
    }
}

impl From<bool> for BindValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<uuid::Uuid> for BindValue {
    fn from(value: uuid::Uuid) -> Self {
        Self::Uuid(value)
    }
}

impl From<chrono::DateTime<chrono::Utc>> for BindValue {
    fn from(value: chrono::DateTime<chrono::Utc>) -> Self {
        Self::DateTime(value)
    }
}

impl<T: Into<BindValue>> From<Option<T>> for BindValue {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => Self::Null,
        }
    }
}

impl TryFrom<&serde_json::Value> for BindValue {
    type Error = OrmError;

    fn try_from(value: &serde_json::Value) -> OrmResult<Self> {
        match value {
            serde_json::Value::String(s) => Ok(Self::String(s.clone())),
            serde_json::Value::Number(n) => {
                if let Some(v) = n.as_i64() {
                    Ok(Self::I64(v))
                } else if let Some(v) = n.as_f64() {
                    Ok(Self::F64(v))
                } else {
                    Err(OrmError::UnsupportedValue(format!("number out of range: {}", n)))
                }
            }
            serde_json::Value::Bool(b) => Ok(Self::Bool(*b)),
            serde_json::Value::Null => Ok(Self::Null),
            other => Err(OrmError::UnsupportedValue(format!(
                "only JSON scalars can be bound, got {}",
                other
            ))),
        }
    }
}

/// Builds a `Vec<BindValue>` from heterogeneous values.
///
/// ```
/// use ormgen_core::{args, BindValue};
///
/// let args = args!["alice", 30, true];
/// assert_eq!(args[1], BindValue::I64(30));
/// ```
#[macro_export]
macro_rules! args {
    () => { ::std::vec::Vec::<$crate::BindValue>::new() };
    ($($value:expr),+ $(,)?) => {
        ::std::vec![$($crate::BindValue::from($value)),+]
    };
}

/// Engine error type.
///
/// Validation failures are raised before any statement is sent; driver errors
/// are carried through unchanged in [`OrmError::Sqlx`].
#[derive(Debug)]
pub enum OrmError {
    /// A single-row fetch matched nothing.
    NotFound,
    /// A bulk `delete`/`updates` was attempted without any predicate.
    MissingWhere {
        /// The refused operation.
        operation: &'static str,
    },
    /// `update` was called on a row whose primary key is the zero value.
    MissingPrimaryKey,
    /// A preload or join referenced a relation name that was never registered.
    UnknownRelation(String),
    /// An INSERT ... RETURNING produced fewer rows than rows inserted.
    MissingReturning {
        /// Rows the statement inserted.
        expected: usize,
        /// Rows the statement returned.
        returned: usize,
    },
    /// The driver did not report a last-insert-id for a generated key.
    MissingInsertId,
    /// A value could not be bound as a positional argument.
    UnsupportedValue(String),
    /// Underlying sqlx error.
    Sqlx(sqlx::Error),
}

impl std::fmt::Display for OrmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => f.write_str("ormgen: not found"),
            Self::MissingWhere { operation } => {
                write!(f, "ormgen: {} without WHERE clause is not allowed", operation)
            }
            Self::MissingPrimaryKey => f.write_str("ormgen: primary key value is required"),
            Self::UnknownRelation(name) => write!(f, "ormgen: unknown relation {:?}", name),
            Self::MissingReturning { expected, returned } => write!(
                f,
                "ormgen: INSERT RETURNING returned {} rows, expected {}",
                returned, expected
            ),
            Self::MissingInsertId => f.write_str("ormgen: driver reported no last insert id"),
            Self::UnsupportedValue(message) => write!(f, "ormgen: unsupported value: {}", message),
            Self::Sqlx(err) => write!(f, "sqlx error: {}", err),
        }
    }
}

impl std::error::Error for OrmError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Sqlx(err) => Some(err),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for OrmError {
    fn from(err: sqlx::Error) -> Self {
        Self::Sqlx(err)
    }
}

impl OrmError {
    /// Reports whether this is the [`OrmError::NotFound`] sentinel.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

/// Result alias for engine operations.
pub type OrmResult<T> = Result<T, OrmError>;

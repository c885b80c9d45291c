use crate::value::BindValue;
use futures_util::future::BoxFuture;
use sqlx::Database;

/// SQL syntax differences between database engines.
///
/// A dialect is chosen once per [`Db`](crate::Db) and governs every query and
/// transaction derived from it. New engines are supported by adding an
/// implementation; nothing in the engine branches on which dialect is active.
pub trait Dialect: Send + Sync + std::fmt::Debug {
    /// Returns the bind placeholder for the given 1-based index.
    fn placeholder(&self, index: usize) -> String;

    /// Quotes an identifier (table or column name).
    fn quote_ident(&self, name: &str) -> String;

    /// Reports whether generated keys are read back with a RETURNING clause
    /// instead of the driver's last-insert-id.
    fn use_returning(&self) -> bool;

    /// Returns the RETURNING clause appended to INSERT statements, or an empty
    /// string when the dialect has none.
    fn returning_clause(&self, pk: &str) -> String;

    /// Returns the conflict clause that turns an INSERT into an upsert on `pk`,
    /// overwriting `update_columns` with the incoming values.
    fn upsert_clause(&self, pk: &str, update_columns: &[&str]) -> String;
}

/// MySQL / MariaDB.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

/// PostgreSQL.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

/// The MySQL dialect.
pub static MYSQL: MySqlDialect = MySqlDialect;

/// The PostgreSQL dialect.
pub static POSTGRES: PostgresDialect = PostgresDialect;

impl Dialect for MySqlDialect {
    fn placeholder(&self, _index: usize) -> String {
        "?".to_owned()
    }

    fn quote_ident(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn use_returning(&self) -> bool {
        false
    }

    fn returning_clause(&self, _pk: &str) -> String {
        String::new()
    }

    fn upsert_clause(&self, pk: &str, update_columns: &[&str]) -> String {
        let sets = conflict_targets(pk, update_columns)
            .map(|col| {
                let q = self.quote_ident(col);
                format!("{} = VALUES({})", q, q)
            })
            .collect::<Vec<_>>();
        format!(" ON DUPLICATE KEY UPDATE {}", sets.join(", "))
    }
}

impl Dialect for PostgresDialect {
    fn placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    fn quote_ident(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn use_returning(&self) -> bool {
        true
    }

    fn returning_clause(&self, pk: &str) -> String {
        format!(" RETURNING {}", self.quote_ident(pk))
    }

    fn upsert_clause(&self, pk: &str, update_columns: &[&str]) -> String {
        let sets = conflict_targets(pk, update_columns)
            .map(|col| {
                let q = self.quote_ident(col);
                format!("{} = EXCLUDED.{}", q, q)
            })
            .collect::<Vec<_>>();
        format!(
            " ON CONFLICT ({}) DO UPDATE SET {}",
            self.quote_ident(pk),
            sets.join(", ")
        )
    }
}

// A table with nothing but its key still needs a valid (no-op) update list.
fn conflict_targets<'c>(pk: &'c str, update_columns: &'c [&'c str]) -> impl Iterator<Item = &'c str> {
    let fallback = if update_columns.is_empty() { Some(pk) } else { None };
    update_columns.iter().copied().chain(fallback)
}

/// Rewrites every `?` in `sql` into the dialect's positional placeholder,
/// numbering left to right.
///
/// Statements are authored with `?` throughout; this is the single pass that
/// makes them dialect specific. For [`MySqlDialect`] the output equals the input.
pub fn rewrite_placeholders(dialect: &dyn Dialect, sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut index = 1;
    for ch in sql.chars() {
        if ch == '?' {
            out.push_str(&dialect.placeholder(index));
            index += 1;
        } else {
            out.push(ch);
        }
    }
    out
}

/// An sqlx driver the engine can execute against.
///
/// The backend only moves bytes: binding [`BindValue`]s, running statements and
/// reading the driver's result signals. SQL text comes from the [`Dialect`].
pub trait Backend: Database + Sized {
    /// Returns the number of rows affected by a statement.
    fn rows_affected(res: &Self::QueryResult) -> u64;

    /// Returns the last auto-generated id, if the driver reports one.
    fn last_insert_id(res: &Self::QueryResult) -> Option<i64>;

    /// Maps the id reported after a multi-row INSERT of `rows` rows to the id
    /// of the first inserted row.
    fn first_batch_id(reported: i64, _rows: usize) -> i64 {
        reported
    }

    /// Reads the first column of `row` as an integer (COUNT(*) and RETURNING keys).
    fn scalar_i64(row: &Self::Row) -> Result<i64, sqlx::Error>;

    /// Runs `sql` with `args` and collects every row.
    fn fetch_all<'c>(
        conn: &'c mut Self::Connection,
        sql: &'c str,
        args: Vec<BindValue>,
    ) -> BoxFuture<'c, Result<Vec<Self::Row>, sqlx::Error>>;

    /// Runs `sql` with `args` for its side effects.
    fn execute<'c>(
        conn: &'c mut Self::Connection,
        sql: &'c str,
        args: Vec<BindValue>,
    ) -> BoxFuture<'c, Result<Self::QueryResult, sqlx::Error>>;
}

#[inline(always)]
fn bind_value<'q, DB>(
    query: sqlx::query::Query<'q, DB, <DB as Database>::Arguments<'q>>,
    value: BindValue,
) -> sqlx::query::Query<'q, DB, <DB as Database>::Arguments<'q>>
where
    DB: Database,
    String: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
    i64: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
    f64: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
    bool: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
    uuid::Uuid: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
    chrono::DateTime<chrono::Utc>: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
    Option<String>: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
{
    match value {
        BindValue::String(v) => query.bind(v),
        BindValue::I64(v) => query.bind(v),
        BindValue::F64(v) => query.bind(v),
        BindValue::Bool(v) => query.bind(v),
        BindValue::Uuid(v) => query.bind(v),
        BindValue::DateTime(v) => query.bind(v),
        BindValue::Null => query.bind(Option::<String>::None),
    }
}

#[allow(dead_code)] // unused when every driver feature is off
fn bind_all<'q, DB>(
    sql: &'q str,
    args: Vec<BindValue>,
) -> sqlx::query::Query<'q, DB, <DB as Database>::Arguments<'q>>
where
    DB: Database,
    String: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
    i64: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
    f64: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
    bool: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
    uuid::Uuid: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
    chrono::DateTime<chrono::Utc>: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
    Option<String>: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
{
    args.into_iter()
        .fold(sqlx::query::<DB>(sql), bind_value::<DB>)
}

#[cfg(feature = "sqlite")]
impl Backend for sqlx::Sqlite {
    fn rows_affected(res: &sqlx::sqlite::SqliteQueryResult) -> u64 {
        res.rows_affected()
    }

    fn last_insert_id(res: &sqlx::sqlite::SqliteQueryResult) -> Option<i64> {
        Some(res.last_insert_rowid())
    }

    // SQLite reports the rowid of the last row of the statement.
    fn first_batch_id(reported: i64, rows: usize) -> i64 {
        let earlier = i64::try_from(rows.saturating_sub(1)).unwrap_or(0);
        reported - earlier
    }

    fn scalar_i64(row: &sqlx::sqlite::SqliteRow) -> Result<i64, sqlx::Error> {
        use sqlx::Row;
        row.try_get::<i64, _>(0)
    }

    fn fetch_all<'c>(
        conn: &'c mut sqlx::SqliteConnection,
        sql: &'c str,
        args: Vec<BindValue>,
    ) -> BoxFuture<'c, Result<Vec<sqlx::sqlite::SqliteRow>, sqlx::Error>> {
        Box::pin(bind_all::<Self>(sql, args).fetch_all(conn))
    }

    fn execute<'c>(
        conn: &'c mut sqlx::SqliteConnection,
        sql: &'c str,
        args: Vec<BindValue>,
    ) -> BoxFuture<'c, Result<sqlx::sqlite::SqliteQueryResult, sqlx::Error>> {
        Box::pin(bind_all::<Self>(sql, args).execute(conn))
    }
}

#[cfg(feature = "postgres")]
impl Backend for sqlx::Postgres {
    fn rows_affected(res: &sqlx::postgres::PgQueryResult) -> u64 {
        res.rows_affected()
    }

    fn last_insert_id(_res: &sqlx::postgres::PgQueryResult) -> Option<i64> {
        None
    }

    fn scalar_i64(row: &sqlx::postgres::PgRow) -> Result<i64, sqlx::Error> {
        use sqlx::Row;
        // SERIAL keys are INT4, BIGSERIAL keys and COUNT(*) are INT8.
        row.try_get::<i64, _>(0)
            .or_else(|_| row.try_get::<i32, _>(0).map(i64::from))
    }

    fn fetch_all<'c>(
        conn: &'c mut sqlx::postgres::PgConnection,
        sql: &'c str,
        args: Vec<BindValue>,
    ) -> BoxFuture<'c, Result<Vec<sqlx::postgres::PgRow>, sqlx::Error>> {
        Box::pin(bind_all::<Self>(sql, args).fetch_all(conn))
    }

    fn execute<'c>(
        conn: &'c mut sqlx::postgres::PgConnection,
        sql: &'c str,
        args: Vec<BindValue>,
    ) -> BoxFuture<'c, Result<sqlx::postgres::PgQueryResult, sqlx::Error>> {
        Box::pin(bind_all::<Self>(sql, args).execute(conn))
    }
}

#[cfg(feature = "mysql")]
impl Backend for sqlx::MySql {
    fn rows_affected(res: &sqlx::mysql::MySqlQueryResult) -> u64 {
        res.rows_affected()
    }

    fn last_insert_id(res: &sqlx::mysql::MySqlQueryResult) -> Option<i64> {
        i64::try_from(res.last_insert_id()).ok()
    }

    fn scalar_i64(row: &sqlx::mysql::MySqlRow) -> Result<i64, sqlx::Error> {
        use sqlx::Row;
        row.try_get::<i64, _>(0)
            .or_else(|_| row.try_get::<i32, _>(0).map(i64::from))
    }

    fn fetch_all<'c>(
        conn: &'c mut sqlx::mysql::MySqlConnection,
        sql: &'c str,
        args: Vec<BindValue>,
    ) -> BoxFuture<'c, Result<Vec<sqlx::mysql::MySqlRow>, sqlx::Error>> {
        Box::pin(bind_all::<Self>(sql, args).fetch_all(conn))
    }

    fn execute<'c>(
        conn: &'c mut sqlx::mysql::MySqlConnection,
        sql: &'c str,
        args: Vec<BindValue>,
    ) -> BoxFuture<'c, Result<sqlx::mysql::MySqlQueryResult, sqlx::Error>> {
        Box::pin(bind_all::<Self>(sql, args).execute(conn))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mysql_placeholder_ignores_index() {
        assert_eq!(MYSQL.placeholder(1), "?");
        assert_eq!(MYSQL.placeholder(42), "?");
    }

    #[test]
    fn postgres_placeholder_is_numbered() {
        assert_eq!(POSTGRES.placeholder(1), "$1");
        assert_eq!(POSTGRES.placeholder(12), "$12");
    }

    #[test]
    fn quoting_escapes_embedded_quotes() {
        assert_eq!(MYSQL.quote_ident("order"), "`order`");
        assert_eq!(MYSQL.quote_ident("we`ird"), "`we``ird`");
        assert_eq!(POSTGRES.quote_ident("user"), "\"user\"");
        assert_eq!(POSTGRES.quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn returning_support() {
        assert!(!MYSQL.use_returning());
        assert_eq!(MYSQL.returning_clause("id"), "");
        assert!(POSTGRES.use_returning());
        assert_eq!(POSTGRES.returning_clause("id"), " RETURNING \"id\"");
    }

    #[test]
    fn upsert_clauses_diverge_per_dialect() {
        assert_eq!(
            MYSQL.upsert_clause("id", &["name", "email"]),
            " ON DUPLICATE KEY UPDATE `name` = VALUES(`name`), `email` = VALUES(`email`)"
        );
        assert_eq!(
            POSTGRES.upsert_clause("id", &["name"]),
            " ON CONFLICT (\"id\") DO UPDATE SET \"name\" = EXCLUDED.\"name\""
        );
    }

    #[test]
    fn upsert_clause_without_columns_is_a_noop_update() {
        assert_eq!(
            POSTGRES.upsert_clause("id", &[]),
            " ON CONFLICT (\"id\") DO UPDATE SET \"id\" = EXCLUDED.\"id\""
        );
        assert_eq!(
            MYSQL.upsert_clause("id", &[]),
            " ON DUPLICATE KEY UPDATE `id` = VALUES(`id`)"
        );
    }

    #[test]
    fn rewrite_is_identity_for_mysql() {
        let sql = "SELECT * FROM t WHERE a = ? AND b IN (?, ?)";
        assert_eq!(rewrite_placeholders(&MYSQL, sql), sql);
    }

    #[test]
    fn rewrite_numbers_left_to_right_for_postgres() {
        let sql = "UPDATE t SET a = ?, b = ? WHERE id = ?";
        assert_eq!(
            rewrite_placeholders(&POSTGRES, sql),
            "UPDATE t SET a = $1, b = $2 WHERE id = $3"
        );
    }
}

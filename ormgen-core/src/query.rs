use crate::dialect::{Backend, rewrite_placeholders};
use crate::error::{OrmError, OrmResult};
use crate::executor::Executor;
use crate::model::{JoinConfig, Model, Preloader, Relations};
use crate::scope::{Applier, Scope};
use crate::value::BindValue;
use std::fmt::Write;
use std::marker::PhantomData;
use std::sync::Arc;

/// A rendered statement: dialect-specific SQL and its positional arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub args: Vec<BindValue>,
}

#[derive(Debug, Clone)]
struct WhereClause {
    clause: String,
    args: Vec<BindValue>,
}

/// An immutable query over the table of `T`.
///
/// Every builder method takes `&self` and returns a new `Query`; the receiver
/// is never modified, so a base query can be cloned, shared across tasks and
/// refined independently:
///
/// ```no_run
/// # use ormgen_core::prelude::*;
/// # async fn demo<U: Model<sqlx::Sqlite>>(db: &Db<sqlx::Sqlite>) -> OrmResult<()> {
/// let adults = U::find(db).filter("age >= ?", [18]);
/// let newest = adults.order_by("created_at DESC").limit(10);
/// let total = adults.count().await?;
/// let page = newest.all().await?;
/// # let _ = (total, page);
/// # Ok(())
/// # }
/// ```
pub struct Query<'a, T, DB: Backend> {
    executor: Executor<'a, DB>,
    relations: Arc<Relations<T, DB>>,
    wheres: Vec<WhereClause>,
    order_bys: Vec<String>,
    select: Option<String>,
    limit: Option<u64>,
    offset: Option<u64>,
    joins: Vec<String>,
    join_columns: Vec<String>,
    preloads: Vec<String>,
    unknown_joins: Vec<String>,
    _marker: PhantomData<fn() -> T>,
}

impl<T, DB: Backend> Clone for Query<'_, T, DB> {
    fn clone(&self) -> Self {
        Self {
            executor: self.executor,
            relations: Arc::clone(&self.relations),
            wheres: self.wheres.clone(),
            order_bys: self.order_bys.clone(),
            select: self.select.clone(),
            limit: self.limit,
            offset: self.offset,
            joins: self.joins.clone(),
            join_columns: self.join_columns.clone(),
            preloads: self.preloads.clone(),
            unknown_joins: self.unknown_joins.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T, DB: Backend> std::fmt::Debug for Query<'_, T, DB> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("executor", &self.executor)
            .field("wheres", &self.wheres)
            .field("order_bys", &self.order_bys)
            .field("select", &self.select)
            .field("limit", &self.limit)
            .field("offset", &self.offset)
            .field("joins", &self.joins)
            .field("preloads", &self.preloads)
            .finish()
    }
}

impl<'a, T, DB> Query<'a, T, DB>
where
    DB: Backend,
    T: Model<DB>,
{
    /// Creates a query with the model's registered relations.
    pub fn new(executor: Executor<'a, DB>) -> Self {
        Self {
            executor,
            relations: Arc::new(T::relations()),
            wheres: Vec::with_capacity(4),
            order_bys: Vec::new(),
            select: None,
            limit: None,
            offset: None,
            joins: Vec::new(),
            join_columns: Vec::new(),
            preloads: Vec::new(),
            unknown_joins: Vec::new(),
            _marker: PhantomData,
        }
    }

    pub fn executor(&self) -> Executor<'a, DB> {
        self.executor
    }

    /// Adds a predicate; predicates are AND-joined in insertion order.
    pub fn filter<I, V>(&self, clause: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<BindValue>,
    {
        let mut q = self.clone();
        q.wheres.push(WhereClause {
            clause: clause.into(),
            args: args.into_iter().map(Into::into).collect(),
        });
        q
    }

    pub fn order_by(&self, clause: impl Into<String>) -> Self {
        let mut q = self.clone();
        q.order_bys.push(clause.into());
        q
    }

    pub fn limit(&self, n: u64) -> Self {
        let mut q = self.clone();
        q.limit = Some(n);
        q
    }

    pub fn offset(&self, n: u64) -> Self {
        let mut q = self.clone();
        q.offset = Some(n);
        q
    }

    /// Replaces the column list verbatim.
    pub fn select(&self, columns: impl Into<String>) -> Self {
        let mut q = self.clone();
        q.select = Some(columns.into());
        q
    }

    pub fn join(&self, name: &str) -> Self {
        let mut q = self.clone();
        q.add_join("INNER", name);
        q
    }

    pub fn left_join(&self, name: &str) -> Self {
        let mut q = self.clone();
        q.add_join("LEFT", name);
        q
    }

    /// Requests eager loading of a registered relation after the main query.
    pub fn preload(&self, name: impl Into<String>) -> Self {
        let mut q = self.clone();
        q.preloads.push(name.into());
        q
    }

    pub fn scopes<'s>(&self, scopes: impl IntoIterator<Item = &'s Scope>) -> Self {
        let mut q = self.clone();
        for scope in scopes {
            scope.apply(&mut q);
        }
        q
    }

    /// Returns a query whose registry has `name` bound to `config`.
    pub fn register_join(&self, name: impl Into<String>, config: JoinConfig) -> Self {
        let mut q = self.clone();
        Arc::make_mut(&mut q.relations).insert_join(name.into(), config);
        q
    }

    /// Returns a query whose registry has `name` bound to `preload`.
    pub fn register_preloader(&self, name: impl Into<String>, preload: Preloader<T, DB>) -> Self {
        let mut q = self.clone();
        Arc::make_mut(&mut q.relations).insert_preloader(name.into(), preload);
        q
    }

    fn qi(&self, name: &str) -> String {
        self.executor.dialect().quote_ident(name)
    }

    fn quote_columns(&self, columns: &[&str]) -> String {
        columns
            .iter()
            .map(|c| self.qi(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn add_join(&mut self, kind: &str, name: &str) {
        let Some(config) = self.relations.get_join(name).cloned() else {
            self.unknown_joins.push(name.to_owned());
            return;
        };
        let target = self.qi(config.target_table);
        self.joins.push(format!(
            "{} JOIN {} ON {}.{} = {}.{}",
            kind,
            target,
            target,
            self.qi(config.target_column),
            self.qi(config.source_table),
            self.qi(config.source_column),
        ));
        for col in config.select_columns {
            self.join_columns.push(format!(
                "{}.{} AS {}",
                target,
                self.qi(col),
                self.qi(&format!("{}__{}", name, col)),
            ));
        }
    }

    fn check_relations(&self) -> OrmResult<()> {
        if let Some(name) = self.unknown_joins.first() {
            return Err(OrmError::UnknownRelation(name.clone()));
        }
        for name in &self.preloads {
            if self.relations.get_preloader(name).is_none() {
                return Err(OrmError::UnknownRelation(name.clone()));
            }
        }
        Ok(())
    }

    fn rewrite(&self, sql: String, args: Vec<BindValue>) -> Statement {
        Statement {
            sql: rewrite_placeholders(self.executor.dialect(), &sql),
            args,
        }
    }

    fn render_columns(&self, sql: &mut String) {
        if let Some(select) = &self.select {
            sql.push_str(select);
            return;
        }
        if self.joins.is_empty() {
            sql.push_str(&self.quote_columns(T::columns()));
            return;
        }
        let table = self.qi(T::table_name());
        let mut cols = T::columns()
            .iter()
            .map(|c| format!("{}.{}", table, self.qi(c)))
            .collect::<Vec<_>>();
        cols.extend(self.join_columns.iter().cloned());
        sql.push_str(&cols.join(", "));
    }

    fn render_joins(&self, sql: &mut String) {
        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join);
        }
    }

    fn render_where(&self, sql: &mut String, args: &mut Vec<BindValue>) {
        for (i, w) in self.wheres.iter().enumerate() {
            sql.push_str(if i == 0 { " WHERE " } else { " AND " });
            sql.push_str(&w.clause);
            args.extend(w.args.iter().cloned());
        }
    }

    fn render_page(&self, sql: &mut String) {
        if let Some(limit) = self.limit {
            let _ = write!(sql, " LIMIT {}", limit);
        }
        if let Some(offset) = self.offset {
            let _ = write!(sql, " OFFSET {}", offset);
        }
    }

    /// Returns the SELECT statement [`all`](Self::all) would run.
    pub fn to_sql(&self) -> Statement {
        let mut sql = String::with_capacity(128);
        let mut args = Vec::new();
        sql.push_str("SELECT ");
        self.render_columns(&mut sql);
        sql.push_str(" FROM ");
        sql.push_str(&self.qi(T::table_name()));
        self.render_joins(&mut sql);
        self.render_where(&mut sql, &mut args);
        if !self.order_bys.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order_bys.join(", "));
        }
        self.render_page(&mut sql);
        self.rewrite(sql, args)
    }

    /// Returns the COUNT statement [`count`](Self::count) would run.
    pub fn to_count_sql(&self) -> Statement {
        let mut sql = String::with_capacity(96);
        let mut args = Vec::new();
        sql.push_str("SELECT COUNT(*) FROM ");
        sql.push_str(&self.qi(T::table_name()));
        self.render_joins(&mut sql);
        self.render_where(&mut sql, &mut args);
        self.render_page(&mut sql);
        self.rewrite(sql, args)
    }

    /// Returns the DELETE statement [`delete`](Self::delete) would run.
    pub fn to_delete_sql(&self) -> Statement {
        let mut sql = String::with_capacity(96);
        let mut args = Vec::new();
        sql.push_str("DELETE FROM ");
        sql.push_str(&self.qi(T::table_name()));
        self.render_where(&mut sql, &mut args);
        self.rewrite(sql, args)
    }

    /// Returns the bulk UPDATE statement [`updates`](Self::updates) would run.
    ///
    /// Registered updated-at columns not present in `values` are set to the
    /// executor clock's current time.
    pub fn to_updates_sql(&self, values: &serde_json::Value) -> OrmResult<Statement> {
        let obj = values.as_object().ok_or_else(|| {
            OrmError::UnsupportedValue("bulk update requires a JSON object".to_owned())
        })?;

        let mut sets = Vec::with_capacity(obj.len() + 1);
        let mut args = Vec::with_capacity(obj.len() + self.wheres.len() + 1);
        for (column, value) in obj {
            sets.push(format!("{} = ?", self.qi(column)));
            args.push(BindValue::try_from(value)?);
        }
        let now = self.executor.clock().now();
        for column in T::timestamps().updated_columns() {
            if !obj.contains_key(*column) {
                sets.push(format!("{} = ?", self.qi(column)));
                args.push(BindValue::from(now));
            }
        }
        if sets.is_empty() {
            return Err(OrmError::UnsupportedValue(
                "bulk update requires at least one column".to_owned(),
            ));
        }

        let mut sql = format!("UPDATE {} SET {}", self.qi(T::table_name()), sets.join(", "));
        self.render_where(&mut sql, &mut args);
        Ok(self.rewrite(sql, args))
    }

    fn insert_sql(&self, columns: &[&str], rows: usize) -> String {
        let one_row = format!("({})", vec!["?"; columns.len()].join(", "));
        format!(
            "INSERT INTO {} ({}) VALUES {}",
            self.qi(T::table_name()),
            self.quote_columns(columns),
            vec![one_row; rows].join(", "),
        )
    }

    fn upsert_sql(&self, columns: &[&str]) -> String {
        let pk = T::primary_key();
        let created = T::timestamps().created_columns();
        let update_columns = columns
            .iter()
            .copied()
            .filter(|c| *c != pk && !created.contains(c))
            .collect::<Vec<_>>();
        let mut sql = rewrite_placeholders(self.executor.dialect(), &self.insert_sql(columns, 1));
        sql.push_str(&self.executor.dialect().upsert_clause(pk, &update_columns));
        sql
    }

    fn update_sql(&self, set_columns: &[&str]) -> String {
        let sets = set_columns
            .iter()
            .map(|c| format!("{} = ?", self.qi(c)))
            .collect::<Vec<_>>();
        format!(
            "UPDATE {} SET {} WHERE {} = ?",
            self.qi(T::table_name()),
            sets.join(", "),
            self.qi(T::primary_key()),
        )
    }

    fn decode(rows: &[DB::Row]) -> OrmResult<Vec<T>> {
        rows.iter()
            .map(|row| T::from_row(row).map_err(OrmError::from))
            .collect()
    }

    /// Runs the SELECT, decodes every row and then runs the requested
    /// preloads in order.
    #[tracing::instrument(skip(self), fields(table = T::table_name()))]
    pub async fn all(&self) -> OrmResult<Vec<T>> {
        self.check_relations()?;
        let stmt = self.to_sql();
        let rows = self
            .executor
            .fetch_all("select", T::table_name(), &stmt.sql, stmt.args)
            .await?;
        let mut results = Self::decode(&rows)?;
        drop(rows);

        for name in &self.preloads {
            let preload = self
                .relations
                .get_preloader(name)
                .ok_or_else(|| OrmError::UnknownRelation(name.clone()))?;
            preload(self.executor, &mut results).await?;
        }
        Ok(results)
    }

    /// Runs the query with `LIMIT 1`; no match is [`OrmError::NotFound`].
    #[tracing::instrument(skip(self), fields(table = T::table_name()))]
    pub async fn first(&self) -> OrmResult<T> {
        self.limit(1)
            .all()
            .await?
            .into_iter()
            .next()
            .ok_or(OrmError::NotFound)
    }

    /// Counts matching rows. A page bound that skips the single COUNT row
    /// yields zero.
    #[tracing::instrument(skip(self), fields(table = T::table_name()))]
    pub async fn count(&self) -> OrmResult<i64> {
        self.check_relations()?;
        let stmt = self.to_count_sql();
        let rows = self
            .executor
            .fetch_all("count", T::table_name(), &stmt.sql, stmt.args)
            .await?;
        match rows.first() {
            Some(row) => Ok(DB::scalar_i64(row)?),
            None => Ok(0),
        }
    }

    #[tracing::instrument(skip(self), fields(table = T::table_name()))]
    pub async fn exists(&self) -> OrmResult<bool> {
        Ok(self.limit(1).count().await? > 0)
    }

    /// Inserts `row`.
    ///
    /// Timestamps are filled first. When the model has a key setter the key
    /// column is left to the database and the generated value is written back,
    /// read from RETURNING or the driver's last-insert-id depending on the
    /// dialect.
    #[tracing::instrument(skip(self, row), fields(table = T::table_name()))]
    pub async fn create(&self, row: &mut T) -> OrmResult<()> {
        self.check_relations()?;
        let now = self.executor.clock().now();
        let timestamps = T::timestamps();
        timestamps.touch_created(row, now);
        timestamps.touch_updated(row, now);

        let setter = T::key_setter();
        let (columns, values) = row.column_values(setter.is_none());
        let dialect = self.executor.dialect();
        let mut stmt = self.rewrite(self.insert_sql(&columns, 1), values);

        if let (true, Some(set_key)) = (dialect.use_returning(), setter) {
            stmt.sql.push_str(&dialect.returning_clause(T::primary_key()));
            let rows = self
                .executor
                .fetch_all("create", T::table_name(), &stmt.sql, stmt.args)
                .await?;
            let first = rows.first().ok_or(OrmError::MissingReturning {
                expected: 1,
                returned: 0,
            })?;
            set_key(row, DB::scalar_i64(first)?);
            return Ok(());
        }

        let res = self
            .executor
            .execute("create", T::table_name(), &stmt.sql, stmt.args)
            .await?;
        if let Some(set_key) = setter {
            let id = res.last_insert_id.ok_or(OrmError::MissingInsertId)?;
            set_key(row, id);
        }
        Ok(())
    }

    /// Inserts every row with a single multi-row INSERT.
    ///
    /// With RETURNING, keys are assigned positionally and the statement must
    /// return one row per input. Without it, keys are derived from the first
    /// generated id plus the row offset, which assumes the database hands out
    /// contiguous auto-increment values for one statement.
    #[tracing::instrument(skip(self, rows), fields(table = T::table_name(), rows = rows.len()))]
    pub async fn create_all(&self, rows: &mut [T]) -> OrmResult<()> {
        self.check_relations()?;
        if rows.is_empty() {
            return Ok(());
        }
        let now = self.executor.clock().now();
        let timestamps = T::timestamps();
        for row in rows.iter_mut() {
            timestamps.touch_created(row, now);
            timestamps.touch_updated(row, now);
        }

        let setter = T::key_setter();
        let include_pk = setter.is_none();
        let (columns, _) = rows[0].column_values(include_pk);
        let mut args = Vec::with_capacity(columns.len() * rows.len());
        for row in rows.iter() {
            let (_, values) = row.column_values(include_pk);
            args.extend(values);
        }
        let dialect = self.executor.dialect();
        let mut stmt = self.rewrite(self.insert_sql(&columns, rows.len()), args);

        if let (true, Some(set_key)) = (dialect.use_returning(), setter) {
            stmt.sql.push_str(&dialect.returning_clause(T::primary_key()));
            let returned = self
                .executor
                .fetch_all("create_all", T::table_name(), &stmt.sql, stmt.args)
                .await?;
            if returned.len() != rows.len() {
                return Err(OrmError::MissingReturning {
                    expected: rows.len(),
                    returned: returned.len(),
                });
            }
            for (row, key_row) in rows.iter_mut().zip(&returned) {
                set_key(row, DB::scalar_i64(key_row)?);
            }
            return Ok(());
        }

        let res = self
            .executor
            .execute("create_all", T::table_name(), &stmt.sql, stmt.args)
            .await?;
        if let Some(set_key) = setter {
            let id = res.last_insert_id.ok_or(OrmError::MissingInsertId)?;
            let first = DB::first_batch_id(id, rows.len());
            for (offset, row) in (0_i64..).zip(rows.iter_mut()) {
                set_key(row, first + offset);
            }
        }
        Ok(())
    }

    /// Inserts `row` or, on primary-key conflict, overwrites every non-key
    /// column except the created-at timestamps. The key must already be set.
    #[tracing::instrument(skip(self, row), fields(table = T::table_name()))]
    pub async fn upsert(&self, row: &mut T) -> OrmResult<()> {
        self.check_relations()?;
        let now = self.executor.clock().now();
        let timestamps = T::timestamps();
        timestamps.touch_created(row, now);
        timestamps.touch_updated(row, now);

        let (columns, values) = row.column_values(true);
        let dialect = self.executor.dialect();
        let mut sql = self.upsert_sql(&columns);

        if let (true, Some(set_key)) = (dialect.use_returning(), T::key_setter()) {
            sql.push_str(&dialect.returning_clause(T::primary_key()));
            let rows = self
                .executor
                .fetch_all("upsert", T::table_name(), &sql, values)
                .await?;
            let first = rows.first().ok_or(OrmError::MissingReturning {
                expected: 1,
                returned: 0,
            })?;
            set_key(row, DB::scalar_i64(first)?);
            return Ok(());
        }

        self.executor
            .execute("upsert", T::table_name(), &sql, values)
            .await?;
        Ok(())
    }

    /// Writes every non-key column of `row` to the row with the same key and
    /// returns the number of rows affected.
    #[tracing::instrument(skip(self, row), fields(table = T::table_name()))]
    pub async fn update(&self, row: &mut T) -> OrmResult<u64> {
        self.check_relations()?;
        let pk = T::primary_key();
        let (columns, values) = row.column_values(true);
        let key_is_set = columns
            .iter()
            .zip(&values)
            .any(|(c, v)| *c == pk && !v.is_zero());
        if !key_is_set {
            return Err(OrmError::MissingPrimaryKey);
        }

        T::timestamps().touch_updated(row, self.executor.clock().now());
        let (columns, values) = row.column_values(true);

        let mut set_columns = Vec::with_capacity(columns.len());
        let mut args = Vec::with_capacity(values.len());
        let mut key = BindValue::Null;
        for (column, value) in columns.into_iter().zip(values) {
            if column == pk {
                key = value;
            } else {
                set_columns.push(column);
                args.push(value);
            }
        }
        if set_columns.is_empty() {
            return Ok(0);
        }
        args.push(key);

        let stmt = self.rewrite(self.update_sql(&set_columns), args);
        let res = self
            .executor
            .execute("update", T::table_name(), &stmt.sql, stmt.args)
            .await?;
        Ok(res.rows_affected)
    }

    /// Deletes every matching row and returns how many were removed.
    /// Refuses to run without a predicate.
    #[tracing::instrument(skip(self), fields(table = T::table_name()))]
    pub async fn delete(&self) -> OrmResult<u64> {
        if self.wheres.is_empty() {
            return Err(OrmError::MissingWhere { operation: "Delete" });
        }
        self.check_relations()?;
        let stmt = self.to_delete_sql();
        let res = self
            .executor
            .execute("delete", T::table_name(), &stmt.sql, stmt.args)
            .await?;
        Ok(res.rows_affected)
    }

    /// Sets the given columns on every matching row and returns how many
    /// were changed. Refuses to run without a predicate.
    ///
    /// ```no_run
    /// # use ormgen_core::prelude::*;
    /// # async fn demo<U: Model<sqlx::Sqlite>>(db: &Db<sqlx::Sqlite>) -> OrmResult<()> {
    /// let changed = U::find(db)
    ///     .filter("last_seen < ?", ["2024-01-01"])
    ///     .updates(&serde_json::json!({ "active": false }))
    ///     .await?;
    /// # let _ = changed;
    /// # Ok(())
    /// # }
    /// ```
    #[tracing::instrument(skip(self, values), fields(table = T::table_name()))]
    pub async fn updates(&self, values: &serde_json::Value) -> OrmResult<u64> {
        if self.wheres.is_empty() {
            return Err(OrmError::MissingWhere { operation: "Updates" });
        }
        self.check_relations()?;
        let stmt = self.to_updates_sql(values)?;
        let res = self
            .executor
            .execute("updates", T::table_name(), &stmt.sql, stmt.args)
            .await?;
        Ok(res.rows_affected)
    }
}

impl<T, DB> Applier for Query<'_, T, DB>
where
    DB: Backend,
    T: Model<DB>,
{
    fn apply_where(&mut self, clause: &str, args: &[BindValue]) {
        self.wheres.push(WhereClause {
            clause: clause.to_owned(),
            args: args.to_vec(),
        });
    }

    fn apply_order_by(&mut self, clause: &str) {
        self.order_bys.push(clause.to_owned());
    }

    fn apply_limit(&mut self, n: u64) {
        self.limit = Some(n);
    }

    fn apply_offset(&mut self, n: u64) {
        self.offset = Some(n);
    }

    fn apply_select(&mut self, columns: &str) {
        self.select = Some(columns.to_owned());
    }

    fn apply_join(&mut self, name: &str) {
        self.add_join("INNER", name);
    }

    fn apply_left_join(&mut self, name: &str) {
        self.add_join("LEFT", name);
    }

    fn apply_preload(&mut self, name: &str) {
        self.preloads.push(name.to_owned());
    }
}

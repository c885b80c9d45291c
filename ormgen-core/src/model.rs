use crate::dialect::Backend;
use crate::error::OrmResult;
use crate::executor::{Executor, IntoExecutor};
use crate::query::Query;
use crate::value::BindValue;
use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use sqlx::FromRow;

/// Metadata needed to render a JOIN clause at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinConfig {
    pub target_table: &'static str,
    pub target_column: &'static str,
    pub source_table: &'static str,
    pub source_column: &'static str,
    /// Target columns projected into the main row as `Name__column`.
    pub select_columns: &'static [&'static str],
}

/// How a relation links two tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    HasMany,
    HasOne,
    BelongsTo,
    ManyToMany {
        join_table: &'static str,
        /// Column in the join table that points at the target table.
        references: &'static str,
    },
}

/// A relation declared on a model.
///
/// For `HasMany`/`HasOne` the foreign key lives on the target table; for
/// `BelongsTo` it lives on the source; for `ManyToMany` it is the join-table
/// column pointing back at the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub name: &'static str,
    pub kind: RelationKind,
    pub target_table: &'static str,
    pub foreign_key: &'static str,
    pub target_key: &'static str,
    pub select_columns: &'static [&'static str],
}

impl Relation {
    pub fn has_many(name: &'static str, target_table: &'static str, foreign_key: &'static str) -> Self {
        Self::new(name, RelationKind::HasMany, target_table, foreign_key)
    }

    pub fn has_one(name: &'static str, target_table: &'static str, foreign_key: &'static str) -> Self {
        Self::new(name, RelationKind::HasOne, target_table, foreign_key)
    }

    pub fn belongs_to(name: &'static str, target_table: &'static str, foreign_key: &'static str) -> Self {
        Self::new(name, RelationKind::BelongsTo, target_table, foreign_key)
    }

    pub fn many_to_many(
        name: &'static str,
        target_table: &'static str,
        join_table: &'static str,
        foreign_key: &'static str,
        references: &'static str,
    ) -> Self {
        Self::new(
            name,
            RelationKind::ManyToMany {
                join_table,
                references,
            },
            target_table,
            foreign_key,
        )
    }

    fn new(
        name: &'static str,
        kind: RelationKind,
        target_table: &'static str,
        foreign_key: &'static str,
    ) -> Self {
        Self {
            name,
            kind,
            target_table,
            foreign_key,
            target_key: "id",
            select_columns: &[],
        }
    }

    /// Overrides the referenced key column on the target (default `id`).
    pub fn target_key(mut self, column: &'static str) -> Self {
        self.target_key = column;
        self
    }

    pub fn select_columns(mut self, columns: &'static [&'static str]) -> Self {
        self.select_columns = columns;
        self
    }

    /// Derives the JOIN metadata for this relation when joined from
    /// `source_table`. Many-to-many relations are not joinable.
    pub fn join_config(&self, source_table: &'static str, source_pk: &'static str) -> Option<JoinConfig> {
        let (target_column, source_column) = match self.kind {
            RelationKind::HasMany | RelationKind::HasOne => (self.foreign_key, source_pk),
            RelationKind::BelongsTo => (self.target_key, self.foreign_key),
            RelationKind::ManyToMany { .. } => return None,
        };
        Some(JoinConfig {
            target_table: self.target_table,
            target_column,
            source_table,
            source_column,
            select_columns: self.select_columns,
        })
    }
}

/// A registered eager-loading function.
///
/// It receives the executor of the main query and every decoded row, and
/// must fill the relation field on each row with a bounded number of queries.
pub type Preloader<T, DB> =
    for<'e> fn(Executor<'e, DB>, &'e mut [T]) -> BoxFuture<'e, OrmResult<()>>;

/// Name-to-definition registries for joins and preloaders.
pub struct Relations<T, DB: Backend> {
    joins: Vec<(String, JoinConfig)>,
    preloaders: Vec<(String, Preloader<T, DB>)>,
}

impl<T, DB: Backend> Clone for Relations<T, DB> {
    fn clone(&self) -> Self {
        Self {
            joins: self.joins.clone(),
            preloaders: self.preloaders.clone(),
        }
    }
}

impl<T, DB: Backend> Default for Relations<T, DB> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, DB: Backend> std::fmt::Debug for Relations<T, DB> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relations")
            .field("joins", &self.joins)
            .field(
                "preloaders",
                &self.preloaders.iter().map(|(name, _)| name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl<T, DB: Backend> Relations<T, DB> {
    pub fn new() -> Self {
        Self {
            joins: Vec::new(),
            preloaders: Vec::new(),
        }
    }

    pub fn join(mut self, name: impl Into<String>, config: JoinConfig) -> Self {
        self.insert_join(name.into(), config);
        self
    }

    pub fn preloader(mut self, name: impl Into<String>, preload: Preloader<T, DB>) -> Self {
        self.insert_preloader(name.into(), preload);
        self
    }

    /// Registers or replaces a join definition.
    pub fn insert_join(&mut self, name: String, config: JoinConfig) {
        match self.joins.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = config,
            None => self.joins.push((name, config)),
        }
    }

    /// Registers or replaces a preloader.
    pub fn insert_preloader(&mut self, name: String, preload: Preloader<T, DB>) {
        match self.preloaders.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = preload,
            None => self.preloaders.push((name, preload)),
        }
    }

    pub fn get_join(&self, name: &str) -> Option<&JoinConfig> {
        self.joins.iter().find(|(n, _)| n == name).map(|(_, cfg)| cfg)
    }

    pub fn get_preloader(&self, name: &str) -> Option<Preloader<T, DB>> {
        self.preloaders
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, preload)| *preload)
    }
}

impl<T: Model<DB>, DB: Backend> Relations<T, DB> {
    /// Registers the join derived from `relation`, keyed by its name.
    /// Many-to-many relations register nothing.
    pub fn relation(self, relation: &Relation) -> Self {
        match relation.join_config(T::table_name(), T::primary_key()) {
            Some(config) => self.join(relation.name, config),
            None => self,
        }
    }
}

/// Automatic timestamp columns of a model.
///
/// The created-at setter is expected to assign only fields that still hold
/// their zero value; the updated-at setter always assigns.
pub struct Timestamps<T> {
    created: &'static [&'static str],
    set_created: Option<fn(&mut T, DateTime<Utc>)>,
    updated: &'static [&'static str],
    set_updated: Option<fn(&mut T, DateTime<Utc>)>,
}

impl<T> Clone for Timestamps<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Timestamps<T> {}

impl<T> Default for Timestamps<T> {
    fn default() -> Self {
        Self::none()
    }
}

impl<T> std::fmt::Debug for Timestamps<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timestamps")
            .field("created", &self.created)
            .field("updated", &self.updated)
            .finish()
    }
}

impl<T> Timestamps<T> {
    pub const fn none() -> Self {
        Self {
            created: &[],
            set_created: None,
            updated: &[],
            set_updated: None,
        }
    }

    pub fn created(mut self, columns: &'static [&'static str], setter: fn(&mut T, DateTime<Utc>)) -> Self {
        self.created = columns;
        self.set_created = Some(setter);
        self
    }

    pub fn updated(mut self, columns: &'static [&'static str], setter: fn(&mut T, DateTime<Utc>)) -> Self {
        self.updated = columns;
        self.set_updated = Some(setter);
        self
    }

    pub fn created_columns(&self) -> &'static [&'static str] {
        self.created
    }

    pub fn updated_columns(&self) -> &'static [&'static str] {
        self.updated
    }

    pub fn touch_created(&self, row: &mut T, now: DateTime<Utc>) {
        if let Some(set) = self.set_created {
            set(row, now);
        }
    }

    pub fn touch_updated(&self, row: &mut T, now: DateTime<Utc>) {
        if let Some(set) = self.set_updated {
            set(row, now);
        }
    }
}

/// A table-backed type.
///
/// Implementations are normally generated; they describe the table, extract
/// column values without reflection, and register relations and timestamps.
/// Rows are decoded through [`sqlx::FromRow`], matching columns by name.
pub trait Model<DB: Backend>: Sized + Send + Sync + Unpin + 'static
where
    for<'r> Self: FromRow<'r, DB::Row>,
{
    fn table_name() -> &'static str;

    /// Every column, in declaration order.
    fn columns() -> &'static [&'static str];

    fn primary_key() -> &'static str {
        "id"
    }

    /// Column names and their values, in declaration order. The primary key
    /// is left out when `include_pk` is false.
    fn column_values(&self, include_pk: bool) -> (Vec<&'static str>, Vec<BindValue>);

    /// Assigns a database-generated key. `None` means the key is supplied by
    /// the caller and always inserted.
    fn key_setter() -> Option<fn(&mut Self, i64)> {
        None
    }

    fn relations() -> Relations<Self, DB> {
        Relations::new()
    }

    fn timestamps() -> Timestamps<Self> {
        Timestamps::none()
    }

    /// Starts a query against this model's table.
    fn find<'a, E>(executor: E) -> Query<'a, Self, DB>
    where
        E: IntoExecutor<'a, DB = DB>,
    {
        Query::new(executor.into_executor())
    }
}

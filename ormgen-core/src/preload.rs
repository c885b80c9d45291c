//! Batched loaders for registered preload functions.
//!
//! Each loader collects the distinct keys of the parent rows, issues one
//! `IN` query for the related rows (two for many-to-many) and assigns the
//! results back onto the parents. Generated preload functions are thin
//! wrappers around these:
//!
//! ```no_run
//! # use ormgen_core::prelude::*;
//! # use futures_util::future::BoxFuture;
//! # #[derive(sqlx::FromRow, Clone)] struct Post { id: i64, user_id: i64 }
//! # #[derive(sqlx::FromRow)] struct User { id: i64, #[sqlx(skip)] posts: Vec<Post> }
//! # impl Model<sqlx::Sqlite> for Post {
//! #     fn table_name() -> &'static str { "posts" }
//! #     fn columns() -> &'static [&'static str] { &["id", "user_id"] }
//! #     fn column_values(&self, _: bool) -> (Vec<&'static str>, Vec<BindValue>) { (vec![], vec![]) }
//! # }
//! fn preload_user_posts<'e>(
//!     exec: Executor<'e, sqlx::Sqlite>,
//!     users: &'e mut [User],
//! ) -> BoxFuture<'e, OrmResult<()>> {
//!     Box::pin(ormgen_core::preload::has_many(
//!         exec,
//!         users,
//!         "user_id",
//!         |u: &User| u.id,
//!         |p: &Post| p.user_id,
//!         |u: &mut User, posts| u.posts = posts,
//!     ))
//! }
//! ```
//!
//! Any failure aborts the enclosing terminal call; no partially loaded
//! result is returned.

use crate::dialect::Backend;
use crate::error::OrmResult;
use crate::executor::Executor;
use crate::join_table::{group_by_source, query_join_table, unique_targets};
use crate::model::Model;
use crate::scope::Scope;
use crate::value::BindValue;
use sqlx::FromRow;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

fn distinct<K: Eq + Hash + Clone>(keys: impl IntoIterator<Item = K>) -> Vec<K> {
    let mut seen = HashSet::new();
    keys.into_iter().filter(|k| seen.insert(k.clone())).collect()
}

async fn fetch_related<DB, C, K>(
    executor: Executor<'_, DB>,
    column: &str,
    keys: &[K],
) -> OrmResult<Vec<C>>
where
    DB: Backend,
    C: Model<DB>,
    K: Clone + Into<BindValue>,
{
    let column = executor.dialect().quote_ident(column);
    let scope = Scope::is_in(&column, keys.iter().cloned());
    C::find(executor).scopes([&scope]).all().await
}

/// Loads the children whose `foreign_key` column points at each parent.
pub async fn has_many<DB, P, C, K>(
    executor: Executor<'_, DB>,
    parents: &mut [P],
    foreign_key: &str,
    parent_key: fn(&P) -> K,
    child_fk: fn(&C) -> K,
    assign: fn(&mut P, Vec<C>),
) -> OrmResult<()>
where
    DB: Backend,
    P: Send,
    C: Model<DB> + Clone,
    K: Eq + Hash + Clone + Into<BindValue> + Send + Sync,
{
    if parents.is_empty() {
        return Ok(());
    }
    let keys = distinct(parents.iter().map(parent_key));
    let children: Vec<C> = fetch_related(executor, foreign_key, &keys).await?;

    let mut by_fk: HashMap<K, Vec<C>> = HashMap::with_capacity(keys.len());
    for child in children {
        by_fk.entry(child_fk(&child)).or_default().push(child);
    }
    for parent in parents.iter_mut() {
        let group = by_fk.get(&parent_key(parent)).cloned().unwrap_or_default();
        assign(parent, group);
    }
    Ok(())
}

/// Like [`has_many`] but keeps one child per parent. With several matches
/// the last row returned wins; which one that is depends on the database.
pub async fn has_one<DB, P, C, K>(
    executor: Executor<'_, DB>,
    parents: &mut [P],
    foreign_key: &str,
    parent_key: fn(&P) -> K,
    child_fk: fn(&C) -> K,
    assign: fn(&mut P, Option<C>),
) -> OrmResult<()>
where
    DB: Backend,
    P: Send,
    C: Model<DB> + Clone,
    K: Eq + Hash + Clone + Into<BindValue> + Send + Sync,
{
    if parents.is_empty() {
        return Ok(());
    }
    let keys = distinct(parents.iter().map(parent_key));
    let children: Vec<C> = fetch_related(executor, foreign_key, &keys).await?;

    let by_fk: HashMap<K, C> = children
        .into_iter()
        .map(|child| (child_fk(&child), child))
        .collect();
    for parent in parents.iter_mut() {
        let child = by_fk.get(&parent_key(parent)).cloned();
        assign(parent, child);
    }
    Ok(())
}

/// Loads the row each parent's foreign key points at.
///
/// Parents whose key is `None` are skipped and left untouched; required
/// foreign keys are passed as `Some`.
pub async fn belongs_to<DB, P, C, K>(
    executor: Executor<'_, DB>,
    parents: &mut [P],
    target_key: &str,
    parent_fk: fn(&P) -> Option<K>,
    child_key: fn(&C) -> K,
    assign: fn(&mut P, Option<C>),
) -> OrmResult<()>
where
    DB: Backend,
    P: Send,
    C: Model<DB> + Clone,
    K: Eq + Hash + Clone + Into<BindValue> + Send + Sync,
{
    let keys = distinct(parents.iter().filter_map(parent_fk));
    if keys.is_empty() {
        return Ok(());
    }
    let targets: Vec<C> = fetch_related(executor, target_key, &keys).await?;

    let by_key: HashMap<K, C> = targets
        .into_iter()
        .map(|target| (child_key(&target), target))
        .collect();
    for parent in parents.iter_mut() {
        if let Some(fk) = parent_fk(parent) {
            let target = by_key.get(&fk).cloned();
            assign(parent, target);
        }
    }
    Ok(())
}

/// Where a many-to-many relation's association rows live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Through<'t> {
    pub join_table: &'t str,
    /// Association column pointing at the parent.
    pub foreign_key: &'t str,
    /// Association column pointing at the target.
    pub references: &'t str,
    /// Key column on the target table.
    pub target_key: &'t str,
}

/// Loads targets through an association table: one query for the pairs, one
/// for the distinct targets, then each parent receives its targets in pair
/// order. Pairs whose target row is missing are dropped.
pub async fn many_to_many<DB, P, C, K>(
    executor: Executor<'_, DB>,
    parents: &mut [P],
    through: Through<'_>,
    parent_key: fn(&P) -> K,
    child_key: fn(&C) -> K,
    assign: fn(&mut P, Vec<C>),
) -> OrmResult<()>
where
    DB: Backend,
    P: Send,
    C: Model<DB> + Clone,
    K: Eq + Hash + Clone + Into<BindValue> + Send + Sync,
    for<'r> (K, K): FromRow<'r, DB::Row>,
{
    if parents.is_empty() {
        return Ok(());
    }
    let keys = distinct(parents.iter().map(parent_key));
    let pairs = query_join_table::<DB, K, K>(
        executor,
        through.join_table,
        through.foreign_key,
        through.references,
        &keys,
    )
    .await?;

    let target_ids = unique_targets(&pairs);
    let targets: Vec<C> = if target_ids.is_empty() {
        Vec::new()
    } else {
        fetch_related(executor, through.target_key, &target_ids).await?
    };

    let by_key: HashMap<K, C> = targets
        .into_iter()
        .map(|target| (child_key(&target), target))
        .collect();
    let grouped = group_by_source(&pairs);
    for parent in parents.iter_mut() {
        let items: Vec<C> = grouped
            .get(&parent_key(parent))
            .map(|ids| ids.iter().filter_map(|id| by_key.get(id).cloned()).collect())
            .unwrap_or_default();
        assign(parent, items);
    }
    Ok(())
}

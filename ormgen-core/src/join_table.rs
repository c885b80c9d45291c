use crate::dialect::{Backend, rewrite_placeholders};
use crate::error::OrmResult;
use crate::executor::Executor;
use crate::value::BindValue;
use sqlx::FromRow;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// One row of an association table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JoinPair<S, T> {
    pub source: S,
    pub target: T,
}

/// Reads `(source_col, target_col)` pairs from `table` for the given source
/// keys with a single `IN` query. No statement is sent for an empty input.
pub async fn query_join_table<DB, S, T>(
    executor: Executor<'_, DB>,
    table: &str,
    source_col: &str,
    target_col: &str,
    source_ids: &[S],
) -> OrmResult<Vec<JoinPair<S, T>>>
where
    DB: Backend,
    S: Clone + Into<BindValue> + Send + Sync,
    T: Send,
    for<'r> (S, T): FromRow<'r, DB::Row>,
{
    if source_ids.is_empty() {
        return Ok(Vec::new());
    }

    let dialect = executor.dialect();
    let source = dialect.quote_ident(source_col);
    let sql = format!(
        "SELECT {}, {} FROM {} WHERE {} IN ({})",
        source,
        dialect.quote_ident(target_col),
        dialect.quote_ident(table),
        source,
        vec!["?"; source_ids.len()].join(", "),
    );
    let sql = rewrite_placeholders(dialect, &sql);
    let args = source_ids.iter().cloned().map(Into::into).collect();

    let rows = executor.fetch_all("join_table", table, &sql, args).await?;
    rows.iter()
        .map(|row| -> OrmResult<JoinPair<S, T>> {
            let (source, target) = <(S, T)>::from_row(row)?;
            Ok(JoinPair { source, target })
        })
        .collect()
}

/// Target keys in first-seen order, without duplicates.
pub fn unique_targets<S, T>(pairs: &[JoinPair<S, T>]) -> Vec<T>
where
    T: Eq + Hash + Clone,
{
    let mut seen = HashSet::with_capacity(pairs.len());
    pairs
        .iter()
        .filter(|p| seen.insert(p.target.clone()))
        .map(|p| p.target.clone())
        .collect()
}

/// Targets per source key, each list in pair order.
pub fn group_by_source<S, T>(pairs: &[JoinPair<S, T>]) -> HashMap<S, Vec<T>>
where
    S: Eq + Hash + Clone,
    T: Clone,
{
    let mut grouped: HashMap<S, Vec<T>> = HashMap::new();
    for pair in pairs {
        grouped
            .entry(pair.source.clone())
            .or_default()
            .push(pair.target.clone());
    }
    grouped
}

//! Reusable query fragments.
//!
//! A [`Scope`] captures one piece of query state (a predicate, an ordering, a
//! page bound, a column override, a join or a preload) as plain data. Scopes
//! are immutable and can be shared across queries and threads:
//!
//! ```
//! use ormgen_core::scope::{Scope, Scopes};
//!
//! fn active() -> Scope {
//!     Scope::filter("active = ?", [true])
//! }
//!
//! fn paginate(page: u64, per_page: u64) -> Scopes {
//!     Scopes::combine([Scope::limit(per_page), Scope::offset((page - 1) * per_page)])
//! }
//!
//! let scopes = paginate(2, 20).append([active()]);
//! assert_eq!(scopes.len(), 3);
//! ```

use crate::value::BindValue;

/// Receives scope fragments.
///
/// Implemented by [`Query`](crate::Query); the join and preload hooks default
/// to no-ops so that a minimal applier only handles the five core fragments.
pub trait Applier {
    fn apply_where(&mut self, clause: &str, args: &[BindValue]);
    fn apply_order_by(&mut self, clause: &str);
    fn apply_limit(&mut self, n: u64);
    fn apply_offset(&mut self, n: u64);
    fn apply_select(&mut self, columns: &str);

    fn apply_join(&mut self, _name: &str) {}
    fn apply_left_join(&mut self, _name: &str) {}
    fn apply_preload(&mut self, _name: &str) {}
}

/// A single query fragment.
#[derive(Debug, Clone, PartialEq)]
pub enum Scope {
    Where { clause: String, args: Vec<BindValue> },
    OrderBy(String),
    Limit(u64),
    Offset(u64),
    Select(String),
    Join(String),
    LeftJoin(String),
    Preload(String),
}

impl Scope {
    /// A WHERE fragment; `?` placeholders are bound from `args` in order.
    pub fn filter<I, V>(clause: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<BindValue>,
    {
        Self::Where {
            clause: clause.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn order_by(clause: impl Into<String>) -> Self {
        Self::OrderBy(clause.into())
    }

    pub fn limit(n: u64) -> Self {
        Self::Limit(n)
    }

    pub fn offset(n: u64) -> Self {
        Self::Offset(n)
    }

    /// Overrides the SELECT column list; the columns are joined with `", "`.
    pub fn select(columns: &[&str]) -> Self {
        Self::Select(columns.join(", "))
    }

    /// `column IN (?, ..., ?)` with one placeholder per value.
    ///
    /// An empty list yields the always-false predicate `1 = 0`, so the query
    /// still runs and matches nothing.
    pub fn is_in<I, V>(column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<BindValue>,
    {
        let args: Vec<BindValue> = values.into_iter().map(Into::into).collect();
        if args.is_empty() {
            return Self::Where {
                clause: "1 = 0".to_owned(),
                args,
            };
        }
        let placeholders = vec!["?"; args.len()].join(", ");
        Self::Where {
            clause: format!("{} IN ({})", column, placeholders),
            args,
        }
    }

    /// INNER JOIN on a registered relation.
    pub fn join(name: impl Into<String>) -> Self {
        Self::Join(name.into())
    }

    /// LEFT JOIN on a registered relation.
    pub fn left_join(name: impl Into<String>) -> Self {
        Self::LeftJoin(name.into())
    }

    /// Eager-loads a registered relation.
    pub fn preload(name: impl Into<String>) -> Self {
        Self::Preload(name.into())
    }

    /// Dispatches this fragment to the matching applier hook.
    pub fn apply<A: Applier + ?Sized>(&self, applier: &mut A) {
        match self {
            Self::Where { clause, args } => applier.apply_where(clause, args),
            Self::OrderBy(clause) => applier.apply_order_by(clause),
            Self::Limit(n) => applier.apply_limit(*n),
            Self::Offset(n) => applier.apply_offset(*n),
            Self::Select(columns) => applier.apply_select(columns),
            Self::Join(name) => applier.apply_join(name),
            Self::LeftJoin(name) => applier.apply_left_join(name),
            Self::Preload(name) => applier.apply_preload(name),
        }
    }
}

/// An ordered collection of scopes.
///
/// Every combinator returns a new value; neither operand is modified.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scopes(Vec<Scope>);

impl Scopes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn combine(scopes: impl IntoIterator<Item = Scope>) -> Self {
        Self(scopes.into_iter().collect())
    }

    pub fn append(&self, scopes: impl IntoIterator<Item = Scope>) -> Self {
        let mut out = self.0.clone();
        out.extend(scopes);
        Self(out)
    }

    pub fn merge(&self, other: &Scopes) -> Self {
        let mut out = Vec::with_capacity(self.0.len() + other.0.len());
        out.extend_from_slice(&self.0);
        out.extend_from_slice(&other.0);
        Self(out)
    }

    pub fn into_vec(self) -> Vec<Scope> {
        self.0
    }
}

impl std::ops::Deref for Scopes {
    type Target = [Scope];

    fn deref(&self) -> &[Scope] {
        &self.0
    }
}

impl From<Vec<Scope>> for Scopes {
    fn from(scopes: Vec<Scope>) -> Self {
        Self(scopes)
    }
}

impl FromIterator<Scope> for Scopes {
    fn from_iter<I: IntoIterator<Item = Scope>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'s> IntoIterator for &'s Scopes {
    type Item = &'s Scope;
    type IntoIter = std::slice::Iter<'s, Scope>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

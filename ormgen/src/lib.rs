//! # ormgen
//!
//! Typed query layer for generated models.
//!
//! A code generator turns annotated structs into [`Model`] implementations:
//! table metadata, a column/value extractor, a key setter, relation and
//! timestamp registrations. This crate is the runtime those implementations
//! plug into. It composes immutable queries, renders them for MySQL or
//! PostgreSQL, batches eager loading to avoid N+1 queries, and wraps work in
//! transactions that roll back on error or panic.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use ormgen::prelude::*;
//!
//! #[derive(Debug, Clone, ormgen::sqlx::FromRow)]
//! struct User {
//!     id: i64,
//!     name: String,
//! }
//!
//! impl Model<ormgen::sqlx::Sqlite> for User {
//!     fn table_name() -> &'static str {
//!         "users"
//!     }
//!
//!     fn columns() -> &'static [&'static str] {
//!         &["id", "name"]
//!     }
//!
//!     fn column_values(&self, include_pk: bool) -> (Vec<&'static str>, Vec<BindValue>) {
//!         let mut cols = Vec::new();
//!         let mut vals = Vec::new();
//!         if include_pk {
//!             cols.push("id");
//!             vals.push(self.id.into());
//!         }
//!         cols.push("name");
//!         vals.push(self.name.clone().into());
//!         (cols, vals)
//!     }
//!
//!     fn key_setter() -> Option<fn(&mut Self, i64)> {
//!         Some(|u, id| u.id = id)
//!     }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = ormgen::sqlx::SqlitePool::connect("sqlite::memory:").await?;
//! let db = Db::new(pool, &POSTGRES);
//!
//! let mut user = User { id: 0, name: "Alice".to_owned() };
//! User::find(&db).create(&mut user).await?;
//!
//! let alice = User::find(&db).filter("name = ?", ["Alice"]).first().await?;
//! assert_eq!(alice.id, user.id);
//! # Ok(())
//! # }
//! ```
//!
//! ## Installation
//!
//! ```toml
//! [dependencies]
//! ormgen = { version = "0.3", features = ["postgres"] }
//! ```

pub use ormgen_core::*;

pub mod prelude {
    pub use ormgen_core::prelude::*;
}

pub use sqlx;

pub mod clock;
pub mod dialect;
pub mod error;
pub mod executor;
pub mod join_table;
pub mod model;
pub mod preload;
pub mod query;
pub mod scope;
pub mod value;

#[cfg(feature = "metrics")]
pub mod metrics;

pub use clock::{Clock, FixedClock, SystemClock};
pub use dialect::{Backend, Dialect, MYSQL, MySqlDialect, POSTGRES, PostgresDialect, rewrite_placeholders};
pub use error::{OrmError, OrmResult};
pub use executor::{Db, ExecResult, Executor, IntoExecutor, Tx};
pub use join_table::{JoinPair, group_by_source, query_join_table, unique_targets};
pub use model::{JoinConfig, Model, Preloader, Relation, RelationKind, Relations, Timestamps};
pub use query::{Query, Statement};
pub use scope::{Applier, Scope, Scopes};
pub use value::BindValue;

pub mod prelude {
    pub use crate::{
        BindValue, Db, Executor, IntoExecutor, JoinConfig, Model, OrmError, OrmResult, Query,
        Relation, Relations, Scope, Scopes, Timestamps, Tx, MYSQL, POSTGRES,
    };
}

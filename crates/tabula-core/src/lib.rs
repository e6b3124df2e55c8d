//! Core engine for Tabula: column registry, filters and the query planner
//! behind server-side paginated tables.

pub mod column;
pub mod error;
pub mod exec;
pub mod filter;
pub mod hydrate;
pub mod options;
pub mod path;
pub mod planner;
pub mod response;
pub mod schema;
pub mod sql;
pub mod sqlx_mysql;
pub mod table;
pub mod value;

#[cfg(test)]
mod fixtures;

pub use column::{ColumnDefinition, ColumnKind, ColumnRegistry};
pub use error::*;
pub use exec::{CachingExecutor, Executor};
pub use filter::{Filter, FilterStrategy, ParameterCounter, SearchTerm, SearchType};
pub use hydrate::Hydrator;
pub use path::DataPath;
pub use planner::{CompiledQuery, CountQuery, CountStrategy, PlannedQuery, QueryPlanner, RequestParams};
pub use response::{fetch_page, TableResponse};
pub use schema::{EntityMetadata, FieldType, InMemorySchema, SchemaProvider};
pub use sqlx_mysql::MySqlExecutor;
pub use table::{TableDefaults, TableDefinition};
pub use value::{BindValue, Record};

//! Serves table requests: looks up the table definition, plans the request
//! and runs the page and count queries.

use sqlx::mysql::MySqlPoolOptions;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tabula_core::{
    fetch_page, ColumnRegistry, Executor, MySqlExecutor, QueryPlanner, RequestParams, Result,
    TableDefaults, TableDefinition, TableResponse, TabulaError,
};
use tabula_shared::{DatabaseConfig, PerfTimer, TableMetrics};
use tracing::{info, instrument, warn};

/// Opens a MySQL pool sized by `config`.
pub async fn connect(config: &DatabaseConfig) -> Result<MySqlExecutor> {
    let pool = MySqlPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.connection_timeout))
        .idle_timeout(Duration::from_secs(config.idle_timeout))
        .connect(&config.url)
        .await?;
    info!(max_connections = config.max_connections, "database pool ready");
    Ok(MySqlExecutor::new(pool))
}

/// Named table definitions sharing one executor.
pub struct TableService<E> {
    executor: E,
    defaults: TableDefaults,
    tables: HashMap<String, Arc<TableDefinition>>,
}

impl<E: Executor> TableService<E> {
    /// Service whose tables start from `defaults`.
    pub fn new(executor: E, defaults: TableDefaults) -> Self {
        Self { executor, defaults, tables: HashMap::new() }
    }

    /// Defines a table from a registry with the service defaults applied.
    pub fn define(&mut self, name: &str, registry: ColumnRegistry) -> Arc<TableDefinition> {
        self.insert(TableDefinition::with_defaults(name, registry, self.defaults.clone()))
    }

    /// Adds a table built by the caller, replacing any table of the same name.
    pub fn insert(&mut self, table: TableDefinition) -> Arc<TableDefinition> {
        let table = Arc::new(table);
        if self.tables.insert(table.name().to_string(), Arc::clone(&table)).is_some() {
            warn!(table = table.name(), "table definition replaced");
        }
        table
    }

    /// Table registered under `name`.
    pub fn table(&self, name: &str) -> Option<&TableDefinition> {
        self.tables.get(name).map(Arc::as_ref)
    }

    /// The executor queries run on.
    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Answers one request for table `name`.
    #[instrument(level = "info", skip(self, request), fields(draw = request.draw))]
    pub async fn handle(&self, name: &str, request: RequestParams) -> Result<TableResponse> {
        let table = self
            .table(name)
            .ok_or_else(|| TabulaError::config(format!("unknown table `{name}`")))?;
        let timer = PerfTimer::new("tabula_request_duration_seconds").with_label("table", name);

        let result = async {
            let planned = QueryPlanner::new(table, request)?.plan()?;
            TableMetrics::table_planned(name, planned.plan().joins.len());
            fetch_page(&planned, &self.executor).await
        }
        .await;

        let elapsed = timer.finish();
        match &result {
            Ok(response) => {
                TableMetrics::query_executed(name, "page", elapsed);
                TableMetrics::page_served(name, response.data.len(), response.records_filtered);
            }
            Err(e) => {
                TableMetrics::query_failed(name, error_type(e));
                warn!(table = name, error = %e, "table request failed");
            }
        }
        result
    }

    /// Like [`Self::handle`] with the raw JSON request body.
    pub async fn handle_json(&self, name: &str, body: &str) -> Result<TableResponse> {
        self.handle(name, RequestParams::from_json(body)?).await
    }
}

fn error_type(err: &TabulaError) -> &'static str {
    match err {
        TabulaError::SchemaError(_) => "schema",
        TabulaError::ConfigError(_) => "config",
        TabulaError::ParseError(_) => "parse",
        TabulaError::ExecutionError(_) => "execution",
        TabulaError::SerializationError(_) => "serialization",
        TabulaError::InternalError(_) => "internal",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mockall::mock;
    use serde_json::json;
    use tabula_core::schema::{Association, EntityMetadata, FieldType, InMemorySchema};
    use tabula_core::{ColumnKind, CompiledQuery, Record};

    mock! {
        Exec {}

        #[async_trait]
        impl Executor for Exec {
            async fn fetch_rows(&self, query: &CompiledQuery) -> Result<Vec<Record>>;
            async fn fetch_scalar(&self, query: &CompiledQuery) -> Result<i64>;
        }
    }

    fn registry() -> ColumnRegistry {
        let schema = InMemorySchema::new()
            .with_entity(
                EntityMetadata::new("Post", "posts")
                    .with_identifier("id")
                    .with_field("title", FieldType::String)
                    .with_association("author", Association::many_to_one("User", "author_id")),
            )
            .with_entity(
                EntityMetadata::new("User", "users")
                    .with_identifier("id")
                    .with_field("name", FieldType::String),
            );
        let mut reg = ColumnRegistry::new(Arc::new(schema), "Post").unwrap();
        reg.register(Some("title"), ColumnKind::Column, json!({})).unwrap();
        reg.register(Some("author.name"), ColumnKind::Column, json!({})).unwrap();
        reg
    }

    #[tokio::test]
    async fn serves_a_page() {
        let mut exec = MockExec::new();
        exec.expect_fetch_rows().times(1).returning(|q| {
            assert!(q.sql.contains("LIMIT 5 OFFSET 0"));
            let row = json!({"post__id": 1, "post__title": "Hi", "author__id": null, "author__name": null});
            Ok(vec![row.as_object().cloned().unwrap()])
        });
        exec.expect_fetch_scalar().times(2).returning(|_| Ok(1));

        let mut service = TableService::new(exec, TableDefaults::default());
        service.define("posts", registry());
        let response = service
            .handle_json("posts", r#"{"draw": "2", "start": 0, "length": 5}"#)
            .await
            .unwrap();
        assert_eq!(response.draw, 2);
        assert_eq!(response.records_total, 1);
        assert_eq!(response.data[0]["author"], json!(null));
    }

    #[tokio::test]
    async fn unknown_tables_are_config_errors() {
        let service = TableService::new(MockExec::new(), TableDefaults::default());
        let err = service.handle("nope", RequestParams::default()).await.unwrap_err();
        assert!(matches!(err, TabulaError::ConfigError(_)));
    }

    #[tokio::test]
    async fn execution_failures_propagate() {
        let mut exec = MockExec::new();
        exec.expect_fetch_rows()
            .returning(|_| Err(TabulaError::ExecutionError("gone".into())));
        let mut service = TableService::new(exec, TableDefaults::default());
        service.define("posts", registry());
        let err = service.handle("posts", RequestParams::default()).await.unwrap_err();
        assert_eq!(error_type(&err), "execution");
    }

    #[test]
    fn defaults_apply_to_defined_tables() {
        let mut defaults = TableDefaults::default();
        defaults.options.individual_filtering = true;
        let mut service = TableService::new(MockExec::new(), defaults);
        let table = service.define("posts", registry());
        assert!(table.options.individual_filtering);
        assert!(service.table("posts").is_some());
    }
}

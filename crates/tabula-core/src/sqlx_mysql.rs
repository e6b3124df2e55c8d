//! MySQL execution primitive on top of a sqlx pool.

use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value;
use sqlx::{
    decode::Decode,
    mysql::{MySql, MySqlArguments, MySqlPool, MySqlRow, MySqlValueRef},
    query::Query as SqlxQuery,
    Column, Row, TypeInfo, Value as SqlxValue, ValueRef,
};
use tracing::{debug, instrument};

use crate::error::{Result, TabulaError};
use crate::exec::Executor;
use crate::planner::CompiledQuery;
use crate::value::{BindValue, Record, DATETIME_FORMAT};

/// Runs compiled queries against a MySQL pool. The query cache toggle maps
/// to sqlx's persistent prepared statements.
#[derive(Clone)]
pub struct MySqlExecutor {
    pool: MySqlPool,
}

impl MySqlExecutor {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str) -> Result<Self> {
        Ok(Self::new(MySqlPool::connect(url).await?))
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    fn prepare<'q>(query: &'q CompiledQuery) -> SqlxQuery<'q, MySql, MySqlArguments> {
        let mut q = sqlx::query(&query.sql).persistent(query.cache.use_query_cache);
        for param in &query.binds {
            q = bind_value(q, &param.value);
        }
        q
    }
}

#[async_trait]
impl Executor for MySqlExecutor {
    #[instrument(level = "debug", skip_all, fields(binds = query.binds.len()))]
    async fn fetch_rows(&self, query: &CompiledQuery) -> Result<Vec<Record>> {
        let rows: Vec<MySqlRow> = Self::prepare(query)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("query failed: {}", query.sql))
            .map_err(|e| TabulaError::ExecutionError(format!("{e:#}")))?;
        debug!(rows = rows.len(), "rows fetched");
        rows.iter()
            .map(|row| row_to_record(row).map_err(|e| TabulaError::ExecutionError(e.to_string())))
            .collect()
    }

    #[instrument(level = "debug", skip_all, fields(binds = query.binds.len()))]
    async fn fetch_scalar(&self, query: &CompiledQuery) -> Result<i64> {
        let row = Self::prepare(query)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("query failed: {}", query.sql))
            .map_err(|e| TabulaError::ExecutionError(format!("{e:#}")))?;
        let Some(row) = row else { return Ok(0) };
        let raw = row.try_get_raw(0)?;
        match decode_value(raw).map_err(|e| TabulaError::ExecutionError(e.to_string()))? {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .ok_or_else(|| TabulaError::ExecutionError(format!("count `{n}` out of range"))),
            Value::String(s) => s
                .parse()
                .map_err(|_| TabulaError::ExecutionError(format!("count `{s}` is not a number"))),
            Value::Null => Ok(0),
            other => Err(TabulaError::ExecutionError(format!("unexpected count value `{other}`"))),
        }
    }
}

fn bind_value<'q>(
    q: SqlxQuery<'q, MySql, MySqlArguments>,
    v: &BindValue,
) -> SqlxQuery<'q, MySql, MySqlArguments> {
    match v {
        // no type info for NULL
        BindValue::Null => q.bind(Option::<String>::None),
        BindValue::Bool(b) => q.bind(*b),
        BindValue::Int(i) => q.bind(*i),
        BindValue::Float(f) => q.bind(*f),
        BindValue::Text(s) => q.bind(s.clone()),
        BindValue::DateTime(dt) => q.bind(*dt),
    }
}

/// One row keyed by result label.
pub fn row_to_record(row: &MySqlRow) -> anyhow::Result<Record> {
    let mut map = Record::new();
    for col in row.columns() {
        let name = col.name();
        let value = row
            .try_get_raw(col.ordinal())
            .map_err(|e| anyhow!("error accessing column {name}: {e}"))
            .and_then(decode_value)?;
        map.insert(name.to_string(), value);
    }
    Ok(map)
}

fn decode_value(vr: MySqlValueRef<'_>) -> anyhow::Result<Value> {
    if vr.is_null() {
        return Ok(Value::Null);
    }
    let owned = ValueRef::to_owned(&vr);
    let tn = owned.type_info().name().to_string();

    macro_rules! dec {
        ($t:ty) => {{
            <$t as Decode<'_, MySql>>::decode(owned.as_ref()).map_err(|e| {
                anyhow!("decode {} as {} failed: {}", tn, std::any::type_name::<$t>(), e)
            })
        }};
    }

    Ok(match tn.as_str() {
        "BIGINT" => Value::from(dec!(i64)?),
        "INT" | "MEDIUMINT" => Value::from(dec!(i32)?),
        "SMALLINT" => Value::from(dec!(i16)?),
        "TINYINT" => Value::from(dec!(i8)?),
        "BIGINT UNSIGNED" => Value::from(dec!(u64)?),
        "INT UNSIGNED" | "MEDIUMINT UNSIGNED" => Value::from(dec!(u32)?),
        "SMALLINT UNSIGNED" => Value::from(dec!(u16)?),
        "TINYINT UNSIGNED" => Value::from(dec!(u8)?),
        "DOUBLE" => Value::from(dec!(f64)?),
        "FLOAT" => Value::from(dec!(f32)? as f64),
        "BOOLEAN" => Value::from(dec!(bool)?),
        "YEAR" => Value::from(dec!(u16)?),

        "VARCHAR" | "CHAR" | "TEXT" | "LONGTEXT" | "MEDIUMTEXT" | "TINYTEXT" | "ENUM" | "SET" => {
            Value::from(dec!(String)?)
        }
        "BLOB" | "LONGBLOB" | "MEDIUMBLOB" | "TINYBLOB" | "BINARY" | "VARBINARY" => {
            let bytes: Vec<u8> = dec!(Vec<u8>)?;
            Value::from(String::from_utf8_lossy(&bytes).into_owned())
        }
        "JSON" => {
            let text: String = dec!(String)?;
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        }

        "DATE" => Value::from(dec!(NaiveDate)?.to_string()),
        "DATETIME" => Value::from(dec!(NaiveDateTime)?.format(DATETIME_FORMAT).to_string()),
        "TIMESTAMP" => Value::from(dec!(DateTime<Utc>)?.naive_utc().format(DATETIME_FORMAT).to_string()),
        "TIME" => Value::from(dec!(NaiveTime)?.to_string()),

        s if s.starts_with("DECIMAL") || s.starts_with("NUMERIC") => decimal(dec!(String)?),

        other => bail!("Unsupported MySQL type: {other}"),
    })
}

/// DECIMAL arrives as text; keep it as a number when it fits an f64.
fn decimal(text: String) -> Value {
    text.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .unwrap_or(Value::String(text))
}

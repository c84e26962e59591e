//! SQL backend over a read-only SQLite database (OpenGenes style).
//!
//! Raw SQL tools pass the caller's statement through; structured tools render
//! a fixed `SELECT` with positional binds. Both are screened by
//! [`crate::safety::check`] in the dispatcher before this module sees them.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Map, Number, Value};
use sqlx::query::Query;
use sqlx::sqlite::{
    Sqlite, SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Column, Row, TypeInfo, ValueRef};

use super::{
    Backend, BindMode, Protocol, Resource, SqlBind, UpstreamQuery, UpstreamResponse, missing_route,
};
use crate::catalog::{self, opengenes};
use crate::error::{ToolError, TransportError};
use crate::format::{Payload, ToolResult};
use crate::schema::ToolSpec;
use crate::validate::ValidatedArguments;

// ── Routes ──────────────────────────────────────────────────────────────────

/// One optional `WHERE` condition driven by a tool parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub param: &'static str,
    pub column: &'static str,
    pub mode: BindMode,
}

impl Filter {
    pub fn new(param: &'static str, column: &'static str, mode: BindMode) -> Self {
        Self {
            param,
            column,
            mode,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectTemplate {
    /// `SELECT ... FROM ...` without WHERE/ORDER/LIMIT.
    pub select: &'static str,
    pub filters: Vec<Filter>,
    pub order_by: Option<&'static str>,
    pub limit_param: Option<&'static str>,
}

impl SelectTemplate {
    /// Render the statement; only filters whose parameter is present apply.
    pub fn render(&self, args: &ValidatedArguments) -> (String, Vec<SqlBind>) {
        let mut sql = self.select.to_string();
        let mut clauses = Vec::new();
        let mut binds = Vec::new();

        for filter in &self.filters {
            let Some(value) = args.get(filter.param) else {
                continue;
            };
            let op = match filter.mode {
                BindMode::Exact => "=",
                BindMode::Contains => "LIKE",
            };
            clauses.push(format!("{} {op} ?", filter.column));
            binds.push(SqlBind {
                param: filter.param.to_string(),
                value: value.clone(),
                mode: filter.mode,
            });
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        if let Some(order) = self.order_by {
            sql.push_str(" ORDER BY ");
            sql.push_str(order);
        }
        if let Some((param, value)) = self
            .limit_param
            .and_then(|p| args.get(p).map(|v| (p, v)))
        {
            sql.push_str(" LIMIT ?");
            binds.push(SqlBind {
                param: param.to_string(),
                value: value.clone(),
                mode: BindMode::Exact,
            });
        }
        (sql, binds)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SqlRoute {
    /// Answer with a fixed document; the database is not touched.
    Static(Value),
    /// The named string parameter is the statement.
    Raw { param: &'static str },
    Select(SelectTemplate),
}

#[derive(Debug, Clone)]
pub struct SqlTool {
    pub spec: ToolSpec,
    pub route: SqlRoute,
}

impl SqlTool {
    pub fn new(spec: ToolSpec, route: SqlRoute) -> Self {
        Self { spec, route }
    }
}

// ── Backend ─────────────────────────────────────────────────────────────────

pub struct SqlBackend {
    name: String,
    instructions: String,
    pool: SqlitePool,
    timeout: Duration,
    tools: Vec<SqlTool>,
    resources: Vec<(Resource, &'static str)>,
}

impl SqlBackend {
    /// Open the OpenGenes database file read-only and fail fast if it is
    /// missing or unreadable.
    pub async fn open(path: &Path, timeout: Duration, prefix: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .read_only(true)
            .create_if_missing(false);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .acquire_timeout(Duration::from_secs(3))
            .connect_with(options)
            .await?;
        tracing::info!(path = %path.display(), "opened SQLite database read-only");
        Ok(Self::opengenes(pool, timeout, prefix))
    }

    /// OpenGenes catalog over an existing pool.
    pub fn opengenes(pool: SqlitePool, timeout: Duration, prefix: &str) -> Self {
        let resources = vec![
            (
                Resource {
                    uri: format!("resource://{prefix}db-prompt"),
                    name: "Database prompt".to_string(),
                    description: "Usage guidelines for querying the OpenGenes database".to_string(),
                    mime_type: "text/plain",
                },
                opengenes::DB_PROMPT,
            ),
            (
                Resource {
                    uri: format!("resource://{prefix}schema-summary"),
                    name: "Schema summary".to_string(),
                    description: "Summary of the OpenGenes tables and their purposes".to_string(),
                    mime_type: "text/plain",
                },
                opengenes::SCHEMA_SUMMARY,
            ),
        ];
        Self::new(
            "opengenes",
            opengenes::INSTRUCTIONS,
            opengenes::tools(),
            resources,
            pool,
            timeout,
            prefix,
        )
    }

    pub fn new(
        name: &str,
        instructions: &str,
        tools: Vec<SqlTool>,
        resources: Vec<(Resource, &'static str)>,
        pool: SqlitePool,
        timeout: Duration,
        prefix: &str,
    ) -> Self {
        let tools = tools
            .into_iter()
            .map(|t| SqlTool {
                spec: catalog::prefixed(t.spec, prefix),
                route: t.route,
            })
            .collect();
        Self {
            name: name.to_string(),
            instructions: instructions.to_string(),
            pool,
            timeout,
            tools,
            resources,
        }
    }

    fn route(&self, tool: &str) -> Option<&SqlRoute> {
        self.tools
            .iter()
            .find(|t| t.spec.name == tool)
            .map(|t| &t.route)
    }
}

#[async_trait]
impl Backend for SqlBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn protocol(&self) -> Protocol {
        Protocol::Sql
    }

    fn instructions(&self) -> &str {
        &self.instructions
    }

    fn tools(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| t.spec.clone()).collect()
    }

    fn build(&self, tool: &ToolSpec, args: &ValidatedArguments) -> Result<UpstreamQuery, ToolError> {
        match self.route(&tool.name).ok_or_else(|| missing_route(&tool.name))? {
            SqlRoute::Static(doc) => Ok(UpstreamQuery::Static(doc.clone())),
            SqlRoute::Raw { param } => {
                let statement = args.get_str(param).ok_or_else(|| {
                    ToolError::invalid_argument(format!("missing required parameter '{param}'"))
                })?;
                Ok(UpstreamQuery::Sql {
                    statement: statement.trim().to_string(),
                    binds: Vec::new(),
                })
            }
            SqlRoute::Select(template) => {
                let (statement, binds) = template.render(args);
                Ok(UpstreamQuery::Sql { statement, binds })
            }
        }
    }

    async fn send(&self, query: &UpstreamQuery) -> Result<UpstreamResponse, TransportError> {
        let (statement, binds) = match query {
            UpstreamQuery::Static(doc) => return Ok(UpstreamResponse::Static(doc.clone())),
            UpstreamQuery::Sql { statement, binds } => (statement, binds),
            other => {
                return Err(TransportError::Other(format!(
                    "SQL backend cannot send {}",
                    other.summary()
                )));
            }
        };

        let mut prepared = sqlx::query(statement.as_str());
        for bind in binds {
            prepared = bind_value(prepared, bind);
        }

        let rows = tokio::time::timeout(self.timeout, prepared.fetch_all(&self.pool))
            .await
            .map_err(|_| TransportError::Timeout(self.timeout.as_secs()))?
            .map_err(classify_sqlx)?;
        tracing::debug!(rows = rows.len(), "SQL query executed");

        rows.iter()
            .map(row_to_json)
            .collect::<Result<Vec<_>, _>>()
            .map(UpstreamResponse::Rows)
    }

    fn format(
        &self,
        tool: &ToolSpec,
        args: &ValidatedArguments,
        query: &UpstreamQuery,
        response: UpstreamResponse,
    ) -> Result<ToolResult, ToolError> {
        match response {
            UpstreamResponse::Static(doc) => {
                Ok(ToolResult::new(&tool.name, args, Payload::Document(doc)))
            }
            UpstreamResponse::Rows(rows) => {
                let result = ToolResult::new(&tool.name, args, Payload::Records(rows));
                Ok(match query {
                    UpstreamQuery::Sql { statement, .. } => result.with_query(statement.clone()),
                    _ => result,
                })
            }
            UpstreamResponse::Http { .. } => {
                Err(ToolError::unknown("SQL backend received an HTTP response"))
            }
        }
    }

    fn resources(&self) -> Vec<Resource> {
        self.resources.iter().map(|(r, _)| r.clone()).collect()
    }

    fn read_resource(&self, uri: &str) -> Option<String> {
        self.resources
            .iter()
            .find(|(r, _)| r.uri == uri)
            .map(|(_, text)| (*text).to_string())
    }
}

// ── Row and bind conversion ─────────────────────────────────────────────────

fn bind_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    bind: &SqlBind,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match (&bind.value, bind.mode) {
        (Value::String(s), BindMode::Contains) => query.bind(format!("%{s}%")),
        (Value::String(s), BindMode::Exact) => query.bind(s.clone()),
        (Value::Number(n), _) => match n.as_i64() {
            Some(i) => query.bind(i),
            None => query.bind(n.as_f64().unwrap_or_default()),
        },
        (Value::Bool(b), _) => query.bind(*b),
        (Value::Null, _) => query.bind(None::<String>),
        (other, _) => query.bind(other.to_string()),
    }
}

/// Column name to JSON by storage class; BLOBs become base64 strings.
fn row_to_json(row: &SqliteRow) -> Result<Value, TransportError> {
    let decode = |e: sqlx::Error| TransportError::Decode(e.to_string());
    let mut obj = Map::with_capacity(row.columns().len());
    for column in row.columns() {
        let idx = column.ordinal();
        let raw = row.try_get_raw(idx).map_err(decode)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            let type_name = raw.type_info().name().to_string();
            match type_name.as_str() {
                "INTEGER" | "BOOLEAN" => Value::from(row.try_get::<i64, _>(idx).map_err(decode)?),
                "REAL" => Number::from_f64(row.try_get::<f64, _>(idx).map_err(decode)?)
                    .map_or(Value::Null, Value::Number),
                "BLOB" => Value::String(BASE64.encode(row.try_get::<Vec<u8>, _>(idx).map_err(decode)?)),
                _ => Value::String(row.try_get::<String, _>(idx).map_err(decode)?),
            }
        };
        obj.insert(column.name().to_string(), value);
    }
    Ok(Value::Object(obj))
}

fn classify_sqlx(err: sqlx::Error) -> TransportError {
    match err {
        sqlx::Error::Database(db) => {
            let message = db.message().to_string();
            if message.to_ascii_lowercase().contains("readonly")
                || message.to_ascii_lowercase().contains("read-only")
            {
                TransportError::ReadOnlyViolation(message)
            } else {
                TransportError::Rejected(message)
            }
        }
        sqlx::Error::PoolTimedOut => TransportError::Connect("database pool timed out".to_string()),
        sqlx::Error::PoolClosed => TransportError::Connect("database pool is closed".to_string()),
        sqlx::Error::Io(e) => TransportError::Connect(e.to_string()),
        e @ (sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_)) => {
            TransportError::Decode(e.to_string())
        }
        other => TransportError::Other(other.to_string()),
    }
}

use diesel::r2d2::{self, ConnectionManager};
use diesel::sql_types::{BigInt, Bool, Double, Nullable, Text};
use diesel::{Connection, RunQueryDsl};
use tracing::debug;

#[cfg(feature = "sqlite")]
use diesel::connection::SimpleConnection;
#[cfg(feature = "mysql")]
use diesel::mysql::MysqlConnection;
#[cfg(feature = "postgres")]
use diesel::pg::PgConnection;
#[cfg(feature = "sqlite")]
use diesel::sqlite::SqliteConnection;

use super::DatabaseError;
use super::translate::{Dialect, translate};
use crate::config::DatabaseConfig;

/// A bound parameter. Every variant is nullable so `NULL` keeps its column
/// type on backends that type parameters strictly.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Text(Option<String>),
    Int(Option<i64>),
    Float(Option<f64>),
    Bool(Option<bool>),
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(Some(value.to_string()))
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(Some(value))
    }
}

impl From<&String> for SqlValue {
    fn from(value: &String) -> Self {
        SqlValue::Text(Some(value.clone()))
    }
}

impl From<Option<String>> for SqlValue {
    fn from(value: Option<String>) -> Self {
        SqlValue::Text(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int(Some(value))
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Float(Some(value))
    }
}

impl From<Option<f64>> for SqlValue {
    fn from(value: Option<f64>) -> Self {
        SqlValue::Float(value)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Bool(Some(value))
    }
}

/// Builds a `Vec<SqlValue>` from heterogeneous values.
#[macro_export]
macro_rules! params {
    () => { Vec::<$crate::db::SqlValue>::new() };
    ($($value:expr),+ $(,)?) => {
        vec![$($crate::db::SqlValue::from($value)),+]
    };
}

/// One statement of a transactional batch.
#[derive(Debug, Clone)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlValue>,
    /// Abort and roll back the whole batch when this statement touches no row.
    pub must_affect: bool,
}

impl Statement {
    pub fn new(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self {
            sql: sql.into(),
            params,
            must_affect: false,
        }
    }

    pub fn guarded(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self {
            must_affect: true,
            ..Self::new(sql, params)
        }
    }
}

// Rows must be loadable on every compiled-in backend.
#[cfg(feature = "postgres")]
pub trait PgRow: diesel::QueryableByName<diesel::pg::Pg> {}
#[cfg(feature = "postgres")]
impl<T: diesel::QueryableByName<diesel::pg::Pg>> PgRow for T {}
#[cfg(not(feature = "postgres"))]
pub trait PgRow {}
#[cfg(not(feature = "postgres"))]
impl<T> PgRow for T {}

#[cfg(feature = "sqlite")]
pub trait SqliteRow: diesel::QueryableByName<diesel::sqlite::Sqlite> {}
#[cfg(feature = "sqlite")]
impl<T: diesel::QueryableByName<diesel::sqlite::Sqlite>> SqliteRow for T {}
#[cfg(not(feature = "sqlite"))]
pub trait SqliteRow {}
#[cfg(not(feature = "sqlite"))]
impl<T> SqliteRow for T {}

#[cfg(feature = "mysql")]
pub trait MysqlRow: diesel::QueryableByName<diesel::mysql::Mysql> {}
#[cfg(feature = "mysql")]
impl<T: diesel::QueryableByName<diesel::mysql::Mysql>> MysqlRow for T {}
#[cfg(not(feature = "mysql"))]
pub trait MysqlRow {}
#[cfg(not(feature = "mysql"))]
impl<T> MysqlRow for T {}

pub trait Row: PgRow + SqliteRow + MysqlRow + Send + 'static {}
impl<T: PgRow + SqliteRow + MysqlRow + Send + 'static> Row for T {}

#[derive(Clone)]
enum DbPool {
    #[cfg(feature = "postgres")]
    Postgres(r2d2::Pool<ConnectionManager<PgConnection>>),
    #[cfg(feature = "mysql")]
    Mysql(r2d2::Pool<ConnectionManager<MysqlConnection>>),
    #[cfg(feature = "sqlite")]
    Sqlite(r2d2::Pool<ConnectionManager<SqliteConnection>>),
}

macro_rules! with_conn {
    ($pool:expr, |$conn:ident, $backend:ident| $body:block) => {
        match $pool {
            #[cfg(feature = "postgres")]
            DbPool::Postgres(pool) => {
                type $backend = diesel::pg::Pg;
                let mut pooled = pool
                    .get()
                    .map_err(|e| DatabaseError::Connection(e.to_string()))?;
                let $conn: &mut PgConnection = &mut pooled;
                $body
            }
            #[cfg(feature = "mysql")]
            DbPool::Mysql(pool) => {
                type $backend = diesel::mysql::Mysql;
                let mut pooled = pool
                    .get()
                    .map_err(|e| DatabaseError::Connection(e.to_string()))?;
                let $conn: &mut MysqlConnection = &mut pooled;
                $body
            }
            #[cfg(feature = "sqlite")]
            DbPool::Sqlite(pool) => {
                type $backend = diesel::sqlite::Sqlite;
                let mut pooled = pool
                    .get()
                    .map_err(|e| DatabaseError::Connection(e.to_string()))?;
                let $conn: &mut SqliteConnection = &mut pooled;
                $body
            }
        }
    };
}

macro_rules! bind_all {
    ($query:expr, $params:expr) => {{
        let mut query = $query;
        for param in $params {
            query = match param {
                SqlValue::Text(value) => query.bind::<Nullable<Text>, _>(value),
                SqlValue::Int(value) => query.bind::<Nullable<BigInt>, _>(value),
                SqlValue::Float(value) => query.bind::<Nullable<Double>, _>(value),
                SqlValue::Bool(value) => query.bind::<Nullable<Bool>, _>(value),
            };
        }
        query
    }};
}

#[cfg(feature = "sqlite")]
#[derive(Debug)]
struct SqlitePragmas;

#[cfg(feature = "sqlite")]
impl r2d2::CustomizeConnection<SqliteConnection, r2d2::Error> for SqlitePragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), r2d2::Error> {
        conn.batch_execute("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")
            .map_err(r2d2::Error::QueryError)
    }
}

fn pool_builder<M: r2d2::ManageConnection>(config: &DatabaseConfig) -> r2d2::Builder<M> {
    r2d2::Pool::builder()
        .max_size(config.max_connections())
        .min_idle(Some(config.min_connections()))
}

/// Translates a Postgres-flavoured statement and lays its parameters out the
/// way the target backend binds them.
pub fn prepare_statement(
    sql: &str,
    params: Vec<SqlValue>,
    dialect: Dialect,
) -> Result<(String, Vec<SqlValue>), DatabaseError> {
    let translated = translate(sql, dialect)?;
    let params = match translated.bindings {
        None => params,
        Some(order) => order
            .into_iter()
            .map(|index| {
                params.get(index).cloned().ok_or_else(|| {
                    DatabaseError::Query(format!("missing value for parameter ${}", index + 1))
                })
            })
            .collect::<Result<Vec<_>, _>>()?,
    };
    Ok((translated.sql, params))
}

/// A connection pool for the configured backend. Every query is authored in
/// Postgres syntax and translated on the way out.
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    dialect: Dialect,
}

impl Database {
    pub fn connect(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let db_type = config.db_type().ok_or_else(|| {
            DatabaseError::Connection(format!("unsupported database url: {}", config.url))
        })?;
        let dialect = Dialect::from(db_type);

        let pool = match dialect {
            #[cfg(feature = "postgres")]
            Dialect::Postgres => DbPool::Postgres(
                pool_builder(config)
                    .build(ConnectionManager::<PgConnection>::new(config.url.trim()))
                    .map_err(|e| DatabaseError::Connection(e.to_string()))?,
            ),
            #[cfg(feature = "mysql")]
            Dialect::Mysql => DbPool::Mysql(
                pool_builder(config)
                    .build(ConnectionManager::<MysqlConnection>::new(config.url.trim()))
                    .map_err(|e| DatabaseError::Connection(e.to_string()))?,
            ),
            #[cfg(feature = "sqlite")]
            Dialect::Sqlite => {
                let path = config.sqlite_path().unwrap_or_default();
                DbPool::Sqlite(
                    pool_builder(config)
                        .connection_customizer(Box::new(SqlitePragmas))
                        .build(ConnectionManager::<SqliteConnection>::new(path))
                        .map_err(|e| DatabaseError::Connection(e.to_string()))?,
                )
            }
            #[allow(unreachable_patterns)]
            other => {
                return Err(DatabaseError::Connection(format!(
                    "{} feature not enabled",
                    other.name()
                )));
            }
        };

        Ok(Self { pool, dialect })
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub async fn fetch_all<T: Row>(
        &self,
        sql: &str,
        params: Vec<SqlValue>,
    ) -> Result<Vec<T>, DatabaseError> {
        let (sql, params) = prepare_statement(sql, params, self.dialect)?;
        debug!(dialect = self.dialect.name(), %sql, "fetch");
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            with_conn!(pool, |conn, Backend| {
                bind_all!(diesel::sql_query(sql).into_boxed::<Backend>(), params)
                    .load::<T>(conn)
                    .map_err(|e| DatabaseError::Query(e.to_string()))
            })
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }

    pub async fn fetch_optional<T: Row>(
        &self,
        sql: &str,
        params: Vec<SqlValue>,
    ) -> Result<Option<T>, DatabaseError> {
        Ok(self.fetch_all(sql, params).await?.into_iter().next())
    }

    pub async fn fetch_one<T: Row>(
        &self,
        sql: &str,
        params: Vec<SqlValue>,
    ) -> Result<T, DatabaseError> {
        self.fetch_optional(sql, params)
            .await?
            .ok_or(DatabaseError::NotFound("row"))
    }

    /// Runs a statement and returns the number of affected rows.
    pub async fn execute(&self, sql: &str, params: Vec<SqlValue>) -> Result<usize, DatabaseError> {
        let (sql, params) = prepare_statement(sql, params, self.dialect)?;
        debug!(dialect = self.dialect.name(), %sql, "execute");
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            with_conn!(pool, |conn, Backend| {
                bind_all!(diesel::sql_query(sql).into_boxed::<Backend>(), params)
                    .execute(conn)
                    .map_err(|e| DatabaseError::Query(e.to_string()))
            })
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }

    /// Runs all statements in one transaction. Returns `false` when a guarded
    /// statement matched no row and the batch was rolled back.
    pub async fn execute_batch(&self, statements: Vec<Statement>) -> Result<bool, DatabaseError> {
        let mut prepared = Vec::with_capacity(statements.len());
        for statement in statements {
            let (sql, params) = prepare_statement(&statement.sql, statement.params, self.dialect)?;
            prepared.push((sql, params, statement.must_affect));
        }
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            with_conn!(pool, |conn, Backend| {
                let outcome = conn.transaction::<_, diesel::result::Error, _>(|conn| {
                    for (sql, params, must_affect) in prepared {
                        let affected = bind_all!(diesel::sql_query(sql).into_boxed::<Backend>(), params)
                            .execute(conn)?;
                        if must_affect && affected == 0 {
                            return Err(diesel::result::Error::RollbackTransaction);
                        }
                    }
                    Ok(())
                });
                match outcome {
                    Ok(()) => Ok(true),
                    Err(diesel::result::Error::RollbackTransaction) => Ok(false),
                    Err(e) => Err(DatabaseError::Query(e.to_string())),
                }
            })
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }

    /// Executes DDL without translation; migrations are written per dialect.
    pub async fn run_ddl(&self, statements: Vec<&'static str>) -> Result<(), DatabaseError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            with_conn!(pool, |conn, Backend| {
                for statement in statements {
                    diesel::sql_query(statement)
                        .into_boxed::<Backend>()
                        .execute(conn)
                        .map_err(|e| DatabaseError::Migration(e.to_string()))?;
                }
                Ok(())
            })
        })
        .await
        .map_err(|e| DatabaseError::Migration(format!("migration task failed: {e}")))?
    }
}

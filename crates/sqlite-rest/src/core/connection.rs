use std::path::{Path, PathBuf};
use std::thread;

use rusqlite::{Connection, OpenFlags};
use tokio::sync::oneshot;

use crate::core::{exec, query, schema};
use crate::core::types::{BodyValue, ColumnMeta, DbInfo, DbRow, ForeignKeyMeta, QuerySpec};
use crate::error::{AppError, AppResult};

const BUSY_TIMEOUT_MS: u64 = 2_000;

/// Handle to the dedicated database worker thread. The worker owns the one
/// `rusqlite::Connection`; every request is a channel round-trip, so the
/// connection is released on every exit path and statements serialize the
/// way the engine expects.
#[derive(Debug, Clone)]
pub struct DbHandle {
    tx: std::sync::mpsc::Sender<DbTask>,
    pub db_path: PathBuf,
}

impl DbHandle {
    pub fn spawn(db_path: PathBuf) -> Self {
        let (tx, rx) = std::sync::mpsc::channel::<DbTask>();
        let path_for_thread = db_path.clone();
        thread::spawn(move || db_worker_main(path_for_thread, rx));
        Self { tx, db_path }
    }

    pub async fn fetch_all(&self, table: String, spec: QuerySpec) -> AppResult<Vec<DbRow>> {
        self.roundtrip(|respond_to| DbTask::FetchAll { table, spec, respond_to })
            .await
    }

    pub async fn fetch_one(
        &self,
        table: String,
        id: i64,
        columns: Option<Vec<String>>,
    ) -> AppResult<DbRow> {
        self.roundtrip(|respond_to| DbTask::FetchOne { table, id, columns, respond_to })
            .await
    }

    pub async fn insert(&self, table: String, body: Vec<(String, BodyValue)>) -> AppResult<i64> {
        self.roundtrip(|respond_to| DbTask::Insert { table, body, respond_to })
            .await
    }

    pub async fn update(
        &self,
        table: String,
        id: i64,
        body: Vec<(String, BodyValue)>,
    ) -> AppResult<()> {
        self.roundtrip(|respond_to| DbTask::Update { table, id, body, respond_to })
            .await
    }

    pub async fn delete(&self, table: String, id: i64) -> AppResult<()> {
        self.roundtrip(|respond_to| DbTask::Delete { table, id, respond_to })
            .await
    }

    pub async fn exec_rows(&self, sql: String) -> AppResult<Vec<DbRow>> {
        self.roundtrip(|respond_to| DbTask::ExecRows { sql, respond_to })
            .await
    }

    pub async fn exec_count(&self, sql: String) -> AppResult<u64> {
        self.roundtrip(|respond_to| DbTask::ExecCount { sql, respond_to })
            .await
    }

    pub async fn tables(&self) -> AppResult<Vec<String>> {
        self.roundtrip(|respond_to| DbTask::Tables { respond_to }).await
    }

    /// Column metadata for an existing table; unknown names are NotFound
    /// because the pragma itself cannot tell absent from empty.
    pub async fn table_schema(&self, table: String) -> AppResult<Vec<ColumnMeta>> {
        self.roundtrip(|respond_to| DbTask::TableSchema { table, respond_to })
            .await
    }

    pub async fn foreign_keys(&self, table: String) -> AppResult<Vec<ForeignKeyMeta>> {
        self.roundtrip(|respond_to| DbTask::ForeignKeys { table, respond_to })
            .await
    }

    pub async fn db_info(&self) -> AppResult<DbInfo> {
        self.roundtrip(|respond_to| DbTask::DbInfo { respond_to }).await
    }

    pub async fn ping(&self) -> AppResult<()> {
        self.roundtrip(|respond_to| DbTask::Ping { respond_to }).await
    }

    async fn roundtrip<T>(
        &self,
        make_task: impl FnOnce(oneshot::Sender<AppResult<T>>) -> DbTask,
    ) -> AppResult<T> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(make_task(tx))
            .map_err(|_| AppError::Internal("db worker unavailable".into()))?;
        rx.await
            .map_err(|_| AppError::Internal("db worker dropped response".into()))?
    }
}

enum DbTask {
    FetchAll {
        table: String,
        spec: QuerySpec,
        respond_to: oneshot::Sender<AppResult<Vec<DbRow>>>,
    },
    FetchOne {
        table: String,
        id: i64,
        columns: Option<Vec<String>>,
        respond_to: oneshot::Sender<AppResult<DbRow>>,
    },
    Insert {
        table: String,
        body: Vec<(String, BodyValue)>,
        respond_to: oneshot::Sender<AppResult<i64>>,
    },
    Update {
        table: String,
        id: i64,
        body: Vec<(String, BodyValue)>,
        respond_to: oneshot::Sender<AppResult<()>>,
    },
    Delete {
        table: String,
        id: i64,
        respond_to: oneshot::Sender<AppResult<()>>,
    },
    ExecRows {
        sql: String,
        respond_to: oneshot::Sender<AppResult<Vec<DbRow>>>,
    },
    ExecCount {
        sql: String,
        respond_to: oneshot::Sender<AppResult<u64>>,
    },
    Tables {
        respond_to: oneshot::Sender<AppResult<Vec<String>>>,
    },
    TableSchema {
        table: String,
        respond_to: oneshot::Sender<AppResult<Vec<ColumnMeta>>>,
    },
    ForeignKeys {
        table: String,
        respond_to: oneshot::Sender<AppResult<Vec<ForeignKeyMeta>>>,
    },
    DbInfo {
        respond_to: oneshot::Sender<AppResult<DbInfo>>,
    },
    Ping {
        respond_to: oneshot::Sender<AppResult<()>>,
    },
}

fn db_worker_main(db_path: PathBuf, rx: std::sync::mpsc::Receiver<DbTask>) {
    let conn = match open_conn(&db_path) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error=%e, path=%db_path.display(), "failed to open db in worker; dropping tasks");
            let message = e.to_string();
            // Drain tasks and respond with the open failure.
            while let Ok(task) = rx.recv() {
                respond_err(
                    task,
                    AppError::DbOpenFailed {
                        path: db_path.clone(),
                        message: message.clone(),
                    },
                );
            }
            return;
        }
    };

    while let Ok(task) = rx.recv() {
        match task {
            DbTask::FetchAll { table, spec, respond_to } => {
                let _ = respond_to.send(query::fetch_all(&conn, &table, &spec));
            }
            DbTask::FetchOne { table, id, columns, respond_to } => {
                let _ = respond_to.send(query::fetch_one(&conn, &table, id, columns.as_deref()));
            }
            DbTask::Insert { table, body, respond_to } => {
                let _ = respond_to.send(query::insert(&conn, &table, &body));
            }
            DbTask::Update { table, id, body, respond_to } => {
                let _ = respond_to.send(query::update(&conn, &table, id, &body));
            }
            DbTask::Delete { table, id, respond_to } => {
                let _ = respond_to.send(query::delete(&conn, &table, id));
            }
            DbTask::ExecRows { sql, respond_to } => {
                let _ = respond_to.send(exec::run_rows(&conn, &sql));
            }
            DbTask::ExecCount { sql, respond_to } => {
                let _ = respond_to.send(exec::run_count(&conn, &sql));
            }
            DbTask::Tables { respond_to } => {
                let _ = respond_to.send(schema::list_tables(&conn));
            }
            DbTask::TableSchema { table, respond_to } => {
                let _ = respond_to.send(introspect_existing(&conn, &table, schema::table_schema));
            }
            DbTask::ForeignKeys { table, respond_to } => {
                let _ = respond_to.send(introspect_existing(&conn, &table, schema::foreign_keys));
            }
            DbTask::DbInfo { respond_to } => {
                let _ = respond_to.send(schema::db_info(&conn));
            }
            DbTask::Ping { respond_to } => {
                let _ = respond_to.send(schema::ping(&conn));
            }
        }
    }
}

/// Existence gate for the metadata endpoints: the table must be listed
/// before its pragma is consulted.
fn introspect_existing<T>(
    conn: &Connection,
    table: &str,
    lookup: impl Fn(&Connection, &str) -> AppResult<T>,
) -> AppResult<T> {
    let tables = schema::list_tables(conn)?;
    if !tables.iter().any(|t| t == table) {
        return Err(AppError::NotFound(format!("Table not found: {table}")));
    }
    lookup(conn, table)
}

fn respond_err(task: DbTask, err: AppError) {
    match task {
        DbTask::FetchAll { respond_to, .. } => drop(respond_to.send(Err(err))),
        DbTask::FetchOne { respond_to, .. } => drop(respond_to.send(Err(err))),
        DbTask::Insert { respond_to, .. } => drop(respond_to.send(Err(err))),
        DbTask::Update { respond_to, .. } => drop(respond_to.send(Err(err))),
        DbTask::Delete { respond_to, .. } => drop(respond_to.send(Err(err))),
        DbTask::ExecRows { respond_to, .. } => drop(respond_to.send(Err(err))),
        DbTask::ExecCount { respond_to, .. } => drop(respond_to.send(Err(err))),
        DbTask::Tables { respond_to } => drop(respond_to.send(Err(err))),
        DbTask::TableSchema { respond_to, .. } => drop(respond_to.send(Err(err))),
        DbTask::ForeignKeys { respond_to, .. } => drop(respond_to.send(Err(err))),
        DbTask::DbInfo { respond_to } => drop(respond_to.send(Err(err))),
        DbTask::Ping { respond_to } => drop(respond_to.send(Err(err))),
    }
}

fn open_conn(path: &Path) -> AppResult<Connection> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE;
    let conn = Connection::open_with_flags(path, flags).map_err(|source| AppError::DbOpenFailed {
        path: path.to_path_buf(),
        message: source.to_string(),
    })?;
    let _ = conn.busy_timeout(std::time::Duration::from_millis(BUSY_TIMEOUT_MS));
    Ok(conn)
}

use rusqlite::Connection;

use crate::core::types::{ColumnMeta, DbInfo, ForeignKeyMeta};
use crate::error::{AppError, AppResult};

/// User tables in name order, skipping the engine's own bookkeeping
/// (`sqlite_sequence` and friends).
pub fn list_tables(conn: &Connection) -> AppResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )?;
    let rows = stmt
        .query_map([], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Column metadata via `PRAGMA table_info`, in catalog order. The pragma
/// returns an empty set for unknown tables instead of failing; callers must
/// check existence against `list_tables` first.
pub fn table_schema(conn: &Connection, table: &str) -> AppResult<Vec<ColumnMeta>> {
    // PRAGMA arguments are not bindable; the identifier must be vetted
    // before it is spliced.
    ensure_safe_identifier(table)?;
    let sql = format!("PRAGMA table_info({table})");
    let mut stmt = conn.prepare(&sql)?;
    let cols = stmt
        .query_map([], |row| {
            Ok(ColumnMeta {
                cid: row.get("cid")?,
                name: row.get("name")?,
                decl_type: row.get("type")?,
                notnull: row.get::<_, i64>("notnull")? != 0,
                default_val: row.get("dflt_value")?,
                pk: row.get::<_, i64>("pk")? != 0,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(cols)
}

/// Relationships via `PRAGMA foreign_key_list`. Same existence caveat as
/// `table_schema`.
pub fn foreign_keys(conn: &Connection, table: &str) -> AppResult<Vec<ForeignKeyMeta>> {
    ensure_safe_identifier(table)?;
    let sql = format!("PRAGMA foreign_key_list({table})");
    let mut stmt = conn.prepare(&sql)?;
    let keys = stmt
        .query_map([], |row| {
            Ok(ForeignKeyMeta {
                id: row.get("id")?,
                seq: row.get("seq")?,
                table: row.get("table")?,
                from: row.get("from")?,
                to: row.get("to")?,
                on_update: row.get("on_update")?,
                on_delete: row.get("on_delete")?,
                match_action: row.get("match")?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(keys)
}

/// Engine version, table list, and the approximate on-disk size
/// (page_count * page_size). A failing size pragma degrades to -1 rather
/// than failing the whole request.
pub fn db_info(conn: &Connection) -> AppResult<DbInfo> {
    let sqlite_version: String = conn.query_row("SELECT sqlite_version()", [], |r| r.get(0))?;
    let tables = list_tables(conn)?;

    let page_count: i64 = conn
        .query_row("PRAGMA page_count", [], |r| r.get(0))
        .unwrap_or(-1);
    let page_size: i64 = conn
        .query_row("PRAGMA page_size", [], |r| r.get(0))
        .unwrap_or(-1);

    Ok(DbInfo {
        sqlite_version,
        tables,
        database_size: page_count * page_size,
    })
}

/// Cheap liveness probe used by the health endpoint.
pub fn ping(conn: &Connection) -> AppResult<()> {
    conn.query_row("SELECT 1", [], |r| r.get::<_, i64>(0))
        .map_err(|e| AppError::Internal(format!("Database ping failed: {e}")))?;
    Ok(())
}

pub(crate) fn is_safe_identifier(s: &str) -> bool {
    // Minimal safe subset: [A-Za-z_][A-Za-z0-9_]*
    let mut chars = s.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !(first.is_ascii_alphabetic() || first == '_') {
        return false;
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub(crate) fn ensure_safe_identifier(s: &str) -> AppResult<()> {
    if is_safe_identifier(s) {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!("invalid identifier: {s}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE authors (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
             CREATE TABLE books (
                 id INTEGER PRIMARY KEY,
                 title TEXT,
                 author_id INTEGER DEFAULT 1,
                 FOREIGN KEY (author_id) REFERENCES authors(id) ON DELETE CASCADE
             );
             CREATE TABLE zeta (id INTEGER PRIMARY KEY);",
        )
        .unwrap();
        conn
    }

    #[test]
    fn tables_are_listed_in_name_order_without_internals() {
        let conn = test_conn();
        // sqlite_sequence would appear here if an AUTOINCREMENT table existed;
        // the NOT LIKE filter covers the whole sqlite_ namespace.
        assert_eq!(list_tables(&conn).unwrap(), vec!["authors", "books", "zeta"]);
    }

    #[test]
    fn table_schema_reports_catalog_metadata() {
        let conn = test_conn();
        let cols = table_schema(&conn, "books").unwrap();
        assert_eq!(cols.len(), 3);
        assert_eq!(cols[0].name, "id");
        assert!(cols[0].pk);
        assert_eq!(cols[0].decl_type, "INTEGER");
        assert_eq!(cols[1].name, "title");
        assert!(!cols[1].notnull);
        assert_eq!(cols[2].default_val.as_deref(), Some("1"));
    }

    #[test]
    fn unknown_table_yields_an_empty_schema() {
        let conn = test_conn();
        assert!(table_schema(&conn, "missing").unwrap().is_empty());
    }

    #[test]
    fn foreign_keys_report_the_relationship() {
        let conn = test_conn();
        let fks = foreign_keys(&conn, "books").unwrap();
        assert_eq!(fks.len(), 1);
        assert_eq!(fks[0].table, "authors");
        assert_eq!(fks[0].from, "author_id");
        assert_eq!(fks[0].to, "id");
        assert_eq!(fks[0].on_delete, "CASCADE");
        assert!(foreign_keys(&conn, "authors").unwrap().is_empty());
    }

    #[test]
    fn db_info_reports_version_and_size() {
        let conn = test_conn();
        let info = db_info(&conn).unwrap();
        assert!(!info.sqlite_version.is_empty());
        assert_eq!(info.tables.len(), 3);
        assert!(info.database_size != 0);
    }

    #[test]
    fn identifier_validation_rejects_sql_fragments() {
        assert!(is_safe_identifier("books"));
        assert!(is_safe_identifier("_hidden2"));
        assert!(!is_safe_identifier(""));
        assert!(!is_safe_identifier("2fast"));
        assert!(!is_safe_identifier("books; DROP TABLE books"));
        assert!(!is_safe_identifier("a-b"));
    }
}

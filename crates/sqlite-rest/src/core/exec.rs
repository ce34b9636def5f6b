use rusqlite::Connection;

use crate::core::query;
use crate::core::types::DbRow;
use crate::error::AppResult;

/// Substrings that make a raw query unsafe unless the operator overrides
/// the list. PRAGMA is deliberately absent so data-returning pragmas work.
pub const DEFAULT_DANGEROUS_OPS: &[&str] = &[
    "DROP TABLE",
    "DROP DATABASE",
    "DELETE FROM",
    "TRUNCATE TABLE",
    "ALTER TABLE",
    "ATTACH DATABASE",
    "DETACH DATABASE",
];

/// Statement kind derived from the leading keyword. Decided exactly once
/// per request, before anything reaches the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Select,
    Insert,
    Update,
    Create,
    Pragma,
    Explain,
    Analyze,
    ShowTables,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultShape {
    Rows,
    AffectedCount,
}

impl QueryKind {
    pub fn classify(sql: &str) -> Self {
        let upper = sql.trim().to_uppercase();
        if upper.starts_with("SELECT") {
            QueryKind::Select
        } else if upper.starts_with("INSERT") {
            QueryKind::Insert
        } else if upper.starts_with("UPDATE") {
            QueryKind::Update
        } else if upper.starts_with("CREATE") {
            QueryKind::Create
        } else if upper.starts_with("SHOW TABLES") || upper.starts_with("LIST TABLES") {
            QueryKind::ShowTables
        } else if upper.starts_with("PRAGMA") {
            QueryKind::Pragma
        } else if upper.starts_with("EXPLAIN") {
            QueryKind::Explain
        } else if upper.starts_with("ANALYZE") {
            QueryKind::Analyze
        } else {
            QueryKind::Other
        }
    }

    pub fn result_shape(self) -> ResultShape {
        match self {
            QueryKind::Select
            | QueryKind::Pragma
            | QueryKind::Explain
            | QueryKind::Analyze
            | QueryKind::ShowTables => ResultShape::Rows,
            QueryKind::Insert | QueryKind::Update | QueryKind::Create | QueryKind::Other => {
                ResultShape::AffectedCount
            }
        }
    }

    /// Wire name used in the exec response's `type` field.
    pub fn as_str(self) -> &'static str {
        match self {
            QueryKind::Select => "select",
            QueryKind::Insert => "insert",
            QueryKind::Update => "update",
            QueryKind::Create => "create",
            QueryKind::Pragma => "pragma",
            QueryKind::Explain => "explain",
            QueryKind::Analyze => "analyze",
            QueryKind::ShowTables => "show_tables",
            QueryKind::Other => "other",
        }
    }
}

/// Substring scan over the upper-cased query. Matches anywhere, including
/// inside string literals and comments; that over- and under-blocking is
/// observable API behavior and is kept as-is.
pub fn is_query_safe(query: &str, dangerous_ops: &[String]) -> bool {
    if dangerous_ops.is_empty() {
        return true;
    }
    let upper = query.to_uppercase();
    !dangerous_ops
        .iter()
        .filter(|op| !op.is_empty())
        .any(|op| upper.contains(op.as_str()))
}

/// Row-shaped execution path, sharing the CRUD marshalling.
pub fn run_rows(conn: &Connection, sql: &str) -> AppResult<Vec<DbRow>> {
    query::select_rows(conn, sql, &[])
}

/// Count-shaped execution path.
pub fn run_count(conn: &Connection, sql: &str) -> AppResult<u64> {
    let changed = conn.execute(sql, [])?;
    Ok(changed as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn deny(ops: &[&str]) -> Vec<String> {
        ops.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn default_deny_list_blocks_anywhere_in_the_query() {
        let ops = deny(DEFAULT_DANGEROUS_OPS);
        assert!(!is_query_safe("DROP TABLE users", &ops));
        assert!(!is_query_safe("drop table users", &ops));
        assert!(!is_query_safe("SELECT 1; DELETE FROM users", &ops));
        // Known approximation: a literal mentioning a denied phrase is
        // blocked too.
        assert!(!is_query_safe("SELECT 'DELETE FROM users'", &ops));
        assert!(is_query_safe("SELECT * FROM users", &ops));
        assert!(is_query_safe("PRAGMA table_info(users)", &ops));
    }

    #[test]
    fn empty_deny_list_allows_everything() {
        assert!(is_query_safe("DROP TABLE users", &[]));
    }

    #[test]
    fn custom_deny_list_replaces_the_default() {
        let ops = deny(&["VACUUM"]);
        assert!(!is_query_safe("vacuum", &ops));
        assert!(is_query_safe("DROP TABLE users", &ops));
    }

    #[test]
    fn kinds_follow_the_leading_keyword() {
        assert_eq!(QueryKind::classify("  select 1"), QueryKind::Select);
        assert_eq!(QueryKind::classify("INSERT INTO t VALUES (1)"), QueryKind::Insert);
        assert_eq!(QueryKind::classify("update t set a=1"), QueryKind::Update);
        assert_eq!(QueryKind::classify("CREATE TABLE t (id)"), QueryKind::Create);
        assert_eq!(QueryKind::classify("show tables"), QueryKind::ShowTables);
        assert_eq!(QueryKind::classify("LIST TABLES"), QueryKind::ShowTables);
        assert_eq!(QueryKind::classify("PRAGMA page_count"), QueryKind::Pragma);
        assert_eq!(QueryKind::classify("EXPLAIN SELECT 1"), QueryKind::Explain);
        assert_eq!(QueryKind::classify("ANALYZE"), QueryKind::Analyze);
        assert_eq!(QueryKind::classify("DELETE FROM t"), QueryKind::Other);
        assert_eq!(QueryKind::classify("WITH x AS (SELECT 1) SELECT * FROM x"), QueryKind::Other);
    }

    #[test]
    fn shapes_split_rows_from_counts() {
        for kind in [
            QueryKind::Select,
            QueryKind::Pragma,
            QueryKind::Explain,
            QueryKind::Analyze,
            QueryKind::ShowTables,
        ] {
            assert_eq!(kind.result_shape(), ResultShape::Rows, "{kind:?}");
        }
        for kind in [QueryKind::Insert, QueryKind::Update, QueryKind::Create, QueryKind::Other] {
            assert_eq!(kind.result_shape(), ResultShape::AffectedCount, "{kind:?}");
        }
    }

    #[test]
    fn run_rows_marshals_select_output() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT);
             INSERT INTO t (name) VALUES ('a'), (NULL);",
        )
        .unwrap();
        let rows = run_rows(&conn, "SELECT * FROM t ORDER BY id").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["name"], json!("a"));
        assert_eq!(rows[1]["name"], serde_json::Value::Null);
    }

    #[test]
    fn run_count_reports_affected_rows() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE t (id INTEGER PRIMARY KEY, qty INTEGER);
             INSERT INTO t (qty) VALUES (1), (2), (3);",
        )
        .unwrap();
        assert_eq!(run_count(&conn, "UPDATE t SET qty = 0").unwrap(), 3);
    }

    #[test]
    fn invalid_sql_is_a_client_error() {
        let conn = Connection::open_in_memory().unwrap();
        let err = run_rows(&conn, "SELEC 1").unwrap_err();
        assert_eq!(err.status_code(), 400);
        let err = run_count(&conn, "UPDATE missing SET a = 1").unwrap_err();
        assert_eq!(err.status_code(), 400);
    }
}

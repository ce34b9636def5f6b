use rusqlite::{params_from_iter, Connection};

use crate::core::marshal::{self, TypeFamily};
use crate::core::schema;
use crate::core::types::{BodyValue, DbRow, FilterExpr, QuerySpec};
use crate::error::{AppError, AppResult};

/// Operators accepted in structured filters. Anything else would be spliced
/// into statement text, so the set is closed.
const FILTER_OPERATORS: &[&str] = &[
    "=", "!=", "<>", "<", "<=", ">", ">=", "LIKE", "NOT LIKE", "GLOB", "IS", "IS NOT",
];

/// Fetches a page of rows. Clauses are appended only when the spec carries
/// them; filter values, limit and offset are bound, identifiers are checked
/// against the table's real column set first.
pub fn fetch_all(conn: &Connection, table: &str, spec: &QuerySpec) -> AppResult<Vec<DbRow>> {
    let columns = table_column_names(conn, table)?;
    let projection = build_projection(spec.columns.as_deref(), &columns)?;

    let mut sql = format!("SELECT {projection} FROM {table}");
    let mut params: Vec<BodyValue> = Vec::new();

    match &spec.filter {
        // The raw form is a pre-formed boolean expression and goes in
        // verbatim; the engine's own error is classified on the way out.
        Some(FilterExpr::Raw(expr)) => {
            sql.push_str(" WHERE ");
            sql.push_str(expr);
        }
        Some(FilterExpr::Structured(filters)) => {
            let mut parts = Vec::with_capacity(filters.len());
            for f in filters {
                ensure_column(&columns, &f.column)?;
                let op = normalize_operator(&f.operator)?;
                parts.push(format!("{} {} ?", f.column, op));
                params.push(BodyValue::Text(f.value.clone()));
            }
            sql.push_str(" WHERE ");
            sql.push_str(&parts.join(" AND "));
        }
        None => {}
    }

    if let Some(order_by) = &spec.order_by {
        ensure_column(&columns, order_by)?;
        sql.push_str(" ORDER BY ");
        sql.push_str(order_by);
        if let Some(dir) = spec.order_dir {
            sql.push(' ');
            sql.push_str(dir.as_sql());
        }
    }

    if let Some(limit) = spec.limit {
        sql.push_str(" LIMIT ?");
        params.push(BodyValue::Int(limit));
        if let Some(offset) = spec.offset {
            sql.push_str(" OFFSET ?");
            params.push(BodyValue::Int(offset));
        }
    }

    select_rows(conn, &sql, &params)
}

/// Single-row fetch by primary-key equality.
pub fn fetch_one(
    conn: &Connection,
    table: &str,
    id: i64,
    projection: Option<&[String]>,
) -> AppResult<DbRow> {
    let columns = table_column_names(conn, table)?;
    let cols = build_projection(projection, &columns)?;
    let sql = format!("SELECT {cols} FROM {table} WHERE id = ?");
    let rows = select_rows(conn, &sql, &[BodyValue::Int(id)])?;
    rows.into_iter()
        .next()
        .ok_or_else(|| AppError::NotFound(format!("Record with ID {id} not found")))
}

/// Inserts the body's column map and returns the engine-assigned row id.
pub fn insert(conn: &Connection, table: &str, body: &[(String, BodyValue)]) -> AppResult<i64> {
    let columns = table_column_names(conn, table)?;
    for (name, _) in body {
        ensure_column(&columns, name)?;
    }

    let names: Vec<&str> = body.iter().map(|(name, _)| name.as_str()).collect();
    let placeholders = vec!["?"; body.len()].join(", ");
    let sql = format!(
        "INSERT INTO {table} ({}) VALUES ({placeholders})",
        names.join(", ")
    );
    conn.execute(&sql, params_from_iter(body.iter().map(|(_, v)| v)))?;
    Ok(conn.last_insert_rowid())
}

/// Applies the body's column map to one row; zero affected rows means the
/// id does not exist.
pub fn update(
    conn: &Connection,
    table: &str,
    id: i64,
    body: &[(String, BodyValue)],
) -> AppResult<()> {
    let columns = table_column_names(conn, table)?;
    for (name, _) in body {
        ensure_column(&columns, name)?;
    }

    let assignments: Vec<String> = body.iter().map(|(name, _)| format!("{name} = ?")).collect();
    let sql = format!(
        "UPDATE {table} SET {} WHERE id = ?",
        assignments.join(", ")
    );

    let mut params: Vec<BodyValue> = body.iter().map(|(_, v)| v.clone()).collect();
    params.push(BodyValue::Int(id));
    let changed = conn.execute(&sql, params_from_iter(params.iter()))?;
    if changed == 0 {
        return Err(AppError::NotFound(format!("Record with ID {id} not found")));
    }
    Ok(())
}

pub fn delete(conn: &Connection, table: &str, id: i64) -> AppResult<()> {
    // Validates the table exists as a side effect.
    table_column_names(conn, table)?;
    let sql = format!("DELETE FROM {table} WHERE id = ?");
    let changed = conn.execute(&sql, [id])?;
    if changed == 0 {
        return Err(AppError::NotFound(format!("Record with ID {id} not found")));
    }
    Ok(())
}

/// Runs a row-returning statement and marshals every row through the
/// declared-type families. Shared by the CRUD reads and the exec endpoint.
pub fn select_rows(conn: &Connection, sql: &str, params: &[BodyValue]) -> AppResult<Vec<DbRow>> {
    let mut stmt = conn.prepare(sql)?;
    let columns = stmt.columns();
    let names: Vec<String> = columns.iter().map(|c| c.name().to_string()).collect();
    let families: Vec<TypeFamily> = columns
        .iter()
        .map(|c| marshal::classify_decl_type(c.decl_type()))
        .collect();
    drop(columns);

    let mut out = Vec::new();
    let mut rows = stmt.query(params_from_iter(params.iter()))?;
    while let Some(row) = rows.next()? {
        out.push(marshal::row_to_json(row, &names, &families)?);
    }
    Ok(out)
}

/// The allow-list gate for spliced identifiers: the table must exist and
/// every referenced column must be one of its real columns.
fn table_column_names(conn: &Connection, table: &str) -> AppResult<Vec<String>> {
    schema::ensure_safe_identifier(table)?;
    let tables = schema::list_tables(conn)?;
    if !tables.iter().any(|t| t == table) {
        return Err(AppError::BadRequest(format!("Table not found: {table}")));
    }
    Ok(schema::table_schema(conn, table)?
        .into_iter()
        .map(|c| c.name)
        .collect())
}

fn ensure_column(columns: &[String], name: &str) -> AppResult<()> {
    if columns.iter().any(|c| c == name) {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!("no such column: {name}")))
    }
}

fn build_projection(requested: Option<&[String]>, columns: &[String]) -> AppResult<String> {
    match requested {
        None => Ok("*".to_string()),
        Some(cols) => {
            for col in cols {
                ensure_column(columns, col)?;
            }
            Ok(cols.join(", "))
        }
    }
}

fn normalize_operator(op: &str) -> AppResult<&'static str> {
    let wanted = op.trim().to_uppercase();
    FILTER_OPERATORS
        .iter()
        .find(|known| **known == wanted)
        .copied()
        .ok_or_else(|| AppError::BadRequest(format!("Unsupported filter operator: {op}")))
}

use rusqlite::types::ValueRef;
use rusqlite::Row;
use serde_json::Value;

use crate::core::types::DbRow;
use crate::error::{AppError, AppResult};

/// Declared-type family driving the JSON shape of a cell. SQLite's declared
/// type is a hint, not a guarantee; the stored value may still be anything,
/// including NULL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeFamily {
    Integer,
    Real,
    Blob,
    Text,
    Boolean,
}

/// Case-insensitive exact match on the declared type, per the SQLite
/// affinity name list. No declared type (expressions, PRAGMA output) and
/// anything unrecognized fall back to text.
pub fn classify_decl_type(decl: Option<&str>) -> TypeFamily {
    let Some(decl) = decl else {
        return TypeFamily::Text;
    };
    match decl.to_uppercase().as_str() {
        "PRIMARY_KEY" | "INTEGER" | "INT" | "TINYINT" | "SMALLINT" | "MEDIUMINT" | "BIGINT"
        | "UNSIGNED BIG INT" | "INT2" | "INT8" | "DECIMAL" => TypeFamily::Integer,
        "REAL" | "DOUBLE" | "DOUBLE PRECISION" | "FLOAT" | "NUMERIC" => TypeFamily::Real,
        "BLOB" => TypeFamily::Blob,
        "TEXT" | "CHARACTER" | "VARCHAR" | "VARYING CHARACTER" | "NCHAR" | "NATIVE CHARACTER"
        | "NVARCHAR" | "CLOB" | "DATE" | "DATETIME" => TypeFamily::Text,
        "BOOLEAN" | "BOOL" => TypeFamily::Boolean,
        _ => TypeFamily::Text,
    }
}

/// Materializes one physical row into a JSON object, column by column.
/// Duplicate column names collapse with last-value-wins.
pub fn row_to_json(row: &Row<'_>, names: &[String], families: &[TypeFamily]) -> AppResult<DbRow> {
    let mut out = DbRow::new();
    for (i, name) in names.iter().enumerate() {
        let cell = row.get_ref(i)?;
        out.insert(name.clone(), cell_to_json(name, families[i], cell)?);
    }
    Ok(out)
}

/// Converts one cell into its JSON representation for the column's family.
/// NULL always becomes JSON null (except BLOB, whose absence renders as the
/// empty string). A value the family cannot absorb is a database error.
pub fn cell_to_json(column: &str, family: TypeFamily, cell: ValueRef<'_>) -> AppResult<Value> {
    match family {
        TypeFamily::Integer => match cell {
            ValueRef::Null => Ok(Value::Null),
            ValueRef::Integer(i) => Ok(Value::from(i)),
            ValueRef::Text(t) => {
                let s = String::from_utf8_lossy(t);
                s.trim()
                    .parse::<i64>()
                    .map(Value::from)
                    .map_err(|_| scan_mismatch(column, "integer", &s))
            }
            other => Err(scan_mismatch(column, "integer", &describe(other))),
        },
        TypeFamily::Real => match cell {
            ValueRef::Null => Ok(Value::Null),
            ValueRef::Real(f) => Ok(float_value(f)),
            ValueRef::Integer(i) => Ok(float_value(i as f64)),
            ValueRef::Text(t) => {
                let s = String::from_utf8_lossy(t);
                s.trim()
                    .parse::<f64>()
                    .map(float_value)
                    .map_err(|_| scan_mismatch(column, "real", &s))
            }
            other => Err(scan_mismatch(column, "real", &describe(other))),
        },
        TypeFamily::Blob => match cell {
            // Absent blob renders as empty text, never as null.
            ValueRef::Null => Ok(Value::from("")),
            ValueRef::Blob(b) => Ok(Value::from(String::from_utf8_lossy(b).into_owned())),
            ValueRef::Text(t) => Ok(Value::from(String::from_utf8_lossy(t).into_owned())),
            ValueRef::Integer(i) => Ok(Value::from(i.to_string())),
            ValueRef::Real(f) => Ok(Value::from(f.to_string())),
        },
        TypeFamily::Text => match cell {
            ValueRef::Null => Ok(Value::Null),
            ValueRef::Text(t) => Ok(Value::from(String::from_utf8_lossy(t).into_owned())),
            ValueRef::Blob(b) => Ok(Value::from(String::from_utf8_lossy(b).into_owned())),
            ValueRef::Integer(i) => Ok(Value::from(i.to_string())),
            ValueRef::Real(f) => Ok(Value::from(f.to_string())),
        },
        TypeFamily::Boolean => match cell {
            ValueRef::Null => Ok(Value::Null),
            ValueRef::Integer(i) => Ok(Value::from(i != 0)),
            ValueRef::Text(t) => {
                let s = String::from_utf8_lossy(t);
                match s.trim() {
                    "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(Value::from(true)),
                    "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(Value::from(false)),
                    other => Err(scan_mismatch(column, "boolean", other)),
                }
            }
            other => Err(scan_mismatch(column, "boolean", &describe(other))),
        },
    }
}

fn float_value(f: f64) -> Value {
    serde_json::Number::from_f64(f)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn scan_mismatch(column: &str, family: &str, got: &str) -> AppError {
    AppError::Internal(format!(
        "Error scanning column {column}: cannot read {got:?} as {family}"
    ))
}

fn describe(cell: ValueRef<'_>) -> String {
    match cell {
        ValueRef::Null => "NULL".into(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(_) => "TEXT".into(),
        ValueRef::Blob(_) => "BLOB".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_types_map_to_their_family() {
        for decl in [
            "INTEGER", "integer", "INT", "TINYINT", "SMALLINT", "MEDIUMINT", "BIGINT",
            "UNSIGNED BIG INT", "INT2", "INT8", "DECIMAL", "PRIMARY_KEY",
        ] {
            assert_eq!(classify_decl_type(Some(decl)), TypeFamily::Integer, "{decl}");
        }
        for decl in ["REAL", "DOUBLE", "DOUBLE PRECISION", "FLOAT", "NUMERIC"] {
            assert_eq!(classify_decl_type(Some(decl)), TypeFamily::Real, "{decl}");
        }
        for decl in [
            "TEXT", "CHARACTER", "VARCHAR", "VARYING CHARACTER", "NCHAR", "NATIVE CHARACTER",
            "NVARCHAR", "CLOB", "DATE", "DATETIME",
        ] {
            assert_eq!(classify_decl_type(Some(decl)), TypeFamily::Text, "{decl}");
        }
        assert_eq!(classify_decl_type(Some("BLOB")), TypeFamily::Blob);
        assert_eq!(classify_decl_type(Some("BOOLEAN")), TypeFamily::Boolean);
        assert_eq!(classify_decl_type(Some("bool")), TypeFamily::Boolean);
    }

    #[test]
    fn unknown_and_missing_types_fall_back_to_text() {
        // Exact family match only: parameterized declarations don't count.
        assert_eq!(classify_decl_type(Some("VARCHAR(255)")), TypeFamily::Text);
        assert_eq!(classify_decl_type(Some("JSONB")), TypeFamily::Text);
        assert_eq!(classify_decl_type(None), TypeFamily::Text);
    }

    #[test]
    fn null_cells_marshal_to_json_null() {
        for family in [TypeFamily::Integer, TypeFamily::Real, TypeFamily::Text, TypeFamily::Boolean]
        {
            let v = cell_to_json("c", family, ValueRef::Null).unwrap();
            assert_eq!(v, Value::Null, "{family:?}");
        }
    }

    #[test]
    fn absent_blob_renders_as_empty_string() {
        let v = cell_to_json("c", TypeFamily::Blob, ValueRef::Null).unwrap();
        assert_eq!(v, Value::from(""));
    }

    #[test]
    fn integer_cells_keep_their_width() {
        let v = cell_to_json("c", TypeFamily::Integer, ValueRef::Integer(i64::MAX)).unwrap();
        assert_eq!(v, Value::from(i64::MAX));
    }

    #[test]
    fn boolean_family_reads_stored_integers() {
        assert_eq!(
            cell_to_json("c", TypeFamily::Boolean, ValueRef::Integer(1)).unwrap(),
            Value::from(true)
        );
        assert_eq!(
            cell_to_json("c", TypeFamily::Boolean, ValueRef::Integer(0)).unwrap(),
            Value::from(false)
        );
    }

    #[test]
    fn mismatched_cells_are_a_database_error() {
        let err = cell_to_json("c", TypeFamily::Integer, ValueRef::Text(b"abc")).unwrap_err();
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn blob_cells_render_as_text() {
        let v = cell_to_json("c", TypeFamily::Blob, ValueRef::Blob(b"abc")).unwrap();
        assert_eq!(v, Value::from("abc"));
    }
}

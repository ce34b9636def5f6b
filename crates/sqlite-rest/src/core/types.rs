use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, AppResult};

/// One materialized result row. `serde_json::Map` keeps keys ordered and
/// collapses duplicate column names with last-value-wins, which is what the
/// wire format promises.
pub type DbRow = serde_json::Map<String, Value>;

/// One column as reported by `PRAGMA table_info`.
#[derive(Debug, Clone, Serialize)]
pub struct ColumnMeta {
    pub cid: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub decl_type: String,
    pub notnull: bool,
    pub default_val: Option<String>,
    pub pk: bool,
}

/// One relationship as reported by `PRAGMA foreign_key_list`.
#[derive(Debug, Clone, Serialize)]
pub struct ForeignKeyMeta {
    pub id: i64,
    pub seq: i64,
    pub table: String,
    pub from: String,
    pub to: String,
    pub on_update: String,
    pub on_delete: String,
    #[serde(rename = "match")]
    pub match_action: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DbInfo {
    pub sqlite_version: String,
    pub tables: Vec<String>,
    /// page_count * page_size; negative when either pragma failed.
    pub database_size: i64,
}

/// A structured filter triple. The value is always a string literal from the
/// transport layer, whatever the target column's affinity.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Filter {
    pub column: String,
    pub operator: String,
    pub value: String,
}

/// Either a pre-formed boolean expression or AND-combined triples. Supplying
/// both forms in one request is a client error.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpr {
    Raw(String),
    Structured(Vec<Filter>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDir {
    Asc,
    Desc,
}

impl OrderDir {
    pub fn as_sql(self) -> &'static str {
        match self {
            OrderDir::Asc => "ASC",
            OrderDir::Desc => "DESC",
        }
    }
}

/// Everything a list request may ask for, parsed and validated from the
/// query string. Identifier existence is checked later against the schema.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuerySpec {
    pub columns: Option<Vec<String>>,
    pub filter: Option<FilterExpr>,
    pub order_by: Option<String>,
    pub order_dir: Option<OrderDir>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl QuerySpec {
    /// Builds a spec from decoded query-string parameters, enforcing the
    /// cross-parameter invariants: the two filter forms are mutually
    /// exclusive, offset requires limit, order_dir requires order_by.
    pub fn from_params(params: &HashMap<String, String>) -> AppResult<Self> {
        let non_empty = |key: &str| params.get(key).map(|s| s.as_str()).filter(|s| !s.is_empty());

        let columns = non_empty("cols")
            .map(|s| s.split(',').map(|c| c.trim().to_string()).collect::<Vec<_>>());

        let raw = non_empty("filters_raw");
        let structured = non_empty("filters");
        let filter = match (raw, structured) {
            (Some(_), Some(_)) => {
                return Err(AppError::BadRequest(
                    "Cannot use both filters and filters_raw parameters".into(),
                ));
            }
            (Some(expr), None) => Some(FilterExpr::Raw(expr.to_string())),
            (None, Some(json)) => {
                let triples: Vec<Filter> = serde_json::from_str(json)
                    .map_err(|e| AppError::BadRequest(format!("Invalid filters format: {e}")))?;
                Some(FilterExpr::Structured(triples))
            }
            (None, None) => None,
        };

        let limit = non_empty("limit")
            .map(|s| {
                s.parse::<i64>()
                    .map_err(|e| AppError::BadRequest(format!("Invalid limit parameter: {e}")))
            })
            .transpose()?;

        let offset = non_empty("offset")
            .map(|s| {
                s.parse::<i64>()
                    .map_err(|e| AppError::BadRequest(format!("Invalid offset parameter: {e}")))
            })
            .transpose()?;
        if offset.is_some() && limit.is_none() {
            return Err(AppError::BadRequest(
                "Cannot use offset parameter without limit parameter".into(),
            ));
        }

        let order_by = non_empty("order_by").map(|s| s.to_string());
        let order_dir = non_empty("order_dir")
            .map(|s| match s.to_uppercase().as_str() {
                "ASC" => Ok(OrderDir::Asc),
                "DESC" => Ok(OrderDir::Desc),
                other => Err(AppError::BadRequest(format!(
                    "Invalid order_dir parameter: {other}"
                ))),
            })
            .transpose()?;
        if order_dir.is_some() && order_by.is_none() {
            return Err(AppError::BadRequest(
                "Cannot use order_dir parameter without order_by parameter".into(),
            ));
        }

        Ok(Self {
            columns,
            filter,
            order_by,
            order_dir,
            limit,
            offset,
        })
    }
}

/// A JSON body value after the one-time classification at the transport
/// boundary. Bound as a statement parameter, never rendered into SQL text.
#[derive(Debug, Clone, PartialEq)]
pub enum BodyValue {
    Null,
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl BodyValue {
    pub fn from_json(value: &Value) -> AppResult<Self> {
        match value {
            Value::Null => Ok(BodyValue::Null),
            Value::Bool(b) => Ok(BodyValue::Bool(*b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(BodyValue::Int(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(BodyValue::Float(f))
                } else {
                    Err(AppError::BadRequest(format!("Unsupported number: {n}")))
                }
            }
            Value::String(s) => Ok(BodyValue::Text(s.clone())),
            Value::Array(_) | Value::Object(_) => Err(AppError::BadRequest(
                "Nested arrays and objects are not valid column values".into(),
            )),
        }
    }
}

impl rusqlite::ToSql for BodyValue {
    fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
        use rusqlite::types::{ToSqlOutput, Value as SqlValue, ValueRef};
        Ok(match self {
            BodyValue::Null => ToSqlOutput::Owned(SqlValue::Null),
            BodyValue::Int(i) => ToSqlOutput::Owned(SqlValue::Integer(*i)),
            BodyValue::Float(f) => ToSqlOutput::Owned(SqlValue::Real(*f)),
            BodyValue::Bool(b) => ToSqlOutput::Owned(SqlValue::Integer(i64::from(*b))),
            BodyValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

/// Parses a CRUD request body into (column, value) pairs. Rejects anything
/// that is not a non-empty JSON object.
pub fn parse_body(raw: &str) -> AppResult<Vec<(String, BodyValue)>> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| AppError::BadRequest(format!("Invalid request body: {e}")))?;
    let obj = value
        .as_object()
        .ok_or_else(|| AppError::BadRequest("Request body must be a JSON object".into()))?;
    if obj.is_empty() {
        return Err(AppError::BadRequest("Missing data in request body".into()));
    }
    obj.iter()
        .map(|(k, v)| Ok((k.clone(), BodyValue::from_json(v)?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn empty_params_build_a_default_spec() {
        let spec = QuerySpec::from_params(&params(&[])).unwrap();
        assert_eq!(spec, QuerySpec::default());
    }

    #[test]
    fn both_filter_forms_are_rejected() {
        let err = QuerySpec::from_params(&params(&[
            ("filters_raw", "id > 3"),
            ("filters", r#"[{"column":"id","operator":">","value":"3"}]"#),
        ]))
        .unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn offset_without_limit_is_rejected() {
        let err = QuerySpec::from_params(&params(&[("offset", "10")])).unwrap_err();
        assert_eq!(err.status_code(), 400);
        let ok = QuerySpec::from_params(&params(&[("limit", "5"), ("offset", "10")])).unwrap();
        assert_eq!(ok.limit, Some(5));
        assert_eq!(ok.offset, Some(10));
    }

    #[test]
    fn order_dir_without_order_by_is_rejected() {
        let err = QuerySpec::from_params(&params(&[("order_dir", "desc")])).unwrap_err();
        assert_eq!(err.status_code(), 400);
        let ok =
            QuerySpec::from_params(&params(&[("order_by", "name"), ("order_dir", "desc")])).unwrap();
        assert_eq!(ok.order_dir, Some(OrderDir::Desc));
    }

    #[test]
    fn order_dir_must_be_asc_or_desc() {
        let err = QuerySpec::from_params(&params(&[
            ("order_by", "name"),
            ("order_dir", "sideways"),
        ]))
        .unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn structured_filters_parse_from_json() {
        let spec = QuerySpec::from_params(&params(&[(
            "filters",
            r#"[{"column":"name","operator":"=","value":"a"}]"#,
        )]))
        .unwrap();
        match spec.filter {
            Some(FilterExpr::Structured(fs)) => {
                assert_eq!(fs.len(), 1);
                assert_eq!(fs[0].column, "name");
            }
            other => panic!("unexpected filter: {other:?}"),
        }
    }

    #[test]
    fn malformed_structured_filters_are_a_client_error() {
        let err =
            QuerySpec::from_params(&params(&[("filters", "not json")])).unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn body_values_classify_by_json_type() {
        assert_eq!(
            BodyValue::from_json(&serde_json::json!(null)).unwrap(),
            BodyValue::Null
        );
        assert_eq!(
            BodyValue::from_json(&serde_json::json!(7)).unwrap(),
            BodyValue::Int(7)
        );
        assert_eq!(
            BodyValue::from_json(&serde_json::json!(1.5)).unwrap(),
            BodyValue::Float(1.5)
        );
        assert_eq!(
            BodyValue::from_json(&serde_json::json!(true)).unwrap(),
            BodyValue::Bool(true)
        );
        assert_eq!(
            BodyValue::from_json(&serde_json::json!("x")).unwrap(),
            BodyValue::Text("x".into())
        );
        assert!(BodyValue::from_json(&serde_json::json!([1])).is_err());
    }

    #[test]
    fn empty_body_is_rejected() {
        let err = parse_body("{}").unwrap_err();
        assert_eq!(err.status_code(), 400);
        let err = parse_body("not json").unwrap_err();
        assert_eq!(err.status_code(), 400);
        let err = parse_body("[1,2]").unwrap_err();
        assert_eq!(err.status_code(), 400);
    }
}

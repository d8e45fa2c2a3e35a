//! Query validator (C6): shape-checks the JSON query, enforces the
//! single-dataset-id rule, resolves keys against the dataset's field set,
//! and validates TRANSFORMATIONS coherence. Produces a fully-resolved
//! [`Query`] that the rest of the pipeline (C7-C9) executes without
//! revisiting shape.

use std::collections::HashSet;

use serde_json::Value;

use crate::error::Error;
use crate::model::{is_numeric_field, DatasetKind};

#[derive(Debug, Clone, PartialEq)]
pub enum WhereNode {
    Empty,
    And(Vec<WhereNode>),
    Or(Vec<WhereNode>),
    Not(Box<WhereNode>),
    Gt(String, f64),
    Lt(String, f64),
    Eq(String, f64),
    Is(String, String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Max,
    Min,
    Avg,
    Sum,
    Count,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApplyRule {
    pub key: String,
    pub op: Op,
    pub field: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    pub group: Vec<String>,
    pub apply: Vec<ApplyRule>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dir {
    Up,
    Down,
}

/// A resolved COLUMNS entry. `Field` keeps both the original dataset key
/// (e.g. `"sections_avg"`, used verbatim as the output record's JSON key)
/// and the bare field name (`"avg"`, used to look the value up on a row or
/// grouped row) — COLUMNS is echoed back key-for-key in results, but row
/// lookup is keyed by the kind's closed field set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Column {
    Field { key: String, field: String },
    Apply(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub dir: Dir,
    pub keys: Vec<Column>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub dataset_id: String,
    pub where_node: WhereNode,
    pub columns: Vec<Column>,
    pub order: Option<Order>,
    pub transform: Option<Transform>,
}

/// Finds the single dataset id referenced by the query, without yet
/// knowing the dataset's kind. The facade calls this first so it knows
/// which dataset to load before full field-level validation can proceed.
pub fn resolve_dataset_id(value: &Value) -> Result<String, Error> {
    let mut ids = HashSet::new();
    collect_ids(value, &mut ids);
    match ids.len() {
        1 => Ok(ids.into_iter().next().unwrap()),
        0 => Err(Error::InvalidQuery("query does not reference any dataset".into())),
        _ => Err(Error::InvalidQuery(format!(
            "query references more than one dataset: {ids:?}"
        ))),
    }
}

fn collect_ids(value: &Value, ids: &mut HashSet<String>) {
    match value {
        Value::String(s) => {
            if let Some((id, _)) = split_key(s) {
                ids.insert(id);
            }
        }
        Value::Array(items) => items.iter().for_each(|v| collect_ids(v, ids)),
        Value::Object(map) => map.values().for_each(|v| collect_ids(v, ids)),
        _ => {}
    }
}

fn split_key(key: &str) -> Option<(String, String)> {
    key.split_once('_').map(|(id, field)| (id.to_string(), field.to_string()))
}

impl Query {
    /// Full validation: shape, single-dataset-id consistency, key
    /// resolution against `kind`'s closed field set, and TRANSFORMATIONS
    /// coherence. `dataset_id` is the id already resolved by
    /// [`resolve_dataset_id`] and confirmed to exist.
    pub fn parse(value: &Value, dataset_id: &str, kind: DatasetKind) -> Result<Query, Error> {
        let obj = value
            .as_object()
            .ok_or_else(|| Error::InvalidQuery("query must be a JSON object".into()))?;

        let where_value = obj
            .get("WHERE")
            .ok_or_else(|| Error::InvalidQuery("query missing required 'WHERE'".into()))?;
        let where_node = parse_where(where_value, dataset_id, kind)?;

        let options = obj
            .get("OPTIONS")
            .and_then(Value::as_object)
            .ok_or_else(|| Error::InvalidQuery("query missing required object 'OPTIONS'".into()))?;

        let raw_columns: Vec<String> = options
            .get("COLUMNS")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::InvalidQuery("OPTIONS.COLUMNS must be an array".into()))?
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| Error::InvalidQuery("COLUMNS entries must be strings".into()))
            })
            .collect::<Result<_, _>>()?;
        if raw_columns.is_empty() {
            return Err(Error::InvalidQuery("OPTIONS.COLUMNS must not be empty".into()));
        }

        let transform = match obj.get("TRANSFORMATIONS") {
            Some(t) => Some(parse_transform(t, dataset_id, kind)?),
            None => None,
        };

        let declared_apply_keys: HashSet<&str> =
            transform.as_ref().map(|t| t.apply.iter().map(|a| a.key.as_str()).collect()).unwrap_or_default();

        let mut columns = Vec::with_capacity(raw_columns.len());
        let mut column_apply_keys_seen: HashSet<String> = HashSet::new();
        for raw in &raw_columns {
            match split_key(raw) {
                Some((id, field)) => {
                    if id != dataset_id {
                        return Err(Error::InvalidQuery(format!(
                            "COLUMNS key '{raw}' references dataset '{id}', expected '{dataset_id}'"
                        )));
                    }
                    validate_field(&field, kind)?;
                    columns.push(Column::Field { key: raw.clone(), field });
                }
                None => {
                    if !declared_apply_keys.contains(raw.as_str()) {
                        return Err(Error::InvalidQuery(format!(
                            "COLUMNS key '{raw}' is not a dataset key or a declared APPLY key"
                        )));
                    }
                    column_apply_keys_seen.insert(raw.clone());
                    columns.push(Column::Apply(raw.clone()));
                }
            }
        }
        if column_apply_keys_seen.len() != declared_apply_keys.len() {
            return Err(Error::InvalidQuery(
                "every APPLY key must appear in COLUMNS, and vice versa".into(),
            ));
        }

        if let Some(t) = &transform {
            for col in &columns {
                if let Column::Field { field, .. } = col {
                    if !t.group.contains(field) {
                        return Err(Error::InvalidQuery(format!(
                            "COLUMNS dataset key '{field}' must also appear in TRANSFORMATIONS.GROUP"
                        )));
                    }
                }
            }
        }

        let order = match options.get("ORDER") {
            None => None,
            Some(Value::String(s)) => {
                let col = resolve_order_key(s, &raw_columns, &columns)?;
                Some(Order { dir: Dir::Up, keys: vec![col] })
            }
            Some(Value::Object(order_obj)) => {
                let dir = match order_obj.get("dir").and_then(Value::as_str) {
                    Some("UP") => Dir::Up,
                    Some("DOWN") => Dir::Down,
                    _ => return Err(Error::InvalidQuery("ORDER.dir must be 'UP' or 'DOWN'".into())),
                };
                let raw_keys = order_obj
                    .get("keys")
                    .and_then(Value::as_array)
                    .ok_or_else(|| Error::InvalidQuery("ORDER.keys must be an array".into()))?;
                if raw_keys.is_empty() {
                    return Err(Error::InvalidQuery("ORDER.keys must not be empty".into()));
                }
                let keys = raw_keys
                    .iter()
                    .map(|v| {
                        let s = v
                            .as_str()
                            .ok_or_else(|| Error::InvalidQuery("ORDER.keys entries must be strings".into()))?;
                        resolve_order_key(s, &raw_columns, &columns)
                    })
                    .collect::<Result<_, _>>()?;
                Some(Order { dir, keys })
            }
            Some(_) => return Err(Error::InvalidQuery("ORDER must be a string or an object".into())),
        };

        Ok(Query { dataset_id: dataset_id.to_string(), where_node, columns, order, transform })
    }
}

fn resolve_order_key(raw: &str, raw_columns: &[String], columns: &[Column]) -> Result<Column, Error> {
    let position = raw_columns.iter().position(|c| c == raw).ok_or_else(|| {
        Error::InvalidQuery(format!("ORDER key '{raw}' must be one of OPTIONS.COLUMNS"))
    })?;
    Ok(columns[position].clone())
}

fn validate_field(field: &str, kind: DatasetKind) -> Result<(), Error> {
    if kind.fields().contains(&field) {
        Ok(())
    } else {
        Err(Error::InvalidQuery(format!("'{field}' is not a valid field for kind {}", kind.as_str())))
    }
}

fn dataset_field(raw: &str, dataset_id: &str, kind: DatasetKind) -> Result<String, Error> {
    let (id, field) = split_key(raw)
        .ok_or_else(|| Error::InvalidQuery(format!("'{raw}' is not a valid dataset key")))?;
    if id != dataset_id {
        return Err(Error::InvalidQuery(format!(
            "key '{raw}' references dataset '{id}', expected '{dataset_id}'"
        )));
    }
    validate_field(&field, kind)?;
    Ok(field)
}

fn parse_where(value: &Value, dataset_id: &str, kind: DatasetKind) -> Result<WhereNode, Error> {
    let obj = value.as_object().ok_or_else(|| Error::InvalidQuery("WHERE node must be an object".into()))?;
    if obj.is_empty() {
        return Ok(WhereNode::Empty);
    }
    if obj.len() != 1 {
        return Err(Error::InvalidQuery("WHERE node must have exactly one key".into()));
    }
    let (op, operand) = obj.iter().next().unwrap();
    match op.as_str() {
        "AND" | "OR" => {
            let items = operand
                .as_array()
                .ok_or_else(|| Error::InvalidQuery(format!("{op} requires an array operand")))?;
            if items.is_empty() {
                return Err(Error::InvalidQuery(format!("{op} requires a non-empty array")));
            }
            let nodes = items.iter().map(|v| parse_where(v, dataset_id, kind)).collect::<Result<_, _>>()?;
            Ok(if op == "AND" { WhereNode::And(nodes) } else { WhereNode::Or(nodes) })
        }
        "NOT" => Ok(WhereNode::Not(Box::new(parse_where(operand, dataset_id, kind)?))),
        "GT" | "LT" | "EQ" => {
            let (key, val) = single_entry(operand, op)?;
            let field = dataset_field(key, dataset_id, kind)?;
            if !is_numeric_field(&field) {
                return Err(Error::InvalidQuery(format!("{op} requires a numeric field, got '{field}'")));
            }
            let num = val
                .as_f64()
                .ok_or_else(|| Error::InvalidQuery(format!("{op} requires a numeric literal")))?;
            Ok(match op.as_str() {
                "GT" => WhereNode::Gt(field, num),
                "LT" => WhereNode::Lt(field, num),
                _ => WhereNode::Eq(field, num),
            })
        }
        "IS" => {
            let (key, val) = single_entry(operand, op)?;
            let field = dataset_field(key, dataset_id, kind)?;
            if is_numeric_field(&field) {
                return Err(Error::InvalidQuery(format!("IS requires a string field, got '{field}'")));
            }
            let pattern = val
                .as_str()
                .ok_or_else(|| Error::InvalidQuery("IS requires a string literal".into()))?;
            validate_wildcard(pattern)?;
            Ok(WhereNode::Is(field, pattern.to_string()))
        }
        other => Err(Error::InvalidQuery(format!("unknown WHERE operator '{other}'"))),
    }
}

fn single_entry<'a>(value: &'a Value, op: &str) -> Result<(&'a str, &'a Value), Error> {
    let obj = value
        .as_object()
        .ok_or_else(|| Error::InvalidQuery(format!("{op} operand must be an object")))?;
    if obj.len() != 1 {
        return Err(Error::InvalidQuery(format!("{op} operand must have exactly one key")));
    }
    let (k, v) = obj.iter().next().unwrap();
    Ok((k.as_str(), v))
}

fn validate_wildcard(pattern: &str) -> Result<(), Error> {
    let last = pattern.len().saturating_sub(1);
    let interior = pattern.chars().enumerate().any(|(i, c)| c == '*' && i != 0 && i != last);
    if interior {
        return Err(Error::InvalidQuery(format!(
            "'{pattern}' has a wildcard outside leading/trailing position"
        )));
    }
    Ok(())
}

fn parse_transform(value: &Value, dataset_id: &str, kind: DatasetKind) -> Result<Transform, Error> {
    let obj = value
        .as_object()
        .ok_or_else(|| Error::InvalidQuery("TRANSFORMATIONS must be an object".into()))?;

    let group: Vec<String> = obj
        .get("GROUP")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::InvalidQuery("TRANSFORMATIONS.GROUP must be an array".into()))?
        .iter()
        .map(|v| {
            let s = v.as_str().ok_or_else(|| Error::InvalidQuery("GROUP entries must be strings".into()))?;
            dataset_field(s, dataset_id, kind)
        })
        .collect::<Result<_, _>>()?;
    if group.is_empty() {
        return Err(Error::InvalidQuery("TRANSFORMATIONS.GROUP must not be empty".into()));
    }

    let apply_items = obj
        .get("APPLY")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::InvalidQuery("TRANSFORMATIONS.APPLY must be an array".into()))?;

    let mut apply = Vec::with_capacity(apply_items.len());
    let mut seen_keys = HashSet::new();
    for item in apply_items {
        let rule_obj = item
            .as_object()
            .ok_or_else(|| Error::InvalidQuery("each APPLY rule must be an object".into()))?;
        if rule_obj.len() != 1 {
            return Err(Error::InvalidQuery("each APPLY rule must have exactly one key".into()));
        }
        let (apply_key, op_obj) = rule_obj.iter().next().unwrap();
        if apply_key.contains('_') {
            return Err(Error::InvalidQuery(format!("APPLY key '{apply_key}' must not contain '_'")));
        }
        if !seen_keys.insert(apply_key.clone()) {
            return Err(Error::InvalidQuery(format!("duplicate APPLY key '{apply_key}'")));
        }
        let (op_name, operand) = single_entry(op_obj, "APPLY rule")?;
        let op = match op_name {
            "MAX" => Op::Max,
            "MIN" => Op::Min,
            "AVG" => Op::Avg,
            "SUM" => Op::Sum,
            "COUNT" => Op::Count,
            other => return Err(Error::InvalidQuery(format!("unknown APPLY operator '{other}'"))),
        };
        let key_str = operand
            .as_str()
            .ok_or_else(|| Error::InvalidQuery(format!("APPLY operator {op_name} requires a dataset key")))?;
        let field = dataset_field(key_str, dataset_id, kind)?;
        if op != Op::Count && !is_numeric_field(&field) {
            return Err(Error::InvalidQuery(format!("{op_name} requires a numeric field, got '{field}'")));
        }
        apply.push(ApplyRule { key: apply_key.clone(), op, field });
    }

    Ok(Transform { group, apply })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolves_single_dataset_id() {
        let q = json!({"WHERE":{"GT":{"sections_avg":90}},"OPTIONS":{"COLUMNS":["sections_avg"]}});
        assert_eq!(resolve_dataset_id(&q).unwrap(), "sections");
    }

    #[test]
    fn rejects_multiple_dataset_ids() {
        let q = json!({"WHERE":{"GT":{"sections_avg":90}},"OPTIONS":{"COLUMNS":["rooms_seats"]}});
        assert!(resolve_dataset_id(&q).is_err());
    }

    #[test]
    fn parses_simple_query() {
        let q = json!({
            "WHERE": {"GT": {"sections_avg": 97}},
            "OPTIONS": {"COLUMNS": ["sections_dept", "sections_avg"], "ORDER": "sections_avg"}
        });
        let parsed = Query::parse(&q, "sections", DatasetKind::Sections).unwrap();
        assert_eq!(parsed.where_node, WhereNode::Gt("avg".into(), 97.0));
        assert_eq!(parsed.order.unwrap().dir, Dir::Up);
    }

    #[test]
    fn rejects_interior_wildcard() {
        let q = json!({
            "WHERE": {"IS": {"sections_dept": "cp*sc"}},
            "OPTIONS": {"COLUMNS": ["sections_dept"]}
        });
        assert!(Query::parse(&q, "sections", DatasetKind::Sections).is_err());
    }

    #[test]
    fn requires_group_superset_of_dataset_columns() {
        let q = json!({
            "WHERE": {},
            "OPTIONS": {"COLUMNS": ["sections_year", "avgGrade"]},
            "TRANSFORMATIONS": {"GROUP": ["sections_dept"], "APPLY": [{"avgGrade": {"AVG": "sections_avg"}}]}
        });
        assert!(Query::parse(&q, "sections", DatasetKind::Sections).is_err());
    }

    #[test]
    fn apply_key_must_appear_in_columns() {
        let q = json!({
            "WHERE": {},
            "OPTIONS": {"COLUMNS": ["sections_year"]},
            "TRANSFORMATIONS": {"GROUP": ["sections_year"], "APPLY": [{"avgGrade": {"AVG": "sections_avg"}}]}
        });
        assert!(Query::parse(&q, "sections", DatasetKind::Sections).is_err());
    }
}

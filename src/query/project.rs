//! Projection, ordering, limit (C9): the row-count cap, flat-record
//! projection to COLUMNS, and the stable multi-key sort.

use std::cmp::Ordering;

use serde_json::{Map, Value};

use crate::error::Error;
use crate::model::{FieldValue, Row};
use crate::query::transform::GroupedRow;
use crate::query::validate::{Column, Dir, Order};

const MAX_RESULT_ROWS: usize = 5_000;

/// A source a [`Column`] can be resolved against: either a plain filtered
/// row, or a post-transform synthetic row.
pub enum Source<'a> {
    Rows(&'a [Row]),
    Grouped(&'a [GroupedRow]),
}

impl Source<'_> {
    fn len(&self) -> usize {
        match self {
            Source::Rows(r) => r.len(),
            Source::Grouped(g) => g.len(),
        }
    }

    fn value_at(&self, index: usize, column: &Column) -> Option<FieldValue> {
        match (self, column) {
            (Source::Rows(rows), Column::Field { field, .. }) => rows[index].field(field),
            (Source::Grouped(groups), Column::Field { field, .. }) => {
                groups[index].group_values.get(field).cloned()
            }
            (Source::Grouped(groups), Column::Apply(key)) => groups[index].apply_values.get(key).cloned(),
            (Source::Rows(_), Column::Apply(_)) => None,
        }
    }
}

/// Enforces the 5,000-row cap, applies ORDER, and projects to a flat
/// `Vec<serde_json::Map>` in COLUMNS order. The cap is checked before
/// projection so an oversized result never does the projection work.
pub fn finish(source: Source<'_>, columns: &[Column], order: &Option<Order>) -> Result<Vec<Value>, Error> {
    if source.len() > MAX_RESULT_ROWS {
        return Err(Error::ResultTooLarge(source.len()));
    }

    let mut indices: Vec<usize> = (0..source.len()).collect();
    if let Some(order) = order {
        indices.sort_by(|&a, &b| compare_rows(&source, order, a, b));
    }

    indices
        .into_iter()
        .map(|i| {
            let mut record = Map::with_capacity(columns.len());
            for column in columns {
                let value = source.value_at(i, column).ok_or_else(|| {
                    Error::Internal(format!("column '{}' missing on projected row", column_name(column)))
                })?;
                record.insert(column_name(column).to_string(), field_value_to_json(&value));
            }
            Ok(Value::Object(record))
        })
        .collect()
}

fn column_name(column: &Column) -> &str {
    match column {
        Column::Field { key, .. } => key,
        Column::Apply(a) => a,
    }
}

fn field_value_to_json(value: &FieldValue) -> Value {
    match value {
        // Render whole-valued numbers (years, counts, seats) as JSON
        // integers rather than "2018.0" so clients see the type they expect.
        FieldValue::Num(n) if n.fract() == 0.0 && n.abs() < 1e15 => serde_json::json!(*n as i64),
        FieldValue::Num(n) => serde_json::json!(n),
        FieldValue::Str(s) => Value::String(s.clone()),
    }
}

fn compare_rows(source: &Source<'_>, order: &Order, a: usize, b: usize) -> Ordering {
    for key in &order.keys {
        let va = source.value_at(a, key);
        let vb = source.value_at(b, key);
        let cmp = compare_values(va.as_ref(), vb.as_ref());
        let cmp = if order.dir == Dir::Down { cmp.reverse() } else { cmp };
        if cmp != Ordering::Equal {
            return cmp;
        }
    }
    Ordering::Equal
}

fn compare_values(a: Option<&FieldValue>, b: Option<&FieldValue>) -> Ordering {
    match (a, b) {
        (Some(FieldValue::Num(x)), Some(FieldValue::Num(y))) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (Some(FieldValue::Str(x)), Some(FieldValue::Str(y))) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Section;

    fn field(name: &str) -> Column {
        Column::Field { key: name.to_string(), field: name.to_string() }
    }

    fn section(avg: f64, dept: &str) -> Row {
        Row::Section(Section {
            uuid: "u".into(),
            id: "310".into(),
            title: "Intro".into(),
            instructor: "P".into(),
            dept: dept.into(),
            year: 2020,
            avg,
            pass: 1,
            fail: 0,
            audit: 0,
        })
    }

    #[test]
    fn caps_at_5000_rows() {
        let rows: Vec<Row> = (0..5001).map(|i| section(i as f64, "cpsc")).collect();
        let err = finish(Source::Rows(&rows), &[field("avg")], &None).unwrap_err();
        assert!(matches!(err, Error::ResultTooLarge(5001)));
    }

    #[test]
    fn sorts_ascending_then_descending() {
        let rows = vec![section(80.0, "cpsc"), section(60.0, "cpsc"), section(90.0, "cpsc")];
        let order = Order { dir: Dir::Up, keys: vec![field("avg")] };
        let out = finish(Source::Rows(&rows), &[field("avg")], &Some(order)).unwrap();
        let avgs: Vec<f64> = out.iter().map(|v| v["avg"].as_f64().unwrap()).collect();
        assert_eq!(avgs, vec![60.0, 80.0, 90.0]);

        let order = Order { dir: Dir::Down, keys: vec![field("avg")] };
        let out = finish(Source::Rows(&rows), &[field("avg")], &Some(order)).unwrap();
        let avgs: Vec<f64> = out.iter().map(|v| v["avg"].as_f64().unwrap()).collect();
        assert_eq!(avgs, vec![90.0, 80.0, 60.0]);
    }

    #[test]
    fn stable_sort_preserves_input_order_on_ties() {
        let rows = vec![section(80.0, "math"), section(80.0, "cpsc"), section(80.0, "arts")];
        let order = Order { dir: Dir::Up, keys: vec![field("avg")] };
        let out = finish(Source::Rows(&rows), &[field("dept")], &Some(order)).unwrap();
        let depts: Vec<&str> = out.iter().map(|v| v["dept"].as_str().unwrap()).collect();
        assert_eq!(depts, vec!["math", "cpsc", "arts"]);
    }

    #[test]
    fn projects_only_requested_columns() {
        let rows = vec![section(80.0, "cpsc")];
        let out = finish(Source::Rows(&rows), &[field("dept")], &None).unwrap();
        let obj = out[0].as_object().unwrap();
        assert_eq!(obj.len(), 1);
        assert!(obj.contains_key("dept"));
    }
}

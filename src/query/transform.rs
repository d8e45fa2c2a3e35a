//! Transform/aggregate (C8): group filtered rows by a key tuple and
//! compute MAX/MIN/AVG/SUM/COUNT synthetic columns. AVG/SUM accumulate in
//! `rust_decimal::Decimal` to avoid IEEE-754 drift, rounding half-away-
//! from-zero to two decimal places, per spec.

use std::collections::HashMap;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::Error;
use crate::model::{FieldValue, Row};
use crate::query::validate::{ApplyRule, Op, Transform};

/// A row after grouping: the group's field values plus one value per
/// APPLY rule, keyed by field/apply-key name so projection can look
/// either up uniformly.
pub struct GroupedRow {
    pub group_values: HashMap<String, FieldValue>,
    pub apply_values: HashMap<String, FieldValue>,
}

pub fn apply(transform: &Transform, rows: &[Row]) -> Result<Vec<GroupedRow>, Error> {
    let mut groups: Vec<(Vec<FieldValue>, Vec<&Row>)> = Vec::new();

    for row in rows {
        let key: Vec<FieldValue> = transform
            .group
            .iter()
            .map(|field| row.field(field).ok_or_else(|| missing_field(field)))
            .collect::<Result<_, Error>>()?;
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push(row),
            None => groups.push((key, vec![row])),
        }
    }

    groups
        .into_iter()
        .map(|(key, members)| build_group_row(transform, &key, &members))
        .collect()
}

fn missing_field(field: &str) -> Error {
    Error::Internal(format!("GROUP field '{field}' missing on a row reaching transform"))
}

fn build_group_row(transform: &Transform, key: &[FieldValue], members: &[&Row]) -> Result<GroupedRow, Error> {
    let group_values =
        transform.group.iter().cloned().zip(key.iter().cloned()).collect::<HashMap<_, _>>();

    let mut apply_values = HashMap::new();
    for rule in &transform.apply {
        let value = apply_one(rule, members)?;
        apply_values.insert(rule.key.clone(), value);
    }
    Ok(GroupedRow { group_values, apply_values })
}

fn apply_one(rule: &ApplyRule, members: &[&Row]) -> Result<FieldValue, Error> {
    match rule.op {
        Op::Count => {
            let mut seen: Vec<FieldValue> = Vec::new();
            for row in members {
                let v = row.field(&rule.field).ok_or_else(|| missing_field(&rule.field))?;
                if !seen.contains(&v) {
                    seen.push(v);
                }
            }
            Ok(FieldValue::Num(seen.len() as f64))
        }
        Op::Max | Op::Min => {
            let mut values = numeric_values(rule, members)?.into_iter();
            let first = values.next().expect("group is never empty");
            let result = values.fold(first, |acc, v| match rule.op {
                Op::Max => acc.max(v),
                _ => acc.min(v),
            });
            Ok(FieldValue::Num(result))
        }
        Op::Sum => {
            let sum = decimal_sum(rule, members)?;
            let rounded = sum.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
            Ok(FieldValue::Num(rounded.to_f64().unwrap_or(0.0)))
        }
        Op::Avg => {
            let sum = decimal_sum(rule, members)?;
            let count = Decimal::from(members.len());
            let avg = (sum / count).round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
            Ok(FieldValue::Num(avg.to_f64().unwrap_or(0.0)))
        }
    }
}

fn numeric_values(rule: &ApplyRule, members: &[&Row]) -> Result<Vec<f64>, Error> {
    members
        .iter()
        .map(|row| {
            row.field(&rule.field)
                .and_then(|v| v.as_num())
                .ok_or_else(|| missing_field(&rule.field))
        })
        .collect()
}

fn decimal_sum(rule: &ApplyRule, members: &[&Row]) -> Result<Decimal, Error> {
    let mut total = Decimal::ZERO;
    for v in numeric_values(rule, members)? {
        total += Decimal::from_f64_retain(v).ok_or_else(|| {
            Error::Internal(format!("field '{}' produced a non-finite value", rule.field))
        })?;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Section;

    fn section(dept: &str, year: i64, avg: f64) -> Row {
        Row::Section(Section {
            uuid: format!("u-{avg}"),
            id: "310".into(),
            title: "Intro".into(),
            instructor: "P".into(),
            dept: dept.into(),
            year,
            avg,
            pass: 1,
            fail: 0,
            audit: 0,
        })
    }

    fn rule(key: &str, op: Op, field: &str) -> ApplyRule {
        ApplyRule { key: key.to_string(), op, field: field.to_string() }
    }

    #[test]
    fn groups_by_key_tuple() {
        let rows = vec![section("cpsc", 2019, 80.0), section("cpsc", 2019, 90.0), section("cpsc", 2020, 70.0)];
        let t = Transform { group: vec!["year".into()], apply: vec![rule("avgGrade", Op::Avg, "avg")] };
        let grouped = apply(&t, &rows).unwrap();
        assert_eq!(grouped.len(), 2);
    }

    #[test]
    fn avg_uses_decimal_rounding() {
        let rows = vec![section("cpsc", 2019, 70.0), section("cpsc", 2019, 71.0), section("cpsc", 2019, 71.0)];
        let t = Transform { group: vec!["year".into()], apply: vec![rule("avgGrade", Op::Avg, "avg")] };
        let grouped = apply(&t, &rows).unwrap();
        let avg = grouped[0].apply_values.get("avgGrade").unwrap().as_num().unwrap();
        assert!((avg - 70.67).abs() < 1e-9);
    }

    #[test]
    fn count_counts_distinct_values() {
        let rows = vec![section("cpsc", 2019, 80.0), section("cpsc", 2019, 80.0), section("cpsc", 2019, 90.0)];
        let t = Transform { group: vec!["year".into()], apply: vec![rule("distinctAvgs", Op::Count, "avg")] };
        let grouped = apply(&t, &rows).unwrap();
        assert_eq!(grouped[0].apply_values.get("distinctAvgs").unwrap().as_num().unwrap(), 2.0);
    }

    #[test]
    fn single_row_group_avg_min_max_all_equal() {
        let rows = vec![section("cpsc", 2019, 85.0)];
        let t = Transform {
            group: vec!["year".into()],
            apply: vec![rule("a", Op::Avg, "avg"), rule("mn", Op::Min, "avg"), rule("mx", Op::Max, "avg")],
        };
        let grouped = apply(&t, &rows).unwrap();
        let g = &grouped[0];
        assert_eq!(g.apply_values["a"].as_num(), Some(85.0));
        assert_eq!(g.apply_values["mn"].as_num(), Some(85.0));
        assert_eq!(g.apply_values["mx"].as_num(), Some(85.0));
    }
}

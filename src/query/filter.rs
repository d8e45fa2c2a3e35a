//! Filter evaluator (C7): recursive evaluation of a WHERE tree over a
//! single row. Total — every legally-typed row evaluates to `true` or
//! `false`, never an error (the validator already rejected anything that
//! could make evaluation fail).

use crate::model::Row;
use crate::query::validate::WhereNode;

pub fn evaluate(node: &WhereNode, row: &Row) -> bool {
    match node {
        WhereNode::Empty => true,
        WhereNode::And(nodes) => nodes.iter().all(|n| evaluate(n, row)),
        WhereNode::Or(nodes) => nodes.iter().any(|n| evaluate(n, row)),
        WhereNode::Not(inner) => !evaluate(inner, row),
        WhereNode::Gt(field, v) => row.field(field).and_then(|f| f.as_num()).map(|n| n > *v).unwrap_or(false),
        WhereNode::Lt(field, v) => row.field(field).and_then(|f| f.as_num()).map(|n| n < *v).unwrap_or(false),
        WhereNode::Eq(field, v) => row.field(field).and_then(|f| f.as_num()).map(|n| n == *v).unwrap_or(false),
        WhereNode::Is(field, pattern) => {
            row.field(field).and_then(|f| f.as_str().map(str::to_string)).map(|s| matches_wildcard(&s, pattern)).unwrap_or(false)
        }
    }
}

/// `pattern` may carry a leading `*`, a trailing `*`, both, or neither
/// (the validator rejects interior wildcards, so this never has to).
fn matches_wildcard(value: &str, pattern: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    let leading = pattern.starts_with('*');
    let trailing = pattern.ends_with('*');
    let core = pattern.trim_start_matches('*').trim_end_matches('*');
    match (leading, trailing) {
        (true, true) => value.contains(core),
        (true, false) => value.ends_with(core),
        (false, true) => value.starts_with(core),
        (false, false) => value == core,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Section;

    fn row(dept: &str, avg: f64) -> Row {
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
    fn empty_matches_everything() {
        assert!(evaluate(&WhereNode::Empty, &row("cpsc", 80.0)));
    }

    #[test]
    fn numeric_comparisons() {
        assert!(evaluate(&WhereNode::Gt("avg".into(), 70.0), &row("cpsc", 80.0)));
        assert!(!evaluate(&WhereNode::Gt("avg".into(), 90.0), &row("cpsc", 80.0)));
        assert!(evaluate(&WhereNode::Eq("avg".into(), 80.0), &row("cpsc", 80.0)));
        assert!(evaluate(&WhereNode::Lt("avg".into(), 90.0), &row("cpsc", 80.0)));
    }

    #[test]
    fn and_or_not() {
        let r = row("cpsc", 80.0);
        let and = WhereNode::And(vec![WhereNode::Gt("avg".into(), 70.0), WhereNode::Lt("avg".into(), 90.0)]);
        assert!(evaluate(&and, &r));
        let or = WhereNode::Or(vec![WhereNode::Gt("avg".into(), 95.0), WhereNode::Lt("avg".into(), 90.0)]);
        assert!(evaluate(&or, &r));
        let not = WhereNode::Not(Box::new(WhereNode::Gt("avg".into(), 95.0)));
        assert!(evaluate(&not, &r));
    }

    #[test]
    fn wildcard_forms() {
        assert!(matches_wildcard("cpsc", "cpsc"));
        assert!(matches_wildcard("cpsc", "cp*"));
        assert!(matches_wildcard("cpsc", "*sc"));
        assert!(matches_wildcard("cpsc", "*ps*"));
        assert!(matches_wildcard("anything", "*"));
        assert!(!matches_wildcard("cpsc", "cp*x"));
    }

    #[test]
    fn is_node_uses_wildcard_matching() {
        assert!(evaluate(&WhereNode::Is("dept".into(), "cp*".into()), &row("cpsc", 80.0)));
        assert!(!evaluate(&WhereNode::Is("dept".into(), "math".into()), &row("cpsc", 80.0)));
    }
}

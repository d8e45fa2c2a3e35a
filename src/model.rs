//! Typed row model (C1). Two concrete row structs, a tagged `Row` enum
//! binding them at the container boundary, and a single field-accessor
//! function per kind so the query engine never runs dynamic `instanceof`-
//! style checks on a hot path.

use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub uuid: String,
    pub id: String,
    pub title: String,
    pub instructor: String,
    pub dept: String,
    pub year: i64,
    pub avg: f64,
    pub pass: i64,
    pub fail: i64,
    pub audit: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub fullname: String,
    pub shortname: String,
    pub number: String,
    pub name: String,
    pub address: String,
    pub lat: f64,
    pub lon: f64,
    pub seats: i64,
    #[serde(rename = "type")]
    pub room_type: String,
    pub furniture: String,
    pub href: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Row {
    #[serde(rename = "sections")]
    Section(Section),
    #[serde(rename = "rooms")]
    Room(Room),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
    Sections,
    Rooms,
}

impl DatasetKind {
    pub fn parse(s: &str) -> Result<Self, Error> {
        match s {
            "sections" => Ok(DatasetKind::Sections),
            "rooms" => Ok(DatasetKind::Rooms),
            other => Err(Error::InvalidId(format!("unknown dataset kind '{other}'"))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetKind::Sections => "sections",
            DatasetKind::Rooms => "rooms",
        }
    }

    /// Field names valid as the `<field>` component of a dataset key for
    /// this kind. Closed set, per the query validator's key syntax rules.
    pub fn fields(&self) -> &'static [&'static str] {
        match self {
            DatasetKind::Sections => {
                &["avg", "pass", "fail", "audit", "year", "dept", "instructor", "title", "uuid", "id"]
            }
            DatasetKind::Rooms => &[
                "fullname", "shortname", "number", "name", "address", "lat", "lon", "seats", "type",
                "furniture", "href",
            ],
        }
    }
}

/// A value extracted from a row by field name, typed per §4.5's field-type
/// split (numeric fields vs. string fields). Owned so grouping tuples and
/// sort keys can be built without borrowing the source row.
#[derive(Debug, Clone, PartialEq, PartialOrd)]
pub enum FieldValue {
    Num(f64),
    Str(String),
}

impl FieldValue {
    pub fn as_num(&self) -> Option<f64> {
        match self {
            FieldValue::Num(n) => Some(*n),
            FieldValue::Str(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s),
            FieldValue::Num(_) => None,
        }
    }
}

const NUMERIC_FIELDS: &[&str] = &["avg", "pass", "fail", "audit", "year", "lat", "lon", "seats"];

pub fn is_numeric_field(field: &str) -> bool {
    NUMERIC_FIELDS.contains(&field)
}

impl Row {
    pub fn kind(&self) -> DatasetKind {
        match self {
            Row::Section(_) => DatasetKind::Sections,
            Row::Room(_) => DatasetKind::Rooms,
        }
    }

    /// Resolve a bare field name (already stripped of its dataset-id
    /// prefix) to a typed value. Returns `None` if the field does not
    /// belong to this row's kind — callers (the validator) are expected to
    /// have already confirmed the field is in the kind's closed set, so a
    /// `None` here indicates a programmer error upstream, not bad input.
    pub fn field(&self, field: &str) -> Option<FieldValue> {
        match self {
            Row::Section(s) => match field {
                "avg" => Some(FieldValue::Num(s.avg)),
                "pass" => Some(FieldValue::Num(s.pass as f64)),
                "fail" => Some(FieldValue::Num(s.fail as f64)),
                "audit" => Some(FieldValue::Num(s.audit as f64)),
                "year" => Some(FieldValue::Num(s.year as f64)),
                "dept" => Some(FieldValue::Str(s.dept.clone())),
                "instructor" => Some(FieldValue::Str(s.instructor.clone())),
                "title" => Some(FieldValue::Str(s.title.clone())),
                "uuid" => Some(FieldValue::Str(s.uuid.clone())),
                "id" => Some(FieldValue::Str(s.id.clone())),
                _ => None,
            },
            Row::Room(r) => match field {
                "fullname" => Some(FieldValue::Str(r.fullname.clone())),
                "shortname" => Some(FieldValue::Str(r.shortname.clone())),
                "number" => Some(FieldValue::Str(r.number.clone())),
                "name" => Some(FieldValue::Str(r.name.clone())),
                "address" => Some(FieldValue::Str(r.address.clone())),
                "lat" => Some(FieldValue::Num(r.lat)),
                "lon" => Some(FieldValue::Num(r.lon)),
                "seats" => Some(FieldValue::Num(r.seats as f64)),
                "type" => Some(FieldValue::Str(r.room_type.clone())),
                "furniture" => Some(FieldValue::Str(r.furniture.clone())),
                "href" => Some(FieldValue::Str(r.href.clone())),
                _ => None,
            },
        }
    }
}

/// A named, immutable collection of rows of one kind. Never holds a mixed
/// `Vec<Row>` — the constructor rejects a kind/row mismatch so downstream
/// code dispatches on `kind` once, at load time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub id: String,
    pub kind: DatasetKind,
    pub rows: Vec<Row>,
}

impl Dataset {
    pub fn new(id: String, kind: DatasetKind, rows: Vec<Row>) -> Result<Self, Error> {
        if rows.iter().any(|r| r.kind() != kind) {
            return Err(Error::Internal(format!(
                "row kind mismatch building dataset '{id}'"
            )));
        }
        Ok(Dataset { id, kind, rows })
    }
}

/// Validates a user-supplied dataset id: non-empty, not all whitespace, no
/// underscore (underscore separates `<id>_<field>` in query keys).
pub fn validate_id(id: &str) -> Result<(), Error> {
    if id.is_empty() || id.trim().is_empty() {
        return Err(Error::InvalidId("id must not be empty or whitespace".into()));
    }
    if id.contains('_') {
        return Err(Error::InvalidId("id must not contain '_'".into()));
    }
    Ok(())
}

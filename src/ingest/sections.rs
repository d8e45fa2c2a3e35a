//! Section ingester (C4): base64 → zip → per-file JSON → `Section` rows.

use std::io::{Cursor, Read};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rayon::prelude::*;
use serde_json::Value;
use zip::ZipArchive;

use crate::error::Error;
use crate::model::{Row, Section};

/// Parses a base64-encoded section archive into `Section` rows.
///
/// Layout: exactly one top-level directory `courses/`, containing at least
/// one file. Each file under it parses as JSON `{ "result": [ ... ] }`;
/// each element of `result` is a section record with required fields.
pub fn ingest(payload_base64: &str) -> Result<Vec<Row>, Error> {
    let bytes = BASE64
        .decode(payload_base64.trim())
        .map_err(|e| Error::InvalidContent(format!("payload is not valid base64: {e}")))?;

    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| Error::InvalidContent(format!("payload is not a valid zip archive: {e}")))?;

    let names = validated_course_entries(&mut archive)?;

    let contents: Vec<(String, Vec<u8>)> = names
        .into_iter()
        .map(|name| {
            let mut file = archive
                .by_name(&name)
                .map_err(|e| Error::Internal(format!("could not reopen zip entry '{name}': {e}")))?;
            let mut buf = Vec::new();
            file.read_to_end(&mut buf)?;
            Ok((name, buf))
        })
        .collect::<Result<Vec<_>, Error>>()?;

    // Each file parses independently; rayon fans the parse out across
    // cores and collect() assembles the results in one pass.
    let rows: Vec<Row> = contents
        .par_iter()
        .map(|(name, buf)| parse_course_file(name, buf))
        .collect::<Result<Vec<Vec<Row>>, Error>>()?
        .into_iter()
        .flatten()
        .collect();
    if rows.is_empty() {
        return Err(Error::InvalidContent("archive produced zero sections".into()));
    }
    Ok(rows)
}

/// Validates the `courses/` single-top-level-directory layout and returns
/// the names of the non-directory entries under it.
fn validated_course_entries(archive: &mut ZipArchive<Cursor<Vec<u8>>>) -> Result<Vec<String>, Error> {
    let mut course_files = Vec::new();
    for i in 0..archive.len() {
        let entry = archive
            .by_index(i)
            .map_err(|e| Error::InvalidContent(format!("corrupt zip entry: {e}")))?;
        let name = entry.name().to_string();
        let top_level = name.split('/').next().unwrap_or("");
        if top_level != "courses" {
            return Err(Error::InvalidContent(format!(
                "unexpected top-level entry '{top_level}', expected only 'courses/'"
            )));
        }
        if !entry.is_dir() && name != "courses/" {
            course_files.push(name);
        }
    }
    if course_files.is_empty() {
        return Err(Error::InvalidContent("'courses/' directory contains no files".into()));
    }
    Ok(course_files)
}

fn parse_course_file(name: &str, buf: &[u8]) -> Result<Vec<Row>, Error> {
    let doc: Value = serde_json::from_slice(buf)
        .map_err(|e| Error::InvalidContent(format!("'{name}' is not valid JSON: {e}")))?;
    let result = doc
        .get("result")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::InvalidContent(format!("'{name}' missing array field 'result'")))?;

    result.iter().map(|elem| parse_section(name, elem)).collect()
}

fn required_str(name: &str, elem: &Value, key: &str) -> Result<String, Error> {
    elem.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::InvalidContent(format!("'{name}': missing or non-string field '{key}'")))
}

fn required_num(name: &str, elem: &Value, key: &str) -> Result<f64, Error> {
    elem.get(key)
        .and_then(Value::as_f64)
        .ok_or_else(|| Error::InvalidContent(format!("'{name}': missing or non-numeric field '{key}'")))
}

fn parse_section(name: &str, elem: &Value) -> Result<Row, Error> {
    let uuid = required_str(name, elem, "id")?;
    let id = required_str(name, elem, "Course")?;
    let title = required_str(name, elem, "Title")?;
    let instructor = required_str(name, elem, "Professor")?;
    let dept = required_str(name, elem, "Subject")?;
    let avg = required_num(name, elem, "Avg")?;
    let pass = required_num(name, elem, "Pass")? as i64;
    let fail = required_num(name, elem, "Fail")? as i64;
    let audit = required_num(name, elem, "Audit")? as i64;

    // `Year` must be present and non-null on every element regardless of
    // `Section` — the "overall" case only overrides the value afterward,
    // it never waives the presence check.
    let declared_year = required_num(name, elem, "Year")?;
    let is_overall = elem.get("Section").and_then(Value::as_str) == Some("overall");
    let year = if is_overall { 1900 } else { declared_year as i64 };

    Ok(Row::Section(Section {
        uuid,
        id,
        title,
        instructor,
        dept,
        year,
        avg,
        pass,
        fail,
        audit,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn build_archive(files: &[(&str, &str)]) -> String {
        let mut buf = Vec::new();
        {
            let mut writer = zip::ZipWriter::new(Cursor::new(&mut buf));
            let options =
                zip::write::SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
            writer.add_directory("courses/", options).unwrap();
            for (name, contents) in files {
                writer.start_file(format!("courses/{name}"), options).unwrap();
                writer.write_all(contents.as_bytes()).unwrap();
            }
            writer.finish().unwrap();
        }
        BASE64.encode(&buf)
    }

    fn good_record(section: &str, year: i64) -> String {
        format!(
            r#"{{"id":"u1","Course":"310","Title":"Intro","Professor":"P","Subject":"cpsc",
                "Avg":80.5,"Pass":10,"Fail":1,"Audit":0,"Year":{year},"Section":"{section}"}}"#
        )
    }

    #[test]
    fn ingests_valid_archive() {
        let payload = build_archive(&[("cpsc310.json", &format!(r#"{{"result":[{}]}}"#, good_record("001", 2019)))]);
        let rows = ingest(&payload).unwrap();
        assert_eq!(rows.len(), 1);
        match &rows[0] {
            Row::Section(s) => {
                assert_eq!(s.year, 2019);
                assert_eq!(s.dept, "cpsc");
            }
            _ => panic!("expected section row"),
        }
    }

    #[test]
    fn overall_section_forces_year_1900() {
        let payload = build_archive(&[(
            "cpsc310.json",
            &format!(r#"{{"result":[{}]}}"#, good_record("overall", 2019)),
        )]);
        let rows = ingest(&payload).unwrap();
        match &rows[0] {
            Row::Section(s) => assert_eq!(s.year, 1900),
            _ => panic!("expected section row"),
        }
    }

    #[test]
    fn rejects_non_base64() {
        assert!(matches!(ingest("not base64!!!"), Err(Error::InvalidContent(_))));
    }

    #[test]
    fn rejects_missing_required_field() {
        let payload = build_archive(&[(
            "cpsc310.json",
            r#"{"result":[{"id":"u1","Course":"310"}]}"#,
        )]);
        assert!(matches!(ingest(&payload), Err(Error::InvalidContent(_))));
    }

    #[test]
    fn overall_section_missing_year_still_rejected() {
        let payload = build_archive(&[(
            "cpsc310.json",
            r#"{"result":[{"id":"u1","Course":"310","Title":"Intro","Professor":"P","Subject":"cpsc",
                "Avg":80.5,"Pass":10,"Fail":1,"Audit":0,"Section":"overall"}]}"#,
        )]);
        assert!(matches!(ingest(&payload), Err(Error::InvalidContent(_))));
    }

    #[test]
    fn rejects_unexpected_top_level_entry() {
        let mut buf = Vec::new();
        {
            let mut writer = zip::ZipWriter::new(Cursor::new(&mut buf));
            let options = zip::write::SimpleFileOptions::default();
            writer.start_file("not_courses/x.json", options).unwrap();
            writer.write_all(b"{}").unwrap();
            writer.finish().unwrap();
        }
        let payload = BASE64.encode(&buf);
        assert!(matches!(ingest(&payload), Err(Error::InvalidContent(_))));
    }

    #[test]
    fn rejects_empty_courses_dir() {
        let mut buf = Vec::new();
        {
            let mut writer = zip::ZipWriter::new(Cursor::new(&mut buf));
            let options = zip::write::SimpleFileOptions::default();
            writer.add_directory("courses/", options).unwrap();
            writer.finish().unwrap();
        }
        let payload = BASE64.encode(&buf);
        assert!(matches!(ingest(&payload), Err(Error::InvalidContent(_))));
    }
}

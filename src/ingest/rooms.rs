//! Room ingester (C5): base64 → zip → index HTML → building table → per-
//! building HTML → room table → `Room` rows, with geolocation resolved via
//! an external geocoder.
//!
//! HTML is parsed with `scraper` (an html5ever-backed permissive parser),
//! never with hand-rolled regex, since the archives contain real-world
//! markup with unclosed tags (§9 "HTML parsing").

use std::io::{Cursor, Read};
use std::sync::Mutex;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rayon::prelude::*;
use scraper::{ElementRef, Html, Selector};
use zip::ZipArchive;

use crate::error::Error;
use crate::ingest::geocode::Geocoder;
use crate::model::{Room, Row};

const INDEX_FILE: &str = "index.htm";

struct BuildingStub {
    fullname: String,
    shortname: String,
    buildinghref: String,
    address: String,
}

pub fn ingest(payload_base64: &str, geocoder: &Geocoder) -> Result<Vec<Row>, Error> {
    let bytes = BASE64
        .decode(payload_base64.trim())
        .map_err(|e| Error::InvalidContent(format!("payload is not valid base64: {e}")))?;

    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| Error::InvalidContent(format!("payload is not a valid zip archive: {e}")))?;

    let index_html = read_entry(&mut archive, INDEX_FILE)
        .ok_or_else(|| Error::InvalidContent(format!("archive is missing '{INDEX_FILE}'")))?;

    let stubs = parse_building_index(&index_html)?;

    // Geocode buildings in parallel; a failed geocode drops the building.
    let resolved: Vec<(BuildingStub, f64, f64)> = stubs
        .into_par_iter()
        .filter_map(|stub| geocoder.resolve(&stub.address).map(|(lat, lon)| (stub, lat, lon)))
        .collect();

    // Zip entry reads need `&mut self`, so fetch each building's HTML
    // sequentially before fanning the (pure) room parsing out over rayon.
    let with_html: Vec<(BuildingStub, f64, f64, String)> = resolved
        .into_iter()
        .filter_map(|(stub, lat, lon)| {
            let html = read_entry(&mut archive, &stub.buildinghref)?;
            Some((stub, lat, lon, html))
        })
        .collect();

    let rooms: Mutex<Vec<Row>> = Mutex::new(Vec::new());
    with_html.par_iter().for_each(|(stub, lat, lon, html)| {
        let building_rooms = parse_building_rooms(stub, *lat, *lon, html);
        rooms.lock().expect("room buffer lock poisoned").extend(building_rooms);
    });

    let rooms = rooms.into_inner().expect("room buffer lock poisoned");
    if rooms.is_empty() {
        return Err(Error::InvalidContent("archive produced zero rooms".into()));
    }
    Ok(rooms)
}

fn read_entry(archive: &mut ZipArchive<Cursor<Vec<u8>>>, name: &str) -> Option<String> {
    let name = name.trim_start_matches("./");
    let mut file = archive.by_name(name).ok()?;
    let mut buf = String::new();
    file.read_to_string(&mut buf).ok()?;
    Some(buf)
}

fn cell_text(el: ElementRef) -> String {
    el.text().collect::<Vec<_>>().join("").trim().to_string()
}

/// Locates the first table whose rows carry both a title cell and a
/// building-address cell, then extracts one [`BuildingStub`] per row whose
/// cells are all present.
fn parse_building_index(html: &str) -> Result<Vec<BuildingStub>, Error> {
    let document = Html::parse_document(html);
    let table_sel = Selector::parse("table").unwrap();
    let title_sel = Selector::parse(".views-field-title").unwrap();
    let address_sel = Selector::parse(".views-field-field-building-address").unwrap();
    let row_sel = Selector::parse("tr").unwrap();
    let anchor_sel = Selector::parse("a").unwrap();

    let table = document
        .select(&table_sel)
        .find(|t| t.select(&title_sel).next().is_some() && t.select(&address_sel).next().is_some())
        .ok_or_else(|| Error::InvalidContent("no building table found in index.htm".into()))?;

    let mut stubs = Vec::new();
    for row in table.select(&row_sel) {
        let Some(title_cell) = row.select(&title_sel).next() else { continue };
        let Some(address_cell) = row.select(&address_sel).next() else { continue };
        let Some(anchor) = title_cell.select(&anchor_sel).next() else { continue };
        let Some(href) = anchor.value().attr("href") else { continue };

        let fullname = cell_text(anchor);
        let address = cell_text(address_cell);
        let shortname = href
            .rsplit('/')
            .next()
            .and_then(|seg| seg.strip_suffix(".htm"))
            .unwrap_or(href)
            .to_string();

        if fullname.is_empty() || shortname.is_empty() || address.is_empty() {
            continue;
        }
        stubs.push(BuildingStub {
            fullname,
            shortname,
            buildinghref: href.trim_start_matches("./").to_string(),
            address,
        });
    }
    Ok(stubs)
}

/// Locates the first table whose header row includes room-number,
/// capacity, furniture, and type columns, then extracts one [`Room`] per
/// body row with all required cells present. Rows missing a required field
/// are silently skipped; a missing table contributes zero rooms.
fn parse_building_rooms(stub: &BuildingStub, lat: f64, lon: f64, html: &str) -> Vec<Row> {
    let document = Html::parse_document(html);
    let table_sel = Selector::parse("table").unwrap();
    let number_sel = Selector::parse(".views-field-field-room-number").unwrap();
    let capacity_sel = Selector::parse(".views-field-field-room-capacity").unwrap();
    let furniture_sel = Selector::parse(".views-field-field-room-furniture").unwrap();
    let type_sel = Selector::parse(".views-field-field-room-type").unwrap();
    let row_sel = Selector::parse("tr").unwrap();
    let anchor_sel = Selector::parse("a").unwrap();

    let Some(table) = document.select(&table_sel).find(|t| {
        t.select(&number_sel).next().is_some()
            && t.select(&capacity_sel).next().is_some()
            && t.select(&furniture_sel).next().is_some()
            && t.select(&type_sel).next().is_some()
    }) else {
        return Vec::new();
    };

    let mut rooms = Vec::new();
    for row in table.select(&row_sel) {
        let Some(number_cell) = row.select(&number_sel).next() else { continue };
        let Some(capacity_cell) = row.select(&capacity_sel).next() else { continue };
        let Some(furniture_cell) = row.select(&furniture_sel).next() else { continue };
        let Some(type_cell) = row.select(&type_sel).next() else { continue };

        let number = number_cell
            .select(&anchor_sel)
            .next()
            .map(cell_text)
            .unwrap_or_else(|| cell_text(number_cell));
        let href = number_cell
            .select(&anchor_sel)
            .next()
            .and_then(|a| a.value().attr("href"))
            .unwrap_or_default()
            .to_string();
        let capacity_text = unescape_amp(&cell_text(capacity_cell));
        let furniture = unescape_amp(&cell_text(furniture_cell));
        let room_type = unescape_amp(&cell_text(type_cell));
        let number = unescape_amp(&number);

        let Ok(seats) = capacity_text.parse::<i64>() else { continue };
        if number.is_empty() || furniture.is_empty() || room_type.is_empty() {
            continue;
        }

        rooms.push(Row::Room(Room {
            fullname: stub.fullname.clone(),
            shortname: stub.shortname.clone(),
            number: number.clone(),
            name: format!("{}_{}", stub.shortname, number),
            address: stub.address.clone(),
            lat,
            lon,
            seats: seats as i64,
            room_type,
            furniture,
            href,
        }));
    }
    rooms
}

fn unescape_amp(s: &str) -> String {
    s.replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_building_index_rows() {
        let html = r#"
            <html><body><table><tbody>
            <tr>
              <td class="views-field views-field-title"><a href="./DMP.htm">Hennings (DMP)</a></td>
              <td class="views-field views-field-field-building-address">6245 Agronomy Road</td>
            </tr>
            </tbody></table></body></html>
        "#;
        let stubs = parse_building_index(html).unwrap();
        assert_eq!(stubs.len(), 1);
        assert_eq!(stubs[0].fullname, "Hennings (DMP)");
        assert_eq!(stubs[0].shortname, "DMP");
        assert_eq!(stubs[0].address, "6245 Agronomy Road");
    }

    #[test]
    fn parses_room_table_rows() {
        let html = r#"
            <html><body><table><tbody>
            <tr>
              <td class="views-field views-field-field-room-number"><a href="./DMP-110.htm">110</a></td>
              <td class="views-field views-field-field-room-capacity">75</td>
              <td class="views-field views-field-field-room-furniture">Classroom-Fixed Tables/Movable Chairs</td>
              <td class="views-field views-field-field-room-type">Small Group</td>
            </tr>
            </tbody></table></body></html>
        "#;
        let stub = BuildingStub {
            fullname: "Hennings".into(),
            shortname: "DMP".into(),
            buildinghref: "DMP.htm".into(),
            address: "6245 Agronomy Road".into(),
        };
        let rooms = parse_building_rooms(&stub, 49.26, -123.25, html);
        assert_eq!(rooms.len(), 1);
        match &rooms[0] {
            Row::Room(r) => {
                assert_eq!(r.name, "DMP_110");
                assert_eq!(r.seats, 75);
            }
            _ => panic!("expected room row"),
        }
    }

    #[test]
    fn missing_index_errors_invalid_content() {
        let mut buf = Vec::new();
        {
            let mut writer = zip::ZipWriter::new(Cursor::new(&mut buf));
            writer.start_file("not_index.htm", zip::write::SimpleFileOptions::default()).unwrap();
            writer.finish().unwrap();
        }
        let payload = BASE64.encode(&buf);
        let geocoder = Geocoder::new("http://localhost:1");
        assert!(matches!(ingest(&payload, &geocoder), Err(Error::InvalidContent(_))));
    }
}

use serde_json::{json, Map, Value};
use std::{fs::File, io::BufReader, io::BufWriter, io::Write, path::Path};

use crate::bplan::error::Error;
use crate::bplan::structs::Header;

const LICENSE_URL: &str = "https://www.networkrail.co.uk/who-we-are/transparency-and-ethics/transparency/open-data-feeds/network-rail-infrastructure-limited-data-feeds-licence/";
const SOURCE_URL: &str = "https://wiki.openraildata.com/index.php?title=BPLAN_Geography_Data";

/// Top level of a fresh Datasette metadata file.
pub fn template() -> Value {
    json!({
        "title": "Network Rail Open Data Reference Databases",
        "description": "Reference data used by Network Rail for planning purposes",
        "license": "Network Rail Infrastructure Ltd Data Feeds Licence",
        "license_url": LICENSE_URL,
        "source": "Network Rail Infrastructure Ltd",
        "databases": {},
    })
}

/// Load an existing metadata file, or start from the template if it is
/// missing or unreadable.
pub fn load<P: AsRef<Path>>(path: P) -> Value {
    let p = path.as_ref();
    let loaded = File::open(p)
        .map_err(Error::from)
        .and_then(|f| serde_json::from_reader::<_, Value>(BufReader::new(f)).map_err(Error::from));

    let mut metadata = match loaded {
        Ok(value @ Value::Object(_)) => value,
        Ok(_) => {
            log::warn!("{} is not a JSON object, starting afresh", p.display());
            template()
        }
        Err(e) => {
            log::debug!("Using metadata template, {} not loaded: {}", p.display(), e);
            template()
        }
    };

    if let Value::Object(map) = &mut metadata {
        if !map.get("databases").map(Value::is_object).unwrap_or(false) {
            map.insert("databases".to_owned(), Value::Object(Map::new()));
        }
    }
    metadata
}

pub fn save<P: AsRef<Path>>(path: P, metadata: &Value) -> Result<(), Error> {
    let p = path.as_ref();
    let file = File::create(p).map_err(|e| Error::NamedFileIO {
        file_name: format!("{}", p.display()),
        source: e,
    })?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, metadata)?;
    writer.flush()?;
    Ok(())
}

/// Describe one converted database from its file header.
///
/// # Returns
/// `None` when the header lacks one of the dates the description is made of.
pub fn database_entry(header: &Header) -> Option<Value> {
    let start = header.start_date?.0;
    let end = header.end_date?.0;
    let created = header.creation_date?.0;

    Some(json!({
        "title": format!("BPLAN {}", start.format("%B %Y")),
        "description": format!(
            "BPLAN database valid for the timetable period: {} to {}. Database published: {}, by: {}, source system: {}.",
            start.format("%-d %B %Y"),
            end.format("%-d %B %Y"),
            created.format("%-d %B %Y"),
            header.toc,
            header.source_system,
        ),
        "source_url": SOURCE_URL,
        "tables": {
            "REF": {"description": "Reference Codes"},
            "LOC": {"description": "Locations"},
            "PLT": {"description": "Platforms and Sidings"},
            "NWK": {"description": "Network Links"},
            "TLD": {"description": "Timing Loads"},
            "TLK": {"description": "Timing Links"},
        }
    }))
}

/// Add or replace the entry of a database, keyed by its name.
pub fn set_database(metadata: &mut Value, name: &str, entry: Value) {
    if let Some(databases) = metadata.get_mut("databases").and_then(Value::as_object_mut) {
        databases.insert(name.to_owned(), entry);
    }
}

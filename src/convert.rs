use csv::StringRecord;
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::bplan::error::Error;
use crate::bplan::reader::{BplanReader, RawRecord};
use crate::bplan::structs::*;
use crate::db::schema;
use crate::db::writer::{Row, TableWriter};
use crate::metadata;

/// Settings shared by every conversion of a run.
#[derive(Debug, Clone, Default)]
pub struct ConvertOptions {
    /// SpatiaLite module to load for a `LOC.geom` column
    pub spatialite: Option<PathBuf>,
    /// Datasette metadata file to update, none to leave it alone
    pub metadata: Option<PathBuf>,
}

/// Outcome of converting one BPLAN file.
#[derive(Debug)]
pub struct ConversionSummary {
    pub input: PathBuf,
    pub output: PathBuf,
    pub header: Option<Header>,
    /// Rows written per record type
    pub counts: BTreeMap<RecordType, u64>,
    /// Whether the file had a trailer the counts were checked against
    pub trailer_checked: bool,
}

impl ConversionSummary {
    pub fn print_stats(&self) {
        println!("{} -> {}", self.input.display(), self.output.display());
        if let Some(header) = &self.header {
            println!(
                "  Source: {} ({}), version {}",
                header.source_system, header.toc, header.version
            );
        }
        for record_type in RecordType::TABLES {
            println!(
                "  {}: {} rows",
                record_type,
                self.counts.get(&record_type).copied().unwrap_or(0)
            );
        }
        if !self.trailer_checked {
            println!("  Trailer missing, counts not checked");
        }
    }
}

/// Database written for a BPLAN file: the same path with a `sqlite` extension.
pub fn output_path(input: &Path) -> PathBuf {
    input.with_extension("sqlite")
}

/// Name of the database in the metadata file.
pub fn database_name(input: &Path) -> String {
    input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Convert one BPLAN file into a SQLite database next to it.
///
/// The database is built in a scratch file of the output directory and only
/// moved over the output path once every record has been written and the
/// trailer checked, so a failed run never leaves a partial database behind.
pub fn convert_file(input: &Path, options: &ConvertOptions) -> Result<ConversionSummary, Error> {
    let start = Instant::now();
    let mut reader = BplanReader::open(input)?;

    let output = output_path(input);
    let dir = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let scratch = tempfile::Builder::new()
        .prefix(".bplan-")
        .suffix(".sqlite")
        .tempfile_in(dir)?;
    log::debug!("Writing {} to {}", input.display(), scratch.path().display());

    let mut conn = Connection::open(scratch.path())?;
    schema::create(&conn, options.spatialite.as_deref())?;

    let tx = conn.transaction()?;
    let loaded = load_records(&mut reader, &tx)?;
    tx.commit()?;
    conn.close().map_err(|(_, e)| e)?;
    log::debug!(
        "{} loaded in {}ms",
        input.display(),
        start.elapsed().as_millis()
    );

    scratch.persist(&output).map_err(|e| Error::Persist {
        path: format!("{}", output.display()),
        source: e,
    })?;
    // Scratch files are created owner-only
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&output, std::fs::Permissions::from_mode(0o644)).map_err(
            |e| Error::NamedFileIO {
                file_name: format!("{}", output.display()),
                source: e,
            },
        )?;
    }

    Ok(ConversionSummary {
        input: input.to_path_buf(),
        output,
        header: loaded.header,
        counts: loaded.counts,
        trailer_checked: loaded.trailer_checked,
    })
}

struct Loaded {
    header: Option<Header>,
    counts: BTreeMap<RecordType, u64>,
    trailer_checked: bool,
}

fn load_records<R: Read>(reader: &mut BplanReader<R>, conn: &Connection) -> Result<Loaded, Error> {
    let layouts: HashMap<RecordType, StringRecord> = RecordType::TABLES
        .iter()
        .map(|record_type| (*record_type, record_type.headers()))
        .collect();
    let mut writer = TableWriter::new(conn);
    let mut header = None;
    let mut trailer_checked = false;

    while let Some(raw) = reader.read_record()? {
        let record_type = raw.record_type()?;
        raw.check_action(record_type)?;
        if trailer_checked {
            log::warn!("line {}: {} record after the trailer", raw.line, record_type);
        }

        match record_type {
            RecordType::Pif => {
                let h: Header = raw.deserialize(record_type, &layouts[&record_type])?;
                writer.insert(&h)?;
                header = Some(h);
            }
            RecordType::Ref => insert::<ReferenceCode>(&mut writer, &raw, &layouts)?,
            RecordType::Tld => insert::<TimingLoad>(&mut writer, &raw, &layouts)?,
            RecordType::Loc => insert::<Location>(&mut writer, &raw, &layouts)?,
            RecordType::Plt => insert::<Platform>(&mut writer, &raw, &layouts)?,
            RecordType::Nwk => insert::<NetworkLink>(&mut writer, &raw, &layouts)?,
            RecordType::Tlk => insert::<TimingLink>(&mut writer, &raw, &layouts)?,
            RecordType::Pit => {
                // Counts are checked against the records before the trailer
                let trailer = Trailer::from_fields(raw.line, raw.payload(record_type))?;
                trailer.validate(|code| {
                    RecordType::from_code(code)
                        .map(|record_type| writer.count(record_type))
                        .unwrap_or(0)
                })?;
                trailer_checked = true;
            }
        }
    }

    if !trailer_checked {
        log::warn!(
            "{} has no trailer, record counts not checked",
            reader.file_name()
        );
    }

    if header.is_none() {
        log::warn!("{} has no header", reader.file_name());
    }

    Ok(Loaded {
        header,
        counts: writer.into_counts(),
        trailer_checked,
    })
}

fn insert<O>(
    writer: &mut TableWriter<'_>,
    raw: &RawRecord,
    layouts: &HashMap<RecordType, StringRecord>,
) -> Result<(), Error>
where
    O: Row + DeserializeOwned,
{
    let row: O = raw.deserialize(O::RECORD_TYPE, &layouts[&O::RECORD_TYPE])?;
    writer.insert(&row)
}

/// Convert every input in turn, then update the metadata file once.
///
/// A failing input is logged and does not stop the others.
///
/// # Returns
/// The summaries of the successful conversions, and the number of failures.
pub fn convert_all<P: AsRef<Path>>(
    inputs: &[P],
    options: &ConvertOptions,
) -> Result<(Vec<ConversionSummary>, usize), Error> {
    let mut catalog = options.metadata.as_ref().map(metadata::load);
    let mut summaries = Vec::new();
    let mut failures = 0;

    for input in inputs {
        let input = input.as_ref();
        log::info!("Converting {}", input.display());
        match convert_file(input, options) {
            Ok(summary) => {
                if let (Some(catalog), Some(header)) = (catalog.as_mut(), &summary.header) {
                    match metadata::database_entry(header) {
                        Some(entry) => {
                            metadata::set_database(catalog, &database_name(input), entry)
                        }
                        None => log::warn!(
                            "{} header lacks dates, no metadata entry written",
                            input.display()
                        ),
                    }
                }
                log::info!("Wrote {}", summary.output.display());
                summaries.push(summary);
            }
            Err(e) => {
                log::error!("Unable to process {}: {}", input.display(), error_chain(&e));
                failures += 1;
            }
        }
    }

    if let (Some(path), Some(catalog)) = (&options.metadata, &catalog) {
        metadata::save(path, catalog)?;
        log::info!("Updated {}", path.display());
    }

    Ok((summaries, failures))
}

/// Render an error with all of its sources.
pub fn error_chain(e: &dyn std::error::Error) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(s) = source {
        message.push_str(": ");
        message.push_str(&s.to_string());
        source = s.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_path() {
        assert_eq!(
            output_path(Path::new("data/bplanfile")),
            PathBuf::from("data/bplanfile.sqlite")
        );
        assert_eq!(
            output_path(Path::new("BPLAN_2023.txt")),
            PathBuf::from("BPLAN_2023.sqlite")
        );
        assert_eq!(
            output_path(Path::new("BPLAN_2023.txt.gz")),
            PathBuf::from("BPLAN_2023.txt.sqlite")
        );
    }

    #[test]
    fn test_database_name() {
        assert_eq!(database_name(Path::new("data/BPLAN_2023.txt")), "BPLAN_2023");
        assert_eq!(database_name(Path::new("BPLAN_2023.txt.gz")), "BPLAN_2023.txt");
    }

    #[test]
    fn test_load_records_in_memory() {
        let data = "PIF\t1.0\tGEOGIS\tNR\t21-05-2023 00:00:00\t09-12-2023 00:00:00\tF\t1\t03-04-2023 12:00:00\t7\r\n\
                    REF\tA\tZNE\tZ1\tZone one\r\n\
                    PIT\tREF\t1\t0\t0\r\n";
        let conn = Connection::open_in_memory().unwrap();
        schema::create(&conn, None).unwrap();
        let mut reader = BplanReader::from_reader(data.as_bytes(), "memory");

        let loaded = load_records(&mut reader, &conn).unwrap();
        assert!(loaded.trailer_checked);
        assert_eq!(loaded.header.unwrap().source_system, "GEOGIS");
        assert_eq!(loaded.counts[&RecordType::Ref], 1);
        assert_eq!(loaded.counts[&RecordType::Pif], 1);
    }

    #[test]
    fn test_records_after_trailer_not_counted() {
        let data = "REF\tA\tZNE\tZ1\tZone one\r\n\
                    PIT\tREF\t1\t0\t0\r\n\
                    REF\tA\tZNE\tZ2\tZone two\r\n";
        let conn = Connection::open_in_memory().unwrap();
        schema::create(&conn, None).unwrap();
        let mut reader = BplanReader::from_reader(data.as_bytes(), "memory");

        let loaded = load_records(&mut reader, &conn).unwrap();
        assert!(loaded.trailer_checked);
        assert_eq!(loaded.counts[&RecordType::Ref], 2);
    }

    #[test]
    fn test_trailer_checked_where_it_stands() {
        let data = "REF\tA\tZNE\tZ1\tZone one\r\n\
                    PIT\tREF\t2\t0\t0\r\n\
                    REF\tA\tZNE\tZ2\tZone two\r\n";
        let conn = Connection::open_in_memory().unwrap();
        schema::create(&conn, None).unwrap();
        let mut reader = BplanReader::from_reader(data.as_bytes(), "memory");

        assert!(matches!(
            load_records(&mut reader, &conn),
            Err(Error::CountMismatch { expected: 2, actual: 1, .. })
        ));
    }

    #[test]
    fn test_error_chain() {
        let err = Error::NamedFileIO {
            file_name: "x".to_owned(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        assert_eq!(error_chain(&err), "impossible to read 'x': gone");
    }
}

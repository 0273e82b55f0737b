use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer};
use std::fmt;

use crate::bplan::error::Error;

/// Format of every `*_date` field in a BPLAN file.
pub const BPLAN_DATE_FORMAT: &str = "%d-%m-%Y %H:%M:%S";

/// Format dates are stored with in the database.
pub const SQL_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Kind of a BPLAN record, given by the first field of each line.
/// https://wiki.openraildata.com/index.php?title=BPLAN_Geography_Data
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord)]
pub enum RecordType {
    /// File header
    Pif,
    /// Reference code
    Ref,
    /// Timing load
    Tld,
    /// Location
    Loc,
    /// Platform or siding
    Plt,
    /// Network link
    Nwk,
    /// Timing link
    Tlk,
    /// File trailer
    Pit,
}

impl RecordType {
    /// Record types that are loaded into a table, in file order.
    pub const TABLES: [RecordType; 7] = [
        RecordType::Pif,
        RecordType::Ref,
        RecordType::Tld,
        RecordType::Loc,
        RecordType::Plt,
        RecordType::Nwk,
        RecordType::Tlk,
    ];

    pub fn from_code(code: &str) -> Option<RecordType> {
        match code {
            "PIF" => Some(RecordType::Pif),
            "REF" => Some(RecordType::Ref),
            "TLD" => Some(RecordType::Tld),
            "LOC" => Some(RecordType::Loc),
            "PLT" => Some(RecordType::Plt),
            "NWK" => Some(RecordType::Nwk),
            "TLK" => Some(RecordType::Tlk),
            "PIT" => Some(RecordType::Pit),
            _ => None,
        }
    }

    /// Three letter code, also used as the table name.
    pub fn code(&self) -> &'static str {
        match self {
            RecordType::Pif => "PIF",
            RecordType::Ref => "REF",
            RecordType::Tld => "TLD",
            RecordType::Loc => "LOC",
            RecordType::Plt => "PLT",
            RecordType::Nwk => "NWK",
            RecordType::Tlk => "TLK",
            RecordType::Pit => "PIT",
        }
    }

    /// Header and trailer lines carry no action code.
    pub fn has_action(&self) -> bool {
        !matches!(self, RecordType::Pif | RecordType::Pit)
    }

    /// Index of the first payload field on a line.
    pub fn payload_offset(&self) -> usize {
        if self.has_action() {
            2
        } else {
            1
        }
    }

    /// Payload field names, in file order. The trailer has no fixed layout.
    pub fn fields(&self) -> &'static [&'static str] {
        match self {
            RecordType::Pif => &[
                "version",
                "source_system",
                "toc",
                "start_date",
                "end_date",
                "cycle_type",
                "cycle_stage",
                "creation_date",
                "sequence_number",
            ],
            RecordType::Ref => &["type", "code", "description"],
            RecordType::Tld => &[
                "traction",
                "trailing_load",
                "speed",
                "ra_gauge",
                "description",
                "itps_power_type",
                "itps_load",
                "limiting_speed",
            ],
            RecordType::Loc => &[
                "tiploc",
                "name",
                "start_date",
                "end_date",
                "easting",
                "northing",
                "timing_point_type",
                "zone",
                "stanox",
                "off_network_indicator",
                "force_lpb",
            ],
            RecordType::Plt => &[
                "tiploc",
                "platform_id",
                "start_date",
                "end_date",
                "length",
                "power_supply",
                "doo_passenger",
                "doo_non_passenger",
            ],
            RecordType::Nwk => &[
                "origin_location",
                "destination_location",
                "running_line_code",
                "running_line_desc",
                "start_date",
                "end_date",
                "initial_direction",
                "final_direction",
                "distance",
                "doo_passenger",
                "doo_non_passenger",
                "retb",
                "zone",
                "reversible_line",
                "power_supply",
                "ra",
                "maximum_train_length",
            ],
            RecordType::Tlk => &[
                "origin_location",
                "destination_location",
                "running_line_code",
                "traction",
                "trailing_load",
                "speed",
                "ra_gauge",
                "entry_speed",
                "exit_speed",
                "start_date",
                "end_date",
                "sectional_running_time",
                "description",
            ],
            RecordType::Pit => &[],
        }
    }

    pub fn headers(&self) -> csv::StringRecord {
        self.fields().iter().collect()
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Action code of a data record.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Action {
    Insert,
    Amend,
    Delete,
}

impl Action {
    pub fn from_code(code: &str) -> Option<Action> {
        match code {
            "A" => Some(Action::Insert),
            "C" => Some(Action::Amend),
            "D" => Some(Action::Delete),
            _ => None,
        }
    }
}

/// A BPLAN date and time, written `DD-MM-YYYY HH:MM:SS` in the file.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub struct Timestamp(pub NaiveDateTime);

impl Timestamp {
    pub fn parse(s: &str) -> Result<Timestamp, chrono::ParseError> {
        NaiveDateTime::parse_from_str(s, BPLAN_DATE_FORMAT).map(Timestamp)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.format(SQL_DATE_FORMAT))
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Timestamp::parse(&s)
            .map_err(|e| serde::de::Error::custom(format!("invalid date '{}': {}", s, e)))
    }
}

/// File header, describing the timetable period the data is valid for.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Header {
    pub version: String,
    pub source_system: String,
    pub toc: String,
    pub start_date: Option<Timestamp>,
    pub end_date: Option<Timestamp>,
    pub cycle_type: String,
    pub cycle_stage: String,
    pub creation_date: Option<Timestamp>,
    pub sequence_number: String,
}

/// A code and its description, e.g. a zone or a power supply type.
#[derive(Debug, Deserialize, PartialEq)]
pub struct ReferenceCode {
    #[serde(rename = "type")]
    pub code_type: String,
    pub code: String,
    pub description: String,
}

/// Combination of traction, load, speed and gauge used to time trains.
#[derive(Debug, Deserialize, PartialEq)]
pub struct TimingLoad {
    pub traction: String,
    pub trailing_load: String,
    pub speed: Option<i64>,
    pub ra_gauge: String,
    pub description: String,
    pub itps_power_type: String,
    pub itps_load: String,
    pub limiting_speed: Option<i64>,
}

/// A timing point on the network, with OSGB36 grid coordinates.
#[derive(Debug, Deserialize, PartialEq)]
pub struct Location {
    pub tiploc: String,
    pub name: String,
    pub start_date: Option<Timestamp>,
    pub end_date: Option<Timestamp>,
    pub easting: Option<i64>,
    pub northing: Option<i64>,
    pub timing_point_type: String,
    pub zone: String,
    pub stanox: Option<i64>,
    pub off_network_indicator: String,
    pub force_lpb: String,
}

/// A platform or siding at a location.
#[derive(Debug, Deserialize, PartialEq)]
pub struct Platform {
    pub tiploc: String,
    pub platform_id: String,
    pub start_date: Option<Timestamp>,
    pub end_date: Option<Timestamp>,
    pub length: Option<i64>,
    pub power_supply: String,
    pub doo_passenger: String,
    pub doo_non_passenger: String,
}

/// A running line between two adjacent locations.
#[derive(Debug, Deserialize, PartialEq)]
pub struct NetworkLink {
    pub origin_location: String,
    pub destination_location: String,
    pub running_line_code: String,
    pub running_line_desc: String,
    pub start_date: Option<Timestamp>,
    pub end_date: Option<Timestamp>,
    pub initial_direction: String,
    pub final_direction: String,
    pub distance: Option<i64>,
    pub doo_passenger: String,
    pub doo_non_passenger: String,
    pub retb: String,
    pub zone: String,
    pub reversible_line: String,
    pub power_supply: String,
    pub ra: String,
    pub maximum_train_length: Option<i64>,
}

/// Sectional running time of a timing load over a network link.
#[derive(Debug, Deserialize, PartialEq)]
pub struct TimingLink {
    pub origin_location: String,
    pub destination_location: String,
    pub running_line_code: String,
    pub traction: String,
    pub trailing_load: String,
    pub speed: Option<i64>,
    pub ra_gauge: String,
    pub entry_speed: Option<i64>,
    pub exit_speed: Option<i64>,
    pub start_date: Option<Timestamp>,
    pub end_date: Option<Timestamp>,
    pub sectional_running_time: String,
    pub description: String,
}

/// Record counts announced by the trailer for one record type.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct TrailerEntry {
    pub record_type: String,
    pub inserts: u64,
    pub amends: u64,
    pub deletes: u64,
}

/// File trailer.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct Trailer {
    pub entries: Vec<TrailerEntry>,
}

impl Trailer {
    /// Parse the trailer payload, made of groups of four fields:
    /// record type, inserts, amendments and deletions.
    pub fn from_fields<'a, I>(line: u64, fields: I) -> Result<Trailer, Error>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let fields: Vec<&str> = fields.into_iter().collect();
        // A trailing tab leaves an empty last field
        let fields = match fields.split_last() {
            Some((&"", rest)) => rest,
            _ => &fields[..],
        };
        if fields.len() % 4 != 0 {
            return Err(Error::MalformedTrailer {
                line,
                reason: format!("{} fields is not a multiple of four", fields.len()),
            });
        }

        let count = |s: &str| {
            s.trim().parse::<u64>().map_err(|_| Error::MalformedTrailer {
                line,
                reason: format!("'{}' is not a record count", s),
            })
        };

        let entries = fields
            .chunks(4)
            .map(|group| {
                Ok(TrailerEntry {
                    record_type: group[0].to_owned(),
                    inserts: count(group[1])?,
                    amends: count(group[2])?,
                    deletes: count(group[3])?,
                })
            })
            .collect::<Result<Vec<_>, Error>>()?;
        Ok(Trailer { entries })
    }

    /// Check the announced counts against the number of rows actually read.
    pub fn validate<F>(&self, actual: F) -> Result<(), Error>
    where
        F: Fn(&str) -> u64,
    {
        for entry in &self.entries {
            let read = actual(&entry.record_type);
            if read != entry.inserts {
                return Err(Error::CountMismatch {
                    record_type: entry.record_type.clone(),
                    expected: entry.inserts,
                    actual: read,
                });
            }
            if entry.amends != 0 || entry.deletes != 0 {
                return Err(Error::UnsupportedTrailerCounts {
                    record_type: entry.record_type.clone(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_record_type_codes() {
        for record_type in RecordType::TABLES {
            assert_eq!(RecordType::from_code(record_type.code()), Some(record_type));
        }
        assert_eq!(RecordType::from_code("PIT"), Some(RecordType::Pit));
        assert_eq!(RecordType::from_code("XYZ"), None);
        assert_eq!(RecordType::from_code("loc"), None);
    }

    #[test]
    fn test_payload_offset() {
        assert_eq!(RecordType::Pif.payload_offset(), 1);
        assert_eq!(RecordType::Pit.payload_offset(), 1);
        assert_eq!(RecordType::Loc.payload_offset(), 2);
        assert_eq!(RecordType::Tlk.payload_offset(), 2);
    }

    #[test]
    fn test_layout_sizes() {
        assert_eq!(RecordType::Pif.fields().len(), 9);
        assert_eq!(RecordType::Ref.fields().len(), 3);
        assert_eq!(RecordType::Tld.fields().len(), 8);
        assert_eq!(RecordType::Loc.fields().len(), 11);
        assert_eq!(RecordType::Plt.fields().len(), 8);
        assert_eq!(RecordType::Nwk.fields().len(), 17);
        assert_eq!(RecordType::Tlk.fields().len(), 13);
    }

    #[test]
    fn test_timestamp_parse() {
        let ts = Timestamp::parse("21-05-2023 06:30:15").unwrap();
        assert_eq!(ts.0.year(), 2023);
        assert_eq!(ts.0.month(), 5);
        assert_eq!(ts.0.day(), 21);
        assert_eq!(ts.0.hour(), 6);
        assert_eq!(ts.to_string(), "2023-05-21 06:30:15");

        assert!(Timestamp::parse("2023-05-21 06:30:15").is_err());
        assert!(Timestamp::parse("32-01-2023 00:00:00").is_err());
    }

    #[test]
    fn test_action_codes() {
        assert_eq!(Action::from_code("A"), Some(Action::Insert));
        assert_eq!(Action::from_code("C"), Some(Action::Amend));
        assert_eq!(Action::from_code("D"), Some(Action::Delete));
        assert_eq!(Action::from_code("X"), None);
    }

    #[test]
    fn test_deserialize_location() {
        let headers = RecordType::Loc.headers();
        let record = csv::StringRecord::from(vec![
            "ABWD",
            "ABBEY WOOD",
            "09-12-2018 00:00:00",
            "",
            "547400",
            "179100",
            "T",
            "Z1",
            "",
            "N",
            "",
        ]);
        let loc: Location = record.deserialize(Some(&headers)).unwrap();
        assert_eq!(loc.tiploc, "ABWD");
        assert_eq!(loc.end_date, None);
        assert_eq!(
            loc.start_date.map(|d| d.to_string()).as_deref(),
            Some("2018-12-09 00:00:00")
        );
        assert_eq!(loc.easting, Some(547400));
        assert_eq!(loc.stanox, None);
        assert_eq!(loc.force_lpb, "");
    }

    #[test]
    fn test_deserialize_reference_code() {
        let headers = RecordType::Ref.headers();
        let record = csv::StringRecord::from(vec!["PWR", "D", "Diesel"]);
        let code: ReferenceCode = record.deserialize(Some(&headers)).unwrap();
        assert_eq!(code.code_type, "PWR");
        assert_eq!(code.code, "D");
        assert_eq!(code.description, "Diesel");
    }

    #[test]
    fn test_deserialize_rejects_bad_integer() {
        let headers = RecordType::Plt.headers();
        let record = csv::StringRecord::from(vec![
            "ABWD", "1", "", "", "long", "", "", "",
        ]);
        let res: Result<Platform, _> = record.deserialize(Some(&headers));
        assert!(res.is_err());
    }

    #[test]
    fn test_trailer_parse_and_validate() {
        let trailer =
            Trailer::from_fields(7, vec!["REF", "2", "0", "0", "LOC", "1", "0", "0", ""]).unwrap();
        assert_eq!(trailer.entries.len(), 2);
        assert_eq!(trailer.entries[1].record_type, "LOC");
        assert_eq!(trailer.entries[1].inserts, 1);

        let counts = |code: &str| match code {
            "REF" => 2,
            "LOC" => 1,
            _ => 0,
        };
        assert!(trailer.validate(counts).is_ok());

        let err = trailer.validate(|_| 1).unwrap_err();
        assert!(matches!(
            err,
            Error::CountMismatch { expected: 2, actual: 1, .. }
        ));
    }

    #[test]
    fn test_trailer_rejects_amendments() {
        let trailer = Trailer::from_fields(3, vec!["NWK", "0", "4", "0"]).unwrap();
        let err = trailer.validate(|_| 0).unwrap_err();
        assert!(matches!(err, Error::UnsupportedTrailerCounts { .. }));
    }

    #[test]
    fn test_trailer_malformed() {
        assert!(matches!(
            Trailer::from_fields(9, vec!["REF", "2", "0"]),
            Err(Error::MalformedTrailer { line: 9, .. })
        ));
        assert!(matches!(
            Trailer::from_fields(9, vec!["REF", "two", "0", "0"]),
            Err(Error::MalformedTrailer { .. })
        ));
    }
}

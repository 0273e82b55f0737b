use rusqlite::{params, Connection, Statement};
use std::collections::{BTreeMap, HashMap};

use crate::bplan::error::Error;
use crate::bplan::structs::*;
use crate::db::geom;

/// A typed record that can be written to the table of its record type.
pub trait Row {
    const RECORD_TYPE: RecordType;

    /// Columns filled by the converter on top of the record layout.
    const DERIVED_COLUMNS: &'static [&'static str] = &[];

    /// Bind the record to the insert statement of its table and execute it.
    fn insert(&self, stmt: &mut Statement<'_>) -> rusqlite::Result<usize>;
}

/// Insert statement for a row type, columns in layout order.
pub fn insert_statement<R: Row>() -> String {
    let columns: Vec<&str> = R::RECORD_TYPE
        .fields()
        .iter()
        .chain(R::DERIVED_COLUMNS.iter())
        .copied()
        .collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        R::RECORD_TYPE.code(),
        columns.join(","),
        placeholders.join(",")
    )
}

impl rusqlite::ToSql for Timestamp {
    fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
        Ok(rusqlite::types::ToSqlOutput::from(self.to_string()))
    }
}

impl Row for Header {
    const RECORD_TYPE: RecordType = RecordType::Pif;

    fn insert(&self, stmt: &mut Statement<'_>) -> rusqlite::Result<usize> {
        stmt.execute(params![
            self.version,
            self.source_system,
            self.toc,
            self.start_date,
            self.end_date,
            self.cycle_type,
            self.cycle_stage,
            self.creation_date,
            self.sequence_number,
        ])
    }
}

impl Row for ReferenceCode {
    const RECORD_TYPE: RecordType = RecordType::Ref;

    fn insert(&self, stmt: &mut Statement<'_>) -> rusqlite::Result<usize> {
        stmt.execute(params![self.code_type, self.code, self.description])
    }
}

impl Row for TimingLoad {
    const RECORD_TYPE: RecordType = RecordType::Tld;

    fn insert(&self, stmt: &mut Statement<'_>) -> rusqlite::Result<usize> {
        stmt.execute(params![
            self.traction,
            self.trailing_load,
            self.speed,
            self.ra_gauge,
            self.description,
            self.itps_power_type,
            self.itps_load,
            self.limiting_speed,
        ])
    }
}

impl Row for Location {
    const RECORD_TYPE: RecordType = RecordType::Loc;
    const DERIVED_COLUMNS: &'static [&'static str] = &["geom_wkt"];

    fn insert(&self, stmt: &mut Statement<'_>) -> rusqlite::Result<usize> {
        let geom_wkt = geom::location_point(self.easting, self.northing).map(|p| geom::to_wkt(&p));
        stmt.execute(params![
            self.tiploc,
            self.name,
            self.start_date,
            self.end_date,
            self.easting,
            self.northing,
            self.timing_point_type,
            self.zone,
            self.stanox,
            self.off_network_indicator,
            self.force_lpb,
            geom_wkt,
        ])
    }
}

impl Row for Platform {
    const RECORD_TYPE: RecordType = RecordType::Plt;

    fn insert(&self, stmt: &mut Statement<'_>) -> rusqlite::Result<usize> {
        stmt.execute(params![
            self.tiploc,
            self.platform_id,
            self.start_date,
            self.end_date,
            self.length,
            self.power_supply,
            self.doo_passenger,
            self.doo_non_passenger,
        ])
    }
}

impl Row for NetworkLink {
    const RECORD_TYPE: RecordType = RecordType::Nwk;

    fn insert(&self, stmt: &mut Statement<'_>) -> rusqlite::Result<usize> {
        stmt.execute(params![
            self.origin_location,
            self.destination_location,
            self.running_line_code,
            self.running_line_desc,
            self.start_date,
            self.end_date,
            self.initial_direction,
            self.final_direction,
            self.distance,
            self.doo_passenger,
            self.doo_non_passenger,
            self.retb,
            self.zone,
            self.reversible_line,
            self.power_supply,
            self.ra,
            self.maximum_train_length,
        ])
    }
}

impl Row for TimingLink {
    const RECORD_TYPE: RecordType = RecordType::Tlk;

    fn insert(&self, stmt: &mut Statement<'_>) -> rusqlite::Result<usize> {
        stmt.execute(params![
            self.origin_location,
            self.destination_location,
            self.running_line_code,
            self.traction,
            self.trailing_load,
            self.speed,
            self.ra_gauge,
            self.entry_speed,
            self.exit_speed,
            self.start_date,
            self.end_date,
            self.sectional_running_time,
            self.description,
        ])
    }
}

/// Writes typed records to their tables, counting rows per record type.
///
/// Statements are prepared once per table and cached on the connection, so
/// the writer is meant to be used inside a single transaction.
pub struct TableWriter<'c> {
    conn: &'c Connection,
    statements: HashMap<RecordType, String>,
    counts: BTreeMap<RecordType, u64>,
}

impl<'c> TableWriter<'c> {
    pub fn new(conn: &'c Connection) -> TableWriter<'c> {
        let statements = HashMap::from([
            (RecordType::Pif, insert_statement::<Header>()),
            (RecordType::Ref, insert_statement::<ReferenceCode>()),
            (RecordType::Tld, insert_statement::<TimingLoad>()),
            (RecordType::Loc, insert_statement::<Location>()),
            (RecordType::Plt, insert_statement::<Platform>()),
            (RecordType::Nwk, insert_statement::<NetworkLink>()),
            (RecordType::Tlk, insert_statement::<TimingLink>()),
        ]);
        TableWriter {
            conn,
            statements,
            counts: BTreeMap::new(),
        }
    }

    pub fn insert<R: Row>(&mut self, row: &R) -> Result<(), Error> {
        let sql = &self.statements[&R::RECORD_TYPE];
        let mut stmt = self.conn.prepare_cached(sql)?;
        let inserted = row.insert(&mut stmt)?;
        *self.counts.entry(R::RECORD_TYPE).or_insert(0) += inserted as u64;
        Ok(())
    }

    /// Number of rows written for a record type.
    pub fn count(&self, record_type: RecordType) -> u64 {
        self.counts.get(&record_type).copied().unwrap_or(0)
    }

    pub fn into_counts(self) -> BTreeMap<RecordType, u64> {
        self.counts
    }
}

use rusqlite::{params, Connection, LoadExtensionGuard};
use std::path::Path;

use crate::bplan::error::Error;
use crate::db::geom::{known_coordinates_condition, OSGB36_SRID};

/// BPLAN database schema, one table per record type.
const SCHEMA: &str = "
    CREATE TABLE PIF (
      version TEXT,
      source_system TEXT,
      toc TEXT,
      start_date TEXT,
      end_date TEXT,
      cycle_type TEXT,
      cycle_stage TEXT,
      creation_date TEXT,
      sequence_number TEXT
    );
    CREATE TABLE REF (
      type TEXT,
      code TEXT,
      description TEXT,
      type_code_type TEXT DEFAULT 'REF',
      PRIMARY KEY (type, code),
      FOREIGN KEY (type_code_type, type) REFERENCES REF
    );
    CREATE TABLE TLD (
      traction TEXT,
      trailing_load TEXT,
      speed INTEGER,
      ra_gauge TEXT,
      description TEXT,
      itps_power_type TEXT,
      itps_load TEXT,
      limiting_speed INTEGER,
      PRIMARY KEY (traction, trailing_load, speed, ra_gauge)
    );
    CREATE TABLE LOC (
      tiploc TEXT PRIMARY KEY,
      name TEXT,
      start_date TEXT,
      end_date TEXT,
      easting INTEGER,
      northing INTEGER,
      timing_point_type TEXT,
      zone TEXT,
      stanox INTEGER,
      off_network_indicator TEXT,
      force_lpb TEXT,
      geom_wkt TEXT,
      zone_ref_type TEXT DEFAULT 'ZNE',
      FOREIGN KEY (zone_ref_type, zone) REFERENCES REF
    );
    CREATE TABLE PLT (
      tiploc TEXT,
      platform_id TEXT,
      start_date TEXT,
      end_date TEXT,
      length INTEGER,
      power_supply TEXT,
      doo_passenger TEXT,
      doo_non_passenger TEXT,
      power_supply_ref_type TEXT DEFAULT 'PWR',
      PRIMARY KEY (tiploc, platform_id),
      FOREIGN KEY (tiploc) REFERENCES LOC,
      FOREIGN KEY (power_supply_ref_type, power_supply) REFERENCES REF
    );
    CREATE TABLE NWK (
      origin_location TEXT,
      destination_location TEXT,
      running_line_code TEXT,
      running_line_desc TEXT,
      start_date TEXT,
      end_date TEXT,
      initial_direction TEXT,
      final_direction TEXT,
      distance INTEGER,
      doo_passenger TEXT,
      doo_non_passenger TEXT,
      retb TEXT,
      zone TEXT,
      reversible_line TEXT,
      power_supply TEXT,
      ra TEXT,
      maximum_train_length INTEGER,
      zone_ref_type TEXT DEFAULT 'ZNE',
      power_supply_ref_type TEXT DEFAULT 'PWR',
      PRIMARY KEY (origin_location, destination_location, running_line_code),
      FOREIGN KEY (origin_location) REFERENCES LOC,
      FOREIGN KEY (destination_location) REFERENCES LOC,
      FOREIGN KEY (zone_ref_type, zone) REFERENCES REF,
      FOREIGN KEY (power_supply_ref_type, power_supply) REFERENCES REF
    );
    CREATE TABLE TLK (
      origin_location TEXT,
      destination_location TEXT,
      running_line_code TEXT,
      traction TEXT,
      trailing_load TEXT,
      speed INTEGER,
      ra_gauge TEXT,
      entry_speed INTEGER,
      exit_speed INTEGER,
      start_date TEXT,
      end_date TEXT,
      sectional_running_time TEXT,
      description TEXT,
      PRIMARY KEY (origin_location, destination_location, running_line_code, traction,
        trailing_load, speed, ra_gauge, entry_speed, exit_speed, start_date),
      FOREIGN KEY (origin_location) REFERENCES LOC,
      FOREIGN KEY (destination_location) REFERENCES LOC,
      FOREIGN KEY (origin_location, destination_location, running_line_code) REFERENCES NWK,
      FOREIGN KEY (traction, trailing_load, speed, ra_gauge) REFERENCES TLD
    );
";

/// Create every BPLAN table on a fresh database.
///
/// # Parameters
/// - `conn`: Connection to an empty database.
/// - `spatialite`: Optional path to the SpatiaLite module. When given, `LOC`
///   also gets a `geom` point column maintained by triggers.
pub fn create(conn: &Connection, spatialite: Option<&Path>) -> Result<(), Error> {
    // The output is written to a scratch file and renamed, no need for durability
    conn.pragma_update(None, "synchronous", "OFF")?;
    // BPLAN files reference codes and links they never define, the foreign
    // keys document the relations but are not enforced
    conn.pragma_update(None, "foreign_keys", "OFF")?;

    if let Some(path) = spatialite {
        load_spatialite(conn, path)?;
        conn.query_row("SELECT InitSpatialMetadata(1)", [], |_| Ok(()))?;
    }

    conn.execute_batch(SCHEMA)?;

    if spatialite.is_some() {
        add_geometry_column(conn)?;
    }
    Ok(())
}

fn load_spatialite(conn: &Connection, path: &Path) -> Result<(), Error> {
    log::debug!("Loading spatial extension {}", path.display());
    // SAFETY: the module is provided by the user invoking the converter
    unsafe {
        let _guard = LoadExtensionGuard::new(conn)?;
        conn.load_extension(path, None)?;
    }
    Ok(())
}

fn add_geometry_column(conn: &Connection) -> Result<(), Error> {
    conn.query_row(
        "SELECT AddGeometryColumn('LOC', 'geom', ?1, 'POINT', 2)",
        params![OSGB36_SRID],
        |_| Ok(()),
    )?;

    let condition = known_coordinates_condition();
    conn.execute_batch(&format!(
        "CREATE TRIGGER insert_LOC_geom AFTER INSERT ON LOC
           WHEN {condition} BEGIN
         UPDATE LOC SET geom = MakePoint(easting, northing, {srid}) WHERE rowid = NEW.rowid; END;
         CREATE TRIGGER update_LOC_geom AFTER UPDATE OF easting, northing ON LOC
           WHEN {condition} BEGIN
         UPDATE LOC SET geom = MakePoint(easting, northing, {srid}) WHERE rowid = NEW.rowid; END;",
        condition = condition,
        srid = OSGB36_SRID,
    ))?;
    Ok(())
}

/// Check that a table exists, for reading back converted databases.
pub fn table_exists(conn: &Connection, table_name: &str) -> Result<bool, Error> {
    let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type='table' AND name=?")?;
    let mut rows = stmt.query(params![table_name])?;
    Ok(rows.next()?.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bplan::structs::RecordType;

    #[test]
    fn test_create_schema() {
        let conn = Connection::open_in_memory().unwrap();
        create(&conn, None).unwrap();
        for record_type in RecordType::TABLES {
            assert!(table_exists(&conn, record_type.code()).unwrap());
        }
        assert!(!table_exists(&conn, "PIT").unwrap());
    }

    #[test]
    fn test_columns_follow_layouts() {
        let conn = Connection::open_in_memory().unwrap();
        create(&conn, None).unwrap();
        for record_type in RecordType::TABLES {
            let mut stmt = conn
                .prepare(&format!("PRAGMA table_info('{}')", record_type.code()))
                .unwrap();
            let columns = stmt
                .query_map([], |row| row.get::<_, String>(1))
                .unwrap()
                .collect::<Result<Vec<_>, _>>()
                .unwrap();
            for field in record_type.fields() {
                assert!(
                    columns.iter().any(|c| c == field),
                    "{} is missing column {}",
                    record_type,
                    field
                );
            }
        }
    }

    #[test]
    fn test_missing_spatialite_module() {
        let conn = Connection::open_in_memory().unwrap();
        let res = create(&conn, Some(Path::new("/nonexistent/mod_spatialite")));
        assert!(res.is_err());
    }

    #[test]
    fn test_foreign_keys_not_enforced() {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "foreign_keys", "ON").unwrap();
        create(&conn, None).unwrap();
        conn.execute(
            "INSERT INTO LOC (tiploc, zone, power_supply) VALUES ('ABWD', 'Z9', 'X')",
            [],
        )
        .unwrap();
        let enforced: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(enforced, 0);
    }
}

use geo_types::{coord, Rect};
use rusqlite::{Connection, OpenFlags};
use std::path::Path;

use crate::bplan::error::Error;
use crate::bplan::structs::RecordType;
use crate::db::{geom, schema};

/// Row counts and extent of a converted BPLAN database.
#[derive(Debug)]
pub struct DatabaseStats {
    /// Header fields, name and value, if the database has a header row
    pub header: Option<Vec<(String, String)>>,
    /// Row count per table, `None` when the table is absent
    pub tables: Vec<(RecordType, Option<u64>)>,
    /// Bounding box of every located `LOC` row
    pub extent: Option<Rect>,
}

impl DatabaseStats {
    /// Read the statistics of a database without modifying it.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<DatabaseStats, Error> {
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;

        let mut tables = Vec::new();
        for record_type in RecordType::TABLES {
            let count = if schema::table_exists(&conn, record_type.code())? {
                Some(count_rows(&conn, record_type.code())?)
            } else {
                None
            };
            tables.push((record_type, count));
        }

        let header = if schema::table_exists(&conn, RecordType::Pif.code())? {
            read_header(&conn)?
        } else {
            None
        };
        let extent = if schema::table_exists(&conn, RecordType::Loc.code())? {
            read_extent(&conn)?
        } else {
            None
        };

        Ok(DatabaseStats {
            header,
            tables,
            extent,
        })
    }

    pub fn print_stats(&self) {
        println!("BPLAN database:");
        if let Some(header) = &self.header {
            for (name, value) in header {
                println!("  {}: {}", name, value);
            }
        }
        for (record_type, count) in &self.tables {
            match count {
                Some(count) => println!("  {}: {} rows", record_type, count),
                None => println!("  {}: table not present", record_type),
            }
        }
        if let Some(extent) = &self.extent {
            println!(
                "  Extent (EPSG:{}): {} {} to {} {}",
                geom::OSGB36_SRID,
                extent.min().x,
                extent.min().y,
                extent.max().x,
                extent.max().y
            );
        }
    }
}

fn count_rows(conn: &Connection, table_name: &str) -> Result<u64, Error> {
    let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table_name), [], |row| {
        row.get(0)
    })?;
    Ok(count as u64)
}

fn read_header(conn: &Connection) -> Result<Option<Vec<(String, String)>>, Error> {
    let mut stmt = conn.prepare("SELECT * FROM PIF LIMIT 1")?;
    let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut rows = stmt.query([])?;
    match rows.next()? {
        Some(row) => {
            let mut fields = Vec::new();
            for (i, name) in names.into_iter().enumerate() {
                let value: Option<String> = row.get(i)?;
                fields.push((name, value.unwrap_or_default()));
            }
            Ok(Some(fields))
        }
        None => Ok(None),
    }
}

fn read_extent(conn: &Connection) -> Result<Option<Rect>, Error> {
    let mut stmt = conn.prepare("SELECT geom_wkt FROM LOC WHERE geom_wkt IS NOT NULL")?;
    let points = stmt.query_map([], |row| row.get::<usize, String>(0))?;

    let mut extent: Option<Rect> = None;
    for wkt_str in points {
        let Some(point) = geom::from_wkt(&wkt_str?) else {
            continue;
        };
        extent = Some(match extent {
            None => Rect::new(point.0, point.0),
            Some(r) => Rect::new(
                coord! { x: r.min().x.min(point.x()), y: r.min().y.min(point.y()) },
                coord! { x: r.max().x.max(point.x()), y: r.max().y.max(point.y()) },
            ),
        });
    }
    Ok(extent)
}

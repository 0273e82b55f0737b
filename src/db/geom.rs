use geo_types::Point;
use std::str::FromStr;
use wkt::{ToWkt, Wkt};

/// OSGB36 / British National Grid, the reference system of BPLAN coordinates.
pub const OSGB36_SRID: i32 = 27700;

/// Value BPLAN uses when a coordinate is not known.
const UNKNOWN_COORDINATE: i64 = 999999;

/// Whether a grid coordinate denotes an actual position.
pub fn is_known_coordinate(value: i64) -> bool {
    value != 0 && value != UNKNOWN_COORDINATE
}

/// Builds the grid point of a location, if both coordinates are known.
///
/// # Parameters
/// - `easting`: Easting in metres on the British National Grid.
/// - `northing`: Northing in metres on the British National Grid.
pub fn location_point(easting: Option<i64>, northing: Option<i64>) -> Option<Point> {
    match (easting, northing) {
        (Some(e), Some(n)) if is_known_coordinate(e) && is_known_coordinate(n) => {
            Some(Point::new(e as f64, n as f64))
        }
        _ => None,
    }
}

pub fn to_wkt(point: &Point) -> String {
    point.wkt_string()
}

/// Parses a point previously written with [`to_wkt`].
pub fn from_wkt(wkt_str: &str) -> Option<Point> {
    let wkt = Wkt::<f64>::from_str(wkt_str).ok()?;
    wkt.try_into().ok()
}

/// SQL condition matching [`is_known_coordinate`] for the row being written by a trigger.
pub fn known_coordinates_condition() -> String {
    format!(
        "NEW.easting != 0 AND NEW.easting != {u} AND NEW.northing != 0 AND NEW.northing != {u}",
        u = UNKNOWN_COORDINATE
    )
}

//! Converts Network Rail BPLAN reference data into SQLite databases that can
//! be browsed with Datasette.

pub mod bplan;
pub mod convert;
pub mod db;
pub mod metadata;

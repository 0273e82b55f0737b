pub mod geom;
pub mod inspect;
pub mod schema;
pub mod writer;

//! Geoprocessing primitives over feature layers: intersect, dissolve and
//! attribute join.

pub mod convert;
pub mod dissolve;
pub mod intersect;
pub mod join;

pub use dissolve::{dissolve, StatField, Statistic};
pub use intersect::intersect;
pub use join::join_field;

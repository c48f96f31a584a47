//! Report records and the distance measures defined over them

pub mod distance;
pub mod report;

pub use distance::{EARTH_RADIUS_METERS, MILLIS_PER_DAY};
pub use report::Report;

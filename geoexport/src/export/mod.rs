//! Pipeline d'export (CRS, reprojection, features, écriture)

pub mod crs;
pub mod driver;
pub mod feature;
pub mod ogr;
pub mod pipeline;
pub mod reproject;
pub mod writer;

pub use pipeline::Exporter;
pub use reproject::Reprojector;

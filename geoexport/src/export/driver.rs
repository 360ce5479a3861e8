//! Classification des drivers vectoriels de sortie

use std::fmt;

/// Driver de sortie normalisé
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputDriver {
    Shapefile,
    FlatGeobuf,
    GeoPackage,
    OpenFileGdb,
    /// Driver GDAL passé tel quel, traité comme mono-fichier
    Other(String),
}

impl OutputDriver {
    /// Normalise un nom de driver (alias insensibles à la casse)
    pub fn from_name(name: &str) -> Self {
        let name = name.trim();
        match name.to_ascii_lowercase().as_str() {
            "shp" | "shape" | "shapefile" | ".shp" | "esri shapefile" => Self::Shapefile,
            "fgb" | "flatgeobuf" | ".fgb" => Self::FlatGeobuf,
            "gpkg" | "geopackage" | ".gpkg" => Self::GeoPackage,
            "gdb" | "openfilegdb" | "filegdb" | ".gdb" => Self::OpenFileGdb,
            _ => Self::Other(name.to_string()),
        }
    }

    /// Nom du driver GDAL/OGR
    pub fn gdal_name(&self) -> &str {
        match self {
            Self::Shapefile => "ESRI Shapefile",
            Self::FlatGeobuf => "FlatGeobuf",
            Self::GeoPackage => "GPKG",
            Self::OpenFileGdb => "OpenFileGDB",
            Self::Other(name) => name,
        }
    }

    /// Conteneur multi-couches : la cible est le fichier de sortie lui-même
    pub fn is_container(&self) -> bool {
        matches!(self, Self::GeoPackage | Self::OpenFileGdb)
    }

    pub fn supports_spatial_index(&self) -> bool {
        !matches!(self, Self::OpenFileGdb)
    }

    /// Vrai si le driver accepte l'option de couche `ENCODING`
    pub fn supports_encoding_option(&self) -> bool {
        matches!(self, Self::Shapefile)
    }

    /// Écriture groupée dans une transaction
    pub fn uses_transaction(&self) -> bool {
        matches!(self, Self::GeoPackage)
    }

    pub fn extension(&self) -> Option<&'static str> {
        match self {
            Self::Shapefile => Some("shp"),
            Self::FlatGeobuf => Some("fgb"),
            Self::GeoPackage => Some("gpkg"),
            Self::OpenFileGdb => Some("gdb"),
            Self::Other(_) => None,
        }
    }
}

impl fmt::Display for OutputDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.gdal_name())
    }
}

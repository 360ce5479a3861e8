//! Résolution des systèmes de coordonnées avec cache
//!
//! Un identifiant (code `EPSG:xxxx`, WKT, chaîne PROJ...) est validé par GDAL
//! une seule fois puis servi depuis le cache. Les identifiants vides ou
//! invalides retombent sur le CRS par défaut et ne sont jamais mis en cache.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use gdal::errors::GdalError;
use gdal::spatial_ref::SpatialRef;
use thiserror::Error;
use tracing::{debug, error, warn};

/// CRS par défaut : CGCS2000 / 3-degree Gauss-Kruger zone 38
pub const DEFAULT_CRS: &str = "EPSG:4526";

#[derive(Debug, Error)]
pub enum CrsError {
    #[error("Invalid CRS definition '{definition}': {source}")]
    Invalid {
        definition: String,
        source: GdalError,
    },

    #[error("CRS '{definition}' cannot be exported as WKT: {source}")]
    NoIdentity {
        definition: String,
        source: GdalError,
    },
}

/// Identité canonique d'un CRS : code d'autorité si disponible, sinon WKT complet.
///
/// Deux CRS construits différemment mais équivalents partagent la même identité.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CrsIdentity {
    Authority(String),
    Wkt(String),
}

impl CrsIdentity {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Authority(code) => code,
            Self::Wkt(wkt) => wkt,
        }
    }

    /// Vrai si l'identité est un code d'autorité (ex: `EPSG:4490`)
    pub fn is_authority(&self) -> bool {
        matches!(self, Self::Authority(_))
    }
}

impl fmt::Display for CrsIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authority(code) => f.write_str(code),
            Self::Wkt(wkt) if wkt.chars().count() > 48 => {
                write!(f, "{}...", wkt.chars().take(48).collect::<String>())
            }
            Self::Wkt(wkt) => f.write_str(wkt),
        }
    }
}

/// CRS résolu et validé
pub struct Crs {
    definition: String,
    srs: SpatialRef,
    identity: CrsIdentity,
}

impl Crs {
    /// Construit et valide un CRS depuis sa définition
    pub fn from_definition(definition: &str) -> Result<Self, CrsError> {
        let srs = SpatialRef::from_definition(definition).map_err(|source| CrsError::Invalid {
            definition: definition.to_string(),
            source,
        })?;

        let identity = match srs.authority().into_iter().find(|code| !code.is_empty()) {
            Some(code) => CrsIdentity::Authority(code),
            None => CrsIdentity::Wkt(srs.to_wkt().map_err(|source| CrsError::NoIdentity {
                definition: definition.to_string(),
                source,
            })?),
        };

        Ok(Self {
            definition: definition.to_string(),
            srs,
            identity,
        })
    }

    /// Définition telle que fournie par l'appelant
    pub fn definition(&self) -> &str {
        &self.definition
    }

    pub fn identity(&self) -> &CrsIdentity {
        &self.identity
    }

    pub fn spatial_ref(&self) -> &SpatialRef {
        &self.srs
    }

    /// Vrai si les deux CRS désignent le même système
    pub fn same_as(&self, other: &Crs) -> bool {
        self.identity == other.identity
    }
}

impl fmt::Debug for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Crs")
            .field("definition", &self.definition)
            .field("identity", &self.identity)
            .finish()
    }
}

/// Résolveur de CRS avec cache, propriété d'une seule session d'export
pub struct CrsResolver {
    default: Rc<Crs>,
    cache: HashMap<String, Rc<Crs>>,
}

impl CrsResolver {
    /// Crée le résolveur ; le CRS par défaut est résolu immédiatement.
    ///
    /// # Errors
    ///
    /// Échoue si le CRS par défaut lui-même est invalide (erreur d'initialisation).
    pub fn new(default_definition: &str) -> Result<Self, CrsError> {
        let default = Rc::new(Crs::from_definition(default_definition)?);
        debug!(identity = %default.identity(), "Default CRS resolved");

        Ok(Self {
            default,
            cache: HashMap::new(),
        })
    }

    pub fn default_crs(&self) -> &Rc<Crs> {
        &self.default
    }

    /// Nombre d'identifiants en cache
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    /// Résout un identifiant de CRS.
    ///
    /// Ne lève jamais d'erreur : un identifiant vide ou invalide est journalisé
    /// et remplacé par le CRS par défaut.
    pub fn resolve(&mut self, identifier: &str) -> Rc<Crs> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            warn!(
                default = %self.default.identity(),
                "Empty CRS definition, using default CRS"
            );
            return Rc::clone(&self.default);
        }

        if let Some(crs) = self.cache.get(identifier) {
            return Rc::clone(crs);
        }

        match Crs::from_definition(identifier) {
            Ok(crs) => {
                let crs = Rc::new(crs);
                debug!(definition = crs.definition(), identity = %crs.identity(), "CRS resolved");
                self.cache.insert(identifier.to_string(), Rc::clone(&crs));
                crs
            }
            Err(e) => {
                error!(
                    definition = identifier,
                    default = %self.default.identity(),
                    "Invalid CRS definition, using default CRS: {}",
                    e
                );
                Rc::clone(&self.default)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_resolved() {
        let resolver = CrsResolver::new(DEFAULT_CRS).unwrap();
        assert_eq!(resolver.default_crs().identity().as_str(), "EPSG:4526");
        assert!(resolver.default_crs().identity().is_authority());
        assert_eq!(resolver.cached(), 0);
    }

    #[test]
    fn test_invalid_default_fails() {
        assert!(CrsResolver::new("EPSG:99999").is_err());
    }

    #[test]
    fn test_cache_reuse() {
        let mut resolver = CrsResolver::new(DEFAULT_CRS).unwrap();

        let first = resolver.resolve("EPSG:4490");
        let second = resolver.resolve("EPSG:4490");

        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(first.identity().as_str(), "EPSG:4490");
        assert_eq!(resolver.cached(), 1);
    }

    #[test]
    fn test_empty_uses_default() {
        let mut resolver = CrsResolver::new(DEFAULT_CRS).unwrap();

        let crs = resolver.resolve("");
        assert!(Rc::ptr_eq(&crs, resolver.default_crs()));

        let crs = resolver.resolve("   ");
        assert!(Rc::ptr_eq(&crs, resolver.default_crs()));
        assert_eq!(resolver.cached(), 0);
    }

    #[test]
    fn test_invalid_uses_default_and_is_not_cached() {
        let mut resolver = CrsResolver::new(DEFAULT_CRS).unwrap();

        let crs = resolver.resolve("not a crs");
        assert!(Rc::ptr_eq(&crs, resolver.default_crs()));
        assert_eq!(resolver.cached(), 0);

        // Nouvelle tentative, même résultat
        let again = resolver.resolve("not a crs");
        assert!(Rc::ptr_eq(&again, resolver.default_crs()));
        assert_eq!(resolver.cached(), 0);
    }

    #[test]
    fn test_equivalent_definitions_share_identity() {
        let mut resolver = CrsResolver::new(DEFAULT_CRS).unwrap();

        let by_code = resolver.resolve("EPSG:4326");
        let by_wkt = resolver.resolve(&by_code.spatial_ref().to_wkt().unwrap());

        assert!(!Rc::ptr_eq(&by_code, &by_wkt));
        assert!(by_code.same_as(&by_wkt));
        assert_eq!(resolver.cached(), 2);
    }
}

//! Reprojection de géométries avec PROJ
//!
//! Les transformations sont coûteuses à construire : `TransformCache` en garde
//! une par couple (source, cible) pour toute la durée d'un export.

use std::collections::HashMap;
use std::rc::Rc;

use geo::{Coord, Geometry, LineString, Point, Polygon};
use proj::{Proj, ProjCreateError, ProjError};
use thiserror::Error;
use tracing::debug;

use super::crs::{Crs, CrsIdentity};

#[derive(Debug, Error)]
pub enum ReprojectError {
    #[error("Failed to create projection from {from} to {to}: {source}")]
    Create {
        from: String,
        to: String,
        source: ProjCreateError,
    },

    #[error("Coordinate transformation failed: {0}")]
    Convert(#[from] ProjError),

    #[error("Coordinate transformation produced a non-finite value")]
    NonFinite,
}

type Result<T> = std::result::Result<T, ReprojectError>;

/// Reprojection de géométries entre deux systèmes de coordonnées
pub struct Reprojector {
    proj: Proj,
    source: CrsIdentity,
    target: CrsIdentity,
}

impl Reprojector {
    /// Crée un nouveau reprojector entre deux CRS (code d'autorité ou WKT)
    pub fn new(source: &CrsIdentity, target: &CrsIdentity) -> Result<Self> {
        let proj = Proj::new_known_crs(source.as_str(), target.as_str(), None).map_err(
            |source_err| ReprojectError::Create {
                from: source.to_string(),
                to: target.to_string(),
                source: source_err,
            },
        )?;

        Ok(Self {
            proj,
            source: source.clone(),
            target: target.clone(),
        })
    }

    pub fn source(&self) -> &CrsIdentity {
        &self.source
    }

    pub fn target(&self) -> &CrsIdentity {
        &self.target
    }

    /// Transforme une géométrie sur place
    pub fn transform_in_place(&self, geom: &mut Geometry) -> Result<()> {
        // Rect et Triangle n'ont pas de sens une fois déformés
        match geom {
            Geometry::Rect(r) => *geom = Geometry::Polygon(r.to_polygon()),
            Geometry::Triangle(t) => *geom = Geometry::Polygon(t.to_polygon()),
            _ => {}
        }

        match geom {
            Geometry::Point(p) => {
                *p = self.transform_point(p)?;
            }
            Geometry::Line(line) => {
                line.start = self.transform_coord(line.start)?;
                line.end = self.transform_coord(line.end)?;
            }
            Geometry::LineString(ls) => {
                self.transform_coords(&mut ls.0)?;
            }
            Geometry::Polygon(p) => {
                *p = self.transform_polygon(p)?;
            }
            Geometry::MultiPoint(mp) => {
                for p in mp.0.iter_mut() {
                    *p = self.transform_point(p)?;
                }
            }
            Geometry::MultiLineString(mls) => {
                for ls in mls.0.iter_mut() {
                    self.transform_coords(&mut ls.0)?;
                }
            }
            Geometry::MultiPolygon(mp) => {
                for p in mp.0.iter_mut() {
                    *p = self.transform_polygon(p)?;
                }
            }
            Geometry::GeometryCollection(gc) => {
                for g in gc.0.iter_mut() {
                    self.transform_in_place(g)?;
                }
            }
            Geometry::Rect(_) | Geometry::Triangle(_) => unreachable!("normalized to Polygon above"),
        }

        Ok(())
    }

    /// Transforme une coordonnée unique
    fn transform_coord(&self, coord: Coord) -> Result<Coord> {
        let (x, y) = self.proj.convert((coord.x, coord.y))?;
        check_finite(x, y)?;
        Ok(Coord { x, y })
    }

    fn transform_point(&self, p: &Point) -> Result<Point> {
        Ok(Point(self.transform_coord(p.0)?))
    }

    /// Transforme une suite de coordonnées (batch, beaucoup plus rapide que point par point)
    fn transform_coords(&self, coords: &mut [Coord]) -> Result<()> {
        let mut xy: Vec<(f64, f64)> = coords.iter().map(|c| (c.x, c.y)).collect();

        self.proj.convert_array(&mut xy)?;

        for (coord, (x, y)) in coords.iter_mut().zip(xy) {
            check_finite(x, y)?;
            coord.x = x;
            coord.y = y;
        }
        Ok(())
    }

    /// Transforme un Polygon
    fn transform_polygon(&self, p: &Polygon) -> Result<Polygon> {
        let mut exterior = p.exterior().clone();
        self.transform_coords(&mut exterior.0)?;

        let interiors = p
            .interiors()
            .iter()
            .map(|ring| {
                let mut ring: LineString = ring.clone();
                self.transform_coords(&mut ring.0)?;
                Ok(ring)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Polygon::new(exterior, interiors))
    }
}

fn check_finite(x: f64, y: f64) -> Result<()> {
    if x.is_finite() && y.is_finite() {
        Ok(())
    } else {
        Err(ReprojectError::NonFinite)
    }
}

/// Cache des transformations, clé = couple ordonné d'identités canoniques
#[derive(Default)]
pub struct TransformCache {
    cache: HashMap<(CrsIdentity, CrsIdentity), Rc<Reprojector>>,
}

impl TransformCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Nombre de transformations construites
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Transformation de `src` vers `dst`.
    ///
    /// `None` si les deux CRS sont identiques (aucune transformation nécessaire,
    /// rien n'est mis en cache). Un échec de construction n'est pas mis en cache.
    pub fn transform_for(&mut self, src: &Crs, dst: &Crs) -> Result<Option<Rc<Reprojector>>> {
        if src.same_as(dst) {
            return Ok(None);
        }

        let key = (src.identity().clone(), dst.identity().clone());
        if let Some(reprojector) = self.cache.get(&key) {
            return Ok(Some(Rc::clone(reprojector)));
        }

        let reprojector = Rc::new(Reprojector::new(&key.0, &key.1)?);
        debug!(from = %reprojector.source(), to = %reprojector.target(), "Transform created");
        self.cache.insert(key, Rc::clone(&reprojector));
        Ok(Some(reprojector))
    }
}

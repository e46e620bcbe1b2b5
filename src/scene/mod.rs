pub mod bvh;
pub mod light;
pub mod material;
pub mod primitives;

use indexmap::IndexMap;
use nalgebra::Unit;
use thiserror::Error;

use crate::geometry::{FloatType, Ray, TimeInterval, WorldBox, WorldPoint, WorldVector};

use bvh::{BuildSettings, Bvh, SurfaceIdx};
use light::Light;
use material::Material;
use primitives::Primitive;

/// Renderable surface, as seen by the acceleration structure.
pub trait Surface {
    /// Box enclosing the surface at every instant of the interval.
    fn bounding_box(&self, interval: &TimeInterval) -> WorldBox;

    /// Nearest intersection of the ray with the surface, with t inside `[t_min, t_max]`.
    /// The ray's `time` selects the instant for moving surfaces.
    fn hit(&self, ray: &Ray, t_min: FloatType, t_max: FloatType) -> Option<SurfaceHit>;

    /// Name of the material used for shading this surface.
    fn material(&self) -> Option<&str> {
        None
    }
}

impl<T: Surface + ?Sized> Surface for Box<T> {
    fn bounding_box(&self, interval: &TimeInterval) -> WorldBox {
        (**self).bounding_box(interval)
    }

    fn hit(&self, ray: &Ray, t_min: FloatType, t_max: FloatType) -> Option<SurfaceHit> {
        (**self).hit(ray, t_min, t_max)
    }

    fn material(&self) -> Option<&str> {
        (**self).material()
    }
}

/// Intersection reported by a single surface.
#[derive(Clone, Debug, PartialEq)]
pub struct SurfaceHit {
    pub t: FloatType,
    pub point: WorldPoint,
    pub normal: Unit<WorldVector>,
}

/// Nearest intersection found in the scene.
#[derive(Clone, Debug, PartialEq)]
pub struct HitRecord {
    /// Ray parameter of the hit
    pub t: FloatType,
    pub point: WorldPoint,
    pub normal: Unit<WorldVector>,
    /// Surface that produced the hit, None if nothing was hit yet.
    pub surface: Option<SurfaceIdx>,
}

impl HitRecord {
    fn new(hit: SurfaceHit, surface: SurfaceIdx) -> HitRecord {
        HitRecord {
            t: hit.t,
            point: hit.point,
            normal: hit.normal,
            surface: Some(surface),
        }
    }
}

impl Default for HitRecord {
    fn default() -> Self {
        HitRecord {
            t: FloatType::INFINITY,
            point: WorldPoint::origin(),
            normal: WorldVector::z_axis(),
            surface: None,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum SceneError {
    #[error("Material {0:?} not found")]
    MaterialNotFound(String),
}

/// Lights, materials and surfaces of a scene.
///
/// Surfaces are collected with `add_surface` and become visible to `hit_surface`
/// only after `finalize` builds the tree over them.
/// Calling `finalize` again is a no-op unless new surfaces were added since the last call,
/// in which case the whole tree is rebuilt.
pub struct Scene<S = Primitive> {
    lights: Vec<Light>,
    materials: IndexMap<String, Material>,

    tree: Bvh<S>,
    pending_surfaces: Vec<S>,

    settings: BuildSettings,
    shutter: TimeInterval,
}

impl<S: Surface> Scene<S> {
    pub fn new() -> Self {
        Self::with_settings(BuildSettings::default(), TimeInterval::default())
    }

    /// Creates a scene whose tree is built with `settings`, enclosing the surfaces over
    /// the whole `shutter` interval.
    pub fn with_settings(settings: BuildSettings, shutter: TimeInterval) -> Self {
        Scene {
            lights: Vec::new(),
            materials: IndexMap::new(),
            tree: Bvh::build(Vec::new(), shutter, &settings),
            pending_surfaces: Vec::new(),
            settings,
            shutter,
        }
    }

    pub fn add_light(&mut self, light: Light) {
        self.lights.push(light);
    }

    /// Adds a surface and returns the index that hit records will use to refer to it.
    pub fn add_surface(&mut self, surface: S) -> SurfaceIdx {
        let index = SurfaceIdx::from_usize(self.tree.len() + self.pending_surfaces.len());
        self.pending_surfaces.push(surface);
        index
    }

    /// Adds a material, replacing (and returning) a previous one with the same name.
    pub fn add_material(&mut self, material: Material) -> Option<Material> {
        self.materials.insert(material.name.clone(), material)
    }

    /// Builds the tree over all surfaces added so far.
    pub fn finalize(&mut self) {
        if self.pending_surfaces.is_empty() {
            log::debug!("Scene is already finalized, keeping the existing tree");
            return;
        }

        let previous = std::mem::replace(
            &mut self.tree,
            Bvh::build(Vec::new(), self.shutter, &self.settings),
        );
        if !previous.is_empty() {
            log::debug!(
                "Rebuilding tree with {} new surfaces",
                self.pending_surfaces.len()
            );
        }
        let mut surfaces = previous.into_surfaces();
        surfaces.append(&mut self.pending_surfaces);

        self.tree = Bvh::build(surfaces, self.shutter, &self.settings);
    }

    /// True if every added surface is part of the tree.
    pub fn is_finalized(&self) -> bool {
        self.pending_surfaces.is_empty()
    }

    pub fn lights(&self) -> &[Light] {
        &self.lights
    }

    /// Looks up a material by name. The material table is never modified by the lookup.
    pub fn get_material(&self, name: &str) -> Result<&Material, SceneError> {
        self.materials
            .get(name)
            .ok_or_else(|| SceneError::MaterialNotFound(name.to_owned()))
    }

    /// Materials in the order they were first added.
    pub fn materials(&self) -> impl Iterator<Item = &Material> {
        self.materials.values()
    }

    /// Material of the surface that produced the hit.
    /// Returns Ok(None) if nothing was hit or the surface has no material.
    pub fn material_for(&self, record: &HitRecord) -> Result<Option<&Material>, SceneError> {
        let Some(name) = record
            .surface
            .and_then(|index| self.tree.surface(index))
            .and_then(|surface| surface.material())
        else {
            return Ok(None);
        };
        self.get_material(name).map(Some)
    }

    pub fn surface(&self, index: SurfaceIdx) -> Option<&S> {
        self.tree.surface(index)
    }

    pub fn tree(&self) -> &Bvh<S> {
        &self.tree
    }

    pub fn shutter(&self) -> TimeInterval {
        self.shutter
    }

    /// Finds the nearest surface hit by the ray with t in `[start_time, end_time]`.
    /// The record is overwritten only when a hit is found.
    pub fn hit_surface(
        &self,
        ray: &Ray,
        start_time: FloatType,
        end_time: FloatType,
        record: &mut HitRecord,
    ) -> bool {
        self.tree.hit(ray, start_time, end_time, record)
    }
}

impl<S: Surface> Default for Scene<S> {
    fn default() -> Self {
        Self::new()
    }
}

pub mod geometry;
pub mod scene;
mod util;

pub use scene::{
    HitRecord, Scene, SceneError, Surface, SurfaceHit,
    bvh::{BuildSettings, Bvh, BvhStatistics, SplitStrategy, SurfaceIdx, TraversalStats},
};
pub use util::Stats;

use crate::geometry::{WorldPoint, WorldVector};

use super::material::Rgb;

#[derive(Clone, Debug, PartialEq)]
pub enum Light {
    Point {
        position: WorldPoint,
        intensity: Rgb,
    },
    /// Light coming from infinity, `direction` points from the light into the scene.
    Directional {
        direction: WorldVector,
        intensity: Rgb,
    },
    /// Parallelogram light spanned by two edges from the corner.
    Area {
        corner: WorldPoint,
        edges: [WorldVector; 2],
        intensity: Rgb,
    },
}

impl Light {
    pub fn intensity(&self) -> Rgb {
        match self {
            Light::Point { intensity, .. }
            | Light::Directional { intensity, .. }
            | Light::Area { intensity, .. } => *intensity,
        }
    }

    /// Representative position of the light, None for lights at infinity.
    pub fn position(&self) -> Option<WorldPoint> {
        match self {
            Light::Point { position, .. } => Some(*position),
            Light::Directional { .. } => None,
            Light::Area { corner, edges, .. } => Some(*corner + (edges[0] + edges[1]) * 0.5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::assert;

    #[test]
    fn area_light_position_is_center() {
        let light = Light::Area {
            corner: WorldPoint::new(0.0, 2.0, 0.0),
            edges: [WorldVector::new(2.0, 0.0, 0.0), WorldVector::new(0.0, 0.0, 4.0)],
            intensity: Rgb::new(1.0, 1.0, 1.0),
        };
        assert!(light.position() == Some(WorldPoint::new(1.0, 2.0, 2.0)));
        assert!(light.intensity() == Rgb::new(1.0, 1.0, 1.0));
    }

    #[test]
    fn directional_light_has_no_position() {
        let light = Light::Directional {
            direction: WorldVector::new(0.0, -1.0, 0.0),
            intensity: Rgb::new(0.2, 0.2, 0.2),
        };
        assert!(light.position().is_none());
    }
}

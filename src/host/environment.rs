use crate::util::vec3::Vec3;

/// World-geometry collaborator consulted by ball physics
pub trait Environment: Send + Sync {
    /// Whether a ball at `position` would be inside solid ground or outside the world
    fn is_solid_or_out_of_bounds(&self, position: Vec3) -> bool;
}

/// Flat floor with an optional bounding box
///
/// Space at or below `floor_y` is solid. When bounds are set, everything
/// outside the box is solid too.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlatWorld {
    pub floor_y: f64,
    pub bounds: Option<(Vec3, Vec3)>,
}

impl FlatWorld {
    pub fn new(floor_y: f64) -> Self {
        Self {
            floor_y,
            bounds: None,
        }
    }

    pub fn with_bounds(mut self, a: Vec3, b: Vec3) -> Self {
        self.bounds = Some((a, b));
        self
    }
}

impl Default for FlatWorld {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl Environment for FlatWorld {
    fn is_solid_or_out_of_bounds(&self, position: Vec3) -> bool {
        if !position.is_finite() || position.y <= self.floor_y {
            return true;
        }
        match self.bounds {
            Some((a, b)) => !position.within(a, b),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_floor_is_solid() {
        let world = FlatWorld::new(64.0);
        assert!(world.is_solid_or_out_of_bounds(Vec3::new(0.0, 64.0, 0.0)));
        assert!(world.is_solid_or_out_of_bounds(Vec3::new(0.0, 10.0, 0.0)));
        assert!(!world.is_solid_or_out_of_bounds(Vec3::new(0.0, 64.5, 0.0)));
    }

    #[test]
    fn test_bounds() {
        let world = FlatWorld::new(0.0)
            .with_bounds(Vec3::new(10.0, 0.0, 10.0), Vec3::new(-10.0, 50.0, -10.0));
        assert!(!world.is_solid_or_out_of_bounds(Vec3::new(5.0, 5.0, -5.0)));
        assert!(world.is_solid_or_out_of_bounds(Vec3::new(11.0, 5.0, 0.0)));
        assert!(world.is_solid_or_out_of_bounds(Vec3::new(0.0, 51.0, 0.0)));
    }

    #[test]
    fn test_non_finite_is_solid() {
        let world = FlatWorld::default();
        assert!(world.is_solid_or_out_of_bounds(Vec3::new(f64::NAN, 5.0, 0.0)));
    }
}

use crate::{frustum::Frustum, Intersection, Matrix4Ext};
use nalgebra::{Matrix4, Vector3};

/// An axis-aligned box volume. The default box is inverted (min above max)
/// which marks it as unset; a box spanning the full float range is the
/// "maximum" sentinel that must never be culled.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct AxisAlignedBoundingBox {
    pub min: Vector3<f32>,
    pub max: Vector3<f32>,
}

impl Default for AxisAlignedBoundingBox {
    #[inline]
    fn default() -> Self {
        Self {
            min: Vector3::new(f32::MAX, f32::MAX, f32::MAX),
            max: Vector3::new(-f32::MAX, -f32::MAX, -f32::MAX),
        }
    }
}

impl AxisAlignedBoundingBox {
    #[inline]
    pub const fn from_min_max(min: Vector3<f32>, max: Vector3<f32>) -> Self {
        Self { min, max }
    }

    #[inline]
    pub fn from_half_extents(half: Vector3<f32>) -> Self {
        Self {
            min: -half,
            max: half,
        }
    }

    #[inline]
    pub fn from_points(points: &[Vector3<f32>]) -> Self {
        let mut aabb = AxisAlignedBoundingBox::default();
        for pt in points {
            aabb.add_point(*pt);
        }
        aabb
    }

    #[inline]
    pub fn maximum() -> Self {
        Self {
            min: Vector3::new(-f32::MAX, -f32::MAX, -f32::MAX),
            max: Vector3::new(f32::MAX, f32::MAX, f32::MAX),
        }
    }

    #[inline]
    pub fn is_maximum(&self) -> bool {
        self.min.x == -f32::MAX && self.max.x == f32::MAX
    }

    #[inline]
    pub fn is_unset(&self) -> bool {
        self.max.x < self.min.x
    }

    #[inline]
    pub fn add_point(&mut self, a: Vector3<f32>) {
        if a.x < self.min.x {
            self.min.x = a.x;
        }
        if a.y < self.min.y {
            self.min.y = a.y;
        }
        if a.z < self.min.z {
            self.min.z = a.z;
        }

        if a.x > self.max.x {
            self.max.x = a.x;
        }
        if a.y > self.max.y {
            self.max.y = a.y;
        }
        if a.z > self.max.z {
            self.max.z = a.z;
        }
    }

    #[inline]
    pub fn add_box(&mut self, other: Self) {
        if other.is_unset() {
            return;
        }
        self.add_point(other.min);
        self.add_point(other.max);
    }

    #[inline]
    pub fn center(&self) -> Vector3<f32> {
        (self.max + self.min).scale(0.5)
    }

    #[inline]
    pub fn half_extents(&self) -> Vector3<f32> {
        (self.max - self.min).scale(0.5)
    }

    #[inline]
    pub fn corners(&self) -> [Vector3<f32>; 8] {
        [
            Vector3::new(self.min.x, self.min.y, self.min.z),
            Vector3::new(self.min.x, self.min.y, self.max.z),
            Vector3::new(self.max.x, self.min.y, self.max.z),
            Vector3::new(self.max.x, self.min.y, self.min.z),
            Vector3::new(self.min.x, self.max.y, self.min.z),
            Vector3::new(self.min.x, self.max.y, self.max.z),
            Vector3::new(self.max.x, self.max.y, self.max.z),
            Vector3::new(self.max.x, self.max.y, self.min.z),
        ]
    }

    /// Transforms the box by an affine matrix.
    ///
    /// # References
    ///
    /// Transforming Axis-Aligned Bounding Boxes by Jim Arvo, "Graphics Gems",
    /// Academic Press, 1990
    #[inline]
    #[must_use]
    pub fn transform(&self, m: &Matrix4<f32>) -> AxisAlignedBoundingBox {
        if self.is_maximum() || self.is_unset() {
            return *self;
        }

        let basis = m.fixed_view::<3, 3>(0, 0);

        let mut transformed = Self {
            min: m.position(),
            max: m.position(),
        };

        for i in 0..3 {
            for j in 0..3 {
                let a = basis[(i, j)] * self.min[j];
                let b = basis[(i, j)] * self.max[j];
                if a < b {
                    transformed.min[i] += a;
                    transformed.max[i] += b;
                } else {
                    transformed.min[i] += b;
                    transformed.max[i] += a;
                }
            }
        }

        transformed
    }

    /// The orthogonal-matrix path is the same arithmetic for boxes; it exists
    /// so both volume kinds share one call surface.
    #[inline]
    #[must_use]
    pub fn ortho_transform(&self, m: &Matrix4<f32>) -> AxisAlignedBoundingBox {
        self.transform(m)
    }

    /// Classifies the box against the view volume using the positive/negative
    /// vertex test on the side planes and the depth interval against
    /// near/far.
    pub fn intersect_frustum(&self, frustum: &Frustum) -> Intersection {
        if self.is_maximum() || self.is_unset() {
            return Intersection::Partial;
        }

        let mut code = Intersection::Inside;

        // Depth interval against the axis-aligned near/far planes.
        if self.min.z > -frustum.z_near || self.max.z < -frustum.z_far {
            return Intersection::Outside;
        }
        if self.max.z > -frustum.z_near || self.min.z < -frustum.z_far {
            code = Intersection::Partial;
        }

        for plane in &frustum.side_planes {
            let mut p_vertex = self.min;
            let mut n_vertex = self.max;
            for axis in 0..3 {
                if plane.normal[axis] >= 0.0 {
                    p_vertex[axis] = self.max[axis];
                    n_vertex[axis] = self.min[axis];
                }
            }
            if plane.dot(&p_vertex) < 0.0 {
                return Intersection::Outside;
            }
            if plane.dot(&n_vertex) < 0.0 {
                code = Intersection::Partial;
            }
        }

        code
    }
}

#[cfg(test)]
mod test {
    use super::AxisAlignedBoundingBox;
    use crate::{frustum::Frustum, Intersection};
    use nalgebra::{Matrix4, Vector3};

    #[test]
    fn aabb_transform() {
        let aabb = AxisAlignedBoundingBox {
            min: Vector3::new(0.0, 0.0, 0.0),
            max: Vector3::new(1.0, 1.0, 1.0),
        };

        let transform = Matrix4::new_translation(&Vector3::new(1.0, 1.0, 1.0))
            * Matrix4::new_nonuniform_scaling(&Vector3::new(2.0, 2.0, 2.0));

        let transformed_aabb = aabb.transform(&transform);

        assert_eq!(transformed_aabb.min, Vector3::new(1.0, 1.0, 1.0));
        assert_eq!(transformed_aabb.max, Vector3::new(3.0, 3.0, 3.0));
    }

    #[test]
    fn box_in_view_is_inside() {
        let aabb = AxisAlignedBoundingBox::from_min_max(
            Vector3::new(-1.0, -1.0, -11.0),
            Vector3::new(1.0, 1.0, -9.0),
        );
        let frustum = Frustum::new(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 100.0);
        assert_eq!(aabb.intersect_frustum(&frustum), Intersection::Inside);
    }

    #[test]
    fn box_behind_eye_is_outside() {
        let aabb = AxisAlignedBoundingBox::from_min_max(
            Vector3::new(-1.0, -1.0, 9.0),
            Vector3::new(1.0, 1.0, 11.0),
        );
        let frustum = Frustum::new(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 100.0);
        assert_eq!(aabb.intersect_frustum(&frustum), Intersection::Outside);
    }

    #[test]
    fn maximum_box_is_never_culled() {
        let frustum = Frustum::default();
        assert_eq!(
            AxisAlignedBoundingBox::maximum().intersect_frustum(&frustum),
            Intersection::Partial
        );
    }
}

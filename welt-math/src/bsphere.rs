use crate::{aabb::AxisAlignedBoundingBox, frustum::Frustum, Intersection};
use nalgebra::{Matrix4, Point3, Vector3};

/// A bounding sphere. A radius below zero marks the sphere as unset (it
/// contains nothing yet), `f32::MAX` marks the "maximum" sentinel that must
/// never be culled.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BoundingSphere {
    pub center: Vector3<f32>,
    pub radius: f32,
}

impl Default for BoundingSphere {
    #[inline]
    fn default() -> Self {
        Self {
            center: Vector3::new(0.0, 0.0, 0.0),
            radius: -1.0,
        }
    }
}

impl BoundingSphere {
    #[inline]
    pub fn new(center: Vector3<f32>, radius: f32) -> Self {
        Self { center, radius }
    }

    #[inline]
    pub fn maximum() -> Self {
        Self {
            center: Vector3::new(0.0, 0.0, 0.0),
            radius: f32::MAX,
        }
    }

    #[inline]
    pub fn reset(&mut self) {
        self.center = Vector3::new(0.0, 0.0, 0.0);
        self.radius = -1.0;
    }

    #[inline]
    pub fn is_unset(&self) -> bool {
        self.radius < 0.0
    }

    #[inline]
    pub fn is_maximum(&self) -> bool {
        self.radius == f32::MAX
    }

    /// Grows the sphere to contain the given point.
    pub fn extend_point(&mut self, p: Vector3<f32>) {
        if self.is_maximum() {
            return;
        }

        if self.is_unset() {
            self.center = p;
            self.radius = 0.0;
            return;
        }

        let to_point = p - self.center;
        let dist = to_point.norm();

        if dist <= self.radius {
            return;
        }

        let new_radius = (dist + self.radius) * 0.5;
        self.center += to_point.scale((new_radius - self.radius) / dist);
        self.radius = new_radius;
    }

    /// Grows the sphere to contain another sphere.
    pub fn extend_sphere(&mut self, other: &BoundingSphere) {
        if self.is_maximum() || other.is_unset() {
            return;
        }

        if other.is_maximum() {
            *self = Self::maximum();
            return;
        }

        if self.is_unset() {
            *self = *other;
            return;
        }

        let between = other.center - self.center;
        let dist = between.norm();

        if dist + other.radius <= self.radius {
            // Inside us, no change.
            return;
        }
        if dist + self.radius <= other.radius {
            *self = *other;
            return;
        }

        let new_radius = (dist + self.radius + other.radius) * 0.5;
        if dist > f32::EPSILON {
            self.center += between.scale((new_radius - self.radius) / dist);
        }
        self.radius = new_radius;
    }

    /// Grows the sphere to contain an axis-aligned box.
    pub fn extend_box(&mut self, b: &AxisAlignedBoundingBox) {
        if b.is_maximum() {
            *self = Self::maximum();
            return;
        }
        for corner in b.corners() {
            self.extend_point(corner);
        }
    }

    /// Recomputes the sphere from a point set. Seeds the sphere on the pair
    /// of extremal points with the widest span, then makes a conservative
    /// extend pass over every point.
    pub fn enclose(&mut self, points: &[Vector3<f32>]) {
        self.reset();

        let Some(first) = points.first() else {
            return;
        };

        let mut min_p = [*first; 3];
        let mut max_p = [*first; 3];

        for p in &points[1..] {
            for axis in 0..3 {
                if p[axis] < min_p[axis][axis] {
                    min_p[axis] = *p;
                }
                if p[axis] > max_p[axis][axis] {
                    max_p[axis] = *p;
                }
            }
        }

        let mut span0 = min_p[0];
        let mut span1 = max_p[0];
        let mut max_span_sq = (max_p[0] - min_p[0]).norm_squared();
        for axis in 1..3 {
            let span_sq = (max_p[axis] - min_p[axis]).norm_squared();
            if span_sq > max_span_sq {
                span0 = min_p[axis];
                span1 = max_p[axis];
                max_span_sq = span_sq;
            }
        }

        self.center = (span0 + span1).scale(0.5);
        self.radius = (span1 - self.center).norm();

        for p in points {
            self.extend_point(*p);
        }
    }

    /// Transforms the sphere by an arbitrary affine matrix. The radius grows
    /// by the largest basis-column scale, so the result stays conservative
    /// under non-uniform scaling.
    pub fn transform(&self, m: &Matrix4<f32>) -> Self {
        if self.is_maximum() || self.is_unset() {
            return *self;
        }
        let scale = [0usize, 1, 2]
            .map(|i| m.fixed_view::<3, 1>(0, i).norm())
            .into_iter()
            .fold(0.0f32, f32::max);
        Self {
            center: m.transform_point(&Point3::from(self.center)).coords,
            radius: self.radius * scale,
        }
    }

    /// Transforms the sphere by an orthogonal, possibly uniformly scaling
    /// matrix. Cheaper than [`Self::transform`]; the result is undefined for
    /// a non-orthogonal matrix.
    pub fn ortho_transform(&self, m: &Matrix4<f32>) -> Self {
        if self.is_maximum() || self.is_unset() {
            return *self;
        }
        let scale = m.fixed_view::<3, 1>(0, 0).norm();
        Self {
            center: m.transform_point(&Point3::from(self.center)).coords,
            radius: self.radius * scale,
        }
    }

    /// Classifies the sphere against the view volume. The near and far planes
    /// are parallel to the xy plane, so they are tested directly against the
    /// center's depth coordinate; the side planes need the full dot product.
    pub fn intersect_frustum(&self, frustum: &Frustum) -> Intersection {
        if self.is_maximum() || self.is_unset() {
            return Intersection::Partial;
        }

        let mut code = Intersection::Inside;

        let d = -frustum.z_near - self.center.z;
        if d < -self.radius {
            return Intersection::Outside;
        }
        if d < self.radius {
            code = Intersection::Partial;
        }

        let d = self.center.z - -frustum.z_far;
        if d < -self.radius {
            return Intersection::Outside;
        }
        if d < self.radius {
            code = Intersection::Partial;
        }

        for plane in &frustum.side_planes {
            let d = plane.dot(&self.center);
            if d < -self.radius {
                return Intersection::Outside;
            }
            if d < self.radius {
                code = Intersection::Partial;
            }
        }

        code
    }
}

#[cfg(test)]
mod test {
    use super::BoundingSphere;
    use crate::{frustum::Frustum, Intersection};
    use nalgebra::{Matrix4, Vector3};

    #[test]
    fn extend_point_grows_minimally() {
        let mut sphere = BoundingSphere::default();
        sphere.extend_point(Vector3::new(-1.0, 0.0, 0.0));
        sphere.extend_point(Vector3::new(1.0, 0.0, 0.0));
        assert!((sphere.radius - 1.0).abs() < 1e-6);
        assert!(sphere.center.norm() < 1e-6);
    }

    #[test]
    fn enclose_contains_every_point() {
        let corners = [
            Vector3::new(-1.0, -1.0, -1.0),
            Vector3::new(1.0, -1.0, -1.0),
            Vector3::new(-1.0, 1.0, -1.0),
            Vector3::new(1.0, 1.0, -1.0),
            Vector3::new(-1.0, -1.0, 1.0),
            Vector3::new(1.0, -1.0, 1.0),
            Vector3::new(-1.0, 1.0, 1.0),
            Vector3::new(1.0, 1.0, 1.0),
        ];
        let mut sphere = BoundingSphere::default();
        sphere.enclose(&corners);
        // The seed-and-grow pass is conservative, not minimal: every point
        // must be inside, and the radius stays within the point cloud's
        // diameter.
        for corner in &corners {
            assert!((corner - sphere.center).norm() <= sphere.radius + 1e-5);
        }
        assert!(sphere.radius <= 2.0 * 3.0f32.sqrt());
    }

    #[test]
    fn maximum_is_never_culled() {
        let sphere = BoundingSphere::maximum();
        let frustum = Frustum::default();
        assert_eq!(sphere.intersect_frustum(&frustum), Intersection::Partial);
    }

    #[test]
    fn sphere_behind_eye_is_outside() {
        let sphere = BoundingSphere::new(Vector3::new(0.0, 0.0, 10.0), 1.0);
        let frustum = Frustum::default();
        assert_eq!(sphere.intersect_frustum(&frustum), Intersection::Outside);
    }

    #[test]
    fn sphere_in_view_is_inside() {
        let sphere = BoundingSphere::new(Vector3::new(0.0, 0.0, -10.0), 1.0);
        let frustum = Frustum::new(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 100.0);
        assert_eq!(sphere.intersect_frustum(&frustum), Intersection::Inside);
    }

    #[test]
    fn ortho_transform_scales_radius() {
        let sphere = BoundingSphere::new(Vector3::new(1.0, 0.0, 0.0), 1.0);
        let m = Matrix4::new_translation(&Vector3::new(0.0, 2.0, 0.0))
            * Matrix4::new_scaling(3.0);
        let transformed = sphere.ortho_transform(&m);
        assert!((transformed.radius - 3.0).abs() < 1e-6);
        assert!((transformed.center - Vector3::new(3.0, 2.0, 0.0)).norm() < 1e-6);
    }
}

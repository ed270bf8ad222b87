use crate::plane::Plane;
use nalgebra::Vector3;

/// A view volume: a truncated pyramid with its wide end facing down the -z
/// axis and its (theoretical) tip at the origin. The four side planes pass
/// through the origin, so their offsets are zero; near and far are kept as
/// plain distances because both planes are parallel to the xy plane and
/// volumes test their depth coordinate against them directly.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Frustum {
    /// Vertical field of view, radians.
    pub fovy: f32,
    /// Horizontal field of view, radians. Derived from `fovy` and the aspect
    /// ratio, not the ratio of the two fields of view.
    pub fovx: f32,
    /// Distance to the near clipping plane, positive.
    pub z_near: f32,
    /// Distance to the far clipping plane, positive.
    pub z_far: f32,
    /// 0 - left, 1 - right, 2 - top, 3 - bottom. Normals point inward.
    pub side_planes: [Plane; 4],
}

impl Default for Frustum {
    #[inline]
    fn default() -> Self {
        Self::new(std::f32::consts::FRAC_PI_4, 1.0, 0.01, 1024.0)
    }
}

impl Frustum {
    pub const LEFT: usize = 0;
    pub const RIGHT: usize = 1;
    pub const TOP: usize = 2;
    pub const BOTTOM: usize = 3;

    /// Constructs and initializes a frustum, gluPerspective-style. The field
    /// of view must be less than pi; `z_near` must be less than `z_far` and
    /// both are distances, not positions.
    pub fn new(fovy: f32, aspect: f32, z_near: f32, z_far: f32) -> Self {
        let cy = (fovy * 0.5).tan();
        let fovx = 2.0 * (cy * aspect).atan();
        let cx = (fovx * 0.5).tan();

        let nl = -z_near * cx;
        let nr = -nl;
        let nt = z_near * cy;
        let nb = -nt;

        // The side plane normals fall out of the vectors from the eyepoint to
        // the corners of the near clipping plane.
        let left = Vector3::new(nl, nb, -z_near)
            .cross(&Vector3::new(nl, nt, -z_near))
            .normalize();
        let top = Vector3::new(nl, nt, -z_near)
            .cross(&Vector3::new(nr, nt, -z_near))
            .normalize();

        let side_planes = [
            Plane { normal: left, d: 0.0 },
            Plane {
                normal: Vector3::new(-left.x, 0.0, left.z),
                d: 0.0,
            },
            Plane { normal: top, d: 0.0 },
            Plane {
                normal: Vector3::new(0.0, -top.y, top.z),
                d: 0.0,
            },
        ];

        Self {
            fovy,
            fovx,
            z_near,
            z_far,
            side_planes,
        }
    }
}

#[cfg(test)]
mod test {
    use super::Frustum;
    use nalgebra::Vector3;

    #[test]
    fn side_plane_normals_point_inward() {
        let frustum = Frustum::new(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 100.0);
        let inside = Vector3::new(0.0, 0.0, -10.0f32);
        for plane in &frustum.side_planes {
            assert!(plane.dot(&inside) > 0.0);
        }
    }

    #[test]
    fn symmetric_frustum_has_equal_fovs() {
        let frustum = Frustum::new(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 100.0);
        assert!((frustum.fovx - frustum.fovy).abs() < 1e-6);
    }
}

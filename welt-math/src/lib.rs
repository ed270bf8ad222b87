//! Math primitives shared by the welt scene runtime: bounding volumes used
//! for view-volume culling and the helpers the scene traversal needs on top
//! of nalgebra.

pub mod aabb;
pub mod bsphere;
pub mod frustum;
pub mod plane;

use nalgebra::{Matrix4, Scalar, Vector3};

/// Classification of a bounding volume against a view volume.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Intersection {
    /// The volume lies entirely outside the view volume.
    Outside,
    /// The volume straddles at least one boundary plane.
    Partial,
    /// The volume lies entirely inside the view volume.
    Inside,
}

pub trait Matrix4Ext<T: Scalar> {
    fn side(&self) -> Vector3<T>;
    fn up(&self) -> Vector3<T>;
    fn look(&self) -> Vector3<T>;
    fn position(&self) -> Vector3<T>;
}

impl<T: Scalar + Default + Copy + Clone> Matrix4Ext<T> for Matrix4<T> {
    fn side(&self) -> Vector3<T> {
        Vector3::new(self[0], self[1], self[2])
    }

    fn up(&self) -> Vector3<T> {
        Vector3::new(self[4], self[5], self[6])
    }

    fn look(&self) -> Vector3<T> {
        Vector3::new(self[8], self[9], self[10])
    }

    fn position(&self) -> Vector3<T> {
        Vector3::new(self[12], self[13], self[14])
    }
}

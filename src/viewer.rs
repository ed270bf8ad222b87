// Copyright (c) 2026-present Welt Engine contributors.
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

//! The abstract sink the scene traversal drives. The engine contains no
//! rendering code; a front-end implements this trait and receives geometry,
//! lights, textures and state changes in traversal order.

use crate::{
    field::{Rotation, SfImage},
    node::Node,
};
use nalgebra::{Matrix4, Vector2, Vector3};
use welt_math::{bsphere::BoundingSphere, frustum::Frustum, Intersection};

/// Opaque handle to an object a viewer created; the core only stores and
/// replays these.
pub type ObjectHandle = u64;

/// The handle value viewers return for "nothing was created".
pub const NO_OBJECT: ObjectHandle = 0;

/// What a traversal is for. In pick mode nodes may skip costly material
/// setup.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RenderMode {
    Draw,
    Pick,
}

/// Per-traversal state the engine threads through the graph walk.
#[derive(Clone, Debug)]
pub struct RenderContext {
    pub mode: RenderMode,
    /// Accumulated modelview matrix.
    pub matrix: Matrix4<f32>,
}

impl Default for RenderContext {
    fn default() -> Self {
        Self {
            mode: RenderMode::Draw,
            matrix: Matrix4::identity(),
        }
    }
}

impl RenderContext {
    pub fn pick() -> Self {
        Self {
            mode: RenderMode::Pick,
            ..Self::default()
        }
    }
}

/// Indexed face-set style geometry handed to [`Viewer::insert_shell`].
#[derive(Clone, Debug, Default)]
pub struct ShellData {
    pub coords: Vec<Vector3<f32>>,
    pub coord_index: Vec<i32>,
    pub normals: Vec<Vector3<f32>>,
    pub normal_index: Vec<i32>,
    pub colors: Vec<Vector3<f32>>,
    pub color_index: Vec<i32>,
    pub tex_coords: Vec<Vector2<f32>>,
    pub tex_coord_index: Vec<i32>,
    pub ccw: bool,
    pub convex: bool,
    pub solid: bool,
    pub crease_angle: f32,
}

/// See module docs. Every `insert_*` returns an opaque handle; a viewer may
/// return [`NO_OBJECT`] if it does not track objects.
#[allow(clippy::too_many_arguments)]
pub trait Viewer {
    fn mode(&self) -> RenderMode;

    /// Opens a nested object scope; transforms set inside it end with
    /// [`Self::end_object`].
    fn begin_object(&mut self, name: &str) -> ObjectHandle;
    fn end_object(&mut self);

    fn insert_background(
        &mut self,
        ground_angle: &[f32],
        ground_color: &[Vector3<f32>],
        sky_angle: &[f32],
        sky_color: &[Vector3<f32>],
    ) -> ObjectHandle;

    fn insert_box(&mut self, size: Vector3<f32>) -> ObjectHandle;
    fn insert_cone(&mut self, height: f32, radius: f32, bottom: bool, side: bool) -> ObjectHandle;
    fn insert_cylinder(
        &mut self,
        height: f32,
        radius: f32,
        bottom: bool,
        side: bool,
        top: bool,
    ) -> ObjectHandle;
    fn insert_elevation_grid(
        &mut self,
        heights: &[f32],
        x_dimension: i32,
        z_dimension: i32,
        x_spacing: f32,
        z_spacing: f32,
    ) -> ObjectHandle;
    fn insert_extrusion(
        &mut self,
        cross_section: &[Vector2<f32>],
        spine: &[Vector3<f32>],
        scale: &[Vector2<f32>],
        orientation: &[Rotation],
    ) -> ObjectHandle;
    fn insert_line_set(&mut self, coords: &[Vector3<f32>], coord_index: &[i32]) -> ObjectHandle;
    fn insert_point_set(
        &mut self,
        coords: &[Vector3<f32>],
        colors: &[Vector3<f32>],
    ) -> ObjectHandle;
    fn insert_shell(&mut self, shell: &ShellData) -> ObjectHandle;
    fn insert_sphere(&mut self, radius: f32) -> ObjectHandle;

    fn insert_directional_light(
        &mut self,
        ambient_intensity: f32,
        intensity: f32,
        color: Vector3<f32>,
        direction: Vector3<f32>,
    ) -> ObjectHandle;
    fn insert_point_light(
        &mut self,
        ambient_intensity: f32,
        attenuation: Vector3<f32>,
        color: Vector3<f32>,
        intensity: f32,
        location: Vector3<f32>,
        radius: f32,
    ) -> ObjectHandle;
    fn insert_spot_light(
        &mut self,
        ambient_intensity: f32,
        attenuation: Vector3<f32>,
        beam_width: f32,
        color: Vector3<f32>,
        cut_off_angle: f32,
        direction: Vector3<f32>,
        intensity: f32,
        location: Vector3<f32>,
        radius: f32,
    ) -> ObjectHandle;

    /// Replays a previously inserted object (display-list reuse).
    fn insert_reference(&mut self, existing: ObjectHandle) -> ObjectHandle;
    fn remove_object(&mut self, handle: ObjectHandle);

    fn insert_texture(&mut self, image: &SfImage, repeat_s: bool, repeat_t: bool) -> ObjectHandle;
    fn insert_texture_reference(&mut self, handle: ObjectHandle, components: u32);
    fn set_texture_transform(
        &mut self,
        center: Vector2<f32>,
        rotation: f32,
        scale: Vector2<f32>,
        translation: Vector2<f32>,
    );

    fn set_color(&mut self, rgb: Vector3<f32>, alpha: f32);
    fn set_material(
        &mut self,
        ambient_intensity: f32,
        diffuse_color: Vector3<f32>,
        emissive_color: Vector3<f32>,
        shininess: f32,
        specular_color: Vector3<f32>,
        transparency: f32,
    );

    /// Marks the current object as belonging to a pointing-device-sensitive
    /// subgraph.
    fn set_sensitive(&mut self, node: Option<&Node>);

    fn set_viewpoint(
        &mut self,
        position: Vector3<f32>,
        orientation: Rotation,
        field_of_view: f32,
        avatar_size: f32,
        visibility_limit: f32,
    );
    fn set_fog(&mut self, color: Vector3<f32>, visibility_range: f32, fog_type: &str);

    /// Multiplies the current modelview matrix.
    fn transform(&mut self, matrix: &Matrix4<f32>);

    fn frustum(&self) -> Frustum;
    fn set_frustum(&mut self, frustum: Frustum);

    /// Classifies a bounding volume against the current view volume. The
    /// default delegates to the volume's own frustum test; viewers with a
    /// better idea (or none) may override.
    fn intersect_view_volume(&mut self, volume: &BoundingSphere) -> Intersection {
        volume.intersect_frustum(&self.frustum())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Records traversal calls for assertions; every insert returns a fresh
    /// handle.
    #[derive(Default)]
    pub struct RecordingViewer {
        pub calls: Vec<String>,
        pub frustum: Option<Frustum>,
        next_handle: ObjectHandle,
    }

    impl RecordingViewer {
        fn handle(&mut self, call: impl Into<String>) -> ObjectHandle {
            self.calls.push(call.into());
            self.next_handle += 1;
            self.next_handle
        }
    }

    impl Viewer for RecordingViewer {
        fn mode(&self) -> RenderMode {
            RenderMode::Draw
        }

        fn begin_object(&mut self, name: &str) -> ObjectHandle {
            self.handle(format!("begin_object({name})"))
        }

        fn end_object(&mut self) {
            self.calls.push("end_object".to_owned());
        }

        fn insert_background(
            &mut self,
            _ground_angle: &[f32],
            _ground_color: &[Vector3<f32>],
            _sky_angle: &[f32],
            _sky_color: &[Vector3<f32>],
        ) -> ObjectHandle {
            self.handle("insert_background")
        }

        fn insert_box(&mut self, size: Vector3<f32>) -> ObjectHandle {
            self.handle(format!("insert_box({} {} {})", size.x, size.y, size.z))
        }

        fn insert_cone(
            &mut self,
            _height: f32,
            _radius: f32,
            _bottom: bool,
            _side: bool,
        ) -> ObjectHandle {
            self.handle("insert_cone")
        }

        fn insert_cylinder(
            &mut self,
            _height: f32,
            _radius: f32,
            _bottom: bool,
            _side: bool,
            _top: bool,
        ) -> ObjectHandle {
            self.handle("insert_cylinder")
        }

        fn insert_elevation_grid(
            &mut self,
            _heights: &[f32],
            _x_dimension: i32,
            _z_dimension: i32,
            _x_spacing: f32,
            _z_spacing: f32,
        ) -> ObjectHandle {
            self.handle("insert_elevation_grid")
        }

        fn insert_extrusion(
            &mut self,
            _cross_section: &[Vector2<f32>],
            _spine: &[Vector3<f32>],
            _scale: &[Vector2<f32>],
            _orientation: &[Rotation],
        ) -> ObjectHandle {
            self.handle("insert_extrusion")
        }

        fn insert_line_set(
            &mut self,
            _coords: &[Vector3<f32>],
            _coord_index: &[i32],
        ) -> ObjectHandle {
            self.handle("insert_line_set")
        }

        fn insert_point_set(
            &mut self,
            _coords: &[Vector3<f32>],
            _colors: &[Vector3<f32>],
        ) -> ObjectHandle {
            self.handle("insert_point_set")
        }

        fn insert_shell(&mut self, _shell: &ShellData) -> ObjectHandle {
            self.handle("insert_shell")
        }

        fn insert_sphere(&mut self, radius: f32) -> ObjectHandle {
            self.handle(format!("insert_sphere({radius})"))
        }

        fn insert_directional_light(
            &mut self,
            _ambient_intensity: f32,
            _intensity: f32,
            _color: Vector3<f32>,
            _direction: Vector3<f32>,
        ) -> ObjectHandle {
            self.handle("insert_directional_light")
        }

        fn insert_point_light(
            &mut self,
            _ambient_intensity: f32,
            _attenuation: Vector3<f32>,
            _color: Vector3<f32>,
            _intensity: f32,
            _location: Vector3<f32>,
            _radius: f32,
        ) -> ObjectHandle {
            self.handle("insert_point_light")
        }

        fn insert_spot_light(
            &mut self,
            _ambient_intensity: f32,
            _attenuation: Vector3<f32>,
            _beam_width: f32,
            _color: Vector3<f32>,
            _cut_off_angle: f32,
            _direction: Vector3<f32>,
            _intensity: f32,
            _location: Vector3<f32>,
            _radius: f32,
        ) -> ObjectHandle {
            self.handle("insert_spot_light")
        }

        fn insert_reference(&mut self, existing: ObjectHandle) -> ObjectHandle {
            self.handle(format!("insert_reference({existing})"))
        }

        fn remove_object(&mut self, _handle: ObjectHandle) {
            self.calls.push("remove_object".to_owned());
        }

        fn insert_texture(
            &mut self,
            _image: &SfImage,
            _repeat_s: bool,
            _repeat_t: bool,
        ) -> ObjectHandle {
            self.handle("insert_texture")
        }

        fn insert_texture_reference(&mut self, _handle: ObjectHandle, _components: u32) {
            self.calls.push("insert_texture_reference".to_owned());
        }

        fn set_texture_transform(
            &mut self,
            _center: Vector2<f32>,
            _rotation: f32,
            _scale: Vector2<f32>,
            _translation: Vector2<f32>,
        ) {
            self.calls.push("set_texture_transform".to_owned());
        }

        fn set_color(&mut self, _rgb: Vector3<f32>, _alpha: f32) {
            self.calls.push("set_color".to_owned());
        }

        fn set_material(
            &mut self,
            _ambient_intensity: f32,
            _diffuse_color: Vector3<f32>,
            _emissive_color: Vector3<f32>,
            _shininess: f32,
            _specular_color: Vector3<f32>,
            _transparency: f32,
        ) {
            self.calls.push("set_material".to_owned());
        }

        fn set_sensitive(&mut self, _node: Option<&Node>) {
            self.calls.push("set_sensitive".to_owned());
        }

        fn set_viewpoint(
            &mut self,
            _position: Vector3<f32>,
            _orientation: Rotation,
            _field_of_view: f32,
            _avatar_size: f32,
            _visibility_limit: f32,
        ) {
            self.calls.push("set_viewpoint".to_owned());
        }

        fn set_fog(&mut self, _color: Vector3<f32>, _visibility_range: f32, _fog_type: &str) {
            self.calls.push("set_fog".to_owned());
        }

        fn transform(&mut self, _matrix: &Matrix4<f32>) {
            self.calls.push("transform".to_owned());
        }

        fn frustum(&self) -> Frustum {
            self.frustum.unwrap_or_default()
        }

        fn set_frustum(&mut self, frustum: Frustum) {
            self.frustum = Some(frustum);
        }
    }
}

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

//! Behaviors for the standard node catalog: grouping traversal, shape
//! dispatch, geometry bounding volumes, light insertion, time sensing,
//! interpolation and bindable semantics.

use crate::{
    field::{FieldValue, Rotation},
    node::{BindableStackId, Node, NodeBehavior, NodeCategory, NodeOutput},
    viewer::{RenderContext, ShellData, Viewer},
};
use nalgebra::{Matrix4, Unit, UnitQuaternion, Vector2, Vector3};
use std::{any::Any, collections::BTreeMap};
use welt_math::{aabb::AxisAlignedBoundingBox, bsphere::BoundingSphere};

type Fields = BTreeMap<String, FieldValue>;

fn get_bool(fields: &Fields, id: &str, default: bool) -> bool {
    fields.get(id).and_then(FieldValue::as_bool).unwrap_or(default)
}

fn get_f32(fields: &Fields, id: &str, default: f32) -> f32 {
    fields.get(id).and_then(FieldValue::as_float).unwrap_or(default)
}

fn get_f64(fields: &Fields, id: &str, default: f64) -> f64 {
    fields.get(id).and_then(FieldValue::as_time).unwrap_or(default)
}

fn get_i32(fields: &Fields, id: &str, default: i32) -> i32 {
    fields.get(id).and_then(FieldValue::as_int32).unwrap_or(default)
}

fn get_vec3(fields: &Fields, id: &str, default: Vector3<f32>) -> Vector3<f32> {
    fields.get(id).and_then(FieldValue::as_vec3f).unwrap_or(default)
}

fn get_rotation(fields: &Fields, id: &str) -> Rotation {
    fields
        .get(id)
        .and_then(FieldValue::as_rotation)
        .unwrap_or_default()
}

fn get_node(fields: &Fields, id: &str) -> Option<Node> {
    fields.get(id).and_then(FieldValue::as_node).cloned()
}

fn get_nodes(fields: &Fields, id: &str) -> Vec<Node> {
    fields
        .get(id)
        .and_then(FieldValue::as_mf_node)
        .map(<[Node]>::to_vec)
        .unwrap_or_default()
}

fn rotation_matrix(rotation: &Rotation) -> Matrix4<f32> {
    match Unit::try_new(rotation.axis, f32::EPSILON) {
        Some(axis) => UnitQuaternion::from_axis_angle(&axis, rotation.angle).to_homogeneous(),
        None => Matrix4::identity(),
    }
}

/// The local matrix of a Transform node:
/// T * C * R * SR * S * -SR * -C.
pub fn transform_matrix(fields: &Fields) -> Matrix4<f32> {
    let translation = get_vec3(fields, "translation", Vector3::zeros());
    let center = get_vec3(fields, "center", Vector3::zeros());
    let scale = get_vec3(fields, "scale", Vector3::new(1.0, 1.0, 1.0));
    let rotation = rotation_matrix(&get_rotation(fields, "rotation"));
    let scale_orientation = rotation_matrix(&get_rotation(fields, "scaleOrientation"));

    Matrix4::new_translation(&translation)
        * Matrix4::new_translation(&center)
        * rotation
        * scale_orientation
        * Matrix4::new_nonuniform_scaling(&scale)
        * scale_orientation
            .try_inverse()
            .unwrap_or_else(Matrix4::identity)
        * Matrix4::new_translation(&-center)
}

/// Which field carries the traversed children of a grouping node.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GroupKind {
    /// Group, Anchor, Billboard, Collision.
    Group,
    Transform,
    Switch,
    Lod,
}

impl GroupKind {
    fn children_field(self) -> &'static str {
        match self {
            GroupKind::Switch => "choice",
            GroupKind::Lod => "level",
            _ => "children",
        }
    }
}

/// Grouping nodes: child traversal, child-union bounding volume, and the
/// addChildren/removeChildren event pair.
#[derive(Clone)]
pub struct GroupBehavior {
    pub kind: GroupKind,
}

impl GroupBehavior {
    fn traversed_children(&self, fields: &Fields) -> Vec<Node> {
        let children = get_nodes(fields, self.kind.children_field());
        match self.kind {
            GroupKind::Switch => {
                let which = get_i32(fields, "whichChoice", -1);
                usize::try_from(which)
                    .ok()
                    .and_then(|index| children.get(index).cloned())
                    .into_iter()
                    .collect()
            }
            // Distance-based level selection is the viewer's business; the
            // traversal hands over the most detailed level.
            GroupKind::Lod => children.into_iter().take(1).collect(),
            _ => children,
        }
    }
}

impl NodeBehavior for GroupBehavior {
    fn category(&self) -> NodeCategory {
        NodeCategory::Grouping
    }

    fn on_event(
        &mut self,
        fields: &mut Fields,
        event_in: &str,
        value: &FieldValue,
        _timestamp: f64,
        _out: &mut NodeOutput,
    ) {
        let field = self.kind.children_field();
        match (event_in, value) {
            ("addChildren", FieldValue::MfNode(added)) => {
                let mut children = get_nodes(fields, field);
                for node in added {
                    if !children.contains(node) {
                        children.push(node.clone());
                    }
                }
                fields.insert(field.to_owned(), FieldValue::MfNode(children));
            }
            ("removeChildren", FieldValue::MfNode(removed)) => {
                let mut children = get_nodes(fields, field);
                children.retain(|node| !removed.contains(node));
                fields.insert(field.to_owned(), FieldValue::MfNode(children));
            }
            _ => {}
        }
    }

    fn bounding_volume(&self, fields: &Fields) -> BoundingSphere {
        let mut volume = BoundingSphere::default();
        for child in self.traversed_children(fields) {
            volume.extend_sphere(&child.bounding_volume());
        }
        if self.kind == GroupKind::Transform {
            volume = volume.transform(&transform_matrix(fields));
        }
        volume
    }

    fn render(
        &self,
        node: &Node,
        fields: &Fields,
        viewer: &mut dyn Viewer,
        ctx: &mut RenderContext,
    ) {
        viewer.begin_object(node.name().as_deref().unwrap_or(""));
        let saved = ctx.matrix;
        if self.kind == GroupKind::Transform {
            let local = transform_matrix(fields);
            viewer.transform(&local);
            ctx.matrix = saved * local;
        }
        for child in self.traversed_children(fields) {
            child.render(viewer, ctx);
        }
        ctx.matrix = saved;
        viewer.end_object();
    }

    fn clone_box(&self) -> Box<dyn NodeBehavior> {
        Box::new(self.clone())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Shape: applies the appearance, then renders the geometry child.
#[derive(Clone, Default)]
pub struct ShapeBehavior;

impl NodeBehavior for ShapeBehavior {
    fn category(&self) -> NodeCategory {
        NodeCategory::Shape
    }

    fn bounding_volume(&self, fields: &Fields) -> BoundingSphere {
        match get_node(fields, "geometry") {
            Some(geometry) => geometry.bounding_volume(),
            None => BoundingSphere::default(),
        }
    }

    fn render(
        &self,
        _node: &Node,
        fields: &Fields,
        viewer: &mut dyn Viewer,
        ctx: &mut RenderContext,
    ) {
        if ctx.mode == crate::viewer::RenderMode::Draw {
            if let Some(appearance) = get_node(fields, "appearance") {
                if let Some(FieldValue::SfNode(Some(material))) = appearance.get_field("material")
                {
                    material.with_fields(|m| {
                        viewer.set_material(
                            get_f32(m, "ambientIntensity", 0.2),
                            get_vec3(m, "diffuseColor", Vector3::new(0.8, 0.8, 0.8)),
                            get_vec3(m, "emissiveColor", Vector3::zeros()),
                            get_f32(m, "shininess", 0.2),
                            get_vec3(m, "specularColor", Vector3::zeros()),
                            get_f32(m, "transparency", 0.0),
                        );
                    });
                }
            }
        }
        if let Some(geometry) = get_node(fields, "geometry") {
            geometry.render(viewer, ctx);
        }
    }

    fn clone_box(&self) -> Box<dyn NodeBehavior> {
        Box::new(self.clone())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// The primitive geometry categories with fixed parametric shapes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PrimitiveKind {
    Box,
    Sphere,
    Cone,
    Cylinder,
}

#[derive(Clone)]
pub struct PrimitiveBehavior {
    pub kind: PrimitiveKind,
}

impl NodeBehavior for PrimitiveBehavior {
    fn category(&self) -> NodeCategory {
        NodeCategory::Geometry
    }

    fn bounding_volume(&self, fields: &Fields) -> BoundingSphere {
        // The primitives are origin-centered, so their minimal spheres have
        // closed forms; the incremental grow path would overshoot.
        match self.kind {
            PrimitiveKind::Box => {
                let half = get_vec3(fields, "size", Vector3::new(2.0, 2.0, 2.0)).scale(0.5);
                BoundingSphere::new(Vector3::zeros(), half.norm())
            }
            PrimitiveKind::Sphere => {
                BoundingSphere::new(Vector3::zeros(), get_f32(fields, "radius", 1.0))
            }
            PrimitiveKind::Cone => {
                let radius = get_f32(fields, "bottomRadius", 1.0);
                let half_height = get_f32(fields, "height", 2.0) * 0.5;
                BoundingSphere::new(
                    Vector3::zeros(),
                    (radius * radius + half_height * half_height).sqrt(),
                )
            }
            PrimitiveKind::Cylinder => {
                let radius = get_f32(fields, "radius", 1.0);
                let half_height = get_f32(fields, "height", 2.0) * 0.5;
                BoundingSphere::new(
                    Vector3::zeros(),
                    (radius * radius + half_height * half_height).sqrt(),
                )
            }
        }
    }

    fn render(
        &self,
        _node: &Node,
        fields: &Fields,
        viewer: &mut dyn Viewer,
        _ctx: &mut RenderContext,
    ) {
        match self.kind {
            PrimitiveKind::Box => {
                viewer.insert_box(get_vec3(fields, "size", Vector3::new(2.0, 2.0, 2.0)));
            }
            PrimitiveKind::Sphere => {
                viewer.insert_sphere(get_f32(fields, "radius", 1.0));
            }
            PrimitiveKind::Cone => {
                viewer.insert_cone(
                    get_f32(fields, "height", 2.0),
                    get_f32(fields, "bottomRadius", 1.0),
                    get_bool(fields, "bottom", true),
                    get_bool(fields, "side", true),
                );
            }
            PrimitiveKind::Cylinder => {
                viewer.insert_cylinder(
                    get_f32(fields, "height", 2.0),
                    get_f32(fields, "radius", 1.0),
                    get_bool(fields, "bottom", true),
                    get_bool(fields, "side", true),
                    get_bool(fields, "top", true),
                );
            }
        }
    }

    fn clone_box(&self) -> Box<dyn NodeBehavior> {
        Box::new(self.clone())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Geometry built from a Coordinate child: face sets, line sets, point sets.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PointBasedKind {
    FaceSet,
    LineSet,
    PointSet,
}

#[derive(Clone)]
pub struct PointBasedBehavior {
    pub kind: PointBasedKind,
}

fn coordinate_points(fields: &Fields) -> Vec<Vector3<f32>> {
    get_node(fields, "coord")
        .and_then(|coord| coord.get_field("point"))
        .and_then(|value| match value {
            FieldValue::MfVec3f(points) => Some(points),
            _ => None,
        })
        .unwrap_or_default()
}

fn mf_int32(fields: &Fields, id: &str) -> Vec<i32> {
    match fields.get(id) {
        Some(FieldValue::MfInt32(values)) => values.clone(),
        _ => Vec::new(),
    }
}

impl NodeBehavior for PointBasedBehavior {
    fn category(&self) -> NodeCategory {
        NodeCategory::Geometry
    }

    fn bounding_volume(&self, fields: &Fields) -> BoundingSphere {
        let mut volume = BoundingSphere::default();
        volume.enclose(&coordinate_points(fields));
        volume
    }

    fn render(
        &self,
        _node: &Node,
        fields: &Fields,
        viewer: &mut dyn Viewer,
        _ctx: &mut RenderContext,
    ) {
        let coords = coordinate_points(fields);
        match self.kind {
            PointBasedKind::FaceSet => {
                let shell = ShellData {
                    coords,
                    coord_index: mf_int32(fields, "coordIndex"),
                    normals: Vec::new(),
                    normal_index: mf_int32(fields, "normalIndex"),
                    colors: Vec::new(),
                    color_index: mf_int32(fields, "colorIndex"),
                    tex_coords: Vec::new(),
                    tex_coord_index: mf_int32(fields, "texCoordIndex"),
                    ccw: get_bool(fields, "ccw", true),
                    convex: get_bool(fields, "convex", true),
                    solid: get_bool(fields, "solid", true),
                    crease_angle: get_f32(fields, "creaseAngle", 0.0),
                };
                viewer.insert_shell(&shell);
            }
            PointBasedKind::LineSet => {
                viewer.insert_line_set(&coords, &mf_int32(fields, "coordIndex"));
            }
            PointBasedKind::PointSet => {
                viewer.insert_point_set(&coords, &[]);
            }
        }
    }

    fn clone_box(&self) -> Box<dyn NodeBehavior> {
        Box::new(self.clone())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// ElevationGrid geometry.
#[derive(Clone, Default)]
pub struct ElevationGridBehavior;

impl NodeBehavior for ElevationGridBehavior {
    fn category(&self) -> NodeCategory {
        NodeCategory::Geometry
    }

    fn bounding_volume(&self, fields: &Fields) -> BoundingSphere {
        let heights = match fields.get("height") {
            Some(FieldValue::MfFloat(heights)) => heights.clone(),
            _ => Vec::new(),
        };
        let x_dim = get_i32(fields, "xDimension", 0).max(0) as f32;
        let z_dim = get_i32(fields, "zDimension", 0).max(0) as f32;
        let x_span = (x_dim - 1.0).max(0.0) * get_f32(fields, "xSpacing", 1.0);
        let z_span = (z_dim - 1.0).max(0.0) * get_f32(fields, "zSpacing", 1.0);
        let (min_h, max_h) = if heights.is_empty() {
            (0.0, 0.0)
        } else {
            heights
                .iter()
                .fold((f32::MAX, -f32::MAX), |(lo, hi), h| (lo.min(*h), hi.max(*h)))
        };
        let mut volume = BoundingSphere::default();
        volume.extend_box(&AxisAlignedBoundingBox::from_min_max(
            Vector3::new(0.0, min_h, 0.0),
            Vector3::new(x_span, max_h, z_span),
        ));
        volume
    }

    fn render(
        &self,
        _node: &Node,
        fields: &Fields,
        viewer: &mut dyn Viewer,
        _ctx: &mut RenderContext,
    ) {
        let heights = match fields.get("height") {
            Some(FieldValue::MfFloat(heights)) => heights.clone(),
            _ => Vec::new(),
        };
        viewer.insert_elevation_grid(
            &heights,
            get_i32(fields, "xDimension", 0),
            get_i32(fields, "zDimension", 0),
            get_f32(fields, "xSpacing", 1.0),
            get_f32(fields, "zSpacing", 1.0),
        );
    }

    fn clone_box(&self) -> Box<dyn NodeBehavior> {
        Box::new(self.clone())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Extrusion geometry.
#[derive(Clone, Default)]
pub struct ExtrusionBehavior;

impl NodeBehavior for ExtrusionBehavior {
    fn category(&self) -> NodeCategory {
        NodeCategory::Geometry
    }

    fn bounding_volume(&self, fields: &Fields) -> BoundingSphere {
        let spine = match fields.get("spine") {
            Some(FieldValue::MfVec3f(spine)) => spine.clone(),
            _ => Vec::new(),
        };
        let mut volume = BoundingSphere::default();
        volume.enclose(&spine);
        if volume.is_unset() {
            return volume;
        }
        let cross_radius = match fields.get("crossSection") {
            Some(FieldValue::MfVec2f(points)) => {
                points.iter().map(|p| p.norm()).fold(0.0f32, f32::max)
            }
            _ => 0.0,
        };
        volume.radius += cross_radius;
        volume
    }

    fn render(
        &self,
        _node: &Node,
        fields: &Fields,
        viewer: &mut dyn Viewer,
        _ctx: &mut RenderContext,
    ) {
        let cross_section = match fields.get("crossSection") {
            Some(FieldValue::MfVec2f(points)) => points.clone(),
            _ => Vec::new(),
        };
        let spine = match fields.get("spine") {
            Some(FieldValue::MfVec3f(spine)) => spine.clone(),
            _ => Vec::new(),
        };
        let scale = match fields.get("scale") {
            Some(FieldValue::MfVec2f(scale)) => scale.clone(),
            _ => vec![Vector2::new(1.0, 1.0)],
        };
        let orientation = match fields.get("orientation") {
            Some(FieldValue::MfRotation(orientation)) => orientation.clone(),
            _ => vec![Rotation::default()],
        };
        viewer.insert_extrusion(&cross_section, &spine, &scale, &orientation);
    }

    fn clone_box(&self) -> Box<dyn NodeBehavior> {
        Box::new(self.clone())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// The three light categories.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LightKind {
    Directional,
    Point,
    Spot,
}

#[derive(Clone)]
pub struct LightBehavior {
    pub kind: LightKind,
}

impl NodeBehavior for LightBehavior {
    fn category(&self) -> NodeCategory {
        NodeCategory::Light
    }

    fn render(
        &self,
        _node: &Node,
        fields: &Fields,
        viewer: &mut dyn Viewer,
        _ctx: &mut RenderContext,
    ) {
        if !get_bool(fields, "on", true) {
            return;
        }
        let ambient = get_f32(fields, "ambientIntensity", 0.0);
        let color = get_vec3(fields, "color", Vector3::new(1.0, 1.0, 1.0));
        let intensity = get_f32(fields, "intensity", 1.0);
        match self.kind {
            LightKind::Directional => {
                viewer.insert_directional_light(
                    ambient,
                    intensity,
                    color,
                    get_vec3(fields, "direction", Vector3::new(0.0, 0.0, -1.0)),
                );
            }
            LightKind::Point => {
                viewer.insert_point_light(
                    ambient,
                    get_vec3(fields, "attenuation", Vector3::new(1.0, 0.0, 0.0)),
                    color,
                    intensity,
                    get_vec3(fields, "location", Vector3::zeros()),
                    get_f32(fields, "radius", 100.0),
                );
            }
            LightKind::Spot => {
                viewer.insert_spot_light(
                    ambient,
                    get_vec3(fields, "attenuation", Vector3::new(1.0, 0.0, 0.0)),
                    get_f32(fields, "beamWidth", 1.570_796),
                    color,
                    get_f32(fields, "cutOffAngle", 0.785_398),
                    get_vec3(fields, "direction", Vector3::new(0.0, 0.0, -1.0)),
                    intensity,
                    get_vec3(fields, "location", Vector3::zeros()),
                    get_f32(fields, "radius", 100.0),
                );
            }
        }
    }

    fn clone_box(&self) -> Box<dyn NodeBehavior> {
        Box::new(self.clone())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn fnearly(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

/// Generates timer events. Events prior to the tick's timestamp are emitted
/// at the clamped deactivation time so stop times and cycle boundaries land
/// exactly; continuous event-outs (time, fraction) go out before discrete
/// ones (cycleTime, isActive).
#[derive(Clone, Default)]
pub struct TimeSensorBehavior {
    last_time: f64,
    /// Cycle parameters captured at activation; a running sensor ignores
    /// writes to them until it deactivates.
    running: Option<RunningCycle>,
}

#[derive(Copy, Clone)]
struct RunningCycle {
    start: f64,
    stop: f64,
    interval: f64,
    looping: bool,
}

impl TimeSensorBehavior {
    fn fraction(start: f64, interval: f64, at: f64) -> f64 {
        if interval <= 0.0 || at <= start {
            return 0.0;
        }
        let rem = (at - start) % interval;
        if fnearly(rem, 0.0) {
            1.0
        } else {
            rem / interval
        }
    }
}

impl NodeBehavior for TimeSensorBehavior {
    fn category(&self) -> NodeCategory {
        NodeCategory::TimeSensor
    }

    fn time_dependent(&self) -> bool {
        true
    }

    fn tick(&mut self, fields: &mut Fields, now: f64, out: &mut NodeOutput) {
        let enabled = get_bool(fields, "enabled", true);
        let active = get_bool(fields, "isActive", false);

        if !enabled {
            if active {
                // Disabling is observed at the next tick.
                let cycle = self.running.take();
                let (start, interval) =
                    cycle.map_or((0.0, 1.0), |c| (c.start, c.interval));
                let fraction = Self::fraction(start, interval, now) as f32;
                out.emits.push(("fraction_changed".into(), FieldValue::SfFloat(fraction)));
                out.emits.push(("time".into(), FieldValue::SfTime(now)));
                out.emits.push(("isActive".into(), FieldValue::SfBool(false)));
            }
            self.last_time = now;
            return;
        }

        if self.last_time > now {
            self.last_time = now;
        }

        if !active {
            let start = get_f64(fields, "startTime", 0.0);
            let stop = get_f64(fields, "stopTime", 0.0);
            let interval = get_f64(fields, "cycleInterval", 1.0);
            let looping = get_bool(fields, "loop", false);

            // Become active at startTime if either the valid stopTime has not
            // passed or we are looping. A stopTime at or before startTime
            // means "no stop".
            if start <= now && ((stop <= start || stop > now) || looping) {
                self.running = Some(RunningCycle {
                    start,
                    stop,
                    interval,
                    looping,
                });
                let fraction = Self::fraction(start, interval, now) as f32;
                let fraction = if now <= start { 0.0 } else { fraction };
                out.emits.push(("time".into(), FieldValue::SfTime(now)));
                out.emits
                    .push(("fraction_changed".into(), FieldValue::SfFloat(fraction)));
                out.emits.push(("isActive".into(), FieldValue::SfBool(true)));
                out.emits.push(("cycleTime".into(), FieldValue::SfTime(now)));
            }
        } else if let Some(cycle) = self.running {
            let mut emit_at = now;
            let mut deactivate = false;

            // Done? The earlier of stopTime and, without loop, the end of the
            // single cycle; the emission timestamp is clamped to it exactly
            // so downstream animation lands on its final keyframe.
            let stop_valid = cycle.stop > cycle.start;
            let cycle_end = cycle.start + cycle.interval;
            if stop_valid && cycle.stop <= now + 1e-12 {
                emit_at = if !cycle.looping && cycle_end < cycle.stop {
                    cycle_end
                } else {
                    cycle.stop
                };
                deactivate = true;
            } else if !cycle.looping && cycle_end <= now + 1e-12 {
                emit_at = if stop_valid && cycle.stop < cycle_end {
                    cycle.stop
                } else {
                    cycle_end
                };
                deactivate = true;
            }

            let fraction = Self::fraction(cycle.start, cycle.interval, emit_at) as f32;
            out.emits.push(("time".into(), FieldValue::SfTime(emit_at)));
            out.emits
                .push(("fraction_changed".into(), FieldValue::SfFloat(fraction)));
            if fnearly(f64::from(fraction), 1.0) {
                out.emits.push(("cycleTime".into(), FieldValue::SfTime(emit_at)));
            }
            if deactivate {
                self.running = None;
                out.emits.push(("isActive".into(), FieldValue::SfBool(false)));
            }
        }

        self.last_time = now;
    }

    fn clone_box(&self) -> Box<dyn NodeBehavior> {
        Box::new(self.clone())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// The six interpolator categories.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InterpolatorKind {
    Color,
    Coordinate,
    Normal,
    Orientation,
    Position,
    Scalar,
}

#[derive(Clone)]
pub struct InterpolatorBehavior {
    pub kind: InterpolatorKind,
}

fn keys(fields: &Fields) -> Vec<f32> {
    fields
        .get("key")
        .and_then(FieldValue::as_mf_float)
        .map(<[f32]>::to_vec)
        .unwrap_or_default()
}

/// Finds the active key span and the blend factor for a fraction, clamping
/// outside the key range.
fn key_span(keys: &[f32], fraction: f32) -> Option<(usize, usize, f32)> {
    let last = keys.len().checked_sub(1)?;
    if fraction <= keys[0] {
        return Some((0, 0, 0.0));
    }
    if fraction >= keys[last] {
        return Some((last, last, 0.0));
    }
    let upper = keys.iter().position(|key| *key > fraction)?;
    let lower = upper - 1;
    let span = keys[upper] - keys[lower];
    let blend = if span > 0.0 {
        (fraction - keys[lower]) / span
    } else {
        0.0
    };
    Some((lower, upper, blend))
}

fn lerp_vec3(a: Vector3<f32>, b: Vector3<f32>, t: f32) -> Vector3<f32> {
    a + (b - a).scale(t)
}

fn slerp_rotation(a: &Rotation, b: &Rotation, t: f32) -> Rotation {
    let qa = match Unit::try_new(a.axis, f32::EPSILON) {
        Some(axis) => UnitQuaternion::from_axis_angle(&axis, a.angle),
        None => UnitQuaternion::identity(),
    };
    let qb = match Unit::try_new(b.axis, f32::EPSILON) {
        Some(axis) => UnitQuaternion::from_axis_angle(&axis, b.angle),
        None => UnitQuaternion::identity(),
    };
    let q = qa.slerp(&qb, t);
    match q.axis_angle() {
        Some((axis, angle)) => Rotation::new(axis.into_inner(), angle),
        None => Rotation::default(),
    }
}

impl InterpolatorBehavior {
    fn interpolate(&self, fields: &Fields, fraction: f32) -> Option<FieldValue> {
        let keys = keys(fields);
        let (lower, upper, t) = key_span(&keys, fraction)?;
        match self.kind {
            InterpolatorKind::Position => {
                let values = fields.get("keyValue")?.as_mf_vec3f()?;
                Some(FieldValue::SfVec3f(lerp_vec3(
                    *values.get(lower)?,
                    *values.get(upper)?,
                    t,
                )))
            }
            InterpolatorKind::Color => {
                let values = fields.get("keyValue")?.as_mf_color()?;
                Some(FieldValue::SfColor(lerp_vec3(
                    *values.get(lower)?,
                    *values.get(upper)?,
                    t,
                )))
            }
            InterpolatorKind::Scalar => {
                let values = fields.get("keyValue")?.as_mf_float()?;
                let a = *values.get(lower)?;
                let b = *values.get(upper)?;
                Some(FieldValue::SfFloat(a + (b - a) * t))
            }
            InterpolatorKind::Orientation => {
                let values = fields.get("keyValue")?.as_mf_rotation()?;
                Some(FieldValue::SfRotation(slerp_rotation(
                    values.get(lower)?,
                    values.get(upper)?,
                    t,
                )))
            }
            InterpolatorKind::Coordinate | InterpolatorKind::Normal => {
                // keyValue carries one slab of points per key.
                let values = fields.get("keyValue")?.as_mf_vec3f()?;
                let count = keys.len();
                if count == 0 || values.len() % count != 0 {
                    return None;
                }
                let stride = values.len() / count;
                let lower_slab = &values[lower * stride..(lower + 1) * stride];
                let upper_slab = &values[upper * stride..(upper + 1) * stride];
                Some(FieldValue::MfVec3f(
                    lower_slab
                        .iter()
                        .zip(upper_slab)
                        .map(|(a, b)| lerp_vec3(*a, *b, t))
                        .collect(),
                ))
            }
        }
    }
}

impl NodeBehavior for InterpolatorBehavior {
    fn category(&self) -> NodeCategory {
        NodeCategory::Interpolator
    }

    fn on_event(
        &mut self,
        fields: &mut Fields,
        event_in: &str,
        value: &FieldValue,
        _timestamp: f64,
        out: &mut NodeOutput,
    ) {
        if event_in != "set_fraction" {
            return;
        }
        let Some(fraction) = value.as_float() else {
            return;
        };
        if let Some(result) = self.interpolate(fields, fraction) {
            out.emits.push(("value_changed".into(), result));
        }
    }

    fn clone_box(&self) -> Box<dyn NodeBehavior> {
        Box::new(self.clone())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Bindable nodes forward set_bind to the engine's stacks.
#[derive(Clone)]
pub struct BindableBehavior {
    pub stack: BindableStackId,
}

impl NodeBehavior for BindableBehavior {
    fn category(&self) -> NodeCategory {
        NodeCategory::Bindable(self.stack)
    }

    fn on_event(
        &mut self,
        _fields: &mut Fields,
        event_in: &str,
        value: &FieldValue,
        _timestamp: f64,
        out: &mut NodeOutput,
    ) {
        if event_in == "set_bind" {
            if let Some(bind) = value.as_bool() {
                out.bind = Some((self.stack, bind));
            }
        }
    }

    fn clone_box(&self) -> Box<dyn NodeBehavior> {
        Box::new(self.clone())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// The pluggable script backend contract. The engine forwards events and
/// end-of-cascade notifications; everything else is the backend's business.
pub trait ScriptBackend: Send + Sync {
    fn process_event(&self, script: &Node, event_in: &str, value: &FieldValue, timestamp: f64);
    fn events_processed(&self, script: &Node, timestamp: f64);
}

/// Script nodes: author-declared interfaces, an opaque backend driven by the
/// engine, and the one legitimate self-reference in the language.
#[derive(Clone, Default)]
pub struct ScriptBehavior {
    /// Back-reference installed by the parser when the script USEs its own
    /// DEF name; weak, the script does not own itself.
    pub self_ref: Option<crate::node::WeakNode>,
}

impl NodeBehavior for ScriptBehavior {
    fn category(&self) -> NodeCategory {
        NodeCategory::Script
    }

    fn on_event(
        &mut self,
        _fields: &mut Fields,
        event_in: &str,
        value: &FieldValue,
        _timestamp: f64,
        out: &mut NodeOutput,
    ) {
        // The backend runs on the simulation thread, outside this node's
        // lock; the engine forwards these after the delivery completes.
        out.script_events
            .push((event_in.to_owned(), value.clone()));
    }

    fn clone_box(&self) -> Box<dyn NodeBehavior> {
        Box::new(self.clone())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn key_span_clamps_at_both_ends() {
        let keys = [0.0, 0.5, 1.0];
        assert_eq!(key_span(&keys, -1.0), Some((0, 0, 0.0)));
        assert_eq!(key_span(&keys, 2.0), Some((2, 2, 0.0)));
        let (lower, upper, t) = key_span(&keys, 0.75).unwrap();
        assert_eq!((lower, upper), (1, 2));
        assert_relative_eq!(t, 0.5, epsilon = 1e-6);
    }

    #[test]
    fn transform_matrix_translates_and_scales_about_center() {
        let mut fields = Fields::new();
        fields.insert(
            "translation".into(),
            FieldValue::SfVec3f(Vector3::new(1.0, 0.0, 0.0)),
        );
        fields.insert(
            "scale".into(),
            FieldValue::SfVec3f(Vector3::new(2.0, 2.0, 2.0)),
        );
        let m = transform_matrix(&fields);
        let p = m.transform_point(&nalgebra::Point3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(p.x, 3.0, epsilon = 1e-6);
    }

    #[test]
    fn slerp_midpoint_of_quarter_turn() {
        let a = Rotation::new(Vector3::new(0.0, 1.0, 0.0), 0.0);
        let b = Rotation::new(Vector3::new(0.0, 1.0, 0.0), std::f32::consts::FRAC_PI_2);
        let mid = slerp_rotation(&a, &b, 0.5);
        assert_relative_eq!(mid.angle, std::f32::consts::FRAC_PI_4, epsilon = 1e-5);
    }
}

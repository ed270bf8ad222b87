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

//! The built-in node catalog: interface tables and construction semantics
//! for the standard node set. Drawing code for the leaves lives behind the
//! viewer contract; this module only knows field shapes, bounding volumes
//! and traversal.

pub mod behavior;

use crate::{
    error::SceneError,
    field::{FieldKind, FieldValue, Rotation, SfImage},
    node::{
        interface::{InterfaceAccess, InterfaceDecl, InterfaceSet},
        metatype::{InitialValues, NodeMetatype, NodeType},
        BindableStackId, Node, NodeBehavior, PlainBehavior,
    },
    scope::Scope,
    vrml97::behavior::{
        BindableBehavior, ElevationGridBehavior, ExtrusionBehavior, GroupBehavior, GroupKind,
        InterpolatorBehavior, InterpolatorKind, LightBehavior, LightKind, PointBasedBehavior,
        PointBasedKind, PrimitiveBehavior, PrimitiveKind, ScriptBehavior, ShapeBehavior,
        TimeSensorBehavior,
    },
};
use nalgebra::{Vector2, Vector3};
use std::sync::Arc;

/// Prefix of every built-in metatype identifier; the local name follows it.
pub const METATYPE_ID_PREFIX: &str = "urn:X-welt:node:";

/// Which behavior a built-in metatype equips its nodes with.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BuiltinCategory {
    Plain,
    Group(GroupKind),
    Shape,
    Primitive(PrimitiveKind),
    PointBased(PointBasedKind),
    ElevationGrid,
    Extrusion,
    Light(LightKind),
    TimeSensor,
    Interpolator(InterpolatorKind),
    Bindable(BindableStackId),
    Script,
}

fn make_behavior(category: BuiltinCategory) -> Box<dyn NodeBehavior> {
    match category {
        BuiltinCategory::Plain => Box::new(PlainBehavior),
        BuiltinCategory::Group(kind) => Box::new(GroupBehavior { kind }),
        BuiltinCategory::Shape => Box::new(ShapeBehavior),
        BuiltinCategory::Primitive(kind) => Box::new(PrimitiveBehavior { kind }),
        BuiltinCategory::PointBased(kind) => Box::new(PointBasedBehavior { kind }),
        BuiltinCategory::ElevationGrid => Box::new(ElevationGridBehavior),
        BuiltinCategory::Extrusion => Box::new(ExtrusionBehavior),
        BuiltinCategory::Light(kind) => Box::new(LightBehavior { kind }),
        BuiltinCategory::TimeSensor => Box::new(TimeSensorBehavior::default()),
        BuiltinCategory::Interpolator(kind) => Box::new(InterpolatorBehavior { kind }),
        BuiltinCategory::Bindable(stack) => Box::new(BindableBehavior { stack }),
        BuiltinCategory::Script => Box::new(ScriptBehavior::default()),
    }
}

/// A built-in node metatype: a fixed interface table plus a behavior
/// factory.
pub struct BuiltinMetatype {
    id: String,
    local_id: &'static str,
    interfaces: InterfaceSet,
    category: BuiltinCategory,
}

impl BuiltinMetatype {
    pub fn local_id(&self) -> &'static str {
        self.local_id
    }

    pub fn category(&self) -> BuiltinCategory {
        self.category
    }

    /// The node-type exposing this metatype's full interface set under its
    /// standard name.
    pub fn standard_type(self: &Arc<Self>) -> Result<NodeType, SceneError> {
        NodeType::new(self.clone(), self.local_id, self.interfaces.clone())
    }
}

impl NodeMetatype for BuiltinMetatype {
    fn id(&self) -> &str {
        &self.id
    }

    fn interfaces(&self) -> &InterfaceSet {
        &self.interfaces
    }

    fn validate_interfaces(
        &self,
        local_id: &str,
        requested: &InterfaceSet,
    ) -> Result<(), SceneError> {
        for decl in requested.iter() {
            match self.interfaces.find(&decl.id) {
                Some(known) if known.access == decl.access && known.kind == decl.kind => {}
                // Script nodes carry author-declared interfaces on top of
                // the base table.
                None if self.category == BuiltinCategory::Script => {}
                _ => {
                    return Err(SceneError::UnsupportedInterface {
                        node_type: local_id.to_owned(),
                        requested: decl.id.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn create_node(
        &self,
        ty: &NodeType,
        scope: &Scope,
        init: InitialValues,
    ) -> Result<Node, SceneError> {
        Node::new(ty.clone(), scope.clone(), make_behavior(self.category), init)
    }
}

fn exposed(kind: FieldKind, id: &str) -> InterfaceDecl {
    InterfaceDecl::new(InterfaceAccess::ExposedField, kind, id)
}

fn exposed_v(kind: FieldKind, id: &str, default: FieldValue) -> InterfaceDecl {
    exposed(kind, id).with_default(default)
}

fn plain_field(kind: FieldKind, id: &str) -> InterfaceDecl {
    InterfaceDecl::new(InterfaceAccess::Field, kind, id)
}

fn field_v(kind: FieldKind, id: &str, default: FieldValue) -> InterfaceDecl {
    plain_field(kind, id).with_default(default)
}

fn event_in(kind: FieldKind, id: &str) -> InterfaceDecl {
    InterfaceDecl::new(InterfaceAccess::EventIn, kind, id)
}

fn event_out(kind: FieldKind, id: &str) -> InterfaceDecl {
    InterfaceDecl::new(InterfaceAccess::EventOut, kind, id)
}

fn sfb(v: bool) -> FieldValue {
    FieldValue::SfBool(v)
}

fn sff(v: f32) -> FieldValue {
    FieldValue::SfFloat(v)
}

fn sfi(v: i32) -> FieldValue {
    FieldValue::SfInt32(v)
}

fn sfv2(x: f32, y: f32) -> FieldValue {
    FieldValue::SfVec2f(Vector2::new(x, y))
}

fn sfv3(x: f32, y: f32, z: f32) -> FieldValue {
    FieldValue::SfVec3f(Vector3::new(x, y, z))
}

fn sfcolor(r: f32, g: f32, b: f32) -> FieldValue {
    FieldValue::SfColor(Vector3::new(r, g, b))
}

fn sfrot(x: f32, y: f32, z: f32, a: f32) -> FieldValue {
    FieldValue::SfRotation(Rotation::new(Vector3::new(x, y, z), a))
}

fn sfstr(v: &str) -> FieldValue {
    FieldValue::SfString(v.to_owned())
}

fn mfstr(values: &[&str]) -> FieldValue {
    FieldValue::MfString(values.iter().map(|s| (*s).to_owned()).collect())
}

fn mff(values: &[f32]) -> FieldValue {
    FieldValue::MfFloat(values.to_vec())
}

fn mfv2(values: &[[f32; 2]]) -> FieldValue {
    FieldValue::MfVec2f(values.iter().map(|v| Vector2::new(v[0], v[1])).collect())
}

fn mfv3(values: &[[f32; 3]]) -> FieldValue {
    FieldValue::MfVec3f(
        values
            .iter()
            .map(|v| Vector3::new(v[0], v[1], v[2]))
            .collect(),
    )
}

fn mfrot(values: &[[f32; 4]]) -> FieldValue {
    FieldValue::MfRotation(
        values
            .iter()
            .map(|v| Rotation::new(Vector3::new(v[0], v[1], v[2]), v[3]))
            .collect(),
    )
}

fn metatype(
    local_id: &'static str,
    category: BuiltinCategory,
    decls: Vec<InterfaceDecl>,
) -> Arc<BuiltinMetatype> {
    let mut interfaces = InterfaceSet::new();
    for decl in decls {
        interfaces.add(decl);
    }
    Arc::new(BuiltinMetatype {
        id: format!("{METATYPE_ID_PREFIX}{local_id}"),
        local_id,
        interfaces,
        category,
    })
}

fn grouping_base(mut decls: Vec<InterfaceDecl>) -> Vec<InterfaceDecl> {
    decls.push(event_in(FieldKind::MFNode, "addChildren"));
    decls.push(event_in(FieldKind::MFNode, "removeChildren"));
    decls.push(exposed(FieldKind::MFNode, "children"));
    decls.push(plain_field(FieldKind::SFVec3f, "bboxCenter"));
    decls.push(field_v(FieldKind::SFVec3f, "bboxSize", sfv3(-1.0, -1.0, -1.0)));
    decls
}

fn interpolator(value_kind: FieldKind, out_kind: FieldKind) -> Vec<InterfaceDecl> {
    vec![
        event_in(FieldKind::SFFloat, "set_fraction"),
        exposed(FieldKind::MFFloat, "key"),
        exposed(value_kind, "keyValue"),
        event_out(out_kind, "value_changed"),
    ]
}

/// Every metatype of the standard catalog, ready to register with an
/// engine's metatype registry.
pub fn standard_metatypes() -> Vec<Arc<BuiltinMetatype>> {
    use BuiltinCategory as C;
    use FieldKind::*;

    vec![
        metatype(
            "Anchor",
            C::Group(GroupKind::Group),
            grouping_base(vec![
                exposed(SFString, "description"),
                exposed(MFString, "parameter"),
                exposed(MFString, "url"),
            ]),
        ),
        metatype(
            "Appearance",
            C::Plain,
            vec![
                exposed(SFNode, "material"),
                exposed(SFNode, "texture"),
                exposed(SFNode, "textureTransform"),
            ],
        ),
        metatype(
            "AudioClip",
            C::Plain,
            vec![
                exposed(SFString, "description"),
                exposed_v(SFBool, "loop", sfb(false)),
                exposed_v(SFFloat, "pitch", sff(1.0)),
                exposed(SFTime, "startTime"),
                exposed(SFTime, "stopTime"),
                exposed(MFString, "url"),
                event_out(SFTime, "duration_changed"),
                event_out(SFBool, "isActive"),
            ],
        ),
        metatype(
            "Background",
            C::Bindable(BindableStackId::Background),
            vec![
                event_in(SFBool, "set_bind"),
                exposed(MFFloat, "groundAngle"),
                exposed(MFColor, "groundColor"),
                exposed(MFString, "backUrl"),
                exposed(MFString, "bottomUrl"),
                exposed(MFString, "frontUrl"),
                exposed(MFString, "leftUrl"),
                exposed(MFString, "rightUrl"),
                exposed(MFString, "topUrl"),
                exposed(MFFloat, "skyAngle"),
                exposed_v(MFColor, "skyColor", FieldValue::MfColor(vec![Vector3::zeros()])),
                event_out(SFBool, "isBound"),
            ],
        ),
        metatype(
            "Billboard",
            C::Group(GroupKind::Group),
            grouping_base(vec![exposed_v(
                SFVec3f,
                "axisOfRotation",
                sfv3(0.0, 1.0, 0.0),
            )]),
        ),
        metatype(
            "Box",
            C::Primitive(PrimitiveKind::Box),
            vec![field_v(SFVec3f, "size", sfv3(2.0, 2.0, 2.0))],
        ),
        metatype(
            "Collision",
            C::Group(GroupKind::Group),
            grouping_base(vec![
                exposed_v(SFBool, "collide", sfb(true)),
                plain_field(SFNode, "proxy"),
                event_out(SFTime, "collideTime"),
            ]),
        ),
        metatype("Color", C::Plain, vec![exposed(MFColor, "color")]),
        metatype(
            "ColorInterpolator",
            C::Interpolator(InterpolatorKind::Color),
            interpolator(MFColor, SFColor),
        ),
        metatype(
            "Cone",
            C::Primitive(PrimitiveKind::Cone),
            vec![
                field_v(SFFloat, "bottomRadius", sff(1.0)),
                field_v(SFFloat, "height", sff(2.0)),
                field_v(SFBool, "side", sfb(true)),
                field_v(SFBool, "bottom", sfb(true)),
            ],
        ),
        metatype("Coordinate", C::Plain, vec![exposed(MFVec3f, "point")]),
        metatype(
            "CoordinateInterpolator",
            C::Interpolator(InterpolatorKind::Coordinate),
            interpolator(MFVec3f, MFVec3f),
        ),
        metatype(
            "Cylinder",
            C::Primitive(PrimitiveKind::Cylinder),
            vec![
                field_v(SFBool, "bottom", sfb(true)),
                field_v(SFFloat, "height", sff(2.0)),
                field_v(SFFloat, "radius", sff(1.0)),
                field_v(SFBool, "side", sfb(true)),
                field_v(SFBool, "top", sfb(true)),
            ],
        ),
        metatype(
            "CylinderSensor",
            C::Plain,
            vec![
                exposed_v(SFBool, "autoOffset", sfb(true)),
                exposed_v(SFFloat, "diskAngle", sff(0.262)),
                exposed_v(SFBool, "enabled", sfb(true)),
                exposed_v(SFFloat, "maxAngle", sff(-1.0)),
                exposed(SFFloat, "minAngle"),
                exposed(SFFloat, "offset"),
                event_out(SFBool, "isActive"),
                event_out(SFRotation, "rotation_changed"),
                event_out(SFVec3f, "trackPoint_changed"),
            ],
        ),
        metatype(
            "DirectionalLight",
            C::Light(LightKind::Directional),
            vec![
                exposed(SFFloat, "ambientIntensity"),
                exposed_v(SFColor, "color", sfcolor(1.0, 1.0, 1.0)),
                exposed_v(SFVec3f, "direction", sfv3(0.0, 0.0, -1.0)),
                exposed_v(SFFloat, "intensity", sff(1.0)),
                exposed_v(SFBool, "on", sfb(true)),
            ],
        ),
        metatype(
            "ElevationGrid",
            C::ElevationGrid,
            vec![
                event_in(MFFloat, "set_height"),
                exposed(SFNode, "color"),
                exposed(SFNode, "normal"),
                exposed(SFNode, "texCoord"),
                plain_field(MFFloat, "height"),
                field_v(SFBool, "ccw", sfb(true)),
                field_v(SFBool, "colorPerVertex", sfb(true)),
                plain_field(SFFloat, "creaseAngle"),
                field_v(SFBool, "normalPerVertex", sfb(true)),
                field_v(SFBool, "solid", sfb(true)),
                plain_field(SFInt32, "xDimension"),
                field_v(SFFloat, "xSpacing", sff(1.0)),
                plain_field(SFInt32, "zDimension"),
                field_v(SFFloat, "zSpacing", sff(1.0)),
            ],
        ),
        metatype(
            "Extrusion",
            C::Extrusion,
            vec![
                event_in(MFVec2f, "set_crossSection"),
                event_in(MFRotation, "set_orientation"),
                event_in(MFVec2f, "set_scale"),
                event_in(MFVec3f, "set_spine"),
                field_v(SFBool, "beginCap", sfb(true)),
                field_v(SFBool, "ccw", sfb(true)),
                field_v(SFBool, "convex", sfb(true)),
                plain_field(SFFloat, "creaseAngle"),
                field_v(
                    MFVec2f,
                    "crossSection",
                    mfv2(&[[1.0, 1.0], [1.0, -1.0], [-1.0, -1.0], [-1.0, 1.0], [1.0, 1.0]]),
                ),
                field_v(SFBool, "endCap", sfb(true)),
                field_v(MFRotation, "orientation", mfrot(&[[0.0, 0.0, 1.0, 0.0]])),
                field_v(MFVec2f, "scale", mfv2(&[[1.0, 1.0]])),
                field_v(SFBool, "solid", sfb(true)),
                field_v(MFVec3f, "spine", mfv3(&[[0.0, 0.0, 0.0], [0.0, 1.0, 0.0]])),
            ],
        ),
        metatype(
            "Fog",
            C::Bindable(BindableStackId::Fog),
            vec![
                event_in(SFBool, "set_bind"),
                exposed_v(SFColor, "color", sfcolor(1.0, 1.0, 1.0)),
                exposed_v(SFString, "fogType", sfstr("LINEAR")),
                exposed(SFFloat, "visibilityRange"),
                event_out(SFBool, "isBound"),
            ],
        ),
        metatype(
            "FontStyle",
            C::Plain,
            vec![
                field_v(MFString, "family", mfstr(&["SERIF"])),
                field_v(SFBool, "horizontal", sfb(true)),
                field_v(MFString, "justify", mfstr(&["BEGIN"])),
                plain_field(SFString, "language"),
                field_v(SFBool, "leftToRight", sfb(true)),
                field_v(SFFloat, "size", sff(1.0)),
                field_v(SFFloat, "spacing", sff(1.0)),
                field_v(SFString, "style", sfstr("PLAIN")),
                field_v(SFBool, "topToBottom", sfb(true)),
            ],
        ),
        metatype("Group", C::Group(GroupKind::Group), grouping_base(vec![])),
        metatype(
            "ImageTexture",
            C::Plain,
            vec![
                exposed(MFString, "url"),
                field_v(SFBool, "repeatS", sfb(true)),
                field_v(SFBool, "repeatT", sfb(true)),
            ],
        ),
        metatype(
            "IndexedFaceSet",
            C::PointBased(PointBasedKind::FaceSet),
            vec![
                event_in(MFInt32, "set_colorIndex"),
                event_in(MFInt32, "set_coordIndex"),
                event_in(MFInt32, "set_normalIndex"),
                event_in(MFInt32, "set_texCoordIndex"),
                exposed(SFNode, "color"),
                exposed(SFNode, "coord"),
                exposed(SFNode, "normal"),
                exposed(SFNode, "texCoord"),
                field_v(SFBool, "ccw", sfb(true)),
                plain_field(MFInt32, "colorIndex"),
                field_v(SFBool, "colorPerVertex", sfb(true)),
                field_v(SFBool, "convex", sfb(true)),
                plain_field(MFInt32, "coordIndex"),
                plain_field(SFFloat, "creaseAngle"),
                plain_field(MFInt32, "normalIndex"),
                field_v(SFBool, "normalPerVertex", sfb(true)),
                field_v(SFBool, "solid", sfb(true)),
                plain_field(MFInt32, "texCoordIndex"),
            ],
        ),
        metatype(
            "IndexedLineSet",
            C::PointBased(PointBasedKind::LineSet),
            vec![
                event_in(MFInt32, "set_colorIndex"),
                event_in(MFInt32, "set_coordIndex"),
                exposed(SFNode, "color"),
                exposed(SFNode, "coord"),
                plain_field(MFInt32, "colorIndex"),
                field_v(SFBool, "colorPerVertex", sfb(true)),
                plain_field(MFInt32, "coordIndex"),
            ],
        ),
        metatype(
            "Inline",
            C::Plain,
            vec![
                exposed(MFString, "url"),
                plain_field(SFVec3f, "bboxCenter"),
                field_v(SFVec3f, "bboxSize", sfv3(-1.0, -1.0, -1.0)),
            ],
        ),
        metatype(
            "LOD",
            C::Group(GroupKind::Lod),
            vec![
                exposed(MFNode, "level"),
                plain_field(SFVec3f, "center"),
                plain_field(MFFloat, "range"),
            ],
        ),
        metatype(
            "Material",
            C::Plain,
            vec![
                exposed_v(SFFloat, "ambientIntensity", sff(0.2)),
                exposed_v(SFColor, "diffuseColor", sfcolor(0.8, 0.8, 0.8)),
                exposed(SFColor, "emissiveColor"),
                exposed_v(SFFloat, "shininess", sff(0.2)),
                exposed(SFColor, "specularColor"),
                exposed(SFFloat, "transparency"),
            ],
        ),
        metatype(
            "MovieTexture",
            C::Plain,
            vec![
                exposed_v(SFBool, "loop", sfb(false)),
                exposed_v(SFFloat, "speed", sff(1.0)),
                exposed(SFTime, "startTime"),
                exposed(SFTime, "stopTime"),
                exposed(MFString, "url"),
                field_v(SFBool, "repeatS", sfb(true)),
                field_v(SFBool, "repeatT", sfb(true)),
                event_out(SFTime, "duration_changed"),
                event_out(SFBool, "isActive"),
            ],
        ),
        metatype(
            "NavigationInfo",
            C::Bindable(BindableStackId::NavigationInfo),
            vec![
                event_in(SFBool, "set_bind"),
                exposed_v(MFFloat, "avatarSize", mff(&[0.25, 1.6, 0.75])),
                exposed_v(SFBool, "headlight", sfb(true)),
                exposed_v(SFFloat, "speed", sff(1.0)),
                exposed_v(MFString, "type", mfstr(&["WALK", "ANY"])),
                exposed(SFFloat, "visibilityLimit"),
                event_out(SFBool, "isBound"),
            ],
        ),
        metatype("Normal", C::Plain, vec![exposed(MFVec3f, "vector")]),
        metatype(
            "NormalInterpolator",
            C::Interpolator(InterpolatorKind::Normal),
            interpolator(MFVec3f, MFVec3f),
        ),
        metatype(
            "OrientationInterpolator",
            C::Interpolator(InterpolatorKind::Orientation),
            interpolator(MFRotation, SFRotation),
        ),
        metatype(
            "PixelTexture",
            C::Plain,
            vec![
                exposed_v(SFImage, "image", FieldValue::SfImage(SfImage::default())),
                field_v(SFBool, "repeatS", sfb(true)),
                field_v(SFBool, "repeatT", sfb(true)),
            ],
        ),
        metatype(
            "PlaneSensor",
            C::Plain,
            vec![
                exposed_v(SFBool, "autoOffset", sfb(true)),
                exposed_v(SFBool, "enabled", sfb(true)),
                exposed_v(SFVec2f, "maxPosition", sfv2(-1.0, -1.0)),
                exposed(SFVec2f, "minPosition"),
                exposed(SFVec3f, "offset"),
                event_out(SFBool, "isActive"),
                event_out(SFVec3f, "trackPoint_changed"),
                event_out(SFVec3f, "translation_changed"),
            ],
        ),
        metatype(
            "PointLight",
            C::Light(LightKind::Point),
            vec![
                exposed(SFFloat, "ambientIntensity"),
                exposed_v(SFVec3f, "attenuation", sfv3(1.0, 0.0, 0.0)),
                exposed_v(SFColor, "color", sfcolor(1.0, 1.0, 1.0)),
                exposed_v(SFFloat, "intensity", sff(1.0)),
                exposed(SFVec3f, "location"),
                exposed_v(SFBool, "on", sfb(true)),
                exposed_v(SFFloat, "radius", sff(100.0)),
            ],
        ),
        metatype(
            "PointSet",
            C::PointBased(PointBasedKind::PointSet),
            vec![exposed(SFNode, "color"), exposed(SFNode, "coord")],
        ),
        metatype(
            "PositionInterpolator",
            C::Interpolator(InterpolatorKind::Position),
            interpolator(MFVec3f, SFVec3f),
        ),
        metatype(
            "ProximitySensor",
            C::Plain,
            vec![
                exposed(SFVec3f, "center"),
                exposed(SFVec3f, "size"),
                exposed_v(SFBool, "enabled", sfb(true)),
                event_out(SFBool, "isActive"),
                event_out(SFVec3f, "position_changed"),
                event_out(SFRotation, "orientation_changed"),
                event_out(SFTime, "enterTime"),
                event_out(SFTime, "exitTime"),
            ],
        ),
        metatype(
            "ScalarInterpolator",
            C::Interpolator(InterpolatorKind::Scalar),
            interpolator(MFFloat, SFFloat),
        ),
        metatype(
            "Script",
            C::Script,
            vec![
                exposed(MFString, "url"),
                plain_field(SFBool, "directOutput"),
                plain_field(SFBool, "mustEvaluate"),
            ],
        ),
        metatype(
            "Shape",
            C::Shape,
            vec![exposed(SFNode, "appearance"), exposed(SFNode, "geometry")],
        ),
        metatype(
            "Sound",
            C::Plain,
            vec![
                exposed_v(SFVec3f, "direction", sfv3(0.0, 0.0, 1.0)),
                exposed_v(SFFloat, "intensity", sff(1.0)),
                exposed(SFVec3f, "location"),
                exposed_v(SFFloat, "maxBack", sff(10.0)),
                exposed_v(SFFloat, "maxFront", sff(10.0)),
                exposed_v(SFFloat, "minBack", sff(1.0)),
                exposed_v(SFFloat, "minFront", sff(1.0)),
                exposed(SFFloat, "priority"),
                exposed(SFNode, "source"),
                field_v(SFBool, "spatialize", sfb(true)),
            ],
        ),
        metatype(
            "Sphere",
            C::Primitive(PrimitiveKind::Sphere),
            vec![field_v(SFFloat, "radius", sff(1.0))],
        ),
        metatype(
            "SphereSensor",
            C::Plain,
            vec![
                exposed_v(SFBool, "autoOffset", sfb(true)),
                exposed_v(SFBool, "enabled", sfb(true)),
                exposed_v(SFRotation, "offset", sfrot(0.0, 1.0, 0.0, 0.0)),
                event_out(SFBool, "isActive"),
                event_out(SFRotation, "rotation_changed"),
                event_out(SFVec3f, "trackPoint_changed"),
            ],
        ),
        metatype(
            "SpotLight",
            C::Light(LightKind::Spot),
            vec![
                exposed(SFFloat, "ambientIntensity"),
                exposed_v(SFVec3f, "attenuation", sfv3(1.0, 0.0, 0.0)),
                exposed_v(SFFloat, "beamWidth", sff(1.570_796)),
                exposed_v(SFColor, "color", sfcolor(1.0, 1.0, 1.0)),
                exposed_v(SFFloat, "cutOffAngle", sff(0.785_398)),
                exposed_v(SFVec3f, "direction", sfv3(0.0, 0.0, -1.0)),
                exposed_v(SFFloat, "intensity", sff(1.0)),
                exposed(SFVec3f, "location"),
                exposed_v(SFBool, "on", sfb(true)),
                exposed_v(SFFloat, "radius", sff(100.0)),
            ],
        ),
        metatype(
            "Switch",
            C::Group(GroupKind::Switch),
            vec![
                exposed(MFNode, "choice"),
                exposed_v(SFInt32, "whichChoice", sfi(-1)),
            ],
        ),
        metatype(
            "Text",
            C::Plain,
            vec![
                exposed(MFString, "string"),
                exposed(SFNode, "fontStyle"),
                exposed(MFFloat, "length"),
                exposed(SFFloat, "maxExtent"),
            ],
        ),
        metatype(
            "TextureCoordinate",
            C::Plain,
            vec![exposed(MFVec2f, "point")],
        ),
        metatype(
            "TextureTransform",
            C::Plain,
            vec![
                exposed(SFVec2f, "center"),
                exposed(SFFloat, "rotation"),
                exposed_v(SFVec2f, "scale", sfv2(1.0, 1.0)),
                exposed(SFVec2f, "translation"),
            ],
        ),
        metatype(
            "TimeSensor",
            C::TimeSensor,
            vec![
                exposed_v(SFTime, "cycleInterval", FieldValue::SfTime(1.0)),
                exposed_v(SFBool, "enabled", sfb(true)),
                exposed_v(SFBool, "loop", sfb(false)),
                exposed(SFTime, "startTime"),
                exposed(SFTime, "stopTime"),
                event_out(SFTime, "cycleTime"),
                event_out(SFFloat, "fraction_changed"),
                event_out(SFBool, "isActive"),
                event_out(SFTime, "time"),
            ],
        ),
        metatype(
            "TouchSensor",
            C::Plain,
            vec![
                exposed_v(SFBool, "enabled", sfb(true)),
                event_out(SFVec3f, "hitNormal_changed"),
                event_out(SFVec3f, "hitPoint_changed"),
                event_out(SFVec2f, "hitTexCoord_changed"),
                event_out(SFBool, "isActive"),
                event_out(SFBool, "isOver"),
                event_out(SFTime, "touchTime"),
            ],
        ),
        metatype(
            "Transform",
            C::Group(GroupKind::Transform),
            grouping_base(vec![
                exposed(SFVec3f, "center"),
                exposed_v(SFRotation, "rotation", sfrot(0.0, 0.0, 1.0, 0.0)),
                exposed_v(SFVec3f, "scale", sfv3(1.0, 1.0, 1.0)),
                exposed_v(SFRotation, "scaleOrientation", sfrot(0.0, 0.0, 1.0, 0.0)),
                exposed(SFVec3f, "translation"),
            ]),
        ),
        metatype(
            "Viewpoint",
            C::Bindable(BindableStackId::Viewpoint),
            vec![
                event_in(SFBool, "set_bind"),
                exposed_v(SFFloat, "fieldOfView", sff(0.785_398)),
                exposed_v(SFBool, "jump", sfb(true)),
                exposed_v(SFRotation, "orientation", sfrot(0.0, 0.0, 1.0, 0.0)),
                exposed_v(SFVec3f, "position", sfv3(0.0, 0.0, 10.0)),
                plain_field(SFString, "description"),
                event_out(SFTime, "bindTime"),
                event_out(SFBool, "isBound"),
            ],
        ),
        metatype(
            "VisibilitySensor",
            C::Plain,
            vec![
                exposed(SFVec3f, "center"),
                exposed_v(SFBool, "enabled", sfb(true)),
                exposed(SFVec3f, "size"),
                event_out(SFTime, "enterTime"),
                event_out(SFTime, "exitTime"),
                event_out(SFBool, "isActive"),
            ],
        ),
        metatype(
            "WorldInfo",
            C::Plain,
            vec![plain_field(MFString, "info"), plain_field(SFString, "title")],
        ),
        // X3D key-device sensors, exposed through the KeyDeviceSensor
        // component of the extended profiles.
        metatype(
            "KeySensor",
            C::Plain,
            vec![
                exposed_v(SFBool, "enabled", sfb(true)),
                event_out(SFInt32, "actionKeyPress"),
                event_out(SFInt32, "actionKeyRelease"),
                event_out(SFBool, "altKey"),
                event_out(SFBool, "controlKey"),
                event_out(SFBool, "shiftKey"),
                event_out(SFBool, "isActive"),
                event_out(SFString, "keyPress"),
                event_out(SFString, "keyRelease"),
            ],
        ),
        metatype(
            "StringSensor",
            C::Plain,
            vec![
                exposed_v(SFBool, "deletionAllowed", sfb(true)),
                exposed_v(SFBool, "enabled", sfb(true)),
                event_out(SFString, "enteredText"),
                event_out(SFString, "finalText"),
                event_out(SFBool, "isActive"),
            ],
        ),
    ]
}

#[cfg(test)]
mod test {
    use super::standard_metatypes;
    use crate::node::metatype::NodeMetatype;

    #[test]
    fn catalog_ids_are_unique_and_prefixed() {
        let metatypes = standard_metatypes();
        let mut ids: Vec<_> = metatypes.iter().map(|m| m.id().to_owned()).collect();
        ids.sort();
        let before = ids.len();
        ids.dedup();
        assert_eq!(ids.len(), before);
        assert!(ids.iter().all(|id| id.starts_with(super::METATYPE_ID_PREFIX)));
    }

    #[test]
    fn time_sensor_interfaces() {
        let metatypes = standard_metatypes();
        let time_sensor = metatypes
            .iter()
            .find(|m| m.local_id() == "TimeSensor")
            .unwrap();
        assert!(time_sensor.interfaces().find_event_out("fraction_changed").is_some());
        assert!(time_sensor.interfaces().find_event_in("set_cycleInterval").is_some());
        assert!(time_sensor.interfaces().find("noSuchThing").is_none());
    }
}

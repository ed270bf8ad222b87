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

//! The typed value model of the scene language: every field and event payload
//! is one of these tagged values. A value's kind is fixed at construction;
//! assignment between values of different kinds is an error, never a
//! coercion.

pub mod print;

use crate::{error::SceneError, node::Node};
use nalgebra::{Vector2, Vector3, Vector4};
use std::fmt::{Display, Formatter};
use strum_macros::{AsRefStr, EnumString};

/// The kind tag of a field value. Names match the scene-language spelling.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, AsRefStr, EnumString)]
pub enum FieldKind {
    SFBool,
    SFInt32,
    SFFloat,
    SFDouble,
    SFTime,
    SFString,
    SFColor,
    SFColorRGBA,
    SFVec2f,
    SFVec3f,
    SFVec2d,
    SFVec3d,
    SFRotation,
    SFNode,
    SFImage,
    MFBool,
    MFInt32,
    MFFloat,
    MFDouble,
    MFTime,
    MFString,
    MFColor,
    MFColorRGBA,
    MFVec2f,
    MFVec3f,
    MFVec2d,
    MFVec3d,
    MFRotation,
    MFNode,
}

impl Display for FieldKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_ref())
    }
}

impl FieldKind {
    /// True for the multi-valued family.
    pub fn is_multi(self) -> bool {
        self.as_ref().starts_with("MF")
    }

    /// True for the two node-reference kinds.
    pub fn is_node(self) -> bool {
        matches!(self, FieldKind::SFNode | FieldKind::MFNode)
    }
}

/// An axis-angle rotation. The axis is kept unit length by the parser; the
/// value itself does not enforce it.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Rotation {
    pub axis: Vector3<f32>,
    pub angle: f32,
}

impl Default for Rotation {
    fn default() -> Self {
        Self {
            axis: Vector3::new(0.0, 0.0, 1.0),
            angle: 0.0,
        }
    }
}

impl Rotation {
    pub fn new(axis: Vector3<f32>, angle: f32) -> Self {
        Self { axis, angle }
    }
}

/// A pixel rectangle. Zero width, height and components is a legal empty
/// image.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct SfImage {
    pub width: u32,
    pub height: u32,
    /// Color components per pixel, 0..=4.
    pub components: u32,
    /// Row-major pixel bytes, `components` bytes per pixel.
    pub pixels: Vec<u8>,
}

/// A concrete typed value. Clones are deep for every payload except node
/// references, which share the referenced node (node identity is the point
/// of a reference).
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    SfBool(bool),
    SfInt32(i32),
    SfFloat(f32),
    SfDouble(f64),
    SfTime(f64),
    SfString(String),
    SfColor(Vector3<f32>),
    SfColorRgba(Vector4<f32>),
    SfVec2f(Vector2<f32>),
    SfVec3f(Vector3<f32>),
    SfVec2d(Vector2<f64>),
    SfVec3d(Vector3<f64>),
    SfRotation(Rotation),
    SfNode(Option<Node>),
    SfImage(SfImage),
    MfBool(Vec<bool>),
    MfInt32(Vec<i32>),
    MfFloat(Vec<f32>),
    MfDouble(Vec<f64>),
    MfTime(Vec<f64>),
    MfString(Vec<String>),
    MfColor(Vec<Vector3<f32>>),
    MfColorRgba(Vec<Vector4<f32>>),
    MfVec2f(Vec<Vector2<f32>>),
    MfVec3f(Vec<Vector3<f32>>),
    MfVec2d(Vec<Vector2<f64>>),
    MfVec3d(Vec<Vector3<f64>>),
    MfRotation(Vec<Rotation>),
    MfNode(Vec<Node>),
}

impl FieldValue {
    /// The default value of the given kind: zeroes, empty sequences, a null
    /// node, an empty image.
    pub fn default_of(kind: FieldKind) -> Self {
        match kind {
            FieldKind::SFBool => Self::SfBool(false),
            FieldKind::SFInt32 => Self::SfInt32(0),
            FieldKind::SFFloat => Self::SfFloat(0.0),
            FieldKind::SFDouble => Self::SfDouble(0.0),
            FieldKind::SFTime => Self::SfTime(0.0),
            FieldKind::SFString => Self::SfString(String::new()),
            FieldKind::SFColor => Self::SfColor(Vector3::new(0.0, 0.0, 0.0)),
            FieldKind::SFColorRGBA => Self::SfColorRgba(Vector4::new(0.0, 0.0, 0.0, 1.0)),
            FieldKind::SFVec2f => Self::SfVec2f(Vector2::new(0.0, 0.0)),
            FieldKind::SFVec3f => Self::SfVec3f(Vector3::new(0.0, 0.0, 0.0)),
            FieldKind::SFVec2d => Self::SfVec2d(Vector2::new(0.0, 0.0)),
            FieldKind::SFVec3d => Self::SfVec3d(Vector3::new(0.0, 0.0, 0.0)),
            FieldKind::SFRotation => Self::SfRotation(Rotation::default()),
            FieldKind::SFNode => Self::SfNode(None),
            FieldKind::SFImage => Self::SfImage(SfImage::default()),
            FieldKind::MFBool => Self::MfBool(Vec::new()),
            FieldKind::MFInt32 => Self::MfInt32(Vec::new()),
            FieldKind::MFFloat => Self::MfFloat(Vec::new()),
            FieldKind::MFDouble => Self::MfDouble(Vec::new()),
            FieldKind::MFTime => Self::MfTime(Vec::new()),
            FieldKind::MFString => Self::MfString(Vec::new()),
            FieldKind::MFColor => Self::MfColor(Vec::new()),
            FieldKind::MFColorRGBA => Self::MfColorRgba(Vec::new()),
            FieldKind::MFVec2f => Self::MfVec2f(Vec::new()),
            FieldKind::MFVec3f => Self::MfVec3f(Vec::new()),
            FieldKind::MFVec2d => Self::MfVec2d(Vec::new()),
            FieldKind::MFVec3d => Self::MfVec3d(Vec::new()),
            FieldKind::MFRotation => Self::MfRotation(Vec::new()),
            FieldKind::MFNode => Self::MfNode(Vec::new()),
        }
    }

    /// The kind tag of this value.
    pub fn kind(&self) -> FieldKind {
        match self {
            Self::SfBool(_) => FieldKind::SFBool,
            Self::SfInt32(_) => FieldKind::SFInt32,
            Self::SfFloat(_) => FieldKind::SFFloat,
            Self::SfDouble(_) => FieldKind::SFDouble,
            Self::SfTime(_) => FieldKind::SFTime,
            Self::SfString(_) => FieldKind::SFString,
            Self::SfColor(_) => FieldKind::SFColor,
            Self::SfColorRgba(_) => FieldKind::SFColorRGBA,
            Self::SfVec2f(_) => FieldKind::SFVec2f,
            Self::SfVec3f(_) => FieldKind::SFVec3f,
            Self::SfVec2d(_) => FieldKind::SFVec2d,
            Self::SfVec3d(_) => FieldKind::SFVec3d,
            Self::SfRotation(_) => FieldKind::SFRotation,
            Self::SfNode(_) => FieldKind::SFNode,
            Self::SfImage(_) => FieldKind::SFImage,
            Self::MfBool(_) => FieldKind::MFBool,
            Self::MfInt32(_) => FieldKind::MFInt32,
            Self::MfFloat(_) => FieldKind::MFFloat,
            Self::MfDouble(_) => FieldKind::MFDouble,
            Self::MfTime(_) => FieldKind::MFTime,
            Self::MfString(_) => FieldKind::MFString,
            Self::MfColor(_) => FieldKind::MFColor,
            Self::MfColorRgba(_) => FieldKind::MFColorRGBA,
            Self::MfVec2f(_) => FieldKind::MFVec2f,
            Self::MfVec3f(_) => FieldKind::MFVec3f,
            Self::MfVec2d(_) => FieldKind::MFVec2d,
            Self::MfVec3d(_) => FieldKind::MFVec3d,
            Self::MfRotation(_) => FieldKind::MFRotation,
            Self::MfNode(_) => FieldKind::MFNode,
        }
    }

    /// Type-preserving assignment. Fails if the kinds differ; the target is
    /// left untouched in that case.
    pub fn assign(&mut self, other: &FieldValue) -> Result<(), SceneError> {
        if self.kind() != other.kind() {
            return Err(SceneError::FieldKindMismatch {
                expected: self.kind(),
                got: other.kind(),
            });
        }
        *self = other.clone();
        Ok(())
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::SfBool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int32(&self) -> Option<i32> {
        match self {
            Self::SfInt32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            Self::SfFloat(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<f64> {
        match self {
            Self::SfTime(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            Self::SfString(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_vec3f(&self) -> Option<Vector3<f32>> {
        match self {
            Self::SfVec3f(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_rotation(&self) -> Option<Rotation> {
        match self {
            Self::SfRotation(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Self::SfNode(v) => v.as_ref(),
            _ => None,
        }
    }

    pub fn as_mf_float(&self) -> Option<&[f32]> {
        match self {
            Self::MfFloat(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_mf_vec3f(&self) -> Option<&[Vector3<f32>]> {
        match self {
            Self::MfVec3f(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_mf_rotation(&self) -> Option<&[Rotation]> {
        match self {
            Self::MfRotation(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_mf_color(&self) -> Option<&[Vector3<f32>]> {
        match self {
            Self::MfColor(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_mf_node(&self) -> Option<&[Node]> {
        match self {
            Self::MfNode(v) => Some(v),
            _ => None,
        }
    }

    /// Node references held by this value, in order. Empty for non-node
    /// kinds.
    pub fn nodes(&self) -> Vec<Node> {
        match self {
            Self::SfNode(Some(node)) => vec![node.clone()],
            Self::MfNode(nodes) => nodes.clone(),
            _ => Vec::new(),
        }
    }

    /// The singular kind corresponding to a multi-valued kind.
    pub fn element_kind(kind: FieldKind) -> Option<FieldKind> {
        Some(match kind {
            FieldKind::MFBool => FieldKind::SFBool,
            FieldKind::MFInt32 => FieldKind::SFInt32,
            FieldKind::MFFloat => FieldKind::SFFloat,
            FieldKind::MFDouble => FieldKind::SFDouble,
            FieldKind::MFTime => FieldKind::SFTime,
            FieldKind::MFString => FieldKind::SFString,
            FieldKind::MFColor => FieldKind::SFColor,
            FieldKind::MFColorRGBA => FieldKind::SFColorRGBA,
            FieldKind::MFVec2f => FieldKind::SFVec2f,
            FieldKind::MFVec3f => FieldKind::SFVec3f,
            FieldKind::MFVec2d => FieldKind::SFVec2d,
            FieldKind::MFVec3d => FieldKind::SFVec3d,
            FieldKind::MFRotation => FieldKind::SFRotation,
            FieldKind::MFNode => FieldKind::SFNode,
            _ => return None,
        })
    }

    /// Element count of a multi-valued value; `None` for singular kinds.
    pub fn mf_len(&self) -> Option<usize> {
        Some(match self {
            Self::MfBool(v) => v.len(),
            Self::MfInt32(v) => v.len(),
            Self::MfFloat(v) => v.len(),
            Self::MfDouble(v) => v.len(),
            Self::MfTime(v) => v.len(),
            Self::MfString(v) => v.len(),
            Self::MfColor(v) => v.len(),
            Self::MfColorRgba(v) => v.len(),
            Self::MfVec2f(v) => v.len(),
            Self::MfVec3f(v) => v.len(),
            Self::MfVec2d(v) => v.len(),
            Self::MfVec3d(v) => v.len(),
            Self::MfRotation(v) => v.len(),
            Self::MfNode(v) => v.len(),
            _ => return None,
        })
    }

    /// Random-access read of one element of a multi-valued value, returned
    /// as the corresponding singular value.
    pub fn mf_get(&self, index: usize) -> Option<FieldValue> {
        match self {
            Self::MfBool(v) => v.get(index).map(|e| Self::SfBool(*e)),
            Self::MfInt32(v) => v.get(index).map(|e| Self::SfInt32(*e)),
            Self::MfFloat(v) => v.get(index).map(|e| Self::SfFloat(*e)),
            Self::MfDouble(v) => v.get(index).map(|e| Self::SfDouble(*e)),
            Self::MfTime(v) => v.get(index).map(|e| Self::SfTime(*e)),
            Self::MfString(v) => v.get(index).map(|e| Self::SfString(e.clone())),
            Self::MfColor(v) => v.get(index).map(|e| Self::SfColor(*e)),
            Self::MfColorRgba(v) => v.get(index).map(|e| Self::SfColorRgba(*e)),
            Self::MfVec2f(v) => v.get(index).map(|e| Self::SfVec2f(*e)),
            Self::MfVec3f(v) => v.get(index).map(|e| Self::SfVec3f(*e)),
            Self::MfVec2d(v) => v.get(index).map(|e| Self::SfVec2d(*e)),
            Self::MfVec3d(v) => v.get(index).map(|e| Self::SfVec3d(*e)),
            Self::MfRotation(v) => v.get(index).map(|e| Self::SfRotation(*e)),
            Self::MfNode(v) => v.get(index).map(|e| Self::SfNode(Some(e.clone()))),
            _ => None,
        }
    }

    /// Appends a singular value to a multi-valued value of the matching
    /// element kind.
    pub fn mf_push(&mut self, element: FieldValue) -> Result<(), SceneError> {
        let expected = Self::element_kind(self.kind()).unwrap_or(self.kind());
        let got = element.kind();
        match (&mut *self, element) {
            (Self::MfBool(v), Self::SfBool(e)) => v.push(e),
            (Self::MfInt32(v), Self::SfInt32(e)) => v.push(e),
            (Self::MfFloat(v), Self::SfFloat(e)) => v.push(e),
            (Self::MfDouble(v), Self::SfDouble(e)) => v.push(e),
            (Self::MfTime(v), Self::SfTime(e)) => v.push(e),
            (Self::MfString(v), Self::SfString(e)) => v.push(e),
            (Self::MfColor(v), Self::SfColor(e)) => v.push(e),
            (Self::MfColorRgba(v), Self::SfColorRgba(e)) => v.push(e),
            (Self::MfVec2f(v), Self::SfVec2f(e)) => v.push(e),
            (Self::MfVec3f(v), Self::SfVec3f(e)) => v.push(e),
            (Self::MfVec2d(v), Self::SfVec2d(e)) => v.push(e),
            (Self::MfVec3d(v), Self::SfVec3d(e)) => v.push(e),
            (Self::MfRotation(v), Self::SfRotation(e)) => v.push(e),
            (Self::MfNode(v), Self::SfNode(Some(e))) => v.push(e),
            _ => return Err(SceneError::FieldKindMismatch { expected, got }),
        }
        Ok(())
    }

    /// Replaces one element of a multi-valued value. There is deliberately
    /// no mid-sequence insert or remove: the wire format always carries a
    /// full replacement.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds, like slice indexing.
    pub fn mf_set(&mut self, index: usize, element: FieldValue) -> Result<(), SceneError> {
        let expected = Self::element_kind(self.kind()).unwrap_or(self.kind());
        let got = element.kind();
        match (&mut *self, element) {
            (Self::MfBool(v), Self::SfBool(e)) => v[index] = e,
            (Self::MfInt32(v), Self::SfInt32(e)) => v[index] = e,
            (Self::MfFloat(v), Self::SfFloat(e)) => v[index] = e,
            (Self::MfDouble(v), Self::SfDouble(e)) => v[index] = e,
            (Self::MfTime(v), Self::SfTime(e)) => v[index] = e,
            (Self::MfString(v), Self::SfString(e)) => v[index] = e,
            (Self::MfColor(v), Self::SfColor(e)) => v[index] = e,
            (Self::MfColorRgba(v), Self::SfColorRgba(e)) => v[index] = e,
            (Self::MfVec2f(v), Self::SfVec2f(e)) => v[index] = e,
            (Self::MfVec3f(v), Self::SfVec3f(e)) => v[index] = e,
            (Self::MfVec2d(v), Self::SfVec2d(e)) => v[index] = e,
            (Self::MfVec3d(v), Self::SfVec3d(e)) => v[index] = e,
            (Self::MfRotation(v), Self::SfRotation(e)) => v[index] = e,
            (Self::MfNode(v), Self::SfNode(Some(e))) => v[index] = e,
            _ => return Err(SceneError::FieldKindMismatch { expected, got }),
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::{FieldKind, FieldValue};
    use nalgebra::Vector3;
    use std::str::FromStr;

    #[test]
    fn clone_is_independent() {
        let v = FieldValue::MfFloat(vec![1.0, 2.0, 3.0]);
        let mut w = v.clone();
        assert_eq!(v, w);
        if let FieldValue::MfFloat(values) = &mut w {
            values.push(4.0);
        }
        assert_ne!(v, w);
        assert_eq!(v, FieldValue::MfFloat(vec![1.0, 2.0, 3.0]));
    }

    #[test]
    fn assign_rejects_kind_mismatch() {
        let mut v = FieldValue::SfFloat(1.0);
        let w = FieldValue::SfInt32(2);
        assert!(v.assign(&w).is_err());
        assert_eq!(v, FieldValue::SfFloat(1.0));
    }

    #[test]
    fn assign_same_kind_copies() {
        let mut v = FieldValue::SfVec3f(Vector3::new(0.0, 0.0, 0.0));
        let w = FieldValue::SfVec3f(Vector3::new(1.0, 2.0, 3.0));
        v.assign(&w).unwrap();
        assert_eq!(v, w);
    }

    #[test]
    fn kind_names_match_language_spelling() {
        assert_eq!(FieldKind::SFVec3f.to_string(), "SFVec3f");
        assert_eq!(FieldKind::from_str("MFRotation").unwrap(), FieldKind::MFRotation);
        assert!(FieldKind::from_str("SFThing").is_err());
    }

    #[test]
    fn mf_containers_read_append_replace() {
        let mut value = FieldValue::MfFloat(vec![1.0, 2.0]);
        assert_eq!(value.mf_len(), Some(2));
        assert_eq!(value.mf_get(1), Some(FieldValue::SfFloat(2.0)));
        assert_eq!(value.mf_get(2), None);

        value.mf_push(FieldValue::SfFloat(3.0)).unwrap();
        assert_eq!(value.mf_len(), Some(3));
        assert!(value.mf_push(FieldValue::SfInt32(4)).is_err());

        value.mf_set(0, FieldValue::SfFloat(9.0)).unwrap();
        assert_eq!(value.mf_get(0), Some(FieldValue::SfFloat(9.0)));

        assert_eq!(FieldValue::SfFloat(1.0).mf_len(), None);
    }

    #[test]
    fn every_kind_has_a_default_of_its_own_kind() {
        for kind in [
            FieldKind::SFBool,
            FieldKind::SFImage,
            FieldKind::SFNode,
            FieldKind::MFNode,
            FieldKind::MFVec2d,
        ] {
            assert_eq!(FieldValue::default_of(kind).kind(), kind);
        }
    }
}

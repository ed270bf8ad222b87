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

//! Textual parsing of non-node field values, type-directed by the expected
//! kind. Rotation axes are normalized here (with a style warning when they
//! were not unit length); colors outside [0,1] warn but are stored as given.

use crate::{
    error::SceneError,
    field::{FieldKind, FieldValue, Rotation, SfImage},
    parser::lexer::{Lexer, Token, TokenKind},
};
use nalgebra::{Vector2, Vector3, Vector4};
use welt_core::log::Log;

pub(crate) fn err_at(uri: &str, line: u32, col: u32, message: impl Into<String>) -> SceneError {
    SceneError::InvalidScene {
        uri: uri.to_owned(),
        line,
        col,
        message: message.into(),
    }
}

fn next_token(lexer: &mut Lexer<'_>, uri: &str) -> Result<Token, SceneError> {
    lexer
        .next()
        .map_err(|e| err_at(uri, e.line, e.col, e.message))
}

fn peek_token(lexer: &mut Lexer<'_>, uri: &str) -> Result<Token, SceneError> {
    lexer
        .peek()
        .map_err(|e| err_at(uri, e.line, e.col, e.message))
}

fn parse_i32(lexer: &mut Lexer<'_>, uri: &str) -> Result<i32, SceneError> {
    let token = next_token(lexer, uri)?;
    let TokenKind::Number(text) = &token.kind else {
        return Err(err_at(
            uri,
            token.line,
            token.col,
            format!("expected an integer, found {}", token.kind.describe()),
        ));
    };
    let parsed = if let Some(hex) = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
    {
        u32::from_str_radix(hex, 16).map(|v| v as i32)
    } else if let Some(hex) = text
        .strip_prefix("-0x")
        .or_else(|| text.strip_prefix("-0X"))
    {
        u32::from_str_radix(hex, 16).map(|v| -(v as i32))
    } else {
        text.parse::<i32>()
    };
    parsed.map_err(|_| {
        err_at(
            uri,
            token.line,
            token.col,
            format!("malformed integer {text:?}"),
        )
    })
}

fn parse_f64(lexer: &mut Lexer<'_>, uri: &str) -> Result<f64, SceneError> {
    let token = next_token(lexer, uri)?;
    let TokenKind::Number(text) = &token.kind else {
        return Err(err_at(
            uri,
            token.line,
            token.col,
            format!("expected a number, found {}", token.kind.describe()),
        ));
    };
    text.parse::<f64>().map_err(|_| {
        err_at(
            uri,
            token.line,
            token.col,
            format!("malformed number {text:?}"),
        )
    })
}

fn parse_f32(lexer: &mut Lexer<'_>, uri: &str) -> Result<f32, SceneError> {
    parse_f64(lexer, uri).map(|v| v as f32)
}

fn parse_bool(lexer: &mut Lexer<'_>, uri: &str) -> Result<bool, SceneError> {
    let token = next_token(lexer, uri)?;
    match &token.kind {
        TokenKind::Ident(id) if id == "TRUE" => Ok(true),
        TokenKind::Ident(id) if id == "FALSE" => Ok(false),
        other => Err(err_at(
            uri,
            token.line,
            token.col,
            format!("expected TRUE or FALSE, found {}", other.describe()),
        )),
    }
}

fn parse_string(lexer: &mut Lexer<'_>, uri: &str) -> Result<String, SceneError> {
    let token = next_token(lexer, uri)?;
    match token.kind {
        TokenKind::Str(value) => Ok(value),
        other => Err(err_at(
            uri,
            token.line,
            token.col,
            format!("expected a string literal, found {}", other.describe()),
        )),
    }
}

fn parse_vec2f(lexer: &mut Lexer<'_>, uri: &str) -> Result<Vector2<f32>, SceneError> {
    Ok(Vector2::new(parse_f32(lexer, uri)?, parse_f32(lexer, uri)?))
}

fn parse_vec3f(lexer: &mut Lexer<'_>, uri: &str) -> Result<Vector3<f32>, SceneError> {
    Ok(Vector3::new(
        parse_f32(lexer, uri)?,
        parse_f32(lexer, uri)?,
        parse_f32(lexer, uri)?,
    ))
}

fn parse_vec2d(lexer: &mut Lexer<'_>, uri: &str) -> Result<Vector2<f64>, SceneError> {
    Ok(Vector2::new(parse_f64(lexer, uri)?, parse_f64(lexer, uri)?))
}

fn parse_vec3d(lexer: &mut Lexer<'_>, uri: &str) -> Result<Vector3<f64>, SceneError> {
    Ok(Vector3::new(
        parse_f64(lexer, uri)?,
        parse_f64(lexer, uri)?,
        parse_f64(lexer, uri)?,
    ))
}

fn parse_color(lexer: &mut Lexer<'_>, uri: &str) -> Result<Vector3<f32>, SceneError> {
    let (line, col) = lexer.location();
    let color = parse_vec3f(lexer, uri)?;
    if color.iter().any(|c| !(0.0..=1.0).contains(c)) {
        Log::warn(format!(
            "{uri}:{line}:{col}: color component outside [0, 1]; stored as given."
        ));
    }
    Ok(color)
}

fn parse_color_rgba(lexer: &mut Lexer<'_>, uri: &str) -> Result<Vector4<f32>, SceneError> {
    let (line, col) = lexer.location();
    let color = Vector4::new(
        parse_f32(lexer, uri)?,
        parse_f32(lexer, uri)?,
        parse_f32(lexer, uri)?,
        parse_f32(lexer, uri)?,
    );
    if color.iter().any(|c| !(0.0..=1.0).contains(c)) {
        Log::warn(format!(
            "{uri}:{line}:{col}: color component outside [0, 1]; stored as given."
        ));
    }
    Ok(color)
}

const AXIS_EPSILON: f32 = 1e-6;

fn parse_rotation(lexer: &mut Lexer<'_>, uri: &str) -> Result<Rotation, SceneError> {
    let (line, col) = lexer.location();
    let axis = parse_vec3f(lexer, uri)?;
    let angle = parse_f32(lexer, uri)?;
    let len = axis.norm();
    if len < AXIS_EPSILON {
        Log::warn(format!(
            "{uri}:{line}:{col}: rotation axis has zero length; using (0, 1, 0)."
        ));
        return Ok(Rotation::new(Vector3::new(0.0, 1.0, 0.0), angle));
    }
    if (len - 1.0).abs() > AXIS_EPSILON {
        Log::warn(format!(
            "{uri}:{line}:{col}: rotation axis is not unit length; normalizing."
        ));
        return Ok(Rotation::new(axis.scale(1.0 / len), angle));
    }
    Ok(Rotation::new(axis, angle))
}

fn parse_image(lexer: &mut Lexer<'_>, uri: &str) -> Result<SfImage, SceneError> {
    let (line, col) = lexer.location();
    let width = parse_i32(lexer, uri)?;
    let height = parse_i32(lexer, uri)?;
    let components = parse_i32(lexer, uri)?;
    if width < 0 || height < 0 || !(0..=4).contains(&components) {
        return Err(err_at(uri, line, col, "malformed SFImage header"));
    }
    let pixel_count = width as usize * height as usize;
    let mut pixels = Vec::with_capacity(pixel_count * components as usize);
    for _ in 0..pixel_count {
        let packed = parse_i32(lexer, uri)? as u32;
        for component in (0..components as u32).rev() {
            pixels.push(((packed >> (component * 8)) & 0xFF) as u8);
        }
    }
    Ok(SfImage {
        width: width as u32,
        height: height as u32,
        components: components as u32,
        pixels,
    })
}

/// Parses a sequence of `parse_one` items: either a bracketed list or a
/// single bare value.
fn parse_seq<T>(
    lexer: &mut Lexer<'_>,
    uri: &str,
    mut parse_one: impl FnMut(&mut Lexer<'_>, &str) -> Result<T, SceneError>,
) -> Result<Vec<T>, SceneError> {
    let mut values = Vec::new();
    if peek_token(lexer, uri)?.kind == TokenKind::LBracket {
        next_token(lexer, uri)?;
        loop {
            let token = peek_token(lexer, uri)?;
            match token.kind {
                TokenKind::RBracket => {
                    next_token(lexer, uri)?;
                    break;
                }
                TokenKind::Eof => {
                    return Err(err_at(uri, token.line, token.col, "unterminated value list"));
                }
                _ => values.push(parse_one(lexer, uri)?),
            }
        }
    } else {
        values.push(parse_one(lexer, uri)?);
    }
    Ok(values)
}

/// Parses a value of any non-node kind. Node kinds need the full parser and
/// are dispatched before this point.
pub(crate) fn parse_value(
    kind: FieldKind,
    lexer: &mut Lexer<'_>,
    uri: &str,
) -> Result<FieldValue, SceneError> {
    debug_assert!(!kind.is_node());
    Ok(match kind {
        FieldKind::SFBool => FieldValue::SfBool(parse_bool(lexer, uri)?),
        FieldKind::SFInt32 => FieldValue::SfInt32(parse_i32(lexer, uri)?),
        FieldKind::SFFloat => FieldValue::SfFloat(parse_f32(lexer, uri)?),
        FieldKind::SFDouble => FieldValue::SfDouble(parse_f64(lexer, uri)?),
        FieldKind::SFTime => FieldValue::SfTime(parse_f64(lexer, uri)?),
        FieldKind::SFString => FieldValue::SfString(parse_string(lexer, uri)?),
        FieldKind::SFColor => FieldValue::SfColor(parse_color(lexer, uri)?),
        FieldKind::SFColorRGBA => FieldValue::SfColorRgba(parse_color_rgba(lexer, uri)?),
        FieldKind::SFVec2f => FieldValue::SfVec2f(parse_vec2f(lexer, uri)?),
        FieldKind::SFVec3f => FieldValue::SfVec3f(parse_vec3f(lexer, uri)?),
        FieldKind::SFVec2d => FieldValue::SfVec2d(parse_vec2d(lexer, uri)?),
        FieldKind::SFVec3d => FieldValue::SfVec3d(parse_vec3d(lexer, uri)?),
        FieldKind::SFRotation => FieldValue::SfRotation(parse_rotation(lexer, uri)?),
        FieldKind::SFImage => FieldValue::SfImage(parse_image(lexer, uri)?),
        FieldKind::MFBool => FieldValue::MfBool(parse_seq(lexer, uri, parse_bool)?),
        FieldKind::MFInt32 => FieldValue::MfInt32(parse_seq(lexer, uri, parse_i32)?),
        FieldKind::MFFloat => FieldValue::MfFloat(parse_seq(lexer, uri, parse_f32)?),
        FieldKind::MFDouble => FieldValue::MfDouble(parse_seq(lexer, uri, parse_f64)?),
        FieldKind::MFTime => FieldValue::MfTime(parse_seq(lexer, uri, parse_f64)?),
        FieldKind::MFString => FieldValue::MfString(parse_seq(lexer, uri, parse_string)?),
        FieldKind::MFColor => FieldValue::MfColor(parse_seq(lexer, uri, parse_color)?),
        FieldKind::MFColorRGBA => {
            FieldValue::MfColorRgba(parse_seq(lexer, uri, parse_color_rgba)?)
        }
        FieldKind::MFVec2f => FieldValue::MfVec2f(parse_seq(lexer, uri, parse_vec2f)?),
        FieldKind::MFVec3f => FieldValue::MfVec3f(parse_seq(lexer, uri, parse_vec3f)?),
        FieldKind::MFVec2d => FieldValue::MfVec2d(parse_seq(lexer, uri, parse_vec2d)?),
        FieldKind::MFVec3d => FieldValue::MfVec3d(parse_seq(lexer, uri, parse_vec3d)?),
        FieldKind::MFRotation => FieldValue::MfRotation(parse_seq(lexer, uri, parse_rotation)?),
        FieldKind::SFNode | FieldKind::MFNode => unreachable!("node values use the node parser"),
    })
}

#[cfg(test)]
mod test {
    use super::parse_value;
    use crate::{
        field::{FieldKind, FieldValue},
        parser::lexer::Lexer,
    };
    use nalgebra::Vector3;

    fn parse(kind: FieldKind, source: &str) -> FieldValue {
        let mut lexer = Lexer::new(source.as_bytes());
        parse_value(kind, &mut lexer, "test.wrl").unwrap()
    }

    #[test]
    fn scalar_values() {
        assert_eq!(parse(FieldKind::SFBool, "TRUE"), FieldValue::SfBool(true));
        assert_eq!(parse(FieldKind::SFInt32, "0xFF"), FieldValue::SfInt32(255));
        assert_eq!(parse(FieldKind::SFFloat, "-2.5"), FieldValue::SfFloat(-2.5));
        assert_eq!(
            parse(FieldKind::SFVec3f, "1 2 3"),
            FieldValue::SfVec3f(Vector3::new(1.0, 2.0, 3.0))
        );
    }

    #[test]
    fn sequences_with_and_without_brackets() {
        assert_eq!(
            parse(FieldKind::MFFloat, "[0, 0.5, 1]"),
            FieldValue::MfFloat(vec![0.0, 0.5, 1.0])
        );
        assert_eq!(
            parse(FieldKind::MFFloat, "0.25"),
            FieldValue::MfFloat(vec![0.25])
        );
        assert_eq!(parse(FieldKind::MFFloat, "[]"), FieldValue::MfFloat(vec![]));
    }

    #[test]
    fn rotation_axis_is_normalized() {
        let FieldValue::SfRotation(rotation) = parse(FieldKind::SFRotation, "0 2 0 1.5") else {
            panic!("wrong kind");
        };
        assert!((rotation.axis.norm() - 1.0).abs() < 1e-6);
        assert_eq!(rotation.angle, 1.5);
    }

    #[test]
    fn zero_axis_falls_back_to_y() {
        let FieldValue::SfRotation(rotation) = parse(FieldKind::SFRotation, "0 0 0 1") else {
            panic!("wrong kind");
        };
        assert_eq!(rotation.axis, Vector3::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn image_round_trip_bytes() {
        let FieldValue::SfImage(image) = parse(FieldKind::SFImage, "2 1 2 0xFF00 0x1234") else {
            panic!("wrong kind");
        };
        assert_eq!(image.pixels, vec![0xFF, 0x00, 0x12, 0x34]);
    }

    #[test]
    fn malformed_number_is_positioned() {
        let mut lexer = Lexer::new(b"\n  notanumber");
        let err = super::parse_value(FieldKind::SFFloat, &mut lexer, "x.wrl").unwrap_err();
        match err {
            crate::error::SceneError::InvalidScene { line, col, .. } => {
                assert_eq!((line, col), (2, 3));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}

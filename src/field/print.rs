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

//! Textual output of values and node graphs in the compact dialect. Printing
//! then re-parsing a graph yields a structurally equal graph, which is what
//! the round-trip tests lean on.

use super::{FieldValue, Rotation, SfImage};
use crate::node::Node;
use fxhash::FxHashMap;
use nalgebra::{Vector2, Vector3, Vector4};
use std::fmt::{self, Write};

/// Tracks shared nodes across one print pass so a node DEF'd once prints as
/// `USE name` on later encounters.
#[derive(Default)]
pub struct PrintState {
    printed: FxHashMap<usize, String>,
    indent: usize,
}

impl PrintState {
    fn pad(&self, out: &mut dyn Write) -> fmt::Result {
        for _ in 0..self.indent {
            out.write_str("  ")?;
        }
        Ok(())
    }
}

/// Prints a whole scene: root nodes first, then the ROUTE statements between
/// named nodes.
pub fn print_scene(roots: &[Node], out: &mut dyn Write) -> fmt::Result {
    let mut state = PrintState::default();
    for root in roots {
        print_node(root, out, &mut state)?;
        out.write_char('\n')?;
    }
    let mut seen = Vec::new();
    for root in roots {
        print_routes(root, out, &mut seen)?;
    }
    Ok(())
}

fn print_routes(node: &Node, out: &mut dyn Write, seen: &mut Vec<usize>) -> fmt::Result {
    let key = node.instance_id();
    if seen.contains(&key) {
        return Ok(());
    }
    seen.push(key);

    if let Some(src_name) = node.name() {
        for (event_out, target, event_in) in node.outgoing_routes() {
            if let Some(dst_name) = target.name() {
                writeln!(out, "ROUTE {src_name}.{event_out} TO {dst_name}.{event_in}")?;
            }
        }
    }
    for child in node.child_nodes() {
        print_routes(&child, out, seen)?;
    }
    Ok(())
}

pub fn print_node(node: &Node, out: &mut dyn Write, state: &mut PrintState) -> fmt::Result {
    let key = node.instance_id();
    if let Some(name) = state.printed.get(&key) {
        return write!(out, "USE {name}");
    }

    if let Some(name) = node.name() {
        state.printed.insert(key, name.clone());
        write!(out, "DEF {name} ")?;
    }
    write!(out, "{} {{", node.node_type().local_id())?;

    let non_default = node.non_default_fields();
    if non_default.is_empty() {
        return out.write_str(" }");
    }
    out.write_char('\n')?;
    state.indent += 1;
    for (id, value) in &non_default {
        state.pad(out)?;
        write!(out, "{id} ")?;
        print_value(value, out, state)?;
        out.write_char('\n')?;
    }
    state.indent -= 1;
    state.pad(out)?;
    out.write_char('}')
}

pub fn print_value(
    value: &FieldValue,
    out: &mut dyn Write,
    state: &mut PrintState,
) -> fmt::Result {
    match value {
        FieldValue::SfBool(v) => out.write_str(if *v { "TRUE" } else { "FALSE" }),
        FieldValue::SfInt32(v) => write!(out, "{v}"),
        FieldValue::SfFloat(v) => write!(out, "{v}"),
        FieldValue::SfDouble(v) => write!(out, "{v}"),
        FieldValue::SfTime(v) => write!(out, "{v}"),
        FieldValue::SfString(v) => print_string(v, out),
        FieldValue::SfColor(v) => print_vec3(v, out),
        FieldValue::SfColorRgba(v) => print_vec4(v, out),
        FieldValue::SfVec2f(v) => print_vec2(v, out),
        FieldValue::SfVec3f(v) => print_vec3(v, out),
        FieldValue::SfVec2d(v) => write!(out, "{} {}", v.x, v.y),
        FieldValue::SfVec3d(v) => write!(out, "{} {} {}", v.x, v.y, v.z),
        FieldValue::SfRotation(v) => print_rotation(v, out),
        FieldValue::SfNode(v) => match v {
            Some(node) => print_node(node, out, state),
            None => out.write_str("NULL"),
        },
        FieldValue::SfImage(v) => print_image(v, out),
        FieldValue::MfBool(v) => {
            print_seq(v, out, |v, out| out.write_str(if *v { "TRUE" } else { "FALSE" }))
        }
        FieldValue::MfInt32(v) => print_seq(v, out, |v, out| write!(out, "{v}")),
        FieldValue::MfFloat(v) => print_seq(v, out, |v, out| write!(out, "{v}")),
        FieldValue::MfDouble(v) => print_seq(v, out, |v, out| write!(out, "{v}")),
        FieldValue::MfTime(v) => print_seq(v, out, |v, out| write!(out, "{v}")),
        FieldValue::MfString(v) => print_seq(v, out, |v, out| print_string(v, out)),
        FieldValue::MfColor(v) => print_seq(v, out, print_vec3),
        FieldValue::MfColorRgba(v) => print_seq(v, out, print_vec4),
        FieldValue::MfVec2f(v) => print_seq(v, out, print_vec2),
        FieldValue::MfVec3f(v) => print_seq(v, out, print_vec3),
        FieldValue::MfVec2d(v) => print_seq(v, out, |v, out| write!(out, "{} {}", v.x, v.y)),
        FieldValue::MfVec3d(v) => {
            print_seq(v, out, |v, out| write!(out, "{} {} {}", v.x, v.y, v.z))
        }
        FieldValue::MfRotation(v) => print_seq(v, out, print_rotation),
        FieldValue::MfNode(v) => {
            out.write_str("[ ")?;
            for (i, node) in v.iter().enumerate() {
                if i > 0 {
                    out.write_str(", ")?;
                }
                print_node(node, out, state)?;
            }
            out.write_str(" ]")
        }
    }
}

fn print_seq<T>(
    values: &[T],
    out: &mut dyn Write,
    mut print_one: impl FnMut(&T, &mut dyn Write) -> fmt::Result,
) -> fmt::Result {
    out.write_str("[ ")?;
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            out.write_str(", ")?;
        }
        print_one(v, out)?;
    }
    out.write_str(" ]")
}

fn print_vec2(v: &Vector2<f32>, out: &mut dyn Write) -> fmt::Result {
    write!(out, "{} {}", v.x, v.y)
}

fn print_vec3(v: &Vector3<f32>, out: &mut dyn Write) -> fmt::Result {
    write!(out, "{} {} {}", v.x, v.y, v.z)
}

fn print_vec4(v: &Vector4<f32>, out: &mut dyn Write) -> fmt::Result {
    write!(out, "{} {} {} {}", v.x, v.y, v.z, v.w)
}

fn print_rotation(v: &Rotation, out: &mut dyn Write) -> fmt::Result {
    write!(out, "{} {} {} {}", v.axis.x, v.axis.y, v.axis.z, v.angle)
}

fn print_string(v: &str, out: &mut dyn Write) -> fmt::Result {
    out.write_char('"')?;
    for ch in v.chars() {
        if ch == '"' || ch == '\\' {
            out.write_char('\\')?;
        }
        out.write_char(ch)?;
    }
    out.write_char('"')
}

fn print_image(v: &SfImage, out: &mut dyn Write) -> fmt::Result {
    write!(out, "{} {} {}", v.width, v.height, v.components)?;
    for pixel in v.pixels.chunks(v.components.max(1) as usize) {
        let mut packed: u32 = 0;
        for byte in pixel {
            packed = (packed << 8) | u32::from(*byte);
        }
        write!(out, " 0x{packed:X}")?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::{print_value, PrintState};
    use crate::field::{FieldValue, Rotation, SfImage};
    use nalgebra::Vector3;

    fn printed(value: &FieldValue) -> String {
        let mut out = String::new();
        print_value(value, &mut out, &mut PrintState::default()).unwrap();
        out
    }

    #[test]
    fn scalars() {
        assert_eq!(printed(&FieldValue::SfBool(true)), "TRUE");
        assert_eq!(printed(&FieldValue::SfInt32(-3)), "-3");
        assert_eq!(printed(&FieldValue::SfFloat(0.5)), "0.5");
        assert_eq!(
            printed(&FieldValue::SfVec3f(Vector3::new(1.0, 2.0, 3.0))),
            "1 2 3"
        );
    }

    #[test]
    fn strings_escape_quotes_and_backslashes() {
        assert_eq!(
            printed(&FieldValue::SfString("a\"b\\c".to_owned())),
            r#""a\"b\\c""#
        );
    }

    #[test]
    fn rotation_prints_axis_then_angle() {
        let rotation = Rotation::new(Vector3::new(0.0, 1.0, 0.0), 1.5);
        assert_eq!(printed(&FieldValue::SfRotation(rotation)), "0 1 0 1.5");
    }

    #[test]
    fn sequences_are_bracketed() {
        assert_eq!(
            printed(&FieldValue::MfFloat(vec![0.0, 0.5, 1.0])),
            "[ 0, 0.5, 1 ]"
        );
        assert_eq!(printed(&FieldValue::MfNode(Vec::new())), "[  ]");
    }

    #[test]
    fn image_packs_pixel_bytes() {
        let image = SfImage {
            width: 2,
            height: 1,
            components: 2,
            pixels: vec![0xff, 0x00, 0x12, 0x34],
        };
        assert_eq!(printed(&FieldValue::SfImage(image)), "2 1 2 0xFF00 0x1234");
    }
}

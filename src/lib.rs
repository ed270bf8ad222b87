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

//! Welt is a runtime engine for declarative 3D scene worlds written in the
//! VRML97 and X3D-classic text dialects. It parses world files into a typed
//! node graph, wires event routes between node interfaces, and advances the
//! graph through simulated time; rendering happens behind an abstract
//! [`viewer::Viewer`] a front-end implements.
//!
//! The usual round trip:
//!
//! ```no_run
//! use welt::engine::Engine;
//!
//! let mut engine = Engine::new().unwrap();
//! engine.load("file:///worlds/town.wrl", 0.0).unwrap();
//! engine.update(0.016);
//! // engine.render(&mut my_viewer, 0.016);
//! ```

pub mod component;
pub mod engine;
pub mod error;
pub mod event;
pub mod field;
pub mod node;
pub mod parser;
pub mod proto;
pub mod scope;
pub mod viewer;
pub mod vrml97;

pub use welt_core as core;
pub use welt_math as math;

pub use engine::Engine;
pub use error::SceneError;
pub use parser::{parse_scene, ParseOutput, SceneContext};

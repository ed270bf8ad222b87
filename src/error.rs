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

//! All possible errors that can happen in the engine.

use crate::field::FieldKind;
use std::fmt::{Display, Formatter};
use welt_core::io::FileError;

/// See module docs.
#[derive(Debug)]
pub enum SceneError {
    /// A scene file failed to parse. Carries the source position of the
    /// offending construct.
    InvalidScene {
        uri: String,
        line: u32,
        col: u32,
        message: String,
    },
    /// The supplied media-type hint selects neither dialect.
    BadMediaType { media_type: String },
    /// A malformed URL in an EXTERNPROTO or resource reference.
    InvalidUrl { raw: String },
    /// A scene tried to declare an interface (or a node-type) a metatype does
    /// not support.
    UnsupportedInterface { node_type: String, requested: String },
    /// A profile wanted a component level the registry cannot satisfy.
    UnsupportedComponentLevel { component: String, level: u32 },
    /// An external fetch failed.
    ResourceUnavailable { url: String, reason: String },
    /// A value of one kind was assigned or routed to a slot of another kind.
    FieldKindMismatch { expected: FieldKind, got: FieldKind },
    /// Fatal stream failure underneath the parser.
    Io(FileError),
}

impl std::error::Error for SceneError {}

impl Display for SceneError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SceneError::InvalidScene {
                uri,
                line,
                col,
                message,
            } => {
                write!(f, "{uri}:{line}:{col}: {message}")
            }
            SceneError::BadMediaType { media_type } => {
                write!(f, "unsupported media type: {media_type}")
            }
            SceneError::InvalidUrl { raw } => write!(f, "invalid URL: {raw:?}"),
            SceneError::UnsupportedInterface {
                node_type,
                requested,
            } => {
                write!(f, "node type {node_type} does not support {requested}")
            }
            SceneError::UnsupportedComponentLevel { component, level } => {
                write!(f, "component {component} does not support level {level}")
            }
            SceneError::ResourceUnavailable { url, reason } => {
                write!(f, "resource {url} is unavailable: {reason}")
            }
            SceneError::FieldKindMismatch { expected, got } => {
                write!(f, "field kind mismatch: expected {expected}, got {got}")
            }
            SceneError::Io(e) => Display::fmt(e, f),
        }
    }
}

impl From<FileError> for SceneError {
    fn from(e: FileError) -> Self {
        Self::Io(e)
    }
}

impl From<welt_core::uri::InvalidUri> for SceneError {
    fn from(e: welt_core::uri::InvalidUri) -> Self {
        Self::InvalidUrl { raw: e.raw }
    }
}

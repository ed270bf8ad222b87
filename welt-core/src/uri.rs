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

//! URI split/resolve for scene resources. Covers the subset of RFC 3986 the
//! scene formats exercise: scheme/authority/path/query/fragment splitting and
//! relative-reference resolution with dot-segment removal.

use std::fmt::{Display, Formatter};

/// Base URIs starting with this prefix mean "the stream handed to the parser
/// has no real URI"; relative references against such a base fall back to the
/// world URL, or to a file URL for the current directory if no world is set.
pub const ANONYMOUS_STREAM_ID_PREFIX: &str = "urn:X-welt:stream:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidUri {
    pub raw: String,
}

impl std::error::Error for InvalidUri {}

impl Display for InvalidUri {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid URI: {:?}", self.raw)
    }
}

/// A parsed URI reference. Components keep their raw spelling; `scheme` and
/// `authority` are `None` for relative references.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Uri {
    pub scheme: Option<String>,
    pub authority: Option<String>,
    pub path: String,
    pub query: Option<String>,
    pub fragment: Option<String>,
}

impl Uri {
    /// Splits a URI reference into components. Rejects empty input and
    /// schemes that do not start with a letter.
    pub fn parse(raw: &str) -> Result<Self, InvalidUri> {
        if raw.is_empty() {
            return Err(InvalidUri {
                raw: raw.to_owned(),
            });
        }

        let mut rest = raw;
        let mut uri = Uri::default();

        if let Some((head, tail)) = rest.split_once('#') {
            uri.fragment = Some(tail.to_owned());
            rest = head;
        }
        if let Some((head, tail)) = rest.split_once('?') {
            uri.query = Some(tail.to_owned());
            rest = head;
        }

        // A scheme is everything before the first ':' provided it looks like
        // one; otherwise the ':' belongs to the path (e.g. "./a:b").
        if let Some(colon) = rest.find(':') {
            let candidate = &rest[..colon];
            let looks_like_scheme = candidate
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic())
                && candidate
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
            if looks_like_scheme && !rest[..colon].contains('/') {
                uri.scheme = Some(candidate.to_ascii_lowercase());
                rest = &rest[colon + 1..];
            }
        }

        if let Some(tail) = rest.strip_prefix("//") {
            let end = tail.find('/').unwrap_or(tail.len());
            uri.authority = Some(tail[..end].to_owned());
            rest = &tail[end..];
        }

        uri.path = rest.to_owned();

        if uri.scheme.is_none() && uri.authority.is_none() && uri.path.is_empty() {
            return Err(InvalidUri {
                raw: raw.to_owned(),
            });
        }

        Ok(uri)
    }

    /// True for references with no scheme, which must be resolved against a
    /// base URI before use.
    pub fn is_relative(&self) -> bool {
        self.scheme.is_none()
    }

    /// True for the synthetic "anonymous stream" identifiers the engine
    /// assigns to streams without a real URI.
    pub fn is_anonymous_stream(&self) -> bool {
        self.to_string().starts_with(ANONYMOUS_STREAM_ID_PREFIX)
    }

    /// RFC 3986 §5.2 reference resolution against `base`.
    pub fn resolve_against(&self, base: &Uri) -> Uri {
        if !self.is_relative() {
            return self.clone();
        }

        let mut target = Uri {
            scheme: base.scheme.clone(),
            ..Default::default()
        };

        if self.authority.is_some() {
            target.authority = self.authority.clone();
            target.path = remove_dot_segments(&self.path);
            target.query = self.query.clone();
        } else {
            target.authority = base.authority.clone();
            if self.path.is_empty() {
                target.path = base.path.clone();
                target.query = self.query.clone().or_else(|| base.query.clone());
            } else if self.path.starts_with('/') {
                target.path = remove_dot_segments(&self.path);
                target.query = self.query.clone();
            } else {
                target.path = remove_dot_segments(&merge_paths(base, &self.path));
                target.query = self.query.clone();
            }
        }
        target.fragment = self.fragment.clone();
        target
    }
}

impl Display for Uri {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if let Some(scheme) = &self.scheme {
            write!(f, "{scheme}:")?;
        }
        if let Some(authority) = &self.authority {
            write!(f, "//{authority}")?;
        }
        write!(f, "{}", self.path)?;
        if let Some(query) = &self.query {
            write!(f, "?{query}")?;
        }
        if let Some(fragment) = &self.fragment {
            write!(f, "#{fragment}")?;
        }
        Ok(())
    }
}

fn merge_paths(base: &Uri, reference: &str) -> String {
    if base.authority.is_some() && base.path.is_empty() {
        return format!("/{reference}");
    }
    match base.path.rfind('/') {
        Some(slash) => format!("{}{}", &base.path[..=slash], reference),
        None => reference.to_owned(),
    }
}

fn remove_dot_segments(path: &str) -> String {
    let mut output: Vec<&str> = Vec::new();
    let absolute = path.starts_with('/');
    let trailing_slash = path.ends_with('/') || path.ends_with("/.") || path.ends_with("/..");

    for segment in path.split('/') {
        match segment {
            "." | "" => {}
            ".." => {
                output.pop();
            }
            other => output.push(other),
        }
    }

    let mut result = String::new();
    if absolute {
        result.push('/');
    }
    result.push_str(&output.join("/"));
    if trailing_slash && !result.ends_with('/') {
        result.push('/');
    }
    result
}

/// A `file://` URL for the given filesystem path; an empty path means the
/// process's current directory.
pub fn create_file_url(path: &str) -> Uri {
    let path = if path.is_empty() {
        std::env::current_dir()
            .map(|dir| format!("{}/", dir.display()))
            .unwrap_or_else(|_| "/".to_owned())
    } else {
        path.to_owned()
    };
    Uri {
        scheme: Some("file".to_owned()),
        authority: Some(String::new()),
        path: if path.starts_with('/') {
            path
        } else {
            format!("/{path}")
        },
        query: None,
        fragment: None,
    }
}

/// Picks the effective base for relative resolution: the stream's own URI
/// unless it is anonymous, in which case the world URL, and failing that a
/// file URL for the current directory.
pub fn effective_base(stream_uri: &Uri, world_url: &str) -> Uri {
    if !stream_uri.is_anonymous_stream() {
        return stream_uri.clone();
    }
    if world_url.is_empty() {
        create_file_url("")
    } else {
        Uri::parse(world_url).unwrap_or_else(|_| create_file_url(""))
    }
}

#[cfg(test)]
mod test {
    use super::{create_file_url, Uri};

    #[test]
    fn split_components() {
        let uri = Uri::parse("http://example.com/worlds/town.wrl?lod=2#entry").unwrap();
        assert_eq!(uri.scheme.as_deref(), Some("http"));
        assert_eq!(uri.authority.as_deref(), Some("example.com"));
        assert_eq!(uri.path, "/worlds/town.wrl");
        assert_eq!(uri.query.as_deref(), Some("lod=2"));
        assert_eq!(uri.fragment.as_deref(), Some("entry"));
    }

    #[test]
    fn resolve_relative_reference() {
        let base = Uri::parse("http://example.com/worlds/town.wrl").unwrap();
        let reference = Uri::parse("props/lamp.wrl").unwrap();
        assert_eq!(
            reference.resolve_against(&base).to_string(),
            "http://example.com/worlds/props/lamp.wrl"
        );
    }

    #[test]
    fn resolve_dot_segments() {
        let base = Uri::parse("http://example.com/a/b/c.wrl").unwrap();
        let reference = Uri::parse("../d.wrl").unwrap();
        assert_eq!(
            reference.resolve_against(&base).to_string(),
            "http://example.com/a/d.wrl"
        );
    }

    #[test]
    fn absolute_reference_wins() {
        let base = Uri::parse("http://example.com/a.wrl").unwrap();
        let reference = Uri::parse("file:///tmp/b.wrl").unwrap();
        assert_eq!(reference.resolve_against(&base), reference);
    }

    #[test]
    fn file_url_for_explicit_path() {
        assert_eq!(
            create_file_url("/tmp/x.wrl").to_string(),
            "file:///tmp/x.wrl"
        );
    }

    #[test]
    fn urn_is_not_relative() {
        let uri = Uri::parse("urn:X-welt:node:TimeSensor").unwrap();
        assert!(!uri.is_relative());
        assert_eq!(uri.to_string(), "urn:X-welt:node:TimeSensor");
    }
}

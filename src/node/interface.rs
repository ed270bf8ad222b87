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

//! The set of named, typed, directional endpoints a node-type exposes.

use crate::field::{FieldKind, FieldValue};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use strum_macros::{AsRefStr, EnumString};

/// Access kind of an interface. Names match the compact dialect's spelling;
/// the extended dialect maps inputOnly/outputOnly/initializeOnly/inputOutput
/// onto the same four kinds.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, AsRefStr, EnumString)]
pub enum InterfaceAccess {
    #[strum(serialize = "eventIn")]
    EventIn,
    #[strum(serialize = "eventOut")]
    EventOut,
    #[strum(serialize = "field")]
    Field,
    #[strum(serialize = "exposedField")]
    ExposedField,
}

impl Display for InterfaceAccess {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_ref())
    }
}

impl InterfaceAccess {
    /// The extended dialect's keyword for this access kind.
    pub fn extended_keyword(self) -> &'static str {
        match self {
            InterfaceAccess::EventIn => "inputOnly",
            InterfaceAccess::EventOut => "outputOnly",
            InterfaceAccess::Field => "initializeOnly",
            InterfaceAccess::ExposedField => "inputOutput",
        }
    }

    pub fn from_extended_keyword(kw: &str) -> Option<Self> {
        match kw {
            "inputOnly" => Some(InterfaceAccess::EventIn),
            "outputOnly" => Some(InterfaceAccess::EventOut),
            "initializeOnly" => Some(InterfaceAccess::Field),
            "inputOutput" => Some(InterfaceAccess::ExposedField),
            _ => None,
        }
    }

    /// True if events can be sent to this interface from outside the node.
    pub fn accepts_events(self) -> bool {
        matches!(self, InterfaceAccess::EventIn | InterfaceAccess::ExposedField)
    }

    /// True if this interface produces observable events.
    pub fn emits_events(self) -> bool {
        matches!(self, InterfaceAccess::EventOut | InterfaceAccess::ExposedField)
    }

    /// True if this interface carries per-node storage.
    pub fn has_storage(self) -> bool {
        // Event-outs keep their last emitted value so exposed fields and
        // plain fields are not special-cased anywhere else.
        !matches!(self, InterfaceAccess::EventIn)
    }
}

/// One endpoint declaration: access kind, value kind, identifier, and the
/// default value used for unspecified fields.
#[derive(Clone, Debug, PartialEq)]
pub struct InterfaceDecl {
    pub access: InterfaceAccess,
    pub kind: FieldKind,
    pub id: String,
    pub default: FieldValue,
}

impl InterfaceDecl {
    pub fn new(access: InterfaceAccess, kind: FieldKind, id: impl Into<String>) -> Self {
        Self {
            access,
            kind,
            id: id.into(),
            default: FieldValue::default_of(kind),
        }
    }

    pub fn with_default(mut self, default: FieldValue) -> Self {
        debug_assert_eq!(default.kind(), self.kind);
        self.default = default;
        self
    }
}

/// An interface set, ordered by identifier for deterministic printing and
/// enumeration. The `set_`/`_changed` aliases of exposed fields are not
/// stored; lookups resolve them with a second try after stripping the
/// prefix/suffix.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InterfaceSet {
    decls: BTreeMap<String, InterfaceDecl>,
}

impl InterfaceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, decl: InterfaceDecl) -> &mut Self {
        self.decls.insert(decl.id.clone(), decl);
        self
    }

    pub fn with(mut self, decl: InterfaceDecl) -> Self {
        self.add(decl);
        self
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &InterfaceDecl> {
        self.decls.values()
    }

    /// Exact lookup by identifier, no alias handling.
    pub fn find(&self, id: &str) -> Option<&InterfaceDecl> {
        self.decls.get(id)
    }

    /// Resolves an identifier used as an event target. The bare identifier
    /// and the `set_`-prefixed form must resolve to the same interface, so
    /// after an exact miss the lookup retries with the prefix stripped and
    /// then with the prefix added.
    pub fn find_event_in(&self, id: &str) -> Option<&InterfaceDecl> {
        let exact = self
            .decls
            .get(id)
            .filter(|decl| decl.access.accepts_events());
        if exact.is_some() {
            return exact;
        }
        let retry = match id.strip_prefix("set_") {
            Some(stripped) => self.decls.get(stripped),
            None => self.decls.get(&format!("set_{id}")),
        };
        retry.filter(|decl| decl.access.accepts_events())
    }

    /// Resolves an identifier used as an event source; the `_changed` suffix
    /// is handled the same way as `set_` on event-ins.
    pub fn find_event_out(&self, id: &str) -> Option<&InterfaceDecl> {
        let exact = self
            .decls
            .get(id)
            .filter(|decl| decl.access.emits_events());
        if exact.is_some() {
            return exact;
        }
        let retry = match id.strip_suffix("_changed") {
            Some(stripped) => self.decls.get(stripped),
            None => self.decls.get(&format!("{id}_changed")),
        };
        retry.filter(|decl| decl.access.emits_events())
    }

    /// The canonical emitter name for an event-out reference: the declared
    /// identifier for an event-out, `<id>_changed` for an exposed field.
    pub fn emitter_id(decl: &InterfaceDecl) -> String {
        match decl.access {
            InterfaceAccess::ExposedField => format!("{}_changed", decl.id),
            _ => decl.id.clone(),
        }
    }

    /// True if both sets declare structurally identical interfaces.
    pub fn same_shape(&self, other: &InterfaceSet) -> bool {
        self.decls.len() == other.decls.len()
            && self.decls.iter().zip(other.decls.iter()).all(|(a, b)| {
                a.0 == b.0
                    && a.1.access == b.1.access
                    && a.1.kind == b.1.kind
            })
    }
}

/// Parses a field-kind name in either dialect's spelling.
pub fn parse_field_kind(name: &str) -> Option<FieldKind> {
    FieldKind::from_str(name).ok()
}

#[cfg(test)]
mod test {
    use super::{InterfaceAccess, InterfaceDecl, InterfaceSet};
    use crate::field::FieldKind;

    fn sample() -> InterfaceSet {
        InterfaceSet::new()
            .with(InterfaceDecl::new(
                InterfaceAccess::ExposedField,
                FieldKind::SFVec3f,
                "translation",
            ))
            .with(InterfaceDecl::new(
                InterfaceAccess::EventIn,
                FieldKind::SFBool,
                "set_bind",
            ))
            .with(InterfaceDecl::new(
                InterfaceAccess::EventOut,
                FieldKind::SFTime,
                "cycleTime",
            ))
            .with(InterfaceDecl::new(
                InterfaceAccess::Field,
                FieldKind::SFFloat,
                "size",
            ))
    }

    #[test]
    fn exposed_field_resolves_under_both_event_names() {
        let set = sample();
        let direct = set.find_event_in("translation").unwrap();
        let prefixed = set.find_event_in("set_translation").unwrap();
        assert_eq!(direct.id, prefixed.id);

        let direct = set.find_event_out("translation").unwrap();
        let suffixed = set.find_event_out("translation_changed").unwrap();
        assert_eq!(direct.id, suffixed.id);
    }

    #[test]
    fn plain_field_is_not_an_event_target() {
        let set = sample();
        assert!(set.find_event_in("size").is_none());
        assert!(set.find_event_out("size").is_none());
    }

    #[test]
    fn declared_prefix_resolves_from_the_bare_name_too() {
        let set = sample();
        assert!(set.find_event_in("set_bind").is_some());
        assert_eq!(set.find_event_in("bind").unwrap().id, "set_bind");
    }

    #[test]
    fn iteration_is_ordered_by_identifier() {
        let set = sample();
        let ids: Vec<_> = set.iter().map(|decl| decl.id.as_str()).collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        assert_eq!(ids, sorted);
    }
}

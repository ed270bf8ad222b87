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

//! Routes: wires from an event-out to an event-in. A route lives on both
//! endpoints (the source's listener set, the target's reverse index) so
//! either direction resolves in O(1) of that node's own routes.

use crate::{
    error::SceneError,
    event::emitter::RouteListener,
    node::{interface::InterfaceSet, Node, WeakNode},
};

/// The reverse index entry a target node keeps for each inbound route.
pub struct RouteRecord {
    pub from: WeakNode,
    /// Canonical emitter id on the source.
    pub event_out: String,
    /// Canonical event-in id on the target.
    pub event_in: String,
}

/// Installs a route. Endpoint identifiers may use either the declared or
/// aliased (`set_`/`_changed`) spelling; the value kinds must match.
/// Installing an already-present route is a no-op; `Ok(false)` reports it.
pub fn add_route(
    source: &Node,
    event_out: &str,
    target: &Node,
    event_in: &str,
) -> Result<bool, SceneError> {
    let source_type = source.node_type();
    let out_decl = source_type
        .interfaces()
        .find_event_out(event_out)
        .ok_or_else(|| SceneError::UnsupportedInterface {
            node_type: source_type.local_id().to_owned(),
            requested: event_out.to_owned(),
        })?;
    let target_type = target.node_type();
    let in_decl = target_type
        .interfaces()
        .find_event_in(event_in)
        .ok_or_else(|| SceneError::UnsupportedInterface {
            node_type: target_type.local_id().to_owned(),
            requested: event_in.to_owned(),
        })?;

    if out_decl.kind != in_decl.kind {
        return Err(SceneError::FieldKindMismatch {
            expected: in_decl.kind,
            got: out_decl.kind,
        });
    }

    let emitter_id = InterfaceSet::emitter_id(out_decl);
    let event_in = in_decl.id.clone();
    let emitter = source
        .emitter(&emitter_id)
        .ok_or_else(|| SceneError::UnsupportedInterface {
            node_type: source_type.local_id().to_owned(),
            requested: emitter_id.clone(),
        })?;

    let added = emitter.add_listener(RouteListener::Target {
        node: target.downgrade(),
        event_in: event_in.clone(),
    });
    if added {
        target.0.incoming.lock().push(RouteRecord {
            from: source.downgrade(),
            event_out: emitter_id,
            event_in,
        });
    }
    Ok(added)
}

/// Removes a route if present; identifiers may use either spelling.
pub fn remove_route(source: &Node, event_out: &str, target: &Node, event_in: &str) -> bool {
    let source_type = source.node_type();
    let Some(out_decl) = source_type.interfaces().find_event_out(event_out) else {
        return false;
    };
    let target_type = target.node_type();
    let Some(in_decl) = target_type.interfaces().find_event_in(event_in) else {
        return false;
    };
    let emitter_id = InterfaceSet::emitter_id(out_decl);
    let Some(emitter) = source.emitter(&emitter_id) else {
        return false;
    };
    let removed = emitter.remove_listener(target.instance_id(), &in_decl.id);
    if removed {
        target.0.incoming.lock().retain(|record| {
            !(record.from.points_to(source)
                && record.event_out == emitter_id
                && record.event_in == in_decl.id)
        });
    }
    removed
}

/// True if the given route is installed.
pub fn has_route(source: &Node, event_out: &str, target: &Node, event_in: &str) -> bool {
    let source_type = source.node_type();
    let Some(out_decl) = source_type.interfaces().find_event_out(event_out) else {
        return false;
    };
    let target_type = target.node_type();
    let Some(in_decl) = target_type.interfaces().find_event_in(event_in) else {
        return false;
    };
    source
        .emitter(&InterfaceSet::emitter_id(out_decl))
        .is_some_and(|emitter| emitter.has_route_to(target.instance_id(), &in_decl.id))
}

#[cfg(test)]
mod test {
    use super::{add_route, has_route, remove_route};
    use crate::{error::SceneError, node::Node, parser::test_support::TestWorld};

    fn animation_pair(world: &TestWorld) -> (Node, Node) {
        let output = world
            .parse(
                "#VRML V2.0 utf8\n\
                 DEF TS TimeSensor { }\n\
                 DEF PI PositionInterpolator { }",
            )
            .unwrap();
        (output.roots[0].clone(), output.roots[1].clone())
    }

    #[test]
    fn duplicate_installation_is_a_no_op() {
        let world = TestWorld::new();
        let (ts, pi) = animation_pair(&world);
        assert!(add_route(&ts, "fraction_changed", &pi, "set_fraction").unwrap());
        assert!(!add_route(&ts, "fraction_changed", &pi, "set_fraction").unwrap());
        assert_eq!(ts.outgoing_routes().len(), 1);
    }

    #[test]
    fn aliased_spellings_name_the_same_route() {
        let world = TestWorld::new();
        let (ts, pi) = animation_pair(&world);
        assert!(add_route(&ts, "fraction_changed", &pi, "set_fraction").unwrap());
        // "fraction" strips to the same event-out; "fraction" on the target
        // gains the set_ prefix.
        assert!(!add_route(&ts, "fraction", &pi, "fraction").unwrap());
        assert!(has_route(&ts, "fraction_changed", &pi, "set_fraction"));
    }

    #[test]
    fn kind_mismatch_is_rejected() {
        let world = TestWorld::new();
        let (ts, pi) = animation_pair(&world);
        let err = add_route(&ts, "isActive", &pi, "set_fraction").unwrap_err();
        assert!(matches!(err, SceneError::FieldKindMismatch { .. }));
    }

    #[test]
    fn removal_clears_both_directions() {
        let world = TestWorld::new();
        let (ts, pi) = animation_pair(&world);
        add_route(&ts, "fraction_changed", &pi, "set_fraction").unwrap();
        assert!(remove_route(&ts, "fraction_changed", &pi, "set_fraction"));
        assert!(!has_route(&ts, "fraction_changed", &pi, "set_fraction"));
        assert!(!remove_route(&ts, "fraction_changed", &pi, "set_fraction"));
    }

    #[test]
    fn dropping_a_node_drops_its_routes() {
        let world = TestWorld::new();
        let (ts, pi) = animation_pair(&world);
        add_route(&ts, "fraction_changed", &pi, "set_fraction").unwrap();
        drop(pi);
        // Routes hold weak endpoints; the dead listener is skipped and then
        // pruned.
        assert!(ts
            .outgoing_routes()
            .is_empty());
    }
}

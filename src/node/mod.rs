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

//! Scene graph nodes: typed field storage, modification tracking, bounding
//! volume caching, event delivery and the behavior capability set that gives
//! each node kind its semantics.

pub mod interface;
pub mod metatype;
pub mod registry;

use crate::{
    error::SceneError,
    event::{
        emitter::{EventEmitter, RouteListener},
        queue::{Event, EventQueue},
        route::RouteRecord,
    },
    field::FieldValue,
    node::{
        interface::{InterfaceAccess, InterfaceSet},
        metatype::{InitialValues, NodeType},
    },
    scope::Scope,
    viewer::{RenderContext, Viewer},
};
use fxhash::FxHashMap;
use parking_lot::Mutex;
use std::{
    any::Any,
    collections::BTreeMap,
    sync::{Arc, Weak},
};
use welt_core::log::Log;
use welt_math::bsphere::BoundingSphere;

/// Coarse classification of a node's semantics, used where the engine needs
/// to tell node families apart without downcasting.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NodeCategory {
    /// Pure field storage.
    Plain,
    /// Traverses children.
    Grouping,
    Shape,
    Geometry,
    Light,
    TimeSensor,
    Interpolator,
    Bindable(BindableStackId),
    Script,
    ProtoInstance,
    ExternProtoStub,
}

/// The four bindable-node stacks the engine maintains.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BindableStackId {
    Viewpoint,
    NavigationInfo,
    Background,
    Fog,
}

/// Side effects a behavior wants performed once the node's lock is released:
/// event-out emissions (in order), direct sends to other nodes, bindable
/// stack requests, and events to forward to the script backend.
#[derive(Default)]
pub struct NodeOutput {
    pub emits: Vec<(String, FieldValue)>,
    pub sends: Vec<(Node, String, FieldValue)>,
    pub bind: Option<(BindableStackId, bool)>,
    pub script_events: Vec<(String, FieldValue)>,
}

/// A bindable stack operation requested by an event delivery.
pub struct BindRequest {
    pub node: Node,
    pub stack: BindableStackId,
    pub bind: bool,
}

/// What an event delivery or tick asks the engine to do on its behalf, after
/// the node's own emissions went out.
#[derive(Default)]
pub struct NodeEffects {
    pub bind: Option<BindRequest>,
    /// Events a Script node wants forwarded to the script backend.
    pub script_events: Vec<(String, FieldValue)>,
}

/// The capability set every node kind implements. The default implementation
/// is plain field storage with exposed-field forwarding handled by the node
/// itself; behaviors add time-dependence, traversal, interpolation, bindable
/// semantics or PROTO redirection on top.
pub trait NodeBehavior: Send {
    fn category(&self) -> NodeCategory {
        NodeCategory::Plain
    }

    /// Called after the node's own exposed-field handling for every
    /// delivered event. `event_in` is the declared identifier.
    fn on_event(
        &mut self,
        _fields: &mut BTreeMap<String, FieldValue>,
        _event_in: &str,
        _value: &FieldValue,
        _timestamp: f64,
        _out: &mut NodeOutput,
    ) {
    }

    /// Called after a direct field write (construction-time assignment or a
    /// redirected PROTO interface write).
    fn on_set_field(&mut self, _id: &str, _value: &FieldValue) {}

    /// True for nodes that need an update callback every simulation tick.
    fn time_dependent(&self) -> bool {
        false
    }

    /// Per-tick callback for time-dependent nodes.
    fn tick(
        &mut self,
        _fields: &mut BTreeMap<String, FieldValue>,
        _now: f64,
        _out: &mut NodeOutput,
    ) {
    }

    /// Bounding volume of this node. Unbounded node kinds report the maximum
    /// volume, which is never culled.
    fn bounding_volume(&self, _fields: &BTreeMap<String, FieldValue>) -> BoundingSphere {
        BoundingSphere::maximum()
    }

    /// Drives the viewer for this node. Grouping behaviors recurse into
    /// their children from here.
    fn render(
        &self,
        _node: &Node,
        _fields: &BTreeMap<String, FieldValue>,
        _viewer: &mut dyn Viewer,
        _ctx: &mut RenderContext,
    ) {
    }

    /// Read-through hook; PROTO instances redirect IS-mapped interfaces to
    /// body storage.
    fn read_field(
        &self,
        fields: &BTreeMap<String, FieldValue>,
        id: &str,
    ) -> Option<FieldValue> {
        fields.get(id).cloned()
    }

    /// Strong node references held outside the field map (PROTO bodies).
    /// Drained during iterative destruction.
    fn take_node_refs(&mut self, _out: &mut Vec<Node>) {}

    /// Nodes owned by the behavior that engine-level walks (time-dependent
    /// registration, bindable discovery) must visit even though they are not
    /// field values. PROTO instances expose their body here.
    fn hidden_children(&self) -> Vec<Node> {
        Vec::new()
    }

    fn clone_box(&self) -> Box<dyn NodeBehavior>;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Plain field storage with no extra semantics.
#[derive(Clone, Default)]
pub struct PlainBehavior;

impl NodeBehavior for PlainBehavior {
    fn clone_box(&self) -> Box<dyn NodeBehavior> {
        Box::new(self.clone())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

pub(crate) struct NodeState {
    pub fields: BTreeMap<String, FieldValue>,
    pub modified: bool,
    pub bvolume_dirty: bool,
    bvolume_cache: BoundingSphere,
    pub behavior: Box<dyn NodeBehavior>,
}

pub(crate) struct NodeData {
    ty: NodeType,
    scope: Scope,
    name: Mutex<Option<String>>,
    pub(crate) state: Mutex<NodeState>,
    emitters: FxHashMap<String, EventEmitter>,
    pub(crate) incoming: Mutex<Vec<RouteRecord>>,
}

/// A shared handle to a scene graph node. A node is destroyed when the last
/// handle drops; destruction drains node-valued fields through an explicit
/// worklist so deep graphs cannot overflow the stack.
#[derive(Clone)]
pub struct Node(pub(crate) Arc<NodeData>);

/// A non-owning node handle. Routes and DEF-name maps hold these so cyclic
/// wiring cannot leak nodes.
#[derive(Clone)]
pub struct WeakNode(Weak<NodeData>);

#[cfg(test)]
impl WeakNode {
    pub(crate) fn dangling() -> Self {
        WeakNode(Weak::new())
    }
}

impl WeakNode {
    pub fn upgrade(&self) -> Option<Node> {
        self.0.upgrade().map(Node)
    }

    pub fn points_to(&self, node: &Node) -> bool {
        Weak::as_ptr(&self.0) == Arc::as_ptr(&node.0)
    }

    pub fn target_id(&self) -> usize {
        Weak::as_ptr(&self.0) as usize
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Node {}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("type", &self.0.ty.local_id())
            .field("name", &*self.0.name.lock())
            .finish()
    }
}

impl Node {
    /// Creates a node: builds field storage from the type's interface
    /// defaults, overlays the supplied initial values, and sets up one event
    /// emitter per event-producing interface.
    pub fn new(
        ty: NodeType,
        scope: Scope,
        behavior: Box<dyn NodeBehavior>,
        init: InitialValues,
    ) -> Result<Self, SceneError> {
        let mut fields = BTreeMap::new();
        let mut emitters = FxHashMap::default();
        for decl in ty.interfaces().iter() {
            if decl.access.has_storage() {
                fields.insert(decl.id.clone(), decl.default.clone());
            }
            if decl.access.emits_events() {
                let emitter_id = InterfaceSet::emitter_id(decl);
                emitters.insert(emitter_id.clone(), EventEmitter::new(emitter_id, decl.kind));
            }
        }

        for (id, value) in init {
            match ty.interfaces().find(&id) {
                Some(decl) if decl.access.has_storage() => {
                    if decl.kind != value.kind() {
                        return Err(SceneError::FieldKindMismatch {
                            expected: decl.kind,
                            got: value.kind(),
                        });
                    }
                    fields.insert(id, value);
                }
                _ => {
                    return Err(SceneError::UnsupportedInterface {
                        node_type: ty.local_id().to_owned(),
                        requested: id,
                    });
                }
            }
        }

        Ok(Self(Arc::new(NodeData {
            ty,
            scope,
            name: Mutex::new(None),
            state: Mutex::new(NodeState {
                fields,
                modified: true,
                bvolume_dirty: true,
                bvolume_cache: BoundingSphere::maximum(),
                behavior,
            }),
            emitters,
            incoming: Mutex::new(Vec::new()),
        })))
    }

    pub fn downgrade(&self) -> WeakNode {
        WeakNode(Arc::downgrade(&self.0))
    }

    /// A process-unique identity for this node instance.
    pub fn instance_id(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    pub fn node_type(&self) -> NodeType {
        self.0.ty.clone()
    }

    pub fn scope(&self) -> Scope {
        self.0.scope.clone()
    }

    pub fn name(&self) -> Option<String> {
        self.0.name.lock().clone()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        *self.0.name.lock() = Some(name.into());
    }

    pub fn category(&self) -> NodeCategory {
        self.0.state.lock().behavior.category()
    }

    /// True for nodes that want the per-tick update callback.
    pub fn is_time_dependent(&self) -> bool {
        self.0.state.lock().behavior.time_dependent()
    }

    pub fn is_modified(&self) -> bool {
        self.0.state.lock().modified
    }

    pub fn set_modified(&self, modified: bool) {
        self.0.state.lock().modified = modified;
    }

    /// True if this node or any node reachable through its fields carries the
    /// modified flag. Walks with an explicit worklist.
    pub fn is_modified_deep(&self) -> bool {
        let mut worklist = vec![self.clone()];
        let mut seen = Vec::new();
        while let Some(node) = worklist.pop() {
            if seen.contains(&node.instance_id()) {
                continue;
            }
            seen.push(node.instance_id());
            if node.is_modified() {
                return true;
            }
            worklist.extend(node.child_nodes());
        }
        false
    }

    /// Clears the modified flag on this node and everything below it.
    pub fn clear_modified_deep(&self) {
        let mut worklist = vec![self.clone()];
        let mut seen = Vec::new();
        while let Some(node) = worklist.pop() {
            if seen.contains(&node.instance_id()) {
                continue;
            }
            seen.push(node.instance_id());
            node.set_modified(false);
            worklist.extend(node.child_nodes());
        }
    }

    /// Reads an interface's current value through the behavior's redirect
    /// hook.
    pub fn get_field(&self, id: &str) -> Option<FieldValue> {
        let state = self.0.state.lock();
        state.behavior.read_field(&state.fields, id)
    }

    /// Writes a field directly. Only legal for interfaces with storage; the
    /// kinds must match. Used at construction time and by PROTO redirects.
    pub fn set_field(&self, id: &str, value: &FieldValue) -> Result<(), SceneError> {
        let decl = match self.0.ty.interfaces().find(id) {
            Some(decl) if decl.access.has_storage() => decl.clone(),
            _ => {
                return Err(SceneError::UnsupportedInterface {
                    node_type: self.0.ty.local_id().to_owned(),
                    requested: id.to_owned(),
                })
            }
        };
        if decl.kind != value.kind() {
            return Err(SceneError::FieldKindMismatch {
                expected: decl.kind,
                got: value.kind(),
            });
        }
        let mut state = self.0.state.lock();
        state.fields.insert(id.to_owned(), value.clone());
        state.modified = true;
        state.bvolume_dirty = true;
        state.behavior.on_set_field(id, value);
        Ok(())
    }

    /// Delivers an event to one of this node's event-ins. A reference to an
    /// unknown interface or a payload of the wrong kind logs a warning and
    /// drops the event. Returns a bindable stack request if the behavior
    /// produced one.
    pub fn deliver(
        &self,
        event_in: &str,
        value: &FieldValue,
        timestamp: f64,
        queue: &mut EventQueue,
    ) -> NodeEffects {
        let decl = match self.0.ty.interfaces().find_event_in(event_in) {
            Some(decl) => decl.clone(),
            None => {
                Log::warn(format!(
                    "Dropped event {event_in} for node type {}: no such event-in.",
                    self.0.ty.local_id()
                ));
                return NodeEffects::default();
            }
        };
        if decl.kind != value.kind() {
            Log::warn(format!(
                "Dropped event {event_in} for node type {}: expected {}, got {}.",
                self.0.ty.local_id(),
                decl.kind,
                value.kind()
            ));
            return NodeEffects::default();
        }

        let mut out = NodeOutput::default();
        let exposed = decl.access == InterfaceAccess::ExposedField;
        {
            let mut state = self.0.state.lock();
            if exposed {
                state.fields.insert(decl.id.clone(), value.clone());
                state.modified = true;
                state.bvolume_dirty = true;
            }
            let NodeState {
                fields, behavior, ..
            } = &mut *state;
            behavior.on_event(fields, &decl.id, value, timestamp, &mut out);
        }

        if exposed {
            self.emit_event(&format!("{}_changed", decl.id), value.clone(), timestamp, queue);
        }
        self.flush_output(out, timestamp, queue)
    }

    /// Runs the time-dependent update callback.
    pub fn tick(&self, now: f64, queue: &mut EventQueue) -> NodeEffects {
        let mut out = NodeOutput::default();
        {
            let mut state = self.0.state.lock();
            let NodeState {
                fields, behavior, ..
            } = &mut *state;
            behavior.tick(fields, now, &mut out);
        }
        self.flush_output(out, now, queue)
    }

    fn flush_output(
        &self,
        out: NodeOutput,
        timestamp: f64,
        queue: &mut EventQueue,
    ) -> NodeEffects {
        for (event_out, value) in out.emits {
            self.emit_event(&event_out, value, timestamp, queue);
        }
        for (target, event_in, value) in out.sends {
            queue.push(Event {
                timestamp,
                target: target.downgrade(),
                event_in,
                value,
            });
        }
        NodeEffects {
            bind: out.bind.map(|(stack, bind)| BindRequest {
                node: self.clone(),
                stack,
                bind,
            }),
            script_events: out.script_events,
        }
    }

    /// Emits a value from one of this node's event-outs: updates the
    /// event-out storage and last-emit timestamp, then queues one event per
    /// listening route. PROTO proxy listeners re-emit from the instance.
    pub fn emit_event(
        &self,
        event_out: &str,
        value: FieldValue,
        timestamp: f64,
        queue: &mut EventQueue,
    ) {
        let decl = match self.0.ty.interfaces().find_event_out(event_out) {
            Some(decl) => decl.clone(),
            None => {
                Log::warn(format!(
                    "Node type {} has no event-out {event_out}; emission dropped.",
                    self.0.ty.local_id()
                ));
                return;
            }
        };
        if decl.access.has_storage() {
            let mut state = self.0.state.lock();
            state.fields.insert(decl.id.clone(), value.clone());
        }

        let emitter_id = InterfaceSet::emitter_id(&decl);
        let Some(emitter) = self.0.emitters.get(&emitter_id) else {
            return;
        };
        emitter.set_last_time(timestamp);
        for listener in emitter.listeners() {
            match listener {
                RouteListener::Target { node, event_in } => {
                    queue.push(Event {
                        timestamp,
                        target: node,
                        event_in,
                        value: value.clone(),
                    });
                }
                RouteListener::Proxy { node, event_out } => {
                    if let Some(instance) = node.upgrade() {
                        instance.emit_event(&event_out, value.clone(), timestamp, queue);
                    }
                }
            }
        }
    }

    pub(crate) fn emitter(&self, emitter_id: &str) -> Option<&EventEmitter> {
        self.0.emitters.get(emitter_id)
    }

    /// The last timestamp at which the given event-out emitted, if ever.
    pub fn last_emit_time(&self, event_out: &str) -> Option<f64> {
        let decl = self.0.ty.interfaces().find_event_out(event_out)?;
        self.0
            .emitters
            .get(&InterfaceSet::emitter_id(decl))
            .map(|emitter| emitter.last_time())
    }

    /// Every node referenced by this node's fields, in field order.
    pub fn child_nodes(&self) -> Vec<Node> {
        let state = self.0.state.lock();
        let mut nodes = Vec::new();
        for value in state.fields.values() {
            nodes.extend(value.nodes());
        }
        nodes
    }

    /// Field children plus behavior-owned nodes (PROTO bodies). Engine walks
    /// that must reach every live node use this.
    pub fn all_children(&self) -> Vec<Node> {
        let state = self.0.state.lock();
        let mut nodes = Vec::new();
        for value in state.fields.values() {
            nodes.extend(value.nodes());
        }
        nodes.extend(state.behavior.hidden_children());
        nodes
    }

    /// Fields whose current value differs from the interface default, in
    /// identifier order. Event-out storage is excluded; it is not part of the
    /// textual form.
    pub fn non_default_fields(&self) -> Vec<(String, FieldValue)> {
        let state = self.0.state.lock();
        let mut result = Vec::new();
        for decl in self.0.ty.interfaces().iter() {
            if !matches!(
                decl.access,
                InterfaceAccess::Field | InterfaceAccess::ExposedField
            ) {
                continue;
            }
            if let Some(value) = state.fields.get(&decl.id) {
                if *value != decl.default {
                    result.push((decl.id.clone(), value.clone()));
                }
            }
        }
        result
    }

    /// The node's bounding volume, recomputed lazily when dirty. Grouping
    /// behaviors query their children here; lock order follows the tree, the
    /// parser admits no graph cycles through node-valued fields.
    pub fn bounding_volume(&self) -> BoundingSphere {
        let mut state = self.0.state.lock();
        if state.bvolume_dirty {
            let NodeState {
                fields, behavior, ..
            } = &*state;
            let volume = behavior.bounding_volume(fields);
            state.bvolume_cache = volume;
            state.bvolume_dirty = false;
        }
        state.bvolume_cache
    }

    pub fn render(&self, viewer: &mut dyn Viewer, ctx: &mut RenderContext) {
        let state = self.0.state.lock();
        let NodeState {
            fields, behavior, ..
        } = &*state;
        behavior.render(self, fields, viewer, ctx);
    }

    /// Gives temporary mutable access to the behavior, for wiring that
    /// cannot happen at construction time (Script self-references, PROTO
    /// instance assembly).
    pub(crate) fn with_behavior_mut<R>(
        &self,
        f: impl FnOnce(&mut dyn NodeBehavior) -> R,
    ) -> R {
        let mut state = self.0.state.lock();
        f(state.behavior.as_mut())
    }

    /// Swaps the node's behavior wholesale. Used when a resolved EXTERNPROTO
    /// body replaces a stub.
    pub(crate) fn replace_behavior(&self, behavior: Box<dyn NodeBehavior>) {
        let mut state = self.0.state.lock();
        state.behavior = behavior;
        state.bvolume_dirty = true;
    }

    pub(crate) fn with_fields<R>(
        &self,
        f: impl FnOnce(&BTreeMap<String, FieldValue>) -> R,
    ) -> R {
        let state = self.0.state.lock();
        f(&state.fields)
    }

    /// Routes leaving this node: (event-out id, target, event-in id).
    pub fn outgoing_routes(&self) -> Vec<(String, Node, String)> {
        let mut routes = Vec::new();
        for (emitter_id, emitter) in &self.0.emitters {
            for listener in emitter.listeners() {
                if let RouteListener::Target { node, event_in } = listener {
                    if let Some(target) = node.upgrade() {
                        routes.push((emitter_id.clone(), target, event_in));
                    }
                }
            }
        }
        routes.sort_by(|a, b| (&a.0, &a.2).cmp(&(&b.0, &b.2)));
        routes
    }

    /// Deep-copies this node and everything below it into the target scope,
    /// remapping DEF/USE sharing so one source node maps to one copy. Routes
    /// between copied nodes are reinstalled in a second pass.
    pub fn clone_into(&self, target: &Scope) -> Result<Node, SceneError> {
        Ok(clone_graph(std::slice::from_ref(self), target)?.0.remove(0))
    }

    fn clone_structure(
        &self,
        target: &Scope,
        map: &mut FxHashMap<usize, (Node, Node)>,
    ) -> Result<Node, SceneError> {
        if let Some((_, copy)) = map.get(&self.instance_id()) {
            return Ok(copy.clone());
        }

        let mut init = InitialValues::new();
        let fields: Vec<(String, FieldValue)> = self.with_fields(|fields| {
            fields
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        });
        for (id, value) in fields {
            // Event-out storage is runtime state, not configuration.
            match self.0.ty.interfaces().find(&id) {
                Some(decl)
                    if matches!(
                        decl.access,
                        InterfaceAccess::Field | InterfaceAccess::ExposedField
                    ) => {}
                _ => continue,
            }
            let remapped = match value {
                FieldValue::SfNode(Some(child)) => {
                    FieldValue::SfNode(Some(child.clone_structure(target, map)?))
                }
                FieldValue::MfNode(children) => {
                    let mut copies = Vec::with_capacity(children.len());
                    for child in children {
                        copies.push(child.clone_structure(target, map)?);
                    }
                    FieldValue::MfNode(copies)
                }
                other => other,
            };
            init.insert(id, remapped);
        }

        let copy = self.0.ty.create_node(target, init)?;
        if let Some(name) = self.name() {
            copy.set_name(name.clone());
            target.add_node(name, &copy);
        }
        map.insert(self.instance_id(), (self.clone(), copy.clone()));
        Ok(copy)
    }

    /// Removes every route that starts or ends at this node.
    pub fn detach_routes(&self) {
        // Outgoing: drop listeners and the matching reverse records.
        for emitter in self.0.emitters.values() {
            for listener in emitter.take_listeners() {
                if let RouteListener::Target { node, .. } = listener {
                    if let Some(target) = node.upgrade() {
                        target
                            .0
                            .incoming
                            .lock()
                            .retain(|record| !record.from.points_to(self));
                    }
                }
            }
        }
        // Incoming: remove ourselves from each source emitter.
        let incoming = std::mem::take(&mut *self.0.incoming.lock());
        for record in incoming {
            if let Some(source) = record.from.upgrade() {
                if let Some(emitter) = source.emitter(&record.event_out) {
                    emitter.remove_listeners_to(self.instance_id());
                }
            }
        }
    }
}

/// Deep-copies a node list into the target scope with one shared DEF/USE
/// remap, then reinstalls the routes between the copied nodes (pass 2).
/// Returns the copied roots and the source-to-copy map.
pub(crate) fn clone_graph(
    roots: &[Node],
    target: &Scope,
) -> Result<(Vec<Node>, FxHashMap<usize, (Node, Node)>), SceneError> {
    let mut map: FxHashMap<usize, (Node, Node)> = FxHashMap::default();
    let mut copies = Vec::with_capacity(roots.len());
    for root in roots {
        copies.push(root.clone_structure(target, &mut map)?);
    }
    for (original, duplicate) in map.values() {
        for (event_out, route_target, event_in) in original.outgoing_routes() {
            if let Some((_, target_copy)) = map.get(&route_target.instance_id()) {
                crate::event::route::add_route(duplicate, &event_out, target_copy, &event_in)?;
            }
        }
    }
    Ok((copies, map))
}

fn take_node_refs(fields: &mut BTreeMap<String, FieldValue>, out: &mut Vec<Node>) {
    for value in fields.values_mut() {
        match value {
            FieldValue::SfNode(slot @ Some(_)) => {
                if let Some(node) = slot.take() {
                    out.push(node);
                }
            }
            FieldValue::MfNode(nodes) => {
                out.append(nodes);
            }
            _ => {}
        }
    }
}

impl Drop for NodeData {
    fn drop(&mut self) {
        // Drain node references into a worklist before any child drops, so
        // destruction of a deep graph never recurses: each node about to be
        // dropped is emptied of its own references first.
        let mut worklist = Vec::new();
        {
            let state = self.state.get_mut();
            take_node_refs(&mut state.fields, &mut worklist);
            state.behavior.take_node_refs(&mut worklist);
        }
        while let Some(node) = worklist.pop() {
            if Arc::strong_count(&node.0) == 1 {
                let mut state = node.0.state.lock();
                let NodeState {
                    fields, behavior, ..
                } = &mut *state;
                take_node_refs(fields, &mut worklist);
                behavior.take_node_refs(&mut worklist);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::Node;
    use crate::{
        event::{queue::EventQueue, route},
        field::FieldValue,
        parser::test_support::TestWorld,
        scope::Scope,
    };
    use nalgebra::Vector3;

    #[test]
    fn exposed_field_delivery_updates_storage_and_emits() {
        let world = TestWorld::new();
        let output = world
            .parse(
                "#VRML V2.0 utf8\n\
                 DEF TR Transform { }\n\
                 DEF PI PositionInterpolator { }",
            )
            .unwrap();
        let tr = &output.roots[0];
        let mut queue = EventQueue::new();
        tr.deliver(
            "set_translation",
            &FieldValue::SfVec3f(Vector3::new(1.0, 2.0, 3.0)),
            4.0,
            &mut queue,
        );
        assert_eq!(
            tr.get_field("translation").unwrap(),
            FieldValue::SfVec3f(Vector3::new(1.0, 2.0, 3.0))
        );
        assert_eq!(tr.last_emit_time("translation_changed"), Some(4.0));
        assert!(tr.is_modified());
    }

    #[test]
    fn kind_mismatch_event_is_dropped() {
        let world = TestWorld::new();
        let output = world
            .parse("#VRML V2.0 utf8\nDEF TR Transform { translation 5 5 5 }")
            .unwrap();
        let tr = &output.roots[0];
        let mut queue = EventQueue::new();
        tr.deliver("set_translation", &FieldValue::SfFloat(1.0), 1.0, &mut queue);
        // Dropped, not coerced; storage untouched.
        assert_eq!(
            tr.get_field("translation").unwrap(),
            FieldValue::SfVec3f(Vector3::new(5.0, 5.0, 5.0))
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn clone_into_remaps_shared_nodes_and_routes() {
        let world = TestWorld::new();
        let output = world
            .parse(
                "#VRML V2.0 utf8\n\
                 DEF G Group {\n\
                   children [\n\
                     DEF TS TimeSensor { }\n\
                     DEF SI ScalarInterpolator { }\n\
                     DEF B Box { size 1 2 3 }\n\
                     Shape { geometry USE B }\n\
                   ]\n\
                 }\n\
                 ROUTE TS.fraction_changed TO SI.set_fraction",
            )
            .unwrap();
        let group = &output.roots[0];

        let target = Scope::new("copy", None);
        let copy = group.clone_into(&target).unwrap();
        assert_ne!(copy, *group);

        let FieldValue::MfNode(children) = copy.get_field("children").unwrap() else {
            panic!("children is not MFNode");
        };
        // USE sharing maps to one shared copy, not two.
        let box_copy = children[2].clone();
        let shape_geometry = children[3].get_field("geometry").unwrap();
        assert_eq!(shape_geometry.as_node().unwrap(), &box_copy);
        assert_eq!(
            box_copy.get_field("size").unwrap(),
            FieldValue::SfVec3f(Vector3::new(1.0, 2.0, 3.0))
        );

        // The DEF map landed in the target scope and the route was copied.
        assert_eq!(target.find_node("B").unwrap(), box_copy);
        let ts_copy = target.find_node("TS").unwrap();
        let si_copy = target.find_node("SI").unwrap();
        assert!(route::has_route(&ts_copy, "fraction_changed", &si_copy, "set_fraction"));

        // Copies are independent of the source graph.
        box_copy
            .set_field("size", &FieldValue::SfVec3f(Vector3::new(9.0, 9.0, 9.0)))
            .unwrap();
        assert_eq!(
            target.find_node("B").unwrap().get_field("size").unwrap(),
            FieldValue::SfVec3f(Vector3::new(9.0, 9.0, 9.0))
        );
        assert_eq!(
            output.scope.find_node("B").unwrap().get_field("size").unwrap(),
            FieldValue::SfVec3f(Vector3::new(1.0, 2.0, 3.0))
        );
    }

    #[test]
    fn deep_graph_drops_without_recursion() {
        let world = TestWorld::new();
        let scope = Scope::new("deep", None);
        let group = world
            .parse("#VRML V2.0 utf8\nGroup { }")
            .unwrap()
            .scope
            .find_type("Group")
            .unwrap();

        let mut current: Option<Node> = None;
        for _ in 0..50_000 {
            let mut init = std::collections::BTreeMap::new();
            if let Some(child) = current.take() {
                init.insert("children".to_owned(), FieldValue::MfNode(vec![child]));
            }
            current = Some(group.create_node(&scope, init).unwrap());
        }
        // Dropping the root must not recurse through 50k levels.
        drop(current);
    }
}

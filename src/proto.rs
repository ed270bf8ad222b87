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

//! User-defined composite node metatypes. A PROTO metatype keeps a template
//! body graph; each instance gets a deep clone of it in a fresh scope, with
//! IS-mapped interfaces redirected into the clone. An EXTERNPROTO is a stub
//! metatype whose template arrives later from a background fetch.

use crate::{
    error::SceneError,
    event::emitter::RouteListener,
    field::FieldValue,
    node::{
        clone_graph,
        interface::{InterfaceAccess, InterfaceSet},
        metatype::{InitialValues, NodeMetatype, NodeType},
        Node, NodeBehavior, NodeCategory, NodeOutput, WeakNode,
    },
    scope::Scope,
    viewer::{RenderContext, Viewer},
};
use fxhash::FxHashMap;
use parking_lot::{Mutex, RwLock};
use std::{any::Any, collections::BTreeMap, sync::Arc};
use welt_core::log::Log;
use welt_math::bsphere::BoundingSphere;

/// One IS-mapping recorded while parsing a PROTO body: the template node's
/// interface routed through to a declared interface of the PROTO.
#[derive(Clone)]
pub struct IsMapping {
    pub interface_id: String,
    pub node: Node,
    pub node_interface: String,
}

/// A user-defined composite metatype.
pub struct ProtoMetatype {
    id: String,
    interfaces: InterfaceSet,
    body: Vec<Node>,
    is_map: Vec<IsMapping>,
}

impl ProtoMetatype {
    pub fn new(
        id: impl Into<String>,
        interfaces: InterfaceSet,
        body: Vec<Node>,
        is_map: Vec<IsMapping>,
    ) -> Self {
        Self {
            id: id.into(),
            interfaces,
            body,
            is_map,
        }
    }

    /// Clones the template into a fresh scope and wires the instance's
    /// interfaces through the IS-map. Used both for new instances and for
    /// swapping a resolved EXTERNPROTO body into a stub node.
    fn build_into(&self, instance: &Node, outer: &Scope) -> Result<(), SceneError> {
        let body_scope = Scope::new(format!("{}#body", self.id), Some(outer.clone()));
        let (body, map) = clone_graph(&self.body, &body_scope)?;

        let mut writes: FxHashMap<String, Vec<(Node, String)>> = FxHashMap::default();
        let mut reads: FxHashMap<String, (Node, String)> = FxHashMap::default();

        let instance_interfaces = instance.node_type();
        for mapping in &self.is_map {
            // An EXTERNPROTO may expose a subset; mappings for interfaces
            // the instance does not declare stay internal.
            let Some(decl) = instance_interfaces.interfaces().find(&mapping.interface_id) else {
                continue;
            };
            let Some((_, body_node)) = map.get(&mapping.node.instance_id()) else {
                continue;
            };

            if decl.access.has_storage() || decl.access == InterfaceAccess::EventIn {
                writes
                    .entry(mapping.interface_id.clone())
                    .or_default()
                    .push((body_node.clone(), mapping.node_interface.clone()));
            }
            if decl.access.has_storage() && decl.access != InterfaceAccess::EventOut {
                reads
                    .entry(mapping.interface_id.clone())
                    .or_insert_with(|| (body_node.clone(), mapping.node_interface.clone()));
            }
            if decl.access.emits_events() {
                let body_type = body_node.node_type();
                if let Some(out_decl) = body_type
                    .interfaces()
                    .find_event_out(&mapping.node_interface)
                {
                    if let Some(emitter) =
                        body_node.emitter(&InterfaceSet::emitter_id(out_decl))
                    {
                        emitter.add_listener(RouteListener::Proxy {
                            node: instance.downgrade(),
                            event_out: InterfaceSet::emitter_id(decl),
                        });
                    }
                }
            }
        }

        instance.with_behavior_mut(|behavior| {
            if let Some(proto) = behavior
                .as_any_mut()
                .downcast_mut::<ProtoInstanceBehavior>()
            {
                proto.body = body.clone();
                proto.writes = writes.clone();
                proto.reads = reads.clone();
            }
        });
        Ok(())
    }

    /// Pushes the instance's current interface values through the write
    /// redirects, so PROTO-level defaults are overridden by the caller's
    /// initial values.
    fn apply_through_redirects(&self, instance: &Node) -> Result<(), SceneError> {
        for decl in instance.node_type().interfaces().iter() {
            if !matches!(
                decl.access,
                InterfaceAccess::Field | InterfaceAccess::ExposedField
            ) {
                continue;
            }
            let Some(value) = instance.with_fields(|fields| fields.get(&decl.id).cloned()) else {
                continue;
            };
            instance.with_behavior_mut(|behavior| -> Result<(), SceneError> {
                if let Some(proto) = behavior
                    .as_any_mut()
                    .downcast_mut::<ProtoInstanceBehavior>()
                {
                    proto.forward_write(&decl.id, &value)?;
                }
                Ok(())
            })?;
        }
        Ok(())
    }
}

impl NodeMetatype for ProtoMetatype {
    fn id(&self) -> &str {
        &self.id
    }

    fn interfaces(&self) -> &InterfaceSet {
        &self.interfaces
    }

    fn as_proto(self: Arc<Self>) -> Option<Arc<ProtoMetatype>> {
        Some(self)
    }

    fn create_node(
        &self,
        ty: &NodeType,
        scope: &Scope,
        init: InitialValues,
    ) -> Result<Node, SceneError> {
        let instance = Node::new(
            ty.clone(),
            scope.clone(),
            Box::new(ProtoInstanceBehavior::default()),
            init,
        )?;
        self.build_into(&instance, scope)?;
        self.apply_through_redirects(&instance)?;
        Ok(instance)
    }
}

/// The behavior of a PROTO instance: reads and writes on IS-mapped
/// interfaces route through to body storage, and the first body node stands
/// in for rendering and bounding volume queries.
#[derive(Clone, Default)]
pub struct ProtoInstanceBehavior {
    pub body: Vec<Node>,
    writes: FxHashMap<String, Vec<(Node, String)>>,
    reads: FxHashMap<String, (Node, String)>,
}

impl ProtoInstanceBehavior {
    fn forward_write(&self, interface_id: &str, value: &FieldValue) -> Result<(), SceneError> {
        if let Some(targets) = self.writes.get(interface_id) {
            for (node, node_interface) in targets {
                // Only storage-backed targets take construction-time writes.
                let ty = node.node_type();
                if ty
                    .interfaces()
                    .find(node_interface)
                    .is_some_and(|decl| decl.access.has_storage())
                {
                    node.set_field(node_interface, value)?;
                }
            }
        }
        Ok(())
    }
}

impl NodeBehavior for ProtoInstanceBehavior {
    fn category(&self) -> NodeCategory {
        NodeCategory::ProtoInstance
    }

    fn on_event(
        &mut self,
        _fields: &mut BTreeMap<String, FieldValue>,
        event_in: &str,
        value: &FieldValue,
        _timestamp: f64,
        out: &mut NodeOutput,
    ) {
        if let Some(targets) = self.writes.get(event_in) {
            for (node, node_interface) in targets {
                let ty = node.node_type();
                if ty.interfaces().find_event_in(node_interface).is_some() {
                    out.sends
                        .push((node.clone(), node_interface.clone(), value.clone()));
                }
            }
        }
    }

    fn on_set_field(&mut self, id: &str, value: &FieldValue) {
        Log::verify(self.forward_write(id, value));
    }

    fn read_field(
        &self,
        fields: &BTreeMap<String, FieldValue>,
        id: &str,
    ) -> Option<FieldValue> {
        match self.reads.get(id) {
            Some((node, node_interface)) => node.get_field(node_interface),
            None => fields.get(id).cloned(),
        }
    }

    fn bounding_volume(&self, _fields: &BTreeMap<String, FieldValue>) -> BoundingSphere {
        match self.body.first() {
            Some(primary) => primary.bounding_volume(),
            None => BoundingSphere::maximum(),
        }
    }

    fn render(
        &self,
        _node: &Node,
        _fields: &BTreeMap<String, FieldValue>,
        viewer: &mut dyn Viewer,
        ctx: &mut RenderContext,
    ) {
        // The first node of the body stands in for the instance.
        if let Some(primary) = self.body.first() {
            primary.render(viewer, ctx);
        }
    }

    fn hidden_children(&self) -> Vec<Node> {
        self.body.clone()
    }

    fn take_node_refs(&mut self, out: &mut Vec<Node>) {
        out.append(&mut self.body);
        for (_, targets) in self.writes.drain() {
            out.extend(targets.into_iter().map(|(node, _)| node));
        }
        for (_, (node, _)) in self.reads.drain() {
            out.push(node);
        }
    }

    fn clone_box(&self) -> Box<dyn NodeBehavior> {
        Box::new(self.clone())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Placeholder behavior for nodes created from an unresolved EXTERNPROTO
/// stub: plain storage until the real body arrives.
#[derive(Clone, Default)]
pub struct StubBehavior;

impl NodeBehavior for StubBehavior {
    fn category(&self) -> NodeCategory {
        NodeCategory::ExternProtoStub
    }

    fn clone_box(&self) -> Box<dyn NodeBehavior> {
        Box::new(self.clone())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// An externally defined PROTO. Usable immediately after registration; the
/// backing metatype is swapped in atomically when the fetch completes.
pub struct ExternProtoMetatype {
    id: String,
    interfaces: InterfaceSet,
    url_list: Vec<String>,
    backing: RwLock<Option<Arc<ProtoMetatype>>>,
    pending: Mutex<Vec<WeakNode>>,
}

impl ExternProtoMetatype {
    pub fn new(
        id: impl Into<String>,
        interfaces: InterfaceSet,
        url_list: Vec<String>,
    ) -> Self {
        Self {
            id: id.into(),
            interfaces,
            url_list,
            backing: RwLock::new(None),
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn url_list(&self) -> &[String] {
        &self.url_list
    }

    pub fn is_resolved(&self) -> bool {
        self.backing.read().is_some()
    }

    /// Installs the fetched template and swaps it into every stub-backed
    /// node created so far. Consumers observe a one-time transition; events
    /// still queued against those nodes deliver to the real body afterwards.
    pub fn resolve(&self, proto: Arc<ProtoMetatype>) {
        let pending = {
            let mut backing = self.backing.write();
            if backing.is_some() {
                return;
            }
            *backing = Some(proto.clone());
            std::mem::take(&mut *self.pending.lock())
        };

        for weak in pending {
            let Some(node) = weak.upgrade() else {
                continue;
            };
            node.replace_behavior(Box::new(ProtoInstanceBehavior::default()));
            let scope = node.scope();
            Log::verify(proto.build_into(&node, &scope));
            Log::verify(proto.apply_through_redirects(&node));
        }
    }
}

impl NodeMetatype for ExternProtoMetatype {
    fn id(&self) -> &str {
        &self.id
    }

    fn interfaces(&self) -> &InterfaceSet {
        &self.interfaces
    }

    fn as_externproto(self: Arc<Self>) -> Option<Arc<ExternProtoMetatype>> {
        Some(self)
    }

    fn create_node(
        &self,
        ty: &NodeType,
        scope: &Scope,
        init: InitialValues,
    ) -> Result<Node, SceneError> {
        if let Some(proto) = self.backing.read().clone() {
            return proto.create_node(ty, scope, init);
        }
        let node = Node::new(ty.clone(), scope.clone(), Box::new(StubBehavior), init)?;
        self.pending.lock().push(node.downgrade());
        Ok(node)
    }
}

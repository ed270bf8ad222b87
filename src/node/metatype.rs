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

//! Node metatypes (factories keyed by URI-shaped identifiers) and the
//! concrete node-types derived from them.

use crate::{
    error::SceneError,
    field::FieldValue,
    node::{interface::InterfaceSet, Node},
    scope::Scope,
    viewer::Viewer,
};
use std::{collections::BTreeMap, sync::Arc};

/// Initial field values supplied at node construction, keyed by interface id.
pub type InitialValues = BTreeMap<String, FieldValue>;

/// A factory for a family of related node-types. Implementations supply the
/// canonical interface set and the node construction semantics; the engine
/// drives the lifecycle hooks around the simulation.
pub trait NodeMetatype: Send + Sync {
    /// Globally unique URI-shaped identifier.
    fn id(&self) -> &str;

    /// Every interface this metatype knows how to implement.
    fn interfaces(&self) -> &InterfaceSet;

    /// Validates a requested interface subset. The default implementation
    /// accepts exactly the interfaces of [`Self::interfaces`]; metatypes with
    /// author-defined interfaces (Script) accept anything well formed.
    fn validate_interfaces(
        &self,
        local_id: &str,
        requested: &InterfaceSet,
    ) -> Result<(), SceneError> {
        for decl in requested.iter() {
            let known = self.interfaces().find(&decl.id).filter(|known| {
                known.access == decl.access && known.kind == decl.kind
            });
            if known.is_none() {
                return Err(SceneError::UnsupportedInterface {
                    node_type: local_id.to_owned(),
                    requested: decl.id.clone(),
                });
            }
        }
        Ok(())
    }

    /// Creates a node of the given derived type.
    fn create_node(
        &self,
        ty: &NodeType,
        scope: &Scope,
        init: InitialValues,
    ) -> Result<Node, SceneError>;

    /// Self-identification for the externproto resolution path, which needs
    /// the concrete PROTO out of a registry entry. Discriminator instead of
    /// a downcast.
    fn as_proto(self: Arc<Self>) -> Option<Arc<crate::proto::ProtoMetatype>> {
        None
    }

    /// Discriminator for unresolved externproto stubs.
    fn as_externproto(self: Arc<Self>) -> Option<Arc<crate::proto::ExternProtoMetatype>> {
        None
    }

    /// Called after a world finished parsing, before the first simulation
    /// tick.
    fn initialize(&self, _initial_viewpoint: Option<&Node>, _timestamp: f64) {}

    /// Called once per frame before the scene traversal.
    fn render(&self, _viewer: &mut dyn Viewer) {}

    /// Called on engine teardown.
    fn shutdown(&self, _timestamp: f64) {}
}

struct NodeTypeData {
    local_id: String,
    interfaces: InterfaceSet,
    metatype: Arc<dyn NodeMetatype>,
}

/// A concrete instantiable node shape: a metatype narrowed to a local
/// identifier and the interface subset a scene exposes.
#[derive(Clone)]
pub struct NodeType(Arc<NodeTypeData>);

impl NodeType {
    /// Derives a node-type from a metatype. Rejects any requested interface
    /// the metatype cannot implement.
    pub fn new(
        metatype: Arc<dyn NodeMetatype>,
        local_id: impl Into<String>,
        interfaces: InterfaceSet,
    ) -> Result<Self, SceneError> {
        let local_id = local_id.into();
        metatype.validate_interfaces(&local_id, &interfaces)?;
        Ok(Self(Arc::new(NodeTypeData {
            local_id,
            interfaces,
            metatype,
        })))
    }

    pub fn local_id(&self) -> &str {
        &self.0.local_id
    }

    pub fn interfaces(&self) -> &InterfaceSet {
        &self.0.interfaces
    }

    pub fn metatype(&self) -> &Arc<dyn NodeMetatype> {
        &self.0.metatype
    }

    pub fn metatype_id(&self) -> &str {
        self.0.metatype.id()
    }

    /// Creates a node of this type in the given scope.
    pub fn create_node(&self, scope: &Scope, init: InitialValues) -> Result<Node, SceneError> {
        self.0.metatype.create_node(self, scope, init)
    }

    /// True if both types come from the same metatype and declare the same
    /// interface shapes. Used to decide whether a duplicate scope entry is
    /// harmless.
    pub fn same_shape(&self, other: &NodeType) -> bool {
        self.metatype_id() == other.metatype_id()
            && self.0.interfaces.same_shape(&other.0.interfaces)
    }
}

impl std::fmt::Debug for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeType")
            .field("local_id", &self.0.local_id)
            .field("metatype", &self.0.metatype.id())
            .finish()
    }
}

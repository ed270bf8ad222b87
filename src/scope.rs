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

//! Nested namespaces binding local identifiers to node-types and DEF names
//! to nodes. Type lookup walks the parent chain; DEF/USE is lexically scoped
//! to the enclosing body and does not.

use crate::node::{metatype::NodeType, Node, WeakNode};
use fxhash::FxHashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use welt_core::log::Log;

struct ScopeData {
    id: String,
    parent: Option<Scope>,
    types: Mutex<Vec<NodeType>>,
    // Weak because nodes own their scope; a strong entry would cycle.
    names: Mutex<FxHashMap<String, WeakNode>>,
}

/// A shared handle to one naming scope. Cloning the handle shares the scope.
#[derive(Clone)]
pub struct Scope(Arc<ScopeData>);

/// Outcome of [`Scope::add_type`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AddTypeResult {
    Added,
    /// An entry with the same local id and the same shape already exists;
    /// importing a component twice with compatible levels is idempotent.
    AlreadyPresentIdentical,
    /// An entry with the same local id but a different shape exists. The old
    /// entry wins; the caller gets a warning.
    AlreadyPresentDiffering,
}

impl Scope {
    pub fn new(id: impl Into<String>, parent: Option<Scope>) -> Self {
        Self(Arc::new(ScopeData {
            id: id.into(),
            parent,
            types: Mutex::new(Vec::new()),
            names: Mutex::new(FxHashMap::default()),
        }))
    }

    pub fn id(&self) -> &str {
        &self.0.id
    }

    pub fn parent(&self) -> Option<&Scope> {
        self.0.parent.as_ref()
    }

    /// True if both handles refer to the same scope.
    pub fn same_scope(&self, other: &Scope) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Binds a node-type to its local identifier in this scope. The first
    /// binding wins; rebinding a structurally different type is reported.
    pub fn add_type(&self, ty: NodeType) -> AddTypeResult {
        let mut types = self.0.types.lock();
        if let Some(existing) = types.iter().find(|t| t.local_id() == ty.local_id()) {
            return if existing.same_shape(&ty) {
                AddTypeResult::AlreadyPresentIdentical
            } else {
                Log::warn(format!(
                    "Scope {}: node type {} is already bound to a different shape; keeping the existing binding.",
                    self.0.id,
                    ty.local_id()
                ));
                AddTypeResult::AlreadyPresentDiffering
            };
        }
        types.push(ty);
        AddTypeResult::Added
    }

    /// Looks a node-type up by its local identifier, walking the parent
    /// chain.
    pub fn find_type(&self, local_id: &str) -> Option<NodeType> {
        let mut scope = Some(self);
        while let Some(current) = scope {
            if let Some(ty) = current
                .0
                .types
                .lock()
                .iter()
                .find(|t| t.local_id() == local_id)
            {
                return Some(ty.clone());
            }
            scope = current.0.parent.as_ref();
        }
        None
    }

    /// Binds a DEF name to a node in this scope only.
    pub fn add_node(&self, name: impl Into<String>, node: &Node) {
        self.0.names.lock().insert(name.into(), node.downgrade());
    }

    /// Looks a DEF name up in this scope only; no parent walk.
    pub fn find_node(&self, name: &str) -> Option<Node> {
        self.0.names.lock().get(name).and_then(WeakNode::upgrade)
    }

    /// The node-types bound directly in this scope, in binding order.
    pub fn local_types(&self) -> Vec<NodeType> {
        self.0.types.lock().clone()
    }

    /// The DEF-name map of this scope with live nodes only.
    pub fn named_nodes(&self) -> Vec<(String, Node)> {
        self.0
            .names
            .lock()
            .iter()
            .filter_map(|(name, weak)| weak.upgrade().map(|node| (name.clone(), node)))
            .collect()
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope").field("id", &self.0.id).finish()
    }
}

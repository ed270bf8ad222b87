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

//! Per-event-out emitters: the listener set an emission fans out to, plus
//! the last-emit timestamp kept under its own lock for low-contention
//! queries.

use crate::{field::FieldKind, node::WeakNode};
use parking_lot::{Mutex, RwLock};

/// One party interested in an event-out's emissions.
#[derive(Clone)]
pub enum RouteListener {
    /// An installed route: deliver to the target's event-in via the queue.
    Target { node: WeakNode, event_in: String },
    /// A PROTO IS-mapping: re-emit from the instance's same-kind event-out.
    Proxy { node: WeakNode, event_out: String },
}

/// See module docs.
pub struct EventEmitter {
    id: String,
    kind: FieldKind,
    listeners: RwLock<Vec<RouteListener>>,
    last_time: Mutex<f64>,
}

impl EventEmitter {
    pub fn new(id: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            id: id.into(),
            kind,
            listeners: RwLock::new(Vec::new()),
            last_time: Mutex::new(0.0),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    /// Adds a listener. An already-present route listener (same target node
    /// and event-in) is ignored, which makes duplicate route installation a
    /// no-op. Returns true if the set changed.
    pub fn add_listener(&self, listener: RouteListener) -> bool {
        let mut listeners = self.listeners.write();
        if let RouteListener::Target { node, event_in } = &listener {
            let duplicate = listeners.iter().any(|existing| match existing {
                RouteListener::Target {
                    node: other,
                    event_in: other_in,
                } => other.target_id() == node.target_id() && other_in == event_in,
                RouteListener::Proxy { .. } => false,
            });
            if duplicate {
                return false;
            }
        }
        listeners.push(listener);
        true
    }

    /// Removes the route listener for the given target and event-in.
    /// Returns true if one was present.
    pub fn remove_listener(&self, target_id: usize, event_in: &str) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|listener| match listener {
            RouteListener::Target {
                node,
                event_in: existing,
            } => !(node.target_id() == target_id && existing == event_in),
            RouteListener::Proxy { .. } => true,
        });
        listeners.len() != before
    }

    /// Removes every route listener pointing at the given node, along with
    /// dead listeners encountered on the way.
    pub fn remove_listeners_to(&self, target_id: usize) {
        self.listeners.write().retain(|listener| match listener {
            RouteListener::Target { node, .. } => {
                node.upgrade().is_some() && node.target_id() != target_id
            }
            RouteListener::Proxy { node, .. } => node.upgrade().is_some(),
        });
    }

    /// A snapshot of the listener set, taken under the read lock.
    pub fn listeners(&self) -> Vec<RouteListener> {
        self.listeners.read().clone()
    }

    /// Empties the listener set, returning what was in it.
    pub fn take_listeners(&self) -> Vec<RouteListener> {
        std::mem::take(&mut *self.listeners.write())
    }

    pub fn has_route_to(&self, target_id: usize, event_in: &str) -> bool {
        self.listeners.read().iter().any(|listener| match listener {
            RouteListener::Target {
                node,
                event_in: existing,
            } => node.target_id() == target_id && existing == event_in,
            RouteListener::Proxy { .. } => false,
        })
    }

    pub fn last_time(&self) -> f64 {
        *self.last_time.lock()
    }

    pub fn set_last_time(&self, timestamp: f64) {
        *self.last_time.lock() = timestamp;
    }
}

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

//! The catalog of node metatypes known to one engine instance: built-ins
//! installed at init plus PROTO/EXTERNPROTO metatypes registered during
//! parsing. Registration is append-only until engine teardown.

use crate::{
    node::{metatype::NodeMetatype, Node},
    viewer::Viewer,
};
use fxhash::FxHashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use welt_core::log::Log;

/// See module docs. Lookups take the read lock; registrations take the write
/// lock and only happen during a parse or an externproto resolution.
#[derive(Default)]
pub struct MetatypeRegistry {
    map: RwLock<FxHashMap<String, Arc<dyn NodeMetatype>>>,
    /// Alternative URIs that resolve to an already-registered metatype.
    aliases: RwLock<FxHashMap<String, String>>,
    /// The external resource an externproto metatype was last fetched from.
    fetch_sources: RwLock<FxHashMap<String, String>>,
}

impl MetatypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a metatype under its own id. Returns false and keeps the
    /// existing entry if the id is already taken; the registry is
    /// append-only.
    pub fn register(&self, metatype: Arc<dyn NodeMetatype>) -> bool {
        let mut map = self.map.write();
        if map.contains_key(metatype.id()) {
            return false;
        }
        map.insert(metatype.id().to_owned(), metatype);
        true
    }

    /// Records that `alias` names the metatype registered under `canonical`.
    pub fn register_alias(&self, alias: &str, canonical: &str) {
        if alias != canonical {
            self.aliases
                .write()
                .insert(alias.to_owned(), canonical.to_owned());
        }
    }

    pub fn find(&self, id: &str) -> Option<Arc<dyn NodeMetatype>> {
        let map = self.map.read();
        if let Some(metatype) = map.get(id) {
            return Some(metatype.clone());
        }
        let aliases = self.aliases.read();
        aliases.get(id).and_then(|canonical| map.get(canonical).cloned())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.map.read().contains_key(id) || self.aliases.read().contains_key(id)
    }

    pub fn set_fetch_source(&self, id: &str, source: &str) {
        self.fetch_sources
            .write()
            .insert(id.to_owned(), source.to_owned());
    }

    pub fn fetch_source(&self, id: &str) -> Option<String> {
        self.fetch_sources.read().get(id).cloned()
    }

    fn snapshot(&self) -> Vec<Arc<dyn NodeMetatype>> {
        self.map.read().values().cloned().collect()
    }

    /// Runs the post-parse initialize hook on every registered metatype.
    /// The lock is not held across the callbacks.
    pub fn initialize_all(&self, initial_viewpoint: Option<&Node>, timestamp: f64) {
        for metatype in self.snapshot() {
            metatype.initialize(initial_viewpoint, timestamp);
        }
    }

    /// Runs the per-frame render hook on every registered metatype.
    pub fn render_all(&self, viewer: &mut dyn Viewer) {
        for metatype in self.snapshot() {
            metatype.render(viewer);
        }
    }

    /// Tears every metatype down and empties the registry.
    pub fn shutdown_all(&self, timestamp: f64) {
        let metatypes = {
            let mut map = self.map.write();
            map.drain().map(|(_, v)| v).collect::<Vec<_>>()
        };
        for metatype in &metatypes {
            metatype.shutdown(timestamp);
        }
        self.aliases.write().clear();
        self.fetch_sources.write().clear();
        Log::info(format!(
            "Node metatype registry torn down ({} metatypes).",
            metatypes.len()
        ));
    }
}

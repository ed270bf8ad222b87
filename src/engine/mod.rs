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

//! The engine: owns the registries, the event queue, the bindable stacks and
//! the externproto worker pool; advances the simulation one cooperative tick
//! at a time and drives the viewer for rendering.

pub mod bindable;

use crate::{
    component::{ComponentRegistry, ProfileRegistry},
    engine::bindable::BindableStacks,
    error::SceneError,
    event::queue::EventQueue,
    field::FieldValue,
    node::{
        metatype::{InitialValues, NodeMetatype, NodeType},
        registry::MetatypeRegistry,
        BindableStackId, Node, NodeCategory, NodeEffects, WeakNode,
    },
    parser::{parse_scene, ExternProtoFetcher, SceneContext},
    proto::ExternProtoMetatype,
    scope::Scope,
    viewer::{RenderContext, Viewer},
    vrml97::{self, behavior::ScriptBackend},
};
use fxhash::FxHashMap;
use nalgebra::Matrix4;
use parking_lot::Mutex;
use std::{collections::BTreeMap, sync::Arc};
use welt_core::{
    io::{FileError, ResourceHandle},
    log::Log,
    task::TaskPool,
};
use welt_math::Intersection;

/// Cuts event cascades that would otherwise cycle forever. Reaching the cap
/// logs a warning and discards the rest of the tick's due events.
pub const MAX_EVENT_CASCADE: usize = 1024;

/// Resolves resource URLs to bytes. The engine core ships a plain
/// file/path resolver; embedders supply network-aware ones.
pub trait ResourceResolver: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FileError>;
}

/// Reads `file://` URLs and bare filesystem paths.
#[derive(Default)]
pub struct FileResolver;

impl ResourceResolver for FileResolver {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FileError> {
        let path = url.strip_prefix("file://").unwrap_or(url);
        ResourceHandle::from_file(path)?.read_to_end()
    }
}

/// Picks the dialect media type from a URL's extension.
pub fn media_type_for(url: &str) -> &'static str {
    if url.trim_end_matches('/').ends_with(".x3dv") {
        "model/x3d-vrml"
    } else {
        "model/vrml"
    }
}

/// The result a fetch worker publishes through the handoff channel.
struct FetchedBody {
    url: String,
    body: Result<Vec<u8>, String>,
}

/// Submits externproto fetches to the worker pool during a parse and
/// remembers which task belongs to which stub.
struct PoolFetcher<'a> {
    pool: &'a TaskPool,
    resolver: Arc<dyn ResourceResolver>,
    submitted: Mutex<Vec<(u64, Arc<ExternProtoMetatype>)>>,
}

impl<'a> PoolFetcher<'a> {
    fn new(pool: &'a TaskPool, resolver: Arc<dyn ResourceResolver>) -> Self {
        Self {
            pool,
            resolver,
            submitted: Mutex::new(Vec::new()),
        }
    }

    fn take(&self) -> Vec<(u64, Arc<ExternProtoMetatype>)> {
        std::mem::take(&mut self.submitted.lock())
    }
}

impl ExternProtoFetcher for PoolFetcher<'_> {
    fn submit(&self, stub: Arc<ExternProtoMetatype>) {
        let resolver = self.resolver.clone();
        let urls = stub.url_list().to_vec();
        let id = self.pool.spawn_with_result(async move {
            let mut last_error = String::from("empty URL list");
            for url in &urls {
                match resolver.fetch(url.split('#').next().unwrap_or(url)) {
                    Ok(bytes) => {
                        return FetchedBody {
                            url: url.clone(),
                            body: Ok(bytes),
                        };
                    }
                    Err(error) => last_error = error.to_string(),
                }
            }
            FetchedBody {
                url: urls.first().cloned().unwrap_or_default(),
                body: Err(last_error),
            }
        });
        self.submitted.lock().push((id, stub));
    }
}

/// A loaded world.
pub struct Scene {
    pub roots: Vec<Node>,
    pub scope: Scope,
    pub metadata: BTreeMap<String, String>,
    pub url: String,
    /// The synthetic viewpoint bound when a world declares none.
    default_viewpoint: Option<Node>,
}

/// See module docs.
pub struct Engine {
    metatypes: MetatypeRegistry,
    components: ComponentRegistry,
    profiles: ProfileRegistry,
    task_pool: TaskPool,
    resolver: Arc<dyn ResourceResolver>,
    script_backend: Option<Arc<dyn ScriptBackend>>,
    scene: Option<Scene>,
    queue: EventQueue,
    stacks: BindableStacks,
    time_dependents: Vec<WeakNode>,
    pending_fetches: FxHashMap<u64, Arc<ExternProtoMetatype>>,
    last_update: f64,
    world_url: String,
}

impl Engine {
    /// Creates an engine with the standard node catalog registered and the
    /// plain file resolver.
    pub fn new() -> Result<Self, SceneError> {
        let metatypes = MetatypeRegistry::new();
        for metatype in vrml97::standard_metatypes() {
            metatypes.register(metatype);
        }
        Ok(Self {
            metatypes,
            components: ComponentRegistry::new()?,
            profiles: ProfileRegistry::new(),
            task_pool: TaskPool::new(),
            resolver: Arc::new(FileResolver),
            script_backend: None,
            scene: None,
            queue: EventQueue::new(),
            stacks: BindableStacks::default(),
            time_dependents: Vec::new(),
            pending_fetches: FxHashMap::default(),
            last_update: 0.0,
            world_url: String::new(),
        })
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn ResourceResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn set_script_backend(&mut self, backend: Arc<dyn ScriptBackend>) {
        self.script_backend = Some(backend);
    }

    /// Registers an additional metatype; append-only, first registration
    /// wins.
    pub fn register_metatype(&self, metatype: Arc<dyn NodeMetatype>) -> bool {
        self.metatypes.register(metatype)
    }

    pub fn metatypes(&self) -> &MetatypeRegistry {
        &self.metatypes
    }

    pub fn scene(&self) -> Option<&Scene> {
        self.scene.as_ref()
    }

    pub fn bound(&self, stack: BindableStackId) -> Option<Node> {
        self.stacks.top(stack)
    }

    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }

    /// Fetches a world by URL and installs it as the current scene.
    pub fn load(&mut self, url: &str, timestamp: f64) -> Result<(), SceneError> {
        let bytes = self
            .resolver
            .fetch(url)
            .map_err(|e| SceneError::ResourceUnavailable {
                url: url.to_owned(),
                reason: e.to_string(),
            })?;
        self.load_stream(
            ResourceHandle::from_memory(bytes),
            url,
            media_type_for(url),
            timestamp,
        )
    }

    /// Parses a stream and installs the result as the current scene:
    /// initializes all metatypes and binds the initial bindable of each
    /// category (the first encountered, or a synthetic default viewpoint).
    pub fn load_stream(
        &mut self,
        stream: ResourceHandle,
        uri: &str,
        media_type: &str,
        timestamp: f64,
    ) -> Result<(), SceneError> {
        let fetcher = PoolFetcher::new(&self.task_pool, self.resolver.clone());
        let output = {
            let ctx = SceneContext {
                metatypes: &self.metatypes,
                components: &self.components,
                profiles: &self.profiles,
                world_url: self.world_url.clone(),
                fetcher: Some(&fetcher),
            };
            parse_scene(stream, uri, media_type, &ctx)?
        };
        self.pending_fetches.extend(fetcher.take());

        self.queue.clear();
        self.stacks.clear();
        self.time_dependents.clear();
        self.world_url = uri.to_owned();

        let nodes = walk_preorder(&output.roots);
        self.time_dependents = nodes
            .iter()
            .filter(|node| node.is_time_dependent())
            .map(Node::downgrade)
            .collect();

        let mut first_bindables: FxHashMap<usize, Node> = FxHashMap::default();
        for node in &nodes {
            if let NodeCategory::Bindable(stack) = node.category() {
                first_bindables
                    .entry(stack_index(stack))
                    .or_insert_with(|| node.clone());
            }
        }

        let default_viewpoint = if first_bindables.contains_key(&stack_index(BindableStackId::Viewpoint)) {
            None
        } else {
            Some(self.synthesize_viewpoint(&output.scope)?)
        };
        let initial_viewpoint = first_bindables
            .get(&stack_index(BindableStackId::Viewpoint))
            .cloned()
            .or_else(|| default_viewpoint.clone());

        self.scene = Some(Scene {
            roots: output.roots,
            scope: output.scope,
            metadata: output.metadata,
            url: uri.to_owned(),
            default_viewpoint,
        });

        self.metatypes
            .initialize_all(initial_viewpoint.as_ref(), timestamp);

        for stack in [
            BindableStackId::Viewpoint,
            BindableStackId::NavigationInfo,
            BindableStackId::Background,
            BindableStackId::Fog,
        ] {
            let node = match stack {
                BindableStackId::Viewpoint => initial_viewpoint.clone(),
                other => first_bindables.get(&stack_index(other)).cloned(),
            };
            if let Some(node) = node {
                self.stacks.bind(stack, &node, timestamp, &mut self.queue);
            }
        }
        self.last_update = timestamp;
        Ok(())
    }

    fn synthesize_viewpoint(&self, scope: &Scope) -> Result<Node, SceneError> {
        let metatype = self
            .metatypes
            .find(&format!("{}Viewpoint", vrml97::METATYPE_ID_PREFIX))
            .ok_or_else(|| SceneError::UnsupportedInterface {
                node_type: "Viewpoint".to_owned(),
                requested: "(standard catalog not registered)".to_owned(),
            })?;
        let interfaces = metatype.interfaces().clone();
        let ty = NodeType::new(metatype, "Viewpoint", interfaces)?;
        ty.create_node(scope, InitialValues::new())
    }

    /// Runs one simulation tick: drains the fetch handoff, ticks the
    /// time-dependent nodes in registration order, then delivers due events
    /// until the queue is empty or the cascade cap trips. Time is clamped
    /// non-decreasingly.
    pub fn update(&mut self, now: f64) {
        let now = if now < self.last_update {
            Log::warn(format!(
                "update({now}) went backwards past {}; clamping.",
                self.last_update
            ));
            self.last_update
        } else {
            now
        };

        self.drain_fetches();

        let mut touched_scripts: Vec<Node> = Vec::new();

        let dependents = self.time_dependents.clone();
        for weak in &dependents {
            if let Some(node) = weak.upgrade() {
                let effects = node.tick(now, &mut self.queue);
                self.apply_effects(&node, effects, now, &mut touched_scripts);
            }
        }
        self.time_dependents.retain(|weak| weak.upgrade().is_some());

        let mut deliveries = 0;
        loop {
            if deliveries >= MAX_EVENT_CASCADE {
                let dropped = self.queue.discard_due(now);
                Log::warn(format!(
                    "Event cascade exceeded {MAX_EVENT_CASCADE} deliveries; discarded {dropped} event(s)."
                ));
                break;
            }
            let Some(event) = self.queue.pop_due(now) else {
                break;
            };
            deliveries += 1;
            let Some(node) = event.target.upgrade() else {
                continue;
            };
            let effects = node.deliver(&event.event_in, &event.value, event.timestamp, &mut self.queue);
            self.apply_effects(&node, effects, event.timestamp, &mut touched_scripts);
        }

        if let Some(backend) = &self.script_backend {
            let mut seen = Vec::new();
            for script in &touched_scripts {
                if !seen.contains(&script.instance_id()) {
                    seen.push(script.instance_id());
                    backend.events_processed(script, now);
                }
            }
        }

        self.last_update = now;
    }

    fn apply_effects(
        &mut self,
        node: &Node,
        effects: NodeEffects,
        timestamp: f64,
        touched_scripts: &mut Vec<Node>,
    ) {
        if let Some(request) = effects.bind {
            if request.bind {
                self.stacks
                    .bind(request.stack, &request.node, timestamp, &mut self.queue);
            } else {
                self.stacks
                    .unbind(request.stack, &request.node, timestamp, &mut self.queue);
            }
        }
        if !effects.script_events.is_empty() {
            if let Some(backend) = &self.script_backend {
                for (event_in, value) in &effects.script_events {
                    backend.process_event(node, event_in, value, timestamp);
                }
                touched_scripts.push(node.clone());
            }
        }
    }

    fn drain_fetches(&mut self) {
        while let Some(result) = self.task_pool.next_task_result() {
            let Some(stub) = self.pending_fetches.remove(&result.id) else {
                continue;
            };
            let Ok(body) = result.payload.downcast::<FetchedBody>() else {
                continue;
            };
            match body.body {
                Ok(bytes) => self.finish_externproto(&stub, &body.url, bytes),
                Err(reason) => Log::err(format!(
                    "{}",
                    SceneError::ResourceUnavailable {
                        url: body.url,
                        reason,
                    }
                )),
            }
        }
    }

    /// Parses a fetched externproto body on the simulation thread and swaps
    /// the resolved PROTO into the stub.
    fn finish_externproto(&mut self, stub: &Arc<ExternProtoMetatype>, url: &str, bytes: Vec<u8>) {
        let (base, fragment) = match url.split_once('#') {
            Some((base, fragment)) => (base.to_owned(), Some(fragment.to_owned())),
            None => (url.to_owned(), None),
        };

        let fetcher = PoolFetcher::new(&self.task_pool, self.resolver.clone());
        let parsed = {
            let ctx = SceneContext {
                metatypes: &self.metatypes,
                components: &self.components,
                profiles: &self.profiles,
                world_url: self.world_url.clone(),
                fetcher: Some(&fetcher),
            };
            parse_scene(
                ResourceHandle::from_memory(bytes),
                &base,
                media_type_for(&base),
                &ctx,
            )
        };

        match parsed {
            Err(error) => Log::err(format!(
                "{}",
                SceneError::ResourceUnavailable {
                    url: url.to_owned(),
                    reason: error.to_string(),
                }
            )),
            Ok(output) => {
                let ty = match &fragment {
                    Some(name) => output.scope.find_type(name),
                    None => output
                        .scope
                        .local_types()
                        .into_iter()
                        .find(|ty| ty.metatype_id().starts_with(&base)),
                };
                match ty.and_then(|ty| ty.metatype().clone().as_proto()) {
                    Some(proto) => {
                        self.metatypes.set_fetch_source(stub.id(), url);
                        stub.resolve(proto);
                        Log::info(format!("EXTERNPROTO {} resolved from {url}.", stub.id()));
                    }
                    None => Log::err(format!(
                        "{}",
                        SceneError::ResourceUnavailable {
                            url: url.to_owned(),
                            reason: "resource does not define the requested PROTO".to_owned(),
                        }
                    )),
                }
            }
        }
        self.pending_fetches.extend(fetcher.take());
    }

    /// Runs one traversal: metatype render hooks, bound viewpoint /
    /// background / fog, then the node graph. Bounding volumes classified
    /// fully outside the view volume are skipped; everything else is the
    /// viewer's business.
    pub fn render(&mut self, viewer: &mut dyn Viewer, _time: f64) {
        self.metatypes.render_all(viewer);

        if let Some(viewpoint) = self.stacks.top(BindableStackId::Viewpoint) {
            let position = viewpoint
                .get_field("position")
                .and_then(|v| v.as_vec3f())
                .unwrap_or_else(|| nalgebra::Vector3::new(0.0, 0.0, 10.0));
            let orientation = viewpoint
                .get_field("orientation")
                .and_then(|v| v.as_rotation())
                .unwrap_or_default();
            let fov = viewpoint
                .get_field("fieldOfView")
                .and_then(|v| v.as_float())
                .unwrap_or(0.785_398);
            let (avatar, limit) = match self.stacks.top(BindableStackId::NavigationInfo) {
                Some(info) => (
                    info.get_field("avatarSize")
                        .as_ref()
                        .and_then(FieldValue::as_mf_float)
                        .and_then(|sizes| sizes.first().copied())
                        .unwrap_or(0.25),
                    info.get_field("visibilityLimit")
                        .and_then(|v| v.as_float())
                        .unwrap_or(0.0),
                ),
                None => (0.25, 0.0),
            };
            viewer.set_viewpoint(position, orientation, fov, avatar, limit);
        }

        if let Some(background) = self.stacks.top(BindableStackId::Background) {
            background.with_fields(|fields| {
                let angles = |id: &str| match fields.get(id) {
                    Some(FieldValue::MfFloat(values)) => values.clone(),
                    _ => Vec::new(),
                };
                let colors = |id: &str| match fields.get(id) {
                    Some(FieldValue::MfColor(values)) => values.clone(),
                    _ => Vec::new(),
                };
                viewer.insert_background(
                    &angles("groundAngle"),
                    &colors("groundColor"),
                    &angles("skyAngle"),
                    &colors("skyColor"),
                );
            });
        }

        if let Some(fog) = self.stacks.top(BindableStackId::Fog) {
            let color = fog
                .get_field("color")
                .and_then(|v| match v {
                    FieldValue::SfColor(c) => Some(c),
                    _ => None,
                })
                .unwrap_or_else(|| nalgebra::Vector3::new(1.0, 1.0, 1.0));
            let range = fog
                .get_field("visibilityRange")
                .and_then(|v| v.as_float())
                .unwrap_or(0.0);
            let fog_type = fog
                .get_field("fogType")
                .and_then(|v| v.as_string().map(str::to_owned))
                .unwrap_or_else(|| "LINEAR".to_owned());
            viewer.set_fog(color, range, &fog_type);
        }

        let Some(scene) = &self.scene else {
            return;
        };
        let mut ctx = RenderContext {
            mode: viewer.mode(),
            matrix: Matrix4::identity(),
        };
        for root in &scene.roots {
            if viewer.intersect_view_volume(&root.bounding_volume()) == Intersection::Outside {
                continue;
            }
            root.render(viewer, &mut ctx);
        }
        for root in &scene.roots {
            root.clear_modified_deep();
        }
    }

    /// Tears the engine down: drops the scene, shuts every metatype down and
    /// tells outstanding fetch workers to drain.
    pub fn shutdown(&mut self, timestamp: f64) {
        self.queue.clear();
        self.stacks.clear();
        self.time_dependents.clear();
        self.pending_fetches.clear();
        self.scene = None;
        self.metatypes.shutdown_all(timestamp);
        self.task_pool.shutdown();
    }
}

fn stack_index(stack: BindableStackId) -> usize {
    match stack {
        BindableStackId::Viewpoint => 0,
        BindableStackId::NavigationInfo => 1,
        BindableStackId::Background => 2,
        BindableStackId::Fog => 3,
    }
}

/// Depth-first preorder over the whole graph, PROTO bodies included; each
/// node visited once.
fn walk_preorder(roots: &[Node]) -> Vec<Node> {
    let mut stack: Vec<Node> = roots.iter().rev().cloned().collect();
    let mut seen: Vec<usize> = Vec::new();
    let mut ordered = Vec::new();
    while let Some(node) = stack.pop() {
        if seen.contains(&node.instance_id()) {
            continue;
        }
        seen.push(node.instance_id());
        let children = node.all_children();
        for child in children.into_iter().rev() {
            stack.push(child);
        }
        ordered.push(node);
    }
    ordered
}

#[cfg(test)]
mod test {
    use super::Engine;
    use crate::viewer::test_support::RecordingViewer;
    use welt_core::io::ResourceHandle;

    fn engine_with(source: &str) -> Engine {
        let mut engine = Engine::new().unwrap();
        engine
            .load_stream(
                ResourceHandle::from_str(source),
                "file:///render.wrl",
                "model/vrml",
                0.0,
            )
            .unwrap();
        engine
    }

    #[test]
    fn traversal_reaches_the_leaves() {
        let mut engine = engine_with(
            "#VRML V2.0 utf8\n\
             Transform {\n\
               translation 1 0 0\n\
               children [\n\
                 Shape { geometry Box { size 2 2 2 } }\n\
                 DirectionalLight { }\n\
               ]\n\
             }",
        );
        let mut viewer = RecordingViewer::default();
        engine.render(&mut viewer, 0.0);
        assert!(viewer.calls.iter().any(|c| c == "set_viewpoint"));
        assert!(viewer.calls.iter().any(|c| c.starts_with("begin_object")));
        assert!(viewer.calls.iter().any(|c| c == "transform"));
        assert!(viewer.calls.iter().any(|c| c == "insert_box(2 2 2)"));
        assert!(viewer
            .calls
            .iter()
            .any(|c| c == "insert_directional_light"));
        assert!(viewer.calls.iter().any(|c| c == "end_object"));
    }

    #[test]
    fn switch_renders_only_the_chosen_child() {
        let mut engine = engine_with(
            "#VRML V2.0 utf8\n\
             Switch {\n\
               whichChoice 1\n\
               choice [\n\
                 Shape { geometry Sphere { radius 1 } }\n\
                 Shape { geometry Sphere { radius 2 } }\n\
               ]\n\
             }",
        );
        let mut viewer = RecordingViewer::default();
        engine.render(&mut viewer, 0.0);
        assert!(!viewer.calls.iter().any(|c| c == "insert_sphere(1)"));
        assert!(viewer.calls.iter().any(|c| c == "insert_sphere(2)"));
    }

    #[test]
    fn render_clears_modified_flags() {
        let mut engine = engine_with(
            "#VRML V2.0 utf8\n\
             DEF G Group { children [ Shape { geometry Box { } } ] }",
        );
        let group = engine.scene().unwrap().scope.find_node("G").unwrap();
        assert!(group.is_modified_deep());
        let mut viewer = RecordingViewer::default();
        engine.render(&mut viewer, 0.0);
        assert!(!group.is_modified_deep());
    }
}

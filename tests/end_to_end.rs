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

//! Whole-engine scenarios: parse a world, run the simulation, inspect the
//! graph.

use approx::assert_relative_eq;
use fxhash::FxHashMap;
use nalgebra::Vector3;
use welt::{
    engine::Engine,
    field::{print::print_scene, FieldValue},
    node::{BindableStackId, Node, NodeCategory},
    SceneError,
};
use welt_core::io::ResourceHandle;

fn load(engine: &mut Engine, source: &str) {
    engine
        .load_stream(
            ResourceHandle::from_str(source),
            "file:///test.wrl",
            "model/vrml",
            0.0,
        )
        .unwrap();
}

#[test]
fn box_shape_bounding_sphere() {
    let mut engine = Engine::new().unwrap();
    load(
        &mut engine,
        "#VRML V2.0 utf8\n\
         Group { children [ Shape { geometry Box { size 2 2 2 } } ] }",
    );

    let scene = engine.scene().unwrap();
    let group = &scene.roots[0];
    let FieldValue::MfNode(children) = group.get_field("children").unwrap() else {
        panic!("children is not MFNode");
    };
    let shape = &children[0];
    let volume = shape.bounding_volume();
    assert_relative_eq!(volume.radius, 3.0f32.sqrt(), epsilon = 1e-6);
    assert!(volume.center.norm() < 1e-6);
}

#[test]
fn timer_drives_interpolator_drives_transform() {
    let mut engine = Engine::new().unwrap();
    load(
        &mut engine,
        "#VRML V2.0 utf8\n\
         DEF TS TimeSensor { cycleInterval 1 loop TRUE }\n\
         DEF PI PositionInterpolator {\n\
             key [0, 0.5, 1]\n\
             keyValue [0 0 0, 1 0 0, 0 0 0]\n\
         }\n\
         DEF TR Transform { children [ Shape { geometry Sphere {} } ] }\n\
         ROUTE TS.fraction_changed TO PI.set_fraction\n\
         ROUTE PI.value_changed TO TR.set_translation",
    );

    let translation = |engine: &Engine| -> Vector3<f32> {
        engine
            .scene()
            .unwrap()
            .scope
            .find_node("TR")
            .unwrap()
            .get_field("translation")
            .unwrap()
            .as_vec3f()
            .unwrap()
    };

    engine.update(0.0);
    assert_relative_eq!(translation(&engine).x, 0.0, epsilon = 1e-6);

    engine.update(0.5);
    let mid = translation(&engine);
    assert_relative_eq!(mid.x, 1.0, epsilon = 1e-6);
    assert_relative_eq!(mid.y, 0.0, epsilon = 1e-6);

    engine.update(1.0);
    assert_relative_eq!(translation(&engine).x, 0.0, epsilon = 1e-6);
}

#[test]
fn time_sensor_single_cycle_deactivates_on_the_final_keyframe() {
    let mut engine = Engine::new().unwrap();
    load(
        &mut engine,
        "#VRML V2.0 utf8\n\
         DEF TS TimeSensor { cycleInterval 1 }",
    );
    let ts = engine.scene().unwrap().scope.find_node("TS").unwrap();

    engine.update(0.5);
    assert_eq!(
        ts.get_field("fraction_changed").unwrap(),
        FieldValue::SfFloat(0.5)
    );
    assert_eq!(ts.get_field("isActive").unwrap(), FieldValue::SfBool(true));

    engine.update(1.0);
    assert_eq!(
        ts.get_field("fraction_changed").unwrap(),
        FieldValue::SfFloat(1.0)
    );
    assert_eq!(ts.get_field("isActive").unwrap(), FieldValue::SfBool(false));
    assert_eq!(ts.get_field("cycleTime").unwrap(), FieldValue::SfTime(1.0));
    assert_eq!(ts.last_emit_time("isActive"), Some(1.0));
}

#[test]
fn update_clamps_time_non_decreasingly() {
    let mut engine = Engine::new().unwrap();
    load(
        &mut engine,
        "#VRML V2.0 utf8\n\
         DEF TS TimeSensor { cycleInterval 10 loop TRUE }",
    );
    let ts = engine.scene().unwrap().scope.find_node("TS").unwrap();

    engine.update(2.0);
    let at_two = ts.get_field("time").unwrap();
    // Going backwards is clamped to the previous update time.
    engine.update(1.0);
    assert_eq!(ts.get_field("time").unwrap(), at_two);
}

#[test]
fn first_viewpoint_is_bound_or_synthesized() {
    let mut engine = Engine::new().unwrap();
    load(
        &mut engine,
        "#VRML V2.0 utf8\n\
         DEF VP Viewpoint { position 0 0 5 }\n\
         Viewpoint { position 1 1 1 }",
    );
    let bound = engine.bound(BindableStackId::Viewpoint).unwrap();
    assert_eq!(bound.name().as_deref(), Some("VP"));
    assert_eq!(bound.get_field("isBound").unwrap(), FieldValue::SfBool(true));

    let mut empty = Engine::new().unwrap();
    load(&mut empty, "#VRML V2.0 utf8\nGroup { }");
    let synthetic = empty.bound(BindableStackId::Viewpoint).unwrap();
    assert_eq!(
        synthetic.get_field("position").unwrap(),
        FieldValue::SfVec3f(Vector3::new(0.0, 0.0, 10.0))
    );
}

#[test]
fn externproto_stub_resolves_in_place() {
    let mut engine = Engine::new().unwrap();
    load(
        &mut engine,
        "#VRML V2.0 utf8\n\
         EXTERNPROTO Widget [ exposedField SFVec3f position ] \"widgets.wrl#Widget\"\n\
         DEF W Widget { position 1 2 3 }",
    );

    let node = engine.scene().unwrap().scope.find_node("W").unwrap();
    assert_eq!(node.category(), NodeCategory::ExternProtoStub);

    let stub = engine
        .metatypes()
        .find("file:///widgets.wrl#Widget")
        .unwrap()
        .as_externproto()
        .unwrap();

    // Feed the proto body to the registry by hand, as if the fetch had
    // completed. The stub owns the original URI (registration is
    // append-only), so the body parses under its own URI.
    let world = welt::parser::SceneContext {
        metatypes: engine.metatypes(),
        components: &welt::component::ComponentRegistry::new().unwrap(),
        profiles: &welt::component::ProfileRegistry::new(),
        world_url: String::new(),
        fetcher: None,
    };
    let fetched = welt::parse_scene(
        ResourceHandle::from_str(
            "#VRML V2.0 utf8\n\
             PROTO Widget [ exposedField SFVec3f position 0 0 0 ] {\n\
               Transform { translation IS position }\n\
             }",
        ),
        "file:///widgets-fetched.wrl",
        "model/vrml",
        &world,
    )
    .unwrap();
    let proto = fetched
        .scope
        .find_type("Widget")
        .unwrap()
        .metatype()
        .clone()
        .as_proto()
        .unwrap();

    assert!(!stub.is_resolved());
    stub.resolve(proto);
    assert!(stub.is_resolved());

    // The already-constructed node now refers to a live body carrying the
    // instance's values.
    assert_eq!(node.category(), NodeCategory::ProtoInstance);
    let body = node.all_children();
    let transform = body
        .iter()
        .find(|n| n.node_type().local_id() == "Transform")
        .expect("resolved body");
    assert_eq!(
        transform.get_field("translation").unwrap(),
        FieldValue::SfVec3f(Vector3::new(1.0, 2.0, 3.0))
    );
}

#[test]
fn unresolved_route_reports_position() {
    let mut engine = Engine::new().unwrap();
    let err = engine
        .load_stream(
            ResourceHandle::from_str(
                "#VRML V2.0 utf8\n\
                 Viewpoint { position 0 0 10 }\n\
                 ROUTE vp.bindTime TO vp.set_bind",
            ),
            "file:///test.wrl",
            "model/vrml",
            0.0,
        )
        .unwrap_err();
    match err {
        SceneError::InvalidScene { line, col, .. } => {
            assert_eq!(line, 3);
            assert!(col > 1);
        }
        other => panic!("unexpected error {other:?}"),
    }
}

mod round_trip {
    use super::*;

    /// Structural graph equality: same types, DEF names, field values (node
    /// references compared structurally with sharing preserved) and route
    /// sets.
    fn graph_eq(a: &[Node], b: &[Node]) -> bool {
        let mut map: FxHashMap<usize, usize> = FxHashMap::default();
        if a.len() != b.len() {
            return false;
        }
        a.iter()
            .zip(b)
            .all(|(x, y)| node_eq(x, y, &mut map))
            && routes_of(a) == routes_of(b)
    }

    fn node_eq(a: &Node, b: &Node, map: &mut FxHashMap<usize, usize>) -> bool {
        if let Some(mapped) = map.get(&a.instance_id()) {
            return *mapped == b.instance_id();
        }
        map.insert(a.instance_id(), b.instance_id());

        if a.node_type().local_id() != b.node_type().local_id() || a.name() != b.name() {
            return false;
        }
        let a_fields = a.non_default_fields();
        let b_fields = b.non_default_fields();
        if a_fields.len() != b_fields.len() {
            return false;
        }
        a_fields.iter().zip(&b_fields).all(|((ak, av), (bk, bv))| {
            ak == bk
                && match (av, bv) {
                    (FieldValue::SfNode(Some(an)), FieldValue::SfNode(Some(bn))) => {
                        node_eq(an, bn, map)
                    }
                    (FieldValue::MfNode(an), FieldValue::MfNode(bn)) => {
                        an.len() == bn.len()
                            && an.iter().zip(bn).all(|(x, y)| node_eq(x, y, map))
                    }
                    (av, bv) => av == bv,
                }
        })
    }

    fn routes_of(roots: &[Node]) -> Vec<(String, String, String, String)> {
        let mut routes = Vec::new();
        let mut stack: Vec<Node> = roots.to_vec();
        let mut seen = Vec::new();
        while let Some(node) = stack.pop() {
            if seen.contains(&node.instance_id()) {
                continue;
            }
            seen.push(node.instance_id());
            if let Some(name) = node.name() {
                for (out, target, event_in) in node.outgoing_routes() {
                    if let Some(target_name) = target.name() {
                        routes.push((name.clone(), out, target_name, event_in));
                    }
                }
            }
            stack.extend(node.child_nodes());
        }
        routes.sort();
        routes
    }

    #[test]
    fn print_then_reparse_is_structurally_equal() {
        let source = "#VRML V2.0 utf8\n\
             DEF TS TimeSensor { cycleInterval 2 loop TRUE }\n\
             DEF PI PositionInterpolator {\n\
                 key [0, 0.5, 1]\n\
                 keyValue [0 0 0, 1 0 0, 0 0 0]\n\
             }\n\
             DEF TR Transform {\n\
                 translation 0 1 0\n\
                 children [\n\
                     Shape { geometry Sphere { radius 0.5 } }\n\
                     DEF L DirectionalLight { intensity 0.7 }\n\
                     USE L\n\
                 ]\n\
             }\n\
             ROUTE TS.fraction_changed TO PI.set_fraction\n\
             ROUTE PI.value_changed TO TR.set_translation";

        let mut engine = Engine::new().unwrap();
        load(&mut engine, source);
        let first: Vec<Node> = engine.scene().unwrap().roots.clone();

        let mut printed = String::from("#VRML V2.0 utf8\n");
        print_scene(&first, &mut printed).unwrap();

        let mut engine2 = Engine::new().unwrap();
        load(&mut engine2, &printed);
        let second: Vec<Node> = engine2.scene().unwrap().roots.clone();

        assert!(graph_eq(&first, &second), "printed form:\n{printed}");
    }
}

#[test]
fn proto_events_reach_the_body() {
    let mut engine = Engine::new().unwrap();
    load(
        &mut engine,
        "#VRML V2.0 utf8\n\
         PROTO Widget [ exposedField SFVec3f position 0 0 0 ] {\n\
           Transform { translation IS position }\n\
         }\n\
         DEF TS TimeSensor { cycleInterval 1 loop TRUE }\n\
         DEF PI PositionInterpolator { key [0, 1] keyValue [0 0 0, 2 0 0] }\n\
         DEF W Widget { }\n\
         ROUTE TS.fraction_changed TO PI.set_fraction\n\
         ROUTE PI.value_changed TO W.set_position",
    );

    engine.update(0.0);
    engine.update(0.5);

    let widget = engine.scene().unwrap().scope.find_node("W").unwrap();
    let transform = widget
        .all_children()
        .into_iter()
        .find(|n| n.node_type().local_id() == "Transform")
        .unwrap();
    assert_eq!(
        transform.get_field("translation").unwrap(),
        FieldValue::SfVec3f(Vector3::new(1.0, 0.0, 0.0))
    );
    // The instance's exposed storage tracks the redirect.
    assert_eq!(
        widget.get_field("position").unwrap(),
        FieldValue::SfVec3f(Vector3::new(1.0, 0.0, 0.0))
    );
}

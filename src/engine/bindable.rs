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

//! The four bindable-node stacks. LIFO with removal from any position; only
//! transitions between bound and unbound produce isBound events.

use crate::{
    event::queue::EventQueue,
    field::FieldValue,
    node::{BindableStackId, Node},
};

#[derive(Default)]
pub struct BindableStacks {
    stacks: [Vec<Node>; 4],
}

fn index(id: BindableStackId) -> usize {
    match id {
        BindableStackId::Viewpoint => 0,
        BindableStackId::NavigationInfo => 1,
        BindableStackId::Background => 2,
        BindableStackId::Fog => 3,
    }
}

fn notify_bound(node: &Node, bound: bool, timestamp: f64, queue: &mut EventQueue) {
    if matches!(
        node.category(),
        crate::node::NodeCategory::Bindable(BindableStackId::Viewpoint)
    ) && bound
    {
        node.emit_event("bindTime", FieldValue::SfTime(timestamp), timestamp, queue);
    }
    node.emit_event("isBound", FieldValue::SfBool(bound), timestamp, queue);
}

impl BindableStacks {
    /// The currently bound node of a category.
    pub fn top(&self, id: BindableStackId) -> Option<Node> {
        self.stacks[index(id)].last().cloned()
    }

    /// `set_bind TRUE`: the node becomes the new top; the previous top sees
    /// `isBound FALSE`. Binding the already-bound node is a no-op.
    pub fn bind(&mut self, id: BindableStackId, node: &Node, timestamp: f64, queue: &mut EventQueue) {
        let stack = &mut self.stacks[index(id)];
        if stack.last() == Some(node) {
            return;
        }
        if let Some(previous) = stack.last().cloned() {
            notify_bound(&previous, false, timestamp, queue);
        }
        stack.retain(|candidate| candidate != node);
        stack.push(node.clone());
        notify_bound(node, true, timestamp, queue);
    }

    /// `set_bind FALSE`: removes the node from any position. Only when it
    /// was on top does it see `isBound FALSE`, with the new top seeing
    /// `isBound TRUE`.
    pub fn unbind(
        &mut self,
        id: BindableStackId,
        node: &Node,
        timestamp: f64,
        queue: &mut EventQueue,
    ) {
        let stack = &mut self.stacks[index(id)];
        let was_top = stack.last() == Some(node);
        let before = stack.len();
        stack.retain(|candidate| candidate != node);
        if stack.len() == before {
            return;
        }
        if was_top {
            notify_bound(node, false, timestamp, queue);
            if let Some(new_top) = stack.last().cloned() {
                notify_bound(&new_top, true, timestamp, queue);
            }
        }
    }

    pub fn clear(&mut self) {
        for stack in &mut self.stacks {
            stack.clear();
        }
    }
}

#[cfg(test)]
mod test {
    use super::BindableStacks;
    use crate::{
        event::queue::EventQueue,
        field::FieldValue,
        node::{BindableStackId, Node},
        parser::test_support::TestWorld,
    };

    fn viewpoint(world: &TestWorld, tag: &str) -> Node {
        let output = world
            .parse(&format!(
                "#VRML V2.0 utf8\nDEF {tag} Viewpoint {{ }}"
            ))
            .unwrap();
        output.roots.into_iter().next().unwrap()
    }

    fn drain_is_bound(node: &Node) -> Option<bool> {
        node.get_field("isBound").and_then(|value| match value {
            FieldValue::SfBool(bound) => Some(bound),
            _ => None,
        })
    }

    #[test]
    fn bind_unbind_sequence() {
        let world = TestWorld::new();
        let a = viewpoint(&world, "A");
        let b = viewpoint(&world, "B");
        let mut stacks = BindableStacks::default();
        let mut queue = EventQueue::new();

        stacks.bind(BindableStackId::Viewpoint, &a, 1.0, &mut queue);
        assert_eq!(stacks.top(BindableStackId::Viewpoint).unwrap(), a);
        assert_eq!(drain_is_bound(&a), Some(true));

        stacks.bind(BindableStackId::Viewpoint, &b, 2.0, &mut queue);
        assert_eq!(stacks.top(BindableStackId::Viewpoint).unwrap(), b);
        assert_eq!(drain_is_bound(&a), Some(false));
        assert_eq!(drain_is_bound(&b), Some(true));

        // Removing a non-top entry changes no bound state.
        stacks.unbind(BindableStackId::Viewpoint, &a, 3.0, &mut queue);
        assert_eq!(stacks.top(BindableStackId::Viewpoint).unwrap(), b);
        assert_eq!(drain_is_bound(&a), Some(false));
        assert_eq!(drain_is_bound(&b), Some(true));

        stacks.unbind(BindableStackId::Viewpoint, &b, 4.0, &mut queue);
        assert!(stacks.top(BindableStackId::Viewpoint).is_none());
        assert_eq!(drain_is_bound(&b), Some(false));
    }

    #[test]
    fn rebinding_top_is_a_no_op() {
        let world = TestWorld::new();
        let a = viewpoint(&world, "A");
        let mut stacks = BindableStacks::default();
        let mut queue = EventQueue::new();
        stacks.bind(BindableStackId::Viewpoint, &a, 1.0, &mut queue);
        let events_before = queue.len();
        stacks.bind(BindableStackId::Viewpoint, &a, 2.0, &mut queue);
        assert_eq!(queue.len(), events_before);
    }
}

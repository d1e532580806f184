use std::collections::BTreeMap;

use crate::selector::Selector;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
struct Node {
    tag: String,
    attrs: BTreeMap<String, String>,
    style: BTreeMap<String, String>,
    text: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationRecord {
    pub added: Vec<NodeId>,
    pub removed: Vec<NodeId>,
}

/// In-process model of a host page.
///
/// Nodes live in an arena. A removed subtree stays addressable until
/// `release_detached`, so mutation records can still be matched against
/// selectors. Child-list changes under the body are queued until
/// `take_mutations`.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    body: NodeId,
    pending: Vec<MutationRecord>,
    free: Vec<NodeId>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        let mut doc = Self {
            nodes: Vec::new(),
            body: NodeId(0),
            pending: Vec::new(),
            free: Vec::new(),
        };
        doc.body = doc.create_element("body", &[]);
        doc
    }

    pub fn body(&self) -> NodeId {
        self.body
    }

    pub fn create_element(&mut self, tag: &str, attrs: &[(&str, &str)]) -> NodeId {
        let node = Node {
            tag: tag.to_ascii_lowercase(),
            attrs: attrs
                .iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), (*v).to_string()))
                .collect(),
            style: BTreeMap::new(),
            text: String::new(),
            parent: None,
            children: Vec::new(),
        };
        if let Some(id) = self.free.pop() {
            self.nodes[id.0] = node;
            return id;
        }
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    pub fn tag(&self, node: NodeId) -> &str {
        &self.nodes[node.0].tag
    }

    pub fn attr(&self, node: NodeId, name: &str) -> Option<&str> {
        self.nodes[node.0].attrs.get(name).map(String::as_str)
    }

    pub fn set_attr(&mut self, node: NodeId, name: &str, value: &str) {
        self.nodes[node.0]
            .attrs
            .insert(name.to_ascii_lowercase(), value.to_string());
    }

    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.attr(node, "class")
            .is_some_and(|classes| classes.split_whitespace().any(|c| c == class))
    }

    pub fn set_text(&mut self, node: NodeId, text: &str) {
        self.nodes[node.0].text = text.to_string();
    }

    pub fn text_content(&self, node: NodeId) -> String {
        let mut out = self.nodes[node.0].text.clone();
        for child in self.descendants(node) {
            out.push_str(&self.nodes[child.0].text);
        }
        out
    }

    pub fn style(&self, node: NodeId, property: &str) -> Option<&str> {
        self.nodes[node.0].style.get(property).map(String::as_str)
    }

    pub fn set_style(&mut self, node: NodeId, property: &str, value: &str) {
        self.nodes[node.0]
            .style
            .insert(property.to_string(), value.to_string());
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].parent
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node.0].children
    }

    pub fn is_connected(&self, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == self.body {
                return true;
            }
            current = self.nodes[id.0].parent;
        }
        false
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        if self.nodes[child.0].parent.is_some() {
            self.remove(child);
        }
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
        if self.is_connected(parent) {
            self.pending.push(MutationRecord {
                added: vec![child],
                removed: Vec::new(),
            });
        }
    }

    pub fn remove(&mut self, node: NodeId) {
        let Some(parent) = self.nodes[node.0].parent.take() else {
            return;
        };
        self.nodes[parent.0].children.retain(|c| *c != node);
        if self.is_connected(parent) {
            self.pending.push(MutationRecord {
                added: Vec::new(),
                removed: vec![node],
            });
        }
    }

    pub fn replace_children(&mut self, parent: NodeId, children: Vec<NodeId>) {
        let removed = std::mem::take(&mut self.nodes[parent.0].children);
        for old in &removed {
            self.nodes[old.0].parent = None;
        }
        for child in &children {
            if let Some(prev) = self.nodes[child.0].parent.take() {
                self.nodes[prev.0].children.retain(|c| c != child);
            }
            self.nodes[child.0].parent = Some(parent);
        }
        self.nodes[parent.0].children = children.clone();
        if self.is_connected(parent) && !(removed.is_empty() && children.is_empty()) {
            self.pending.push(MutationRecord {
                added: children,
                removed,
            });
        }
    }

    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.nodes[node.0].children.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.nodes[id.0].children.iter().rev().copied());
        }
        out
    }

    pub fn matches(&self, node: NodeId, selector: &Selector) -> bool {
        selector.matches(self, node)
    }

    pub fn query_selector_all(&self, selector: &Selector) -> Vec<NodeId> {
        self.descendants(self.body)
            .into_iter()
            .filter(|id| selector.matches(self, *id))
            .collect()
    }

    pub fn query_selector(&self, selector: &Selector) -> Option<NodeId> {
        self.descendants(self.body)
            .into_iter()
            .find(|id| selector.matches(self, *id))
    }

    pub fn query_selector_within(&self, root: NodeId, selector: &Selector) -> Option<NodeId> {
        self.descendants(root)
            .into_iter()
            .find(|id| selector.matches(self, *id))
    }

    pub fn take_mutations(&mut self) -> Vec<MutationRecord> {
        std::mem::take(&mut self.pending)
    }

    /// Frees every node not attached under the body once all mutation
    /// records have been taken. Freed ids are reused by `create_element`,
    /// so ids of detached nodes must not be kept across this call.
    pub fn release_detached(&mut self) -> usize {
        if !self.pending.is_empty() {
            return 0;
        }
        let mut keep = vec![false; self.nodes.len()];
        keep[self.body.0] = true;
        for id in self.descendants(self.body) {
            keep[id.0] = true;
        }
        for id in &self.free {
            keep[id.0] = true;
        }
        let mut released = 0;
        for (index, kept) in keep.into_iter().enumerate() {
            if kept {
                continue;
            }
            self.nodes[index] = Node {
                tag: String::new(),
                attrs: BTreeMap::new(),
                style: BTreeMap::new(),
                text: String::new(),
                parent: None,
                children: Vec::new(),
            };
            self.free.push(NodeId(index));
            released += 1;
        }
        released
    }
}

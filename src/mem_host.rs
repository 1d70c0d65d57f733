use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter, Write};
use std::rc::{Rc, Weak};
use crate::host::{AttributeObserver, HostTree, Listener, Namespace, Value};

/// An in-memory [HostTree]. Useful headless and in tests.
///
/// Counts the elements and text nodes it creates and the nodes it removes, so you can check that
/// an update didn't rebuild anything.
#[derive(Clone, Default)]
pub struct MemTree(Rc<MemTreeInner>);

#[derive(Default)]
struct MemTreeInner {
    next_id: Cell<u64>,
    elements_created: Cell<usize>,
    texts_created: Cell<usize>,
    removed: Cell<usize>
}

/// A node in a [MemTree]. Compares by identity.
#[derive(Clone)]
pub struct MemNode(Rc<NodeData>);

/// Weak [MemNode].
#[derive(Clone)]
pub struct MemWeak(Weak<NodeData>);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemNodeKind {
    Element { tag: String, namespace: Namespace },
    Text,
    Marker,
    Fragment
}

/// The event passed to listeners by [MemTree::dispatch].
#[derive(Debug, Clone)]
pub struct MemEvent {
    pub kind: String,
    pub target: MemNode
}

struct NodeData {
    id: u64,
    kind: MemNodeKind,
    text: RefCell<String>,
    parent: RefCell<Weak<NodeData>>,
    children: RefCell<Vec<MemNode>>,
    attributes: RefCell<BTreeMap<String, String>>,
    properties: RefCell<BTreeMap<String, Value>>,
    listeners: RefCell<Vec<(String, Listener<MemTree>)>>,
    observers: RefCell<Vec<AttributeObserver>>,
    removed: Cell<bool>
}

impl MemTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of elements created so far.
    pub fn elements_created(&self) -> usize {
        self.0.elements_created.get()
    }

    /// Number of text nodes created so far.
    pub fn texts_created(&self) -> usize {
        self.0.texts_created.get()
    }

    /// Number of [HostTree::remove] calls so far.
    pub fn removed(&self) -> usize {
        self.0.removed.get()
    }

    /// Call every listener of `node` registered for `kind`.
    pub fn dispatch(&self, node: &MemNode, kind: &str) {
        let listeners = node.0.listeners.borrow()
            .iter()
            .filter(|(event, _)| event == kind)
            .map(|(_, listener)| listener.clone())
            .collect::<Vec<_>>();
        let event = MemEvent {
            kind: kind.to_string(),
            target: node.clone()
        };
        for listener in listeners {
            listener(&event);
        }
    }

    /// Number of listeners `node` has for `kind`.
    pub fn listener_count(&self, node: &MemNode, kind: &str) -> usize {
        node.0.listeners.borrow().iter().filter(|(event, _)| event == kind).count()
    }

    /// Serialize `node`'s children, skipping region markers.
    pub fn inner_html(&self, node: &MemNode) -> String {
        let mut out = String::new();
        for child in node.children() {
            child.write_html(&mut out, false);
        }
        out
    }

    /// Serialize `node`'s children, writing region markers as `<!---->`.
    pub fn inner_html_with_markers(&self, node: &MemNode) -> String {
        let mut out = String::new();
        for child in node.children() {
            child.write_html(&mut out, true);
        }
        out
    }

    fn next_node(&self, kind: MemNodeKind, text: &str) -> MemNode {
        let id = self.0.next_id.get() + 1;
        self.0.next_id.set(id);
        match kind {
            MemNodeKind::Element { .. } => self.0.elements_created.set(self.0.elements_created.get() + 1),
            MemNodeKind::Text => self.0.texts_created.set(self.0.texts_created.get() + 1),
            _ => {}
        }
        MemNode(Rc::new(NodeData {
            id,
            kind,
            text: RefCell::new(text.to_string()),
            parent: RefCell::new(Weak::new()),
            children: RefCell::new(Vec::new()),
            attributes: RefCell::new(BTreeMap::new()),
            properties: RefCell::new(BTreeMap::new()),
            listeners: RefCell::new(Vec::new()),
            observers: RefCell::new(Vec::new()),
            removed: Cell::new(false)
        }))
    }

    fn notify_observers(&self, node: &MemNode, name: &str, value: Option<&str>) {
        let observers = node.0.observers.borrow().clone();
        for observer in observers {
            observer(name, value);
        }
    }
}

impl MemNode {
    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn kind(&self) -> &MemNodeKind {
        &self.0.kind
    }

    /// Tag name, if this is an element.
    pub fn tag(&self) -> Option<&str> {
        match &self.0.kind {
            MemNodeKind::Element { tag, .. } => Some(tag),
            _ => None
        }
    }

    pub fn is_marker(&self) -> bool {
        self.0.kind == MemNodeKind::Marker
    }

    pub fn children(&self) -> Vec<MemNode> {
        self.0.children.borrow().clone()
    }

    /// Child elements, skipping text and markers.
    pub fn child_elements(&self) -> Vec<MemNode> {
        self.children().into_iter().filter(|child| child.tag().is_some()).collect()
    }

    /// Concatenated text of this node and its descendants.
    pub fn text_content(&self) -> String {
        match &self.0.kind {
            MemNodeKind::Text => self.0.text.borrow().clone(),
            MemNodeKind::Marker => String::new(),
            _ => self.children().iter().map(MemNode::text_content).collect()
        }
    }

    /// Whether this node was removed from its tree and not re-inserted since.
    pub fn is_removed(&self) -> bool {
        self.0.removed.get()
    }

    fn parent_node(&self) -> Option<MemNode> {
        self.0.parent.borrow().upgrade().map(MemNode)
    }

    fn detach(&self) {
        if let Some(parent) = self.parent_node() {
            parent.0.children.borrow_mut().retain(|child| !Rc::ptr_eq(&child.0, &self.0));
        }
        *self.0.parent.borrow_mut() = Weak::new();
    }

    fn set_removed(&self, removed: bool) {
        self.0.removed.set(removed);
        for child in self.0.children.borrow().iter() {
            child.set_removed(removed);
        }
    }

    fn write_html(&self, out: &mut String, markers: bool) {
        match &self.0.kind {
            MemNodeKind::Element { tag, .. } => {
                let _ = write!(out, "<{}", tag);
                for (name, value) in self.0.attributes.borrow().iter() {
                    let _ = write!(out, " {}=\"{}\"", name, value);
                }
                out.push('>');
                for child in self.children() {
                    child.write_html(out, markers);
                }
                let _ = write!(out, "</{}>", tag);
            }
            MemNodeKind::Text => out.push_str(&self.0.text.borrow()),
            MemNodeKind::Marker => if markers {
                out.push_str("<!---->")
            },
            MemNodeKind::Fragment => for child in self.children() {
                child.write_html(out, markers);
            }
        }
    }
}

impl HostTree for MemTree {
    type Node = MemNode;
    type WeakNode = MemWeak;
    type Key = u64;
    type Event = MemEvent;

    fn create_element(&self, tag: &str, namespace: &Namespace) -> MemNode {
        self.next_node(MemNodeKind::Element { tag: tag.to_string(), namespace: namespace.clone() }, "")
    }

    fn create_text(&self, text: &str) -> MemNode {
        self.next_node(MemNodeKind::Text, text)
    }

    fn create_marker(&self) -> MemNode {
        self.next_node(MemNodeKind::Marker, "")
    }

    fn create_fragment(&self) -> MemNode {
        self.next_node(MemNodeKind::Fragment, "")
    }

    fn insert_before(&self, parent: &MemNode, node: &MemNode, reference: Option<&MemNode>) {
        if node.0.kind == MemNodeKind::Fragment {
            let children = std::mem::take(&mut *node.0.children.borrow_mut());
            for child in children {
                *child.0.parent.borrow_mut() = Weak::new();
                self.insert_before(parent, &child, reference);
            }
            return;
        }
        node.detach();
        {
            let mut children = parent.0.children.borrow_mut();
            let position = reference.and_then(|reference| children.iter().position(|child| Rc::ptr_eq(&child.0, &reference.0)));
            if reference.is_some() && position.is_none() {
                log::warn!("insert_before: reference node {} is not a child of {}", reference.map_or(0, MemNode::id), parent.id());
            }
            match position {
                Some(position) => children.insert(position, node.clone()),
                None => children.push(node.clone())
            }
        }
        *node.0.parent.borrow_mut() = Rc::downgrade(&parent.0);
        if node.is_removed() {
            node.set_removed(false);
        }
    }

    fn remove(&self, node: &MemNode) {
        node.detach();
        node.set_removed(true);
        self.0.removed.set(self.0.removed.get() + 1);
    }

    fn replace(&self, old: &MemNode, new: &MemNode) {
        if let Some(parent) = old.parent_node() {
            self.insert_before(&parent, new, Some(old));
        }
        self.remove(old);
    }

    fn parent(&self, node: &MemNode) -> Option<MemNode> {
        node.parent_node()
    }

    fn first_child(&self, node: &MemNode) -> Option<MemNode> {
        node.0.children.borrow().first().cloned()
    }

    fn next_sibling(&self, node: &MemNode) -> Option<MemNode> {
        let parent = node.parent_node()?;
        let children = parent.0.children.borrow();
        let position = children.iter().position(|child| Rc::ptr_eq(&child.0, &node.0))?;
        children.get(position + 1).cloned()
    }

    fn is_text(&self, node: &MemNode) -> bool {
        node.0.kind == MemNodeKind::Text
    }

    fn set_text(&self, node: &MemNode, text: &str) {
        *node.0.text.borrow_mut() = text.to_string();
    }

    fn namespace(&self, node: &MemNode) -> Namespace {
        match &node.0.kind {
            MemNodeKind::Element { namespace, .. } => namespace.clone(),
            _ => node.parent_node().map_or(Namespace::Html, |parent| self.namespace(&parent))
        }
    }

    fn attribute(&self, node: &MemNode, name: &str) -> Option<String> {
        node.0.attributes.borrow().get(name).cloned()
    }

    fn attribute_names(&self, node: &MemNode) -> Vec<String> {
        node.0.attributes.borrow().keys().cloned().collect()
    }

    fn set_attribute(&self, node: &MemNode, name: &str, value: &str) {
        node.0.attributes.borrow_mut().insert(name.to_string(), value.to_string());
        self.notify_observers(node, name, Some(value));
    }

    fn remove_attribute(&self, node: &MemNode, name: &str) {
        let removed = node.0.attributes.borrow_mut().remove(name);
        if removed.is_some() {
            self.notify_observers(node, name, None);
        }
    }

    fn toggle_attribute(&self, node: &MemNode, name: &str, on: bool) {
        if on {
            self.set_attribute(node, name, "");
        } else {
            self.remove_attribute(node, name);
        }
    }

    fn property(&self, node: &MemNode, name: &str) -> Value {
        node.0.properties.borrow().get(name).cloned().unwrap_or(Value::Null)
    }

    fn set_property(&self, node: &MemNode, name: &str, value: Value) {
        node.0.properties.borrow_mut().insert(name.to_string(), value);
    }

    fn add_event_listener(&self, node: &MemNode, event: &str, listener: Listener<Self>) {
        node.0.listeners.borrow_mut().push((event.to_string(), listener));
    }

    fn remove_event_listener(&self, node: &MemNode, event: &str) {
        node.0.listeners.borrow_mut().retain(|(kind, _)| kind != event);
    }

    fn observe_attributes(&self, node: &MemNode, observer: AttributeObserver) {
        node.0.observers.borrow_mut().push(observer);
    }

    fn downgrade(&self, node: &MemNode) -> MemWeak {
        MemWeak(Rc::downgrade(&node.0))
    }

    fn resolve(&self, weak: &MemWeak) -> Option<MemNode> {
        weak.0.upgrade().map(MemNode).filter(|node| !node.is_removed())
    }

    fn key(&self, node: &MemNode) -> u64 {
        node.0.id
    }
}

impl PartialEq for MemNode {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for MemNode {}

impl Debug for MemNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemNode")
            .field("id", &self.0.id)
            .field("kind", &self.0.kind)
            .finish_non_exhaustive()
    }
}

impl Debug for MemTree {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemTree")
            .field("elements_created", &self.elements_created())
            .field("texts_created", &self.texts_created())
            .field("removed", &self.removed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragments_move_their_children() {
        let host = MemTree::new();
        let root = host.create_element("div", &Namespace::Html);
        let fragment = host.create_fragment();
        host.append(&fragment, &host.create_text("a"));
        host.append(&fragment, &host.create_text("b"));
        host.append(&root, &fragment);
        assert_eq!(host.inner_html(&root), "ab");
        assert!(fragment.children().is_empty());
    }

    #[test]
    fn removed_nodes_do_not_resolve_until_reinserted() {
        let host = MemTree::new();
        let root = host.create_element("div", &Namespace::Html);
        let child = host.create_element("span", &Namespace::Html);
        let grandchild = host.create_text("x");
        host.append(&child, &grandchild);
        host.append(&root, &child);
        let weak = host.downgrade(&grandchild);
        host.remove(&child);
        assert!(host.resolve(&weak).is_none());
        host.append(&root, &child);
        assert_eq!(host.resolve(&weak), Some(grandchild));
    }

    #[test]
    fn insert_before_reference() {
        let host = MemTree::new();
        let root = host.create_element("ul", &Namespace::Html);
        let end = host.create_marker();
        host.append(&root, &end);
        host.insert_before(&root, &host.create_text("x"), Some(&end));
        assert_eq!(host.inner_html_with_markers(&root), "x<!---->");
        assert_eq!(host.next_sibling(&host.first_child(&root).unwrap()), Some(end));
    }
}

use std::fmt::{Debug, Display, Formatter};
use std::hash::Hash;
use std::rc::Rc;
use derivative::Derivative;
use crate::effect::WeakTarget;

/// An event handler registered on a host node.
pub type Listener<H> = Rc<dyn Fn(&<H as HostTree>::Event)>;

/// Called with `(attribute name, new value)` whenever an observed element's attribute changes.
/// `None` means the attribute was removed.
pub type AttributeObserver = Rc<dyn Fn(&str, Option<&str>)>;

/// The namespace elements are created in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Namespace {
    Html,
    Svg,
    MathMl,
    Other(Rc<str>)
}

/// A scalar written to a property or attribute, or rendered as text.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>)
}

/// The live tree the renderer patches, e.g. a browser DOM or [crate::MemTree].
///
/// This is everything the runtime ever asks of the host. Nodes are handles: cloning a node
/// clones the handle, not the node.
pub trait HostTree: Clone + 'static {
    type Node: Clone + 'static;
    /// Lookup capability to a node which doesn't keep it alive.
    type WeakNode: Clone + 'static;
    /// Identity of a node, for side tables.
    type Key: Copy + Eq + Hash + Debug + 'static;
    type Event: 'static;

    fn create_element(&self, tag: &str, namespace: &Namespace) -> Self::Node;
    fn create_text(&self, text: &str) -> Self::Node;
    /// A comment-like node with no content, used as a region boundary.
    fn create_marker(&self) -> Self::Node;
    /// A detached container. Inserting it moves its children instead.
    fn create_fragment(&self) -> Self::Node;

    /// Insert `node` into `parent` before `reference`, or at the end if `reference` is `None`.
    /// Moves `node` if it already has a parent.
    fn insert_before(&self, parent: &Self::Node, node: &Self::Node, reference: Option<&Self::Node>);
    fn append(&self, parent: &Self::Node, node: &Self::Node) {
        self.insert_before(parent, node, None)
    }
    /// Detach `node`. A removed node no longer [resolves](HostTree::resolve).
    fn remove(&self, node: &Self::Node);
    fn replace(&self, old: &Self::Node, new: &Self::Node);

    fn parent(&self, node: &Self::Node) -> Option<Self::Node>;
    fn first_child(&self, node: &Self::Node) -> Option<Self::Node>;
    fn next_sibling(&self, node: &Self::Node) -> Option<Self::Node>;

    fn is_text(&self, node: &Self::Node) -> bool;
    /// Replace a text node's character data.
    fn set_text(&self, node: &Self::Node, text: &str);
    /// Namespace new children of `node` default to.
    fn namespace(&self, node: &Self::Node) -> Namespace;

    fn attribute(&self, node: &Self::Node, name: &str) -> Option<String>;
    fn attribute_names(&self, node: &Self::Node) -> Vec<String>;
    fn set_attribute(&self, node: &Self::Node, name: &str, value: &str);
    fn remove_attribute(&self, node: &Self::Node, name: &str);
    /// Set a boolean attribute to present (`on`) or absent.
    fn toggle_attribute(&self, node: &Self::Node, name: &str, on: bool);
    fn property(&self, node: &Self::Node, name: &str) -> Value;
    fn set_property(&self, node: &Self::Node, name: &str, value: Value);

    fn add_event_listener(&self, node: &Self::Node, event: &str, listener: Listener<Self>);
    /// Remove every listener added for `event`.
    fn remove_event_listener(&self, node: &Self::Node, event: &str);
    fn observe_attributes(&self, node: &Self::Node, observer: AttributeObserver);

    fn downgrade(&self, node: &Self::Node) -> Self::WeakNode;
    /// `None` if the node was reclaimed or removed from its tree.
    fn resolve(&self, weak: &Self::WeakNode) -> Option<Self::Node>;
    fn key(&self, node: &Self::Node) -> Self::Key;

    fn same_node(&self, a: &Self::Node, b: &Self::Node) -> bool {
        self.key(a) == self.key(b)
    }
}

/// A weak host node, usable as a [mutation effect](crate::RxRuntime::mutation_effect) target.
#[derive(Derivative)]
#[derivative(Clone(bound = ""))]
pub struct HostRef<H: HostTree> {
    host: H,
    weak: H::WeakNode
}

impl<H: HostTree> HostRef<H> {
    pub fn new(host: &H, node: &H::Node) -> Self {
        HostRef {
            host: host.clone(),
            weak: host.downgrade(node)
        }
    }

    pub fn resolve(&self) -> Option<H::Node> {
        self.host.resolve(&self.weak)
    }

    pub fn host(&self) -> &H {
        &self.host
    }
}

impl<H: HostTree> WeakTarget for HostRef<H> {
    type Target = H::Node;

    fn resolve(&self) -> Option<H::Node> {
        HostRef::resolve(self)
    }
}

impl<H: HostTree> Debug for HostRef<H> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let key = self.resolve().map(|node| self.host.key(&node));
        f.debug_struct("HostRef").field("key", &key).finish()
    }
}

impl Namespace {
    pub fn uri(&self) -> &str {
        match self {
            Namespace::Html => "http://www.w3.org/1999/xhtml",
            Namespace::Svg => "http://www.w3.org/2000/svg",
            Namespace::MathMl => "http://www.w3.org/1998/Math/MathML",
            Namespace::Other(uri) => &**uri
        }
    }

    /// The namespace a tag switches its subtree into, if it switches.
    pub fn for_tag(tag: &str) -> Option<Namespace> {
        match tag {
            "svg" => Some(Namespace::Svg),
            "math" => Some(Namespace::MathMl),
            _ => None
        }
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Namespace::Html
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            _ => None
        }
    }
}

/// `Null` displays as the empty string.
impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(value) => write!(f, "{}", value),
            Value::Int(value) => write!(f, "{}", value),
            Value::Float(value) => write!(f, "{}", value),
            Value::Str(value) => f.write_str(value)
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value.into())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

/// Past `i64::MAX` this falls back to the nearest `Float`.
impl From<usize> for Value {
    fn from(value: usize) -> Self {
        i64::try_from(value).map_or(Value::Float(value as f64), Value::Int)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.into())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value.into())
    }
}

impl From<Rc<str>> for Value {
    fn from(value: Rc<str>) -> Self {
        Value::Str(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn large_indices_do_not_wrap() {
        assert_eq!(Value::from(7usize), Value::Int(7));
        if usize::BITS == 64 {
            assert_eq!(Value::from(usize::MAX), Value::Float(usize::MAX as f64));
        }
        assert_eq!(Value::from(None::<i64>).to_string(), "");
    }
}

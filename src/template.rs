use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use crate::error::TemplateError;
use crate::host::Namespace;

/// The compiled, structure-only form of one template.
///
/// Built once per distinct template and shared (by `Rc`) between every invocation, which pairs it
/// with fresh arguments in a [crate::Markup]. Holes refer to arguments by index.
#[derive(Debug)]
pub struct Template {
    nodes: Vec<TemplateNode>,
    holes: usize
}

#[derive(Debug, Clone)]
pub enum TemplateNode {
    Element(Rc<ElementDesc>),
    Text(Rc<str>),
    /// Argument index
    Hole(usize)
}

#[derive(Debug)]
pub struct ElementDesc {
    pub tag: Rc<str>,
    /// Set when this element switches namespace (`svg`, `math`), otherwise inherited.
    pub namespace: Option<Namespace>,
    pub attrs: Vec<AttrDesc>,
    pub children: Vec<TemplateNode>,
    /// Whether this element or anything under it has a hole.
    pub dynamic: bool
}

#[derive(Debug, Clone)]
pub struct AttrDesc {
    pub name: Rc<str>,
    pub value: AttrValue
}

#[derive(Debug, Clone)]
pub enum AttrValue {
    /// Present with no value, e.g. `disabled`
    Flag,
    Static(Rc<str>),
    /// The whole value is an argument: a property, or an event handler for `on*` names
    Hole(usize),
    /// Quoted value mixing text and arguments, written as an attribute string
    Parts(Vec<AttrPart>)
}

#[derive(Debug, Clone)]
pub enum AttrPart {
    Text(Rc<str>),
    Hole(usize)
}

/// Builds a [Template] node by node, checking that tags are closed in order.
///
/// ```
/// use mini_rx_dom::TemplateBuilder;
///
/// let template = TemplateBuilder::new()
///     .open("li")
///     .attr_parts("class", |parts| parts.text("item ").hole())
///     .attr_hole("onclick")
///     .hole()
///     .close("li")
///     .build()
///     .unwrap();
/// assert_eq!(template.holes(), 3);
/// ```
///
/// The first error sticks and is returned from [TemplateBuilder::build].
#[derive(Debug, Default)]
pub struct TemplateBuilder {
    stack: Vec<OpenElement>,
    nodes: Vec<TemplateNode>,
    holes: usize,
    error: Option<TemplateError>
}

/// Text and holes of a quoted attribute value.
#[derive(Debug)]
pub struct AttrParts<'a> {
    parts: Vec<AttrPart>,
    holes: &'a mut usize
}

/// Hands out the same [Template] for the same template identity.
#[derive(Debug, Default)]
pub struct TemplateCache {
    templates: RefCell<HashMap<&'static str, Rc<Template>>>
}

#[derive(Debug)]
struct OpenElement {
    tag: Rc<str>,
    namespace: Option<Namespace>,
    attrs: Vec<AttrDesc>,
    children: Vec<TemplateNode>,
    dynamic: bool
}

impl Template {
    pub fn nodes(&self) -> &[TemplateNode] {
        &self.nodes
    }

    /// How many arguments an invocation needs.
    pub fn holes(&self) -> usize {
        self.holes
    }
}

impl AttrDesc {
    /// The event type if this is an event attribute (`onclick` with a hole → `click`).
    pub fn event(&self) -> Option<&str> {
        match self.value {
            AttrValue::Hole(_) => self.name.strip_prefix("on"),
            _ => None
        }
    }

    pub fn is_dynamic(&self) -> bool {
        match &self.value {
            AttrValue::Flag | AttrValue::Static(_) => false,
            AttrValue::Hole(_) => true,
            AttrValue::Parts(parts) => parts.iter().any(|part| matches!(part, AttrPart::Hole(_)))
        }
    }
}

impl TemplateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open an element. Attributes added next belong to it until [TemplateBuilder::close].
    pub fn open(mut self, tag: &str) -> Self {
        self.stack.push(OpenElement {
            tag: tag.into(),
            namespace: Namespace::for_tag(tag),
            attrs: Vec::new(),
            children: Vec::new(),
            dynamic: false
        });
        self
    }

    /// Close the innermost open element, which must be `tag`.
    pub fn close(self, tag: &str) -> Self {
        match self.stack.last().map(|open| open.tag.clone()) {
            None => self.fail(TemplateError::UnexpectedClose(tag.to_string())),
            Some(open) if &*open != tag => {
                self.fail(TemplateError::MismatchedClose { expected: open.to_string(), found: tag.to_string() })
            }
            Some(_) => self.end()
        }
    }

    /// Close the innermost open element whatever its tag (a self-closing `/>`).
    pub fn end(mut self) -> Self {
        let Some(open) = self.stack.pop() else {
            return self.fail(TemplateError::UnexpectedClose(String::new()));
        };
        let dynamic = open.dynamic;
        let element = TemplateNode::Element(Rc::new(ElementDesc {
            tag: open.tag,
            namespace: open.namespace,
            attrs: open.attrs,
            children: open.children,
            dynamic
        }));
        self.push_node(element, dynamic);
        self
    }

    pub fn attr(self, name: &str, value: &str) -> Self {
        self.push_attr(name, AttrValue::Static(value.into()))
    }

    pub fn flag(self, name: &str) -> Self {
        self.push_attr(name, AttrValue::Flag)
    }

    /// An attribute whose whole value is the next argument.
    pub fn attr_hole(mut self, name: &str) -> Self {
        let hole = self.next_hole();
        self.push_attr(name, AttrValue::Hole(hole))
    }

    /// A quoted attribute value built from text and arguments.
    pub fn attr_parts(mut self, name: &str, build: impl for<'p, 'h> FnOnce(&'p mut AttrParts<'h>) -> &'p mut AttrParts<'h>) -> Self {
        let mut parts = AttrParts {
            parts: Vec::new(),
            holes: &mut self.holes
        };
        build(&mut parts);
        let parts = parts.parts;
        self.push_attr(name, AttrValue::Parts(parts))
    }

    /// Static text. Whitespace-only text is dropped.
    pub fn text(mut self, text: &str) -> Self {
        if !text.trim().is_empty() {
            self.push_node(TemplateNode::Text(text.into()), false);
        }
        self
    }

    /// A child position filled by the next argument.
    pub fn hole(mut self) -> Self {
        let hole = self.next_hole();
        self.push_node(TemplateNode::Hole(hole), true);
        self
    }

    pub fn build(self) -> Result<Template, TemplateError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        if let Some(open) = self.stack.last() {
            return Err(TemplateError::Unclosed(open.tag.to_string()));
        }
        Ok(Template {
            nodes: self.nodes,
            holes: self.holes
        })
    }

    fn next_hole(&mut self) -> usize {
        let hole = self.holes;
        self.holes += 1;
        hole
    }

    fn push_node(&mut self, node: TemplateNode, dynamic: bool) {
        match self.stack.last_mut() {
            Some(open) => {
                open.children.push(node);
                open.dynamic |= dynamic;
            }
            None => self.nodes.push(node)
        }
    }

    fn push_attr(mut self, name: &str, value: AttrValue) -> Self {
        let attr = AttrDesc { name: name.into(), value };
        match self.stack.last_mut() {
            Some(open) => {
                open.dynamic |= attr.is_dynamic();
                open.attrs.push(attr);
                self
            }
            None => self.fail(TemplateError::AttributeOutsideTag(name.to_string()))
        }
    }

    fn fail(mut self, error: TemplateError) -> Self {
        if self.error.is_none() {
            self.error = Some(error);
        }
        self
    }
}

impl<'a> AttrParts<'a> {
    pub fn text(&mut self, text: &str) -> &mut Self {
        self.parts.push(AttrPart::Text(text.into()));
        self
    }

    pub fn hole(&mut self) -> &mut Self {
        let hole = *self.holes;
        *self.holes += 1;
        self.parts.push(AttrPart::Hole(hole));
        self
    }
}

impl TemplateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The template cached under `id`, building it on first use. Build errors aren't cached.
    pub fn get_or_build(&self, id: &'static str, build: impl FnOnce() -> Result<Template, TemplateError>) -> Result<Rc<Template>, TemplateError> {
        if let Some(template) = self.templates.borrow().get(id) {
            return Ok(template.clone());
        }
        let template = Rc::new(build()?);
        self.templates.borrow_mut().insert(id, template.clone());
        Ok(template)
    }

    pub fn len(&self) -> usize {
        self.templates.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatched_close_is_an_error() {
        let result = TemplateBuilder::new().open("ul").open("li").close("ul").close("ul").build();
        assert_eq!(result.unwrap_err(), TemplateError::MismatchedClose { expected: "li".into(), found: "ul".into() });
    }

    #[test]
    fn unclosed_and_unexpected_close() {
        assert_eq!(TemplateBuilder::new().open("div").build().unwrap_err(), TemplateError::Unclosed("div".into()));
        assert_eq!(TemplateBuilder::new().close("div").build().unwrap_err(), TemplateError::UnexpectedClose("div".into()));
        assert_eq!(TemplateBuilder::new().attr("a", "b").build().unwrap_err(), TemplateError::AttributeOutsideTag("a".into()));
    }

    #[test]
    fn holes_are_numbered_in_order() {
        let template = TemplateBuilder::new()
            .open("a")
            .attr_hole("href")
            .attr_parts("class", |parts| parts.hole().text(" x ").hole())
            .hole()
            .close("a")
            .hole()
            .build()
            .unwrap();
        assert_eq!(template.holes(), 5);
        let TemplateNode::Element(a) = &template.nodes()[0] else { panic!("expected element") };
        assert!(matches!(a.attrs[0].value, AttrValue::Hole(0)));
        match &a.attrs[1].value {
            AttrValue::Parts(parts) => {
                assert!(matches!(parts[0], AttrPart::Hole(1)));
                assert!(matches!(parts[2], AttrPart::Hole(2)));
            }
            other => panic!("expected parts, got {:?}", other)
        }
        assert!(matches!(a.children[0], TemplateNode::Hole(3)));
        assert!(matches!(template.nodes()[1], TemplateNode::Hole(4)));
    }

    #[test]
    fn static_subtrees_are_not_dynamic() {
        let template = TemplateBuilder::new()
            .open("div")
            .open("p").text("static").close("p")
            .open("svg").open("circle").attr_hole("r").end().close("svg")
            .close("div")
            .build()
            .unwrap();
        let TemplateNode::Element(div) = &template.nodes()[0] else { panic!("expected element") };
        assert!(div.dynamic);
        let TemplateNode::Element(p) = &div.children[0] else { panic!("expected element") };
        assert!(!p.dynamic);
        let TemplateNode::Element(svg) = &div.children[1] else { panic!("expected element") };
        assert_eq!(svg.namespace, Some(Namespace::Svg));
        assert!(svg.dynamic);
    }

    #[test]
    fn cache_returns_the_same_template() {
        let cache = TemplateCache::new();
        let build = || TemplateBuilder::new().open("p").hole().close("p").build();
        let a = cache.get_or_build("p", build).unwrap();
        let b = cache.get_or_build("p", || panic!("should be cached")).unwrap();
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
        assert!(cache.get_or_build("bad", || TemplateBuilder::new().open("p").build()).is_err());
        assert_eq!(cache.len(), 1);
    }
}

use std::fmt::{Debug, Formatter};
use std::rc::Rc;
use derivative::Derivative;
use crate::error::TemplateError;
use crate::host::{HostTree, Listener, Value};
use crate::render::RegionRenderer;
use crate::template::Template;

/// One invocation of a template: the shared [Template] plus this invocation's arguments.
#[derive(Derivative)]
#[derivative(Clone(bound = ""))]
pub struct Markup<H: HostTree> {
    template: Rc<Template>,
    args: Rc<[Arg<H>]>
}

/// What fills a hole of a template.
#[derive(Derivative)]
#[derivative(Clone(bound = ""))]
pub enum Arg<H: HostTree> {
    /// Rendered once as text, or written once to an attribute/property. `Null` renders nothing.
    Value(Value),
    /// Re-evaluated whenever what it reads changes.
    Computed(Rc<dyn Fn() -> Value>),
    /// Like [Arg::Computed] but may produce markup or nodes, not just text.
    Content(Rc<dyn Fn() -> Content<H>>),
    /// A nested invocation, rendered once.
    Markup(Markup<H>),
    /// A live node, inserted once.
    Node(H::Node),
    /// Several arguments rendered one after another.
    Many(Vec<Arg<H>>),
    /// An ordered list, see [crate::each].
    List(Rc<dyn RegionRenderer<H>>),
    /// Anything else that manages its own region.
    Region(Rc<dyn RegionRenderer<H>>),
    /// An event handler, for `on*` attributes.
    Handler(Listener<H>)
}

/// What a [Arg::Content] accessor (or a list's map callback) produces.
#[derive(Derivative)]
#[derivative(Clone(bound = ""))]
pub enum Content<H: HostTree> {
    Empty,
    Text(String),
    Markup(Markup<H>),
    Node(H::Node)
}

impl<H: HostTree> Markup<H> {
    /// Pair `template` with `args`, which must fill every hole.
    pub fn new(template: &Rc<Template>, args: Vec<Arg<H>>) -> Result<Self, TemplateError> {
        if args.len() < template.holes() {
            return Err(TemplateError::MissingArguments {
                expected: template.holes(),
                found: args.len()
            });
        }
        Ok(Markup {
            template: template.clone(),
            args: args.into()
        })
    }

    pub fn template(&self) -> &Rc<Template> {
        &self.template
    }

    pub fn args(&self) -> &[Arg<H>] {
        &self.args
    }

    pub fn same_template(&self, other: &Markup<H>) -> bool {
        Rc::ptr_eq(&self.template, &other.template)
    }

    /// Same template and the very same arguments.
    pub fn ptr_eq(&self, other: &Markup<H>) -> bool {
        self.same_template(other) && Rc::ptr_eq(&self.args, &other.args)
    }
}

impl<H: HostTree> Arg<H> {
    pub fn computed<V: Into<Value>>(compute: impl Fn() -> V + 'static) -> Self {
        Arg::Computed(Rc::new(move || -> Value { compute().into() }))
    }

    pub fn content<C: Into<Content<H>>>(compute: impl Fn() -> C + 'static) -> Self {
        Arg::Content(Rc::new(move || -> Content<H> { compute().into() }))
    }

    pub fn handler(handler: impl Fn(&H::Event) + 'static) -> Self {
        Arg::Handler(Rc::new(handler))
    }

    pub fn region(renderer: impl RegionRenderer<H> + 'static) -> Self {
        Arg::Region(Rc::new(renderer))
    }

    /// The value to write to an attribute or property, evaluating [Arg::Computed].
    /// `None` for arguments that aren't values.
    pub(crate) fn current_value(&self) -> Option<Value> {
        match self {
            Arg::Value(value) => Some(value.clone()),
            Arg::Computed(compute) => Some(compute()),
            _ => None
        }
    }
}

impl<H: HostTree> Content<H> {
    pub fn is_empty(&self) -> bool {
        matches!(self, Content::Empty)
    }
}

impl<H: HostTree> Debug for Markup<H> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Markup")
            .field("template", &Rc::as_ptr(&self.template))
            .field("args", &self.args)
            .finish()
    }
}

impl<H: HostTree> Debug for Arg<H> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Arg::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Arg::Computed(_) => f.write_str("Computed"),
            Arg::Content(_) => f.write_str("Content"),
            Arg::Markup(markup) => f.debug_tuple("Markup").field(markup).finish(),
            Arg::Node(_) => f.write_str("Node"),
            Arg::Many(args) => f.debug_tuple("Many").field(args).finish(),
            Arg::List(_) => f.write_str("List"),
            Arg::Region(_) => f.write_str("Region"),
            Arg::Handler(_) => f.write_str("Handler")
        }
    }
}

impl<H: HostTree> Debug for Content<H> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Content::Empty => f.write_str("Empty"),
            Content::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Content::Markup(markup) => f.debug_tuple("Markup").field(markup).finish(),
            Content::Node(_) => f.write_str("Node")
        }
    }
}

impl<H: HostTree> From<Value> for Arg<H> {
    fn from(value: Value) -> Self {
        Arg::Value(value)
    }
}

impl<H: HostTree> From<&str> for Arg<H> {
    fn from(text: &str) -> Self {
        Arg::Value(text.into())
    }
}

impl<H: HostTree> From<String> for Arg<H> {
    fn from(text: String) -> Self {
        Arg::Value(text.into())
    }
}

impl<H: HostTree> From<bool> for Arg<H> {
    fn from(value: bool) -> Self {
        Arg::Value(value.into())
    }
}

impl<H: HostTree> From<i64> for Arg<H> {
    fn from(value: i64) -> Self {
        Arg::Value(value.into())
    }
}

impl<H: HostTree> From<Markup<H>> for Arg<H> {
    fn from(markup: Markup<H>) -> Self {
        Arg::Markup(markup)
    }
}

impl<H: HostTree> From<Vec<Arg<H>>> for Arg<H> {
    fn from(args: Vec<Arg<H>>) -> Self {
        Arg::Many(args)
    }
}

impl<H: HostTree> From<&str> for Content<H> {
    fn from(text: &str) -> Self {
        Content::Text(text.to_string())
    }
}

impl<H: HostTree> From<String> for Content<H> {
    fn from(text: String) -> Self {
        Content::Text(text)
    }
}

/// `Null` becomes [Content::Empty], anything else its text.
impl<H: HostTree> From<Value> for Content<H> {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Content::Empty,
            value => Content::Text(value.to_string())
        }
    }
}

impl<H: HostTree> From<Markup<H>> for Content<H> {
    fn from(markup: Markup<H>) -> Self {
        Content::Markup(markup)
    }
}

impl<H: HostTree, C: Into<Content<H>>> From<Option<C>> for Content<H> {
    fn from(content: Option<C>) -> Self {
        content.map_or(Content::Empty, Into::into)
    }
}

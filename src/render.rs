use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::rc::{Rc, Weak};
use derivative::Derivative;
use crate::effect::WeakTarget;
use crate::events::EventTable;
use crate::host::{HostRef, HostTree, Namespace, Value};
use crate::markup::{Arg, Content, Markup};
use crate::region::Region;
use crate::runtime::{RxRuntime, WeakRuntime};
use crate::template::{AttrPart, AttrValue, ElementDesc, Template, TemplateNode};

/// Patches a live [HostTree] to match [Markup], creating nodes once and re-applying only the
/// dynamic parts afterwards.
///
/// Every dynamic part (property, attribute, content hole, list) is a
/// [mutation effect](RxRuntime::mutation_effect) bound to the nodes it writes and to the
/// *generation* of the span it was built in. Rendering the same template onto a span again keeps
/// every node, replaces the generation (which retires the old dynamic parts) and re-binds the new
/// arguments. Rendering a different template replaces the span's content.
///
/// The handle is cheap to clone.
#[derive(Derivative)]
#[derivative(Clone(bound = ""))]
pub struct Renderer<H: HostTree>(Rc<RendererInner<H>>);

/// Where a [RegionRenderer] is installed: the namespace to create elements in, and the lifetime of
/// the span around it.
#[derive(Debug, Clone)]
pub struct Scope {
    namespace: Namespace,
    generation: Weak<Generation>
}

/// Something which takes over a [Region] and keeps its content up to date, e.g. [crate::each].
pub trait RegionRenderer<H: HostTree> {
    /// Fill `region` and keep it filled. Effects installed here should be bound to
    /// [Scope::generation_target] so they stop when the surrounding span is re-rendered.
    fn install(&self, renderer: &Renderer<H>, region: Region<H>, scope: &Scope);
}

/// Dropped when the span it belongs to is re-rendered or discarded.
#[derive(Debug)]
pub struct Generation;

struct RendererInner<H: HostTree> {
    host: H,
    runtime: WeakRuntime,
    // Keyed by the span's owner: the parent of a root render, or the start marker of a content hole
    spans: RefCell<HashMap<H::Key, Span<H>>>,
    prune_at: Cell<usize>,
    events: EventTable<H>
}

/// What a span was last built from, and where its dynamic parts live.
struct Span<H: HostTree> {
    owner: H::WeakNode,
    template: Rc<Template>,
    generation: Rc<Generation>,
    slots: Vec<Slot<H>>
}

/// One built template node, in template order.
enum Slot<H: HostTree> {
    /// Text or an element with nothing dynamic under it
    Static,
    Element { node: H::WeakNode, children: Vec<Slot<H>> },
    Hole(Region<H>)
}

/// How a child hole is filled, decided from its argument.
enum HoleStrategy<'a, H: HostTree> {
    /// A custom [RegionRenderer]
    Decorative(&'a Rc<dyn RegionRenderer<H>>),
    /// Re-evaluated into its own region whenever what it reads changes
    TextAccessor(Rc<dyn Fn() -> Content<H>>),
    List(&'a Rc<dyn RegionRenderer<H>>),
    /// Inserted once
    Static(&'a Arg<H>)
}

enum Piece<H: HostTree> {
    Text(Rc<str>),
    Arg(Arg<H>)
}

const INITIAL_PRUNE_AT: usize = 64;

impl<H: HostTree> Renderer<H> {
    pub fn new(runtime: &RxRuntime, host: H) -> Self {
        Renderer(Rc::new(RendererInner {
            host,
            runtime: runtime.downgrade(),
            spans: RefCell::new(HashMap::new()),
            prune_at: Cell::new(INITIAL_PRUNE_AT),
            events: EventTable::new()
        }))
    }

    pub fn host(&self) -> &H {
        &self.0.host
    }

    pub fn runtime(&self) -> Option<RxRuntime> {
        self.0.runtime.upgrade()
    }

    /// Render `markup` as the content of `parent`, in `parent`'s namespace.
    pub fn render(&self, markup: &Markup<H>, parent: &H::Node) {
        let namespace = self.0.host.namespace(parent);
        self.render_in(markup, parent, namespace)
    }

    /// Render `markup` as the content of `parent`, creating elements in `namespace`.
    ///
    /// If `parent` was last rendered from the same template it is patched in place. Otherwise its
    /// children are replaced.
    pub fn render_in(&self, markup: &Markup<H>, parent: &H::Node, namespace: Namespace) {
        let host = &self.0.host;
        let key = host.key(parent);
        if self.is_built_from(key, markup.template()) {
            log::trace!("patching {:?} in place", key);
            self.patch_span(key, markup, namespace);
            return;
        }

        self.forget(key);
        while let Some(child) = host.first_child(parent) {
            host.remove(&child);
        }
        let generation = Rc::new(Generation);
        let scope = Scope::new(namespace, &generation);
        let fragment = host.create_fragment();
        let slots = self.untracked(|| self.build_nodes(markup.template().nodes(), markup.args(), &fragment, &scope));
        host.append(parent, &fragment);
        self.record(key, Span {
            owner: host.downgrade(parent),
            template: markup.template().clone(),
            generation,
            slots
        });
    }

    /// Append `content` to `parent` (usually a fragment) without tracking. Dynamic parts are bound
    /// to `scope`.
    pub fn render_content(&self, content: &Content<H>, parent: &H::Node, scope: &Scope) {
        let host = &self.0.host;
        match content {
            Content::Empty => {}
            Content::Text(text) => host.append(parent, &host.create_text(text)),
            Content::Node(node) => host.append(parent, node),
            Content::Markup(markup) => {
                self.untracked(|| self.build_nodes(markup.template().nodes(), markup.args(), parent, scope));
            }
        }
    }

    /// Run `compute` with the region's markers now, and again whenever what it reads changes,
    /// until the markers are removed or `scope`'s span is re-rendered.
    pub fn region_effect(&self, region: &Region<H>, scope: &Scope, mut compute: impl FnMut(H::Node, H::Node) + 'static) {
        let (start, end) = region.targets();
        self.mutation_effect((start, end, scope.generation.clone()), move |(start, end, _)| compute(start, end));
    }

    // region building

    fn build_nodes(&self, nodes: &[TemplateNode], args: &[Arg<H>], parent: &H::Node, scope: &Scope) -> Vec<Slot<H>> {
        let host = &self.0.host;
        nodes.iter().map(|node| match node {
            TemplateNode::Text(text) => {
                host.append(parent, &host.create_text(text));
                Slot::Static
            }
            TemplateNode::Element(desc) => self.build_element(desc, args, parent, scope),
            TemplateNode::Hole(index) => {
                let region = Region::acquire(host, parent);
                self.install_hole(&args[*index], &region, scope);
                Slot::Hole(region)
            }
        }).collect()
    }

    fn build_element(&self, desc: &ElementDesc, args: &[Arg<H>], parent: &H::Node, scope: &Scope) -> Slot<H> {
        let host = &self.0.host;
        let scope = scope.enter(desc);
        let element = host.create_element(&desc.tag, &scope.namespace);
        self.apply_attrs(&element, desc, args, &scope, true);
        let children = self.build_nodes(&desc.children, args, &element, &scope);
        host.append(parent, &element);
        if desc.dynamic {
            Slot::Element { node: host.downgrade(&element), children }
        } else {
            Slot::Static
        }
    }

    fn install_hole(&self, arg: &Arg<H>, region: &Region<H>, scope: &Scope) {
        match HoleStrategy::of(arg) {
            HoleStrategy::Decorative(renderer) | HoleStrategy::List(renderer) => {
                renderer.install(self, region.clone(), scope)
            }
            HoleStrategy::TextAccessor(accessor) => self.install_accessor(accessor, region, scope),
            HoleStrategy::Static(arg) => {
                let host = &self.0.host;
                let fragment = host.create_fragment();
                self.build_static(arg, &fragment, scope);
                region.insert(host, &fragment);
            }
        }
    }

    fn build_static(&self, arg: &Arg<H>, parent: &H::Node, scope: &Scope) {
        let host = &self.0.host;
        match arg {
            Arg::Value(value) => if !value.is_null() {
                host.append(parent, &host.create_text(&value.to_string()))
            },
            Arg::Markup(markup) => {
                self.build_nodes(markup.template().nodes(), markup.args(), parent, scope);
            }
            Arg::Node(node) => host.append(parent, node),
            Arg::Many(args) => for arg in args {
                let region = Region::acquire(host, parent);
                self.install_hole(arg, &region, scope);
            },
            Arg::Handler(_) => log::warn!("event handler used as child content, rendering nothing"),
            Arg::Computed(_) | Arg::Content(_) | Arg::List(_) | Arg::Region(_) => {
                log::warn!("{:?} isn't static content, rendering nothing", arg)
            }
        }
    }

    fn install_accessor(&self, accessor: Rc<dyn Fn() -> Content<H>>, region: &Region<H>, scope: &Scope) {
        let renderer = self.clone();
        let namespace = scope.namespace.clone();
        let mut previous: Option<Content<H>> = None;
        self.region_effect(region, scope, move |start, end| {
            let content = accessor();
            if previous.as_ref().map_or(false, |previous| renderer.same_content(previous, &content)) {
                return;
            }
            renderer.untracked(|| renderer.swap_content(previous.as_ref(), &content, &start, &end, &namespace));
            previous = Some(content);
        });
    }

    /// Make the region between `start` and `end` show `content`, touching as little as possible.
    fn swap_content(&self, previous: Option<&Content<H>>, content: &Content<H>, start: &H::Node, end: &H::Node, namespace: &Namespace) {
        let host = &self.0.host;
        let key = host.key(start);
        if let Content::Markup(markup) = content {
            if self.is_built_from(key, markup.template()) {
                self.patch_span(key, markup, namespace.clone());
                return;
            }
        }
        self.forget(key);

        let first = Region::first_between(host, start, end);
        let only = first.clone().filter(|first| host.next_sibling(first).map_or(false, |next| host.same_node(&next, end)));
        match (content, only) {
            (Content::Text(text), Some(node)) if host.is_text(&node) && matches!(previous, Some(Content::Text(_))) => {
                host.set_text(&node, text);
                return;
            }
            (Content::Node(new), Some(old)) if matches!(previous, Some(Content::Node(_))) => {
                host.replace(&old, new);
                return;
            }
            _ => {}
        }

        Region::truncate(host, first, end);
        let fragment = host.create_fragment();
        match content {
            Content::Markup(markup) => {
                let generation = Rc::new(Generation);
                let scope = Scope::new(namespace.clone(), &generation);
                let slots = self.build_nodes(markup.template().nodes(), markup.args(), &fragment, &scope);
                self.record(key, Span {
                    owner: host.downgrade(start),
                    template: markup.template().clone(),
                    generation,
                    slots
                });
            }
            content => self.render_content(content, &fragment, &Scope::detached(namespace.clone()))
        }
        Region::insert_before_end(host, end, &fragment);
    }

    fn same_content(&self, previous: &Content<H>, content: &Content<H>) -> bool {
        match (previous, content) {
            (Content::Empty, Content::Empty) => true,
            (Content::Text(previous), Content::Text(content)) => previous == content,
            (Content::Markup(previous), Content::Markup(content)) => previous.ptr_eq(content),
            (Content::Node(previous), Content::Node(content)) => self.0.host.same_node(previous, content),
            _ => false
        }
    }

    // endregion

    // region patching

    fn patch_span(&self, key: H::Key, markup: &Markup<H>, namespace: Namespace) {
        let Some(mut span) = self.0.spans.borrow_mut().remove(&key) else { return };
        let retired = std::mem::replace(&mut span.generation, Rc::new(Generation));
        drop(retired);
        let scope = Scope::new(namespace, &span.generation);
        self.untracked(|| self.patch_nodes(markup.template().nodes(), &span.slots, markup.args(), &scope));
        self.record(key, span);
    }

    fn patch_nodes(&self, nodes: &[TemplateNode], slots: &[Slot<H>], args: &[Arg<H>], scope: &Scope) {
        if nodes.len() != slots.len() {
            log::warn!("rendered span has {} slots for {} template nodes, not patching", slots.len(), nodes.len());
            return;
        }
        for (node, slot) in nodes.iter().zip(slots) {
            match (node, slot) {
                (TemplateNode::Text(_), Slot::Static) | (TemplateNode::Element(_), Slot::Static) => {}
                (TemplateNode::Element(desc), Slot::Element { node, children }) => {
                    let Some(element) = self.0.host.resolve(node) else {
                        log::trace!("element of <{}> is gone, not patching it", desc.tag);
                        continue;
                    };
                    let scope = scope.enter(desc);
                    self.apply_attrs(&element, desc, args, &scope, false);
                    self.patch_nodes(&desc.children, children, args, &scope);
                }
                (TemplateNode::Hole(index), Slot::Hole(region)) => self.refill_hole(&args[*index], region, scope),
                _ => log::warn!("rendered span doesn't match its template, skipping a node")
            }
        }
    }

    fn refill_hole(&self, arg: &Arg<H>, region: &Region<H>, scope: &Scope) {
        let host = &self.0.host;
        if let Some(start) = region.start().resolve() {
            self.forget(host.key(&start));
        }
        if let Arg::Value(value) = arg {
            if let [text] = region.contents(host).as_slice() {
                if host.is_text(text) && !value.is_null() {
                    host.set_text(text, &value.to_string());
                    return;
                }
            }
        }
        region.clear(host);
        self.install_hole(arg, region, scope);
    }

    // endregion

    // region attributes

    fn apply_attrs(&self, element: &H::Node, desc: &ElementDesc, args: &[Arg<H>], scope: &Scope, include_static: bool) {
        let host = &self.0.host;
        for attr in &desc.attrs {
            match &attr.value {
                AttrValue::Flag => if include_static {
                    host.toggle_attribute(element, &attr.name, true)
                },
                AttrValue::Static(value) => if include_static {
                    host.set_attribute(element, &attr.name, value)
                },
                AttrValue::Hole(index) => match attr.event() {
                    Some(event) => self.bind_event(element, event, &args[*index]),
                    None => self.bind_property(element, &attr.name, &args[*index], scope)
                },
                AttrValue::Parts(parts) => self.bind_attribute(element, &attr.name, parts, args, scope)
            }
        }
    }

    fn bind_event(&self, element: &H::Node, event: &str, arg: &Arg<H>) {
        let host = &self.0.host;
        match arg {
            Arg::Handler(handler) => self.0.events.set(host, element, event, handler.clone()),
            Arg::Value(Value::Null) => self.0.events.clear(host, element, event),
            other => log::warn!("`on{}` needs a handler, got {:?}", event, other)
        }
    }

    fn bind_property(&self, element: &H::Node, name: &Rc<str>, arg: &Arg<H>, scope: &Scope) {
        let host = self.0.host.clone();
        let name = name.clone();
        let arg = arg.clone();
        self.mutation_effect((HostRef::new(&host, element), scope.generation.clone()), move |(element, _)| {
            match arg.current_value() {
                Some(value) => if host.property(&element, &name) != value {
                    host.set_property(&element, &name, value)
                },
                None => log::warn!("property `{}` can't be set from {:?}", name, arg)
            }
        });
    }

    fn bind_attribute(&self, element: &H::Node, name: &Rc<str>, parts: &[AttrPart], args: &[Arg<H>], scope: &Scope) {
        let host = self.0.host.clone();
        let name = name.clone();
        let pieces = parts.iter().map(|part| match part {
            AttrPart::Text(text) => Piece::Text(text.clone()),
            AttrPart::Hole(index) => Piece::Arg(args[*index].clone())
        }).collect::<Vec<_>>();
        self.mutation_effect((HostRef::new(&host, element), scope.generation.clone()), move |(element, _)| {
            let values = pieces.iter().map(|piece| match piece {
                Piece::Text(text) => Value::Str(text.clone()),
                Piece::Arg(arg) => arg.current_value().unwrap_or(Value::Null)
            }).collect::<Vec<_>>();
            let current = host.attribute(&element, &name);
            if let [Value::Bool(on)] = values.as_slice() {
                if current.is_some() != *on {
                    host.toggle_attribute(&element, &name, *on);
                }
                return;
            }
            let present = values.iter().filter(|value| !value.is_null()).collect::<Vec<_>>();
            if present.is_empty() {
                if current.is_some() {
                    host.remove_attribute(&element, &name);
                }
                return;
            }
            let joined = present.iter().map(|value| value.to_string()).collect::<String>();
            if current.as_deref() != Some(joined.as_str()) {
                host.set_attribute(&element, &name, &joined);
            }
        });
    }

    // endregion

    // region span table

    fn is_built_from(&self, key: H::Key, template: &Rc<Template>) -> bool {
        self.0.spans.borrow().get(&key).map_or(false, |span| {
            Rc::ptr_eq(&span.template, template) && self.0.host.resolve(&span.owner).is_some()
        })
    }

    fn record(&self, key: H::Key, span: Span<H>) {
        let stale = {
            let mut spans = self.0.spans.borrow_mut();
            let mut stale = spans.insert(key, span).into_iter().collect::<Vec<_>>();
            if spans.len() >= self.0.prune_at.get() {
                let host = &self.0.host;
                let dead = spans.iter()
                    .filter(|(_, span)| host.resolve(&span.owner).is_none())
                    .map(|(key, _)| *key)
                    .collect::<Vec<_>>();
                stale.extend(dead.iter().filter_map(|key| spans.remove(key)));
                log::trace!("pruned {} dead spans, {} left", dead.len(), spans.len());
                self.0.prune_at.set((spans.len() * 2).max(INITIAL_PRUNE_AT));
            }
            stale
        };
        // Dropped outside the borrow: dropping a generation may drop effects
        drop(stale);
    }

    fn forget(&self, key: H::Key) {
        let removed = self.0.spans.borrow_mut().remove(&key);
        drop(removed);
    }

    // endregion

    fn mutation_effect<W: WeakTarget, F: FnMut(W::Target) + 'static>(&self, targets: W, mut compute: F) {
        match self.0.runtime.upgrade() {
            Some(runtime) => {
                runtime.mutation_effect(targets, compute);
            }
            None => if let Some(resolved) = targets.resolve() {
                compute(resolved)
            }
        }
    }

    fn untracked<T>(&self, f: impl FnOnce() -> T) -> T {
        match self.0.runtime.upgrade() {
            Some(runtime) => runtime.untracked(f),
            None => f()
        }
    }
}

impl Scope {
    fn new(namespace: Namespace, generation: &Rc<Generation>) -> Self {
        Scope {
            namespace,
            generation: Rc::downgrade(generation)
        }
    }

    /// A scope with no span around it. Effects bound to its generation never run.
    fn detached(namespace: Namespace) -> Self {
        Scope {
            namespace,
            generation: Weak::new()
        }
    }

    /// The scope of `desc`'s children.
    fn enter(&self, desc: &ElementDesc) -> Scope {
        match &desc.namespace {
            Some(namespace) => Scope {
                namespace: namespace.clone(),
                generation: self.generation.clone()
            },
            None => self.clone()
        }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Whether the span this scope belongs to is still current.
    pub fn is_live(&self) -> bool {
        self.generation.strong_count() > 0
    }

    /// A [mutation effect](RxRuntime::mutation_effect) target which is gone once the span is re-rendered.
    pub fn generation_target(&self) -> Weak<Generation> {
        self.generation.clone()
    }
}

impl<'a, H: HostTree> HoleStrategy<'a, H> {
    fn of(arg: &'a Arg<H>) -> Self {
        match arg {
            Arg::Region(renderer) => HoleStrategy::Decorative(renderer),
            Arg::List(renderer) => HoleStrategy::List(renderer),
            Arg::Content(accessor) => HoleStrategy::TextAccessor(accessor.clone()),
            Arg::Computed(compute) => {
                let compute = compute.clone();
                HoleStrategy::TextAccessor(Rc::new(move || -> Content<H> { compute().into() }))
            }
            arg => HoleStrategy::Static(arg)
        }
    }
}

impl<H: HostTree> Debug for Renderer<H> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("spans", &self.0.spans.borrow().len())
            .field("event_slots", &self.0.events.len())
            .field("runtime", &self.0.runtime)
            .finish_non_exhaustive()
    }
}

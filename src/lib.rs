//! Fine-grained reactive records which patch a live node tree in place.
//!
//! You wrap plain data in an [Observable] (or an [RxVec] for lists). Reading a field while an
//! [Effect] runs subscribes the effect to exactly that field of exactly that record, and writing
//! the field queues its subscribers. Nothing re-runs until you call [RxRuntime::recompute], so
//! writing the same field many times in one turn re-runs each dependent effect once.
//!
//! There is no global state: every record, effect and renderer hangs off of an [RxRuntime] you
//! create and pass around. The runtime never holds a borrow while your code runs, so effects can
//! read, write, and create other effects.
//!
//! On top of that, a [Renderer] turns [Markup] (a shared [Template] + arguments) into nodes of a
//! [HostTree] and then keeps them up to date. It doesn't diff: every dynamic part of the template
//! is its own [mutation effect](RxRuntime::mutation_effect), bound weakly to the nodes it writes,
//! which patches only its own attribute, property or [Region]. Lists go through [each], which
//! keeps one observable [View] per position, so changing one item re-runs only what that item's
//! nodes read.
//!
//! ```
//! use mini_rx_dom::*;
//!
//! let rt = RxRuntime::new();
//! let host = MemTree::new();
//! let renderer = Renderer::new(&rt, host.clone());
//! let counter = TemplateBuilder::new().open("p").text("count: ").hole().close("p").build().unwrap();
//! let counter = std::rc::Rc::new(counter);
//!
//! let count = rt.watch(0i64);
//! let root = host.create_element("div", &Namespace::Html);
//! let markup = Markup::new(&counter, vec![Arg::computed({
//!     let count = count.clone();
//!     move || count.get("count")
//! })]).unwrap();
//! renderer.render(&markup, &root);
//! assert_eq!(host.inner_html(&root), "<p>count: 0</p>");
//!
//! count.update("count", |count| *count += 1);
//! count.update("count", |count| *count += 1);
//! rt.recompute();
//! assert_eq!(host.inner_html(&root), "<p>count: 2</p>");
//! ```
//!
//! [MemTree] is an in-memory host for headless use and tests. A browser embedding implements
//! [HostTree] over its DOM bindings and calls [RxRuntime::recompute] from the task it posts in
//! [RxRuntime::set_scheduler].

pub(crate) mod uid;
pub(crate) mod effect;
pub(crate) mod runtime;
pub(crate) mod store;
pub(crate) mod error;
pub(crate) mod host;
pub(crate) mod mem_host;
pub(crate) mod region;
pub(crate) mod template;
pub(crate) mod markup;
pub(crate) mod events;
pub(crate) mod render;
pub(crate) mod each;
pub(crate) mod attributes;

pub use effect::{Effect, EffectKind, WeakTarget};
pub use runtime::{RuntimeConfig, RxRuntime, WeakRuntime};
pub use store::{Field, FieldKey, Observable, RxVec};
pub use error::{EffectError, RuntimeError, TemplateError};
pub use host::{AttributeObserver, HostRef, HostTree, Listener, Namespace, Value};
pub use mem_host::{MemEvent, MemNode, MemNodeKind, MemTree, MemWeak};
pub use region::Region;
pub use template::{AttrDesc, AttrPart, AttrParts, AttrValue, ElementDesc, Template, TemplateBuilder, TemplateCache, TemplateNode};
pub use markup::{Arg, Content, Markup};
pub use render::{Generation, RegionRenderer, Renderer, Scope};
pub use each::{each, Each, View, ViewData};
pub use attributes::{watch_attributes, AttributeRecord};

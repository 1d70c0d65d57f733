use std::fmt::{Debug, Formatter};
use std::rc::Rc;
use derivative::Derivative;
use crate::host::HostTree;
use crate::markup::{Arg, Content};
use crate::region::Region;
use crate::render::{RegionRenderer, Renderer, Scope};
use crate::runtime::RxRuntime;
use crate::store::{Observable, RxVec};

/// Render every item of an [RxVec] through `map`, keeping one [View] per visible position.
///
/// When the list changes, positions which still exist keep their view and their live nodes: the
/// view's `item` and `index` are reassigned (only the ones that changed), so only what read them
/// re-runs. New positions are rendered and inserted at the end, surplus positions are removed.
/// Identity is positional: moving an item rebinds every view whose position's item changed.
///
/// `map` runs untracked, once per position. Put anything that should follow the view in
/// [Arg::computed] / [Arg::content] accessors.
pub fn each<T, H, C>(list: &RxVec<T>, map: impl Fn(&View<T>) -> C + 'static) -> Each<T, H>
where
    T: Clone + PartialEq + 'static,
    H: HostTree,
    C: Into<Content<H>>
{
    Each {
        list: list.clone(),
        map: Rc::new(move |view: &View<T>| -> Content<H> { map(view).into() }),
        filter: None
    }
}

/// A list region, see [each].
pub struct Each<T, H: HostTree> {
    list: RxVec<T>,
    map: Rc<dyn Fn(&View<T>) -> Content<H>>,
    filter: Option<Rc<dyn Fn(&T, usize) -> bool>>
}

/// The observable `{item, index}` record behind one position of an [each] list.
///
/// `index` is the item's index in the source list, which differs from its position when the list
/// is filtered.
#[derive(Derivative)]
#[derivative(Clone(bound = ""), PartialEq(bound = ""))]
pub struct View<T>(Observable<ViewData<T>>);

#[derive(Debug, Clone, PartialEq)]
pub struct ViewData<T> {
    pub item: T,
    pub index: usize
}

impl<T: Clone + PartialEq + 'static, H: HostTree> Each<T, H> {
    /// Only render items for which `keep(item, index)` holds. Skipped items don't take a position.
    pub fn filter(mut self, keep: impl Fn(&T, usize) -> bool + 'static) -> Self {
        self.filter = Some(Rc::new(keep));
        self
    }
}

impl<T: Clone + PartialEq + 'static, H: HostTree> RegionRenderer<H> for Each<T, H> {
    fn install(&self, renderer: &Renderer<H>, region: Region<H>, scope: &Scope) {
        let Some(runtime) = renderer.runtime() else {
            log::warn!("list rendered after its runtime was dropped, rendering nothing");
            return;
        };
        let runtime = runtime.downgrade();
        let list = self.list.clone();
        let map = self.map.clone();
        let filter = self.filter.clone();
        let item_renderer = renderer.clone();
        let item_scope = scope.clone();
        // Parallel: views[position] is anchored at anchors[position], its first live node
        let mut views: Vec<View<T>> = Vec::new();
        let mut anchors: Vec<H::Node> = Vec::new();
        renderer.region_effect(&region, scope, move |_start, end| {
            let Some(runtime) = runtime.upgrade() else { return };
            let host = item_renderer.host();
            let mut fragment = None;
            let mut position = 0;
            for index in 0..list.len() {
                let Some(item) = list.get(index) else { continue };
                if let Some(keep) = &filter {
                    if !keep(&item, index) {
                        continue;
                    }
                }
                match views.get(position) {
                    Some(view) => view.rebind(&item, index),
                    None => {
                        let view = View::new(&runtime, item, index);
                        let content = runtime.untracked(|| map(&view));
                        let piece = host.create_fragment();
                        item_renderer.render_content(&content, &piece, &item_scope);
                        let anchor = host.first_child(&piece).unwrap_or_else(|| {
                            let marker = host.create_marker();
                            host.append(&piece, &marker);
                            marker
                        });
                        host.append(fragment.get_or_insert_with(|| host.create_fragment()), &piece);
                        views.push(view);
                        anchors.push(anchor);
                    }
                }
                position += 1;
            }

            if let Some(fragment) = fragment {
                log::debug!("list grew to {} positions", views.len());
                Region::insert_before_end(host, &end, &fragment);
            }
            if views.len() > position {
                views.truncate(position);
                let surplus = anchors.split_off(position);
                Region::truncate(host, surplus.into_iter().next(), &end);
            }
        });
    }
}

impl<T: 'static> View<T> {
    fn new(runtime: &RxRuntime, item: T, index: usize) -> Self {
        View(runtime.watch(ViewData { item, index }))
    }

    /// Read the item, subscribing to it.
    pub fn with_item<U>(&self, read: impl FnOnce(&T) -> U) -> U {
        self.0.with("item", |data| read(&data.item))
    }

    /// The item's index in the source list, subscribing to it.
    pub fn index(&self) -> usize {
        self.0.with("index", |data| data.index)
    }

    pub fn record(&self) -> &Observable<ViewData<T>> {
        &self.0
    }
}

impl<T: Clone + 'static> View<T> {
    /// Clone the item, subscribing to it.
    pub fn item(&self) -> T {
        self.with_item(T::clone)
    }
}

impl<T: Clone + PartialEq + 'static> View<T> {
    /// Point the view at `item` and `index`, writing only the fields which differ.
    fn rebind(&self, item: &T, index: usize) {
        let (same_item, same_index) = self.0.untracked(|data| (data.item == *item, data.index == index));
        if !same_item {
            self.0.update("item", |data| data.item = item.clone());
        }
        if !same_index {
            self.0.update("index", |data| data.index = index);
        }
    }
}

impl<T: Clone + PartialEq + 'static, H: HostTree> From<Each<T, H>> for Arg<H> {
    fn from(each: Each<T, H>) -> Self {
        Arg::List(Rc::new(each))
    }
}

impl<T: Debug, H: HostTree> Debug for Each<T, H> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Each")
            .field("list", &self.list)
            .field("filtered", &self.filter.is_some())
            .finish_non_exhaustive()
    }
}

impl<T: Debug> Debug for View<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("View").field(&self.0).finish()
    }
}

use std::cell::{Cell, RefCell};
use std::fmt::{Debug, Formatter};
use std::rc::{Rc, Weak};
use crate::store::FieldKey;
use crate::uid::{EffectUid, RecordUid};

/// What kind of computation an [Effect] wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectKind {
    /// Always runs when triggered.
    Plain,
    /// Bound to weak resources, skips when any of them is gone.
    Mutation
}

/// A computation which re-runs when a field it read changes.
///
/// The handle is cheap to clone. An effect stays alive as long as it is subscribed to something
/// (the runtime holds it) or someone holds a handle, so effects you don't keep are dropped once
/// they stop reading observables.
#[derive(Clone)]
pub struct Effect(pub(crate) Rc<EffectCell>);

pub(crate) struct EffectCell {
    uid: EffectUid,
    kind: EffectKind,
    compute: RefCell<Box<dyn FnMut()>>,
    // (record, field) pairs this effect is currently in the subscriber set of
    deps: RefCell<Vec<(RecordUid, FieldKey)>>,
    queued: Cell<bool>,
    stopped: Cell<bool>
}

/// A weak relation: a lookup capability to a resource which doesn't extend its lifetime.
///
/// Resolution failing is a normal outcome, not an error.
pub trait WeakTarget: 'static {
    type Target;

    fn resolve(&self) -> Option<Self::Target>;
}

impl Effect {
    pub(crate) fn new(kind: EffectKind, compute: Box<dyn FnMut()>) -> Self {
        Effect(Rc::new(EffectCell {
            uid: EffectUid::next(),
            kind,
            compute: RefCell::new(compute),
            deps: RefCell::new(Vec::new()),
            queued: Cell::new(false),
            stopped: Cell::new(false)
        }))
    }

    pub fn kind(&self) -> EffectKind {
        self.0.kind
    }

    /// Whether [crate::RxRuntime::stop] was called on this effect.
    pub fn is_stopped(&self) -> bool {
        self.0.stopped.get()
    }

    /// Number of (record, field) pairs the effect is subscribed to.
    pub fn dependency_count(&self) -> usize {
        self.0.deps.borrow().len()
    }

    pub fn ptr_eq(&self, other: &Effect) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn uid(&self) -> EffectUid {
        self.0.uid
    }

    pub(crate) fn id(&self) -> u64 {
        self.0.uid.raw()
    }

    pub(crate) fn is_queued(&self) -> bool {
        self.0.queued.get()
    }

    pub(crate) fn set_queued(&self, queued: bool) {
        self.0.queued.set(queued)
    }

    pub(crate) fn stop(&self) {
        self.0.stopped.set(true)
    }

    pub(crate) fn add_dep(&self, record: RecordUid, key: FieldKey) {
        self.0.deps.borrow_mut().push((record, key))
    }

    pub(crate) fn take_deps(&self) -> Vec<(RecordUid, FieldKey)> {
        std::mem::take(&mut *self.0.deps.borrow_mut())
    }

    /// Call the computation. Returns `false` if it is already running further up the stack.
    pub(crate) fn invoke(&self) -> bool {
        match self.0.compute.try_borrow_mut() {
            Ok(mut compute) => {
                compute();
                true
            }
            Err(_) => false
        }
    }
}

impl Debug for Effect {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("uid", &self.0.uid)
            .field("kind", &self.0.kind)
            .field("deps", &self.0.deps.borrow().len())
            .field("queued", &self.0.queued.get())
            .finish_non_exhaustive()
    }
}

impl PartialEq for Effect {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<T: ?Sized + 'static> WeakTarget for Weak<T> {
    type Target = Rc<T>;

    fn resolve(&self) -> Option<Rc<T>> {
        self.upgrade()
    }
}

impl<A: WeakTarget, B: WeakTarget> WeakTarget for (A, B) {
    type Target = (A::Target, B::Target);

    fn resolve(&self) -> Option<Self::Target> {
        Some((self.0.resolve()?, self.1.resolve()?))
    }
}

impl<A: WeakTarget, B: WeakTarget, C: WeakTarget> WeakTarget for (A, B, C) {
    type Target = (A::Target, B::Target, C::Target);

    fn resolve(&self) -> Option<Self::Target> {
        Some((self.0.resolve()?, self.1.resolve()?, self.2.resolve()?))
    }
}

/// Wrap `compute` so it only runs when every target resolves.
pub(crate) fn guard_targets<W: WeakTarget, F: FnMut(W::Target) + 'static>(targets: W, mut compute: F) -> impl FnMut() + 'static {
    move || match targets.resolve() {
        Some(resolved) => compute(resolved),
        None => log::trace!("mutation effect skipped, a bound target is gone")
    }
}

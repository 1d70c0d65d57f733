use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::{Debug, Formatter};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::{Rc, Weak};
use crate::effect::{guard_targets, Effect, EffectKind, WeakTarget};
use crate::error::{EffectError, RuntimeError};
use crate::store::{FieldKey, Observable, RxVec};
use crate::uid::RecordUid;

/// Knobs for an [RxRuntime].
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// How many drains [RxRuntime::recompute_until_settled] does before giving up.
    pub max_settle_drains: usize
}

/// The context every observable, effect and renderer hangs off of.
///
/// It owns the "current computation" stack, the subscription table and the pending queue.
/// There is no hidden global state: create one per runtime instance and pass it around by reference.
///
/// Writes to observables don't re-run anything immediately. They queue the subscribed effects,
/// and the queue is drained by [RxRuntime::recompute]. The embedding decides when that happens,
/// usually from a task posted by the hook given to [RxRuntime::set_scheduler].
///
/// ## Implementation
///
/// The subscription table maps `record → field → effects`, in subscription order.
/// Records never store their subscribers themselves, so they don't carry hidden fields,
/// and when a record is dropped its row is released on the next drain.
///
/// An effect is removed from every set it is in right before it re-runs, and re-subscribes to
/// whatever it reads this time. A write removes the whole set for the written field. So effects
/// which stop reading something stop being notified about it.
///
/// No `RefCell` in here is borrowed while user code runs, which is what makes re-entrant reads
/// and writes from inside effects OK.
#[derive(Clone)]
pub struct RxRuntime(Rc<RuntimeInner>);

/// [RxRuntime] which doesn't keep the runtime alive.
///
/// Observables and renderers hold this, so that dropping the runtime doesn't leak through effects
/// which capture them.
#[derive(Clone, Default)]
pub struct WeakRuntime(Weak<RuntimeInner>);

type Subscribers = HashMap<FieldKey, Vec<Effect>>;

struct RuntimeInner {
    config: RuntimeConfig,
    // `None` entries are untracked scopes
    current: RefCell<Vec<Option<Effect>>>,
    subscriptions: RefCell<HashMap<RecordUid, Subscribers>>,
    queue: RefCell<VecDeque<Effect>>,
    draining: Cell<bool>,
    dead_records: RefCell<Vec<RecordUid>>,
    scheduler: RefCell<Option<Rc<dyn Fn()>>>,
    error_handler: RefCell<Option<Rc<dyn Fn(&EffectError)>>>
}

impl RxRuntime {
    /// Create a runtime with the default config.
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        RxRuntime(Rc::new(RuntimeInner {
            config,
            current: RefCell::new(Vec::new()),
            subscriptions: RefCell::new(HashMap::new()),
            queue: RefCell::new(VecDeque::new()),
            draining: Cell::new(false),
            dead_records: RefCell::new(Vec::new()),
            scheduler: RefCell::new(None),
            error_handler: RefCell::new(None)
        }))
    }

    pub fn downgrade(&self) -> WeakRuntime {
        WeakRuntime(Rc::downgrade(&self.0))
    }

    /// Wrap a record so reads and writes of its fields are tracked.
    pub fn watch<T: 'static>(&self, record: T) -> Observable<T> {
        Observable::new(self, record)
    }

    /// Wrap a vector so reads and writes of its positions and length are tracked.
    pub fn watch_vec<T: 'static>(&self, items: Vec<T>) -> RxVec<T> {
        RxVec::new(self, items)
    }

    // region effect creation

    /// Run `compute` now as the current computation, and again whenever something it read changes.
    ///
    /// A panic in the first run propagates to the caller; panics in later runs are isolated by
    /// [RxRuntime::recompute].
    pub fn run_immediate<F: FnMut() + 'static>(&self, compute: F) -> Effect {
        let effect = Effect::new(EffectKind::Plain, Box::new(compute));
        self.run(&effect);
        effect
    }

    /// Queue `compute` to run in the next drain, and again whenever something it read changes.
    pub fn schedule<F: FnMut() + 'static>(&self, compute: F) -> Effect {
        let effect = Effect::new(EffectKind::Plain, Box::new(compute));
        self.enqueue(effect.clone());
        effect
    }

    /// Like [RxRuntime::run_immediate], but `compute` only runs while every target resolves.
    ///
    /// When a target is gone the run is skipped (no error, no retry). A skipped run reads nothing,
    /// so the effect loses its subscriptions and gets dropped once nobody holds it.
    pub fn mutation_effect<W: WeakTarget, F: FnMut(W::Target) + 'static>(&self, targets: W, compute: F) -> Effect {
        let effect = Effect::new(EffectKind::Mutation, Box::new(guard_targets(targets, compute)));
        self.run(&effect);
        effect
    }

    /// Unsubscribe `effect` from everything and never run it again.
    pub fn stop(&self, effect: &Effect) {
        effect.stop();
        self.unsubscribe(effect);
    }

    /// Run `f` without subscribing the current computation to anything it reads.
    pub fn untracked<T>(&self, f: impl FnOnce() -> T) -> T {
        self.0.current.borrow_mut().push(None);
        let _guard = CurrentGuard(&self.0);
        f()
    }

    // endregion

    // region draining

    /// Run every queued effect once, in enqueue order.
    ///
    /// Effects notified while draining join this drain, unless they already ran in it, in which case
    /// they are carried over to the next one. A panicking effect doesn't stop the others;
    /// its panic goes to the error handler.
    pub fn recompute(&self) {
        if self.0.draining.replace(true) {
            log::warn!("RxRuntime::recompute called from inside a drain, ignoring");
            return;
        }
        // Unrun effects stay queued and carried ones are re-queued even if this unwinds
        let mut drain = DrainGuard { inner: &self.0, carried: Vec::new() };
        self.purge_dead_records();

        let mut ran = HashSet::new();
        let mut count = 0usize;
        loop {
            let next = self.0.queue.borrow_mut().pop_front();
            let Some(effect) = next else { break };
            if !ran.insert(effect.uid()) {
                drain.carried.push(effect);
                continue;
            }
            effect.set_queued(false);
            if effect.is_stopped() {
                continue;
            }
            count += 1;
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| self.run(&effect))) {
                self.report(EffectError {
                    effect: effect.id(),
                    message: panic_message(payload.as_ref())
                });
            }
        }
        log::trace!("drained {} effects, {} carried over", count, drain.carried.len());

        let reschedule = !drain.carried.is_empty();
        drop(drain);
        if reschedule {
            self.call_scheduler();
        }
    }

    /// Drain until nothing is queued. Returns how many drains ran.
    pub fn recompute_until_settled(&self) -> Result<usize, RuntimeError> {
        let max = self.0.config.max_settle_drains;
        for drains in 0..max {
            if !self.is_scheduled() {
                return Ok(drains);
            }
            self.recompute();
        }
        if self.is_scheduled() {
            Err(RuntimeError::Unsettled(max))
        } else {
            Ok(max)
        }
    }

    /// Whether anything is waiting for the next drain.
    pub fn is_scheduled(&self) -> bool {
        !self.0.queue.borrow().is_empty()
    }

    /// Number of effects waiting for the next drain.
    pub fn pending(&self) -> usize {
        self.0.queue.borrow().len()
    }

    /// Called whenever the queue goes from empty to non-empty, outside of a drain.
    /// The embedding should arrange for [RxRuntime::recompute] to be called soon after.
    pub fn set_scheduler(&self, hook: impl Fn() + 'static) {
        *self.0.scheduler.borrow_mut() = Some(Rc::new(hook));
    }

    /// Where panics of drained effects go. Without a handler they are logged at error level.
    pub fn set_error_handler(&self, handler: impl Fn(&EffectError) + 'static) {
        *self.0.error_handler.borrow_mut() = Some(Rc::new(handler));
    }

    // endregion

    // region crate-internal, used by the store

    /// Subscribe the current computation (if any) to `(record, key)`.
    pub(crate) fn track(&self, record: RecordUid, key: &FieldKey) {
        let current = match self.0.current.borrow().last() {
            Some(Some(effect)) => effect.clone(),
            _ => return
        };
        let mut subscriptions = self.0.subscriptions.borrow_mut();
        let subscribers = subscriptions.entry(record).or_default().entry(key.clone()).or_default();
        if !subscribers.iter().any(|effect| effect.ptr_eq(&current)) {
            subscribers.push(current.clone());
            current.add_dep(record, key.clone());
        }
    }

    /// Hand the subscribers of each `(record, key)` to the scheduler and clear their sets.
    pub(crate) fn notify(&self, record: RecordUid, keys: &[FieldKey]) {
        let notified = {
            let mut subscriptions = self.0.subscriptions.borrow_mut();
            let Some(row) = subscriptions.get_mut(&record) else { return };
            let mut notified = Vec::new();
            for key in keys {
                if let Some(subscribers) = row.remove(key) {
                    notified.extend(subscribers);
                }
            }
            notified
        };
        for effect in notified {
            self.enqueue(effect);
        }
    }

    /// The record is gone: release its row at the next drain.
    pub(crate) fn forget_record(&self, record: RecordUid) {
        // Only fails if a drop happens while purging, in which case the row is being released anyway
        if let Ok(mut dead_records) = self.0.dead_records.try_borrow_mut() {
            dead_records.push(record);
        }
    }

    // endregion

    fn run(&self, effect: &Effect) {
        self.unsubscribe(effect);
        self.0.current.borrow_mut().push(Some(effect.clone()));
        let _guard = CurrentGuard(&self.0);
        if !effect.invoke() {
            log::warn!("effect {:?} re-entered itself, skipping the nested run", effect);
        }
    }

    fn enqueue(&self, effect: Effect) {
        if effect.is_stopped() || effect.is_queued() {
            return;
        }
        effect.set_queued(true);
        let was_empty = {
            let mut queue = self.0.queue.borrow_mut();
            let was_empty = queue.is_empty();
            queue.push_back(effect);
            was_empty
        };
        if was_empty && !self.0.draining.get() {
            self.call_scheduler();
        }
    }

    fn unsubscribe(&self, effect: &Effect) {
        let deps = effect.take_deps();
        if deps.is_empty() {
            return;
        }
        // Dropped after the borrow ends: dropping an effect may drop records, which calls back in
        let mut graveyard = Vec::new();
        {
            let mut subscriptions = self.0.subscriptions.borrow_mut();
            for (record, key) in deps {
                let Some(row) = subscriptions.get_mut(&record) else { continue };
                let Some(subscribers) = row.get_mut(&key) else { continue };
                if let Some(position) = subscribers.iter().position(|other| other.ptr_eq(effect)) {
                    graveyard.push(subscribers.remove(position));
                }
                if subscribers.is_empty() {
                    row.remove(&key);
                }
            }
        }
        drop(graveyard);
    }

    fn purge_dead_records(&self) {
        let dead_records = std::mem::take(&mut *self.0.dead_records.borrow_mut());
        if dead_records.is_empty() {
            return;
        }
        let rows = {
            let mut subscriptions = self.0.subscriptions.borrow_mut();
            dead_records.iter().filter_map(|record| subscriptions.remove(record)).collect::<Vec<_>>()
        };
        log::trace!("released {} rows of dropped records", rows.len());
        drop(rows);
    }

    fn call_scheduler(&self) {
        let hook = self.0.scheduler.borrow().clone();
        if let Some(hook) = hook {
            hook();
        }
    }

    fn report(&self, error: EffectError) {
        let handler = self.0.error_handler.borrow().clone();
        let Some(handler) = handler else {
            log::error!("{}", error);
            return;
        };
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| handler(&error))) {
            log::error!("error handler panicked on \"{}\": {}", error, panic_message(payload.as_ref()));
        }
    }
}

impl WeakRuntime {
    pub fn upgrade(&self) -> Option<RxRuntime> {
        self.0.upgrade().map(RxRuntime)
    }
}

impl Default for RxRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            max_settle_drains: 100
        }
    }
}

impl Debug for RxRuntime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RxRuntime")
            .field("records", &self.0.subscriptions.borrow().len())
            .field("pending", &self.0.queue.borrow().len())
            .field("draining", &self.0.draining.get())
            .finish_non_exhaustive()
    }
}

impl Debug for WeakRuntime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("WeakRuntime")
            .field(&(self.0.strong_count() > 0))
            .finish()
    }
}

/// Pops the current computation, even when it panics.
struct CurrentGuard<'a>(&'a RuntimeInner);

struct DrainGuard<'a> {
    inner: &'a RuntimeInner,
    carried: Vec<Effect>
}

impl<'a> Drop for CurrentGuard<'a> {
    fn drop(&mut self) {
        self.0.current.borrow_mut().pop();
    }
}

impl<'a> Drop for DrainGuard<'a> {
    fn drop(&mut self) {
        let carried = std::mem::take(&mut self.carried);
        self.inner.queue.borrow_mut().extend(carried);
        self.inner.draining.set(false);
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}

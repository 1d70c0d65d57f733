use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use crate::host::{HostTree, Listener};

/// Handlers of `on*` attributes, indirected so a re-render swaps the handler without touching the
/// host's listeners.
///
/// Each `(element, event type)` gets exactly one host listener, which looks up the current handler
/// in here when it fires.
pub(crate) struct EventTable<H: HostTree> {
    slots: RefCell<HashMap<(H::Key, Rc<str>), EventSlot<H>>>,
    // Dead slots are pruned when the table grows past this
    prune_at: Cell<usize>
}

struct EventSlot<H: HostTree> {
    node: H::WeakNode,
    handler: Rc<RefCell<Option<Listener<H>>>>
}

const INITIAL_PRUNE_AT: usize = 64;

impl<H: HostTree> EventTable<H> {
    pub fn new() -> Self {
        EventTable {
            slots: RefCell::new(HashMap::new()),
            prune_at: Cell::new(INITIAL_PRUNE_AT)
        }
    }

    /// Make `handler` the one called for `event` on `node`.
    pub fn set(&self, host: &H, node: &H::Node, event: &str, handler: Listener<H>) {
        let key = (host.key(node), Rc::<str>::from(event));
        let existing = self.slots.borrow().get(&key)
            .filter(|slot| host.resolve(&slot.node).map_or(false, |live| host.same_node(&live, node)))
            .map(|slot| slot.handler.clone());
        if let Some(current) = existing {
            *current.borrow_mut() = Some(handler);
            return;
        }

        let current = Rc::new(RefCell::new(Some(handler)));
        let dispatch: Listener<H> = {
            let current = Rc::downgrade(&current);
            Rc::new(move |event: &H::Event| {
                // Cloned out so a handler may replace itself
                let handler = current.upgrade().and_then(|current| current.borrow().clone());
                if let Some(handler) = handler {
                    handler(event);
                }
            })
        };
        host.add_event_listener(node, event, dispatch);
        self.slots.borrow_mut().insert(key, EventSlot {
            node: host.downgrade(node),
            handler: current
        });
        self.prune(host);
    }

    /// Remove the handler and the host listener for `event` on `node`.
    pub fn clear(&self, host: &H, node: &H::Node, event: &str) {
        let key = (host.key(node), Rc::<str>::from(event));
        let removed = self.slots.borrow_mut().remove(&key);
        if removed.is_some() {
            host.remove_event_listener(node, event);
        }
    }

    pub fn len(&self) -> usize {
        self.slots.borrow().len()
    }

    fn prune(&self, host: &H) {
        if self.len() < self.prune_at.get() {
            return;
        }
        let dead = {
            let mut slots = self.slots.borrow_mut();
            let before = slots.len();
            // The host listeners of dropped slots stay behind as no-ops
            let dead = slots.iter()
                .filter(|(_, slot)| host.resolve(&slot.node).is_none())
                .map(|(key, _)| key.clone())
                .collect::<Vec<_>>();
            let removed = dead.into_iter().filter_map(|key| slots.remove(&key)).collect::<Vec<_>>();
            log::trace!("pruned {} of {} event slots", removed.len(), before);
            self.prune_at.set((slots.len() * 2).max(INITIAL_PRUNE_AT));
            removed
        };
        drop(dead);
    }
}

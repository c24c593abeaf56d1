//! Per-peer listener multiplexing.
//!
//! A [`PeerEventRouter`] turns one stream of `(payload, peer, metadata)`
//! events into listener registrations that are either scoped to one peer or
//! global. For every event the listeners of that peer run first, then the
//! global ones, each group in registration order.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use peerchat_shared::types::PeerId;

type Listener<T, M> = Rc<dyn Fn(&T, &PeerId, Option<&M>)>;

struct Registry<T, M> {
    next_id: u64,
    /// `None` holds the global listeners.
    groups: HashMap<Option<PeerId>, Vec<(u64, Listener<T, M>)>>,
}

impl<T, M> Registry<T, M> {
    fn contains(&self, key: &Option<PeerId>, id: u64) -> bool {
        self.groups
            .get(key)
            .is_some_and(|group| group.iter().any(|(entry, _)| *entry == id))
    }

    fn take(&mut self, key: &Option<PeerId>, id: u64) -> Option<Listener<T, M>> {
        let group = self.groups.get_mut(key)?;
        let pos = group.iter().position(|(entry, _)| *entry == id)?;
        let (_, listener) = group.remove(pos);
        if group.is_empty() {
            self.groups.remove(key);
        }
        Some(listener)
    }
}

pub struct PeerEventRouter<T, M = ()> {
    registry: Rc<RefCell<Registry<T, M>>>,
}

impl<T: 'static, M: 'static> PeerEventRouter<T, M> {
    pub fn new() -> Self {
        Self {
            registry: Rc::new(RefCell::new(Registry {
                next_id: 0,
                groups: HashMap::new(),
            })),
        }
    }

    /// Register `listener` for events from `peer`, or from every peer when
    /// `peer` is `None`. The listener stays registered until the returned
    /// [`Subscription`] is dropped or unsubscribed.
    pub fn register<F>(&self, listener: F, peer: Option<PeerId>) -> Subscription
    where
        F: Fn(&T, &PeerId, Option<&M>) + 'static,
    {
        let id = {
            let mut registry = self.registry.borrow_mut();
            let id = registry.next_id;
            registry.next_id += 1;
            registry
                .groups
                .entry(peer.clone())
                .or_default()
                .push((id, Rc::new(listener)));
            id
        };

        let registry = Rc::downgrade(&self.registry);
        Subscription::new(move || {
            if let Some(registry) = registry.upgrade() {
                // dropped outside the borrow: the listener may own subscriptions
                // into this same router
                let removed = registry.borrow_mut().take(&peer, id);
                drop(removed);
            }
        })
    }

    /// Deliver one event. Listeners registered while dispatching see only
    /// later events; listeners removed while dispatching are skipped.
    pub fn dispatch(&self, payload: &T, peer: &PeerId, metadata: Option<&M>) {
        let snapshot: Vec<(Option<PeerId>, u64, Listener<T, M>)> = {
            let registry = self.registry.borrow();
            let scoped = Some(peer.clone());
            [scoped, None]
                .into_iter()
                .flat_map(|key| {
                    registry
                        .groups
                        .get(&key)
                        .map(|group| {
                            group
                                .iter()
                                .map(|(id, listener)| (key.clone(), *id, listener.clone()))
                                .collect::<Vec<_>>()
                        })
                        .unwrap_or_default()
                })
                .collect()
        };

        for (key, id, listener) in snapshot {
            let live = self.registry.borrow().contains(&key, id);
            if live {
                listener(payload, peer, metadata);
            }
        }
    }

    /// Number of registered listeners, scoped and global.
    pub fn listener_count(&self) -> usize {
        self.registry
            .borrow()
            .groups
            .values()
            .map(Vec::len)
            .sum()
    }
}

impl<T: 'static, M: 'static> Default for PeerEventRouter<T, M> {
    fn default() -> Self {
        Self::new()
    }
}

/// Registration handle returned by [`PeerEventRouter::register`].
///
/// Dropping it unregisters the listener.
#[must_use = "dropping a Subscription unregisters its listener"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Unregister now. Same as dropping the handle.
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

//! Per-origin session storage.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use enclave_core::{Origin, PluginId};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::types::Session;

type Slot = Arc<Mutex<Option<Session>>>;

/// Sessions keyed by origin.
///
/// Each origin owns one slot guarded by an async mutex. Everything that
/// reads or replaces an origin's session goes through [`SessionStore::lock`],
/// so operations on one origin are serialized while different origins never
/// contend.
///
/// Sessions enter and leave a slot through [`insert`](Self::insert) and
/// [`take`](Self::take), which keep a plugin-to-origins index in step. The
/// index is read without touching any slot, so finding the sessions bound to
/// a plugin never waits on an origin that is busy negotiating.
#[derive(Clone, Default)]
pub struct SessionStore {
    slots: Arc<DashMap<Origin, Slot>>,
    bindings: Arc<DashMap<PluginId, BTreeSet<Origin>>>,
}

impl SessionStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the origin's slot, creating it if needed.
    pub async fn lock(&self, origin: &Origin) -> OwnedMutexGuard<Option<Session>> {
        let slot = Arc::clone(self.slots.entry(origin.clone()).or_default().value());
        slot.lock_owned().await
    }

    /// Lock the origin's slot if one exists.
    pub async fn lock_existing(&self, origin: &Origin) -> Option<OwnedMutexGuard<Option<Session>>> {
        let slot = self.slots.get(origin).map(|s| Arc::clone(s.value()))?;
        Some(slot.lock_owned().await)
    }

    /// Drop the origin's slot if it is empty and nobody else holds it.
    ///
    /// Call after releasing the guard.
    pub fn prune(&self, origin: &Origin) {
        self.slots.remove_if(origin, |_, slot| {
            Arc::strong_count(slot) == 1 && slot.try_lock().is_ok_and(|s| s.is_none())
        });
    }

    /// Put `session` into a locked slot, replacing and returning whatever
    /// was there.
    pub fn insert(&self, slot: &mut Option<Session>, session: Session) -> Option<Session> {
        let previous = self.take(slot);
        for plugin_id in session.bound_plugins() {
            self.bindings
                .entry(plugin_id)
                .or_default()
                .insert(session.origin.clone());
        }
        *slot = Some(session);
        previous
    }

    /// Remove the session from a locked slot.
    pub fn take(&self, slot: &mut Option<Session>) -> Option<Session> {
        let session = slot.take()?;
        for plugin_id in session.bound_plugins() {
            if let Some(mut origins) = self.bindings.get_mut(&plugin_id) {
                origins.remove(&session.origin);
            }
            self.bindings.remove_if(&plugin_id, |_, origins| origins.is_empty());
        }
        Some(session)
    }

    /// Origins whose stored session binds `plugin_id`, sorted.
    ///
    /// Reads the index only. A caller acting on the result must re-check
    /// under the origin's lock, since the session may change meanwhile.
    #[must_use]
    pub fn origins_binding(&self, plugin_id: &PluginId) -> Vec<Origin> {
        self.bindings
            .get(plugin_id)
            .map(|origins| origins.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of stored sessions.
    pub async fn len(&self) -> usize {
        let slots: Vec<Slot> = self.slots.iter().map(|e| Arc::clone(e.value())).collect();
        let mut count: usize = 0;
        for slot in slots {
            if slot.lock().await.is_some() {
                count = count.saturating_add(1);
            }
        }
        count
    }

    /// Whether no session is stored.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore")
            .field("origins", &self.slots.len())
            .field("bound_plugins", &self.bindings.len())
            .finish_non_exhaustive()
    }
}

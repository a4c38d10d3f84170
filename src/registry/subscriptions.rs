//! Persistent push callbacks keyed by URI.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::protocol::MercuryResponse;

/// Persistent callback for pushes to a subscribed URI.
pub type PushCallback = Arc<dyn Fn(&MercuryResponse) + Send + Sync + 'static>;

/// How a push URI is matched against subscriptions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MatchPolicy {
    /// Only an identical URI matches.
    #[default]
    Exact,
    /// Exact match first, then the longest subscribed URI that prefixes the
    /// push URI.
    LongestPrefix,
}

/// Table of subscriptions, at most one per URI.
pub struct SubscriptionRegistry {
    policy: MatchPolicy,
    entries: Mutex<HashMap<String, PushCallback>>,
}

impl SubscriptionRegistry {
    pub fn new(policy: MatchPolicy) -> Self {
        Self {
            policy,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Insert a subscription, replacing any existing one for `uri`.
    ///
    /// Returns the displaced callback, if any.
    pub fn subscribe(&self, uri: &str, callback: PushCallback) -> Option<PushCallback> {
        let displaced = self.entries.lock().insert(uri.to_string(), callback);
        if displaced.is_some() {
            tracing::warn!(uri, "Replacing existing subscription");
        }
        displaced
    }

    /// Undo a [`subscribe`](Self::subscribe) of `inserted`, putting back
    /// `displaced` (or removing the entry when there was none).
    ///
    /// Does nothing if `uri` no longer maps to `inserted`, i.e. another
    /// subscribe or unsubscribe got there first.
    pub fn restore(&self, uri: &str, inserted: &PushCallback, displaced: Option<PushCallback>) {
        let mut entries = self.entries.lock();
        match entries.get(uri) {
            Some(current) if Arc::ptr_eq(current, inserted) => {}
            _ => return,
        }
        match displaced {
            Some(previous) => {
                entries.insert(uri.to_string(), previous);
            }
            None => {
                entries.remove(uri);
            }
        }
    }

    /// Remove the subscription for `uri`. No-op if absent.
    pub fn unsubscribe(&self, uri: &str) -> bool {
        self.entries.lock().remove(uri).is_some()
    }

    /// Find the callback for a push addressed to `uri`.
    ///
    /// The returned handle is cloned out so the caller invokes it unlocked.
    pub fn lookup(&self, uri: &str) -> Option<PushCallback> {
        let entries = self.entries.lock();
        if let Some(callback) = entries.get(uri) {
            return Some(callback.clone());
        }
        match self.policy {
            MatchPolicy::Exact => None,
            MatchPolicy::LongestPrefix => entries
                .iter()
                .filter(|(key, _)| uri.starts_with(key.as_str()))
                .max_by_key(|(key, _)| key.len())
                .map(|(_, callback)| callback.clone()),
        }
    }

    /// Subscribed URIs, sorted.
    pub fn uris(&self) -> Vec<String> {
        let mut uris: Vec<_> = self.entries.lock().keys().cloned().collect();
        uris.sort();
        uris
    }

    /// Match policy in effect.
    pub fn policy(&self) -> MatchPolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new(MatchPolicy::default())
    }
}

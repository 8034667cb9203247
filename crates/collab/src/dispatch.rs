//! Message fan-out to registered subscribers
//!
//! Routes each decoded message to the handlers registered for its kind,
//! then to wildcard handlers, synchronously, in subscription order.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use sitecraft_protocol::{MessageKind, SyncMessage};

static SUBSCRIPTION_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Callback invoked for each dispatched message.
pub type Handler = Arc<dyn Fn(&SyncMessage) + Send + Sync>;

/// Opaque handle returned by subscription calls; pass to `off` to
/// unsubscribe. Ids are unique for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

fn next_subscription_id() -> SubscriptionId {
    SubscriptionId(SUBSCRIPTION_COUNTER.fetch_add(1, Ordering::SeqCst))
}

/// Registry of kind-keyed and wildcard handlers, append-only per
/// subscription, removable by id.
#[derive(Default)]
pub(crate) struct HandlerRegistry {
    by_kind: HashMap<MessageKind, Vec<(SubscriptionId, Handler)>>,
    wildcard: Vec<(SubscriptionId, Handler)>,
}

impl HandlerRegistry {
    pub fn on(&mut self, kind: MessageKind, handler: Handler) -> SubscriptionId {
        let id = next_subscription_id();
        self.by_kind.entry(kind).or_default().push((id, handler));
        id
    }

    pub fn on_any(&mut self, handler: Handler) -> SubscriptionId {
        let id = next_subscription_id();
        self.wildcard.push((id, handler));
        id
    }

    /// Remove a subscription; unknown ids are a no-op.
    pub fn off(&mut self, id: SubscriptionId) {
        for handlers in self.by_kind.values_mut() {
            handlers.retain(|(entry, _)| *entry != id);
        }
        self.wildcard.retain(|(entry, _)| *entry != id);
    }

    /// Drop every subscription.
    pub fn clear(&mut self) {
        self.by_kind.clear();
        self.wildcard.clear();
    }

    /// Snapshot the handlers a message of `kind` must reach:
    /// kind-specific first, wildcard after, each in subscription order.
    pub fn snapshot(&self, kind: MessageKind) -> Vec<Handler> {
        let specific = self.by_kind.get(&kind).map(Vec::as_slice).unwrap_or_default();
        specific
            .iter()
            .chain(self.wildcard.iter())
            .map(|(_, handler)| handler.clone())
            .collect()
    }
}

/// Invoke every handler in order. A panicking handler is logged and
/// does not stop dispatch to the rest.
pub(crate) fn dispatch_all(handlers: &[Handler], message: &SyncMessage) {
    for handler in handlers {
        if catch_unwind(AssertUnwindSafe(|| handler(message))).is_err() {
            tracing::error!(kind = %message.payload.kind(), "message handler panicked");
        }
    }
}

//! Change notification for collections, caches and handlers.
//!
//! Two flavours share one connection table:
//!
//! - [`Signal<Args>`] tells observers that something happened.
//! - [`VetoSignal<Args>`] asks observers whether something may happen.
//!
//! Slots run synchronously on the emitting thread, oldest connection first.
//! The table is snapshotted
//! before any slot runs, so a slot may connect, disconnect or emit on the same
//! signal; connections made during an emission miss that emission.
//!
//! # Example
//!
//! ```
//! use horizon_pageable_core::{Signal, VetoSignal};
//!
//! let page_loaded = Signal::<usize>::new();
//! let id = page_loaded.connect(|rows| println!("{rows} rows loaded"));
//! page_loaded.emit(25);
//! page_loaded.disconnect(id);
//!
//! let about_to_remove = VetoSignal::<usize>::new();
//! about_to_remove.connect(|&count| count < 100);
//! assert!(about_to_remove.request(&10));
//! assert!(!about_to_remove.request(&500));
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use slotmap::{new_key_type, SlotMap};

use crate::logging::targets;

new_key_type! {
    /// Identifies one connection; pass it to `disconnect`.
    pub struct ConnectionId;
}

struct SlotTable<F: ?Sized> {
    // Slot keys are reused after removal, so order comes from the sequence.
    slots: Mutex<SlotMap<ConnectionId, (u64, Arc<F>)>>,
    next_seq: AtomicU64,
    blocked: AtomicBool,
}

impl<F: ?Sized> SlotTable<F> {
    fn new() -> Self {
        Self {
            slots: Mutex::new(SlotMap::with_key()),
            next_seq: AtomicU64::new(0),
            blocked: AtomicBool::new(false),
        }
    }

    fn insert(&self, slot: Arc<F>) -> ConnectionId {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.slots.lock().insert((seq, slot))
    }

    fn remove(&self, id: ConnectionId) -> bool {
        self.slots.lock().remove(id).is_some()
    }

    fn clear(&self) {
        self.slots.lock().clear();
    }

    fn len(&self) -> usize {
        self.slots.lock().len()
    }

    fn set_blocked(&self, blocked: bool) {
        self.blocked.store(blocked, Ordering::SeqCst);
    }

    fn is_blocked(&self) -> bool {
        self.blocked.load(Ordering::SeqCst)
    }

    /// Connected slots in connection order, or `None` while blocked.
    fn snapshot(&self) -> Option<Vec<Arc<F>>> {
        if self.is_blocked() {
            return None;
        }
        let mut slots: Vec<(u64, Arc<F>)> = self.slots.lock().values().cloned().collect();
        slots.sort_unstable_by_key(|(seq, _)| *seq);
        Some(slots.into_iter().map(|(_, slot)| slot).collect())
    }
}

/// Notifies connected slots after something happened.
///
/// `Args` is passed to every slot by reference; use `()` for bare
/// notifications.
pub struct Signal<Args> {
    table: SlotTable<dyn Fn(&Args) + Send + Sync>,
}

impl<Args: 'static> Default for Signal<Args> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Args: 'static> Signal<Args> {
    /// A signal without connections.
    pub fn new() -> Self {
        Self {
            table: SlotTable::new(),
        }
    }

    /// Connect `slot`; it runs on every emission until disconnected.
    pub fn connect<F>(&self, slot: F) -> ConnectionId
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        self.table.insert(Arc::new(slot))
    }

    /// Returns `false` if `id` was not connected.
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        self.table.remove(id)
    }

    /// Drop every connection.
    pub fn disconnect_all(&self) {
        self.table.clear();
    }

    /// Number of connected slots.
    pub fn connection_count(&self) -> usize {
        self.table.len()
    }

    /// While blocked, `emit` does nothing.
    pub fn set_blocked(&self, blocked: bool) {
        self.table.set_blocked(blocked);
    }

    /// Returns `true` while blocked.
    pub fn is_blocked(&self) -> bool {
        self.table.is_blocked()
    }

    /// Run every connected slot with `args`.
    pub fn emit(&self, args: Args) {
        let Some(slots) = self.table.snapshot() else {
            tracing::trace!(target: targets::SIGNAL, "emit suppressed, signal blocked");
            return;
        };
        tracing::trace!(target: targets::SIGNAL, slots = slots.len(), "emit");
        for slot in slots {
            slot(&args);
        }
    }
}

/// Asks connected slots for approval before a change is committed.
///
/// Slots are consulted in connection order. The first one returning `false`
/// vetoes the change; later slots are not asked.
pub struct VetoSignal<Args> {
    table: SlotTable<dyn Fn(&Args) -> bool + Send + Sync>,
}

impl<Args: 'static> Default for VetoSignal<Args> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Args: 'static> VetoSignal<Args> {
    /// A veto signal without connections; every request is approved.
    pub fn new() -> Self {
        Self {
            table: SlotTable::new(),
        }
    }

    /// Connect a slot that approves (`true`) or vetoes (`false`) a change.
    pub fn connect<F>(&self, slot: F) -> ConnectionId
    where
        F: Fn(&Args) -> bool + Send + Sync + 'static,
    {
        self.table.insert(Arc::new(slot))
    }

    /// Returns `false` if `id` was not connected.
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        self.table.remove(id)
    }

    /// Drop every connection.
    pub fn disconnect_all(&self) {
        self.table.clear();
    }

    /// Number of connected slots.
    pub fn connection_count(&self) -> usize {
        self.table.len()
    }

    /// While blocked, every request is approved without asking slots.
    pub fn set_blocked(&self, blocked: bool) {
        self.table.set_blocked(blocked);
    }

    /// Returns `true` while blocked.
    pub fn is_blocked(&self) -> bool {
        self.table.is_blocked()
    }

    /// Announce a pending change. Returns `true` if no slot vetoed it.
    pub fn request(&self, args: &Args) -> bool {
        let Some(slots) = self.table.snapshot() else {
            return true;
        };
        for (position, slot) in slots.into_iter().enumerate() {
            if !slot(args) {
                tracing::debug!(target: targets::SIGNAL, position, "change vetoed");
                return false;
            }
        }
        true
    }
}

static_assertions::assert_impl_all!(Signal<()>: Send, Sync);
static_assertions::assert_impl_all!(VetoSignal<()>: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn recording(signal: &Signal<u64>) -> Arc<Mutex<Vec<u64>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        signal.connect(move |&count| seen_clone.lock().push(count));
        seen
    }

    #[test]
    fn test_emit_reaches_slots_in_order() {
        let count_changed = Signal::<u64>::new();
        let seen = recording(&count_changed);
        let tagged = Arc::new(Mutex::new(Vec::new()));
        let tagged_clone = tagged.clone();
        count_changed.connect(move |&count| tagged_clone.lock().push(count * 10));

        count_changed.emit(3);
        count_changed.emit(7);

        assert_eq!(*seen.lock(), vec![3, 7]);
        assert_eq!(*tagged.lock(), vec![30, 70]);
    }

    #[test]
    fn test_order_survives_reused_slots() {
        let signal = Signal::<()>::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let tagged = |tag: &'static str| {
            let order = order.clone();
            move |_: &()| order.lock().push(tag)
        };

        let first = signal.connect(tagged("first"));
        signal.connect(tagged("second"));
        signal.disconnect(first);
        signal.connect(tagged("third"));
        signal.emit(());

        assert_eq!(*order.lock(), vec!["second", "third"]);
    }

    #[test]
    fn test_disconnect_stops_delivery() {
        let count_changed = Signal::<u64>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let id = count_changed.connect(move |&count| seen_clone.lock().push(count));

        count_changed.emit(1);
        assert!(count_changed.disconnect(id));
        assert!(!count_changed.disconnect(id));
        count_changed.emit(2);

        assert_eq!(*seen.lock(), vec![1]);
        assert_eq!(count_changed.connection_count(), 0);
    }

    #[test]
    fn test_blocked_signal_drops_emissions() {
        let count_changed = Signal::<u64>::new();
        let seen = recording(&count_changed);

        count_changed.emit(1);
        count_changed.set_blocked(true);
        count_changed.emit(2);
        count_changed.set_blocked(false);
        count_changed.emit(3);

        assert_eq!(*seen.lock(), vec![1, 3]);
    }

    #[test]
    fn test_disconnect_all() {
        let invalidated = Signal::<()>::new();
        for _ in 0..3 {
            invalidated.connect(|_| {});
        }
        invalidated.disconnect_all();
        assert_eq!(invalidated.connection_count(), 0);
    }

    #[test]
    fn test_slot_may_reenter_signal() {
        let signal = Arc::new(Signal::<u32>::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let weak = Arc::downgrade(&signal);
        let calls_clone = calls.clone();
        signal.connect(move |&depth| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            if depth == 0 {
                if let Some(signal) = weak.upgrade() {
                    signal.emit(1);
                }
            }
        });

        signal.emit(0);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_slot_connected_during_emit_misses_it() {
        let signal = Arc::new(Signal::<()>::new());
        let late_calls = Arc::new(AtomicUsize::new(0));

        let weak = Arc::downgrade(&signal);
        let late = late_calls.clone();
        signal.connect(move |_| {
            if let Some(signal) = weak.upgrade() {
                let late = late.clone();
                signal.connect(move |_| {
                    late.fetch_add(1, Ordering::SeqCst);
                });
            }
        });

        signal.emit(());
        assert_eq!(late_calls.load(Ordering::SeqCst), 0);
        assert_eq!(signal.connection_count(), 2);
    }

    #[test]
    fn test_veto_without_slots_approves() {
        assert!(VetoSignal::<()>::new().request(&()));
    }

    #[test]
    fn test_first_veto_wins() {
        let about_to_remove = VetoSignal::<i64>::new();
        let asked = Arc::new(AtomicUsize::new(0));

        let first = asked.clone();
        about_to_remove.connect(move |&n| {
            first.fetch_add(1, Ordering::SeqCst);
            n > 0
        });
        let second = asked.clone();
        about_to_remove.connect(move |_| {
            second.fetch_add(1, Ordering::SeqCst);
            true
        });

        assert!(!about_to_remove.request(&-1));
        assert_eq!(asked.load(Ordering::SeqCst), 1);

        assert!(about_to_remove.request(&1));
        assert_eq!(asked.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_blocked_veto_signal_approves() {
        let about_to_remove = VetoSignal::<()>::new();
        about_to_remove.connect(|_| false);
        assert!(!about_to_remove.request(&()));

        about_to_remove.set_blocked(true);
        assert!(about_to_remove.request(&()));
    }
}

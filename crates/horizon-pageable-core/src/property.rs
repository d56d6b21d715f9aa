//! Reactive value cells.
//!
//! - [`Property<T>`]: a value with change detection; callers emit their own
//!   notification signal when `set()` reports a change.
//! - [`Memo<T>`]: a lazily computed, resettable value whose initialization may
//!   fail. Used for values that cost a backend round trip (id lists, item
//!   counts, the current page).
//!
//! # Example
//!
//! ```
//! use horizon_pageable_core::{Property, Signal};
//!
//! struct Pager {
//!     page_index: Property<usize>,
//!     page_index_changed: Signal<usize>,
//! }
//!
//! impl Pager {
//!     fn set_page_index(&self, index: usize) {
//!         if self.page_index.set(index) {
//!             self.page_index_changed.emit(index);
//!         }
//!     }
//! }
//! ```

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

/// A value cell that reports whether a write changed it.
///
/// Properties carry no signal of their own; the owner decides what a change
/// means and what to emit.
pub struct Property<T> {
    value: RwLock<T>,
}

impl<T: Clone> Property<T> {
    /// A property holding `value`.
    pub fn new(value: T) -> Self {
        Self {
            value: RwLock::new(value),
        }
    }

    /// A copy of the current value.
    pub fn get(&self) -> T {
        self.value.read().clone()
    }
}

impl<T: Clone + PartialEq> Property<T> {
    /// Store `value`. Returns `false` if it equals the current value.
    pub fn set(&self, value: T) -> bool {
        let mut current = self.value.write();
        if *current == value {
            return false;
        }
        *current = value;
        true
    }
}

impl<T: Clone + Default> Default for Property<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Clone + fmt::Debug> fmt::Debug for Property<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("value", &self.get())
            .finish()
    }
}

/// A lazily initialized value that can be reset.
///
/// Initialization is double-checked under a lock: when several callers race
/// to read an unset memo, exactly one runs the initializer and every caller
/// receives the same `Arc`. A failed initialization leaves the memo unset.
///
/// The initializer must not access the same memo.
pub struct Memo<T> {
    value: Mutex<Option<Arc<T>>>,
}

impl<T> Default for Memo<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Memo<T> {
    /// Create an unset memo.
    pub fn new() -> Self {
        Self {
            value: Mutex::new(None),
        }
    }

    /// Returns the cached value, if any, without initializing.
    pub fn get(&self) -> Option<Arc<T>> {
        self.value.lock().clone()
    }

    /// Returns `true` if a value is cached.
    pub fn is_set(&self) -> bool {
        self.value.lock().is_some()
    }

    /// Replace the cached value.
    pub fn set(&self, value: T) -> Arc<T> {
        let value = Arc::new(value);
        *self.value.lock() = Some(value.clone());
        value
    }

    /// Drop the cached value. Returns `true` if a value was cached.
    pub fn reset(&self) -> bool {
        self.value.lock().take().is_some()
    }

    /// Returns the cached value, running `init` first if the memo is unset.
    pub fn get_or_try_init<E, F>(&self, init: F) -> Result<Arc<T>, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        self.get_or_try_init_if(|_| true, init)
    }

    /// Like [`get_or_try_init`](Self::get_or_try_init), but also re-runs
    /// `init` when the cached value fails `is_valid`.
    pub fn get_or_try_init_if<E, V, F>(&self, is_valid: V, init: F) -> Result<Arc<T>, E>
    where
        V: FnOnce(&T) -> bool,
        F: FnOnce() -> Result<T, E>,
    {
        let mut slot = self.value.lock();
        if let Some(value) = slot.as_ref() {
            if is_valid(value) {
                return Ok(value.clone());
            }
        }
        let value = Arc::new(init()?);
        *slot = Some(value.clone());
        Ok(value)
    }
}

impl<T: Clone> Memo<T> {
    /// Modify the cached value in place. Does nothing if the memo is unset.
    ///
    /// Readers holding the previous `Arc` keep seeing the previous value.
    pub fn update<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut T),
    {
        let mut slot = self.value.lock();
        match slot.as_mut() {
            Some(value) => {
                f(Arc::make_mut(value));
                true
            }
            None => false,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Memo<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memo")
            .field("value", &*self.value.lock())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;

    #[test]
    fn test_property_set_reports_change() {
        let page_size = Property::new(25usize);
        assert!(!page_size.set(25));
        assert!(page_size.set(50));
        assert_eq!(page_size.get(), 50);
        assert_eq!(format!("{page_size:?}"), "Property { value: 50 }");
    }

    #[test]
    fn test_memo_initializes_once() {
        let memo = Memo::new();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = memo
                .get_or_try_init(|| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ()>(7)
                })
                .unwrap();
            assert_eq!(*value, 7);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_memo_failed_init_stays_unset() {
        let memo: Memo<u32> = Memo::new();
        assert_eq!(memo.get_or_try_init(|| Err("boom")), Err("boom"));
        assert!(!memo.is_set());
        assert_eq!(*memo.get_or_try_init(|| Ok::<_, ()>(1)).unwrap(), 1);
    }

    #[test]
    fn test_memo_reset_and_invalid() {
        let memo = Memo::new();
        memo.set(1u32);
        assert!(memo.reset());
        assert!(!memo.reset());

        memo.set(1u32);
        let value = memo
            .get_or_try_init_if(|v| *v == 2, || Ok::<_, ()>(2))
            .unwrap();
        assert_eq!(*value, 2);
    }

    #[test]
    fn test_memo_update_in_place() {
        let memo = Memo::new();
        assert!(!memo.update(|v: &mut Vec<u32>| v.push(1)));

        let before = memo.set(vec![1, 2, 3]);
        assert!(memo.update(|v| v.retain(|&x| x != 2)));
        assert_eq!(*before, vec![1, 2, 3]);
        assert_eq!(*memo.get().unwrap(), vec![1, 3]);
    }

    #[test]
    fn test_memo_racing_readers_share_one_load() {
        let memo = Arc::new(Memo::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(4));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let memo = memo.clone();
                let calls = calls.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    memo.get_or_try_init(|| {
                        calls.fetch_add(1, Ordering::SeqCst);
                        std::thread::sleep(std::time::Duration::from_millis(10));
                        Ok::<_, ()>(vec![1, 2, 3])
                    })
                    .unwrap()
                })
            })
            .collect();

        let values: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(values.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }
}

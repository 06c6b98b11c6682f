//! Externally-synchronized cells for state shared across requests
//!
//! Per-request snapshots are clones of the application state, so a plain
//! field mutated by one request is never seen by the next. A [`SharedCell`]
//! clones by reference: every snapshot sees the same value, and writers are
//! serialized by the cell's lock.

use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

pub struct SharedCell<T> {
    inner: Arc<RwLock<T>>,
}

impl<T> Clone for SharedCell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for SharedCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.read(|value| f.debug_tuple("SharedCell").field(value).finish())
    }
}

impl<T: Default> Default for SharedCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> SharedCell<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(RwLock::new(value)),
        }
    }

    /// Read the current value under the lock
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.read())
    }

    /// Update the value atomically with respect to other cell users
    pub fn modify<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.inner.write())
    }

    /// Replace the value, returning the previous one
    pub fn replace(&self, value: T) -> T {
        self.modify(|current| std::mem::replace(current, value))
    }

    /// Whether two cells share the same storage
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: Clone> SharedCell<T> {
    pub fn get(&self) -> T {
        self.read(T::clone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_storage() {
        let cell = SharedCell::new(0u64);
        let copy = cell.clone();
        copy.modify(|n| *n += 3);
        assert_eq!(cell.get(), 3);
        assert!(cell.ptr_eq(&copy));
        assert!(!cell.ptr_eq(&SharedCell::new(3)));
    }

    #[test]
    fn test_replace() {
        let cell = SharedCell::new("a".to_string());
        assert_eq!(cell.replace("b".to_string()), "a");
        assert_eq!(cell.get(), "b");
    }

    #[test]
    fn test_panicking_writer_leaves_cell_usable() {
        let cell = SharedCell::new(1u64);
        let writer = cell.clone();
        let result = std::thread::spawn(move || {
            writer.modify(|n| {
                *n = 2;
                panic!("writer died");
            })
        })
        .join();

        assert!(result.is_err());
        assert_eq!(cell.get(), 2);
        cell.modify(|n| *n += 1);
        assert_eq!(cell.get(), 3);
    }

    #[test]
    fn test_concurrent_increments() {
        let cell = SharedCell::new(0u64);
        std::thread::scope(|scope| {
            for _ in 0..8 {
                let cell = cell.clone();
                scope.spawn(move || {
                    for _ in 0..100 {
                        cell.modify(|n| *n += 1);
                    }
                });
            }
        });
        assert_eq!(cell.get(), 800);
    }
}

// Resizable bounded i32 stack; one mutex guards capacity and elements together.
use std::collections::TryReserveError;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::core::error::{Error, ErrorKind};

/// Outcome of a pop. `Empty` is a normal result of draining, not an error.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Pop {
    Value(i32),
    Empty,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct StackSnapshot {
    pub capacity: usize,
    pub elements: Vec<i32>,
}

#[derive(Debug, Default)]
struct Slots {
    capacity: usize,
    // Index 0 is the bottom; `elements.len() <= capacity` at all times.
    elements: Vec<i32>,
}

#[derive(Debug, Default)]
pub struct StackStore {
    slots: Mutex<Slots>,
}

impl StackStore {
    /// Creates an unsized store: capacity 0, so every push is `Full` until resized.
    pub fn new() -> Self {
        Self::default()
    }

    // Every critical section restores the invariant before anything can panic,
    // so a poisoned guard still holds consistent state.
    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces the backing storage with room for `new_capacity` elements.
    ///
    /// The bottom `min(height, new_capacity)` elements survive in order; anything
    /// above the new capacity is dropped without error. On failure nothing changes.
    pub fn resize(&self, new_capacity: i32) -> Result<(), Error> {
        self.resize_with(new_capacity, Vec::try_reserve_exact)
    }

    fn resize_with(
        &self,
        new_capacity: i32,
        reserve: impl FnOnce(&mut Vec<i32>, usize) -> Result<(), TryReserveError>,
    ) -> Result<(), Error> {
        if new_capacity <= 0 {
            return Err(Error::new(ErrorKind::InvalidArgument)
                .with_message(format!("stack size must be > 0, got {new_capacity}")));
        }
        let capacity = usize::try_from(new_capacity).map_err(|err| {
            Error::new(ErrorKind::InvalidArgument)
                .with_message("stack size does not fit the address space")
                .with_source(err)
        })?;

        let mut slots = self.lock();
        let mut storage = Vec::new();
        reserve(&mut storage, capacity).map_err(|err| {
            Error::new(ErrorKind::AllocationFailure)
                .with_message(format!("cannot allocate room for {capacity} elements"))
                .with_source(err)
        })?;
        let keep = slots.elements.len().min(capacity);
        storage.extend_from_slice(&slots.elements[..keep]);
        let dropped = slots.elements.len() - keep;

        slots.elements = storage;
        slots.capacity = capacity;
        debug!(capacity, height = keep, dropped, "stack resized");
        Ok(())
    }

    pub fn push(&self, value: i32) -> Result<(), Error> {
        let mut slots = self.lock();
        if slots.elements.len() >= slots.capacity {
            return Err(Error::new(ErrorKind::Full).with_message(format!(
                "stack is full ({} of {})",
                slots.elements.len(),
                slots.capacity
            )));
        }
        // Storage was reserved up to capacity by resize; this never reallocates.
        slots.elements.push(value);
        Ok(())
    }

    pub fn pop(&self) -> Pop {
        self.lock().elements.pop().map_or(Pop::Empty, Pop::Value)
    }

    pub fn height(&self) -> usize {
        self.lock().elements.len()
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }

    pub fn snapshot(&self) -> StackSnapshot {
        let slots = self.lock();
        StackSnapshot {
            capacity: slots.capacity,
            elements: slots.elements.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Pop, StackStore};
    use crate::core::error::ErrorKind;
    use std::sync::Arc;

    fn sized(capacity: i32) -> StackStore {
        let store = StackStore::new();
        store.resize(capacity).expect("resize");
        store
    }

    #[test]
    fn unsized_store_rejects_pushes() {
        let store = StackStore::new();
        assert_eq!(store.capacity(), 0);
        let err = store.push(7).expect_err("full");
        assert_eq!(err.kind(), ErrorKind::Full);
        assert_eq!(store.height(), 0);
        assert_eq!(store.pop(), Pop::Empty);
    }

    #[test]
    fn capacity_two_scenario() {
        let store = sized(2);
        store.push(1).expect("push 1");
        store.push(2).expect("push 2");
        let err = store.push(3).expect_err("push 3");
        assert_eq!(err.kind(), ErrorKind::Full);
        assert_eq!(store.height(), 2);
        assert_eq!(store.pop(), Pop::Value(2));
        assert_eq!(store.pop(), Pop::Value(1));
        assert_eq!(store.pop(), Pop::Empty);
    }

    #[test]
    fn capacity_three_pops_in_reverse() {
        let store = sized(3);
        for value in [1, 2, 3] {
            store.push(value).expect("push");
        }
        let drained: Vec<_> = std::iter::from_fn(|| match store.pop() {
            Pop::Value(value) => Some(value),
            Pop::Empty => None,
        })
        .collect();
        assert_eq!(drained, vec![3, 2, 1]);
        assert_eq!(store.pop(), Pop::Empty);
    }

    #[test]
    fn non_positive_sizes_leave_state_untouched() {
        let store = sized(4);
        store.push(10).expect("push");
        store.push(20).expect("push");
        let before = store.snapshot();

        for size in [0, -1, i32::MIN] {
            let err = store.resize(size).expect_err("invalid size");
            assert_eq!(err.kind(), ErrorKind::InvalidArgument);
            assert_eq!(store.snapshot(), before);
        }
    }

    #[test]
    fn allocation_failure_leaves_state_untouched() {
        let store = sized(3);
        store.push(1).expect("push");
        store.push(2).expect("push");
        let before = store.snapshot();

        let err = store
            .resize_with(8, |storage, _| storage.try_reserve_exact(usize::MAX))
            .expect_err("reserve fails");
        assert_eq!(err.kind(), ErrorKind::AllocationFailure);
        assert_eq!(store.snapshot(), before);
        store.push(3).expect("old capacity still usable");
    }

    #[test]
    fn shrinking_keeps_the_bottom_elements() {
        let store = sized(5);
        for value in [1, 2, 3, 4, 5] {
            store.push(value).expect("push");
        }
        store.resize(2).expect("shrink");
        let snapshot = store.snapshot();
        assert_eq!(snapshot.capacity, 2);
        assert_eq!(snapshot.elements, vec![1, 2]);
        assert_eq!(store.push(6).expect_err("full").kind(), ErrorKind::Full);
        assert_eq!(store.pop(), Pop::Value(2));
    }

    #[test]
    fn growing_preserves_contents_and_accepts_more() {
        let store = sized(2);
        store.push(1).expect("push");
        store.push(2).expect("push");
        store.resize(4).expect("grow");
        store.push(3).expect("push after grow");
        assert_eq!(store.snapshot().elements, vec![1, 2, 3]);
        assert_eq!(store.capacity(), 4);
    }

    #[test]
    fn push_then_pop_restores_prior_state() {
        let store = sized(3);
        store.push(5).expect("push");
        let before = store.snapshot();
        store.push(-42).expect("push");
        assert_eq!(store.pop(), Pop::Value(-42));
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn interleaved_operations_keep_height_within_capacity() {
        let store = StackStore::new();
        let mut state: u32 = 0x2545_f491;
        for step in 0..2_000 {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            match (state >> 16) % 4 {
                0 => {
                    let size = ((state >> 8) % 9) as i32 - 1;
                    let height = store.height();
                    let result = store.resize(size);
                    if size <= 0 {
                        assert!(result.is_err());
                        assert_eq!(store.height(), height);
                    } else {
                        assert_eq!(store.height(), height.min(size as usize));
                    }
                }
                1 | 2 => {
                    let _ = store.push(step);
                }
                _ => {
                    let _ = store.pop();
                }
            }
            let snapshot = store.snapshot();
            assert!(snapshot.elements.len() <= snapshot.capacity);
        }
    }

    #[test]
    fn concurrent_pushes_fill_every_slot_once() {
        let workers = 64;
        let store = Arc::new(sized(workers));
        std::thread::scope(|scope| {
            for value in 0..workers {
                let store = Arc::clone(&store);
                scope.spawn(move || store.push(value).expect("push"));
            }
        });

        assert_eq!(store.height(), workers as usize);
        assert_eq!(store.push(-1).expect_err("full").kind(), ErrorKind::Full);
        let mut elements = store.snapshot().elements;
        elements.sort_unstable();
        assert_eq!(elements, (0..workers).collect::<Vec<_>>());
    }

    #[test]
    fn concurrent_mixed_operations_never_break_bounds() {
        let store = Arc::new(sized(8));
        std::thread::scope(|scope| {
            for worker in 0..8 {
                let store = Arc::clone(&store);
                scope.spawn(move || {
                    for step in 0..500 {
                        match (worker + step) % 5 {
                            0 => store.resize(1 + (step % 16)).expect("resize"),
                            1 | 2 => {
                                let _ = store.push(step);
                            }
                            _ => {
                                let _ = store.pop();
                            }
                        }
                        let snapshot = store.snapshot();
                        assert!(snapshot.elements.len() <= snapshot.capacity);
                    }
                });
            }
        });
    }
}

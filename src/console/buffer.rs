use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// Fixed-capacity buffer shared by one producer and one reader. Entries are
/// kept sorted; when full, the smallest (oldest) entry is evicted. `push`
/// never blocks on the reader.
#[derive(Debug)]
pub struct RingBuffer<T> {
    inner: Mutex<Inner<T>>,
    ready: Condvar,
    capacity: usize,
}

#[derive(Debug)]
struct Inner<T> {
    items: VecDeque<T>,
    evicted: u64,
}

impl<T: Ord> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity),
                evicted: 0,
            }),
            ready: Condvar::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }

    /// Total entries dropped to make room.
    pub fn evicted(&self) -> u64 {
        self.inner.lock().evicted
    }

    /// Insert in order and wake the reader. Returns whether an entry was
    /// evicted. Items usually arrive in order, so the scan starts at the back.
    pub fn push(&self, item: T) -> bool {
        let mut inner = self.inner.lock();
        let at = inner
            .items
            .iter()
            .rposition(|existing| *existing <= item)
            .map_or(0, |i| i + 1);
        inner.items.insert(at, item);
        let evicted = inner.items.len() > self.capacity;
        if evicted {
            inner.items.pop_front();
            inner.evicted += 1;
        }
        drop(inner);
        self.ready.notify_one();
        evicted
    }

    /// Take everything buffered, oldest first.
    pub fn drain(&self) -> Vec<T> {
        self.inner.lock().items.drain(..).collect()
    }

    /// Like `drain`, but waits up to `timeout` for something to arrive when
    /// the buffer is empty.
    pub fn wait_drain(&self, timeout: Duration) -> Vec<T> {
        let mut inner = self.inner.lock();
        if inner.items.is_empty() {
            let _ = self.ready.wait_for(&mut inner, timeout);
        }
        inner.items.drain(..).collect()
    }

    /// Wake a reader blocked in `wait_drain` without adding anything.
    pub fn wake(&self) {
        self.ready.notify_all();
    }
}

impl<T: Ord + Clone> RingBuffer<T> {
    pub fn snapshot(&self) -> Vec<T> {
        self.inner.lock().items.iter().cloned().collect()
    }
}

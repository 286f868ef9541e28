//! A lock-free, read-optimized hash map.
//!
//! Reads (lookups and iteration) never take a lock: all synchronization between readers and
//! writers is performed with atomics. Writers are serialized on an internal mutex.
//!
//! The map never frees node or bucket-array memory while it is alive: growing the array or
//! erasing an element only retires the old allocation into an internal arena that is dropped
//! together with the map itself. This makes the structure a poor fit for workloads that erase
//! heavily, but it's what lets lookups walk live node pointers without any reference counting or
//! hazard pointers. Values handed out by `get` borrow from `&self` and stay valid for as long as
//! the map does.
//!
//! Iteration is loosely consistent: if a grow happens concurrently with an iteration, the
//! iterator may skip or repeat elements, but it will never observe a torn or freed node.

use std::borrow::Borrow;
use std::collections::hash_map::RandomState;
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicUsize, Ordering};

const MIN_CAPACITY_LOG2: u32 = 5;

struct Node<K, V> {
    hash: u64,
    key: K,
    value: V,
    deleted: AtomicBool,
}

struct Array<K, V> {
    capacity_log2: u32,
    size: AtomicUsize,
    slots: Box<[AtomicPtr<Node<K, V>>]>,
}

impl<K, V> Array<K, V> {
    fn with_capacity_log2(capacity_log2: u32) -> Box<Self> {
        let capacity = 1usize << capacity_log2;
        let slots = std::iter::repeat_with(|| AtomicPtr::new(std::ptr::null_mut()))
            .take(capacity)
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Box::new(Array { capacity_log2, size: AtomicUsize::new(0), slots })
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn mask(&self) -> usize {
        self.capacity() - 1
    }

    /// Quadratic probe for `key`. Slots holding a tombstoned node are skipped but do not
    /// terminate the probe sequence; only a null slot does.
    fn find<Q>(&self, hash: u64, key: &Q) -> Option<&Node<K, V>>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        let mask = self.mask();
        let mut i = (hash as usize) & mask;
        let mut j = 0usize;
        loop {
            let ptr = self.slots[i].load(Ordering::Acquire);
            if ptr.is_null() {
                return None;
            }
            let node = unsafe { &*ptr };
            if node.hash == hash
                && !node.deleted.load(Ordering::Relaxed)
                && key.eq(node.key.borrow())
            {
                return Some(node);
            }
            j += 1;
            i = (i + j) & mask;
        }
    }

    /// Inserts a node pointer into the first null-or-tombstoned slot on its probe sequence. Only
    /// called by a writer holding the map's mutex, whether for a fresh insertion or while
    /// rehashing into a freshly grown array, so relaxed loads on the slots suffice; the publish is
    /// still a release store so concurrent lock-free readers see a fully initialized node.
    ///
    /// Reusing tombstoned slots (not just null ones) is load-bearing: the table only ever grows
    /// when the *live* count would exceed half capacity, so a probe sequence that refused to reuse
    /// tombstones could fill every slot on its path with a mix of live and deleted nodes and loop
    /// forever looking for a null one. `find` has the same hazard. Since growth is keyed on the
    /// live count alone, reusing both kinds of reclaimable slot is what keeps each probe sequence
    /// guaranteed to terminate within `capacity` steps.
    fn insert_node_locked(&self, node: *mut Node<K, V>, hash: u64) {
        let mask = self.mask();
        let mut i = (hash as usize) & mask;
        let mut j = 0usize;
        loop {
            let slot = &self.slots[i];
            let existing = slot.load(Ordering::Relaxed);
            if existing.is_null() || unsafe { &*existing }.deleted.load(Ordering::Relaxed) {
                slot.store(node, Ordering::Release);
                return;
            }
            j += 1;
            i = (i + j) & mask;
        }
    }
}

struct Arenas<K, V> {
    arrays: Vec<*mut Array<K, V>>,
    nodes: Vec<*mut Node<K, V>>,
}

/// A lock-free, thread-safe hash map. The API is a subset of [`std::collections::HashMap`].
pub struct LockFreeHashMap<K, V, S = RandomState> {
    hasher: S,
    current: AtomicPtr<Array<K, V>>,
    arenas: Mutex<Arenas<K, V>>,
}

unsafe impl<K: Send + Sync, V: Send + Sync, S: Send> Send for LockFreeHashMap<K, V, S> {}
unsafe impl<K: Send + Sync, V: Send + Sync, S: Sync> Sync for LockFreeHashMap<K, V, S> {}

impl<K, V> Default for LockFreeHashMap<K, V, RandomState> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> LockFreeHashMap<K, V, RandomState> {
    pub fn new() -> Self {
        Self::with_hasher(RandomState::new())
    }
}

impl<K, V, S: BuildHasher> LockFreeHashMap<K, V, S> {
    pub fn with_hasher(hasher: S) -> Self {
        let array = Box::into_raw(Array::with_capacity_log2(MIN_CAPACITY_LOG2));
        Self {
            hasher,
            current: AtomicPtr::new(array),
            arenas: Mutex::new(Arenas { arrays: vec![array], nodes: Vec::new() }),
        }
    }

    fn hash_of<Q: Hash + ?Sized>(&self, key: &Q) -> u64 {
        self.hasher.hash_one(key)
    }

    fn current(&self) -> &Array<K, V> {
        unsafe { &*self.current.load(Ordering::Acquire) }
    }

    /// Looks up `key` without ever blocking on the writer mutex.
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash_of(key);
        self.current().find(hash, key).map(|node| &node.value)
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.current().size.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.current().capacity()
    }

    pub fn load_factor(&self) -> f64 {
        self.len() as f64 / self.capacity() as f64
    }

    /// Grows into a new array if the live element count would exceed a load factor of 1/2,
    /// copying every non-tombstoned node pointer across, then inserts `node` and publishes the
    /// new array. Caller must hold `arenas`.
    fn insert_locked(&self, arenas: &mut Arenas<K, V>, node: *mut Node<K, V>, hash: u64) {
        let array = self.current();
        let prospective_size = array.size.load(Ordering::Relaxed) + 1;
        if prospective_size * 2 > array.capacity() {
            let grown = Array::with_capacity_log2(array.capacity_log2 + 1);
            let mut live = 0usize;
            for slot in array.slots.iter() {
                let ptr = slot.load(Ordering::Relaxed);
                if ptr.is_null() {
                    continue;
                }
                let existing = unsafe { &*ptr };
                if !existing.deleted.load(Ordering::Relaxed) {
                    grown.insert_node_locked(ptr, existing.hash);
                    live += 1;
                }
            }
            grown.insert_node_locked(node, hash);
            live += 1;
            grown.size.store(live, Ordering::Relaxed);
            let grown_ptr = Box::into_raw(grown);
            arenas.arrays.push(grown_ptr);
            self.current.store(grown_ptr, Ordering::Release);
        } else {
            array.insert_node_locked(node, hash);
            array.size.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Inserts `key` with the value produced by `make` only if it is absent. Returns the
    /// existing or newly inserted value along with whether an insertion happened.
    pub fn get_or_insert_with<F>(&self, key: K, make: F) -> (&V, bool)
    where
        K: Hash + Eq,
        F: FnOnce() -> V,
    {
        let hash = self.hash_of(&key);
        if let Some(node) = self.current().find(hash, &key) {
            return (&node.value, false);
        }
        let mut arenas = self.arenas.lock().unwrap();
        if let Some(node) = self.current().find(hash, &key) {
            return (&node.value, false);
        }
        let node = Box::into_raw(Box::new(Node {
            hash,
            key,
            value: make(),
            deleted: AtomicBool::new(false),
        }));
        arenas.nodes.push(node);
        self.insert_locked(&mut arenas, node, hash);
        (unsafe { &(*node).value }, true)
    }

    /// Inserts `key` => `value` only if `key` is absent. Returns `Err(&V)` with the existing
    /// value if it was already present.
    pub fn try_insert(&self, key: K, value: V) -> Result<&V, &V>
    where
        K: Hash + Eq,
    {
        let mut inserted = true;
        let mut cell = Some(value);
        let result = self.get_or_insert_with(key, || cell.take().unwrap());
        if !result.1 {
            inserted = false;
        }
        if inserted { Ok(result.0) } else { Err(result.0) }
    }

    /// Logically erases `key`, retaining its node's memory in the arena. Returns whether an
    /// entry was actually removed.
    pub fn erase<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash_of(key);
        let _guard = self.arenas.lock().unwrap();
        let array = self.current();
        match array.find(hash, key) {
            Some(node) => {
                if node.deleted.swap(true, Ordering::Release) {
                    false
                } else {
                    array.size.fetch_sub(1, Ordering::Relaxed);
                    true
                }
            }
            None => false,
        }
    }

    /// Iterates over a snapshot of the current array. Loosely consistent: concurrent growth may
    /// cause elements to be skipped or, rarely, observed twice.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter { array: self.current(), index: 0 }
    }

    /// Swaps the entire contents of `self` and `other`: every key, value, and retired arena
    /// allocation trades places. Not lock-free — both maps' writer mutexes are held for the
    /// duration — but readers of either map still never block, since only the published array
    /// pointers move. All outstanding iterators are invalidated.
    ///
    /// Locks the two `arenas` mutexes in address order regardless of which map this is called on,
    /// so that two threads swapping the same pair of maps (in either order, or with the arguments
    /// reversed) can never deadlock against each other.
    pub fn swap(&self, other: &Self) {
        if std::ptr::eq(self, other) {
            return;
        }
        let (mut a, mut b) = if (self as *const Self as usize) < (other as *const Self as usize) {
            let a = self.arenas.lock().unwrap();
            let b = other.arenas.lock().unwrap();
            (a, b)
        } else {
            let b = other.arenas.lock().unwrap();
            let a = self.arenas.lock().unwrap();
            (a, b)
        };
        std::mem::swap(&mut a.arrays, &mut b.arrays);
        std::mem::swap(&mut a.nodes, &mut b.nodes);
        let self_array = self.current.load(Ordering::Relaxed);
        let other_array = other.current.swap(self_array, Ordering::Release);
        self.current.store(other_array, Ordering::Release);
    }
}

impl<K, V, S> Drop for LockFreeHashMap<K, V, S> {
    fn drop(&mut self) {
        let arenas = self.arenas.get_mut().unwrap();
        for &array in &arenas.arrays {
            drop(unsafe { Box::from_raw(array) });
        }
        for &node in &arenas.nodes {
            drop(unsafe { Box::from_raw(node) });
        }
    }
}

impl<K: fmt::Debug, V: fmt::Debug, S: BuildHasher> fmt::Debug for LockFreeHashMap<K, V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

pub struct Iter<'a, K, V> {
    array: &'a Array<K, V>,
    index: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        while self.index < self.array.slots.len() {
            let ptr = self.array.slots[self.index].load(Ordering::Acquire);
            self.index += 1;
            if ptr.is_null() {
                continue;
            }
            let node = unsafe { &*ptr };
            if node.deleted.load(Ordering::Relaxed) {
                continue;
            }
            return Some((&node.key, &node.value));
        }
        None
    }
}

use std::any::type_name;
use std::cell::RefCell;
use std::iter::{Enumerate, FusedIterator};
use std::mem;
use std::slice;
use std::sync::atomic::{self, AtomicU64};

/// Source of unique bag identities, so that tokens from one bag are never mistaken for tokens of
/// another bag that happens to have an occupied entry at the same index.
static NEXT_BAG_ID: AtomicU64 = AtomicU64::new(0);

/// Identifies one entry in a [`Bag`].
///
/// Tokens are returned by [`Bag::insert()`] and are only meaningful for the bag that issued them.
/// A token stays valid until the entry is removed; after that, the slot may be reused for a new
/// entry but the old token will never match it again.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BagToken {
    bag_id: u64,
    index: usize,
    generation: u64,
}

/// An unordered collection of entries addressed by opaque tokens.
///
/// Insertion returns a [`BagToken`] that can later be used to remove the entry. Both operations
/// are O(1) (insertion is amortized, as the backing storage may need to grow). Removal with a
/// token that was already removed, or that belongs to a different bag, is a no-op.
///
/// The backing storage is a vector of slots with an intrusive free list: vacant slots form a
/// virtual stack of the most recently freed indexes, so removal never moves any other entry and
/// insertion reuses freed slots before growing. Each slot carries a generation counter that is
/// advanced whenever its entry is removed, which is what makes stale tokens harmless.
///
/// # Traversal under mutation
///
/// Observers commonly detach themselves (or their siblings) while an event is being delivered to
/// them. [`Bag::traverse()`] supports this for a bag shared via `RefCell`: it visits the entries
/// present when the traversal began, skipping any that were removed by the time their turn comes,
/// and never holds a borrow of the bag while the visitor runs.
///
/// # Example
///
/// ```rust
/// use event_streams::Bag;
///
/// let mut bag = Bag::new();
///
/// let alice = bag.insert("Alice");
/// let bob = bag.insert("Bob");
///
/// assert_eq!(bag.remove(alice), Some("Alice"));
/// assert_eq!(bag.remove(alice), None);
///
/// assert_eq!(bag.len(), 1);
/// assert_eq!(bag.get(bob), Some(&"Bob"));
/// ```
#[derive(Debug)]
pub struct Bag<T> {
    id: u64,

    entries: Vec<Entry<T>>,

    /// Index of the next free slot. Think of this as a virtual stack of the most recently freed
    /// slots, with the stack entries stored in the vacant slots themselves. Equal to
    /// `entries.len()` when there is no vacant slot, in which case insertion appends.
    next_free_index: usize,

    count: usize,
}

#[derive(Debug)]
struct Entry<T> {
    /// Advanced every time the entry in this slot is removed.
    generation: u64,

    slot: Slot<T>,
}

#[derive(Debug)]
enum Slot<T> {
    Occupied { value: T },

    Vacant { next_free_index: usize },
}

impl<T> Bag<T> {
    /// Creates an empty bag.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: NEXT_BAG_ID.fetch_add(1, atomic::Ordering::Relaxed),
            entries: Vec::new(),
            next_free_index: 0,
            count: 0,
        }
    }

    /// The number of entries in the bag.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    /// Whether the bag has no entries.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Adds an entry to the bag, returning the token that identifies it.
    pub fn insert(&mut self, value: T) -> BagToken {
        let index = self.next_free_index;

        let generation = if let Some(entry) = self.entries.get_mut(index) {
            let Slot::Vacant { next_free_index } = entry.slot else {
                panic!(
                    "free list head {index} pointed to an occupied slot in bag of {}",
                    type_name::<T>()
                );
            };

            // Pop the slot off the free stack.
            self.next_free_index = next_free_index;
            entry.slot = Slot::Occupied { value };
            entry.generation
        } else {
            self.entries.push(Entry {
                generation: 0,
                slot: Slot::Occupied { value },
            });
            self.next_free_index = self.entries.len();
            0
        };

        self.count = self
            .count
            .checked_add(1)
            .expect("a bag cannot hold more entries than fit in memory");

        BagToken {
            bag_id: self.id,
            index,
            generation,
        }
    }

    /// Removes the entry identified by `token`, returning it.
    ///
    /// Returns [`None`] if the entry was already removed or the token was issued by another bag.
    pub fn remove(&mut self, token: BagToken) -> Option<T> {
        if !self.contains(token) {
            return None;
        }

        let next_free_index = self.next_free_index;

        let entry = self
            .entries
            .get_mut(token.index)
            .expect("guarded by contains() above");

        let Slot::Occupied { value } = mem::replace(
            &mut entry.slot,
            Slot::Vacant { next_free_index },
        ) else {
            unreachable!("guarded by contains() above");
        };

        entry.generation = entry.generation.wrapping_add(1);

        // Push the freed slot onto the free stack.
        self.next_free_index = token.index;

        self.count = self
            .count
            .checked_sub(1)
            .expect("we verified above that the entry is occupied so count must be non-zero");

        Some(value)
    }

    /// Whether the entry identified by `token` is still in the bag.
    #[must_use]
    pub fn contains(&self, token: BagToken) -> bool {
        self.get(token).is_some()
    }

    /// The entry identified by `token`, if it is still in the bag.
    #[must_use]
    pub fn get(&self, token: BagToken) -> Option<&T> {
        if token.bag_id != self.id {
            return None;
        }

        let entry = self.entries.get(token.index)?;

        if entry.generation != token.generation {
            return None;
        }

        match &entry.slot {
            Slot::Occupied { value } => Some(value),
            Slot::Vacant { .. } => None,
        }
    }

    /// Iterates over the entries and their tokens, in no particular order.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            bag_id: self.id,
            entries: self.entries.iter().enumerate(),
        }
    }

    /// Copies out the current entries together with their tokens.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(BagToken, T)>
    where
        T: Clone,
    {
        self.iter()
            .map(|(token, value)| (token, value.clone()))
            .collect()
    }

    /// Visits every entry that was in the bag when the traversal started and is still in it when
    /// its turn comes.
    ///
    /// The bag is not borrowed while `visit` runs, so `visit` may insert or remove entries,
    /// including the one being visited. Entries inserted during the traversal are not visited.
    ///
    /// Every traversal of a non-empty bag allocates a snapshot and clones each entry into it, so
    /// entries should be cheap to clone (e.g. an `Rc`). The snapshot is owned by the traversal
    /// because `visit` may itself start another traversal of the same bag.
    ///
    /// # Panics
    ///
    /// Panics if the bag is exclusively borrowed when the traversal starts or when the next entry
    /// is looked up.
    pub fn traverse(bag: &RefCell<Self>, mut visit: impl FnMut(BagToken, T))
    where
        T: Clone,
    {
        let snapshot = {
            let bag = bag.borrow();

            if bag.is_empty() {
                return;
            }

            bag.snapshot()
        };

        for (token, value) in snapshot {
            if !bag.borrow().contains(token) {
                continue;
            }

            visit(token, value);
        }
    }

    #[cfg(test)]
    fn integrity_check(&self) {
        let occupied = self
            .entries
            .iter()
            .filter(|entry| matches!(entry.slot, Slot::Occupied { .. }))
            .count();

        assert_eq!(occupied, self.count, "count out of sync with occupied slots");

        let mut free = 0_usize;
        let mut cursor = self.next_free_index;

        while let Some(entry) = self.entries.get(cursor) {
            let Slot::Vacant { next_free_index } = entry.slot else {
                panic!("free list reached occupied slot {cursor}");
            };

            free += 1;
            assert!(free <= self.entries.len(), "free list contains a cycle");
            cursor = next_free_index;
        }

        assert_eq!(
            cursor,
            self.entries.len(),
            "free list must end at the append position"
        );
        assert_eq!(free + occupied, self.entries.len(), "free list lost a slot");
    }
}

impl<T> Default for Bag<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over the entries of a [`Bag`], created by [`Bag::iter()`].
#[derive(Debug)]
pub struct Iter<'a, T> {
    bag_id: u64,
    entries: Enumerate<slice::Iter<'a, Entry<T>>>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = (BagToken, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        for (index, entry) in self.entries.by_ref() {
            if let Slot::Occupied { value } = &entry.slot {
                let token = BagToken {
                    bag_id: self.bag_id,
                    index,
                    generation: entry.generation,
                };

                return Some((token, value));
            }
        }

        None
    }
}

impl<T> FusedIterator for Iter<'_, T> {}

impl<'a, T> IntoIterator for &'a Bag<T> {
    type Item = (BagToken, &'a T);
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T> IntoIterator for Bag<T> {
    type Item = T;
    type IntoIter = IntoValues<T>;

    fn into_iter(self) -> Self::IntoIter {
        IntoValues {
            entries: self.entries.into_iter(),
        }
    }
}

/// Owning iterator over the entries of a [`Bag`], created by its `IntoIterator` implementation.
#[derive(Debug)]
pub struct IntoValues<T> {
    entries: std::vec::IntoIter<Entry<T>>,
}

impl<T> Iterator for IntoValues<T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        self.entries.by_ref().find_map(|entry| match entry.slot {
            Slot::Occupied { value } => Some(value),
            Slot::Vacant { .. } => None,
        })
    }
}

impl<T> FusedIterator for IntoValues<T> {}

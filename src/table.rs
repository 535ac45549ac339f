//! Hash-consing arena backing the unique table.
//!
//! Values live in a plain `Vec` indexed by slot; a separate bucket array
//! chains slots with equal hashes through their `next` links:
//!
//! ```text
//! buckets[h] ──▶ slot 7 ──▶ slot 3 ──▶ (end)
//! ```
//!
//! The first `reserved` slots are never hashed. The BDD manager uses them
//! for the two terminals, which also makes index `0` usable as the
//! end-of-chain marker. Freed slots go to a free list and are reused.
//! Every slot carries a generation that is bumped when it is freed, so an
//! index paired with its generation names one occupant for good.

use log::debug;

use crate::utils::{fold_hash, MyHash};

const NIL: usize = 0;
const MIN_BUCKET_BITS: u32 = 4;

#[derive(Debug, Clone)]
struct Entry<T> {
    value: Option<T>,
    next: usize,
    generation: u32,
}

impl<T> Entry<T> {
    fn empty() -> Self {
        Self {
            value: None,
            next: NIL,
            generation: 0,
        }
    }
}

pub struct Table<T> {
    data: Vec<Entry<T>>,
    buckets: Vec<usize>,
    bucket_bits: u32,
    free: Vec<usize>,
    reserved: usize,
    /// Number of occupied (hashed) cells.
    len: usize,
}

impl<T> Table<T>
where
    T: MyHash + Eq + Copy,
{
    /// Creates a table with `reserved` unhashed leading slots and room for
    /// roughly `capacity` values before the first reallocation.
    pub fn new(reserved: usize, capacity: usize) -> Self {
        assert!(reserved >= 1, "slot 0 must be reserved as the chain terminator");

        let mut data = Vec::with_capacity(reserved + capacity);
        data.resize_with(reserved, Entry::empty);

        let bucket_bits = capacity.max(1).next_power_of_two().trailing_zeros().max(MIN_BUCKET_BITS);

        Self {
            data,
            buckets: vec![NIL; 1 << bucket_bits],
            bucket_bits,
            free: Vec::new(),
            reserved,
            len: 0,
        }
    }

    /// Number of occupied cells.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of slots ever allocated, including reserved and freed ones.
    pub fn slots(&self) -> usize {
        self.data.len()
    }

    pub fn is_occupied(&self, index: usize) -> bool {
        index >= self.reserved && index < self.data.len() && self.data[index].value.is_some()
    }

    /// Get the value at the given index, if the slot is occupied.
    pub fn get(&self, index: usize) -> Option<&T> {
        if index < self.reserved {
            return None;
        }
        self.data.get(index).and_then(|e| e.value.as_ref())
    }

    /// Generation of the slot at `index`; reserved and unallocated slots are at `0`.
    pub fn generation(&self, index: usize) -> u32 {
        self.data.get(index).map_or(0, |e| e.generation)
    }

    /// Get the value at the given index.
    ///
    /// # Panics
    ///
    /// Panics if the slot is not occupied.
    pub fn value(&self, index: usize) -> &T {
        match self.get(index) {
            Some(v) => v,
            None => panic!("Slot {} is not occupied", index),
        }
    }

    fn bucket_index(&self, value: &T) -> usize {
        fold_hash(value.hash(), self.bucket_bits)
    }

    /// Look up the index of an existing value.
    pub fn find(&self, value: &T) -> Option<usize> {
        let mut index = self.buckets[self.bucket_index(value)];
        while index != NIL {
            let entry = &self.data[index];
            if entry.value.as_ref() == Some(value) {
                return Some(index);
            }
            index = entry.next;
        }
        None
    }

    /// Put a value into the table and return its index.
    ///
    /// If an equal value is already present, its index is returned and
    /// nothing is inserted.
    pub fn put(&mut self, value: T) -> usize {
        if let Some(index) = self.find(&value) {
            return index;
        }

        if self.len + 1 > 2 * self.buckets.len() {
            self.grow();
        }

        let index = self.alloc();
        let bucket = self.bucket_index(&value);
        let entry = &mut self.data[index];
        entry.value = Some(value);
        entry.next = self.buckets[bucket];
        self.buckets[bucket] = index;
        self.len += 1;
        index
    }

    fn alloc(&mut self) -> usize {
        if let Some(index) = self.free.pop() {
            index
        } else {
            self.data.push(Entry::empty());
            self.data.len() - 1
        }
    }

    /// Remove the value at the given index, returning it.
    ///
    /// The slot goes to the free list and may be handed out again.
    pub fn remove(&mut self, index: usize) -> Option<T> {
        let value = *self.get(index)?;
        let bucket = self.bucket_index(&value);

        let next = self.data[index].next;
        if self.buckets[bucket] == index {
            self.buckets[bucket] = next;
        } else {
            let mut prev = self.buckets[bucket];
            while prev != NIL && self.data[prev].next != index {
                prev = self.data[prev].next;
            }
            assert_ne!(prev, NIL, "Slot {} is missing from its bucket chain", index);
            self.data[prev].next = next;
        }

        let entry = &mut self.data[index];
        entry.value = None;
        entry.next = NIL;
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(index);
        self.len -= 1;
        Some(value)
    }

    /// Iterate over indices of all occupied cells.
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        (self.reserved..self.data.len()).filter(move |&i| self.data[i].value.is_some())
    }

    /// Double the bucket array and rehash every occupied cell.
    fn grow(&mut self) {
        self.bucket_bits += 1;
        debug!("Growing unique table to {} buckets", 1usize << self.bucket_bits);

        self.buckets = vec![NIL; 1 << self.bucket_bits];
        for index in self.reserved..self.data.len() {
            if let Some(value) = self.data[index].value {
                let bucket = self.bucket_index(&value);
                self.data[index].next = self.buckets[bucket];
                self.buckets[bucket] = index;
            }
        }
    }
}

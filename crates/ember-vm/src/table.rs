//! The open-addressed hash table shared by the globals environment and the
//! string-intern set.
//!
//! Both use sites share the same shape: linear probing, tombstone
//! deletion, 0.75 max load factor, capacity doubling from 8. A C
//! implementation would represent bucket state with sentinel `key`/`value`
//! pairs (`key == NULL && IS_NIL(value)` for empty, `key == NULL &&
//! IS_BOOL(value)` for tombstone) because C has no sum type. [`Slot`]
//! makes the three states an explicit enum instead — same algorithm, no
//! sentinel decoding.

use std::rc::Rc;

use crate::object::Obj;
use crate::value::Value;

const MAX_LOAD: f64 = 0.75;

enum Slot {
    Empty,
    Tombstone,
    Occupied { key: Rc<Obj>, value: Value },
}

/// Keys are always interned string objects; this is the shape used for
/// both the globals table and the process-wide intern set.
pub struct Table {
    entries: Vec<Slot>,
    /// Occupied *and* tombstoned buckets — this is what the load-factor
    /// trigger checks, not just live entries.
    count: usize,
}

impl Table {
    pub fn new() -> Self {
        Self { entries: Vec::new(), count: 0 }
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// `count / capacity`, bounded at 0.75 immediately after any
    /// successful insert. `0.0` for an empty table.
    pub fn load_factor(&self) -> f64 {
        if self.entries.is_empty() {
            0.0
        } else {
            self.count as f64 / self.entries.len() as f64
        }
    }

    /// Probes from `key`'s hash: an empty bucket terminates the probe, a
    /// tombstone is remembered (for insertion) but probing continues, a
    /// pointer-identical key wins immediately. Identity, not
    /// content, decides a match here — every key this table ever stores
    /// came through the interner, so two equal-content strings are always
    /// the same `Rc` already.
    fn find_slot(entries: &[Slot], key: &Rc<Obj>) -> usize {
        let capacity = entries.len();
        let mut index = (key.hash() as usize) % capacity;
        let mut tombstone: Option<usize> = None;
        loop {
            match &entries[index] {
                Slot::Empty => return tombstone.unwrap_or(index),
                Slot::Tombstone => {
                    if tombstone.is_none() {
                        tombstone = Some(index);
                    }
                }
                Slot::Occupied { key: k, .. } => {
                    if Rc::ptr_eq(k, key) {
                        return index;
                    }
                }
            }
            index = (index + 1) % capacity;
        }
    }

    fn adjust_capacity(&mut self, capacity: usize) {
        let mut fresh: Vec<Slot> = (0..capacity).map(|_| Slot::Empty).collect();
        let mut count = 0;
        // Tombstones are dropped on rehash — the probe sequences are being
        // rebuilt from scratch anyway, so they serve no purpose here.
        for slot in self.entries.drain(..) {
            if let Slot::Occupied { key, value } = slot {
                let idx = Self::find_slot(&fresh, &key);
                fresh[idx] = Slot::Occupied { key, value };
                count += 1;
            }
        }
        self.entries = fresh;
        self.count = count;
    }

    fn grow_if_needed(&mut self) {
        if self.count + 1 > (self.capacity() as f64 * MAX_LOAD) as usize {
            let new_cap = if self.capacity() < 8 { 8 } else { self.capacity() * 2 };
            self.adjust_capacity(new_cap);
        }
    }

    pub fn get(&self, key: &Rc<Obj>) -> Option<Value> {
        if self.count == 0 {
            return None;
        }
        match &self.entries[Self::find_slot(&self.entries, key)] {
            Slot::Occupied { value, .. } => Some(value.clone()),
            _ => None,
        }
    }

    /// Returns `true` if this inserted a brand-new key (as opposed to
    /// overwriting the value of an already-occupied one).
    pub fn set(&mut self, key: Rc<Obj>, value: Value) -> bool {
        self.grow_if_needed();
        let idx = Self::find_slot(&self.entries, &key);
        let is_new_key = !matches!(self.entries[idx], Slot::Occupied { .. });
        if is_new_key && matches!(self.entries[idx], Slot::Empty) {
            self.count += 1;
        }
        self.entries[idx] = Slot::Occupied { key, value };
        is_new_key
    }

    /// Turns an occupied bucket into a tombstone; `false` if the key was
    /// never present.
    pub fn delete(&mut self, key: &Rc<Obj>) -> bool {
        if self.count == 0 {
            return false;
        }
        let idx = Self::find_slot(&self.entries, key);
        match self.entries[idx] {
            Slot::Occupied { .. } => {
                self.entries[idx] = Slot::Tombstone;
                true
            }
            _ => false,
        }
    }

    /// The interning lookup: compares `(len, hash, bytes)` directly,
    /// bypassing `Value`/`Obj` equality entirely, since the whole point is
    /// to find (or rule out) an existing `Rc` for content we don't yet
    /// have one for.
    pub fn find_string(&self, bytes: &[u8], hash: u32) -> Option<Rc<Obj>> {
        if self.count == 0 {
            return None;
        }
        let capacity = self.entries.len();
        let mut index = (hash as usize) % capacity;
        loop {
            match &self.entries[index] {
                Slot::Empty => return None,
                Slot::Tombstone => {}
                Slot::Occupied { key, .. } => {
                    if key.hash() == hash && key.as_str_bytes() == bytes {
                        return Some(Rc::clone(key));
                    }
                }
            }
            index = (index + 1) % capacity;
        }
    }
}

impl Default for Table {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intern(bytes: &[u8]) -> Rc<Obj> {
        Rc::new(Obj::new_string(bytes.to_vec().into_boxed_slice()))
    }

    #[test]
    fn set_then_get_roundtrips() {
        let mut table = Table::new();
        let key = intern(b"answer");
        assert!(table.set(Rc::clone(&key), Value::Number(42.0)));
        assert_eq!(table.get(&key).unwrap().as_number(), Some(42.0));
    }

    #[test]
    fn overwriting_an_existing_key_is_not_a_new_key() {
        let mut table = Table::new();
        let key = intern(b"x");
        assert!(table.set(Rc::clone(&key), Value::Number(1.0)));
        assert!(!table.set(Rc::clone(&key), Value::Number(2.0)));
        assert_eq!(table.get(&key).unwrap().as_number(), Some(2.0));
    }

    #[test]
    fn delete_then_get_misses_but_reinsert_still_works() {
        let mut table = Table::new();
        let key = intern(b"gone");
        table.set(Rc::clone(&key), Value::Bool(true));
        assert!(table.delete(&key));
        assert!(table.get(&key).is_none());
        // Deleting twice fails the second time.
        assert!(!table.delete(&key));
        // A tombstone does not block re-insertion under the same key.
        assert!(table.set(Rc::clone(&key), Value::Number(7.0)));
        assert_eq!(table.get(&key).unwrap().as_number(), Some(7.0));
    }

    #[test]
    fn find_string_matches_by_content_not_identity() {
        let mut table = Table::new();
        let key = intern(b"hello");
        table.set(Rc::clone(&key), Value::Nil);
        let found = table.find_string(b"hello", key.hash()).unwrap();
        assert!(Rc::ptr_eq(&found, &key));
        assert!(table.find_string(b"goodbye", Obj::new_string(b"goodbye".to_vec().into_boxed_slice()).hash()).is_none());
    }

    #[test]
    fn load_factor_never_exceeds_three_quarters_after_insert() {
        let mut table = Table::new();
        for i in 0..200u32 {
            let key = intern(format!("k{i}").as_bytes());
            table.set(key, Value::Number(i as f64));
            assert!(table.load_factor() <= 0.75);
        }
    }
}

#[cfg(test)]
mod table_property {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Load factor never exceeds 0.75 right after a successful
        /// insert, for any sequence of distinct keys.
        #[test]
        fn load_factor_bounded(keys in prop::collection::vec("[a-z]{1,12}", 0..150)) {
            let mut table = Table::new();
            let mut seen = std::collections::HashSet::new();
            for k in keys {
                if !seen.insert(k.clone()) {
                    continue;
                }
                let key = Rc::new(Obj::new_string(k.into_bytes().into_boxed_slice()));
                table.set(key, Value::Nil);
                prop_assert!(table.load_factor() <= 0.75);
            }
        }
    }
}

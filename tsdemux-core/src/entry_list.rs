//! Insertion-ordered keyed containers for table loops.
//!
//! Tables such as the PAT or the SDT are maps (program number to PID,
//! service id to service) whose wire order must survive a decode/encode
//! cycle. [`EntryList`] keeps entries in insertion order and replaces an
//! entry in place when its key is inserted again.

use crate::buffer::{LengthMark, PsiWriter, SectionsBuilder};

/// Serialization of one loop entry.
pub trait Entry<K> {
    fn write_entry(&self, key: &K, w: &mut PsiWriter);
}

/// Keyed entries in insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryList<K, E> {
    entries: Vec<(K, E)>,
}

impl<K, E> Default for EntryList<K, E> {
    fn default() -> Self {
        EntryList {
            entries: Vec::new(),
        }
    }
}

impl<K: PartialEq, E> EntryList<K, E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn position(&self, key: &K) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == key)
    }

    /// Insert or replace. A replaced entry keeps its position.
    pub fn insert(&mut self, key: K, entry: E) -> Option<E> {
        match self.position(&key) {
            Some(i) => Some(std::mem::replace(&mut self.entries[i].1, entry)),
            None => {
                self.entries.push((key, entry));
                None
            }
        }
    }

    /// Append an entry with a new key. Returns false, leaving the list
    /// unchanged, if the key is already present.
    pub fn insert_new(&mut self, key: K, entry: E) -> bool {
        if self.contains_key(&key) {
            return false;
        }
        self.entries.push((key, entry));
        true
    }

    pub fn get(&self, key: &K) -> Option<&E> {
        self.position(key).map(|i| &self.entries[i].1)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut E> {
        self.position(key).map(move |i| &mut self.entries[i].1)
    }

    /// Entry for a key, appended with `f` when absent.
    pub fn get_or_insert_with(&mut self, key: K, f: impl FnOnce() -> E) -> &mut E {
        let i = match self.position(&key) {
            Some(i) => i,
            None => {
                self.entries.push((key, f()));
                self.entries.len() - 1
            }
        };
        &mut self.entries[i].1
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.position(key).is_some()
    }

    pub fn remove(&mut self, key: &K) -> Option<E> {
        self.position(key).map(|i| self.entries.remove(i).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &E)> {
        self.entries.iter().map(|(k, e)| (k, e))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&K, &mut E)> {
        self.entries.iter_mut().map(|(k, e)| (&*k, e))
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &E> {
        self.entries.iter().map(|(_, e)| e)
    }
}

impl<K: PartialEq, E: Entry<K>> EntryList<K, E> {
    /// Write all entries, starting a new section when the next entry does
    /// not fit. `start` writes the fixed part of each section (its flag is
    /// true for the first one) and may return a loop length to patch when
    /// the section is closed.
    pub fn serialize_into<S>(&self, out: &mut SectionsBuilder, mut start: S)
    where
        S: FnMut(&mut PsiWriter, bool) -> Option<LengthMark>,
    {
        let mut mark = start(out.writer(), true);
        let mut in_section = 0usize;

        for (key, entry) in &self.entries {
            let mut tmp = PsiWriter::new();
            entry.write_entry(key, &mut tmp);

            if in_section > 0 && !out.fits(tmp.len()) {
                if let Some(mark) = mark {
                    out.writer().end_length(mark);
                }
                out.close_section();
                mark = start(out.writer(), false);
                in_section = 0;
            }
            out.writer().put_writer(&tmp);
            in_section += 1;
        }

        if let Some(mark) = mark {
            out.writer().end_length(mark);
        }
    }
}

impl<K: PartialEq, E> FromIterator<(K, E)> for EntryList<K, E> {
    fn from_iter<I: IntoIterator<Item = (K, E)>>(iter: I) -> Self {
        let mut list = EntryList::new();
        for (k, e) in iter {
            list.insert(k, e);
        }
        list
    }
}

// Content-addressed symbol dictionary.
//
// Interns values (note vectors or velocity lists) into dense `SymbolId`s in
// first-seen order. The forward direction is a hash map keyed by the value
// itself; the reverse direction is a `Vec` indexed by id. Growth is
// append-only: an id, once assigned, names the same value for the lifetime
// of the dictionary, and ids are never reused or renumbered.
//
// A `Codec` owns exactly two of these (notes, speeds). Dictionaries from
// different codecs are never merged: an id is only meaningful against the
// dictionary that assigned it.

use crate::error::{CodecError, Result, SymbolKind};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;

/// A small integer standing for an interned value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SymbolId(pub u32);

impl SymbolId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct SymbolDictionary<T> {
    kind: SymbolKind,
    ids: FxHashMap<T, SymbolId>,
    values: Vec<T>,
}

impl<T: Clone + Eq + Hash> SymbolDictionary<T> {
    pub fn new(kind: SymbolKind) -> Self {
        Self {
            kind,
            ids: FxHashMap::default(),
            values: Vec::new(),
        }
    }

    /// Rebuild a dictionary from its values in id order.
    ///
    /// Fails if a value appears twice, since two ids for one value would
    /// break content addressing.
    pub fn from_entries(kind: SymbolKind, values: Vec<T>) -> Result<Self> {
        let mut dict = Self::new(kind);
        for (index, value) in values.into_iter().enumerate() {
            if let Some(first) = dict.lookup(&value) {
                return Err(CodecError::InvalidDictionary(format!(
                    "{kind} entry {index} duplicates entry {first}"
                )));
            }
            dict.intern(value);
        }
        Ok(dict)
    }

    /// Return the id of `value`, assigning the next id if it is new.
    pub fn intern(&mut self, value: T) -> SymbolId {
        if let Some(&id) = self.ids.get(&value) {
            return id;
        }
        let id = SymbolId(self.values.len() as u32);
        self.values.push(value.clone());
        self.ids.insert(value, id);
        id
    }

    /// Forward lookup without interning.
    pub fn lookup(&self, value: &T) -> Option<SymbolId> {
        self.ids.get(value).copied()
    }

    /// Reverse lookup. Fails for ids this dictionary never assigned.
    pub fn resolve(&self, id: SymbolId) -> Result<&T> {
        self.values
            .get(id.index())
            .ok_or_else(|| CodecError::SymbolOutOfRange {
                kind: self.kind,
                id: id.0,
                len: self.values.len(),
            })
    }

    pub fn kind(&self) -> SymbolKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Values in id order.
    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (SymbolId, &T)> {
        self.values
            .iter()
            .enumerate()
            .map(|(i, v)| (SymbolId(i as u32), v))
    }
}

//! String interning for node and edge names.

use std::collections::HashMap;
use std::sync::Arc;

use crate::types::Name;

/// Ordered string interner.
///
/// Each distinct string is stored once and keeps the position at which it was
/// first interned.
#[derive(Debug, Default, Clone)]
pub struct Names {
    strings: Vec<Name>,
    positions: HashMap<Name, u32>,
}

impl Names {
    /// Create an empty interner.
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle to `text`, interning it if needed.
    pub fn intern(&mut self, text: &str) -> Name {
        let index = self.intern_index(text);
        Arc::clone(&self.strings[index as usize])
    }

    /// Position of `text`, interning it if needed.
    pub fn intern_index(&mut self, text: &str) -> u32 {
        if let Some(&index) = self.positions.get(text) {
            return index;
        }
        let index = self.strings.len() as u32;
        let name: Name = Arc::from(text);
        self.strings.push(Arc::clone(&name));
        self.positions.insert(name, index);
        index
    }

    /// Position of `text`, if interned.
    pub fn position(&self, text: &str) -> Option<u32> {
        self.positions.get(text).copied()
    }

    /// String at `index`.
    pub fn get(&self, index: u32) -> Option<&Name> {
        self.strings.get(index as usize)
    }

    /// Number of distinct strings.
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    /// Whether nothing has been interned.
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    /// Strings in interning order.
    pub fn iter(&self) -> impl Iterator<Item = &Name> {
        self.strings.iter()
    }
}

//! Tag table: named bookmarks of positions in one input stream.
//!
//! A tag is set with `{{:NAME}}` and jumped to with `{{@NAME}}`.
//! Jumps are bounded: each tag has a visit budget (1 by default),
//!     and a jump to a tag whose budget is used up is a no-op.
//! Thus `{{:L}}x{{@L}}` outputs `x` twice and then carries on.
//!
//! Each [InputStream](crate::input::InputStream) owns its table,
//!     so tags set in an included file vanish when the include returns.

use std::collections::BTreeMap;

/// A position in an input stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    /// Byte offset from the start of the source.
    pub offset: u64,
    pub row: usize,
    pub col: usize,
}

/// Entry in a [TagTable].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagEntry {
    position: Position,
    visits: usize,
    budget: usize,
}

impl TagEntry {
    pub fn position(&self) -> Position {
        self.position
    }

    pub fn visits(&self) -> usize {
        self.visits
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Record a visit if the budget allows it.
    ///
    /// Returns the position to seek to, or [None] if the budget is used up.
    pub fn visit(&mut self) -> Option<Position> {
        if self.visits >= self.budget {
            return None;
        }
        self.visits += 1;
        Some(self.position)
    }
}

/// The default visit budget of a tag.
pub const DEFAULT_BUDGET: usize = 1;

/// Per-stream tag registry.
#[derive(Debug, Default)]
pub struct TagTable {
    entries: BTreeMap<String, TagEntry>,
}

impl TagTable {
    pub fn new() -> TagTable {
        Default::default()
    }

    /// Set a tag, overwriting any prior entry for the key and resetting its visit count.
    pub fn set<K: Into<String>>(&mut self, key: K, position: Position, budget: usize) {
        self.entries.insert(
            key.into(),
            TagEntry {
                position,
                visits: 0,
                budget,
            },
        );
    }

    pub fn get(&self, key: &str) -> Option<&TagEntry> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut TagEntry> {
        self.entries.get_mut(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

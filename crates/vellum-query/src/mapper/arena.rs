//! Arena storage for document mappings.
//!
//! Every query compiles to a flat arena of mappings linked by integer
//! ids. Child mappings reference their parents' arena rather than being
//! owned recursively, which makes the "clone without render keys"
//! operation (used when a select is reused as a dependency mapping) a
//! single slot copy with structural sharing of the child links.

use super::mapping::DocumentMapping;

/// An index into a [`MappingArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MappingId(u32);

impl MappingId {
    /// Returns the raw slot index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Flat storage for every [`DocumentMapping`] of one compiled query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappingArena {
    slots: Vec<DocumentMapping>,
}

impl MappingArena {
    /// Creates an empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh, empty mapping.
    pub fn alloc(&mut self) -> MappingId {
        let id = MappingId(u32::try_from(self.slots.len()).expect("mapping arena overflow"));
        self.slots.push(DocumentMapping::default());
        id
    }

    /// Returns the mapping at `id`.
    #[inline]
    #[must_use]
    pub fn get(&self, id: MappingId) -> &DocumentMapping {
        &self.slots[id.index()]
    }

    /// Returns the mapping at `id` mutably.
    #[inline]
    pub fn get_mut(&mut self, id: MappingId) -> &mut DocumentMapping {
        &mut self.slots[id.index()]
    }

    /// Clones a mapping into a new slot, dropping its render keys.
    ///
    /// Child mapping links are shared, not copied: both slots refer to
    /// the same child ids.
    pub fn clone_without_render(&mut self, id: MappingId) -> MappingId {
        let mut slot = self.slots[id.index()].clone();
        slot.clear_render_keys();
        let new_id = MappingId(
            u32::try_from(self.slots.len()).expect("mapping arena overflow"),
        );
        self.slots.push(slot);
        new_id
    }

    /// The number of mappings allocated.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if nothing has been allocated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_and_link() {
        let mut arena = MappingArena::new();
        let parent = arena.alloc();
        let child = arena.alloc();

        let index = arena.get_mut(parent).add("books");
        arena.get_mut(parent).set_child(index, child);

        assert_eq!(arena.get(parent).child(index), Some(child));
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn clone_without_render_shares_children() {
        let mut arena = MappingArena::new();
        let parent = arena.alloc();
        let child = arena.alloc();

        let index = arena.get_mut(parent).add("books");
        arena.get_mut(parent).set_child(index, child);
        arena.get_mut(parent).add_render_key(index, "books");

        let cloned = arena.clone_without_render(parent);
        assert!(arena.get(cloned).render_keys().is_empty());
        assert_eq!(arena.get(cloned).child(index), Some(child));
        // The source keeps its render keys.
        assert_eq!(arena.get(parent).render_keys().len(), 1);
    }
}

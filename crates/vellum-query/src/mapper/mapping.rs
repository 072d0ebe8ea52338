//! Name-to-index resolution tables.

use std::collections::BTreeMap;

use super::arena::MappingId;

/// The reserved document-key field name, always mapped first on a
/// collection mapping.
pub const DOC_KEY_FIELD: &str = "_key";

/// One output entry: which document index renders under which key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderKey {
    /// The document index the value is read from.
    pub index: usize,
    /// The output key it renders under.
    pub key: String,
}

/// Maps field names to document indices for one select scope.
///
/// A name may map to several indices (the same relation selected twice,
/// or an alias colliding with a field name); resolution by name always
/// takes the first-added index. Indices hosting nested documents link to
/// their child mapping by arena id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentMapping {
    next_index: usize,
    indexes_by_name: BTreeMap<String, Vec<usize>>,
    child_mappings: BTreeMap<usize, MappingId>,
    render_keys: Vec<RenderKey>,
}

impl DocumentMapping {
    /// Maps `name` to a fresh index and returns it.
    pub fn add(&mut self, name: impl Into<String>) -> usize {
        let index = self.next_index;
        self.next_index += 1;
        self.indexes_by_name.entry(name.into()).or_default().push(index);
        index
    }

    /// The first-added index for `name`, if the name is mapped.
    #[must_use]
    pub fn first_index_of(&self, name: &str) -> Option<usize> {
        self.indexes_by_name.get(name).and_then(|v| v.first().copied())
    }

    /// Every index mapped under `name`, in addition order.
    #[must_use]
    pub fn indexes_of(&self, name: &str) -> &[usize] {
        self.indexes_by_name.get(name).map_or(&[], Vec::as_slice)
    }

    /// Links `index` to a child mapping.
    pub fn set_child(&mut self, index: usize, child: MappingId) {
        self.child_mappings.insert(index, child);
    }

    /// The child mapping hosted at `index`, if any.
    #[must_use]
    pub fn child(&self, index: usize) -> Option<MappingId> {
        self.child_mappings.get(&index).copied()
    }

    /// Registers an output key for `index`. Indices without a render key
    /// are held for filtering or aggregation but never rendered.
    pub fn add_render_key(&mut self, index: usize, key: impl Into<String>) {
        self.render_keys.push(RenderKey { index, key: key.into() });
    }

    /// The registered output keys, in request order.
    #[must_use]
    pub fn render_keys(&self) -> &[RenderKey] {
        &self.render_keys
    }

    pub(super) fn clear_render_keys(&mut self) {
        self.render_keys.clear();
    }

    /// The number of indices mapped; every document under this mapping
    /// carries exactly this many slots.
    #[must_use]
    pub fn width(&self) -> usize {
        self.next_index
    }

    /// Iterates `(name, indices)` pairs in name order.
    pub fn iter_names(&self) -> impl Iterator<Item = (&str, &[usize])> {
        self.indexes_by_name.iter().map(|(name, v)| (name.as_str(), v.as_slice()))
    }
}

//! Rendering mapped documents back to name-keyed output.
//!
//! Only slots with a render key appear in the output; hidden fields
//! (synthesized join slots, aggregate dependencies) stay internal.

use std::collections::BTreeMap;

use vellum_core::Value;

use crate::mapper::{Doc, DocValue, MappingArena, MappingId};

/// A rendered output value.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderValue {
    /// A scalar value.
    Value(Value),
    /// A nested rendered document.
    Doc(RenderedDoc),
    /// A list of rendered documents.
    List(Vec<RenderValue>),
}

/// A name-keyed rendered document.
pub type RenderedDoc = BTreeMap<String, RenderValue>;

/// Renders a document under its mapping's render keys, recursing into
/// child mappings. When two render keys share an output name the first
/// keeps the slot.
#[must_use]
pub fn render(arena: &MappingArena, mapping: MappingId, doc: &Doc) -> RenderedDoc {
    let m = arena.get(mapping);
    let mut out = RenderedDoc::new();
    for render_key in m.render_keys() {
        let value = match doc.get(render_key.index) {
            Some(DocValue::Value(value)) => RenderValue::Value(value.clone()),
            Some(DocValue::Doc(child)) => match m.child(render_key.index) {
                Some(child_mapping) => {
                    RenderValue::Doc(render(arena, child_mapping, child))
                }
                None => RenderValue::Value(Value::Null),
            },
            Some(DocValue::Docs(children)) => match m.child(render_key.index) {
                Some(child_mapping) => RenderValue::List(
                    children
                        .iter()
                        .map(|c| RenderValue::Doc(render(arena, child_mapping, c)))
                        .collect(),
                ),
                None => RenderValue::Value(Value::Null),
            },
            None => RenderValue::Value(Value::Null),
        };
        out.entry(render_key.key.clone()).or_insert(value);
    }
    out
}

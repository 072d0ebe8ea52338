//! The fixed-width document container plan nodes exchange.

use vellum_core::Value;

/// One slot of a [`Doc`]: a scalar value, a nested document, or a list
/// of nested documents.
#[derive(Debug, Clone, PartialEq)]
pub enum DocValue {
    /// A scalar (or null) value.
    Value(Value),
    /// A single nested document (one-to-one relation side).
    Doc(Doc),
    /// A list of nested documents (one-to-many side, groups, commits).
    Docs(Vec<Doc>),
}

impl Default for DocValue {
    fn default() -> Self {
        Self::Value(Value::Null)
    }
}

impl DocValue {
    /// The scalar value, if this slot holds one.
    #[must_use]
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    /// The nested document, if this slot holds one.
    #[must_use]
    pub fn as_doc(&self) -> Option<&Doc> {
        match self {
            Self::Doc(d) => Some(d),
            _ => None,
        }
    }

    /// The nested document list, if this slot holds one.
    #[must_use]
    pub fn as_docs(&self) -> Option<&[Doc]> {
        match self {
            Self::Docs(d) => Some(d),
            _ => None,
        }
    }
}

impl From<Value> for DocValue {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

/// A document as the plan executes it: a vector of slots addressed by
/// the indices of its mapping. Slots the source never produced stay
/// null.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Doc {
    fields: Vec<DocValue>,
}

impl Doc {
    /// Creates a document of `width` null slots.
    #[must_use]
    pub fn with_width(width: usize) -> Self {
        Self { fields: vec![DocValue::default(); width] }
    }

    /// The slot at `index`, if in range.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&DocValue> {
        self.fields.get(index)
    }

    /// The scalar at `index`; `None` when out of range or non-scalar.
    #[must_use]
    pub fn value(&self, index: usize) -> Option<&Value> {
        self.get(index).and_then(DocValue::as_value)
    }

    /// Writes `value` into `index`, growing the document with null slots
    /// when the mapping widened after the document was created.
    pub fn set(&mut self, index: usize, value: DocValue) {
        if index >= self.fields.len() {
            self.fields.resize(index + 1, DocValue::default());
        }
        self.fields[index] = value;
    }

    /// Writes a scalar into `index`.
    pub fn set_value(&mut self, index: usize, value: Value) {
        self.set(index, DocValue::Value(value));
    }

    /// The number of slots.
    #[must_use]
    pub fn width(&self) -> usize {
        self.fields.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_default_to_null() {
        let doc = Doc::with_width(3);
        assert_eq!(doc.value(1), Some(&Value::Null));
        assert_eq!(doc.get(3), None);
    }

    #[test]
    fn set_grows_on_demand() {
        let mut doc = Doc::with_width(1);
        doc.set_value(4, Value::Int(7));
        assert_eq!(doc.width(), 5);
        assert_eq!(doc.value(4), Some(&Value::Int(7)));
        assert_eq!(doc.value(2), Some(&Value::Null));
    }
}

//! Schema metadata describing collections and fields.
//!
//! The planner consults these descriptions to choose join strategies
//! (which side of a relation is primary, whether the traversed field is
//! one- or many-valued) and to decide aggregate result types ahead of
//! execution (any float-typed contributing leaf makes a sum a float).
//!
//! Descriptions are produced by the host system's schema layer; the query
//! engine only reads them.

use serde::{Deserialize, Serialize};

/// Describes a collection of documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionDescription {
    /// The collection's unique name.
    pub name: String,
    /// The collection's stable numeric id, used in storage keys.
    pub id: u32,
    /// The fields of the collection's schema, in declaration order.
    pub fields: Vec<FieldDescription>,
    /// The indexes defined on the collection. The first entry is the
    /// default (primary) index.
    pub indexes: Vec<IndexDescription>,
}

impl CollectionDescription {
    /// Creates a description with the default primary index.
    #[must_use]
    pub fn new(name: impl Into<String>, id: u32, fields: Vec<FieldDescription>) -> Self {
        Self {
            name: name.into(),
            id,
            fields,
            indexes: vec![IndexDescription { id: 0, name: "primary".to_owned() }],
        }
    }

    /// Looks up a field description by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDescription> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Returns the default index.
    ///
    /// Index selection beyond the default index is out of scope; every
    /// scan in this engine targets this index.
    #[must_use]
    pub fn primary_index(&self) -> &IndexDescription {
        &self.indexes[0]
    }
}

/// Describes an index on a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDescription {
    /// The index's stable numeric id, used in storage keys.
    pub id: u32,
    /// The index name.
    pub name: String,
}

/// Describes a single field of a collection schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescription {
    /// The field name.
    pub name: String,
    /// The field's stable numeric id within the collection.
    pub id: u32,
    /// The field's kind.
    pub kind: FieldKind,
    /// Relation metadata, present when `kind` is `Object` or `ObjectArray`.
    pub relation: Option<RelationDescription>,
}

impl FieldDescription {
    /// Creates a scalar field description.
    #[must_use]
    pub fn scalar(name: impl Into<String>, id: u32, kind: FieldKind) -> Self {
        Self { name: name.into(), id, kind, relation: None }
    }

    /// Creates an object (relation) field description.
    #[must_use]
    pub fn object(
        name: impl Into<String>,
        id: u32,
        kind: FieldKind,
        relation: RelationDescription,
    ) -> Self {
        Self { name: name.into(), id, kind, relation: Some(relation) }
    }

    /// Returns true if this field holds a nested object or objects.
    #[inline]
    #[must_use]
    pub const fn is_object(&self) -> bool {
        matches!(self.kind, FieldKind::Object | FieldKind::ObjectArray)
    }

    /// Returns the name of the foreign-key field for this relation,
    /// e.g. `author` -> `author_id`.
    ///
    /// Only meaningful for object fields on the primary side.
    #[must_use]
    pub fn foreign_key_name(&self) -> String {
        format!("{}_id", self.name)
    }
}

/// The kind of value a field holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKind {
    /// Boolean scalar.
    Bool,
    /// 64-bit integer scalar.
    Int,
    /// 64-bit float scalar.
    Float,
    /// UTF-8 string scalar.
    String,
    /// Array of booleans.
    BoolArray,
    /// Array of integers.
    IntArray,
    /// Array of floats.
    FloatArray,
    /// Array of strings.
    StringArray,
    /// A single related document (the "one" end of a relation).
    Object,
    /// Many related documents (the "many" end of a relation).
    ObjectArray,
}

impl FieldKind {
    /// Returns true if values of this kind are float-typed.
    ///
    /// Consulted when deciding whether a sum over this field produces a
    /// float or an integer.
    #[inline]
    #[must_use]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::Float | Self::FloatArray)
    }

    /// Returns true if this kind is an array of scalars.
    #[inline]
    #[must_use]
    pub const fn is_scalar_array(self) -> bool {
        matches!(self, Self::BoolArray | Self::IntArray | Self::FloatArray | Self::StringArray)
    }
}

/// The cardinality of a relation, seen from the described field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationKind {
    /// Each side holds at most one related document.
    OneToOne,
    /// The described field's document is the "one" side; the related
    /// collection holds the foreign key.
    OneToMany,
}

/// Relation metadata attached to an object field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDescription {
    /// The relation's name, shared by both endpoints.
    pub name: String,
    /// The collection the field points at.
    pub target_collection: String,
    /// The relation cardinality from this field's perspective.
    pub kind: RelationKind,
    /// Whether this endpoint physically stores the foreign key.
    pub primary: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn books_relation(primary: bool) -> RelationDescription {
        RelationDescription {
            name: "author_book".to_owned(),
            target_collection: "Book".to_owned(),
            kind: RelationKind::OneToMany,
            primary,
        }
    }

    #[test]
    fn field_lookup() {
        let desc = CollectionDescription::new(
            "Author",
            1,
            vec![
                FieldDescription::scalar("name", 1, FieldKind::String),
                FieldDescription::scalar("age", 2, FieldKind::Int),
            ],
        );
        assert_eq!(desc.field("age").map(|f| f.id), Some(2));
        assert!(desc.field("missing").is_none());
        assert_eq!(desc.primary_index().id, 0);
    }

    #[test]
    fn foreign_key_naming() {
        let field =
            FieldDescription::object("published", 3, FieldKind::ObjectArray, books_relation(false));
        assert!(field.is_object());
        assert_eq!(field.foreign_key_name(), "published_id");
    }

    #[test]
    fn float_kinds() {
        assert!(FieldKind::Float.is_float());
        assert!(FieldKind::FloatArray.is_float());
        assert!(!FieldKind::Int.is_float());
        assert!(FieldKind::IntArray.is_scalar_array());
    }
}

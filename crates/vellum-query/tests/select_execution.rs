//! End-to-end select execution over the in-memory store.

use std::collections::HashMap;
use std::sync::Arc;

use vellum_core::{
    CollectionDescription, DocKey, FieldDescription, FieldKind, RelationDescription,
    RelationKind, Value,
};
use vellum_query::{
    AggregateKind, AggregateRequest, ConditionValue, FilterRequest, OrderDirection, Planner,
    QueryError, RenderValue, RenderedDoc, Schema, SelectRequest,
};
use vellum_store::MemoryStore;

fn author_book_relation(primary: bool) -> RelationDescription {
    RelationDescription {
        name: "author_book".to_owned(),
        target_collection: if primary { "Author" } else { "Book" }.to_owned(),
        kind: RelationKind::OneToMany,
        primary,
    }
}

fn author_address_relation(primary: bool) -> RelationDescription {
    RelationDescription {
        name: "author_address".to_owned(),
        target_collection: if primary { "Author" } else { "Address" }.to_owned(),
        kind: RelationKind::OneToOne,
        primary,
    }
}

fn authors() -> CollectionDescription {
    CollectionDescription::new(
        "Author",
        1,
        vec![
            FieldDescription::scalar("name", 1, FieldKind::String),
            FieldDescription::scalar("age", 2, FieldKind::Int),
            FieldDescription::scalar("verified", 3, FieldKind::Bool),
            FieldDescription::object(
                "published",
                4,
                FieldKind::ObjectArray,
                author_book_relation(false),
            ),
            FieldDescription::object(
                "address",
                5,
                FieldKind::Object,
                author_address_relation(false),
            ),
        ],
    )
}

fn addresses() -> CollectionDescription {
    CollectionDescription::new(
        "Address",
        3,
        vec![
            FieldDescription::scalar("city", 1, FieldKind::String),
            FieldDescription::object(
                "resident",
                2,
                FieldKind::Object,
                author_address_relation(true),
            ),
            FieldDescription::scalar("resident_id", 3, FieldKind::String),
        ],
    )
}

fn books() -> CollectionDescription {
    CollectionDescription::new(
        "Book",
        2,
        vec![
            FieldDescription::scalar("name", 1, FieldKind::String),
            FieldDescription::scalar("rating", 2, FieldKind::Float),
            FieldDescription::object(
                "author",
                3,
                FieldKind::Object,
                author_book_relation(true),
            ),
            FieldDescription::scalar("author_id", 4, FieldKind::String),
        ],
    )
}

fn schema() -> Schema {
    let mut schema = Schema::new();
    schema.add(authors());
    schema.add(books());
    schema.add(addresses());
    schema
}

fn doc(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
    pairs.iter().map(|(k, v)| ((*k).to_owned(), v.clone())).collect()
}

/// Two authors with books, one without. Grisham's ratings average 4.7.
fn seed() -> MemoryStore {
    let mut store = MemoryStore::new();
    let author_col = authors();
    let book_col = books();

    store
        .insert_document(
            &author_col,
            &DocKey::new("bae-funke"),
            doc(&[("name", "Cornelia Funke".into()), ("age", 62i64.into()), ("verified", true.into())]),
        )
        .unwrap();
    store
        .insert_document(
            &author_col,
            &DocKey::new("bae-grisham"),
            doc(&[("name", "John Grisham".into()), ("age", 65i64.into()), ("verified", true.into())]),
        )
        .unwrap();
    store
        .insert_document(
            &author_col,
            &DocKey::new("bae-recluse"),
            doc(&[("name", "The Recluse".into()), ("age", 327i64.into()), ("verified", false.into())]),
        )
        .unwrap();

    store
        .insert_document(
            &book_col,
            &DocKey::new("bae-mercy"),
            doc(&[
                ("name", "A Time for Mercy".into()),
                ("rating", 4.5f64.into()),
                ("author_id", "bae-grisham".into()),
            ]),
        )
        .unwrap();
    store
        .insert_document(
            &book_col,
            &DocKey::new("bae-painted"),
            doc(&[
                ("name", "Painted House".into()),
                ("rating", 4.9f64.into()),
                ("author_id", "bae-grisham".into()),
            ]),
        )
        .unwrap();
    store
        .insert_document(
            &book_col,
            &DocKey::new("bae-inkheart"),
            doc(&[
                ("name", "Inkheart".into()),
                ("rating", 4.8f64.into()),
                ("author_id", "bae-funke".into()),
            ]),
        )
        .unwrap();
    store
}

fn planner(store: &MemoryStore) -> Planner {
    Planner::new(Arc::new(store.begin()), schema())
}

fn scalar<'a>(doc: &'a RenderedDoc, key: &str) -> &'a Value {
    match doc.get(key) {
        Some(RenderValue::Value(value)) => value,
        other => panic!("expected scalar at {key}, got {other:?}"),
    }
}

fn list<'a>(doc: &'a RenderedDoc, key: &str) -> Vec<&'a RenderedDoc> {
    match doc.get(key) {
        Some(RenderValue::List(items)) => items
            .iter()
            .map(|item| match item {
                RenderValue::Doc(d) => d,
                other => panic!("expected doc in list, got {other:?}"),
            })
            .collect(),
        other => panic!("expected list at {key}, got {other:?}"),
    }
}

fn float(doc: &RenderedDoc, key: &str) -> f64 {
    match scalar(doc, key) {
        Value::Float(f) => *f,
        other => panic!("expected float at {key}, got {other:?}"),
    }
}

#[test]
fn scan_yields_documents_in_key_order() {
    let store = seed();
    let request = SelectRequest::new("Author").field("name");
    let docs = planner(&store).select(&request).unwrap().collect_all().unwrap();

    let names: Vec<&Value> = docs.iter().map(|d| scalar(d, "name")).collect();
    assert_eq!(
        names,
        [
            &Value::String("Cornelia Funke".into()),
            &Value::String("John Grisham".into()),
            &Value::String("The Recluse".into()),
        ]
    );
}

#[test]
fn filter_skips_non_matching_documents() {
    let store = seed();
    let request = SelectRequest::new("Author")
        .field("name")
        .with_filter(FilterRequest::new().op("age", "_gt", 300i64));
    let docs = planner(&store).select(&request).unwrap().collect_all().unwrap();

    assert_eq!(docs.len(), 1);
    assert_eq!(scalar(&docs[0], "name"), &Value::String("The Recluse".into()));
}

#[test]
fn incompatible_filter_comparison_is_fatal() {
    let store = seed();
    let request = SelectRequest::new("Author")
        .field("name")
        .with_filter(FilterRequest::new().op("name", "_gt", 4i64));
    let err = planner(&store).select(&request).unwrap().collect_all().unwrap_err();
    assert!(matches!(err, QueryError::TypeMismatch { .. }));
}

#[test]
fn order_limit_and_offset() {
    let store = seed();
    let request = SelectRequest::new("Author")
        .field("name")
        .field("age")
        .order_by(&["age"], OrderDirection::Desc)
        .with_limit(2, 1);
    let docs = planner(&store).select(&request).unwrap().collect_all().unwrap();

    assert_eq!(docs.len(), 2);
    assert_eq!(scalar(&docs[0], "age"), &Value::Int(65));
    assert_eq!(scalar(&docs[1], "age"), &Value::Int(62));
}

#[test]
fn descending_key_order_reverses_the_scan() {
    let store = seed();
    let request = SelectRequest::new("Author")
        .field("_key")
        .order_by(&["_key"], OrderDirection::Desc);
    let docs = planner(&store).select(&request).unwrap().collect_all().unwrap();

    let keys: Vec<&Value> = docs.iter().map(|d| scalar(d, "_key")).collect();
    assert_eq!(
        keys,
        [
            &Value::String("bae-recluse".into()),
            &Value::String("bae-grisham".into()),
            &Value::String("bae-funke".into()),
        ]
    );
}

#[test]
fn one_to_many_join_materializes_child_lists() {
    let store = seed();
    let request = SelectRequest::new("Author")
        .field("name")
        .child(SelectRequest::new("published").field("name").field("rating"));
    let docs = planner(&store).select(&request).unwrap().collect_all().unwrap();

    assert_eq!(docs.len(), 3);
    assert_eq!(list(&docs[0], "published").len(), 1);
    let grisham = list(&docs[1], "published");
    assert_eq!(grisham.len(), 2);
    assert_eq!(scalar(grisham[0], "name"), &Value::String("A Time for Mercy".into()));
    // No books still renders an empty list, not null.
    assert_eq!(list(&docs[2], "published").len(), 0);
}

#[test]
fn primary_join_loads_the_one_side() {
    let store = seed();
    let request = SelectRequest::new("Book")
        .field("name")
        .child(SelectRequest::new("author").field("name"));
    let docs = planner(&store).select(&request).unwrap().collect_all().unwrap();

    assert_eq!(docs.len(), 3);
    for book in &docs {
        let RenderValue::Doc(author) = book.get("author").expect("author slot") else {
            panic!("expected a rendered author document");
        };
        assert!(matches!(scalar(author, "name"), Value::String(_)));
    }
}

#[test]
fn secondary_join_matches_the_point_lookup() {
    let mut store = seed();
    let address_col = addresses();
    store
        .insert_document(
            &address_col,
            &DocKey::new("bae-oxford"),
            doc(&[("city", "Oxford".into()), ("resident_id", "bae-grisham".into())]),
        )
        .unwrap();
    store
        .insert_document(
            &address_col,
            &DocKey::new("bae-hamburg"),
            doc(&[("city", "Hamburg".into()), ("resident_id", "bae-funke".into())]),
        )
        .unwrap();

    // Secondary side: the address stores the foreign key, so the join
    // pushes the author's key into the address scan.
    let request = SelectRequest::new("Author")
        .field("name")
        .child(SelectRequest::new("address").field("city"));
    let docs = planner(&store).select(&request).unwrap().collect_all().unwrap();

    assert_eq!(docs.len(), 3);
    let city = |doc: &RenderedDoc| match doc.get("address") {
        Some(RenderValue::Doc(address)) => Some(scalar(address, "city").clone()),
        _ => None,
    };
    assert_eq!(city(&docs[0]), Some(Value::String("Hamburg".into())));
    assert_eq!(city(&docs[1]), Some(Value::String("Oxford".into())));
    // An author without an address keeps a null slot, not an error.
    assert_eq!(city(&docs[2]), None);

    // Primary side: the same pairing through the point lookup.
    let request = SelectRequest::new("Address")
        .field("city")
        .child(SelectRequest::new("resident").field("name"));
    let docs = planner(&store).select(&request).unwrap().collect_all().unwrap();

    assert_eq!(docs.len(), 2);
    for address in &docs {
        let RenderValue::Doc(resident) = address.get("resident").expect("resident slot") else {
            panic!("expected a rendered resident document");
        };
        let expected = match scalar(address, "city").as_str().unwrap() {
            "Hamburg" => "Cornelia Funke",
            _ => "John Grisham",
        };
        assert_eq!(scalar(resident, "name"), &Value::String(expected.into()));
    }
}

#[test]
fn relation_filter_constrains_the_parent() {
    let store = seed();
    // Authors of books rated above 4.6, without selecting the relation.
    let mut sub = std::collections::BTreeMap::new();
    sub.insert(
        "rating".to_owned(),
        ConditionValue::Sub(
            [("_gt".to_owned(), ConditionValue::Value(Value::Float(4.6)))]
                .into_iter()
                .collect(),
        ),
    );
    let request = SelectRequest::new("Author")
        .field("name")
        .with_filter(FilterRequest::new().with("published", ConditionValue::Sub(sub)));
    let docs = planner(&store).select(&request).unwrap().collect_all().unwrap();

    let names: Vec<&Value> = docs.iter().map(|d| scalar(d, "name")).collect();
    assert_eq!(
        names,
        [
            &Value::String("Cornelia Funke".into()),
            &Value::String("John Grisham".into()),
        ]
    );
    // The synthesized join stays hidden.
    assert!(!docs[0].contains_key("published"));
}

#[test]
fn average_of_published_ratings() {
    let store = seed();
    let request = SelectRequest::new("Author")
        .field("name")
        .with_filter(FilterRequest::new().eq("name", "John Grisham"))
        .aggregate(AggregateRequest::new(AggregateKind::Average, "published").on_child("rating"));
    let docs = planner(&store).select(&request).unwrap().collect_all().unwrap();

    assert_eq!(docs.len(), 1);
    assert!((float(&docs[0], "_avg") - 4.7).abs() < 1e-9);
}

#[test]
fn average_with_no_elements_is_zero() {
    let store = seed();
    let request = SelectRequest::new("Author")
        .field("name")
        .with_filter(FilterRequest::new().eq("name", "The Recluse"))
        .aggregate(AggregateRequest::new(AggregateKind::Average, "published").on_child("rating"));
    let docs = planner(&store).select(&request).unwrap().collect_all().unwrap();

    assert_eq!(docs.len(), 1);
    assert!(float(&docs[0], "_avg").abs() < f64::EPSILON);
}

#[test]
fn filtered_count_ignores_the_rendered_list() {
    let store = seed();
    let request = SelectRequest::new("Author")
        .field("name")
        .with_filter(FilterRequest::new().eq("name", "John Grisham"))
        .child(SelectRequest::new("published").field("name").field("rating"))
        .aggregate(
            AggregateRequest::new(AggregateKind::Count, "published")
                .filtered(FilterRequest::new().op("rating", "_gt", 4.6f64)),
        );
    let docs = planner(&store).select(&request).unwrap().collect_all().unwrap();

    assert_eq!(docs.len(), 1);
    // The rendered list keeps both books; only the count is filtered.
    assert_eq!(list(&docs[0], "published").len(), 2);
    assert_eq!(scalar(&docs[0], "_count"), &Value::Int(1));
}

#[test]
fn sum_over_integer_fields_stays_integer() {
    let store = seed();
    let request = SelectRequest::new("Author")
        .grouped_by(&["verified"])
        .field("verified")
        .aggregate(AggregateRequest::new(AggregateKind::Sum, "_group").on_child("age"));
    let docs = planner(&store).select(&request).unwrap().collect_all().unwrap();

    assert_eq!(docs.len(), 2);
    assert_eq!(scalar(&docs[0], "_sum"), &Value::Int(62 + 65));
    assert_eq!(scalar(&docs[1], "_sum"), &Value::Int(327));
}

#[test]
fn max_of_published_ratings() {
    let store = seed();
    let request = SelectRequest::new("Author")
        .field("name")
        .with_filter(FilterRequest::new().eq("name", "John Grisham"))
        .aggregate(AggregateRequest::new(AggregateKind::Max, "published").on_child("rating"));
    let docs = planner(&store).select(&request).unwrap().collect_all().unwrap();

    assert_eq!(scalar(&docs[0], "_max"), &Value::Float(4.9));
}

#[test]
fn group_by_collects_members_in_scan_order() {
    let mut store = seed();
    // A second 327-year-old: same age must land in the same group.
    store
        .insert_document(
            &authors(),
            &DocKey::new("bae-zeno"),
            doc(&[("name", "Zeno".into()), ("age", 327i64.into()), ("verified", false.into())]),
        )
        .unwrap();

    let request = SelectRequest::new("Author")
        .grouped_by(&["age"])
        .field("age")
        .child(SelectRequest::new("_group").field("name"));
    let docs = planner(&store).select(&request).unwrap().collect_all().unwrap();

    assert_eq!(docs.len(), 3);
    let by_age: Vec<(i64, Vec<String>)> = docs
        .iter()
        .map(|d| {
            let age = scalar(d, "age").as_int().unwrap();
            let members = list(d, "_group")
                .iter()
                .map(|m| scalar(m, "name").as_str().unwrap().to_owned())
                .collect();
            (age, members)
        })
        .collect();
    assert_eq!(by_age[0], (62, vec!["Cornelia Funke".to_owned()]));
    assert_eq!(by_age[1], (65, vec!["John Grisham".to_owned()]));
    assert_eq!(by_age[2], (327, vec!["The Recluse".to_owned(), "Zeno".to_owned()]));
}

#[test]
fn two_joins_share_one_scan() {
    let store = seed();
    let request = SelectRequest::new("Author")
        .field("name")
        .child(SelectRequest::new("published").field("name"))
        .child({
            let mut top = SelectRequest::new("published").field("name");
            top.alias = Some("topRated".to_owned());
            top.filter = Some(FilterRequest::new().op("rating", "_gt", 4.6f64));
            top
        });
    let docs = planner(&store).select(&request).unwrap().collect_all().unwrap();

    assert_eq!(docs.len(), 3);
    let grisham = &docs[1];
    assert_eq!(scalar(grisham, "name"), &Value::String("John Grisham".into()));
    assert_eq!(list(grisham, "published").len(), 2);
    let top = list(grisham, "topRated");
    assert_eq!(top.len(), 1);
    assert_eq!(scalar(top[0], "name"), &Value::String("Painted House".into()));
}

#[test]
fn aliases_rename_output_fields() {
    let store = seed();
    let request = SelectRequest::new("Author")
        .field_as("name", "fullName")
        .with_filter(FilterRequest::new().eq("name", "John Grisham"));
    let docs = planner(&store).select(&request).unwrap().collect_all().unwrap();

    assert_eq!(scalar(&docs[0], "fullName"), &Value::String("John Grisham".into()));
    assert!(!docs[0].contains_key("name"));
}

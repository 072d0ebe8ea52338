//! End-to-end commit DAG queries over the in-memory store.

use std::collections::HashMap;
use std::sync::Arc;

use vellum_core::{CollectionDescription, DocKey, FieldDescription, FieldKind, Value};
use vellum_query::{
    CommitQueryKind, CommitSelectRequest, Planner, QueryError, RenderValue, RenderedDoc,
    RequestField, Schema, SelectRequest, VersionRequest,
};
use vellum_store::MemoryStore;

fn authors() -> CollectionDescription {
    CollectionDescription::new(
        "Author",
        1,
        vec![FieldDescription::scalar("name", 1, FieldKind::String)],
    )
}

fn schema() -> Schema {
    let mut schema = Schema::new();
    schema.add(authors());
    schema
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

fn commits_request(kind: CommitQueryKind) -> CommitSelectRequest {
    CommitSelectRequest {
        doc_key: "bae-1".to_owned(),
        field: Some("rating".to_owned()),
        cid: None,
        kind,
    }
}

fn seeded_history() -> MemoryStore {
    let mut store = MemoryStore::new();
    let doc_key = DocKey::new("bae-1");
    store.write_commit(&doc_key, "rating", b"v1").unwrap();
    store.write_commit(&doc_key, "rating", b"v2").unwrap();
    store.write_commit(&doc_key, "rating", b"v3").unwrap();
    store
}

#[test]
fn latest_returns_only_the_highest_commit() {
    let store = seeded_history();
    let mut executor = planner(&store).commits(&commits_request(CommitQueryKind::Latest)).unwrap();
    let docs = executor.collect_all().unwrap();

    assert_eq!(docs.len(), 1);
    assert_eq!(scalar(&docs[0], "height"), &Value::Int(3));
    assert_eq!(scalar(&docs[0], "delta"), &Value::Bytes(b"v3".to_vec()));
}

#[test]
fn all_walks_the_full_history_once() {
    let store = seeded_history();
    let docs = planner(&store)
        .commits(&commits_request(CommitQueryKind::All))
        .unwrap()
        .collect_all()
        .unwrap();

    assert_eq!(docs.len(), 3);
    let mut heights: Vec<i64> =
        docs.iter().map(|d| scalar(d, "height").as_int().unwrap()).collect();
    heights.sort_unstable();
    assert_eq!(heights, [1, 2, 3]);

    let mut cids: Vec<&str> =
        docs.iter().map(|d| scalar(d, "cid").as_str().unwrap()).collect();
    cids.sort_unstable();
    cids.dedup();
    assert_eq!(cids.len(), 3);
}

#[test]
fn commits_link_to_their_predecessor() {
    let store = seeded_history();
    let docs = planner(&store)
        .commits(&commits_request(CommitQueryKind::Latest))
        .unwrap()
        .collect_all()
        .unwrap();

    let RenderValue::List(links) = docs[0].get("links").expect("links slot") else {
        panic!("expected a link list");
    };
    assert_eq!(links.len(), 1);
    let RenderValue::Doc(link) = &links[0] else {
        panic!("expected a link doc");
    };
    assert_eq!(scalar(link, "name"), &Value::String("_head".into()));
}

#[test]
fn one_requires_a_cid() {
    let store = seeded_history();
    let err = planner(&store).commits(&commits_request(CommitQueryKind::One)).unwrap_err();
    assert!(matches!(err, QueryError::InvalidRequest(_)));
}

#[test]
fn one_fetches_exactly_the_named_commit() {
    let mut store = MemoryStore::new();
    let doc_key = DocKey::new("bae-1");
    let first = store.write_commit(&doc_key, "rating", b"v1").unwrap();
    store.write_commit(&doc_key, "rating", b"v2").unwrap();

    let mut request = commits_request(CommitQueryKind::One);
    request.cid = Some(first);
    let docs = planner(&store).commits(&request).unwrap().collect_all().unwrap();

    assert_eq!(docs.len(), 1);
    assert_eq!(scalar(&docs[0], "cid"), &Value::String(first.to_string()));
    assert_eq!(scalar(&docs[0], "height"), &Value::Int(1));
}

#[test]
fn unknown_document_has_no_commits() {
    let store = seeded_history();
    let mut request = commits_request(CommitQueryKind::All);
    request.doc_key = "bae-missing".to_owned();
    let docs = planner(&store).commits(&request).unwrap().collect_all().unwrap();
    assert!(docs.is_empty());
}

#[test]
fn version_child_appends_per_document_history() {
    let col = authors();
    let mut store = MemoryStore::new();
    let fields: HashMap<String, Value> =
        [("name".to_owned(), Value::String("John Grisham".into()))].into_iter().collect();
    store.insert_document(&col, &DocKey::new("bae-1"), fields).unwrap();
    // Composite document commits live under the empty register name.
    store.write_commit(&DocKey::new("bae-1"), "", b"create").unwrap();
    store.write_commit(&DocKey::new("bae-1"), "", b"update").unwrap();

    let mut request = SelectRequest::new("Author").field("name");
    request
        .fields
        .push(RequestField::Version(VersionRequest { alias: None, kind: CommitQueryKind::All }));
    let docs = planner(&store).select(&request).unwrap().collect_all().unwrap();

    assert_eq!(docs.len(), 1);
    let RenderValue::List(history) = docs[0].get("_version").expect("_version slot") else {
        panic!("expected a commit list");
    };
    assert_eq!(history.len(), 2);
    let RenderValue::Doc(newest) = &history[0] else {
        panic!("expected a commit doc");
    };
    assert_eq!(scalar(newest, "height"), &Value::Int(2));
}

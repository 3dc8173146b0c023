#![forbid(unsafe_code)]

use serde_json::{Value, json};
use snap_core::{CompileOptions, Compiler, EntityRow, ReplayError, Schema, Snapshot};
use snap_storage::{ReplayOptions, SqliteStore, StoreError};

const SCHEMA: &str = r#"[
  {
    "type": "ENTITY",
    "name": "posts",
    "morphAs": "Post",
    "key": {"type": "PRIMARY_KEY", "name": "id"},
    "fields": [
      {"type": "VALUE", "name": "title"},
      {"type": "BELONGS_TO", "name": "pinned", "foreignEntity": "comments", "localKey": "pinned_id", "circularFallback": 0}
    ]
  },
  {
    "type": "ENTITY",
    "name": "comments",
    "key": {"type": "PRIMARY_KEY", "name": "id"},
    "fields": [
      {"type": "VALUE", "name": "body"},
      {"type": "MORPH_TO", "name": "owner", "idField": "owner_id", "typeField": "owner_type",
       "circularFallback": 0, "typeCircularFallback": ""}
    ]
  }
]"#;

const TABLES: &str = "
    CREATE TABLE posts (id INTEGER PRIMARY KEY, title TEXT, pinned_id INTEGER);
    CREATE TABLE comments (id INTEGER PRIMARY KEY, body TEXT, owner_id INTEGER, owner_type TEXT);
";

fn source() -> SqliteStore {
    let store = SqliteStore::open_in_memory().expect("open source");
    store.execute_batch(TABLES).expect("create tables");
    store
        .execute_batch(
            "INSERT INTO posts (id, title, pinned_id) VALUES (5, 'Hello', 7);
             INSERT INTO posts (id, title, pinned_id) VALUES (6, 'Quiet', NULL);
             INSERT INTO comments (id, body, owner_id, owner_type) VALUES (7, 'First', 5, 'Post');",
        )
        .expect("seed source");
    store
}

fn target() -> SqliteStore {
    let store = SqliteStore::open_in_memory().expect("open target");
    store.execute_batch(TABLES).expect("create tables");
    store
        .execute_batch(
            "INSERT INTO posts (id, title) VALUES (40, 'Existing');
             INSERT INTO comments (id, body) VALUES (90, 'Existing');",
        )
        .expect("seed target");
    store
}

#[test]
fn extract_rebuilds_field_values() {
    let schema = Schema::from_json(SCHEMA).expect("schema");
    let snapshot = source().extract(&schema).expect("extract");

    assert_eq!(snapshot.len(), 3);
    let first = &snapshot.rows()[0];
    assert_eq!(first.name(), "posts");
    assert_eq!(first.key(), &json!(5));
    assert_eq!(first.field("pinned"), Some(&json!(7)));

    let comment = &snapshot.rows()[2];
    assert_eq!(comment.name(), "comments");
    assert_eq!(comment.field("owner"), Some(&json!(["Post", 5])));
    assert!(snapshot.has_entity("posts", &json!(6)));
}

#[test]
fn circular_rows_survive_a_copy() {
    let schema = Schema::from_json(SCHEMA).expect("schema");
    let snapshot = source().extract(&schema).expect("extract");
    let sequence = Compiler::default().compile(&schema, &snapshot).expect("compile");
    assert_eq!(sequence.updates().count(), 1);

    let mut target = target();
    let lookup = target
        .replay(&sequence, ReplayOptions::default())
        .expect("replay");
    assert_eq!(lookup.len(), 3);

    let posts = target.rows("posts").expect("posts");
    let comments = target.rows("comments").expect("comments");
    assert_eq!(posts.len(), 3);
    assert_eq!(comments.len(), 2);

    let hello = posts
        .iter()
        .find(|row| row["title"] == json!("Hello"))
        .expect("copied post");
    let quiet = posts
        .iter()
        .find(|row| row["title"] == json!("Quiet"))
        .expect("copied post");
    let first = comments
        .iter()
        .find(|row| row["body"] == json!("First"))
        .expect("copied comment");

    assert_ne!(hello["id"], json!(5));
    assert_eq!(hello["pinned_id"], first["id"]);
    assert_eq!(quiet["pinned_id"], Value::Null);
    assert_eq!(first["owner_id"], hello["id"]);
    assert_eq!(first["owner_type"], json!("Post"));
}

fn failing_sequence() -> snap_core::TaskSequence {
    let schema = Schema::from_json(
        r#"[{"type":"ENTITY","name":"things","key":{"type":"PRIMARY_KEY","name":"id"},
             "fields":[{"type":"VALUE","name":"name","optional":true}]}]"#,
    )
    .expect("schema");
    let row = |key: i64, fields: Value| {
        let Value::Object(fields) = fields else {
            panic!("row fields must be an object");
        };
        EntityRow::new("things", json!(key), fields)
    };
    let snapshot = Snapshot::new(vec![row(1, json!({"name": "a"})), row(2, json!({}))]);
    Compiler::new(CompileOptions { presort: false })
        .compile(&schema, &snapshot)
        .expect("compile")
}

fn things_store() -> SqliteStore {
    let store = SqliteStore::open_in_memory().expect("open");
    store
        .execute_batch("CREATE TABLE things (id INTEGER PRIMARY KEY, name TEXT NOT NULL);")
        .expect("create table");
    store
}

#[test]
fn failed_replays_roll_back() {
    let sequence = failing_sequence();
    let mut store = things_store();
    let err = store
        .replay(&sequence, ReplayOptions::default())
        .expect_err("null name must fail");
    assert!(matches!(err, StoreError::Replay(ReplayError::Repository(_))));
    assert!(store.rows("things").expect("rows").is_empty());
}

#[test]
fn replays_without_a_transaction_keep_earlier_rows() {
    let sequence = failing_sequence();
    let mut store = things_store();
    store
        .replay(&sequence, ReplayOptions { transaction: false })
        .expect_err("null name must fail");
    let rows = store.rows("things").expect("rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["name"], json!("a"));
}

use super::*;
use crate::ids::InternalId;
use crate::value::{AliasLookup, Cast, Fragment};
use serde_json::json;

fn fields(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}

fn field(value: Value) -> Field {
    serde_json::from_value(value).unwrap()
}

const SCHEMA: &str = r#"[
  {
    "type": "ENTITY",
    "name": "parents",
    "morphAs": "Parent",
    "key": {"type": "PRIMARY_KEY", "name": "id"},
    "fields": [
      {"type": "VALUE", "name": "name", "cast": "NONE"},
      {"type": "BELONGS_TO", "name": "child_id", "foreignEntity": "children", "localKey": "child_id",
       "relationCondition": "NON_ZERO_INT", "optional": true, "circularFallback": 0}
    ]
  },
  {
    "type": "ENTITY",
    "name": "children",
    "morphAs": "Child",
    "key": {"type": "PRIMARY_KEY", "name": "id"},
    "fields": [
      {"type": "MORPH_TO", "name": "owner", "idField": "owner_id", "typeField": "owner_type"},
      {"type": "MAP", "name": "data", "cast": "JSON", "relations": [
        {"type": "VALUE_RELATION_ENTRY", "path": "parent", "relation": "parents", "relationCondition": "NON_ZERO_INT"},
        {"type": "LIST_RELATION_ENTRY", "path": "others", "relation": "parents", "relationCondition": "TRUTHY"},
        {"type": "REG_EXP_RELATION_ENTRY", "path": "/^text/", "matchers": [
          {"type": "REG_EXP_RELATION_MATCHER", "expression": "/id:(\\d+)/", "relations": [null, "parents"], "cast": "INTEGER"}
        ]}
      ]},
      {"type": "MATCH", "name": "kind", "cases": [
        ["a", {"type": "VALUE", "name": "a_value", "cast": "INTEGER"}]
      ], "default": {"type": "VALUE", "name": "b_value", "cast": "JSON"}}
    ]
  },
  {
    "type": "ENTITY",
    "name": "legacy_parents",
    "morphAs": "Parent",
    "key": {"type": "PRIMARY_KEY", "name": "id"},
    "fields": []
  }
]"#;

#[test]
fn parses_every_field_kind() {
    let schema = Schema::from_json(SCHEMA).unwrap();
    assert_eq!(schema.entities().len(), 3);
    let children = schema.entity("children").unwrap();
    assert_eq!(children.key_name(), "id");
    assert!(matches!(children.fields[0], Field::MorphTo(_)));
    assert!(matches!(children.fields[1], Field::Map(ref map) if map.relations.len() == 3));
    assert!(matches!(children.fields[2], Field::Match(_)));
    assert!(matches!(schema.entity("nope"), Err(CompileError::UnknownEntity(_))));
}

#[test]
fn morph_table_keeps_the_first_claim() {
    let schema = Schema::from_json(SCHEMA).unwrap();
    let table = schema.morph_table();
    assert_eq!(table.get("Parent").map(String::as_str), Some("parents"));
    assert_eq!(table.get("Child").map(String::as_str), Some("children"));
}

#[test]
fn invalid_enums_and_patterns_are_rejected() {
    let bad_cast = Schema::from_json(
        r#"[{"type":"ENTITY","name":"a","key":{"type":"PRIMARY_KEY","name":"id"},
            "fields":[{"type":"VALUE","name":"x","cast":"XML"}]}]"#,
    );
    assert!(matches!(bad_cast, Err(SchemaError::Json(_))));

    let bad_regex = serde_json::from_value::<Field>(json!({
        "type": "BELONGS_TO", "name": "x", "foreignEntity": "a", "localKey": "x",
        "relationCondition": "REGEXP", "conditionMatcher": "/(/"
    }));
    assert!(bad_regex.is_err());
}

#[test]
fn matchers_need_one_relation_per_group() {
    let short = serde_json::from_value::<Field>(json!({
        "type": "MAP", "name": "data", "relations": [
            {"type": "REG_EXP_RELATION_ENTRY", "path": "text", "matchers": [
                {"expression": "/id:(\\d+)/", "relations": ["parents"], "cast": "INTEGER"}
            ]}
        ]
    }));
    let err = short.unwrap_err().to_string();
    assert!(err.contains("one relation per capture group"), "{err}");

    let direct = RegExpMatcher::new(
        crate::pattern::Pattern::parse("/(a)(b)/".to_string()).unwrap(),
        vec![None, Some("parents".to_string())],
        MatchCast::None,
    );
    assert!(matches!(
        direct,
        Err(SchemaError::MatcherGroups { groups: 3, relations: 2, .. })
    ));
}

#[test]
fn value_fields_apply_casts() {
    let mut ids = IdRegistry::new();
    let row = fields(json!({"n": "12abc", "j": {"a": [1]}}));
    let int = field(json!({"type": "VALUE", "name": "n", "cast": "INTEGER"}));
    assert_eq!(
        int.compile(&mut ids, &row, false).unwrap(),
        vec![("n".to_string(), TaskValue::Raw(json!(12)))]
    );
    let encoded = field(json!({"type": "VALUE", "name": "j", "cast": "JSON"}));
    assert_eq!(
        encoded.compile(&mut ids, &row, false).unwrap(),
        vec![("j".to_string(), TaskValue::Raw(json!(r#"{"a":[1]}"#)))]
    );
}

#[test]
fn missing_fields_use_the_fallback_only_when_optional() {
    let mut ids = IdRegistry::new();
    let row = Map::new();
    let required = field(json!({"type": "VALUE", "name": "n", "cast": "NONE"}));
    assert!(matches!(
        required.compile(&mut ids, &row, false),
        Err(SchemaError::MissingField(name)) if name == "n"
    ));
    let optional = field(json!({"type": "VALUE", "name": "n", "cast": "NONE", "optional": true, "fallback": 5}));
    assert_eq!(
        optional.compile(&mut ids, &row, false).unwrap(),
        vec![("n".to_string(), TaskValue::Raw(json!(5)))]
    );
}

#[test]
fn belongs_to_aliases_only_valid_foreign_ids() {
    let mut ids = IdRegistry::new();
    let relation = field(json!({
        "type": "BELONGS_TO", "name": "parent", "foreignEntity": "parents",
        "localKey": "parent_id", "relationCondition": "NON_ZERO_INT", "circularFallback": 0
    }));
    let compiled = relation.compile(&mut ids, &fields(json!({"parent": 9})), false).unwrap();
    assert_eq!(
        compiled,
        vec![("parent_id".to_string(), TaskValue::Alias(InternalId::new(1)))]
    );
    let compiled = relation.compile(&mut ids, &fields(json!({"parent": 0})), false).unwrap();
    assert_eq!(compiled, vec![("parent_id".to_string(), TaskValue::Raw(json!(0)))]);
    let forced = relation.compile(&mut ids, &fields(json!({"parent": 9})), true).unwrap();
    assert_eq!(forced, vec![("parent_id".to_string(), TaskValue::Raw(json!(0)))]);
}

#[test]
fn morph_to_uses_the_morph_table() {
    let schema = Schema::from_json(SCHEMA).unwrap();
    let mut ids = IdRegistry::with_morph_table(schema.morph_table());
    let parent = ids.get_id("parents", &json!(3));
    let children = schema.entity("children").unwrap();
    let compiled = children.fields[0]
        .compile(&mut ids, &fields(json!({"owner": ["Parent", 3]})), false)
        .unwrap();
    assert_eq!(
        compiled,
        vec![
            ("owner_id".to_string(), TaskValue::Alias(parent)),
            ("owner_type".to_string(), TaskValue::Raw(json!("Parent"))),
        ]
    );
    let unlinked = children.fields[0]
        .compile(&mut ids, &fields(json!({"owner": ["Parent", null]})), false)
        .unwrap();
    assert_eq!(unlinked[0].1, TaskValue::Raw(Value::Null));
    assert!(matches!(
        children.fields[0].compile(&mut ids, &fields(json!({"owner": 3})), false),
        Err(SchemaError::InvalidValue { .. })
    ));
}

#[test]
fn map_fields_assemble_embedded_ids() {
    let schema = Schema::from_json(SCHEMA).unwrap();
    let mut ids = IdRegistry::new();
    let map = &schema.entity("children").unwrap().fields[1];
    let row = fields(json!({
        "data": {
            "parent": 5,
            "others": [5, 0, 6],
            "text": "see id:6 and id:77 here",
            "untouched": 5
        }
    }));
    let compiled = map.compile(&mut ids, &row, false).unwrap();
    assert_eq!(compiled.len(), 1);
    let TaskValue::Assembled(assembled) = &compiled[0].1 else {
        panic!("expected an assembled value");
    };
    let five = ids.find_id("parents", &json!(5)).unwrap();
    let six = ids.find_id("parents", &json!(6)).unwrap();
    let seventy_seven = ids.find_id("parents", &json!(77)).unwrap();
    assert_eq!(assembled.dependencies(), vec![five, six, seventy_seven]);
    assert!(assembled.fragments().contains(&Fragment::Alias {
        id: six,
        cast: Cast::None
    }));

    let lookup: AliasLookup = [(five, json!(500)), (six, json!(600)), (seventy_seven, json!(7700))]
        .into_iter()
        .collect();
    let resolved = assembled.resolve(&lookup).unwrap();
    let resolved: Value = serde_json::from_str(resolved.as_str().unwrap()).unwrap();
    assert_eq!(
        resolved,
        json!({
            "parent": 500,
            "others": [500, 0, 600],
            "text": "see id:600 and id:7700 here",
            "untouched": 5
        })
    );
}

#[test]
fn map_fields_require_containers() {
    let mut ids = IdRegistry::new();
    let map = field(json!({"type": "MAP", "name": "data", "cast": "JSON", "relations": []}));
    assert!(matches!(
        map.compile(&mut ids, &fields(json!({"data": "text"})), false),
        Err(SchemaError::InvalidValue { .. })
    ));
    let forced = map.compile(&mut ids, &fields(json!({"data": "text"})), true).unwrap();
    assert_eq!(forced, vec![("data".to_string(), TaskValue::Raw(Value::Null))]);
}

#[test]
fn map_markers_avoid_document_text() {
    let mut ids = IdRegistry::new();
    let map = field(json!({
        "type": "MAP", "name": "data", "cast": "JSON",
        "relations": [{"type": "VALUE_RELATION_ENTRY", "path": "a", "relation": "parents"}]
    }));
    let row = fields(json!({"data": {"a": 1, "note": "@snap0:0@"}}));
    let compiled = map.compile(&mut ids, &row, false).unwrap();
    let TaskValue::Assembled(assembled) = &compiled[0].1 else {
        panic!("expected an assembled value");
    };
    let lookup: AliasLookup = [(InternalId::new(1), json!(10))].into_iter().collect();
    assert_eq!(
        assembled.resolve(&lookup).unwrap(),
        json!(r#"{"a":10,"note":"@snap0:0@"}"#)
    );
}

#[test]
fn match_fields_compile_the_selected_case() {
    let schema = Schema::from_json(SCHEMA).unwrap();
    let mut ids = IdRegistry::new();
    let matcher = &schema.entity("children").unwrap().fields[2];
    let row = fields(json!({"kind": "a", "a_value": "4", "b_value": [1]}));
    assert_eq!(
        matcher.compile(&mut ids, &row, false).unwrap(),
        vec![("a_value".to_string(), TaskValue::Raw(json!(4)))]
    );
    let row = fields(json!({"kind": "b", "a_value": "4", "b_value": [1]}));
    assert_eq!(
        matcher.compile(&mut ids, &row, false).unwrap(),
        vec![("b_value".to_string(), TaskValue::Raw(json!("[1]")))]
    );
    assert_eq!(matcher.name(), "kind");
}

#[test]
fn schema_round_trips_through_json() {
    let schema = Schema::from_json(SCHEMA).unwrap();
    let text = serde_json::to_string(&schema).unwrap();
    assert_eq!(Schema::from_json(&text).unwrap(), schema);
}

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OpKind {
    Insert,
    Update,
}

/// One batch of serialized rows of a single type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub op: OpKind,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub rows: Vec<Map<String, Value>>,
}

impl Operation {
    pub fn new(op: OpKind, entity_type: impl Into<String>, rows: Vec<Map<String, Value>>) -> Self {
        Self {
            op,
            entity_type: entity_type.into(),
            rows,
        }
    }

    pub fn list_from_json(text: &str) -> Result<Vec<Self>, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn operations_use_the_batched_wire_form() {
        let ops = Operation::list_from_json(
            r#"[{"op":"INSERT","type":"roots","rows":[{"id":"a","name":"x"}]},
                {"op":"UPDATE","type":"roots","rows":[]}]"#,
        )
        .unwrap();
        assert_eq!(ops[0].op, OpKind::Insert);
        assert_eq!(ops[0].entity_type, "roots");
        assert_eq!(ops[1].op, OpKind::Update);
        assert_eq!(
            serde_json::to_value(&ops[0]).unwrap(),
            json!({"op": "INSERT", "type": "roots", "rows": [{"id": "a", "name": "x"}]})
        );
    }
}

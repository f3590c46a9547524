use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;

/// Types the model can be asked to produce as JSON.
///
/// Implemented for every `JsonSchema + DeserializeOwned` type. Ollama's
/// `format` field takes a plain JSON schema; `$ref`s are inlined because
/// smaller models follow flat schemas more reliably.
pub trait StructuredOutput: JsonSchema + DeserializeOwned {
    fn json_schema() -> serde_json::Value {
        let schema = schema_for!(Self);
        let mut value = serde_json::to_value(schema).unwrap_or_default();

        let definitions = match &mut value {
            serde_json::Value::Object(map) => {
                map.remove("$schema");
                map.remove("definitions")
            }
            _ => None,
        };

        if let Some(serde_json::Value::Object(defs)) = definitions {
            inline_refs(&mut value, &defs);
        }

        value
    }

    fn type_name() -> String {
        <Self as JsonSchema>::schema_name()
    }
}

impl<T: JsonSchema + DeserializeOwned> StructuredOutput for T {}

fn inline_refs(
    value: &mut serde_json::Value,
    defs: &serde_json::Map<String, serde_json::Value>,
) {
    match value {
        serde_json::Value::Object(map) => {
            if let Some(serde_json::Value::String(reference)) = map.get("$ref") {
                let name = reference.trim_start_matches("#/definitions/");
                if let Some(def) = defs.get(name) {
                    let mut resolved = def.clone();
                    inline_refs(&mut resolved, defs);
                    *value = resolved;
                    return;
                }
            }
            for (_, v) in map.iter_mut() {
                inline_refs(v, defs);
            }
        }
        serde_json::Value::Array(items) => {
            for item in items.iter_mut() {
                inline_refs(item, defs);
            }
        }
        _ => {}
    }
}

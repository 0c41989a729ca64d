//! 工具参数 JSON Schema 生成（schemars）
//!
//! 生成供 function calling 使用的扁平 schema：子结构内联、Option 不带 null 类型、
//! 去掉 `$schema` / `title` / `format` 等部分供应商（Gemini 兼容层）不接受的键。

use schemars::gen::SchemaSettings;
use schemars::JsonSchema;
use serde_json::Value;

/// 为参数结构体生成 parameters schema
pub fn parameters_schema_for<T: JsonSchema>() -> Value {
    let settings = SchemaSettings::draft07().with(|s| {
        s.inline_subschemas = true;
        s.option_nullable = false;
        s.option_add_null_type = false;
    });
    let root = settings.into_generator().into_root_schema_for::<T>();
    let mut value = serde_json::to_value(root).unwrap_or_else(|_| serde_json::json!({"type": "object"}));
    if let Some(obj) = value.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
        obj.remove("definitions");
    }
    strip_keys(&mut value, &["format", "title"]);
    value
}

fn strip_keys(value: &mut Value, keys: &[&str]) {
    match value {
        Value::Object(map) => {
            // properties 下的键是参数名，不能当作 schema 关键字删除
            for (k, v) in map.iter_mut() {
                if k == "properties" {
                    if let Value::Object(props) = v {
                        for prop in props.values_mut() {
                            strip_keys(prop, keys);
                        }
                    }
                } else {
                    strip_keys(v, keys);
                }
            }
            for k in keys {
                map.remove(*k);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(|v| strip_keys(v, keys)),
        _ => {}
    }
}

/// 从 schema 中读出指定 JSON 类型的参数名（按 properties 顺序）
pub fn properties_of_type(schema: &Value, json_type: &str) -> Vec<String> {
    schema
        .get("properties")
        .and_then(|p| p.as_object())
        .map(|props| {
            props
                .iter()
                .filter(|(_, v)| v.get("type").and_then(|t| t.as_str()) == Some(json_type))
                .map(|(k, _)| k.clone())
                .collect()
        })
        .unwrap_or_default()
}

/// schema 的 required 列表
pub fn required_properties(schema: &Value) -> Vec<String> {
    schema
        .get("required")
        .and_then(|r| r.as_array())
        .map(|r| r.iter().filter_map(|v| v.as_str().map(String::from)).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::search::SearchArgs;

    #[test]
    fn test_search_args_schema_is_flat() {
        let schema = parameters_schema_for::<SearchArgs>();
        assert_eq!(schema["type"], "object");
        assert!(schema.get("$schema").is_none());
        assert!(schema.get("definitions").is_none());
        assert_eq!(schema["properties"]["keywords"]["type"], "string");
        assert_eq!(schema["properties"]["location_name"]["type"], "string");
        assert_eq!(schema["properties"]["limit"]["type"], "integer");
        assert!(schema["properties"]["limit"].get("format").is_none());
        assert_eq!(required_properties(&schema), vec!["keywords".to_string()]);
    }

    #[test]
    fn test_properties_of_type() {
        let schema = parameters_schema_for::<SearchArgs>();
        let strings = properties_of_type(&schema, "string");
        assert!(strings.contains(&"keywords".to_string()));
        assert!(strings.contains(&"location_name".to_string()));
        assert_eq!(properties_of_type(&schema, "integer"), vec!["limit".to_string()]);
    }
}

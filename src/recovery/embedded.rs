//! 策略一：内嵌对象扫描
//!
//! 对每个 `{` 依次尝试配对完整的片段与最短片段，解析（必要时规范化）为对象后，
//! 按工具名字段或必填参数推断工具。

use serde_json::{Map, Value};

use crate::recovery::catalog::{CatalogEntry, ToolCatalog};
use crate::recovery::scan::{find_balanced, parse_json_like};
use crate::tools::ToolInvocation;

const NAME_KEYS: [&str; 3] = ["tool_name", "tool", "name"];
const ARG_KEYS: [&str; 3] = ["parameters", "args", "arguments"];

/// 候选片段（起止字节下标，含右括号）
fn object_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    for (start, _) in text.match_indices('{') {
        if let Some(end) = find_balanced(text, start, '{', '}') {
            spans.push((start, end));
        }
        if let Some(off) = text[start..].find('}') {
            let end = start + off;
            if !spans.contains(&(start, end)) {
                spans.push((start, end));
            }
        }
    }
    spans
}

fn as_object(value: &Value) -> Option<Map<String, Value>> {
    match value {
        Value::Object(map) => Some(map.clone()),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        },
        _ => None,
    }
}

/// 对象中直接点名的工具及其参数；支持 `{"function": {"name", "arguments"}}` 形态
fn named_call<'a>(obj: &Map<String, Value>, catalog: &'a ToolCatalog) -> Option<(&'a CatalogEntry, Map<String, Value>)> {
    if let Some(Value::Object(function)) = obj.get("function") {
        if let Some(entry) = function.get("name").and_then(|n| n.as_str()).and_then(|n| catalog.resolve(n)) {
            let args = function.get("arguments").and_then(as_object).unwrap_or_default();
            return Some((entry, args));
        }
    }
    let entry = NAME_KEYS
        .iter()
        .filter_map(|k| obj.get(*k).and_then(|v| v.as_str()))
        .find_map(|n| catalog.resolve(n))?;
    let args = ARG_KEYS
        .iter()
        .find_map(|k| obj.get(*k).and_then(as_object))
        .unwrap_or_else(|| {
            let mut rest = obj.clone();
            for k in NAME_KEYS.iter().chain(ARG_KEYS.iter()) {
                rest.remove(*k);
            }
            rest
        });
    Some((entry, args))
}

fn declared_only(entry: &CatalogEntry, args: Map<String, Value>) -> Map<String, Value> {
    entry
        .normalize_args(args)
        .into_iter()
        .filter(|(k, _)| entry.declares(k))
        .collect()
}

fn interpret(fragment: &str, catalog: &ToolCatalog) -> Option<ToolInvocation> {
    let Value::Object(obj) = parse_json_like(fragment)? else {
        return None;
    };
    if let Some((entry, args)) = named_call(&obj, catalog) {
        return Some(ToolInvocation::recovered(entry.name.clone(), declared_only(entry, args)));
    }
    let entry = catalog.infer_from_args(&obj)?;
    Some(ToolInvocation::recovered(entry.name.clone(), declared_only(entry, obj)))
}

pub fn recover(text: &str, catalog: &ToolCatalog) -> Option<ToolInvocation> {
    let spans = object_spans(text);
    let mut hit: Option<(ToolInvocation, usize)> = None;
    for (start, end) in spans {
        if let Some((_, accepted_end)) = &hit {
            // 已接受片段内部的候选不算歧义
            if start <= *accepted_end {
                continue;
            }
        }
        if let Some(inv) = interpret(&text[start..=end], catalog) {
            match &hit {
                None => hit = Some((inv, end)),
                Some((first, _)) => {
                    tracing::debug!(
                        chosen = %first.tool_name,
                        ignored = %inv.tool_name,
                        "ambiguous embedded tool objects, first one wins"
                    );
                    break;
                }
            }
        }
    }
    hit.map(|(inv, _)| inv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recovery::catalog::tests::recruiter_catalog;
    use serde_json::json;

    #[test]
    fn test_single_quotes_and_trailing_comma() {
        let catalog = recruiter_catalog();
        let inv = recover("Sure, searching now: {'keywords': 'Go Engineer',}", &catalog).unwrap();
        assert_eq!(inv.tool_name, "search_linkedin");
        assert_eq!(Value::Object(inv.arguments), json!({"keywords": "Go Engineer"}));
    }

    #[test]
    fn test_named_tool_with_parameters() {
        let catalog = recruiter_catalog();
        let text = r#"```json
{"tool_name": "search_linkedin", "parameters": {"keywords": "\"Rust\"", "location": "Berlin", "limit": 5}}
```"#;
        let inv = recover(text, &catalog).unwrap();
        assert_eq!(inv.tool_name, "search_linkedin");
        assert_eq!(
            Value::Object(inv.arguments),
            json!({"keywords": "\"Rust\"", "location_name": "Berlin", "limit": 5})
        );
    }

    #[test]
    fn test_function_shape() {
        let catalog = recruiter_catalog();
        let text = r#"{"function": {"name": "resolve", "arguments": "{\"location_name\": \"GTA\"}"}}"#;
        let inv = recover(text, &catalog).unwrap();
        assert_eq!(inv.tool_name, "resolve_linkedin_location");
        assert_eq!(inv.arguments["location_name"], "GTA");
    }

    #[test]
    fn test_location_only_implies_resolver() {
        let catalog = recruiter_catalog();
        let inv = recover(r#"I'll look up {"location_name": "Paris"} first."#, &catalog).unwrap();
        assert_eq!(inv.tool_name, "resolve_linkedin_location");
    }

    #[test]
    fn test_unrelated_objects_are_ignored() {
        let catalog = recruiter_catalog();
        assert!(recover(r#"The config is {"theme": "dark"} and {broken"#, &catalog).is_none());
        assert!(recover("A set like {a, b} is not a call", &catalog).is_none());
    }

    #[test]
    fn test_first_of_two_objects_wins() {
        let catalog = recruiter_catalog();
        let text = r#"{"keywords": "\"A\""} or maybe {"keywords": "\"B\""}"#;
        let inv = recover(text, &catalog).unwrap();
        assert_eq!(inv.arguments["keywords"], "\"A\"");
    }
}

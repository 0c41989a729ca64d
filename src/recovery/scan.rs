//! 文本扫描工具：括号配对、近似 JSON 规范化、`key = value` 赋值提取

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

/// 从 `open_idx`（必须指向 open 字符）开始找配对的 close，跳过引号内的内容；返回 close 的字节下标
pub fn find_balanced(text: &str, open_idx: usize, open: char, close: char) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in text[open_idx..].char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            c if c == open => depth += 1,
            c if c == close => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(open_idx + i);
                }
            }
            _ => {}
        }
    }
    None
}

fn trailing_comma_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r",\s*([}\]])").expect("valid regex"))
}

/// 修正模型常见的引号/逗号错误：单引号改双引号，去掉右括号前的多余逗号
pub fn normalize_json_like(s: &str) -> String {
    let swapped = s.replace('\'', "\"");
    trailing_comma_re().replace_all(&swapped, "$1").into_owned()
}

/// 先按 JSON 解析，失败再按规范化后的文本解析
pub fn parse_json_like(s: &str) -> Option<Value> {
    serde_json::from_str(s)
        .ok()
        .or_else(|| serde_json::from_str(&normalize_json_like(s)).ok())
}

/// 一次 `key = value` 赋值
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub key: String,
    pub value: Value,
    pub quoted: bool,
}

fn assignment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b([A-Za-z_][A-Za-z0-9_]*)\s*=\s*").expect("valid regex"))
}

/// 按出现顺序提取赋值；值支持引号字符串、列表、整数、布尔与裸词
pub fn parse_assignments(text: &str) -> Vec<Assignment> {
    let mut out = Vec::new();
    let mut pos = 0;
    while pos < text.len() {
        let Some(caps) = assignment_re().captures_at(text, pos) else {
            break;
        };
        let (Some(whole), Some(key)) = (caps.get(0), caps.get(1)) else {
            break;
        };
        let value_start = whole.end();
        pos = value_start;
        // `==` 比较不是赋值
        if text[value_start..].starts_with('=') {
            pos += 1;
            continue;
        }
        if let Some((value, quoted, end)) = parse_value(text, value_start) {
            out.push(Assignment {
                key: key.as_str().to_string(),
                value,
                quoted,
            });
            pos = end;
        }
    }
    out
}

/// 赋值列表转参数表（同名键以第一次出现为准）
pub fn assignments_to_map(assignments: &[Assignment]) -> Map<String, Value> {
    let mut map = Map::new();
    for a in assignments {
        if !map.contains_key(&a.key) {
            map.insert(a.key.clone(), a.value.clone());
        }
    }
    map
}

/// 解析 start 处的值，返回 (值, 是否带引号, 结束位置)
fn parse_value(text: &str, start: usize) -> Option<(Value, bool, usize)> {
    let rest = &text[start..];
    let first = rest.chars().next()?;
    match first {
        '"' | '\'' => {
            let mut escaped = false;
            let mut value = String::new();
            for (i, c) in rest.char_indices().skip(1) {
                if escaped {
                    value.push(c);
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == first {
                    return Some((Value::String(value), true, start + i + c.len_utf8()));
                } else {
                    value.push(c);
                }
            }
            None
        }
        '[' => {
            let close = find_balanced(text, start, '[', ']')?;
            let value = parse_json_like(&text[start..=close])?;
            Some((value, false, close + 1))
        }
        _ => {
            let end = rest
                .find(|c: char| c == ',' || c == ')' || c == '}' || c.is_whitespace())
                .unwrap_or(rest.len());
            let token = &rest[..end];
            if token.is_empty() {
                return None;
            }
            let value = if let Ok(n) = token.parse::<i64>() {
                Value::from(n)
            } else {
                match token {
                    "true" | "True" => Value::Bool(true),
                    "false" | "False" => Value::Bool(false),
                    "None" | "null" => Value::Null,
                    _ => Value::String(token.to_string()),
                }
            };
            Some((value, false, start + end))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_balanced_skips_quoted_braces() {
        let text = r#"x {"a": "}", "b": {"c": 1}} y"#;
        let open = text.find('{').unwrap();
        let close = find_balanced(text, open, '{', '}').unwrap();
        assert_eq!(&text[open..=close], r#"{"a": "}", "b": {"c": 1}}"#);
        assert!(find_balanced("{ unclosed", 0, '{', '}').is_none());
    }

    #[test]
    fn test_normalize_json_like() {
        assert_eq!(normalize_json_like("{'a': 'b',}"), r#"{"a": "b"}"#);
        assert_eq!(normalize_json_like("['x', 'y' ,]"), r#"["x", "y"]"#);
    }

    #[test]
    fn test_parse_assignments() {
        let found = parse_assignments(r#"keywords="Rust \"Dev\"", limit=10, geo_urns=['1', '2'], open=True, mode=fast"#);
        let map = assignments_to_map(&found);
        assert_eq!(map["keywords"], r#"Rust "Dev""#);
        assert_eq!(map["limit"], 10);
        assert_eq!(map["geo_urns"], serde_json::json!(["1", "2"]));
        assert_eq!(map["open"], true);
        assert_eq!(map["mode"], "fast");
        assert!(found[0].quoted);
        assert!(!found[1].quoted);
    }

    #[test]
    fn test_parse_assignments_ignores_comparisons_and_values() {
        let found = parse_assignments(r#"if a == b then keywords = "x = y""#);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].key, "keywords");
        assert_eq!(found[0].value, "x = y");
    }
}

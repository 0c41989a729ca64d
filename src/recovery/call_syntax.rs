//! 策略二：函数调用语法扫描（`default_api.search_linkedin(keywords="...", limit=10)`）

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::recovery::catalog::ToolCatalog;
use crate::recovery::scan::{assignments_to_map, find_balanced, parse_assignments};
use crate::tools::ToolInvocation;

fn call_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:\b[A-Za-z_][A-Za-z0-9_]*\s*\.\s*)?\b([A-Za-z_][A-Za-z0-9_]*)\s*\(").expect("valid regex")
    })
}

pub fn recover(text: &str, catalog: &ToolCatalog) -> Option<ToolInvocation> {
    for caps in call_re().captures_iter(text) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let Some(entry) = catalog.resolve(name.as_str()) else {
            continue;
        };
        let open = whole.end() - 1;
        let close = find_balanced(text, open, '(', ')').unwrap_or(text.len());
        let inner = &text[open + 1..close];

        let raw = assignments_to_map(&parse_assignments(inner));
        let args: Map<String, Value> = entry
            .normalize_args(raw)
            .into_iter()
            .filter(|(k, _)| entry.declares(k))
            .collect();
        if catalog.accepts(entry, &args) {
            return Some(ToolInvocation::recovered(entry.name.clone(), args));
        }
        tracing::debug!(tool = %entry.name, "call syntax without required arguments, skipped");
    }
    None
}

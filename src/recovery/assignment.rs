//! 策略三：裸赋值扫描（`keywords = "..."`，可附带 `location = "..."`）

use serde_json::{Map, Value};

use crate::recovery::catalog::ToolCatalog;
use crate::recovery::scan::parse_assignments;
use crate::tools::ToolInvocation;

pub fn recover(text: &str, catalog: &ToolCatalog) -> Option<ToolInvocation> {
    let primary = catalog.primary()?;
    let key = primary.required.first()?;
    let found = parse_assignments(text);

    let quoted = |name: &str| {
        found
            .iter()
            .find(|a| a.quoted && a.key == name)
            .and_then(|a| a.value.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    };

    let value = quoted(key.as_str())?;
    let mut args = Map::new();
    args.insert(key.clone(), Value::String(value));
    if primary.declares("location_name") {
        if let Some(location) = quoted("location_name").or_else(|| quoted("location")) {
            args.insert("location_name".to_string(), Value::String(location));
        }
    }
    Some(ToolInvocation::recovered(primary.name.clone(), args))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recovery::catalog::tests::recruiter_catalog;
    use serde_json::json;

    #[test]
    fn test_keywords_with_location() {
        let catalog = recruiter_catalog();
        let inv = recover(r#"the args are keywords = "Java Developer" location = "Toronto""#, &catalog).unwrap();
        assert_eq!(inv.tool_name, "search_linkedin");
        assert_eq!(
            Value::Object(inv.arguments),
            json!({"keywords": "Java Developer", "location_name": "Toronto"})
        );
    }

    #[test]
    fn test_keywords_only() {
        let catalog = recruiter_catalog();
        let inv = recover("keywords = 'Data Engineer'", &catalog).unwrap();
        assert_eq!(Value::Object(inv.arguments), json!({"keywords": "Data Engineer"}));
    }

    #[test]
    fn test_unquoted_keywords_ignored() {
        let catalog = recruiter_catalog();
        assert!(recover("keywords = relevant ones", &catalog).is_none());
    }
}

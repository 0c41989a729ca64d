//! 可恢复工具目录：从注册表的 schema / 别名中提取文本解析需要的信息

use serde_json::{Map, Value};

use crate::tools::schema::{properties_of_type, required_properties};
use crate::tools::ToolRegistry;

/// 单个工具在文本恢复中的描述
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub name: String,
    pub aliases: Vec<String>,
    /// schema 中声明的全部参数名
    pub properties: Vec<String>,
    pub integer_args: Vec<String>,
    pub required: Vec<String>,
    pub primary: bool,
}

impl CatalogEntry {
    pub fn answers_to(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name) || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(name))
    }

    pub fn declares(&self, arg: &str) -> bool {
        self.properties.iter().any(|p| p == arg)
    }

    fn required_satisfied(&self, args: &Map<String, Value>) -> bool {
        self.required.iter().all(|r| match args.get(r) {
            Some(Value::String(s)) => !s.trim().is_empty(),
            Some(Value::Null) | None => false,
            Some(_) => true,
        })
    }

    /// 文本中常见的参数别名归一：`location="X"` -> `location_name`，`geo_urns=[..]` -> `location`
    pub fn normalize_args(&self, mut args: Map<String, Value>) -> Map<String, Value> {
        if self.declares("location_name") && !args.contains_key("location_name") {
            if let Some(Value::String(name)) = args.get("location").cloned() {
                args.remove("location");
                args.insert("location_name".to_string(), Value::String(name));
            }
        }
        if let Some(Value::Array(urns)) = args.remove("geo_urns") {
            if self.declares("location") {
                let filters: Vec<Value> = urns
                    .iter()
                    .filter_map(|u| match u {
                        Value::String(s) => Some(s.clone()),
                        Value::Number(n) => Some(n.to_string()),
                        _ => None,
                    })
                    .map(|id| serde_json::json!({ "id": id, "priority": "MUST_HAVE" }))
                    .collect();
                if !filters.is_empty() {
                    args.insert("location".to_string(), Value::Array(filters));
                }
            }
        }
        for key in &self.integer_args {
            if let Some(Value::String(s)) = args.get(key) {
                if let Ok(n) = s.trim().parse::<i64>() {
                    args.insert(key.clone(), Value::from(n));
                }
            }
        }
        args
    }
}

/// 全部可恢复工具（按注册顺序）
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    entries: Vec<CatalogEntry>,
}

impl ToolCatalog {
    pub fn from_registry(registry: &ToolRegistry) -> Self {
        let entries = registry
            .tools()
            .map(|tool| {
                let schema = tool.parameters_schema();
                let properties = schema
                    .get("properties")
                    .and_then(|p| p.as_object())
                    .map(|p| p.keys().cloned().collect())
                    .unwrap_or_default();
                CatalogEntry {
                    name: tool.name().to_string(),
                    aliases: tool.aliases().iter().map(|a| a.to_string()).collect(),
                    properties,
                    integer_args: properties_of_type(&schema, "integer"),
                    required: required_properties(&schema),
                    primary: tool.is_primary_search(),
                }
            })
            .collect();
        Self { entries }
    }

    /// 名称或别名 -> 工具
    pub fn resolve(&self, name: &str) -> Option<&CatalogEntry> {
        let name = name.trim();
        self.entries
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(name))
            .or_else(|| self.entries.iter().find(|e| e.answers_to(name)))
    }

    pub fn primary(&self) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| e.primary)
    }

    /// 根据字段推断工具：第一个必填参数全部出现的工具（主检索工具优先，无必填参数的工具不参与）
    pub fn infer_from_args(&self, args: &Map<String, Value>) -> Option<&CatalogEntry> {
        self.entries
            .iter()
            .filter(|e| e.primary)
            .chain(self.entries.iter().filter(|e| !e.primary))
            .filter(|e| !e.required.is_empty())
            .find(|e| e.required_satisfied(&e.normalize_args(args.clone())))
    }

    /// 参数是否满足该工具的必填项（归一化之后）
    pub fn accepts(&self, entry: &CatalogEntry, args: &Map<String, Value>) -> bool {
        entry.required_satisfied(args)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::tools::{recruiter_registry, UnipileSettings};

    pub(crate) fn recruiter_catalog() -> ToolCatalog {
        ToolCatalog::from_registry(&recruiter_registry(UnipileSettings::default()).unwrap())
    }

    #[test]
    fn test_resolve_by_alias() {
        let catalog = recruiter_catalog();
        assert_eq!(catalog.resolve("search").unwrap().name, "search_linkedin");
        assert_eq!(catalog.resolve("Resolve").unwrap().name, "resolve_linkedin_location");
        assert!(catalog.resolve("delete_everything").is_none());
        assert_eq!(catalog.primary().unwrap().name, "search_linkedin");
    }

    #[test]
    fn test_infer_from_args() {
        let catalog = recruiter_catalog();
        let mut args = Map::new();
        args.insert("location_name".into(), Value::String("Toronto".into()));
        assert_eq!(catalog.infer_from_args(&args).unwrap().name, "resolve_linkedin_location");
        args.insert("keywords".into(), Value::String("\"Go\"".into()));
        assert_eq!(catalog.infer_from_args(&args).unwrap().name, "search_linkedin");
        assert!(catalog.infer_from_args(&Map::new()).is_none());
    }

    #[test]
    fn test_normalize_args() {
        let catalog = recruiter_catalog();
        let search = catalog.primary().unwrap();
        let mut args = Map::new();
        args.insert("location".into(), Value::String("Toronto".into()));
        args.insert("geo_urns".into(), serde_json::json!(["105149290"]));
        args.insert("limit".into(), Value::String("10".into()));
        let args = search.normalize_args(args);
        assert_eq!(args["location_name"], "Toronto");
        assert_eq!(args["location"], serde_json::json!([{"id": "105149290", "priority": "MUST_HAVE"}]));
        assert_eq!(args["limit"], 10);
    }
}

//! 幻觉工具调用恢复
//!
//! 模型没有返回原生 tool_calls 但文本里写出了"调用"时，按固定顺序依次尝试：
//! 内嵌对象 -> 函数调用语法 -> 裸赋值；第一个得到已知工具的策略即停止。
//! 每个策略都是纯函数（文本 + 工具目录 -> 调用），可单独测试。

pub mod assignment;
pub mod call_syntax;
pub mod catalog;
pub mod embedded;
pub mod scan;

pub use catalog::{CatalogEntry, ToolCatalog};

use crate::tools::ToolInvocation;

type Strategy = fn(&str, &ToolCatalog) -> Option<ToolInvocation>;

const CASCADE: [(&str, Strategy); 3] = [
    ("embedded_object", embedded::recover),
    ("call_syntax", call_syntax::recover),
    ("bare_assignment", assignment::recover),
];

/// 从模型文本中恢复至多一个工具调用
pub fn recover(text: &str, catalog: &ToolCatalog) -> Option<ToolInvocation> {
    if text.trim().is_empty() {
        return None;
    }
    for (strategy, run) in CASCADE {
        if let Some(invocation) = run(text, catalog) {
            tracing::info!(
                strategy,
                tool = %invocation.tool_name,
                args = %invocation.arguments_json(),
                "recovered tool call from model text"
            );
            return Some(invocation);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recovery::catalog::tests::recruiter_catalog;
    use crate::tools::Provenance;
    use serde_json::{json, Value};

    #[test]
    fn test_bare_assignment_literal() {
        let catalog = recruiter_catalog();
        let inv = recover(r#"the args are keywords = "Java Developer" location = "Toronto""#, &catalog).unwrap();
        assert_eq!(inv.provenance, Provenance::Recovered);
        assert_eq!(inv.tool_name, "search_linkedin");
        assert_eq!(
            Value::Object(inv.arguments),
            json!({"keywords": "Java Developer", "location_name": "Toronto"})
        );
    }

    #[test]
    fn test_embedded_object_literal() {
        let catalog = recruiter_catalog();
        let inv = recover("{'keywords': 'Go Engineer',}", &catalog).unwrap();
        assert_eq!(inv.tool_name, "search_linkedin");
        assert_eq!(Value::Object(inv.arguments), json!({"keywords": "Go Engineer"}));
    }

    #[test]
    fn test_plain_prose_yields_nothing() {
        let catalog = recruiter_catalog();
        let prose = "I found 3 strong candidates in Toronto. Would you like me to refine the search \
                     by seniority or (optionally) add Python as a required skill?";
        assert!(recover(prose, &catalog).is_none());
        assert!(recover("", &catalog).is_none());
    }

    #[test]
    fn test_embedded_object_outranks_call_syntax() {
        let catalog = recruiter_catalog();
        let text = r#"search_linkedin(keywords="A") then {"keywords": "B"}"#;
        let inv = recover(text, &catalog).unwrap();
        assert_eq!(inv.arguments["keywords"], "B");
    }

    #[test]
    fn test_call_syntax_outranks_bare_assignment() {
        let catalog = recruiter_catalog();
        let text = r#"default_api.search(keywords="Nurse", limit=5)"#;
        let inv = recover(text, &catalog).unwrap();
        assert_eq!(inv.arguments["limit"], 5);
    }
}

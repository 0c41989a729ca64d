//! 系统提示词组装：按运行时开关在步骤块变体之间做整块替换
//!
//! 期望的块在模板中找不到时返回 TemplateMismatch，不会静默退回默认行为。

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::AgentError;
use crate::prompt::template::{builtin_template, StepVariant};

/// 影响提示词的运行时开关（按请求传入，只读）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeFlags {
    /// 搜索前先展示请求 JSON 并等待用户批准
    #[serde(default, alias = "validate_json")]
    pub require_approval: bool,
}

impl RuntimeFlags {
    pub fn step_variant(&self) -> StepVariant {
        if self.require_approval {
            StepVariant::ApprovalCheckpoint
        } else {
            StepVariant::ExecuteImmediately
        }
    }
}

/// 组装系统提示词
pub fn compose(base_template: &str, flags: &RuntimeFlags) -> Result<String, AgentError> {
    let approval = StepVariant::ApprovalCheckpoint.block();
    if !base_template.contains(&approval) {
        return Err(AgentError::TemplateMismatch(
            StepVariant::ApprovalCheckpoint.key().to_string(),
        ));
    }
    match flags.step_variant() {
        StepVariant::ApprovalCheckpoint => Ok(base_template.to_string()),
        variant => Ok(base_template.replacen(&approval, &variant.block(), 1)),
    }
}

/// 持有基础模板的组装器（可从提示词文件加载）
#[derive(Debug, Clone)]
pub struct PromptComposer {
    base: String,
}

impl Default for PromptComposer {
    fn default() -> Self {
        Self::new(builtin_template())
    }
}

impl PromptComposer {
    pub fn new(base: impl Into<String>) -> Self {
        Self { base: base.into() }
    }

    /// 显式路径优先（读取失败即报错），其次 config/prompts/system.md，最后内置模板
    pub fn load(path: Option<&Path>) -> Result<Self, AgentError> {
        if let Some(p) = path {
            let base = std::fs::read_to_string(p).map_err(|e| {
                AgentError::Configuration(format!("cannot read prompt file {}: {e}", p.display()))
            })?;
            return Ok(Self { base });
        }
        let base = ["config/prompts/system.md", "../config/prompts/system.md"]
            .into_iter()
            .find_map(|p| std::fs::read_to_string(p).ok())
            .unwrap_or_else(builtin_template);
        Ok(Self { base })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn compose(&self, flags: &RuntimeFlags) -> Result<String, AgentError> {
        compose(&self.base, flags)
    }

    /// 启动时校验模板，避免到第一个请求才发现不同步
    pub fn validate(&self) -> Result<(), AgentError> {
        compose(&self.base, &RuntimeFlags::default()).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_approval_keeps_checkpoint() {
        let composer = PromptComposer::default();
        let prompt = composer.compose(&RuntimeFlags { require_approval: true }).unwrap();
        assert_eq!(prompt, composer.base());
        assert!(prompt.contains("[[step:approval_checkpoint]]"));
    }

    #[test]
    fn test_skip_approval_swaps_block() {
        let composer = PromptComposer::default();
        let prompt = composer.compose(&RuntimeFlags::default()).unwrap();
        assert!(prompt.contains(&StepVariant::ExecuteImmediately.block()));
        assert!(!prompt.contains("approval_checkpoint"));
        assert!(prompt.starts_with("You are a Strategic Technical Recruiter"));
    }

    #[test]
    fn test_altered_block_is_template_mismatch() {
        let altered = builtin_template().replace("STEP 1 - Show JSON for Approval", "STEP 1 - Show the JSON");
        let err = compose(&altered, &RuntimeFlags::default()).unwrap_err();
        assert!(matches!(err, AgentError::TemplateMismatch(ref key) if key == "approval_checkpoint"));
        // 需要审批时同样不能静默跳过
        assert!(compose(&altered, &RuntimeFlags { require_approval: true }).is_err());
    }

    #[test]
    fn test_flags_accept_legacy_field_name() {
        let flags: RuntimeFlags = serde_json::from_str(r#"{"validate_json": true}"#).unwrap();
        assert!(flags.require_approval);
        let flags: RuntimeFlags = serde_json::from_str("{}").unwrap();
        assert!(!flags.require_approval);
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("system.md");
        std::fs::write(&path, format!("Custom\n\n{}", StepVariant::ApprovalCheckpoint.block())).unwrap();
        let composer = PromptComposer::load(Some(&path)).unwrap();
        assert!(composer.base().starts_with("Custom"));
        assert!(composer.validate().is_ok());
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = PromptComposer::load(Some(&dir.path().join("missing.md"))).unwrap_err();
        assert!(matches!(err, AgentError::Configuration(ref msg) if msg.contains("missing.md")));
    }
}

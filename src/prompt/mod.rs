//! 系统提示词：内置模板、步骤变体与组装器

pub mod composer;
pub mod template;

pub use composer::{compose, PromptComposer, RuntimeFlags};
pub use template::{builtin_template, StepVariant};

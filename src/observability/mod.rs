//! 可观测性：tracing 订阅器初始化（RUST_LOG 覆盖默认 info）
//!
//! 日志写到 stderr，stdout 只留给回复片段。

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .try_init();
}

//! 可观测性：tracing 订阅器初始化

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// RUST_LOG 优先，否则使用给定级别
fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// 人类可读的日志输出（CLI，写 stderr 以免干扰 --json 输出）
pub fn init(level: &str) {
    let _ = tracing_subscriber::registry()
        .with(env_filter(level))
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .try_init();
}

/// JSON 行日志（HTTP 服务）
pub fn init_json(level: &str) {
    let _ = tracing_subscriber::registry()
        .with(env_filter(level))
        .with(fmt::layer().json().with_current_span(false))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init("warn");
        init_json("debug");
    }
}

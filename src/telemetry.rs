//! 日志初始化
//!
//! 各组件统一通过 `tracing` 宏输出结构化字段；宿主程序调用一次 [`init_tracing`] 即可看到输出。

use tracing_subscriber::EnvFilter;

/// 安装 `fmt` 订阅者；过滤规则优先读 `RUST_LOG`，否则使用 `default_filter`
///
/// 重复调用是安全的：已有全局订阅者时返回 `false`。
pub fn init_tracing(default_filter: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        let _ = init_tracing("warn");
        assert!(!init_tracing("debug"), "第二次初始化不应覆盖已有订阅者");
    }
}

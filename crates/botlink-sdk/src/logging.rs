//! 日志初始化
//!
//! 安装 `tracing-subscriber` 的 fmt 输出，并把 `log` crate 的记录桥接到 `tracing`。
//! 过滤规则取自 `RUST_LOG`，未设置时使用 [`DEFAULT_FILTER`]。

use tracing_subscriber::EnvFilter;

/// 默认过滤规则
pub const DEFAULT_FILTER: &str = "botlink=info";

/// 使用 `RUST_LOG` 或默认规则初始化日志
///
/// 已经安装过全局 subscriber 时返回 `false`。
pub fn init_logging() -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    install(filter)
}

/// 使用指定的过滤规则初始化日志（忽略 `RUST_LOG`）
pub fn init_logging_with(directives: &str) -> bool {
    install(EnvFilter::new(directives))
}

fn install(filter: EnvFilter) -> bool {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        return false;
    }

    // 依赖库通过 log 输出的记录
    if let Err(e) = tracing_log::LogTracer::builder()
        .with_max_level(log::LevelFilter::Trace)
        .init()
    {
        tracing::debug!("log bridge already installed: {}", e);
    }
    true
}

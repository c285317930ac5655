//! 可观测性：tracing 订阅器初始化
//!
//! 默认级别 info（verbose 时 debug），RUST_LOG 可覆盖；日志写 stderr，stdout 留给 CLI 输出。

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    // 测试或嵌入场景下可能已有全局订阅器，重复初始化忽略即可
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init();
}

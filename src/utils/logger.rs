use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// 初始化日志；`RUST_LOG` 优先于 verbose 开关
pub fn init_logger(verbose: bool) {
    let default_filter = if verbose { "papervis=debug" } else { "papervis=info" };

    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init();
}

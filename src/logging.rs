use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// ログ初期化（RUST_LOG 優先、未設定なら info / --verbose で debug）
pub fn init(verbose: bool) {
    let default = if verbose {
        "inspection_wizard=debug,inspection_wizard_common=debug"
    } else {
        "info"
    };

    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .try_init();
}

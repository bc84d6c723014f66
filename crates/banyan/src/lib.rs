pub mod config;
pub mod driver;

pub use config::{Config, LearnerKind};
pub use driver::{build_learners, load_dataset, run, run_to_file};

pub use banyan_core::*;
pub use banyan_error::{BanyanError, BanyanResult, ErrorCode};
pub use banyan_learners::*;

/// Installs the global tracing subscriber once. Filtering follows
/// `RUST_LOG`; defaults to `info`.
pub fn init_logging() {
    use std::sync::Once;
    static INIT_LOGGING: Once = Once::new();

    INIT_LOGGING.call_once(|| {
        use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

        tracing_subscriber::registry()
            .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_level(true)
                    .compact(),
            )
            .init();
    });
}

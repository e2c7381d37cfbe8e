use once_cell::sync::OnceCell;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

static TRACING_INIT: OnceCell<()> = OnceCell::new();

/// Installs a console `tracing` subscriber with local timestamps, filtered
/// by `RUST_LOG`. The runtime never installs one on its own: without a
/// subscriber all events are discarded. Safe to call more than once; only
/// the first call takes effect.
pub fn init_tracing() {
    TRACING_INIT.get_or_init(|| {
        let timer = ChronoLocal::new("%Y-%m-%d %H:%M:%S%.6f".to_string());
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_timer(timer)
            .with_target(true)
            .with_thread_names(true)
            .with_line_number(true);
        tracing_subscriber::registry()
            .with(fmt_layer)
            .with(tracing_subscriber::EnvFilter::from_default_env())
            .init();
    });
}

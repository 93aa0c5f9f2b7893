use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

use crate::config::{EnvConfig, ENV_ARM, ENV_DEBUG, ENV_LOG};
use crate::registry::global;
use crate::version_info;

// initialize tracing subscriber with process context
pub fn init_tracing(filter: Option<&str>) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let filter = filter
        .and_then(|f| tracing_subscriber::EnvFilter::try_new(f).ok())
        .unwrap_or_else(|| "hook_stub=info".into());

    // a harness may already own the global subscriber
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_thread_ids(true)
                .with_target(false),
        )
        .try_init();
}

/// global setup: logging, then environment configuration of the global registry
///
/// runs before any interceptor is registered when the `lifecycle` feature
/// is on; call it by hand otherwise.
pub fn init_hook_stub() {
    static INITIALIZED: AtomicBool = AtomicBool::new(false);
    if INITIALIZED.swap(true, Ordering::AcqRel) {
        return;
    }

    let env_config = EnvConfig::from_env();
    init_tracing(env_config.log_filter.as_deref());

    let span = tracing::info_span!("init", pid = std::process::id());
    let _enter = span.enter();

    info!(version = %version_info(), "START HOOK STUB");
    debug!("parsed environment configuration: {:?}", env_config);

    env_config.apply(global());

    if !env_config.debug && env_config.arm.is_empty() {
        debug!("available environment variables:");
        debug!("  {}=1                 - trace every hooked call", ENV_DEBUG);
        debug!("  {}=hook_stub=debug     - tracing filter", ENV_LOG);
        debug!("  {}=read=3@BEFORE#EIO   - preconfigure interceptors by method", ENV_ARM);
    }

    // backup for hosts that skip destructors
    unsafe {
        libc::atexit(atexit_teardown);
    }
}

/// global teardown: release every library the global registry opened
pub fn teardown_hook_stub() {
    static TEARDOWN_DONE: AtomicBool = AtomicBool::new(false);

    if TEARDOWN_DONE
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
        .is_ok()
    {
        let closed = global().teardown();
        info!(libraries_closed = closed, "END HOOK STUB");
    }
}

extern "C" fn atexit_teardown() {
    teardown_hook_stub();
}

// automatic setup via constructor (disabled during unit tests)
#[cfg(all(feature = "lifecycle", not(test)))]
#[ctor::ctor]
fn auto_init_hook_stub() {
    init_hook_stub();
}

// automatic teardown via destructor (disabled during unit tests)
#[cfg(all(feature = "lifecycle", not(test)))]
#[ctor::dtor]
fn auto_teardown_hook_stub() {
    teardown_hook_stub();
}

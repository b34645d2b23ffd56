use crate::store::{LogStore, StoreConfig};
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber controlled by `RUST_LOG` env var.
/// Safe to call multiple times — only the first call takes effect.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Small store for unit tests: 1024 keys, 64 KiB of log.
pub fn small_store() -> LogStore {
    init_tracing();
    LogStore::new(StoreConfig {
        max_keys: 1024,
        log_size: 64 * 1024,
    })
    .expect("open")
}

/// Store with tight limits for boundary tests.
pub fn tiny_store(max_keys: u32, log_size: u32) -> LogStore {
    init_tracing();
    LogStore::new(StoreConfig { max_keys, log_size }).expect("open")
}

/// Append all values in order and return their keys.
pub fn append_all(store: &LogStore, values: &[&[u8]]) -> Vec<u32> {
    values
        .iter()
        .map(|value| store.append(value).expect("append"))
        .collect()
}

use archestore::{CommandBuffer, ConfigError, Store, StoreConfig};

mod common;

#[test]
fn empty_document_gives_defaults() {
    let config = StoreConfig::from_toml_str("").unwrap();
    assert_eq!(config, StoreConfig::default());
    assert!(!config.reusable_command_buffers);
    assert_eq!(config.worker_threads, 0);
    assert!(config.resolved_worker_threads() >= 1);
}

#[test]
fn partial_document_overrides_named_fields() {
    let config = StoreConfig::from_toml_str(
        r#"
        worker_threads = 6
        reusable_command_buffers = true
        "#,
    )
    .unwrap();
    assert_eq!(config.worker_threads, 6);
    assert_eq!(config.resolved_worker_threads(), 6);
    assert!(config.reusable_command_buffers);
    assert_eq!(config.min_parallel_chunk_len, StoreConfig::default().min_parallel_chunk_len);
}

#[test]
fn malformed_document_is_rejected() {
    assert!(matches!(StoreConfig::from_toml_str("worker_threads = \"many\""), Err(ConfigError::Parse(_))));
    assert!(matches!(StoreConfig::from_toml_str("worker_threads ="), Err(ConfigError::Parse(_))));
}

#[test]
fn config_round_trips_through_toml() {
    let config = StoreConfig {
        initial_entity_capacity: 64,
        worker_threads: 2,
        min_parallel_chunk_len: 32,
        reusable_command_buffers: true,
    };
    let text = toml::to_string(&config).unwrap();
    assert_eq!(StoreConfig::from_toml_str(&text).unwrap(), config);
}

#[test]
fn store_keeps_its_config() {
    let config = StoreConfig { reusable_command_buffers: true, ..StoreConfig::default() };
    let store = Store::with_config(common::schema(), config.clone());
    assert_eq!(store.config(), &config);
    assert!(CommandBuffer::new(&store).is_reusable());
}

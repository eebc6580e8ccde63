use tonband::{BufferSize, DeviceSelection, EngineConfig};

#[test]
fn partial_engine_config_keeps_defaults() {
    let config: EngineConfig = serde_json::from_str(r#"{ "command_capacity": 8, "buffer_size": { "Fixed": 512 } }"#).unwrap();

    assert_eq!(config.command_capacity, 8);
    assert_eq!(config.buffer_size, BufferSize::Fixed(512));
    assert_eq!(config.fixed_buffer_frames(), Some(512));
    assert_eq!(config.retire_capacity, EngineConfig::default().retire_capacity);
    assert_eq!(config.max_block_frames, EngineConfig::default().max_block_frames);
    assert_eq!(config.sample_rate, None);
}

#[test]
fn empty_document_is_the_default_config() {
    let config: EngineConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(config, EngineConfig::default());

    let selection: DeviceSelection = serde_json::from_str("{}").unwrap();
    assert_eq!(selection, DeviceSelection::default());
}

#[test]
fn selection_survives_a_settings_file() {
    let selection = DeviceSelection::new(Some(0), Some(2), Some(1));
    let saved = serde_json::to_string(&selection).unwrap();
    let loaded: DeviceSelection = serde_json::from_str(&saved).unwrap();
    assert_eq!(loaded, selection);
}

use std::io::Write;
use taskserver::{Scheduler, SchedulerConfig, SchedulerError};
use tempfile::NamedTempFile;

#[test]
fn test_config_serialization_roundtrip() {
    let original_config = SchedulerConfig::default()
        .with_name("nightly")
        .with_updates_per_second(20);

    let toml_str = original_config
        .to_toml_string()
        .expect("Should be able to serialize config to TOML");

    assert!(toml_str.contains("updates_per_second = 20"));
    assert!(toml_str.contains("name = \"nightly\""));

    let deserialized_config = SchedulerConfig::from_toml_str(&toml_str)
        .expect("Should be able to deserialize TOML string");
    assert_eq!(original_config, deserialized_config);
}

#[test]
fn test_config_file_operations() {
    let original_config = SchedulerConfig::default().with_event_capacity(64);

    let temp_file = NamedTempFile::new().expect("Should be able to create temporary file");
    let temp_path = temp_file.path();

    original_config
        .to_toml_file(temp_path)
        .expect("Should be able to save config to file");

    let loaded_config =
        SchedulerConfig::from_toml_file(temp_path).expect("Should be able to load config from file");
    assert_eq!(original_config, loaded_config);

    let scheduler = Scheduler::new(loaded_config).expect("Loaded config should be usable");
    assert_eq!(scheduler.config().event_capacity, 64);
}

#[test]
fn test_handwritten_config_file() {
    let mut temp_file = NamedTempFile::new().expect("Should be able to create temporary file");
    writeln!(temp_file, "name = \"batch\"").unwrap();
    writeln!(temp_file, "updates_per_second = 5").unwrap();

    let config = SchedulerConfig::from_toml_file(temp_file.path()).unwrap();

    assert_eq!(config.name, "batch");
    assert_eq!(config.updates_per_second, 5);
    assert_eq!(config.event_capacity, SchedulerConfig::default().event_capacity);
}

#[test]
fn test_invalid_config_file_is_rejected() {
    let mut temp_file = NamedTempFile::new().expect("Should be able to create temporary file");
    writeln!(temp_file, "updates_per_second = 0").unwrap();

    let error = SchedulerConfig::from_toml_file(temp_file.path()).unwrap_err();
    assert_eq!(
        error.downcast_ref::<SchedulerError>(),
        Some(&SchedulerError::InvalidConfig(
            "updates_per_second must be at least 1".to_string()
        ))
    );
}

#[test]
fn test_malformed_toml_is_rejected() {
    let result = SchedulerConfig::from_toml_str("updates_per_second = \"fast\"");
    assert!(result.is_err());

    let missing = SchedulerConfig::from_toml_file("/nonexistent/taskserver.toml");
    assert!(missing.is_err());
}

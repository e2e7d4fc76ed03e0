/*!
 * Unit tests for configuration loading and validation
 */

use std::sync::Arc;

use bookforge::app_config::{BackendSettings, Config};
use bookforge::roles::mock::{MockExporter, MockTranslator};
use bookforge::roles::{Role, RoleRegistry};

use crate::common;

#[test]
fn test_configFile_shouldRoundTripThroughJson() {
    let dir = common::create_temp_dir().unwrap();
    let path = dir.path().join("conf.json");

    let mut config = Config::default();
    config.tasks.push(common::sample_task(&["t1"], &["e1"]));
    config
        .backends
        .insert("t1".to_string(), BackendSettings::default());
    config.write_to_file(&path).unwrap();

    let loaded = Config::from_file(&path).unwrap();
    assert_eq!(loaded.tasks.len(), 1);
    assert_eq!(loaded.tasks[0].label(), "sample");
    assert_eq!(loaded.backends["t1"].max_retries, config.backends["t1"].max_retries);
}

#[test]
fn test_fromFile_invalidTaskUrl_shouldFailValidation() {
    let dir = common::create_temp_dir().unwrap();
    let path = dir.path().join("conf.json");

    let mut config = Config::default();
    let mut task = common::sample_task(&[], &[]);
    task.url = "not a url".to_string();
    config.tasks.push(task);
    config.write_to_file(&path).unwrap();

    assert!(Config::from_file(&path).is_err());
}

#[test]
fn test_validate_badLanguageTag_shouldFail() {
    let mut config = Config::default();
    let mut task = common::sample_task(&[], &[]);
    task.target_lang = "klingon".to_string();
    config.tasks.push(task);

    assert!(config.validate().is_err());
}

#[test]
fn test_validateRoles_unknownTranslator_shouldFailFast() {
    let mut config = Config::default();
    config.tasks.push(common::sample_task(&["missing"], &[]));
    let registry = RoleRegistry::new();

    let err = config.validate_roles(&registry).unwrap_err();
    assert!(err.to_string().contains("translator"));
}

#[test]
fn test_validateRoles_wrongFamily_shouldFailFast() {
    let mut config = Config::default();
    // "t1" is registered, but as an exporter
    config.tasks.push(common::sample_task(&["t1"], &[]));
    let mut registry = RoleRegistry::new();
    registry
        .register(Role::Exporter(Arc::new(MockExporter::new("t1"))))
        .unwrap();

    assert!(config.validate_roles(&registry).is_err());
}

#[test]
fn test_validateRoles_completeChain_shouldPass() {
    let mut config = Config::default();
    config.tasks.push(common::sample_task(&["t1"], &["e1"]));
    let mut registry = RoleRegistry::new();
    registry
        .register(Role::Translator(Arc::new(MockTranslator::working("t1"))))
        .unwrap();
    registry
        .register(Role::Exporter(Arc::new(MockExporter::new("e1"))))
        .unwrap();

    assert!(config.validate_roles(&registry).is_ok());
}

#[test]
fn test_backend_unknownRole_shouldFallBackToDefaults() {
    let config = Config::default();
    let settings = config.backend("anything");
    assert_eq!(settings.max_retries, BackendSettings::default().max_retries);
    assert_eq!(
        settings.remind_interval,
        BackendSettings::default().remind_interval
    );
}

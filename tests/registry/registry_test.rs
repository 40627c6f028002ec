use crate::utils::{synthetic_request, test_config};
use referral_forecast::registry::{MODEL_PREFIX, STATUS_KEY};
use referral_forecast::{
    ForestConfig, LocalObjectStore, ModelRegistry, ObjectStore, RegistryError, TrainingConfig,
    tables_from_request, train,
};
use std::fs;
use tempfile::TempDir;

fn local_registry() -> (TempDir, ModelRegistry<LocalObjectStore>) {
    let dir = TempDir::new().unwrap();
    let store = LocalObjectStore::new(dir.path().join("models")).unwrap();
    (dir, ModelRegistry::new(store))
}

#[test]
fn test_saved_models_are_never_overwritten() {
    let (dir, registry) = local_registry();
    assert_eq!(registry.save_model(b"first", None).unwrap(), 1);

    match registry.save_model(b"second", Some(1)) {
        Err(RegistryError::Overwrite(key)) => assert_eq!(key, format!("{MODEL_PREFIX}1")),
        other => panic!("expected Overwrite, got {other:?}"),
    }
    assert_eq!(registry.load_model(1).unwrap(), b"first");
    assert_eq!(
        fs::read(dir.path().join("models").join("model_1")).unwrap(),
        b"first"
    );
}

#[test]
fn test_current_defaults_to_highest_version() {
    let (_dir, registry) = local_registry();
    assert!(matches!(
        registry.current_version(),
        Err(RegistryError::NoModelsFound)
    ));

    registry.save_model(b"a", None).unwrap();
    registry.save_model(b"b", Some(5)).unwrap();
    registry.save_model(b"c", Some(3)).unwrap();
    assert_eq!(registry.current_version().unwrap(), 5);
    assert_eq!(registry.load_current().unwrap(), (5, b"b".to_vec()));
}

#[test]
fn test_set_current_appends_to_the_status_log() {
    let (_dir, registry) = local_registry();
    registry.save_model(b"a", None).unwrap();
    registry.save_model(b"b", None).unwrap();

    registry.set_current(1).unwrap();
    assert_eq!(registry.current_version().unwrap(), 1);
    registry.set_current(2).unwrap();
    registry.set_current(1).unwrap();

    let versions: Vec<u32> = registry
        .status()
        .unwrap()
        .iter()
        .map(|entry| entry.current_version)
        .collect();
    assert_eq!(versions, vec![1, 2, 1]);
    assert_eq!(registry.current_version().unwrap(), 1);
    assert!(registry.store().get(STATUS_KEY).unwrap().is_some());
}

#[test]
fn test_missing_versions_are_reported() {
    let (_dir, registry) = local_registry();
    registry.save_model(b"a", None).unwrap();

    assert!(matches!(
        registry.set_current(4),
        Err(RegistryError::ModelNotFound(4))
    ));
    assert!(matches!(
        registry.load_model(4),
        Err(RegistryError::ModelNotFound(4))
    ));
    assert!(registry.status().unwrap().is_empty());
}

#[test]
fn test_unsafe_keys_are_rejected() {
    let (_dir, registry) = local_registry();
    for key in ["", ".", "..", "../escape", "nested/key"] {
        assert!(
            matches!(registry.store().put(key, b"x"), Err(RegistryError::InvalidKey(_))),
            "{key:?} should be rejected"
        );
    }
}

#[test]
fn test_current_model_predicts_like_the_trained_one() {
    let (_dir, registry) = local_registry();
    let request = synthetic_request(20);
    let training = TrainingConfig {
        forest: ForestConfig {
            n_estimators: 4,
            ..ForestConfig::default()
        },
        evaluate: false,
        ..TrainingConfig::default()
    };
    let outcome = train(
        tables_from_request(&request).unwrap(),
        &test_config(),
        &training,
    )
    .unwrap();
    assert!(outcome.evaluation.is_none());

    registry.save_model(b"placeholder", None).unwrap();
    let version = registry.save_trained(&outcome.model, None).unwrap();
    assert_eq!(version, 2);
    registry.set_current(version).unwrap();

    let (current, model) = registry.load_current_model().unwrap();
    assert_eq!(current, 2);
    assert_eq!(
        model.predict(tables_from_request(&request).unwrap()).unwrap(),
        outcome.model.predict(tables_from_request(&request).unwrap()).unwrap()
    );
}

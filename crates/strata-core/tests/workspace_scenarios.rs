//! End-to-end workspace scenarios against the file backend

use pretty_assertions::assert_eq;
use serde_json::json;
use std::path::Path;
use strata_core::settings::ProjectSettings;
use strata_core::{
    CancelToken, ConfigMap, ConfigValue, Deployment, RemoveOptions, StateCodec, StrataError,
    UpdateOutcome, WorkspaceManager, WorkspaceOptions,
};
use tempfile::TempDir;

fn options(root: &Path) -> WorkspaceOptions {
    let work_dir = root.join("work");
    std::fs::create_dir_all(&work_dir).unwrap();

    let mut options = WorkspaceOptions::new(work_dir)
        .with_project("app")
        .with_passphrase("correct horse battery staple");
    options.backend.url = Some(root.join("state").display().to_string());
    options.secrets.iterations = Some(16);
    options
}

fn workspace(root: &Path) -> WorkspaceManager {
    WorkspaceManager::open(options(root)).unwrap()
}

#[test]
fn test_export_then_import_into_new_stack() {
    let dir = TempDir::new().unwrap();
    let manager = workspace(dir.path());

    manager.create_stack("dev").unwrap();
    manager
        .set_config("dev", "region", ConfigValue::new("us-west"), false)
        .unwrap();
    manager
        .set_config("dev", "db.password", ConfigValue::secret("hunter2"), true)
        .unwrap();

    let state = manager.export_stack("dev").unwrap();
    manager.create_stack("dev2").unwrap();
    manager.import_stack("dev2", &state).unwrap();

    assert_eq!(
        manager.get_config("dev2", "region", false).unwrap(),
        ConfigValue::new("us-west")
    );
    // dev2 has its own salt; the secret still decrypts
    assert_eq!(
        manager.get_config("dev2", "db.password", true).unwrap(),
        ConfigValue::secret("hunter2")
    );
    assert_ne!(
        manager.stack_settings("dev").unwrap().encryption_salt,
        manager.stack_settings("dev2").unwrap().encryption_salt
    );
}

#[test]
fn test_export_import_export_is_byte_identical() {
    let dir = TempDir::new().unwrap();
    let manager = workspace(dir.path());

    manager.create_stack("dev").unwrap();
    manager
        .set_config("dev", "token", ConfigValue::secret("abc"), false)
        .unwrap();
    manager
        .set_config("dev", "replicas", ConfigValue::new("3"), false)
        .unwrap();

    let mut first = manager.export_stack("dev").unwrap();
    first.extra.insert("checkpoint_note".into(), json!("kept verbatim"));
    let first_bytes = StateCodec::encode(&first).unwrap();

    manager.import_stack("dev", &first).unwrap();
    let second = manager.export_stack("dev").unwrap();

    assert_eq!(StateCodec::encode(&second).unwrap(), first_bytes);
}

#[test]
fn test_remove_dirty_stack_requires_force() {
    let dir = TempDir::new().unwrap();
    let manager = workspace(dir.path());

    manager.create_stack("dev").unwrap();
    manager
        .set_config("dev", "region", ConfigValue::new("eu-central"), false)
        .unwrap();

    let err = manager
        .remove_stack("dev", RemoveOptions::default())
        .unwrap_err();
    assert!(matches!(err, StrataError::DirtyState(_)));
    assert_eq!(manager.list_stacks(false).unwrap().len(), 1);

    manager
        .remove_stack(
            "dev",
            RemoveOptions {
                force: true,
                preserve_config: false,
            },
        )
        .unwrap();

    assert!(manager.select_stack("dev").unwrap_err().is_not_found());
    assert!(manager.list_stacks(false).unwrap().is_empty());
    assert!(!dir.path().join("work/Strata.dev.toml").exists());
}

#[test]
fn test_set_all_is_all_or_nothing() {
    let dir = TempDir::new().unwrap();
    let manager = workspace(dir.path());
    manager.create_stack("dev").unwrap();
    manager
        .set_config("dev", "port", ConfigValue::new("80"), false)
        .unwrap();
    let before = manager.get_all_config("dev").unwrap();

    let mut batch = ConfigMap::new();
    batch.insert("a".into(), ConfigValue::new("1"));
    batch.insert("b".into(), ConfigValue::new("2"));
    batch.insert("port.inner".into(), ConfigValue::new("3"));
    batch.insert("d".into(), ConfigValue::new("4"));
    batch.insert("e".into(), ConfigValue::new("5"));

    let err = manager.set_all_config("dev", &batch, true).unwrap_err();
    assert!(matches!(err, StrataError::InvalidPath { .. }));
    assert_eq!(manager.get_all_config("dev").unwrap(), before);

    // A fresh workspace reads the same settings file
    drop(manager);
    let reopened = workspace(dir.path());
    assert_eq!(reopened.get_all_config("dev").unwrap(), before);
}

#[test]
fn test_mutations_conflict_during_update() {
    let dir = TempDir::new().unwrap();
    let manager = workspace(dir.path());
    manager.create_stack("dev").unwrap();
    manager.set_tag("dev", "owner", "ops").unwrap();
    let config_before = manager.get_all_config("dev").unwrap();

    manager
        .update("dev", &CancelToken::new(), |_| {
            let set = manager.set_config("dev", "region", ConfigValue::new("x"), false);
            assert!(matches!(set, Err(StrataError::Conflict(_))));

            let tag = manager.set_tag("dev", "owner", "someone-else");
            assert!(matches!(tag, Err(StrataError::Conflict(_))));

            let export = manager.export_stack("dev");
            assert!(matches!(export, Err(StrataError::Conflict(_))));

            // Reads still work
            assert_eq!(manager.get_tag("dev", "owner").unwrap(), "ops");
            assert!(manager.stack().unwrap().unwrap().update_in_progress.unwrap());
            Ok(UpdateOutcome::default())
        })
        .unwrap();

    assert_eq!(manager.get_all_config("dev").unwrap(), config_before);
    assert_eq!(manager.get_tag("dev", "owner").unwrap(), "ops");
    manager
        .set_config("dev", "region", ConfigValue::new("x"), false)
        .unwrap();
}

#[test]
fn test_cancel_after_update_records_nothing() {
    let dir = TempDir::new().unwrap();
    let manager = workspace(dir.path());
    manager.create_stack("dev").unwrap();

    let cancel = CancelToken::new();
    let result = manager.update("dev", &cancel, |_| {
        cancel.cancel();
        Ok(UpdateOutcome {
            resources: Some(vec![json!({ "urn": "r1" })]),
            outputs: None,
        })
    });

    assert!(matches!(result, Err(StrataError::Cancelled(_))));
    let state = manager.export_stack("dev").unwrap();
    assert_eq!(state.resource_count(), 0);
}

#[test]
fn test_secrets_only_persist_as_ciphertext() {
    let dir = TempDir::new().unwrap();
    let manager = workspace(dir.path());
    manager.create_stack("dev").unwrap();
    manager
        .set_config("dev", "apiKey", ConfigValue::secret("plaintext-api-key"), false)
        .unwrap();
    manager
        .update("dev", &CancelToken::new(), |_| Ok(UpdateOutcome::default()))
        .unwrap();

    let settings = std::fs::read_to_string(dir.path().join("work/Strata.dev.toml")).unwrap();
    let snapshot = std::fs::read_to_string(dir.path().join("state/app/dev.json")).unwrap();
    let exported = StateCodec::encode(&manager.export_stack("dev").unwrap()).unwrap();

    assert!(!settings.contains("plaintext-api-key"));
    assert!(!snapshot.contains("plaintext-api-key"));
    assert!(!String::from_utf8(exported).unwrap().contains("plaintext-api-key"));
    assert!(snapshot.contains("secure"));
}

#[test]
fn test_import_validates_before_mutating() {
    let dir = TempDir::new().unwrap();
    let manager = workspace(dir.path());
    manager.create_stack("dev").unwrap();
    manager
        .set_config("dev", "region", ConfigValue::new("us-east"), false)
        .unwrap();
    let before = manager.export_stack("dev").unwrap();

    // Missing stack is reported before the document is looked at
    let garbage = Deployment::default();
    assert!(manager.import_stack("ghost", &garbage).unwrap_err().is_not_found());

    let future = Deployment::new(99, json!({ "manifest": {} }));
    assert!(matches!(
        manager.import_stack("dev", &future),
        Err(StrataError::Encode(_))
    ));

    let mut bad_body = before.clone();
    bad_body.deployment = Some(json!(["not", "an", "object"]));
    assert!(manager.import_stack("dev", &bad_body).is_err());

    assert_eq!(manager.export_stack("dev").unwrap(), before);
}

#[test]
fn test_import_upgrades_legacy_documents() {
    let dir = TempDir::new().unwrap();
    let manager = workspace(dir.path());
    manager.create_stack("dev").unwrap();

    let legacy = StateCodec::decode(
        br#"{"version": 1, "deployment": {"config": {"app:tier": "gold"}, "resources": [{"urn": "r"}]}}"#,
    )
    .unwrap();
    manager.import_stack("dev", &legacy).unwrap();

    let state = manager.export_stack("dev").unwrap();
    assert_eq!(state.version, Some(strata_core::CURRENT_VERSION));
    assert_eq!(state.resource_count(), 1);
    assert_eq!(manager.get_config("dev", "tier", false).unwrap().value, "gold");
}

#[test]
fn test_decode_rejects_future_versions() {
    let err = StateCodec::decode(br#"{"version": 7, "deployment": {}}"#).unwrap_err();
    assert!(matches!(err, StrataError::Decode(_)));
}

#[test]
fn test_project_mismatch_on_save() {
    let dir = TempDir::new().unwrap();
    let manager = workspace(dir.path());

    let err = manager
        .save_project_settings(&ProjectSettings::new("someone-elses-project"))
        .unwrap_err();
    assert!(matches!(
        err,
        StrataError::ProjectMismatch { ref expected, .. } if expected == "app"
    ));
}

#[test]
fn test_state_survives_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let manager = workspace(dir.path());
        manager.create_stack("dev").unwrap();
        manager.create_stack("prod").unwrap();
        manager.select_stack("dev").unwrap();
        manager.set_tag("prod", "tier", "gold").unwrap();
        manager
            .set_config("prod", "replicas", ConfigValue::new("5"), false)
            .unwrap();
    }

    let manager = workspace(dir.path());
    assert_eq!(manager.stack().unwrap().unwrap().name, "dev");
    assert_eq!(manager.get_tag("prod", "tier").unwrap(), "gold");
    assert_eq!(manager.get_config("prod", "replicas", false).unwrap().value, "5");
    assert_eq!(manager.list_stacks(false).unwrap().len(), 2);
}

#[test]
fn test_reserved_secure_key_keeps_stack_readable() {
    let dir = TempDir::new().unwrap();
    {
        let manager = workspace(dir.path());
        manager.create_stack("dev").unwrap();
        manager
            .set_config("dev", "tls.port", ConfigValue::new("443"), true)
            .unwrap();

        let err = manager
            .set_config("dev", "tls.secure", ConfigValue::new("true"), true)
            .unwrap_err();
        assert!(matches!(err, StrataError::InvalidPath { .. }));
        let err = manager
            .set_config("dev", "cert.secure", ConfigValue::new("true"), true)
            .unwrap_err();
        assert!(matches!(err, StrataError::InvalidPath { .. }));
    }

    let manager = workspace(dir.path());
    assert_eq!(
        manager.get_config("dev", "tls.port", true).unwrap(),
        ConfigValue::new("443")
    );
    assert!(manager.get_config("dev", "cert", false).unwrap_err().is_not_found());

    let exported = manager.export_stack("dev").unwrap();
    manager.import_stack("dev", &exported).unwrap();
}

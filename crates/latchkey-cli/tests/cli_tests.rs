//! Offline store commands, through the library and through the binary

use latchkey_cli::{export_store, import_store, init_store, migrate_store, ClientError};
use latchkey_core::{
    Error, LegacyDatabase, Login, ScryptSettings, Session, StoreConfig, StoreFormat,
};
use latchkey_daemon::DaemonConfig;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

fn fast(mut config: StoreConfig) -> StoreConfig {
    config.scrypt = ScryptSettings {
        log_n: 4,
        r: 8,
        p: 1,
    };
    config
}

fn store_config(dir: &Path) -> StoreConfig {
    fast(StoreConfig::local(StoreFormat::Derived, dir.join("store")))
}

#[test]
fn test_init_then_export_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let config = store_config(dir.path());
    init_store(&config, "pw").unwrap();

    let json: serde_json::Value = serde_json::from_str(&export_store(&config, "pw").unwrap()).unwrap();
    assert_eq!(json["version"], 0);
    assert!(json["passwords"].as_object().unwrap().is_empty());
}

#[test]
fn test_export_with_wrong_password_fails_to_decode() {
    let dir = tempfile::tempdir().unwrap();
    let config = store_config(dir.path());
    init_store(&config, "pw").unwrap();

    assert!(matches!(
        export_store(&config, "nope"),
        Err(ClientError::Core(Error::Decode(_)))
    ));
}

#[test]
fn test_import_replaces_whole_store() {
    let dir = tempfile::tempdir().unwrap();
    let config = store_config(dir.path());

    let mut session = Session::new(config.clone());
    session.log_in("pw", false).unwrap();
    session.init_empty();
    session.add_password("old", "gone", true).unwrap();

    let export = dir.path().join("export.json");
    std::fs::write(
        &export,
        r#"{"version": 0, "passwords": {"mail": {"password": "x"}, "bank": {"password": "y"}}}"#,
    )
    .unwrap();
    assert_eq!(import_store(&config, "pw", &export).unwrap(), 2);

    let mut session = Session::new(config);
    session.log_in("pw", true).unwrap();
    assert_eq!(
        session.list_password_names().unwrap(),
        vec!["bank".to_string(), "mail".to_string()]
    );
}

#[test]
fn test_import_rejects_malformed_export() {
    let dir = tempfile::tempdir().unwrap();
    let config = store_config(dir.path());
    let export = dir.path().join("export.json");
    std::fs::write(&export, "not json").unwrap();

    assert!(matches!(
        import_store(&config, "pw", &export),
        Err(ClientError::Serialization(_))
    ));
    assert!(!config.store_path.exists());
}

fn write_legacy(path: &Path, password: &str, logins: &[(&str, &str)]) {
    let config = fast(StoreConfig::local(StoreFormat::Legacy, path));
    let database = LegacyDatabase::new(config.build_pipeline(password).unwrap());
    for (name, data) in logins {
        database.add_login(Login::new(*name, *data));
    }
    database.save().unwrap();
}

#[test]
fn test_migrate_into_new_store() {
    let dir = tempfile::tempdir().unwrap();
    let legacy = dir.path().join("legacy.db");
    write_legacy(&legacy, "old-pw", &[("mail", "x\nwork account"), ("bank", "1234")]);

    let config = store_config(dir.path());
    assert_eq!(migrate_store(&config, "new-pw", &legacy, "old-pw").unwrap(), 2);

    let mut session = Session::new(config);
    session.log_in("new-pw", true).unwrap();
    assert_eq!(session.get_password("mail").unwrap(), "x\nwork account");
    assert_eq!(session.get_password("bank").unwrap(), "1234");
}

#[test]
fn test_migrate_merges_into_existing_store() {
    let dir = tempfile::tempdir().unwrap();
    let legacy = dir.path().join("legacy.db");
    write_legacy(&legacy, "old-pw", &[("mail", "legacy")]);

    let config = store_config(dir.path());
    let mut session = Session::new(config.clone());
    session.log_in("pw", false).unwrap();
    session.init_empty();
    session.add_password("mail", "current", true).unwrap();

    migrate_store(&config, "pw", &legacy, "old-pw").unwrap();

    let mut session = Session::new(config);
    session.log_in("pw", true).unwrap();
    assert_eq!(
        session.get_password("mail").unwrap(),
        "current\n###\nlegacy"
    );
}

#[test]
fn test_migrate_with_wrong_legacy_password_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let legacy = dir.path().join("legacy.db");
    write_legacy(&legacy, "old-pw", &[("mail", "legacy")]);

    let config = store_config(dir.path());
    assert!(matches!(
        migrate_store(&config, "pw", &legacy, "wrong"),
        Err(ClientError::Core(Error::Decode(_)))
    ));
    assert!(!config.store_path.exists());
}

/// Config file for the binary, with a cheap scrypt cost
fn write_config(dir: &Path) -> (DaemonConfig, PathBuf) {
    let mut config = DaemonConfig::in_dir(dir);
    config.store = store_config(dir);
    let path = dir.join("config.json");
    config.save(&path).unwrap();
    (config, path)
}

fn latchkey(config_path: &Path, args: &[&str], stdin: &str) -> std::process::Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_latchkey"))
        .arg("--config")
        .arg(config_path)
        .arg("--password-stdin")
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(stdin.as_bytes())
        .unwrap();
    child.wait_with_output().unwrap()
}

#[test]
fn test_binary_init_import_export() {
    let dir = tempfile::tempdir().unwrap();
    let (config, config_path) = write_config(dir.path());

    let output = latchkey(&config_path, &["init"], "pw\n");
    assert!(output.status.success(), "{:?}", output);
    assert!(config.store.store_path.exists());

    let export = dir.path().join("export.json");
    std::fs::write(&export, r#"{"version": 0, "passwords": {"mail": {"password": "x"}}}"#).unwrap();
    let output = latchkey(&config_path, &["import", export.to_str().unwrap()], "pw\n");
    assert!(output.status.success(), "{:?}", output);

    let output = latchkey(&config_path, &["export"], "pw\n");
    assert!(output.status.success(), "{:?}", output);
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["passwords"]["mail"]["password"], "x");
}

#[test]
fn test_binary_reports_wrong_password() {
    let dir = tempfile::tempdir().unwrap();
    let (_, config_path) = write_config(dir.path());

    assert!(latchkey(&config_path, &["init"], "pw\n").status.success());
    let output = latchkey(&config_path, &["export"], "wrong\n");
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
}

#[test]
fn test_binary_status_without_daemon() {
    let dir = tempfile::tempdir().unwrap();
    let (_, config_path) = write_config(dir.path());

    let output = latchkey(&config_path, &["status"], "");
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("not running"));
}

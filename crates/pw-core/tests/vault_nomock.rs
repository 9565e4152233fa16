//! Credential vault against a real file-backed secret store.

use pw_common::{LogType, Secret};
use pw_config::{ConfigStore, HashCaps};
use pw_core::vault::{CredentialVault, FileSecretStore, HashParameters, StaticHostProbe};
use pw_core::Journal;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn journal(dir: &Path) -> Arc<Journal> {
    let config = ConfigStore::load(dir.join("config.json")).unwrap();
    Arc::new(Journal::open(dir.join("log.txt"), config).unwrap())
}

fn small_caps() -> HashCaps {
    HashCaps {
        memory_cost_cap: 256,
        time_cost_cap: 1,
        parallelism_cost_cap: 2,
    }
}

fn file_vault(dir: &Path, journal: Arc<Journal>) -> CredentialVault {
    CredentialVault::new(
        journal,
        Box::new(FileSecretStore::new(dir.join("secrets.json"))),
        Box::new(StaticHostProbe::new(4, 16_384, 3000.0)),
        small_caps(),
    )
    .unwrap()
}

#[test]
fn low_end_host_gets_lowest_tiers() {
    let tmp = TempDir::new().unwrap();
    let vault = CredentialVault::new(
        journal(tmp.path()),
        Box::new(pw_core::vault::MemorySecretStore::new()),
        Box::new(StaticHostProbe::new(2, 2048, 1000.0)),
        HashCaps::default(),
    )
    .unwrap();

    let params = vault.tune_parameters().unwrap();
    assert_eq!(
        params,
        HashParameters {
            time_cost: 1,
            memory_cost: 102_400,
            parallelism: 2,
        }
    );
}

#[test]
fn hash_survives_new_vault_instance() {
    let tmp = TempDir::new().unwrap();
    let journal = journal(tmp.path());
    let secret = Secret::from("open sesame");

    file_vault(tmp.path(), journal.clone()).encrypt(&secret).unwrap();

    let reopened = file_vault(tmp.path(), journal);
    assert!(reopened.verify(&secret).unwrap());
    assert!(!reopened.verify(&Secret::from("open barley")).unwrap());
}

#[test]
fn stored_hash_is_phc_and_not_the_secret() {
    let tmp = TempDir::new().unwrap();
    let vault = file_vault(tmp.path(), journal(tmp.path()));
    vault.encrypt(&Secret::from("plaintext-marker")).unwrap();

    let raw = std::fs::read_to_string(tmp.path().join("secrets.json")).unwrap();
    assert!(!raw.contains("plaintext-marker"));
    let map: std::collections::BTreeMap<String, String> = serde_json::from_str(&raw).unwrap();
    assert!(map["system/sudo_hashed"].starts_with("$argon2id$v=19$m=256,t=1,p=2$"));
}

#[cfg(unix)]
#[test]
fn secrets_file_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let tmp = TempDir::new().unwrap();
    let vault = file_vault(tmp.path(), journal(tmp.path()));
    vault
        .remember_escalation_secret(&Secret::from("pw"))
        .unwrap();

    let mode = std::fs::metadata(tmp.path().join("secrets.json"))
        .unwrap()
        .permissions()
        .mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[test]
fn verify_records_outcome_without_secret() {
    let tmp = TempDir::new().unwrap();
    let journal = journal(tmp.path());
    let vault = file_vault(tmp.path(), journal.clone());
    vault.encrypt(&Secret::from("needle-secret")).unwrap();
    assert!(!vault.verify(&Secret::from("wrong-guess")).unwrap());

    let last = journal.entries().unwrap().pop().unwrap();
    assert_eq!(last.log_type, LogType::Action);
    assert_eq!(last.field("output"), Some("false"));

    let raw = journal.read_raw().unwrap();
    assert!(!raw.contains("needle-secret"));
    assert!(!raw.contains("wrong-guess"));
}

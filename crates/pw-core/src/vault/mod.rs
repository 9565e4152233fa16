//! Credential vault: Argon2id hashing of the escalation secret.
//!
//! Costs are tuned per call from host probes ([`probe`]) and clamped to the
//! operator's caps ([`params`]). Only the PHC hash string is persisted by
//! [`CredentialVault::encrypt`]; the raw secret is stored solely when the
//! caller asks for it to be remembered for later escalation.

pub mod params;
pub mod probe;
pub mod store;

pub use params::HashParameters;
pub use probe::{HostCapabilities, HostProbe, ProcHostProbe, StaticHostProbe};
#[cfg(feature = "keyring")]
pub use store::KeyringSecretStore;
pub use store::{FileSecretStore, MemorySecretStore, SecretAccount, SecretStore};

use crate::journal::Journal;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Version};
use pw_common::{Error, LogType, Result, Secret};
use pw_config::HashCaps;
use std::sync::Arc;
use tracing::{debug, instrument};

const COMPONENT: &str = "vault";

/// Hashes, verifies and stores the escalation secret.
#[derive(Debug)]
pub struct CredentialVault {
    journal: Arc<Journal>,
    store: Box<dyn SecretStore>,
    probe: Box<dyn HostProbe>,
    caps: HashCaps,
}

impl CredentialVault {
    pub fn new(
        journal: Arc<Journal>,
        store: Box<dyn SecretStore>,
        probe: Box<dyn HostProbe>,
        caps: HashCaps,
    ) -> Result<Self> {
        let vault = CredentialVault {
            journal,
            store,
            probe,
            caps,
        };
        vault.log_action("initialize credential vault", "new", "0")?;
        Ok(vault)
    }

    /// Choose hash costs for this machine.
    #[instrument(skip(self))]
    pub fn tune_parameters(&self) -> Result<HashParameters> {
        let host = self.probe.probe();
        let params = HashParameters::tune(&host, &self.caps);
        debug!(?host, ?params, "tuned hash parameters");
        self.log_action(
            "adjust Argon2 parameters to machine specs",
            "tune_parameters",
            &format!(
                "time_cost={} memory_cost={} parallelism={}",
                params.time_cost, params.memory_cost, params.parallelism
            ),
        )?;
        Ok(params)
    }

    /// Hash `secret` with freshly tuned costs and store the hash.
    #[instrument(skip_all)]
    pub fn encrypt(&self, secret: &Secret) -> Result<()> {
        if secret.is_empty() {
            return Err(self.fail(
                Error::CredentialUnavailable {
                    reason: "refusing to hash an empty secret".to_string(),
                },
                "encrypt",
            ));
        }

        let params = self.tune_parameters()?;
        let hash = params
            .to_argon2()
            .and_then(|p| hash_secret(secret, p))
            .map_err(|e| self.fail(e, "encrypt"))?;

        self.store
            .set(SecretAccount::EscalationHash, &Secret::from(hash))
            .map_err(|e| self.fail(e, "encrypt"))?;

        self.log_action("hash and store escalation secret", "encrypt", "0")?;
        Ok(())
    }

    /// Check `candidate` against the stored hash in constant time.
    #[instrument(skip_all)]
    pub fn verify(&self, candidate: &Secret) -> Result<bool> {
        let stored = self
            .store
            .get(SecretAccount::EscalationHash)
            .map_err(|e| self.fail(e, "verify"))?
            .ok_or_else(|| {
                self.fail(
                    Error::CredentialUnavailable {
                        reason: "no secret hash has been stored".to_string(),
                    },
                    "verify",
                )
            })?;

        let is_valid = verify_secret(candidate, &stored).map_err(|e| self.fail(e, "verify"))?;

        self.log_action(
            "check if provided escalation secret is valid",
            "verify",
            if is_valid { "true" } else { "false" },
        )?;
        Ok(is_valid)
    }

    /// Store the raw escalation secret for later `start` calls, plus its hash.
    pub fn remember_escalation_secret(&self, secret: &Secret) -> Result<()> {
        self.encrypt(secret)?;
        self.store
            .set(SecretAccount::Escalation, secret)
            .map_err(|e| self.fail(e, "remember_escalation_secret"))?;
        self.log_action(
            "store escalation secret",
            "remember_escalation_secret",
            "0",
        )?;
        Ok(())
    }

    /// The remembered escalation secret, if any.
    pub fn escalation_secret(&self) -> Result<Option<Secret>> {
        self.store
            .get(SecretAccount::Escalation)
            .map_err(|e| self.fail(e, "escalation_secret"))
    }

    /// Whether a hash is stored.
    pub fn has_hash(&self) -> Result<bool> {
        Ok(self
            .store
            .get(SecretAccount::EscalationHash)
            .map_err(|e| self.fail(e, "has_hash"))?
            .is_some())
    }

    /// Remove the raw secret and its hash. Returns whether anything was removed.
    pub fn forget(&self) -> Result<bool> {
        let mut removed = false;
        for account in [SecretAccount::Escalation, SecretAccount::EscalationHash] {
            removed |= self
                .store
                .delete(account)
                .map_err(|e| self.fail(e, "forget"))?;
        }
        self.log_action(
            "forget escalation secret",
            "forget",
            if removed { "removed" } else { "nothing stored" },
        )?;
        Ok(removed)
    }

    fn log_action(&self, action: &str, operation: &str, output: &str) -> Result<u64> {
        let invoker = format!("component : {}\noperation : {}", COMPONENT, operation);
        self.journal.write(
            LogType::Action,
            [
                ("action", action),
                ("invoker", invoker.as_str()),
                ("output", output),
            ],
        )
    }

    fn fail(&self, err: Error, operation: &str) -> Error {
        self.journal
            .report(err, &format!("{}::{}", COMPONENT, operation))
    }
}

fn hash_secret(secret: &Secret, params: argon2::Params) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password(secret.expose().as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| Error::Hash(e.to_string()))
}

/// Costs and salt come from the PHC string itself.
fn verify_secret(candidate: &Secret, stored: &Secret) -> Result<bool> {
    let parsed = PasswordHash::new(stored.expose())
        .map_err(|e| Error::Hash(format!("stored hash is malformed: {}", e)))?;
    match Argon2::default().verify_password(candidate.expose().as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(Error::Hash(e.to_string())),
    }
}

use std::{collections::BTreeSet, fmt, path::PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaTemplate {
    pub name: String,
    pub version: String,
    pub attr_names: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaRecord {
    pub id: String,
    pub issuer_id: String,
    pub name: String,
    pub version: String,
    pub attr_names: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialDefinitionRecord {
    pub id: String,
    pub schema_id: String,
    pub issuer_id: String,
    pub tag: String,
    pub support_revocation: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevocationRegistryDefinition {
    pub id: String,
    pub issuer_id: String,
    pub cred_def_id: String,
    pub tag: String,
    pub max_cred_num: u32,
    pub tails_hash: String,
    pub tails_location: PathBuf,
    pub tails_file_url: Option<Url>,
}

impl RevocationRegistryDefinition {
    pub fn is_valid_index(&self, index: u32) -> bool {
        (1..=self.max_cred_num).contains(&index)
    }
}

/// Revocation state of a registry. Indexes only ever get added to `revoked_indexes`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevocationStatusList {
    pub rev_reg_def_id: String,
    pub issuer_id: String,
    pub revoked_indexes: BTreeSet<u32>,
    pub version: u64,
    pub timestamp: i64,
}

impl RevocationStatusList {
    pub fn new(rev_reg_def_id: &str, issuer_id: &str) -> Self {
        Self {
            rev_reg_def_id: rev_reg_def_id.to_string(),
            issuer_id: issuer_id.to_string(),
            revoked_indexes: BTreeSet::new(),
            version: 1,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn is_revoked(&self, index: u32) -> bool {
        self.revoked_indexes.contains(&index)
    }

    /// Marks `indexes` as revoked. Either all indexes are applied or none. Returns whether the
    /// list changed; a new version is only produced when it did.
    pub fn revoke(&mut self, indexes: &[u32], max_cred_num: u32) -> Result<bool, String> {
        if let Some(index) = indexes
            .iter()
            .find(|index| !(1..=max_cred_num).contains(*index))
        {
            return Err(format!(
                "revocation index {} is outside of registry range 1..={}",
                index, max_cred_num
            ));
        }
        let before = self.revoked_indexes.len();
        self.revoked_indexes.extend(indexes.iter().copied());
        let changed = self.revoked_indexes.len() != before;
        if changed {
            self.version += 1;
            self.timestamp = chrono::Utc::now().timestamp();
        }
        Ok(changed)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationState {
    Pending,
    Finished,
    Failed,
}

/// What the ledger reports back for a registration request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationOutcome {
    pub state: RegistrationState,
    pub id: Option<String>,
    pub reason: Option<String>,
}

impl RegistrationOutcome {
    pub fn finished(id: &str) -> Self {
        Self {
            state: RegistrationState::Finished,
            id: Some(id.to_string()),
            reason: None,
        }
    }

    pub fn pending(id: &str) -> Self {
        Self {
            state: RegistrationState::Pending,
            id: Some(id.to_string()),
            reason: None,
        }
    }

    pub fn failed(reason: &str) -> Self {
        Self {
            state: RegistrationState::Failed,
            id: None,
            reason: Some(reason.to_string()),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state == RegistrationState::Finished
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegistrationStep {
    Schema,
    CredentialDefinition,
    RevocationRegistryDefinition,
    RevocationStatusList,
}

impl fmt::Display for RegistrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let step = match self {
            RegistrationStep::Schema => "schema",
            RegistrationStep::CredentialDefinition => "credential definition",
            RegistrationStep::RevocationRegistryDefinition => "revocation registry definition",
            RegistrationStep::RevocationStatusList => "revocation status list",
        };
        f.write_str(step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revoked_indexes_only_grow() {
        let mut list = RevocationStatusList::new("rev-reg", "did:example:issuer");
        assert!(list.revoke(&[2], 10).unwrap());
        assert_eq!(list.version, 2);

        let mut sizes = vec![list.revoked_indexes.len()];
        let batches: [&[u32]; 4] = [&[2], &[5, 2], &[], &[5]];
        for indexes in batches {
            list.revoke(indexes, 10).unwrap();
            sizes.push(list.revoked_indexes.len());
        }
        assert!(sizes.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(list.revoked_indexes, BTreeSet::from([2, 5]));
    }

    #[test]
    fn test_revoking_again_keeps_version() {
        let mut list = RevocationStatusList::new("rev-reg", "did:example:issuer");
        list.revoke(&[1, 3], 10).unwrap();
        let version = list.version;
        assert!(!list.revoke(&[3], 10).unwrap());
        assert_eq!(list.version, version);
        assert!(list.is_revoked(1));
        assert!(!list.is_revoked(2));
    }

    #[test]
    fn test_out_of_range_index_is_rejected_atomically() {
        let mut list = RevocationStatusList::new("rev-reg", "did:example:issuer");
        assert!(list.revoke(&[4, 11], 10).is_err());
        assert!(list.revoke(&[0], 10).is_err());
        assert!(list.revoked_indexes.is_empty());
        assert_eq!(list.version, 1);
    }

    #[test]
    fn test_registration_state_serializes_lowercase() {
        let outcome = RegistrationOutcome::pending("schema-id");
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["state"], "pending");
        assert_eq!(
            RegistrationStep::RevocationStatusList.to_string(),
            "revocation status list"
        );
    }
}

use crate::error::Result;
use crate::id::{Address, DeviceAddress, UnitId, UserId};
use crate::records::AttestedProfile;
use blake3::Hasher;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Ledger app name of attestation messages.
pub const ATTESTATION_APP: &str = "attestation";

/// Blinded source values the user keeps privately for a hidden profile.
pub type SourceProfile = BTreeMap<String, (Value, String)>;

fn hash_hex(parts: &[&str]) -> String {
    let mut hasher = Hasher::new();
    for part in parts {
        hasher.update(&(part.len() as u64).to_le_bytes());
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize().as_bytes())
}

fn random_blinding() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

impl AttestedProfile {
    /// Profile fields as they appear in the attestation claim.
    pub fn claim_fields(&self) -> BTreeMap<String, Value> {
        let mut fields = BTreeMap::new();
        fields.insert("forum_id".to_string(), Value::from(self.forum_user_id));
        fields.insert("forum_username".to_string(), Value::from(self.forum_username.clone()));
        fields.insert("forum_rank".to_string(), Value::from(self.rank.clone()));
        fields.insert("forum_rank_index".to_string(), Value::from(self.rank_index));
        fields.insert("forum_activity".to_string(), Value::from(self.activity));
        fields.insert("forum_posts".to_string(), Value::from(self.posts));
        fields
    }

    /// Salted hash of the claimed profile fields.
    pub fn user_id(&self, salt: &str) -> UserId {
        let mut parts = Vec::new();
        let fields = self.claim_fields();
        let rendered: Vec<(String, String)> =
            fields.iter().map(|(k, v)| (k.clone(), v.to_string())).collect();
        for (key, value) in &rendered {
            parts.push(key.as_str());
            parts.push(value.as_str());
        }
        parts.push(salt);
        UserId::from_digest(hash_hex(&parts))
    }
}

/// The `profile` object of an attestation payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

/// Payload of an attestation message posted by the attestor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttestationPayload {
    pub address: Address,
    pub profile: ProfileClaims,
}

impl AttestationPayload {
    /// Build the payload for `profile`. Private profiles are replaced by a hash of
    /// blinded fields; the blinded source is returned for the user to keep.
    pub fn build(profile: &AttestedProfile, salt: &str) -> (Self, Option<SourceProfile>) {
        let user_id = profile.user_id(salt);
        let fields = profile.claim_fields();

        if profile.is_public {
            let payload = Self {
                address: profile.user_address.clone(),
                profile: ProfileClaims {
                    user_id: Some(user_id),
                    fields,
                },
            };
            return (payload, None);
        }

        let mut hidden = BTreeMap::new();
        let mut source = SourceProfile::new();
        for (field, value) in fields {
            let blinding = random_blinding();
            let rendered = value.to_string();
            hidden.insert(field.clone(), hash_hex(&[&rendered, &blinding]));
            source.insert(field, (value, blinding));
        }
        let flattened: Vec<&str> = hidden
            .iter()
            .flat_map(|(k, v)| [k.as_str(), v.as_str()])
            .collect();
        let profile_hash = hash_hex(&flattened);

        let mut claim_fields = BTreeMap::new();
        claim_fields.insert("profile_hash".to_string(), Value::from(profile_hash));
        let payload = Self {
            address: profile.user_address.clone(),
            profile: ProfileClaims {
                user_id: Some(user_id),
                fields: claim_fields,
            },
        };
        (payload, Some(source))
    }

    pub fn parse(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// An attestation found on the ledger, joined with the local session that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttestationRecord {
    /// Address the attestation was posted about.
    pub address: Address,
    pub attestor_address: Address,
    pub attestation_unit: UnitId,
    pub app: String,
    /// Raw payload JSON as posted.
    pub payload: String,
    /// User address of the local session that requested the attestation.
    pub user_address: Address,
    pub device_address: DeviceAddress,
    pub forum_user_id: u64,
    /// Accepted payment that paid for the attestation, if proven by payment.
    pub payment_unit: Option<UnitId>,
}

/// One native-asset transfer input of a unit, with its source unit's ledger position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AncestorInput {
    pub address: Address,
    pub src_unit: UnitId,
    pub main_chain_index: u64,
}

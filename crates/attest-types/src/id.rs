use crate::error::{Result, TypesError};
use blake3::Hasher;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of a ledger address: 160 bits of hash rendered in base32.
pub const ADDRESS_LEN: usize = 32;

const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

fn is_base32(s: &str) -> bool {
    s.bytes().all(|b| BASE32_ALPHABET.contains(&b))
}

/// Encode the first 20 bytes of `digest` as 32 base32 characters.
fn base32_chash(digest: &[u8; 32]) -> String {
    let mut out = String::with_capacity(ADDRESS_LEN);
    let mut buffer: u64 = 0;
    let mut bits = 0;
    for byte in &digest[..20] {
        buffer = (buffer << 8) | u64::from(*byte);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            let index = ((buffer >> bits) & 0x1f) as usize;
            out.push(BASE32_ALPHABET[index] as char);
        }
    }
    out
}

/// Returns true if `s` is a syntactically valid ledger address.
pub fn is_valid_address(s: &str) -> bool {
    s.len() == ADDRESS_LEN && is_base32(s)
}

/// A ledger address (payment address, attested user address or shared contract address).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    pub fn parse(s: &str) -> Result<Self> {
        if !is_valid_address(s) {
            return Err(TypesError::InvalidAddress(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    /// Deterministically derive an address from arbitrary data.
    pub fn derive(data: &[u8]) -> Self {
        let mut hasher = Hasher::new();
        hasher.update(b"address");
        hasher.update(data);
        Self(base32_chash(hasher.finalize().as_bytes()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Address {
    type Error = TypesError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Address of a paired chat device: a `0` prefix followed by a 32-character hash.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceAddress(String);

impl DeviceAddress {
    pub fn parse(s: &str) -> Result<Self> {
        match s.strip_prefix('0') {
            Some(rest) if rest.len() == ADDRESS_LEN && is_base32(rest) => Ok(Self(s.to_string())),
            _ => Err(TypesError::InvalidDeviceAddress(s.to_string())),
        }
    }

    pub fn derive(data: &[u8]) -> Self {
        let mut hasher = Hasher::new();
        hasher.update(b"device");
        hasher.update(data);
        Self(format!("0{}", base32_chash(hasher.finalize().as_bytes())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for DeviceAddress {
    type Error = TypesError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<DeviceAddress> for String {
    fn from(device: DeviceAddress) -> Self {
        device.0
    }
}

impl fmt::Debug for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceAddress({})", self.0)
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a unit (one transaction bundle) on the DAG ledger.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitId([u8; 32]);

impl UnitId {
    pub fn new(data: &[u8]) -> Self {
        let mut hasher = Hasher::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|_| TypesError::InvalidUnitId(s.to_string()))?;
        if bytes.len() != 32 {
            return Err(TypesError::InvalidUnitId(s.to_string()));
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UnitId({}...)", &self.to_hex()[..8])
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Row id of a payment or signature proof handled by the bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Key of the mutual-exclusion scope guarding this transaction's reward state.
    pub fn lock_key(&self) -> String {
        format!("tx-{}", self.0)
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable profile id embedded in attestation payloads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(TypesError::InvalidUserId(id));
        }
        Ok(Self(id))
    }

    pub(crate) fn from_digest(digest: String) -> Self {
        Self(digest)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_address_is_valid() {
        let address = Address::derive(b"alice");
        assert_eq!(address.as_str().len(), ADDRESS_LEN);
        assert!(is_valid_address(address.as_str()));
        assert_eq!(address, Address::derive(b"alice"));
        assert_ne!(address, Address::derive(b"bob"));
    }

    #[test]
    fn test_address_validation() {
        assert!(Address::parse("I2ADHGP4HL6J37NQAD73J7E5SKFIXJOT").is_ok());
        assert!(Address::parse("i2adhgp4hl6j37nqad73j7e5skfixjot").is_err());
        assert!(Address::parse("I2ADHGP4HL6J37NQAD73J7E5SKFIXJO").is_err());
        assert!(Address::parse("I2ADHGP4HL6J37NQAD73J7E5SKFIXJO1").is_err());
    }

    #[test]
    fn test_device_address() {
        let device = DeviceAddress::derive(b"phone");
        assert!(device.as_str().starts_with('0'));
        assert_eq!(device.as_str().len(), ADDRESS_LEN + 1);
        assert!(DeviceAddress::parse(device.as_str()).is_ok());
        assert!(DeviceAddress::parse("I2ADHGP4HL6J37NQAD73J7E5SKFIXJOT").is_err());
    }

    #[test]
    fn test_address_serde_rejects_garbage() {
        let ok: std::result::Result<Address, _> =
            serde_json::from_str("\"I2ADHGP4HL6J37NQAD73J7E5SKFIXJOT\"");
        assert!(ok.is_ok());
        let bad: std::result::Result<Address, _> = serde_json::from_str("\"not an address\"");
        assert!(bad.is_err());
    }

    #[test]
    fn test_unit_id_hex() {
        let unit = UnitId::new(b"unit");
        let parsed = UnitId::from_hex(&unit.to_hex()).unwrap();
        assert_eq!(unit, parsed);
        assert!(UnitId::from_hex("abcd").is_err());
    }

    #[test]
    fn test_transaction_lock_key() {
        assert_eq!(TransactionId(42).lock_key(), "tx-42");
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;

/// An amount of the ledger's native asset, in indivisible base units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NativeAmount(u64);

impl NativeAmount {
    pub const ZERO: Self = Self(0);

    pub fn from_units(units: u64) -> Self {
        Self(units)
    }

    pub fn to_units(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(&self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(&self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    pub fn saturating_add(&self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(&self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }
}

impl fmt::Display for NativeAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} bytes", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arithmetic() {
        let a = NativeAmount::from_units(10);
        let b = NativeAmount::from_units(4);
        assert_eq!(a.checked_add(b), Some(NativeAmount::from_units(14)));
        assert_eq!(b.checked_sub(a), None);
        assert_eq!(b.saturating_sub(a), NativeAmount::ZERO);
        assert!(NativeAmount::ZERO.is_zero());
        assert_eq!(a.to_string(), "10 bytes");
    }
}

//! Arbitrary-precision token amounts.

use std::fmt;
use std::ops::Add;
use std::str::FromStr;

use num_bigint::BigUint;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A non-negative amount in the currency's smallest unit.
///
/// Prices and balances may exceed 64 bits. Serialized as a decimal string,
/// which is how nodes report them.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(BigUint);

impl Amount {
    pub fn zero() -> Self {
        Self(BigUint::default())
    }

    pub fn from_biguint(value: BigUint) -> Self {
        Self(value)
    }

    pub fn as_biguint(&self) -> &BigUint {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == BigUint::default()
    }

    /// `self - other`, or zero if `other` is larger.
    pub fn saturating_sub(&self, other: &Amount) -> Amount {
        if self.0 > other.0 {
            Amount(&self.0 - &other.0)
        } else {
            Amount::zero()
        }
    }

    /// Big-endian magnitude bytes.
    pub fn to_bytes_be(&self) -> Vec<u8> {
        self.0.to_bytes_be()
    }
}

impl From<u64> for Amount {
    fn from(n: u64) -> Self {
        Self(BigUint::from(n))
    }
}

impl From<u128> for Amount {
    fn from(n: u128) -> Self {
        Self(BigUint::from(n))
    }
}

impl From<BigUint> for Amount {
    fn from(n: BigUint) -> Self {
        Self(n)
    }
}

impl Add for &Amount {
    type Output = Amount;

    fn add(self, rhs: &Amount) -> Amount {
        Amount(&self.0 + &rhs.0)
    }
}

impl Add for Amount {
    type Output = Amount;

    fn add(self, rhs: Amount) -> Amount {
        Amount(self.0 + rhs.0)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for Amount {
    type Err = num_bigint::ParseBigIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BigUint::from_str(s.trim()).map(Self)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

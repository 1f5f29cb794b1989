//! # Wide Integers
//!
//! 256-bit unsigned integer backing sqrt prices (Q64.96) and the Q128.128
//! fee-growth accumulators. Accumulators are allowed to overflow by design;
//! consumers difference them with the wrapping helpers here.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uint::construct_uint;

construct_uint! {
    /// 256-bit unsigned integer, four little-endian u64 limbs.
    pub struct U256(4);
}

impl U256 {
    /// Addition modulo 2^256.
    pub fn wrapping_add(self, other: U256) -> U256 {
        self.overflowing_add(other).0
    }

    /// Subtraction modulo 2^256.
    pub fn wrapping_sub(self, other: U256) -> U256 {
        self.overflowing_sub(other).0
    }
}

// Decimal-string serde keeps the JSON form readable and avoids silently
// truncating through a native number type.
impl Serialize for U256 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for U256 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        U256::from_dec_str(&s).map_err(D::Error::custom)
    }
}

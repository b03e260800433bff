mod ecd;

use std::fmt;
use std::str::FromStr;

use rand::RngCore;
use sha1::{Digest, Sha1};

use crate::error::CpuKeyError;

/// Per-console 128-bit identifier for Xbox 360 debug consoles.
///
/// A key is structurally valid when its 106 data bits have a population
/// count of exactly 0x35 and its 22 ECD check bits are a fixed point of the
/// check computation. Equality, ordering and hashing are plain byte-wise
/// operations; the bytes are the value.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CpuKey([u8; 16]);

impl CpuKey {
    /// Byte length of a key.
    pub const LEN: usize = 16;

    /// All-zero sentinel: well-formed but known-invalid, meaning "unset".
    pub const EMPTY: CpuKey = CpuKey([0; 16]);

    /// Validates and wraps a 16-byte sequence.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CpuKeyError> {
        if bytes.is_empty() {
            return Err(CpuKeyError::Empty);
        }
        if bytes.len() != Self::LEN {
            return Err(CpuKeyError::Length(bytes.len()));
        }
        let mut raw = [0u8; Self::LEN];
        raw.copy_from_slice(bytes);
        Self::validate(raw)
    }

    /// Parses and validates a 32-digit hex string; either case is accepted.
    pub fn from_hex(s: &str) -> Result<Self, CpuKeyError> {
        if s.is_empty() {
            return Err(CpuKeyError::Empty);
        }
        if s.len() != Self::LEN * 2 {
            return Err(CpuKeyError::Length(s.len() / 2));
        }
        let decoded = hex::decode(s).map_err(|_| CpuKeyError::NonHex)?;
        let mut raw = [0u8; Self::LEN];
        raw.copy_from_slice(&decoded);
        Self::validate(raw)
    }

    fn validate(raw: [u8; 16]) -> Result<Self, CpuKeyError> {
        if raw.iter().all(|&b| b == 0) {
            return Err(CpuKeyError::AllZero);
        }
        if !ecd::weight_is_valid(&raw) {
            return Err(CpuKeyError::HammingWeight);
        }
        if !ecd::ecd_is_valid(&raw) {
            return Err(CpuKeyError::Ecd);
        }
        Ok(CpuKey(raw))
    }

    /// Non-failing hex parse. `None` means the input was malformed; the
    /// [`CpuKey::EMPTY`] sentinel means it was well-formed but failed a
    /// structural check; anything else is a valid key.
    pub fn try_parse(s: &str) -> Option<CpuKey> {
        match Self::from_hex(s) {
            Ok(key) => Some(key),
            Err(e) if e.is_structurally_invalid() => Some(Self::EMPTY),
            Err(_) => None,
        }
    }

    /// Byte-sequence counterpart of [`CpuKey::try_parse`].
    pub fn try_parse_bytes(bytes: &[u8]) -> Option<CpuKey> {
        match Self::from_bytes(bytes) {
            Ok(key) => Some(key),
            Err(e) if e.is_structurally_invalid() => Some(Self::EMPTY),
            Err(_) => None,
        }
    }

    /// Generates a fresh valid key: samples 16 bytes from a CSPRNG until the
    /// data-bit weight lands on 0x35, then writes the ECD check bits in
    /// place. The weight constraint is rare, so the rejection loop runs a
    /// dozen or so times on average.
    pub fn random() -> CpuKey {
        let mut rng = rand::rng();
        let mut raw = [0u8; Self::LEN];
        loop {
            rng.fill_bytes(&mut raw);
            if ecd::weight_is_valid(&raw) {
                ecd::compute_ecd(&mut raw);
                return CpuKey(raw);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }

    /// True for every key produced by validation or generation; the sentinel
    /// and anything mutated out-of-band fail.
    pub fn is_valid(&self) -> bool {
        !self.is_empty() && ecd::weight_is_valid(&self.0) && ecd::ecd_is_valid(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Uppercase hex rendering.
    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.0)
    }

    /// SHA-1 digest of the raw 16 bytes.
    pub fn digest(&self) -> [u8; 20] {
        let mut hasher = Sha1::new();
        hasher.update(self.0);
        hasher.finalize().into()
    }
}

impl FromStr for CpuKey {
    type Err = CpuKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl TryFrom<&[u8]> for CpuKey {
    type Error = CpuKeyError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        Self::from_bytes(bytes)
    }
}

impl fmt::Display for CpuKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for CpuKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CpuKey({})", self.to_hex())
    }
}

impl PartialEq<[u8; 16]> for CpuKey {
    fn eq(&self, other: &[u8; 16]) -> bool {
        self.0 == *other
    }
}

impl PartialEq<&[u8]> for CpuKey {
    fn eq(&self, other: &&[u8]) -> bool {
        self.0.as_slice() == *other
    }
}

impl PartialEq<str> for CpuKey {
    fn eq(&self, other: &str) -> bool {
        other.len() == Self::LEN * 2 && other.eq_ignore_ascii_case(&self.to_hex())
    }
}

impl PartialEq<&str> for CpuKey {
    fn eq(&self, other: &&str) -> bool {
        self == *other
    }
}

impl PartialEq<String> for CpuKey {
    fn eq(&self, other: &String) -> bool {
        self == other.as_str()
    }
}

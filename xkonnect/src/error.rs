use std::net::Ipv4Addr;

use thiserror::Error;

/// Reasons a byte or hex sequence is rejected as a CPUKey
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuKeyError {
    #[error("input is empty")]
    Empty,

    #[error("expected 16 key bytes, got {0}")]
    Length(usize),

    #[error("input contains a non-hex digit")]
    NonHex,

    #[error("key bytes are all zero")]
    AllZero,

    #[error("hamming weight of the data bits is not 0x35")]
    HammingWeight,

    #[error("ECD check bits do not match")]
    Ecd,
}

impl CpuKeyError {
    /// The input was not a well-formed 16-byte (or 32-digit) sequence at all.
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Empty | Self::Length(_) | Self::NonHex | Self::AllZero)
    }

    /// The input was well-formed but failed one of the structural key checks.
    pub fn is_structurally_invalid(&self) -> bool {
        matches!(self, Self::HammingWeight | Self::Ecd)
    }
}

/// Errors that can occur in the discovery engine
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("console {0} is already registered")]
    DuplicateConnection(Ipv4Addr),
}

pub type Result<T> = std::result::Result<T, ScanError>;

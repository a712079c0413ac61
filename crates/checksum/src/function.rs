//! Checksum functions and their identifiers.
//!
//! Functions are named the way multihash names them and carry the multihash
//! code on the wire, so a record is self-describing:
//!
//! | Name       | Code   | Digest |
//! |------------|--------|--------|
//! | `sha1`     | `0x11` | 20     |
//! | `sha2-256` | `0x12` | 32     |
//! | `sha2-512` | `0x13` | 64     |
//! | `blake3`   | `0x1e` | 32     |

use crate::error::{CodecError, CodecResult};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest as _, Sha256, Sha512};
use std::fmt;
use std::str::FromStr;

/// Supported checksum functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ChecksumFunction {
    /// SHA-1, for peers that still use it; not collision resistant
    Sha1,
    /// SHA2-256
    Sha2_256,
    /// SHA2-512
    Sha2_512,
    /// Unkeyed BLAKE3, 32-byte output
    Blake3,
}

impl ChecksumFunction {
    /// Every supported function, in code order.
    pub const ALL: [ChecksumFunction; 4] = [
        ChecksumFunction::Sha1,
        ChecksumFunction::Sha2_256,
        ChecksumFunction::Sha2_512,
        ChecksumFunction::Blake3,
    ];

    /// Validate an identifier (name or code) and return the function it names.
    pub fn coerce(id: impl Into<FunctionId>) -> CodecResult<Self> {
        match id.into() {
            FunctionId::Name(name) => name.parse(),
            FunctionId::Code(code) => u16::try_from(code)
                .ok()
                .and_then(|code| Self::from_code(code).ok())
                .ok_or_else(|| CodecError::InvalidFunctionCode(format!("{code:#x}"))),
        }
    }

    /// Look up a function by its wire code.
    pub fn from_code(code: u16) -> CodecResult<Self> {
        match code {
            0x11 => Ok(Self::Sha1),
            0x12 => Ok(Self::Sha2_256),
            0x13 => Ok(Self::Sha2_512),
            0x1e => Ok(Self::Blake3),
            other => Err(CodecError::UnknownFunction(other)),
        }
    }

    /// Wire code of this function.
    pub fn code(self) -> u16 {
        match self {
            Self::Sha1 => 0x11,
            Self::Sha2_256 => 0x12,
            Self::Sha2_512 => 0x13,
            Self::Blake3 => 0x1e,
        }
    }

    /// Canonical name of this function.
    pub fn name(self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Sha2_256 => "sha2-256",
            Self::Sha2_512 => "sha2-512",
            Self::Blake3 => "blake3",
        }
    }

    /// Length in bytes of the digests this function produces.
    pub fn digest_len(self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha2_256 | Self::Blake3 => 32,
            Self::Sha2_512 => 64,
        }
    }

    /// Compute the digest of `data`.
    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha1 => Sha1::digest(data).to_vec(),
            Self::Sha2_256 => Sha256::digest(data).to_vec(),
            Self::Sha2_512 => Sha512::digest(data).to_vec(),
            Self::Blake3 => blake3::hash(data).as_bytes().to_vec(),
        }
    }
}

impl fmt::Display for ChecksumFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ChecksumFunction {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        match name.as_str() {
            "sha1" => Ok(Self::Sha1),
            "sha2-256" | "sha256" => Ok(Self::Sha2_256),
            "sha2-512" | "sha512" => Ok(Self::Sha2_512),
            "blake3" => Ok(Self::Blake3),
            _ => {
                // Numeric codes are accepted in string form too ("0x12", "18")
                let code = match name.strip_prefix("0x") {
                    Some(hex) => u64::from_str_radix(hex, 16).ok(),
                    None => name.parse::<u64>().ok(),
                };
                match code {
                    Some(code) => Self::coerce(code),
                    None => Err(CodecError::InvalidFunctionCode(s.to_string())),
                }
            }
        }
    }
}

impl TryFrom<String> for ChecksumFunction {
    type Error = CodecError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ChecksumFunction> for String {
    fn from(function: ChecksumFunction) -> Self {
        function.name().to_string()
    }
}

/// An unvalidated checksum function identifier: a name or a numeric code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionId {
    /// A function name such as `"sha2-256"`
    Name(String),
    /// A multihash function code such as `0x12`
    Code(u64),
}

impl From<&str> for FunctionId {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for FunctionId {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<&String> for FunctionId {
    fn from(name: &String) -> Self {
        Self::Name(name.clone())
    }
}

impl From<u64> for FunctionId {
    fn from(code: u64) -> Self {
        Self::Code(code)
    }
}

impl From<u16> for FunctionId {
    fn from(code: u16) -> Self {
        Self::Code(u64::from(code))
    }
}

impl From<ChecksumFunction> for FunctionId {
    fn from(function: ChecksumFunction) -> Self {
        Self::Code(u64::from(function.code()))
    }
}

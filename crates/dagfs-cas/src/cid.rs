//! Content identifiers.
//!
//! A [`Cid`] names a block by `(version, codec, hash algorithm, digest)`.
//! CIDs are only ever produced by hashing encoded block bytes; see
//! [`Cid::hash_block`].
//!
//! ## Textual form
//!
//! ```text
//! v1: f<hex(varint version | varint codec | varint hash code | varint len | digest)>
//! v0: <hex(varint hash code | varint len | digest)>
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};

use crate::{CasError, Result};

/// Multibase prefix for lowercase base16
const BASE16_PREFIX: char = 'f';

/// Block serialization codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum Codec {
    /// Payload plus ordered named links
    #[default]
    #[serde(rename = "dag-pb")]
    DagPb,
    /// Payload only
    #[serde(rename = "raw")]
    Raw,
}

impl Codec {
    /// Multicodec code
    pub fn code(self) -> u64 {
        match self {
            Codec::DagPb => 0x70,
            Codec::Raw => 0x55,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Codec::DagPb => "dag-pb",
            Codec::Raw => "raw",
        }
    }

    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0x70 => Some(Codec::DagPb),
            0x55 => Some(Codec::Raw),
            _ => None,
        }
    }
}

impl FromStr for Codec {
    type Err = CasError;

    /// Accepts multicodec table names in either `dag-pb` or `DAG_PB` form.
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "dag-pb" => Ok(Codec::DagPb),
            "raw" => Ok(Codec::Raw),
            _ => Err(CasError::Unsupported(format!("codec {}", s))),
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Multihash function used to derive a CID digest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum HashAlg {
    #[default]
    #[serde(rename = "sha2-256")]
    Sha2_256,
    #[serde(rename = "sha2-512")]
    Sha2_512,
    #[serde(rename = "blake3")]
    Blake3,
}

impl HashAlg {
    /// Multihash code
    pub fn code(self) -> u64 {
        match self {
            HashAlg::Sha2_256 => 0x12,
            HashAlg::Sha2_512 => 0x13,
            HashAlg::Blake3 => 0x1e,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            HashAlg::Sha2_256 => "sha2-256",
            HashAlg::Sha2_512 => "sha2-512",
            HashAlg::Blake3 => "blake3",
        }
    }

    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0x12 => Some(HashAlg::Sha2_256),
            0x13 => Some(HashAlg::Sha2_512),
            0x1e => Some(HashAlg::Blake3),
            _ => None,
        }
    }

    /// Digest length in bytes
    pub fn digest_len(self) -> usize {
        match self {
            HashAlg::Sha2_256 | HashAlg::Blake3 => 32,
            HashAlg::Sha2_512 => 64,
        }
    }

    /// Hash `data` with this algorithm.
    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            HashAlg::Sha2_256 => Sha256::digest(data).to_vec(),
            HashAlg::Sha2_512 => Sha512::digest(data).to_vec(),
            HashAlg::Blake3 => blake3::hash(data).as_bytes().to_vec(),
        }
    }
}

impl FromStr for HashAlg {
    type Err = CasError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "sha2-256" => Ok(HashAlg::Sha2_256),
            "sha2-512" => Ok(HashAlg::Sha2_512),
            "blake3" => Ok(HashAlg::Blake3),
            _ => Err(CasError::Unsupported(format!("hash algorithm {}", s))),
        }
    }
}

impl fmt::Display for HashAlg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// CID version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(try_from = "u8", into = "u8")]
pub enum CidVersion {
    /// Bare multihash; only valid for dag-pb + sha2-256
    #[default]
    V0,
    V1,
}

impl TryFrom<u8> for CidVersion {
    type Error = CasError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(CidVersion::V0),
            1 => Ok(CidVersion::V1),
            other => Err(CasError::Unsupported(format!("CID version {}", other))),
        }
    }
}

impl From<CidVersion> for u8 {
    fn from(version: CidVersion) -> u8 {
        match version {
            CidVersion::V0 => 0,
            CidVersion::V1 => 1,
        }
    }
}

/// Content identifier
///
/// Serialized as its binary form, so every decoded CID passes the same
/// checks as [`Cid::new`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct Cid {
    version: CidVersion,
    codec: Codec,
    hash_alg: HashAlg,
    digest: Vec<u8>,
}

impl Cid {
    /// Assemble a CID from its parts, enforcing the v0 restrictions.
    pub fn new(version: CidVersion, codec: Codec, hash_alg: HashAlg, digest: Vec<u8>) -> Result<Self> {
        if version == CidVersion::V0 && (codec != Codec::DagPb || hash_alg != HashAlg::Sha2_256) {
            return Err(CasError::InvalidCid(format!(
                "CIDv0 requires dag-pb and sha2-256, got {} and {}",
                codec, hash_alg
            )));
        }
        if digest.len() != hash_alg.digest_len() {
            return Err(CasError::InvalidCid(format!(
                "{} digest must be {} bytes, got {}",
                hash_alg,
                hash_alg.digest_len(),
                digest.len()
            )));
        }
        Ok(Self {
            version,
            codec,
            hash_alg,
            digest,
        })
    }

    /// Compute the CID of already-encoded block bytes.
    pub fn hash_block(bytes: &[u8], version: CidVersion, codec: Codec, hash_alg: HashAlg) -> Result<Self> {
        Self::new(version, codec, hash_alg, hash_alg.digest(bytes))
    }

    pub fn version(&self) -> CidVersion {
        self.version
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    pub fn hash_alg(&self) -> HashAlg {
        self.hash_alg
    }

    pub fn digest(&self) -> &[u8] {
        &self.digest
    }

    /// Hex form of the digest alone (used for on-disk fan-out).
    pub fn digest_hex(&self) -> String {
        hex::encode(&self.digest)
    }

    /// `varint(hash code) | varint(len) | digest`
    pub fn multihash(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.digest.len() + 4);
        write_varint(&mut out, self.hash_alg.code());
        write_varint(&mut out, self.digest.len() as u64);
        out.extend_from_slice(&self.digest);
        out
    }

    /// Binary form: bare multihash for v0, prefixed multihash for v1.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self.version {
            CidVersion::V0 => self.multihash(),
            CidVersion::V1 => {
                let mut out = Vec::with_capacity(self.digest.len() + 6);
                write_varint(&mut out, 1);
                write_varint(&mut out, self.codec.code());
                out.extend_from_slice(&self.multihash());
                out
            }
        }
    }

    /// Parse the binary form produced by [`Cid::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (first, used) = read_varint(bytes).ok_or_else(|| invalid("truncated CID"))?;
        if first == HashAlg::Sha2_256.code() {
            return Self::from_multihash(bytes, CidVersion::V0, Codec::DagPb);
        }
        if first != 1 {
            return Err(invalid(&format!("unknown CID version {}", first)));
        }
        let rest = &bytes[used..];
        let (code, used) = read_varint(rest).ok_or_else(|| invalid("truncated codec"))?;
        let codec = Codec::from_code(code).ok_or_else(|| invalid(&format!("unknown codec 0x{:x}", code)))?;
        Self::from_multihash(&rest[used..], CidVersion::V1, codec)
    }

    fn from_multihash(bytes: &[u8], version: CidVersion, codec: Codec) -> Result<Self> {
        let (code, used) = read_varint(bytes).ok_or_else(|| invalid("truncated multihash"))?;
        let hash_alg =
            HashAlg::from_code(code).ok_or_else(|| invalid(&format!("unknown hash 0x{:x}", code)))?;
        let rest = &bytes[used..];
        let (len, used) = read_varint(rest).ok_or_else(|| invalid("truncated digest length"))?;
        let digest = &rest[used..];
        if digest.len() as u64 != len {
            return Err(invalid("digest length mismatch"));
        }
        Self::new(version, codec, hash_alg, digest.to_vec())
    }
}

impl TryFrom<Vec<u8>> for Cid {
    type Error = CasError;

    fn try_from(bytes: Vec<u8>) -> Result<Self> {
        Self::from_bytes(&bytes)
    }
}

impl From<Cid> for Vec<u8> {
    fn from(cid: Cid) -> Vec<u8> {
        cid.to_bytes()
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.version {
            CidVersion::V0 => write!(f, "{}", hex::encode(self.to_bytes())),
            CidVersion::V1 => write!(f, "{}{}", BASE16_PREFIX, hex::encode(self.to_bytes())),
        }
    }
}

impl FromStr for Cid {
    type Err = CasError;

    fn from_str(s: &str) -> Result<Self> {
        let hex_part = s.strip_prefix(BASE16_PREFIX).unwrap_or(s);
        let bytes = hex::decode(hex_part).map_err(|e| invalid(&format!("{}: {}", s, e)))?;
        let cid = Self::from_bytes(&bytes)?;
        // A v1 CID must carry the multibase prefix and a v0 CID must not.
        let prefixed = s.starts_with(BASE16_PREFIX);
        if prefixed != (cid.version == CidVersion::V1) {
            return Err(invalid(s));
        }
        Ok(cid)
    }
}

fn invalid(msg: &str) -> CasError {
    CasError::InvalidCid(msg.to_string())
}

/// Unsigned LEB128
fn write_varint(out: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        out.push((value as u8) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

fn read_varint(bytes: &[u8]) -> Option<(u64, usize)> {
    let mut value = 0u64;
    for (i, byte) in bytes.iter().enumerate().take(10) {
        value |= u64::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            return Some((value, i + 1));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_v0_requires_dag_pb_sha256() {
        let err = Cid::hash_block(b"x", CidVersion::V0, Codec::Raw, HashAlg::Sha2_256);
        assert!(matches!(err, Err(CasError::InvalidCid(_))));

        let err = Cid::hash_block(b"x", CidVersion::V0, Codec::DagPb, HashAlg::Blake3);
        assert!(matches!(err, Err(CasError::InvalidCid(_))));

        assert!(Cid::hash_block(b"x", CidVersion::V0, Codec::DagPb, HashAlg::Sha2_256).is_ok());
    }

    #[test]
    fn test_decoding_validates_digest() {
        let good = Cid::hash_block(b"ok", CidVersion::V1, Codec::DagPb, HashAlg::Sha2_256).unwrap();
        let encoded = bincode::serialize(&good).unwrap();
        assert_eq!(bincode::deserialize::<Cid>(&encoded).unwrap(), good);

        // v1, dag-pb, sha2-256 with an empty digest
        let mut empty = Vec::new();
        write_varint(&mut empty, 1);
        write_varint(&mut empty, Codec::DagPb.code());
        write_varint(&mut empty, HashAlg::Sha2_256.code());
        write_varint(&mut empty, 0);
        let encoded = bincode::serialize(&empty).unwrap();
        assert!(bincode::deserialize::<Cid>(&encoded).is_err());

        // v0 multihash with a two-byte digest
        let mut short = Vec::new();
        write_varint(&mut short, HashAlg::Sha2_256.code());
        write_varint(&mut short, 2);
        short.extend_from_slice(&[0xab, 0xcd]);
        let encoded = bincode::serialize(&short).unwrap();
        assert!(bincode::deserialize::<Cid>(&encoded).is_err());
    }

    #[test]
    fn test_string_forms() {
        let v0 = Cid::hash_block(b"hello", CidVersion::V0, Codec::DagPb, HashAlg::Sha2_256).unwrap();
        let v1 = Cid::hash_block(b"hello", CidVersion::V1, Codec::Raw, HashAlg::Sha2_512).unwrap();

        let v0_str = v0.to_string();
        let v1_str = v1.to_string();
        assert!(v0_str.starts_with("1220"));
        assert!(v1_str.starts_with("f0155"));

        assert_eq!(v0_str.parse::<Cid>().unwrap(), v0);
        assert_eq!(v1_str.parse::<Cid>().unwrap(), v1);
    }

    #[test]
    fn test_equality_covers_all_fields() {
        let a = Cid::hash_block(b"same", CidVersion::V1, Codec::DagPb, HashAlg::Sha2_256).unwrap();
        let b = Cid::hash_block(b"same", CidVersion::V1, Codec::Raw, HashAlg::Sha2_256).unwrap();
        let c = Cid::hash_block(b"same", CidVersion::V0, Codec::DagPb, HashAlg::Sha2_256).unwrap();
        assert_eq!(a.digest(), b.digest());
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!("not-a-cid".parse::<Cid>().is_err());
        assert!("f01".parse::<Cid>().is_err());
        assert!("".parse::<Cid>().is_err());
    }

    #[test]
    fn test_names_parse() {
        assert_eq!("DAG_PB".parse::<Codec>().unwrap(), Codec::DagPb);
        assert_eq!("sha2-512".parse::<HashAlg>().unwrap(), HashAlg::Sha2_512);
        assert!("md5".parse::<HashAlg>().is_err());
    }
}

//! CRX package header parsing
//!
//! ```text
//! v2: Cr24 | version=2 (u32le) | keyLen (u32le) | sigLen (u32le) | key | sig | ZIP
//! v3: Cr24 | version=3 (u32le) | headerLen (u32le) | CrxFileHeader | ZIP
//! ```
//!
//! Signatures are not verified. The embedded public key is only extracted
//! so the key-derived id can be kept on the record.

use sha2::{Digest, Sha256};
use thiserror::Error;

/// Package magic
pub const CRX_MAGIC: &[u8; 4] = b"Cr24";

/// CrxFileHeader fields carrying AsymmetricKeyProof messages
const FIELD_SHA256_WITH_RSA: u64 = 2;
const FIELD_SHA256_WITH_ECDSA: u64 = 3;
/// AsymmetricKeyProof.public_key
const FIELD_PUBLIC_KEY: u64 = 1;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CrxError {
    #[error("not a CRX package (bad magic)")]
    BadMagic,

    #[error("unsupported CRX version {0}")]
    UnsupportedVersion(u32),

    #[error("CRX header is truncated")]
    Truncated,

    #[error("CRX header length is inconsistent with the file size")]
    InvalidHeaderLength,
}

/// A parsed CRX package borrowing the ZIP payload from the input buffer
#[derive(Debug, PartialEq, Eq)]
pub struct CrxPackage<'a> {
    pub version: u32,
    /// DER-encoded public key, when one could be found
    pub public_key: Option<Vec<u8>>,
    pub zip: &'a [u8],
}

impl CrxPackage<'_> {
    /// Id derived from the embedded public key, if any
    pub fn key_id(&self) -> Option<String> {
        self.public_key.as_deref().map(id_from_public_key)
    }
}

fn read_u32(buf: &[u8], offset: usize) -> Result<u32, CrxError> {
    let bytes = buf.get(offset..offset + 4).ok_or(CrxError::Truncated)?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Parse a CRX v2 or v3 buffer
pub fn parse(buf: &[u8]) -> Result<CrxPackage<'_>, CrxError> {
    if buf.len() < 4 || &buf[..4] != CRX_MAGIC {
        return Err(CrxError::BadMagic);
    }
    let version = read_u32(buf, 4)?;

    let (zip_offset, public_key) = match version {
        2 => {
            let key_len = read_u32(buf, 8)? as usize;
            let sig_len = read_u32(buf, 12)? as usize;
            let offset = 16usize
                .checked_add(key_len)
                .and_then(|n| n.checked_add(sig_len))
                .ok_or(CrxError::InvalidHeaderLength)?;
            let key = buf.get(16..16 + key_len).map(<[u8]>::to_vec);
            (offset, key.filter(|k| !k.is_empty()))
        }
        3 => {
            let header_len = read_u32(buf, 8)? as usize;
            let offset = 12usize
                .checked_add(header_len)
                .ok_or(CrxError::InvalidHeaderLength)?;
            let key = buf.get(12..offset).and_then(public_key_from_header);
            (offset, key)
        }
        other => return Err(CrxError::UnsupportedVersion(other)),
    };

    if zip_offset >= buf.len() {
        return Err(CrxError::InvalidHeaderLength);
    }

    Ok(CrxPackage {
        version,
        public_key,
        zip: &buf[zip_offset..],
    })
}

/// Chromium-style id for a DER public key
///
/// First 16 bytes of SHA-256, hex-encoded with the digits `0-f` mapped to
/// `a-p`.
pub fn id_from_public_key(der: &[u8]) -> String {
    let digest = Sha256::digest(der);
    digest[..16]
        .iter()
        .flat_map(|b| [b >> 4, b & 0x0f])
        .map(|nibble| char::from(b'a' + nibble))
        .collect()
}

/// First public key found in the rsa or ecdsa proofs of a CrxFileHeader
fn public_key_from_header(header: &[u8]) -> Option<Vec<u8>> {
    let mut fields = ProtoFields::new(header);
    while let Some((number, value)) = fields.next_field()? {
        if number != FIELD_SHA256_WITH_RSA && number != FIELD_SHA256_WITH_ECDSA {
            continue;
        }
        let ProtoValue::Bytes(proof) = value else {
            continue;
        };
        let mut proof_fields = ProtoFields::new(proof);
        while let Some((inner, inner_value)) = proof_fields.next_field()? {
            if inner == FIELD_PUBLIC_KEY {
                if let ProtoValue::Bytes(key) = inner_value {
                    if !key.is_empty() {
                        return Some(key.to_vec());
                    }
                }
            }
        }
    }
    None
}

enum ProtoValue<'a> {
    Varint,
    Fixed,
    Bytes(&'a [u8]),
}

/// Minimal protobuf field walker
///
/// `next_field` returns `None` on malformed input and `Some(None)` at the end.
struct ProtoFields<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ProtoFields<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn varint(&mut self) -> Option<u64> {
        let mut value = 0u64;
        for shift in (0..64).step_by(7) {
            let byte = *self.buf.get(self.pos)?;
            self.pos += 1;
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Some(value);
            }
        }
        None
    }

    fn take(&mut self, len: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(len)?;
        let slice = self.buf.get(self.pos..end)?;
        self.pos = end;
        Some(slice)
    }

    fn next_field(&mut self) -> Option<Option<(u64, ProtoValue<'a>)>> {
        if self.pos >= self.buf.len() {
            return Some(None);
        }
        let key = self.varint()?;
        let number = key >> 3;
        let value = match key & 0x07 {
            0 => {
                self.varint()?;
                ProtoValue::Varint
            }
            1 => {
                self.take(8)?;
                ProtoValue::Fixed
            }
            2 => {
                let len = usize::try_from(self.varint()?).ok()?;
                ProtoValue::Bytes(self.take(len)?)
            }
            5 => {
                self.take(4)?;
                ProtoValue::Fixed
            }
            _ => return None,
        };
        Some(Some((number, value)))
    }
}

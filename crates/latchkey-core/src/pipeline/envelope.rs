//! Legacy "plain scrypt" envelope
//!
//! First-generation stores were written in the scrypt utility's file format:
//!
//! ```text
//! 0x00..0x06  "scrypt"
//! 0x06        format version (0)
//! 0x07        log2(N)
//! 0x08..0x0C  r (big-endian)
//! 0x0C..0x10  p (big-endian)
//! 0x10..0x30  salt
//! 0x30..0x40  SHA-256(bytes 0x00..0x30), truncated
//! 0x40..0x60  HMAC-SHA256(bytes 0x00..0x40)
//! 0x60..      AES-256-CTR ciphertext
//! last 32     HMAC-SHA256(everything before)
//! ```
//!
//! The 64-byte scrypt output supplies the AES key (first half) and the HMAC
//! key (second half).

use aes::Aes256;
use ctr::cipher::{KeyIvInit, StreamCipher};
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use super::{DataKind, Payload, ScryptParams, Stage};
use crate::error::{Error, Result};

type Aes256Ctr = ctr::Ctr128BE<Aes256>;
type HmacSha256 = Hmac<Sha256>;

const MAGIC: &[u8; 6] = b"scrypt";
const VERSION: u8 = 0;
const HEADER_LEN: usize = 96;
const MAC_LEN: usize = 32;
const SALT_LEN: usize = 32;

fn derive(password: &[u8], salt: &[u8], params: ScryptParams) -> Result<Zeroizing<[u8; 64]>> {
    let scrypt_params = scrypt::Params::new(params.log_n, params.r, params.p, 64)
        .map_err(|e| Error::Decode(format!("invalid scrypt parameters: {}", e)))?;
    let mut dk = Zeroizing::new([0u8; 64]);
    scrypt::scrypt(password, salt, &scrypt_params, dk.as_mut())
        .map_err(|e| Error::Crypto(format!("scrypt failed: {}", e)))?;
    Ok(dk)
}

fn mac(key: &[u8], parts: &[&[u8]]) -> Result<HmacSha256> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|e| Error::Crypto(format!("mac init: {}", e)))?;
    for part in parts {
        mac.update(part);
    }
    Ok(mac)
}

/// Seal `plaintext` in a scrypt envelope
pub fn seal_envelope(plaintext: &[u8], password: &[u8], params: ScryptParams) -> Result<Vec<u8>> {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    let dk = derive(password, &salt, params)?;
    let (enc_key, mac_key) = dk.split_at(32);

    let mut out = Vec::with_capacity(HEADER_LEN + plaintext.len() + MAC_LEN);
    out.extend_from_slice(MAGIC);
    out.push(VERSION);
    out.push(params.log_n);
    out.extend_from_slice(&params.r.to_be_bytes());
    out.extend_from_slice(&params.p.to_be_bytes());
    out.extend_from_slice(&salt);
    let checksum = Sha256::digest(&out[..0x30]);
    out.extend_from_slice(&checksum[..16]);
    let header_mac = mac(mac_key, &[&out[..0x40]])?.finalize().into_bytes();
    out.extend_from_slice(&header_mac);

    let body_start = out.len();
    out.extend_from_slice(plaintext);
    let mut cipher = Aes256Ctr::new_from_slices(enc_key, &[0u8; 16])
        .map_err(|e| Error::Crypto(format!("cipher init: {}", e)))?;
    cipher.apply_keystream(&mut out[body_start..]);

    let trailer = mac(mac_key, &[out.as_slice()])?.finalize().into_bytes();
    out.extend_from_slice(&trailer);
    Ok(out)
}

/// Open an envelope produced by [`seal_envelope`] (or the scrypt utility)
pub fn open_envelope(blob: &[u8], password: &[u8]) -> Result<Vec<u8>> {
    if blob.len() < HEADER_LEN + MAC_LEN {
        return Err(Error::Decode("envelope too short".to_string()));
    }
    if &blob[..6] != MAGIC || blob[6] != VERSION {
        return Err(Error::Decode("not a scrypt envelope".to_string()));
    }

    let checksum = Sha256::digest(&blob[..0x30]);
    if checksum[..16] != blob[0x30..0x40] {
        return Err(Error::Decode("envelope header checksum mismatch".to_string()));
    }

    let params = ScryptParams {
        log_n: blob[7],
        r: u32::from_be_bytes([blob[8], blob[9], blob[10], blob[11]]),
        p: u32::from_be_bytes([blob[12], blob[13], blob[14], blob[15]]),
    };
    params.check_cost()?;
    let dk = derive(password, &blob[0x10..0x30], params)?;
    let (enc_key, mac_key) = dk.split_at(32);

    mac(mac_key, &[&blob[..0x40]])?
        .verify_slice(&blob[0x40..0x60])
        .map_err(|_| Error::Decode("envelope authentication failed".to_string()))?;

    let body_end = blob.len() - MAC_LEN;
    mac(mac_key, &[&blob[..body_end]])?
        .verify_slice(&blob[body_end..])
        .map_err(|_| Error::Decode("envelope authentication failed".to_string()))?;

    let mut plain = blob[HEADER_LEN..body_end].to_vec();
    let mut cipher = Aes256Ctr::new_from_slices(enc_key, &[0u8; 16])
        .map_err(|e| Error::Crypto(format!("cipher init: {}", e)))?;
    cipher.apply_keystream(&mut plain);
    Ok(plain)
}

/// Pipeline stage for the legacy envelope
pub struct ScryptEnvelope {
    password: Zeroizing<String>,
    params: ScryptParams,
}

impl ScryptEnvelope {
    pub fn new(password: &str, params: ScryptParams) -> Self {
        Self {
            password: Zeroizing::new(password.to_string()),
            params,
        }
    }
}

impl Stage for ScryptEnvelope {
    fn input_kind(&self) -> DataKind {
        DataKind::Bytes
    }

    fn output_kind(&self) -> DataKind {
        DataKind::Bytes
    }

    fn encode(&mut self, value: Payload) -> Result<Payload> {
        let plain = value.into_bytes()?;
        Ok(Payload::Bytes(seal_envelope(
            &plain,
            self.password.as_bytes(),
            self.params,
        )?))
    }

    fn decode(&mut self, value: Payload) -> Result<Payload> {
        let blob = value.into_bytes()?;
        Ok(Payload::Bytes(open_envelope(&blob, self.password.as_bytes())?))
    }
}

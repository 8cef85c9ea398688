//! scrypt + AES-256-CBC store format
//!
//! # Format
//!
//! All integers are big-endian.
//!
//! ```text
//! 0x00..0x10  salt
//! 0x10..0x14  scrypt cost exponent N (cost = 2^N)
//! 0x14..0x18  scrypt block size r
//! 0x18..0x1C  scrypt parallelism p
//! 0x1C..0x2C  IV
//! 0x2C..      ciphertext
//! ```
//!
//! The plaintext is a 4-byte length prefix followed by the payload, zero
//! padded to the block size. Padding bytes are not checked on decode. There is
//! no authentication tag: a wrong password produces garbage that fails either
//! the length check or the next stage up.

use aes::Aes256;
use cbc::cipher::{block_padding::NoPadding, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::{rngs::OsRng, RngCore};
use zeroize::Zeroizing;

use super::{DataKind, Payload, Stage};
use crate::error::{Error, Result};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

pub const SALT_LEN: usize = 16;
pub const IV_LEN: usize = 16;
pub const HEADER_LEN: usize = SALT_LEN + 12 + IV_LEN;
const BLOCK_LEN: usize = 16;
const KEY_LEN: usize = 32;
const LENGTH_PREFIX: usize = 4;

/// Headers asking for more than 2^24 rounds are treated as corrupt
pub const MAX_LOG_N: u32 = 24;

/// Upper bound on the scrypt working set a header may ask for
pub const MAX_SCRYPT_MEMORY: u64 = 1 << 30;

pub const MAX_PARALLELISM: u32 = 16;

/// scrypt cost parameters used for new blobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScryptParams {
    pub log_n: u8,
    pub r: u32,
    pub p: u32,
}

impl Default for ScryptParams {
    fn default() -> Self {
        Self {
            log_n: 15,
            r: 8,
            p: 1,
        }
    }
}

impl ScryptParams {
    /// Refuse parameters whose key derivation would need more than
    /// [`MAX_SCRYPT_MEMORY`] or more than [`MAX_PARALLELISM`] lanes
    ///
    /// scrypt allocates `128 * r * N` bytes for its table and `128 * r * p`
    /// for its blocks; headers come from untrusted storage, so both are
    /// bounded before any allocation happens.
    pub fn check_cost(&self) -> Result<()> {
        let log_n = u32::from(self.log_n);
        if log_n == 0 || log_n > MAX_LOG_N || self.r == 0 || self.p == 0 {
            return Err(Error::Decode(format!(
                "implausible scrypt parameters N=2^{} r={} p={}",
                log_n, self.r, self.p
            )));
        }
        if self.p > MAX_PARALLELISM {
            return Err(Error::Decode(format!(
                "scrypt parallelism {} exceeds {}",
                self.p, MAX_PARALLELISM
            )));
        }

        let block = 128 * u128::from(self.r);
        let memory = block * ((1u128 << log_n) + u128::from(self.p));
        if memory > u128::from(MAX_SCRYPT_MEMORY) {
            return Err(Error::Decode(format!(
                "scrypt parameters N=2^{} r={} p={} need {} bytes",
                log_n, self.r, self.p, memory
            )));
        }
        Ok(())
    }

    fn derive_key(&self, password: &[u8], salt: &[u8]) -> Result<Zeroizing<[u8; KEY_LEN]>> {
        let params = scrypt::Params::new(self.log_n, self.r, self.p, KEY_LEN)
            .map_err(|e| Error::Crypto(format!("invalid scrypt parameters: {}", e)))?;
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        scrypt::scrypt(password, salt, &params, key.as_mut())
            .map_err(|e| Error::Crypto(format!("scrypt failed: {}", e)))?;
        Ok(key)
    }
}

/// Parsed blob header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipherHeader {
    pub salt: [u8; SALT_LEN],
    pub params: ScryptParams,
    pub iv: [u8; IV_LEN],
}

impl CipherHeader {
    /// Fresh header with random salt and IV
    pub fn generate(params: ScryptParams) -> Self {
        let mut salt = [0u8; SALT_LEN];
        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut salt);
        OsRng.fill_bytes(&mut iv);
        Self { salt, params, iv }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut bytes = [0u8; HEADER_LEN];
        bytes[0x00..0x10].copy_from_slice(&self.salt);
        bytes[0x10..0x14].copy_from_slice(&(self.params.log_n as u32).to_be_bytes());
        bytes[0x14..0x18].copy_from_slice(&self.params.r.to_be_bytes());
        bytes[0x18..0x1C].copy_from_slice(&self.params.p.to_be_bytes());
        bytes[0x1C..0x2C].copy_from_slice(&self.iv);
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(Error::Decode(format!(
                "blob too short for header: {} bytes",
                bytes.len()
            )));
        }

        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&bytes[0x00..0x10]);
        let log_n = read_u32(&bytes[0x10..0x14]);
        let r = read_u32(&bytes[0x14..0x18]);
        let p = read_u32(&bytes[0x18..0x1C]);
        let mut iv = [0u8; IV_LEN];
        iv.copy_from_slice(&bytes[0x1C..0x2C]);

        if log_n > MAX_LOG_N {
            return Err(Error::Decode(format!("implausible scrypt cost 2^{}", log_n)));
        }
        let params = ScryptParams {
            log_n: log_n as u8,
            r,
            p,
        };
        params.check_cost()?;

        Ok(Self { salt, params, iv })
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[..4]);
    u32::from_be_bytes(buf)
}

/// Encrypt `plaintext` under `password` with a fresh salt and IV
pub fn encrypt(plaintext: &[u8], password: &[u8], params: ScryptParams) -> Result<Vec<u8>> {
    let header = CipherHeader::generate(params);
    let key = params.derive_key(password, &header.salt)?;

    let length = u32::try_from(plaintext.len())
        .map_err(|_| Error::Crypto("payload larger than 4 GiB".to_string()))?;
    let framed_len = LENGTH_PREFIX + plaintext.len();
    let padded_len = framed_len.div_ceil(BLOCK_LEN) * BLOCK_LEN;

    let mut buf = Zeroizing::new(Vec::with_capacity(padded_len));
    buf.extend_from_slice(&length.to_be_bytes());
    buf.extend_from_slice(plaintext);
    buf.resize(padded_len, 0);

    let cipher = Aes256CbcEnc::new_from_slices(key.as_ref(), &header.iv)
        .map_err(|e| Error::Crypto(format!("cipher init: {}", e)))?;
    let ciphertext = cipher
        .encrypt_padded_mut::<NoPadding>(&mut buf, padded_len)
        .map_err(|e| Error::Crypto(format!("encryption failed: {}", e)))?;

    let mut out = Vec::with_capacity(HEADER_LEN + padded_len);
    out.extend_from_slice(&header.to_bytes());
    out.extend_from_slice(ciphertext);
    Ok(out)
}

/// Decrypt a blob produced by [`encrypt`]
pub fn decrypt(blob: &[u8], password: &[u8]) -> Result<Vec<u8>> {
    let header = CipherHeader::from_bytes(blob)?;
    let body = &blob[HEADER_LEN..];
    if body.is_empty() || body.len() % BLOCK_LEN != 0 {
        return Err(Error::Decode(format!(
            "ciphertext length {} is not a positive multiple of {}",
            body.len(),
            BLOCK_LEN
        )));
    }

    let key = header.params.derive_key(password, &header.salt)?;
    let cipher = Aes256CbcDec::new_from_slices(key.as_ref(), &header.iv)
        .map_err(|e| Error::Crypto(format!("cipher init: {}", e)))?;

    let mut buf = Zeroizing::new(body.to_vec());
    let plain = cipher
        .decrypt_padded_mut::<NoPadding>(&mut buf)
        .map_err(|e| Error::Decode(format!("decryption failed: {}", e)))?;

    let declared = read_u32(&plain[..LENGTH_PREFIX]) as usize;
    if declared > plain.len() - LENGTH_PREFIX {
        return Err(Error::Decode(format!(
            "declared length {} exceeds plaintext of {} bytes",
            declared,
            plain.len() - LENGTH_PREFIX
        )));
    }
    Ok(plain[LENGTH_PREFIX..LENGTH_PREFIX + declared].to_vec())
}

/// Pipeline stage encrypting bytes with [`encrypt`]
pub struct ScryptAesCipher {
    password: Zeroizing<String>,
    params: ScryptParams,
}

impl ScryptAesCipher {
    pub fn new(password: &str, params: ScryptParams) -> Self {
        Self {
            password: Zeroizing::new(password.to_string()),
            params,
        }
    }
}

impl Stage for ScryptAesCipher {
    fn input_kind(&self) -> DataKind {
        DataKind::Bytes
    }

    fn output_kind(&self) -> DataKind {
        DataKind::Bytes
    }

    fn encode(&mut self, value: Payload) -> Result<Payload> {
        let plain = value.into_bytes()?;
        Ok(Payload::Bytes(encrypt(
            &plain,
            self.password.as_bytes(),
            self.params,
        )?))
    }

    fn decode(&mut self, value: Payload) -> Result<Payload> {
        let blob = value.into_bytes()?;
        Ok(Payload::Bytes(decrypt(&blob, self.password.as_bytes())?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const FAST: ScryptParams = ScryptParams {
        log_n: 4,
        r: 8,
        p: 1,
    };

    #[test]
    fn test_header_layout() {
        let blob = encrypt(b"hello world", b"p1", FAST).unwrap();
        assert_eq!(u32::from_be_bytes(blob[16..20].try_into().unwrap()), 4);
        assert_eq!(u32::from_be_bytes(blob[20..24].try_into().unwrap()), 8);
        assert_eq!(u32::from_be_bytes(blob[24..28].try_into().unwrap()), 1);
        // 4 + 11 bytes of framing pad to a single block
        assert_eq!(blob.len(), HEADER_LEN + 16);
    }

    #[test]
    fn test_fresh_salt_and_iv_each_time() {
        let a = encrypt(b"same", b"pw", FAST).unwrap();
        let b = encrypt(b"same", b"pw", FAST).unwrap();
        assert_ne!(a[..16], b[..16]);
        assert_ne!(a[28..44], b[28..44]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_empty_payload() {
        let blob = encrypt(b"", b"pw", FAST).unwrap();
        assert_eq!(decrypt(&blob, b"pw").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_multi_megabyte_payload() {
        let payload: Vec<u8> = (0..3 * 1024 * 1024).map(|i| (i % 251) as u8).collect();
        let blob = encrypt(&payload, b"pw", FAST).unwrap();
        assert_eq!(decrypt(&blob, b"pw").unwrap(), payload);
    }

    #[test]
    fn test_wrong_password_never_yields_plaintext() {
        let blob = encrypt(b"hello world", b"p1", FAST).unwrap();
        match decrypt(&blob, b"wrong") {
            Ok(plain) => assert_ne!(plain, b"hello world"),
            Err(e) => assert!(matches!(e, Error::Decode(_))),
        }
    }

    #[test]
    fn test_truncated_blob_rejected() {
        let blob = encrypt(b"hello world", b"p1", FAST).unwrap();
        assert!(matches!(decrypt(&blob[..30], b"p1"), Err(Error::Decode(_))));
        assert!(matches!(
            decrypt(&blob[..blob.len() - 3], b"p1"),
            Err(Error::Decode(_))
        ));
    }

    #[test]
    fn test_absurd_cost_rejected_without_running_scrypt() {
        let mut blob = encrypt(b"x", b"p1", FAST).unwrap();
        blob[16..20].copy_from_slice(&60u32.to_be_bytes());
        assert!(matches!(decrypt(&blob, b"p1"), Err(Error::Decode(_))));
    }

    #[test]
    fn test_oversized_memory_cost_rejected() {
        let mut blob = encrypt(b"x", b"p1", FAST).unwrap();
        blob[16..20].copy_from_slice(&20u32.to_be_bytes());
        blob[20..24].copy_from_slice(&(1u32 << 20).to_be_bytes());
        assert!(matches!(decrypt(&blob, b"p1"), Err(Error::Decode(_))));

        // Within the exponent limit but 16 GiB of table
        let mut blob = encrypt(b"x", b"p1", FAST).unwrap();
        blob[16..20].copy_from_slice(&24u32.to_be_bytes());
        assert!(matches!(decrypt(&blob, b"p1"), Err(Error::Decode(_))));
    }

    #[test]
    fn test_oversized_parallelism_rejected() {
        let mut blob = encrypt(b"x", b"p1", FAST).unwrap();
        blob[24..28].copy_from_slice(&u32::MAX.to_be_bytes());
        assert!(matches!(decrypt(&blob, b"p1"), Err(Error::Decode(_))));

        let mut blob = encrypt(b"x", b"p1", FAST).unwrap();
        blob[24..28].copy_from_slice(&(MAX_PARALLELISM + 1).to_be_bytes());
        assert!(matches!(decrypt(&blob, b"p1"), Err(Error::Decode(_))));
    }

    #[test]
    fn test_cost_limits() {
        assert!(ScryptParams::default().check_cost().is_ok());
        assert!(FAST.check_cost().is_ok());
        let table_limit = ScryptParams {
            log_n: 20,
            r: 8,
            p: MAX_PARALLELISM,
        };
        assert!(table_limit.check_cost().is_err());
        let just_under = ScryptParams {
            log_n: 19,
            r: 8,
            p: MAX_PARALLELISM,
        };
        assert!(just_under.check_cost().is_ok());
    }

    #[test]
    fn test_padding_not_validated() {
        let header = CipherHeader::generate(FAST);
        let key = FAST.derive_key(b"p1", &header.salt).unwrap();

        let mut buf = Vec::new();
        buf.extend_from_slice(&3u32.to_be_bytes());
        buf.extend_from_slice(b"abc");
        buf.resize(16, 0xaa);

        let ciphertext = Aes256CbcEnc::new_from_slices(key.as_ref(), &header.iv)
            .unwrap()
            .encrypt_padded_mut::<NoPadding>(&mut buf, 16)
            .unwrap()
            .to_vec();

        let mut blob = header.to_bytes().to_vec();
        blob.extend_from_slice(&ciphertext);
        assert_eq!(decrypt(&blob, b"p1").unwrap(), b"abc");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_roundtrip(payload in proptest::collection::vec(any::<u8>(), 0..2048),
                          password in "[ -~]{0,32}") {
            let blob = encrypt(&payload, password.as_bytes(), FAST).unwrap();
            prop_assert_eq!(blob.len() % 16, HEADER_LEN % 16);
            prop_assert_eq!(decrypt(&blob, password.as_bytes()).unwrap(), payload);
        }
    }
}

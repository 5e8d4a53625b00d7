//! AES-128-CBC 加解密（PKCS7 填充，密文前 16 字节为 IV）。

use aes::Aes128;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::Rng;
use thiserror::Error;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

pub const BLOCK_LEN: usize = 16;

/// 注册握手使用的固定引导密钥（客户端公开内置）。
const BOOTSTRAP_KEY_HEX: &str = "ac25c67ddd8f38c1b37a2348828e222e";

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("key must be 16 bytes of hex, got {0:?}")]
    InvalidKey(String),
    #[error("ciphertext too short: {0} bytes")]
    TooShort(usize),
    #[error("bad padding or ciphertext length")]
    Unpad,
    #[error("not a non-negative integer: {0:?}")]
    NonNumeric(String),
    #[error("base64: {0}")]
    Base64(#[from] base64::DecodeError),
}

#[derive(Clone)]
pub struct ChapterCipher {
    key: [u8; BLOCK_LEN],
}

impl std::fmt::Debug for ChapterCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChapterCipher").finish_non_exhaustive()
    }
}

impl ChapterCipher {
    pub fn from_hex(key_hex: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(key_hex.trim())
            .map_err(|_| CryptoError::InvalidKey(key_hex.to_string()))?;
        let key: [u8; BLOCK_LEN] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKey(key_hex.to_string()))?;
        Ok(Self { key })
    }

    pub fn bootstrap() -> Self {
        let mut key = [0u8; BLOCK_LEN];
        // 常量为合法 hex，长度固定
        if let Ok(bytes) = hex::decode(BOOTSTRAP_KEY_HEX) {
            key.copy_from_slice(&bytes);
        }
        Self { key }
    }

    pub fn encrypt(&self, plain: &[u8], iv: &[u8; BLOCK_LEN]) -> Vec<u8> {
        Aes128CbcEnc::new(&self.key.into(), iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plain)
    }

    /// 随机 IV 加密，返回 `IV ‖ 密文`。
    pub fn seal(&self, plain: &[u8]) -> Vec<u8> {
        let mut iv = [0u8; BLOCK_LEN];
        rand::rng().fill(&mut iv);
        let mut out = iv.to_vec();
        out.extend(self.encrypt(plain, &iv));
        out
    }

    /// 解密 `IV ‖ 密文`。
    pub fn open(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if data.len() < BLOCK_LEN * 2 {
            return Err(CryptoError::TooShort(data.len()));
        }
        let (iv, body) = data.split_at(BLOCK_LEN);
        Aes128CbcDec::new_from_slices(&self.key, iv)
            .map_err(|_| CryptoError::Unpad)?
            .decrypt_padded_vec_mut::<Pkcs7>(body)
            .map_err(|_| CryptoError::Unpad)
    }

    pub fn seal_base64(&self, plain: &[u8]) -> String {
        BASE64.encode(self.seal(plain))
    }

    pub fn open_base64(&self, text: &str) -> Result<Vec<u8>, CryptoError> {
        self.open(&BASE64.decode(text.trim())?)
    }
}

/// 注册明文：设备 ID 与注册盐各按 8 字节小端拼接。
pub fn register_plaintext(device_id: &str, salt: &str) -> Result<[u8; 16], CryptoError> {
    let parse = |s: &str| -> Result<u64, CryptoError> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CryptoError::NonNumeric(s.to_string()));
        }
        s.parse::<u64>()
            .map_err(|_| CryptoError::NonNumeric(s.to_string()))
    };
    let mut out = [0u8; 16];
    out[..8].copy_from_slice(&parse(device_id)?.to_le_bytes());
    out[8..].copy_from_slice(&parse(salt)?.to_le_bytes());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_then_open_recovers_plaintext() {
        let cipher = ChapterCipher::from_hex("00112233445566778899aabbccddeeff").unwrap();
        let sealed = cipher.seal(b"hello chapter");
        assert_eq!(sealed.len(), BLOCK_LEN * 2);
        assert_eq!(cipher.open(&sealed).unwrap(), b"hello chapter");
    }

    #[test]
    fn random_iv_differs_between_seals() {
        let cipher = ChapterCipher::bootstrap();
        assert_ne!(cipher.seal(b"same"), cipher.seal(b"same"));
    }

    #[test]
    fn open_with_wrong_key_fails_padding() {
        let a = ChapterCipher::from_hex("00112233445566778899aabbccddeeff").unwrap();
        let b = ChapterCipher::from_hex("ffeeddccbbaa99887766554433221100").unwrap();
        let sealed = a.seal(b"0123456789abcdef0123");
        // 错误密钥几乎必然得到非法填充；若巧合成功，明文也不可能一致
        match b.open(&sealed) {
            Err(CryptoError::Unpad) => {}
            Ok(plain) => assert_ne!(plain, b"0123456789abcdef0123"),
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_bad_keys_and_short_input() {
        assert!(matches!(
            ChapterCipher::from_hex("abcd"),
            Err(CryptoError::InvalidKey(_))
        ));
        assert!(matches!(
            ChapterCipher::from_hex("zz112233445566778899aabbccddeeff"),
            Err(CryptoError::InvalidKey(_))
        ));
        let cipher = ChapterCipher::bootstrap();
        assert!(matches!(cipher.open(&[0u8; 20]), Err(CryptoError::TooShort(20))));
    }

    #[test]
    fn bootstrap_key_matches_its_hex_form() {
        let iv = [7u8; BLOCK_LEN];
        let parsed = ChapterCipher::from_hex(BOOTSTRAP_KEY_HEX).unwrap();
        assert_eq!(
            ChapterCipher::bootstrap().encrypt(b"bootstrap", &iv),
            parsed.encrypt(b"bootstrap", &iv)
        );
    }

    #[test]
    fn register_plaintext_is_little_endian_pair() {
        let out = register_plaintext("258", "1").unwrap();
        assert_eq!(&out[..8], &[2, 1, 0, 0, 0, 0, 0, 0]);
        assert_eq!(&out[8..], &[1, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn register_plaintext_rejects_non_numeric() {
        assert!(matches!(
            register_plaintext("12a", "0"),
            Err(CryptoError::NonNumeric(_))
        ));
        assert!(matches!(
            register_plaintext("1", "-1"),
            Err(CryptoError::NonNumeric(_))
        ));
        // 超出 u64
        assert!(register_plaintext("99999999999999999999", "0").is_err());
    }
}

//! HMAC-SHA256 署名器。

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::AuthError;

type HmacSha256 = Hmac<Sha256>;

/// Signer は `header.claims` の署名生成と検証を行う。
///
/// 鍵は生成時に固定され、以後は読み取り専用のため複数タスクから共有してよい。
#[derive(Clone)]
pub struct Signer {
    secret: Vec<u8>,
}

impl Signer {
    /// 空のシークレットは拒否する。
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, AuthError> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Err(AuthError::MissingSecret);
        }
        Ok(Self {
            secret: secret.to_vec(),
        })
    }

    /// 署名対象バイト列の HMAC-SHA256 を base64url（パディングなし）で返す。
    pub fn sign(&self, material: &[u8]) -> String {
        URL_SAFE_NO_PAD.encode(self.digest(material))
    }

    /// 署名を再計算し、定数時間で比較する。
    pub fn verify(&self, material: &[u8], candidate: &str) -> bool {
        let expected = self.sign(material);
        constant_time_eq(expected.as_bytes(), candidate.as_bytes())
    }

    fn digest(&self, material: &[u8]) -> Vec<u8> {
        // HMAC は任意長の鍵を受け付けるため new_from_slice は失敗しない
        let Ok(mut mac) = HmacSha256::new_from_slice(&self.secret) else {
            return Vec::new();
        };
        mac.update(material);
        mac.finalize().into_bytes().to_vec()
    }
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer").field("secret", &"[REDACTED]").finish()
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

//! トークンの 3 セグメント形式（`header.claims.signature`）のエンコード・デコード。

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::Serialize;

use crate::claims::{Claims, Header};
use crate::error::AuthError;

const DELIMITER: char = '.';

/// EncodedSegments は署名前のヘッダー・Claims セグメント。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedSegments {
    pub header: String,
    pub claims: String,
}

impl EncodedSegments {
    /// 署名対象となる `header.claims` 文字列。
    pub fn signing_input(&self) -> String {
        format!("{}{}{}", self.header, DELIMITER, self.claims)
    }
}

/// TokenParts は受信したトークンを分割した結果。元の文字列を借用する。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenParts<'a> {
    pub header: &'a str,
    pub claims: &'a str,
    pub signature: &'a str,
}

impl TokenParts<'_> {
    /// 受信したままのセグメントから署名対象を組み立てる。再エンコードはしない。
    pub fn signing_input(&self) -> String {
        format!("{}{}{}", self.header, DELIMITER, self.claims)
    }
}

/// ヘッダーと Claims をそれぞれ JSON 化し、base64url（パディングなし）でエンコードする。
pub fn encode(header: &Header, claims: &Claims) -> Result<EncodedSegments, AuthError> {
    Ok(EncodedSegments {
        header: encode_segment(header)?,
        claims: encode_segment(claims)?,
    })
}

fn encode_segment<T: Serialize>(value: &T) -> Result<String, AuthError> {
    let json = serde_json::to_vec(value).map_err(|e| AuthError::Encoding(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

/// Claims セグメントをデコードする。
pub fn decode_claims(segment: &str) -> Result<Claims, AuthError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| AuthError::InvalidPayload)?;
    serde_json::from_slice(&bytes).map_err(|_| AuthError::InvalidPayload)
}

/// トークンを `.` で分割する。空でない 3 セグメントでなければ `MalformedToken`。
pub fn split(token: &str) -> Result<TokenParts<'_>, AuthError> {
    let mut parts = token.split(DELIMITER);
    let (Some(header), Some(claims), Some(signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(AuthError::MalformedToken);
    };

    if header.is_empty() || claims.is_empty() || signature.is_empty() {
        return Err(AuthError::MalformedToken);
    }

    Ok(TokenParts {
        header,
        claims,
        signature,
    })
}

/// 署名を検証せずに Claims を取り出す。信頼できる判定には使わないこと。
pub fn peek_claims(token: &str) -> Result<Claims, AuthError> {
    let parts = split(token)?;
    decode_claims(parts.claims)
}

/// セグメントを連結してトークン文字列を作る。
pub fn join(segments: &EncodedSegments, signature: &str) -> String {
    format!(
        "{}{}{}{}{}",
        segments.header, DELIMITER, segments.claims, DELIMITER, signature
    )
}

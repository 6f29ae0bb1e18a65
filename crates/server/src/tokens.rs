//! Capability token codec.
//!
//! Every grant the server hands out (joining a room, uploading a blob,
//! downloading a blob) is a compact signed token (HS256, three dot-separated
//! base64url segments) carrying subject, room, scope, and expiry. Nothing is
//! stored server-side and nothing can be revoked early; the embedded expiry
//! is the only lifetime control.
//!
//! Each scope signs with its own secret, so a leaked download secret cannot
//! mint upload tokens. The scope claim inside the payload is checked again at
//! verification as defense in depth.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Ceiling for invite token lifetimes.
pub const MAX_JOIN_TTL_SECS: i64 = 86_400;
/// Ceiling for upload token lifetimes.
pub const MAX_UPLOAD_TTL_SECS: i64 = 3600;
/// Ceiling for download token lifetimes.
pub const MAX_DOWNLOAD_TTL_SECS: i64 = 900;

/// The action a capability token permits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Join,
    Upload,
    Download,
}

/// Signed token payload: subject, room binding, scope, issued-at, expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    pub room_id: String,
    pub scope: Scope,
    pub iat: i64,
    pub exp: i64,
}

/// The single failure outcome for verification. Malformed tokens, bad
/// signatures, wrong scopes, and expired tokens are deliberately
/// indistinguishable.
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("invalid token")]
pub struct TokenInvalid;

struct ScopeKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl ScopeKeys {
    fn from_secret(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

/// Mints and verifies capability tokens with one secret per scope.
pub struct TokenCodec {
    join: ScopeKeys,
    upload: ScopeKeys,
    download: ScopeKeys,
}

impl TokenCodec {
    pub fn new(join_secret: &[u8], upload_secret: &[u8], download_secret: &[u8]) -> Self {
        Self {
            join: ScopeKeys::from_secret(join_secret),
            upload: ScopeKeys::from_secret(upload_secret),
            download: ScopeKeys::from_secret(download_secret),
        }
    }

    fn keys(&self, scope: Scope) -> &ScopeKeys {
        match scope {
            Scope::Join => &self.join,
            Scope::Upload => &self.upload,
            Scope::Download => &self.download,
        }
    }

    /// Mint a token for `subject` on `room_id`. `ttl_seconds` must already be
    /// clamped by the caller to the scope's ceiling.
    pub fn mint(
        &self,
        scope: Scope,
        subject: &str,
        room_id: &str,
        ttl_seconds: i64,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now();
        let claims = TokenClaims {
            sub: subject.to_string(),
            room_id: room_id.to_string(),
            scope,
            iat: now.timestamp(),
            exp: (now + Duration::seconds(ttl_seconds)).timestamp(),
        };
        encode(&Header::default(), &claims, &self.keys(scope).encoding)
    }

    /// Verify a token against the given scope's secret and the current time.
    pub fn verify(&self, token: &str, scope: Scope) -> Result<TokenClaims, TokenInvalid> {
        self.verify_at(token, scope, Utc::now())
    }

    /// Verify against an explicit clock. Expiry is checked here rather than
    /// by the JWT library so the clock can be simulated in tests.
    pub fn verify_at(
        &self,
        token: &str,
        scope: Scope,
        now: DateTime<Utc>,
    ) -> Result<TokenClaims, TokenInvalid> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;

        let data = decode::<TokenClaims>(token, &self.keys(scope).decoding, &validation)
            .map_err(|_| TokenInvalid)?;
        let claims = data.claims;

        if claims.scope != scope {
            return Err(TokenInvalid);
        }
        if claims.exp <= now.timestamp() {
            return Err(TokenInvalid);
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> TokenCodec {
        TokenCodec::new(b"join-secret", b"upload-secret", b"download-secret")
    }

    #[test]
    fn mint_then_verify_round_trips() {
        let codec = codec();
        let token = codec
            .mint(Scope::Download, "blob-1", "room-1", 300)
            .unwrap();

        let claims = codec.verify(&token, Scope::Download).unwrap();
        assert_eq!(claims.sub, "blob-1");
        assert_eq!(claims.room_id, "room-1");
        assert_eq!(claims.scope, Scope::Download);
        assert_eq!(claims.exp - claims.iat, 300);
    }

    #[test]
    fn token_has_three_base64url_segments() {
        let codec = codec();
        let token = codec.mint(Scope::Join, "room-1", "room-1", 60).unwrap();
        let segments: Vec<&str> = token.split('.').collect();
        assert_eq!(segments.len(), 3);

        use base64::Engine;
        for segment in segments {
            base64::engine::general_purpose::URL_SAFE_NO_PAD
                .decode(segment)
                .unwrap();
        }
    }

    #[test]
    fn verify_fails_after_expiry() {
        let codec = codec();
        let token = codec.mint(Scope::Join, "room-1", "room-1", 60).unwrap();

        assert!(codec.verify(&token, Scope::Join).is_ok());
        let later = Utc::now() + Duration::seconds(61);
        assert!(codec.verify_at(&token, Scope::Join, later).is_err());
    }

    #[test]
    fn verify_fails_against_other_scopes_secret() {
        let codec = codec();
        let token = codec.mint(Scope::Upload, "blob-1", "room-1", 60).unwrap();

        assert!(codec.verify(&token, Scope::Upload).is_ok());
        assert!(codec.verify(&token, Scope::Download).is_err());
        assert!(codec.verify(&token, Scope::Join).is_err());
    }

    #[test]
    fn verify_rejects_any_byte_alteration() {
        let codec = codec();
        let token = codec.mint(Scope::Download, "blob-1", "room-1", 60).unwrap();

        // Flip one character in each of the three segments.
        let dot_positions: Vec<usize> = token
            .char_indices()
            .filter(|(_, c)| *c == '.')
            .map(|(i, _)| i)
            .collect();
        for &pos in &[1, dot_positions[0] + 2, dot_positions[1] + 2] {
            let mut bytes = token.clone().into_bytes();
            bytes[pos] = if bytes[pos] == b'A' { b'B' } else { b'A' };
            let tampered = String::from_utf8(bytes).unwrap();
            assert!(
                codec.verify(&tampered, Scope::Download).is_err(),
                "tampering at byte {pos} was accepted"
            );
        }
    }

    #[test]
    fn verify_rejects_truncation_and_garbage() {
        let codec = codec();
        let token = codec.mint(Scope::Download, "blob-1", "room-1", 60).unwrap();

        assert!(codec
            .verify(&token[..token.len() - 2], Scope::Download)
            .is_err());
        assert!(codec.verify("", Scope::Download).is_err());
        assert!(codec.verify("not.a.token", Scope::Download).is_err());
    }
}

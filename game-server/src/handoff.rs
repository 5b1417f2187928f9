//! Short-lived signed capability tokens for moving a player onto the
//! instance that serves their game.
//!
//! Wire layout: base64url (no padding) over the JSON envelope
//! `{payload: {player_id, game_id}, exp, sig}` where `sig` is the
//! base64url-encoded HMAC-SHA256 of the JSON `{payload, exp}` under the
//! shared secret. Verification is constant time and rejects anything past
//! its expiry, signed with another secret, or structurally off.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use hanafuda::ids::{GameId, PlayerId};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Token lifetime.
pub const HANDOFF_TTL_SECONDS: i64 = 30;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HandoffError {
    #[error("handoff token is structurally malformed")]
    Malformed,
    #[error("handoff token expired")]
    Expired,
    #[error("handoff token signature mismatch")]
    BadSignature,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct TokenPayload {
    player_id: PlayerId,
    game_id: GameId,
}

/// The part covered by the signature. Field order matters: both ends
/// serialize this struct, so the signed bytes are deterministic.
#[derive(Serialize)]
struct SignedPart<'a> {
    payload: &'a TokenPayload,
    exp: i64,
}

#[derive(Serialize, Deserialize)]
struct TokenEnvelope {
    payload: TokenPayload,
    exp: i64,
    sig: String,
}

/// Issues and verifies handoff tokens under one shared secret.
pub struct HandoffTokens {
    secret: Vec<u8>,
}

impl HandoffTokens {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        HandoffTokens {
            secret: secret.into(),
        }
    }

    fn sign(&self, payload: &TokenPayload, exp: i64) -> String {
        let body = serde_json::to_vec(&SignedPart { payload, exp })
            .expect("signed part serialization cannot fail");
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .expect("hmac accepts keys of any length");
        mac.update(&body);
        URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
    }

    /// Mints a token binding the player to the game, valid for
    /// [`HANDOFF_TTL_SECONDS`] from `now`.
    pub fn create(&self, player_id: PlayerId, game_id: GameId, now: DateTime<Utc>) -> String {
        let payload = TokenPayload { player_id, game_id };
        let exp = now.timestamp() + HANDOFF_TTL_SECONDS;
        let sig = self.sign(&payload, exp);
        let envelope = TokenEnvelope { payload, exp, sig };
        let json = serde_json::to_vec(&envelope).expect("envelope serialization cannot fail");
        URL_SAFE_NO_PAD.encode(json)
    }

    /// Checks expiry and signature, returning the authorized pair.
    pub fn verify(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<(PlayerId, GameId), HandoffError> {
        let json = URL_SAFE_NO_PAD
            .decode(token.as_bytes())
            .map_err(|_| HandoffError::Malformed)?;
        let envelope: TokenEnvelope =
            serde_json::from_slice(&json).map_err(|_| HandoffError::Malformed)?;

        if envelope.exp <= now.timestamp() {
            return Err(HandoffError::Expired);
        }

        let provided = URL_SAFE_NO_PAD
            .decode(envelope.sig.as_bytes())
            .map_err(|_| HandoffError::Malformed)?;
        let body = serde_json::to_vec(&SignedPart {
            payload: &envelope.payload,
            exp: envelope.exp,
        })
        .expect("signed part serialization cannot fail");
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .expect("hmac accepts keys of any length");
        mac.update(&body);
        // verify_slice compares in constant time.
        mac.verify_slice(&provided)
            .map_err(|_| HandoffError::BadSignature)?;

        Ok((envelope.payload.player_id, envelope.payload.game_id))
    }
}

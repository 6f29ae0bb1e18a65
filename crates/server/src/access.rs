//! Access-control gate.
//!
//! The checks every externally-triggered operation applies, in order:
//! resolve the resource, verify the capability token against its scope's
//! secret and the resource binding, then any join-specific checks (PIN,
//! member cap). A token with the right shape but the wrong scope, subject,
//! or room is rejected exactly like a forged one.

use chrono::Utc;

use crate::error::{Error, Result};
use crate::models::Room;
use crate::store::SessionStore;
use crate::tokens::{Scope, TokenClaims, TokenCodec};

/// Resolve a room, treating expired-but-not-yet-reclaimed records as absent.
/// Expiry must be indistinguishable from never-existed.
pub async fn resolve_room(store: &dyn SessionStore, room_id: &str) -> Result<Room> {
    let room = store.get_room(room_id).await?.ok_or(Error::NotFound)?;
    if room.remaining_ttl_seconds(Utc::now()).is_none() {
        return Err(Error::NotFound);
    }
    Ok(room)
}

/// Verify a token and bind it to the operation: scope, subject, and room
/// must all match. Any mismatch is `Forbidden` with no further detail.
pub fn authorize(
    codec: &TokenCodec,
    token: &str,
    scope: Scope,
    subject: &str,
    room_id: &str,
) -> Result<TokenClaims> {
    let claims = codec.verify(token, scope)?;
    if claims.sub != subject || claims.room_id != room_id {
        return Err(Error::Forbidden);
    }
    Ok(claims)
}

/// Check a join attempt's PIN against the room's stored hash, if any.
pub fn check_pin(room: &Room, pin: Option<&str>) -> Result<()> {
    match (&room.pin_hash, pin) {
        (None, _) => Ok(()),
        (Some(hash), Some(pin)) => {
            if bcrypt::verify(pin, hash)? {
                Ok(())
            } else {
                Err(Error::Forbidden)
            }
        }
        (Some(_), None) => Err(Error::Forbidden),
    }
}

/// Reject a join once the room's member cap is reached.
pub fn check_capacity(room: &Room, current_members: u64) -> Result<()> {
    match room.max_members {
        Some(cap) if current_members >= cap => Err(Error::Forbidden),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn room_with(pin_hash: Option<String>, max_members: Option<u64>) -> Room {
        let now = Utc::now();
        Room {
            id: "room-1".into(),
            created_at: now,
            expires_at: now + Duration::seconds(600),
            pin_hash,
            max_members,
        }
    }

    #[test]
    fn pin_check_passes_without_a_pin_set() {
        let room = room_with(None, None);
        assert!(check_pin(&room, None).is_ok());
        assert!(check_pin(&room, Some("whatever")).is_ok());
    }

    #[test]
    fn pin_check_requires_matching_pin() {
        let hash = bcrypt::hash("4321", bcrypt::DEFAULT_COST).unwrap();
        let room = room_with(Some(hash), None);

        assert!(check_pin(&room, Some("4321")).is_ok());
        assert!(matches!(check_pin(&room, Some("1234")), Err(Error::Forbidden)));
        assert!(matches!(check_pin(&room, None), Err(Error::Forbidden)));
    }

    #[test]
    fn capacity_check_rejects_at_cap() {
        let room = room_with(None, Some(2));
        assert!(check_capacity(&room, 0).is_ok());
        assert!(check_capacity(&room, 1).is_ok());
        assert!(matches!(check_capacity(&room, 2), Err(Error::Forbidden)));
    }

    #[test]
    fn authorize_rejects_wrong_subject_or_room() {
        let codec = TokenCodec::new(b"j", b"u", b"d");
        let token = codec.mint(Scope::Download, "blob-1", "room-1", 60).unwrap();

        assert!(authorize(&codec, &token, Scope::Download, "blob-1", "room-1").is_ok());
        assert!(authorize(&codec, &token, Scope::Download, "blob-2", "room-1").is_err());
        assert!(authorize(&codec, &token, Scope::Download, "blob-1", "room-2").is_err());
        assert!(authorize(&codec, &token, Scope::Upload, "blob-1", "room-1").is_err());
    }
}

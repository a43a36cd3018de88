//! Socket authentication for the event bus
//!
//! Every socket presents a signed token naming either a team (bound to its
//! registered contest) or an admin. A team socket may join only its own
//! team room and its contest's room; admins may join anything.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

use super::bus::Room;

/// Token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Team or admin id
    pub sub: Uuid,
    /// Registered contest, absent for admin tokens
    pub contest_id: Option<Uuid>,
    pub admin: bool,
    pub exp: i64,
}

/// Authenticated socket identity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Principal {
    Team { team_id: Uuid, contest_id: Uuid },
    Admin { admin_id: Uuid },
}

impl Principal {
    /// Whether this principal may join `room`
    pub fn may_join(&self, room: Room) -> bool {
        match self {
            Self::Admin { .. } => true,
            Self::Team {
                team_id,
                contest_id,
            } => match room {
                Room::Team(id) => id == *team_id,
                Room::Contest(id) => id == *contest_id,
                Room::Admins => false,
            },
        }
    }

    /// Rooms a principal is subscribed to on connect
    pub fn default_rooms(&self) -> Vec<Room> {
        match self {
            Self::Admin { .. } => vec![Room::Admins],
            Self::Team {
                team_id,
                contest_id,
            } => vec![Room::Team(*team_id), Room::Contest(*contest_id)],
        }
    }
}

/// Verifies and mints event-bus tokens
#[derive(Clone)]
pub struct TokenVerifier {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Validate a token and resolve its principal
    pub fn verify(&self, token: &str) -> AppResult<Principal> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::default())?;
        let claims = data.claims;

        if claims.admin {
            return Ok(Principal::Admin {
                admin_id: claims.sub,
            });
        }

        let contest_id = claims.contest_id.ok_or(AppError::InvalidToken)?;
        Ok(Principal::Team {
            team_id: claims.sub,
            contest_id,
        })
    }

    /// Mint a token (session issuance lives outside the core; this backs
    /// tests and tooling)
    pub fn mint(&self, claims: &Claims) -> AppResult<String> {
        Ok(encode(&Header::default(), claims, &self.encoding)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn verifier() -> TokenVerifier {
        TokenVerifier::new("test-secret")
    }

    fn team_claims(team_id: Uuid, contest_id: Uuid) -> Claims {
        Claims {
            sub: team_id,
            contest_id: Some(contest_id),
            admin: false,
            exp: (Utc::now().timestamp()) + 3600,
        }
    }

    #[test]
    fn test_team_token_round_trip() {
        let v = verifier();
        let team_id = Uuid::new_v4();
        let contest_id = Uuid::new_v4();

        let token = v.mint(&team_claims(team_id, contest_id)).unwrap();
        let principal = v.verify(&token).unwrap();

        assert_eq!(
            principal,
            Principal::Team {
                team_id,
                contest_id
            }
        );
    }

    #[test]
    fn test_room_authorization() {
        let team_id = Uuid::new_v4();
        let contest_id = Uuid::new_v4();
        let team = Principal::Team {
            team_id,
            contest_id,
        };

        assert!(team.may_join(Room::Team(team_id)));
        assert!(team.may_join(Room::Contest(contest_id)));
        assert!(!team.may_join(Room::Contest(Uuid::new_v4())));
        assert!(!team.may_join(Room::Admins));

        let admin = Principal::Admin {
            admin_id: Uuid::new_v4(),
        };
        assert!(admin.may_join(Room::Admins));
        assert!(admin.may_join(Room::Contest(contest_id)));
    }

    #[test]
    fn test_expired_token_rejected() {
        let v = verifier();
        let mut claims = team_claims(Uuid::new_v4(), Uuid::new_v4());
        claims.exp = Utc::now().timestamp() - 600;

        let token = v.mint(&claims).unwrap();
        assert!(matches!(v.verify(&token), Err(AppError::TokenExpired)));
    }

    #[test]
    fn test_garbage_token_rejected() {
        let v = verifier();
        assert!(v.verify("not-a-token").is_err());
    }
}

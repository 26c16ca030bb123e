use chrono::{TimeDelta, Utc};
use diesel::prelude::*;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome, Request};
use serde::{Deserialize, Serialize};

use crate::db::DbPool;
use crate::error::ApiError;
use crate::schema::users;

const TOKEN_LIFETIME_HOURS: i64 = 24;

// Dev fallback; set JWT_SECRET in any real deployment.
fn jwt_secret() -> String {
    std::env::var("JWT_SECRET").unwrap_or_else(|_| "mediahub-dev-secret".to_string())
}

/// Check-in and restart-service ship unauthenticated, matching the
/// trusted-network assumption the fleet was deployed under. Setting
/// REQUIRE_DEVICE_AUTH=1 closes them behind the bearer token. This is a
/// known hardening gap, kept configurable on purpose.
pub fn require_device_auth() -> bool {
    matches!(
        std::env::var("REQUIRE_DEVICE_AUTH").as_deref(),
        Ok("1") | Ok("true")
    )
}

#[derive(Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
}

pub fn issue_token(username: &str) -> Result<String, ApiError> {
    let claims = Claims {
        sub: username.to_string(),
        exp: (Utc::now() + TimeDelta::hours(TOKEN_LIFETIME_HOURS)).timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(jwt_secret().as_bytes()),
    )
    .map_err(|e| ApiError::Internal(format!("Cannot issue token: {e}")))
}

pub fn decode_token(token: &str) -> Result<Claims, ApiError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret().as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => ApiError::Unauthorized("Token has expired".into()),
        _ => ApiError::Unauthorized("Token is invalid".into()),
    })
}

/// Queryable user row
#[derive(Queryable, Selectable, Clone, Debug)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct UserRow {
    pub id: i32,
    pub username: String,
    pub password_hash: String,
}

/// Authenticated management user, resolved from the bearer token. The
/// user must still exist; tokens for deleted accounts stop working.
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub id: i32,
    pub username: String,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthUser {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let Some(pool) = req.rocket().state::<DbPool>() else {
            return Outcome::Error((Status::InternalServerError, ()));
        };

        let token = req
            .headers()
            .get_one("Authorization")
            .and_then(|h| h.strip_prefix("Bearer "));
        let Some(token) = token else {
            return Outcome::Error((Status::Unauthorized, ()));
        };
        let claims = match decode_token(token) {
            Ok(claims) => claims,
            Err(_) => return Outcome::Error((Status::Unauthorized, ())),
        };

        let pool = pool.clone();
        let username = claims.sub;
        let lookup = rocket::tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().ok()?;
            users::table
                .filter(users::username.eq(&username))
                .select(UserRow::as_select())
                .first::<UserRow>(&mut conn)
                .optional()
                .ok()
                .flatten()
        })
        .await;

        match lookup {
            Ok(Some(user)) => Outcome::Success(AuthUser {
                id: user.id,
                username: user.username,
            }),
            Ok(None) => Outcome::Error((Status::Unauthorized, ())),
            Err(_) => Outcome::Error((Status::InternalServerError, ())),
        }
    }
}

/// Marker guard satisfied when the request comes from a kiosk agent
/// rather than the management UI. Detection is by request headers, not
/// by the kiosk's own identity; agents set a User-Agent containing
/// `Kiosk-Device`, and polls issued right after a check-in carry the
/// check-in URL as Referer.
pub struct DeviceClient;

#[rocket::async_trait]
impl<'r> FromRequest<'r> for DeviceClient {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let user_agent = req.headers().get_one("User-Agent").unwrap_or("");
        let referer = req.headers().get_one("Referer").unwrap_or("");
        if user_agent.contains("Kiosk-Device") || referer.contains("/api/device/") {
            Outcome::Success(DeviceClient)
        } else {
            Outcome::Forward(Status::NotFound)
        }
    }
}

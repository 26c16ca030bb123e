use std::net::IpAddr;

use chrono::Utc;
use rocket::State;
use rocket::serde::json::Json;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::auth::{self, AuthUser};
use crate::db::DbPool;
use crate::error::ApiError;
use crate::registry;
use crate::routes::run_db;

#[derive(Deserialize, Default)]
struct CheckInBody {
    ip_address: Option<String>,
    mac_address: Option<String>,
}

/// Agents are not guaranteed to send JSON; some firmware PUTs the bare
/// MAC address as plain text, and some send nothing at all.
fn parse_check_in_body(raw: &str) -> CheckInBody {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return CheckInBody::default();
    }
    serde_json::from_str::<CheckInBody>(trimmed).unwrap_or_else(|_| CheckInBody {
        ip_address: None,
        mac_address: Some(trimmed.to_string()),
    })
}

#[post("/device/<serial>/ip", data = "<body>")]
pub async fn check_in_post(
    pool: &State<DbPool>,
    user: Option<AuthUser>,
    serial: &str,
    body: String,
    client_ip: Option<IpAddr>,
) -> Result<Json<Value>, ApiError> {
    handle_check_in(pool, user, serial, body, client_ip).await
}

#[put("/device/<serial>/ip", data = "<body>")]
pub async fn check_in_put(
    pool: &State<DbPool>,
    user: Option<AuthUser>,
    serial: &str,
    body: String,
    client_ip: Option<IpAddr>,
) -> Result<Json<Value>, ApiError> {
    handle_check_in(pool, user, serial, body, client_ip).await
}

async fn handle_check_in(
    pool: &State<DbPool>,
    user: Option<AuthUser>,
    serial: &str,
    body: String,
    client_ip: Option<IpAddr>,
) -> Result<Json<Value>, ApiError> {
    if auth::require_device_auth() && user.is_none() {
        return Err(ApiError::Unauthorized("A valid bearer token is required".into()));
    }

    let CheckInBody {
        ip_address,
        mac_address,
    } = parse_check_in_body(&body);

    // Fall back to the peer address the report actually came from.
    let ip_address = ip_address
        .filter(|ip| !ip.is_empty())
        .or_else(|| client_ip.map(|addr| addr.to_string()));

    let serial = serial.to_string();
    run_db(pool, move |conn| {
        registry::report_check_in(
            conn,
            &serial,
            ip_address.as_deref(),
            mac_address.as_deref(),
            Utc::now().naive_utc(),
        )
    })
    .await?;

    Ok(Json(json!({ "status": "ok", "action": "updated" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_body_is_parsed() {
        let body = parse_check_in_body(r#"{"ip_address": "10.0.0.5", "mac_address": "aa:bb"}"#);
        assert_eq!(body.ip_address.as_deref(), Some("10.0.0.5"));
        assert_eq!(body.mac_address.as_deref(), Some("aa:bb"));
    }

    #[test]
    fn raw_text_body_is_taken_as_mac() {
        let body = parse_check_in_body("  b8:27:eb:12:34:56\n");
        assert_eq!(body.mac_address.as_deref(), Some("b8:27:eb:12:34:56"));
        assert!(body.ip_address.is_none());
    }

    #[test]
    fn empty_body_is_tolerated() {
        let body = parse_check_in_body("");
        assert!(body.ip_address.is_none());
        assert!(body.mac_address.is_none());
    }
}

use std::path::PathBuf;

use chrono::Utc;
use rocket::State;
use rocket::http::Status;
use rocket::request::Request;
use rocket::response::{self, Responder, Response};
use rocket::serde::json::Json;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::auth::{self, AuthUser, DeviceClient};
use crate::db::{self, DbPool};
use crate::error::ApiError;
use crate::models::{FtpCredentials, Kiosk, KioskChanges};
use crate::registry::{self, AddKioskRequest};
use crate::routes::{run_db, run_remote};
use crate::ssh::SshConnection;

/// Full listing for the management UI, or the minimal projection when
/// the request carries the kiosk-agent marker. The minimal variant also
/// signals the frontend not to refresh via `X-No-Refresh`.
pub enum KioskListResponse {
    Full(Json<Vec<Kiosk>>),
    Minimal(Json<Value>),
}

impl<'r> Responder<'r, 'static> for KioskListResponse {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'static> {
        match self {
            KioskListResponse::Full(body) => body.respond_to(req),
            KioskListResponse::Minimal(body) => Response::build_from(body.respond_to(req)?)
                .raw_header("X-No-Refresh", "true")
                .ok(),
        }
    }
}

#[get("/kiosks")]
pub async fn list_kiosks(
    pool: &State<DbPool>,
    _user: AuthUser,
    device: Option<DeviceClient>,
) -> Result<KioskListResponse, ApiError> {
    if device.is_some() {
        let summaries = run_db(pool, registry::list_kiosk_summaries).await?;
        return Ok(KioskListResponse::Minimal(Json(json!({
            "kiosks": summaries,
            "no_refresh": true,
        }))));
    }
    let kiosks = run_db(pool, registry::list_kiosks).await?;
    Ok(KioskListResponse::Full(Json(kiosks)))
}

#[post("/kiosks", data = "<body>")]
pub async fn add_kiosk(
    pool: &State<DbPool>,
    _user: AuthUser,
    body: Json<AddKioskRequest>,
) -> Result<(Status, Json<Value>), ApiError> {
    let request = body.into_inner();
    let id = run_db(pool, move |conn| registry::add_kiosk(conn, &request)).await?;
    Ok((
        Status::Created,
        Json(json!({ "id": id, "message": "Kiosk added successfully" })),
    ))
}

#[put("/kiosks/<id>", data = "<body>")]
pub async fn update_kiosk(
    pool: &State<DbPool>,
    _user: AuthUser,
    id: i32,
    body: Json<KioskChanges>,
) -> Result<Json<Value>, ApiError> {
    let changes = body.into_inner();
    run_db(pool, move |conn| registry::update_kiosk(conn, id, changes)).await?;
    Ok(Json(json!({ "message": "Kiosk updated successfully" })))
}

#[delete("/kiosks/<id>")]
pub async fn delete_kiosk(pool: &State<DbPool>, _user: AuthUser, id: i32) -> Result<Status, ApiError> {
    run_db(pool, move |conn| registry::delete_kiosk(conn, id)).await?;
    Ok(Status::NoContent)
}

#[get("/kiosks/<id>/ftp-credentials")]
pub async fn get_ftp_credentials(
    pool: &State<DbPool>,
    _user: AuthUser,
    id: i32,
) -> Result<Json<FtpCredentials>, ApiError> {
    let creds = run_db(pool, move |conn| registry::ftp_credentials(conn, id)).await?;
    Ok(Json(creds))
}

#[derive(Deserialize, Default)]
pub struct RestartRequest {
    pub username: Option<String>,
    pub port: Option<u16>,
}

/// The service name is interpolated into a remote shell command, so only
/// plain systemd unit names pass. Anything else never reaches the kiosk.
fn validate_unit_name(name: &str) -> Result<(), ApiError> {
    let plain = !name.is_empty()
        && name.len() <= 128
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '@' | ':'));
    if !plain {
        return Err(ApiError::InvalidInput(format!("Invalid service name: {name}")));
    }
    Ok(())
}

/// Restarts the kiosk display service over SSH. The command is fixed;
/// which unit it names comes from the bearer-protected
/// `defaultSshService` setting, never from the request. Username and
/// port resolve request over settings over built-in defaults. Tries a
/// privileged restart first and falls back to a user-level restart when
/// that exits nonzero.
#[post("/kiosks/<id>/restart-service", data = "<body>")]
pub async fn restart_service(
    pool: &State<DbPool>,
    user: Option<AuthUser>,
    id: i32,
    body: Option<Json<RestartRequest>>,
) -> Result<Json<Value>, ApiError> {
    if auth::require_device_auth() && user.is_none() {
        return Err(ApiError::Unauthorized("A valid bearer token is required".into()));
    }
    let request = body.map(Json::into_inner).unwrap_or_default();

    let (name, ip_address, ssh_username, ssh_port, service) = run_db(pool, move |conn| {
        let (name, ip_address) = registry::kiosk_address(conn, id)?;
        let ssh_username = match request.username {
            Some(u) => u,
            None => db::get_setting(conn, "defaultSshUsername")?.unwrap_or_else(|| "kiosk".into()),
        };
        let ssh_port = match request.port {
            Some(p) => p,
            None => db::get_setting(conn, "defaultSshPort")?
                .and_then(|v| v.parse::<u16>().ok())
                .unwrap_or(22),
        };
        let service =
            db::get_setting(conn, "defaultSshService")?.unwrap_or_else(|| "kiosk.service".into());
        Ok((name, ip_address, ssh_username, ssh_port, service))
    })
    .await?;

    validate_unit_name(&service)?;

    let ip_address = ip_address
        .filter(|ip| !ip.is_empty())
        .ok_or_else(|| ApiError::InvalidInput("Kiosk has no assigned IP address".into()))?;

    let key_path = PathBuf::from(
        std::env::var("SSH_KEY_PATH").unwrap_or_else(|_| "ssh_keys/kiosk_id_rsa".to_string()),
    );

    let display_name = if name.is_empty() { id.to_string() } else { name };
    log::info!("restarting {service} on kiosk {display_name} ({ssh_username}@{ip_address}:{ssh_port})");

    run_remote(move || {
        let conn = SshConnection::connect(&ip_address, ssh_port, &ssh_username, &key_path)?;
        let output = conn.exec(&format!("sudo systemctl restart {service}"))?;
        if output.exit_code != 0 {
            log::warn!("privileged restart exited {}, retrying user-level", output.exit_code);
            let output = conn.exec(&format!("systemctl --user restart {service}"))?;
            if output.exit_code != 0 {
                return Err(ApiError::Remote(format!(
                    "Service restart failed (exit {}): {}",
                    output.exit_code,
                    output.stderr.trim()
                )));
            }
        }
        Ok(())
    })
    .await?;

    // A successful SSH round trip counts as contact from the kiosk.
    run_db(pool, move |conn| registry::mark_seen(conn, id, Utc::now().naive_utc())).await?;

    Ok(Json(json!({
        "message": format!("Kiosk service restarted successfully on {display_name}"),
    })))
}

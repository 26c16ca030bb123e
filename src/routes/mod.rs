use diesel::sqlite::SqliteConnection;
use rocket::{Catcher, Route};

use crate::db::DbPool;
use crate::error::ApiError;

pub mod auth;
pub mod device;
pub mod ftp;
pub mod kiosks;
pub mod settings;

/// API routes
pub fn api_routes() -> Vec<Route> {
    routes![
        // Auth
        auth::login,
        // Kiosk registry
        kiosks::list_kiosks,
        kiosks::add_kiosk,
        kiosks::update_kiosk,
        kiosks::delete_kiosk,
        kiosks::get_ftp_credentials,
        kiosks::restart_service,
        // Device check-in
        device::check_in_post,
        device::check_in_put,
        // Settings
        settings::get_settings,
        settings::update_settings,
        // FTP broker
        ftp::test_connection,
        ftp::list_files,
        ftp::upload_file,
        ftp::download_file,
        ftp::delete_file,
        ftp::delete_multiple,
        ftp::make_directory,
        ftp::get_file_content,
        ftp::put_file_content,
    ]
}

/// Error catchers so guard failures and malformed bodies come back as
/// the same `{"error": ...}` shape the handlers produce.
pub fn api_catchers() -> Vec<Catcher> {
    catchers![bad_request, unauthorized, not_found, unprocessable, internal_error]
}

#[catch(400)]
fn bad_request() -> ApiError {
    ApiError::InvalidInput("Malformed request".into())
}

#[catch(401)]
fn unauthorized() -> ApiError {
    ApiError::Unauthorized("A valid bearer token is required".into())
}

#[catch(404)]
fn not_found() -> ApiError {
    ApiError::NotFound("Resource not found".into())
}

// Rocket signals undeserializable JSON as 422; the API contract calls
// that invalid input, which responds as 400.
#[catch(422)]
fn unprocessable() -> ApiError {
    ApiError::InvalidInput("Malformed or missing request fields".into())
}

#[catch(500)]
fn internal_error() -> ApiError {
    ApiError::Internal("Internal server error".into())
}

/// Runs a registry/database closure on the blocking pool.
pub(crate) async fn run_db<T, F>(pool: &DbPool, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&mut SqliteConnection) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let pool = pool.clone();
    rocket::tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        f(&mut conn)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("Blocking task failed: {e}")))?
}

/// Runs a remote-protocol closure (FTP/SSH) on the blocking pool.
pub(crate) async fn run_remote<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    rocket::tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(format!("Blocking task failed: {e}")))?
}

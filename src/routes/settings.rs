use std::collections::BTreeMap;

use rocket::State;
use rocket::serde::json::Json;
use serde_json::{Value, json};

use crate::auth::AuthUser;
use crate::db::{self, DbPool};
use crate::error::ApiError;
use crate::routes::run_db;

/// All settings as one flat key -> value object.
#[get("/settings")]
pub async fn get_settings(
    pool: &State<DbPool>,
    _user: AuthUser,
) -> Result<Json<BTreeMap<String, String>>, ApiError> {
    let settings = run_db(pool, db::load_settings_map).await?;
    Ok(Json(settings))
}

/// Upserts every provided pair.
#[post("/settings", data = "<body>")]
pub async fn update_settings(
    pool: &State<DbPool>,
    _user: AuthUser,
    body: Json<BTreeMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
    let values = body.into_inner();
    if values.is_empty() {
        return Err(ApiError::InvalidInput("No data to update".into()));
    }
    run_db(pool, move |conn| db::save_settings_map(conn, &values)).await?;
    Ok(Json(json!({ "message": "Settings updated successfully" })))
}

use diesel::prelude::*;
use rocket::State;
use rocket::serde::json::Json;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::auth::{UserRow, issue_token};
use crate::db::DbPool;
use crate::error::ApiError;
use crate::routes::run_db;
use crate::schema::users;

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Verifies credentials and issues a 24h bearer token.
#[post("/auth/login", data = "<body>")]
pub async fn login(pool: &State<DbPool>, body: Json<LoginRequest>) -> Result<Json<Value>, ApiError> {
    let LoginRequest { username, password } = body.into_inner();
    let (Some(username), Some(password)) = (username, password) else {
        return Err(ApiError::InvalidInput("Missing login credentials".into()));
    };

    let lookup = username.clone();
    let verified = run_db(pool, move |conn| {
        let user = users::table
            .filter(users::username.eq(&lookup))
            .select(UserRow::as_select())
            .first::<UserRow>(conn)
            .optional()?;
        // bcrypt check stays on the blocking pool with the query.
        Ok(match user {
            Some(user) => bcrypt::verify(&password, &user.password_hash).unwrap_or(false),
            None => false,
        })
    })
    .await?;

    if !verified {
        return Err(ApiError::Unauthorized("Invalid username or password".into()));
    }

    let token = issue_token(&username)?;
    Ok(Json(json!({
        "success": true,
        "username": username,
        "token": token,
        "message": "Login successful",
    })))
}

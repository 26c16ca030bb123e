use std::collections::BTreeMap;
use std::env;

use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use flexi_logger::{Age, Cleanup, Criterion, FileSpec, Logger, Naming};

use crate::error::ApiError;
use crate::schema::settings;

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;
pub type DbConn = PooledConnection<ConnectionManager<SqliteConnection>>;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

/// Initialize logger
pub fn init_logger() {
    Logger::try_with_str("info")
        .unwrap()
        .log_to_file(FileSpec::default().directory("logs"))
        .rotate(
            Criterion::Age(Age::Day),
            Naming::Numbers,
            Cleanup::KeepLogFiles(7),
        )
        .start()
        .unwrap();
}

/// Initialize DB connection pool
pub fn init_pool() -> DbPool {
    let database_url = env::var("DATABASE_URL").unwrap_or_else(|_| "kiosks.db".to_string());
    init_pool_with_url(&database_url)
}

pub fn init_pool_with_url(database_url: &str) -> DbPool {
    let manager = ConnectionManager::<SqliteConnection>::new(database_url);
    Pool::builder()
        .build(manager)
        .expect("Failed to create DB pool")
}

pub fn run_migrations(conn: &mut SqliteConnection) -> anyhow::Result<()> {
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow::anyhow!("failed to run migrations: {e}"))?;
    Ok(())
}

/// Create default admin user if the users table is empty
pub fn create_default_admin(conn: &mut SqliteConnection) -> anyhow::Result<()> {
    use crate::schema::users::dsl::*;

    let count: i64 = users.count().get_result(conn)?;
    if count == 0 {
        let hash = bcrypt::hash("admin", bcrypt::DEFAULT_COST)?;
        diesel::insert_into(users)
            .values((username.eq("admin"), password_hash.eq(hash)))
            .execute(conn)?;
        log::info!("default admin user created (admin / admin) - change the password");
    }
    Ok(())
}

/// All settings as a flat key -> value map.
pub fn load_settings_map(conn: &mut SqliteConnection) -> Result<BTreeMap<String, String>, ApiError> {
    let rows = settings::table
        .select((settings::key, settings::value))
        .load::<(String, String)>(conn)?;
    Ok(rows.into_iter().collect())
}

/// Upserts every provided pair. Keys are free-form; there is no schema
/// validation on settings.
pub fn save_settings_map(conn: &mut SqliteConnection, values: &BTreeMap<String, String>) -> Result<(), ApiError> {
    for (k, v) in values {
        diesel::replace_into(settings::table)
            .values((settings::key.eq(k), settings::value.eq(v)))
            .execute(conn)?;
    }
    Ok(())
}

pub fn get_setting(conn: &mut SqliteConnection, name: &str) -> Result<Option<String>, ApiError> {
    Ok(settings::table
        .filter(settings::key.eq(name))
        .select(settings::value)
        .first::<String>(conn)
        .optional()?)
}

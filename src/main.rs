#[macro_use]
extern crate rocket;

use rocket::{Build, Rocket};

mod auth;
mod db;
mod error;
mod ftp;
mod models;
mod obfuscation;
mod registry;
mod routes;
mod schema;
mod ssh;

#[cfg(test)]
mod tests;

use db::DbPool;

fn build_rocket(pool: DbPool) -> Rocket<Build> {
    rocket::build()
        .manage(pool)
        .mount("/api", routes::api_routes())
        .register("/", routes::api_catchers())
}

#[launch]
fn rocket() -> _ {
    db::init_logger();

    let pool = db::init_pool();
    {
        let mut conn = pool.get().expect("Failed to get DB connection");
        db::run_migrations(&mut conn).expect("Failed to run migrations");
        db::create_default_admin(&mut conn).expect("Failed to seed default admin");
    }

    build_rocket(pool)
}

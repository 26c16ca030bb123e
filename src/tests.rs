use chrono::{TimeDelta, Utc};
use diesel::prelude::*;
use rocket::http::{ContentType, Header, Status};
use rocket::local::blocking::Client;
use serde_json::{Value, json};

use crate::db::{self, DbPool};
use crate::schema::kiosks;

fn test_client() -> (Client, tempfile::TempPath) {
    let db_path = tempfile::NamedTempFile::new()
        .expect("temp db file")
        .into_temp_path();
    let pool = db::init_pool_with_url(db_path.to_str().expect("utf-8 temp path"));
    {
        let mut conn = pool.get().expect("pool connection");
        db::run_migrations(&mut conn).expect("migrations");
        db::create_default_admin(&mut conn).expect("default admin");
    }
    let client = Client::tracked(crate::build_rocket(pool)).expect("rocket instance");
    (client, db_path)
}

fn login(client: &Client) -> String {
    let resp = client
        .post("/api/auth/login")
        .header(ContentType::JSON)
        .body(r#"{"username":"admin","password":"admin"}"#)
        .dispatch();
    assert_eq!(resp.status(), Status::Ok);
    let body: Value = resp.into_json().expect("login body");
    body["token"].as_str().expect("token").to_string()
}

fn bearer(token: &str) -> Header<'static> {
    Header::new("Authorization", format!("Bearer {token}"))
}

fn add_kiosk(client: &Client, token: &str, mac: &str, serial: &str) -> i64 {
    let resp = client
        .post("/api/kiosks")
        .header(ContentType::JSON)
        .header(bearer(token))
        .body(json!({ "mac_address": mac, "serial_number": serial, "name": "lobby" }).to_string())
        .dispatch();
    assert_eq!(resp.status(), Status::Created);
    let body: Value = resp.into_json().expect("add body");
    body["id"].as_i64().expect("id")
}

#[test]
fn login_rejects_bad_credentials() {
    let (client, _db) = test_client();
    let resp = client
        .post("/api/auth/login")
        .header(ContentType::JSON)
        .body(r#"{"username":"admin","password":"wrong"}"#)
        .dispatch();
    assert_eq!(resp.status(), Status::Unauthorized);
    let body: Value = resp.into_json().unwrap();
    assert!(body["error"].is_string());
}

#[test]
fn kiosk_endpoints_require_bearer_token() {
    let (client, _db) = test_client();
    let resp = client.get("/api/kiosks").dispatch();
    assert_eq!(resp.status(), Status::Unauthorized);
    let body: Value = resp.into_json().unwrap();
    assert!(body["error"].is_string());
}

#[test]
fn kiosk_crud_flow() {
    let (client, _db) = test_client();
    let token = login(&client);

    let id = add_kiosk(&client, &token, "aa:bb:cc:dd:ee:01", "SN-100");

    // Either identity key colliding is a conflict.
    let dup = client
        .post("/api/kiosks")
        .header(ContentType::JSON)
        .header(bearer(&token))
        .body(json!({ "mac_address": "aa:bb:cc:dd:ee:01", "serial_number": "SN-200" }).to_string())
        .dispatch();
    assert_eq!(dup.status(), Status::Conflict);

    let missing = client
        .post("/api/kiosks")
        .header(ContentType::JSON)
        .header(bearer(&token))
        .body(json!({ "name": "no identity" }).to_string())
        .dispatch();
    assert_eq!(missing.status(), Status::BadRequest);

    let rename = client
        .put(format!("/api/kiosks/{id}"))
        .header(ContentType::JSON)
        .header(bearer(&token))
        .body(json!({ "name": "hall B" }).to_string())
        .dispatch();
    assert_eq!(rename.status(), Status::Ok);

    let empty_update = client
        .put(format!("/api/kiosks/{id}"))
        .header(ContentType::JSON)
        .header(bearer(&token))
        .body("{}")
        .dispatch();
    assert_eq!(empty_update.status(), Status::BadRequest);

    let unknown_update = client
        .put("/api/kiosks/9999")
        .header(ContentType::JSON)
        .header(bearer(&token))
        .body(json!({ "name": "ghost" }).to_string())
        .dispatch();
    assert_eq!(unknown_update.status(), Status::NotFound);

    let list = client.get("/api/kiosks").header(bearer(&token)).dispatch();
    assert_eq!(list.status(), Status::Ok);
    let body: Value = list.into_json().unwrap();
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["name"], "hall B");

    let del = client
        .delete(format!("/api/kiosks/{id}"))
        .header(bearer(&token))
        .dispatch();
    assert_eq!(del.status(), Status::NoContent);

    // Delete is idempotent by id: the second attempt is a 404.
    let again = client
        .delete(format!("/api/kiosks/{id}"))
        .header(bearer(&token))
        .dispatch();
    assert_eq!(again.status(), Status::NotFound);
}

#[test]
fn check_in_unknown_serial_is_rejected() {
    let (client, _db) = test_client();
    let resp = client
        .post("/api/device/NOPE/ip")
        .header(ContentType::JSON)
        .body(r#"{"ip_address":"10.0.0.9"}"#)
        .dispatch();
    assert_eq!(resp.status(), Status::NotFound);

    // Nothing was auto-created.
    let token = login(&client);
    let list = client.get("/api/kiosks").header(bearer(&token)).dispatch();
    let body: Value = list.into_json().unwrap();
    assert!(body.as_array().unwrap().is_empty());
}

#[test]
fn check_in_marks_kiosk_online() {
    let (client, _db) = test_client();
    let token = login(&client);
    add_kiosk(&client, &token, "aa:bb:cc:dd:ee:01", "SN-100");

    let resp = client
        .post("/api/device/SN-100/ip")
        .header(ContentType::JSON)
        .body(r#"{"ip_address":"192.168.1.50"}"#)
        .dispatch();
    assert_eq!(resp.status(), Status::Ok);
    let body: Value = resp.into_json().unwrap();
    assert_eq!(body["status"], "ok");

    let list = client.get("/api/kiosks").header(bearer(&token)).dispatch();
    let body: Value = list.into_json().unwrap();
    assert_eq!(body[0]["status"], "online");
    assert_eq!(body[0]["ip_address"], "192.168.1.50");

    // A raw-text PUT body carries just the MAC address.
    let resp = client
        .put("/api/device/SN-100/ip")
        .header(ContentType::Text)
        .body("b8:27:eb:12:34:56")
        .dispatch();
    assert_eq!(resp.status(), Status::Ok);

    let list = client.get("/api/kiosks").header(bearer(&token)).dispatch();
    let body: Value = list.into_json().unwrap();
    assert_eq!(body[0]["mac_address"], "b8:27:eb:12:34:56");
}

#[test]
fn stale_kiosk_flips_offline_on_next_list() {
    let (client, _db) = test_client();
    let token = login(&client);
    add_kiosk(&client, &token, "aa:bb:cc:dd:ee:01", "SN-100");

    client
        .post("/api/device/SN-100/ip")
        .header(ContentType::JSON)
        .body(r#"{"ip_address":"192.168.1.50"}"#)
        .dispatch();

    // Backdate the last report beyond the 60s threshold.
    let pool = client.rocket().state::<DbPool>().unwrap();
    let mut conn = pool.get().unwrap();
    diesel::update(kiosks::table)
        .set(kiosks::last_connection.eq(Utc::now().naive_utc() - TimeDelta::seconds(61)))
        .execute(&mut conn)
        .unwrap();
    drop(conn);

    let list = client.get("/api/kiosks").header(bearer(&token)).dispatch();
    let body: Value = list.into_json().unwrap();
    assert_eq!(body[0]["status"], "offline");
}

#[test]
fn device_client_gets_minimal_projection() {
    let (client, _db) = test_client();
    let token = login(&client);
    add_kiosk(&client, &token, "aa:bb:cc:dd:ee:01", "SN-100");

    let resp = client
        .get("/api/kiosks")
        .header(bearer(&token))
        .header(Header::new("User-Agent", "Kiosk-Device/1.0"))
        .dispatch();
    assert_eq!(resp.status(), Status::Ok);
    assert_eq!(resp.headers().get_one("X-No-Refresh"), Some("true"));
    let body: Value = resp.into_json().unwrap();
    assert_eq!(body["no_refresh"], true);
    let entry = &body["kiosks"][0];
    assert_eq!(entry["serial_number"], "SN-100");
    // Minimal projection carries no credentials or MAC.
    assert!(entry.get("mac_address").is_none());
    assert!(entry.get("ftp_password").is_none());
}

#[test]
fn settings_round_trip() {
    let (client, _db) = test_client();
    let token = login(&client);

    let empty = client
        .post("/api/settings")
        .header(ContentType::JSON)
        .header(bearer(&token))
        .body("{}")
        .dispatch();
    assert_eq!(empty.status(), Status::BadRequest);

    let save = client
        .post("/api/settings")
        .header(ContentType::JSON)
        .header(bearer(&token))
        .body(json!({ "defaultSshUsername": "kiosk", "defaultSshPort": "2222" }).to_string())
        .dispatch();
    assert_eq!(save.status(), Status::Ok);

    let resp = client.get("/api/settings").header(bearer(&token)).dispatch();
    let body: Value = resp.into_json().unwrap();
    assert_eq!(body["defaultSshUsername"], "kiosk");
    assert_eq!(body["defaultSshPort"], "2222");
}

#[test]
fn restart_ignores_service_override_and_rejects_bad_unit_names() {
    let (client, _db) = test_client();
    let token = login(&client);
    let id = add_kiosk(&client, &token, "aa:bb:cc:dd:ee:01", "SN-100");

    // Give the kiosk an (unroutable) IP so the handler gets past the
    // address check; a 400 then proves nothing was executed remotely.
    client
        .post("/api/device/SN-100/ip")
        .header(ContentType::JSON)
        .body(r#"{"ip_address":"192.0.2.1"}"#)
        .dispatch();

    let save = client
        .post("/api/settings")
        .header(ContentType::JSON)
        .header(bearer(&token))
        .body(json!({ "defaultSshService": "kiosk.service; touch /tmp/pwned" }).to_string())
        .dispatch();
    assert_eq!(save.status(), Status::Ok);

    // A request-supplied service name is not part of the contract and
    // must not bring the injection back.
    let resp = client
        .post(format!("/api/kiosks/{id}/restart-service"))
        .header(ContentType::JSON)
        .header(bearer(&token))
        .body(json!({ "service": "x; reboot" }).to_string())
        .dispatch();
    assert_eq!(resp.status(), Status::BadRequest);
    let body: Value = resp.into_json().unwrap();
    assert!(body["error"].as_str().unwrap().contains("Invalid service name"));
}

#[test]
fn mkdir_rejects_separators_before_connecting() {
    let (client, _db) = test_client();
    let token = login(&client);

    // The hostname is unroutable; a 400 proves validation ran first.
    let resp = client
        .post("/api/ftp/mkdir")
        .header(ContentType::JSON)
        .header(bearer(&token))
        .body(
            json!({
                "hostname": "192.0.2.1",
                "username": "kiosk",
                "password": "pw",
                "path": "/home/kiosk",
                "folder_name": "a/b",
            })
            .to_string(),
        )
        .dispatch();
    assert_eq!(resp.status(), Status::BadRequest);
}

#[test]
fn upload_rejects_undecodable_payload_before_connecting() {
    let (client, _db) = test_client();
    let token = login(&client);

    let resp = client
        .post("/api/ftp/upload")
        .header(ContentType::JSON)
        .header(bearer(&token))
        .body(
            json!({
                "hostname": "192.0.2.1",
                "username": "kiosk",
                "password": "pw",
                "file_name": "spot.mp4",
                "file_data": "!!not-base64!!",
            })
            .to_string(),
        )
        .dispatch();
    assert_eq!(resp.status(), Status::BadRequest);
    let body: Value = resp.into_json().unwrap();
    assert!(body["error"].as_str().unwrap().contains("decoding"));
}

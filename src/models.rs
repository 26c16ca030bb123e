use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::kiosks;

pub const STATUS_ONLINE: &str = "online";
pub const STATUS_OFFLINE: &str = "offline";

#[derive(Queryable, Identifiable, Selectable, Serialize, Debug, Clone)]
#[diesel(table_name = kiosks)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Kiosk {
    pub id: i32,
    pub mac_address: String,
    pub serial_number: String,
    pub name: String,
    pub ip_address: Option<String>,
    pub ftp_username: String,
    pub ftp_password: String,
    pub status: String,
    pub last_connection: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = kiosks)]
pub struct NewKiosk<'a> {
    pub mac_address: &'a str,
    pub serial_number: &'a str,
    pub name: &'a str,
    pub ftp_username: &'a str,
    pub ftp_password: &'a str,
    pub status: &'a str,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Fields a management client may change on an existing kiosk. Absent
/// fields are left untouched.
#[derive(AsChangeset, Deserialize, Debug, Default)]
#[diesel(table_name = kiosks)]
pub struct KioskChanges {
    pub name: Option<String>,
    pub mac_address: Option<String>,
    pub serial_number: Option<String>,
    pub ftp_username: Option<String>,
    pub ftp_password: Option<String>,
    #[serde(skip)]
    pub updated_at: Option<NaiveDateTime>,
}

impl KioskChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.mac_address.is_none()
            && self.serial_number.is_none()
            && self.ftp_username.is_none()
            && self.ftp_password.is_none()
    }
}

/// Minimal projection returned to kiosk agents polling the list endpoint.
#[derive(Queryable, Serialize, Debug)]
pub struct KioskSummary {
    pub id: i32,
    pub name: String,
    pub serial_number: String,
    pub ip_address: Option<String>,
    pub status: String,
}

#[derive(Serialize, Debug)]
pub struct FtpCredentials {
    pub id: i32,
    pub name: String,
    pub ip_address: Option<String>,
    pub ftp_username: String,
    pub ftp_password: String,
}

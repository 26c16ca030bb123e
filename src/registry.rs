//! Kiosk registry operations and the liveness evaluator.
//!
//! Everything here works on an injected connection so the operations can
//! be exercised directly against an in-memory database; the HTTP layer
//! wraps them in `spawn_blocking`.

use chrono::{NaiveDateTime, TimeDelta, Utc};
use diesel::prelude::*;
use serde::Deserialize;

use crate::error::ApiError;
use crate::models::{FtpCredentials, Kiosk, KioskChanges, KioskSummary, NewKiosk, STATUS_OFFLINE, STATUS_ONLINE};
use crate::schema::kiosks;

/// A kiosk that has not checked in for this long is considered offline.
/// Agents report every 30s, so a healthy kiosk always stays well under
/// the threshold.
pub const OFFLINE_THRESHOLD_SECS: i64 = 60;

#[derive(Deserialize, Debug, Default)]
pub struct AddKioskRequest {
    pub mac_address: Option<String>,
    pub serial_number: Option<String>,
    pub name: Option<String>,
    pub ftp_username: Option<String>,
    pub ftp_password: Option<String>,
}

#[derive(AsChangeset)]
#[diesel(table_name = kiosks)]
struct CheckInChanges<'a> {
    ip_address: Option<&'a str>,
    mac_address: Option<&'a str>,
    status: &'a str,
    last_connection: NaiveDateTime,
    updated_at: NaiveDateTime,
}

/// Flips every stale record to offline. Status is derived lazily: there
/// is no background sweeper, this runs at the top of every list call.
pub fn evaluate_liveness(conn: &mut SqliteConnection, now: NaiveDateTime) -> QueryResult<usize> {
    let cutoff = now - TimeDelta::seconds(OFFLINE_THRESHOLD_SECS);
    diesel::update(
        kiosks::table
            .filter(kiosks::status.ne(STATUS_OFFLINE))
            .filter(kiosks::last_connection.lt(cutoff)),
    )
    .set(kiosks::status.eq(STATUS_OFFLINE))
    .execute(conn)
}

pub fn list_kiosks(conn: &mut SqliteConnection) -> Result<Vec<Kiosk>, ApiError> {
    evaluate_liveness(conn, Utc::now().naive_utc())?;
    Ok(kiosks::table.select(Kiosk::as_select()).load::<Kiosk>(conn)?)
}

/// Reduced projection for kiosk agents polling right after a check-in;
/// keeps the management UI from treating agent traffic as user activity.
pub fn list_kiosk_summaries(conn: &mut SqliteConnection) -> Result<Vec<KioskSummary>, ApiError> {
    evaluate_liveness(conn, Utc::now().naive_utc())?;
    Ok(kiosks::table
        .select((
            kiosks::id,
            kiosks::name,
            kiosks::serial_number,
            kiosks::ip_address,
            kiosks::status,
        ))
        .load::<KioskSummary>(conn)?)
}

pub fn add_kiosk(conn: &mut SqliteConnection, req: &AddKioskRequest) -> Result<i32, ApiError> {
    let missing = || ApiError::InvalidInput("Missing required fields: mac_address and serial_number".into());
    let mac_address = req.mac_address.as_deref().filter(|s| !s.is_empty()).ok_or_else(missing)?;
    let serial_number = req.serial_number.as_deref().filter(|s| !s.is_empty()).ok_or_else(missing)?;

    let now = Utc::now().naive_utc();
    let new_kiosk = NewKiosk {
        mac_address,
        serial_number,
        name: req.name.as_deref().unwrap_or(""),
        ftp_username: req.ftp_username.as_deref().unwrap_or(""),
        ftp_password: req.ftp_password.as_deref().unwrap_or(""),
        status: STATUS_OFFLINE,
        created_at: now,
        updated_at: now,
    };

    let id = diesel::insert_into(kiosks::table)
        .values(&new_kiosk)
        .returning(kiosks::id)
        .get_result::<i32>(conn)?;
    Ok(id)
}

pub fn update_kiosk(conn: &mut SqliteConnection, kiosk_id: i32, mut changes: KioskChanges) -> Result<(), ApiError> {
    if changes.is_empty() {
        return Err(ApiError::InvalidInput("No valid fields to update".into()));
    }
    ensure_exists(conn, kiosk_id)?;
    changes.updated_at = Some(Utc::now().naive_utc());
    diesel::update(kiosks::table.filter(kiosks::id.eq(kiosk_id)))
        .set(&changes)
        .execute(conn)?;
    Ok(())
}

pub fn delete_kiosk(conn: &mut SqliteConnection, kiosk_id: i32) -> Result<(), ApiError> {
    ensure_exists(conn, kiosk_id)?;
    diesel::delete(kiosks::table.filter(kiosks::id.eq(kiosk_id))).execute(conn)?;
    Ok(())
}

/// Records a periodic IP report from a kiosk agent. Unknown serials are
/// rejected: provisioning happens only through `add_kiosk`, a check-in
/// never creates a record.
pub fn report_check_in(
    conn: &mut SqliteConnection,
    serial_number: &str,
    ip_address: Option<&str>,
    mac_address: Option<&str>,
    now: NaiveDateTime,
) -> Result<(), ApiError> {
    let kiosk_id = kiosks::table
        .filter(kiosks::serial_number.eq(serial_number))
        .select(kiosks::id)
        .first::<i32>(conn)
        .optional()?
        .ok_or_else(|| {
            ApiError::NotFound("Kiosk with this serial number is not registered".into())
        })?;

    let changes = CheckInChanges {
        ip_address: ip_address.filter(|s| !s.is_empty()),
        mac_address: mac_address.filter(|s| !s.is_empty()),
        status: STATUS_ONLINE,
        last_connection: now,
        updated_at: now,
    };
    diesel::update(kiosks::table.filter(kiosks::id.eq(kiosk_id)))
        .set(&changes)
        .execute(conn)?;
    Ok(())
}

pub fn ftp_credentials(conn: &mut SqliteConnection, kiosk_id: i32) -> Result<FtpCredentials, ApiError> {
    let row = kiosks::table
        .filter(kiosks::id.eq(kiosk_id))
        .select((
            kiosks::id,
            kiosks::name,
            kiosks::ip_address,
            kiosks::ftp_username,
            kiosks::ftp_password,
        ))
        .first::<(i32, String, Option<String>, String, String)>(conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound(format!("Kiosk {kiosk_id} not found")))?;

    Ok(FtpCredentials {
        id: row.0,
        name: row.1,
        ip_address: row.2,
        ftp_username: row.3,
        ftp_password: row.4,
    })
}

/// Looks up the fields the restart flow needs: (name, ip_address).
pub fn kiosk_address(conn: &mut SqliteConnection, kiosk_id: i32) -> Result<(String, Option<String>), ApiError> {
    kiosks::table
        .filter(kiosks::id.eq(kiosk_id))
        .select((kiosks::name, kiosks::ip_address))
        .first::<(String, Option<String>)>(conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound(format!("Kiosk {kiosk_id} not found")))
}

/// Marks a kiosk seen after a successful out-of-band contact (e.g. a
/// service restart over SSH).
pub fn mark_seen(conn: &mut SqliteConnection, kiosk_id: i32, now: NaiveDateTime) -> Result<(), ApiError> {
    diesel::update(kiosks::table.filter(kiosks::id.eq(kiosk_id)))
        .set((
            kiosks::status.eq(STATUS_ONLINE),
            kiosks::last_connection.eq(now),
            kiosks::updated_at.eq(now),
        ))
        .execute(conn)?;
    Ok(())
}

fn ensure_exists(conn: &mut SqliteConnection, kiosk_id: i32) -> Result<(), ApiError> {
    kiosks::table
        .filter(kiosks::id.eq(kiosk_id))
        .select(kiosks::id)
        .first::<i32>(conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound(format!("Kiosk {kiosk_id} not found")))?;
    Ok(())
}

use std::io::Cursor;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rocket::http::{ContentType, Status};
use rocket::request::Request;
use rocket::response::{self, Responder, Response};
use rocket::serde::json::Json;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::ftp::listing::DirEntry;
use crate::ftp::{self, DeleteItem, FtpSession};
use crate::obfuscation;
use crate::routes::run_remote;

/// Connection fields shared by every broker request. The password may
/// arrive obfuscated; it is resolved right before login.
#[derive(Deserialize)]
pub struct FtpTarget {
    pub hostname: String,
    pub username: String,
    pub password: String,
    pub port: Option<u16>,
}

impl FtpTarget {
    fn open(&self) -> Result<FtpSession, ApiError> {
        let password = obfuscation::resolve(&self.password);
        FtpSession::connect(
            &self.hostname,
            &self.username,
            &password,
            self.port.unwrap_or(ftp::DEFAULT_FTP_PORT),
        )
    }
}

/// Probe: open a session, log in, tear down.
#[post("/ftp/connect", data = "<body>")]
pub async fn test_connection(_user: AuthUser, body: Json<FtpTarget>) -> Result<Json<Value>, ApiError> {
    let target = body.into_inner();
    run_remote(move || target.open().map(drop)).await?;
    Ok(Json(json!({ "message": "FTP connection successful" })))
}

#[derive(Deserialize)]
pub struct ListRequest {
    #[serde(flatten)]
    target: FtpTarget,
    path: Option<String>,
}

#[post("/ftp/files", data = "<body>")]
pub async fn list_files(_user: AuthUser, body: Json<ListRequest>) -> Result<Json<Vec<DirEntry>>, ApiError> {
    let ListRequest { target, path } = body.into_inner();
    let path = path.unwrap_or_else(|| ftp::DEFAULT_MEDIA_PATH.to_string());
    let entries = run_remote(move || target.open()?.list(&path)).await?;
    Ok(Json(entries))
}

#[derive(Deserialize)]
pub struct UploadRequest {
    #[serde(flatten)]
    target: FtpTarget,
    path: Option<String>,
    file_name: Option<String>,
    file_data: Option<String>,
}

/// Stores an uploaded file. The payload arrives base64-encoded, with or
/// without a `data:` URI prefix; decoding happens before any remote call.
#[post("/ftp/upload", data = "<body>")]
pub async fn upload_file(_user: AuthUser, body: Json<UploadRequest>) -> Result<Json<Value>, ApiError> {
    let UploadRequest {
        target,
        path,
        file_name,
        file_data,
    } = body.into_inner();

    let (Some(file_name), Some(file_data)) = (file_name, file_data) else {
        return Err(ApiError::InvalidInput("Missing file name or file data".into()));
    };
    let bytes = decode_file_data(&file_data)?;

    let path = path.unwrap_or_else(|| ftp::DEFAULT_MEDIA_PATH.to_string());
    let name = file_name.clone();
    run_remote(move || target.open()?.upload(&path, &name, &bytes)).await?;
    Ok(Json(json!({ "message": format!("File {file_name} uploaded successfully") })))
}

fn decode_file_data(file_data: &str) -> Result<Vec<u8>, ApiError> {
    let payload = match file_data.split_once(";base64,") {
        Some((_, rest)) => rest,
        None => file_data,
    };
    STANDARD
        .decode(payload)
        .map_err(|e| ApiError::InvalidInput(format!("Error decoding file data: {e}")))
}

/// Binary attachment response; the body is an in-memory buffer dropped
/// after the response is written out.
pub struct FileDownload {
    file_name: String,
    bytes: Vec<u8>,
}

impl<'r> Responder<'r, 'static> for FileDownload {
    fn respond_to(self, _req: &'r Request<'_>) -> response::Result<'static> {
        Response::build()
            .header(ContentType::Binary)
            .raw_header(
                "Content-Disposition",
                format!("attachment; filename=\"{}\"", self.file_name),
            )
            .sized_body(self.bytes.len(), Cursor::new(self.bytes))
            .ok()
    }
}

/// Download goes over GET so the browser can follow it as a link; that
/// is also why it cannot carry the bearer header. Credentials ride in
/// the query string instead.
#[get("/ftp/download?<hostname>&<port>&<username>&<password>&<path>")]
pub async fn download_file(
    hostname: Option<String>,
    port: Option<u16>,
    username: Option<String>,
    password: Option<String>,
    path: Option<String>,
) -> Result<FileDownload, ApiError> {
    let (Some(hostname), Some(username), Some(password), Some(path)) =
        (hostname, username, password, path)
    else {
        return Err(ApiError::InvalidInput("Missing file download parameters".into()));
    };

    let target = FtpTarget {
        hostname,
        username,
        password,
        port,
    };
    let (file_name, bytes) = run_remote(move || target.open()?.download(&path)).await?;
    Ok(FileDownload { file_name, bytes })
}

#[derive(Deserialize)]
pub struct DeleteRequest {
    #[serde(flatten)]
    target: FtpTarget,
    path: String,
    #[serde(default, alias = "isDirectory")]
    is_directory: bool,
}

#[post("/ftp/delete", data = "<body>")]
pub async fn delete_file(_user: AuthUser, body: Json<DeleteRequest>) -> Result<Json<Value>, ApiError> {
    let DeleteRequest {
        target,
        path,
        is_directory,
    } = body.into_inner();
    run_remote(move || target.open()?.delete(&path, is_directory)).await?;
    let what = if is_directory { "Directory" } else { "File" };
    Ok(Json(json!({ "message": format!("{what} deleted successfully") })))
}

#[derive(Deserialize)]
pub struct DeleteManyRequest {
    #[serde(flatten)]
    target: FtpTarget,
    files: Vec<DeleteItem>,
}

/// Deletes each item independently over one session and reports per-item
/// results: 200 when everything succeeded, 207 on a mixed outcome, 500
/// when nothing did.
#[post("/ftp/delete-multiple", data = "<body>")]
pub async fn delete_multiple(
    _user: AuthUser,
    body: Json<DeleteManyRequest>,
) -> Result<(Status, Json<Value>), ApiError> {
    let DeleteManyRequest { target, files } = body.into_inner();
    if files.is_empty() {
        return Err(ApiError::InvalidInput("File list is empty or invalid".into()));
    }

    let results = run_remote(move || Ok(target.open()?.delete_many(&files))).await?;

    let response = match ftp::batch_status(&results) {
        ftp::BatchStatus::AllSucceeded => (
            Status::Ok,
            Json(json!({ "message": "All files deleted successfully", "results": results })),
        ),
        ftp::BatchStatus::Partial => (
            Status::MultiStatus,
            Json(json!({ "message": "Some files could not be deleted", "results": results })),
        ),
        ftp::BatchStatus::AllFailed => (
            Status::InternalServerError,
            Json(json!({ "error": "None of the files could be deleted", "results": results })),
        ),
    };
    Ok(response)
}

#[derive(Deserialize)]
pub struct MkdirRequest {
    #[serde(flatten)]
    target: FtpTarget,
    path: String,
    folder_name: String,
}

#[post("/ftp/mkdir", data = "<body>")]
pub async fn make_directory(_user: AuthUser, body: Json<MkdirRequest>) -> Result<Json<Value>, ApiError> {
    let MkdirRequest {
        target,
        path,
        folder_name,
    } = body.into_inner();

    // Validated before any remote call is attempted.
    ftp::validate_folder_name(&folder_name)?;

    let new_path = if path.ends_with('/') {
        format!("{path}{folder_name}")
    } else {
        format!("{path}/{folder_name}")
    };

    let parent = path.clone();
    let name = folder_name.clone();
    run_remote(move || target.open()?.mkdir(&parent, &name)).await?;
    Ok(Json(json!({
        "message": format!("Directory {folder_name} created successfully"),
        "path": new_path,
    })))
}

#[derive(Deserialize)]
pub struct FileContentRequest {
    #[serde(flatten)]
    target: FtpTarget,
    path: String,
}

#[post("/ftp/get-file-content", data = "<body>")]
pub async fn get_file_content(
    _user: AuthUser,
    body: Json<FileContentRequest>,
) -> Result<Json<Value>, ApiError> {
    let FileContentRequest { target, path } = body.into_inner();
    let remote_path = path.clone();
    let content = run_remote(move || target.open()?.get_file_content(&remote_path)).await?;
    Ok(Json(json!({
        "content": content,
        "path": path,
        "message": "File content fetched successfully",
    })))
}

#[derive(Deserialize)]
pub struct PutFileContentRequest {
    #[serde(flatten)]
    target: FtpTarget,
    path: String,
    content: String,
}

#[post("/ftp/put-file-content", data = "<body>")]
pub async fn put_file_content(
    _user: AuthUser,
    body: Json<PutFileContentRequest>,
) -> Result<Json<Value>, ApiError> {
    let PutFileContentRequest {
        target,
        path,
        content,
    } = body.into_inner();
    let remote_path = path.clone();
    run_remote(move || target.open()?.put_file_content(&remote_path, &content)).await?;
    Ok(Json(json!({
        "path": path,
        "message": "File content saved successfully",
    })))
}

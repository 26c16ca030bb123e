//! Broker for per-kiosk FTP media stores.
//!
//! Every operation runs inside one short-lived authenticated session;
//! sessions are never pooled or shared between requests. `FtpSession`
//! owns the control connection and sends QUIT from `Drop`, so teardown
//! happens on every exit path, including early error returns.

pub mod listing;

use std::io::{Cursor, Write};
use std::net::ToSocketAddrs;
use std::time::Duration;

use chrono::Local;
use serde::{Deserialize, Serialize};
use suppaftp::FtpStream;
use tempfile::NamedTempFile;

use crate::error::ApiError;
use crate::ftp::listing::DirEntry;

/// Media directory used when a request does not name one.
pub const DEFAULT_MEDIA_PATH: &str = "/home/kiosk/MediaPionowe";
pub const DEFAULT_FTP_PORT: u16 = 21;

/// Bound on connect and per-command I/O; hitting it surfaces as a
/// remote error rather than a hung request.
const IO_TIMEOUT: Duration = Duration::from_secs(10);

pub struct FtpSession {
    stream: Option<FtpStream>,
}

impl FtpSession {
    pub fn connect(host: &str, username: &str, password: &str, port: u16) -> Result<Self, ApiError> {
        let addr = (host, port)
            .to_socket_addrs()
            .map_err(|e| ApiError::Remote(format!("Cannot resolve FTP server address {host}:{port}: {e}")))?
            .next()
            .ok_or_else(|| ApiError::Remote(format!("Cannot resolve FTP server address {host}:{port}")))?;

        let mut stream = FtpStream::connect_timeout(addr, IO_TIMEOUT)
            .map_err(|e| ApiError::Remote(format!("Cannot connect to FTP server: {e}")))?;

        let tcp = stream.get_ref();
        if let Err(e) = tcp
            .set_read_timeout(Some(IO_TIMEOUT))
            .and_then(|_| tcp.set_write_timeout(Some(IO_TIMEOUT)))
        {
            log::warn!("could not set FTP socket timeouts: {e}");
        }

        if let Err(e) = stream.login(username, password) {
            let _ = stream.quit();
            return Err(ApiError::Remote(format!("FTP login failed: {e}")));
        }

        Ok(Self { stream: Some(stream) })
    }

    fn stream(&mut self) -> &mut FtpStream {
        // Only Drop takes the stream out.
        self.stream.as_mut().expect("FTP session already closed")
    }

    pub fn list(&mut self, path: &str) -> Result<Vec<DirEntry>, ApiError> {
        self.stream()
            .cwd(path)
            .map_err(|e| ApiError::Remote(format!("Cannot open directory {path}: {e}")))?;
        let lines = self
            .stream()
            .list(None)
            .map_err(|e| ApiError::Remote(format!("Error listing files: {e}")))?;
        Ok(listing::parse_listing(&lines, path, Local::now().naive_local()))
    }

    pub fn upload(&mut self, path: &str, file_name: &str, bytes: &[u8]) -> Result<(), ApiError> {
        self.stream()
            .cwd(path)
            .map_err(|e| ApiError::Remote(format!("Cannot open directory {path}: {e}")))?;
        self.stream()
            .put_file(file_name, &mut Cursor::new(bytes))
            .map_err(|e| ApiError::Remote(format!("Error uploading file {file_name}: {e}")))?;
        Ok(())
    }

    /// Fetches one file, returning its inferred name and contents.
    pub fn download(&mut self, path: &str) -> Result<(String, Vec<u8>), ApiError> {
        let (directory, file_name) = match path.rfind('/') {
            Some(idx) => (&path[..idx], &path[idx + 1..]),
            None => ("", path),
        };
        if file_name.is_empty() {
            return Err(ApiError::InvalidInput(format!("{path} does not name a file")));
        }
        if !directory.is_empty() {
            self.stream()
                .cwd(directory)
                .map_err(|e| ApiError::Remote(format!("Cannot open directory {directory}: {e}")))?;
        }
        let buffer = self
            .stream()
            .retr_as_buffer(file_name)
            .map_err(|e| ApiError::Remote(format!("Error downloading file {file_name}: {e}")))?;
        Ok((file_name.to_string(), buffer.into_inner()))
    }

    /// Removes one file or one empty directory. Recursive directory
    /// delete is intentionally not supported.
    pub fn delete(&mut self, path: &str, is_directory: bool) -> Result<(), ApiError> {
        if is_directory {
            self.stream()
                .rmdir(path)
                .map_err(|e| ApiError::Remote(format!("Cannot delete directory {path}: {e}")))
        } else {
            self.stream()
                .rm(path)
                .map_err(|e| ApiError::Remote(format!("Cannot delete file {path}: {e}")))
        }
    }

    /// Applies `delete` to each item independently over the one open
    /// session; a failure never stops the remaining items.
    pub fn delete_many(&mut self, items: &[DeleteItem]) -> Vec<DeleteOutcome> {
        delete_each(items, |path, is_directory| self.delete(path, is_directory))
    }

    pub fn mkdir(&mut self, parent_path: &str, folder_name: &str) -> Result<(), ApiError> {
        self.stream()
            .cwd(parent_path)
            .map_err(|e| ApiError::Remote(format!("Cannot open directory {parent_path}: {e}")))?;
        self.stream()
            .mkdir(folder_name)
            .map_err(|e| ApiError::Remote(format!("Cannot create directory {folder_name}: {e}")))?;
        Ok(())
    }

    /// Reads a text file through a scoped local temporary file; the temp
    /// file is removed on every path by its RAII guard.
    pub fn get_file_content(&mut self, path: &str) -> Result<String, ApiError> {
        let buffer = self
            .stream()
            .retr_as_buffer(path)
            .map_err(|e| ApiError::Remote(format!("Cannot fetch file {path}: {e}")))?;

        let mut tmp = NamedTempFile::new()
            .map_err(|e| ApiError::Internal(format!("Cannot create temporary file: {e}")))?;
        tmp.write_all(buffer.get_ref())
            .map_err(|e| ApiError::Internal(format!("Cannot write temporary file: {e}")))?;
        std::fs::read_to_string(tmp.path())
            .map_err(|e| ApiError::InvalidInput(format!("File {path} is not readable text: {e}")))
    }

    pub fn put_file_content(&mut self, path: &str, content: &str) -> Result<(), ApiError> {
        let mut tmp = NamedTempFile::new()
            .map_err(|e| ApiError::Internal(format!("Cannot create temporary file: {e}")))?;
        tmp.write_all(content.as_bytes())
            .map_err(|e| ApiError::Internal(format!("Cannot write temporary file: {e}")))?;
        let mut file = tmp
            .reopen()
            .map_err(|e| ApiError::Internal(format!("Cannot reopen temporary file: {e}")))?;
        self.stream()
            .put_file(path, &mut file)
            .map_err(|e| ApiError::Remote(format!("Cannot store file {path}: {e}")))?;
        Ok(())
    }
}

impl Drop for FtpSession {
    fn drop(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.quit();
        }
    }
}

/// Batch loop over the items, decoupled from the session so the
/// keep-going behavior can be driven with an injected delete.
fn delete_each<F>(items: &[DeleteItem], mut delete: F) -> Vec<DeleteOutcome>
where
    F: FnMut(&str, bool) -> Result<(), ApiError>,
{
    items
        .iter()
        .map(|item| {
            let Some(path) = item.path.as_deref() else {
                return DeleteOutcome {
                    path: "unknown".into(),
                    success: false,
                    is_directory: item.is_directory,
                    error: Some("Missing path".into()),
                };
            };
            match delete(path, item.is_directory) {
                Ok(()) => DeleteOutcome {
                    path: path.to_string(),
                    success: true,
                    is_directory: item.is_directory,
                    error: None,
                },
                Err(e) => DeleteOutcome {
                    path: path.to_string(),
                    success: false,
                    is_directory: item.is_directory,
                    error: Some(e.to_string()),
                },
            }
        })
        .collect()
}

/// Folder names are created relative to an already-validated parent, so
/// they must not smuggle in path separators.
pub fn validate_folder_name(folder_name: &str) -> Result<(), ApiError> {
    if folder_name.is_empty() || folder_name.contains('/') || folder_name.contains('\\') {
        return Err(ApiError::InvalidInput(format!("Invalid folder name: {folder_name}")));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct DeleteItem {
    pub path: Option<String>,
    #[serde(default, alias = "isDirectory")]
    pub is_directory: bool,
}

#[derive(Debug, Serialize)]
pub struct DeleteOutcome {
    pub path: String,
    pub success: bool,
    pub is_directory: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum BatchStatus {
    AllSucceeded,
    Partial,
    AllFailed,
}

/// Three-way outcome of a batch delete; the HTTP layer maps these to
/// 200, 207 and 500 respectively.
pub fn batch_status(results: &[DeleteOutcome]) -> BatchStatus {
    let succeeded = results.iter().filter(|r| r.success).count();
    if succeeded == results.len() {
        BatchStatus::AllSucceeded
    } else if succeeded > 0 {
        BatchStatus::Partial
    } else {
        BatchStatus::AllFailed
    }
}

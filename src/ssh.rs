//! Remote command execution on kiosks over SSH with key authentication.
//!
//! One connection per request; the session drops with the handle.
//! Password auth is deliberately not offered; kiosks are provisioned
//! with the management public key.

use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

use ssh2::Session;

use crate::error::ApiError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const SESSION_TIMEOUT_MS: u32 = 10_000;

pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

pub struct SshConnection {
    session: Session,
}

impl SshConnection {
    /// Connects and authenticates with the private key at `key_path`.
    /// Network and protocol failures surface as `ApiError::Remote`.
    pub fn connect(host: &str, port: u16, username: &str, key_path: &Path) -> Result<Self, ApiError> {
        if !key_path.exists() {
            return Err(ApiError::Remote(format!(
                "SSH key not found at {}; place the management key there",
                key_path.display()
            )));
        }

        let addr = (host, port)
            .to_socket_addrs()
            .map_err(|e| ApiError::Remote(format!("Cannot resolve {host}:{port}: {e}")))?
            .next()
            .ok_or_else(|| ApiError::Remote(format!("Cannot resolve {host}:{port}")))?;

        let tcp = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT)
            .map_err(|e| ApiError::Remote(format!("Cannot connect to kiosk over SSH: {e}")))?;

        let mut session = Session::new()
            .map_err(|e| ApiError::Remote(format!("Cannot create SSH session: {e}")))?;
        session.set_timeout(SESSION_TIMEOUT_MS);
        session.set_tcp_stream(tcp);
        session
            .handshake()
            .map_err(|e| ApiError::Remote(format!("SSH handshake failed: {e}")))?;
        session
            .userauth_pubkey_file(username, None, key_path, None)
            .map_err(|e| ApiError::Remote(format!("SSH key authentication failed: {e}")))?;

        Ok(Self { session })
    }

    /// Runs one command. A nonzero exit code is reported in the output,
    /// not as an error; the caller decides whether to fall back.
    pub fn exec(&self, command: &str) -> Result<CommandOutput, ApiError> {
        log::info!("ssh exec: {command}");

        let mut channel = self
            .session
            .channel_session()
            .map_err(|e| ApiError::Remote(format!("Cannot open SSH channel: {e}")))?;
        channel
            .exec(command)
            .map_err(|e| ApiError::Remote(format!("Cannot execute command: {e}")))?;

        let mut stdout = String::new();
        channel
            .read_to_string(&mut stdout)
            .map_err(|e| ApiError::Remote(format!("Cannot read command output: {e}")))?;
        let mut stderr = String::new();
        channel
            .stderr()
            .read_to_string(&mut stderr)
            .map_err(|e| ApiError::Remote(format!("Cannot read command error output: {e}")))?;

        channel
            .wait_close()
            .map_err(|e| ApiError::Remote(format!("SSH channel did not close cleanly: {e}")))?;
        let exit_code = channel
            .exit_status()
            .map_err(|e| ApiError::Remote(format!("Cannot read command exit status: {e}")))?;

        Ok(CommandOutput {
            exit_code,
            stdout,
            stderr,
        })
    }
}

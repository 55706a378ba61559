use thiserror::Error;

/// Error kinds for one fetch operation. All of them are terminal for
/// the current call; nothing is retried. Logout failures are the one
/// exception in the whole flow and never surface here - the session
/// client logs and discards them.
#[derive(Error, Debug)]
pub enum DormaError {
    /// Mapping file or config directory could not be read, created or
    /// parsed.
    #[error("config I/O error: {0}")]
    ConfigIo(String),

    /// Login failed: non-200 status, transport failure, broken NTLM
    /// handshake or missing session cookie.
    #[error("login failed: {0}")]
    Authentication(String),

    /// The bookings request failed after a successful login.
    #[error("failed to retrieve entries: {0}")]
    Fetch(String),

    /// The bookings page did not match the expected table structure.
    #[error("cannot parse bookings page: {0}")]
    MalformedDocument(String),
}

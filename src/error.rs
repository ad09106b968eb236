//! Unified error types for the thing core.
//!
//! A single `Error` enum that every subsystem converts into, so the host
//! loop and the adapters share one vocabulary.  All variants are `Copy`
//! so they can be passed through the supervisor and streamer without
//! allocation.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The wireless link could not be (re)established.
    Link(LinkError),
    /// The broker session could not be established or used.
    Session(SessionError),
    /// An inbound payload could not be decoded.
    Parse(ParseError),
    /// The update storage rejected an operation.
    Update(StorageError),
    /// Configuration is invalid.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Link(e) => write!(f, "link: {e}"),
            Self::Session(e) => write!(f, "session: {e}"),
            Self::Parse(e) => write!(f, "parse: {e}"),
            Self::Update(e) => write!(f, "update: {e}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Link errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    NoCredentials,
    InvalidSsid,
    InvalidPassword,
    ConnectionFailed,
    /// Link stayed down past the configured ceiling.
    Timeout,
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCredentials => write!(f, "no WiFi credentials configured"),
            Self::InvalidSsid => write!(f, "SSID invalid (must be 1-32 printable ASCII bytes)"),
            Self::InvalidPassword => {
                write!(f, "password invalid (must be 8-64 bytes for WPA2, or empty for open)")
            }
            Self::ConnectionFailed => write!(f, "WiFi connection failed"),
            Self::Timeout => write!(f, "WiFi did not come up in time"),
        }
    }
}

impl From<LinkError> for Error {
    fn from(e: LinkError) -> Self {
        Self::Link(e)
    }
}

// ---------------------------------------------------------------------------
// Session errors
// ---------------------------------------------------------------------------

/// Broker connect failure carrying the client-reported state code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionError {
    pub code: i32,
}

impl SessionError {
    pub const fn new(code: i32) -> Self {
        Self { code }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "broker connect failed, state is {}", self.code)
    }
}

impl From<SessionError> for Error {
    fn from(e: SessionError) -> Self {
        Self::Session(e)
    }
}

// ---------------------------------------------------------------------------
// Parse errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// Payload is not valid JSON.
    Malformed,
    /// Payload is JSON but not an object.
    NotAnObject,
    /// Object has no string `name` member.
    MissingName,
    /// Payload was shorter than its announced length.
    Truncated,
    /// Announced length exceeds the command buffer.
    TooLarge,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed => write!(f, "unable to parse payload"),
            Self::NotAnObject => write!(f, "payload is not a JSON object"),
            Self::MissingName => write!(f, "command has no name"),
            Self::Truncated => write!(f, "payload shorter than announced"),
            Self::TooLarge => write!(f, "payload too large for a command"),
        }
    }
}

impl From<ParseError> for Error {
    fn from(e: ParseError) -> Self {
        Self::Parse(e)
    }
}

// ---------------------------------------------------------------------------
// Update storage errors
// ---------------------------------------------------------------------------

/// Error reported by the update storage, with its numeric code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageError {
    pub code: u8,
}

impl StorageError {
    pub const NO_SPACE: Self = Self { code: 1 };
    pub const WRITE: Self = Self { code: 2 };
    pub const VERIFY: Self = Self { code: 3 };
    pub const ACTIVATE: Self = Self { code: 4 };
    pub const NOT_STARTED: Self = Self { code: 5 };

    pub const fn new(code: u8) -> Self {
        Self { code }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "update storage error #{}", self.code)
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Update(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

pub type Result<T> = core::result::Result<T, Error>;

/*!
 * Latch Messages - envelopes exchanged over the page <-> background port
 *
 * Every message is an envelope made of a header and a payload. Payloads are
 * closed enums: receivers match on the variant instead of probing fields.
 */

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Error, Debug)]
pub enum MessageError {
    #[error("Failed to encode message: {0}")]
    Encode(String),

    #[error("Failed to decode message: {0}")]
    Decode(String),
}

pub type Result<T> = std::result::Result<T, MessageError>;

// ============================================================================
// Request Ids
// ============================================================================

/// Sequence number the background service assigns to each port request
pub type RequestId = usize;

pub const FIRST_REQUEST_ID: RequestId = 1;

pub const INITIAL_REQUEST_ID: RequestId = FIRST_REQUEST_ID - 1;

/// Next request id after `last_request_id`, skipping zero on wrap-around
pub fn next_request_id(last_request_id: RequestId) -> RequestId {
    last_request_id.wrapping_add(1).max(FIRST_REQUEST_ID)
}

// ============================================================================
// Envelope
// ============================================================================

/// Request header, reserved for metadata. Serializes as `{}` when empty.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestHeader {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_token: Option<String>,
}

impl RequestHeader {
    pub const fn new() -> Self {
        Self { client_token: None }
    }

    /// Build the matching response header, echoing the client token
    pub fn into_response(self, request_id: RequestId) -> ResponseHeader {
        let Self { client_token } = self;
        ResponseHeader {
            client_token,
            request_id: Some(request_id),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseHeader {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_token: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<RequestId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request<T> {
    #[serde(default)]
    pub header: RequestHeader,
    pub payload: T,
}

impl<T> Request<T> {
    pub const fn new(payload: T) -> Self {
        Self {
            header: RequestHeader::new(),
            payload,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response<T> {
    #[serde(default)]
    pub header: ResponseHeader,
    pub payload: T,
}

impl<T> Response<T> {
    pub fn new(payload: T) -> Self {
        Self {
            header: ResponseHeader::default(),
            payload,
        }
    }
}

// ============================================================================
// Port Payloads
// ============================================================================

/// Requests a page agent sends over its port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortRequestPayload {
    /// Look up the stored credential for a site
    GetCredential { site: String },

    /// Stage the latest typed username for a site
    SetTmpCredentialUsername { site: String, username: String },

    /// Stage the latest typed password for a site
    SetTmpCredentialPassword { site: String, password: String },

    /// Promote the staged pair for a site into persistent storage
    StoreTmpCredential { site: String },
}

impl PortRequestPayload {
    pub fn site(&self) -> &str {
        match self {
            Self::GetCredential { site }
            | Self::SetTmpCredentialUsername { site, .. }
            | Self::SetTmpCredentialPassword { site, .. }
            | Self::StoreTmpCredential { site } => site,
        }
    }

    /// Variant name, safe to log (never includes credential values)
    pub fn kind(&self) -> &'static str {
        match self {
            Self::GetCredential { .. } => "GetCredential",
            Self::SetTmpCredentialUsername { .. } => "SetTmpCredentialUsername",
            Self::SetTmpCredentialPassword { .. } => "SetTmpCredentialPassword",
            Self::StoreTmpCredential { .. } => "StoreTmpCredential",
        }
    }
}

pub type PortRequest = Request<PortRequestPayload>;

/// Responses the background service sends back over a port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortResponsePayload {
    Credential { username: String, password: String },
    Ok,
    Error(String),
}

impl PortResponsePayload {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Credential { .. } => "Credential",
            Self::Ok => "Ok",
            Self::Error(_) => "Error",
        }
    }
}

pub type PortResponse = Response<PortResponsePayload>;

// ============================================================================
// JSON Helpers
// ============================================================================

pub fn to_json<T: Serialize>(message: &T) -> Result<String> {
    serde_json::to_string(message).map_err(|e| MessageError::Encode(e.to_string()))
}

pub fn from_json<T: DeserializeOwned>(json: &str) -> Result<T> {
    serde_json::from_str(json).map_err(|e| MessageError::Decode(e.to_string()))
}

/// Decode from an already parsed JSON value
pub fn from_value<T: DeserializeOwned>(value: serde_json::Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| MessageError::Decode(e.to_string()))
}

// ============================================================================
// Tests
// ============================================================================

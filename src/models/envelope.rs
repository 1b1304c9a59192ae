use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ClientError;

/// Envelope code for success.
pub const SUCCESS_CODE: i64 = 1;

/// Envelope codes meaning the token no longer authenticates the caller:
/// not logged in / expired (-1), illegal token (50008),
/// logged in elsewhere (50012), token expired (50014).
pub const SESSION_INVALID_CODES: [i64; 4] = [-1, 50008, 50012, 50014];

/// The uniform `{code, msg, data}` wrapper every backend response uses.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Envelope {
    pub code: i64,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeStatus {
    Success,
    SessionInvalid,
    Failure,
}

impl EnvelopeStatus {
    pub fn of(code: i64) -> Self {
        if code == SUCCESS_CODE {
            EnvelopeStatus::Success
        } else if SESSION_INVALID_CODES.contains(&code) {
            EnvelopeStatus::SessionInvalid
        } else {
            EnvelopeStatus::Failure
        }
    }
}

impl Envelope {
    pub fn status(&self) -> EnvelopeStatus {
        EnvelopeStatus::of(self.code)
    }

    /// Unwraps the payload of a successful envelope, or turns the code into an error.
    pub fn into_data<T: DeserializeOwned>(self) -> Result<T, ClientError> {
        match self.status() {
            EnvelopeStatus::Success => {
                serde_json::from_value(self.data).map_err(|source| ClientError::Serde { source })
            }
            EnvelopeStatus::SessionInvalid => Err(ClientError::SessionInvalid { code: self.code }),
            EnvelopeStatus::Failure => Err(ClientError::Business {
                code: self.code,
                msg: self.msg.unwrap_or_default(),
            }),
        }
    }
}

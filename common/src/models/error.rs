use std::fmt::{Display, Formatter};

use crossterm::style::{Color, Stylize};
use http::StatusCode;
use serde::{Deserialize, Serialize};
use strum::{Display as StrumDisplay, EnumString};
use tracing::{error, warn};

/// Fault returned by the WeDeploy API for non-2xx responses
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ApiError {
    #[serde(alias = "status")]
    pub code: u16,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ApiErrorItem>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ApiErrorItem {
    pub reason: ErrorReason,
    #[serde(default)]
    pub message: String,
}

impl ApiError {
    pub fn new(message: impl Into<String>, status: StatusCode) -> Self {
        Self {
            code: status.as_u16(),
            message: message.into(),
            errors: vec![],
        }
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn has_reason(&self, reason: &ErrorReason) -> bool {
        self.errors.iter().any(|e| &e.reason == reason)
    }

    /// Creating something that is already there
    pub fn is_already_exists(&self) -> bool {
        self.status() == StatusCode::CONFLICT || self.has_reason(&ErrorReason::AlreadyExists)
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == StatusCode::NOT_FOUND || self.has_reason(&ErrorReason::NotFound)
    }

    /// User facing message for this fault, optionally tuned for the command that caused it.
    ///
    /// Per-command overrides win over the generic reason table, and the raw
    /// message (or the raw reason) is used when neither knows the reason.
    pub fn friendly_message(&self, command: Option<&str>) -> String {
        for item in &self.errors {
            if let Some(message) = command.and_then(|c| item.reason.message_for(c)) {
                return message.to_owned();
            }
            if let Some(message) = item.reason.message() {
                return message.to_owned();
            }
        }

        if !self.message.is_empty() {
            return self.message.clone();
        }

        match self.errors.first() {
            Some(item) if !item.message.is_empty() => item.message.clone(),
            Some(item) => item.reason.to_string(),
            None => ApiError::from(self.status()).message,
        }
    }
}

impl Display for ApiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}\nMessage: {}",
            self.status().to_string().bold(),
            self.friendly_message(None).with(Color::Red)
        )
    }
}

impl std::error::Error for ApiError {}

#[derive(Debug, Clone, PartialEq, Eq, Hash, StrumDisplay, Serialize, Deserialize, EnumString)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum ErrorReason {
    AlreadyExists,
    NotFound,
    Unauthorized,
    Forbidden,
    BadRequest,
    InvalidParameter,
    ProjectQuotaExceeded,
    ServiceQuotaExceeded,
    InternalError,
    ServiceUnavailable,

    /// Forward compatibility
    #[doc(hidden)]
    #[serde(untagged)]
    #[strum(default, to_string = "{0}")]
    Unknown(String),
}

impl ErrorReason {
    /// Generic message for a reason
    pub fn message(&self) -> Option<&'static str> {
        let message = match self {
            ErrorReason::AlreadyExists => "the resource already exists",
            ErrorReason::NotFound => "the resource was not found",
            ErrorReason::Unauthorized => {
                "we were unable to authorize your request. Are your credentials still valid?"
            }
            ErrorReason::Forbidden => "you are not allowed to do this",
            ErrorReason::BadRequest => "the request is invalid",
            ErrorReason::InvalidParameter => "one of the given values is invalid",
            ErrorReason::ProjectQuotaExceeded => {
                "you cannot create more projects. Delete some projects first."
            }
            ErrorReason::ServiceQuotaExceeded => {
                "you cannot create more services in this project. Delete some services first."
            }
            ErrorReason::InternalError => "the server was unable to handle your request",
            ErrorReason::ServiceUnavailable => {
                "we're experiencing a high workload right now, please try again in a little bit"
            }
            ErrorReason::Unknown(_) => return None,
        };

        Some(message)
    }

    /// Message override for a specific command
    pub fn message_for(&self, command: &str) -> Option<&'static str> {
        let message = match (command, self) {
            ("deploy" | "link", ErrorReason::NotFound) => {
                "project not found. Check the project id in project.json or --project"
            }
            ("deploy" | "link", ErrorReason::Forbidden) => {
                "you don't have permission to deploy to this project"
            }
            ("env-var", ErrorReason::NotFound) => "service not found",
            ("env-var", ErrorReason::InvalidParameter) => {
                "invalid environment variable name or value"
            }
            ("list" | "activities", ErrorReason::NotFound) => "project not found",
            ("unlink", ErrorReason::NotFound) => "nothing linked with this id",
            _ => return None,
        };

        Some(message)
    }
}

// Used as a fallback when an API response did not contain a serialized ApiError
impl From<StatusCode> for ApiError {
    fn from(code: StatusCode) -> Self {
        let message = match code {
            StatusCode::FORBIDDEN => "this request is not allowed",
            StatusCode::UNAUTHORIZED => {
                "we were unable to authorize your request. Are your credentials still valid?"
            }
            StatusCode::INTERNAL_SERVER_ERROR => "the server was unable to handle your request",
            StatusCode::SERVICE_UNAVAILABLE => {
                "we're experiencing a high workload right now, please try again in a little bit"
            }
            StatusCode::BAD_REQUEST => "this request is invalid",
            StatusCode::NOT_FOUND => "we don't serve this resource",
            StatusCode::CONFLICT => "the resource already exists",
            StatusCode::BAD_GATEWAY => {
                warn!("got a bad response from the gateway");
                "response from gateway is invalid"
            }
            _ => {
                error!(%code, "got an unexpected status code");
                "an unexpected error occurred"
            }
        };

        Self::new(message, code)
    }
}

use serde::Serialize;
use std::fmt;

pub const ERR_PROVISIONING: &str = "ERR_PROVISIONING";
pub const ERR_PROFILE: &str = "ERR_PROFILE";
pub const ERR_LAUNCH: &str = "ERR_LAUNCH";
pub const ERR_SIGNAL_TIMEOUT: &str = "ERR_SIGNAL_TIMEOUT";
pub const ERR_CANCELLED: &str = "ERR_CANCELLED";
pub const ERR_PATCH: &str = "ERR_PATCH";
pub const ERR_VERIFICATION: &str = "ERR_VERIFICATION";
pub const ERR_INSTALL_OR_LAUNCH: &str = "ERR_INSTALL_OR_LAUNCH";
pub const ERR_VALIDATION: &str = "ERR_VALIDATION";
pub const ERR_SYSTEM: &str = "ERR_SYSTEM";

#[derive(Debug, Clone, Serialize)]
pub struct AppError {
    pub error: String,
    pub code: String,
    pub trace_id: String,
}

impl AppError {
    pub fn new(code: impl Into<String>, message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code: code.into(),
            trace_id: trace_id.into(),
        }
    }

    pub fn provisioning(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_PROVISIONING, message, trace_id)
    }

    pub fn profile(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_PROFILE, message, trace_id)
    }

    pub fn launch(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_LAUNCH, message, trace_id)
    }

    pub fn signal_timeout(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_SIGNAL_TIMEOUT, message, trace_id)
    }

    pub fn cancelled(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_CANCELLED, message, trace_id)
    }

    pub fn patch(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_PATCH, message, trace_id)
    }

    pub fn verification(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_VERIFICATION, message, trace_id)
    }

    pub fn install_or_launch(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_INSTALL_OR_LAUNCH, message, trace_id)
    }

    pub fn validation(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_VALIDATION, message, trace_id)
    }

    pub fn system(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_SYSTEM, message, trace_id)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.error, self.code)
    }
}

impl std::error::Error for AppError {}

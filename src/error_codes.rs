//! Caller-fixable failures raised at the CLI and executor boundary.
//!
//! The compiler core never fails; these cover input the caller must correct before a
//! prompt can be planned or run. The binary prints `envelope()` as one JSON line on
//! stderr and exits with `exit_code()`, so scripts can branch on `error.code`.

use std::fmt;

use anyhow::Error;
use serde::Serialize;
use serde_json::Value;

/// Exit status for every coded error; uncoded failures exit with 1.
pub const USAGE_EXIT_CODE: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Prompt is empty or whitespace only.
    EmptyPrompt,
    /// Input file extension is not a supported video container.
    UnsupportedInput,
    /// Executor resource name is not a plain file name.
    InvalidResourceName,
    /// Explicit output extension disagrees with the planned format.
    OutputFormatMismatch,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EmptyPrompt => "EMPTY_PROMPT",
            Self::UnsupportedInput => "UNSUPPORTED_INPUT",
            Self::InvalidResourceName => "INVALID_RESOURCE_NAME",
            Self::OutputFormatMismatch => "OUTPUT_FORMAT_MISMATCH",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CodedError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl CodedError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn exit_code(&self) -> u8 {
        USAGE_EXIT_CODE
    }

    pub fn envelope(&self) -> ErrorEnvelope<'_> {
        ErrorEnvelope {
            ok: false,
            error: self,
        }
    }
}

impl fmt::Display for CodedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for CodedError {}

/// `{"ok": false, "error": {"code", "message", "details"?}}`
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope<'a> {
    pub ok: bool,
    pub error: &'a CodedError,
}

/// Finds a `CodedError` anywhere in the context chain.
pub fn find_coded_error(error: &Error) -> Option<&CodedError> {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<CodedError>())
}

#[cfg(test)]
mod tests {
    use anyhow::{anyhow, Context};
    use serde_json::json;

    use super::*;

    #[test]
    fn coded_error_survives_added_context() {
        let error = Err::<(), _>(anyhow!(CodedError::new(
            ErrorCode::EmptyPrompt,
            "prompt is empty"
        )))
        .context("while planning")
        .expect_err("should be an error");
        let coded = find_coded_error(&error).expect("coded error in chain");
        assert_eq!(coded.code, ErrorCode::EmptyPrompt);
        assert_eq!(coded.exit_code(), USAGE_EXIT_CODE);
    }

    #[test]
    fn envelope_omits_missing_details() {
        let bare = CodedError::new(ErrorCode::EmptyPrompt, "x");
        let bare = serde_json::to_value(bare.envelope()).expect("envelope should serialize");
        assert_eq!(bare["ok"], json!(false));
        assert_eq!(bare["error"]["code"], json!("EMPTY_PROMPT"));
        assert!(bare["error"].get("details").is_none());

        let detailed = CodedError::new(ErrorCode::UnsupportedInput, "bad")
            .with_details(json!({ "extension": "txt" }));
        let value = serde_json::to_value(detailed.envelope()).expect("envelope should serialize");
        assert_eq!(value["error"]["details"]["extension"], json!("txt"));
        assert_eq!(value["error"]["code"], json!("UNSUPPORTED_INPUT"));
    }

    #[test]
    fn serialized_codes_match_display() {
        for code in [
            ErrorCode::EmptyPrompt,
            ErrorCode::UnsupportedInput,
            ErrorCode::InvalidResourceName,
            ErrorCode::OutputFormatMismatch,
        ] {
            assert_eq!(serde_json::to_value(code).expect("code"), json!(code.to_string()));
        }
    }
}

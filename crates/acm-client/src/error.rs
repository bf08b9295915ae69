// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::http::HttpError;
use crate::server_list::Unit;

/// Errors surfaced by the ACM client.
#[derive(Debug, thiserror::Error)]
pub enum AcmError {
    /// A required option is missing or malformed; raised before any network activity.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// `data_id` or `group` contains characters outside `[A-Za-z0-9_.:-]`.
    #[error(
        "[{kind}] only allow digital, letter and symbols in [ \"_\", \"-\", \".\", \":\" ], but got {value:?}"
    )]
    InvalidIdentifier { kind: &'static str, value: String },

    /// The discovery endpoint answered with an empty body.
    #[error("discovery returned empty hosts for unit {unit}")]
    EmptyServerList { unit: Unit },

    /// Discovery answered but no usable address remained after filtering.
    #[error("no server address available for unit {unit}")]
    NotFound { unit: Unit },

    #[error("http error: {0}")]
    Transport(#[from] HttpError),
}

pub type Result<T, E = AcmError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = AcmError::Configuration("options.endpoint is required".to_string());
        assert_eq!(
            error.to_string(),
            "invalid configuration: options.endpoint is required"
        );

        let error = AcmError::EmptyServerList { unit: Unit::Current };
        assert_eq!(
            error.to_string(),
            "discovery returned empty hosts for unit CURRENT_UNIT"
        );
    }

    #[test]
    fn test_invalid_identifier_reports_offending_value() {
        let error = AcmError::InvalidIdentifier {
            kind: "data_id",
            value: "bad/id".to_string(),
        };
        let message = error.to_string();
        assert!(message.starts_with("[data_id]"));
        assert!(message.contains("\"bad/id\""));
    }

    #[test]
    fn test_transport_errors_convert() {
        let error: AcmError = HttpError::Status(503).into();
        assert!(matches!(error, AcmError::Transport(HttpError::Status(503))));
    }
}

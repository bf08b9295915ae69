// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::error::{AcmError, Result};

/// Group used when the caller does not name one.
pub const DEFAULT_GROUP: &str = "DEFAULT_GROUP";

/// Identifies one configuration entry. Both parts are validated on construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConfigKey {
    data_id: String,
    group: String,
}

impl ConfigKey {
    pub fn new(data_id: impl Into<String>, group: impl Into<String>) -> Result<Self> {
        let data_id = data_id.into();
        let group = group.into();
        validate_identifier("data_id", &data_id)?;
        validate_identifier("group", &group)?;
        Ok(Self { data_id, group })
    }

    pub fn with_default_group(data_id: impl Into<String>) -> Result<Self> {
        Self::new(data_id, DEFAULT_GROUP)
    }

    pub fn data_id(&self) -> &str {
        &self.data_id
    }

    pub fn group(&self) -> &str {
        &self.group
    }
}

/// Returns `true` when `value` matches `^[A-Za-z0-9_.:-]+$`.
pub fn is_valid_identifier(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'))
}

pub fn validate_identifier(kind: &'static str, value: &str) -> Result<()> {
    if is_valid_identifier(value) {
        Ok(())
    } else {
        Err(AcmError::InvalidIdentifier {
            kind,
            value: value.to_string(),
        })
    }
}

//! Context configuration

use serde::{Deserialize, Serialize};

use crate::error::FluxError;

/// Options consumed when a [`Context`](crate::Context) is built.
///
/// Unknown keys are rejected when deserializing.
///
/// ```ignore
/// let config = ContextConfig::from_json(r#"{ "strict": true }"#)?;
/// assert!(config.strict);
/// assert!(!config.performance_profile);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ContextConfig {
    /// Panic when a store changes outside of any use case or dispatch
    pub strict: bool,
    /// Record elapsed time on `DidExecute`/`Complete` meta and log it
    pub performance_profile: bool,
}

impl ContextConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn performance_profile(mut self, enabled: bool) -> Self {
        self.performance_profile = enabled;
        self
    }

    /// Parse a JSON object such as `{"strict": true}`.
    pub fn from_json(json: &str) -> Result<Self, FluxError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, FluxError> {
        Ok(serde_json::to_string(self)?)
    }
}

//! Statement-parameter serialization and the caller-side truncation policy.
//!
//! Truncation is deliberately a policy of this instrumentation layer, not of
//! the engine's tag store: the span receives the already-capped value.

use serde_json::Value;

use crate::config::GraphConfig;

/// Ordered statement parameters, as accepted by graph drivers.
pub type QueryParams = serde_json::Map<String, Value>;

/// Appended to a serialized parameter string cut at the configured cap.
pub const TRUNCATION_MARKER: &str = "...";

/// Decides whether and how statement parameters are tagged.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParamsPolicy {
    max_length: u32,
}

impl ParamsPolicy {
    /// Builds the policy from configuration.
    pub fn new(config: &GraphConfig) -> Self {
        ParamsPolicy {
            max_length: config.sql_parameters_max_length,
        }
    }

    /// A policy that never tags parameters.
    pub const fn disabled() -> Self {
        ParamsPolicy { max_length: 0 }
    }

    /// Whether parameter tagging is enabled at all.
    pub fn is_enabled(&self) -> bool {
        self.max_length > 0
    }

    /// Renders the tag value for `params`, or `None` when nothing should be
    /// tagged (policy disabled, or no parameters).
    ///
    /// The rendered value is the serialized parameter object, cut to the
    /// configured number of characters with [`TRUNCATION_MARKER`] appended
    /// when it was oversized.
    pub fn render(&self, params: &QueryParams) -> Option<String> {
        if !self.is_enabled() || params.is_empty() {
            return None;
        }
        let serialized = serialize_params(params);
        Some(truncate(serialized, self.max_length as usize))
    }
}

fn serialize_params(params: &QueryParams) -> String {
    // A JSON object of JSON values cannot fail to serialize.
    serde_json::to_string(params).unwrap_or_default()
}

fn truncate(serialized: String, max_chars: usize) -> String {
    match serialized.char_indices().nth(max_chars) {
        Some((byte_offset, _)) => {
            let mut cut = serialized;
            cut.truncate(byte_offset);
            cut.push_str(TRUNCATION_MARKER);
            cut
        }
        None => serialized,
    }
}

use tracing::warn;

/// Environment variable capping the serialized statement-parameter length.
pub const ENV_SQL_PARAMETERS_MAX_LENGTH: &str = "WIRESPAN_SQL_PARAMETERS_MAX_LENGTH";

/// Configuration for the graph-database instrumentation layer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GraphConfig {
    /// Maximum length, in characters, of the serialized statement parameters
    /// tagged on a span. `0` disables parameter tagging entirely.
    pub sql_parameters_max_length: u32,
}

impl GraphConfig {
    /// Configuration with parameter tagging disabled.
    pub fn new() -> Self {
        GraphConfig::default()
    }

    /// Sets the parameter-length cap.
    pub fn with_sql_parameters_max_length(mut self, max_length: u32) -> Self {
        self.sql_parameters_max_length = max_length;
        self
    }

    /// Loads configuration from the environment.
    ///
    /// A missing, unparsable, or negative value means "feature disabled",
    /// never a hard failure.
    pub fn from_env() -> Self {
        let max_length = match std::env::var(ENV_SQL_PARAMETERS_MAX_LENGTH) {
            Ok(raw) => parse_max_length(&raw),
            Err(_) => 0,
        };
        GraphConfig {
            sql_parameters_max_length: max_length,
        }
    }
}

fn parse_max_length(raw: &str) -> u32 {
    match raw.parse::<i64>() {
        Ok(value) if value > 0 => u32::try_from(value).unwrap_or(u32::MAX),
        Ok(_) => 0,
        Err(_) => {
            warn!(
                variable = ENV_SQL_PARAMETERS_MAX_LENGTH,
                value = %raw,
                "unparsable value, parameter tagging disabled"
            );
            0
        }
    }
}

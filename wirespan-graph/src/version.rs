//! Driver-version parsing and strategy selection.
//!
//! The instrumentation strategy is decided once, when a wrapper is
//! constructed, from the driver's reported version string compared against
//! explicit version intervals. Calls then dispatch on the fixed strategy
//! rather than re-inspecting the version.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use tracing::warn;

/// A parsed `major.minor.patch` driver version.
///
/// A missing patch (or minor) component parses as zero, so `"5.3"` equals
/// `"5.3.0"`. Pre-release or build suffixes are not supported; drivers
/// report plain numeric versions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct DriverVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl DriverVersion {
    /// Builds a version from its components.
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        DriverVersion {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for DriverVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Failure to parse a driver version string.
#[derive(Error, Debug, PartialEq, Eq)]
#[error("invalid driver version {raw:?}")]
pub struct InvalidVersion {
    raw: String,
}

impl FromStr for DriverVersion {
    type Err = InvalidVersion;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidVersion {
            raw: raw.to_string(),
        };
        let mut parts = raw.trim().split('.');
        let major = parts
            .next()
            .filter(|p| !p.is_empty())
            .ok_or_else(invalid)?
            .parse()
            .map_err(|_| invalid())?;
        let minor = match parts.next() {
            Some(part) => part.parse().map_err(|_| invalid())?,
            None => 0,
        };
        let patch = match parts.next() {
            Some(part) => part.parse().map_err(|_| invalid())?,
            None => 0,
        };
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(DriverVersion::new(major, minor, patch))
    }
}

/// How a wrapper instruments a driver of a given version.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstrumentationStrategy {
    /// `>= 4.4, < 5.0`: the driver exposes only blocking entry points.
    SyncOnly,
    /// `>= 5.0, < 6.0`: blocking and asynchronous entry points.
    SyncAndAsync,
    /// Version outside every supported interval; calls pass through
    /// untraced.
    Disabled,
}

/// Inclusive lower bound of the oldest supported interval.
const SYNC_MIN: DriverVersion = DriverVersion::new(4, 4, 0);
/// Bounds of the interval carrying async entry points.
const ASYNC_MIN: DriverVersion = DriverVersion::new(5, 0, 0);
/// Exclusive upper bound of support.
const SUPPORTED_MAX: DriverVersion = DriverVersion::new(6, 0, 0);

impl InstrumentationStrategy {
    /// Resolves the strategy for a parsed version.
    pub fn for_version(version: DriverVersion) -> Self {
        if version >= ASYNC_MIN && version < SUPPORTED_MAX {
            InstrumentationStrategy::SyncAndAsync
        } else if version >= SYNC_MIN && version < ASYNC_MIN {
            InstrumentationStrategy::SyncOnly
        } else {
            InstrumentationStrategy::Disabled
        }
    }

    /// Resolves the strategy for a driver's reported version string.
    ///
    /// An unparsable version disables instrumentation rather than failing:
    /// the wrapped driver must keep working untraced.
    pub fn for_version_str(raw: &str) -> Self {
        match raw.parse::<DriverVersion>() {
            Ok(version) => {
                let strategy = Self::for_version(version);
                if strategy == InstrumentationStrategy::Disabled {
                    warn!(version = %version, "unsupported driver version, instrumentation disabled");
                }
                strategy
            }
            Err(err) => {
                warn!(error = %err, "unparsable driver version, instrumentation disabled");
                InstrumentationStrategy::Disabled
            }
        }
    }

    /// Whether blocking entry points are traced.
    pub fn traces_sync(&self) -> bool {
        matches!(
            self,
            InstrumentationStrategy::SyncOnly | InstrumentationStrategy::SyncAndAsync
        )
    }

    /// Whether asynchronous entry points are traced.
    pub fn traces_async(&self) -> bool {
        matches!(self, InstrumentationStrategy::SyncAndAsync)
    }
}

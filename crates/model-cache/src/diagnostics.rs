//! Non-fatal problem reporting for cache loads and saves.

use parking_lot::Mutex;
use std::fmt;

use crate::error::CacheError;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Severity {
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// A recoverable cache problem. The cache has already degraded gracefully
/// by the time one of these is reported.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum CacheDiagnostic {
    /// The persisted snapshot exists but could not be read.
    ReadFailed { location: String, reason: String },
    /// The persisted snapshot could not be decoded.
    Corrupted { location: String, reason: String },
    /// The persisted snapshot was written by an incompatible format or model version.
    VersionMismatch { location: String, reason: String },
    /// A save failed; the previous snapshot is still in place.
    WriteFailed { location: String, reason: String },
}

impl CacheDiagnostic {
    /// Classifies an error raised while loading the persisted snapshot.
    pub fn from_load_error(location: impl Into<String>, error: &CacheError) -> Self {
        let location = location.into();
        let reason = error.to_string();
        match error {
            CacheError::Corrupted(_) | CacheError::Serialization(_) => {
                Self::Corrupted { location, reason }
            }
            CacheError::VersionMismatch(_) => Self::VersionMismatch { location, reason },
            _ => Self::ReadFailed { location, reason },
        }
    }

    pub fn from_save_error(location: impl Into<String>, error: &CacheError) -> Self {
        Self::WriteFailed {
            location: location.into(),
            reason: error.to_string(),
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::WriteFailed { .. } => Severity::Error,
            _ => Severity::Warning,
        }
    }

    pub fn location(&self) -> &str {
        match self {
            Self::ReadFailed { location, .. }
            | Self::Corrupted { location, .. }
            | Self::VersionMismatch { location, .. }
            | Self::WriteFailed { location, .. } => location,
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            Self::ReadFailed { reason, .. }
            | Self::Corrupted { reason, .. }
            | Self::VersionMismatch { reason, .. }
            | Self::WriteFailed { reason, .. } => reason,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::ReadFailed { .. } => "read failed",
            Self::Corrupted { .. } => "corrupted",
            Self::VersionMismatch { .. } => "version mismatch",
            Self::WriteFailed { .. } => "write failed",
        }
    }
}

impl fmt::Display for CacheDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "model cache {} at {}: {}",
            self.kind(),
            self.location(),
            self.reason()
        )
    }
}

/// Receives cache diagnostics.
pub trait Diagnostics: Send + Sync {
    fn report(&self, diagnostic: CacheDiagnostic);
}

/// Reports diagnostics through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn report(&self, diagnostic: CacheDiagnostic) {
        log_diagnostic(&diagnostic);
    }
}

/// Keeps every report in memory, in arrival order.
#[derive(Debug, Default)]
pub struct RecordingDiagnostics {
    entries: Mutex<Vec<CacheDiagnostic>>,
}

impl RecordingDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<CacheDiagnostic> {
        self.entries.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl Diagnostics for RecordingDiagnostics {
    fn report(&self, diagnostic: CacheDiagnostic) {
        log_diagnostic(&diagnostic);
        self.entries.lock().push(diagnostic);
    }
}

fn log_diagnostic(diagnostic: &CacheDiagnostic) {
    match diagnostic.severity() {
        Severity::Warning => tracing::warn!("{diagnostic}"),
        Severity::Error => tracing::error!("{diagnostic}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_errors_are_classified() {
        let corrupted =
            CacheDiagnostic::from_load_error("slot", &CacheError::Corrupted("bad".into()));
        assert!(matches!(corrupted, CacheDiagnostic::Corrupted { .. }));
        assert_eq!(corrupted.severity(), Severity::Warning);

        let mismatch =
            CacheDiagnostic::from_load_error("slot", &CacheError::VersionMismatch("v2".into()));
        assert!(matches!(mismatch, CacheDiagnostic::VersionMismatch { .. }));

        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let read = CacheDiagnostic::from_load_error("slot", &CacheError::Io(io));
        assert!(matches!(read, CacheDiagnostic::ReadFailed { .. }));
    }

    #[test]
    fn write_failures_are_errors() {
        let diagnostic =
            CacheDiagnostic::from_save_error("slot", &CacheError::Internal("disk full".into()));
        assert_eq!(diagnostic.severity(), Severity::Error);
        assert_eq!(diagnostic.location(), "slot");
        assert!(diagnostic.to_string().contains("disk full"));
    }

    #[test]
    fn recording_keeps_order() {
        let recorder = RecordingDiagnostics::new();
        recorder.report(CacheDiagnostic::Corrupted {
            location: "a".into(),
            reason: "first".into(),
        });
        recorder.report(CacheDiagnostic::WriteFailed {
            location: "a".into(),
            reason: "second".into(),
        });

        let entries = recorder.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].reason(), "first");
        assert_eq!(entries[1].reason(), "second");

        recorder.clear();
        assert!(recorder.is_empty());
    }
}

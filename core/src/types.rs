//! Shared primitive types used across the entire pipeline.

/// Catalog identifiers. Owned by the CRUD layer; the pipeline only
/// resolves them through explicit store lookups.
pub type VideoId = i64;
pub type UserId = i64;
pub type AdId = i64;
pub type PlacementId = i64;

/// A playback session identifier (UUID v4, text form).
pub type SessionId = String;

/// A batch run identifier (UUID v4, text form).
pub type RunId = String;

/// A playback offset or a watched duration, in whole seconds.
pub type Seconds = i64;

/// Money in whole currency units. Fractions are truncated, never rounded.
pub type Amount = i64;

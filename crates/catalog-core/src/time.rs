// crates/catalog-core/src/time.rs
// ============================================================================
// Module: Timestamps
// Description: Canonical timestamp newtype used throughout persisted records.
// Purpose: Give every `created_at`/`expires_at`/`started_at` field one
// serialization format (RFC 3339) regardless of which crate produces it.
// Dependencies: serde, time
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// A UTC instant, serialized as an RFC 3339 string on the wire and stored as
/// RFC 3339 text in SQLite (`TEXT` columns sort correctly for RFC 3339).
///
/// # Invariants
/// - Always UTC; no local-offset timestamps are constructed by this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp(OffsetDateTime);

impl Timestamp {
    /// Wraps an existing UTC [`OffsetDateTime`].
    #[must_use]
    pub fn from_offset_date_time(dt: OffsetDateTime) -> Self {
        Self(dt.to_offset(time::UtcOffset::UTC))
    }

    /// Returns the underlying [`OffsetDateTime`].
    #[must_use]
    pub const fn as_offset_date_time(&self) -> OffsetDateTime {
        self.0
    }

    /// Formats the timestamp as RFC 3339 text.
    ///
    /// # Errors
    ///
    /// Returns an error if formatting fails (only possible for dates far
    /// outside the supported range).
    pub fn to_rfc3339(self) -> Result<String, time::error::Format> {
        self.0.format(&Rfc3339)
    }

    /// Parses a timestamp from RFC 3339 text.
    ///
    /// # Errors
    ///
    /// Returns an error if `s` is not valid RFC 3339.
    pub fn parse_rfc3339(s: &str) -> Result<Self, time::error::Parse> {
        OffsetDateTime::parse(s, &Rfc3339).map(Self::from_offset_date_time)
    }

    /// Returns the duration elapsed since `self`, saturating at zero if
    /// `self` is in the future relative to `now`.
    #[must_use]
    pub fn elapsed_since(self, now: Self) -> time::Duration {
        let delta = now.0 - self.0;
        if delta.is_negative() { time::Duration::ZERO } else { delta }
    }
}

impl Serialize for Timestamp {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_rfc3339().map_err(serde::ser::Error::custom)?.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse_rfc3339(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_rfc3339() {
        let now = Timestamp::from_offset_date_time(OffsetDateTime::now_utc());
        let text = now.to_rfc3339().expect("format");
        let parsed = Timestamp::parse_rfc3339(&text).expect("parse");
        assert_eq!(now, parsed);
    }

    #[test]
    fn elapsed_since_saturates_at_zero() {
        let now = Timestamp::from_offset_date_time(OffsetDateTime::now_utc());
        let later = Timestamp::from_offset_date_time(now.as_offset_date_time() + time::Duration::SECOND);
        assert_eq!(later.elapsed_since(now), time::Duration::ZERO);
        assert_eq!(now.elapsed_since(later), time::Duration::SECOND);
    }
}

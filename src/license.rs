//! The license record and its timestamp conventions.

use chrono::{DateTime, Datelike, SecondsFormat, TimeDelta, Timelike, Utc};
use serde::Serialize;

/// A license as held by the store.
///
/// `key` is the lookup handle and never changes. `machine_id` is `None` until
/// the first successful validation pins the license to a machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct License {
    #[serde(rename = "license_key")]
    pub key: String,
    pub machine_id: Option<String>,
    #[serde(serialize_with = "serialize_timestamp")]
    pub expires_at: DateTime<Utc>,
}

impl License {
    pub fn new(key: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            machine_id: None,
            expires_at,
        }
    }

    /// Returns true once a machine has been recorded for this license.
    pub fn is_bound(&self) -> bool {
        self.machine_id.is_some()
    }

    /// Returns true if the license is no longer usable at `now`.
    ///
    /// The expiry instant itself already counts as expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Last calendar year an expiry may fall in.
///
/// RFC 3339 text of later years gains a sign and extra digits, which breaks
/// the lexical ordering of the SQLite `expires_at` column.
pub const MAX_EXPIRY_YEAR: i32 = 9999;

/// Drop sub-second precision so a stored timestamp round-trips exactly
/// through every backend.
pub fn truncate_to_seconds(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.with_nanosecond(0).unwrap_or(ts)
}

/// Compute `now + days`, truncated to whole seconds.
///
/// Returns `None` when `days` is not positive or the result would land
/// after year [`MAX_EXPIRY_YEAR`].
pub fn expiry_after_days(now: DateTime<Utc>, days: i64) -> Option<DateTime<Utc>> {
    if days <= 0 {
        return None;
    }
    let span = TimeDelta::try_days(days)?;
    let expires_at = now.checked_add_signed(span).map(truncate_to_seconds)?;
    (expires_at.year() <= MAX_EXPIRY_YEAR).then_some(expires_at)
}

/// Render a timestamp the way it is echoed to callers: RFC 3339, UTC, `Z`.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn serialize_timestamp<S>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&format_timestamp(ts))
}

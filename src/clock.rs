//! # Time Reference and Clock
//!
//! NOAA can answer in local standard time, local standard-or-daylight time, or
//! GMT. Whichever one is requested, the chart's "now" marker has to be read
//! from the same wall clock or it drifts off the data by the DST or zone
//! offset. [`Clock`] hands out the current instant already tagged with its
//! [`TimeReference`] so the fetcher and renderer can share it, and so tests
//! can pin it with [`FixedClock`].

use chrono::{Duration, FixedOffset, Local, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which wall clock timestamps are expressed in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimeReference {
    /// Local standard time all year round (NOAA `lst`)
    LocalStandard,
    /// Local time, following daylight saving when it is in effect (NOAA `lst_ldt`)
    #[default]
    LocalStandardOrDaylight,
    /// Coordinated universal time (NOAA `gmt`)
    Utc,
}

impl TimeReference {
    /// Value for the NOAA `time_zone` query parameter.
    pub fn noaa_token(self) -> &'static str {
        match self {
            TimeReference::LocalStandard => "lst",
            TimeReference::LocalStandardOrDaylight => "lst_ldt",
            TimeReference::Utc => "gmt",
        }
    }
}

impl fmt::Display for TimeReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimeReference::LocalStandard => "local-standard",
            TimeReference::LocalStandardOrDaylight => "local-standard-or-daylight",
            TimeReference::Utc => "utc",
        };
        f.write_str(name)
    }
}

/// The current instant as read on a particular wall clock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReferenceTime {
    pub at: NaiveDateTime,
    pub reference: TimeReference,
}

impl ReferenceTime {
    pub fn new(at: NaiveDateTime, reference: TimeReference) -> Self {
        Self { at, reference }
    }
}

/// Source of "now" for one pipeline iteration.
pub trait Clock {
    fn now(&self) -> ReferenceTime;
}

/// Reads the host clock and zone settings.
#[derive(Clone, Copy, Debug)]
pub struct SystemClock {
    reference: TimeReference,
}

impl SystemClock {
    pub fn new(reference: TimeReference) -> Self {
        Self { reference }
    }

    /// Whether the host zone is currently observing daylight saving time.
    pub fn dst_in_effect() -> bool {
        let now = Utc::now().naive_utc();
        let current = Local.offset_from_utc_datetime(&now).fix();
        current != standard_offset(&Local, now)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> ReferenceTime {
        let utc = Utc::now().naive_utc();
        let at = match self.reference {
            TimeReference::Utc => utc,
            TimeReference::LocalStandardOrDaylight => Local::now().naive_local(),
            TimeReference::LocalStandard => {
                let offset = standard_offset(&Local, utc);
                utc + Duration::seconds(i64::from(offset.local_minus_utc()))
            }
        };
        ReferenceTime::new(at, self.reference)
    }
}

/// Always returns the same instant.
#[derive(Clone, Copy, Debug)]
pub struct FixedClock(pub ReferenceTime);

impl Clock for FixedClock {
    fn now(&self) -> ReferenceTime {
        self.0
    }
}

/// Standard (non-daylight) UTC offset of `tz` in the year containing `utc`.
///
/// Daylight saving only ever adds to the offset, so the standard offset is the
/// smaller of the offsets seen in January and July. This holds in both
/// hemispheres.
pub fn standard_offset<Tz: TimeZone>(tz: &Tz, utc: NaiveDateTime) -> FixedOffset {
    use chrono::Datelike;

    let current = tz.offset_from_utc_datetime(&utc).fix();
    [1, 7]
        .into_iter()
        .filter_map(|month| NaiveDate::from_ymd_opt(utc.year(), month, 1))
        .map(|date| tz.offset_from_utc_date(&date).fix())
        .min_by_key(|offset| offset.local_minus_utc())
        .unwrap_or(current)
}

//! Wall-clock helpers shared by both adapters

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, LocalResult, NaiveDate, NaiveDateTime, Offset,
    TimeZone, Utc,
};

use crate::error::{Error, Result};

/// Build a local timestamp from the raw fields a terminal reports
///
/// Terminal clocks ignore daylight saving, so a reading may fall into a
/// skipped hour. Such a reading is taken with the offset in force before the
/// gap; a repeated hour resolves to its first occurrence. Only an impossible
/// calendar date is rejected.
pub fn local<Tz: TimeZone>(
    zone: &Tz,
    year: i32,
    month: u8,
    day: u8,
    hour: u8,
    minute: u8,
    second: u8,
) -> Result<DateTime<Tz>> {
    NaiveDate::from_ymd_opt(year, month as u32, day as u32)
        .and_then(|date| date.and_hms_opt(hour as u32, minute as u32, second as u32))
        .and_then(|naive| resolve(zone, &naive))
        .ok_or_else(|| {
            Error::InvalidClock(format!(
                "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                year, month, day, hour, minute, second
            ))
        })
}

fn resolve<Tz: TimeZone>(zone: &Tz, naive: &NaiveDateTime) -> Option<DateTime<Tz>> {
    match zone.from_local_datetime(naive) {
        LocalResult::Single(at) => Some(at),
        LocalResult::Ambiguous(earliest, _) => Some(earliest),
        LocalResult::None => {
            let before = zone
                .offset_from_utc_datetime(&naive.checked_sub_signed(Duration::days(1))?)
                .fix();
            let utc = naive.checked_sub_signed(Duration::seconds(before.local_minus_utc() as i64))?;
            Some(zone.from_utc_datetime(&utc))
        }
    }
}

/// Instant `seconds` after local midnight of `epoch`
///
/// The seconds are elapsed time, so they are added to the epoch instant and
/// the result always exists in `zone`.
pub fn since_epoch<Tz: TimeZone>(zone: &Tz, epoch: (i32, u32, u32), seconds: u64) -> Result<DateTime<Tz>> {
    let (year, month, day) = epoch;

    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .and_then(|midnight| resolve(zone, &midnight))
        .and_then(|start| {
            let elapsed = Duration::try_seconds(i64::try_from(seconds).ok()?)?;
            start.checked_add_signed(elapsed)
        })
        .ok_or_else(|| Error::InvalidClock(format!("{} seconds after {:?}", seconds, epoch)))
}

/// Pin a zoned timestamp to its current offset
pub fn to_fixed<Tz: TimeZone>(at: &DateTime<Tz>) -> DateTime<FixedOffset> {
    at.with_timezone(&at.offset().fix())
}

/// First year of the current century in `zone`, e.g. 2000
pub fn current_century<Tz: TimeZone>(zone: &Tz) -> i32 {
    Utc::now().with_timezone(zone).year() / 100 * 100
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;
    use chrono_tz::Europe::Madrid;

    #[test]
    fn test_since_epoch_adds_wall_seconds() {
        let zone = FixedOffset::east_opt(3 * 3600).unwrap();
        let at = since_epoch(&zone, (2000, 1, 2), 86_400 + 3_661).unwrap();

        assert_eq!((at.year(), at.month(), at.day()), (2000, 1, 3));
        assert_eq!((at.hour(), at.minute(), at.second()), (1, 1, 1));
        assert_eq!(at.offset().local_minus_utc(), 3 * 3600);
    }

    fn face(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
    }

    #[test]
    fn test_since_epoch_adds_elapsed_time_to_epoch_instant() {
        let seconds = (face(2024, 7, 1, 12, 0) - face(2000, 1, 2, 0, 0)).num_seconds() as u64;
        let at = since_epoch(&Madrid, (2000, 1, 2), seconds).unwrap();
        assert_eq!(at.to_rfc3339(), "2024-07-01T13:00:00+02:00");
    }

    #[test]
    fn test_since_epoch_across_spring_gap() {
        let seconds = (face(2024, 3, 31, 2, 30) - face(2000, 1, 2, 0, 0)).num_seconds() as u64;
        let at = since_epoch(&Madrid, (2000, 1, 2), seconds).unwrap();
        assert_eq!(at.to_rfc3339(), "2024-03-31T03:30:00+02:00");
    }

    #[test]
    fn test_local_reading_in_gap_or_overlap() {
        let skipped = local(&Madrid, 2024, 3, 31, 2, 30, 0).unwrap();
        assert_eq!(skipped.to_rfc3339(), "2024-03-31T03:30:00+02:00");

        let repeated = local(&Madrid, 2024, 10, 27, 2, 30, 0).unwrap();
        assert_eq!(repeated.to_rfc3339(), "2024-10-27T02:30:00+02:00");
    }

    #[test]
    fn test_local_rejects_impossible_date() {
        let result = local(&Utc, 2024, 2, 30, 0, 0, 0);
        assert!(matches!(result, Err(Error::InvalidClock(_))));
    }

    #[test]
    fn test_current_century() {
        assert_eq!(current_century(&Utc) % 100, 0);
        assert!(current_century(&Utc) >= 2000);
    }
}

/// A DOS date.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Date {
    /// Year number.
    /// Valid range is [1980, 2107].
    year: u16,
    /// Month of the year.
    /// Valid range is [1, 12].
    month: u8,
    /// Day of the month.
    /// Valid range is [1, 31] but it depends on the month
    /// and year (leap year).
    day: u8,
}

impl Date {
    const MIN_YEAR: u16 = 1980;
    const MAX_YEAR: u16 = 2107;

    /// Creates a new `Date` instance.
    ///
    /// # Panics
    ///
    /// Panics if one of provided arguments is out of the supported range.
    #[must_use]
    pub const fn new(year: u16, month: u8, day: u8) -> Self {
        assert!(
            year >= Self::MIN_YEAR && year <= Self::MAX_YEAR,
            "year out of range"
        );
        assert!(month >= 1 && month <= 12, "month out of range");
        assert!(day >= 1 && day <= 31, "day out of range");
        Self { year, month, day }
    }

    #[must_use]
    /// Creates a new `Date` from a DOS encoded date.
    pub const fn decode(dos_date: u16) -> Self {
        Self {
            year: (dos_date >> 9) + Self::MIN_YEAR,
            month: ((dos_date >> 5) & 0xF) as u8,
            day: (dos_date & 0x1F) as u8,
        }
    }

    #[must_use]
    /// Encodes the date into a DOS compatible format.
    pub const fn encode(self) -> u16 {
        ((self.year - Self::MIN_YEAR) << 9) | ((self.month as u16) << 5) | self.day as u16
    }

    #[must_use]
    #[inline]
    pub const fn year(&self) -> u16 {
        self.year
    }

    #[must_use]
    #[inline]
    pub const fn month(&self) -> u8 {
        self.month
    }

    #[must_use]
    #[inline]
    pub const fn day(&self) -> u8 {
        self.day
    }
}

/// A DOS time.
///
/// DOS stores seconds with a two-second resolution, so odd seconds
/// only survive in the creation time's tenths byte.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Time {
    /// Hours.
    /// Valid range is [0, 23]
    hour: u8,
    /// Minutes.
    /// Valid range is [0, 59]
    min: u8,
    /// Seconds.
    /// Valid range is [0, 59]
    sec: u8,
}

impl Time {
    /// Creates a new `Time` instance.
    ///
    /// # Panics
    ///
    /// Panics if one of provided arguments is out of the supported range.
    #[must_use]
    pub const fn new(hour: u8, min: u8, sec: u8) -> Self {
        assert!(hour <= 23 && min <= 59 && sec <= 59, "time out of range");
        Self { hour, min, sec }
    }

    #[must_use]
    pub const fn decode(dos_time: u16) -> Self {
        Self {
            hour: (dos_time >> 11) as u8,
            min: ((dos_time >> 5) & 0x3F) as u8,
            sec: ((dos_time & 0x1F) * 2) as u8,
        }
    }

    #[must_use]
    pub const fn encode(self) -> u16 {
        ((self.hour as u16) << 11) | ((self.min as u16) << 5) | (self.sec as u16 / 2)
    }

    #[must_use]
    /// Returns the creation-time refinement byte, in units of 10 ms.
    pub const fn encode_tenths(self) -> u8 {
        (self.sec % 2) * 100
    }

    #[must_use]
    #[inline]
    pub const fn hour(&self) -> u8 {
        self.hour
    }

    #[must_use]
    #[inline]
    pub const fn min(&self) -> u8 {
        self.min
    }

    #[must_use]
    #[inline]
    pub const fn sec(&self) -> u8 {
        self.sec
    }
}

/// A DOS date and time.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct DateTime {
    date: Date,
    time: Time,
}

impl DateTime {
    /// Timestamp stamped on every entry written when no clock is available.
    pub const PLACEHOLDER: Self = Self::new(Date::new(2021, 4, 15), Time::new(12, 10, 20));

    #[must_use]
    #[inline]
    pub const fn new(date: Date, time: Time) -> Self {
        Self { date, time }
    }

    #[must_use]
    /// Creates a new `DateTime` from the DOS encoded date and time of an entry.
    pub const fn decode(dos_date: u16, dos_time: u16) -> Self {
        Self::new(Date::decode(dos_date), Time::decode(dos_time))
    }

    #[must_use]
    #[inline]
    pub const fn date(&self) -> Date {
        self.date
    }

    #[must_use]
    #[inline]
    pub const fn time(&self) -> Time {
        self.time
    }
}

impl Default for DateTime {
    fn default() -> Self {
        Self::PLACEHOLDER
    }
}

#[cfg(test)]
mod tests {
    use super::{Date, DateTime, Time};

    #[test]
    fn date() {
        let _ = Date::new(1980, 1, 1);
        let _ = Date::new(2107, 12, 31);
    }

    #[test]
    #[should_panic = "year out of range"]
    fn date_too_early_panic() {
        let _ = Date::new(1979, 12, 31);
    }

    #[test]
    #[should_panic = "month out of range"]
    fn date_bad_month_panic() {
        let _ = Date::new(2000, 13, 1);
    }

    #[test]
    fn date_encode_decode() {
        let date = Date::new(2055, 7, 23);
        let encoded = date.encode();
        assert_eq!(encoded, 38647);
        assert_eq!(date, Date::decode(encoded));
    }

    #[test]
    fn time_encode_decode() {
        let even = Time::new(15, 3, 28);
        let odd = Time::new(15, 3, 29);
        assert_eq!(even.encode(), 30830);
        assert_eq!(odd.encode(), 30830);
        assert_eq!(even.encode_tenths(), 0);
        assert_eq!(odd.encode_tenths(), 100);
        assert_eq!(Time::decode(odd.encode()), even);
    }

    #[test]
    fn placeholder_encoding() {
        let placeholder = DateTime::PLACEHOLDER;
        assert_eq!(placeholder.time().encode(), (12 << 11) | (10 << 5) | 10);
        assert_eq!(placeholder.date().encode(), (41 << 9) | (4 << 5) | 15);
        assert_eq!(placeholder.time().encode_tenths(), 0);
        assert_eq!(DateTime::default(), placeholder);
        assert_eq!(
            DateTime::decode(placeholder.date().encode(), placeholder.time().encode()),
            placeholder
        );
    }
}

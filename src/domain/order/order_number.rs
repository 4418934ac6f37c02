use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use super::errors::OrderError;

// ============================================================================
// Order Numbers - ORD-YYYY-MM-NNNNNN
// ============================================================================
//
// Sequences restart at 1 every calendar month (UTC) and never wrap. Allocation
// must run inside a serialized unit of work; this module only computes the
// successor of whatever the store reports as the last number.
//
// ============================================================================

const PREFIX: &str = "ORD";

/// Highest sequence a single month can issue.
pub const MAX_SEQUENCE: u32 = 999_999;

/// Calendar month an order number belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderPeriod {
    pub year: i32,
    pub month: u32,
}

impl OrderPeriod {
    pub fn new(year: i32, month: u32) -> Result<Self, OrderError> {
        if !(0..=9999).contains(&year) || !(1..=12).contains(&month) {
            return Err(OrderError::InvalidOrderNumber(format!("{year}-{month}")));
        }
        Ok(Self { year, month })
    }

    pub fn of(at: DateTime<Utc>) -> Result<Self, OrderError> {
        Self::new(at.year(), at.month())
    }

    /// Leading `ORD-YYYY-MM-` shared by every number of this period.
    pub fn number_prefix(&self) -> String {
        format!("{PREFIX}-{self}-")
    }
}

impl fmt::Display for OrderPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Human-readable order identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OrderNumber {
    period: OrderPeriod,
    sequence: u32,
}

impl OrderNumber {
    pub fn new(period: OrderPeriod, sequence: u32) -> Result<Self, OrderError> {
        if sequence == 0 {
            return Err(OrderError::InvalidOrderNumber(format!("{period}-{sequence}")));
        }
        if sequence > MAX_SEQUENCE {
            return Err(OrderError::SequenceExhausted {
                year: period.year,
                month: period.month,
            });
        }
        Ok(Self { period, sequence })
    }

    pub fn period(&self) -> OrderPeriod {
        self.period
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{PREFIX}-{}-{:06}", self.period, self.sequence)
    }
}

impl FromStr for OrderNumber {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || OrderError::InvalidOrderNumber(s.to_string());

        let parts: Vec<&str> = s.split('-').collect();
        let [prefix, year, month, sequence] = parts.as_slice() else {
            return Err(invalid());
        };

        let all_digits = |part: &str, len: usize| {
            part.len() == len && part.bytes().all(|b| b.is_ascii_digit())
        };
        if *prefix != PREFIX
            || !all_digits(*year, 4)
            || !all_digits(*month, 2)
            || !all_digits(*sequence, 6)
        {
            return Err(invalid());
        }

        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        let sequence: u32 = sequence.parse().map_err(|_| invalid())?;

        let period = OrderPeriod::new(year, month).map_err(|_| invalid())?;
        if sequence == 0 {
            return Err(invalid());
        }
        Ok(Self { period, sequence })
    }
}

impl TryFrom<String> for OrderNumber {
    type Error = OrderError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<OrderNumber> for String {
    fn from(number: OrderNumber) -> Self {
        number.to_string()
    }
}

/// Successor of `last` within `period`.
///
/// A missing last number, or one issued in another month, starts the
/// sequence at 1. Running past [`MAX_SEQUENCE`] is an error, never a wrap.
pub fn next_order_number(
    period: OrderPeriod,
    last: Option<&OrderNumber>,
) -> Result<OrderNumber, OrderError> {
    let sequence = match last {
        Some(last) if last.period() == period => last.sequence() + 1,
        _ => 1,
    };
    OrderNumber::new(period, sequence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn july_2025() -> OrderPeriod {
        OrderPeriod::new(2025, 7).unwrap()
    }

    #[test]
    fn test_first_number_of_month() {
        let number = next_order_number(july_2025(), None).unwrap();
        assert_eq!(number.to_string(), "ORD-2025-07-000001");
    }

    #[test]
    fn test_increments_last_number() {
        let last: OrderNumber = "ORD-2025-07-000041".parse().unwrap();
        let number = next_order_number(july_2025(), Some(&last)).unwrap();
        assert_eq!(number.to_string(), "ORD-2025-07-000042");
    }

    #[test]
    fn test_last_number_from_other_month_restarts_sequence() {
        let last: OrderNumber = "ORD-2025-06-000318".parse().unwrap();
        let number = next_order_number(july_2025(), Some(&last)).unwrap();
        assert_eq!(number.sequence(), 1);
    }

    #[test]
    fn test_overflow_is_an_error() {
        let last: OrderNumber = "ORD-2025-07-999999".parse().unwrap();
        let result = next_order_number(july_2025(), Some(&last));
        assert_eq!(
            result,
            Err(OrderError::SequenceExhausted { year: 2025, month: 7 })
        );
    }

    #[test]
    fn test_parse_rejects_malformed_numbers() {
        for raw in [
            "",
            "ORD-2025-07",
            "ORD-2025-7-000001",
            "ORD-2025-13-000001",
            "ORD-2025-07-000000",
            "ORD-2025-07-1",
            "INV-2025-07-000001",
            "ORD-2025-07-00000a",
            "ORD-2025-07-000001-1",
        ] {
            assert!(raw.parse::<OrderNumber>().is_err(), "{raw} should not parse");
        }
    }

    #[test]
    fn test_parse_and_display_agree() {
        let number: OrderNumber = "ORD-1999-12-123456".parse().unwrap();
        assert_eq!(number.period(), OrderPeriod::new(1999, 12).unwrap());
        assert_eq!(number.sequence(), 123_456);
        assert_eq!(number.to_string(), "ORD-1999-12-123456");
    }

    #[test]
    fn test_numbers_order_by_period_then_sequence() {
        let a: OrderNumber = "ORD-2025-06-000900".parse().unwrap();
        let b: OrderNumber = "ORD-2025-07-000002".parse().unwrap();
        let c: OrderNumber = "ORD-2025-07-000010".parse().unwrap();
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_period_of_uses_utc_calendar() {
        let at = Utc.with_ymd_and_hms(2025, 12, 31, 23, 59, 59).unwrap();
        assert_eq!(OrderPeriod::of(at).unwrap(), OrderPeriod::new(2025, 12).unwrap());
    }

    #[test]
    fn test_period_of_rejects_unprintable_years() {
        let far = Utc.with_ymd_and_hms(10_000, 1, 1, 0, 0, 0).unwrap();
        assert!(matches!(
            OrderPeriod::of(far),
            Err(OrderError::InvalidOrderNumber(_))
        ));
    }

    #[test]
    fn test_number_prefix_matches_display() {
        let number: OrderNumber = "ORD-2025-07-000042".parse().unwrap();
        assert!(number.to_string().starts_with(&number.period().number_prefix()));
        assert_eq!(number.period().number_prefix(), "ORD-2025-07-");
    }

    #[test]
    fn test_serializes_as_string() {
        let number: OrderNumber = "ORD-2025-07-000001".parse().unwrap();
        let json = serde_json::to_string(&number).unwrap();
        assert_eq!(json, "\"ORD-2025-07-000001\"");
        let back: OrderNumber = serde_json::from_str(&json).unwrap();
        assert_eq!(back, number);
        assert!(serde_json::from_str::<OrderNumber>("\"nope\"").is_err());
    }
}

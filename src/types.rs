//! Value types shared by the stored records
use crate::error::{MarketResult, MarketplaceError};
use chrono::{DateTime, Utc};

/// UTC instant, stored as i64 nanoseconds since the epoch.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
pub struct TimeStamp(DateTime<Utc>);

impl TimeStamp {
    pub fn new() -> Self {
        Self(Utc::now())
    }
}

impl Default for TimeStamp {
    fn default() -> Self {
        Self::new()
    }
}

impl From<DateTime<Utc>> for TimeStamp {
    fn from(value: DateTime<Utc>) -> Self {
        TimeStamp(value)
    }
}

impl std::fmt::Display for TimeStamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

impl<C> minicbor::Encode<C> for TimeStamp {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

/// Money in minor units (kuruş). Integers only, never floats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(u64);

impl Amount {
    pub const MINOR_PER_MAJOR: u64 = 100;

    pub fn from_minor(minor: u64) -> Self {
        Self(minor)
    }
    /// Whole units. Saturates at `u64::MAX` minor units; use
    /// [`Amount::checked_from_major`] for untrusted input.
    pub fn from_major(major: u64) -> Self {
        Self(major.saturating_mul(Self::MINOR_PER_MAJOR))
    }
    pub fn checked_from_major(major: u64) -> MarketResult<Self> {
        major
            .checked_mul(Self::MINOR_PER_MAJOR)
            .map(Self)
            .ok_or_else(|| MarketplaceError::validation(format!("{major} is out of range")))
    }
    pub fn minor_units(&self) -> u64 {
        self.0
    }
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Parses a decimal such as `450`, `450.5` or `450.50`.
    pub fn parse(input: &str) -> MarketResult<Self> {
        let input = input.trim();
        let invalid = || MarketplaceError::validation(format!("'{input}' is not a valid price"));

        let (major, minor) = match input.split_once('.') {
            Some((major, minor)) => (major, minor),
            None => (input, ""),
        };
        if major.is_empty() || !major.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        if minor.len() > 2 || !minor.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let major: u64 = major.parse().map_err(|_| invalid())?;
        let minor: u64 = match minor.len() {
            0 => 0,
            1 => minor.parse::<u64>().map_err(|_| invalid())? * 10,
            _ => minor.parse().map_err(|_| invalid())?,
        };

        let whole = Self::checked_from_major(major).map_err(|_| invalid())?;
        whole.0.checked_add(minor).map(Self).ok_or_else(invalid)
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{:02}",
            self.0 / Self::MINOR_PER_MAJOR,
            self.0 % Self::MINOR_PER_MAJOR
        )
    }
}

impl<C> minicbor::Encode<C> for Amount {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.u64(self.0)?.ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for Amount {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        Ok(Amount(d.u64()?))
    }
}

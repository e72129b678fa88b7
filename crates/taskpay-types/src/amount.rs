use serde::{Deserialize, Serialize};
use std::fmt;

pub const USD_DECIMALS: u32 = 6;
pub const USD_BASE_UNIT: u64 = 1_000_000; // 10^6 micro-dollars

/// Fixed-point USD amount. All ledger math happens on integer base units;
/// floats only appear at the presentation boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UsdAmount(u64);

impl UsdAmount {
    pub const ZERO: Self = Self(0);

    pub fn from_usd(usd: f64) -> Self {
        Self((usd * USD_BASE_UNIT as f64).round() as u64)
    }

    pub fn from_cents(cents: u64) -> Self {
        Self(cents * (USD_BASE_UNIT / 100))
    }

    pub fn from_base_units(units: u64) -> Self {
        Self(units)
    }

    pub fn to_usd(&self) -> f64 {
        self.0 as f64 / USD_BASE_UNIT as f64
    }

    pub fn to_base_units(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(&self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(&self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    pub fn saturating_add(&self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(&self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// Percentage slice of this amount, rounded to the nearest base unit.
    /// Used for withdrawal fee math.
    pub fn percent(&self, pct: f64) -> Self {
        Self((self.0 as f64 * pct / 100.0).round() as u64)
    }
}

impl fmt::Display for UsdAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${:.2}", self.to_usd())
    }
}

impl std::iter::Sum for UsdAmount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |acc, x| acc.saturating_add(x))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let amount = UsdAmount::from_usd(20.0);
        assert_eq!(amount.to_base_units(), 20_000_000);
        assert_eq!(amount.to_usd(), 20.0);
        assert_eq!(UsdAmount::from_cents(1021).to_usd(), 10.21);
    }

    #[test]
    fn test_fee_math() {
        // $10.21 at 2% -> fee $0.2042, net $10.0058
        let gross = UsdAmount::from_cents(1021);
        let fee = gross.percent(2.0);
        assert_eq!(fee.to_base_units(), 204_200);
        let net = gross.saturating_sub(fee);
        assert!(net > UsdAmount::from_usd(10.0));

        // $10.00 at 2% -> net $9.80, below a $10 floor
        let gross = UsdAmount::from_usd(10.0);
        let net = gross.saturating_sub(gross.percent(2.0));
        assert_eq!(net, UsdAmount::from_usd(9.8));
    }

    #[test]
    fn test_checked_ops() {
        let a = UsdAmount::from_usd(5.0);
        let b = UsdAmount::from_usd(8.0);
        assert_eq!(a.checked_sub(b), None);
        assert_eq!(b.checked_sub(a), Some(UsdAmount::from_usd(3.0)));
        assert_eq!(a.saturating_sub(b), UsdAmount::ZERO);
    }

    #[test]
    fn test_display() {
        assert_eq!(UsdAmount::from_usd(12.5).to_string(), "$12.50");
        assert_eq!(UsdAmount::ZERO.to_string(), "$0.00");
    }
}

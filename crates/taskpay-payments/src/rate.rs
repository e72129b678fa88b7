//! Display-only currency conversion.
//!
//! The rate feeds UI strings and the provider's local-currency amount;
//! amounts of record stay in USD. Providers are injectable so tests pin the
//! rate.

use rand::Rng;
use std::sync::Mutex;
use taskpay_types::UsdAmount;

pub const DEFAULT_BASE_RATE: f64 = 129.55; // KES per USD

pub trait ExchangeRateProvider: Send + Sync {
    fn current_rate(&self) -> f64;
}

pub struct FixedRateProvider(pub f64);

impl ExchangeRateProvider for FixedRateProvider {
    fn current_rate(&self) -> f64 {
        self.0
    }
}

/// Random walk around a base rate, clamped to a band. Each read nudges the
/// rate a little so the display feels live.
pub struct SimulatedRateProvider {
    base: f64,
    spread: f64,
    state: Mutex<f64>,
}

impl SimulatedRateProvider {
    pub fn new(base: f64, spread: f64) -> Self {
        Self {
            base,
            spread,
            state: Mutex::new(base),
        }
    }
}

impl Default for SimulatedRateProvider {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_RATE, 2.5)
    }
}

impl ExchangeRateProvider for SimulatedRateProvider {
    fn current_rate(&self) -> f64 {
        let mut state = self.state.lock().expect("rate state poisoned");
        let step: f64 = rand::thread_rng().gen_range(-0.15..=0.15);
        *state = (*state + step).clamp(self.base - self.spread, self.base + self.spread);
        *state
    }
}

/// Local-currency conversion for a USD amount, rounded to whole units as
/// the provider expects.
pub fn to_kes(amount: UsdAmount, rate: f64) -> u64 {
    (amount.to_usd() * rate).round() as u64
}

/// Cosmetic `Ksh.12,945.00` rendering with thousands separators.
pub fn format_kes(amount: UsdAmount, rate: f64) -> String {
    let total_cents = (amount.to_usd() * rate * 100.0).round() as u64;
    let whole = total_cents / 100;
    let cents = total_cents % 100;

    let digits = whole.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    format!("Ksh.{}.{:02}", grouped, cents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_rate() {
        let provider = FixedRateProvider(130.0);
        assert_eq!(provider.current_rate(), 130.0);
        assert_eq!(to_kes(UsdAmount::from_usd(10.0), provider.current_rate()), 1300);
    }

    #[test]
    fn test_simulated_rate_stays_in_band() {
        let provider = SimulatedRateProvider::new(129.55, 2.5);
        for _ in 0..500 {
            let rate = provider.current_rate();
            assert!((127.05..=132.05).contains(&rate), "rate {} left the band", rate);
        }
    }

    #[test]
    fn test_format_kes() {
        assert_eq!(format_kes(UsdAmount::from_usd(100.0), 129.55), "Ksh.12,955.00");
        assert_eq!(format_kes(UsdAmount::from_usd(1.0), 129.55), "Ksh.129.55");
        assert_eq!(format_kes(UsdAmount::ZERO, 129.55), "Ksh.0.00");
    }
}

//! Mobile-money number handling.
//!
//! Subscriber numbers are accepted in local (`07XXXXXXXX` / `01XXXXXXXX`)
//! or international (`+254...` / `254...`) form and normalized to the
//! provider's expected `254[17]XXXXXXXX` format.

/// Normalize a user-entered number to `254[17]XXXXXXXX`.
///
/// Returns `None` when the input is not a well-formed subscriber number on
/// a supported network prefix.
pub fn normalize_msisdn(input: &str) -> Option<String> {
    let digits: String = input.chars().filter(|c| c.is_ascii_digit()).collect();

    let normalized = if (input.starts_with("07") || input.starts_with("01")) && digits.len() == 10 {
        format!("254{}", &digits[1..])
    } else if (input.starts_with("+254") || digits.starts_with("254")) && digits.len() == 12 {
        digits
    } else {
        return None;
    };

    is_push_ready(&normalized).then_some(normalized)
}

/// Whether an already-normalized number matches `254[17]XXXXXXXX`.
pub fn is_push_ready(msisdn: &str) -> bool {
    msisdn.len() == 12
        && msisdn.starts_with("254")
        && matches!(msisdn.as_bytes()[3], b'1' | b'7')
        && msisdn.chars().all(|c| c.is_ascii_digit())
}

/// Format check on the raw input, before normalization. Mirrors what the
/// upgrade and withdrawal forms accept.
pub fn is_valid_mobile_number(input: &str) -> bool {
    normalize_msisdn(input).is_some()
}

// src/utils.rs
//
// Input validation and display formatting shared by the dashboard surfaces.

use lazy_static::lazy_static;
use regex::Regex;
use rust_decimal::Decimal;

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap();
    static ref PHONE_RE: Regex = Regex::new(r"^\+?[1-9]\d{0,15}$").unwrap();
    // Plate format: ABC-123 or ABC-1234.
    static ref PLATE_RE: Regex = Regex::new(r"^[A-Z]{3}-\d{3,4}$").unwrap();
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Accepts separators (spaces, dashes, parentheses); validates the digits.
pub fn is_valid_phone(phone: &str) -> bool {
    let digits: String = phone
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
        .collect();
    PHONE_RE.is_match(&digits)
}

pub fn is_valid_license_plate(plate: &str) -> bool {
    PLATE_RE.is_match(&plate.to_uppercase())
}

/// "₡1,234,567.50"; whole amounts drop the cents.
pub fn format_colones(amount: Decimal) -> String {
    let rounded = amount.round_dp(2);
    let as_text = rounded.abs().to_string();
    let (integer_part, fraction_part) = match as_text.split_once('.') {
        Some((i, f)) => (i.to_string(), f.trim_end_matches('0').to_string()),
        None => (as_text, String::new()),
    };

    let mut grouped = String::new();
    let digits: Vec<char> = integer_part.chars().collect();
    for (i, c) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(*c);
    }

    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };
    if fraction_part.is_empty() {
        format!("{}₡{}", sign, grouped)
    } else {
        format!("{}₡{}.{}", sign, grouped, fraction_part)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn email_validation() {
        assert!(is_valid_email("taller@autoandrade.cr"));
        assert!(is_valid_email("maria.jimenez@example.com"));
        assert!(!is_valid_email("sin-arroba.com"));
        assert!(!is_valid_email("dos@@example.com"));
        assert!(!is_valid_email("espacio en@example.com"));
    }

    #[test]
    fn phone_validation_strips_separators() {
        assert!(is_valid_phone("8888-1234"));
        assert!(is_valid_phone("+506 8888 1234"));
        assert!(is_valid_phone("(506) 2222-3333"));
        assert!(!is_valid_phone("0123"));
        assert!(!is_valid_phone("no-phone"));
    }

    #[test]
    fn license_plate_validation() {
        assert!(is_valid_license_plate("ABC-123"));
        assert!(is_valid_license_plate("abc-1234"));
        assert!(!is_valid_license_plate("AB-123"));
        assert!(!is_valid_license_plate("ABCD-123"));
        assert!(!is_valid_license_plate("ABC123"));
    }

    #[test]
    fn colones_formatting_groups_thousands() {
        assert_eq!(format_colones(dec!(1234567)), "₡1,234,567");
        assert_eq!(format_colones(dec!(45000)), "₡45,000");
        assert_eq!(format_colones(dec!(850)), "₡850");
        assert_eq!(format_colones(dec!(0)), "₡0");
    }

    #[test]
    fn colones_formatting_keeps_meaningful_cents() {
        assert_eq!(format_colones(dec!(1234.50)), "₡1,234.5");
        assert_eq!(format_colones(dec!(99.99)), "₡99.99");
        assert_eq!(format_colones(dec!(100.00)), "₡100");
    }

    #[test]
    fn colones_formatting_handles_negatives() {
        assert_eq!(format_colones(dec!(-45000)), "-₡45,000");
    }
}

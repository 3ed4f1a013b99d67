use std::fmt;

pub const NAME_MAX_LEN: usize = 200;
pub const TEXT_MAX_LEN: usize = 5000;
pub const EMAIL_MAX_LEN: usize = 254;
pub const PASSWORD_MIN_LEN: usize = 8;
pub const PASSWORD_MAX_LEN: usize = 128;
pub const CREDIT_ROLE_MAX_LEN: usize = 40;
pub const ISSUE_NUMBER_MAX_LEN: usize = 20;
pub const MAX_CHECKOUT_ITEMS: usize = 50;
/// Stripe's upper bound for a single charge in minor units.
pub const MAX_PRICE_MINOR: i64 = 99_999_999;
pub const ALLOWED_CURRENCIES: &[&str] = &["eur", "usd", "gbp", "chf"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), ValidationError>;

pub fn sanitize_string(value: &str) -> String {
    value
        .chars()
        .filter(|ch| !ch.is_control())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn validate_required(field: &'static str, value: &str) -> ValidationResult {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }

    Ok(())
}

pub fn validate_max_len(field: &'static str, value: &str, max_len: usize) -> ValidationResult {
    if value.chars().count() > max_len {
        return Err(ValidationError::new(
            field,
            format!("must be at most {} characters", max_len),
        ));
    }

    Ok(())
}

pub fn validate_enum(field: &'static str, value: &str, allowed: &[&str]) -> ValidationResult {
    if allowed.iter().all(|candidate| value != *candidate) {
        return Err(ValidationError::new(
            field,
            format!("must be one of: {}", allowed.join(", ")),
        ));
    }

    Ok(())
}

/// Sanitizes and checks a required short name, returning the cleaned value.
pub fn clean_name(field: &'static str, value: &str) -> Result<String, ValidationError> {
    let value = sanitize_string(value);
    validate_required(field, &value)?;
    validate_max_len(field, &value, NAME_MAX_LEN)?;
    Ok(value)
}

/// Optional free text: trimmed, empty becomes `None`.
pub fn clean_optional_text(
    field: &'static str,
    value: Option<&str>,
    max_len: usize,
) -> Result<Option<String>, ValidationError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(text) => {
            validate_max_len(field, text, max_len)?;
            Ok(Some(text.to_string()))
        }
        None => Ok(None),
    }
}

pub fn normalize_email(email: &str) -> Result<String, ValidationError> {
    let email = email.trim().to_lowercase();
    validate_required("email", &email)?;
    validate_max_len("email", &email, EMAIL_MAX_LEN)?;

    let (local, domain) = email
        .split_once('@')
        .ok_or_else(|| ValidationError::new("email", "must contain '@'"))?;
    if local.is_empty() || domain.is_empty() || !domain.contains('.') || domain.contains('@') {
        return Err(ValidationError::new("email", "is not a valid address"));
    }
    if email.chars().any(char::is_whitespace) {
        return Err(ValidationError::new("email", "must not contain whitespace"));
    }

    Ok(email)
}

pub fn validate_password(password: &str) -> ValidationResult {
    let len = password.chars().count();
    if len < PASSWORD_MIN_LEN {
        return Err(ValidationError::new(
            "password",
            format!("must be at least {} characters", PASSWORD_MIN_LEN),
        ));
    }
    validate_max_len("password", password, PASSWORD_MAX_LEN)
}

/// Lower-cases and checks an ISO currency code against the accepted set.
pub fn normalize_currency(currency: &str) -> Result<String, ValidationError> {
    let currency = currency.trim().to_lowercase();
    validate_required("currency", &currency)?;
    validate_enum("currency", &currency, ALLOWED_CURRENCIES)?;
    Ok(currency)
}

pub fn validate_price(price: i64) -> ValidationResult {
    if price <= 0 {
        return Err(ValidationError::new("price", "must be greater than zero"));
    }
    if price > MAX_PRICE_MINOR {
        return Err(ValidationError::new(
            "price",
            format!("must be at most {}", MAX_PRICE_MINOR),
        ));
    }

    Ok(())
}

pub fn validate_year(field: &'static str, year: i32) -> ValidationResult {
    if !(1800..=2200).contains(&year) {
        return Err(ValidationError::new(field, "must be between 1800 and 2200"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_string_collapses_whitespace() {
        assert_eq!(sanitize_string("  Amazing\tSpider-Man \n #1 "), "Amazing Spider-Man #1");
    }

    #[test]
    fn test_clean_name() {
        assert_eq!(clean_name("name", "  Marvel  ").unwrap(), "Marvel");
        assert!(clean_name("name", "   ").is_err());
        assert!(clean_name("name", &"x".repeat(NAME_MAX_LEN + 1)).is_err());
    }

    #[test]
    fn test_clean_optional_text() {
        assert_eq!(clean_optional_text("bio", Some("  "), 10).unwrap(), None);
        assert_eq!(
            clean_optional_text("bio", Some(" Inker "), 10).unwrap(),
            Some("Inker".to_string())
        );
        assert!(clean_optional_text("bio", Some("far too long"), 5).is_err());
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(
            normalize_email(" Alan.Moore@Example.COM ").unwrap(),
            "alan.moore@example.com"
        );
        assert!(normalize_email("no-at-sign").is_err());
        assert!(normalize_email("a@b").is_err());
        assert!(normalize_email("a b@example.com").is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("short").is_err());
        assert!(validate_password("long enough").is_ok());
    }

    #[test]
    fn test_normalize_currency() {
        assert_eq!(normalize_currency("EUR").unwrap(), "eur");
        let err = normalize_currency("xyz").unwrap_err();
        assert_eq!(err.field, "currency");
    }

    #[test]
    fn test_validate_price() {
        assert!(validate_price(0).is_err());
        assert!(validate_price(-5).is_err());
        assert!(validate_price(1999).is_ok());
        assert!(validate_price(MAX_PRICE_MINOR + 1).is_err());
    }

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::new("name", "must not be empty");
        assert_eq!(err.to_string(), "name: must not be empty");
    }
}

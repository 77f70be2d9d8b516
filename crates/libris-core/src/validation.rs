use crate::error::ValidationError;

pub const MAX_NAME_LEN: usize = 64;
pub const MAX_TEXT_LEN: usize = 256;
pub const MAX_COMMENT_LEN: usize = 2000;
pub const MIN_PASSWORD_LEN: usize = 6;

/// Validator for caller-supplied input.
pub struct Validator;

impl Validator {
    /// Non-empty after trimming and at most `max` characters.
    pub fn validate_text(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
        if value.trim().is_empty() {
            return Err(ValidationError::Required(field));
        }
        let len = value.chars().count();
        if len > max {
            return Err(ValidationError::TooLong(field, len, max));
        }
        Ok(())
    }

    /// At most `max` characters; empty is fine.
    pub fn validate_optional_text(
        field: &'static str,
        value: &str,
        max: usize,
    ) -> Result<(), ValidationError> {
        let len = value.chars().count();
        if len > max {
            return Err(ValidationError::TooLong(field, len, max));
        }
        Ok(())
    }

    pub fn validate_username(username: &str) -> Result<(), ValidationError> {
        Self::validate_text("username", username, MAX_NAME_LEN)
    }

    /// Loose shape check: one `@` with something on both sides and a dot in
    /// the domain.
    pub fn validate_email(email: &str) -> Result<(), ValidationError> {
        Self::validate_text("email", email, MAX_TEXT_LEN)?;
        let valid = match email.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty()
                    && !domain.contains('@')
                    && domain.contains('.')
                    && !domain.starts_with('.')
                    && !domain.ends_with('.')
            }
            None => false,
        };
        if !valid {
            return Err(ValidationError::InvalidEmail(email.to_string()));
        }
        Ok(())
    }

    pub fn validate_password(password: &str) -> Result<(), ValidationError> {
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ValidationError::PasswordTooShort(MIN_PASSWORD_LEN));
        }
        Ok(())
    }

    pub fn validate_rating(rating: u8) -> Result<(), ValidationError> {
        if !(1..=5).contains(&rating) {
            return Err(ValidationError::RatingOutOfRange(rating));
        }
        Ok(())
    }

    pub fn validate_total_copies(total: u32) -> Result<(), ValidationError> {
        if total == 0 {
            return Err(ValidationError::NoCopies);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_text() {
        assert!(Validator::validate_text("title", "Dune", MAX_TEXT_LEN).is_ok());
        assert!(Validator::validate_text("title", &"a".repeat(256), MAX_TEXT_LEN).is_ok());
    }

    #[test]
    fn test_invalid_text() {
        assert_eq!(
            Validator::validate_text("title", "   ", MAX_TEXT_LEN),
            Err(ValidationError::Required("title"))
        );
        assert_eq!(
            Validator::validate_text("title", &"a".repeat(257), MAX_TEXT_LEN),
            Err(ValidationError::TooLong("title", 257, 256))
        );
    }

    #[test]
    fn test_optional_text() {
        assert!(Validator::validate_optional_text("comment", "", MAX_COMMENT_LEN).is_ok());
        assert!(Validator::validate_optional_text("comment", &"a".repeat(2001), MAX_COMMENT_LEN)
            .is_err());
    }

    #[test]
    fn test_valid_email() {
        assert!(Validator::validate_email("reader@library.org").is_ok());
        assert!(Validator::validate_email("a.b@c.d").is_ok());
    }

    #[test]
    fn test_invalid_email() {
        assert!(Validator::validate_email("").is_err());
        assert!(Validator::validate_email("no-at-sign").is_err());
        assert!(Validator::validate_email("@library.org").is_err());
        assert!(Validator::validate_email("a@b@c.org").is_err());
        assert!(Validator::validate_email("reader@localhost").is_err());
        assert!(Validator::validate_email("reader@.org").is_err());
    }

    #[test]
    fn test_password_length() {
        assert!(Validator::validate_password("123456").is_ok());
        assert_eq!(
            Validator::validate_password("12345"),
            Err(ValidationError::PasswordTooShort(6))
        );
    }

    #[test]
    fn test_rating_range() {
        for rating in 1..=5 {
            assert!(Validator::validate_rating(rating).is_ok());
        }
        assert!(Validator::validate_rating(0).is_err());
        assert!(Validator::validate_rating(6).is_err());
    }

    #[test]
    fn test_total_copies() {
        assert!(Validator::validate_total_copies(1).is_ok());
        assert!(Validator::validate_total_copies(0).is_err());
    }
}

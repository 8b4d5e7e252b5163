use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::AppError;

const MAX_TITLE_LENGTH: usize = 200;
const MIN_PASSWORD_LENGTH: usize = 6;

/// Field-level validation failures, keyed by field name.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationErrors {
    pub errors: BTreeMap<String, String>,
}

impl ValidationErrors {
    pub fn add(&mut self, field: &str, message: &str) {
        self.errors.insert(field.to_string(), message.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Ok(()) when clean, otherwise the structured Validation error.
    pub fn into_result(self) -> Result<(), AppError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(self))
        }
    }
}

pub fn validate_photo_title(title: &str) -> Result<(), AppError> {
    let mut errors = ValidationErrors::default();
    let title = title.trim();
    if title.is_empty() {
        errors.add("title", "Title is required");
    } else if title.len() > MAX_TITLE_LENGTH {
        errors.add("title", "Title is too long");
    }
    errors.into_result()
}

pub fn validate_signup(name: &str, email: &str, password: &str) -> Result<(), AppError> {
    let mut errors = ValidationErrors::default();
    if name.trim().is_empty() {
        errors.add("name", "Name is required");
    }
    if email.trim().is_empty() {
        errors.add("email", "Email is required");
    } else if !email.contains('@') {
        errors.add("email", "Email address is not valid");
    }
    if password.len() < MIN_PASSWORD_LENGTH {
        errors.add("password", "Password is too short");
    }
    errors.into_result()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_title_is_rejected() {
        assert!(validate_photo_title("").is_err());
        assert!(validate_photo_title("   ").is_err());
    }

    #[test]
    fn overlong_title_is_rejected() {
        let title = "x".repeat(MAX_TITLE_LENGTH + 1);
        assert!(validate_photo_title(&title).is_err());
    }

    #[test]
    fn reasonable_title_passes() {
        assert!(validate_photo_title("Sunset over the bay").is_ok());
    }

    #[test]
    fn signup_collects_all_field_errors() {
        let err = validate_signup("", "not-an-email", "abc").unwrap_err();
        match err {
            AppError::Validation(errors) => {
                assert!(errors.errors.contains_key("name"));
                assert!(errors.errors.contains_key("email"));
                assert!(errors.errors.contains_key("password"));
            }
            other => panic!("expected Validation, got {:?}", other),
        }
    }

    #[test]
    fn valid_signup_passes() {
        assert!(validate_signup("alice", "alice@example.com", "hunter22").is_ok());
    }
}

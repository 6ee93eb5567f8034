//! Input validation.
//!
//! A `Validator` is constructed from configuration and handed to each editor.
//! Every check here runs before the store is touched.

use crate::config::ValidationConfig;
use crate::{Error, Result, Version};

#[derive(Clone, Debug, Default)]
pub struct Validator {
    rules: ValidationConfig,
}

impl Validator {
    pub fn new(rules: ValidationConfig) -> Self {
        Self { rules }
    }

    pub fn expected_version(&self, version: Version) -> Result<()> {
        if version.is_unset() {
            return Err(Error::Validation("expected version is required".into()));
        }
        Ok(())
    }

    /// Required free-text field such as a routine or workout title
    pub fn title(&self, field: &str, value: &str) -> Result<()> {
        required(field, value)?;
        max_len(field, value, self.rules.title_max_len)
    }

    pub fn username(&self, value: &str) -> Result<()> {
        required("username", value)?;
        max_len("username", value, self.rules.username_max_len)?;
        if value.chars().any(char::is_whitespace) {
            return Err(Error::Validation(
                "username must not contain whitespace".into(),
            ));
        }
        Ok(())
    }

    pub fn email(&self, value: &str) -> Result<()> {
        required("email", value)?;
        max_len("email", value, self.rules.email_max_len)?;

        let valid = match value.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty()
                    && !domain.contains('@')
                    && domain.contains('.')
                    && !domain.starts_with('.')
                    && !domain.ends_with('.')
                    && !value.chars().any(char::is_whitespace)
            }
            None => false,
        };
        if !valid {
            return Err(Error::Validation(
                "email must be a valid email address".into(),
            ));
        }
        Ok(())
    }

    pub fn password(&self, value: &str) -> Result<()> {
        let len = value.len();
        if len < self.rules.password_min_len {
            return Err(Error::Validation(format!(
                "password must be at least {} characters long",
                self.rules.password_min_len
            )));
        }
        if len > self.rules.password_max_len {
            return Err(Error::Validation(format!(
                "password must be at most {} characters long",
                self.rules.password_max_len
            )));
        }
        Ok(())
    }

    /// Planned or performed load for a single set
    pub fn set_values(&self, weight: f64, reps: u32) -> Result<()> {
        if !weight.is_finite() || weight < 0.0 {
            return Err(Error::Validation(format!(
                "set weight must be a non-negative number, got {}",
                weight
            )));
        }
        if reps == 0 {
            return Err(Error::Validation("set reps must be at least 1".into()));
        }
        if reps > self.rules.reps_max {
            return Err(Error::Validation(format!(
                "set reps must be at most {}, got {}",
                self.rules.reps_max, reps
            )));
        }
        Ok(())
    }
}

fn required(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Validation(format!("{} is required", field)));
    }
    Ok(())
}

fn max_len(field: &str, value: &str, max: usize) -> Result<()> {
    if value.chars().count() > max {
        return Err(Error::Validation(format!(
            "{} must be at most {} characters long",
            field, max
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> Validator {
        Validator::new(ValidationConfig::default())
    }

    #[test]
    fn test_zero_expected_version_rejected() {
        let v = validator();
        assert!(matches!(
            v.expected_version(Version::new(0)),
            Err(Error::Validation(_))
        ));
        assert!(v.expected_version(Version::INITIAL).is_ok());
    }

    #[test]
    fn test_blank_title_rejected() {
        let v = validator();
        assert!(v.title("title", "   ").is_err());
        assert!(v.title("title", "Push day").is_ok());
        assert!(v.title("title", &"x".repeat(101)).is_err());
    }

    #[test]
    fn test_email_shapes() {
        let v = validator();
        assert!(v.email("lifter@example.com").is_ok());
        assert!(v.email("lifter@localhost").is_err());
        assert!(v.email("@example.com").is_err());
        assert!(v.email("a@b@example.com").is_err());
        assert!(v.email("no at sign").is_err());
    }

    #[test]
    fn test_password_bounds_follow_config() {
        let v = Validator::new(ValidationConfig {
            password_min_len: 10,
            ..ValidationConfig::default()
        });
        assert!(v.password("short").is_err());
        assert!(v.password("long enough!").is_ok());
        assert!(v.password(&"p".repeat(73)).is_err());
    }

    #[test]
    fn test_set_values() {
        let v = validator();
        assert!(v.set_values(0.0, 12).is_ok());
        assert!(v.set_values(-5.0, 5).is_err());
        assert!(v.set_values(f64::NAN, 5).is_err());
        assert!(v.set_values(100.0, 0).is_err());
        assert!(v.set_values(100.0, 1_000).is_ok());
        assert!(v.set_values(1.0, 3_000_000_000).is_err());
    }
}

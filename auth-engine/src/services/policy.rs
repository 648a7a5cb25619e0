//! Password strength policy.
//!
//! Count-based rules: minimum length, uppercase letters, digits and
//! non-letter characters (digits count as non-letters).

use crate::config::PasswordPolicyConfig;

/// A single rule the candidate password failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyViolation {
    TooShort { min: usize },
    TooFewUppercase { min: usize },
    TooFewNumbers { min: usize },
    TooFewNonLetters { min: usize },
}

impl std::fmt::Display for PolicyViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyViolation::TooShort { min } => {
                write!(f, "Password should be at least {} characters long", min)
            }
            PolicyViolation::TooFewUppercase { min } => {
                write!(f, "Password should have at least {} uppercase letters", min)
            }
            PolicyViolation::TooFewNumbers { min } => {
                write!(f, "Password should have at least {} digits", min)
            }
            PolicyViolation::TooFewNonLetters { min } => {
                write!(f, "Password should have at least {} special characters", min)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct PasswordPolicy {
    config: PasswordPolicyConfig,
}

impl PasswordPolicy {
    pub fn new(config: PasswordPolicyConfig) -> Self {
        Self { config }
    }

    /// Pass/fail check. On failure every violated rule is reported.
    pub fn check(&self, password: &str) -> Result<(), Vec<PolicyViolation>> {
        let cfg = &self.config;
        let mut violations = Vec::new();

        if password.chars().count() < cfg.min_length {
            violations.push(PolicyViolation::TooShort {
                min: cfg.min_length,
            });
        }

        let uppercase = password.chars().filter(|c| c.is_uppercase()).count();
        if uppercase < cfg.min_uppercase {
            violations.push(PolicyViolation::TooFewUppercase {
                min: cfg.min_uppercase,
            });
        }

        let numbers = password.chars().filter(|c| c.is_ascii_digit()).count();
        if numbers < cfg.min_numbers {
            violations.push(PolicyViolation::TooFewNumbers {
                min: cfg.min_numbers,
            });
        }

        let non_letters = password.chars().filter(|c| !c.is_alphabetic()).count();
        if non_letters < cfg.min_nonletters {
            violations.push(PolicyViolation::TooFewNonLetters {
                min: cfg.min_nonletters,
            });
        }

        if violations.is_empty() {
            Ok(())
        } else {
            tracing::warn!(violations = violations.len(), "Password policy check failed");
            Err(violations)
        }
    }
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self::new(PasswordPolicyConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strong_password_passes() {
        assert!(PasswordPolicy::default().check("P@ssw0rd!").is_ok());
    }

    #[test]
    fn test_all_violations_reported() {
        let violations = PasswordPolicy::default()
            .check("abc")
            .expect_err("weak password accepted");

        assert_eq!(
            violations,
            vec![
                PolicyViolation::TooShort { min: 8 },
                PolicyViolation::TooFewUppercase { min: 1 },
                PolicyViolation::TooFewNumbers { min: 1 },
                PolicyViolation::TooFewNonLetters { min: 1 },
            ]
        );
    }

    #[test]
    fn test_digit_counts_as_non_letter() {
        assert!(PasswordPolicy::default().check("Password1").is_ok());
    }

    #[test]
    fn test_custom_thresholds() {
        let policy = PasswordPolicy::new(PasswordPolicyConfig {
            min_length: 4,
            min_uppercase: 0,
            min_numbers: 2,
            min_nonletters: 0,
        });

        assert_eq!(
            policy.check("abc1"),
            Err(vec![PolicyViolation::TooFewNumbers { min: 2 }])
        );
        assert!(policy.check("ab12").is_ok());
    }
}

//! Password strength classifier used by the signup form.

use serde::{Serialize, Serializer};

/// Passwords shorter than this (in characters) are not classified at all.
pub const MIN_PASSWORD_LEN: usize = 5;

const SPECIAL_CHARS: &str = "!@#$%^&*(),.?\":{}|<>";

/// Shown when a submitted password is anything but [`PasswordStrength::Strong`].
pub const STRENGTH_REQUIREMENT: &str = "Password must contain at least one uppercase letter, one lowercase letter, one number, and one special character";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordStrength {
    /// Below the minimum length.
    Unclassified,
    Weak,
    Medium,
    Strong,
}

impl PasswordStrength {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unclassified => "",
            Self::Weak => "weak",
            Self::Medium => "medium",
            Self::Strong => "strong",
        }
    }
}

/// Serialized as its label; unclassified is the empty string.
impl Serialize for PasswordStrength {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Classify `password` by how many of the four character classes it uses
/// (uppercase, lowercase, digit, special).
#[must_use]
pub fn classify(password: &str) -> PasswordStrength {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return PasswordStrength::Unclassified;
    }

    let classes = [
        password.chars().any(|c| c.is_ascii_uppercase()),
        password.chars().any(|c| c.is_ascii_lowercase()),
        password.chars().any(|c| c.is_ascii_digit()),
        password.chars().any(|c| SPECIAL_CHARS.contains(c)),
    ];
    match classes.iter().filter(|present| **present).count() {
        4 => PasswordStrength::Strong,
        2 | 3 => PasswordStrength::Medium,
        _ => PasswordStrength::Weak,
    }
}

#[cfg(test)]
#[path = "password_test.rs"]
mod tests;

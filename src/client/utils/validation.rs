//! Form checks that run before any request is made.

pub const PASSWORD_SPECIALS: &str = "!@#$%^&*";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Passwords do not match")]
    PasswordMismatch,

    #[error("Password must be at least {0} characters long.")]
    TooShort(usize),

    #[error("Password is missing: {}", .0.join(", "))]
    WeakPassword(Vec<String>),

    #[error("Invalid reset link. Please request a new password reset.")]
    MissingResetToken,

    #[error("{0} is required")]
    Required(&'static str),

    #[error("Please type \"DELETE\" to confirm account deletion.")]
    DeleteNotConfirmed,
}

/// Unmet strength rules for a new password, in display order. Empty means
/// the password is acceptable.
pub fn password_problems(password: &str) -> Vec<String> {
    let mut problems = Vec::new();
    if password.chars().count() < 8 {
        problems.push("At least 8 characters".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        problems.push("One uppercase letter".to_string());
    }
    if !password.chars().any(|c| PASSWORD_SPECIALS.contains(c)) {
        problems.push(format!("One special character ({})", PASSWORD_SPECIALS));
    }
    problems
}

pub fn require(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required(field));
    }
    Ok(())
}

pub fn confirm_matches(password: &str, confirm: &str) -> Result<(), ValidationError> {
    if password != confirm {
        return Err(ValidationError::PasswordMismatch);
    }
    Ok(())
}

pub fn confirm_deletion(typed: &str) -> Result<(), ValidationError> {
    if typed != "DELETE" {
        return Err(ValidationError::DeleteNotConfirmed);
    }
    Ok(())
}

pub fn check_reset_password(token: &str, password: &str, confirm: &str) -> Result<(), ValidationError> {
    if token.trim().is_empty() {
        return Err(ValidationError::MissingResetToken);
    }
    confirm_matches(password, confirm)?;
    if password.chars().count() < 6 {
        return Err(ValidationError::TooShort(6));
    }
    Ok(())
}

pub fn check_new_password(password: &str, confirm: &str) -> Result<(), ValidationError> {
    confirm_matches(password, confirm)?;
    let problems = password_problems(password);
    if !problems.is_empty() {
        return Err(ValidationError::WeakPassword(problems));
    }
    Ok(())
}

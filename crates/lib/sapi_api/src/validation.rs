//! Request validation.

use crate::error::{AppError, AppResult};
use crate::models::{PasswordRequest, ProfileUpdateRequest, SignUpRequest, TodoRequest};

const MAX_TITLE_CHARS: usize = 200;

fn invalid(field: &str, rule: &str) -> AppError {
    AppError::Validation(format!("Invalid input: {field} {rule}"))
}

fn check_len(field: &str, value: &str, min: usize, max: usize) -> AppResult<()> {
    let n = value.chars().count();
    if n < min || n > max {
        return Err(invalid(field, &format!("must be {min} to {max} characters")));
    }
    Ok(())
}

/// 2 to 60 ASCII letters.
pub fn login(value: &str) -> AppResult<()> {
    check_len("login", value, 2, 60)?;
    if !value.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(invalid("login", "must contain letters only"));
    }
    Ok(())
}

/// 1 to 60 letters or digits.
pub fn username(value: &str) -> AppResult<()> {
    check_len("username", value, 1, 60)?;
    if !value.chars().all(char::is_alphanumeric) {
        return Err(invalid("username", "must contain letters and digits only"));
    }
    Ok(())
}

/// 6 to 60 letters or digits.
pub fn password(value: &str) -> AppResult<()> {
    check_len("password", value, 6, 60)?;
    if !value.chars().all(char::is_alphanumeric) {
        return Err(invalid("password", "must contain letters and digits only"));
    }
    Ok(())
}

pub fn email(value: &str) -> AppResult<()> {
    let well_formed = value.split_once('@').is_some_and(|(local, domain)| {
        !local.is_empty()
            && !domain.contains('@')
            && !value.chars().any(char::is_whitespace)
            && domain.contains('.')
            && domain.split('.').all(|label| !label.is_empty())
    });
    if !well_formed {
        return Err(invalid("email", "must be a valid address"));
    }
    Ok(())
}

/// E.164: `+` followed by 1 to 15 digits, the first non-zero.
pub fn phone_number(value: &str) -> AppResult<()> {
    let ok = value.strip_prefix('+').is_some_and(|digits| {
        (1..=15).contains(&digits.len())
            && digits.chars().all(|c| c.is_ascii_digit())
            && !digits.starts_with('0')
    });
    if !ok {
        return Err(invalid("phoneNumber", "must be in E.164 format"));
    }
    Ok(())
}

pub fn todo_title(value: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(invalid("title", "must not be empty"));
    }
    check_len("title", value, 1, MAX_TITLE_CHARS)
}

impl SignUpRequest {
    pub fn validate(&self) -> AppResult<()> {
        login(&self.login)?;
        username(&self.username)?;
        password(&self.password)?;
        email(&self.email)?;
        if let Some(phone) = &self.phone_number {
            phone_number(phone)?;
        }
        Ok(())
    }
}

impl ProfileUpdateRequest {
    /// Check present fields; at least one must be present.
    pub fn validate(&self) -> AppResult<()> {
        if self.username.is_none() && self.email.is_none() && self.phone_number.is_none() {
            return Err(AppError::Validation("Invalid input: nothing to update".into()));
        }
        if let Some(v) = &self.username {
            username(v)?;
        }
        if let Some(v) = &self.email {
            email(v)?;
        }
        if let Some(v) = &self.phone_number {
            phone_number(v)?;
        }
        Ok(())
    }
}

impl PasswordRequest {
    pub fn validate(&self) -> AppResult<()> {
        password(&self.password)
    }
}

impl TodoRequest {
    /// Creation needs a title.
    pub fn validate_new(&self) -> AppResult<()> {
        match &self.title {
            Some(title) => todo_title(title),
            None => Err(invalid("title", "is required")),
        }
    }

    /// Updates need at least one field.
    pub fn validate_update(&self) -> AppResult<()> {
        if self.title.is_none() && self.is_done.is_none() {
            return Err(AppError::Validation("Invalid input: nothing to update".into()));
        }
        if let Some(title) = &self.title {
            todo_title(title)?;
        }
        Ok(())
    }
}

//! 注册与登录输入的规范化和字段级校验。
//!
//! 用户名与邮箱先去空白并转小写，唯一性因此不区分大小写；密码只去空白。

use serde::Serialize;

use crate::config::{MIN_EMAIL_LEN, MIN_PASSWORD_LEN, MIN_USERNAME_LEN};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Clone, PartialEq, Eq)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

pub fn normalize_identifier(value: &str) -> String {
    value.trim().to_lowercase()
}

pub fn validate_registration(
    username: &str,
    email: &str,
    password: &str,
) -> Result<Registration, Vec<FieldError>> {
    let username = normalize_identifier(username);
    let email = normalize_identifier(email);
    let password = password.trim().to_string();

    let mut errors = Vec::new();
    check_min_len(&mut errors, "username", &username, MIN_USERNAME_LEN);
    check_email(&mut errors, &email);
    check_min_len(&mut errors, "password", &password, MIN_PASSWORD_LEN);

    if errors.is_empty() {
        Ok(Registration {
            username,
            email,
            password,
        })
    } else {
        Err(errors)
    }
}

pub fn validate_login(email: &str, password: &str) -> Result<LoginInput, Vec<FieldError>> {
    let email = normalize_identifier(email);
    let password = password.trim().to_string();

    let mut errors = Vec::new();
    check_email(&mut errors, &email);
    check_min_len(&mut errors, "password", &password, MIN_PASSWORD_LEN);

    if errors.is_empty() {
        Ok(LoginInput { email, password })
    } else {
        Err(errors)
    }
}

fn check_min_len(errors: &mut Vec<FieldError>, field: &'static str, value: &str, min: usize) {
    if value.is_empty() {
        errors.push(FieldError::new(field, format!("{field} is required")));
    } else if value.chars().count() < min {
        errors.push(FieldError::new(
            field,
            format!("{field} must be at least {min} characters long"),
        ));
    }
}

fn check_email(errors: &mut Vec<FieldError>, email: &str) {
    let before = errors.len();
    check_min_len(errors, "email", email, MIN_EMAIL_LEN);
    if errors.len() == before && !is_email(email) {
        errors.push(FieldError::new("email", "email must be a valid address"));
    }
}

fn is_email(value: &str) -> bool {
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2 && labels.iter().all(|label| !label.is_empty())
}

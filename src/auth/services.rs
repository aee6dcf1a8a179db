use lazy_static::lazy_static;
use regex::Regex;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::warn;

use crate::{
    auth::{dto::SignupForm, password::validate_password, repo},
    config::LockoutConfig,
    web::FormErrors,
};

pub const LOGIN_REDIRECT_URL: &str = "/chat/";

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    email.len() <= 254 && EMAIL_RE.is_match(email)
}

pub(crate) fn is_valid_username(username: &str) -> bool {
    lazy_static! {
        static ref USERNAME_RE: Regex = Regex::new(r"^[\w.@+-]{1,150}$").unwrap();
    }
    USERNAME_RE.is_match(username)
}

pub(crate) fn is_valid_phone(phone: &str) -> bool {
    phone.chars().count() <= 20
}

/// Checks that need no database; uniqueness is checked by the handler afterwards.
pub fn validate_signup(form: &SignupForm) -> FormErrors {
    let mut errors = FormErrors::default();

    if form.username.is_empty() {
        errors.add("username", "This field is required.");
    } else if !is_valid_username(&form.username) {
        errors.add(
            "username",
            "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
        );
    }
    for (field, value) in [("first_name", &form.first_name), ("last_name", &form.last_name)] {
        if value.is_empty() {
            errors.add(field, "This field is required.");
        } else if value.chars().count() > 150 {
            errors.add(field, "Ensure this value has at most 150 characters.");
        }
    }
    if form.email.is_empty() {
        errors.add("email", "This field is required.");
    } else if !is_valid_email(&form.email) {
        errors.add("email", "Enter a valid email address.");
    }
    if !is_valid_phone(&form.phone) {
        errors.add("phone", "Ensure this value has at most 20 characters.");
    }

    if form.password1.is_empty() {
        errors.add("password1", "This field is required.");
    }
    if form.password1 != form.password2 {
        errors.add("password2", "The two password fields didn't match.");
    } else if !form.password1.is_empty() {
        let attributes = [
            form.username.as_str(),
            form.email.as_str(),
            form.first_name.as_str(),
            form.last_name.as_str(),
        ];
        for problem in validate_password(&form.password1, &attributes) {
            errors.add("password2", problem);
        }
    }
    errors
}

/// Only same-site relative paths are followed after login.
pub fn safe_next(next: Option<&str>) -> String {
    match next.map(str::trim) {
        Some(n) if n.starts_with('/') && !n.starts_with("//") && !n.contains('\\') => n.to_string(),
        _ => LOGIN_REDIRECT_URL.to_string(),
    }
}

/// True when `username` has reached the failure limit inside the cool-off window.
pub async fn is_locked_out(
    db: &sqlx::PgPool,
    cfg: &LockoutConfig,
    username: &str,
) -> anyhow::Result<bool> {
    if !cfg.enabled || username.is_empty() {
        return Ok(false);
    }
    let since = OffsetDateTime::now_utc() - TimeDuration::minutes(cfg.cooloff_minutes);
    let failures = repo::failures_since(db, username, since).await?;
    if failures >= cfg.failure_limit {
        warn!(username = %username, failures, "login locked out");
        return Ok(true);
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_form() -> SignupForm {
        SignupForm {
            username: "sean".into(),
            first_name: "Sean".into(),
            last_name: "Lee".into(),
            email: "sean@csuchico.edu".into(),
            phone: "".into(),
            password1: "river-lantern-42".into(),
            password2: "river-lantern-42".into(),
        }
    }

    #[test]
    fn clean_signup_has_no_errors() {
        assert!(validate_signup(&valid_form()).is_empty());
    }

    #[test]
    fn signup_reports_each_bad_field() {
        let form = SignupForm {
            username: "bad name!".into(),
            first_name: "".into(),
            email: "not-an-email".into(),
            phone: "1".repeat(21),
            password2: "different".into(),
            ..valid_form()
        };
        let errors = validate_signup(&form);
        for field in ["username", "first_name", "email", "phone", "password2"] {
            assert!(errors.has(field), "{field} should be flagged");
        }
        assert!(!errors.has("last_name"));
    }

    #[test]
    fn signup_applies_password_policy() {
        let form = SignupForm { password1: "12345".into(), password2: "12345".into(), ..valid_form() };
        let errors = validate_signup(&form);
        assert!(errors.get("password2").iter().any(|e| e.contains("too short")));
    }

    #[test]
    fn normalize_trims_text_fields() {
        let form = SignupForm { username: "  sean ".into(), email: " a@b.co ".into(), ..valid_form() }
            .normalize();
        assert_eq!(form.username, "sean");
        assert_eq!(form.email, "a@b.co");
    }

    #[test]
    fn next_must_be_a_local_path() {
        assert_eq!(safe_next(Some("/mood/")), "/mood/");
        assert_eq!(safe_next(Some("//evil.example")), LOGIN_REDIRECT_URL);
        assert_eq!(safe_next(Some("https://evil.example")), LOGIN_REDIRECT_URL);
        assert_eq!(safe_next(Some("/\\evil")), LOGIN_REDIRECT_URL);
        assert_eq!(safe_next(None), LOGIN_REDIRECT_URL);
    }

    #[test]
    fn email_shape() {
        assert!(is_valid_email("t@test.local"));
        assert!(!is_valid_email("t@local"));
        assert!(!is_valid_email("has space@x.io"));
    }
}

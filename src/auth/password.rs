use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use tracing::error;

pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

pub fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        anyhow::anyhow!(e.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

const MIN_LENGTH: usize = 8;

const COMMON_PASSWORDS: &[&str] = &[
    "password", "password1", "password123", "12345678", "123456789", "1234567890",
    "qwerty123", "qwertyuiop", "iloveyou", "11111111", "00000000", "abc12345",
    "letmein1", "welcome1", "football", "baseball", "sunshine", "princess",
    "passw0rd", "trustno1", "superman", "starwars", "whatever", "changeme",
];

/// Password rules applied at signup and password change.
///
/// `attributes` are the user's own details (username, email, names); a password
/// that contains one of them, or is contained in one, is refused.
pub fn validate_password(plain: &str, attributes: &[&str]) -> Vec<String> {
    let mut errors = Vec::new();
    if plain.chars().count() < MIN_LENGTH {
        errors.push(format!(
            "This password is too short. It must contain at least {MIN_LENGTH} characters."
        ));
    }
    let lowered = plain.to_lowercase();
    if COMMON_PASSWORDS.contains(&lowered.as_str()) {
        errors.push("This password is too common.".to_string());
    }
    if !plain.is_empty() && plain.chars().all(|c| c.is_ascii_digit()) {
        errors.push("This password is entirely numeric.".to_string());
    }
    let similar = attributes.iter().any(|attr| {
        let attr = attr.trim().to_lowercase();
        let attr = attr.split('@').next().unwrap_or_default();
        attr.len() >= 3 && (lowered.contains(attr) || attr.contains(lowered.as_str()))
    });
    if similar {
        errors.push("The password is too similar to your personal information.".to_string());
    }
    errors
}

use serde::{Deserialize, Serialize};

/// Signup form. Passwords are never echoed back into the page.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SignupForm {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    #[serde(skip_serializing)]
    pub password1: String,
    #[serde(skip_serializing)]
    pub password2: String,
}

impl SignupForm {
    /// Trims every free-text field in place.
    pub fn normalize(mut self) -> Self {
        for field in [
            &mut self.username,
            &mut self.first_name,
            &mut self.last_name,
            &mut self.email,
            &mut self.phone,
        ] {
            *field = field.trim().to_string();
        }
        self
    }
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoginForm {
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub next: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct NextQuery {
    pub next: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct PasswordChangeForm {
    pub old_password: String,
    pub new_password1: String,
    pub new_password2: String,
}

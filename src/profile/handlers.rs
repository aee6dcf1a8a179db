use axum::{
    extract::{Query, State},
    http::header::SET_COOKIE,
    response::{AppendHeaders, IntoResponse, Redirect, Response},
    routing::get,
    Form, Router,
};
use minijinja::context;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        jwt::AuthUser,
        repo_types::{Profile, User},
        services::{is_valid_email, is_valid_phone},
    },
    error::AppError,
    state::AppState,
    web::{
        cookies::{clear_cookie, SESSION_COOKIE},
        flash, Flash, FormErrors, Viewer,
    },
};

pub fn routes() -> Router<AppState> {
    Router::new().route("/profile/", get(view_profile).post(update_profile))
}

#[derive(Debug, Default, Deserialize)]
pub struct ProfileQuery {
    pub edit: Option<String>,
}

/// Editable contact details: email lives on the user, phone on the profile.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProfileForm {
    pub email: String,
    pub phone: String,
}

impl ProfileForm {
    fn from_records(user: &User, profile: &Profile) -> Self {
        Self { email: user.email.clone(), phone: profile.phone.clone() }
    }

    fn normalize(self) -> Self {
        Self { email: self.email.trim().to_string(), phone: self.phone.trim().to_string() }
    }
}

/// Format checks only; uniqueness needs the database.
fn validate_contact(form: &ProfileForm) -> FormErrors {
    let mut errors = FormErrors::default();
    if form.email.is_empty() {
        errors.add("email", "This field is required.");
    } else if !is_valid_email(&form.email) {
        errors.add("email", "Enter a valid email address.");
    }
    if !is_valid_phone(&form.phone) {
        errors.add("phone", "Ensure this value has at most 20 characters.");
    }
    errors
}

fn session_gone(state: &AppState) -> Response {
    let cookie = clear_cookie(SESSION_COOKIE, state.secure_cookies());
    (AppendHeaders([(SET_COOKIE, cookie)]), Redirect::to("/login/")).into_response()
}

#[instrument(skip_all, fields(user_id = %auth.user_id))]
pub async fn view_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    viewer: Viewer,
    Query(q): Query<ProfileQuery>,
) -> Result<Response, AppError> {
    let Some(account) = User::find_by_id(&state.db, auth.user_id).await? else {
        warn!("session refers to a deleted user");
        return Ok(session_gone(&state));
    };
    let profile = Profile::get_or_create(&state.db, &account).await?;
    let form = ProfileForm::from_records(&account, &profile);

    viewer.render(
        &state,
        "profile.html",
        context! {
            editing => q.edit.as_deref() == Some("1"),
            account => account,
            profile => profile,
            form => form,
            errors => FormErrors::default(),
        },
    )
}

#[instrument(skip_all, fields(user_id = %auth.user_id))]
pub async fn update_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    viewer: Viewer,
    Form(form): Form<ProfileForm>,
) -> Result<Response, AppError> {
    let form = form.normalize();
    let Some(account) = User::find_by_id(&state.db, auth.user_id).await? else {
        warn!("session refers to a deleted user");
        return Ok(session_gone(&state));
    };

    let mut errors = validate_contact(&form);
    if errors.is_empty() && User::email_taken(&state.db, &form.email, Some(account.id)).await? {
        errors.add("email", "An account with this email already exists.");
    }
    if !errors.is_empty() {
        let profile = Profile::get_or_create(&state.db, &account).await?;
        return viewer.render(
            &state,
            "profile.html",
            context! {
                editing => true,
                account => account,
                profile => profile,
                form => form,
                errors => errors,
            },
        );
    }

    User::update_contact(&state.db, account.id, &form.email, &form.phone).await?;
    info!("profile updated");
    Ok(flash::redirect_with("/profile/", &[Flash::success("Profile updated.")], state.secure_cookies()))
}

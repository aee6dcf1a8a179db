use axum::{
    extract::{FromRef, Query, State},
    http::{header::SET_COOKIE, StatusCode},
    response::{AppendHeaders, IntoResponse, Redirect, Response},
    routing::get,
    Form, Router,
};
use minijinja::context;
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        dto::{LoginForm, NextQuery, PasswordChangeForm, SignupForm},
        jwt::{AuthUser, SessionKeys},
        password::{hash_password, validate_password, verify_password},
        repo::{self, NewUser},
        repo_types::{LoginEventKind, NewLoginEvent, User},
        services::{is_locked_out, safe_next, validate_signup},
    },
    error::AppError,
    state::AppState,
    web::{
        cookies::{clear_cookie, set_cookie, SESSION_COOKIE},
        flash, ClientMeta, Flash, FormErrors, Viewer,
    },
};

const BAD_LOGIN: &str =
    "Please enter a correct username and password. Note that both fields may be case-sensitive.";
const LOCKED_OUT: &str = "Account locked: too many login attempts. Please try again later.";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/signup/", get(signup_page).post(signup))
        .route("/login/", get(login_page).post(login))
        .route("/logout/", get(logout).post(logout))
        .route("/password_change/", get(password_change_page).post(password_change))
        .route("/password_change/done/", get(password_change_done))
}

// --- signup ---

pub async fn signup_page(State(state): State<AppState>, viewer: Viewer) -> Result<Response, AppError> {
    viewer.render(
        &state,
        "signup.html",
        context! { form => SignupForm::default(), errors => FormErrors::default() },
    )
}

#[instrument(skip_all, fields(username = %form.username))]
pub async fn signup(
    State(state): State<AppState>,
    client: ClientMeta,
    viewer: Viewer,
    Form(form): Form<SignupForm>,
) -> Result<Response, AppError> {
    let form = form.normalize();
    let mut errors = validate_signup(&form);

    if errors.is_empty() {
        if User::username_taken(&state.db, &form.username).await? {
            errors.add("username", "A user with that username already exists.");
        }
        if User::email_taken(&state.db, &form.email, None).await? {
            errors.add("email", "An account with this email already exists.");
        }
    }
    if !errors.is_empty() {
        warn!(fields = ?errors, "signup rejected");
        return viewer.render(&state, "signup.html", context! { form => form, errors => errors });
    }

    let hash = hash_password(&form.password1)?;
    let user = User::create_with_profile(
        &state.db,
        NewUser {
            username: &form.username,
            email: &form.email,
            first_name: &form.first_name,
            last_name: &form.last_name,
            password_hash: &hash,
            phone: &form.phone,
        },
        NewLoginEvent::new(LoginEventKind::Signup, None, &client),
    )
    .await?;

    info!(user_id = %user.id, "user registered");
    Ok(flash::redirect_with(
        "/login/",
        &[Flash::success("Account created. Please sign in to continue.")],
        state.secure_cookies(),
    ))
}

// --- login / logout ---

pub async fn login_page(
    State(state): State<AppState>,
    Query(q): Query<NextQuery>,
    viewer: Viewer,
) -> Result<Response, AppError> {
    let form = LoginForm { next: q.next.unwrap_or_default(), ..Default::default() };
    viewer.render(&state, "login.html", context! { form => form, errors => FormErrors::default() })
}

fn login_failed(state: &AppState, viewer: Viewer, form: &LoginForm, message: &str) -> Result<Response, AppError> {
    let mut errors = FormErrors::default();
    errors.add(FormErrors::NON_FIELD, message);
    viewer.render(state, "login.html", context! { form => form, errors => errors })
}

#[instrument(skip_all, fields(username = %form.username))]
pub async fn login(
    State(state): State<AppState>,
    client: ClientMeta,
    viewer: Viewer,
    Form(mut form): Form<LoginForm>,
) -> Result<Response, AppError> {
    form.username = form.username.trim().to_string();

    if is_locked_out(&state.db, &state.config.lockout, &form.username).await? {
        let page = login_failed(&state, viewer, &form, LOCKED_OUT)?;
        return Ok((StatusCode::FORBIDDEN, page).into_response());
    }

    let user = match User::find_by_username(&state.db, &form.username).await? {
        Some(u) => match verify_password(&form.password, &u.password_hash) {
            Ok(true) => Some(u),
            Ok(false) => None,
            Err(e) => {
                error!(error = %e, user_id = %u.id, "stored password hash unreadable");
                None
            }
        },
        None => None,
    };

    let Some(user) = user else {
        warn!("login failed");
        let event = NewLoginEvent::new(LoginEventKind::LoginFailure, None, &client).tried(&form.username);
        repo::record_event(&state.db, &event).await?;
        return login_failed(&state, viewer, &form, BAD_LOGIN);
    };

    let keys = SessionKeys::from_ref(&state);
    let (token, session_id) = keys.sign(user.id, &user.username)?;
    User::touch_last_login(&state.db, user.id).await?;
    let event = NewLoginEvent::new(LoginEventKind::LoginSuccess, Some(user.id), &client).tried(&user.username);
    repo::record_event(&state.db, &event).await?;

    info!(user_id = %user.id, %session_id, "user logged in");
    let cookie = set_cookie(SESSION_COOKIE, &token, keys.ttl_secs(), state.secure_cookies());
    let target = safe_next(Some(form.next.as_str()));
    Ok((AppendHeaders([(SET_COOKIE, cookie)]), Redirect::to(&target)).into_response())
}

#[instrument(skip_all)]
pub async fn logout(
    State(state): State<AppState>,
    user: Option<AuthUser>,
    client: ClientMeta,
) -> Response {
    if let Some(user) = user {
        let event = NewLoginEvent::new(LoginEventKind::Logout, Some(user.user_id), &client).tried(&user.username);
        match repo::record_event(&state.db, &event).await {
            Ok(()) => info!(user_id = %user.user_id, "user logged out"),
            Err(e) => error!(error = %e, user_id = %user.user_id, "failed to record logout"),
        }
    }
    let cookie = clear_cookie(SESSION_COOKIE, state.secure_cookies());
    (AppendHeaders([(SET_COOKIE, cookie)]), Redirect::to("/")).into_response()
}

// --- password change ---

pub async fn password_change_page(
    State(state): State<AppState>,
    _user: AuthUser,
    viewer: Viewer,
) -> Result<Response, AppError> {
    viewer.render(&state, "password_change.html", context! { errors => FormErrors::default() })
}

fn validate_password_change(form: &PasswordChangeForm, user: &User) -> FormErrors {
    let mut errors = FormErrors::default();
    match verify_password(&form.old_password, &user.password_hash) {
        Ok(true) => {}
        _ => errors.add(
            "old_password",
            "Your old password was entered incorrectly. Please enter it again.",
        ),
    }
    if form.new_password1.is_empty() {
        errors.add("new_password1", "This field is required.");
    } else if form.new_password1 != form.new_password2 {
        errors.add("new_password2", "The two password fields didn't match.");
    } else {
        let attributes = [
            user.username.as_str(),
            user.email.as_str(),
            user.first_name.as_str(),
            user.last_name.as_str(),
        ];
        for problem in validate_password(&form.new_password1, &attributes) {
            errors.add("new_password2", problem);
        }
    }
    errors
}

#[instrument(skip_all, fields(user_id = %auth.user_id))]
pub async fn password_change(
    State(state): State<AppState>,
    auth: AuthUser,
    viewer: Viewer,
    Form(form): Form<PasswordChangeForm>,
) -> Result<Response, AppError> {
    let Some(user) = User::find_by_id(&state.db, auth.user_id).await? else {
        warn!("session refers to a deleted user");
        return Ok(logout_redirect(&state));
    };

    let errors = validate_password_change(&form, &user);
    if !errors.is_empty() {
        return viewer.render(&state, "password_change.html", context! { errors => errors });
    }

    let hash = hash_password(&form.new_password1)?;
    User::set_password_hash(&state.db, user.id, &hash).await?;
    info!("password changed");
    Ok(Redirect::to("/password_change/done/").into_response())
}

pub async fn password_change_done(
    State(state): State<AppState>,
    _user: AuthUser,
    viewer: Viewer,
) -> Result<Response, AppError> {
    viewer.render(&state, "password_change_done.html", context! {})
}

fn logout_redirect(state: &AppState) -> Response {
    let cookie = clear_cookie(SESSION_COOKIE, state.secure_cookies());
    (AppendHeaders([(SET_COOKIE, cookie)]), Redirect::to("/login/")).into_response()
}

use std::convert::Infallible;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::SET_COOKIE, request::Parts},
    response::{Html, IntoResponse, Response},
};
use minijinja::{context, Value};
use serde::Serialize;

use super::{
    cookies::{clear_cookie, get_cookie, FLASH_COOKIE},
    flash::{self, Flash},
};
use crate::{auth::jwt::AuthUser, error::AppError, state::AppState};

/// Everything a page render needs about the requester: who they are and
/// which flash messages are waiting for them.
pub struct Viewer {
    pub user: Option<AuthUser>,
    pending: Vec<Flash>,
    added: Vec<Flash>,
    path: String,
}

#[derive(Serialize)]
struct NavUser<'a> {
    username: &'a str,
    is_authenticated: bool,
}

#[async_trait]
impl FromRequestParts<AppState> for Viewer {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await.ok();
        let pending = get_cookie(&parts.headers, FLASH_COOKIE)
            .map(|raw| flash::decode(&raw))
            .unwrap_or_default();
        Ok(Self {
            user,
            pending,
            added: Vec::new(),
            path: parts.uri.path().to_string(),
        })
    }
}

impl Viewer {
    pub fn flash(&mut self, message: Flash) {
        self.added.push(message);
    }

    /// Renders `template` with `ctx` plus the shared page chrome, consuming
    /// any pending flash cookie.
    pub fn render(self, state: &AppState, template: &str, ctx: Value) -> Result<Response, AppError> {
        let messages: Vec<&Flash> = self.pending.iter().chain(self.added.iter()).collect();
        let user = self.user.as_ref().map(|u| NavUser { username: &u.username, is_authenticated: true });
        let body = state.templates.render(
            template,
            context! {
                user => user,
                messages => messages,
                request_path => self.path,
                ..ctx
            },
        )?;

        let mut res = Html(body).into_response();
        if !self.pending.is_empty() {
            res.headers_mut()
                .append(SET_COOKIE, clear_cookie(FLASH_COOKIE, state.secure_cookies()));
        }
        Ok(res)
    }
}

// Session endpoints
//
// Login stores the bearer token (and whatever profile came with it) in the
// transport's token store. Logout is local first: the server call is a
// courtesy and its failure never keeps a token alive.

use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tracing::{debug, warn};

use crate::endpoints::client::ApiClient;
use crate::error::Error;
use crate::models::{LoginResponse, UserProfile};
use crate::orchestrator::{RequestOptions, TimeoutTier};
use crate::token::StoredSession;
use crate::transport::ApiRequest;

impl ApiClient {
    /// Exchange credentials for a bearer token.
    ///
    /// `POST /auth/login`. If the response carries no profile, one is
    /// fetched from `/auth/me`; a failure there does not fail the login.
    pub async fn login(
        &self,
        username: &str,
        password: &SecretString,
    ) -> Result<Option<UserProfile>, Error> {
        debug!(username, "logging in");
        let request = ApiRequest::post("auth/login").json(json!({
            "username": username,
            "password": password.expose_secret(),
        }));
        let options = self.mutation_options().without_session_guard();
        let resp: LoginResponse = self.fetch(request, options).await?;

        let token = SecretString::from(resp.access_token);
        self.transport()
            .set_session(StoredSession::new(token, resp.user.clone()));

        if resp.user.is_some() {
            return Ok(resp.user);
        }

        match self.current_user().await {
            Ok(user) => Ok(Some(user)),
            Err(e) => {
                warn!(error = %e, "logged in, but the profile could not be loaded");
                Ok(None)
            }
        }
    }

    /// Drop the session locally and tell the server, best-effort.
    ///
    /// `POST /auth/logout`
    pub async fn logout(&self) {
        if self.transport().is_authenticated() {
            let request = ApiRequest::post("auth/logout").expect_any();
            let options = RequestOptions::new(self.timeouts().timeout(TimeoutTier::Quick));
            if let Err(e) = self.call(request, options).await {
                debug!(error = %e, "server-side logout failed, clearing local session anyway");
            }
        }
        self.transport().clear_session();
    }

    /// Profile of the logged-in user. Refreshes the cached copy.
    ///
    /// `GET /auth/me`
    pub async fn current_user(&self) -> Result<UserProfile, Error> {
        let options = self.read_options(TimeoutTier::Quick).dedup("auth-me");
        let user: UserProfile = self.fetch(ApiRequest::get("auth/me"), options).await?;

        if let Some(token) = self.transport().token() {
            self.transport()
                .set_session(StoredSession::new(token, Some(user.clone())));
        }
        Ok(user)
    }
}

//! Login relay.
//!
//! The hall doesn't authenticate anyone itself. A `login` request is
//! forwarded to the user service and the raw reply goes straight back to
//! the client. Only then does the hall look inside the reply: on success
//! it attaches the token to the connection and, in the background, fetches
//! the user's profile to publish a welcome announcement.
//!
//! ```text
//! client ──login──► LoginRelay ──User.login──► user service
//!        ◄─verbatim reply──┘
//!                   ├─ registry.set_token
//!                   └─ spawn: User.getUserInfo ─► publish "user … has logged in"
//! ```

use std::sync::Arc;

use hall_protocol::{
    Codec, JsonCodec, LoginCredentials, Message, ReplyEnvelope, UserInfoRequest, UserProfile,
};
use hall_session::SessionRegistry;
use rand::Rng;
use rand::distr::Alphanumeric;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::context::{RequestContext, log_reply_error};
use crate::services::{AnnouncementSource, SecretKeyDeriver, UserService};
use crate::{HallError, UpstreamError};

/// Module name of the user service.
pub const USER_MODULE: &str = "User";
/// User service route that authenticates a client.
pub const USER_LOGIN_ROUTE: &str = "login";
/// User service route that returns a profile.
pub const USER_GET_INFO_ROUTE: &str = "getUserInfo";
/// Publisher name on welcome announcements.
pub const WELCOME_SOURCE: &str = "service";

const CORRELATION_ID_LEN: usize = 8;

/// A fresh 8-character alphanumeric correlation id.
pub fn correlation_id() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(CORRELATION_ID_LEN)
        .map(char::from)
        .collect()
}

/// Text of the announcement published after a login.
pub fn welcome_text(name: &str) -> String {
    format!("user {name} has logged in")
}

/// How a login request ended, from the hall's point of view.
///
/// The client has already received its reply in every case.
#[derive(Debug)]
pub enum LoginOutcome {
    /// The user service couldn't be reached; the client got a 500.
    Unreachable,
    /// The reply was relayed but wasn't a decodable envelope or
    /// credentials payload.
    Malformed,
    /// The user service refused the login.
    Rejected { code: u32 },
    /// The token is now attached to the connection; `enrichment` is the
    /// background profile fetch and welcome publication.
    Accepted {
        credentials: LoginCredentials,
        enrichment: JoinHandle<()>,
    },
}

/// Forwards logins to the user service.
pub struct LoginRelay<U, S> {
    users: Arc<U>,
    announcements: Arc<S>,
    registry: Arc<SessionRegistry>,
    secret: Arc<dyn SecretKeyDeriver>,
    codec: JsonCodec,
}

impl<U, S> Clone for LoginRelay<U, S> {
    fn clone(&self) -> Self {
        Self {
            users: Arc::clone(&self.users),
            announcements: Arc::clone(&self.announcements),
            registry: Arc::clone(&self.registry),
            secret: Arc::clone(&self.secret),
            codec: self.codec,
        }
    }
}

impl<U: UserService, S: AnnouncementSource> LoginRelay<U, S> {
    pub fn new(
        users: Arc<U>,
        announcements: Arc<S>,
        registry: Arc<SessionRegistry>,
        secret: Arc<dyn SecretKeyDeriver>,
    ) -> Self {
        Self {
            users,
            announcements,
            registry,
            secret,
            codec: JsonCodec,
        }
    }

    /// Handles one `login` request.
    ///
    /// The client is answered before anything else happens to the reply,
    /// so a reply the hall can't make sense of still reaches the client
    /// unchanged.
    pub async fn handle(&self, ctx: &mut RequestContext) -> LoginOutcome {
        let connection_id = ctx.connection_id().clone();
        let request = Message::new(
            USER_MODULE,
            USER_LOGIN_ROUTE,
            ctx.data().to_vec(),
            correlation_id(),
        );

        let reply = match self.users.request_sync(request).await {
            Ok(reply) => reply,
            Err(e) => {
                let err = HallError::from(e);
                warn!(connection_id = %connection_id, error = %err, "login relay failed");
                log_reply_error(&connection_id, ctx.server_error(&err));
                return LoginOutcome::Unreachable;
            }
        };

        log_reply_error(&connection_id, ctx.binary_reply(reply.data.clone()));

        let envelope: ReplyEnvelope = match self.codec.decode(&reply.data) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(connection_id = %connection_id, error = %e, "undecodable login reply");
                return LoginOutcome::Malformed;
            }
        };
        if !envelope.is_success() {
            debug!(
                connection_id = %connection_id,
                code = envelope.code,
                message = %envelope.message,
                "login rejected by user service"
            );
            return LoginOutcome::Rejected {
                code: envelope.code,
            };
        }

        let credentials: LoginCredentials = match self.codec.decode(&envelope.data) {
            Ok(credentials) => credentials,
            Err(e) => {
                warn!(connection_id = %connection_id, error = %e, "undecodable login credentials");
                return LoginOutcome::Malformed;
            }
        };

        // The connection may have closed while the user service answered.
        if let Err(e) = self.registry.set_token(&connection_id, &credentials.token) {
            warn!(connection_id = %connection_id, error = %e, "failed to attach token");
        }
        info!(connection_id = %connection_id, "login accepted");

        let enrichment = tokio::spawn(self.clone().welcome(credentials.clone()));
        LoginOutcome::Accepted {
            credentials,
            enrichment,
        }
    }

    /// Fetches the profile for a fresh login.
    ///
    /// # Errors
    /// [`HallError::Upstream`] if the call fails or the envelope isn't a
    /// success; [`HallError::Protocol`] if either layer doesn't decode.
    pub async fn fetch_profile(
        &self,
        credentials: &LoginCredentials,
    ) -> Result<UserProfile, HallError> {
        let body = UserInfoRequest {
            token: credentials.token.clone(),
            session: credentials.session.clone(),
            secret_key: self.secret.derive(&credentials.token, &credentials.session),
        };
        let request = Message::new(
            USER_MODULE,
            USER_GET_INFO_ROUTE,
            self.codec.encode(&body)?,
            correlation_id(),
        );

        let reply = self.users.request_sync(request).await?;
        let envelope: ReplyEnvelope = self.codec.decode(&reply.data)?;
        if !envelope.is_success() {
            return Err(UpstreamError::new(
                "user service",
                format!("getUserInfo returned {}: {}", envelope.code, envelope.message),
            )
            .into());
        }
        Ok(self.codec.decode(&envelope.data)?)
    }

    async fn welcome(self, credentials: LoginCredentials) {
        let profile = match self.fetch_profile(&credentials).await {
            Ok(profile) => profile,
            Err(e) => {
                warn!(error = %e, "failed to fetch user profile");
                return;
            }
        };
        info!(name = %profile.name, vip = profile.vip, "user profile fetched");

        let text = welcome_text(&profile.name);
        if let Err(e) = self.announcements.publish(&text, WELCOME_SOURCE).await {
            warn!(error = %e, "failed to publish welcome announcement");
        }
    }
}

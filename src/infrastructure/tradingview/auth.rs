//! Provider Authentication
//!
//! The provider issues a short-lived JWT ("quote token") against the
//! operator's browser cookies. One token manager is shared by every call
//! site: readers take a shared guard; when the token is missing or within
//! five minutes of its `exp` claim, the manager re-acquires it under an
//! exclusive guard with a double-checked refresh.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, CONTENT_TYPE, COOKIE, ORIGIN, REFERER};
use serde::Deserialize;
use tokio::sync::RwLock;

/// Tokens this close to their `exp` claim are treated as expired, so a
/// token never expires mid-connection.
pub const TOKEN_EXPIRY_SKEW: Duration = Duration::from_secs(5 * 60);

/// Timeout of the quote-token HTTP exchange.
const TOKEN_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Authentication failure.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The token endpoint could not be reached.
    #[error("token exchange failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The token endpoint answered with a non-success status.
    #[error("token endpoint returned status {0}")]
    Status(StatusCode),
    /// The token endpoint answered with an empty body.
    #[error("provider returned an empty token")]
    EmptyToken,
}

// =============================================================================
// Cookies
// =============================================================================

/// The provider session cookies the token exchange authenticates with.
#[derive(Clone)]
pub struct ProviderCookies {
    /// `device_t` cookie value.
    pub device_token: String,
    /// `sessionid` cookie value.
    pub session_id: String,
    /// `sessionid_sign` cookie value.
    pub session_sign: String,
}

impl std::fmt::Debug for ProviderCookies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderCookies")
            .field("device_token", &"[REDACTED]")
            .field("session_id", &"[REDACTED]")
            .field("session_sign", &"[REDACTED]")
            .finish()
    }
}

// =============================================================================
// Token exchange
// =============================================================================

/// HTTP client for the provider's `quote_token` endpoint.
pub struct QuoteTokenClient {
    base_url: String,
    cookies: ProviderCookies,
    http: reqwest::Client,
}

impl QuoteTokenClient {
    /// Create a client against a provider base URL (no trailing slash).
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        cookies: ProviderCookies,
    ) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(TOKEN_REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            base_url: base_url.into(),
            cookies,
            http,
        })
    }

    /// Exchange the session cookies for a fresh quote token. The response
    /// body is the bare JWT, possibly wrapped in literal quotes.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthError`] on transport failure, a non-success status,
    /// or an empty body.
    pub async fn fetch_quote_token(&self) -> Result<String, AuthError> {
        let url = format!("{}/quote_token/", self.base_url);
        let cookie_header = format!(
            "cookiePrivacyPreferenceBannerProduction=notApplicable; device_t={}; sessionid={}; sessionid_sign={}",
            self.cookies.device_token, self.cookies.session_id, self.cookies.session_sign,
        );

        let response = self
            .http
            .post(&url)
            .query(&[("grabSession", "true")])
            .header(ACCEPT, "*/*")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(ORIGIN, "https://www.tradingview.com")
            .header(REFERER, "https://www.tradingview.com/")
            .header("X-Requested-With", "XMLHttpRequest")
            .header("X-Language", "en")
            .header(COOKIE, cookie_header)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::Status(status));
        }

        let body = response.text().await?;
        let token = body.trim().trim_matches('"').to_string();
        if token.is_empty() {
            return Err(AuthError::EmptyToken);
        }
        Ok(token)
    }
}

// =============================================================================
// Token manager
// =============================================================================

/// Shared holder of the current quote token.
///
/// Built once by the composition root and threaded into the supervisor;
/// there is no global instance.
pub struct AuthTokenManager {
    token: RwLock<String>,
    client: QuoteTokenClient,
}

impl AuthTokenManager {
    /// Create a manager with no token; the first [`Self::token`] call
    /// fetches one.
    #[must_use]
    pub fn new(client: QuoteTokenClient) -> Self {
        Self {
            token: RwLock::new(String::new()),
            client,
        }
    }

    /// Replace the current token.
    pub async fn set_token(&self, token: impl Into<String>) {
        *self.token.write().await = token.into();
    }

    /// A token that is non-empty and at least five minutes from expiry.
    ///
    /// Fast path reads under a shared guard; a missing or expiring token is
    /// re-acquired under an exclusive guard, re-checking after the guard is
    /// held so concurrent callers refresh only once.
    ///
    /// # Errors
    ///
    /// Propagates the token-exchange failure.
    pub async fn token(&self) -> Result<String, AuthError> {
        {
            let token = self.token.read().await;
            if !token.is_empty() && !token_expired(&token) {
                return Ok(token.clone());
            }
        }

        let mut token = self.token.write().await;
        if token.is_empty() || token_expired(&token) {
            tracing::info!("quote token missing or expiring, refreshing");
            *token = self.client.fetch_quote_token().await?;
        }
        Ok(token.clone())
    }

    /// Force a refresh regardless of the current token's state.
    ///
    /// # Errors
    ///
    /// Propagates the token-exchange failure.
    pub async fn refresh(&self) -> Result<String, AuthError> {
        let fresh = self.client.fetch_quote_token().await?;
        *self.token.write().await = fresh.clone();
        Ok(fresh)
    }

    /// Whether the current token is missing or within the expiry skew.
    pub async fn is_expired(&self) -> bool {
        let token = self.token.read().await;
        token.is_empty() || token_expired(&token)
    }
}

/// Whether a JWT's `exp` claim is within [`TOKEN_EXPIRY_SKEW`] of now.
/// Any parsing failure counts as expired.
#[must_use]
pub fn token_expired(token: &str) -> bool {
    let mut parts = token.split('.');
    let (Some(_), Some(payload), Some(_), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return true;
    };

    let Ok(decoded) = URL_SAFE_NO_PAD.decode(payload) else {
        return true;
    };

    #[derive(Deserialize)]
    struct Claims {
        #[serde(default)]
        exp: i64,
    }

    let Ok(claims) = serde_json::from_slice::<Claims>(&decoded) else {
        return true;
    };

    #[allow(clippy::cast_possible_wrap)]
    let skew = TOKEN_EXPIRY_SKEW.as_secs() as i64;
    Utc::now().timestamp() + skew >= claims.exp
}

//! Anti-forgery session token management
//!
//! The reservation site only answers bulk queries that carry a token scraped
//! from one of its HTML pages. The token is cached in process, considered
//! expired after a fixed TTL, and dropped whenever the remote rejects it.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use regex::Regex;
use reqwest::Client;
use tracing::{debug, info};
use url::Url;

use super::headers::build_page_headers;
use crate::utils::error::FetchError;

/// A token together with the moment it was obtained
#[derive(Debug, Clone)]
pub struct SessionToken {
    pub value: String,
    pub acquired_at: Instant,
}

impl SessionToken {
    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.acquired_at.elapsed() >= ttl
    }
}

/// Acquires and caches the anti-forgery token
pub struct SessionManager {
    client: Client,
    session_url: Url,
    user_agent: String,
    token_pattern: Regex,
    ttl: Duration,
    token: Mutex<Option<SessionToken>>,
}

impl SessionManager {
    /// `token_pattern` must contain at least one capture group; the first
    /// group is the token.
    pub fn new(
        client: Client,
        session_url: Url,
        user_agent: impl Into<String>,
        token_pattern: Regex,
        ttl: Duration,
    ) -> Self {
        Self {
            client,
            session_url,
            user_agent: user_agent.into(),
            token_pattern,
            ttl,
            token: Mutex::new(None),
        }
    }

    pub fn session_url(&self) -> &Url {
        &self.session_url
    }

    /// Cached token, if one exists and has not expired
    pub fn current(&self) -> Option<String> {
        let guard = self.token.lock().unwrap_or_else(|p| p.into_inner());
        guard
            .as_ref()
            .filter(|token| !token.is_expired(self.ttl))
            .map(|token| token.value.clone())
    }

    /// Whether a new token must be acquired before the next request
    pub fn is_expired(&self) -> bool {
        self.current().is_none()
    }

    /// Drop the cached token
    pub fn invalidate(&self) {
        let mut guard = self.token.lock().unwrap_or_else(|p| p.into_inner());
        if guard.take().is_some() {
            debug!("Session token invalidated");
        }
    }

    /// Return the cached token or acquire a fresh one
    pub async fn ensure(&self) -> Result<String, FetchError> {
        match self.current() {
            Some(token) => Ok(token),
            None => self.acquire().await,
        }
    }

    /// Load the session page and extract a new token
    pub async fn acquire(&self) -> Result<String, FetchError> {
        let headers = build_page_headers(&self.user_agent, self.session_url.as_str())?;

        let response = self
            .client
            .get(self.session_url.clone())
            .headers(headers)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        let value = self.extract_token(&body).ok_or(FetchError::TokenNotFound)?;

        let mut guard = self.token.lock().unwrap_or_else(|p| p.into_inner());
        *guard = Some(SessionToken {
            value: value.clone(),
            acquired_at: Instant::now(),
        });

        info!(url = %self.session_url, "Acquired session token");
        Ok(value)
    }

    /// First capture of the token pattern in `body`
    pub fn extract_token(&self, body: &str) -> Option<String> {
        self.token_pattern
            .captures(body)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|token| !token.is_empty())
    }

    #[cfg(test)]
    fn set_token(&self, token: SessionToken) {
        *self.token.lock().unwrap() = Some(token);
    }
}

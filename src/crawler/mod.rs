//! Remote source access
//!
//! Session handling, the day fetcher and the rate limiter, composed behind
//! the [`EventSource`] capability the orchestrators depend on.

pub mod fetcher;
pub mod headers;
pub mod rate_limit;
pub mod session;

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;

use crate::config::Config;
use crate::error::Result;
use crate::models::Event;
use crate::utils::error::FetchError;
use crate::utils::retry::{with_retry, RetryConfig};
use crate::versioning::VersioningEngine;

pub use fetcher::DayFetcher;
pub use rate_limit::RateLimiter;
pub use session::SessionManager;

/// Events of one calendar date plus when the request began
#[derive(Debug, Clone)]
pub struct DayFetch {
    pub date: NaiveDate,
    pub events: Vec<Event>,
    /// Monotonic start, for the rate limiter
    pub started: Instant,
}

/// Capability shared by all orchestrators
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Make sure a valid session token is cached
    async fn ensure_session(&self) -> Result<()>;

    /// Fetch the events scheduled on `date`
    async fn fetch_day(&self, date: NaiveDate) -> Result<DayFetch>;
}

/// Production [`EventSource`]: session + retry + day fetcher
pub struct ScrapeClient {
    session: SessionManager,
    fetcher: DayFetcher,
    retry: RetryConfig,
    engine: Arc<VersioningEngine>,
}

impl ScrapeClient {
    pub fn new(
        session: SessionManager,
        fetcher: DayFetcher,
        retry: RetryConfig,
        engine: Arc<VersioningEngine>,
    ) -> Self {
        Self {
            session,
            fetcher,
            retry,
            engine,
        }
    }

    /// Build the HTTP client, session manager and fetcher from configuration
    pub fn from_config(config: &Config, engine: Arc<VersioningEngine>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .cookie_store(true)
            .gzip(true)
            .build()
            .context("Failed to create HTTP client")?;

        let session_url = config.session_url()?;
        let user_agent = config.user_agent();

        let session = SessionManager::new(
            client.clone(),
            session_url.clone(),
            user_agent
                .clone()
                .unwrap_or_else(|| fetcher::random_user_agent().to_string()),
            config.token_regex()?,
            config.token_ttl(),
        );

        let fetcher = DayFetcher::new(
            client,
            config.bookings_url()?,
            &session_url,
            config.source.token_header.clone(),
            user_agent,
        );

        Ok(Self::new(session, fetcher, config.retry.clone(), engine))
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// Run `operation` under the retry policy, dropping the cached token
    /// whenever the remote rejects it
    async fn with_retry<T, F, Fut>(&self, name: String, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<T, FetchError>>,
    {
        let session = &self.session;
        let result = with_retry(&self.retry, name, operation, |err: &FetchError| {
            if err.invalidates_session() {
                session.invalidate();
            }
        })
        .await?;
        Ok(result)
    }
}

#[async_trait]
impl EventSource for ScrapeClient {
    async fn ensure_session(&self) -> Result<()> {
        if !self.session.is_expired() {
            return Ok(());
        }

        let session = &self.session;
        self.with_retry("acquire session token".to_string(), move || async move {
            session.acquire().await
        })
        .await?;
        Ok(())
    }

    async fn fetch_day(&self, date: NaiveDate) -> Result<DayFetch> {
        let started = Instant::now();

        let session = &self.session;
        let fetcher = &self.fetcher;
        let events = self
            .with_retry(format!("fetch {date}"), move || async move {
                let token = session.ensure().await?;
                fetcher.fetch(date, &token).await
            })
            .await?;

        for event in &events {
            self.engine.check_constant_fields(event);
        }

        Ok(DayFetch {
            date,
            events,
            started,
        })
    }
}


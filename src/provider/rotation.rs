//! Credential rotation
//!
//! A [`CredentialRing`] is a fixed list of provider handles with a shared
//! cursor. Every call to [`CredentialRing::next`] advances the cursor, so
//! retries and concurrent callers spread across credentials.

use chrono::{Datelike, NaiveDate};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{GenerationOutput, GenerationProvider, GenerationRequest, ProviderError};

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// One credential of one provider, with its own rate limit and timeout
pub struct ProviderHandle {
    label: String,
    provider: Arc<dyn GenerationProvider>,
    limiter: Option<DirectLimiter>,
    timeout: Duration,
}

impl std::fmt::Debug for ProviderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderHandle")
            .field("label", &self.label)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ProviderHandle {
    /// `requests_per_minute == 0` disables local rate limiting
    pub fn new(
        label: impl Into<String>,
        provider: Arc<dyn GenerationProvider>,
        requests_per_minute: u32,
        timeout: Duration,
    ) -> Self {
        let limiter =
            NonZeroU32::new(requests_per_minute).map(|rpm| RateLimiter::direct(Quota::per_minute(rpm)));

        Self {
            label: label.into(),
            provider,
            limiter,
            timeout,
        }
    }

    /// Label such as `openrouter#1`; never contains the credential itself
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Issue one request under this handle's rate limit and timeout
    ///
    /// A saturated local limiter fails fast with `RateLimited` so the caller
    /// can rotate instead of waiting.
    pub async fn call(&self, request: &GenerationRequest) -> Result<GenerationOutput, ProviderError> {
        if let Some(limiter) = &self.limiter {
            if limiter.check().is_err() {
                return Err(ProviderError::RateLimited {
                    provider: self.label.clone(),
                });
            }
        }

        match tokio::time::timeout(self.timeout, self.provider.generate(request)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout {
                provider: self.label.clone(),
                after_secs: self.timeout.as_secs(),
            }),
        }
    }
}

/// Ring of provider handles with a shared "next" cursor
#[derive(Debug)]
pub struct CredentialRing {
    handles: Vec<Arc<ProviderHandle>>,
    cursor: AtomicUsize,
}

impl CredentialRing {
    pub fn new(handles: Vec<ProviderHandle>) -> Result<Self, ProviderError> {
        if handles.is_empty() {
            return Err(ProviderError::NoProviders);
        }

        Ok(Self {
            handles: handles.into_iter().map(Arc::new).collect(),
            cursor: AtomicUsize::new(0),
        })
    }

    /// Start rotation at a fixed position
    pub fn with_start(self, start: usize) -> Self {
        self.cursor.store(start % self.handles.len(), Ordering::SeqCst);
        self
    }

    /// Start rotation at a position derived from the date, so each day
    /// begins on a different credential while staying reproducible
    pub fn seeded_for(self, date: NaiveDate) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(date.num_days_from_ce() as u64);
        let start = rng.gen_range(0..self.handles.len());
        self.with_start(start)
    }

    /// Next handle in rotation order
    pub fn next(&self) -> Arc<ProviderHandle> {
        let index = self.cursor.fetch_add(1, Ordering::SeqCst) % self.handles.len();
        Arc::clone(&self.handles[index])
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.handles.iter().map(|h| h.label()).collect()
    }
}

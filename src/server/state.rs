//! Shared state handed to every handler and middleware.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::audit::{AuditLogger, AuditSink, NullAuditLogger};
use crate::auth::{CredentialResolver, DigestAuthenticator, NonceRegistry, RateLimiter};
use crate::config::Settings;
use crate::error::DaemonResult;

use super::metrics::RequestMetrics;

/// Handles shared by the guard and the routes.
#[derive(Clone)]
pub struct AppState {
    pub authenticator: Arc<DigestAuthenticator>,
    pub rate_limiter: Arc<RateLimiter>,
    pub audit: Arc<dyn AuditSink>,
    pub metrics: Arc<RequestMetrics>,
    /// Append request/response auth headers to 401 bodies.
    pub diagnostic_echo: bool,
    pub request_timeout: Duration,
    pub started_at: Instant,
}

impl AppState {
    /// State with auditing disabled and a fresh metrics set.
    pub fn new(authenticator: Arc<DigestAuthenticator>, rate_limiter: Arc<RateLimiter>) -> Self {
        Self {
            authenticator,
            rate_limiter,
            audit: Arc::new(NullAuditLogger::new()),
            metrics: Arc::new(RequestMetrics::new()),
            diagnostic_echo: false,
            request_timeout: Duration::from_secs(30),
            started_at: Instant::now(),
        }
    }

    /// Wire up the engine, rate limiter and audit log from settings.
    ///
    /// Spawns the nonce sweep and rate limiter cleanup tasks, so this must
    /// run inside a tokio runtime.
    pub fn from_settings(
        settings: &Settings,
        resolver: Arc<dyn CredentialResolver>,
    ) -> DaemonResult<Self> {
        let digest = &settings.digest;

        let registry = Arc::new(NonceRegistry::new(
            digest.nonce_max_age(),
            digest.nonce_grace_factor,
        ));
        registry.start_sweep_task(digest.sweep_interval());
        info!(
            realm = %digest.realm,
            max_age_secs = digest.nonce_max_age_seconds,
            grace_factor = digest.nonce_grace_factor,
            "Nonce registry started"
        );

        let authenticator = Arc::new(DigestAuthenticator::new(
            digest.realm.clone(),
            registry,
            resolver,
            digest.authentication_info,
        )?);

        let limits = &settings.limits;
        let window = Duration::from_secs(limits.rate_limit_window_seconds);
        let rate_limiter = Arc::new(RateLimiter::new(limits.rate_limit_requests, window));
        rate_limiter.start_cleanup_task(Duration::from_secs(60));
        info!(
            max_requests = limits.rate_limit_requests,
            window_seconds = limits.rate_limit_window_seconds,
            "Per-client rate limiting enabled"
        );

        if digest.diagnostic_echo {
            warn!("Diagnostic echo enabled, 401 bodies will include auth headers");
        }

        Ok(Self::new(authenticator, rate_limiter)
            .with_audit(audit_sink(settings))
            .with_diagnostic_echo(digest.diagnostic_echo)
            .with_request_timeout(Duration::from_secs(limits.request_timeout_seconds)))
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_diagnostic_echo(mut self, enabled: bool) -> Self {
        self.diagnostic_echo = enabled;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

fn audit_sink(settings: &Settings) -> Arc<dyn AuditSink> {
    if !settings.audit.enabled {
        info!("Audit logging disabled");
        return Arc::new(NullAuditLogger::new());
    }

    match AuditLogger::new(&settings.audit.log_path) {
        Ok(logger) => {
            info!(path = %settings.audit.log_path.display(), "Audit logging enabled");
            Arc::new(logger)
        }
        Err(e) => {
            warn!(
                error = %e,
                path = %settings.audit.log_path.display(),
                "Failed to create audit logger, audit logging disabled"
            );
            Arc::new(NullAuditLogger::new())
        }
    }
}

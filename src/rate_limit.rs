//! Per-client rate limiting.
//!
//! Uses keyed token buckets tracked per client IP. Two general rules apply to
//! every route; the tighter per-minute rule also drives the
//! `X-Rate-Limit-*` bookkeeping headers.

use std::{collections::HashSet, num::NonZeroU32, sync::Arc, time::Duration};

use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{SecondsFormat, Utc};
use governor::{
    Quota, RateLimiter,
    clock::{Clock, DefaultClock},
    middleware::StateInformationMiddleware,
    state::keyed::DefaultKeyedStateStore,
};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::auth::extract_client_ip;

/// Per-IP limiter that reports the bucket state on every decision.
pub type IpLimiter =
    RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock, StateInformationMiddleware>;

pub const LIMIT_HEADER: &str = "x-rate-limit-limit";
pub const REMAINING_HEADER: &str = "x-rate-limit-remaining";
pub const RESET_HEADER: &str = "x-rate-limit-reset";

/// Requests to this path never receive bookkeeping headers.
const LOGIN_PATH: &str = "/api/auth/login";

const EXCEEDED_MESSAGE: &str = "Too Many Requests. You have exceeded your rate limit.";

/// Interval between sweeps that drop clients whose buckets are full again.
const PRUNE_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// User-facing rate limit settings, as parsed from the command line.
#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub per_minute: u32,
    pub per_five_minutes: u32,
    pub whitelist: Vec<String>,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            per_minute: 5,
            per_five_minutes: 20,
            whitelist: vec!["127.0.0.1".to_string()],
        }
    }
}

struct Rule {
    /// Label used in the 429 body, e.g. `60s`
    period: &'static str,
    window: Duration,
    limit: u32,
    limiter: IpLimiter,
}

impl Rule {
    fn new(period: &'static str, window: Duration, limit: u32) -> Option<Self> {
        let burst = NonZeroU32::new(limit)?;
        let quota = Quota::with_period(window / burst.get())?.allow_burst(burst);
        Some(Self {
            period,
            window,
            limit,
            limiter: RateLimiter::keyed(quota).with_middleware::<StateInformationMiddleware>(),
        })
    }

    fn replenish_interval(&self) -> Duration {
        self.window / self.limit.max(1)
    }
}

/// Rate limiting state shared by both middleware layers.
pub struct RateLimitConfig {
    rules: Vec<Rule>,
    whitelist: HashSet<String>,
    trust_real_ip: bool,
}

impl RateLimitConfig {
    /// Build the limiters. A rule with a limit of zero is disabled.
    pub fn new(settings: &RateLimitSettings, trust_real_ip: bool) -> Self {
        let rules = [
            Rule::new("60s", Duration::from_secs(60), settings.per_minute),
            Rule::new("5m", Duration::from_secs(300), settings.per_five_minutes),
        ]
        .into_iter()
        .flatten()
        .collect();

        Self {
            rules,
            whitelist: settings.whitelist.iter().cloned().collect(),
            trust_real_ip,
        }
    }

    fn is_whitelisted(&self, ip: &str) -> bool {
        self.whitelist.contains(ip)
    }

    /// Check every rule for `ip`, consuming one cell from each bucket.
    fn check(&self, ip: &str) -> Result<RateLimitStatus, Exceeded> {
        let key = ip.to_string();
        let mut status = None;

        for rule in &self.rules {
            match rule.limiter.check_key(&key) {
                Ok(snapshot) => {
                    if status.is_none() {
                        status = Some(RateLimitStatus::metered(
                            rule.limit,
                            snapshot.remaining_burst_capacity(),
                            rule.replenish_interval(),
                        ));
                    }
                }
                Err(not_until) => {
                    let wait = not_until.wait_time_from(DefaultClock::default().now());
                    return Err(Exceeded {
                        limit: rule.limit,
                        period: rule.period,
                        retry_after_secs: wait.as_secs_f64().ceil() as u64,
                    });
                }
            }
        }

        Ok(status.unwrap_or_else(|| RateLimitStatus::unmetered(0)))
    }

    fn primary_limit(&self) -> u32 {
        self.rules.first().map(|rule| rule.limit).unwrap_or(0)
    }

    /// Forget clients whose buckets have fully replenished.
    pub fn retain_recent(&self) {
        for rule in &self.rules {
            rule.limiter.retain_recent();
            rule.limiter.shrink_to_fit();
        }
    }

    /// Number of clients tracked by the largest rule.
    pub fn tracked_clients(&self) -> usize {
        self.rules
            .iter()
            .map(|rule| rule.limiter.len())
            .max()
            .unwrap_or(0)
    }
}

/// Spawn a background task that periodically prunes idle clients.
pub fn spawn_prune_scheduler(config: Arc<RateLimitConfig>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PRUNE_INTERVAL);
        loop {
            interval.tick().await;
            let before = config.tracked_clients();
            config.retain_recent();
            debug!(
                before,
                after = config.tracked_clients(),
                "Pruned rate limiter state"
            );
        }
    })
}

/// Budget left for the current client, stored in request extensions by
/// [`enforce_rate_limit`] and turned into headers by [`rate_limit_headers`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub limit: u32,
    pub remaining: u32,
    /// RFC 3339 time at which the budget is full again
    pub reset: String,
}

impl RateLimitStatus {
    fn metered(limit: u32, remaining: u32, replenish_interval: Duration) -> Self {
        let used = limit.saturating_sub(remaining);
        let until_full = chrono::Duration::from_std(replenish_interval * used)
            .unwrap_or_else(|_| chrono::Duration::zero());
        Self {
            limit,
            remaining,
            reset: (Utc::now() + until_full).to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }

    fn unmetered(limit: u32) -> Self {
        Self {
            limit,
            remaining: limit,
            reset: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

#[derive(Debug)]
struct Exceeded {
    limit: u32,
    period: &'static str,
    retry_after_secs: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExceededBody {
    status_code: u16,
    message: &'static str,
    details: ExceededDetails,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExceededDetails {
    limit: String,
    period: String,
    retry_after: String,
}

impl IntoResponse for Exceeded {
    fn into_response(self) -> Response {
        let body = ExceededBody {
            status_code: StatusCode::TOO_MANY_REQUESTS.as_u16(),
            message: EXCEEDED_MESSAGE,
            details: ExceededDetails {
                limit: self.limit.to_string(),
                period: self.period.to_string(),
                retry_after: format!("{}s", self.retry_after_secs),
            },
        };

        let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
        if let Ok(value) = HeaderValue::from_str(&self.retry_after_secs.to_string()) {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        response
    }
}

/// Middleware rejecting clients that exceed any rule.
pub async fn enforce_rate_limit(
    State(config): State<Arc<RateLimitConfig>>,
    mut request: Request,
    next: Next,
) -> Response {
    let ip = extract_client_ip(&request, config.trust_real_ip);

    let status = if config.is_whitelisted(&ip) {
        RateLimitStatus::unmetered(config.primary_limit())
    } else {
        match config.check(&ip) {
            Ok(status) => status,
            Err(exceeded) => {
                tracing::warn!(
                    client = %ip,
                    path = %request.uri().path(),
                    period = exceeded.period,
                    "Rate limit exceeded"
                );
                return exceeded.into_response();
            }
        }
    };

    request.extensions_mut().insert(status);
    next.run(request).await
}

/// Middleware adding `X-Rate-Limit-*` headers to responses.
///
/// Skipped for the login path and for 401 responses.
pub async fn rate_limit_headers(request: Request, next: Next) -> Response {
    let is_login = is_login_path(request.uri().path());
    let status = request.extensions().get::<RateLimitStatus>().cloned();

    let mut response = next.run(request).await;

    if is_login || response.status() == StatusCode::UNAUTHORIZED {
        return response;
    }

    if let Some(status) = status {
        let headers = response.headers_mut();
        headers.insert(LIMIT_HEADER, HeaderValue::from(status.limit));
        headers.insert(REMAINING_HEADER, HeaderValue::from(status.remaining));
        if let Ok(value) = HeaderValue::from_str(&status.reset) {
            headers.insert(RESET_HEADER, value);
        }
    }

    response
}

/// Segment-aware, case-insensitive match on the login path.
fn is_login_path(path: &str) -> bool {
    let Some(prefix) = path.get(..LOGIN_PATH.len()) else {
        return false;
    };
    prefix.eq_ignore_ascii_case(LOGIN_PATH)
        && matches!(path.as_bytes().get(LOGIN_PATH.len()), None | Some(b'/'))
}

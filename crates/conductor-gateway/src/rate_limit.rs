//! Admission gate for the HTTP surface.
//!
//! Every client gets two sliding windows over one timestamp log: a one second
//! burst window and a sixty second sustained window. A request is admitted
//! only when both windows have room. Rejected attempts are not recorded, so a
//! client hammering the gate does not push its own recovery further out.
//!
//! # Memory
//!
//! Clients are keyed by the left-most `X-Forwarded-For` entry, or the peer
//! address. Once `max_tracked_clients` is reached, clients with nothing left
//! in the sustained window are dropped before a new one is tracked. That
//! sweep runs at most once per `PURGE_INTERVAL`, so a flood of unseen ids
//! costs one sweep per interval rather than one per request. There is no
//! background sweeper.

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use conductor_guard::{EventSink, SafetyEvent};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{PathLimits, RateLimitConfig};
use crate::GatewayError;

const BURST_WINDOW: Duration = Duration::from_secs(1);
const SUSTAINED_WINDOW: Duration = Duration::from_secs(60);

/// Minimum spacing between idle-client sweeps
pub const PURGE_INTERVAL: Duration = Duration::from_secs(1);

pub const HEADER_LIMIT: &str = "x-ratelimit-limit";
pub const HEADER_REMAINING: &str = "x-ratelimit-remaining";
pub const HEADER_RESET: &str = "x-ratelimit-reset";

/// Client id used when neither a forwarded header nor a peer address is known
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Outcome of one admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Seconds until a retry can succeed; 0 when admitted
    pub retry_after: u64,
    /// Sustained-window slots left after this request
    pub remaining: u32,
}

impl RateLimitDecision {
    fn admit(remaining: u32) -> Self {
        Self {
            allowed: true,
            retry_after: 0,
            remaining,
        }
    }

    fn reject(retry_after: u64) -> Self {
        Self {
            allowed: false,
            retry_after,
            remaining: 0,
        }
    }
}

#[derive(Default)]
struct ClientTable {
    clients: HashMap<String, VecDeque<Instant>>,
    last_purge: Option<Instant>,
    purges: u64,
}

impl ClientTable {
    fn purge_due(&self, now: Instant) -> bool {
        self.last_purge
            .map_or(true, |last| now.duration_since(last) >= PURGE_INTERVAL)
    }

    /// Drop clients with nothing left in the sustained window
    fn purge_idle(&mut self, now: Instant) {
        let before = self.clients.len();
        self.clients.retain(|_, timestamps| {
            prune(timestamps, now);
            !timestamps.is_empty()
        });
        self.last_purge = Some(now);
        self.purges += 1;
        tracing::debug!(
            purged = before - self.clients.len(),
            tracked = self.clients.len(),
            "client table full, purged idle clients"
        );
    }
}

/// In-memory dual-window rate limiter
pub struct RateLimiter {
    config: RateLimitConfig,
    table: Mutex<ClientTable>,
    events: Option<Arc<dyn EventSink>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            table: Mutex::new(ClientTable::default()),
            events: None,
        }
    }

    /// Broadcast a [`SafetyEvent::RateLimited`] for every rejection
    pub fn with_events(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = Some(sink);
        self
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Limits for a path: exact override, then the longest prefix override,
    /// then the defaults
    pub fn get_limits(&self, path: &str) -> PathLimits {
        if let Some(limits) = self.config.path_overrides.get(path) {
            return *limits;
        }

        self.config
            .path_overrides
            .iter()
            .filter(|(prefix, _)| is_path_prefix(prefix, path))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, limits)| *limits)
            .unwrap_or_else(|| {
                PathLimits::new(self.config.requests_per_minute, self.config.requests_per_second)
            })
    }

    pub fn check_rate_limit(
        &self,
        client_id: &str,
        requests_per_minute: u32,
        requests_per_second: u32,
    ) -> RateLimitDecision {
        self.check_rate_limit_at(client_id, requests_per_minute, requests_per_second, Instant::now())
    }

    /// Check and, when admitted, record a request made at `now`.
    ///
    /// The whole prune, count and append sequence runs under one lock.
    pub fn check_rate_limit_at(
        &self,
        client_id: &str,
        requests_per_minute: u32,
        requests_per_second: u32,
        now: Instant,
    ) -> RateLimitDecision {
        let mut table = self.table.lock();

        if !table.clients.contains_key(client_id)
            && table.clients.len() >= self.config.max_tracked_clients
            && table.purge_due(now)
        {
            table.purge_idle(now);
            if table.clients.len() >= self.config.max_tracked_clients {
                tracing::warn!(tracked = table.clients.len(), "client table still full after purge");
            }
        }

        let timestamps = table.clients.entry(client_id.to_string()).or_default();
        prune(timestamps, now);

        let in_burst = timestamps
            .iter()
            .rev()
            .take_while(|t| now.duration_since(**t) < BURST_WINDOW)
            .count();
        if in_burst >= requests_per_second as usize {
            return RateLimitDecision::reject(1);
        }

        if timestamps.len() >= requests_per_minute as usize {
            let retry_after = timestamps
                .front()
                .map(|oldest| {
                    let left = SUSTAINED_WINDOW.saturating_sub(now.duration_since(*oldest));
                    left.as_secs() + u64::from(left.subsec_nanos() > 0)
                })
                .unwrap_or(SUSTAINED_WINDOW.as_secs())
                .max(1);
            return RateLimitDecision::reject(retry_after);
        }

        timestamps.push_back(now);
        let remaining = (requests_per_minute as usize).saturating_sub(timestamps.len());
        RateLimitDecision::admit(u32::try_from(remaining).unwrap_or(u32::MAX))
    }

    /// Forget everything recorded for one client
    pub fn reset_client(&self, client_id: &str) {
        if self.table.lock().clients.remove(client_id).is_some() {
            tracing::info!(client_id, "rate limit state reset");
        }
    }

    pub fn tracked_clients(&self) -> usize {
        self.table.lock().clients.len()
    }

    /// Idle-client sweeps run so far
    pub fn purge_count(&self) -> u64 {
        self.table.lock().purges
    }

    fn report(&self, client_id: &str, path: &str, retry_after: u64) {
        tracing::warn!(client_id, path, retry_after, "rate limit exceeded");
        if let Some(events) = &self.events {
            events.broadcast(SafetyEvent::RateLimited {
                client_id: client_id.to_string(),
                path: path.to_string(),
                retry_after,
            });
        }
    }
}

fn prune(timestamps: &mut VecDeque<Instant>, now: Instant) {
    while let Some(oldest) = timestamps.front() {
        if now.duration_since(*oldest) >= SUSTAINED_WINDOW {
            timestamps.pop_front();
        } else {
            break;
        }
    }
}

/// `prefix` covers `path` on a segment boundary
fn is_path_prefix(prefix: &str, path: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || prefix.ends_with('/'),
        None => false,
    }
}

/// Left-most `X-Forwarded-For` entry, else the peer address
pub fn client_id(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    match (forwarded, peer) {
        (Some(ip), _) => ip.to_string(),
        (None, Some(addr)) => addr.ip().to_string(),
        (None, None) => UNKNOWN_CLIENT.to_string(),
    }
}

/// Axum middleware running every request through the gate
pub async fn admission_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    if !limiter.is_enabled() || limiter.config().is_exempt(&path) {
        return next.run(request).await;
    }

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client = client_id(request.headers(), peer);
    let limits = limiter.get_limits(&path);

    let decision = limiter.check_rate_limit(
        &client,
        limits.requests_per_minute,
        limits.requests_per_second,
    );
    if !decision.allowed {
        limiter.report(&client, &path, decision.retry_after);
        return GatewayError::RateLimited {
            retry_after: decision.retry_after,
        }
        .into_response();
    }

    let mut response = next.run(request).await;
    let reset = chrono::Utc::now().timestamp() + SUSTAINED_WINDOW.as_secs() as i64;
    let headers = response.headers_mut();
    headers.insert(HEADER_LIMIT, HeaderValue::from(limits.requests_per_minute));
    headers.insert(HEADER_REMAINING, HeaderValue::from(decision.remaining));
    headers.insert(HEADER_RESET, HeaderValue::from(reset));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_guard::MemorySink;

    fn limiter() -> RateLimiter {
        RateLimiter::new(RateLimitConfig::default())
    }

    #[test]
    fn test_burst_limit_and_reset() {
        let limiter = limiter();
        let t0 = Instant::now();

        assert!(limiter.check_rate_limit_at("a", 60, 2, t0).allowed);
        assert!(limiter.check_rate_limit_at("a", 60, 2, t0).allowed);

        let third = limiter.check_rate_limit_at("a", 60, 2, t0);
        assert!(!third.allowed);
        assert_eq!(third.retry_after, 1);

        limiter.reset_client("a");
        assert!(limiter.check_rate_limit_at("a", 60, 2, t0).allowed);
    }

    #[test]
    fn test_burst_window_slides() {
        let limiter = limiter();
        let t0 = Instant::now();

        assert!(limiter.check_rate_limit_at("a", 60, 1, t0).allowed);
        assert!(!limiter.check_rate_limit_at("a", 60, 1, t0 + Duration::from_millis(500)).allowed);
        assert!(limiter.check_rate_limit_at("a", 60, 1, t0 + Duration::from_millis(1000)).allowed);
    }

    #[test]
    fn test_rejections_are_not_recorded() {
        let limiter = limiter();
        let t0 = Instant::now();

        assert!(limiter.check_rate_limit_at("a", 60, 1, t0).allowed);
        for _ in 0..5 {
            assert!(!limiter.check_rate_limit_at("a", 60, 1, t0).allowed);
        }
        // Only the admitted request counts against the next second
        assert!(limiter.check_rate_limit_at("a", 60, 1, t0 + Duration::from_secs(1)).allowed);
    }

    #[test]
    fn test_sustained_limit_retry_after_tracks_oldest() {
        let limiter = limiter();
        let t0 = Instant::now();

        for i in 0..3 {
            let at = t0 + Duration::from_secs(i * 10);
            assert!(limiter.check_rate_limit_at("a", 3, 10, at).allowed);
        }

        let rejected = limiter.check_rate_limit_at("a", 3, 10, t0 + Duration::from_secs(25));
        assert!(!rejected.allowed);
        assert_eq!(rejected.retry_after, 35);

        // Oldest entry ages out at t0 + 60s
        assert!(limiter.check_rate_limit_at("a", 3, 10, t0 + Duration::from_secs(60)).allowed);
    }

    #[test]
    fn test_retry_after_rounds_up_to_at_least_one() {
        let limiter = limiter();
        let t0 = Instant::now();

        assert!(limiter.check_rate_limit_at("a", 1, 10, t0).allowed);
        let rejected =
            limiter.check_rate_limit_at("a", 1, 10, t0 + Duration::from_millis(59_500));
        assert_eq!(rejected.retry_after, 1);
    }

    #[test]
    fn test_remaining_counts_down() {
        let limiter = limiter();
        let t0 = Instant::now();
        assert_eq!(limiter.check_rate_limit_at("a", 5, 10, t0).remaining, 4);
        assert_eq!(limiter.check_rate_limit_at("a", 5, 10, t0).remaining, 3);
    }

    #[test]
    fn test_clients_are_independent() {
        let limiter = limiter();
        let t0 = Instant::now();

        assert!(limiter.check_rate_limit_at("a", 60, 1, t0).allowed);
        assert!(!limiter.check_rate_limit_at("a", 60, 1, t0).allowed);
        assert!(limiter.check_rate_limit_at("b", 60, 1, t0).allowed);
        assert_eq!(limiter.tracked_clients(), 2);
    }

    #[test]
    fn test_idle_clients_purged_when_table_full() {
        let config = RateLimitConfig {
            max_tracked_clients: 2,
            ..RateLimitConfig::default()
        };
        let limiter = RateLimiter::new(config);
        let t0 = Instant::now();

        limiter.check_rate_limit_at("a", 60, 10, t0);
        limiter.check_rate_limit_at("b", 60, 10, t0 + Duration::from_secs(30));
        limiter.check_rate_limit_at("c", 60, 10, t0 + Duration::from_secs(61));

        // "a" went idle and was dropped; "b" is still inside its window
        assert_eq!(limiter.tracked_clients(), 2);
        assert_eq!(limiter.purge_count(), 1);
        limiter.reset_client("b");
        limiter.reset_client("c");
        assert_eq!(limiter.tracked_clients(), 0);
    }

    #[test]
    fn test_new_client_flood_sweeps_once_per_interval() {
        let config = RateLimitConfig {
            max_tracked_clients: 100,
            ..RateLimitConfig::default()
        };
        let limiter = RateLimiter::new(config);
        let t0 = Instant::now();

        for i in 0..100 {
            limiter.check_rate_limit_at(&format!("seed-{i}"), 60, 10, t0);
        }
        assert_eq!(limiter.purge_count(), 0);

        let flood_at = t0 + Duration::from_secs(5);
        for i in 0..5_000 {
            let decision = limiter.check_rate_limit_at(&format!("spoof-{i}"), 60, 10, flood_at);
            assert!(decision.allowed);
        }
        assert_eq!(limiter.purge_count(), 1);

        // Still inside the interval
        limiter.check_rate_limit_at("late", 60, 10, flood_at + Duration::from_millis(900));
        assert_eq!(limiter.purge_count(), 1);

        limiter.check_rate_limit_at("next", 60, 10, flood_at + PURGE_INTERVAL);
        assert_eq!(limiter.purge_count(), 2);
    }

    #[test]
    fn test_sweep_after_interval_reclaims_idle_flood() {
        let config = RateLimitConfig {
            max_tracked_clients: 10,
            ..RateLimitConfig::default()
        };
        let limiter = RateLimiter::new(config);
        let t0 = Instant::now();

        for i in 0..50 {
            limiter.check_rate_limit_at(&format!("spoof-{i}"), 60, 10, t0);
        }
        assert_eq!(limiter.tracked_clients(), 50);

        limiter.check_rate_limit_at("real", 60, 10, t0 + SUSTAINED_WINDOW);
        assert_eq!(limiter.tracked_clients(), 1);
    }

    #[test]
    fn test_get_limits_prefers_exact_then_longest_prefix() {
        let config = RateLimitConfig::default()
            .with_override("/api", PathLimits::new(30, 5))
            .with_override("/api/projects/", PathLimits::new(4, 1));
        let limiter = RateLimiter::new(config);

        assert_eq!(limiter.get_limits("/api/chat"), PathLimits::new(10, 2));
        assert_eq!(limiter.get_limits("/api/chat/command"), PathLimits::new(10, 2));
        assert_eq!(limiter.get_limits("/api/chat/stream"), PathLimits::new(10, 2));
        assert_eq!(limiter.get_limits("/api/projects/demo"), PathLimits::new(4, 1));
        assert_eq!(limiter.get_limits("/api/review/resolve"), PathLimits::new(30, 5));
        assert_eq!(limiter.get_limits("/api/chatter"), PathLimits::new(30, 5));
        assert_eq!(limiter.get_limits("/status"), PathLimits::new(60, 10));
    }

    #[test]
    fn test_client_id_resolution() {
        let mut headers = HeaderMap::new();
        let peer: SocketAddr = "192.168.1.9:5000".parse().unwrap();

        assert_eq!(client_id(&headers, None), UNKNOWN_CLIENT);
        assert_eq!(client_id(&headers, Some(peer)), "192.168.1.9");

        headers.insert("x-forwarded-for", HeaderValue::from_static(" 10.0.0.1 , 172.16.0.1"));
        assert_eq!(client_id(&headers, Some(peer)), "10.0.0.1");
    }

    #[test]
    fn test_rejection_reported_to_sink() {
        let sink = Arc::new(MemorySink::new());
        let limiter = limiter().with_events(sink.clone());

        limiter.report("10.0.0.1", "/api/chat", 1);
        assert_eq!(
            sink.events(),
            vec![SafetyEvent::RateLimited {
                client_id: "10.0.0.1".to_string(),
                path: "/api/chat".to_string(),
                retry_after: 1,
            }]
        );
    }

    #[test]
    fn test_concurrent_checks_never_exceed_burst() {
        let limiter = Arc::new(limiter());
        let t0 = Instant::now();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || limiter.check_rate_limit_at("shared", 60, 5, t0).allowed)
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|allowed| *allowed)
            .count();
        assert_eq!(admitted, 5);
    }
}

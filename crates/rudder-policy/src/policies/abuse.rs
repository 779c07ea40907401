//! Abuse / rate-limit policy
//!
//! Sliding-window request counting per actor. Every evaluation counts as
//! one request; an actor over the limit is denied until enough of their
//! window ages out.

use crate::error::PolicyError;
use crate::verdict::{Policy, PolicyContext, PolicyDecision};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

/// Per-actor sliding-window rate limiter
#[derive(Debug)]
pub struct AbusePolicy {
    priority: u32,
    max_requests: usize,
    window: Duration,
    history: Mutex<HashMap<String, VecDeque<DateTime<Utc>>>>,
}

impl AbusePolicy {
    /// Default abuse-control priority
    pub const DEFAULT_PRIORITY: u32 = 600;

    /// Limit each actor to `max_requests` per `window`
    #[must_use]
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            priority: Self::DEFAULT_PRIORITY,
            max_requests,
            window,
            history: Mutex::new(HashMap::new()),
        }
    }

    /// Override the evaluation priority
    #[inline]
    #[must_use]
    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }
}

#[async_trait]
impl Policy for AbusePolicy {
    fn id(&self) -> &str {
        "abuse"
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    fn validate(&self) -> Result<(), PolicyError> {
        if self.max_requests == 0 {
            return Err(PolicyError::ValidationFailed(
                "abuse policy max_requests must be positive".to_string(),
            ));
        }
        if self.window <= Duration::zero() {
            return Err(PolicyError::ValidationFailed(
                "abuse policy window must be positive".to_string(),
            ));
        }
        Ok(())
    }

    async fn evaluate(&self, ctx: &PolicyContext) -> Result<PolicyDecision, PolicyError> {
        let now = Utc::now();
        let cutoff = now - self.window;
        let mut history = self.history.lock();
        let requests = history.entry(ctx.actor_id.clone()).or_default();

        while requests.front().is_some_and(|t| *t < cutoff) {
            requests.pop_front();
        }

        if requests.len() >= self.max_requests {
            tracing::warn!(actor = %ctx.actor_id, "rate limit exceeded");
            return Ok(PolicyDecision::deny(format!(
                "actor '{}' exceeded {} requests per {}s",
                ctx.actor_id,
                self.max_requests,
                self.window.num_seconds()
            )));
        }

        requests.push_back(now);
        Ok(PolicyDecision::allow())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verdict::Outcome;

    fn ctx(actor: &str) -> PolicyContext {
        PolicyContext::new(actor, "apply", "operator")
    }

    #[tokio::test]
    async fn allows_under_the_limit() {
        let policy = AbusePolicy::new(3, Duration::minutes(1));
        for _ in 0..3 {
            let decision = policy.evaluate(&ctx("u1")).await.unwrap();
            assert_eq!(decision.outcome, Outcome::Allow);
        }
    }

    #[tokio::test]
    async fn denies_over_the_limit() {
        let policy = AbusePolicy::new(2, Duration::minutes(1));
        policy.evaluate(&ctx("u1")).await.unwrap();
        policy.evaluate(&ctx("u1")).await.unwrap();

        let decision = policy.evaluate(&ctx("u1")).await.unwrap();
        assert_eq!(decision.outcome, Outcome::Deny);
    }

    #[tokio::test]
    async fn actors_are_limited_independently() {
        let policy = AbusePolicy::new(1, Duration::minutes(1));
        policy.evaluate(&ctx("u1")).await.unwrap();

        let other = policy.evaluate(&ctx("u2")).await.unwrap();
        assert_eq!(other.outcome, Outcome::Allow);
    }

    #[test]
    fn zero_limit_fails_validation() {
        let policy = AbusePolicy::new(0, Duration::minutes(1));
        assert!(matches!(
            policy.validate(),
            Err(PolicyError::ValidationFailed(_))
        ));

        let negative = AbusePolicy::new(5, Duration::seconds(-1));
        assert!(negative.validate().is_err());
    }
}

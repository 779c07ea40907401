//! Policy chain
//!
//! Holds registered policies and evaluates them by descending priority
//! (registration order as the stable tiebreak). Every enabled policy is
//! evaluated on every call, so `warnings` and `evaluated_policies` are
//! always complete; there is no short-circuit.

use crate::error::PolicyError;
use crate::verdict::{Outcome, Policy, PolicyContext, PolicyDecision, PolicyVerdict};
use rudder_cache::ResultCache;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug)]
struct Registered {
    policy: Arc<dyn Policy>,
    enabled: bool,
    seq: usize,
}

/// Ordered, pluggable policy evaluators
#[derive(Debug)]
pub struct PolicyChain {
    policies: Vec<Registered>,
    next_seq: usize,
    verdict_cache: Option<ResultCache<String, PolicyVerdict>>,
}

impl PolicyChain {
    /// Empty chain, no verdict caching
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            policies: Vec::new(),
            next_seq: 0,
            verdict_cache: None,
        }
    }

    /// Empty chain with a TTL-bounded verdict cache keyed on
    /// `(actor, operation, resource)`; cleared on any registration change
    #[inline]
    #[must_use]
    pub fn with_verdict_cache(ttl: Duration) -> Self {
        Self {
            verdict_cache: Some(ResultCache::with_ttl(ttl)),
            ..Self::new()
        }
    }

    /// Register a policy
    ///
    /// # Errors
    /// `ValidationFailed` when `policy.validate()` fails or the id is
    /// already registered.
    pub fn register(&mut self, policy: Arc<dyn Policy>) -> Result<(), PolicyError> {
        policy.validate()?;
        if self.policies.iter().any(|r| r.policy.id() == policy.id()) {
            return Err(PolicyError::ValidationFailed(format!(
                "duplicate policy id: {}",
                policy.id()
            )));
        }
        tracing::debug!(policy = policy.id(), priority = policy.priority(), "registered policy");
        self.policies.push(Registered {
            policy,
            enabled: true,
            seq: self.next_seq,
        });
        self.next_seq += 1;
        self.clear_cache();
        Ok(())
    }

    /// Enable a policy
    ///
    /// # Errors
    /// `PolicyNotFound` for an unknown id.
    pub fn enable(&mut self, id: &str) -> Result<(), PolicyError> {
        self.set_enabled(id, true)
    }

    /// Disable a policy; it is skipped by evaluation until re-enabled
    ///
    /// # Errors
    /// `PolicyNotFound` for an unknown id.
    pub fn disable(&mut self, id: &str) -> Result<(), PolicyError> {
        self.set_enabled(id, false)
    }

    fn set_enabled(&mut self, id: &str, enabled: bool) -> Result<(), PolicyError> {
        let registered = self
            .policies
            .iter_mut()
            .find(|r| r.policy.id() == id)
            .ok_or_else(|| PolicyError::PolicyNotFound(id.to_string()))?;
        registered.enabled = enabled;
        // The cached verdicts were computed against a different policy set.
        self.clear_cache();
        Ok(())
    }

    fn clear_cache(&self) {
        if let Some(cache) = &self.verdict_cache {
            cache.clear();
        }
    }

    /// Registered policy ids, evaluation order
    #[must_use]
    pub fn policy_ids(&self) -> Vec<String> {
        self.ordered()
            .into_iter()
            .map(|r| r.policy.id().to_string())
            .collect()
    }

    fn ordered(&self) -> Vec<&Registered> {
        let mut ordered: Vec<&Registered> = self.policies.iter().collect();
        // Descending priority; registration order breaks ties (stable).
        ordered.sort_by_key(|r| (std::cmp::Reverse(r.policy.priority()), r.seq));
        ordered
    }

    /// Evaluate every enabled policy against `ctx`
    ///
    /// The final `allowed` is false when any policy denies, unless a
    /// maximum-priority policy issued an authoritative override (the owner
    /// acting on their own locked resource). Policy-internal errors become
    /// denials.
    pub async fn evaluate(&self, ctx: &PolicyContext) -> PolicyVerdict {
        let cache_key = format!(
            "{}|{}|{}",
            ctx.actor_id,
            ctx.operation,
            ctx.resource_id.as_deref().unwrap_or("")
        );
        if let Some(cache) = &self.verdict_cache {
            if let Some(verdict) = cache.get(&cache_key) {
                return verdict;
            }
        }

        let mut evaluated = Vec::new();
        let mut warnings = Vec::new();
        let mut deny_reasons = Vec::new();
        let mut overridden = false;

        for registered in self.ordered() {
            if !registered.enabled {
                continue;
            }
            let decision = self.run_policy(registered.policy.as_ref(), ctx).await;
            evaluated.push(registered.policy.id().to_string());
            warnings.extend(decision.warnings);
            match decision.outcome {
                Outcome::Allow => {}
                Outcome::Deny => {
                    deny_reasons.push(
                        decision
                            .reason
                            .unwrap_or_else(|| format!("denied by {}", registered.policy.id())),
                    );
                }
                Outcome::AllowOverride => overridden = true,
            }
        }

        let allowed = overridden || deny_reasons.is_empty();
        let reason = if deny_reasons.is_empty() {
            None
        } else {
            Some(deny_reasons.join("; "))
        };
        let verdict = PolicyVerdict {
            allowed,
            reason,
            evaluated_policies: evaluated,
            warnings,
        };

        if let Some(cache) = &self.verdict_cache {
            cache.insert(cache_key, verdict.clone());
        }
        verdict
    }

    /// Evaluate exactly one policy by id
    ///
    /// # Errors
    /// `PolicyNotFound` for an unknown id.
    pub async fn evaluate_single(
        &self,
        id: &str,
        ctx: &PolicyContext,
    ) -> Result<PolicyVerdict, PolicyError> {
        let registered = self
            .policies
            .iter()
            .find(|r| r.policy.id() == id)
            .ok_or_else(|| PolicyError::PolicyNotFound(id.to_string()))?;

        let decision = self.run_policy(registered.policy.as_ref(), ctx).await;
        let allowed = !matches!(decision.outcome, Outcome::Deny);
        Ok(PolicyVerdict {
            allowed,
            reason: decision.reason,
            evaluated_policies: vec![id.to_string()],
            warnings: decision.warnings,
        })
    }

    // Fail-closed wrapper: an evaluation error is a denial, never an allow.
    // An override from anything below the maximum priority is downgraded to
    // a plain allow, so only an owner lock can outrank denials.
    async fn run_policy(&self, policy: &dyn Policy, ctx: &PolicyContext) -> PolicyDecision {
        match policy.evaluate(ctx).await {
            Ok(mut decision) => {
                if decision.outcome == Outcome::AllowOverride
                    && policy.priority() != crate::OWNER_LOCK_PRIORITY
                {
                    tracing::warn!(
                        policy = policy.id(),
                        priority = policy.priority(),
                        "ignoring override from a non-maximum-priority policy"
                    );
                    decision.outcome = Outcome::Allow;
                }
                decision
            }
            Err(e) => {
                tracing::warn!(policy = policy.id(), error = %e, "policy evaluation failed; denying");
                PolicyDecision::deny(format!("policy '{}' failed: {e}", policy.id()))
            }
        }
    }
}

impl Default for PolicyChain {
    fn default() -> Self {
        Self::new()
    }
}

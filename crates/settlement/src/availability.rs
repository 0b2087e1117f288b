//! Rolling-window availability scoring and host status transitions.

use caravel_types::constants::AVAILABILITY_TRUSTED_THRESHOLD;
use caravel_types::HostStatus;

/// Fraction of spot checks passed. `None` when the host has no checks in
/// the window; the caller substitutes the protocol default.
pub fn availability_score(passed: u64, total: u64) -> Option<f64> {
    if total == 0 {
        None
    } else {
        Some(passed as f64 / total as f64)
    }
}

/// The status a score alone would suggest, ignoring the current state.
pub fn recommended_status(score: f64) -> HostStatus {
    if score >= AVAILABILITY_TRUSTED_THRESHOLD {
        HostStatus::Trusted
    } else if score > 0.0 {
        HostStatus::Degraded
    } else {
        HostStatus::Inactive
    }
}

/// Applies the registry's status transition rules.
///
/// The rules are evaluated in this exact order and the first match wins:
///
/// 1. PENDING  → TRUSTED   when score ≥ 0.6
/// 2. DEGRADED → TRUSTED   when score ≥ 0.6
/// 3. TRUSTED  → DEGRADED  when score < 0.6
/// 4. any non-UNBONDING    → INACTIVE when score == 0
///
/// Rule 3 shadowing rule 4 is load-bearing: a trusted host that drops to a
/// zero score lands in DEGRADED, not INACTIVE, and only a later sweep can
/// demote it further. Tests pin this order.
pub fn apply_status_transition(current: HostStatus, score: f64) -> HostStatus {
    if current == HostStatus::Pending && score >= AVAILABILITY_TRUSTED_THRESHOLD {
        return HostStatus::Trusted;
    }
    if current == HostStatus::Degraded && score >= AVAILABILITY_TRUSTED_THRESHOLD {
        return HostStatus::Trusted;
    }
    if current == HostStatus::Trusted && score < AVAILABILITY_TRUSTED_THRESHOLD {
        return HostStatus::Degraded;
    }
    if current != HostStatus::Unbonding && score == 0.0 {
        return HostStatus::Inactive;
    }
    current
}

/// C5 Token Lifecycle: gateway error classification and device
/// deactivation/retry policy. Supersedes the string-heuristic
/// `is_token_invalid_error` check with the authoritative mapping table.
use chrono::{DateTime, Duration as ChronoDuration, Utc};

use crate::models::Device;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenErrorType {
    Invalid,
    Unregistered,
    Expired,
    CredentialError,
    RateLimited,
    ServiceUnavailable,
    Unknown,
}

#[derive(Debug, Clone, Copy)]
pub struct Classification {
    pub error_type: TokenErrorType,
    pub should_deactivate: bool,
    pub should_retry: bool,
    pub retry_after_secs: Option<u64>,
}

/// `classifyFCM(err)`.
pub fn classify_fcm(err: &str) -> Classification {
    let lower = err.to_lowercase();
    if lower.contains("registration-token-not-registered")
        || lower.contains("invalid-registration-token")
    {
        return Classification {
            error_type: TokenErrorType::Unregistered,
            should_deactivate: true,
            should_retry: false,
            retry_after_secs: None,
        };
    }
    if lower.contains("mismatched-credential") || lower.contains("authentication-error") {
        return Classification {
            error_type: TokenErrorType::CredentialError,
            should_deactivate: false,
            should_retry: false,
            retry_after_secs: None,
        };
    }
    if lower.contains("message-rate-exceeded") || lower.contains("device-message-rate-exceeded") {
        return Classification {
            error_type: TokenErrorType::RateLimited,
            should_deactivate: false,
            should_retry: true,
            retry_after_secs: Some(60),
        };
    }
    if lower.contains("server-unavailable") || lower.contains("internal-error") {
        return Classification {
            error_type: TokenErrorType::ServiceUnavailable,
            should_deactivate: false,
            should_retry: true,
            retry_after_secs: Some(30),
        };
    }
    Classification {
        error_type: TokenErrorType::Unknown,
        should_deactivate: false,
        should_retry: true,
        retry_after_secs: None,
    }
}

/// `classifyAPNs(status, reason)`.
pub fn classify_apns(status: u16, reason: Option<&str>) -> Classification {
    match status {
        410 => Classification {
            error_type: TokenErrorType::Unregistered,
            should_deactivate: true,
            should_retry: false,
            retry_after_secs: None,
        },
        400 if reason == Some("BadDeviceToken") => Classification {
            error_type: TokenErrorType::Invalid,
            should_deactivate: true,
            should_retry: false,
            retry_after_secs: None,
        },
        403 => Classification {
            error_type: TokenErrorType::CredentialError,
            should_deactivate: false,
            should_retry: false,
            retry_after_secs: None,
        },
        429 => Classification {
            error_type: TokenErrorType::RateLimited,
            should_deactivate: false,
            should_retry: true,
            retry_after_secs: Some(60),
        },
        500 | 503 => Classification {
            error_type: TokenErrorType::ServiceUnavailable,
            should_deactivate: false,
            should_retry: true,
            retry_after_secs: Some(30),
        },
        _ => Classification {
            error_type: TokenErrorType::Unknown,
            should_deactivate: false,
            should_retry: true,
            retry_after_secs: None,
        },
    }
}

pub enum FailureOutcome {
    Deactivated { reason: &'static str },
    CounterIncremented { failure_count: i32 },
}

/// `handleDeliveryFailure(device, gateway, err)`.
pub fn handle_delivery_failure(device: &mut Device, classification: Classification) -> FailureOutcome {
    if classification.should_deactivate {
        device.is_active = false;
        device.deactivated_at = Some(Utc::now());
        return FailureOutcome::Deactivated {
            reason: "gateway_rejected",
        };
    }

    device.failure_count += 1;
    if device.failure_count >= Device::MAX_FAILURES_BEFORE_DEACTIVATE {
        device.is_active = false;
        device.deactivated_at = Some(Utc::now());
        return FailureOutcome::Deactivated {
            reason: "consecutive_failures",
        };
    }
    FailureOutcome::CounterIncremented {
        failure_count: device.failure_count,
    }
}

/// Resets failure tracking after a successful delivery.
pub fn handle_delivery_success(device: &mut Device, now: DateTime<Utc>) {
    device.failure_count = 0;
    device.last_seen = now;
}

pub struct StaleTokenPolicy {
    pub inactive_days: i64,
    pub delete_after_days: i64,
}

impl Default for StaleTokenPolicy {
    fn default() -> Self {
        Self {
            inactive_days: 30,
            delete_after_days: 90,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupAction {
    None,
    Deactivate,
    HardDelete,
}

/// `cleanupStaleTokens` decision for a single device; the caller applies the
/// action and persists it.
pub fn cleanup_decision(
    device: &Device,
    now: DateTime<Utc>,
    policy: &StaleTokenPolicy,
) -> CleanupAction {
    if device.is_active {
        if now - device.last_seen > ChronoDuration::days(policy.inactive_days) {
            return CleanupAction::Deactivate;
        }
        return CleanupAction::None;
    }

    if let Some(deactivated_at) = device.deactivated_at {
        if now - deactivated_at > ChronoDuration::days(policy.delete_after_days) {
            return CleanupAction::HardDelete;
        }
    }
    CleanupAction::None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_fcm_unregistered_deactivates_without_retry() {
        let c = classify_fcm("registration-token-not-registered");
        assert_eq!(c.error_type, TokenErrorType::Unregistered);
        assert!(c.should_deactivate);
        assert!(!c.should_retry);
    }

    #[test]
    fn classify_fcm_rate_limited_retries_after_60s() {
        let c = classify_fcm("message-rate-exceeded");
        assert_eq!(c.error_type, TokenErrorType::RateLimited);
        assert!(!c.should_deactivate);
        assert_eq!(c.retry_after_secs, Some(60));
    }

    #[test]
    fn classify_apns_410_deactivates() {
        let c = classify_apns(410, None);
        assert_eq!(c.error_type, TokenErrorType::Unregistered);
        assert!(c.should_deactivate);
    }

    #[test]
    fn classify_apns_bad_device_token() {
        let c = classify_apns(400, Some("BadDeviceToken"));
        assert_eq!(c.error_type, TokenErrorType::Invalid);
        assert!(c.should_deactivate);
    }

    #[test]
    fn classify_apns_service_unavailable_retries() {
        let c = classify_apns(503, None);
        assert_eq!(c.error_type, TokenErrorType::ServiceUnavailable);
        assert_eq!(c.retry_after_secs, Some(30));
    }

    #[test]
    fn classify_unknown_defaults_to_retry_without_deadline() {
        let c = classify_fcm("some-unexpected-signal");
        assert_eq!(c.error_type, TokenErrorType::Unknown);
        assert!(c.should_retry);
        assert_eq!(c.retry_after_secs, None);
    }
}

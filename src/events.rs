//! Structured audit logging of license state changes.

use tracing::{info, info_span, warn};

/// License event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LicenseEvent {
    /// License was issued or re-issued
    Issued,
    /// License was bound to a machine
    Bound,
    /// License was validated successfully
    Validated,
    /// License validation was rejected
    ValidationFailed,
    /// License was revoked
    Revoked,
    /// Licenses were enumerated
    Listed,
    /// An admin operation was refused
    AccessDenied,
}

impl std::fmt::Display for LicenseEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LicenseEvent::Issued => "issued",
            LicenseEvent::Bound => "bound",
            LicenseEvent::Validated => "validated",
            LicenseEvent::ValidationFailed => "validation_failed",
            LicenseEvent::Revoked => "revoked",
            LicenseEvent::Listed => "listed",
            LicenseEvent::AccessDenied => "access_denied",
        };
        write!(f, "{}", s)
    }
}

/// Log a license state change event.
///
/// # Arguments
///
/// * `event` - The type of license event
/// * `license_key` - The license key (empty for enumeration)
/// * `details` - Optional additional details about the event
pub fn log_license_event(event: LicenseEvent, license_key: &str, details: Option<&str>) {
    let span = info_span!(
        "license_event",
        event = %event,
        license_key = %license_key,
    );
    let _enter = span.enter();

    match event {
        LicenseEvent::ValidationFailed | LicenseEvent::AccessDenied => {
            if let Some(d) = details {
                warn!(reason = %d, "License event occurred");
            } else {
                warn!("License event occurred");
            }
        }
        _ => {
            if let Some(d) = details {
                info!(details = %d, "License event occurred");
            } else {
                info!("License event occurred");
            }
        }
    }
}

/// Log a license binding with the machine involved.
pub fn log_license_binding_event(event: LicenseEvent, license_key: &str, machine_id: &str) {
    let span = info_span!(
        "license_binding",
        event = %event,
        license_key = %license_key,
        machine_id = %machine_id,
    );
    let _enter = span.enter();

    info!("License binding event occurred");
}

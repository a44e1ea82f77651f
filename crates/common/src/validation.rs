//! Input validation for external identifiers and source URLs.
//!
//! Tenant and camera ids end up as path segments under the storage root, so
//! path separators and '..' are rejected outright.

use anyhow::{anyhow, Result};

/// Maximum length for resource ids (tenant_id, camera_id, sid).
pub const MAX_ID_LENGTH: usize = 256;

/// Maximum length for source URLs.
pub const MAX_URL_LENGTH: usize = 4096;

/// Minimum length for an RTSP URL; the value is otherwise opaque.
pub const MIN_RTSP_URL_LENGTH: usize = 4;

pub fn validate_length(value: &str, max_length: usize, field_name: &str) -> Result<()> {
    if value.len() > max_length {
        return Err(anyhow!(
            "{} exceeds maximum length of {} bytes (got {})",
            field_name,
            max_length,
            value.len()
        ));
    }
    Ok(())
}

pub fn validate_non_empty(value: &str, field_name: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(anyhow!("{} cannot be empty", field_name));
    }
    Ok(())
}

/// Validate a resource id (tenant_id, camera_id).
pub fn validate_id(id: &str, field_name: &str) -> Result<()> {
    validate_non_empty(id, field_name)?;
    validate_length(id, MAX_ID_LENGTH, field_name)?;

    if id.contains("..") || id.contains('/') || id.contains('\\') {
        return Err(anyhow!(
            "{} contains invalid characters (no path separators or '..' allowed)",
            field_name
        ));
    }

    Ok(())
}

/// Validate an RTSP source URL. Treated as opaque beyond shape and length.
pub fn validate_rtsp_url(url: &str, field_name: &str) -> Result<()> {
    validate_non_empty(url, field_name)?;
    validate_length(url, MAX_URL_LENGTH, field_name)?;

    if url.len() < MIN_RTSP_URL_LENGTH {
        return Err(anyhow!(
            "{} must be at least {} characters",
            field_name,
            MIN_RTSP_URL_LENGTH
        ));
    }

    Ok(())
}

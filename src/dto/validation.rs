//! Validation helpers for DTOs.

use validator::ValidationError;

/// Longest accepted controller bridge identifier.
const MAX_DEVICE_ID_LEN: usize = 64;

/// Validates a controller bridge identifier: 1 to 64 ASCII letters, digits, `-` or `_`.
///
/// # Examples
///
/// ```ignore
/// validate_device_id("bridge-1") // Ok
/// validate_device_id("")         // Err - empty
/// validate_device_id("usb hub")  // Err - space
/// ```
pub fn validate_device_id(id: &str) -> Result<(), ValidationError> {
    if id.is_empty() || id.len() > MAX_DEVICE_ID_LEN {
        let mut err = ValidationError::new("device_id_length");
        err.message = Some(
            format!(
                "Device ID must be between 1 and {MAX_DEVICE_ID_LEN} characters (got {})",
                id.len()
            )
            .into(),
        );
        return Err(err);
    }

    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        let mut err = ValidationError::new("device_id_format");
        err.message =
            Some("Device ID must contain only ASCII letters, digits, '-' or '_'".into());
        return Err(err);
    }

    Ok(())
}

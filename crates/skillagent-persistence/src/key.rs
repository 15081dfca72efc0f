use crate::error::{Result, StorageError};

/// Longest accepted session or step id
pub const MAX_KEY_LENGTH: usize = 100;

/// Reject ids that could escape the storage root or collide with separators
pub fn validate_key(component: &str) -> Result<()> {
    let bad = component.is_empty()
        || component.len() > MAX_KEY_LENGTH
        || component == "."
        || component.contains("..")
        || component
            .chars()
            .any(|c| c == '/' || c == '\\' || c == '\0' || c.is_control());

    if bad {
        return Err(StorageError::InvalidKey(component.to_string()));
    }
    Ok(())
}

/// Object key for a step artifact: `{session}/step_{step}.json`
pub fn step_key(session_id: &str, step_id: &str) -> Result<String> {
    validate_key(session_id)?;
    validate_key(step_id)?;
    Ok(format!("{}/step_{}.json", session_id, step_id))
}

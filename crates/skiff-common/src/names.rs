use crate::error::RegistryError;

const MAX_NAME_LEN: usize = 63;

/// Application and model names: `[a-z0-9]([a-z0-9-]*[a-z0-9])?`, max 63 chars.
pub fn validate_name(kind: &str, name: &str) -> Result<(), RegistryError> {
    let bytes = name.as_bytes();
    let valid_char = |c: &u8| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == b'-';

    let ok = !bytes.is_empty()
        && bytes.len() <= MAX_NAME_LEN
        && bytes.iter().all(valid_char)
        && bytes.first() != Some(&b'-')
        && bytes.last() != Some(&b'-');

    if ok {
        Ok(())
    } else {
        Err(RegistryError::InvalidConfig(format!(
            "invalid {kind} name '{name}': must match [a-z0-9]([a-z0-9-]*[a-z0-9])? and be at most {MAX_NAME_LEN} characters"
        )))
    }
}

/// Version ids are free-form but end up in store keys and URL paths.
pub fn validate_version(version: &str) -> Result<(), RegistryError> {
    let ok = !version.is_empty()
        && version.len() <= MAX_NAME_LEN
        && !version.chars().any(|c| c == '/' || c.is_whitespace());

    if ok {
        Ok(())
    } else {
        Err(RegistryError::InvalidConfig(format!(
            "invalid version '{version}': must be 1-{MAX_NAME_LEN} characters without '/' or whitespace"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name() {
        assert!(validate_name("application", "boston").is_ok());
        assert!(validate_name("model", "forest-model-2").is_ok());
        assert!(validate_name("model", "Forest").is_err());
        assert!(validate_name("model", "-forest").is_err());
        assert!(validate_name("model", "forest-").is_err());
        assert!(validate_name("model", "").is_err());
        assert!(validate_name("model", &"a".repeat(64)).is_err());
    }

    #[test]
    fn test_validate_version() {
        assert!(validate_version("1").is_ok());
        assert!(validate_version("v2.0-rc1").is_ok());
        assert!(validate_version("").is_err());
        assert!(validate_version("a/b").is_err());
        assert!(validate_version("a b").is_err());
    }
}

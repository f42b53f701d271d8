use std::borrow::Cow;

use validator::ValidationError;

/// Maximum length of an organization name after trimming
const MAX_ORG_NAME_LENGTH: usize = 255;

/// Organization names must be non-empty after trimming and at most 255 characters.
pub fn validate_org_name(name: &str) -> Result<(), ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        let mut err = ValidationError::new("empty_name");
        err.message = Some(Cow::Borrowed("Organization name cannot be empty"));
        return Err(err);
    }
    if trimmed.chars().count() > MAX_ORG_NAME_LENGTH {
        let mut err = ValidationError::new("name_too_long");
        err.message = Some(Cow::Owned(format!(
            "Organization name must be at most {} characters",
            MAX_ORG_NAME_LENGTH
        )));
        return Err(err);
    }
    Ok(())
}

pub fn validate_contact_email(email: &str) -> Result<(), ValidationError> {
    if !email.contains('@') {
        let mut err = ValidationError::new("invalid_email");
        err.message = Some(Cow::Borrowed("Invalid email address"));
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_org_name() {
        assert!(validate_org_name("Acme").is_ok());
        assert!(validate_org_name("  Acme  ").is_ok());
        assert!(validate_org_name("").is_err());
        assert!(validate_org_name("   ").is_err());
        assert!(validate_org_name(&"a".repeat(255)).is_ok());
        assert!(validate_org_name(&"a".repeat(256)).is_err());
        // Surrounding whitespace does not count towards the limit
        assert!(validate_org_name(&format!("  {}  ", "a".repeat(255))).is_ok());
    }

    #[test]
    fn test_validate_contact_email() {
        assert!(validate_contact_email("a@b.c").is_ok());
        assert!(validate_contact_email("abc").is_err());
    }
}

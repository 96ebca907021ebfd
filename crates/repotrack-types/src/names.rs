//! Repository name and URL validation.
//!
//! Valid repository names:
//! - Must be non-empty and at most [`MAX_NAME_LEN`] characters
//! - Only lowercase ASCII letters, digits, `-`, `_`, `.` and `/`
//! - Must start with a letter or digit
//! - Must not start or end with `/`, nor contain `//` or `..`

use crate::error::TypeError;

/// Longest accepted repository name.
pub const MAX_NAME_LEN: usize = 100;

/// URL schemes a repository may be fetched from.
const ALLOWED_SCHEMES: &[&str] = &["http", "https", "oci", "git"];

fn invalid_name(name: &str, reason: impl Into<String>) -> TypeError {
    TypeError::InvalidName {
        name: name.to_string(),
        reason: reason.into(),
    }
}

/// Validate a repository name, returning `Ok(())` if valid.
///
/// # Examples
///
/// ```
/// use repotrack_types::validate_repository_name;
///
/// assert!(validate_repository_name("acme/charts").is_ok());
/// assert!(validate_repository_name("").is_err());
/// assert!(validate_repository_name("Acme").is_err());
/// ```
pub fn validate_repository_name(name: &str) -> Result<(), TypeError> {
    if name.is_empty() {
        return Err(invalid_name(name, "name must not be empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(invalid_name(
            name,
            format!("name must not exceed {MAX_NAME_LEN} characters"),
        ));
    }

    if let Some(ch) = name.chars().find(|ch| {
        !(ch.is_ascii_lowercase() || ch.is_ascii_digit() || matches!(ch, '-' | '_' | '.' | '/'))
    }) {
        return Err(invalid_name(name, format!("contains forbidden character: {ch:?}")));
    }

    if !name.starts_with(|ch: char| ch.is_ascii_alphanumeric()) {
        return Err(invalid_name(name, "must start with a letter or digit"));
    }
    if name.ends_with('/') {
        return Err(invalid_name(name, "must not end with '/'"));
    }
    if name.contains("//") {
        return Err(invalid_name(name, "must not contain consecutive slashes '//'"));
    }
    if name.contains("..") {
        return Err(invalid_name(name, "must not contain '..'"));
    }

    Ok(())
}

/// Validate a repository URL: a supported scheme followed by a host.
pub fn validate_repository_url(url: &str) -> Result<(), TypeError> {
    let invalid = |reason: &str| TypeError::InvalidUrl {
        url: url.to_string(),
        reason: reason.to_string(),
    };

    let (scheme, rest) = url
        .split_once("://")
        .ok_or_else(|| invalid("missing scheme"))?;
    if !ALLOWED_SCHEMES.contains(&scheme) {
        return Err(invalid("unsupported scheme"));
    }

    let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host = host.rsplit('@').next().unwrap_or_default();
    if host.is_empty() || host.starts_with(':') {
        return Err(invalid("missing host"));
    }
    if url.chars().any(char::is_whitespace) {
        return Err(invalid("must not contain whitespace"));
    }

    Ok(())
}

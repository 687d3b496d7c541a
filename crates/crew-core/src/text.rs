//! Text utilities: name sanitization for filesystem use and message
//! content validation.

/// Default maximum message content size in bytes (1 MiB).
pub const DEFAULT_MAX_CONTENT_BYTES: usize = 1_048_576;

/// Sanitize a team or teammate name so it is safe as a filename component.
///
/// Rejects empty names and the special names `.` / `..`. Any character that
/// is not alphanumeric, hyphen, or underscore is replaced with an
/// underscore.
///
/// # Errors
///
/// Returns a human-readable message when the name cannot be used at all.
pub fn sanitize_name(name: &str) -> Result<String, String> {
    if name.is_empty() {
        return Err("name must not be empty".to_string());
    }
    if name == "." || name == ".." {
        return Err(format!("name is not allowed: {name}"));
    }
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    Ok(sanitized)
}

/// Validate message content before delivery.
///
/// Null bytes corrupt the newline-delimited JSON inbox files, and oversized
/// payloads belong in the workspace, not in an inbox.
///
/// # Errors
///
/// Returns a human-readable message on validation failure.
pub fn validate_content(text: &str, max_bytes: usize) -> Result<(), String> {
    if text.contains('\0') {
        return Err("content contains null bytes (\\0) which are not allowed".to_string());
    }
    if text.len() > max_bytes {
        return Err(format!(
            "content size ({} bytes) exceeds maximum allowed ({} bytes)",
            text.len(),
            max_bytes,
        ));
    }
    Ok(())
}

/// Truncate `text` to at most `max_chars` Unicode scalar values, appending
/// `suffix` if truncation occurred.
pub fn truncate_chars(text: &str, max_chars: usize, suffix: &str) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => {
            let mut result = text[..byte_idx].to_string();
            result.push_str(suffix);
            result
        }
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_passes_clean_names() {
        assert_eq!(sanitize_name("alice").unwrap(), "alice");
        assert_eq!(sanitize_name("ci-fix_2").unwrap(), "ci-fix_2");
    }

    #[test]
    fn sanitize_replaces_path_characters() {
        let out = sanitize_name("../../etc/passwd").unwrap();
        assert!(!out.contains('/'));
        assert!(!out.contains('.'));
        assert_eq!(out, "______etc_passwd");
    }

    #[test]
    fn sanitize_rejects_empty_and_dots() {
        assert!(sanitize_name("").is_err());
        assert!(sanitize_name(".").is_err());
        assert!(sanitize_name("..").is_err());
    }

    #[test]
    fn sanitize_replaces_spaces() {
        assert_eq!(sanitize_name("my agent!").unwrap(), "my_agent_");
    }

    #[test]
    fn validate_accepts_plain_text() {
        assert!(validate_content("hello world", DEFAULT_MAX_CONTENT_BYTES).is_ok());
    }

    #[test]
    fn validate_rejects_null_bytes() {
        let err = validate_content("a\0b", DEFAULT_MAX_CONTENT_BYTES).unwrap_err();
        assert!(err.contains("null bytes"));
    }

    #[test]
    fn validate_rejects_oversized_content() {
        let big = "x".repeat(32);
        let err = validate_content(&big, 16).unwrap_err();
        assert!(err.contains("exceeds maximum"));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("hello world", 5, "..."), "hello...");
        assert_eq!(truncate_chars("中文测试", 2, ""), "中文");
        assert_eq!(truncate_chars("short", 10, "..."), "short");
    }
}

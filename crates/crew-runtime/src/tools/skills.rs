//! Skill loading: domain-knowledge documents surfaced as tool results.
//!
//! A skill is a markdown file at `<workspace>/skills/<name>.md`. The
//! runtime returns the raw text; there is no semantic coupling beyond
//! handing the blob back to the model.

use crate::error::RuntimeError;
use agent_crew_core::text::sanitize_name;
use std::path::Path;

/// Load a named skill document.
///
/// # Errors
///
/// `InvalidInput` for unknown skills; the message lists what is available.
pub fn load_skill(workspace_root: &Path, name: &str) -> Result<String, RuntimeError> {
    let safe = sanitize_name(name).map_err(RuntimeError::InvalidInput)?;
    let skills_dir = workspace_root.join("skills");
    let path = skills_dir.join(format!("{safe}.md"));

    match std::fs::read_to_string(&path) {
        Ok(content) => Ok(content),
        Err(_) => {
            let available = list_skills(&skills_dir);
            let listing = if available.is_empty() {
                "none".to_string()
            } else {
                available.join(", ")
            };
            Err(RuntimeError::InvalidInput(format!(
                "unknown skill '{name}'. Available skills: {listing}"
            )))
        }
    }
}

fn list_skills(skills_dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(skills_dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .flatten()
        .filter_map(|entry| {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("md") {
                path.file_stem().map(|s| s.to_string_lossy().into_owned())
            } else {
                None
            }
        })
        .collect();
    names.sort();
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn loads_existing_skill() {
        let dir = TempDir::new().unwrap();
        let skills = dir.path().join("skills");
        std::fs::create_dir_all(&skills).unwrap();
        std::fs::write(skills.join("code-review.md"), "# Review checklist\n").unwrap();

        let content = load_skill(dir.path(), "code-review").unwrap();
        assert!(content.contains("Review checklist"));
    }

    #[test]
    fn unknown_skill_lists_available() {
        let dir = TempDir::new().unwrap();
        let skills = dir.path().join("skills");
        std::fs::create_dir_all(&skills).unwrap();
        std::fs::write(skills.join("deploy.md"), "x").unwrap();
        std::fs::write(skills.join("triage.md"), "y").unwrap();

        let err = load_skill(dir.path(), "ghost").unwrap_err();
        let text = err.to_string();
        assert!(text.contains("unknown skill 'ghost'"));
        assert!(text.contains("deploy, triage"));
    }

    #[test]
    fn missing_skills_dir_reports_none() {
        let dir = TempDir::new().unwrap();
        let err = load_skill(dir.path(), "anything").unwrap_err();
        assert!(err.to_string().contains("Available skills: none"));
    }

    #[test]
    fn skill_names_are_sanitized() {
        let dir = TempDir::new().unwrap();
        let skills = dir.path().join("skills");
        std::fs::create_dir_all(&skills).unwrap();
        std::fs::write(skills.join("secret.md"), "hidden").unwrap();

        // Traversal characters are flattened, so this misses.
        assert!(load_skill(dir.path(), "../skills/secret").is_err());
    }
}

use crate::error::{Error, Result};
use std::fs;
use std::path::Path;
use tera::Tera;

/// Maximum template file size (1MB)
const MAX_TEMPLATE_SIZE: u64 = 1024 * 1024;

/// Variables a README prompt template must use
const REQUIRED_VARIABLES: &[&str] = &["summaries"];

/// Optional but commonly used variables
const OPTIONAL_VARIABLES: &[&str] = &["repo_name", "summary_count"];

/// Validates user supplied README prompt templates
pub(crate) struct TemplateValidator;

impl TemplateValidator {
    /// Validates an external template file and returns its source.
    ///
    /// Performs the following checks:
    /// 1. File exists and is a regular file
    /// 2. File size is within limits
    /// 3. Template syntax is valid (can be compiled by Tera)
    /// 4. Template uses the required variables
    ///
    /// # Errors
    ///
    /// Returns an error if any check fails.
    pub(crate) fn validate_template(path: &Path) -> Result<String> {
        if !path.exists() {
            return Err(Error::io(
                path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "Template file not found"),
            ));
        }

        if !path.is_file() {
            return Err(Error::template_validation(
                path.to_string_lossy(),
                "Path is not a file",
            ));
        }

        let metadata = fs::metadata(path).map_err(|e| Error::io(path, e))?;
        if metadata.len() > MAX_TEMPLATE_SIZE {
            return Err(Error::template_validation(
                path.to_string_lossy(),
                format!(
                    "Template file too large: {} bytes (max: {} bytes)",
                    metadata.len(),
                    MAX_TEMPLATE_SIZE
                ),
            ));
        }

        let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;

        if content.trim().is_empty() {
            return Err(Error::template_validation(
                path.to_string_lossy(),
                "Template file is empty",
            ));
        }

        let mut temp_tera = Tera::default();
        temp_tera
            .add_raw_template("validation", &content)
            .map_err(|e| {
                Error::template_validation(
                    path.to_string_lossy(),
                    format!("Template syntax error: {e}"),
                )
            })?;

        Self::check_required_variables(&content, path)?;
        Self::check_optional_variables(&content);

        Ok(content)
    }

    /// Searches for variable names in the template source.
    ///
    /// This is a heuristic and may produce false positives, but catches
    /// templates that forget to embed the batch summaries.
    fn check_required_variables(content: &str, path: &Path) -> Result<()> {
        let missing: Vec<&str> = REQUIRED_VARIABLES
            .iter()
            .filter(|var| !uses_variable(content, var))
            .copied()
            .collect();

        if !missing.is_empty() {
            return Err(Error::template_validation(
                path.to_string_lossy(),
                format!(
                    "Template may be missing required variables: {}. \
                    The README template must embed {{{{ summaries }}}}.",
                    missing.join(", ")
                ),
            ));
        }

        Ok(())
    }

    fn check_optional_variables(content: &str) {
        for var in OPTIONAL_VARIABLES {
            if !uses_variable(content, var) {
                tracing::debug!("Template does not use optional variable: {}", var);
            }
        }
    }
}

fn uses_variable(content: &str, var: &str) -> bool {
    let patterns = [
        format!("{{{{ {var}"),
        format!("{{{{{var}"),
        format!("in {var}"),
        format!("if {var}"),
    ];

    patterns.iter().any(|pattern| content.contains(pattern.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    #[test]
    fn test_validate_valid_template() {
        let temp = assert_fs::TempDir::new().unwrap();
        let template_file = temp.child("readme.tera");
        template_file
            .write_str("Write a README for {{ repo_name }}.\n\n{{ summaries }}")
            .unwrap();

        let content = TemplateValidator::validate_template(template_file.path()).unwrap();
        assert!(content.contains("{{ summaries }}"));
    }

    #[test]
    fn test_validate_nonexistent_file() {
        let result = TemplateValidator::validate_template(Path::new("/nonexistent/template.tera"));
        assert!(result.unwrap_err().is_io());
    }

    #[test]
    fn test_validate_empty_template() {
        let temp = assert_fs::TempDir::new().unwrap();
        let template_file = temp.child("empty.tera");
        template_file.write_str("   \n  \n  ").unwrap();

        let result = TemplateValidator::validate_template(template_file.path());
        assert!(result.unwrap_err().to_string().contains("empty"));
    }

    #[test]
    fn test_validate_syntax_error() {
        let temp = assert_fs::TempDir::new().unwrap();
        let template_file = temp.child("invalid.tera");
        template_file
            .write_str("{{ summaries }}{% if condition %}\nUnclosed if")
            .unwrap();

        let result = TemplateValidator::validate_template(template_file.path());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Template syntax error"));
    }

    #[test]
    fn test_validate_missing_summaries() {
        let temp = assert_fs::TempDir::new().unwrap();
        let template_file = temp.child("incomplete.tera");
        template_file.write_str("README for {{ repo_name }}").unwrap();

        let result = TemplateValidator::validate_template(template_file.path());
        let err_msg = result.unwrap_err().to_string();
        assert!(err_msg.contains("missing required variables"));
    }

    #[test]
    fn test_validate_file_too_large() {
        let temp = assert_fs::TempDir::new().unwrap();
        let template_file = temp.child("large.tera");

        let large_content = "x".repeat((MAX_TEMPLATE_SIZE + 1) as usize);
        template_file.write_str(&large_content).unwrap();

        let result = TemplateValidator::validate_template(template_file.path());
        assert!(result.unwrap_err().to_string().contains("too large"));
    }
}

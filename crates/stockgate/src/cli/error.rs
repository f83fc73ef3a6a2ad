//! Helpful error types for CLI commands
//!
//! Every error includes:
//! - What went wrong
//! - Context about the situation
//! - Suggestions for how to fix it

use std::fmt;
use std::path::Path;
use stockgate_mediation::MediationError;

/// An error with helpful context and suggestions
#[derive(Debug)]
pub struct HelpfulError {
    pub message: String,
    pub context: Option<String>,
    pub suggestions: Vec<String>,
}

impl HelpfulError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: None,
            suggestions: Vec::new(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_suggestions(
        mut self,
        suggestions: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.suggestions.extend(suggestions.into_iter().map(|s| s.into()));
        self
    }

    // === Common error constructors ===

    /// No user/company/role to act as
    pub fn missing_identity(field: &str) -> Self {
        Self::new(format!("No {} configured", field))
            .with_context("Every command acts on behalf of a user in a company with a role")
            .with_suggestions([
                format!("TRY: Pass --{} on the command line", field),
                format!("TRY: Export STOCKGATE_{}", field.to_ascii_uppercase()),
                format!("TRY: Set [identity] {} in ~/.stockgate/config.toml", field),
            ])
    }

    pub fn unknown_role(role: &str) -> Self {
        Self::new(format!("Unknown role: '{}'", role))
            .with_suggestion("TRY: One of owner, admin, manager, technician (tech), viewer")
    }

    pub fn file_not_found(path: &Path) -> Self {
        Self::new(format!("File not found: {}", path.display()))
            .with_context("The specified file does not exist")
            .with_suggestions([
                format!("TRY: Check if the file exists: ls -la {}", path.display()),
                format!(
                    "TRY: Look for similar files: ls {}",
                    path.parent()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| ".".to_string())
                ),
            ])
    }

    pub fn cannot_read_file(path: &Path, reason: &str) -> Self {
        Self::new(format!("Cannot read file: {}", path.display()))
            .with_context(reason.to_string())
            .with_suggestion(format!("TRY: Check file permissions: ls -la {}", path.display()))
    }

    pub fn json_parse_error(path: &Path, details: &str) -> Self {
        Self::new(format!("JSON parse error: {}", details))
            .with_context(format!("Failed to parse JSON file: {}", path.display()))
            .with_suggestion("TRY: Validate the JSON: cat FILE | python -m json.tool")
    }

    pub fn missing_api_key() -> Self {
        Self::new("No model API key configured")
            .with_context("The chat command and model extraction call an OpenAI-compatible endpoint")
            .with_suggestions([
                "TRY: export STOCKGATE_API_KEY=...",
                "TRY: Point --model-url at a local server that needs no key",
            ])
    }

    /// Translate a pipeline error, adding the next step an operator would take.
    pub fn from_mediation(err: &MediationError) -> Self {
        let base = Self::new(err.to_string());
        match err {
            MediationError::Authorization(_) => base
                .with_context("Your role does not allow this operation")
                .with_suggestion("TRY: Ask a manager or owner to run it"),
            MediationError::InvalidTransition { action_id, .. } => base
                .with_context("Someone else already decided this action")
                .with_suggestion(format!("TRY: stockgate actions show {}", action_id)),
            MediationError::NotFound(_) => base
                .with_suggestion("TRY: Check the id; ids are scoped to your company"),
            MediationError::AmbiguousCatalog { .. } => base
                .with_context("The catalog has duplicate entries the matcher cannot tell apart")
                .with_suggestions([
                    "TRY: stockgate catalog list --search <name>",
                    "TRY: Rename or give SKUs to the duplicates and import again",
                ]),
            MediationError::UpstreamModel(_) => base
                .with_context("The model endpoint did not answer usefully")
                .with_suggestion("TRY: stockgate config (check model URL and key)"),
            MediationError::Storage(_) => base
                .with_suggestion("TRY: stockgate config (check the database path)"),
            MediationError::Validation(_) | MediationError::Execution(_) => base,
        }
    }
}

impl fmt::Display for HelpfulError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ERROR: {}", self.message)?;

        if let Some(ctx) = &self.context {
            writeln!(f, "CONTEXT: {}", ctx)?;
        }

        if !self.suggestions.is_empty() {
            writeln!(f)?;
            for suggestion in &self.suggestions {
                writeln!(f, "  {}", suggestion)?;
            }
        }

        Ok(())
    }
}

impl std::error::Error for HelpfulError {}

/// Wrap a pipeline error for display.
pub fn mediation(err: MediationError) -> anyhow::Error {
    HelpfulError::from_mediation(&err).into()
}

/// Print an error as a JSON object on stdout (for `--json` callers).
pub fn print_json_error(err: &anyhow::Error) {
    let value = match err.downcast_ref::<HelpfulError>() {
        Some(helpful) => serde_json::json!({
            "error": helpful.message,
            "context": helpful.context,
            "suggestions": helpful.suggestions,
        }),
        None => serde_json::json!({ "error": format!("{:#}", err) }),
    };
    println!("{}", value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockgate_db::{ActionId, ActionStatus};

    #[test]
    fn test_helpful_error_display() {
        let err = HelpfulError::new("Something went wrong")
            .with_context("While confirming")
            .with_suggestion("Try again");

        let display = format!("{}", err);
        assert!(display.contains("ERROR: Something went wrong"));
        assert!(display.contains("CONTEXT: While confirming"));
        assert!(display.contains("Try again"));
    }

    #[test]
    fn test_conflict_points_at_show() {
        let err = HelpfulError::from_mediation(&MediationError::InvalidTransition {
            action_id: ActionId::from_string("a-1"),
            from: ActionStatus::Executed,
            attempted: ActionStatus::Confirmed,
        });
        assert!(format!("{}", err).contains("stockgate actions show a-1"));
    }

    #[test]
    fn test_missing_identity_names_env() {
        let display = format!("{}", HelpfulError::missing_identity("company"));
        assert!(display.contains("STOCKGATE_COMPANY"));
    }
}

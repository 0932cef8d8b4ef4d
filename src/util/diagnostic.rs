//! User-friendly diagnostic messages.
//!
//! Every error shown to the user names the root cause, lists every offending
//! path, and suggests a fix where one exists.

/// Common suggestion messages for consistent error handling.
pub mod suggestions {
    /// Suggestion when a package directory has no manifest.
    pub const NO_MANIFEST: &str = "Add a manifest.json at the package root";

    /// Suggestion when an archive has neither a root manifest nor a wrapper directory.
    pub const ARCHIVE_LAYOUT: &str =
        "Put manifest.json at the archive root, or inside exactly one top-level directory";
}

/// A diagnostic message with optional suggestions.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Primary message
    pub message: String,
    /// Stable diagnostic code (e.g. `uapf::import::conflict`)
    pub code: Option<String>,
    /// Additional context lines
    pub context: Vec<String>,
    /// Suggested fixes
    pub suggestions: Vec<String>,
}

impl Diagnostic {
    /// Create a new error diagnostic.
    pub fn error(message: impl Into<String>) -> Self {
        Diagnostic {
            message: message.into(),
            code: None,
            context: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    /// Attach a diagnostic code.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Add context to the diagnostic.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context.push(context.into());
        self
    }

    /// Add a suggestion for fixing the issue.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// Format the diagnostic for terminal output.
    pub fn format(&self, color: bool) -> String {
        let mut output = String::new();

        let prefix = if color { "\x1b[1;31merror\x1b[0m" } else { "error" };

        match &self.code {
            Some(code) => output.push_str(&format!("{}[{}]: {}\n", prefix, code, self.message)),
            None => output.push_str(&format!("{}: {}\n", prefix, self.message)),
        }

        for ctx in &self.context {
            output.push_str(&format!("  = {}\n", ctx));
        }

        if !self.suggestions.is_empty() {
            output.push('\n');
            let help_prefix = if color {
                "\x1b[1;32mhelp\x1b[0m"
            } else {
                "help"
            };
            output.push_str(&format!("{}: consider:\n", help_prefix));
            for (i, suggestion) in self.suggestions.iter().enumerate() {
                output.push_str(&format!("  {}. {}\n", i + 1, suggestion));
            }
        }

        output
    }
}

/// Print a diagnostic to stderr.
pub fn emit(diagnostic: &Diagnostic, color: bool) {
    eprint!("{}", diagnostic.format(color));
}

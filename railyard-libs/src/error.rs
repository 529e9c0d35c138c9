//! Error types for railyard.
//!
//! Every fallible operation in the library returns [`AppError`]. Lookup and
//! validation failures carry enough context (the offending name, the known
//! alternatives, every violated option) for a user to fix a configuration
//! file from a single report.

use thiserror::Error;

/// Main error type for railyard.
#[derive(Error, Debug)]
pub enum AppError {
    /// A component's options failed schema validation.
    ///
    /// All violations are collected before this is raised.
    ///
    /// # Example
    /// ```
    /// use railyard_libs::AppError;
    /// let error = AppError::InvalidConfiguration {
    ///     kind: "Selection".to_string(),
    ///     name: "maglim_25.5".to_string(),
    ///     violations: vec!["cuts: expected a mapping, got a string".to_string()],
    /// };
    /// ```
    #[error("Invalid {kind} '{name}': {}", .violations.join("; "))]
    InvalidConfiguration {
        kind: String,
        name: String,
        violations: Vec<String>,
    },

    /// A `{placeholder}` in a template had no binding.
    #[error("Missing interpolant '{name}' in template '{template}'")]
    MissingInterpolant { name: String, template: String },

    /// Bindings reference each other in a loop, or nest too deeply.
    #[error("Cyclic template definition: {}", .chain.join(" -> "))]
    CyclicTemplate { chain: Vec<String> },

    /// An iteration variable was bound to something other than a sequence.
    #[error("Invalid iteration variable '{name}': {reason}")]
    InvalidIterationVar { name: String, reason: String },

    /// A registry lookup failed.
    #[error("Unknown {category} '{name}'{}", did_you_mean(.suggestions))]
    UnknownComponent {
        category: String,
        name: String,
        suggestions: Vec<String>,
    },

    /// A registry insert collided with an existing name.
    #[error("{category} '{name}' is already defined")]
    DuplicateComponent { category: String, name: String },

    /// A flavor lookup failed.
    #[error("Unknown flavor '{name}', known flavors are [{}]", .known.join(", "))]
    UnknownFlavor { name: String, known: Vec<String> },

    /// A flavor was added under a name already in use.
    #[error("Flavor '{0}' is already defined")]
    DuplicateFlavor(String),

    /// An algorithm reference (role or implementation) could not be resolved.
    ///
    /// # Example
    /// ```
    /// use railyard_libs::AppError;
    /// let error = AppError::AlgorithmNotFound("Reducer 'roman_rubin' has no role 'Inform'".to_string());
    /// ```
    #[error("Algorithm not found: {0}")]
    AlgorithmNotFound(String),

    /// An algorithm implementation failed while running.
    #[error("Algorithm '{algorithm}' failed: {message}")]
    AlgorithmFailed { algorithm: String, message: String },

    /// Configuration error - malformed documents, unknown categories, include cycles
    ///
    /// # Example
    /// ```
    /// use railyard_libs::AppError;
    /// let error = AppError::ConfigError("Unknown category 'Catalogz'".to_string());
    /// ```
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// IO error wrapper
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// YAML parsing error
    ///
    /// Wraps serde_yaml errors for config file parsing
    #[error("YAML parsing error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// JSON conversion error
    ///
    /// Raised when a validated option tree does not fit its typed component
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

fn did_you_mean(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        String::new()
    } else {
        format!(", did you mean: {}?", suggestions.join(", "))
    }
}

//! Rich diagnostic error types for the strata engine.
//!
//! Each area defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes and help text so callers know exactly what went
//! wrong and how to fix it.
//!
//! Most failure modes of the engine are deliberately *not* errors: malformed
//! facts are reported per fact inside an [`IngestReport`](crate::engine::IngestReport),
//! queries against layers that are not derived yet return nothing, and
//! blocked re-entrant passes are reported as skipped outcomes.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the strata engine.
#[derive(Debug, Error, Diagnostic)]
pub enum StrataError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Fact(#[from] FactError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Export(#[from] ExportError),
}

// ---------------------------------------------------------------------------
// Fact errors
// ---------------------------------------------------------------------------

/// Why a single submitted fact was rejected before insertion.
#[derive(Debug, Clone, PartialEq, Error, Diagnostic)]
pub enum FactError {
    #[error("malformed fact: missing subject")]
    #[diagnostic(
        code(strata::fact::missing_subject),
        help("Every fact needs a non-blank subject label.")
    )]
    MissingSubject,

    #[error("malformed fact: missing predicate")]
    #[diagnostic(
        code(strata::fact::missing_predicate),
        help("Every fact needs a non-blank predicate label.")
    )]
    MissingPredicate,

    #[error("malformed fact: missing object")]
    #[diagnostic(
        code(strata::fact::missing_object),
        help("Every fact needs a non-blank object label.")
    )]
    MissingObject,

    #[error("malformed fact: weight {weight} is not a finite number")]
    #[diagnostic(
        code(strata::fact::invalid_weight),
        help("Fact weights must be finite. Omit the weight to use the default of 1.0.")
    )]
    InvalidWeight { weight: f64 },
}

// ---------------------------------------------------------------------------
// Graph errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    #[error("cannot place layer {level}: only {depth} layer(s) exist")]
    #[diagnostic(
        code(strata::graph::layer_gap),
        help(
            "Layers are indexed contiguously from 0. A layer can replace an existing \
             level or be appended directly after the deepest one."
        )
    )]
    LayerGap { level: usize, depth: usize },
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read engine config: {path}")]
    #[diagnostic(
        code(strata::config::read),
        help("Ensure the config file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse engine config: {path}: {message}")]
    #[diagnostic(
        code(strata::config::parse),
        help("Check the TOML syntax. Unknown keys are rejected; omitted keys take their defaults.")
    )]
    Parse { path: String, message: String },

    #[error("failed to write engine config: {path}")]
    #[diagnostic(
        code(strata::config::write),
        help("Ensure you have write permissions to the target directory.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid value for `{field}`: {message}")]
    #[diagnostic(code(strata::config::invalid), help("{message}"))]
    Invalid { field: &'static str, message: String },
}

// ---------------------------------------------------------------------------
// Engine errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum EngineError {
    #[error("failed to spawn the curiosity daemon thread")]
    #[diagnostic(
        code(strata::engine::daemon_spawn),
        help("The operating system refused to create a new thread. Check process limits.")
    )]
    DaemonSpawn {
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Export errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ExportError {
    #[error("failed to encode snapshot as JSON: {message}")]
    #[diagnostic(
        code(strata::export::json),
        help("This indicates a non-finite weight slipped into a layer. File a bug report.")
    )]
    Json { message: String },
}

/// Convenience alias for functions returning strata results.
pub type StrataResult<T> = std::result::Result<T, StrataError>;

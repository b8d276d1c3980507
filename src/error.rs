//! Rich diagnostic error types for ontoclass.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source chains so callers know exactly what
//! went wrong and how to fix it.
//!
//! Note that these are *Rust* errors: failures of the library or the CLI around it.
//! Problems discovered while classifying (oracle drift, filtered candidates) are
//! reported as data inside a response as [`crate::classify::Issue`] records.

use miette::Diagnostic;
use thiserror::Error;

use crate::oracle::OracleError;

/// Top-level error type for ontoclass.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text, sources) through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum OntoError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Taxonomy(#[from] TaxonomyError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Request(#[from] RequestError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Oracle(#[from] OracleError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Taxonomy errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum TaxonomyError {
    #[error("class not found in snapshot: {id}")]
    #[diagnostic(
        code(ontoclass::taxonomy::unknown_class),
        help(
            "The id is not declared in the snapshot's oClasses. \
             Check the spelling, or list available roots with `ontoclass roots`."
        )
    )]
    UnknownClass { id: String },

    #[error("snapshot has no root classes")]
    #[diagnostic(
        code(ontoclass::taxonomy::no_roots),
        help(
            "No class is flagged isRoot and every class has an incoming subclass edge. \
             Flag the top-level classes with `isRoot: true` or break the cycle."
        )
    )]
    NoRoots,
}

// ---------------------------------------------------------------------------
// Request errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum RequestError {
    #[error("scope \"{scope}\" requires at least one concept")]
    #[diagnostic(
        code(ontoclass::request::missing_concepts),
        help("Provide concepts[], or use scope \"event\" to classify only the event title.")
    )]
    MissingConcepts { scope: String },

    #[error("scope \"{scope}\" requires an eventId")]
    #[diagnostic(
        code(ontoclass::request::missing_event_id),
        help("Set eventId, or use scope \"concept\" to classify only the concepts.")
    )]
    MissingEventId { scope: String },

    #[error("scope \"{scope}\" requires eventTitle or eventNormalizedTextEn")]
    #[diagnostic(
        code(ontoclass::request::missing_event_text),
        help("The event can only be classified from its title or its normalized English text.")
    )]
    MissingEventText { scope: String },

    #[error("propose request has no competency questions")]
    #[diagnostic(
        code(ontoclass::request::empty_cqs),
        help("Provide at least one entry in cqs[].")
    )]
    EmptyQuestions,

    #[error("failed to read input file: {path}")]
    #[diagnostic(
        code(ontoclass::request::read),
        help("Ensure the file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse input file {path}: {message}")]
    #[diagnostic(
        code(ontoclass::request::parse),
        help("The file must be a JSON document using camelCase field names.")
    )]
    Parse { path: String, message: String },
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config: {path}")]
    #[diagnostic(
        code(ontoclass::config::read),
        help("Ensure the config file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {path}: {message}")]
    #[diagnostic(
        code(ontoclass::config::parse),
        help("Check the TOML syntax in the config file.")
    )]
    Parse { path: String, message: String },

    #[error("invalid configuration: {message}")]
    #[diagnostic(
        code(ontoclass::config::invalid),
        help("Check the [oracle] and [selection] sections. {message}")
    )]
    Invalid { message: String },
}

/// Convenience alias for functions returning ontoclass results.
pub type OntoResult<T> = std::result::Result<T, OntoError>;

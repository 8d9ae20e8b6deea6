//! # Error Types — Structured Error Hierarchy
//!
//! Defines the error types used throughout Wayline. All errors use
//! `thiserror` for derive-based `Display` and `Error` implementations.
//!
//! ## Design
//!
//! - Schema errors name the offending segment path.
//! - Navigation precondition errors are raised synchronously, before any
//!   router slot is touched. Callers guard with the matching predicate
//!   (`able_to_back`, `is_idle`, ...) first.
//! - Snapshot errors carry the index or path that failed to decode.

use thiserror::Error;

/// Top-level error type for Wayline.
#[derive(Error, Debug)]
pub enum RouterError {
    /// The schema or a path built against it is invalid.
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// A state value has the wrong shape.
    #[error("state error: {0}")]
    State(#[from] StateError),

    /// A navigation precondition does not hold.
    #[error("navigation error: {0}")]
    Navigation(#[from] NavigationError),

    /// A snapshot could not be encoded or decoded.
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
}

/// Errors in the author-provided schema or in paths resolved against it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// Two siblings share the same segment name.
    #[error("duplicate segment {name:?} under {parent:?}")]
    DuplicateSegment {
        /// Path of the parent segment (empty for roots).
        parent: Vec<String>,
        /// The repeated name.
        name: String,
    },

    /// A path does not resolve to a schema node.
    #[error("unknown segment path {path:?}")]
    UnknownSegment {
        /// The path that failed to resolve.
        path: Vec<String>,
    },

    /// A segment declares no state and no override was supplied.
    #[error("segment {path:?} declares no state and none was supplied")]
    MissingState {
        /// Path of the segment.
        path: Vec<String>,
    },
}

/// Errors in state values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// A state resolved to something other than a JSON object.
    #[error("state for {path:?} must be an object, got {found}")]
    NotAnObject {
        /// Path of the segment the state belongs to.
        path: Vec<String>,
        /// JSON type name of the offending value.
        found: &'static str,
    },
}

/// Navigation precondition failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NavigationError {
    /// The router has no active entry yet (no reset or restore happened).
    #[error("router has no active entry")]
    NoActiveEntry,

    /// `back` was requested with no previous target.
    #[error("no previous entry to navigate back to")]
    NoPreviousEntry,

    /// `forward` was requested with no next target.
    #[error("no next entry to navigate forward to")]
    NoNextEntry,

    /// A switch was requested while a plain transition is in flight.
    #[error("a transition is in flight")]
    TransitionInFlight,

    /// A switch was requested while another switch is in flight.
    #[error("a switch is in flight")]
    SwitchInFlight,

    /// A switch was started without a state and the router has no default.
    #[error("no switching state supplied and no default configured")]
    MissingSwitchingState,

    /// A switching handle outlived the switch it controls.
    #[error("switching handle no longer controls the switching slot")]
    StaleSwitch,

    /// Restore was requested while a transition or switch is in flight.
    #[error("router is not idle")]
    NotIdle,

    /// The pending-navigation queue is full.
    #[error("navigation queue is full (limit {limit})")]
    QueueFull {
        /// Configured queue bound.
        limit: usize,
    },

    /// The router owning this handle has been dropped.
    #[error("router has been dropped")]
    RouterDropped,
}

/// Snapshot encode/decode failures.
#[derive(Error, Debug)]
pub enum SnapshotError {
    /// A state index points past the end of the objects table.
    #[error("state index {index} is out of range (objects: {len})")]
    MissingObject {
        /// The offending index.
        index: usize,
        /// Length of the objects table.
        len: usize,
    },

    /// An entry of the objects table is not a JSON object.
    #[error("snapshot object {index} is not an object")]
    NotAnObject {
        /// Index into the objects table.
        index: usize,
    },

    /// A snapshot path does not exist in the schema.
    #[error("snapshot path {path:?} does not exist in the schema")]
    UnknownSegment {
        /// The path that failed to resolve.
        path: Vec<String>,
    },

    /// A snapshot entry has a different number of states than segments.
    #[error("snapshot entry {path:?} has {states} states for {segments} segments")]
    StateCountMismatch {
        /// The entry path.
        path: Vec<String>,
        /// Number of path segments.
        segments: usize,
        /// Number of encoded states.
        states: usize,
    },

    /// A derived state has no derivation record and strict mode is on.
    #[error("derived state for {path:?} has no derivation record")]
    MissingDerivation {
        /// Path of the segment.
        path: Vec<String>,
    },

    /// JSON serialization failed.
    #[error("snapshot json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Name of a JSON value's type, for error messages.
pub fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_navigation_error_converts_into_router_error() {
        let err: RouterError = NavigationError::NoPreviousEntry.into();
        assert!(matches!(
            err,
            RouterError::Navigation(NavigationError::NoPreviousEntry)
        ));
        assert_eq!(
            err.to_string(),
            "navigation error: no previous entry to navigate back to"
        );
    }

    #[test]
    fn test_schema_error_display_names_path() {
        let err = SchemaError::MissingState {
            path: vec!["home".into(), "hello".into()],
        };
        assert!(err.to_string().contains("\"hello\""));
    }

    #[test]
    fn test_json_type_name() {
        assert_eq!(json_type_name(&serde_json::json!(1)), "number");
        assert_eq!(json_type_name(&serde_json::json!("x")), "string");
        assert_eq!(json_type_name(&serde_json::json!({})), "object");
        assert_eq!(json_type_name(&serde_json::json!(null)), "null");
    }
}

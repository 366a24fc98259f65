//! Transformation runtime for hookline.
//!
//! Three dialects rewrite captured payloads before forwarding or replay:
//! an embedded scripting dialect (`script`), a JSON query dialect
//! (`jsonpath`) and an intentionally partial path-expression dialect
//! (`path`). Each invocation runs in a fresh, budgeted engine so state
//! never leaks between requests.

mod apply;
mod executor;

pub use apply::{apply_request_transformations, apply_transformations};
pub use executor::{execute, Dialect, TransformError};

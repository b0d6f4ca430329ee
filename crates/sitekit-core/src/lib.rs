//! Client-side media and content-loading core for the sitekit frontend.
//!
//! This crate holds the browser-independent half of two cooperating
//! utilities:
//! - the image compression model (option resolution, dimension math,
//!   filename and size metrics) behind the canvas pipeline, and
//! - the visibility-gated fetch state machine behind lazy section loading,
//!   together with the document-store query/record shapes it carries.
//!
//! Browser bindings (canvas, IntersectionObserver, IndexedDB) live in the
//! `sitekit-wasm` crate.

pub mod compress;
pub mod error;
pub mod lazy;
pub mod query;

pub use compress::{
    compression_ratio, output_filename, target_dimensions, CompressionMetrics,
    CompressionOptions, CompressionSettings, OutputFormat,
};
pub use error::CompressError;
pub use lazy::{Action, FetchPhase, LazyBinding};
pub use query::{
    apply_query, CollectionQuery, Constraint, FilterOp, OrderBy, OrderDirection, Record,
};

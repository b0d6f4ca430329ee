//! WASM bindings for the sitekit client core.
//!
//! Two cooperating utilities, plus the local store they talk to:
//! - `ImageCompressor`: canvas-based resize + re-encode before upload
//! - `LazyCollectionLoader`: defer a collection query until its DOM region
//!   approaches the viewport, then fetch at most once
//! - `SiteStore`: IndexedDB-backed document + blob store
//!
//! ## Usage (JavaScript)
//!
//! ```javascript
//! import init, { openStore, ImageCompressor, LazyCollectionLoader } from './pkg/sitekit_wasm.js';
//!
//! await init();
//! const store = await openStore();
//!
//! // Lazy section loading
//! const loader = new LazyCollectionLoader(store, sectionEl, {
//!   collection: "services",
//!   constraints: [{ field: "active", op: "eq", value: true }],
//!   orderBy: { field: "order", direction: "asc" },
//! }, null);
//! loader.setOnChange(() => render(loader.data(), loader.isLoading));
//!
//! // Admin upload path
//! const compressor = new ImageCompressor();
//! compressor.setProgressCallback((pct) => progressBar.value = pct);
//! const result = await compressor.compress(file, { maxWidth: 1200, quality: 0.8 });
//! preview.src = result.previewUrl;
//! ```

pub mod compressor;
pub mod loader;
pub mod storage;
pub mod upload;

use wasm_bindgen::prelude::*;

// Re-export main types for JavaScript
pub use compressor::{revoke_preview, CompressionResult, ImageCompressor};
pub use loader::{LazyCollectionLoader, LoaderOptions};
pub use storage::{open_store, SiteStore};

/// Initialize the WASM module
/// Called automatically by wasm-bindgen
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
}

/// Get the library version
#[wasm_bindgen]
pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// One-shot compression without constructing a compressor (no progress
/// reporting)
#[wasm_bindgen(js_name = compressImage)]
pub async fn compress_image(
    file: web_sys::File,
    options: JsValue,
) -> Result<CompressionResult, JsValue> {
    ImageCompressor::new().compress(file, options).await
}

//! Compress-then-upload flow: the admin form path from a selected file to a
//! stored document field.
//!
//! A failed compression blocks the upload step entirely; upload and
//! document-write failures propagate to the caller untouched.

use js_sys::Uint8Array;
use serde_json::json;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;
use web_sys::File;

use crate::compressor::ImageCompressor;
use crate::storage::{value_to_js, SiteStore};

#[wasm_bindgen]
impl SiteStore {
    /// Compress `file`, upload the result under `path`, and write the
    /// returned URL into `collection/id`'s `field`. Returns the URL together
    /// with the compression metrics.
    #[wasm_bindgen(js_name = compressAndAttach)]
    pub async fn compress_and_attach(
        &self,
        file: File,
        options: JsValue,
        path: String,
        collection: String,
        id: String,
        field: String,
    ) -> Result<JsValue, JsValue> {
        let result = ImageCompressor::new().compress(file, options).await?;

        let bytes = file_bytes(&result.compressed_file()).await?;
        let url = self.upload_blob(&path, bytes).await?;

        let mut partial = serde_json::Map::new();
        partial.insert(field, serde_json::Value::String(url.clone()));
        let partial = value_to_js(&serde_json::Value::Object(partial))?;
        self.update_record(&collection, &id, partial).await?;

        value_to_js(&json!({
            "url": url,
            "width": result.width(),
            "height": result.height(),
            "originalSize": result.original_size(),
            "compressedSize": result.compressed_size(),
            "compressionRatio": result.compression_ratio(),
        }))
    }
}

/// Read a file's bytes into a Vec
async fn file_bytes(file: &File) -> Result<Vec<u8>, JsValue> {
    let buffer = JsFuture::from(file.array_buffer()).await?;
    Ok(Uint8Array::new(&buffer).to_vec())
}

//! Canvas-based image compression.
//!
//! Resizes and re-encodes a user-selected image entirely in the browser
//! before anything touches the network: decode to a bitmap, draw onto an
//! off-screen canvas at the capped dimensions, re-encode at the requested
//! format and quality. Dimension math, option resolution, and metrics come
//! from `sitekit-core`.

use js_sys::{Array, Promise};
use sitekit_core::compress::{
    compression_ratio, output_filename, target_dimensions, CompressionOptions,
};
use sitekit_core::error::CompressError;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use web_sys::{
    Blob, CanvasRenderingContext2d, File, FilePropertyBag, FileReader, HtmlCanvasElement,
    HtmlImageElement, Url,
};

/// Outcome of one compression run; immutable once produced. The caller owns
/// releasing `preview_url` (see [`revoke_preview`]) once it is off screen.
#[wasm_bindgen]
pub struct CompressionResult {
    file: File,
    original_size: f64,
    compressed_size: f64,
    compression_ratio: i32,
    width: u32,
    height: u32,
    preview_url: String,
}

#[wasm_bindgen]
impl CompressionResult {
    /// The re-encoded file, renamed to match the output format
    #[wasm_bindgen(getter, js_name = compressedFile)]
    pub fn compressed_file(&self) -> File {
        self.file.clone()
    }

    #[wasm_bindgen(getter, js_name = originalSize)]
    pub fn original_size(&self) -> f64 {
        self.original_size
    }

    #[wasm_bindgen(getter, js_name = compressedSize)]
    pub fn compressed_size(&self) -> f64 {
        self.compressed_size
    }

    /// Percentage saved; negative when the output grew, which is a valid
    /// outcome for small or already-optimized inputs
    #[wasm_bindgen(getter, js_name = compressionRatio)]
    pub fn compression_ratio(&self) -> i32 {
        self.compression_ratio
    }

    #[wasm_bindgen(getter)]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[wasm_bindgen(getter)]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Object URL over the compressed bytes, for immediate on-screen preview
    #[wasm_bindgen(getter, js_name = previewUrl)]
    pub fn preview_url(&self) -> String {
        self.preview_url.clone()
    }
}

/// Client-side image compressor. Each call runs its own decode/draw/encode
/// pipeline; concurrent calls are safe but not coordinated.
#[wasm_bindgen]
pub struct ImageCompressor {
    progress_callback: Option<js_sys::Function>,
}

impl Default for ImageCompressor {
    fn default() -> Self {
        Self::new()
    }
}

#[wasm_bindgen]
impl ImageCompressor {
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        Self {
            progress_callback: None,
        }
    }

    /// Set a progress callback function
    /// Callback signature: (percent: number) => void
    /// Values increase monotonically and reach 100 on success.
    #[wasm_bindgen(js_name = setProgressCallback)]
    pub fn set_progress_callback(&mut self, callback: js_sys::Function) {
        self.progress_callback = Some(callback);
    }

    /// Compress a raster image file. Options merge over the defaults
    /// (1200x1200, quality 0.8, webp); MIME/size validation of the input is
    /// the caller's responsibility.
    #[wasm_bindgen]
    pub async fn compress(
        &self,
        file: File,
        options: JsValue,
    ) -> Result<CompressionResult, JsValue> {
        let options: CompressionOptions = if options.is_undefined() || options.is_null() {
            CompressionOptions::default()
        } else {
            serde_wasm_bindgen::from_value(options)
                .map_err(|e| JsValue::from_str(&format!("Invalid options: {}", e)))?
        };
        let settings = options.resolve();

        let original_size = file.size();
        let original_name = file.name();

        self.report_progress(10);
        let data_url = read_as_data_url(&file)
            .await
            .map_err(|e| compress_error(CompressError::Decode(describe(&e))))?;

        let image = load_image(&data_url)
            .await
            .map_err(|e| compress_error(CompressError::Decode(describe(&e))))?;
        self.report_progress(30);

        let (width, height) =
            target_dimensions(image.natural_width(), image.natural_height(), &settings);
        self.report_progress(50);

        let (canvas, context) = create_surface(width, height)
            .map_err(|e| compress_error(CompressError::SurfaceUnavailable(describe(&e))))?;
        context
            .draw_image_with_html_image_element_and_dw_and_dh(
                &image,
                0.0,
                0.0,
                width as f64,
                height as f64,
            )
            .map_err(|e| compress_error(CompressError::SurfaceUnavailable(describe(&e))))?;
        self.report_progress(70);

        let blob = encode_canvas(&canvas, settings.output_format.mime(), settings.quality)
            .await
            .map_err(|e| compress_error(CompressError::Encode(describe(&e))))?;
        self.report_progress(90);

        let name = output_filename(&original_name, settings.output_format);
        let file_bits = Array::of1(&blob);
        let bag = FilePropertyBag::new();
        bag.set_type(settings.output_format.mime());
        let compressed_file =
            File::new_with_blob_sequence_and_options(&JsValue::from(file_bits), &name, &bag)?;

        let compressed_size = blob.size();
        let preview_url = Url::create_object_url_with_blob(&blob)?;
        self.report_progress(100);

        Ok(CompressionResult {
            file: compressed_file,
            original_size,
            compressed_size,
            compression_ratio: compression_ratio(original_size as usize, compressed_size as usize),
            width,
            height,
            preview_url,
        })
    }

    /// Report progress to the JavaScript callback
    fn report_progress(&self, percent: u32) {
        if let Some(ref callback) = self.progress_callback {
            let _ = callback.call1(&JsValue::NULL, &JsValue::from(percent));
        }
    }
}

/// Release a preview URL once the view no longer displays it
#[wasm_bindgen(js_name = revokePreview)]
pub fn revoke_preview(url: &str) {
    let _ = Url::revoke_object_url(url);
}

fn compress_error(err: CompressError) -> JsValue {
    JsValue::from_str(&err.to_string())
}

fn describe(err: &JsValue) -> String {
    err.as_string().unwrap_or_else(|| format!("{:?}", err))
}

/// Read a blob into a data URL via FileReader
async fn read_as_data_url(blob: &Blob) -> Result<String, JsValue> {
    let reader = FileReader::new()?;
    let promise = reader_load_promise(&reader);
    reader.read_as_data_url(blob)?;

    let result = JsFuture::from(promise).await?;
    result
        .as_string()
        .ok_or_else(|| JsValue::from_str("Reader produced no data URL"))
}

/// Bridge a FileReader's load/error events into a Promise
fn reader_load_promise(reader: &FileReader) -> Promise {
    let reader = reader.clone();

    Promise::new(&mut |resolve, reject| {
        let reader_for_load = reader.clone();
        let resolve_clone = resolve.clone();
        let reject_clone = reject.clone();

        let onload = Closure::once(Box::new(move |_event: web_sys::Event| {
            let result = reader_for_load.result().unwrap_or(JsValue::NULL);
            let _ = resolve_clone.call1(&JsValue::NULL, &result);
        }) as Box<dyn FnOnce(_)>);

        let onerror = Closure::once(Box::new(move |_event: web_sys::Event| {
            let _ = reject_clone.call1(&JsValue::NULL, &JsValue::from_str("Failed to read file"));
        }) as Box<dyn FnOnce(_)>);

        reader.set_onload(Some(onload.as_ref().unchecked_ref()));
        reader.set_onerror(Some(onerror.as_ref().unchecked_ref()));

        onload.forget();
        onerror.forget();
    })
}

/// Decode a data URL into an image element
async fn load_image(src: &str) -> Result<HtmlImageElement, JsValue> {
    let image = HtmlImageElement::new()?;
    let promise = image_decode_promise(&image);
    image.set_src(src);

    JsFuture::from(promise).await?;
    Ok(image)
}

/// Bridge an image element's load/error events into a Promise
fn image_decode_promise(image: &HtmlImageElement) -> Promise {
    let image = image.clone();

    Promise::new(&mut |resolve, reject| {
        let resolve_clone = resolve.clone();
        let reject_clone = reject.clone();

        let onload = Closure::once(Box::new(move |_event: web_sys::Event| {
            let _ = resolve_clone.call0(&JsValue::NULL);
        }) as Box<dyn FnOnce(_)>);

        let onerror = Closure::once(Box::new(move |_event: web_sys::Event| {
            let _ = reject_clone.call1(
                &JsValue::NULL,
                &JsValue::from_str("File is not a decodable image"),
            );
        }) as Box<dyn FnOnce(_)>);

        image.set_onload(Some(onload.as_ref().unchecked_ref()));
        image.set_onerror(Some(onerror.as_ref().unchecked_ref()));

        onload.forget();
        onerror.forget();
    })
}

/// Create an off-screen canvas with a 2d context and smoothing enabled
fn create_surface(
    width: u32,
    height: u32,
) -> Result<(HtmlCanvasElement, CanvasRenderingContext2d), JsValue> {
    let document = web_sys::window()
        .ok_or("No window")?
        .document()
        .ok_or("No document")?;

    let canvas: HtmlCanvasElement = document
        .create_element("canvas")?
        .dyn_into()
        .map_err(|_| JsValue::from_str("Element is not a canvas"))?;
    canvas.set_width(width);
    canvas.set_height(height);

    let context = canvas
        .get_context("2d")?
        .ok_or_else(|| JsValue::from_str("2d context unavailable"))?
        .dyn_into::<CanvasRenderingContext2d>()
        .map_err(|_| JsValue::from_str("Unexpected context type"))?;
    context.set_image_smoothing_enabled(true);

    Ok((canvas, context))
}

/// Re-encode the canvas at the given MIME type and quality
async fn encode_canvas(
    canvas: &HtmlCanvasElement,
    mime: &str,
    quality: f64,
) -> Result<Blob, JsValue> {
    JsFuture::from(canvas_encode_promise(canvas, mime, quality))
        .await?
        .dyn_into::<Blob>()
        .map_err(|_| JsValue::from_str("Encoding produced no output"))
}

/// Bridge toBlob's callback into a Promise; resolves only with a real blob
fn canvas_encode_promise(canvas: &HtmlCanvasElement, mime: &str, quality: f64) -> Promise {
    let canvas = canvas.clone();
    let mime = mime.to_string();

    Promise::new(&mut move |resolve, reject| {
        let resolve_clone = resolve.clone();
        let reject_for_empty = reject.clone();

        let callback = Closure::once(Box::new(move |blob: Option<Blob>| match blob {
            Some(blob) => {
                let _ = resolve_clone.call1(&JsValue::NULL, &blob);
            }
            None => {
                let _ = reject_for_empty.call1(
                    &JsValue::NULL,
                    &JsValue::from_str("Encoder returned no payload"),
                );
            }
        }) as Box<dyn FnOnce(Option<Blob>)>);

        if let Err(err) = canvas.to_blob_with_type_and_encoder_options(
            callback.as_ref().unchecked_ref(),
            &mime,
            &JsValue::from_f64(quality),
        ) {
            let _ = reject.call1(&JsValue::NULL, &err);
        }

        callback.forget();
    })
}

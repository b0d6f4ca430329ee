//! IndexedDB-backed document and blob stores.
//!
//! Records are schemaless field maps stored under `"collection/id"` keys;
//! blobs are byte payloads stored under their upload path. Query constraints
//! are evaluated here (via `sitekit_core::apply_query`) and nowhere else —
//! the lazy loader hands queries through verbatim.

use js_sys::{Array, Promise, Uint8Array};
use serde::Serialize;
use serde_json::{Map, Value};
use sitekit_core::query::{apply_query, CollectionQuery, Record};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use web_sys::{Blob, IdbDatabase, IdbOpenDbRequest, IdbRequest, IdbTransactionMode, Url};

const DB_NAME: &str = "sitekit_local";
const DB_VERSION: u32 = 1;

const STORE_RECORDS: &str = "records";
const STORE_BLOBS: &str = "blobs";

/// Document + blob store backed by one IndexedDB database. Constructed once
/// at startup and passed to every component that needs it.
#[wasm_bindgen]
#[derive(Clone)]
pub struct SiteStore {
    db: IdbDatabase,
}

/// Open the database - call this before constructing any loader
#[wasm_bindgen(js_name = openStore)]
pub async fn open_store() -> Result<SiteStore, JsValue> {
    let window = web_sys::window().ok_or("No window")?;
    let idb = window.indexed_db()?.ok_or("IndexedDB not available")?;

    let request = idb.open_with_u32(DB_NAME, DB_VERSION)?;

    let db = JsFuture::from(open_db_promise(&request)).await?;
    let db: IdbDatabase = db.unchecked_into();

    Ok(SiteStore { db })
}

/// Create a promise that handles database opening with upgrade
fn open_db_promise(request: &IdbOpenDbRequest) -> Promise {
    let request = request.clone();

    Promise::new(&mut move |resolve, reject| {
        let request_for_upgrade = request.clone();
        let request_for_success = request.clone();
        let resolve_clone = resolve.clone();
        let reject_clone = reject.clone();

        let onupgradeneeded = Closure::once(Box::new(move |_event: web_sys::Event| {
            if let Ok(result) = request_for_upgrade.result() {
                let db: IdbDatabase = result.unchecked_into();
                // Ignore errors if the stores already exist
                let _ = db.create_object_store(STORE_RECORDS);
                let _ = db.create_object_store(STORE_BLOBS);
            }
        }) as Box<dyn FnOnce(_)>);

        let onsuccess = Closure::once(Box::new(move |_event: web_sys::Event| {
            if let Ok(result) = request_for_success.result() {
                let _ = resolve_clone.call1(&JsValue::NULL, &result);
            }
        }) as Box<dyn FnOnce(_)>);

        let onerror = Closure::once(Box::new(move |_event: web_sys::Event| {
            let _ = reject_clone.call1(
                &JsValue::NULL,
                &JsValue::from_str("Failed to open database"),
            );
        }) as Box<dyn FnOnce(_)>);

        request.set_onupgradeneeded(Some(onupgradeneeded.as_ref().unchecked_ref()));
        request.set_onsuccess(Some(onsuccess.as_ref().unchecked_ref()));
        request.set_onerror(Some(onerror.as_ref().unchecked_ref()));

        onupgradeneeded.forget();
        onsuccess.forget();
        onerror.forget();
    })
}

#[wasm_bindgen]
impl SiteStore {
    /// Run a filtered, ordered, limited query against a collection.
    /// Returns an array of records with the store key merged in as `id`.
    #[wasm_bindgen(js_name = queryCollection)]
    pub async fn query_collection(&self, query: JsValue) -> Result<JsValue, JsValue> {
        let query: CollectionQuery = serde_wasm_bindgen::from_value(query)
            .map_err(|e| JsValue::from_str(&format!("Invalid query: {}", e)))?;

        let records = self.query_records(&query).await?;
        records_to_js(&records)
    }

    /// Fetch a single record, or null if absent
    #[wasm_bindgen(js_name = getRecord)]
    pub async fn get_record(&self, collection: &str, id: &str) -> Result<JsValue, JsValue> {
        match self.get_fields(&record_key(collection, id)).await? {
            Some(fields) => value_to_js(&Record::new(id, fields).merged()),
            None => Ok(JsValue::NULL),
        }
    }

    /// Insert a new record; the store assigns the id and a creation timestamp
    #[wasm_bindgen(js_name = addRecord)]
    pub async fn add_record(&self, collection: &str, fields: JsValue) -> Result<String, JsValue> {
        let mut fields = js_to_fields(fields)?;
        fields.insert(
            "created_at".to_string(),
            Value::from(js_sys::Date::now()),
        );

        let id = generate_id();
        self.put_fields(&record_key(collection, &id), &fields)
            .await?;
        Ok(id)
    }

    /// Shallow-merge partial fields into an existing record
    #[wasm_bindgen(js_name = updateRecord)]
    pub async fn update_record(
        &self,
        collection: &str,
        id: &str,
        partial: JsValue,
    ) -> Result<(), JsValue> {
        let key = record_key(collection, id);
        let mut fields = self
            .get_fields(&key)
            .await?
            .ok_or_else(|| JsValue::from_str("Record not found"))?;

        for (name, value) in js_to_fields(partial)? {
            fields.insert(name, value);
        }

        self.put_fields(&key, &fields).await
    }

    /// Delete a record; deleting an absent record is not an error
    #[wasm_bindgen(js_name = deleteRecord)]
    pub async fn delete_record(&self, collection: &str, id: &str) -> Result<(), JsValue> {
        let tx = self
            .db
            .transaction_with_str_and_mode(STORE_RECORDS, IdbTransactionMode::Readwrite)?;
        let store = tx.object_store(STORE_RECORDS)?;

        let request = store.delete(&record_key(collection, id).into())?;
        JsFuture::from(request_to_promise(&request)).await?;

        Ok(())
    }

    /// Store a binary payload under `path`; returns a locally-resolvable URL
    /// for the uploaded bytes
    #[wasm_bindgen(js_name = uploadBlob)]
    pub async fn upload_blob(&self, path: &str, data: Vec<u8>) -> Result<String, JsValue> {
        let payload = Uint8Array::from(data.as_slice());

        let tx = self
            .db
            .transaction_with_str_and_mode(STORE_BLOBS, IdbTransactionMode::Readwrite)?;
        let store = tx.object_store(STORE_BLOBS)?;

        let request = store.put_with_key(&payload, &path.into())?;
        JsFuture::from(request_to_promise(&request)).await?;

        let parts = Array::of1(&payload);
        let blob = Blob::new_with_u8_array_sequence(&parts)?;
        Url::create_object_url_with_blob(&blob)
    }

    /// Retrieve a stored payload, or null if absent
    #[wasm_bindgen(js_name = getBlob)]
    pub async fn get_blob(&self, path: &str) -> Result<JsValue, JsValue> {
        let tx = self.db.transaction_with_str(STORE_BLOBS)?;
        let store = tx.object_store(STORE_BLOBS)?;

        let request = store.get(&path.into())?;
        let result = JsFuture::from(request_to_promise(&request)).await?;

        if result.is_undefined() || result.is_null() {
            return Ok(JsValue::NULL);
        }
        Ok(result)
    }

    /// Delete a stored payload
    #[wasm_bindgen(js_name = deleteBlob)]
    pub async fn delete_blob(&self, path: &str) -> Result<(), JsValue> {
        let tx = self
            .db
            .transaction_with_str_and_mode(STORE_BLOBS, IdbTransactionMode::Readwrite)?;
        let store = tx.object_store(STORE_BLOBS)?;

        let request = store.delete(&path.into())?;
        JsFuture::from(request_to_promise(&request)).await?;

        Ok(())
    }
}

// Internal implementation (not exposed to WASM)
impl SiteStore {
    /// Load a collection and evaluate the query over it
    pub(crate) async fn query_records(
        &self,
        query: &CollectionQuery,
    ) -> Result<Vec<Record>, JsValue> {
        let tx = self.db.transaction_with_str(STORE_RECORDS)?;
        let store = tx.object_store(STORE_RECORDS)?;

        // Both key-ordered, so the arrays line up pairwise
        let keys_request = store.get_all_keys()?;
        let values_request = store.get_all()?;
        let keys: Array = JsFuture::from(request_to_promise(&keys_request))
            .await?
            .unchecked_into();
        let values: Array = JsFuture::from(request_to_promise(&values_request))
            .await?
            .unchecked_into();

        let prefix = format!("{}/", query.collection);
        let mut records = Vec::new();
        for (key, value) in keys.iter().zip(values.iter()) {
            let Some(key) = key.as_string() else { continue };
            let Some(id) = key.strip_prefix(&prefix) else {
                continue;
            };
            records.push(Record::new(id, js_to_fields(value)?));
        }

        Ok(apply_query(records, query))
    }

    async fn get_fields(&self, key: &str) -> Result<Option<Map<String, Value>>, JsValue> {
        let tx = self.db.transaction_with_str(STORE_RECORDS)?;
        let store = tx.object_store(STORE_RECORDS)?;

        let request = store.get(&key.into())?;
        let result = JsFuture::from(request_to_promise(&request)).await?;

        if result.is_undefined() || result.is_null() {
            return Ok(None);
        }
        Ok(Some(js_to_fields(result)?))
    }

    async fn put_fields(&self, key: &str, fields: &Map<String, Value>) -> Result<(), JsValue> {
        let tx = self
            .db
            .transaction_with_str_and_mode(STORE_RECORDS, IdbTransactionMode::Readwrite)?;
        let store = tx.object_store(STORE_RECORDS)?;

        let value = value_to_js(&Value::Object(fields.clone()))?;
        let request = store.put_with_key(&value, &key.into())?;
        JsFuture::from(request_to_promise(&request)).await?;

        Ok(())
    }
}

/// Convert an IdbRequest to a Promise for async/await
fn request_to_promise(request: &IdbRequest) -> Promise {
    let request = request.clone();

    Promise::new(&mut |resolve, reject| {
        let request_success = request.clone();
        let resolve_clone = resolve.clone();
        let reject_clone = reject.clone();

        let onsuccess = Closure::once(Box::new(move |_event: web_sys::Event| {
            let result = request_success.result().unwrap_or(JsValue::NULL);
            let _ = resolve_clone.call1(&JsValue::NULL, &result);
        }) as Box<dyn FnOnce(_)>);

        let onerror = Closure::once(Box::new(move |_event: web_sys::Event| {
            let _ = reject_clone.call1(
                &JsValue::NULL,
                &JsValue::from_str("IndexedDB request failed"),
            );
        }) as Box<dyn FnOnce(_)>);

        request.set_onsuccess(Some(onsuccess.as_ref().unchecked_ref()));
        request.set_onerror(Some(onerror.as_ref().unchecked_ref()));

        onsuccess.forget();
        onerror.forget();
    })
}

fn record_key(collection: &str, id: &str) -> String {
    format!("{}/{}", collection, id)
}

/// Time-plus-random id; collision-safe enough for a single client
fn generate_id() -> String {
    let millis = js_sys::Date::now() as u64;
    let entropy = (js_sys::Math::random() * u32::MAX as f64) as u32;
    format!("{:x}{:08x}", millis, entropy)
}

/// Serialize to a plain JS object (not an ES Map), so records round-trip
/// through IndexedDB's structured clone
pub(crate) fn value_to_js(value: &Value) -> Result<JsValue, JsValue> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
}

fn records_to_js(records: &[Record]) -> Result<JsValue, JsValue> {
    let merged: Vec<Value> = records.iter().map(|r| r.merged()).collect();
    value_to_js(&Value::Array(merged))
}

fn js_to_fields(value: JsValue) -> Result<Map<String, Value>, JsValue> {
    serde_wasm_bindgen::from_value(value)
        .map_err(|e| JsValue::from_str(&format!("Invalid record fields: {}", e)))
}

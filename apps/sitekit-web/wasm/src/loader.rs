//! Visibility-gated collection loading.
//!
//! Defers a document-store query until the bound DOM region approaches the
//! viewport, then fetches at most once per binding lifetime. The observer
//! only reports proximity crossings; the visibility latch and the
//! fetch-at-most-once guard live in `sitekit_core::lazy::LazyBinding`.

use std::cell::RefCell;
use std::rc::Rc;

use js_sys::Array;
use serde::Deserialize;
use sitekit_core::lazy::{Action, LazyBinding};
use sitekit_core::query::CollectionQuery;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::spawn_local;
use web_sys::{Element, IntersectionObserver, IntersectionObserverEntry, IntersectionObserverInit};

use crate::storage::SiteStore;

/// Proximity options: how early before entering the viewport the fetch fires
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoaderOptions {
    /// When false, visibility is still tracked but no fetch fires
    pub enabled: bool,
    pub root_margin: String,
    pub threshold: f64,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            root_margin: "150px".to_string(),
            threshold: 0.1,
        }
    }
}

struct LoaderInner {
    binding: LazyBinding,
    query: CollectionQuery,
    store: SiteStore,
    on_change: Option<js_sys::Function>,
}

/// Binds one DOM region to one collection query
#[wasm_bindgen]
pub struct LazyCollectionLoader {
    inner: Rc<RefCell<LoaderInner>>,
    observer: IntersectionObserver,
    _callback: Closure<dyn FnMut(Array, IntersectionObserver)>,
}

#[wasm_bindgen]
impl LazyCollectionLoader {
    /// Bind `region` to `query`. Observation starts immediately; the query
    /// runs once the region is within `root_margin` of the viewport at
    /// `threshold` overlap.
    #[wasm_bindgen(constructor)]
    pub fn new(
        store: &SiteStore,
        region: &Element,
        query: JsValue,
        options: JsValue,
    ) -> Result<LazyCollectionLoader, JsValue> {
        let query: CollectionQuery = serde_wasm_bindgen::from_value(query)
            .map_err(|e| JsValue::from_str(&format!("Invalid query: {}", e)))?;
        let options: LoaderOptions = if options.is_undefined() || options.is_null() {
            LoaderOptions::default()
        } else {
            serde_wasm_bindgen::from_value(options)
                .map_err(|e| JsValue::from_str(&format!("Invalid options: {}", e)))?
        };

        let inner = Rc::new(RefCell::new(LoaderInner {
            binding: LazyBinding::new(options.enabled),
            query,
            store: store.clone(),
            on_change: None,
        }));

        let inner_for_observer = Rc::clone(&inner);
        let callback: Closure<dyn FnMut(Array, IntersectionObserver)> =
            Closure::new(move |entries: Array, observer: IntersectionObserver| {
                for entry in entries.iter() {
                    let entry: IntersectionObserverEntry = entry.unchecked_into();
                    if !entry.is_intersecting() {
                        continue;
                    }

                    let action = inner_for_observer.borrow_mut().binding.region_entered();
                    if action == Action::StartFetch {
                        // The latch never reverts, so one crossing is all the
                        // observer has to deliver
                        observer.unobserve(&entry.target());
                        start_fetch(Rc::clone(&inner_for_observer));
                    }
                    notify(&inner_for_observer);
                }
            });

        let init = IntersectionObserverInit::new();
        init.set_root_margin(&options.root_margin);
        init.set_threshold(&JsValue::from_f64(options.threshold));

        let observer =
            IntersectionObserver::new_with_options(callback.as_ref().unchecked_ref(), &init)?;
        observer.observe(region);

        Ok(LazyCollectionLoader {
            inner,
            observer,
            _callback: callback,
        })
    }

    /// Callback invoked after every state transition, so the host UI can
    /// re-render from the readers below
    #[wasm_bindgen(js_name = setOnChange)]
    pub fn set_on_change(&self, callback: js_sys::Function) {
        self.inner.borrow_mut().on_change = Some(callback);
    }

    /// True once the region has ever crossed the proximity threshold
    #[wasm_bindgen(getter, js_name = isVisible)]
    pub fn is_visible(&self) -> bool {
        self.inner.borrow().binding.is_visible()
    }

    /// True only during the in-flight fetch window
    #[wasm_bindgen(getter, js_name = isLoading)]
    pub fn is_loading(&self) -> bool {
        self.inner.borrow().binding.is_loading()
    }

    #[wasm_bindgen(getter, js_name = hasFetched)]
    pub fn has_fetched(&self) -> bool {
        self.inner.borrow().binding.has_fetched()
    }

    /// Present only if the last fetch rejected
    #[wasm_bindgen(getter)]
    pub fn error(&self) -> Option<String> {
        self.inner.borrow().binding.error().map(str::to_string)
    }

    /// Current records as a JS array, store keys merged in as `id`
    #[wasm_bindgen]
    pub fn data(&self) -> Result<JsValue, JsValue> {
        let inner = self.inner.borrow();
        let merged: Vec<serde_json::Value> =
            inner.binding.records().iter().map(|r| r.merged()).collect();
        crate::storage::value_to_js(&serde_json::Value::Array(merged))
    }

    /// Clear the at-most-once guard and re-issue the same query. Data is
    /// replaced wholesale when the new result set arrives.
    #[wasm_bindgen]
    pub fn refetch(&self) {
        let action = self.inner.borrow_mut().binding.refetch();
        if action == Action::StartFetch {
            start_fetch(Rc::clone(&self.inner));
        }
        notify(&self.inner);
    }

    /// Enable or disable fetching. Disabling never resets the visibility
    /// latch; enabling with the latch set (and nothing fetched yet) fetches
    /// immediately.
    #[wasm_bindgen(js_name = setEnabled)]
    pub fn set_enabled(&self, enabled: bool) {
        let action = self.inner.borrow_mut().binding.set_enabled(enabled);
        if action == Action::StartFetch {
            start_fetch(Rc::clone(&self.inner));
        }
        notify(&self.inner);
    }

    /// Stop observing the region. An in-flight fetch is not aborted; its
    /// result is discarded when it lands.
    #[wasm_bindgen]
    pub fn unbind(&self) {
        self.observer.disconnect();
        self.inner.borrow_mut().binding.unbind();
    }
}

/// Issue the query via the store and feed the outcome back into the binding
fn start_fetch(inner: Rc<RefCell<LoaderInner>>) {
    let (store, query) = {
        let mut guard = inner.borrow_mut();
        guard.binding.begin_fetch();
        (guard.store.clone(), guard.query.clone())
    };

    spawn_local(async move {
        let outcome = store.query_records(&query).await;
        {
            let mut guard = inner.borrow_mut();
            match outcome {
                Ok(records) => guard.binding.complete(records),
                Err(err) => guard.binding.fail(
                    err.as_string()
                        .unwrap_or_else(|| format!("{:?}", err)),
                ),
            }
        }
        notify(&inner);
    });
}

fn notify(inner: &Rc<RefCell<LoaderInner>>) {
    let callback = inner.borrow().on_change.clone();
    if let Some(callback) = callback {
        let _ = callback.call0(&JsValue::NULL);
    }
}

#[cfg(test)]
mod tests {
    use super::LoaderOptions;

    #[test]
    fn test_options_defaults() {
        let options = LoaderOptions::default();
        assert!(options.enabled);
        assert_eq!(options.root_margin, "150px");
        assert_eq!(options.threshold, 0.1);
    }

    #[test]
    fn test_options_json_matches_js_shape() {
        let options: LoaderOptions =
            serde_json::from_str(r#"{"rootMargin": "300px", "threshold": 0.25}"#).unwrap();
        assert!(options.enabled);
        assert_eq!(options.root_margin, "300px");
        assert_eq!(options.threshold, 0.25);
    }

    #[test]
    fn test_options_can_disable_fetching() {
        let options: LoaderOptions = serde_json::from_str(r#"{"enabled": false}"#).unwrap();
        assert!(!options.enabled);
    }
}

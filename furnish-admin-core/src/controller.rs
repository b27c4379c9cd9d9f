//! Generic controller for one admin REST collection.
//!
//! A [`ResourceController`] holds the list a view renders (items, page
//! metadata, loading/error/success flags) and runs the list, get, save and
//! delete calls against its endpoint. Errors never escape: every failure ends
//! up in [`CollectionState::error`].
//!
//! Fetches go through an in-flight guard. While one fetch is running, or
//! within `fetch_spacing` of the last fetch's start, further fetches are
//! dropped rather than queued. Two filter changes in quick succession can
//! therefore leave the state showing the first one.
//!
//! Mutations never patch `items` with the server's answer. They schedule a
//! refetch after `refetch_delay` and let the server's list win. That refetch
//! goes through the same guard: if a slow fetch started before the mutation
//! is still running when it fires, the refetch is dropped and the list keeps
//! whatever that older fetch returns until the next fetch.

use crate::config::ControllerConfig;
use crate::error::AdminError;
use crate::pagination::Pagination;
use crate::resources::AdminResource;
use crate::transport::{ApiRequest, Method, MultipartForm, QueryParams, RequestBody, Transport};
use log::{debug, info, warn};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const LOAD_FAILED: &str = "Failed to load data";
const OPERATION_FAILED: &str = "Operation failed";
const UNEXPECTED_RESPONSE: &str = "Unexpected response from server";
const CREATED: &str = "Item created successfully";
const UPDATED: &str = "Item updated successfully";
const DELETED: &str = "Item deleted successfully";
const DELETE_PROMPT: &str = "Are you sure you want to delete this item?";
const METHOD_OVERRIDE_FIELD: &str = "_method";

/// How updates reach the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateMethod {
    /// `PUT {endpoint}/{id}` for JSON; multipart goes as POST with a
    /// `_method=PUT` override field.
    #[default]
    Put,
    /// `POST {endpoint}/{id}` for every payload, no override.
    Post,
}

pub type Transform = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Fixed per-binding settings.
#[derive(Clone, Default)]
pub struct BindingOptions {
    /// Sent with every fetch, under the call's own params.
    pub base_params: QueryParams,
    pub update_method: UpdateMethod,
    /// Applied to every listed item before it is stored.
    pub transform: Option<Transform>,
}

impl fmt::Debug for BindingOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingOptions")
            .field("base_params", &self.base_params)
            .field("update_method", &self.update_method)
            .field("transform", &self.transform.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

impl BindingOptions {
    pub fn with_base_params(mut self, base_params: QueryParams) -> Self {
        self.base_params = base_params;
        self
    }

    pub fn with_update_method(mut self, update_method: UpdateMethod) -> Self {
        self.update_method = update_method;
        self
    }

    pub fn with_transform(
        mut self,
        transform: impl Fn(Value) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.transform = Some(Arc::new(transform));
        self
    }
}

/// Body of a create or update.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    /// For records carrying files, e.g. product images.
    Multipart(MultipartForm),
}

/// Yes/no gate in front of deletes.
pub trait Confirm {
    fn confirm(&self, prompt: &str) -> bool;
}

impl<F: Fn(&str) -> bool> Confirm for F {
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

/// Confirms everything, for non-interactive callers.
#[derive(Debug, Clone, Copy)]
pub struct AssumeYes;

impl Confirm for AssumeYes {
    fn confirm(&self, _prompt: &str) -> bool {
        true
    }
}

/// What a view renders.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionState {
    pub endpoint: String,
    pub items: Vec<Value>,
    pub pagination: Pagination,
    pub loading: bool,
    pub error: Option<String>,
    pub success: Option<String>,
}

impl CollectionState {
    fn new(endpoint: String) -> Self {
        Self {
            endpoint,
            items: Vec::new(),
            pagination: Pagination::default(),
            loading: false,
            error: None,
            success: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Value,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PageEnvelope {
    data: Vec<Value>,
    current_page: u32,
    last_page: u32,
    total: u64,
}

struct Binding {
    state: CollectionState,
    /// Bumped on rebind/unbind; completions from older epochs are dropped.
    epoch: u64,
    /// Cancels the scheduled refetches and success expiries of this epoch.
    cancel: CancellationToken,
    fetch_in_flight: bool,
    last_fetch_started: Option<Instant>,
    last_params: QueryParams,
    /// Operations of this epoch still waiting on the network.
    pending: usize,
    /// Identifies the success message an expiry timer belongs to.
    success_seq: u64,
}

impl Binding {
    fn new(endpoint: String) -> Self {
        Self {
            state: CollectionState::new(endpoint),
            epoch: 0,
            cancel: CancellationToken::new(),
            fetch_in_flight: false,
            last_fetch_started: None,
            last_params: QueryParams::new(),
            pending: 0,
            success_seq: 0,
        }
    }

    fn invalidate(&mut self) {
        self.epoch += 1;
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
        self.fetch_in_flight = false;
        self.last_fetch_started = None;
        self.pending = 0;
        self.state.loading = false;
    }

    /// Reads clear the error; mutations also clear the last success.
    fn begin(&mut self, mutation: bool) -> u64 {
        self.pending += 1;
        self.state.loading = true;
        self.state.error = None;
        if mutation {
            self.state.success = None;
        }
        self.epoch
    }
}

struct Shared<T> {
    transport: Arc<T>,
    config: ControllerConfig,
    options: BindingOptions,
    binding: Mutex<Binding>,
}

/// Controller bound to one REST collection. Clones share the binding.
pub struct ResourceController<T: Transport> {
    shared: Arc<Shared<T>>,
}

impl<T: Transport> Clone for ResourceController<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Transport> ResourceController<T> {
    pub fn new(
        transport: Arc<T>,
        endpoint: impl Into<String>,
        options: BindingOptions,
        config: ControllerConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                transport,
                config,
                options,
                binding: Mutex::new(Binding::new(endpoint.into())),
            }),
        }
    }

    /// Controller for one of the known admin collections.
    pub fn for_resource(
        transport: Arc<T>,
        resource: AdminResource,
        config: ControllerConfig,
    ) -> Self {
        Self::new(transport, resource.endpoint(), resource.binding_options(), config)
    }

    fn binding(&self) -> MutexGuard<'_, Binding> {
        self.shared
            .binding
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> CollectionState {
        self.binding().state.clone()
    }

    pub fn endpoint(&self) -> String {
        self.binding().state.endpoint.clone()
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.shared.config
    }

    /// Listed items decoded into a concrete record type.
    pub fn items_as<R: DeserializeOwned>(&self) -> Result<Vec<R>, AdminError> {
        let items = self.binding().state.items.clone();
        items
            .into_iter()
            .map(|item| serde_json::from_value(item).map_err(AdminError::from))
            .collect()
    }

    pub fn clear_success(&self) {
        self.binding().state.success = None;
    }

    pub fn clear_error(&self) {
        self.binding().state.error = None;
    }

    /// Point the controller at another collection. State starts over and
    /// answers still on their way for the old endpoint are discarded.
    pub fn rebind(&self, endpoint: impl Into<String>) {
        let mut binding = self.binding();
        binding.invalidate();
        binding.state = CollectionState::new(endpoint.into());
        binding.last_params = QueryParams::new();
        debug!("Rebound controller to {}", binding.state.endpoint);
    }

    /// Stop applying results to this binding, e.g. when its view goes away.
    pub fn unbind(&self) {
        let mut binding = self.binding();
        binding.invalidate();
        debug!("Unbound controller from {}", binding.state.endpoint);
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.binding().epoch == epoch
    }

    /// Runs `apply` and settles `loading` if `epoch` is still current.
    fn finish(&self, epoch: u64, apply: impl FnOnce(&mut Binding)) -> bool {
        let mut binding = self.binding();
        if binding.epoch != epoch {
            debug!("Discarding stale result for {}", binding.state.endpoint);
            return false;
        }
        binding.pending = binding.pending.saturating_sub(1);
        binding.state.loading = binding.pending > 0;
        apply(&mut *binding);
        true
    }

    fn fail(&self, epoch: u64, message: String) {
        warn!("{}", message);
        self.finish(epoch, |binding| binding.state.error = Some(message));
    }

    /// Load a page of the collection with `params` laid over the base params.
    ///
    /// Returns `false` without touching state when the in-flight guard drops
    /// the call.
    pub async fn fetch_page(&self, params: QueryParams) -> bool {
        let (epoch, endpoint, query) = {
            let mut binding = self.binding();
            let now = Instant::now();
            if binding.fetch_in_flight {
                debug!("Fetch of {} dropped: another fetch is in flight", binding.state.endpoint);
                return false;
            }
            if let Some(started) = binding.last_fetch_started {
                if now.duration_since(started) < self.shared.config.fetch_spacing {
                    debug!(
                        "Fetch of {} dropped: previous fetch started {:?} ago",
                        binding.state.endpoint,
                        now.duration_since(started)
                    );
                    return false;
                }
            }
            binding.fetch_in_flight = true;
            binding.last_fetch_started = Some(now);
            binding.last_params = params.clone();
            let epoch = binding.begin(false);
            let query = params.merged_over(&self.shared.options.base_params);
            (epoch, binding.state.endpoint.clone(), query)
        };

        let request = ApiRequest::new(Method::Get, endpoint).query(query);
        let outcome = match self.shared.transport.send(request).await {
            Ok(response) => self.read_listing(response.body),
            Err(e) => Err(e.user_message()),
        };

        if let Err(message) = &outcome {
            warn!("Fetch failed: {}", message);
        }
        self.finish(epoch, |binding| {
            binding.fetch_in_flight = false;
            match outcome {
                Ok((items, pagination)) => {
                    binding.state.items = items;
                    binding.state.pagination = pagination;
                }
                Err(message) => binding.state.error = Some(message),
            }
        });
        true
    }

    /// Fetch `page` keeping the other params of the last fetch.
    pub async fn set_page(&self, page: u32) -> bool {
        let params = self.binding().last_params.clone().with("page", page);
        self.fetch_page(params).await
    }

    fn read_listing(&self, body: Value) -> Result<(Vec<Value>, Pagination), String> {
        let envelope = read_envelope(body)?;
        if !envelope.success {
            return Err(envelope.message.unwrap_or_else(|| LOAD_FAILED.to_string()));
        }

        let (items, pagination) = match envelope.data {
            Value::Array(items) => {
                let pagination = Pagination::single_page(items.len());
                (items, pagination)
            }
            page @ Value::Object(_) => {
                let page: PageEnvelope =
                    serde_json::from_value(page).map_err(|_| UNEXPECTED_RESPONSE.to_string())?;
                let pagination = Pagination {
                    current_page: page.current_page,
                    last_page: page.last_page,
                    total: page.total,
                };
                (page.data, pagination)
            }
            _ => return Err(UNEXPECTED_RESPONSE.to_string()),
        };

        let items = match &self.shared.options.transform {
            Some(transform) => items.into_iter().map(|item| transform(item)).collect(),
            None => items,
        };
        Ok((items, pagination))
    }

    /// Delete `id` after `confirm` agrees. Returns whether the server deleted it.
    pub async fn delete_item(&self, id: impl fmt::Display, confirm: &impl Confirm) -> bool {
        if !confirm.confirm(DELETE_PROMPT) {
            debug!("Delete of {} declined", id);
            return false;
        }

        let (epoch, endpoint) = {
            let mut binding = self.binding();
            (binding.begin(true), binding.state.endpoint.clone())
        };

        let request = ApiRequest::new(Method::Delete, format!("{}/{}", endpoint, id));
        let result = self.shared.transport.send(request).await;
        match result.map_err(|e| e.user_message()).and_then(|r| read_envelope(r.body)) {
            Ok(envelope) if envelope.success => {
                info!("Deleted {}/{}", endpoint, id);
                self.succeed(epoch, DELETED);
                true
            }
            Ok(envelope) => {
                self.fail(epoch, envelope.message.unwrap_or_else(|| OPERATION_FAILED.to_string()));
                false
            }
            Err(message) => {
                self.fail(epoch, message);
                false
            }
        }
    }

    /// Create (`id` is `None`) or update a record. Returns the record the
    /// server sent back, or `None` on failure.
    pub async fn save_data(&self, payload: Payload, id: Option<&str>) -> Option<Value> {
        let (epoch, endpoint) = {
            let mut binding = self.binding();
            (binding.begin(true), binding.state.endpoint.clone())
        };

        let request = save_request(&endpoint, self.shared.options.update_method, payload, id);
        let result = self.shared.transport.send(request).await;
        match result.map_err(|e| e.user_message()).and_then(|r| read_envelope(r.body)) {
            Ok(envelope) if envelope.success => {
                let message = if id.is_some() { UPDATED } else { CREATED };
                info!("{} at {}", message, endpoint);
                self.succeed(epoch, message);
                Some(envelope.data)
            }
            Ok(envelope) => {
                self.fail(epoch, envelope.message.unwrap_or_else(|| OPERATION_FAILED.to_string()));
                None
            }
            Err(message) => {
                self.fail(epoch, message);
                None
            }
        }
    }

    pub async fn create(&self, payload: Payload) -> Option<Value> {
        self.save_data(payload, None).await
    }

    pub async fn update(&self, id: impl fmt::Display, payload: Payload) -> Option<Value> {
        let id = id.to_string();
        self.save_data(payload, Some(&id)).await
    }

    /// Fetch one record. Leaves `items` and `pagination` alone.
    pub async fn get_item(&self, id: impl fmt::Display) -> Option<Value> {
        let (epoch, endpoint) = {
            let mut binding = self.binding();
            (binding.begin(false), binding.state.endpoint.clone())
        };

        let request = ApiRequest::new(Method::Get, format!("{}/{}", endpoint, id));
        let result = self.shared.transport.send(request).await;
        match result.map_err(|e| e.user_message()).and_then(|r| read_envelope(r.body)) {
            Ok(envelope) if envelope.success => {
                self.finish(epoch, |_| {});
                Some(envelope.data)
            }
            Ok(envelope) => {
                self.fail(epoch, envelope.message.unwrap_or_else(|| LOAD_FAILED.to_string()));
                None
            }
            Err(message) => {
                self.fail(epoch, message);
                None
            }
        }
    }

    fn succeed(&self, epoch: u64, message: &str) {
        let applied = self.finish(epoch, |binding| {
            binding.success_seq += 1;
            binding.state.success = Some(message.to_string());
        });
        if applied {
            self.schedule_follow_up(epoch);
        }
    }

    /// One delayed refetch plus expiry of the success message just set.
    fn schedule_follow_up(&self, epoch: u64) {
        let (cancel, success_seq) = {
            let binding = self.binding();
            (binding.cancel.clone(), binding.success_seq)
        };
        let ControllerConfig {
            refetch_delay,
            success_ttl,
            ..
        } = self.shared.config;

        let controller = self.clone();
        let refetch_cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = refetch_cancel.cancelled() => {}
                _ = tokio::time::sleep(refetch_delay) => {
                    if controller.is_current(epoch) {
                        let params = controller.binding().last_params.clone();
                        debug!("Refetching {} after mutation", controller.endpoint());
                        controller.fetch_page(params).await;
                    }
                }
            }
        });

        let controller = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(success_ttl) => {
                    controller.expire_success(epoch, success_seq);
                }
            }
        });
    }

    fn expire_success(&self, epoch: u64, success_seq: u64) {
        let mut binding = self.binding();
        if binding.epoch == epoch && binding.success_seq == success_seq {
            binding.state.success = None;
        }
    }
}

/// Empty 2xx bodies (e.g. 204 on delete) count as success.
fn read_envelope(body: Value) -> Result<Envelope, String> {
    if body.is_null() {
        return Ok(Envelope {
            success: true,
            data: Value::Null,
            message: None,
        });
    }
    serde_json::from_value(body).map_err(|_| UNEXPECTED_RESPONSE.to_string())
}

fn save_request(
    endpoint: &str,
    update_method: UpdateMethod,
    payload: Payload,
    id: Option<&str>,
) -> ApiRequest {
    let Some(id) = id else {
        let body = match payload {
            Payload::Json(value) => RequestBody::Json(value),
            Payload::Multipart(form) => RequestBody::Multipart(form),
        };
        return ApiRequest::new(Method::Post, endpoint).body(body);
    };

    let path = format!("{}/{}", endpoint, id);
    match (payload, update_method) {
        (Payload::Json(value), UpdateMethod::Put) => {
            ApiRequest::new(Method::Put, path).body(RequestBody::Json(value))
        }
        (Payload::Json(value), UpdateMethod::Post) => {
            ApiRequest::new(Method::Post, path).body(RequestBody::Json(value))
        }
        (Payload::Multipart(form), UpdateMethod::Put) => ApiRequest::new(Method::Post, path)
            .body(RequestBody::Multipart(form.text(METHOD_OVERRIDE_FIELD, "PUT"))),
        (Payload::Multipart(form), UpdateMethod::Post) => {
            ApiRequest::new(Method::Post, path).body(RequestBody::Multipart(form))
        }
    }
}

pub mod config;
pub mod controller;
pub mod error;
#[cfg(test)]
mod mock_transport;
pub mod pagination;
pub mod resources;
pub mod session;
pub mod transport;

pub use config::{ClientConfig, ControllerConfig};
pub use controller::{
    AssumeYes, BindingOptions, CollectionState, Confirm, Payload, ResourceController, UpdateMethod,
};
pub use error::{AdminError, ApiError};
pub use pagination::{PageEntry, Pagination, compute_window, format_window};
pub use resources::AdminResource;
pub use session::{Session, SessionStore};
pub use transport::{
    ApiRequest, ApiResponse, HttpTransport, Method, MultipartForm, QueryParams, Transport,
};

use std::sync::Arc;

/// Entry point of the admin back-office: one authenticated transport shared
/// by every controller bound through it.
#[derive(Debug, Clone)]
pub struct AdminClient {
    transport: Arc<HttpTransport>,
    controller_config: ControllerConfig,
}

impl AdminClient {
    pub fn new(
        client_config: &ClientConfig,
        controller_config: ControllerConfig,
        session: Session,
    ) -> Result<Self, AdminError> {
        Ok(AdminClient {
            transport: Arc::new(HttpTransport::new(client_config, session)?),
            controller_config,
        })
    }

    pub fn session(&self) -> &Session {
        self.transport.session()
    }

    pub fn transport(&self) -> &Arc<HttpTransport> {
        &self.transport
    }

    /// Each call returns an independent binding, even for the same resource.
    pub fn controller(&self, resource: AdminResource) -> ResourceController<HttpTransport> {
        ResourceController::for_resource(
            Arc::clone(&self.transport),
            resource,
            self.controller_config,
        )
    }

    pub fn bind(
        &self,
        endpoint: impl Into<String>,
        options: BindingOptions,
    ) -> ResourceController<HttpTransport> {
        ResourceController::new(
            Arc::clone(&self.transport),
            endpoint,
            options,
            self.controller_config,
        )
    }
}

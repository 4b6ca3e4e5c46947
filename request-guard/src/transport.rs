use crate::{
    config::GuardConfig,
    error::{ConfigError, GuardError},
    guard::Guard,
    overrides::RequestOverride,
    request::RequestDescriptor,
    response::HttpResponse,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Performs the actual network round trip
#[async_trait]
pub trait Transport: Send + Sync {
    type Error: Send + Sync + 'static;

    async fn send(&self, request: &RequestDescriptor) -> Result<HttpResponse, Self::Error>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    type Error = T::Error;

    async fn send(&self, request: &RequestDescriptor) -> Result<HttpResponse, Self::Error> {
        (**self).send(request).await
    }
}

/// A transport with a [`Guard`] injected into its send path
pub struct GuardedClient<T: Transport> {
    transport: T,
    guard: Arc<Guard<T::Error>>,
}

impl<T: Transport> GuardedClient<T> {
    pub fn new(transport: T, config: GuardConfig) -> Result<Self, ConfigError> {
        Ok(Self::with_guard(transport, Arc::new(Guard::new(config)?)))
    }

    /// Shares `guard` with other clients of the same transport type
    pub fn with_guard(transport: T, guard: Arc<Guard<T::Error>>) -> Self {
        Self { transport, guard }
    }

    pub fn guard(&self) -> &Arc<Guard<T::Error>> {
        &self.guard
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub async fn send(
        &self,
        request: &RequestDescriptor,
        overrides: Option<&RequestOverride>,
    ) -> Result<HttpResponse, GuardError<T::Error>> {
        self.guard
            .on_send(request, overrides, || self.transport.send(request))
            .await
    }
}

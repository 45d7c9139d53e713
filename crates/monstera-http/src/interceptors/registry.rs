//! Per-client middleware registrations, at most one per type

use std::{collections::HashMap, sync::Arc, time::Duration};

use parking_lot::Mutex;
use tracing::debug;

use super::{
    AuthInterceptor, ErrorHandlingInterceptor, LoggingInterceptor, MiddlewareType,
    RequestInterceptor, ResponseInterceptor, RetryInterceptor, RetryPolicy,
};
use crate::client::{ApiClient, ClientId, HandlerId, WeakApiClient};

/// Handlers attached to a client for one middleware type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptorRegistration {
    pub kind: MiddlewareType,
    pub request_handler_ids: Vec<HandlerId>,
    pub response_handler_ids: Vec<HandlerId>,
}

struct ClientRegistrations {
    client: WeakApiClient,
    registrations: Vec<InterceptorRegistration>,
}

/// Deduplicating registry of client middleware
///
/// Rows are keyed by [`ClientId`] and hold only weak client handles, so the
/// registry never keeps a client alive.
#[derive(Default)]
pub struct InterceptorRegistry {
    clients: Mutex<HashMap<ClientId, ClientRegistrations>>,
}

impl InterceptorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a registration of `kind` unless one exists
    ///
    /// Returns `true` when this call created the registration. No handlers
    /// are attached; use the `setup_*` methods for that.
    pub fn register_once(&self, client: &ApiClient, kind: MiddlewareType) -> bool {
        self.attach(client, kind, None, None)
    }

    /// Force credentials on requests and observe 401 responses
    pub fn setup_auth(&self, client: &ApiClient) -> bool {
        let auth = Arc::new(AuthInterceptor);
        self.attach(
            client,
            MiddlewareType::Auth,
            Some(auth.clone() as Arc<dyn RequestInterceptor>),
            Some(auth as Arc<dyn ResponseInterceptor>),
        )
    }

    /// Log requests and their outcome with duration
    pub fn setup_logging(&self, client: &ApiClient) -> bool {
        let logging = Arc::new(LoggingInterceptor);
        self.attach(
            client,
            MiddlewareType::Logging,
            Some(logging.clone() as Arc<dyn RequestInterceptor>),
            Some(logging as Arc<dyn ResponseInterceptor>),
        )
    }

    /// Resubmit requests failing with a retryable status
    pub fn setup_retry(&self, client: &ApiClient, max_retries: u32, retry_delay: Duration) -> bool {
        let retry = RetryInterceptor::new(RetryPolicy::new(max_retries, retry_delay));
        self.attach(
            client,
            MiddlewareType::Retry,
            None,
            Some(Arc::new(retry) as Arc<dyn ResponseInterceptor>),
        )
    }

    /// Normalise errors into descriptors
    pub fn setup_error_handling(&self, client: &ApiClient) -> bool {
        self.attach(
            client,
            MiddlewareType::Error,
            None,
            Some(Arc::new(ErrorHandlingInterceptor) as Arc<dyn ResponseInterceptor>),
        )
    }

    /// Attach caller-supplied handlers under [`MiddlewareType::Custom`]
    pub fn register_custom(
        &self,
        client: &ApiClient,
        request: Option<Arc<dyn RequestInterceptor>>,
        response: Option<Arc<dyn ResponseInterceptor>>,
    ) -> bool {
        self.attach(client, MiddlewareType::Custom, request, response)
    }

    fn attach(
        &self,
        client: &ApiClient,
        kind: MiddlewareType,
        request: Option<Arc<dyn RequestInterceptor>>,
        response: Option<Arc<dyn ResponseInterceptor>>,
    ) -> bool {
        let mut clients = self.clients.lock();
        prune(&mut clients);

        let row = clients
            .entry(client.id())
            .or_insert_with(|| ClientRegistrations {
                client: client.downgrade(),
                registrations: Vec::new(),
            });
        if row.registrations.iter().any(|r| r.kind == kind) {
            debug!(client = %client.id(), kind = %kind, "Middleware already registered");
            return false;
        }

        let request_handler_ids = request
            .map(|handler| vec![client.request_interceptors().add(handler)])
            .unwrap_or_default();
        let response_handler_ids = response
            .map(|handler| vec![client.response_interceptors().add(handler)])
            .unwrap_or_default();

        row.registrations.push(InterceptorRegistration {
            kind,
            request_handler_ids,
            response_handler_ids,
        });
        debug!(client = %client.id(), kind = %kind, "Middleware registered");
        true
    }

    /// Eject the handlers of one type and forget the registration
    pub fn remove(&self, client: &ApiClient, kind: MiddlewareType) -> bool {
        let mut clients = self.clients.lock();
        prune(&mut clients);

        let Some(row) = clients.get_mut(&client.id()) else {
            return false;
        };
        let Some(index) = row.registrations.iter().position(|r| r.kind == kind) else {
            return false;
        };

        let registration = row.registrations.remove(index);
        eject(client, &registration);
        if row.registrations.is_empty() {
            clients.remove(&client.id());
        }
        true
    }

    /// Eject every registered handler of the client
    pub fn remove_all(&self, client: &ApiClient) {
        let mut clients = self.clients.lock();
        prune(&mut clients);

        if let Some(row) = clients.remove(&client.id()) {
            for registration in &row.registrations {
                eject(client, registration);
            }
            debug!(client = %client.id(), removed = row.registrations.len(), "Removed all middleware");
        }
    }

    pub fn is_registered(&self, client: &ApiClient, kind: MiddlewareType) -> bool {
        self.clients
            .lock()
            .get(&client.id())
            .is_some_and(|row| row.registrations.iter().any(|r| r.kind == kind))
    }

    /// Registered types in registration order
    pub fn registered_types(&self, client: &ApiClient) -> Vec<MiddlewareType> {
        self.clients
            .lock()
            .get(&client.id())
            .map(|row| row.registrations.iter().map(|r| r.kind).collect())
            .unwrap_or_default()
    }

    pub fn registration(&self, client: &ApiClient, kind: MiddlewareType) -> Option<InterceptorRegistration> {
        self.clients
            .lock()
            .get(&client.id())
            .and_then(|row| row.registrations.iter().find(|r| r.kind == kind).cloned())
    }

    /// Number of live clients with at least one registration
    pub fn tracked_clients(&self) -> usize {
        self.clients
            .lock()
            .values()
            .filter(|row| row.client.is_alive())
            .count()
    }
}

fn prune(clients: &mut HashMap<ClientId, ClientRegistrations>) {
    clients.retain(|_, row| row.client.is_alive());
}

fn eject(client: &ApiClient, registration: &InterceptorRegistration) {
    for id in &registration.request_handler_ids {
        client.request_interceptors().eject(*id);
    }
    for id in &registration.response_handler_ids {
        client.response_interceptors().eject(*id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        client::ClientSettings,
        error::{ErrorKind, HttpError},
        interceptors::Exchange,
        mock::MockTransport,
        request::{ApiRequest, ApiResponse},
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter {
        requests: AtomicUsize,
        responses: AtomicUsize,
    }

    #[async_trait]
    impl RequestInterceptor for Counter {
        async fn on_request(&self, request: ApiRequest) -> crate::Result<ApiRequest> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            Ok(request)
        }
    }

    #[async_trait]
    impl ResponseInterceptor for Counter {
        async fn on_response(
            &self,
            outcome: crate::Result<ApiResponse>,
            _exchange: &Exchange<'_>,
        ) -> crate::Result<ApiResponse> {
            self.responses.fetch_add(1, Ordering::SeqCst);
            outcome
        }
    }

    fn client() -> ApiClient {
        ApiClient::new(
            ClientSettings::new("http://api.test"),
            Arc::new(MockTransport::new()),
        )
    }

    #[test]
    fn test_setup_is_idempotent() {
        let registry = InterceptorRegistry::new();
        let client = client();

        assert!(registry.setup_auth(&client));
        assert!(!registry.setup_auth(&client));
        assert_eq!(client.request_interceptors().len(), 1);
        assert_eq!(client.response_interceptors().len(), 1);
        assert_eq!(registry.registered_types(&client), vec![MiddlewareType::Auth]);
    }

    #[tokio::test]
    async fn test_double_setup_runs_handlers_once() {
        let transport = Arc::new(MockTransport::new());
        let client = ApiClient::new(ClientSettings::new("http://api.test"), transport.clone());
        let registry = InterceptorRegistry::new();
        let counter = Arc::new(Counter::default());

        for _ in 0..2 {
            registry.setup_auth(&client);
            registry.setup_logging(&client);
            registry.setup_error_handling(&client);
            registry.register_custom(
                &client,
                Some(counter.clone() as Arc<dyn RequestInterceptor>),
                Some(counter.clone() as Arc<dyn ResponseInterceptor>),
            );
        }

        let response = client.get("/expenses").await.unwrap();
        assert!(response.is_success());
        assert_eq!(transport.call_count(), 1);
        assert_eq!(counter.requests.load(Ordering::SeqCst), 1);
        assert_eq!(counter.responses.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_retry_setup_resubmits_once() {
        let transport = Arc::new(MockTransport::new().with_statuses([503, 200]));
        let client = ApiClient::new(ClientSettings::new("http://api.test"), transport.clone());
        let registry = InterceptorRegistry::new();

        assert!(registry.setup_retry(&client, 3, Duration::from_millis(10)));
        assert!(!registry.setup_retry(&client, 3, Duration::from_millis(10)));

        client.get("/expenses").await.unwrap();
        assert_eq!(transport.call_count(), 2);
    }

    #[test]
    fn test_register_once_guards_setup() {
        let registry = InterceptorRegistry::new();
        let client = client();

        assert!(registry.register_once(&client, MiddlewareType::Retry));
        assert!(!registry.setup_retry(&client, 3, Duration::from_millis(10)));
        assert!(client.response_interceptors().is_empty());
    }

    #[test]
    fn test_registered_types_keep_order() {
        let registry = InterceptorRegistry::new();
        let client = client();

        registry.setup_auth(&client);
        registry.setup_logging(&client);
        registry.setup_retry(&client, 3, Duration::from_millis(10));
        registry.setup_error_handling(&client);

        assert_eq!(
            registry.registered_types(&client),
            vec![
                MiddlewareType::Auth,
                MiddlewareType::Logging,
                MiddlewareType::Retry,
                MiddlewareType::Error,
            ]
        );
        assert_eq!(client.request_interceptors().len(), 2);
        assert_eq!(client.response_interceptors().len(), 4);
    }

    #[test]
    fn test_remove_ejects_handlers() {
        let registry = InterceptorRegistry::new();
        let client = client();
        registry.setup_auth(&client);
        registry.setup_error_handling(&client);

        assert!(registry.remove(&client, MiddlewareType::Auth));
        assert!(!registry.remove(&client, MiddlewareType::Auth));
        assert!(!registry.is_registered(&client, MiddlewareType::Auth));
        assert!(client.request_interceptors().is_empty());
        assert_eq!(client.response_interceptors().len(), 1);

        // Can be registered again after removal
        assert!(registry.setup_auth(&client));
    }

    #[test]
    fn test_remove_all() {
        let registry = InterceptorRegistry::new();
        let client = client();
        registry.setup_auth(&client);
        registry.setup_logging(&client);

        registry.remove_all(&client);
        assert!(registry.registered_types(&client).is_empty());
        assert!(client.request_interceptors().is_empty());
        assert!(client.response_interceptors().is_empty());
        assert_eq!(registry.tracked_clients(), 0);
    }

    #[test]
    fn test_dropped_clients_are_pruned() {
        let registry = InterceptorRegistry::new();
        let kept = client();
        {
            let dropped = client();
            registry.setup_auth(&dropped);
            assert_eq!(registry.tracked_clients(), 1);
        }
        assert_eq!(registry.tracked_clients(), 0);

        registry.setup_auth(&kept);
        assert_eq!(registry.clients.lock().len(), 1);
    }

    #[test]
    fn test_registrations_are_per_client() {
        let registry = InterceptorRegistry::new();
        let first = client();
        let second = client();

        assert!(registry.setup_auth(&first));
        assert!(registry.setup_auth(&second));
        assert!(!registry.is_registered(&first, MiddlewareType::Retry));
    }

    #[tokio::test]
    async fn test_error_handling_wraps_once() {
        let registry = InterceptorRegistry::new();
        let client = ApiClient::new(
            ClientSettings::new("http://api.test"),
            Arc::new(MockTransport::new().with_statuses([403])),
        );
        registry.setup_error_handling(&client);
        registry.setup_error_handling(&client);

        let err = client.get("/admin").await.unwrap_err();
        let descriptor = err.descriptor().unwrap();
        assert_eq!(descriptor.kind, ErrorKind::Forbidden);
        assert!(matches!(
            err,
            HttpError::Handled { ref source, .. } if !source.is_handled()
        ));
    }

    #[test]
    fn test_registration_records_handler_ids() {
        let registry = InterceptorRegistry::new();
        let client = client();
        registry.setup_logging(&client);

        let registration = registry.registration(&client, MiddlewareType::Logging).unwrap();
        assert_eq!(registration.request_handler_ids, client.request_interceptors().ids());
        assert_eq!(registration.response_handler_ids, client.response_interceptors().ids());
    }
}

//! Route registry keyed by `(action, body element name)`.

use crate::envelope::Envelope;
use crate::error::{DispatchError, SoapError};
use crate::handler::{Context, Handler};
use crate::parser::EnvelopeView;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

/// Routing key: transport action plus body element local name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteKey {
    pub action: String,
    pub element: String,
}

impl RouteKey {
    pub fn new(action: impl Into<String>, element: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            element: element.into(),
        }
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.action, self.element)
    }
}

/// Invocation prepared from a decoded request; resolves to the encoded
/// response envelope.
pub(crate) type Invocation = BoxFuture<'static, Result<String, DispatchError>>;

/// Type-erased route: decodes the typed slots, then runs the handler.
trait ErasedHandler: Send + Sync {
    fn prepare(&self, view: &EnvelopeView<'_>, ctx: Context) -> Result<Invocation, DispatchError>;
}

struct TypedHandler<H, B, T> {
    handler: Arc<T>,
    _slots: PhantomData<fn() -> (H, B)>,
}

impl<H, B, T> ErasedHandler for TypedHandler<H, B, T>
where
    H: DeserializeOwned + Default + Send + 'static,
    B: DeserializeOwned + Send + 'static,
    T: Handler<H, B>,
{
    fn prepare(&self, view: &EnvelopeView<'_>, ctx: Context) -> Result<Invocation, DispatchError> {
        let header: H = view
            .decode_header()
            .map_err(DispatchError::InvalidPayload)?
            .unwrap_or_default();
        let body: B = view.decode_body().map_err(DispatchError::InvalidPayload)?;

        let version = ctx.version();
        let handler = Arc::clone(&self.handler);
        Ok(Box::pin(async move {
            let output = handler
                .call(ctx, header, body)
                .await
                .map_err(DispatchError::Handler)?;
            Envelope::<(), _>::new(output)
                .encode(version)
                .map_err(DispatchError::Encode)
        }))
    }
}

/// A registered route.
pub struct Route {
    key: RouteKey,
    path: String,
    handler: Box<dyn ErasedHandler>,
}

impl Route {
    pub fn key(&self) -> &RouteKey {
        &self.key
    }

    /// Path given at registration. Informational only; it plays no part in
    /// routing.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Decode the typed header and body from `view` and return the pending
    /// handler call.
    pub(crate) fn prepare(
        &self,
        view: &EnvelopeView<'_>,
        ctx: Context,
    ) -> Result<Invocation, DispatchError> {
        self.handler.prepare(view, ctx)
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("key", &self.key)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Registered routes.
///
/// Built with `&mut` access before serving, then shared read-only (usually
/// behind an `Arc`) by the dispatcher.
#[derive(Debug, Default)]
pub struct RouteRegistry {
    routes: HashMap<RouteKey, Arc<Route>>,
}

impl RouteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for requests with `action` whose body element is
    /// named `element`.
    ///
    /// The header and body types are taken from the handler's signature. An
    /// absent header reaches the handler as `H::default()`.
    pub fn register<H, B, T>(
        &mut self,
        path: impl Into<String>,
        action: impl Into<String>,
        element: impl Into<String>,
        handler: T,
    ) -> Result<&mut Self, SoapError>
    where
        H: DeserializeOwned + Default + Send + 'static,
        B: DeserializeOwned + Send + 'static,
        T: Handler<H, B>,
    {
        let key = RouteKey::new(action, element);
        if self.routes.contains_key(&key) {
            return Err(SoapError::DuplicateRoute {
                action: key.action,
                element: key.element,
            });
        }

        let route = Route {
            key: key.clone(),
            path: path.into(),
            handler: Box::new(TypedHandler::<H, B, T> {
                handler: Arc::new(handler),
                _slots: PhantomData,
            }),
        };
        debug!(route = %key, path = %route.path, "Registered SOAP route");
        self.routes.insert(key, Arc::new(route));
        Ok(self)
    }

    /// Exact-match lookup.
    pub fn resolve(&self, action: &str, element: &str) -> Option<Arc<Route>> {
        self.routes.get(&RouteKey::new(action, element)).cloned()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &RouteKey> {
        self.routes.keys()
    }
}

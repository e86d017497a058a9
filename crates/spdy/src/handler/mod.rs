//! Application entry point of a stream.
//!
//! A session calls [`Handler::serve`] once per accepted stream, on a task of
//! its own. The handler reads the request body from the request and answers
//! through the [`ResponseWriter`]; whatever it leaves open is completed once
//! it returns.

use std::future::Future;

use async_trait::async_trait;
use http::Request;

use crate::protocol::body::RequestBody;
use crate::session::ResponseWriter;

#[async_trait]
pub trait Handler: Send + Sync {
    async fn serve(&self, request: Request<RequestBody>, response: ResponseWriter);
}

#[derive(Debug)]
pub struct HandlerFn<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(Request<RequestBody>, ResponseWriter) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send,
{
    async fn serve(&self, request: Request<RequestBody>, response: ResponseWriter) {
        (self.f)(request, response).await;
    }
}

/// Turns an async closure into a [`Handler`].
///
/// ```
/// use micro_spdy::handler::make_handler;
/// use micro_spdy::protocol::body::RequestBody;
/// use micro_spdy::session::ResponseWriter;
/// use http::Request;
///
/// let handler = make_handler(|_request: Request<RequestBody>, response: ResponseWriter| async move {
///     let _ = response.write("hello").await;
/// });
/// ```
pub fn make_handler<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(Request<RequestBody>, ResponseWriter) -> Fut,
    Fut: Future<Output = ()>,
{
    HandlerFn { f }
}

use crate::{jwt::Jwt, params::Params};
use anyhow::Result;
pub use hyper::{Body, Method, StatusCode};
use std::{future::Future, pin::Pin, sync::Arc};

pub type Request = hyper::Request<Body>;

/// The future returned by a route handler.
pub type Response = Pin<Box<dyn Future<Output = Result<hyper::Response<Body>>> + Send>>;

/// The future returned by a [`Serve`] implementation.
pub type ServeFuture = Pin<Box<dyn Future<Output = hyper::Response<Body>> + Send>>;

/// The one handler shape the router stores: the request, the parameters captured
/// by the match and the claims of the caller.
pub type Route = Arc<dyn Fn(Request, Params, Jwt) -> Response + Send + Sync>;

/// Wraps an async function or closure into a [`Route`].
pub fn route<F, Fut>(handler: F) -> Route
where
	F: Fn(Request, Params, Jwt) -> Fut + Send + Sync + 'static,
	Fut: Future<Output = Result<hyper::Response<Body>>> + Send + 'static,
{
	Arc::new(move |req: Request, params: Params, jwt: Jwt| -> Response {
		Box::pin(handler(req, params, jwt))
	})
}

/// Anything that turns a request into a response.
///
/// Used for the not found and method not allowed fallbacks and for plain
/// handlers that have no use for parameters or claims. [`Router`](crate::Router)
/// implements it, so a router can be the fallback of another.
pub trait Serve: Send + Sync + 'static {
	fn serve(&self, req: Request) -> ServeFuture;
}

impl<S: Serve + ?Sized> Serve for Arc<S> {
	fn serve(&self, req: Request) -> ServeFuture {
		(**self).serve(req)
	}
}

impl<S: Serve + ?Sized> Serve for Box<S> {
	fn serve(&self, req: Request) -> ServeFuture {
		(**self).serve(req)
	}
}

/// A [`Serve`] built from a closure, see [`handler_fn`].
pub struct HandlerFn<F> {
	f: F,
}

/// Turns an async function taking only the request into a [`Serve`].
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
	F: Fn(Request) -> Fut + Send + Sync + 'static,
	Fut: Future<Output = hyper::Response<Body>> + Send + 'static,
{
	HandlerFn { f }
}

impl<F, Fut> Serve for HandlerFn<F>
where
	F: Fn(Request) -> Fut + Send + Sync + 'static,
	Fut: Future<Output = hyper::Response<Body>> + Send + 'static,
{
	fn serve(&self, req: Request) -> ServeFuture {
		Box::pin((self.f)(req))
	}
}

/// Adapts a [`Serve`] into a [`Route`]. The parameters and claims are moved
/// into the request extensions so the inner handler can still reach them.
pub(crate) fn serve_route<S: Serve>(inner: S) -> Route {
	let inner = Arc::new(inner);
	Arc::new(move |mut req: Request, params: Params, jwt: Jwt| -> Response {
		req.extensions_mut().insert(params);
		req.extensions_mut().insert(jwt);
		let fut = inner.serve(req);
		Box::pin(async move { Ok::<_, anyhow::Error>(fut.await) })
	})
}

use crate::{route::Request, Router};
use hyper::{body::Body, service::Service};
use std::{
	convert::Infallible,
	future::{ready, Future, Ready},
	pin::Pin,
	sync::Arc,
	task::{Context, Poll},
};

/// Hands out a [`RouterService`] for every connection accepted by hyper.
///
/// ```no_run
/// # async fn run(router: jwt_router::Router) -> Result<(), hyper::Error> {
/// let addr = ([127, 0, 0, 1], 3000).into();
/// hyper::Server::bind(&addr).serve(router.into_service()).await
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct MakeRouterService {
	router: Arc<Router>,
}

impl From<Router> for MakeRouterService {
	fn from(router: Router) -> Self {
		Self {
			router: Arc::new(router),
		}
	}
}

impl Router {
	pub fn into_service(self) -> MakeRouterService {
		MakeRouterService::from(self)
	}
}

impl<T> Service<T> for MakeRouterService {
	type Response = RouterService;
	type Error = Infallible;
	type Future = Ready<Result<Self::Response, Self::Error>>;

	fn poll_ready(&mut self, _: &mut Context) -> Poll<Result<(), Self::Error>> {
		Poll::Ready(Ok(()))
	}

	fn call(&mut self, _: T) -> Self::Future {
		ready(Ok(RouterService {
			router: Arc::clone(&self.router),
		}))
	}
}

/// Responsible for handling the actual HTTP requests from hyper.
#[derive(Debug, Clone)]
pub struct RouterService {
	router: Arc<Router>,
}

impl Service<Request> for RouterService {
	type Response = hyper::Response<Body>;
	type Error = Infallible;
	type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

	fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
		Poll::Ready(Ok(()))
	}

	fn call(&mut self, req: Request) -> Self::Future {
		let fut = self.router.serve(req);
		Box::pin(async move { Ok(fut.await) })
	}
}

//! A radix tree HTTP router built on hyper that hands bearer token claims to every handler.
//!
//! ```no_run
//! use jwt_router::{Body, Jwt, Params, Request, Router};
//!
//! async fn hello(_req: Request, params: Params, jwt: Jwt) -> anyhow::Result<hyper::Response<Body>> {
//! 	let body = format!("hello {}, you are {}", params.by_name("name"), jwt.user_id);
//! 	Ok(hyper::Response::new(body.into()))
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! 	let addr = ([127, 0, 0, 1], 3000).into();
//!
//! 	let mut router = Router::default();
//! 	router.get("/hello/:name", hello);
//!
//! 	let server = hyper::Server::bind(&addr).serve(router.into_service());
//! 	println!("Listening on http://{}", addr);
//!
//! 	server.await?;
//! 	Ok(())
//! }
//! ```
//!
//! Patterns are made of static text, named parameters (`/user/:name`) matching
//! one non-empty path segment, and catch-all parameters (`/src/*filepath`)
//! matching everything to the end of the path, leading slash included. Only one
//! route can match any given request, so a parameter can never share its
//! position with a static segment.
//!
//! Requests that match nothing may be redirected (trailing slash or case
//! fixes), answered with 405 or an automatic OPTIONS response, or passed to the
//! not found handler. See [`Router::serve`] for the precedence.

mod config;
mod error;
mod files;
mod http;
mod impersonate;
mod jwt;
mod params;
mod path;
mod route;
mod router;
mod tree;

pub use hyper;

pub use config::RouterConfig;
pub use error::{AuthError, InsertError};
pub use files::{Dir, FileSystem, OpenFuture};
pub use http::{MakeRouterService, RouterService};
pub use impersonate::Impersonate;
#[cfg(feature = "impersonate")]
pub use impersonate::ImpersonateError;
pub use jwt::{ClaimsResolver, Jwt, JwtConfig, JwtResolver, Resource};
pub use params::{Param, Params};
pub use path::clean_path;
pub use route::{
	handler_fn, route, Body, HandlerFn, Method, Request, Response, Route, Serve, ServeFuture,
	StatusCode,
};
pub use router::{InternalErrorHandler, PanicHandler, Router};
pub use tree::{Lookup, Tree};

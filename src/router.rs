use crate::{
	config::RouterConfig,
	error::InsertError,
	files::{file_route, FileSystem},
	jwt::{ClaimsResolver, Jwt, JwtConfig, JwtResolver},
	params::Params,
	path::clean_path,
	route::{route, serve_route, Request, Route, Serve, ServeFuture},
	tree::{Lookup, Tree},
};
use anyhow::{Error, Result};
use futures::FutureExt;
use hyper::{
	body::Body,
	header::{HeaderValue, ALLOW, AUTHORIZATION, LOCATION},
	Method, Response, StatusCode, Uri,
};
use std::{
	any::Any,
	fmt::{self, Debug, Formatter},
	future::{ready, Future},
	panic::{self, AssertUnwindSafe},
	sync::Arc,
};
use tracing::{debug, error, warn};

/// A function that can convert a handler error into a response.
pub type InternalErrorHandler = fn(e: Error) -> Response<Body>;

fn default_error_handler(e: Error) -> Response<Body> {
	status_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string().into())
}

fn default_not_found_handler() -> Response<Body> {
	status_response(StatusCode::NOT_FOUND, Body::empty())
}

fn default_method_not_allowed_handler() -> Response<Body> {
	let reason = StatusCode::METHOD_NOT_ALLOWED.canonical_reason().unwrap_or_default();
	status_response(StatusCode::METHOD_NOT_ALLOWED, reason.into())
}

/// Turns the panic of a handler into a response, given the method and URI of
/// the request it was handling.
pub type PanicHandler = Arc<dyn Fn(&Method, &Uri, Box<dyn Any + Send>) -> Response<Body> + Send + Sync>;

/// Dispatches requests to handlers registered per method and path pattern.
///
/// Patterns are made of literal bytes, `:name` parameters matching exactly one
/// non-empty path segment, and a trailing `*name` catch-all matching the rest of
/// the path. A request matches at most one route.
///
/// All routes must be registered before the router starts serving; it is then
/// shared read-only between requests.
pub struct Router {
	trees: Vec<(Method, Tree<Route>)>,

	/// Redirect to the same path with the trailing slash added or removed when
	/// only that variant has a handler. GET and HEAD get a 301, other methods a
	/// 307.
	pub redirect_trailing_slash: bool,

	/// Clean the path and retry the lookup case-insensitively, redirecting to
	/// the registered spelling if that finds a handler.
	pub redirect_fixed_path: bool,

	/// Answer 405 with an `Allow` header when another method has a handler for
	/// the path.
	pub handle_method_not_allowed: bool,

	/// Answer OPTIONS requests that have no handler of their own.
	pub handle_options: bool,

	not_found: Option<Arc<dyn Serve>>,
	method_not_allowed: Option<Arc<dyn Serve>>,
	panic_handler: Option<PanicHandler>,
	internal_error: InternalErrorHandler,
	claims: Arc<dyn ClaimsResolver>,
}

impl Default for Router {
	fn default() -> Self {
		Self::from_config(RouterConfig::default())
	}
}

impl Debug for Router {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Router")
			.field("methods", &self.trees.iter().map(|(method, _)| method).collect::<Vec<_>>())
			.field("redirect_trailing_slash", &self.redirect_trailing_slash)
			.field("redirect_fixed_path", &self.redirect_fixed_path)
			.field("handle_method_not_allowed", &self.handle_method_not_allowed)
			.field("handle_options", &self.handle_options)
			.finish()
	}
}

macro_rules! method_helpers {
	($($name:ident => $method:ident),* $(,)?) => {
		$(
			#[doc = concat!("Shortcut for `handle(Method::", stringify!($method), ", path, handler)`.")]
			pub fn $name<F, Fut>(&mut self, path: &str, handler: F) -> &mut Self
			where
				F: Fn(Request, Params, Jwt) -> Fut + Send + Sync + 'static,
				Fut: Future<Output = Result<Response<Body>>> + Send + 'static,
			{
				self.handle(Method::$method, path, handler)
			}
		)*
	};
}

impl Router {
	/// A router with every redirect and automatic response enabled, resolving
	/// claims with a [`JwtResolver`] built from `jwt`.
	pub fn new(jwt: JwtConfig) -> Self {
		Self::from_config(RouterConfig {
			jwt,
			..RouterConfig::default()
		})
	}

	pub fn from_config(config: RouterConfig) -> Self {
		Self {
			trees: Vec::new(),
			redirect_trailing_slash: config.redirect_trailing_slash,
			redirect_fixed_path: config.redirect_fixed_path,
			handle_method_not_allowed: config.handle_method_not_allowed,
			handle_options: config.handle_options,
			not_found: None,
			method_not_allowed: None,
			panic_handler: None,
			internal_error: default_error_handler,
			claims: Arc::new(JwtResolver::new(config.jwt)),
		}
	}

	/// Replaces the claims resolver consulted before every handler call.
	pub fn claims_resolver(&mut self, resolver: impl ClaimsResolver) -> &mut Self {
		self.claims = Arc::new(resolver);
		self
	}

	method_helpers! {
		get => GET,
		head => HEAD,
		options => OPTIONS,
		post => POST,
		put => PUT,
		patch => PATCH,
		delete => DELETE,
	}

	/// Registers `handler` for `method` requests matching `path`.
	///
	/// # Panics
	///
	/// If the pattern is malformed or conflicts with an already registered one.
	/// See [`Router::try_handle`] for a fallible version.
	pub fn handle<F, Fut>(&mut self, method: Method, path: &str, handler: F) -> &mut Self
	where
		F: Fn(Request, Params, Jwt) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = Result<Response<Body>>> + Send + 'static,
	{
		self.register(method, path, route(handler))
	}

	/// Registers a plain [`Serve`] handler. The matched [`Params`] and the
	/// caller's [`Jwt`] are available from the request extensions.
	pub fn handler(&mut self, method: Method, path: &str, handler: impl Serve) -> &mut Self {
		self.register(method, path, serve_route(handler))
	}

	/// Serves files from `fs`. The pattern must end with `/*filepath`, whose
	/// value, without its leading slash, is the name handed to `fs`:
	///
	/// ```ignore
	/// router.serve_files("/src/*filepath", Dir::new("/var/www"));
	/// ```
	///
	/// # Panics
	///
	/// If `path` does not end with `/*filepath`.
	pub fn serve_files(&mut self, path: &str, fs: impl FileSystem) -> &mut Self {
		if !path.ends_with("/*filepath") {
			panic!("path must end with /*filepath in path '{}'", path);
		}
		self.register(Method::GET, path, file_route(fs))
	}

	/// Registers `route`, reporting a malformed or conflicting pattern instead
	/// of panicking.
	pub fn try_handle(&mut self, method: Method, path: &str, route: Route) -> Result<(), InsertError> {
		let (pos, created) = match self.trees.iter().position(|(m, _)| *m == method) {
			Some(pos) => (pos, false),
			None => {
				self.trees.push((method.clone(), Tree::new()));
				(self.trees.len() - 1, true)
			}
		};

		if let Err(e) = self.trees[pos].1.insert(path, route) {
			if created {
				self.trees.pop();
			}
			return Err(e);
		}

		debug!(%method, path, "registered route");
		Ok(())
	}

	fn register(&mut self, method: Method, path: &str, route: Route) -> &mut Self {
		if let Err(e) = self.try_handle(method, path, route) {
			panic!("{}", e);
		}
		self
	}

	/// Handles requests no route matches. Defaults to an empty 404.
	///
	/// Another [`Router`] works here too, chaining the two.
	pub fn not_found(&mut self, handler: impl Serve) -> &mut Self {
		self.not_found = Some(Arc::new(handler));
		self
	}

	/// Handles requests whose path only has handlers for other methods. The
	/// `Allow` header is added to whatever it returns.
	pub fn method_not_allowed(&mut self, handler: impl Serve) -> &mut Self {
		self.method_not_allowed = Some(Arc::new(handler));
		self
	}

	/// Recovers from handler panics. Without one, a panic propagates out of the
	/// future returned by [`Router::serve`].
	pub fn panic_handler<F>(&mut self, handler: F) -> &mut Self
	where
		F: Fn(&Method, &Uri, Box<dyn Any + Send>) -> Response<Body> + Send + Sync + 'static,
	{
		self.panic_handler = Some(Arc::new(handler));
		self
	}

	/// Converts errors returned by handlers into responses. Defaults to a 500
	/// carrying the error message.
	pub fn internal_error_handler(&mut self, handler: InternalErrorHandler) -> &mut Self {
		self.internal_error = handler;
		self
	}

	fn tree(&self, method: &Method) -> Option<&Tree<Route>> {
		self.trees
			.iter()
			.find(|(m, _)| m == method)
			.map(|(_, tree)| tree)
	}

	/// Looks up the route for `method` and `path` without any of the redirect
	/// or error handling of [`Router::serve`].
	pub fn lookup(&self, method: &Method, path: &str) -> Lookup<'_, Route> {
		match self.tree(method) {
			Some(tree) => tree.lookup(path),
			None => Lookup::Missing { tsr: false },
		}
	}

	/// Dispatches one request.
	///
	/// In order: the matched handler; a trailing slash redirect; a redirect to
	/// the cleaned, case corrected path; the automatic OPTIONS response; 405;
	/// the not found handler.
	pub fn serve(&self, req: Request) -> ServeFuture {
		let uri = req.uri().clone();
		let path = uri.path();
		let method = req.method().clone();

		if let Some(tree) = self.tree(&method) {
			match tree.lookup(path) {
				Lookup::Found(route, params) => return self.invoke(route, params, req),
				Lookup::Missing { tsr } => {
					if method != Method::CONNECT && path != "/" && path.starts_with('/') {
						let status = if method == Method::GET || method == Method::HEAD {
							StatusCode::MOVED_PERMANENTLY
						} else {
							StatusCode::TEMPORARY_REDIRECT
						};

						if tsr && self.redirect_trailing_slash {
							let location = match path.strip_suffix('/') {
								Some(trimmed) => trimmed.to_owned(),
								None => format!("{}/", path),
							};
							debug!(%method, path, %location, "trailing slash redirect");
							return Box::pin(ready(redirect(status, &location, uri.query())));
						}

						if self.redirect_fixed_path {
							let fixed =
								tree.find_case_insensitive_path(&clean_path(path), self.redirect_trailing_slash);
							if let Some(location) = fixed {
								debug!(%method, path, %location, "fixed path redirect");
								return Box::pin(ready(redirect(status, &location, uri.query())));
							}
						}
					}
				}
			}
		}

		if method == Method::OPTIONS && self.handle_options {
			if let Some(allow) = self.allowed(path, &method) {
				let mut res = Response::new(Body::empty());
				res.headers_mut().insert(ALLOW, allow);
				return Box::pin(ready(res));
			}
		} else if self.handle_method_not_allowed {
			if let Some(allow) = self.allowed(path, &method) {
				debug!(%method, path, allow = ?allow, "method not allowed");
				return match &self.method_not_allowed {
					Some(handler) => {
						let fut = handler.serve(req);
						Box::pin(async move {
							let mut res = fut.await;
							res.headers_mut().insert(ALLOW, allow);
							res
						})
					}
					None => {
						let mut res = default_method_not_allowed_handler();
						res.headers_mut().insert(ALLOW, allow);
						Box::pin(ready(res))
					}
				};
			}
		}

		match &self.not_found {
			Some(handler) => handler.serve(req),
			None => Box::pin(ready(default_not_found_handler())),
		}
	}

	/// Runs a matched handler behind the claims check and the panic boundary.
	fn invoke(&self, route: &Route, params: Params, req: Request) -> ServeFuture {
		let authorization = req
			.headers()
			.get(AUTHORIZATION)
			.and_then(|value| value.to_str().ok());

		let jwt = match self.claims.resolve(authorization) {
			Ok(jwt) => jwt,
			Err(e) => {
				warn!(method = %req.method(), path = req.uri().path(), error = %e, "rejected request");
				return Box::pin(ready(e.into_response()));
			}
		};

		let route = Arc::clone(route);
		let internal_error = self.internal_error;
		let panic_handler = self
			.panic_handler
			.clone()
			.map(|handler| (handler, req.method().clone(), req.uri().clone()));

		Box::pin(async move {
			let outcome = AssertUnwindSafe(async move { route(req, params, jwt).await })
				.catch_unwind()
				.await;

			match outcome {
				Ok(Ok(res)) => res,
				Ok(Err(e)) => {
					error!(error = %e, "handler failed");
					internal_error(e)
				}
				Err(payload) => match panic_handler {
					Some((handler, method, uri)) => {
						warn!(%method, path = uri.path(), "recovered from handler panic");
						handler(&method, &uri, payload)
					}
					None => panic::resume_unwind(payload),
				},
			}
		})
	}

	/// The `Allow` header value for `path`, if any other method can serve it.
	///
	/// Methods are listed in the order their first route was registered,
	/// followed by OPTIONS. For `*` every method with at least one route is
	/// listed.
	fn allowed(&self, path: &str, req_method: &Method) -> Option<HeaderValue> {
		let mut allow: Vec<&str> = if path == "*" {
			self.trees
				.iter()
				.filter(|(method, _)| *method != Method::OPTIONS)
				.map(|(method, _)| method.as_str())
				.collect()
		} else {
			self.trees
				.iter()
				.filter(|(method, tree)| {
					method != req_method && *method != Method::OPTIONS && tree.lookup(path).is_found()
				})
				.map(|(method, _)| method.as_str())
				.collect()
		};

		if allow.is_empty() {
			return None;
		}
		allow.push(Method::OPTIONS.as_str());
		HeaderValue::from_str(&allow.join(", ")).ok()
	}
}

impl Serve for Router {
	fn serve(&self, req: Request) -> ServeFuture {
		Router::serve(self, req)
	}
}

fn status_response(status: StatusCode, body: Body) -> Response<Body> {
	let mut res = Response::new(body);
	*res.status_mut() = status;
	res
}

fn redirect(status: StatusCode, path: &str, query: Option<&str>) -> Response<Body> {
	let location = match query {
		Some(query) => format!("{}?{}", path, query),
		None => path.to_owned(),
	};

	let mut res = status_response(status, Body::empty());
	if let Ok(value) = HeaderValue::from_bytes(location.as_bytes()) {
		res.headers_mut().insert(LOCATION, value);
	}
	res
}

#[cfg(test)]
mod test {
	use super::Router;
	use crate::{
		error::AuthError,
		files::{FileSystem, OpenFuture},
		jwt::{test_token, Jwt, JwtConfig},
		params::{Param, Params},
		route::{handler_fn, Request},
		tree::Lookup,
		RouterConfig,
	};
	use futures::FutureExt;
	use hyper::{header, Body, Method, Response, StatusCode};
	use std::{
		future::{ready, Ready},
		io,
		panic::{self, AssertUnwindSafe},
		sync::{
			atomic::{AtomicBool, Ordering},
			Arc, Mutex,
		},
	};

	fn request(method: Method, uri: &str) -> Request {
		hyper::Request::builder()
			.method(method)
			.uri(uri)
			.body(Body::empty())
			.unwrap()
	}

	async fn ok(_: Request, _: Params, _: Jwt) -> anyhow::Result<Response<Body>> {
		Ok(Response::new(Body::empty()))
	}

	fn flag() -> Arc<AtomicBool> {
		Arc::new(AtomicBool::new(false))
	}

	fn mark(
		flag: &Arc<AtomicBool>,
	) -> impl Fn(Request, Params, Jwt) -> Ready<anyhow::Result<Response<Body>>> + Send + Sync + 'static {
		let flag = Arc::clone(flag);
		move |_, _, _| {
			flag.store(true, Ordering::SeqCst);
			ready(Ok(Response::new(Body::empty())))
		}
	}

	fn allow(res: &Response<Body>) -> &str {
		res.headers()
			.get(header::ALLOW)
			.and_then(|value| value.to_str().ok())
			.unwrap_or_default()
	}

	fn location(res: &Response<Body>) -> &str {
		res.headers()
			.get(header::LOCATION)
			.and_then(|value| value.to_str().ok())
			.unwrap_or_default()
	}

	async fn body(res: Response<Body>) -> String {
		let bytes = hyper::body::to_bytes(res.into_body()).await.unwrap();
		String::from_utf8(bytes.to_vec()).unwrap()
	}

	#[tokio::test]
	async fn routes_with_params() {
		let mut router = Router::default();
		router.handle(Method::GET, "/user/:name", |_, params: Params, _| async move {
			assert_eq!(params, Params::from(vec![Param::new("name", "gopher")]));
			Ok(Response::new(Body::from(params.by_name("name").to_owned())))
		});

		let res = router.serve(request(Method::GET, "/user/gopher")).await;
		assert_eq!(res.status(), StatusCode::OK);
		assert_eq!(body(res).await, "gopher");
	}

	#[tokio::test]
	async fn routes_every_method() {
		let (get, head, options, post, put, patch, delete, handler) =
			(flag(), flag(), flag(), flag(), flag(), flag(), flag(), flag());

		let mut router = Router::default();
		router
			.get("/GET", mark(&get))
			.head("/GET", mark(&head))
			.options("/GET", mark(&options))
			.post("/POST", mark(&post))
			.put("/PUT", mark(&put))
			.patch("/PATCH", mark(&patch))
			.delete("/DELETE", mark(&delete));

		let handled = Arc::clone(&handler);
		router.handler(
			Method::GET,
			"/Handler",
			handler_fn(move |_| {
				handled.store(true, Ordering::SeqCst);
				ready(Response::new(Body::empty()))
			}),
		);

		let calls = [
			(Method::GET, "/GET", &get),
			(Method::HEAD, "/GET", &head),
			(Method::OPTIONS, "/GET", &options),
			(Method::POST, "/POST", &post),
			(Method::PUT, "/PUT", &put),
			(Method::PATCH, "/PATCH", &patch),
			(Method::DELETE, "/DELETE", &delete),
			(Method::GET, "/Handler", &handler),
		];
		for (method, path, flag) in calls {
			router.serve(request(method.clone(), path)).await;
			assert!(flag.load(Ordering::SeqCst), "routing {} {} failed", method, path);
		}
	}

	#[tokio::test]
	async fn custom_methods() {
		let hit = flag();
		let mut router = Router::default();
		let purge = Method::from_bytes(b"PURGE").unwrap();
		router.handle(purge.clone(), "/cache/*key", mark(&hit));

		let res = router.serve(request(purge, "/cache/a/b")).await;
		assert_eq!(res.status(), StatusCode::OK);
		assert!(hit.load(Ordering::SeqCst));

		let res = router.serve(request(Method::OPTIONS, "/cache/a")).await;
		assert_eq!(allow(&res), "PURGE, OPTIONS");
	}

	#[test]
	fn rejects_paths_without_leading_slash() {
		let result = panic::catch_unwind(|| {
			Router::default().get("noSlashRoot", ok);
		});
		assert!(result.is_err());
	}

	#[test]
	fn rejects_duplicate_routes() {
		let result = panic::catch_unwind(|| {
			Router::default().get("/path", ok).get("/path", ok);
		});
		assert!(result.is_err());
	}

	#[test]
	fn failed_registration_leaves_no_method_behind() {
		let mut router = Router::default();
		let route = crate::route::route(ok);
		assert!(router.try_handle(Method::PUT, "noSlash", route).is_err());
		assert!(router.allowed("*", &Method::OPTIONS).is_none());
	}

	#[tokio::test]
	async fn chains_routers() {
		let (foo, bar) = (flag(), flag());

		let mut fallback = Router::default();
		fallback.post("/bar", mark(&bar));

		let mut router = Router::default();
		router.post("/foo", mark(&foo)).not_found(fallback);

		let res = router.serve(request(Method::POST, "/foo")).await;
		assert!(res.status() == StatusCode::OK && foo.load(Ordering::SeqCst));

		let res = router.serve(request(Method::POST, "/bar")).await;
		assert!(res.status() == StatusCode::OK && bar.load(Ordering::SeqCst));

		let res = router.serve(request(Method::POST, "/qax")).await;
		assert_eq!(res.status(), StatusCode::NOT_FOUND);
	}

	#[tokio::test]
	async fn answers_options() {
		let mut router = Router::default();
		router.post("/path", ok);

		// server wide
		let res = router.serve(request(Method::OPTIONS, "*")).await;
		assert_eq!(res.status(), StatusCode::OK);
		assert_eq!(allow(&res), "POST, OPTIONS");

		let res = router.serve(request(Method::OPTIONS, "/path")).await;
		assert_eq!(res.status(), StatusCode::OK);
		assert_eq!(allow(&res), "POST, OPTIONS");
		assert_eq!(body(res).await, "");

		let res = router.serve(request(Method::OPTIONS, "/doesnotexist")).await;
		assert_eq!(res.status(), StatusCode::NOT_FOUND);

		router.get("/path", ok);

		let res = router.serve(request(Method::OPTIONS, "*")).await;
		assert_eq!(res.status(), StatusCode::OK);
		assert_eq!(allow(&res), "POST, GET, OPTIONS");

		let res = router.serve(request(Method::OPTIONS, "/path")).await;
		assert_eq!(res.status(), StatusCode::OK);
		assert_eq!(allow(&res), "POST, GET, OPTIONS");

		// an explicit handler wins, but not for the server wide form
		let custom = flag();
		router.options("/path", mark(&custom));

		let res = router.serve(request(Method::OPTIONS, "*")).await;
		assert_eq!(res.status(), StatusCode::OK);
		assert_eq!(allow(&res), "POST, GET, OPTIONS");
		assert!(!custom.load(Ordering::SeqCst), "custom handler called on *");

		let res = router.serve(request(Method::OPTIONS, "/path")).await;
		assert_eq!(res.status(), StatusCode::OK);
		assert!(custom.load(Ordering::SeqCst), "custom handler not called");
	}

	#[tokio::test]
	async fn options_and_method_not_allowed_agree() {
		let mut router = Router::default();
		router.get("/path", ok);

		let res = router.serve(request(Method::OPTIONS, "/path")).await;
		assert_eq!(res.status(), StatusCode::OK);
		assert_eq!(allow(&res), "GET, OPTIONS");

		let res = router.serve(request(Method::PATCH, "/path")).await;
		assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
		assert_eq!(allow(&res), "GET, OPTIONS");

		router.delete("/path", ok);
		let res = router.serve(request(Method::PATCH, "/path")).await;
		assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
		let mut methods: Vec<&str> = allow(&res).split(", ").collect();
		methods.sort_unstable();
		assert_eq!(methods, ["DELETE", "GET", "OPTIONS"]);
	}

	#[tokio::test]
	async fn answers_method_not_allowed() {
		let mut router = Router::default();
		router.post("/path", ok);

		let res = router.serve(request(Method::GET, "/path")).await;
		assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
		assert_eq!(allow(&res), "POST, OPTIONS");

		// the OPTIONS route is not listed twice
		router.delete("/path", ok).options("/path", ok);

		let res = router.serve(request(Method::GET, "/path")).await;
		assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
		assert_eq!(allow(&res), "POST, DELETE, OPTIONS");

		router.method_not_allowed(handler_fn(|_| async {
			let mut res = Response::new(Body::from("custom method"));
			*res.status_mut() = StatusCode::IM_A_TEAPOT;
			res
		}));

		let res = router.serve(request(Method::GET, "/path")).await;
		assert_eq!(res.status(), StatusCode::IM_A_TEAPOT);
		assert_eq!(allow(&res), "POST, DELETE, OPTIONS");
		assert_eq!(body(res).await, "custom method");
	}

	#[tokio::test]
	async fn method_not_allowed_can_be_disabled() {
		let mut router = Router::default();
		router.post("/path", ok);
		router.handle_method_not_allowed = false;

		let res = router.serve(request(Method::GET, "/path")).await;
		assert_eq!(res.status(), StatusCode::NOT_FOUND);
	}

	#[tokio::test]
	async fn redirects_and_not_found() {
		let mut router = Router::default();
		router.get("/path", ok).get("/dir/", ok).get("/", ok);

		let cases = [
			("/path/", StatusCode::MOVED_PERMANENTLY, "/path"),
			("/dir", StatusCode::MOVED_PERMANENTLY, "/dir/"),
			("/PATH", StatusCode::MOVED_PERMANENTLY, "/path"),
			("/DIR/", StatusCode::MOVED_PERMANENTLY, "/dir/"),
			("/PATH/", StatusCode::MOVED_PERMANENTLY, "/path"),
			("/DIR", StatusCode::MOVED_PERMANENTLY, "/dir/"),
			("/../path", StatusCode::MOVED_PERMANENTLY, "/path"),
			("/nope", StatusCode::NOT_FOUND, ""),
		];
		for (path, status, expected) in cases {
			let res = router.serve(request(Method::GET, path)).await;
			assert_eq!(res.status(), status, "status for {}", path);
			assert_eq!(location(&res), expected, "location for {}", path);
		}

		// HEAD redirects like GET
		router.head("/path", ok);
		let res = router.serve(request(Method::HEAD, "/path/")).await;
		assert_eq!(res.status(), StatusCode::MOVED_PERMANENTLY);

		// other methods keep their verb and body
		router.patch("/path", ok);
		let res = router.serve(request(Method::PATCH, "/path/")).await;
		assert_eq!(res.status(), StatusCode::TEMPORARY_REDIRECT);
		assert_eq!(location(&res), "/path");
		assert_eq!(res.headers().len(), 1);

		let not_found = flag();
		let hit = Arc::clone(&not_found);
		router.not_found(handler_fn(move |_| {
			hit.store(true, Ordering::SeqCst);
			let mut res = Response::new(Body::empty());
			*res.status_mut() = StatusCode::NOT_FOUND;
			ready(res)
		}));
		let res = router.serve(request(Method::GET, "/nope")).await;
		assert_eq!(res.status(), StatusCode::NOT_FOUND);
		assert!(not_found.load(Ordering::SeqCst));
	}

	#[tokio::test]
	async fn empty_segments_never_reach_param_handlers() {
		let called = flag();
		let mut router = Router::default();
		router.get("/user/:name", ok).get("/user/:name/x", mark(&called));

		let res = router.serve(request(Method::GET, "/user//x")).await;
		assert_eq!(res.status(), StatusCode::MOVED_PERMANENTLY);
		assert_eq!(location(&res), "/user/x");

		router.redirect_fixed_path = false;
		let res = router.serve(request(Method::GET, "/user//x")).await;
		assert_eq!(res.status(), StatusCode::NOT_FOUND);
		assert!(!called.load(Ordering::SeqCst));
	}

	#[tokio::test]
	async fn root_is_never_redirected() {
		let mut router = Router::default();
		router.get("/a", ok);

		let res = router.serve(request(Method::GET, "/")).await;
		assert_eq!(res.status(), StatusCode::NOT_FOUND);
	}

	#[tokio::test]
	async fn redirects_keep_the_query() {
		let mut router = Router::default();
		router.get("/search/", ok);

		let res = router.serve(request(Method::GET, "/SEARCH?q=rust")).await;
		assert_eq!(res.status(), StatusCode::MOVED_PERMANENTLY);
		assert_eq!(location(&res), "/search/?q=rust");
	}

	#[tokio::test]
	async fn redirects_can_be_disabled() {
		let mut router = Router::from_config(RouterConfig {
			redirect_trailing_slash: false,
			redirect_fixed_path: false,
			..RouterConfig::default()
		});
		router.get("/path", ok);

		for path in ["/path/", "/PATH", "/../path"] {
			let res = router.serve(request(Method::GET, path)).await;
			assert_eq!(res.status(), StatusCode::NOT_FOUND, "status for {}", path);
		}
	}

	#[tokio::test]
	async fn connect_is_never_redirected() {
		let mut router = Router::default();
		router.handle(Method::CONNECT, "/path", ok);

		let res = router.serve(request(Method::CONNECT, "/path/")).await;
		assert_eq!(res.status(), StatusCode::NOT_FOUND);
	}

	async fn explode(_: Request, _: Params, _: Jwt) -> anyhow::Result<Response<Body>> {
		panic!("oops!")
	}

	#[tokio::test]
	async fn recovers_from_panics() {
		let recovered = flag();
		let seen = Arc::clone(&recovered);

		let mut router = Router::default();
		router
			.put("/user/:name", explode)
			.get("/user/:name", ok)
			.panic_handler(move |method, uri, payload| {
				assert_eq!(payload.downcast_ref::<&str>(), Some(&"oops!"));
				seen.store(true, Ordering::SeqCst);
				let mut res = Response::new(Body::from(format!("recovered {} {}", method, uri.path())));
				*res.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
				res
			});

		let res = router.serve(request(Method::PUT, "/user/gopher")).await;
		assert!(recovered.load(Ordering::SeqCst));
		assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
		assert_eq!(body(res).await, "recovered PUT /user/gopher");

		// still serving
		let res = router.serve(request(Method::GET, "/user/gopher")).await;
		assert_eq!(res.status(), StatusCode::OK);
	}

	#[tokio::test]
	async fn panics_propagate_without_a_handler() {
		let mut router = Router::default();
		router.put("/user/:name", explode);

		let outcome = AssertUnwindSafe(router.serve(request(Method::PUT, "/user/gopher")))
			.catch_unwind()
			.await;
		assert!(outcome.is_err());
	}

	#[tokio::test]
	async fn handler_errors_become_responses() {
		let mut router = Router::default();
		router.get("/fail", |_, _, _| async { Err(anyhow::anyhow!("boom")) });

		let res = router.serve(request(Method::GET, "/fail")).await;
		assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
		assert_eq!(body(res).await, "boom");

		router.internal_error_handler(|_| {
			let mut res = Response::new(Body::empty());
			*res.status_mut() = StatusCode::BAD_GATEWAY;
			res
		});
		let res = router.serve(request(Method::GET, "/fail")).await;
		assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
	}

	#[tokio::test]
	async fn looks_up_without_side_effects() {
		let routed = flag();
		let mut router = Router::default();

		let lookup = router.lookup(&Method::GET, "/nope");
		assert!(!lookup.is_found() && !lookup.tsr());

		router.get("/user/:name", mark(&routed));

		match router.lookup(&Method::GET, "/user/gopher") {
			Lookup::Found(route, params) => {
				assert_eq!(params, Params::from(vec![Param::new("name", "gopher")]));
				route(Request::default(), params, Jwt::default()).await.unwrap();
				assert!(routed.load(Ordering::SeqCst));
			}
			Lookup::Missing { .. } => panic!("no route for /user/gopher"),
		}

		let lookup = router.lookup(&Method::GET, "/user/gopher/");
		assert!(!lookup.is_found() && lookup.tsr());

		let lookup = router.lookup(&Method::GET, "/nope");
		assert!(!lookup.is_found() && !lookup.tsr());
	}

	struct MockFileSystem {
		opened: Arc<Mutex<Option<String>>>,
	}

	impl FileSystem for MockFileSystem {
		fn open(&self, name: &str) -> OpenFuture {
			*self.opened.lock().unwrap() = Some(name.to_owned());
			Box::pin(ready(Err(io::Error::new(io::ErrorKind::NotFound, "this is just a mock"))))
		}
	}

	#[tokio::test]
	async fn serves_files() {
		let opened = Arc::new(Mutex::new(None));

		let result = panic::catch_unwind(|| {
			Router::default().serve_files(
				"/noFilepath",
				MockFileSystem {
					opened: Arc::new(Mutex::new(None)),
				},
			);
		});
		assert!(result.is_err(), "registering path not ending with '*filepath' did not panic");

		let mut router = Router::default();
		router.serve_files(
			"/*filepath",
			MockFileSystem {
				opened: Arc::clone(&opened),
			},
		);

		let res = router.serve(request(Method::GET, "/favicon.ico")).await;
		assert_eq!(res.status(), StatusCode::NOT_FOUND);
		assert_eq!(opened.lock().unwrap().as_deref(), Some("favicon.ico"));
	}

	#[tokio::test]
	async fn hands_claims_to_handlers() {
		let mut router = Router::new(JwtConfig {
			force_auth: true,
			..JwtConfig::default()
		});
		let called = flag();
		let hit = Arc::clone(&called);
		router.get("/me", move |_, _, jwt: Jwt| {
			hit.store(true, Ordering::SeqCst);
			async move { Ok(Response::new(Body::from(jwt.user_id))) }
		});

		let res = router.serve(request(Method::GET, "/me")).await;
		assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
		assert!(!called.load(Ordering::SeqCst));

		let token = test_token(&serde_json::json!({ "sub": "gopher" }));
		let req = hyper::Request::builder()
			.uri("/me")
			.header(header::AUTHORIZATION, format!("Bearer {}", token))
			.body(Body::empty())
			.unwrap();
		let res = router.serve(req).await;
		assert_eq!(res.status(), StatusCode::OK);
		assert_eq!(body(res).await, "gopher");
	}

	#[tokio::test]
	async fn rejects_unsigned_tokens_when_a_key_is_set() {
		let mut router = Router::new(JwtConfig {
			pub_rsa: "MIIBIjANBgkqhkiG9w0BAQEFAAOCAQ8AMIIBCgKCAQEArtCf+3iRv+ggyudqAYMAbpTORqsmC6jXttn9QyfxGkr0GWbV/Z+LT2x/oFvXGFAP1qjQL/YO+Sngwe+cICeuFFmIowI506KO2AK8OBdn0inKyouwDE2yBEBTVognJ7Ftz7xQoGB5qUsSBFkQM8btMKshRyaanGLEvvSPzR94hU/yAfWoTWMk5/skXi7X5HqeUR1U2127RE2azusKWPTQ4+0fVnZx6WM5f87A4YUwJJuuapqPnvQK1rqxbt2s5aZQnDVA8cwze1/LBsodlAC/XBLZ/bKMG2ELyUKr5jyGUk6Q3hmJ2W+E+4Ub0jfPSWVZDH/fh3qpwWiKB7+dPpymzQIDAQAB".into(),
			..JwtConfig::default()
		});
		let called = flag();
		router.get("/me", mark(&called));

		let token = test_token(&serde_json::json!({ "sub": "gopher" }));
		let req = hyper::Request::builder()
			.uri("/me")
			.header(header::AUTHORIZATION, format!("Bearer {}", token))
			.body(Body::empty())
			.unwrap();
		let res = router.serve(req).await;
		assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
		assert!(body(res).await.starts_with("token signature is not valid"));
		assert!(!called.load(Ordering::SeqCst));

		let res = router.serve(request(Method::GET, "/me")).await;
		assert_eq!(res.status(), StatusCode::OK);
	}

	#[tokio::test]
	async fn claims_are_only_resolved_for_matches() {
		let mut router = Router::new(JwtConfig {
			force_auth: true,
			..JwtConfig::default()
		});
		router.get("/path", ok);

		let res = router.serve(request(Method::GET, "/path/")).await;
		assert_eq!(res.status(), StatusCode::MOVED_PERMANENTLY);

		let res = router.serve(request(Method::POST, "/path")).await;
		assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
	}

	#[tokio::test]
	async fn custom_claims_resolvers() {
		let mut router = Router::default();
		router
			.claims_resolver(|authorization: Option<&str>| -> Result<Jwt, AuthError> {
				Ok(Jwt {
					user_id: authorization.unwrap_or("anonymous").to_owned(),
					..Jwt::default()
				})
			})
			.get("/me", |_, _, jwt: Jwt| async move { Ok(Response::new(Body::from(jwt.user_id))) });

		let res = router.serve(request(Method::GET, "/me")).await;
		assert_eq!(body(res).await, "anonymous");
	}
}

use jwt_router::{
	hyper::{Body, Response, Server, StatusCode},
	Dir, Jwt, JwtConfig, Params, Request, Router,
};
use tracing_subscriber::EnvFilter;

async fn index(_req: Request, _params: Params, _jwt: Jwt) -> anyhow::Result<Response<Body>> {
	Ok(Response::new(Body::from("Welcome!\n")))
}

async fn hello(_req: Request, params: Params, jwt: Jwt) -> anyhow::Result<Response<Body>> {
	let user = if jwt.user_id.is_empty() { "anonymous" } else { &jwt.user_id };
	Ok(Response::new(Body::from(format!(
		"hello, {}! (token subject: {})\n",
		params.by_name("name"),
		user
	))))
}

async fn admin(_req: Request, _params: Params, jwt: Jwt) -> anyhow::Result<Response<Body>> {
	if !jwt.has_realm_role("admin") {
		let mut res = Response::new(Body::from("admins only\n"));
		*res.status_mut() = StatusCode::FORBIDDEN;
		return Ok(res);
	}
	Ok(Response::new(Body::from(format!("{:#?}\n", jwt.claims))))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
		.init();

	let addr = ([127, 0, 0, 1], 3000).into();

	let mut router = Router::new(JwtConfig::default());
	router
		.get("/", index)
		.get("/hello/:name", hello)
		.get("/admin/", admin)
		.serve_files("/src/*filepath", Dir::new(concat!(env!("CARGO_MANIFEST_DIR"), "/src")))
		.panic_handler(|method, uri, _| {
			let mut res = Response::new(Body::from(format!("{} {} went wrong\n", method, uri.path())));
			*res.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
			res
		});

	let server = Server::bind(&addr).serve(router.into_service());
	println!("Listening on http://{}", addr);

	server.await?;
	Ok(())
}

use crate::{
	jwt::Jwt,
	params::Params,
	path::clean_path,
	route::{route, Request, Route},
};
use hyper::{
	header::{HeaderValue, CONTENT_TYPE},
	Body, Response, StatusCode,
};
use std::{
	future::Future,
	io,
	path::{Path, PathBuf},
	pin::Pin,
	sync::Arc,
};
use tracing::debug;

pub type OpenFuture = Pin<Box<dyn Future<Output = io::Result<Vec<u8>>> + Send>>;

/// A source of files for [`Router::serve_files`](crate::Router::serve_files).
///
/// Names are relative and use `/` as separator. They come straight from the
/// request path, so implementations must not let them escape their root.
pub trait FileSystem: Send + Sync + 'static {
	fn open(&self, name: &str) -> OpenFuture;
}

/// Files below a directory of the local file system.
#[derive(Debug, Clone)]
pub struct Dir(PathBuf);

impl Dir {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self(root.into())
	}
}

impl FileSystem for Dir {
	fn open(&self, name: &str) -> OpenFuture {
		// cleaning a rooted path drops every `..` that would climb out
		let path = self.0.join(clean_path(name).trim_start_matches('/'));

		Box::pin(async move {
			if tokio::fs::metadata(&path).await?.is_dir() {
				return Err(io::Error::new(io::ErrorKind::NotFound, "is a directory"));
			}
			tokio::fs::read(&path).await
		})
	}
}

pub(crate) fn file_route(fs: impl FileSystem) -> Route {
	let fs = Arc::new(fs);
	route(move |_: Request, params: Params, _: Jwt| {
		let value = params.by_name("filepath");
		let name = value.strip_prefix('/').unwrap_or(value).to_owned();
		let file = fs.open(&name);
		async move { Ok(file_response(&name, file.await)) }
	})
}

fn file_response(name: &str, file: io::Result<Vec<u8>>) -> Response<Body> {
	let contents = match file {
		Ok(contents) => contents,
		Err(e) => {
			let status = match e.kind() {
				io::ErrorKind::NotFound => StatusCode::NOT_FOUND,
				io::ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
				_ => StatusCode::INTERNAL_SERVER_ERROR,
			};
			debug!(name, error = %e, %status, "cannot serve file");

			let mut res = Response::new(Body::from(status.canonical_reason().unwrap_or_default()));
			*res.status_mut() = status;
			return res;
		}
	};

	let mut res = Response::new(Body::from(contents));
	res.headers_mut()
		.insert(CONTENT_TYPE, HeaderValue::from_static(content_type(name)));
	res
}

fn content_type(name: &str) -> &'static str {
	let extension = Path::new(name)
		.extension()
		.and_then(|ext| ext.to_str())
		.unwrap_or_default()
		.to_ascii_lowercase();

	match extension.as_str() {
		"html" | "htm" => "text/html; charset=utf-8",
		"css" => "text/css; charset=utf-8",
		"js" | "mjs" => "text/javascript; charset=utf-8",
		"json" | "map" => "application/json",
		"xml" => "application/xml",
		"txt" => "text/plain; charset=utf-8",
		"csv" => "text/csv; charset=utf-8",
		"md" => "text/markdown; charset=utf-8",
		"png" => "image/png",
		"jpg" | "jpeg" => "image/jpeg",
		"gif" => "image/gif",
		"webp" => "image/webp",
		"svg" => "image/svg+xml",
		"ico" => "image/x-icon",
		"woff" => "font/woff",
		"woff2" => "font/woff2",
		"ttf" => "font/ttf",
		"pdf" => "application/pdf",
		"wasm" => "application/wasm",
		"zip" => "application/zip",
		_ => "application/octet-stream",
	}
}

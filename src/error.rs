use hyper::{Body, Response, StatusCode};
use thiserror::Error;

/// Why a route could not be registered.
///
/// These are programming errors in the route table, not runtime conditions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InsertError {
	#[error("path must begin with '/' in path '{0}'")]
	MissingLeadingSlash(String),

	#[error("wildcards must be named with a non-empty name in path '{0}'")]
	UnnamedWildcard(String),

	#[error("only one wildcard per path segment is allowed, has: '{segment}' in path '{path}'")]
	TooManyWildcards { segment: String, path: String },

	#[error("catch-all routes are only allowed at the end of the path in path '{0}'")]
	CatchAllNotLast(String),

	#[error("no / before catch-all in path '{0}'")]
	MissingSlashBeforeCatchAll(String),

	#[error("catch-all conflicts with existing handle for the path segment root in path '{0}'")]
	CatchAllConflict(String),

	#[error("wildcard route '{wildcard}' conflicts with existing children in path '{path}'")]
	WildcardConflict { wildcard: String, path: String },

	#[error("'{segment}' in new path '{path}' conflicts with existing wildcard '{wildcard}' in existing prefix '{prefix}'")]
	WildcardNameConflict {
		segment: String,
		path: String,
		wildcard: String,
		prefix: String,
	},

	#[error("a handle is already registered for path '{0}'")]
	Duplicate(String),
}

/// Why the claims for a request could not be resolved.
#[derive(Debug, Error)]
pub enum AuthError {
	#[error("missing Authorization header")]
	MissingAuthorization,

	#[error("expect auth string format like '<type> <token>'")]
	MalformedHeader,

	#[error("expect token string format like '<head>.<payload>.<sig>'")]
	MalformedToken,

	#[error("token payload is not valid base64url")]
	InvalidEncoding,

	#[error("token payload is not valid JSON: {0}")]
	InvalidPayload(#[from] serde_json::Error),

	#[error("missing user id")]
	MissingUserId,

	#[error("token signature is not valid: {0}")]
	InvalidSignature(#[from] jsonwebtoken::errors::Error),

	#[error("configured public key is not usable: {0}")]
	InvalidKey(String),
}

impl AuthError {
	/// The response sent in place of the handler when resolution fails.
	pub fn into_response(self) -> Response<Body> {
		let mut res = Response::new(Body::from(self.to_string()));
		*res.status_mut() = StatusCode::UNAUTHORIZED;
		res
	}
}

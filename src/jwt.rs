//! Bearer token claims handed to every matched handler.
//!
//! Without a public key the payload of the token is decoded and its signature
//! is not checked. With [`JwtConfig::pub_rsa`] set, only tokens signed with
//! RS256, RS384 or RS512 by the matching private key get through.

use crate::{error::AuthError, impersonate::Impersonate};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::{collections::HashMap, fmt};
use tracing::{debug, warn};

/// How strictly the default resolver treats the Authorization header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct JwtConfig {
	/// Reject requests without a decodable token.
	pub force_auth: bool,
	/// Reject tokens without a subject.
	pub force_user: bool,
	/// Base64 DER of the RSA public key (SubjectPublicKeyInfo) that signs the
	/// tokens, as printed between the PEM armor lines. Empty disables
	/// signature checks.
	pub pub_rsa: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Resource {
	#[serde(default)]
	pub roles: Vec<String>,
}

/// The claims of the caller.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Jwt {
	#[serde(rename = "sub", default)]
	pub user_id: String,

	#[serde(default)]
	pub resource_access: HashMap<String, Resource>,

	#[serde(default)]
	pub realm_access: Resource,

	/// Every claim of the payload, including the ones above.
	#[serde(skip)]
	pub claims: Map<String, Value>,

	/// The Authorization header the claims came from, for calls made on
	/// behalf of the caller.
	#[serde(skip)]
	pub impersonate: Impersonate,
}

impl Jwt {
	/// Decodes the payload of a `<type> <token>` Authorization header value.
	pub fn from_authorization(authorization: &str) -> Result<Self, AuthError> {
		let token = token_of(authorization)?;
		let segments: Vec<&str> = token.split('.').collect();
		let payload = match segments[..] {
			[_, payload, _] => payload,
			_ => return Err(AuthError::MalformedToken),
		};

		let bytes = decode_segment(payload).ok_or(AuthError::InvalidEncoding)?;
		let claims: Map<String, Value> = serde_json::from_slice(&bytes)?;
		Self::from_claims(claims, authorization)
	}

	fn from_claims(claims: Map<String, Value>, authorization: &str) -> Result<Self, AuthError> {
		let mut jwt: Jwt = serde_json::from_value(Value::Object(claims.clone()))?;
		jwt.claims = claims;
		jwt.impersonate = Impersonate::new(authorization);
		Ok(jwt)
	}

	pub fn has_realm_role(&self, role: &str) -> bool {
		self.realm_access.roles.iter().any(|r| r == role)
	}

	pub fn has_resource_role(&self, resource: &str, role: &str) -> bool {
		self.resource_access
			.get(resource)
			.map_or(false, |access| access.roles.iter().any(|r| r == role))
	}
}

/// Produces the claims for a request from its Authorization header.
///
/// Consulted only once a route has matched. An error rejects the request with
/// a 401 before the handler runs.
pub trait ClaimsResolver: Send + Sync + 'static {
	fn resolve(&self, authorization: Option<&str>) -> Result<Jwt, AuthError>;
}

impl<F> ClaimsResolver for F
where
	F: Fn(Option<&str>) -> Result<Jwt, AuthError> + Send + Sync + 'static,
{
	fn resolve(&self, authorization: Option<&str>) -> Result<Jwt, AuthError> {
		self(authorization)
	}
}

/// The `<token>` of a `<type> <token>` header value.
fn token_of(authorization: &str) -> Result<&str, AuthError> {
	let parts: Vec<&str> = authorization.split(' ').collect();
	match parts[..] {
		[_, token] => Ok(token),
		_ => Err(AuthError::MalformedHeader),
	}
}

/// Checks token signatures against one RSA public key.
#[derive(Clone)]
struct Verifier {
	key: Result<DecodingKey, String>,
	validation: Validation,
}

impl Verifier {
	fn new(pub_rsa: &str) -> Self {
		let key = DecodingKey::from_rsa_pem(public_key_pem(pub_rsa).as_bytes()).map_err(|e| {
			warn!(error = %e, "unusable public key, every token will be rejected");
			e.to_string()
		});

		let mut validation = Validation::new(Algorithm::RS256);
		validation.algorithms = vec![Algorithm::RS256, Algorithm::RS384, Algorithm::RS512];
		// exp and nbf are checked when present but never required
		validation.required_spec_claims.clear();
		validation.validate_nbf = true;
		validation.validate_aud = false;

		Self { key, validation }
	}

	fn verify(&self, authorization: &str) -> Result<Jwt, AuthError> {
		let token = token_of(authorization)?;
		let key = self.key.as_ref().map_err(|e| AuthError::InvalidKey(e.clone()))?;
		let data = jsonwebtoken::decode::<Map<String, Value>>(token, key, &self.validation)?;
		Jwt::from_claims(data.claims, authorization)
	}
}

/// Arms a bare base64 key, wrapped at 64 columns.
fn public_key_pem(pub_rsa: &str) -> String {
	let mut pem = String::from("-----BEGIN PUBLIC KEY-----\n");
	for (i, c) in pub_rsa.split_whitespace().flat_map(str::chars).enumerate() {
		if i > 0 && i % 64 == 0 {
			pem.push('\n');
		}
		pem.push(c);
	}
	pem.push_str("\n-----END PUBLIC KEY-----\n");
	pem
}

/// The resolver every router starts with.
#[derive(Clone)]
pub struct JwtResolver {
	config: JwtConfig,
	verifier: Option<Verifier>,
}

impl JwtResolver {
	/// A key in `config` that cannot be parsed is logged here and rejects
	/// every token later on.
	pub fn new(config: JwtConfig) -> Self {
		let verifier = if config.pub_rsa.trim().is_empty() {
			None
		} else {
			Some(Verifier::new(&config.pub_rsa))
		};
		Self { config, verifier }
	}
}

impl Default for JwtResolver {
	fn default() -> Self {
		Self::new(JwtConfig::default())
	}
}

impl fmt::Debug for JwtResolver {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("JwtResolver")
			.field("config", &self.config)
			.field("verifies", &self.verifier.is_some())
			.finish()
	}
}

impl ClaimsResolver for JwtResolver {
	fn resolve(&self, authorization: Option<&str>) -> Result<Jwt, AuthError> {
		let authorization = authorization.unwrap_or_default();

		let mut jwt = if authorization.is_empty() {
			if self.config.force_auth {
				return Err(AuthError::MissingAuthorization);
			}
			Jwt::default()
		} else if let Some(verifier) = &self.verifier {
			// a bad signature is never downgraded to anonymous
			verifier.verify(authorization).map_err(|e| {
				debug!(error = %e, "rejecting unverified token");
				e
			})?
		} else {
			match Jwt::from_authorization(authorization) {
				Ok(jwt) => jwt,
				Err(e) if self.config.force_auth => return Err(e),
				Err(e) => {
					debug!(error = %e, "ignoring undecodable token");
					Jwt::default()
				}
			}
		};

		if self.config.force_user && jwt.user_id.is_empty() {
			return Err(AuthError::MissingUserId);
		}

		jwt.impersonate = Impersonate::new(authorization);
		Ok(jwt)
	}
}

fn decode_byte(byte: u8) -> Option<u32> {
	let value = match byte {
		b'A'..=b'Z' => byte - b'A',
		b'a'..=b'z' => byte - b'a' + 26,
		b'0'..=b'9' => byte - b'0' + 52,
		b'-' => 62,
		b'_' => 63,
		_ => return None,
	};
	Some(u32::from(value))
}

/// Decodes base64url, with or without padding.
fn decode_segment(segment: &str) -> Option<Vec<u8>> {
	let bytes = segment.trim_end_matches('=').as_bytes();
	if bytes.len() % 4 == 1 {
		return None;
	}

	let mut out = Vec::with_capacity(bytes.len() * 3 / 4);
	for chunk in bytes.chunks(4) {
		let mut word = 0u32;
		for (i, &byte) in chunk.iter().enumerate() {
			word |= decode_byte(byte)? << (18 - 6 * i);
		}
		out.push((word >> 16) as u8);
		if chunk.len() > 2 {
			out.push((word >> 8) as u8);
		}
		if chunk.len() > 3 {
			out.push(word as u8);
		}
	}
	Some(out)
}

/// An unsigned token carrying `claims`.
#[cfg(test)]
pub(crate) fn test_token(claims: &Value) -> String {
	const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

	let payload = claims.to_string();
	let mut encoded = String::new();
	for chunk in payload.as_bytes().chunks(3) {
		let word = chunk
			.iter()
			.enumerate()
			.fold(0u32, |word, (i, &byte)| word | u32::from(byte) << (16 - 8 * i));
		for i in 0..=chunk.len() {
			encoded.push(ALPHABET[(word >> (18 - 6 * i) & 0x3f) as usize] as char);
		}
	}
	format!("eyJhbGciOiJub25lIn0.{}.sig", encoded)
}

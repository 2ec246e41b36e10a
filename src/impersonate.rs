//! Outbound calls made with the identity of the caller.

use std::fmt::{self, Debug, Formatter};

#[cfg(feature = "impersonate")]
use once_cell::sync::Lazy;
#[cfg(feature = "impersonate")]
use reqwest::{
	header::{AUTHORIZATION, CONTENT_TYPE},
	Client, RequestBuilder, Response,
};
#[cfg(feature = "impersonate")]
use serde::{de::DeserializeOwned, Serialize};
#[cfg(feature = "impersonate")]
use std::time::Duration;
#[cfg(feature = "impersonate")]
use thiserror::Error;
#[cfg(feature = "impersonate")]
use tracing::warn;

/// The Authorization header of an inbound request, replayed on outbound calls.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Impersonate(String);

impl Impersonate {
	pub fn new(authorization: impl Into<String>) -> Self {
		Self(authorization.into())
	}

	/// The raw header value, empty for anonymous callers.
	pub fn authorization(&self) -> &str {
		&self.0
	}
}

// never print the credential
impl Debug for Impersonate {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		if self.0.is_empty() {
			f.write_str("Impersonate(none)")
		} else {
			f.write_str("Impersonate(<redacted>)")
		}
	}
}

#[cfg(feature = "impersonate")]
const TIMEOUT: Duration = Duration::from_secs(5);

#[cfg(feature = "impersonate")]
static CLIENT: Lazy<Client> =
	Lazy::new(|| Client::builder().timeout(TIMEOUT).build().unwrap_or_else(|_| Client::new()));

#[cfg(feature = "impersonate")]
#[derive(Debug, Error)]
pub enum ImpersonateError {
	#[error("request failed: {0}")]
	Request(#[from] reqwest::Error),

	#[error("unexpected status {status}: {body}")]
	Status { status: u16, body: String },
}

#[cfg(feature = "impersonate")]
impl Impersonate {
	pub async fn get(&self, url: &str) -> Result<Response, ImpersonateError> {
		check(self.authorize(CLIENT.get(url)).send().await?).await
	}

	pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ImpersonateError> {
		Ok(self.get(url).await?.json().await?)
	}

	pub async fn post(
		&self,
		url: &str,
		content_type: &str,
		body: impl Into<reqwest::Body>,
	) -> Result<Response, ImpersonateError> {
		let req = CLIENT.post(url).header(CONTENT_TYPE, content_type).body(body);
		check(self.authorize(req).send().await?).await
	}

	pub async fn post_json<B, T>(&self, url: &str, body: &B) -> Result<T, ImpersonateError>
	where
		B: Serialize + ?Sized,
		T: DeserializeOwned,
	{
		let res = check(self.authorize(CLIENT.post(url).json(body)).send().await?).await?;
		Ok(res.json().await?)
	}

	fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
		if self.0.is_empty() {
			req
		} else {
			req.header(AUTHORIZATION, self.0.as_str())
		}
	}
}

#[cfg(feature = "impersonate")]
async fn check(res: Response) -> Result<Response, ImpersonateError> {
	let status = res.status().as_u16();
	if status < 300 {
		return Ok(res);
	}

	let url = res.url().to_string();
	let body = res.text().await.unwrap_or_default();
	warn!(%url, status, %body, "impersonated request failed");
	Err(ImpersonateError::Status { status, body })
}

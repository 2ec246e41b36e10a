use crate::jwt::JwtConfig;
use serde::Deserialize;

/// Router switches, loadable from any serde format. Missing fields keep their
/// defaults, so an empty document gives [`RouterConfig::default`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
	pub redirect_trailing_slash: bool,
	pub redirect_fixed_path: bool,
	pub handle_method_not_allowed: bool,
	pub handle_options: bool,
	pub jwt: JwtConfig,
}

impl Default for RouterConfig {
	fn default() -> Self {
		Self {
			redirect_trailing_slash: true,
			redirect_fixed_path: true,
			handle_method_not_allowed: true,
			handle_options: true,
			jwt: JwtConfig::default(),
		}
	}
}

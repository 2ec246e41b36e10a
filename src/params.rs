use std::{slice, vec};

/// A single captured route parameter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Param {
	pub key: String,
	pub value: String,
}

impl Param {
	pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
		Self {
			key: key.into(),
			value: value.into(),
		}
	}
}

/// The parameters captured by one match, in the order they appear in the path.
///
/// Keys are not required to be unique; lookups return the first hit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(Vec<Param>);

impl Params {
	pub fn new() -> Self {
		Self::default()
	}

	pub(crate) fn push(&mut self, key: &[u8], value: &[u8]) {
		self.0.push(Param {
			key: String::from_utf8_lossy(key).into_owned(),
			value: String::from_utf8_lossy(value).into_owned(),
		});
	}

	/// Returns the value of the first parameter named `name`, or `""` if there is none.
	pub fn by_name(&self, name: &str) -> &str {
		self.get(name).unwrap_or_default()
	}

	pub fn get(&self, name: &str) -> Option<&str> {
		self.0
			.iter()
			.find(|param| param.key == name)
			.map(|param| param.value.as_str())
	}

	pub fn iter(&self) -> slice::Iter<'_, Param> {
		self.0.iter()
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

impl From<Vec<Param>> for Params {
	fn from(params: Vec<Param>) -> Self {
		Self(params)
	}
}

impl FromIterator<Param> for Params {
	fn from_iter<I: IntoIterator<Item = Param>>(iter: I) -> Self {
		Self(iter.into_iter().collect())
	}
}

impl IntoIterator for Params {
	type Item = Param;
	type IntoIter = vec::IntoIter<Param>;

	fn into_iter(self) -> Self::IntoIter {
		self.0.into_iter()
	}
}

impl<'a> IntoIterator for &'a Params {
	type Item = &'a Param;
	type IntoIter = slice::Iter<'a, Param>;

	fn into_iter(self) -> Self::IntoIter {
		self.0.iter()
	}
}

//! The per-method radix tree.
//!
//! Nodes live in a flat arena owned by the [`Tree`] and refer to their children
//! by index, so splitting an edge or reordering siblings only ever rewrites the
//! child list of a single node.

use crate::{error::InsertError, params::Params};
use std::mem;

type NodeId = usize;

const ROOT: NodeId = 0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum NodeKind {
	Root,
	#[default]
	Static,
	Param,
	CatchAll,
}

/// A change made by an insert that has to be reverted if the insert fails.
/// Edge splits are not recorded; they never change what a path matches.
#[derive(Debug, Clone, Copy)]
enum Step {
	Priority(NodeId),
	Moved { parent: NodeId, from: usize, to: usize },
	Pushed(NodeId),
}

#[derive(Debug)]
struct Node<T> {
	/// Literal bytes matched by this node. For wildcards this is the token
	/// itself (`:name`, or `/*name` on a catch-all leaf).
	path: Vec<u8>,
	kind: NodeKind,
	/// Set when the only child is a param or catch-all node.
	wild_child: bool,
	/// First byte of each static child's path, parallel to `children`.
	indices: Vec<u8>,
	children: Vec<NodeId>,
	value: Option<T>,
	/// The pattern that registered `value`.
	full_path: String,
	/// Number of values registered in this subtree.
	priority: u32,
}

impl<T> Default for Node<T> {
	fn default() -> Self {
		Self {
			path: Vec::new(),
			kind: NodeKind::default(),
			wild_child: false,
			indices: Vec::new(),
			children: Vec::new(),
			value: None,
			full_path: String::new(),
			priority: 0,
		}
	}
}

/// The outcome of [`Tree::lookup`].
#[derive(Debug)]
pub enum Lookup<'t, T> {
	Found(&'t T, Params),
	/// Nothing is registered for the path. `tsr` is set when the same path
	/// with a trailing slash added or removed would match.
	Missing { tsr: bool },
}

impl<'t, T> Lookup<'t, T> {
	pub fn is_found(&self) -> bool {
		matches!(self, Lookup::Found(..))
	}

	/// Whether a trailing slash redirect is recommended.
	pub fn tsr(&self) -> bool {
		matches!(self, Lookup::Missing { tsr: true })
	}

	pub fn found(self) -> Option<(&'t T, Params)> {
		match self {
			Lookup::Found(value, params) => Some((value, params)),
			Lookup::Missing { .. } => None,
		}
	}

	fn missing(tsr: bool) -> Self {
		Lookup::Missing { tsr }
	}
}

/// A radix tree mapping path patterns to values.
#[derive(Debug)]
pub struct Tree<T> {
	nodes: Vec<Node<T>>,
}

impl<T> Default for Tree<T> {
	fn default() -> Self {
		Self {
			nodes: vec![Node::default()],
		}
	}
}

impl<T> Tree<T> {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers `value` for the pattern `route`.
	///
	/// A failed insert leaves the tree matching exactly what it matched before,
	/// with the same priorities and sibling order.
	pub fn insert(&mut self, route: &str, value: T) -> Result<(), InsertError> {
		validate(route)?;

		let mut journal = Vec::new();
		let result = self.insert_route(route, value, &mut journal);
		if result.is_err() {
			self.rollback(journal);
		}
		result
	}

	fn rollback(&mut self, journal: Vec<Step>) {
		for step in journal.into_iter().rev() {
			match step {
				Step::Priority(n) => self.nodes[n].priority -= 1,
				Step::Moved { parent, from, to } => {
					let node = &mut self.nodes[parent];
					node.children[to..=from].rotate_left(1);
					node.indices[to..=from].rotate_left(1);
				}
				Step::Pushed(parent) => {
					let node = &mut self.nodes[parent];
					node.indices.pop();
					if let Some(child) = node.children.pop() {
						// everything allocated after the child hangs below it
						self.nodes.truncate(child);
					}
				}
			}
		}
	}

	fn bump(&mut self, n: NodeId, journal: &mut Vec<Step>) {
		self.nodes[n].priority += 1;
		journal.push(Step::Priority(n));
	}

	fn insert_route(&mut self, route: &str, value: T, journal: &mut Vec<Step>) -> Result<(), InsertError> {
		let full_path = route;
		let mut path = route.as_bytes();
		let mut n = ROOT;
		self.bump(n, journal);

		if self.nodes[n].path.is_empty() && self.nodes[n].children.is_empty() {
			self.insert_child(n, path, full_path, value)?;
			self.nodes[n].kind = NodeKind::Root;
			return Ok(());
		}

		loop {
			let i = common_prefix(path, &self.nodes[n].path);

			if i < self.nodes[n].path.len() {
				self.split_edge(n, i);
			}

			if i == path.len() {
				let node = &mut self.nodes[n];
				if node.value.is_some() {
					return Err(InsertError::Duplicate(full_path.to_owned()));
				}
				node.value = Some(value);
				node.full_path = full_path.to_owned();
				return Ok(());
			}

			path = &path[i..];

			if self.nodes[n].wild_child {
				n = self.nodes[n].children[0];
				self.bump(n, journal);

				let node = &self.nodes[n];
				let len = node.path.len();
				if path.len() >= len
					&& node.path[..] == path[..len]
					&& node.kind != NodeKind::CatchAll
					&& (len >= path.len() || path[len] == b'/')
				{
					continue;
				}
				if node.kind == NodeKind::CatchAll && node.path[..] == *path {
					return Err(InsertError::Duplicate(full_path.to_owned()));
				}

				let segment = if node.kind == NodeKind::CatchAll {
					path
				} else {
					&path[..segment_end(path, 0)]
				};
				let segment = String::from_utf8_lossy(segment).into_owned();
				let wildcard = String::from_utf8_lossy(&node.path).into_owned();
				let prefix = format!(
					"{}{}",
					&full_path[..full_path.find(&segment).unwrap_or(0)],
					wildcard
				);
				return Err(InsertError::WildcardNameConflict {
					segment,
					path: full_path.to_owned(),
					wildcard,
					prefix,
				});
			}

			let c = path[0];

			// slash after a param
			if self.nodes[n].kind == NodeKind::Param && c == b'/' && self.nodes[n].children.len() == 1 {
				n = self.nodes[n].children[0];
				self.bump(n, journal);
				continue;
			}

			if let Some(pos) = self.nodes[n].indices.iter().position(|&index| index == c) {
				let pos = self.increment_child_priority(n, pos, journal);
				n = self.nodes[n].children[pos];
				continue;
			}

			if c != b':' && c != b'*' {
				let child = self.alloc(Node::default());
				let node = &mut self.nodes[n];
				node.indices.push(c);
				node.children.push(child);
				journal.push(Step::Pushed(n));
				let last = node.children.len() - 1;
				self.increment_child_priority(n, last, journal);
				n = child;
			}
			return self.insert_child(n, path, full_path, value);
		}
	}

	/// Matches `path` against the tree, collecting parameters on the way.
	pub fn lookup(&self, path: &str) -> Lookup<'_, T> {
		let mut path = path.as_bytes();
		let mut n = &self.nodes[ROOT];
		let mut params = Params::new();

		loop {
			let prefix = &n.path[..];

			if path.len() > prefix.len() {
				if path[..prefix.len()] == *prefix {
					path = &path[prefix.len()..];

					if !n.wild_child {
						let c = path[0];
						if let Some(pos) = n.indices.iter().position(|&index| index == c) {
							n = &self.nodes[n.children[pos]];
							continue;
						}

						// a leaf for the path without the trailing slash
						return Lookup::missing(path == b"/" && n.value.is_some());
					}

					n = &self.nodes[n.children[0]];
					match n.kind {
						NodeKind::Param => {
							let end = segment_end(path, 0);
							// a param never matches an empty segment
							if end == 0 {
								return Lookup::missing(false);
							}
							params.push(&n.path[1..], &path[..end]);

							if end < path.len() {
								if let Some(&child) = n.children.first() {
									path = &path[end..];
									n = &self.nodes[child];
									continue;
								}

								return Lookup::missing(path.len() == end + 1);
							}

							if let Some(value) = &n.value {
								return Lookup::Found(value, params);
							}
							if n.children.len() == 1 {
								let child = &self.nodes[n.children[0]];
								return Lookup::missing(child.path == b"/" && child.value.is_some());
							}
							return Lookup::missing(false);
						}
						NodeKind::CatchAll => {
							params.push(&n.path[2..], path);

							return match &n.value {
								Some(value) => Lookup::Found(value, params),
								None => Lookup::missing(false),
							};
						}
						NodeKind::Root | NodeKind::Static => return Lookup::missing(false),
					}
				}
			} else if path == prefix {
				if let Some(value) = &n.value {
					return Lookup::Found(value, params);
				}

				if path == b"/" && n.wild_child && n.kind != NodeKind::Root {
					return Lookup::missing(true);
				}

				// a leaf for the path with a trailing slash
				if let Some(pos) = n.indices.iter().position(|&index| index == b'/') {
					let child = &self.nodes[n.children[pos]];
					return Lookup::missing(self.is_slash_leaf(child));
				}

				return Lookup::missing(false);
			}

			let tsr = path == b"/"
				|| (prefix.len() == path.len() + 1
					&& prefix[path.len()] == b'/'
					&& path == &prefix[..path.len()]
					&& n.value.is_some());
			return Lookup::missing(tsr);
		}
	}

	/// Case-insensitive lookup of `path`, returning it rewritten to the case
	/// it was registered with.
	///
	/// Static segments are compared ASCII case-insensitively; text captured by
	/// parameters and catch-alls is copied unchanged. With `fix_trailing_slash`
	/// a missing or superfluous trailing slash is corrected as well.
	pub fn find_case_insensitive_path(&self, path: &str, fix_trailing_slash: bool) -> Option<String> {
		let mut fixed = Vec::with_capacity(path.len() + 1);
		if self.find_case_insensitive(ROOT, path.as_bytes(), &mut fixed, fix_trailing_slash) {
			String::from_utf8(fixed).ok()
		} else {
			None
		}
	}

	fn find_case_insensitive(
		&self,
		mut n: NodeId,
		mut path: &[u8],
		fixed: &mut Vec<u8>,
		fix_trailing_slash: bool,
	) -> bool {
		loop {
			let node = &self.nodes[n];
			let len = node.path.len();
			if path.len() < len || !path[..len].eq_ignore_ascii_case(&node.path) {
				break;
			}

			path = &path[len..];
			fixed.extend_from_slice(&node.path);

			if path.is_empty() {
				if node.value.is_some() {
					return true;
				}

				if fix_trailing_slash {
					if let Some(pos) = node.indices.iter().position(|&index| index == b'/') {
						if self.is_slash_leaf(&self.nodes[node.children[pos]]) {
							fixed.push(b'/');
							return true;
						}
					}
				}
				return false;
			}

			if !node.wild_child {
				// both cases of the next byte may be registered
				let c = path[0].to_ascii_lowercase();
				for (pos, index) in node.indices.iter().enumerate() {
					if index.to_ascii_lowercase() == c {
						let mark = fixed.len();
						if self.find_case_insensitive(node.children[pos], path, fixed, fix_trailing_slash) {
							return true;
						}
						fixed.truncate(mark);
					}
				}

				return fix_trailing_slash && path == b"/" && node.value.is_some();
			}

			n = node.children[0];
			let node = &self.nodes[n];
			match node.kind {
				NodeKind::Param => {
					let end = segment_end(path, 0);
					if end == 0 {
						return false;
					}
					fixed.extend_from_slice(&path[..end]);

					if end < path.len() {
						if let Some(&child) = node.children.first() {
							path = &path[end..];
							n = child;
							continue;
						}

						return fix_trailing_slash && path.len() == end + 1;
					}

					if node.value.is_some() {
						return true;
					}
					if fix_trailing_slash && node.children.len() == 1 {
						let child = &self.nodes[node.children[0]];
						if child.path == b"/" && child.value.is_some() {
							fixed.push(b'/');
							return true;
						}
					}
					return false;
				}
				NodeKind::CatchAll => {
					fixed.extend_from_slice(path);
					return true;
				}
				NodeKind::Root | NodeKind::Static => return false,
			}
		}

		if !fix_trailing_slash {
			return false;
		}
		if path == b"/" {
			return true;
		}

		let node = &self.nodes[n];
		let len = path.len();
		if len + 1 == node.path.len()
			&& node.path[len] == b'/'
			&& path.eq_ignore_ascii_case(&node.path[..len])
			&& node.value.is_some()
		{
			fixed.extend_from_slice(&node.path);
			return true;
		}
		false
	}

	/// Whether `node`, reached through a `/` index, terminates a route at just
	/// that slash.
	fn is_slash_leaf(&self, node: &Node<T>) -> bool {
		(node.path.len() == 1 && node.value.is_some())
			|| (node.kind == NodeKind::CatchAll
				&& node
					.children
					.first()
					.map_or(false, |&leaf| self.nodes[leaf].value.is_some()))
	}

	fn alloc(&mut self, node: Node<T>) -> NodeId {
		self.nodes.push(node);
		self.nodes.len() - 1
	}

	/// Splits the edge of `n` after `i` bytes; the remainder moves into a new
	/// static child that inherits everything `n` held.
	fn split_edge(&mut self, n: NodeId, i: usize) {
		let node = &mut self.nodes[n];
		let child = Node {
			path: node.path.split_off(i),
			kind: NodeKind::Static,
			wild_child: mem::take(&mut node.wild_child),
			indices: mem::take(&mut node.indices),
			children: mem::take(&mut node.children),
			value: node.value.take(),
			full_path: mem::take(&mut node.full_path),
			priority: node.priority - 1,
		};
		let first = child.path[0];

		let child = self.alloc(child);
		let node = &mut self.nodes[n];
		node.children = vec![child];
		node.indices = vec![first];
	}

	/// Bumps the priority of the child at `pos` and moves it ahead of every
	/// sibling with a lower priority. Returns its new position.
	fn increment_child_priority(&mut self, n: NodeId, pos: usize, journal: &mut Vec<Step>) -> usize {
		let child = self.nodes[n].children[pos];
		self.bump(child, journal);
		let priority = self.nodes[child].priority;

		let mut new_pos = pos;
		while new_pos > 0 && self.nodes[self.nodes[n].children[new_pos - 1]].priority < priority {
			new_pos -= 1;
		}

		if new_pos != pos {
			let node = &mut self.nodes[n];
			node.children[new_pos..=pos].rotate_right(1);
			node.indices[new_pos..=pos].rotate_right(1);
			journal.push(Step::Moved {
				parent: n,
				from: pos,
				to: new_pos,
			});
		}
		new_pos
	}

	/// Writes the remainder `path` of `full_path` below `n`, creating wildcard
	/// nodes as it goes.
	fn insert_child(&mut self, mut n: NodeId, path: &[u8], full_path: &str, value: T) -> Result<(), InsertError> {
		let mut offset = 0;
		let mut i = 0;

		while i < path.len() {
			let c = path[i];
			if c != b':' && c != b'*' {
				i += 1;
				continue;
			}

			let end = segment_end(path, i + 1);

			// the wildcard would make existing children unreachable
			if !self.nodes[n].children.is_empty() {
				return Err(InsertError::WildcardConflict {
					wildcard: String::from_utf8_lossy(&path[i..end]).into_owned(),
					path: full_path.to_owned(),
				});
			}

			if c == b':' {
				if i > 0 {
					self.nodes[n].path = path[offset..i].to_vec();
					offset = i;
				}

				let child = self.alloc(Node {
					kind: NodeKind::Param,
					..Node::default()
				});
				self.nodes[n].children = vec![child];
				self.nodes[n].wild_child = true;
				n = child;
				self.nodes[n].priority += 1;

				// more static path follows the param
				if end < path.len() {
					self.nodes[n].path = path[offset..end].to_vec();
					offset = end;

					let child = self.alloc(Node {
						priority: 1,
						..Node::default()
					});
					self.nodes[n].children = vec![child];
					n = child;
				}

				i = end;
				continue;
			}

			if self.nodes[n].path.last() == Some(&b'/') {
				return Err(InsertError::CatchAllConflict(full_path.to_owned()));
			}
			if i == 0 || path[i - 1] != b'/' {
				return Err(InsertError::MissingSlashBeforeCatchAll(full_path.to_owned()));
			}

			// the catch-all takes over the slash in front of it
			let slash = i - 1;
			self.nodes[n].path = path[offset..slash].to_vec();

			let child = self.alloc(Node {
				kind: NodeKind::CatchAll,
				wild_child: true,
				..Node::default()
			});
			self.nodes[n].children = vec![child];
			self.nodes[n].indices = vec![b'/'];
			n = child;
			self.nodes[n].priority += 1;

			let leaf = self.alloc(Node {
				path: path[slash..].to_vec(),
				kind: NodeKind::CatchAll,
				value: Some(value),
				full_path: full_path.to_owned(),
				priority: 1,
				..Node::default()
			});
			self.nodes[n].children = vec![leaf];
			return Ok(());
		}

		let node = &mut self.nodes[n];
		node.path = path[offset..].to_vec();
		node.value = Some(value);
		node.full_path = full_path.to_owned();
		Ok(())
	}
}

/// Checks the shape of a pattern before anything is written into the tree.
fn validate(route: &str) -> Result<(), InsertError> {
	if !route.starts_with('/') {
		return Err(InsertError::MissingLeadingSlash(route.to_owned()));
	}

	let path = route.as_bytes();
	let mut i = 0;
	while i < path.len() {
		let c = path[i];
		if c != b':' && c != b'*' {
			i += 1;
			continue;
		}

		let end = segment_end(path, i + 1);
		let name = &path[i + 1..end];
		if name.iter().any(|&b| b == b':' || b == b'*') {
			return Err(InsertError::TooManyWildcards {
				segment: route[i..].to_owned(),
				path: route.to_owned(),
			});
		}
		if name.is_empty() {
			return Err(InsertError::UnnamedWildcard(route.to_owned()));
		}
		if c == b'*' {
			if end != path.len() {
				return Err(InsertError::CatchAllNotLast(route.to_owned()));
			}
			if path[i - 1] != b'/' {
				return Err(InsertError::MissingSlashBeforeCatchAll(route.to_owned()));
			}
		}

		i = end;
	}
	Ok(())
}

fn common_prefix(a: &[u8], b: &[u8]) -> usize {
	a.iter().zip(b).take_while(|(a, b)| a == b).count()
}

/// Index of the first `/` in `path` at or after `from`, or its length.
fn segment_end(path: &[u8], from: usize) -> usize {
	path[from..]
		.iter()
		.position(|&b| b == b'/')
		.map_or(path.len(), |pos| from + pos)
}

/// Returns the canonical form of `path`: rooted, without `.` and `..` elements
/// and without repeated slashes.
///
/// Processing is purely lexical. A `..` that would climb above the root is
/// dropped. A trailing slash survives (and a trailing `.` element becomes one)
/// unless the result is the root itself. The empty string becomes `/`.
pub fn clean_path(path: &str) -> String {
	if path.is_empty() {
		return "/".to_owned();
	}

	let mut trailing = path.len() > 1 && path.ends_with('/');
	let last = path.split('/').count() - 1;
	let mut elements: Vec<&str> = Vec::new();

	for (i, element) in path.split('/').enumerate() {
		match element {
			"" => {}
			"." => {
				if i == last {
					trailing = true;
				}
			}
			".." => {
				elements.pop();
			}
			element => elements.push(element),
		}
	}

	if elements.is_empty() {
		return "/".to_owned();
	}

	let mut cleaned = String::with_capacity(path.len() + 1);
	for element in elements {
		cleaned.push('/');
		cleaned.push_str(element);
	}
	if trailing {
		cleaned.push('/');
	}
	cleaned
}

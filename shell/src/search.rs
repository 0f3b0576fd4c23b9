use std::env;
use std::ffi::{OsStr, OsString};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

const PATH_KEY: &str = "PATH";

fn is_executable(path: &Path) -> bool {
	match path.metadata() {
		Ok(m) => m.is_file() && m.permissions().mode() & 0o111 != 0,
		Err(_) => false,
	}
}

/// Finds `name` along `search_path`; a name with a slash is taken as is.
pub fn lookup_in(name: &str, search_path: Option<&OsStr>) -> Option<PathBuf> {
	if name.is_empty() {
		return None;
	}
	if name.contains('/') {
		return Some(PathBuf::from(name));
	}
	let search_path = search_path?;
	env::split_paths(search_path)
		.map(|dir| dir.join(name))
		.find(|candidate| is_executable(candidate))
}

pub fn lookup(name: &str) -> Option<PathBuf> {
	let path: Option<OsString> = env::var_os(PATH_KEY);
	lookup_in(name, path.as_deref())
}

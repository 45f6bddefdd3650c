use std::env;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};

/// Expands a leading `~` to the current user's home directory.
pub fn expandtilde<P: AsRef<Path>>(path: P) -> PathBuf {
    let path = path.as_ref();
    let path_str = match path.to_str() {
        Some(s) if s.starts_with('~') => s,
        _ => return path.to_path_buf(),
    };
    let i = path_str.find(MAIN_SEPARATOR).unwrap_or(path_str.len());
    if i != 1 {
        // `~user` forms are left untouched
        return path.to_path_buf();
    }
    match env::var_os("HOME") {
        Some(home) => {
            let mut home = PathBuf::from(home);
            if i < path_str.len() - 1 {
                home.push(&path_str[i + 1..]);
            }
            home
        }
        None => path.to_path_buf(),
    }
}

//! Test helpers for the `retrace` crates.
#![warn(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};

/// Returns the full path to the specified fixture.
///
/// Fixtures are stored in the `retrace-testutils/fixtures` directory and paths should be given
/// relative to that location.
///
/// # Example
///
/// ```
/// use retrace_testutils::fixture;
///
/// let path = fixture("basic/mapping.xml");
/// assert!(path.ends_with("basic/mapping.xml"));
/// ```
pub fn fixture<P: AsRef<Path>>(path: P) -> PathBuf {
    let mut full_path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    full_path.push("fixtures");
    full_path.push(path.as_ref());

    assert!(
        full_path.exists(),
        "Fixture does not exist: {}",
        full_path.display()
    );

    full_path
}

/// Reads the specified fixture into a string.
///
/// Windows line endings are normalized, so that expected output compares equal on every
/// platform.
pub fn read_fixture<P: AsRef<Path>>(path: P) -> String {
    let path = fixture(path);
    match fs::read_to_string(&path) {
        Ok(contents) => contents.replace("\r\n", "\n"),
        Err(error) => panic!("Failed to read fixture {}: {error}", path.display()),
    }
}

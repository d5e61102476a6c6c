use std::{
  fs::{self, OpenOptions},
  io::Write,
  os::unix::fs::{OpenOptionsExt, PermissionsExt},
  path::Path,
};

use regex_lite::Regex;
use semver::Version;

use crate::{Error, Result};

/// Extract the semantic version from the version string provided
pub fn get_semver(ver: &str) -> Result<Version> {
  let re = Regex::new(r"^v?(\d+\.\d+\.\d+)(-.*)?$").map_err(|e| Error::InvalidVersion(e.to_string()))?;
  let cap = re
    .captures(ver.trim())
    .and_then(|cap| cap.get(1))
    .ok_or_else(|| Error::InvalidVersion(ver.to_owned()))?;

  Version::parse(cap.as_str()).map_err(|_| Error::InvalidVersion(ver.to_owned()))
}

/// Write a file to disk with the given mode, creating parent directories as needed
///
/// The mode is applied even when the file already exists so that re-running
/// against a previously written file cannot leave looser permissions behind
pub fn write_file<P: AsRef<Path>>(contents: &[u8], path: P, mode: Option<u32>) -> std::io::Result<()> {
  let path = path.as_ref();
  let mode = mode.unwrap_or(0o644);

  if let Some(parent) = path.parent() {
    if !parent.as_os_str().is_empty() {
      fs::create_dir_all(parent)?;
    }
  }

  let mut file = OpenOptions::new()
    .write(true)
    .create(true)
    .truncate(true)
    .mode(mode)
    .open(path)?;
  file.write_all(contents)?;
  file.set_permissions(fs::Permissions::from_mode(mode))?;

  Ok(())
}

#[cfg(test)]
mod tests {
  use rstest::*;
  use tempfile::tempdir;

  use super::*;

  #[rstest]
  #[case("1.29.4", "1.29.4")]
  #[case("v1.29.4", "1.29.4")]
  #[case("v1.28.0-rc.1", "1.28.0")]
  #[case(" v1.30.1 ", "1.30.1")]
  fn it_gets_semver(#[case] input: &str, #[case] expected: &str) {
    let expected = Version::parse(expected).unwrap();
    assert_eq!(get_semver(input).unwrap(), expected);
  }

  #[rstest]
  #[case("")]
  #[case("latest")]
  #[case("1.29")]
  #[case("Kubernetes v1.24.13")]
  fn it_rejects_invalid_semver(#[case] input: &str) {
    assert!(matches!(get_semver(input), Err(Error::InvalidVersion(_))));
  }

  #[test]
  fn it_writes_file_with_mode() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested/secret");

    write_file(b"first", &path, Some(0o644)).unwrap();
    write_file(b"second", &path, Some(0o600)).unwrap();

    let meta = fs::metadata(&path).unwrap();
    assert_eq!(meta.permissions().mode() & 0o777, 0o600);
    assert_eq!(fs::read_to_string(&path).unwrap(), "second");
  }
}

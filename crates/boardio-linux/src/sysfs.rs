//! sysfs attribute helpers shared by PWM and IIO

use std::path::Path;
use std::str::FromStr;

use crate::error::{LinuxError, Result};

/// Read a whole attribute, trimmed
pub(crate) fn read_attr(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .map(|s| s.trim().to_string())
        .map_err(|source| LinuxError::Attribute {
            path: path.to_path_buf(),
            source,
        })
}

/// Read and parse a numeric attribute
pub(crate) fn read_number<T: FromStr>(path: &Path) -> Result<T> {
    let contents = read_attr(path)?;
    contents.parse().map_err(|_| LinuxError::Parse {
        path: path.to_path_buf(),
        contents,
    })
}

/// Write an attribute
pub(crate) fn write_attr(path: &Path, value: impl std::fmt::Display) -> Result<()> {
    std::fs::write(path, value.to_string()).map_err(|source| LinuxError::Attribute {
        path: path.to_path_buf(),
        source,
    })
}

/// Read an optional text file, for marker sources that may be absent
pub(crate) fn read_optional(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(s) => Some(s.trim_matches(|c: char| c.is_whitespace() || c == '\0').to_string()),
        Err(e) => {
            log::trace!("linux: {} not readable: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("boardio-sysfs-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join(name)
    }

    #[test]
    fn numbers_round_trip_through_attributes() {
        let path = scratch("period");
        write_attr(&path, 20_000_000u64).unwrap();
        assert_eq!(read_number::<u64>(&path).unwrap(), 20_000_000);
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let path = scratch("raw");
        std::fs::write(&path, "abc\n").unwrap();
        assert!(matches!(
            read_number::<u32>(&path),
            Err(LinuxError::Parse { .. })
        ));
    }

    #[test]
    fn optional_files_strip_nul() {
        let path = scratch("model");
        std::fs::write(&path, "Raspberry Pi 4 Model B\0").unwrap();
        assert_eq!(
            read_optional(&path).as_deref(),
            Some("Raspberry Pi 4 Model B")
        );
        assert_eq!(read_optional(&scratch("missing")), None);
    }
}

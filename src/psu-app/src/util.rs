// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::path::PathBuf;

const SOCKET_FILE_NAME: &str = ".psu-rs.sock";

/// Normalize a name to lowercase alphanumeric.
pub fn normalize_name(name: &str) -> String {
    name.to_ascii_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

/// Default arbitration socket: `$XDG_RUNTIME_DIR/.psu-rs.sock`, or
/// `/tmp/.psu-rs.sock` when there is no runtime directory.
pub fn default_socket_path() -> PathBuf {
    dirs::runtime_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(SOCKET_FILE_NAME)
}

pub fn validate_log_level(level: Option<&str>) -> Result<(), String> {
    if let Some(level) = level {
        match level {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(format!(
                    "[general].log_level '{}' is invalid (expected one of: trace, debug, info, warn, error)",
                    level
                ))
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("KWR-103"), "kwr103");
        assert_eq!(normalize_name("RND 320-KWR103"), "rnd320kwr103");
        assert_eq!(normalize_name("Dummy"), "dummy");
    }

    #[test]
    fn test_default_socket_path_file_name() {
        let path = default_socket_path();
        assert_eq!(path.file_name().and_then(|n| n.to_str()), Some(".psu-rs.sock"));
        assert!(path.is_absolute());
    }

    #[test]
    fn test_validate_log_level() {
        assert!(validate_log_level(None).is_ok());
        assert!(validate_log_level(Some("debug")).is_ok());
        assert!(validate_log_level(Some("loud")).is_err());
    }
}

//! Path-phrase resolution.
//!
//! User-entered folder locations ("path phrases") may carry
//! backend-specific prefixes, environment variables, and trailing
//! separators. Resolution is greedy: the first registered backend that
//! claims the phrase resolves it; the native backend claims everything and
//! therefore comes last.

use std::path::PathBuf;
use std::sync::Arc;

use crate::device::AbstractPath;
use crate::error::FileError;
use crate::native::NativeDevice;
use crate::path::AfsPath;

/// One backend's claim on user-entered path phrases.
///
/// Remote backends (SFTP, MTP) implement this trait and register ahead of
/// the native fallback; nothing else in the engine changes when a backend
/// is added.
pub trait DeviceParser: Send + Sync {
    /// Returns `Some` when this backend claims the phrase.
    fn try_parse(&self, phrase: &str) -> Option<Result<AbstractPath, FileError>>;
}

/// Ordered registry of backends ending in the native fallback.
pub struct DeviceRegistry {
    parsers: Vec<Box<dyn DeviceParser>>,
}

impl DeviceRegistry {
    /// A registry containing only the native backend.
    #[must_use]
    pub fn with_native() -> Self {
        Self {
            parsers: vec![Box::new(NativeParser)],
        }
    }

    /// Registers a backend ahead of the existing ones.
    pub fn register_front(&mut self, parser: Box<dyn DeviceParser>) {
        self.parsers.insert(0, parser);
    }

    /// Resolves a phrase through the first claiming backend.
    pub fn parse(&self, phrase: &str) -> Result<AbstractPath, FileError> {
        for parser in &self.parsers {
            if let Some(result) = parser.try_parse(phrase) {
                return result;
            }
        }
        Err(FileError::other(
            format!("Cannot interpret folder location \"{phrase}\"."),
            "no backend claims this path phrase",
        ))
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::with_native()
    }
}

struct NativeParser;

impl DeviceParser for NativeParser {
    fn try_parse(&self, phrase: &str) -> Option<Result<AbstractPath, FileError>> {
        let expanded = expand_phrase(phrase.trim());
        let trimmed = expanded.trim_end_matches(['/', '\\']);
        let root = if trimmed.is_empty() {
            PathBuf::from("/")
        } else {
            PathBuf::from(trimmed)
        };
        Some(Ok(AbstractPath::new(
            Arc::new(NativeDevice::new(root)),
            AfsPath::ROOT,
        )))
    }
}

/// Expands a leading `~` and `$VAR`/`${VAR}` references from the
/// environment; unknown variables are kept verbatim.
fn expand_phrase(phrase: &str) -> String {
    let mut value = phrase.to_owned();

    if value == "~" || value.starts_with("~/") {
        if let Ok(home) = std::env::var("HOME")
            && !home.is_empty()
        {
            value = format!("{home}{}", &value[1..]);
        }
    }

    let mut expansions = 0;
    while let Some(start) = value.find('$') {
        // a variable expanding to another variable must terminate
        expansions += 1;
        if expansions > 16 {
            break;
        }
        let rest = &value[start + 1..];
        let (name, token_len) = if let Some(stripped) = rest.strip_prefix('{') {
            match stripped.find('}') {
                Some(end) => (stripped[..end].to_owned(), end + 3),
                None => break,
            }
        } else {
            let end = rest
                .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
                .unwrap_or(rest.len());
            if end == 0 {
                break;
            }
            (rest[..end].to_owned(), end + 1)
        };

        match std::env::var(&name) {
            Ok(resolved) => {
                value.replace_range(start..start + token_len, &resolved);
            }
            Err(_) => break,
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_claims_plain_paths() {
        let registry = DeviceRegistry::with_native();
        let ap = registry.parse("/tmp/sync-left/").unwrap();
        assert_eq!(ap.device.root_display(), "/tmp/sync-left");
        assert!(ap.path.is_root());
    }

    #[test]
    fn trailing_separators_are_stripped() {
        let registry = DeviceRegistry::with_native();
        let ap = registry.parse("/data///").unwrap();
        assert_eq!(ap.device.root_display(), "/data");
    }

    #[test]
    #[allow(unsafe_code)] // set_var is unsafe in edition 2024; the var is test-local
    fn environment_variables_expand() {
        unsafe { std::env::set_var("BISYNC_TEST_BASE", "/var/data") };
        let registry = DeviceRegistry::with_native();
        let ap = registry.parse("$BISYNC_TEST_BASE/store").unwrap();
        assert_eq!(ap.device.root_display(), "/var/data/store");
        let ap = registry.parse("${BISYNC_TEST_BASE}/store2").unwrap();
        assert_eq!(ap.device.root_display(), "/var/data/store2");
    }

    #[test]
    fn unknown_variables_stay_verbatim() {
        let registry = DeviceRegistry::with_native();
        let ap = registry.parse("/opt/$BISYNC_TEST_UNSET_VAR/x").unwrap();
        assert_eq!(ap.device.root_display(), "/opt/$BISYNC_TEST_UNSET_VAR/x");
    }
}

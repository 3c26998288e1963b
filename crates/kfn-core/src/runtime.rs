use crate::error::KfnError;

/// One supported language and the platform runtime it deploys to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeEntry {
    pub language: &'static str,
    pub runtime: &'static str,
    /// Dependency manifest expected beside the source file.
    pub manifest: &'static str,
}

/// Supported languages. Add a row to support another one.
pub const RUNTIMES: &[RuntimeEntry] = &[
    RuntimeEntry {
        language: "python",
        runtime: "python2.7",
        manifest: "requirements.txt",
    },
    RuntimeEntry {
        language: "javascript",
        runtime: "nodejs6",
        manifest: "package.json",
    },
    RuntimeEntry {
        language: "nodejs",
        runtime: "nodejs6",
        manifest: "package.json",
    },
    RuntimeEntry {
        language: "ruby",
        runtime: "ruby2.4",
        manifest: "Gemfile",
    },
];

/// Map a language tag to its default runtime id.
pub fn resolve(language: &str) -> Result<&'static str, KfnError> {
    RUNTIMES
        .iter()
        .find(|e| e.language == language)
        .map(|e| e.runtime)
        .ok_or_else(|| KfnError::UnsupportedLanguage(language.to_string()))
}

/// Dependency manifest filename for a runtime id of any version, e.g.
/// `python3.6` -> `requirements.txt`.
pub fn manifest_filename(runtime: &str) -> Option<&'static str> {
    let family = runtime.trim_end_matches(|c: char| c.is_ascii_digit() || c == '.');
    RUNTIMES
        .iter()
        .find(|e| e.runtime.trim_end_matches(|c: char| c.is_ascii_digit() || c == '.') == family)
        .map(|e| e.manifest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_languages() {
        assert_eq!(resolve("python").unwrap(), "python2.7");
        assert_eq!(resolve("javascript").unwrap(), "nodejs6");
        assert_eq!(resolve("nodejs").unwrap(), "nodejs6");
        assert_eq!(resolve("ruby").unwrap(), "ruby2.4");
    }

    #[test]
    fn rejects_unknown_language() {
        let err = resolve("cobol").unwrap_err();
        assert!(matches!(err, KfnError::UnsupportedLanguage(ref tag) if tag == "cobol"));
        assert_eq!(err.to_string(), "Language cobol is not supported");
    }

    #[test]
    fn manifest_follows_runtime_family() {
        assert_eq!(manifest_filename("python2.7"), Some("requirements.txt"));
        assert_eq!(manifest_filename("python3.6"), Some("requirements.txt"));
        assert_eq!(manifest_filename("nodejs8"), Some("package.json"));
        assert_eq!(manifest_filename("ruby2.4"), Some("Gemfile"));
        assert_eq!(manifest_filename("go1.10"), None);
    }
}

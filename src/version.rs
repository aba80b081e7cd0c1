//! Build metadata embedded by `build.rs`.

use std::fmt;

use serde::Serialize;

/// Package version from Cargo.toml.
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

const UNKNOWN: &str = "unknown";

/// Placeholder vergen emits when git is unavailable.
const VERGEN_PLACEHOLDER: &str = "VERGEN_IDEMPOTENT_OUTPUT";

/// Git branch at build time, or "unknown" outside a checkout.
pub const GIT_BRANCH: &str = match option_env!("VERGEN_GIT_BRANCH") {
    Some(branch) => branch,
    None => UNKNOWN,
};

/// Git commit SHA at build time, or "unknown" outside a checkout.
pub const GIT_SHA: &str = match option_env!("VERGEN_GIT_SHA") {
    Some(sha) => sha,
    None => UNKNOWN,
};

/// RFC 3339 build timestamp.
pub const BUILD_TIMESTAMP: &str = match option_env!("VERGEN_BUILD_TIMESTAMP") {
    Some(ts) => ts,
    None => UNKNOWN,
};

/// Everything `huginn version` reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildInfo {
    pub version: &'static str,
    pub git_branch: &'static str,
    pub git_sha: &'static str,
    pub git_dirty: bool,
    pub built_at: &'static str,
}

impl BuildInfo {
    /// Metadata of the running binary.
    pub fn current() -> Self {
        Self {
            version: PKG_VERSION,
            git_branch: GIT_BRANCH,
            git_sha: GIT_SHA,
            git_dirty: option_env!("VERGEN_GIT_DIRTY") == Some("true"),
            built_at: BUILD_TIMESTAMP,
        }
    }

    /// Whether the build happened outside a git checkout.
    pub fn is_release_tarball(&self) -> bool {
        self.git_sha == UNKNOWN || self.git_sha == VERGEN_PLACEHOLDER
    }

    fn short_sha(&self) -> &str {
        &self.git_sha[..7.min(self.git_sha.len())]
    }
}

/// `{version}+{branch}.{sha7}[.dirty]`, or the bare version without git data.
impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_release_tarball() {
            return f.write_str(self.version);
        }
        write!(f, "{}+{}.{}", self.version, self.git_branch, self.short_sha())?;
        if self.git_dirty {
            f.write_str(".dirty")?;
        }
        Ok(())
    }
}

/// Full version string of the running binary.
pub fn version_string() -> String {
    BuildInfo::current().to_string()
}

/// `User-Agent` for image fetches and API requests.
pub fn user_agent() -> String {
    format!("huginn/{PKG_VERSION}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(sha: &'static str, dirty: bool) -> BuildInfo {
        BuildInfo {
            version: "0.3.1",
            git_branch: "main",
            git_sha: sha,
            git_dirty: dirty,
            built_at: "2024-05-01T10:00:00Z",
        }
    }

    #[test]
    fn version_with_git_metadata() {
        assert_eq!(info("abc1234def5678", false).to_string(), "0.3.1+main.abc1234");
        assert_eq!(info("abc1234def5678", true).to_string(), "0.3.1+main.abc1234.dirty");
    }

    #[test]
    fn short_sha_is_not_padded() {
        assert_eq!(info("abc", false).to_string(), "0.3.1+main.abc");
    }

    #[test]
    fn version_without_git_is_bare() {
        let info = info(UNKNOWN, true);
        assert!(info.is_release_tarball());
        assert_eq!(info.to_string(), "0.3.1");
    }

    #[test]
    fn vergen_placeholder_counts_as_missing() {
        assert_eq!(info(VERGEN_PLACEHOLDER, false).to_string(), "0.3.1");
    }

    #[test]
    fn running_binary_reports_package_version() {
        let current = BuildInfo::current();
        assert_eq!(current.version, env!("CARGO_PKG_VERSION"));
        assert!(version_string().starts_with(PKG_VERSION));
    }

    #[test]
    fn build_info_serializes_for_json_output() {
        let json = serde_json::to_value(info("abc1234", false)).unwrap();
        assert_eq!(json["git_sha"], "abc1234");
        assert_eq!(json["git_dirty"], false);
    }

    #[test]
    fn user_agent_names_crate() {
        assert_eq!(user_agent(), format!("huginn/{PKG_VERSION}"));
    }
}

use std::fmt;

use serde::Serialize;

/// Compile time facts about this build, captured by `build.rs`
#[derive(Clone, Debug, Serialize)]
pub struct BuildInfo {
    pub version: &'static str,
    pub package_version: &'static str,
    pub build_profile: &'static str,
    pub build_features: &'static str,
    pub build_timestamp: &'static str,
    pub rust_version: &'static str,
    pub target: &'static str,
    pub host: &'static str,
}

impl BuildInfo {
    pub const fn new() -> Self {
        Self {
            version: env!("REPO_VERSION"),
            package_version: env!("CARGO_PKG_VERSION"),
            build_profile: env!("BUILD_PROFILE"),
            build_features: env!("BUILD_FEATURES"),
            build_timestamp: env!("BUILD_TIMESTAMP"),
            rust_version: env!("RUST_VERSION"),
            target: env!("BUILD_TARGET"),
            host: env!("BUILD_HOST"),
        }
    }
}

impl Default for BuildInfo {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "vault {} ({})", self.package_version, self.version)?;
        writeln!(f, "profile:  {}", self.build_profile)?;
        writeln!(f, "features: {}", self.build_features)?;
        writeln!(f, "built:    {}", self.build_timestamp)?;
        writeln!(f, "rustc:    {}", self.rust_version)?;
        write!(f, "target:   {} (host {})", self.target, self.host)
    }
}

pub fn build_info() -> BuildInfo {
    BuildInfo::new()
}

#[macro_export]
macro_rules! build_info {
    () => {
        $crate::version::BuildInfo::new()
    };
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_build_info_is_populated() {
        let info = build_info!();
        assert!(!info.version.is_empty());
        assert_eq!(info.package_version, env!("CARGO_PKG_VERSION"));
        assert!(info.to_string().starts_with("vault "));
    }
}

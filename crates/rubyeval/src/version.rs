use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// Ruby release line a session runs.
///
/// The tag (`"3.4"`) is what configuration and callers use; turning it into an
/// interpreter image is the [`EngineProvider`](crate::EngineProvider)'s job.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
pub enum RubyVersion {
    #[strum(serialize = "3.2")]
    #[serde(rename = "3.2")]
    V3_2,
    #[strum(serialize = "3.3")]
    #[serde(rename = "3.3")]
    V3_3,
    #[default]
    #[strum(serialize = "3.4")]
    #[serde(rename = "3.4")]
    V3_4,
}

impl RubyVersion {
    /// The version tag, e.g. `"3.4"`.
    #[must_use]
    pub fn tag(self) -> &'static str {
        self.into()
    }

    /// npm package that publishes the WebAssembly build of this release.
    #[must_use]
    pub fn wasm_package(self) -> String {
        format!("@ruby/{}-wasm-wasi", self.tag())
    }

    /// Where a provider downloads the interpreter image (runtime plus stdlib) from.
    #[must_use]
    pub fn wasm_url(self) -> String {
        format!("https://unpkg.com/{}@latest/dist/ruby+stdlib.wasm", self.wasm_package())
    }

    /// Full `RUBY_VERSION` string reported by interpreters built for this tag.
    #[must_use]
    pub fn ruby_version_string(self) -> &'static str {
        match self {
            Self::V3_2 => "3.2.0",
            Self::V3_3 => "3.3.0",
            Self::V3_4 => "3.4.0",
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn tags_round_trip_through_from_str() {
        for version in RubyVersion::iter() {
            assert_eq!(RubyVersion::from_str(version.tag()), Ok(version));
            assert_eq!(version.to_string(), version.tag());
        }
        assert!(RubyVersion::from_str("2.7").is_err());
    }

    #[test]
    fn wasm_url_names_the_release_package() {
        assert_eq!(
            RubyVersion::V3_3.wasm_url(),
            "https://unpkg.com/@ruby/3.3-wasm-wasi@latest/dist/ruby+stdlib.wasm"
        );
    }
}

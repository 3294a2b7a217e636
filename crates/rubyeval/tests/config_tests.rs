//! Tests for loading `Config` from TOML text, files, and version overrides.

use std::io::Write as _;

use pretty_assertions::assert_eq;
use rubyeval::{Config, ConfigError, RubyVersion};

#[test]
fn missing_keys_take_defaults() {
    let config = Config::from_toml_str("").unwrap();
    assert_eq!(config, Config::default());
    assert_eq!(config.ruby_version, RubyVersion::V3_4);
    assert!(config.echo_output);
}

#[test]
fn keys_are_read() {
    let config = Config::from_toml_str("ruby_version = \"3.2\"\necho_output = false\n").unwrap();
    assert_eq!(
        config,
        Config {
            ruby_version: RubyVersion::V3_2,
            echo_output: false,
        }
    );
}

#[test]
fn unknown_keys_are_rejected() {
    let err = Config::from_toml_str("ruby = \"3.3\"").unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)), "got {err:?}");
}

#[test]
fn unknown_versions_are_rejected() {
    let err = Config::from_toml_str("ruby_version = \"2.7\"").unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)), "got {err:?}");
}

#[test]
fn config_file_is_loaded() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "ruby_version = \"3.3\"").unwrap();
    let config = Config::load(file.path()).unwrap();
    assert_eq!(config.ruby_version, RubyVersion::V3_3);
    assert!(config.echo_output);
}

#[test]
fn missing_config_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Config::load(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)), "got {err:?}");
    assert!(err.to_string().starts_with("cannot read config: "));
}

#[test]
fn version_override_replaces_the_configured_version() {
    let config = Config::default().with_version_override(Some(" 3.3 ")).unwrap();
    assert_eq!(config.ruby_version, RubyVersion::V3_3);

    let config = Config::default().with_version_override(None).unwrap();
    assert_eq!(config.ruby_version, RubyVersion::V3_4);
}

#[test]
fn bad_version_override_names_the_tag() {
    let err = Config::default().with_version_override(Some("9.9")).unwrap_err();
    assert_eq!(err, ConfigError::UnknownVersion("9.9".to_owned()));
    assert_eq!(err.to_string(), "unknown Ruby version \"9.9\", expected 3.2, 3.3 or 3.4");
}

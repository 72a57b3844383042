//! Shared fixtures for driver integration tests.
//!
//! Integration tests are compiled as separate crates (one per top-level file in
//! `tests/`). Placing shared fixtures under `tests/common/` avoids creating an
//! additional integration test binary while still allowing reuse via:
//!
//! ```rust
//! #[path = "common/driver_fixtures.rs"]
//! mod driver_fixtures;
//! ```

#![allow(dead_code, reason = "each test crate uses a different subset")]

use camino::Utf8PathBuf;
use stratuslab_libcloud::test_support::{FakeBackend, StaticCatalogFetcher};
use stratuslab_libcloud::{Location, StratusLabDriver, UserConfig};
use tempfile::TempDir;

/// Configuration with a default section selecting `siteA`, two locations, and
/// instance type overrides.
pub const TWO_SITES: &str = r#"
[default]
selected_section = "siteA"
marketplace_endpoint = "https://mp.example.org"

[siteA]
name = "Site A"
country = "fr"

[siteB]
name = "Site B"
country = "ch"
marketplace_endpoint = "https://mp.site-b.example.org/"

[instance_types]
"m1.small" = [2, 1024, 2048]
"m2.custom" = "8, 16384, 4096"
"#;

/// Driver under test.
pub type TestDriver = StratusLabDriver<FakeBackend, StaticCatalogFetcher>;

/// Builds a driver from TOML text with the given fetcher.
pub fn driver_with(contents: &str, fetcher: StaticCatalogFetcher) -> TestDriver {
    let user_config = UserConfig::from_toml_str("test.toml", contents)
        .unwrap_or_else(|err| panic!("parse config: {err}"));
    StratusLabDriver::from_user_config(FakeBackend::new(), fetcher, user_config, None)
        .unwrap_or_else(|err| panic!("driver: {err}"))
}

/// Builds a driver for [`TWO_SITES`] whose Marketplace serves `<metadata/>`.
pub fn two_site_driver() -> TestDriver {
    driver_with(TWO_SITES, StaticCatalogFetcher::new("<metadata/>"))
}

/// Looks up a location of the driver.
pub fn location(driver: &TestDriver, id: &str) -> Location {
    driver
        .locations()
        .get(id)
        .cloned()
        .unwrap_or_else(|| panic!("location {id} exists"))
}

/// Writes `contents` to a configuration file in a fresh temporary directory.
pub fn write_config(contents: &str) -> (TempDir, Utf8PathBuf) {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let path = Utf8PathBuf::from_path_buf(tmp.path().join("stratuslab-user.toml"))
        .unwrap_or_else(|path| panic!("temp path should be utf8: {}", path.display()));
    std::fs::write(&path, contents).unwrap_or_else(|err| panic!("write config: {err}"));
    (tmp, path)
}

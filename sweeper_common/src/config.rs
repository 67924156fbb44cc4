//! Layered TOML configuration: an embedded default, overridden by whatever
//! is on disk at a runtime-supplied path.
//!
//! Keys a deployer doesn't set should always resolve to a sane default
//! rather than an error — the default should also be visible on disk for
//! reference, which is why [`load_layered`] writes the embedded default
//! out next to the primary file.

use serde::de::DeserializeOwned;
use std::path::Path;

/// Loads a `T` from TOML at `path`, falling back field-by-field to
/// `default_src` (normally an `include_str!`-embedded `default.toml`) for
/// anything `path` doesn't set or doesn't exist at all.
///
/// `default_path` is where the embedded default is written for reference;
/// a failure to write it is logged and otherwise ignored, since it's purely
/// a convenience for operators editing the primary file.
pub fn load_layered<T: DeserializeOwned>(
  path: impl AsRef<Path>,
  default_path: impl AsRef<Path>,
  default_src: &str,
) -> T {
  let path = path.as_ref();
  let default_path = default_path.as_ref();

  if let Err(e) = std::fs::write(default_path, default_src) {
    warn!("could not write default configuration to disk at `{}`: {e}", default_path.display());
  }

  let default: toml::Value =
    toml::from_str(default_src).expect("embedded default configuration failed to parse");

  let merged = match std::fs::read_to_string(path) {
    Ok(src) => match toml::from_str::<toml::Value>(&src) {
      Ok(primary) => merge(default, primary),
      Err(e) => {
        error!("error parsing config at `{}`: {e}, using defaults", path.display());
        default
      }
    },
    Err(e) => {
      warn!("no config found at `{}` ({e}), using defaults", path.display());
      default
    }
  };

  let merged_src = toml::to_string(&merged).expect("merged configuration is not valid TOML");
  toml::from_str(&merged_src)
    .unwrap_or_else(|e| panic!("merged configuration does not match expected shape: {e}"))
}

/// Recursively merges `override_` onto `base`: tables merge key-by-key,
/// anything else in `override_` wins outright.
fn merge(base: toml::Value, override_: toml::Value) -> toml::Value {
  use toml::Value;
  match (base, override_) {
    (Value::Table(mut base), Value::Table(over)) => {
      for (k, v) in over {
        let merged = match base.remove(&k) {
          Some(existing) => merge(existing, v),
          None => v,
        };
        base.insert(k, merged);
      }
      Value::Table(base)
    }
    (_, over) => over,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;
  use serde::Deserialize;

  #[derive(Debug, Deserialize, PartialEq)]
  struct Inner {
    threshold: f64,
    #[serde(default)]
    cap: u32,
  }

  #[derive(Debug, Deserialize, PartialEq)]
  struct Outer {
    name: String,
    inner: Inner,
  }

  #[test]
  fn override_replaces_only_the_keys_it_sets() {
    let default = r#"
      name = "default-name"
      [inner]
      threshold = 0.85
      cap = 10000
    "#;
    let primary = r#"
      [inner]
      threshold = 0.5
    "#;
    let merged = merge(
      toml::from_str(default).unwrap(),
      toml::from_str(primary).unwrap(),
    );
    let out: Outer = toml::from_str(&toml::to_string(&merged).unwrap()).unwrap();
    assert_eq!(out.name, "default-name");
    assert_eq!(out.inner.threshold, 0.5);
    assert_eq!(out.inner.cap, 10000);
  }

  #[test]
  fn missing_primary_file_falls_back_entirely_to_default() {
    let dir = std::env::temp_dir().join(format!("sweeper-cfg-test-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let primary = dir.join("does-not-exist.toml");
    let default_path = dir.join("default.toml");
    let out: Outer = load_layered(
      &primary,
      &default_path,
      r#"
        name = "fallback"
        [inner]
        threshold = 0.85
        cap = 10000
      "#,
    );
    assert_eq!(out.name, "fallback");
    assert_eq!(out.inner.cap, 10000);
    assert!(default_path.exists());
    let _ = std::fs::remove_dir_all(&dir);
  }
}

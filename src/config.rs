use crate::{files::FileStore, hooks::HookSpec};
use serde::{de::Error as _, Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// The keys of a site configuration, as they appear in the JSON file.
pub const ATTRIBUTES: &[&str] = &[
    "git",
    "deploy",
    "live",
    "liveBranch",
    "deployOnTag",
    "hooks",
    "repo",
    "remote",
    "haltOnFailure",
];

/// A custom error describing why a site configuration cannot be used.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// There was no configuration given.
    #[error("site configuration data is required")]
    Missing,
    /// The configuration file cannot be read. The parameters are the path and the reason.
    #[error("site configuration data at {0} was not found ({1})")]
    Unreadable(String, String),
    /// The configuration is not valid JSON or has values of the wrong type.
    #[error("site configuration is invalid: {0}")]
    Invalid(String),
    /// A required value is not set.
    #[error("{0:?} is required in the site configuration")]
    MissingField(&'static str),
    /// There is no such key in the site configuration.
    #[error("{0:?} is not a site configuration key")]
    UnknownAttribute(String),
    /// The configuration is not resolved yet.
    #[error("site configuration is not loaded yet")]
    NotReady,
}

fn default_live_branch() -> String {
    String::from("master")
}

fn default_remote() -> String {
    String::from("origin")
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Boolish {
    Bool(bool),
    Number(i64),
    Text(String),
}

/// Accepts booleans, numbers and the usual textual booleans (e.g. `"true"`, `"no"`).
fn deserialize_boolish<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match Boolish::deserialize(deserializer)? {
        Boolish::Bool(value) => Ok(value),
        Boolish::Number(value) => Ok(value != 0),
        Boolish::Text(value) => match value.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" | "" => Ok(false),
            _ => Err(D::Error::custom(format!("{value:?} is not a boolean"))),
        },
    }
}

/// The settings of one deployed site.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteConfig {
    /// The working copy of the source repository.
    #[serde(default)]
    pub git: PathBuf,
    /// The root of the staging deployments, every branch gets a directory in it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy: Option<PathBuf>,
    /// The directory of the live deployment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live: Option<PathBuf>,
    #[serde(default = "default_live_branch")]
    pub live_branch: String,
    /// Only deploy the live branch when a tag is pushed.
    #[serde(default, deserialize_with = "deserialize_boolish")]
    pub deploy_on_tag: bool,
    #[serde(default)]
    pub hooks: Vec<HookSpec>,
    /// The upstream repository identifier (e.g. `owner/name`) to listen on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    #[serde(default = "default_remote")]
    pub remote: String,
    /// Stop the pipeline at the first failed stage instead of continuing.
    #[serde(default, deserialize_with = "deserialize_boolish")]
    pub halt_on_failure: bool,
}

impl SiteConfig {
    /// Creates a configuration for the working copy with every other value defaulted.
    pub fn new(git: impl Into<PathBuf>) -> Self {
        SiteConfig {
            git: git.into(),
            deploy: None,
            live: None,
            live_branch: default_live_branch(),
            deploy_on_tag: false,
            hooks: vec![],
            repo: None,
            remote: default_remote(),
            halt_on_failure: false,
        }
    }

    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        if value.is_null() {
            return Err(ConfigError::Missing);
        }
        let config: SiteConfig =
            serde_json::from_value(value).map_err(|err| ConfigError::Invalid(err.to_string()))?;
        config.validate()?;

        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let value: Value =
            serde_json::from_str(json).map_err(|err| ConfigError::Invalid(err.to_string()))?;
        SiteConfig::from_value(value)
    }

    /// Check the values required before any deployment.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.git.as_os_str().is_empty() {
            return Err(ConfigError::MissingField("git"));
        }
        if self.live_branch.is_empty() {
            return Err(ConfigError::MissingField("liveBranch"));
        }
        if self.remote.is_empty() {
            return Err(ConfigError::MissingField("remote"));
        }

        Ok(())
    }

    pub fn live_root(&self) -> Result<&Path, ConfigError> {
        self.live
            .as_deref()
            .filter(|path| !path.as_os_str().is_empty())
            .ok_or(ConfigError::MissingField("live"))
    }

    pub fn stage_root(&self) -> Result<&Path, ConfigError> {
        self.deploy
            .as_deref()
            .filter(|path| !path.as_os_str().is_empty())
            .ok_or(ConfigError::MissingField("deploy"))
    }

    fn to_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    /// Read a value by its configuration key.
    pub fn attribute(&self, name: &str) -> Option<Value> {
        self.to_map().remove(name)
    }

    /// Returns a copy of the configuration with the key set to the value.
    pub fn with_attribute(&self, name: &str, value: Value) -> Result<Self, ConfigError> {
        if !ATTRIBUTES.contains(&name) {
            return Err(ConfigError::UnknownAttribute(name.to_string()));
        }

        let mut map = self.to_map();
        map.insert(name.to_string(), value);
        SiteConfig::from_value(Value::Object(map))
    }
}

/// Where to load the site configuration from.
#[derive(Clone, Debug)]
pub enum SiteSource {
    /// A JSON file, read when the site is first used.
    Path(PathBuf),
    /// An in-memory JSON object.
    Value(Value),
    Config(SiteConfig),
}

impl SiteSource {
    /// Load and validate the configuration.
    pub async fn resolve(self, files: &dyn FileStore) -> Result<SiteConfig, ConfigError> {
        match self {
            SiteSource::Path(path) => {
                if path.as_os_str().is_empty() {
                    return Err(ConfigError::Missing);
                }
                let json = files.read_to_string(&path).await.map_err(|err| {
                    ConfigError::Unreadable(path.to_string_lossy().into_owned(), err.to_string())
                })?;
                SiteConfig::from_json(&json)
            }
            SiteSource::Value(value) => SiteConfig::from_value(value),
            SiteSource::Config(config) => {
                config.validate()?;
                Ok(config)
            }
        }
    }
}

impl From<&str> for SiteSource {
    fn from(value: &str) -> Self {
        SiteSource::Path(PathBuf::from(value))
    }
}

impl From<PathBuf> for SiteSource {
    fn from(value: PathBuf) -> Self {
        SiteSource::Path(value)
    }
}

impl From<&Path> for SiteSource {
    fn from(value: &Path) -> Self {
        SiteSource::Path(value.to_path_buf())
    }
}

impl From<Value> for SiteSource {
    fn from(value: Value) -> Self {
        SiteSource::Value(value)
    }
}

impl From<SiteConfig> for SiteSource {
    fn from(value: SiteConfig) -> Self {
        SiteSource::Config(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::MockFileStore;
    use serde_json::json;
    use std::io;

    #[test]
    fn it_should_parse_the_site_configuration() -> Result<(), ConfigError> {
        let config = SiteConfig::from_json(
            r#"{"repo":"danheberden/payloads","git":"test/gits/site-copy/","deploy":"test/site/deploy/","live":"test/site/live/","liveBranch":"master","deployOnTag":"true","hooks":["npm","grunt|build test"]}"#,
        )?;

        assert_eq!(PathBuf::from("test/gits/site-copy/"), config.git);
        assert_eq!(Some(Path::new("test/site/deploy/")), config.stage_root().ok());
        assert_eq!(Some(Path::new("test/site/live/")), config.live_root().ok());
        assert_eq!("master", config.live_branch);
        assert!(config.deploy_on_tag);
        assert_eq!(
            vec![HookSpec::new("npm", ""), HookSpec::new("grunt", "build test")],
            config.hooks
        );
        assert_eq!(Some(String::from("danheberden/payloads")), config.repo);
        assert_eq!("origin", config.remote);
        assert!(!config.halt_on_failure);

        Ok(())
    }

    #[test]
    fn it_should_merge_over_the_defaults() -> Result<(), ConfigError> {
        let config = SiteConfig::from_value(json!({ "git": "repo/" }))?;
        assert_eq!(SiteConfig::new("repo/"), config);

        Ok(())
    }

    #[test]
    fn it_should_accept_bool_like_values() -> Result<(), ConfigError> {
        for (value, expected) in [
            (json!(true), true),
            (json!("true"), true),
            (json!("yes"), true),
            (json!(1), true),
            (json!(false), false),
            (json!("false"), false),
            (json!("0"), false),
            (json!(0), false),
        ] {
            let config = SiteConfig::from_value(json!({ "git": "repo/", "deployOnTag": value }))?;
            assert_eq!(expected, config.deploy_on_tag, "{value} should be {expected}");
        }

        let error = SiteConfig::from_value(json!({ "git": "repo/", "deployOnTag": "maybe" }));
        assert!(matches!(error, Err(ConfigError::Invalid(_))));

        Ok(())
    }

    #[test]
    fn it_should_require_the_git_directory() {
        let error = SiteConfig::from_value(json!({ "deploy": "out/" })).err();
        assert_eq!(Some(ConfigError::MissingField("git")), error);

        let error = SiteConfig::from_value(json!({ "git": "" })).err();
        assert_eq!(Some(ConfigError::MissingField("git")), error);
    }

    #[test]
    fn it_should_fail_on_missing_configuration() {
        let error = SiteConfig::from_value(Value::Null).err();
        assert_eq!(Some(ConfigError::Missing), error);
    }

    #[test]
    fn it_should_fail_on_invalid_hooks() {
        let error = SiteConfig::from_value(json!({ "git": "repo/", "hooks": ["|x"] }));
        assert!(matches!(error, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn it_should_require_the_deployment_roots_only_when_used() -> Result<(), ConfigError> {
        let config = SiteConfig::from_value(json!({ "git": "repo/", "deploy": "out/" }))?;

        assert_eq!(Path::new("out/"), config.stage_root()?);
        assert_eq!(Err(ConfigError::MissingField("live")), config.live_root());

        Ok(())
    }

    #[test]
    fn it_should_read_and_write_attributes() -> Result<(), ConfigError> {
        let config = SiteConfig::from_value(json!({ "git": "repo/", "hooks": ["npm"] }))?;

        assert_eq!(Some(json!("repo/")), config.attribute("git"));
        assert_eq!(Some(json!("master")), config.attribute("liveBranch"));
        assert_eq!(Some(json!(["npm"])), config.attribute("hooks"));
        assert_eq!(None, config.attribute("live"));
        assert_eq!(None, config.attribute("nonexistent"));

        let config = config.with_attribute("liveBranch", json!("production"))?;
        assert_eq!("production", config.live_branch);

        let config = config.with_attribute("deployOnTag", json!("yes"))?;
        assert!(config.deploy_on_tag);

        assert_eq!(
            Err(ConfigError::UnknownAttribute(String::from("githCallback"))),
            config.with_attribute("githCallback", json!(null))
        );
        assert_eq!(
            Err(ConfigError::MissingField("git")),
            config.with_attribute("git", json!(""))
        );

        Ok(())
    }

    #[tokio::test]
    async fn it_should_resolve_the_configuration_from_a_file() -> Result<(), ConfigError> {
        let mut files = MockFileStore::new();
        files
            .expect_read_to_string()
            .withf(|path| path == Path::new("site.json"))
            .times(1)
            .returning(|_| Ok(String::from(r#"{"git":"repo/","live":"live/"}"#)));

        let config = SiteSource::from("site.json").resolve(&files).await?;
        assert_eq!(PathBuf::from("repo/"), config.git);
        assert_eq!(Path::new("live/"), config.live_root()?);

        Ok(())
    }

    #[tokio::test]
    async fn it_should_fail_on_unreadable_files() {
        let mut files = MockFileStore::new();
        files
            .expect_read_to_string()
            .times(1)
            .returning(|_| Err(io::Error::new(io::ErrorKind::NotFound, "not found")));

        let error = SiteSource::from("missing.json").resolve(&files).await;
        assert!(
            matches!(&error, Err(ConfigError::Unreadable(path, _)) if path == "missing.json"),
            "{error:?} should be Unreadable"
        );
    }

    #[tokio::test]
    async fn it_should_fail_on_empty_paths() {
        let mut files = MockFileStore::new();
        files.expect_read_to_string().times(0);

        let error = SiteSource::from("").resolve(&files).await;
        assert_eq!(Err(ConfigError::Missing), error);
    }
}

use anyhow::{Context, Result};
use log::debug;
use reqwest::Client;
use serde::Deserialize;
use std::path::PathBuf;

use crate::{
    http::{Credentials, HttpClient},
    obs::{DEFAULT_API_URL, ObsClient},
    runtime::Runtime,
};

pub const ENV_API_URL: &str = "OBS_APIURL";
pub const ENV_USER: &str = "OBS_USER";
pub const ENV_PASSWORD: &str = "OBS_PASSWORD";

/// Values given on the command line; they take precedence over everything else.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub api_url: Option<String>,
    pub user: Option<String>,
    pub config_path: Option<PathBuf>,
}

/// Contents of `config.toml`.
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    api_url: Option<String>,
    user: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub api_url: String,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl Config {
    /// Resolve configuration: command line, then environment, then the
    /// config file, then defaults.
    #[tracing::instrument(skip(runtime))]
    pub fn load<R: Runtime>(runtime: &R, overrides: Overrides) -> Result<Self> {
        let file = load_file(runtime, overrides.config_path.as_ref())?;

        let api_url = overrides
            .api_url
            .or_else(|| runtime.env_var(ENV_API_URL).ok())
            .or(file.api_url)
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let user = overrides
            .user
            .or_else(|| runtime.env_var(ENV_USER).ok())
            .or(file.user);
        let password = runtime.env_var(ENV_PASSWORD).ok().or(file.password);

        debug!("Using API {} as {:?}", api_url, user);
        Ok(Self {
            api_url,
            user,
            password,
        })
    }

    pub fn credentials(&self) -> Option<Credentials> {
        self.user.as_ref().map(|user| Credentials {
            user: user.clone(),
            password: self.password.clone(),
        })
    }

    /// Build a client for the configured build service.
    pub fn client(&self) -> Result<ObsClient> {
        let client = Client::builder()
            .user_agent(concat!("obslink/", env!("OBSLINK_VERSION")))
            .build()?;
        let http_client = HttpClient::new(client).with_credentials(self.credentials());
        Ok(ObsClient::from_http_client(http_client, &self.api_url))
    }
}

/// `<config_dir>/obslink/config.toml`
pub fn default_config_path<R: Runtime>(runtime: &R) -> Option<PathBuf> {
    runtime
        .config_dir()
        .map(|dir| dir.join("obslink").join("config.toml"))
}

fn load_file<R: Runtime>(runtime: &R, explicit: Option<&PathBuf>) -> Result<ConfigFile> {
    let path = match explicit {
        Some(path) => path.clone(),
        None => match default_config_path(runtime) {
            Some(path) if runtime.exists(&path) => path,
            _ => return Ok(ConfigFile::default()),
        },
    };

    debug!("Loading config from {:?}", path);
    let content = runtime.read_to_string(&path)?;
    toml::from_str(&content).with_context(|| format!("Invalid config file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::obs::BuildService;
    use crate::runtime::MockRuntime;
    use mockall::predicate::eq;
    use std::env::VarError;

    fn runtime_with_env(vars: &[(&'static str, &'static str)]) -> MockRuntime {
        let mut runtime = MockRuntime::new();
        for key in [ENV_API_URL, ENV_USER, ENV_PASSWORD] {
            let value = vars.iter().find(|(k, _)| *k == key).map(|(_, v)| *v);
            runtime
                .expect_env_var()
                .with(eq(key))
                .returning(move |_| value.map(str::to_string).ok_or(VarError::NotPresent));
        }
        runtime
    }

    #[test]
    fn test_defaults_without_file() {
        let mut runtime = runtime_with_env(&[]);
        runtime.expect_config_dir().returning(|| None);

        let config = Config::load(&runtime, Overrides::default()).unwrap();

        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.user, None);
        assert_eq!(config.credentials(), None);
    }

    #[test]
    fn test_missing_default_file_is_ignored() {
        let mut runtime = runtime_with_env(&[]);
        runtime
            .expect_config_dir()
            .returning(|| Some(PathBuf::from("/home/user/.config")));
        runtime
            .expect_exists()
            .with(eq(PathBuf::from("/home/user/.config/obslink/config.toml")))
            .returning(|_| false);
        runtime.expect_read_to_string().never();

        let config = Config::load(&runtime, Overrides::default()).unwrap();
        assert_eq!(config.api_url, DEFAULT_API_URL);
    }

    #[test]
    fn test_precedence() {
        let mut runtime = runtime_with_env(&[
            (ENV_API_URL, "http://env:3000"),
            (ENV_PASSWORD, "env-secret"),
        ]);
        runtime
            .expect_config_dir()
            .returning(|| Some(PathBuf::from("/home/user/.config")));
        runtime.expect_exists().returning(|_| true);
        runtime.expect_read_to_string().returning(|_| {
            Ok(r#"
api_url = "http://file:3000"
user = "file-user"
password = "file-secret"
"#
            .to_string())
        });

        let config = Config::load(&runtime, Overrides::default()).unwrap();
        assert_eq!(config.api_url, "http://env:3000");
        assert_eq!(config.user.as_deref(), Some("file-user"));
        assert_eq!(config.password.as_deref(), Some("env-secret"));

        let overrides = Overrides {
            api_url: Some("http://cli:3000".into()),
            user: Some("cli-user".into()),
            config_path: None,
        };
        let config = Config::load(&runtime, overrides).unwrap();
        assert_eq!(config.api_url, "http://cli:3000");
        assert_eq!(
            config.credentials(),
            Some(Credentials {
                user: "cli-user".into(),
                password: Some("env-secret".into()),
            })
        );
    }

    #[test]
    fn test_explicit_file_must_exist() {
        let mut runtime = runtime_with_env(&[]);
        runtime
            .expect_read_to_string()
            .with(eq(PathBuf::from("/etc/obslink.toml")))
            .returning(|_| Err(anyhow::anyhow!("No such file or directory")));

        let overrides = Overrides {
            config_path: Some(PathBuf::from("/etc/obslink.toml")),
            ..Default::default()
        };
        assert!(Config::load(&runtime, overrides).is_err());
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let mut runtime = runtime_with_env(&[]);
        runtime
            .expect_read_to_string()
            .returning(|_| Ok("apiurl = 3".to_string()));

        let overrides = Overrides {
            config_path: Some(PathBuf::from("/etc/obslink.toml")),
            ..Default::default()
        };
        let err = Config::load(&runtime, overrides).unwrap_err();
        assert!(err.to_string().contains("Invalid config file"));
    }

    #[tokio::test]
    async fn test_client_sends_basic_auth() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/source/home:alice/_meta")
            .match_header("authorization", mockito::Matcher::Regex("^Basic ".to_string()))
            .with_status(200)
            .with_body(r#"<project name="home:alice"/>"#)
            .create_async()
            .await;

        let config = Config {
            api_url: server.url(),
            user: Some("alice".into()),
            password: Some("secret".into()),
        };
        let client = config.client().unwrap();

        client.fetch_project_meta("home:alice").await.unwrap();
        mock.assert_async().await;
    }
}

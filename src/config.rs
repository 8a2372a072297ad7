//! Service configuration: an ordered set of TOML sources merged into one
//! table.
//!
//! The built-in defaults always come first and caller-supplied files follow
//! in the order given, so a key defined in several sources takes the value
//! from the last one. Tables merge key by key; any other value is replaced
//! wholesale.

use crate::error::{ConfigParseError, FileError, SupervisorError};
use crate::{Result, env};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use toml::Table;
use url::Url;

const DEFAULT_CONFIG: &str = include_str!("default.toml");
const DEFAULT_URL: &str = "http://localhost:5000/wps";
const DEFAULT_OUTPUT_PATH: &str = "outputs";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Builtin,
    File(PathBuf),
}

impl Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Builtin => write!(f, "<builtin>"),
            ConfigSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Ordered configuration sources, lowest precedence first.
#[derive(Debug, Clone)]
pub struct ConfigSet {
    sources: Vec<ConfigSource>,
}

impl ConfigSet {
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut sources = vec![ConfigSource::Builtin];
        sources.extend(
            paths
                .into_iter()
                .map(|p| ConfigSource::File(absolute(p.as_ref()))),
        );
        Self { sources }
    }

    pub fn sources(&self) -> &[ConfigSource] {
        &self.sources
    }

    pub fn files(&self) -> impl Iterator<Item = &Path> {
        self.sources.iter().filter_map(|s| match s {
            ConfigSource::File(path) => Some(path.as_path()),
            ConfigSource::Builtin => None,
        })
    }

    pub fn load(&self) -> Result<Configuration> {
        let mut merged = Table::new();
        for source in &self.sources {
            let table = match source {
                ConfigSource::Builtin => parse(&source.to_string(), DEFAULT_CONFIG.to_string())?,
                ConfigSource::File(path) => {
                    let contents =
                        std::fs::read_to_string(path).map_err(|source| FileError::ReadError {
                            path: path.clone(),
                            source,
                        })?;
                    parse(&path.display().to_string(), contents)?
                }
            };
            trace!("merging configuration from {source}");
            merge(&mut merged, table);
        }
        Ok(Configuration { table: merged })
    }
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::CWD.join(path)
    }
}

fn parse(name: &str, contents: String) -> Result<Table> {
    match toml::from_str::<Table>(&contents) {
        Ok(table) => Ok(table),
        Err(err) => Err(ConfigParseError::from_toml_error(name, contents, err).into()),
    }
}

fn merge(base: &mut Table, overlay: Table) {
    for (key, value) in overlay {
        let toml::Value::Table(incoming) = value else {
            base.insert(key, value);
            continue;
        };
        if let Some(toml::Value::Table(existing)) = base.get_mut(&key) {
            merge(existing, incoming);
            continue;
        }
        base.insert(key, toml::Value::Table(incoming));
    }
}

/// Merged, read-only view of a `ConfigSet`.
#[derive(Debug, Clone)]
pub struct Configuration {
    table: Table,
}

impl Configuration {
    pub fn get(&self, section: &str, key: &str) -> Option<&toml::Value> {
        self.table.get(section)?.as_table()?.get(key)
    }

    pub fn get_str(&self, section: &str, key: &str) -> Option<&str> {
        self.get(section, key)?.as_str()
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn server_url(&self) -> &str {
        self.get_str("server", "url")
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_URL)
    }

    pub fn output_url(&self) -> Option<&str> {
        self.get_str("server", "outputurl")
    }

    pub fn output_path(&self) -> PathBuf {
        absolute(Path::new(
            self.get_str("server", "outputpath")
                .unwrap_or(DEFAULT_OUTPUT_PATH),
        ))
    }
}

/// Where the listener binds and what it serves under `/outputs`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoint {
    pub host: String,
    pub port: u16,
    pub output_dir: PathBuf,
}

impl ServiceEndpoint {
    /// `bind_host` replaces the host taken from `server.url`.
    pub fn resolve(config: &Configuration, bind_host: Option<&str>) -> Result<Self> {
        let raw = config.server_url();
        let url = Url::parse(raw).map_err(|e| SupervisorError::ConfigurationResolution {
            reason: format!("invalid server url {raw:?}: {e}"),
        })?;
        let host = match bind_host {
            Some(host) => host.to_string(),
            None => url
                .host_str()
                .ok_or_else(|| SupervisorError::ConfigurationResolution {
                    reason: format!("server url {raw:?} has no host"),
                })?
                .to_string(),
        };
        let port = url.port_or_known_default().unwrap_or(80);
        Ok(Self {
            host,
            port,
            output_dir: config.output_path(),
        })
    }

    pub fn addr(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_builtin_defaults() {
        let config = ConfigSet::new(Vec::<PathBuf>::new()).load().unwrap();
        assert_eq!(config.server_url(), "http://localhost:5000/wps");
        assert_eq!(
            config.get_str("metadata", "identification_title"),
            Some("Emu")
        );
        assert!(config.output_path().ends_with("outputs"));
    }

    #[test]
    fn test_last_source_wins() {
        let dir = TempDir::new().unwrap();
        let a = write(
            &dir,
            "a.toml",
            "[server]\nurl = \"http://a:1/wps\"\n[metadata]\nidentification_title = \"A\"\nonly_a = 1\n",
        );
        let b = write(&dir, "b.toml", "[server]\nurl = \"http://b:2/wps\"\n");

        let set = ConfigSet::new([&a, &b]);
        assert_eq!(set.sources().len(), 3);
        assert_eq!(set.sources()[0], ConfigSource::Builtin);

        let config = set.load().unwrap();
        // defined in all three
        assert_eq!(config.server_url(), "http://b:2/wps");
        // defined in default and a
        assert_eq!(config.get_str("metadata", "identification_title"), Some("A"));
        // defined only in default
        assert_eq!(
            config.get_str("server", "outputurl"),
            Some("http://localhost:5000/outputs")
        );
        assert_eq!(
            config.get("metadata", "only_a").and_then(|v| v.as_integer()),
            Some(1)
        );
    }

    #[test]
    fn test_relative_paths_are_absolutized() {
        let set = ConfigSet::new(["emu.toml"]);
        let files: Vec<_> = set.files().collect();
        assert_eq!(files.len(), 1);
        assert!(files[0].is_absolute());
    }

    #[test]
    fn test_missing_file_fails() {
        let dir = TempDir::new().unwrap();
        let set = ConfigSet::new([dir.path().join("nope.toml")]);
        let err = set.load().unwrap_err();
        assert!(err.downcast_ref::<FileError>().is_some());
    }

    #[test]
    fn test_invalid_toml_fails() {
        let dir = TempDir::new().unwrap();
        let bad = write(&dir, "bad.toml", "[server\nurl = ");
        let err = ConfigSet::new([bad]).load().unwrap_err();
        assert!(err.downcast_ref::<ConfigParseError>().is_some());
    }

    #[test]
    fn test_endpoint_defaults_to_localhost_5000() {
        let config = ConfigSet::new(Vec::<PathBuf>::new()).load().unwrap();
        let endpoint = ServiceEndpoint::resolve(&config, None).unwrap();
        assert_eq!(endpoint.host, "localhost");
        assert_eq!(endpoint.port, 5000);
        assert_eq!(endpoint.addr(), "localhost:5000");
    }

    #[test]
    fn test_endpoint_bind_host_override() {
        let config = ConfigSet::new(Vec::<PathBuf>::new()).load().unwrap();
        let endpoint = ServiceEndpoint::resolve(&config, Some("0.0.0.0")).unwrap();
        assert_eq!(endpoint.host, "0.0.0.0");
        assert_eq!(endpoint.port, 5000);
    }

    #[test]
    fn test_endpoint_port_from_scheme() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "c.toml", "[server]\nurl = \"http://example.org/wps\"\n");
        let config = ConfigSet::new([path]).load().unwrap();
        let endpoint = ServiceEndpoint::resolve(&config, None).unwrap();
        assert_eq!(endpoint.host, "example.org");
        assert_eq!(endpoint.port, 80);
    }

    #[test]
    fn test_endpoint_unparseable_url() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "c.toml", "[server]\nurl = \"localhost:notaport\"\n");
        let config = ConfigSet::new([path]).load().unwrap();
        let err = ServiceEndpoint::resolve(&config, None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SupervisorError>(),
            Some(SupervisorError::ConfigurationResolution { .. })
        ));
    }

    #[test]
    fn test_ipv6_addr() {
        let endpoint = ServiceEndpoint {
            host: "::1".to_string(),
            port: 8080,
            output_dir: PathBuf::from("/tmp"),
        };
        assert_eq!(endpoint.addr(), "[::1]:8080");
    }
}

//! Configuration file wrangling
// (c) 2024 Ross Younger

use crate::os::{AbstractPlatform as _, Platform};

use figment::{
    providers::{Format as _, Serialized, Toml},
    value::Value,
    Figment, Metadata, Profile, Provider,
};
use serde::Deserialize;
use std::{fmt::Display, path::Path};
use tabled::{settings::style::Style, Table, Tabled};
use tracing::trace;

use super::Configuration;

// SYSTEM DEFAULTS //////////////////////////////////////////////////////////////////////////////////////////////

/// A [`figment::Provider`](https://docs.rs/figment/latest/figment/trait.Provider.html) that holds
/// our set of fixed system default options
#[derive(Default)]
struct SystemDefault {}

impl SystemDefault {
    const META_NAME: &'static str = "default";
}

impl Provider for SystemDefault {
    fn metadata(&self) -> Metadata {
        figment::Metadata::named(Self::META_NAME)
    }

    fn data(
        &self,
    ) -> std::result::Result<figment::value::Map<Profile, figment::value::Dict>, figment::Error>
    {
        Serialized::defaults(Configuration::default()).data()
    }
}

// CONFIG MANAGER /////////////////////////////////////////////////////////////////////////////////////////////

/// Processes and merges all possible configuration sources.
///
/// Configuration file locations are platform-dependent.
#[derive(Debug, Default)]
pub struct Manager {
    /// Configuration data
    data: Figment,
}

fn add_file_if_present(f: Figment, path: Option<&Path>, what: &str) -> Figment {
    let Some(path) = path else {
        trace!("no {what} configuration file on this platform");
        return f;
    };
    if !path.exists() {
        trace!("{what} configuration file {path:?} not present");
        return f;
    }
    f.merge(Toml::file(path))
}

impl Manager {
    /// Initialises this structure, reading the set of config files appropriate to the platform
    /// and the current user.
    #[must_use]
    pub fn new() -> Self {
        let mut data = Figment::new().merge(SystemDefault::default());
        data = add_file_if_present(data, Platform::system_config_path().as_deref(), "system");
        // N.B. This may leave data in a fused-error state, if a data file isn't parseable.
        data = add_file_if_present(data, Platform::user_config_path().as_deref(), "user");
        Self { data }
    }

    /// Returns the list of configuration files we would read.
    ///
    /// This is a function of platform and the current user id.
    #[must_use]
    pub fn config_files() -> Vec<String> {
        [Platform::system_config_path(), Platform::user_config_path()]
            .into_iter()
            .flatten()
            .map(|p| p.to_string_lossy().into())
            .collect()
    }

    /// Testing/internal constructor, does not read files from system
    #[must_use]
    pub fn without_files() -> Self {
        Self {
            data: Figment::new().merge(SystemDefault::default()),
        }
    }

    /// Merges in a data set, which is some sort of [figment::Provider](https://docs.rs/figment/latest/figment/trait.Provider.html).
    ///
    /// Command-line overrides arrive this way, as a serialized struct whose unset fields are skipped.
    pub fn merge_provider<T>(&mut self, provider: T)
    where
        T: Provider,
    {
        let f = std::mem::take(&mut self.data);
        self.data = f.merge(provider); // in the error case, this leaves the provider in a fused state
    }

    /// Merges in a data set from a TOML file.
    /// The file must exist; if it does not, a subsequent [`get`](Self::get) reports an error.
    pub fn merge_toml_file<T>(&mut self, toml: T)
    where
        T: AsRef<Path>,
    {
        let path = toml.as_ref();
        let provider = Toml::file_exact(path);
        self.merge_provider(provider);
    }

    /// Attempts to extract a particular struct from the data.
    ///
    /// Within qbench, `T` is usually [Configuration], but it isn't intrinsically required to be.
    pub fn get<'de, T>(&self) -> anyhow::Result<T, figment::Error>
    where
        T: Deserialize<'de>,
    {
        self.data.extract::<T>()
    }
}

// PRETTY PRINT SUPPORT ///////////////////////////////////////////////////////////////////////////////////////

#[derive(Tabled)]
struct PrettyConfig {
    field: String,
    value: String,
    source: String,
}

impl PrettyConfig {
    fn render_source(meta: Option<&Metadata>) -> String {
        if let Some(m) = meta {
            m.source
                .as_ref()
                .map_or_else(|| m.name.to_string(), figment::Source::to_string)
        } else {
            String::new()
        }
    }

    fn render_value(value: &Value) -> String {
        match value {
            Value::String(_tag, s) => s.to_string(),
            Value::Char(_tag, c) => c.to_string(),
            Value::Bool(_tag, b) => b.to_string(),
            Value::Num(_tag, num) => {
                if let Some(i) = num.to_i128() {
                    i.to_string()
                } else if let Some(u) = num.to_u128() {
                    u.to_string()
                } else if let Some(ff) = num.to_f64() {
                    ff.to_string()
                } else {
                    "<number>".into()
                }
            }
            Value::Empty(_tag, _) => "<empty>".into(),
            // we don't currently have any dict-typed fields
            Value::Dict(_tag, _dict) => "<dict>".into(),
            Value::Array(_tag, vec) => {
                format!(
                    "[{}]",
                    vec.iter()
                        .map(PrettyConfig::render_value)
                        .collect::<Vec<_>>()
                        .join(",")
                )
            }
        }
    }

    fn new(field: &str, value: &Value, meta: Option<&Metadata>) -> Self {
        Self {
            field: field.into(),
            value: PrettyConfig::render_value(value),
            source: PrettyConfig::render_source(meta),
        }
    }
}

impl Display for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let data = match self.data.data() {
            Ok(d) => d,
            Err(e) => {
                // This isn't terribly helpful as it doesn't have metadata attached; BUT attempting to get() a struct does.
                return write!(f, "error: {e}");
            }
        };
        let Some(data) = data.get(&Profile::Default) else {
            return Ok(());
        };

        let mut fields = Vec::<PrettyConfig>::new();

        for field in data.keys() {
            let value = match self.data.find_value(field) {
                Ok(v) => v,
                Err(e) => {
                    writeln!(f, "error on field {field}: {e}")?;
                    continue;
                }
            };
            let meta = self.data.find_metadata(field);
            fields.push(PrettyConfig::new(field, &value, meta));
        }
        write!(f, "{}", Table::new(fields).with(Style::sharp()))
    }
}

#[cfg(test)]
mod test {
    use crate::config::{Configuration, Manager};
    use crate::transport::CongestionControllerType;
    use crate::util::make_test_tempfile;
    use figment::providers::Serialized;
    use serde::Deserialize;

    #[test]
    fn defaults() {
        let mgr = Manager::without_files();
        let result = mgr.get::<Configuration>().unwrap();
        let expected = Configuration::default();
        assert_eq!(expected, result);
    }

    #[test]
    fn config_merge() {
        // simulate a CLI override
        let mut mgr = Manager::without_files();
        mgr.merge_provider(Serialized::default("max_streams", 4));
        let result = mgr.get::<Configuration>().unwrap();
        let expected = Configuration {
            max_streams: 4,
            ..Default::default()
        };
        assert_eq!(expected, result);
    }

    #[test]
    fn toml_then_cli() {
        let (path, _tempdir) = make_test_tempfile(
            r#"
            rx = "125M"
            rtt = 5
            congestion = "bbr"
            alpn = "lab"
        "#,
            "test.toml",
        );
        let mut mgr = Manager::without_files();
        mgr.merge_toml_file(path);
        mgr.merge_provider(Serialized::default("rtt", 10));
        let result = mgr.get::<Configuration>().unwrap();
        assert_eq!(result.rx(), 125_000_000);
        assert_eq!(result.rtt, 10);
        assert_eq!(result.congestion, CongestionControllerType::Bbr);
        assert_eq!(result.alpn, "lab");
        assert_eq!(result.report_interval, 10);
    }

    #[test]
    fn dump_config() {
        // Not a unit test as such; this is a human test
        let (path, _tempdir) = make_test_tempfile(
            r"
            tx = 42
            unused__ = 42
        ",
            "test.toml",
        );
        let mut mgr = Manager::without_files();
        mgr.merge_toml_file(path);
        mgr.merge_provider(Serialized::default("idle_timeout", 99));
        let out = format!("{mgr}");
        println!("{out}");
        assert!(out.contains("idle_timeout"));
        assert!(out.contains("test.toml"));
    }

    #[test]
    fn missing_file() {
        let mut mgr = Manager::without_files();
        mgr.merge_toml_file("/this/file/does/not/exist.toml");
        assert!(mgr.get::<Configuration>().is_err());
    }

    #[test]
    fn unparseable_toml() {
        let (path, _tempdir) = make_test_tempfile(
            r"
            a = 1
            rx 123 # this line is a syntax error
            b = 2
        ",
            "test.toml",
        );
        let mut mgr = Manager::without_files();
        mgr.merge_toml_file(path);
        let get = mgr.get::<Configuration>();
        assert!(get.is_err());
        println!("{}", get.unwrap_err());
    }

    #[test]
    fn type_error() {
        #[derive(Deserialize)]
        struct Test {
            magic_: i32,
        }

        let (path, _tempdir) = make_test_tempfile(
            r"
            rx = true # invalid
            rtt = 3.14159 # also invalid
            magic_ = 42
        ",
            "test.toml",
        );
        let mut mgr = Manager::without_files();
        mgr.merge_toml_file(path);
        // This TOML successfully merges into the config, but you can't extract the struct.
        let err = mgr.get::<Configuration>().unwrap_err();
        println!("Error: {err}");

        // But the config as a whole is not broken and other things can be extracted:
        let other_struct = mgr.get::<Test>().unwrap();
        assert_eq!(other_struct.magic_, 42);
    }

    #[test]
    fn bad_congestion_algorithm() {
        let (path, _tempdir) = make_test_tempfile(
            r#"
            congestion = "reno"
        "#,
            "test.toml",
        );
        let mut mgr = Manager::without_files();
        mgr.merge_toml_file(path);
        let err = mgr.get::<Configuration>().unwrap_err();
        assert!(err.to_string().contains("reno"));
    }
}

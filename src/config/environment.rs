use std::collections::HashSet;
use std::fmt;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

/// Errors in an environment file: malformed documents and impossible
/// resource requests. Always fatal.
#[derive(Error, Debug, PartialEq)]
pub enum SpecError {
    #[error("Failed to parse environment file: {0}")]
    ParseError(String),

    #[error("Environment does not declare any components")]
    NoComponents,

    #[error("For component \"{component}\", {detail}")]
    InvalidPolicy { component: String, detail: String },

    #[error(
        "Cannot mix components with automatic CPU and automatic Count running on the same machine: {0}"
    )]
    MixedAutoModes(String),

    #[error("In component \"{component}\", machine \"{machine}\" does not match any in cluster")]
    UnknownMachine { component: String, machine: String },

    #[error(
        "Component \"{component}\" is requesting cpu of {cpu}, but machine type \"{machine}\" only has cpu of {available}"
    )]
    CpuExceedsNode {
        component: String,
        cpu: f64,
        machine: String,
        available: f64,
    },

    #[error(
        "Component \"{component}\" is requesting cpu of {cpu}, which yields more instances than machine type \"{machine}\" can schedule"
    )]
    TooManyInstances {
        component: String,
        cpu: f64,
        machine: String,
    },

    #[error("In \"{component}\", malformed port value: {value}")]
    MalformedPort { component: String, value: String },

    #[error("In \"{component}\", malformed volume value: {value}")]
    MalformedVolume { component: String, value: String },

    #[error("Could not find dependency \"{dependency}\" as specified in component \"{component}\"")]
    UnknownDependency {
        component: String,
        dependency: String,
    },

    #[error(
        "Invalid syntax: \"{0}\" Tunnel service must be in the format \"localport:component:remoteport\""
    )]
    InvalidTunnel(String),

    #[error("Tunnel service \"{service}\" refers to unknown component \"{component}\"")]
    UnknownTunnelComponent { service: String, component: String },

    #[error("Could not find a Dockerfile in {0}")]
    MissingDockerfile(String),
}

/// A resource value that is either given explicitly or left to the
/// allocator (`"auto"` in the environment file).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResourcePolicy<T> {
    Auto,
    Fixed(T),
}

impl<T: fmt::Display> fmt::Display for ResourcePolicy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourcePolicy::Auto => f.write_str("auto"),
            ResourcePolicy::Fixed(v) => write!(f, "{}", v),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPolicy<T> {
    Fixed(T),
    Keyword(String),
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for ResourcePolicy<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match RawPolicy::<T>::deserialize(deserializer)? {
            RawPolicy::Fixed(v) => Ok(ResourcePolicy::Fixed(v)),
            RawPolicy::Keyword(k) if k.eq_ignore_ascii_case("auto") => Ok(ResourcePolicy::Auto),
            RawPolicy::Keyword(k) => Err(de::Error::custom(format!(
                "expected a number or \"auto\", found \"{}\"",
                k
            ))),
        }
    }
}

impl<T: Serialize> Serialize for ResourcePolicy<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            ResourcePolicy::Auto => serializer.serialize_str("auto"),
            ResourcePolicy::Fixed(v) => v.serialize(serializer),
        }
    }
}

/// A parsed environment file
#[derive(Debug, Clone, Deserialize)]
pub struct EnvironmentFile {
    /// Optional display name
    #[serde(default)]
    pub name: Option<String>,

    pub environment: EnvironmentSpec,

    /// Directory relative paths (dockerfiles, copy sources) resolve against
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// The `environment` block
#[derive(Debug, Clone, Deserialize)]
pub struct EnvironmentSpec {
    /// Images that must exist on the cluster before launch
    #[serde(default)]
    pub image: Vec<ImageSpec>,

    /// Local paths to copy onto the shared volume
    #[serde(default)]
    pub copy: Vec<String>,

    /// Components in declaration order
    #[serde(deserialize_with = "deserialize_components")]
    pub components: Vec<ComponentSpec>,

    #[serde(default)]
    pub expose_tunnel: Option<TunnelExposure>,
}

/// A Docker image and the folder holding its Dockerfile
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ImageSpec {
    pub image_name: String,
    pub dockerfile: String,
}

/// One workload component
#[derive(Debug, Clone, Deserialize)]
pub struct ComponentSpec {
    /// Filled in from the key in the components map
    #[serde(skip)]
    pub name: String,

    /// Machine class the component is pinned to
    pub machine: String,

    pub cpu: ResourcePolicy<f64>,

    pub count: ResourcePolicy<u32>,

    /// Comma separated `host:container` or bare `port` entries
    #[serde(default, deserialize_with = "deserialize_opt_scalar")]
    pub ports: Option<String>,

    /// Comma separated component names
    #[serde(default)]
    pub depends: Option<String>,

    pub image: String,

    #[serde(default)]
    pub cmd: Option<String>,

    #[serde(default = "default_network")]
    pub docker_network: String,

    /// Extra volumes: `host:container[:ro|rw]`
    #[serde(default)]
    pub volumes: Vec<String>,
}

fn default_network() -> String {
    "bridge".to_string()
}

/// `expose_tunnel` accepts a single entry or a list
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TunnelExposure {
    Single(TunnelEntry),
    Many(Vec<TunnelEntry>),
}

impl TunnelExposure {
    pub fn entries(&self) -> &[TunnelEntry] {
        match self {
            TunnelExposure::Single(entry) => std::slice::from_ref(entry),
            TunnelExposure::Many(entries) => entries,
        }
    }
}

/// A raw tunnel declaration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TunnelEntry {
    /// `localport:component:remoteport`
    pub service: String,

    /// Message template; `{url}` and `{port}` are substituted
    #[serde(default)]
    pub message: Option<String>,
}

fn deserialize_components<'de, D>(deserializer: D) -> Result<Vec<ComponentSpec>, D::Error>
where
    D: Deserializer<'de>,
{
    struct ComponentsVisitor;

    impl<'de> Visitor<'de> for ComponentsVisitor {
        type Value = Vec<ComponentSpec>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of component names to component definitions")
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut components = Vec::new();
            let mut seen = HashSet::new();
            while let Some((name, mut component)) = map.next_entry::<String, ComponentSpec>()? {
                if !seen.insert(name.clone()) {
                    return Err(de::Error::custom(format!(
                        "duplicate component name \"{}\"",
                        name
                    )));
                }
                component.name = name;
                components.push(component);
            }
            Ok(components)
        }
    }

    deserializer.deserialize_map(ComponentsVisitor)
}

// `ports: 8888` is as common as `ports: "8888,8889"`
fn deserialize_opt_scalar<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    struct ScalarVisitor(PhantomData<Option<String>>);

    impl<'de> Visitor<'de> for ScalarVisitor {
        type Value = Option<String>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a string or a port number")
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_some<D2: Deserializer<'de>>(self, d: D2) -> Result<Self::Value, D2::Error> {
            d.deserialize_any(self)
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }
    }

    deserializer.deserialize_option(ScalarVisitor(PhantomData))
}

// ============================================================================
// SBIO: Pure parsing functions (no I/O)
// ============================================================================

/// Parse an environment file. YAML is a superset of JSON, so both formats
/// go through the same parser.
pub fn parse_environment(content: &str) -> Result<EnvironmentFile, SpecError> {
    serde_yaml::from_str(content).map_err(|e| SpecError::ParseError(e.to_string()))
}

impl EnvironmentFile {
    /// Parse from a string, resolving relative paths against `base_dir`
    pub fn from_str_in(content: &str, base_dir: impl Into<PathBuf>) -> Result<Self, SpecError> {
        let mut env = parse_environment(content)?;
        env.base_dir = base_dir.into();
        Ok(env)
    }

    pub fn components(&self) -> &[ComponentSpec] {
        &self.environment.components
    }

    pub fn component(&self, name: &str) -> Option<&ComponentSpec> {
        self.environment.components.iter().find(|c| c.name == name)
    }

    pub fn component_names(&self) -> Vec<&str> {
        self.environment
            .components
            .iter()
            .map(|c| c.name.as_str())
            .collect()
    }

    pub fn tunnel_entries(&self) -> &[TunnelEntry] {
        self.environment
            .expose_tunnel
            .as_ref()
            .map(|t| t.entries())
            .unwrap_or(&[])
    }

    /// Resolve a path from the environment file: `~` is expanded and
    /// relative paths are taken from the file's directory.
    pub fn full_path(&self, path: &str) -> PathBuf {
        let expanded = shellexpand::tilde(path);
        let candidate = Path::new(expanded.as_ref());
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.base_dir.join(candidate)
        }
    }
}

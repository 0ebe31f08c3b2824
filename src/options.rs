//! Layered query options and how the layers are merged.
//!
//! Options are collected from four layers, lowest precedence first:
//! 1. the built-in defaults of the calling [`Profile`]
//! 2. the Puppet settings ([`PuppetSettings`])
//! 3. the defaults file (`ldapquery.yaml` in Puppet's configuration directory)
//! 4. the options passed with the call
//!
//! Layers are merged key by key at the top level only. The nested `auth` and
//! `encryption` records are replaced as a whole when a higher layer sets them,
//! they are never merged field by field.
use std::{
	io::ErrorKind,
	path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use tracing::debug;

use crate::{error::Error, settings::PuppetSettings};

/// Option keys understood by [`Profile::Search`]. Also the key set of the
/// defaults file.
const SEARCH_KEYS: &[&str] = &[
	"base",
	"host",
	"server",
	"hosts",
	"port",
	"scope",
	"auth",
	"encryption",
	"tls",
	"connect_timeout",
	"connecttimeout",
	"time",
	"search_timeout",
	"soft_fail",
];

/// Standard LDAP port.
const LDAP_PORT: u16 = 389;

/// Seconds to wait for a connection when no layer configures a timeout.
const DEFAULT_CONNECT_TIMEOUT: i64 = 5;

/// Option keys understood by [`Profile::Query`].
const QUERY_KEYS: &[&str] = &["base", "scope", "server"];

/// The generations of the query interface. Each one accepts a fixed set of
/// option keys and has its own built-in defaults, but all of them share the
/// same resolution and search code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Profile {
	/// The original positional `ldapquery(filter, attributes, base, scope)`.
	Legacy,
	/// `ldapquery::query(filter, attributes, options)`, configured through
	/// the Puppet settings.
	Query,
	/// `ldapquery::search(...)`, configured through the defaults file and the
	/// call options.
	Search,
}

impl Profile {
	/// Function name used in diagnostics.
	#[must_use]
	pub const fn name(self) -> &'static str {
		match self {
			Profile::Legacy => "ldapquery",
			Profile::Query => "ldapquery::query",
			Profile::Search => "ldapquery::search",
		}
	}

	/// Option keys a caller may pass with this profile.
	#[must_use]
	pub const fn recognized_keys(self) -> &'static [&'static str] {
		match self {
			Profile::Legacy => &[],
			Profile::Query => QUERY_KEYS,
			Profile::Search => SEARCH_KEYS,
		}
	}

	/// Port used when no layer configures one.
	///
	/// The query interface has shipped with 363 here, which may have been
	/// meant as 389. It is kept as is since the Puppet settings normally
	/// provide `ldapport` anyway.
	#[must_use]
	pub const fn default_port(self) -> u16 {
		match self {
			Profile::Query => 363,
			Profile::Legacy | Profile::Search => LDAP_PORT,
		}
	}

	/// Whether failed searches may be turned into an empty result.
	#[must_use]
	pub const fn allows_soft_fail(self) -> bool {
		matches!(self, Profile::Search)
	}
}

/// A single layer of options. Every field is optional, unset fields fall
/// through to lower layers.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Options {
	/// Search base
	pub base: Option<String>,
	/// Directory server host
	#[serde(alias = "server")]
	pub host: Option<String>,
	/// Further `[host, port]` pairs, tried in order if connecting fails
	pub hosts: Option<Vec<(String, i64)>>,
	/// Directory server port
	pub port: Option<i64>,
	/// Search scope, one of `sub`, `base` or `single`
	pub scope: Option<String>,
	/// Bind credentials
	pub auth: Option<AuthOptions>,
	/// Transport encryption
	pub encryption: Option<EncryptionOptions>,
	/// Enable encryption, picking the method from the port
	pub tls: Option<bool>,
	/// Connect timeout in seconds
	#[serde(alias = "connecttimeout")]
	pub connect_timeout: Option<i64>,
	/// Search time limit in seconds
	#[serde(alias = "time")]
	pub search_timeout: Option<i64>,
	/// Return nothing instead of failing when the directory can't be searched
	pub soft_fail: Option<bool>,
}

/// The `auth` option record.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct AuthOptions {
	/// How to bind
	pub method: Option<AuthMethod>,
	/// Bind DN
	pub username: Option<String>,
	/// Bind password
	pub password: Option<String>,
}

/// Bind methods.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
	/// Simple bind with DN and password
	Simple,
	/// No bind at all
	Anonymous,
}

/// The `encryption` option record.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct EncryptionOptions {
	/// How to encrypt the connection
	pub method: Option<EncryptionMethod>,
	/// CA certificate to verify the server with
	pub ca_file: Option<PathBuf>,
	/// Alternative location of `ca_file`
	pub tls_options: Option<TlsOptions>,
}

impl EncryptionOptions {
	/// The configured CA file, from either location.
	#[must_use]
	pub fn ca_file(&self) -> Option<&Path> {
		self.ca_file
			.as_deref()
			.or_else(|| self.tls_options.as_ref().and_then(|tls| tls.ca_file.as_deref()))
	}
}

/// The `encryption.tls_options` record. Other TLS options are ignored.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct TlsOptions {
	/// CA certificate to verify the server with
	pub ca_file: Option<PathBuf>,
}

/// Encryption methods.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EncryptionMethod {
	/// TLS from the start of the connection (LDAPS)
	SimpleTls,
	/// Upgrade a plain connection with the StartTLS operation
	StartTls,
}

impl Options {
	/// Parse the options passed with a call, rejecting keys the profile does
	/// not know.
	pub fn from_value(value: Value, profile: Profile) -> Result<Self, Error> {
		Self::parse(value, profile.recognized_keys())
			.map_err(|err| Error::Validation(format!("{}(): {err}", profile.name())))
	}

	/// Parse a dynamic value into options. Keys are matched case
	/// insensitively, as are the `method` values.
	fn parse(value: Value, keys: &[&str]) -> Result<Self, String> {
		let value = fold_case(value);
		match &value {
			Value::Null => return Ok(Self::default()),
			Value::Mapping(mapping) => {
				for (key, _) in mapping {
					if !key.as_str().is_some_and(|key| keys.contains(&key)) {
						return Err(format!("Unrecognized option {}", describe(key)));
					}
				}
			}
			_ => return Err("Options must be a hash".to_owned()),
		}
		serde_yaml::from_value(value).map_err(|err| err.to_string())
	}

	/// Built-in defaults of a profile.
	#[must_use]
	pub fn builtin(profile: Profile) -> Self {
		Self {
			port: Some(i64::from(profile.default_port())),
			scope: Some("sub".to_owned()),
			tls: Some(false),
			connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
			search_timeout: Some(10),
			soft_fail: Some(false),
			..Self::default()
		}
	}

	/// Overlay `over` on top of `self`. Fields set in `over` win, nested
	/// records are taken whole.
	#[must_use]
	pub fn merge(self, over: Options) -> Options {
		Options {
			base: over.base.or(self.base),
			host: over.host.or(self.host),
			hosts: over.hosts.or(self.hosts),
			port: over.port.or(self.port),
			scope: over.scope.or(self.scope),
			auth: over.auth.or(self.auth),
			encryption: over.encryption.or(self.encryption),
			tls: over.tls.or(self.tls),
			connect_timeout: over.connect_timeout.or(self.connect_timeout),
			search_timeout: over.search_timeout.or(self.search_timeout),
			soft_fail: over.soft_fail.or(self.soft_fail),
		}
	}

	/// Merge all layers into the effective options of a call.
	#[must_use]
	pub fn layered(
		profile: Profile,
		settings: &PuppetSettings,
		defaults: Option<Options>,
		call: Options,
	) -> Options {
		let mut options = Self::builtin(profile).merge(Self::from(settings));
		if let Some(defaults) = defaults {
			options = options.merge(defaults);
		}
		options.merge(call)
	}
}

impl From<&PuppetSettings> for Options {
	fn from(settings: &PuppetSettings) -> Self {
		let auth = match (&settings.ldapuser, &settings.ldappassword) {
			(Some(user), Some(password)) if !user.is_empty() && !password.is_empty() => {
				Some(AuthOptions {
					method: Some(AuthMethod::Simple),
					username: Some(user.clone()),
					password: Some(password.clone()),
				})
			}
			_ => None,
		};
		let encryption = settings.ca_file().map(|ca_file| EncryptionOptions {
			ca_file: Some(ca_file),
			..EncryptionOptions::default()
		});
		Self {
			base: settings.ldapbase.clone(),
			host: settings.ldapserver.clone(),
			port: settings.ldapport.map(i64::from),
			auth,
			encryption,
			tls: Some(settings.ldaptls),
			..Self::default()
		}
	}
}

/// Load the defaults file, if there is one. A missing file is not an error.
pub async fn load_defaults(path: &Path) -> Result<Option<Options>, Error> {
	let contents = match tokio::fs::read_to_string(path).await {
		Ok(contents) => contents,
		Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
		Err(err) => return Err(err.into()),
	};
	debug!("Loading default settings from {}", path.display());

	let value: Value = serde_yaml::from_str(&contents)?;
	Options::parse(value, SEARCH_KEYS)
		.map(Some)
		.map_err(|err| Error::Configuration(format!("{}: {err}", path.display())))
}

/// Lower-case every mapping key, and the values of `method` keys.
fn fold_case(value: Value) -> Value {
	match value {
		Value::Mapping(mapping) => Value::Mapping(
			mapping
				.into_iter()
				.map(|(key, value)| {
					let key = match key {
						Value::String(key) => Value::String(key.to_lowercase()),
						key => key,
					};
					let value = match value {
						Value::String(method) if key.as_str() == Some("method") => {
							Value::String(method.to_lowercase())
						}
						value => fold_case(value),
					};
					(key, value)
				})
				.collect(),
		),
		value => value,
	}
}

/// Render an option key for an error message.
fn describe(key: &Value) -> String {
	match key {
		Value::String(key) => format!("'{key}'"),
		key => format!("{key:?}"),
	}
}

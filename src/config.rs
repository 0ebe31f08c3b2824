//! Resolved connection and search configuration.
use std::{
	fmt,
	path::{Path, PathBuf},
	str::FromStr,
	sync::Arc,
	time::Duration,
};

use ldap3::LdapConnSettings;
use rustls::{ClientConfig, RootCertStore};
use tracing::{debug, warn};
use url::Url;

use crate::{
	error::Error,
	options::{AuthMethod, AuthOptions, EncryptionMethod, Options, Profile},
	settings::PuppetSettings,
};

/// Port on which LDAP servers conventionally expect TLS from the start.
pub const LDAPS_PORT: u16 = 636;

/// How to connect to the directory server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionConfig {
	/// Host of the directory server
	pub host: String,
	/// Port of the directory server
	pub port: u16,
	/// Servers to try in order if connecting to `host` fails
	pub fallback: Vec<Endpoint>,
	/// Timeout to establish a connection in seconds.
	pub connect_timeout: Option<u64>,
	/// How to bind
	pub auth: Auth,
	/// How to encrypt the connection
	pub encryption: Encryption,
}

/// A host and port to connect to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
	/// Host name or address
	pub host: String,
	/// Port
	pub port: u16,
}

/// Bind credentials.
#[derive(Clone, PartialEq, Eq)]
pub enum Auth {
	/// Don't bind
	Anonymous,
	/// Simple bind
	Simple {
		/// Bind DN
		username: String,
		/// Bind password
		password: String,
	},
}

impl fmt::Debug for Auth {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Auth::Anonymous => f.write_str("Anonymous"),
			Auth::Simple { username, .. } => f
				.debug_struct("Simple")
				.field("username", username)
				.field("password", &"<redacted>")
				.finish(),
		}
	}
}

/// Transport encryption.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Encryption {
	/// Plain text
	None,
	/// TLS on a dedicated port
	SimpleTls {
		/// CA certificate to trust instead of the system store
		ca_file: Option<PathBuf>,
	},
	/// Plain connection upgraded with StartTLS
	StartTls {
		/// CA certificate to trust instead of the system store
		ca_file: Option<PathBuf>,
	},
}

/// Search scope.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Scope {
	/// The base object and everything below it
	#[default]
	Subtree,
	/// Only the base object
	BaseObject,
	/// Only the direct children of the base object
	SingleLevel,
}

impl FromStr for Scope {
	type Err = Error;

	fn from_str(scope: &str) -> Result<Self, Error> {
		match scope {
			"sub" => Ok(Scope::Subtree),
			"base" => Ok(Scope::BaseObject),
			"single" => Ok(Scope::SingleLevel),
			_ => Err(Error::Validation(format!(
				"Received param \"scope\" {scope:?} not one of [\"sub\",\"base\",\"single\"]"
			))),
		}
	}
}

impl From<Scope> for ldap3::Scope {
	fn from(scope: Scope) -> Self {
		match scope {
			Scope::Subtree => ldap3::Scope::Subtree,
			Scope::BaseObject => ldap3::Scope::Base,
			Scope::SingleLevel => ldap3::Scope::OneLevel,
		}
	}
}

/// What to search for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchRequest {
	/// Search base DN
	pub base: String,
	/// Filter expression, `None` matches everything
	pub filter: Option<String>,
	/// Attributes to return, empty for all of them
	pub attributes: Vec<String>,
	/// Search scope
	pub scope: Scope,
	/// Search time limit in seconds
	pub timeout: u64,
}

/// The outcome of resolving the options of a call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolved {
	/// Where and how to connect
	pub connection: ConnectionConfig,
	/// What to search for
	pub request: SearchRequest,
	/// Whether a failed search should yield nothing instead of an error
	pub soft_fail: bool,
}

/// Merge the configuration layers of a call and validate the result.
///
/// Besides checking whether a configured CA file exists, this does no I/O.
pub fn resolve(
	profile: Profile,
	settings: &PuppetSettings,
	defaults: Option<Options>,
	call: Options,
	filter: Option<&str>,
	attributes: &[String],
) -> Result<Resolved, Error> {
	let options = Options::layered(profile, settings, defaults, call);
	let mut resolved = Resolved::from_options(options, filter, attributes)?;
	resolved.soft_fail &= profile.allows_soft_fail();
	Ok(resolved)
}

impl Resolved {
	/// Validate effective options and turn them into a connection and search
	/// configuration.
	pub fn from_options(
		options: Options,
		filter: Option<&str>,
		attributes: &[String],
	) -> Result<Self, Error> {
		let (primary, fallback) = endpoints(&options)?;
		let encryption = encryption(&options, primary.port);

		let base =
			options.base.filter(|base| !base.is_empty()).ok_or_else(|| Error::missing("base"))?;
		let request = SearchRequest {
			base,
			filter: validate_filter(filter)?,
			attributes: validate_attributes(attributes)?,
			scope: options.scope.as_deref().map_or(Ok(Scope::default()), str::parse)?,
			timeout: seconds("search_timeout", options.search_timeout)?.unwrap_or(10),
		};

		let connection = ConnectionConfig {
			encryption,
			auth: auth(options.auth),
			connect_timeout: seconds("connect_timeout", options.connect_timeout)?,
			host: primary.host,
			port: primary.port,
			fallback,
		};

		Ok(Self { connection, request, soft_fail: options.soft_fail.unwrap_or(false) })
	}
}

/// Pick the primary endpoint and the fallbacks.
fn endpoints(options: &Options) -> Result<(Endpoint, Vec<Endpoint>), Error> {
	let mut hosts = options
		.hosts
		.iter()
		.flatten()
		.map(|(host, port)| {
			if host.is_empty() {
				return Err(Error::Configuration("Received an empty host in 'hosts'".to_owned()));
			}
			port_number(*port).map(|port| Endpoint { host: host.clone(), port })
		})
		.collect::<Result<Vec<_>, Error>>()?
		.into_iter();

	let primary = match options.host.as_deref().filter(|host| !host.is_empty()) {
		Some(host) => {
			let port = options.port.ok_or_else(|| Error::missing("port"))?;
			Endpoint { host: host.to_owned(), port: port_number(port)? }
		}
		None => hosts.next().ok_or_else(|| Error::missing("host"))?,
	};
	Ok((primary, hosts.collect()))
}

/// Check a port is in the range 1-65535.
fn port_number(port: i64) -> Result<u16, Error> {
	u16::try_from(port)
		.ok()
		.filter(|port| *port != 0)
		.ok_or_else(|| Error::Configuration(format!("Port {port} is not within 1-65535")))
}

/// Check an optional timeout is a positive number of seconds.
fn seconds(name: &str, value: Option<i64>) -> Result<Option<u64>, Error> {
	value
		.map(|value| {
			u64::try_from(value)
				.ok()
				.filter(|value| *value > 0)
				.ok_or_else(|| Error::Configuration(format!("'{name}' must be at least 1 second")))
		})
		.transpose()
}

/// An empty filter is rejected rather than sent as a wildcard search.
fn validate_filter(filter: Option<&str>) -> Result<Option<String>, Error> {
	match filter {
		Some("") => Err(Error::Validation(
			"Received an empty filter, leave the filter out to match all entries".to_owned(),
		)),
		filter => Ok(filter.map(str::to_owned)),
	}
}

/// Attribute names must not be empty.
fn validate_attributes(attributes: &[String]) -> Result<Vec<String>, Error> {
	if attributes.iter().any(String::is_empty) {
		return Err(Error::Validation("Received an empty attribute name".to_owned()));
	}
	Ok(attributes.to_vec())
}

/// Credentials count only if both parts are non-empty.
fn auth(options: Option<AuthOptions>) -> Auth {
	match options {
		Some(AuthOptions { method: Some(AuthMethod::Anonymous), .. }) | None => Auth::Anonymous,
		Some(AuthOptions { username: Some(username), password: Some(password), .. })
			if !username.is_empty() && !password.is_empty() =>
		{
			Auth::Simple { username, password }
		}
		Some(_) => {
			debug!("Incomplete credentials, binding anonymously");
			Auth::Anonymous
		}
	}
}

/// An explicit method wins. Otherwise `tls` picks LDAPS on port 636 and
/// StartTLS everywhere else.
fn encryption(options: &Options, port: u16) -> Encryption {
	let method = match (options.encryption.as_ref().and_then(|e| e.method), options.tls) {
		(Some(method), _) => method,
		(None, Some(true)) if port == LDAPS_PORT => EncryptionMethod::SimpleTls,
		(None, Some(true)) => EncryptionMethod::StartTls,
		(None, _) => return Encryption::None,
	};

	let ca_file = options.encryption.as_ref().and_then(|e| e.ca_file()).and_then(|path| {
		if path.is_file() {
			debug!("Using {} as CA for TLS connection", path.display());
			Some(path.to_owned())
		} else {
			warn!("{} not found, using default CAs installed in your system", path.display());
			None
		}
	});

	match method {
		EncryptionMethod::SimpleTls => Encryption::SimpleTls { ca_file },
		EncryptionMethod::StartTls => Encryption::StartTls { ca_file },
	}
}

impl ConnectionConfig {
	/// The primary endpoint followed by the fallbacks.
	pub fn endpoints(&self) -> impl Iterator<Item = Endpoint> + '_ {
		std::iter::once(Endpoint { host: self.host.clone(), port: self.port })
			.chain(self.fallback.iter().cloned())
	}

	/// Create a [`LdapConnSettings`] based on this [`ConnectionConfig`]
	pub(crate) async fn to_settings(&self) -> Result<LdapConnSettings, Error> {
		let mut settings = LdapConnSettings::new();

		if let Some(timeout) = self.connect_timeout {
			settings = settings.set_conn_timeout(Duration::from_secs(timeout));
		}

		let ca_file = match &self.encryption {
			Encryption::None => return Ok(settings),
			Encryption::SimpleTls { ca_file } => ca_file,
			Encryption::StartTls { ca_file } => {
				settings = settings.set_starttls(true);
				ca_file
			}
		};

		if let Some(path) = ca_file {
			settings = settings.set_config(Arc::new(tls_config(path).await?));
		}
		Ok(settings)
	}
}

impl Endpoint {
	/// The URL to connect to this endpoint with.
	pub(crate) fn url(&self, encryption: &Encryption) -> Result<Url, Error> {
		let scheme = match encryption {
			Encryption::SimpleTls { .. } => "ldaps",
			Encryption::None | Encryption::StartTls { .. } => "ldap",
		};
		let host = if self.host.contains(':') && !self.host.starts_with('[') {
			format!("[{}]", self.host)
		} else {
			self.host.clone()
		};
		Url::parse(&format!("{scheme}://{host}:{}", self.port)).map_err(|err| {
			Error::Configuration(format!("Invalid LDAP server '{}': {err}", self.host))
		})
	}
}

/// Client TLS configuration trusting only the certificates in `path`.
async fn tls_config(path: &Path) -> Result<ClientConfig, Error> {
	let pem = tokio::fs::read(path).await?;
	let certs = rustls_pemfile::certs(&mut pem.as_slice()).map_err(|_| {
		Error::Configuration(format!("Could not read CA certificate {}", path.display()))
	})?;

	let mut roots = RootCertStore::empty();
	let (added, _ignored) = roots.add_parsable_certificates(&certs);
	if added == 0 {
		return Err(Error::Configuration(format!(
			"No usable CA certificate in {}",
			path.display()
		)));
	}

	Ok(ClientConfig::builder()
		.with_safe_defaults()
		.with_root_certificates(roots)
		.with_no_client_auth())
}

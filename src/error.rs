//! Error codes

/// Errors that can occur when using this library
#[derive(thiserror::Error, Debug)]
pub enum Error {
	/// A required setting could not be resolved from any configuration layer,
	/// or a configured value is malformed.
	#[error("Configuration error: {0}")]
	Configuration(String),
	/// An argument passed to a query did not match the shape the query
	/// accepts.
	#[error("Invalid argument: {0}")]
	Validation(String),
	/// Connecting to, binding against or searching the directory failed.
	#[error("LDAP search failed: {0}")]
	Directory(String),
	/// An error reported by the LDAP client, counted as a directory error.
	#[error("LDAP search failed: {0}")]
	Ldap(#[from] ldap3::LdapError),
	/// Reading the defaults file or a certificate failed.
	#[error(transparent)]
	Io(#[from] std::io::Error),
	/// The defaults file is not valid YAML.
	#[error("Malformed defaults file: {0}")]
	Yaml(#[from] serde_yaml::Error),
}

impl Error {
	/// Whether the error came from communicating with the directory. Only
	/// these errors may be suppressed by `soft_fail`.
	#[must_use]
	pub fn is_directory(&self) -> bool {
		matches!(self, Error::Directory(_) | Error::Ldap(_))
	}

	/// Shorthand for a missing required setting.
	pub(crate) fn missing(setting: &str) -> Self {
		Error::Configuration(format!("Missing required setting '{setting}'"))
	}
}

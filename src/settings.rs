//! Base settings supplied by the surrounding Puppet runtime.
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Name of the CA certificate looked up in the configuration directory.
pub const CA_FILE_NAME: &str = "ldap_ca.pem";

/// Name of the defaults file looked up in the configuration directory.
pub const DEFAULTS_FILE_NAME: &str = "ldapquery.yaml";

/// The LDAP related settings of a Puppet installation, as found in
/// `puppet.conf`. These form the lowest-precedence configuration layer above
/// the built-in defaults.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(default)]
pub struct PuppetSettings {
	/// Host name of the directory server
	pub ldapserver: Option<String>,
	/// Port of the directory server
	pub ldapport: Option<u16>,
	/// Default search base
	pub ldapbase: Option<String>,
	/// Bind DN for simple authentication
	pub ldapuser: Option<String>,
	/// Password for simple authentication
	pub ldappassword: Option<String>,
	/// Whether to encrypt the connection
	pub ldaptls: bool,
	/// Puppet's configuration directory, which holds the CA certificate and
	/// the defaults file
	pub confdir: Option<PathBuf>,
}

impl PuppetSettings {
	/// Path of the CA certificate inside `confdir`, if a `confdir` is set.
	#[must_use]
	pub fn ca_file(&self) -> Option<PathBuf> {
		self.confdir.as_ref().map(|dir| dir.join(CA_FILE_NAME))
	}

	/// Path of the defaults file inside `confdir`, if a `confdir` is set.
	#[must_use]
	pub fn defaults_file(&self) -> Option<PathBuf> {
		self.confdir.as_ref().map(|dir| dir.join(DEFAULTS_FILE_NAME))
	}
}

/// Source of the base settings. Handed to [`LdapQuery`](crate::LdapQuery)
/// instead of reading a process-wide settings object.
pub trait SettingsProvider {
	/// Current base settings
	fn settings(&self) -> PuppetSettings;
}

impl SettingsProvider for PuppetSettings {
	fn settings(&self) -> PuppetSettings {
		self.clone()
	}
}

impl<F> SettingsProvider for F
where
	F: Fn() -> PuppetSettings,
{
	fn settings(&self) -> PuppetSettings {
		self()
	}
}

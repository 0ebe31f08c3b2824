//! Query an LDAP directory and get back plain, normalized result sets.
//!
//! Every query goes through the same pipeline: the options of the call are
//! layered over the defaults file and the Puppet settings and resolved into a
//! connection and search configuration, the search is run through an
//! [`LdapClient`], and every returned entry is flattened into a
//! [`ResultRecord`], mapping lower-cased attribute names to lists of strings.
//!
//! For a general primer on LDAP, the [introduction] in the `ldap3` crate which
//! is used here for interfacing with LDAP is an excellent resource.
//!
//! [introduction]: https://github.com/inejge/ldap3/blob/master/LDAP-primer.md
//!
//! # Getting started
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use ldapquery::{LdapQuery, PuppetSettings, SearchParams};
//!
//! let settings = PuppetSettings {
//!     confdir: Some("/etc/puppetlabs/puppet".into()),
//!     ..PuppetSettings::default()
//! };
//! let ldap_args = serde_yaml::from_str(
//!     "{host: ldap.example.com, auth: {method: simple, username: cn=admin, password: secret}}",
//! )?;
//!
//! let results = LdapQuery::with_settings(settings)
//!     .search(SearchParams {
//!         base: Some("dc=acme,dc=example,dc=com".to_owned()),
//!         filter: Some("(objectClass=dnsDomain)".to_owned()),
//!         attributes: vec!["dc".to_owned()],
//!         ldap_args,
//!         ..SearchParams::default()
//!     })
//!     .await?;
//!
//! for record in results.unwrap_or_default() {
//!     println!("{:?}: {:?}", record.dn(), record.get("dc"));
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Limitations
//! * Connections are not pooled, each query connects and disconnects.
//! * Failed searches are never retried. With `hosts`, the next server is only
//!   tried if connecting fails.
//! * Binary attribute values are converted to strings lossily.

pub mod config;
pub mod entry;
pub mod error;
pub mod ldap;
pub mod options;
pub mod query;
pub mod search;
pub mod settings;

pub use ldap3::{self, SearchEntry};

pub use crate::{
	config::{Auth, ConnectionConfig, Encryption, Scope, SearchRequest},
	entry::{ResultRecord, SearchEntryExt},
	error::Error,
	ldap::{Ldap, LdapClient},
	options::{Options, Profile},
	query::{LdapQuery, SearchParams},
	settings::{PuppetSettings, SettingsProvider},
};

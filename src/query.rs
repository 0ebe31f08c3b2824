//! The query functions exposed to manifests.
use std::path::PathBuf;

use serde_yaml::Value;
use tracing::warn;

use crate::{
	config,
	entry::ResultRecord,
	error::Error,
	ldap::{Ldap, LdapClient},
	options::{load_defaults, Options, Profile},
	search,
	settings::{PuppetSettings, SettingsProvider},
};

/// Arguments of [`LdapQuery::search`]. The scope, time limit and failure
/// policy given here override the same keys in `ldap_args`.
#[derive(Clone, Debug, Default)]
pub struct SearchParams {
	/// Search base. Falls back to the `base` option.
	pub base: Option<String>,
	/// Filter expression. Matches all entries if not given.
	pub filter: Option<String>,
	/// Attributes to return, all of them if empty.
	pub attributes: Vec<String>,
	/// Connection options, a hash with the keys listed in
	/// [`Profile::recognized_keys`].
	pub ldap_args: Value,
	/// One of `sub`, `base` or `single`.
	pub scope: Option<String>,
	/// Search time limit in seconds.
	pub search_timeout: Option<u64>,
	/// Return `None` instead of an error if the directory can't be searched.
	pub soft_fail: Option<bool>,
}

/// Runs LDAP queries with options resolved from the Puppet settings, the
/// defaults file and the call itself.
#[derive(Debug, Clone)]
pub struct LdapQuery<S = PuppetSettings, C = Ldap> {
	/// Source of the base settings
	settings: S,
	/// Directory client
	client: C,
	/// Location of the defaults file, if not the one in `confdir`
	defaults_file: Option<PathBuf>,
}

impl<S: SettingsProvider> LdapQuery<S, Ldap> {
	/// Query with the `ldap3` backed client.
	#[must_use]
	pub fn with_settings(settings: S) -> Self {
		Self::new(settings, Ldap)
	}
}

impl<S: SettingsProvider, C: LdapClient> LdapQuery<S, C> {
	/// Create a new [`LdapQuery`].
	#[must_use]
	pub fn new(settings: S, client: C) -> Self {
		Self { settings, client, defaults_file: None }
	}

	/// Read defaults from `path` instead of `ldapquery.yaml` in `confdir`.
	#[must_use]
	pub fn with_defaults_file(mut self, path: impl Into<PathBuf>) -> Self {
		self.defaults_file = Some(path.into());
		self
	}

	/// `ldapquery::search`: search with options from the defaults file and the
	/// call.
	///
	/// Returns `Ok(None)` if `soft_fail` is set and the directory could not be
	/// searched.
	pub async fn search(&self, params: SearchParams) -> Result<Option<Vec<ResultRecord>>, Error> {
		let profile = Profile::Search;
		if params.base.as_deref() == Some("") {
			return Err(Error::Validation(format!("{}(): Received an empty base", profile.name())));
		}

		let positional = Options {
			base: params.base,
			scope: params.scope,
			search_timeout: params
				.search_timeout
				.map(|timeout| i64::try_from(timeout).unwrap_or(i64::MAX)),
			soft_fail: params.soft_fail,
			..Options::default()
		};
		let call = Options::from_value(params.ldap_args, profile)?.merge(positional);

		self.run(profile, call, params.filter.as_deref(), &params.attributes).await
	}

	/// `ldapquery::query`: search with options from the Puppet settings.
	/// `options` may set `base`, `scope` and `server`.
	pub async fn query(
		&self,
		filter: &str,
		attributes: &[String],
		options: Value,
	) -> Result<Vec<ResultRecord>, Error> {
		let profile = Profile::Query;
		let call = Options::from_value(options, profile)?;
		self.run(profile, call, Some(filter), attributes).await.map(Option::unwrap_or_default)
	}

	/// `ldapquery`: the positional interface, `filter, attributes, base,
	/// scope`. Called with an options hash in third place it forwards to
	/// [`LdapQuery::query`].
	pub async fn ldapquery(&self, args: &[Value]) -> Result<Vec<ResultRecord>, Error> {
		let profile = Profile::Legacy;
		if args.len() > 4 {
			return Err(Error::Validation(format!(
				"Too many arguments received in {}()",
				profile.name()
			)));
		}

		let filter = string_arg(args, 0, "filter")?
			.ok_or_else(|| Error::Validation(format!("{}() requires a filter", profile.name())))?;
		let attributes = match args.get(1) {
			None | Some(Value::Null) => Vec::new(),
			Some(Value::Sequence(values)) => values
				.iter()
				.map(|value| {
					value.as_str().map(str::to_owned).ok_or_else(|| {
						Error::Validation("Received a non-string attribute name".to_owned())
					})
				})
				.collect::<Result<_, _>>()?,
			Some(_) => return Err(Error::Validation("Attributes must be an array".to_owned())),
		};

		if let Some(Value::Mapping(options)) = args.get(2) {
			warn!(
				"{}() is deprecated, please use `{}` or its replacement `{}` instead",
				profile.name(),
				Profile::Query.name(),
				Profile::Search.name()
			);
			return self.query(&filter, &attributes, Value::Mapping(options.clone())).await;
		}

		let call = Options {
			base: string_arg(args, 2, "base")?,
			scope: string_arg(args, 3, "scope")?,
			..Options::default()
		};
		self.run(profile, call, Some(&filter), &attributes).await.map(Option::unwrap_or_default)
	}

	/// Resolve the configuration of a call and run the search.
	async fn run(
		&self,
		profile: Profile,
		call: Options,
		filter: Option<&str>,
		attributes: &[String],
	) -> Result<Option<Vec<ResultRecord>>, Error> {
		let settings = self.settings.settings();
		let defaults = match self.defaults_file.clone().or_else(|| settings.defaults_file()) {
			Some(path) => load_defaults(&path).await?,
			None => None,
		};

		let resolved = config::resolve(profile, &settings, defaults, call, filter, attributes)?;
		search::execute(&self.client, &resolved.connection, &resolved.request, resolved.soft_fail)
			.await
	}
}

/// Positional string argument, `undef` counting as absent.
fn string_arg(args: &[Value], index: usize, name: &str) -> Result<Option<String>, Error> {
	match args.get(index) {
		None | Some(Value::Null) => Ok(None),
		Some(Value::String(value)) => Ok(Some(value.clone())),
		Some(_) => Err(Error::Validation(format!("Argument '{name}' must be a string"))),
	}
}

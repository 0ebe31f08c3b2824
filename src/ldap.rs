//! Client for connecting to LDAP and searching entries

use async_trait::async_trait;
use ldap3::{
	adapters::{Adapter, EntriesOnly},
	LdapConnAsync, SearchEntry, SearchOptions,
};
use tracing::{debug, warn};

use crate::{
	config::{Auth, ConnectionConfig},
	error::Error,
	search::SearchArgs,
};

/// The directory capability the query pipeline needs: run a single search and
/// hand back the entries in the order the server returned them.
#[async_trait]
pub trait LdapClient: Send + Sync {
	/// Connect according to `connection`, bind, search and disconnect.
	async fn search(
		&self,
		connection: &ConnectionConfig,
		args: &SearchArgs,
	) -> Result<Vec<SearchEntry>, Error>;
}

#[async_trait]
impl<C: LdapClient + ?Sized> LdapClient for &C {
	async fn search(
		&self,
		connection: &ConnectionConfig,
		args: &SearchArgs,
	) -> Result<Vec<SearchEntry>, Error> {
		(**self).search(connection, args).await
	}
}

/// [`LdapClient`] backed by `ldap3`. Every search uses its own connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ldap;

impl Ldap {
	/// Create a connection to the first endpoint of the configuration that
	/// accepts one.
	async fn connect(
		&self,
		connection: &ConnectionConfig,
	) -> Result<(LdapConnAsync, ldap3::Ldap), Error> {
		let settings = connection.to_settings().await?;
		let mut last_error = None;
		for endpoint in connection.endpoints() {
			let url = endpoint.url(&connection.encryption)?;
			debug!("Connecting to {url}");
			match LdapConnAsync::from_url_with_settings(settings.clone(), &url).await {
				Ok(conn) => return Ok(conn),
				Err(err) => {
					debug!("Connecting to {url} failed: {err}");
					last_error = Some(err);
				}
			}
		}
		Err(last_error.map_or_else(|| Error::missing("host"), Error::from))
	}

	/// Bind if credentials are configured, then run the search.
	async fn bind_and_search(
		ldap: &mut ldap3::Ldap,
		connection: &ConnectionConfig,
		args: &SearchArgs,
	) -> Result<Vec<SearchEntry>, Error> {
		if let Auth::Simple { username, password } = &connection.auth {
			ldap.with_timeout(args.timeout()).simple_bind(username, password).await?.success()?;
		}

		let adapters: Vec<Box<dyn Adapter<_, _>>> = vec![Box::new(EntriesOnly::new())];
		let mut search = ldap
			.with_search_options(SearchOptions::new().timelimit(args.time_limit()))
			.with_timeout(args.timeout())
			.streaming_search_with(
				adapters,
				&args.base,
				args.scope.into(),
				args.filter(),
				args.attributes.clone(),
			)
			.await?;

		let mut entries = Vec::new();
		while let Some(entry) = search.next().await? {
			entries.push(SearchEntry::construct(entry));
		}
		search.finish().await.success()?;

		Ok(entries)
	}
}

#[async_trait]
impl LdapClient for Ldap {
	async fn search(
		&self,
		connection: &ConnectionConfig,
		args: &SearchArgs,
	) -> Result<Vec<SearchEntry>, Error> {
		let (conn, mut ldap) = self.connect(connection).await?;
		let driver = tokio::spawn(async move {
			if let Err(err) = conn.drive().await {
				warn!("Ldap connection error {err}");
			}
		});

		let result = Self::bind_and_search(&mut ldap, connection, args).await;

		// The connection is closed whether or not the search succeeded
		if let Err(err) = ldap.unbind().await {
			debug!("Unbinding failed: {err}");
		}
		if let Err(err) = driver.await {
			warn!("Failed to join background task: {err}");
		}

		result
	}
}

#[cfg(test)]
mod tests {
	#![allow(clippy::unwrap_used, clippy::expect_used)]

	use super::{Ldap, LdapClient};
	use crate::{
		config::{Auth, ConnectionConfig, Encryption, Endpoint, Scope},
		error::Error,
		search::SearchArgs,
	};

	#[tokio::test]
	async fn unreachable_endpoints() {
		let connection = ConnectionConfig {
			host: "localhost".to_owned(),
			port: 1,
			fallback: vec![Endpoint { host: "localhost".to_owned(), port: 2 }],
			connect_timeout: Some(5),
			auth: Auth::Anonymous,
			encryption: Encryption::None,
		};
		let args = SearchArgs {
			base: "dc=example,dc=com".to_owned(),
			filter: None,
			attributes: Vec::new(),
			scope: Scope::Subtree,
			time: 5,
		};

		let err = Ldap.search(&connection, &args).await.unwrap_err();
		assert!(err.is_directory(), "{err}");
		assert!(std::error::Error::source(&err).is_some(), "the client error is kept as source");
		assert!(matches!(err, Error::Ldap(_)), "{err}");
	}
}

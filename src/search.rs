//! Running a search and applying the failure policy.
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::{
	config::{ConnectionConfig, Scope, SearchRequest},
	entry::{ResultRecord, SearchEntryExt},
	error::Error,
	ldap::LdapClient,
};

/// Filter used when a search has none, matching every entry.
pub const MATCH_ALL: &str = "(objectClass=*)";

/// The arguments handed to [`LdapClient::search`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchArgs {
	/// Search base DN
	pub base: String,
	/// Filter expression, only present if non-empty
	pub filter: Option<String>,
	/// Attributes to return, empty for all of them
	pub attributes: Vec<String>,
	/// Search scope
	pub scope: Scope,
	/// Time budget in seconds
	pub time: u64,
}

impl SearchArgs {
	/// The filter to send, [`MATCH_ALL`] if there is none.
	#[must_use]
	pub fn filter(&self) -> &str {
		self.filter.as_deref().unwrap_or(MATCH_ALL)
	}

	/// Server side time limit.
	#[must_use]
	pub fn time_limit(&self) -> i32 {
		i32::try_from(self.time).unwrap_or(i32::MAX)
	}

	/// Client side operation timeout.
	#[must_use]
	pub fn timeout(&self) -> Duration {
		Duration::from_secs(self.time)
	}
}

impl From<&SearchRequest> for SearchArgs {
	fn from(request: &SearchRequest) -> Self {
		Self {
			base: request.base.clone(),
			filter: request.filter.clone().filter(|filter| !filter.is_empty()),
			attributes: request.attributes.clone(),
			scope: request.scope,
			time: request.timeout,
		}
	}
}

/// Search the directory and normalize the entries it returns.
///
/// Returns `Ok(None)` only when `soft_fail` is set and the directory could not
/// be searched. Configuration errors are never suppressed. Nothing is retried.
pub async fn execute<C: LdapClient + ?Sized>(
	client: &C,
	connection: &ConnectionConfig,
	request: &SearchRequest,
	soft_fail: bool,
) -> Result<Option<Vec<ResultRecord>>, Error> {
	let args = SearchArgs::from(request);
	debug!(
		"Searching {} on {}:{} with scope {:?}, time limit {}s, auth {:?}, encryption {:?}",
		args.base,
		connection.host,
		connection.port,
		args.scope,
		args.time,
		connection.auth,
		connection.encryption,
	);

	let start = Instant::now();
	let result = client.search(connection, &args).await;
	let elapsed = start.elapsed().as_secs_f64();

	match result {
		Ok(entries) => {
			debug!(
				"Searching {} for {:?} using {} took {elapsed:.3} seconds and returned {} results",
				args.base,
				args.attributes,
				args.filter(),
				entries.len(),
			);
			let records: Vec<ResultRecord> = entries.iter().map(SearchEntryExt::to_record).collect();
			trace!("Search results: {records:?}");
			Ok(Some(records))
		}
		Err(err) if soft_fail && err.is_directory() => {
			debug!("Searching {} failed after {elapsed:.3} seconds: {err}", args.base);
			warn!("LDAP search failed, returning nothing: {err}");
			Ok(None)
		}
		Err(err) => {
			debug!("Searching {} failed after {elapsed:.3} seconds: {err}", args.base);
			Err(err)
		}
	}
}

#[cfg(test)]
mod tests {
	#![allow(clippy::unwrap_used, clippy::expect_used)]

	use std::{collections::HashMap, sync::Mutex};

	use async_trait::async_trait;
	use ldap3::SearchEntry;

	use super::{execute, SearchArgs, MATCH_ALL};
	use crate::{
		config::{Auth, ConnectionConfig, Encryption, Scope, SearchRequest},
		error::Error,
		ldap::LdapClient,
	};

	/// Replays a fixed outcome and records the arguments it was called with.
	#[derive(Debug, Default)]
	struct Mock {
		entries: Vec<SearchEntry>,
		failure: Option<fn() -> Error>,
		calls: Mutex<Vec<SearchArgs>>,
	}

	#[async_trait]
	impl LdapClient for Mock {
		async fn search(
			&self,
			_connection: &ConnectionConfig,
			args: &SearchArgs,
		) -> Result<Vec<SearchEntry>, Error> {
			self.calls.lock().unwrap().push(args.clone());
			match self.failure {
				Some(failure) => Err(failure()),
				None => Ok(self.entries.clone()),
			}
		}
	}

	fn connection() -> ConnectionConfig {
		ConnectionConfig {
			host: "ldap.example.com".to_owned(),
			port: 389,
			fallback: Vec::new(),
			connect_timeout: None,
			auth: Auth::Anonymous,
			encryption: Encryption::None,
		}
	}

	fn request(filter: Option<&str>) -> SearchRequest {
		SearchRequest {
			base: "dc=example,dc=com".to_owned(),
			filter: filter.map(str::to_owned),
			attributes: vec!["uid".to_owned()],
			scope: Scope::Subtree,
			timeout: 10,
		}
	}

	fn user(uid: &str) -> SearchEntry {
		SearchEntry {
			dn: format!("uid={uid},ou=users,dc=example,dc=com"),
			attrs: HashMap::from([("uid".to_owned(), vec![uid.to_owned()])]),
			bin_attrs: HashMap::new(),
		}
	}

	#[tokio::test]
	async fn records_in_directory_order() {
		let mock = Mock {
			entries: vec![user("zach"), user("alice"), user("zach")],
			..Mock::default()
		};
		let records = execute(&mock, &connection(), &request(Some("(uid=*)")), false)
			.await
			.unwrap()
			.expect("successful searches return records");

		assert_eq!(records.len(), 3, "entries must not be deduplicated");
		let uids: Vec<_> = records.iter().map(|record| record.first("uid").unwrap()).collect();
		assert_eq!(uids, ["zach", "alice", "zach"]);
		assert!(records.iter().all(|record| record.dn().is_some()));
	}

	#[tokio::test]
	async fn empty_result_is_not_none() {
		let mock = Mock::default();
		let records = execute(&mock, &connection(), &request(None), true).await.unwrap();
		assert_eq!(records, Some(Vec::new()));
	}

	#[tokio::test]
	async fn search_args() {
		let mock = Mock::default();
		execute(&mock, &connection(), &request(Some("(uid=zach)")), false).await.unwrap();
		execute(&mock, &connection(), &request(None), false).await.unwrap();

		let calls = mock.calls.lock().unwrap();
		assert_eq!(calls[0].filter(), "(uid=zach)");
		assert_eq!(calls[0].attributes, ["uid"]);
		assert_eq!(calls[0].time_limit(), 10);
		assert_eq!(calls[1].filter, None);
		assert_eq!(calls[1].filter(), MATCH_ALL);
	}

	#[tokio::test]
	async fn soft_fail() {
		let mock = Mock {
			failure: Some(|| Error::Directory("connection refused".to_owned())),
			..Mock::default()
		};
		let result = execute(&mock, &connection(), &request(None), true).await.unwrap();
		assert_eq!(result, None);
		assert_eq!(mock.calls.lock().unwrap().len(), 1, "failed searches are not retried");

		let err = execute(&mock, &connection(), &request(None), false).await.unwrap_err();
		assert!(matches!(&err, Error::Directory(msg) if msg == "connection refused"));
	}

	#[tokio::test]
	async fn configuration_errors_are_not_suppressed() {
		let mock = Mock {
			failure: Some(|| Error::Configuration("No usable CA certificate".to_owned())),
			..Mock::default()
		};
		let err = execute(&mock, &connection(), &request(None), true).await.unwrap_err();
		assert!(matches!(err, Error::Configuration(_)));
	}
}

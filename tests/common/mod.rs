#![allow(dead_code)]
use std::{collections::HashMap, error::Error, sync::Mutex};

use async_trait::async_trait;
use ldap3::{LdapConnAsync, SearchEntry};
use ldapquery::{search::SearchArgs, ConnectionConfig, LdapClient};

/// A directory that answers every search with the same entries, or the same
/// failure, and remembers what it was asked.
#[derive(Debug, Default)]
pub struct MockDirectory {
	pub entries: Vec<SearchEntry>,
	pub failure: Option<String>,
	pub calls: Mutex<Vec<(ConnectionConfig, SearchArgs)>>,
}

impl MockDirectory {
	pub fn with_entries(entries: Vec<SearchEntry>) -> Self {
		Self { entries, ..Self::default() }
	}

	pub fn failing(message: &str) -> Self {
		Self { failure: Some(message.to_owned()), ..Self::default() }
	}

	pub fn calls(&self) -> Vec<(ConnectionConfig, SearchArgs)> {
		self.calls.lock().unwrap().clone()
	}
}

#[async_trait]
impl LdapClient for MockDirectory {
	async fn search(
		&self,
		connection: &ConnectionConfig,
		args: &SearchArgs,
	) -> Result<Vec<SearchEntry>, ldapquery::Error> {
		self.calls.lock().unwrap().push((connection.clone(), args.clone()));
		match &self.failure {
			Some(message) => Err(ldapquery::Error::Directory(message.clone())),
			None => Ok(self.entries.clone()),
		}
	}
}

fn zach(attrs: &[(&str, &[&str])]) -> SearchEntry {
	SearchEntry {
		dn: "uid=zach,ou=users,dc=puppetlabs,dc=com".to_owned(),
		attrs: attrs
			.iter()
			.map(|(attr, values)| {
				((*attr).to_owned(), values.iter().map(|value| (*value).to_owned()).collect())
			})
			.collect(),
		bin_attrs: HashMap::new(),
	}
}

pub fn entries_single() -> Vec<SearchEntry> {
	vec![zach(&[("uid", &["zach"])])]
}

pub fn entries_object_class() -> Vec<SearchEntry> {
	vec![zach(&[(
		"objectClass",
		&["posixAccount", "shadowAccount", "inetOrgPerson", "puppetPerson", "ldapPublicKey", "top"],
	)])]
}

pub fn entries_multivalue() -> Vec<SearchEntry> {
	vec![zach(&[(
		"sshPublicKey",
		&["ssh-rsa AAAAB...1== user@somewhere\n", "ssh-rsa AAAAB...2== user@somewhereelse\n"],
	)])]
}

pub async fn ldap_connect() -> Result<ldap3::Ldap, Box<dyn Error>> {
	let (conn, mut ldap) = LdapConnAsync::new("ldap://localhost:1389").await?;
	let _handle = tokio::spawn(async move {
		if let Err(err) = conn.drive().await {
			panic!("Ldap connection error {err}");
		}
	});
	ldap.simple_bind("cn=admin,dc=example,dc=org", "adminpassword").await?;
	Ok(ldap)
}

pub async fn ldap_add_organizational_unit(
	ldap: &mut ldap3::Ldap,
	ou: &str,
) -> Result<(), Box<dyn Error>> {
	ldap.add(
		&format!("ou={},dc=example,dc=org", ou),
		vec![("objectClass", ["organizationalUnit"].into())],
	)
	.await?
	.success()?;
	Ok(())
}

pub async fn ldap_delete_organizational_unit(
	ldap: &mut ldap3::Ldap,
	ou: &str,
) -> Result<(), Box<dyn Error>> {
	ldap.delete(&format!("ou={},dc=example,dc=org", ou)).await?.success()?;
	Ok(())
}

pub async fn ldap_add_user(
	ldap: &mut ldap3::Ldap,
	cn: &str,
	uid: &str,
) -> Result<(), Box<dyn Error>> {
	ldap.add(
		&format!("cn={},ou=users,dc=example,dc=org", cn),
		vec![
			("objectClass", ["inetOrgPerson"].into()),
			("sn", [cn].into()),
			("uid", [uid].into()),
		],
	)
	.await?
	.success()?;
	Ok(())
}

pub async fn ldap_delete_user(ldap: &mut ldap3::Ldap, cn: &str) -> Result<(), Box<dyn Error>> {
	ldap.delete(&format!("cn={},ou=users,dc=example,dc=org", cn)).await?.success()?;
	Ok(())
}

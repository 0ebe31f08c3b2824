//! Normalization of search results.
use std::collections::{btree_map, BTreeMap};

use ldap3::SearchEntry;
use serde::Serialize;

/// A search result entry, flattened to lower-cased attribute names mapping to
/// lists of strings. Always contains the `dn` of the entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ResultRecord(BTreeMap<String, Vec<String>>);

impl ResultRecord {
	/// The DN of the entry.
	#[must_use]
	pub fn dn(&self) -> Option<&str> {
		self.first("dn")
	}

	/// All values of an attribute. The name is matched case insensitively.
	#[must_use]
	pub fn get(&self, attr: &str) -> Option<&[String]> {
		self.0.get(&attr.to_lowercase()).map(Vec::as_slice)
	}

	/// The first value of an attribute.
	#[must_use]
	pub fn first(&self, attr: &str) -> Option<&str> {
		self.get(attr)?.first().map(String::as_str)
	}

	/// Number of attributes, including `dn`.
	#[must_use]
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Whether the record has no attributes at all.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Iterate over attribute names and values in name order.
	pub fn iter(&self) -> btree_map::Iter<'_, String, Vec<String>> {
		self.0.iter()
	}

	/// Add values to an attribute. Values lose trailing whitespace, and an
	/// attribute without values is left out.
	fn push<I: IntoIterator<Item = String>>(&mut self, attr: &str, values: I) {
		let values: Vec<String> = values.into_iter().map(trim_end).collect();
		if values.is_empty() {
			return;
		}
		self.0.entry(attr.to_lowercase()).or_default().extend(values);
	}
}

impl<K: AsRef<str>> FromIterator<(K, Vec<String>)> for ResultRecord {
	fn from_iter<T: IntoIterator<Item = (K, Vec<String>)>>(iter: T) -> Self {
		let mut record = Self::default();
		for (attr, values) in iter {
			record.push(attr.as_ref(), values);
		}
		record
	}
}

impl From<ResultRecord> for BTreeMap<String, Vec<String>> {
	fn from(record: ResultRecord) -> Self {
		record.0
	}
}

impl<'a> IntoIterator for &'a ResultRecord {
	type Item = (&'a String, &'a Vec<String>);
	type IntoIter = btree_map::Iter<'a, String, Vec<String>>;

	fn into_iter(self) -> Self::IntoIter {
		self.iter()
	}
}

/// Strip trailing newlines and other trailing whitespace.
fn trim_end(value: String) -> String {
	let trimmed = value.trim_end();
	if trimmed.len() == value.len() {
		value
	} else {
		trimmed.to_owned()
	}
}

/// An extension trait for [`SearchEntry`] that provides convenience methods for
/// extracting data.
pub trait SearchEntryExt {
	/// Flatten the entry into a [`ResultRecord`].
	fn to_record(&self) -> ResultRecord;
}

impl SearchEntryExt for SearchEntry {
	fn to_record(&self) -> ResultRecord {
		let mut record = ResultRecord::default();
		record.push("dn", [self.dn.clone()]);

		let mut attrs: Vec<_> = self.attrs.iter().collect();
		attrs.sort_unstable_by(|a, b| a.0.cmp(b.0));
		for (attr, values) in attrs {
			record.push(attr, values.iter().cloned());
		}

		// Values that aren't valid UTF-8 end up here
		let mut bin_attrs: Vec<_> = self.bin_attrs.iter().collect();
		bin_attrs.sort_unstable_by(|a, b| a.0.cmp(b.0));
		for (attr, values) in bin_attrs {
			let values = values.iter().map(|value| String::from_utf8_lossy(value).into_owned());
			record.push(attr, values);
		}

		record
	}
}

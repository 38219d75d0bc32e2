//! Full-text index.
//!
//! An inverted index from normalized tokens to the primary keys of the rows
//! containing them, plus a forward map from primary key to tokens so a row
//! can be unindexed without re-reading its old text. Postings are kept in
//! memory and rebuilt by backfill.

use crate::error::{CoreError, CoreResult};
use crate::index::descriptor::IndexDescriptor;
use crate::index::secondary::KeyScan;
use crate::index::traits::RowIndex;
use crate::key::CompositeKey;
use crate::schema::Row;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;
use std::sync::Arc;

/// How text is split into tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenizerConfig {
    /// Shortest token kept, in characters.
    pub min_token_length: usize,
    /// Longest token kept, in characters.
    pub max_token_length: usize,
    /// Fold tokens to lower case.
    pub case_insensitive: bool,
    /// Separators in addition to whitespace and ASCII punctuation.
    pub extra_separators: Vec<char>,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            min_token_length: 1,
            max_token_length: 64,
            case_insensitive: true,
            extra_separators: Vec::new(),
        }
    }
}

impl TokenizerConfig {
    /// Creates a new tokenizer configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the minimum token length.
    #[must_use]
    pub fn min_length(mut self, len: usize) -> Self {
        self.min_token_length = len;
        self
    }

    /// Sets the maximum token length.
    #[must_use]
    pub fn max_length(mut self, len: usize) -> Self {
        self.max_token_length = len;
        self
    }

    /// Keeps token case as written.
    #[must_use]
    pub fn case_sensitive(mut self) -> Self {
        self.case_insensitive = false;
        self
    }

    /// Adds separator characters.
    #[must_use]
    pub fn with_separators(mut self, chars: &[char]) -> Self {
        self.extra_separators.extend_from_slice(chars);
        self
    }

    fn normalize(&self, token: &str) -> String {
        if self.case_insensitive {
            token.to_lowercase()
        } else {
            token.to_string()
        }
    }

    fn is_separator(&self, c: char) -> bool {
        c.is_whitespace() || c.is_ascii_punctuation() || self.extra_separators.contains(&c)
    }

    /// Splits `text` into normalized tokens, in order, with repeats.
    #[must_use]
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        text.split(|c: char| self.is_separator(c))
            .filter(|t| {
                let len = t.chars().count();
                len > 0 && len >= self.min_token_length && len <= self.max_token_length
            })
            .map(|t| self.normalize(t))
            .collect()
    }
}

#[derive(Default)]
struct Postings {
    inverted: BTreeMap<String, BTreeSet<CompositeKey>>,
    forward: HashMap<CompositeKey, BTreeSet<String>>,
}

impl Postings {
    fn add(&mut self, pk: CompositeKey, tokens: BTreeSet<String>) {
        for token in &tokens {
            self.inverted
                .entry(token.clone())
                .or_default()
                .insert(pk.clone());
        }
        self.forward.insert(pk, tokens);
    }

    fn remove(&mut self, pk: &CompositeKey) -> bool {
        let Some(tokens) = self.forward.remove(pk) else {
            return false;
        };
        for token in tokens {
            if let Some(keys) = self.inverted.get_mut(&token) {
                keys.remove(pk);
                if keys.is_empty() {
                    self.inverted.remove(&token);
                }
            }
        }
        true
    }

    fn all_of(&self, tokens: &[String]) -> Vec<CompositeKey> {
        let Some((first, rest)) = tokens.split_first() else {
            return Vec::new();
        };
        let Some(seed) = self.inverted.get(first) else {
            return Vec::new();
        };
        let mut hits = seed.clone();
        for token in rest {
            match self.inverted.get(token) {
                Some(keys) => hits.retain(|pk| keys.contains(pk)),
                None => return Vec::new(),
            }
            if hits.is_empty() {
                break;
            }
        }
        hits.into_iter().collect()
    }

    fn any_of(&self, tokens: &[String]) -> Vec<CompositeKey> {
        let mut hits = BTreeSet::new();
        for token in tokens {
            if let Some(keys) = self.inverted.get(token) {
                hits.extend(keys.iter().cloned());
            }
        }
        hits.into_iter().collect()
    }

    fn with_prefix(&self, prefix: &str) -> Vec<CompositeKey> {
        let mut hits = BTreeSet::new();
        let range = self
            .inverted
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded));
        for (token, keys) in range {
            if !token.starts_with(prefix) {
                break;
            }
            hits.extend(keys.iter().cloned());
        }
        hits.into_iter().collect()
    }
}

/// Token index over one or more text columns.
///
/// Results come back in primary-key order.
pub struct FullTextIndex {
    descriptor: Arc<IndexDescriptor>,
    tokenizer: TokenizerConfig,
    postings: Mutex<Postings>,
}

impl FullTextIndex {
    /// Creates an empty index.
    pub fn new(descriptor: Arc<IndexDescriptor>, tokenizer: TokenizerConfig) -> Self {
        Self {
            descriptor,
            tokenizer,
            postings: Mutex::new(Postings::default()),
        }
    }

    /// Returns a shared handle to the index descriptor.
    #[must_use]
    pub fn shared_descriptor(&self) -> Arc<IndexDescriptor> {
        Arc::clone(&self.descriptor)
    }

    /// Returns the tokenizer settings.
    #[must_use]
    pub fn tokenizer(&self) -> &TokenizerConfig {
        &self.tokenizer
    }

    fn tokens_of(&self, row: &Row) -> BTreeSet<String> {
        self.descriptor
            .columns()
            .iter()
            .filter_map(|&pos| row.get(pos).and_then(|v| v.as_text()))
            .flat_map(|text| self.tokenizer.tokenize(text))
            .collect()
    }

    /// Rows containing every token of `query`.
    #[must_use]
    pub fn search(&self, query: &str) -> Vec<CompositeKey> {
        let tokens = self.tokenizer.tokenize(query);
        self.postings.lock().all_of(&tokens)
    }

    /// Rows containing at least one token of `query`.
    #[must_use]
    pub fn search_any(&self, query: &str) -> Vec<CompositeKey> {
        let tokens = self.tokenizer.tokenize(query);
        self.postings.lock().any_of(&tokens)
    }

    /// Rows containing a token that starts with `prefix`.
    #[must_use]
    pub fn search_prefix(&self, prefix: &str) -> Vec<CompositeKey> {
        let prefix = self.tokenizer.normalize(prefix);
        if prefix.is_empty() {
            return Vec::new();
        }
        self.postings.lock().with_prefix(&prefix)
    }

    /// Number of distinct tokens.
    #[must_use]
    pub fn token_count(&self) -> usize {
        self.postings.lock().inverted.len()
    }

    /// Tokens indexed for the row with primary key `pk`.
    #[must_use]
    pub fn tokens_for(&self, pk: &CompositeKey) -> Vec<String> {
        self.postings
            .lock()
            .forward
            .get(pk)
            .map(|t| t.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl RowIndex for FullTextIndex {
    fn descriptor(&self) -> &IndexDescriptor {
        &self.descriptor
    }

    fn insert_row(&self, row: &Row) -> CoreResult<()> {
        let pk = self.descriptor.primary_key_of(row);
        let tokens = self.tokens_of(row);
        let mut postings = self.postings.lock();
        postings.remove(&pk);
        postings.add(pk, tokens);
        Ok(())
    }

    fn delete_row(&self, row: &Row) -> CoreResult<bool> {
        let pk = self.descriptor.primary_key_of(row);
        Ok(self.postings.lock().remove(&pk))
    }

    fn update_row(&self, old: &Row, new: &Row) -> CoreResult<()> {
        let old_pk = self.descriptor.primary_key_of(old);
        let new_pk = self.descriptor.primary_key_of(new);
        let tokens = self.tokens_of(new);
        let mut postings = self.postings.lock();
        postings.remove(&old_pk);
        postings.remove(&new_pk);
        postings.add(new_pk, tokens);
        Ok(())
    }

    /// Treats each text component of `key` as an AND query.
    fn lookup(&self, key: &CompositeKey) -> CoreResult<Vec<CompositeKey>> {
        let query: Vec<&str> = key.values().iter().filter_map(|v| v.as_text()).collect();
        Ok(self.search(&query.join(" ")))
    }

    fn range_scan(
        &self,
        _start: Option<&CompositeKey>,
        _end: Option<&CompositeKey>,
    ) -> CoreResult<KeyScan> {
        Err(CoreError::invalid_operation(format!(
            "full-text index '{}' does not support range scans",
            self.descriptor.qualified_name()
        )))
    }

    fn len(&self) -> u64 {
        self.postings.lock().forward.len() as u64
    }
}

impl std::fmt::Debug for FullTextIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FullTextIndex")
            .field("index", &self.descriptor.qualified_name())
            .field("rows", &self.len())
            .field("tokens", &self.token_count())
            .finish_non_exhaustive()
    }
}

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use textloc_bridge::Completion;
use tracing::{debug, info, warn};
use unic_langid::LanguageIdentifier;

use crate::error::LocalizationError;
use crate::string_table::StringTable;

/// Identifies one table in one locale
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableKey {
    pub table: String,
    pub locale: LanguageIdentifier,
}

impl TableKey {
    pub fn new(table: &str, locale: &LanguageIdentifier) -> Self {
        Self {
            table: table.to_string(),
            locale: locale.clone(),
        }
    }
}

/// Path of a table file: `<dir>/<locale>/<table>.<extension>`
pub fn table_path(dir: &Path, key: &TableKey, extension: &str) -> PathBuf {
    dir.join(key.locale.to_string())
        .join(format!("{}.{}", key.table, extension))
}

struct PendingLookup {
    key: TableKey,
    entry: String,
    args: Vec<(String, String)>,
    completion: Completion<String>,
}

#[derive(Default)]
struct DatabaseState {
    tables: HashMap<TableKey, Arc<StringTable>>,
    pending: Vec<PendingLookup>,
}

/// Localized string tables, handing out completion handles for lookups.
///
/// A lookup against a table that is not loaded yet stays pending until the
/// table is added (or its load fails), then completes with the formatted
/// string. Missing entries complete with an empty string.
pub struct StringDatabase {
    fallback_locale: LanguageIdentifier,
    state: Mutex<DatabaseState>,
}

impl StringDatabase {
    pub fn new(fallback_locale: LanguageIdentifier) -> Self {
        Self {
            fallback_locale,
            state: Mutex::new(DatabaseState::default()),
        }
    }

    pub fn fallback_locale(&self) -> &LanguageIdentifier {
        &self.fallback_locale
    }

    fn lock(&self) -> MutexGuard<'_, DatabaseState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Parse and install a table, then complete every lookup waiting on it
    pub fn add_table(
        &self,
        table: &str,
        locale: &LanguageIdentifier,
        source: String,
    ) -> Result<(), LocalizationError> {
        let parsed = Arc::new(StringTable::parse(table, locale.clone(), source)?);
        let key = TableKey::new(table, locale);

        let (resolved, waiting) = {
            let mut state = self.lock();
            state.tables.insert(key.clone(), parsed);
            let waiting = take_pending(&mut state.pending, &key);
            let resolved: Vec<String> = waiting
                .iter()
                .map(|lookup| self.resolve(&state.tables, &key, &lookup.entry, &lookup.args))
                .collect();
            (resolved, waiting)
        };
        info!(
            "Loaded string table '{}' for {} ({} waiting lookups)",
            table,
            locale,
            waiting.len()
        );

        // Complete outside the lock, listeners may look up more strings.
        complete_all(waiting, resolved);
        Ok(())
    }

    /// Give up on a table that could not be loaded.
    ///
    /// Waiting lookups complete from the fallback locale when possible,
    /// otherwise with an empty string.
    pub fn abandon_table(&self, table: &str, locale: &LanguageIdentifier) {
        let key = TableKey::new(table, locale);
        let (resolved, waiting) = {
            let mut state = self.lock();
            let waiting = take_pending(&mut state.pending, &key);
            let resolved: Vec<String> = waiting
                .iter()
                .map(|lookup| self.resolve(&state.tables, &key, &lookup.entry, &lookup.args))
                .collect();
            (resolved, waiting)
        };
        if !waiting.is_empty() {
            warn!(
                "String table '{}' for {} unavailable, completing {} waiting lookups",
                table,
                locale,
                waiting.len()
            );
        }
        complete_all(waiting, resolved);
    }

    pub fn is_loaded(&self, table: &str, locale: &LanguageIdentifier) -> bool {
        self.lock().tables.contains_key(&TableKey::new(table, locale))
    }

    /// Number of lookups still waiting for a table
    pub fn pending_lookups(&self) -> usize {
        self.lock().pending.len()
    }

    /// Look up `entry` in `table` for `locale`
    pub fn get_localized_string_async(
        &self,
        table: &str,
        entry: &str,
        locale: &LanguageIdentifier,
    ) -> Completion<String> {
        self.get_localized_string_with_args_async(table, entry, locale, &[])
    }

    /// Look up and format `entry` with Fluent arguments
    pub fn get_localized_string_with_args_async(
        &self,
        table: &str,
        entry: &str,
        locale: &LanguageIdentifier,
        args: &[(String, String)],
    ) -> Completion<String> {
        let key = TableKey::new(table, locale);
        let mut state = self.lock();
        if state.tables.contains_key(&key) {
            return Completion::completed(self.resolve(&state.tables, &key, entry, args));
        }

        debug!("String table '{}' for {} not loaded yet, lookup of '{}' pending", table, locale, entry);
        let completion = Completion::pending();
        state.pending.push(PendingLookup {
            key,
            entry: entry.to_string(),
            args: args.to_vec(),
            completion: completion.clone(),
        });
        completion
    }

    /// Read `<dir>/<locale>/<table>.ftl` and install it.
    ///
    /// On failure, lookups waiting on the table are completed through
    /// [`StringDatabase::abandon_table`] before the error is returned.
    pub async fn load_table(
        &self,
        dir: &Path,
        table: &str,
        locale: &LanguageIdentifier,
    ) -> Result<(), LocalizationError> {
        let path = table_path(dir, &TableKey::new(table, locale), "ftl");
        let loaded = match tokio::fs::read_to_string(&path).await {
            Ok(source) => self.add_table(table, locale, source),
            Err(source) => Err(LocalizationError::Io { path, source }),
        };
        if loaded.is_err() {
            self.abandon_table(table, locale);
        }
        loaded
    }

    /// Resolve an entry, falling back to the fallback locale's table
    fn resolve(
        &self,
        tables: &HashMap<TableKey, Arc<StringTable>>,
        key: &TableKey,
        entry: &str,
        args: &[(String, String)],
    ) -> String {
        if let Some(text) = tables.get(key).and_then(|table| table.format(entry, args)) {
            return text;
        }

        if key.locale != self.fallback_locale {
            let fallback = TableKey::new(&key.table, &self.fallback_locale);
            if let Some(text) = tables.get(&fallback).and_then(|table| table.format(entry, args)) {
                debug!(
                    "Entry '{}' missing for {}, using {}",
                    entry, key.locale, self.fallback_locale
                );
                return text;
            }
        }

        warn!(
            "Missing translation for key: '{}' in table '{}' ({})",
            entry, key.table, key.locale
        );
        String::new()
    }
}

fn complete_all(waiting: Vec<PendingLookup>, resolved: Vec<String>) {
    for (lookup, text) in waiting.into_iter().zip(resolved) {
        if let Err(e) = lookup.completion.complete(text) {
            warn!("String lookup of '{}' could not be completed: {}", lookup.entry, e);
        }
    }
}

fn take_pending(pending: &mut Vec<PendingLookup>, key: &TableKey) -> Vec<PendingLookup> {
    let (matching, rest): (Vec<_>, Vec<_>) =
        std::mem::take(pending).into_iter().partition(|lookup| lookup.key == *key);
    *pending = rest;
    matching
}

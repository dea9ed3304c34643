use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::de::DeserializeOwned;
use textloc_bridge::Completion;
use tracing::{debug, info, warn};
use unic_langid::LanguageIdentifier;

use crate::error::LocalizationError;
use crate::string_database::{table_path, TableKey};

type AssetTable<A> = HashMap<String, Arc<A>>;

struct PendingAsset<A> {
    key: TableKey,
    entry: String,
    completion: Completion<Option<Arc<A>>>,
}

struct DatabaseState<A> {
    tables: HashMap<TableKey, AssetTable<A>>,
    pending: Vec<PendingAsset<A>>,
}

/// Localized asset tables (fonts, materials) keyed by table, locale and entry.
///
/// Lookups complete with `None` when the entry does not exist in the
/// requested or fallback locale.
pub struct AssetDatabase<A> {
    fallback_locale: LanguageIdentifier,
    state: Mutex<DatabaseState<A>>,
}

impl<A> AssetDatabase<A>
where
    A: DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(fallback_locale: LanguageIdentifier) -> Self {
        Self {
            fallback_locale,
            state: Mutex::new(DatabaseState {
                tables: HashMap::new(),
                pending: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DatabaseState<A>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Install a table from its RON source, a map of entry name to asset
    pub fn add_table_from_ron(
        &self,
        table: &str,
        locale: &LanguageIdentifier,
        source: &str,
    ) -> Result<(), LocalizationError> {
        let assets: HashMap<String, A> =
            ron::from_str(source).map_err(|e| LocalizationError::AssetTableParse {
                table: table.to_string(),
                message: e.to_string(),
            })?;
        self.add_table(table, locale, assets);
        Ok(())
    }

    /// Install a table and complete every lookup waiting on it
    pub fn add_table(&self, table: &str, locale: &LanguageIdentifier, assets: HashMap<String, A>) {
        let key = TableKey::new(table, locale);
        let entries: AssetTable<A> = assets
            .into_iter()
            .map(|(entry, asset)| (entry, Arc::new(asset)))
            .collect();
        let count = entries.len();

        let resolved = {
            let mut state = self.lock();
            state.tables.insert(key.clone(), entries);
            self.take_resolved(&mut state, &key)
        };
        info!(
            "Loaded asset table '{}' for {} with {} entries ({} waiting lookups)",
            table,
            locale,
            count,
            resolved.len()
        );
        complete_all(resolved);
    }

    /// Complete lookups waiting on a table that will never load
    pub fn abandon_table(&self, table: &str, locale: &LanguageIdentifier) {
        let key = TableKey::new(table, locale);
        let resolved = {
            let mut state = self.lock();
            self.take_resolved(&mut state, &key)
        };
        if !resolved.is_empty() {
            warn!(
                "Asset table '{}' for {} unavailable, completing {} waiting lookups",
                table,
                locale,
                resolved.len()
            );
        }
        complete_all(resolved);
    }

    pub fn is_loaded(&self, table: &str, locale: &LanguageIdentifier) -> bool {
        self.lock().tables.contains_key(&TableKey::new(table, locale))
    }

    pub fn pending_lookups(&self) -> usize {
        self.lock().pending.len()
    }

    /// Look up `entry` in `table` for `locale`
    pub fn get_localized_asset_async(
        &self,
        table: &str,
        entry: &str,
        locale: &LanguageIdentifier,
    ) -> Completion<Option<Arc<A>>> {
        let key = TableKey::new(table, locale);
        let mut state = self.lock();
        if state.tables.contains_key(&key) {
            return Completion::completed(self.resolve(&state.tables, &key, entry));
        }

        debug!("Asset table '{}' for {} not loaded yet, lookup of '{}' pending", table, locale, entry);
        let completion = Completion::pending();
        state.pending.push(PendingAsset {
            key,
            entry: entry.to_string(),
            completion: completion.clone(),
        });
        completion
    }

    /// Read `<dir>/<locale>/<table>.ron` and install it
    pub async fn load_table(
        &self,
        dir: &Path,
        table: &str,
        locale: &LanguageIdentifier,
    ) -> Result<(), LocalizationError> {
        let path = table_path(dir, &TableKey::new(table, locale), "ron");
        let loaded = match tokio::fs::read_to_string(&path).await {
            Ok(source) => self.add_table_from_ron(table, locale, &source),
            Err(source) => Err(LocalizationError::Io { path, source }),
        };
        if loaded.is_err() {
            self.abandon_table(table, locale);
        }
        loaded
    }

    fn take_resolved(
        &self,
        state: &mut DatabaseState<A>,
        key: &TableKey,
    ) -> Vec<(Completion<Option<Arc<A>>>, Option<Arc<A>>)> {
        let (waiting, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut state.pending)
            .into_iter()
            .partition(|lookup| lookup.key == *key);
        state.pending = rest;
        waiting
            .into_iter()
            .map(|lookup| {
                let asset = self.resolve(&state.tables, key, &lookup.entry);
                (lookup.completion, asset)
            })
            .collect()
    }

    fn resolve(
        &self,
        tables: &HashMap<TableKey, AssetTable<A>>,
        key: &TableKey,
        entry: &str,
    ) -> Option<Arc<A>> {
        if let Some(asset) = tables.get(key).and_then(|table| table.get(entry)) {
            return Some(Arc::clone(asset));
        }
        let fallback = TableKey::new(&key.table, &self.fallback_locale);
        tables
            .get(&fallback)
            .and_then(|table| table.get(entry))
            .map(Arc::clone)
    }
}

fn complete_all<A>(resolved: Vec<(Completion<Option<Arc<A>>>, Option<Arc<A>>)>) {
    for (completion, asset) in resolved {
        if let Err(e) = completion.complete(asset) {
            warn!("Asset lookup could not be completed: {}", e);
        }
    }
}

impl<A> fmt::Debug for AssetDatabase<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("AssetDatabase")
            .field("fallback_locale", &self.fallback_locale)
            .field("tables", &state.tables.keys().collect::<Vec<_>>())
            .field("pending", &state.pending.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::FontAsset;
    use crate::locale::parse_locale;
    use textloc_bridge::AsyncHandle;

    const FONTS: &str = r#"{
        "body": (family: "Noto Sans", path: "fonts/NotoSans-Regular.ttf"),
        "title": (family: "Noto Serif", path: "fonts/NotoSerif-Bold.ttf", size: 48.0),
    }"#;

    fn en() -> LanguageIdentifier {
        parse_locale("en-US").unwrap()
    }

    #[test]
    fn test_lookup_waits_for_asset_table() {
        let fonts = AssetDatabase::<FontAsset>::new(en());
        let handle = fonts.get_localized_asset_async("fonts", "title", &en());
        assert!(!handle.is_done());
        assert_eq!(handle.result(), None);

        fonts.add_table_from_ron("fonts", &en(), FONTS).unwrap();
        let font = handle.result().expect("title font");
        assert_eq!(font.family, "Noto Serif");
        assert!((font.size - 48.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_missing_asset_resolves_to_none() {
        let fonts = AssetDatabase::<FontAsset>::new(en());
        fonts.add_table_from_ron("fonts", &en(), FONTS).unwrap();

        let body = fonts.get_localized_asset_async("fonts", "body", &en()).result();
        assert!((body.expect("body font").size - 24.0).abs() < f32::EPSILON);

        let handle = fonts.get_localized_asset_async("fonts", "caption", &en());
        assert!(handle.is_done());
        assert_eq!(handle.result(), None);
    }

    #[test]
    fn test_bad_manifest_is_rejected() {
        let fonts = AssetDatabase::<FontAsset>::new(en());
        let err = fonts
            .add_table_from_ron("fonts", &en(), "{ \"body\": (family: 3) }")
            .unwrap_err();
        assert!(matches!(err, LocalizationError::AssetTableParse { .. }));
        assert!(!fonts.is_loaded("fonts", &en()));
    }
}

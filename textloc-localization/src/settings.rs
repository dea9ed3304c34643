use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use textloc_bridge::{AsyncHandle, Completion};
use tracing::{debug, error, info, warn};
use unic_langid::LanguageIdentifier;

use crate::asset::{FontAsset, MaterialAsset};
use crate::asset_database::AssetDatabase;
use crate::config::LocalizationConfig;
use crate::error::LocalizationError;
use crate::locale::match_supported;
use crate::string_database::StringDatabase;

/// Outcome of loading every configured table
#[derive(Debug, Default)]
pub struct LoadReport {
    pub loaded: usize,
    pub failed: Vec<(String, LocalizationError)>,
}

impl LoadReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    fn merge(&mut self, other: Self) {
        self.loaded += other.loaded;
        self.failed.extend(other.failed);
    }
}

/// Shared handle to the settings, as held by labels and background loaders
pub type SharedSettings = Arc<LocalizationSettings>;

/// Process-wide localization state: selected locale plus string and asset databases
pub struct LocalizationSettings {
    this: Weak<Self>,
    config: LocalizationConfig,
    supported: Vec<LanguageIdentifier>,
    selected: RwLock<LanguageIdentifier>,
    strings: StringDatabase,
    fonts: AssetDatabase<FontAsset>,
    materials: AssetDatabase<MaterialAsset>,
    locale_subscribers: Mutex<Vec<async_channel::Sender<LanguageIdentifier>>>,
    initialization: Completion<()>,
    initialize_started: AtomicBool,
    locale_loads: Mutex<HashMap<LanguageIdentifier, Completion<()>>>,
}

impl LocalizationSettings {
    /// Create settings starting on `selected`, which must be a supported locale
    pub fn new(
        config: LocalizationConfig,
        selected: LanguageIdentifier,
    ) -> Result<SharedSettings, LocalizationError> {
        config.validate()?;
        let supported = config.supported_locales()?;
        if !supported.contains(&selected) {
            return Err(LocalizationError::UnsupportedLocale(selected.to_string()));
        }
        let fallback = config.fallback_locale()?;

        info!(
            "Localization settings ready. Selected locale: {}, fallback: {}",
            selected, fallback
        );
        Ok(Arc::new_cyclic(|this| Self {
            this: this.clone(),
            config,
            supported,
            selected: RwLock::new(selected),
            strings: StringDatabase::new(fallback.clone()),
            fonts: AssetDatabase::new(fallback.clone()),
            materials: AssetDatabase::new(fallback),
            locale_subscribers: Mutex::new(Vec::new()),
            initialization: Completion::pending(),
            initialize_started: AtomicBool::new(false),
            locale_loads: Mutex::new(HashMap::new()),
        }))
    }

    /// Create settings with the locale resolved from the command line override,
    /// the environment, or the configured default
    pub fn from_config(
        config: LocalizationConfig,
        cli_override: Option<&str>,
    ) -> Result<SharedSettings, LocalizationError> {
        let selected = config.resolve_locale(cli_override)?;
        Self::new(config, selected)
    }

    pub fn config(&self) -> &LocalizationConfig {
        &self.config
    }

    pub fn supported_locales(&self) -> &[LanguageIdentifier] {
        &self.supported
    }

    pub fn selected_locale(&self) -> LanguageIdentifier {
        self.selected
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn fallback_locale(&self) -> &LanguageIdentifier {
        self.strings.fallback_locale()
    }

    /// Select a new locale. Returns `true` if the selection changed, in which
    /// case the locale's tables start loading and every subscriber is told
    /// about it.
    pub fn set_selected_locale(
        &self,
        locale: &LanguageIdentifier,
    ) -> Result<bool, LocalizationError> {
        let locale = match_supported(locale, &self.supported)
            .ok_or_else(|| LocalizationError::UnsupportedLocale(locale.to_string()))?;
        {
            let mut selected = self.selected.write().unwrap_or_else(PoisonError::into_inner);
            if *selected == locale {
                return Ok(false);
            }
            *selected = locale.clone();
        }
        info!("Locale changed to: {}", locale);
        self.load_locale_async(&locale);

        let mut subscribers = self
            .locale_subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|sender| sender.try_send(locale.clone()).is_ok());
        Ok(true)
    }

    /// Receive every future locale change
    pub fn subscribe_locale_changes(&self) -> async_channel::Receiver<LanguageIdentifier> {
        let (sender, receiver) = async_channel::unbounded();
        self.locale_subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sender);
        receiver
    }

    pub fn string_database(&self) -> &StringDatabase {
        &self.strings
    }

    pub fn font_database(&self) -> &AssetDatabase<FontAsset> {
        &self.fonts
    }

    pub fn material_database(&self) -> &AssetDatabase<MaterialAsset> {
        &self.materials
    }

    /// Handle that completes once the first [`LocalizationSettings::load_all`]
    /// has finished
    pub fn initialization_operation(&self) -> Completion<()> {
        self.initialization.clone()
    }

    /// Start loading every configured table on the current tokio runtime.
    ///
    /// Only the first call starts a load; every call returns the
    /// initialization handle. Without a runtime nothing is started and the
    /// handle completes when `load_all` is awaited elsewhere.
    pub fn initialize(&self) -> Completion<()> {
        if self.initialize_started.swap(true, Ordering::AcqRel) {
            return self.initialization_operation();
        }
        match (tokio::runtime::Handle::try_current(), self.this.upgrade()) {
            (Ok(runtime), Some(this)) => {
                runtime.spawn(async move {
                    this.load_all().await;
                });
            }
            _ => {
                warn!("No async runtime available, localization tables are not loading");
                self.initialize_started.store(false, Ordering::Release);
            }
        }
        self.initialization_operation()
    }

    /// Locales worth loading right now. The fallback comes first so lookups
    /// abandoned by a failed load in the selected locale can still resolve.
    fn active_locales(&self) -> Vec<LanguageIdentifier> {
        let mut locales = vec![self.fallback_locale().clone()];
        let selected = self.selected_locale();
        if !locales.contains(&selected) {
            locales.push(selected);
        }
        locales
    }

    /// Load every configured string, font and material table for the
    /// fallback and selected locales from `tables_dir`, then complete the
    /// initialization handle
    pub async fn load_all(&self) -> LoadReport {
        let mut report = LoadReport::default();
        for locale in self.active_locales() {
            report.merge(self.load_locale(&locale).await);
        }

        info!(
            "Localization load complete: {} tables loaded, {} failed",
            report.loaded,
            report.failed.len()
        );
        if !self.initialization.is_done() {
            if let Err(e) = self.initialization.complete(()) {
                debug!("Initialization already signalled: {}", e);
            }
        }
        report
    }

    /// Load every configured table of one locale
    pub async fn load_locale(&self, locale: &LanguageIdentifier) -> LoadReport {
        let dir = self.config.tables_dir.clone();
        let mut report = LoadReport::default();

        for table in &self.config.string_tables {
            let result = self.strings.load_table(&dir, table, locale).await;
            record(&mut report, table, locale, result);
        }
        for table in &self.config.font_tables {
            let result = self.fonts.load_table(&dir, table, locale).await;
            record(&mut report, table, locale, result);
        }
        for table in &self.config.material_tables {
            let result = self.materials.load_table(&dir, table, locale).await;
            record(&mut report, table, locale, result);
        }
        report
    }

    /// Make sure the configured tables of `locale` are loaded or loading.
    ///
    /// Returns a handle that completes once they are. A locale is loaded at
    /// most once this way; tables already present are not read again.
    /// Loading runs on the current tokio runtime; without one the handle is
    /// returned complete and lookups wait until the tables are added.
    pub fn load_locale_async(&self, locale: &LanguageIdentifier) -> Completion<()> {
        let mut loads = self.locale_loads.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(operation) = loads.get(locale) {
            return operation.clone();
        }
        if self.missing_tables(locale) == 0 {
            return Completion::completed(());
        }
        let (Ok(runtime), Some(this)) = (tokio::runtime::Handle::try_current(), self.this.upgrade())
        else {
            warn!("No async runtime available to load tables for {}", locale);
            return Completion::completed(());
        };

        debug!("Loading tables for {}", locale);
        let operation = Completion::pending();
        loads.insert(locale.clone(), operation.clone());
        let producer = operation.clone();
        let locale = locale.clone();
        runtime.spawn(async move {
            let report = this.load_locale(&locale).await;
            info!(
                "Tables for {} loaded: {} ok, {} failed",
                locale,
                report.loaded,
                report.failed.len()
            );
            if let Err(e) = producer.complete(()) {
                warn!("Locale load for {} could not be signalled: {}", locale, e);
            }
        });
        operation
    }

    /// Number of configured tables not yet installed for `locale`
    fn missing_tables(&self, locale: &LanguageIdentifier) -> usize {
        let strings = self
            .config
            .string_tables
            .iter()
            .filter(|table| !self.strings.is_loaded(table, locale))
            .count();
        let fonts = self
            .config
            .font_tables
            .iter()
            .filter(|table| !self.fonts.is_loaded(table, locale))
            .count();
        let materials = self
            .config
            .material_tables
            .iter()
            .filter(|table| !self.materials.is_loaded(table, locale))
            .count();
        strings + fonts + materials
    }
}

fn record(
    report: &mut LoadReport,
    table: &str,
    locale: &LanguageIdentifier,
    result: Result<(), LocalizationError>,
) {
    match result {
        Ok(()) => report.loaded += 1,
        Err(e) => {
            error!("Failed to load table '{}' for {}: {}", table, locale, e);
            report.failed.push((format!("{locale}/{table}"), e));
        }
    }
}

impl fmt::Debug for LocalizationSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalizationSettings")
            .field("selected", &self.selected_locale())
            .field("fallback", self.fallback_locale())
            .field("supported", &self.supported)
            .field("initialized", &self.initialization.is_done())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locale::parse_locale;

    fn config() -> LocalizationConfig {
        LocalizationConfig {
            locales: vec!["en-US".to_string(), "de-DE".to_string()],
            ..LocalizationConfig::default()
        }
    }

    #[test]
    fn test_unsupported_selection_is_rejected() {
        let err = LocalizationSettings::new(config(), parse_locale("fr-FR").unwrap()).unwrap_err();
        assert!(matches!(err, LocalizationError::UnsupportedLocale(_)));
    }

    #[test]
    fn test_locale_change_notifies_subscribers_once() {
        let settings = LocalizationSettings::new(config(), parse_locale("en-US").unwrap()).unwrap();
        let changes = settings.subscribe_locale_changes();

        assert!(!settings.set_selected_locale(&parse_locale("en-US").unwrap()).unwrap());
        assert!(settings.set_selected_locale(&parse_locale("de").unwrap()).unwrap());
        assert_eq!(settings.selected_locale().to_string(), "de-DE");

        assert_eq!(changes.try_recv().unwrap().to_string(), "de-DE");
        assert!(changes.try_recv().is_err());
    }

    #[test]
    fn test_closed_subscribers_are_dropped() {
        let settings = LocalizationSettings::new(config(), parse_locale("en-US").unwrap()).unwrap();
        drop(settings.subscribe_locale_changes());
        assert!(settings.set_selected_locale(&parse_locale("de-DE").unwrap()).unwrap());
        assert!(settings.locale_subscribers.lock().unwrap().is_empty());
    }

    #[test]
    fn test_active_locales_deduplicate_fallback() {
        let settings = LocalizationSettings::new(config(), parse_locale("en-US").unwrap()).unwrap();
        assert_eq!(settings.active_locales().len(), 1);
        settings.set_selected_locale(&parse_locale("de-DE").unwrap()).unwrap();
        assert_eq!(settings.active_locales().len(), 2);
    }

    #[test]
    fn test_debug_output_names_locales() {
        let settings = LocalizationSettings::new(config(), parse_locale("de-DE").unwrap()).unwrap();
        let output = format!("{settings:?}");
        assert!(output.contains("de-DE"));
        assert!(output.contains("initialized: false"));
    }

    #[tokio::test]
    async fn test_load_all_completes_initialization() {
        let settings = LocalizationSettings::new(config(), parse_locale("en-US").unwrap()).unwrap();
        let initialization = settings.initialization_operation();
        assert!(!initialization.is_done());

        let report = settings.load_all().await;
        assert!(report.is_complete());
        assert!(initialization.is_done());

        // a second load leaves the handle untouched
        settings.load_all().await;
        assert!(initialization.is_done());
    }

    #[tokio::test]
    async fn test_initialize_loads_in_background() {
        let settings = LocalizationSettings::new(config(), parse_locale("en-US").unwrap()).unwrap();
        let initialization = settings.initialize();
        assert!(initialization.ptr_eq(&settings.initialize()));

        textloc_bridge::wait_for(initialization).await;
        assert!(settings.initialization_operation().is_done());
    }

    #[test]
    fn test_locale_without_configured_tables_is_loaded() {
        let settings = LocalizationSettings::new(config(), parse_locale("en-US").unwrap()).unwrap();
        assert!(settings.load_locale_async(&parse_locale("de-DE").unwrap()).is_done());
    }
}

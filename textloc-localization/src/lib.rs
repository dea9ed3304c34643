//! Textloc Localization
//!
//! Localized string, font and material lookups applied to UI text labels.
//! Every lookup returns a [`textloc_bridge::Completion`] and reaches the label
//! through [`textloc_bridge::bridge`], so tables may finish loading before or
//! after the request is made.
//!
//! # Features
//!
//! - **LocalizationConfig**: RON configuration with locale detection
//! - **StringDatabase / AssetDatabase**: Per-locale Fluent string tables and RON asset manifests
//! - **LocalizationSettings**: Selected locale, change subscriptions and table loading
//! - **TextLabel**: Text component with localized string, font and material helpers
//! - **ObjectLocalizer / LocalizeStringEvent**: Tracked references re-applied on locale change
//!
//! # Example
//!
//! ```rust
//! use textloc_localization::{parse_locale, LocalizationConfig, LocalizationSettings, TextLabel};
//!
//! let en = parse_locale("en-US").unwrap();
//! let settings = LocalizationSettings::new(LocalizationConfig::default(), en.clone()).unwrap();
//! let label = TextLabel::new("greeting");
//! label.set_localization_string(&settings, "hello", "ui");
//!
//! settings
//!     .string_database()
//!     .add_table("ui", &en, "hello = Hello, world".to_string())
//!     .unwrap();
//! assert_eq!(label.text(), "Hello, world");
//! ```

pub mod asset;
pub mod asset_database;
pub mod config;
pub mod error;
pub mod locale;
pub mod localizer;
pub mod manager;
pub mod settings;
pub mod string_database;
pub mod string_table;
pub mod text;

// Re-export commonly used types
pub use asset::{FontAsset, MaterialAsset};
pub use asset_database::AssetDatabase;
pub use config::LocalizationConfig;
pub use error::LocalizationError;
pub use locale::{detect_system_locale, match_supported, parse_locale};
pub use localizer::{LocalizeStringEvent, ObjectLocalizer, StringReference};
pub use manager::{
    on_initialized, on_initialized_on, set_localization_string, set_localization_string_with_args,
    validate_reference, LocalizedLookup,
};
pub use settings::{LoadReport, LocalizationSettings, SharedSettings};
pub use string_database::StringDatabase;
pub use string_table::StringTable;
pub use text::{FontAssignment, LocalizerBinding, MaterialAssignment, TextLabel, WeakTextLabel};

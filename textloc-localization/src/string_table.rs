use std::fmt;

use fluent_bundle::concurrent::FluentBundle;
use fluent_bundle::{FluentArgs, FluentResource};
use tracing::warn;
use unic_langid::LanguageIdentifier;

use crate::error::LocalizationError;

/// Fluent string table for one locale
pub struct StringTable {
    name: String,
    locale: LanguageIdentifier,
    bundle: FluentBundle<FluentResource>,
}

impl StringTable {
    /// Parse a Fluent (`.ftl`) source into a table
    pub fn parse(
        name: &str,
        locale: LanguageIdentifier,
        source: String,
    ) -> Result<Self, LocalizationError> {
        let resource = FluentResource::try_new(source).map_err(|(_, errors)| {
            LocalizationError::StringTableParse {
                table: name.to_string(),
                message: join_errors(&errors),
            }
        })?;

        let mut bundle = FluentBundle::new_concurrent(vec![locale.clone()]);
        // Text goes straight into labels, no bidi isolation marks around arguments
        bundle.set_use_isolating(false);
        bundle
            .add_resource(resource)
            .map_err(|errors| LocalizationError::StringTableParse {
                table: name.to_string(),
                message: join_errors(&errors),
            })?;

        Ok(Self {
            name: name.to_string(),
            locale,
            bundle,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn locale(&self) -> &LanguageIdentifier {
        &self.locale
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.bundle.has_message(entry)
    }

    /// Format `entry` with `args`. Returns `None` if the entry or its value is missing.
    pub fn format(&self, entry: &str, args: &[(String, String)]) -> Option<String> {
        let message = self.bundle.get_message(entry)?;
        let pattern = message.value()?;

        let mut fluent_args = FluentArgs::new();
        for (key, value) in args {
            fluent_args.set(key.clone(), value.clone());
        }

        let mut errors = Vec::new();
        let text = self
            .bundle
            .format_pattern(pattern, Some(&fluent_args), &mut errors)
            .into_owned();
        if !errors.is_empty() {
            warn!(
                "Formatting '{}' in table '{}' ({}) reported: {}",
                entry,
                self.name,
                self.locale,
                join_errors(&errors)
            );
        }
        Some(text)
    }
}

impl fmt::Debug for StringTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StringTable")
            .field("name", &self.name)
            .field("locale", &self.locale)
            .finish_non_exhaustive()
    }
}

fn join_errors<E: fmt::Debug>(errors: &[E]) -> String {
    errors
        .iter()
        .map(|e| format!("{e:?}"))
        .collect::<Vec<_>>()
        .join("; ")
}

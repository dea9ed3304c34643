use textloc_bridge::{bridge, bridge_on, AsyncHandle, Bridged, Completion, FrameScheduler, TaskId};
use tracing::warn;

use crate::error::LocalizationError;
use crate::settings::{LocalizationSettings, SharedSettings};

/// A string lookup bridged to a caller callback.
///
/// Every call gets its own handle and registration; nothing is shared between
/// unrelated lookups.
#[derive(Debug)]
pub struct LocalizedLookup {
    registration: Bridged<Completion<String>>,
}

impl LocalizedLookup {
    pub fn handle(&self) -> &Completion<String> {
        self.registration.handle()
    }

    pub fn is_done(&self) -> bool {
        self.handle().is_done()
    }

    /// Whether the callback has received the string
    pub fn is_delivered(&self) -> bool {
        self.registration.is_delivered()
    }

    /// Drop the callback if the string has not arrived yet
    pub fn cancel(&self) -> bool {
        self.registration.cancel()
    }
}

/// Check the identifying strings of a table reference
pub fn validate_reference(entry: &str, table: &str) -> Result<(), LocalizationError> {
    if table.is_empty() {
        return Err(LocalizationError::EmptyReference("table"));
    }
    if entry.is_empty() {
        return Err(LocalizationError::EmptyReference("entry"));
    }
    Ok(())
}

/// Look up `entry` in `table` for the selected locale and hand the string to `action`.
///
/// Returns `None` (after a warning) when `entry` or `table` is empty; no
/// lookup is started in that case.
pub fn set_localization_string<F>(
    settings: &LocalizationSettings,
    entry: &str,
    table: &str,
    action: F,
) -> Option<LocalizedLookup>
where
    F: FnOnce(String) + Send + 'static,
{
    set_localization_string_with_args(settings, entry, table, &[], action)
}

/// Like [`set_localization_string`], formatting the entry with Fluent arguments
pub fn set_localization_string_with_args<F>(
    settings: &LocalizationSettings,
    entry: &str,
    table: &str,
    args: &[(String, String)],
    action: F,
) -> Option<LocalizedLookup>
where
    F: FnOnce(String) + Send + 'static,
{
    if let Err(e) = validate_reference(entry, table) {
        warn!("{}!", e);
        return None;
    }

    let handle = settings.string_database().get_localized_string_with_args_async(
        table,
        entry,
        &settings.selected_locale(),
        args,
    );
    Some(LocalizedLookup {
        registration: bridge(&handle, action),
    })
}

/// Run `action` once the settings' initial table load has finished.
///
/// Runs immediately if loading already finished. Otherwise it runs on the
/// thread that completes the load. Loading itself is started with
/// [`LocalizationSettings::initialize`].
pub fn on_initialized<F>(settings: &LocalizationSettings, action: F) -> Bridged<Completion<()>>
where
    F: FnOnce() + Send + 'static,
{
    bridge(&settings.initialization_operation(), move |()| action())
}

/// Run `action` from a task on `scheduler` once the initial table load has
/// finished, starting the load if nothing has yet
pub fn on_initialized_on<F>(
    settings: &SharedSettings,
    scheduler: &mut FrameScheduler,
    action: F,
) -> TaskId
where
    F: FnOnce() + 'static,
{
    bridge_on(scheduler, settings.initialize(), move |()| action())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LocalizationConfig;
    use crate::locale::parse_locale;
    use std::sync::{Arc, Mutex};

    fn settings() -> SharedSettings {
        LocalizationSettings::new(LocalizationConfig::default(), parse_locale("en-US").unwrap())
            .unwrap()
    }

    #[test]
    fn test_empty_reference_starts_nothing() {
        let settings = settings();
        let calls = Arc::new(Mutex::new(0));

        let counter = Arc::clone(&calls);
        assert!(set_localization_string(&settings, "greeting", "", move |_| {
            *counter.lock().unwrap() += 1;
        })
        .is_none());
        let counter = Arc::clone(&calls);
        assert!(set_localization_string(&settings, "", "ui", move |_| {
            *counter.lock().unwrap() += 1;
        })
        .is_none());

        assert_eq!(settings.string_database().pending_lookups(), 0);
        assert_eq!(*calls.lock().unwrap(), 0);
    }

    #[test]
    fn test_lookups_are_isolated() {
        let settings = settings();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        let first = set_localization_string(&settings, "greeting", "ui", move |text| {
            sink.lock().unwrap().push(("first", text));
        })
        .unwrap();
        let sink = Arc::clone(&seen);
        let second = set_localization_string(&settings, "farewell", "ui", move |text| {
            sink.lock().unwrap().push(("second", text));
        })
        .unwrap();
        assert!(!first.handle().ptr_eq(second.handle()));

        settings
            .string_database()
            .add_table(
                "ui",
                &parse_locale("en-US").unwrap(),
                "greeting = Hello\nfarewell = Goodbye".to_string(),
            )
            .unwrap();

        let mut seen = seen.lock().unwrap().clone();
        seen.sort();
        assert_eq!(
            seen,
            vec![("first", "Hello".to_string()), ("second", "Goodbye".to_string())]
        );
        assert!(first.is_delivered() && second.is_delivered());
    }

    #[tokio::test]
    async fn test_on_initialized_runs_after_load_all() {
        let settings = settings();
        let ran = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&ran);
        let registration = on_initialized(&settings, move || *counter.lock().unwrap() += 1);
        assert!(!registration.is_delivered());

        settings.load_all().await;
        assert_eq!(*ran.lock().unwrap(), 1);

        // late registrations run straight away
        let counter = Arc::clone(&ran);
        assert!(on_initialized(&settings, move || *counter.lock().unwrap() += 1).is_delivered());
        assert_eq!(*ran.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_on_initialized_on_scheduler_starts_loading() {
        let settings = settings();
        let ran = std::rc::Rc::new(std::cell::Cell::new(false));
        let flag = std::rc::Rc::clone(&ran);
        let mut scheduler = FrameScheduler::new();

        let task = on_initialized_on(&settings, &mut scheduler, move || flag.set(true));
        let initialized = textloc_bridge::wait_for(settings.initialization_operation());
        tokio::time::timeout(std::time::Duration::from_secs(5), initialized)
            .await
            .unwrap();
        assert!(!ran.get());

        scheduler.tick();
        assert!(ran.get());
        assert!(!scheduler.is_running(task));
    }

    #[test]
    fn test_validate_reference_names_the_field() {
        assert_eq!(
            validate_reference("x", "").unwrap_err().to_string(),
            "The table cannot be empty"
        );
        assert_eq!(
            validate_reference("", "ui").unwrap_err().to_string(),
            "The entry cannot be empty"
        );
        assert!(validate_reference("x", "ui").is_ok());
    }
}

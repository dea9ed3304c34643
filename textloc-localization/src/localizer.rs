use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use textloc_bridge::{bridge, wait_for_ticks, Completion, FrameScheduler, TaskId};
use tracing::{debug, trace, warn};
use unic_langid::LanguageIdentifier;

use crate::manager::{set_localization_string_with_args, LocalizedLookup};
use crate::settings::{LocalizationSettings, SharedSettings};
use crate::text::{TextLabel, WeakTextLabel};

/// Reference to an entry in a string table
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StringReference {
    pub table: String,
    pub entry: String,
}

impl StringReference {
    pub fn new(table: impl Into<String>, entry: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            entry: entry.into(),
        }
    }
}

struct TrackedText {
    target: WeakTextLabel,
    reference: Option<StringReference>,
}

#[derive(Default)]
struct LocalizerState {
    tracked: Vec<TrackedText>,
    generation: u64,
}

/// Tracks localized text properties of a group of labels and applies a locale
/// to all of them at once.
#[derive(Clone, Default)]
pub struct ObjectLocalizer {
    inner: Arc<Mutex<LocalizerState>>,
}

impl ObjectLocalizer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, LocalizerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start tracking `label`; tracking the same label twice is a no-op
    pub fn track(&self, label: &TextLabel) {
        let mut state = self.lock();
        if !state.tracked.iter().any(|t| t.target.points_to(label)) {
            state.tracked.push(TrackedText {
                target: label.downgrade(),
                reference: None,
            });
        }
    }

    /// Set the string reference of the label's tracked text property
    pub fn set_tracked_reference(&self, label: &TextLabel, reference: StringReference) {
        let mut state = self.lock();
        state.generation += 1;
        if let Some(tracked) = state.tracked.iter_mut().find(|t| t.target.points_to(label)) {
            tracked.reference = Some(reference);
        } else {
            state.tracked.push(TrackedText {
                target: label.downgrade(),
                reference: Some(reference),
            });
        }
    }

    pub fn tracked_reference(&self, label: &TextLabel) -> Option<StringReference> {
        self.lock()
            .tracked
            .iter()
            .find(|t| t.target.points_to(label))
            .and_then(|t| t.reference.clone())
    }

    /// Number of live tracked labels
    pub fn tracked_count(&self) -> usize {
        self.lock()
            .tracked
            .iter()
            .filter(|t| t.target.upgrade().is_some())
            .count()
    }

    /// Incremented on every reference change
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Resolve every tracked reference for `locale` and write the strings
    /// into their labels.
    ///
    /// The returned handle completes once all of them have been applied.
    pub fn apply_locale_variant(
        &self,
        settings: &LocalizationSettings,
        locale: &LanguageIdentifier,
    ) -> Completion<()> {
        let targets: Vec<(WeakTextLabel, StringReference)> = {
            let mut state = self.lock();
            state.tracked.retain(|t| t.target.upgrade().is_some());
            state
                .tracked
                .iter()
                .filter_map(|t| t.reference.clone().map(|r| (t.target.clone(), r)))
                .collect()
        };

        let operation = Completion::pending();
        if targets.is_empty() {
            if let Err(e) = operation.complete(()) {
                warn!("Locale variant could not be signalled: {}", e);
            }
            return operation;
        }

        debug!("Applying locale {} to {} tracked labels", locale, targets.len());
        let remaining = Arc::new(AtomicUsize::new(targets.len()));
        for (target, reference) in targets {
            let lookup = settings.string_database().get_localized_string_async(
                &reference.table,
                &reference.entry,
                locale,
            );
            let remaining = Arc::clone(&remaining);
            let operation = operation.clone();
            bridge(&lookup, move |text| {
                if let Some(label) = target.upgrade() {
                    label.set_text(text);
                }
                if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                    trace!("Locale variant applied");
                    if let Err(e) = operation.complete(()) {
                        warn!("Locale variant could not be signalled: {}", e);
                    }
                }
            });
        }
        operation
    }
}

impl fmt::Debug for ObjectLocalizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("ObjectLocalizer")
            .field("tracked", &state.tracked.len())
            .field("generation", &state.generation)
            .finish()
    }
}

struct EventState {
    target: WeakTextLabel,
    reference: Option<StringReference>,
    args: Vec<(String, String)>,
    lookup: Option<LocalizedLookup>,
    // Bumped by every refresh; only the newest lookup may write the label.
    generation: u64,
}

/// Binds one string reference to one label and refreshes the label's text
/// whenever asked or whenever the locale changes.
#[derive(Clone)]
pub struct LocalizeStringEvent {
    inner: Arc<Mutex<EventState>>,
}

impl LocalizeStringEvent {
    pub(crate) fn new(target: WeakTextLabel) -> Self {
        Self {
            inner: Arc::new(Mutex::new(EventState {
                target,
                reference: None,
                args: Vec::new(),
                lookup: None,
                generation: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, EventState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn string_reference(&self) -> Option<StringReference> {
        self.lock().reference.clone()
    }

    pub fn set_reference(&self, reference: StringReference) {
        self.lock().reference = Some(reference);
    }

    pub fn set_args(&self, args: Vec<(String, String)>) {
        self.lock().args = args;
    }

    /// Re-resolve the reference for the selected locale.
    ///
    /// A lookup still in flight from an earlier refresh is cancelled, and only
    /// the newest refresh may write the label, so a stale string never
    /// overwrites a newer one. Returns `false` if there is no usable reference.
    pub fn refresh(&self, settings: &LocalizationSettings) -> bool {
        let (target, reference, args, generation, previous) = {
            let mut state = self.lock();
            state.generation += 1;
            (
                state.target.clone(),
                state.reference.clone(),
                state.args.clone(),
                state.generation,
                state.lookup.take(),
            )
        };
        if let Some(previous) = previous {
            if previous.cancel() {
                trace!("Cancelled stale string lookup");
            }
        }
        let Some(reference) = reference else {
            return false;
        };

        let owner = Arc::downgrade(&self.inner);
        let lookup = set_localization_string_with_args(
            settings,
            &reference.entry,
            &reference.table,
            &args,
            move |text| apply_if_current(&owner, generation, &target, text),
        );
        let Some(lookup) = lookup else {
            return false;
        };

        let superseded = {
            let mut state = self.lock();
            if state.generation == generation {
                state.lookup = Some(lookup);
                None
            } else {
                Some(lookup)
            }
        };
        if let Some(lookup) = superseded {
            trace!("Refresh superseded before it was stored");
            lookup.cancel();
        }
        true
    }

    /// Refresh on every locale change, from a task on `scheduler`.
    ///
    /// Each refresh waits, tick by tick, until the new locale's tables have
    /// been loaded.
    pub fn watch_locale_changes(
        &self,
        settings: &SharedSettings,
        scheduler: &mut FrameScheduler,
    ) -> TaskId {
        let changes = settings.subscribe_locale_changes();
        let event = self.clone();
        let settings = Arc::clone(settings);
        scheduler.spawn(async move {
            while let Ok(locale) = changes.recv().await {
                wait_for_ticks(settings.load_locale_async(&locale)).await;
                debug!("Refreshing localized string for {}", locale);
                event.refresh(&settings);
            }
        })
    }
}

/// Write `text` into the label unless a newer refresh has started since
fn apply_if_current(
    owner: &Weak<Mutex<EventState>>,
    generation: u64,
    target: &WeakTextLabel,
    text: String,
) {
    let Some(event) = owner.upgrade() else {
        return;
    };
    let state = event.lock().unwrap_or_else(PoisonError::into_inner);
    if state.generation != generation {
        trace!("Dropping string from superseded refresh");
        return;
    }
    if let Some(label) = target.upgrade() {
        label.set_text(text);
    }
}

impl fmt::Debug for LocalizeStringEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Labels format their binding while locked; never block on the event here.
        let Ok(state) = self.inner.try_lock() else {
            return f.write_str("LocalizeStringEvent { <locked> }");
        };
        f.debug_struct("LocalizeStringEvent")
            .field("reference", &state.reference)
            .field("args", &state.args)
            .field("generation", &state.generation)
            .finish_non_exhaustive()
    }
}

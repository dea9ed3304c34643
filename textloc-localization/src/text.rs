use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use textloc_bridge::{bridge, wait_for_ticks, Bridged, Completion, FrameScheduler};
use tracing::{debug, warn};

use crate::asset::{FontAsset, MaterialAsset};
use crate::localizer::{LocalizeStringEvent, ObjectLocalizer, StringReference};
use crate::manager::{set_localization_string, validate_reference, LocalizedLookup};
use crate::settings::{LocalizationSettings, SharedSettings};

/// Handle to a pending font assignment
pub type FontAssignment = Bridged<Completion<Option<Arc<FontAsset>>>>;
/// Handle to a pending material assignment
pub type MaterialAssignment = Bridged<Completion<Option<Arc<MaterialAsset>>>>;

/// Which localization component drives a label's text
#[derive(Debug, Clone, Default)]
pub enum LocalizerBinding {
    #[default]
    None,
    Tracked(ObjectLocalizer),
    Event(LocalizeStringEvent),
}

#[derive(Debug, Default)]
struct LabelState {
    name: String,
    text: String,
    font: Option<Arc<FontAsset>>,
    material: Option<Arc<MaterialAsset>>,
    binding: LocalizerBinding,
    applying_variant: bool,
}

/// UI text component: the text, font and material a renderer draws.
///
/// Clones share the same label.
#[derive(Debug, Clone, Default)]
pub struct TextLabel {
    inner: Arc<Mutex<LabelState>>,
}

/// Non-owning reference to a [`TextLabel`]
#[derive(Debug, Clone, Default)]
pub struct WeakTextLabel {
    inner: Weak<Mutex<LabelState>>,
}

impl WeakTextLabel {
    pub fn upgrade(&self) -> Option<TextLabel> {
        self.inner.upgrade().map(|inner| TextLabel { inner })
    }

    pub fn points_to(&self, label: &TextLabel) -> bool {
        std::ptr::eq(self.inner.as_ptr(), Arc::as_ptr(&label.inner))
    }
}

impl TextLabel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LabelState {
                name: name.into(),
                ..LabelState::default()
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LabelState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn downgrade(&self) -> WeakTextLabel {
        WeakTextLabel {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn name(&self) -> String {
        self.lock().name.clone()
    }

    pub fn text(&self) -> String {
        self.lock().text.clone()
    }

    pub fn set_text(&self, text: impl Into<String>) {
        self.lock().text = text.into();
    }

    pub fn font(&self) -> Option<Arc<FontAsset>> {
        self.lock().font.clone()
    }

    pub fn set_font(&self, font: Arc<FontAsset>) {
        self.lock().font = Some(font);
    }

    pub fn material(&self) -> Option<Arc<MaterialAsset>> {
        self.lock().material.clone()
    }

    pub fn set_material(&self, material: Arc<MaterialAsset>) {
        self.lock().material = Some(material);
    }

    pub fn binding(&self) -> LocalizerBinding {
        self.lock().binding.clone()
    }

    /// Let `localizer` drive this label's text
    pub fn attach_object_localizer(&self, localizer: &ObjectLocalizer) {
        localizer.track(self);
        self.lock().binding = LocalizerBinding::Tracked(localizer.clone());
    }

    /// Bind a new string event to this label and return it
    pub fn attach_string_event(&self) -> LocalizeStringEvent {
        let event = LocalizeStringEvent::new(self.downgrade());
        self.lock().binding = LocalizerBinding::Event(event.clone());
        event
    }

    /// Whether a locale variant task is running for this label
    pub fn is_applying_variant(&self) -> bool {
        self.lock().applying_variant
    }

    /// Look up `entry` in `table` and assign it as the label text once it arrives
    pub fn set_localization_string(
        &self,
        settings: &LocalizationSettings,
        entry: &str,
        table: &str,
    ) -> Option<LocalizedLookup> {
        let target = self.downgrade();
        set_localization_string(settings, entry, table, move |text| {
            if let Some(label) = target.upgrade() {
                label.set_text(text);
            }
        })
    }

    /// Look up a localized font and assign it once it arrives
    pub fn set_localization_font(
        &self,
        settings: &LocalizationSettings,
        entry: &str,
        table: &str,
    ) -> Option<FontAssignment> {
        if let Err(e) = validate_reference(entry, table) {
            warn!("{}!", e);
            return None;
        }
        let handle = settings.font_database().get_localized_asset_async(
            table,
            entry,
            &settings.selected_locale(),
        );
        let target = self.downgrade();
        let entry = entry.to_string();
        Some(bridge(&handle, move |font| match (font, target.upgrade()) {
            (Some(font), Some(label)) => label.set_font(font),
            (None, _) => warn!("The key was not found: \"{}\"!", entry),
            (Some(_), None) => debug!("Label dropped before font '{}' arrived", entry),
        }))
    }

    /// Look up a localized material and assign it once it arrives
    pub fn set_localization_material(
        &self,
        settings: &LocalizationSettings,
        entry: &str,
        table: &str,
    ) -> Option<MaterialAssignment> {
        if let Err(e) = validate_reference(entry, table) {
            warn!("{}!", e);
            return None;
        }
        let handle = settings.material_database().get_localized_asset_async(
            table,
            entry,
            &settings.selected_locale(),
        );
        let target = self.downgrade();
        let entry = entry.to_string();
        Some(bridge(&handle, move |material| {
            match (material, target.upgrade()) {
                (Some(material), Some(label)) => label.set_material(material),
                (None, _) => warn!("The key was not found: \"{}\"!", entry),
                (Some(_), None) => debug!("Label dropped before material '{}' arrived", entry),
            }
        }))
    }

    /// Assign a string reference through the label's localization component.
    ///
    /// With an [`ObjectLocalizer`] the tracked text reference is updated and a
    /// task on `scheduler` applies the selected locale, polling once per tick
    /// until the variant has been applied; at most one such task runs per
    /// label and it re-applies if the reference changes meanwhile. With a
    /// [`LocalizeStringEvent`] the reference is set and refreshed directly.
    ///
    /// Returns `false` (after a warning) if the reference is empty or the
    /// label has neither component.
    pub fn set_localization_string_tracked(
        &self,
        settings: &SharedSettings,
        entry: &str,
        table: &str,
        scheduler: &mut FrameScheduler,
    ) -> bool {
        if let Err(e) = validate_reference(entry, table) {
            warn!("{}!", e);
            return false;
        }
        match self.binding() {
            LocalizerBinding::Tracked(localizer) => {
                localizer.set_tracked_reference(self, StringReference::new(table, entry));
                if self.begin_variant_task() {
                    let label = self.clone();
                    let settings = Arc::clone(settings);
                    scheduler.spawn(async move {
                        loop {
                            let generation = localizer.generation();
                            let operation =
                                localizer.apply_locale_variant(&settings, &settings.selected_locale());
                            wait_for_ticks(operation).await;
                            if localizer.generation() == generation {
                                break;
                            }
                        }
                        label.lock().applying_variant = false;
                    });
                }
                true
            }
            LocalizerBinding::Event(event) => {
                event.set_reference(StringReference::new(table, entry));
                event.refresh(settings);
                true
            }
            LocalizerBinding::None => {
                warn!(
                    "The label '{}' has no ObjectLocalizer or LocalizeStringEvent attached!",
                    self.name()
                );
                false
            }
        }
    }

    /// Mark a variant task as running; `false` if one already is
    fn begin_variant_task(&self) -> bool {
        let mut state = self.lock();
        if state.applying_variant {
            return false;
        }
        state.applying_variant = true;
        true
    }
}

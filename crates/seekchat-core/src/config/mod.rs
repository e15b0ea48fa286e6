mod backend;

pub use backend::{MemoryBackend, SettingsBackend, SettingsGroup, TomlFileBackend};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;

use crate::constants::{defaults, limits, storage};
use crate::error::{ChatError, Result};

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub api_key: String,
    pub endpoint: String,
    pub model: String,
    pub system_prompt: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: defaults::API_URL.to_string(),
            model: defaults::NO_MODEL.to_string(),
            system_prompt: defaults::SYSTEM_PROMPT.to_string(),
            temperature: defaults::TEMPERATURE,
            max_tokens: defaults::MAX_TOKENS,
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("api_key", &if self.api_key.is_empty() { "" } else { "<redacted>" })
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("system_prompt", &self.system_prompt)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl Settings {
    /// Returns the first validation failure, checked in a fixed order:
    /// API key, then URL syntax, then model.
    pub fn validate(&self) -> Option<String> {
        if self.api_key.is_empty() {
            return Some("API Key is required".to_string());
        }
        if url::Url::parse(&self.endpoint).is_err() {
            return Some("Invalid API URL".to_string());
        }
        if !self.has_model() {
            return Some("Model is required".to_string());
        }
        None
    }

    pub fn has_model(&self) -> bool {
        !self.model.is_empty() && self.model != defaults::NO_MODEL
    }

    /// The API key, if one is configured.
    pub fn api_key(&self) -> Option<&str> {
        if self.api_key.is_empty() {
            None
        } else {
            Some(&self.api_key)
        }
    }

    /// Assign one field from its textual form. Text fields other than the
    /// system prompt are trimmed and numbers are clamped, exactly as the
    /// typed setters do, so saved values load back unchanged.
    fn assign(&mut self, field: SettingsField, value: &str) -> Result<bool> {
        let changed = match field {
            SettingsField::ApiKey => replace_if_changed(&mut self.api_key, value.trim()),
            SettingsField::ApiUrl => replace_if_changed(&mut self.endpoint, value.trim()),
            SettingsField::Model => replace_if_changed(&mut self.model, value.trim()),
            SettingsField::SystemPrompt => replace_if_changed(&mut self.system_prompt, value),
            SettingsField::Temperature => {
                let parsed = value.trim().parse::<f64>().map_err(|e| {
                    ChatError::Settings(format!("Invalid temperature '{}': {}", value, e))
                })?;
                self.assign_temperature(parsed)
            }
            SettingsField::MaxTokens => {
                let parsed = value.trim().parse::<u32>().map_err(|e| {
                    ChatError::Settings(format!("Invalid max tokens '{}': {}", value, e))
                })?;
                self.assign_max_tokens(parsed)
            }
        };
        Ok(changed)
    }

    fn assign_temperature(&mut self, value: f64) -> bool {
        if !value.is_finite() {
            return false;
        }
        let value = value.clamp(limits::MIN_TEMPERATURE, limits::MAX_TEMPERATURE);
        if fuzzy_eq(self.temperature, value) {
            return false;
        }
        self.temperature = value;
        true
    }

    fn assign_max_tokens(&mut self, value: u32) -> bool {
        let value = value.clamp(limits::MIN_MAX_TOKENS, limits::MAX_MAX_TOKENS);
        if self.max_tokens == value {
            return false;
        }
        self.max_tokens = value;
        true
    }

    fn to_group(&self) -> SettingsGroup {
        SettingsField::ALL
            .iter()
            .map(|field| (field.key().to_string(), field.read(self)))
            .collect()
    }
}

/// The individually observable settings fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingsField {
    ApiKey,
    ApiUrl,
    Model,
    SystemPrompt,
    Temperature,
    MaxTokens,
}

impl SettingsField {
    pub const ALL: [SettingsField; 6] = [
        SettingsField::ApiKey,
        SettingsField::ApiUrl,
        SettingsField::Model,
        SettingsField::SystemPrompt,
        SettingsField::Temperature,
        SettingsField::MaxTokens,
    ];

    /// Key used in the persisted settings group.
    pub fn key(&self) -> &'static str {
        match self {
            SettingsField::ApiKey => storage::keys::API_KEY,
            SettingsField::ApiUrl => storage::keys::API_URL,
            SettingsField::Model => storage::keys::MODEL,
            SettingsField::SystemPrompt => storage::keys::SYSTEM_PROMPT,
            SettingsField::Temperature => storage::keys::TEMPERATURE,
            SettingsField::MaxTokens => storage::keys::MAX_TOKENS,
        }
    }

    /// Case-insensitive lookup by persisted key.
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|field| field.key().eq_ignore_ascii_case(key))
    }

    /// The field's value in its persisted textual form.
    pub fn read(&self, settings: &Settings) -> String {
        match self {
            SettingsField::ApiKey => settings.api_key.clone(),
            SettingsField::ApiUrl => settings.endpoint.clone(),
            SettingsField::Model => settings.model.clone(),
            SettingsField::SystemPrompt => settings.system_prompt.clone(),
            SettingsField::Temperature => settings.temperature.to_string(),
            SettingsField::MaxTokens => settings.max_tokens.to_string(),
        }
    }
}

impl fmt::Display for SettingsField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Change notifications broadcast by [`SettingsStore`].
#[derive(Debug, Clone, PartialEq)]
pub enum SettingsEvent {
    FieldChanged(SettingsField),
    Changed,
}

struct Inner {
    settings: Settings,
    valid: bool,
    validation_error: String,
}

impl Inner {
    fn revalidate(&mut self) {
        match self.settings.validate() {
            Some(reason) => {
                self.valid = false;
                self.validation_error = reason;
            }
            None => {
                self.valid = true;
                self.validation_error.clear();
            }
        }
    }
}

/// Shared, observable settings. One mutex covers the whole field set and the
/// cached validation result, so readers never observe a torn value.
pub struct SettingsStore {
    inner: Mutex<Inner>,
    backend: Box<dyn SettingsBackend>,
    events: broadcast::Sender<SettingsEvent>,
}

impl SettingsStore {
    /// Create a store holding defaults. Call [`SettingsStore::load`] to read
    /// persisted values.
    pub fn new(backend: impl SettingsBackend + 'static) -> Self {
        let (events, _) = broadcast::channel(32);
        let mut inner = Inner {
            settings: Settings::default(),
            valid: false,
            validation_error: String::new(),
        };
        inner.revalidate();
        Self {
            inner: Mutex::new(inner),
            backend: Box::new(backend),
            events,
        }
    }

    /// Create a store backed by the default settings file and load it.
    pub fn open_default() -> Result<Self> {
        let store = Self::new(TomlFileBackend::new(TomlFileBackend::default_path()));
        store.load()?;
        Ok(store)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SettingsEvent> {
        self.events.subscribe()
    }

    /// Snapshot of the current settings.
    pub fn get(&self) -> Settings {
        self.lock().settings.clone()
    }

    pub fn is_valid(&self) -> bool {
        self.lock().valid
    }

    /// Reason the settings are invalid; empty when valid.
    pub fn validation_error(&self) -> String {
        self.lock().validation_error.clone()
    }

    /// Validity and reason read under one lock.
    pub fn validity(&self) -> std::result::Result<(), String> {
        let inner = self.lock();
        if inner.valid {
            Ok(())
        } else {
            Err(inner.validation_error.clone())
        }
    }

    pub fn api_key(&self) -> String {
        self.lock().settings.api_key.clone()
    }

    pub fn endpoint(&self) -> String {
        self.lock().settings.endpoint.clone()
    }

    pub fn model(&self) -> String {
        self.lock().settings.model.clone()
    }

    pub fn system_prompt(&self) -> String {
        self.lock().settings.system_prompt.clone()
    }

    pub fn temperature(&self) -> f64 {
        self.lock().settings.temperature
    }

    pub fn max_tokens(&self) -> u32 {
        self.lock().settings.max_tokens
    }

    pub fn set_api_key(&self, value: impl Into<String>) -> bool {
        let value = value.into();
        self.update(SettingsField::ApiKey, |s| {
            replace_if_changed(&mut s.api_key, value.trim())
        })
    }

    pub fn set_endpoint(&self, value: impl Into<String>) -> bool {
        let value = value.into();
        self.update(SettingsField::ApiUrl, |s| {
            replace_if_changed(&mut s.endpoint, value.trim())
        })
    }

    pub fn set_model(&self, value: impl Into<String>) -> bool {
        let value = value.into();
        self.update(SettingsField::Model, |s| replace_if_changed(&mut s.model, value.trim()))
    }

    pub fn set_system_prompt(&self, value: impl Into<String>) -> bool {
        let value = value.into();
        self.update(SettingsField::SystemPrompt, |s| {
            replace_if_changed(&mut s.system_prompt, &value)
        })
    }

    /// Clamped to the supported range; non-finite values are ignored.
    pub fn set_temperature(&self, value: f64) -> bool {
        self.update(SettingsField::Temperature, |s| s.assign_temperature(value))
    }

    /// Clamped to the supported range.
    pub fn set_max_tokens(&self, value: u32) -> bool {
        self.update(SettingsField::MaxTokens, |s| s.assign_max_tokens(value))
    }

    /// Set a field from its textual form, as read from a key-value store or
    /// typed into a settings form. Returns whether the value changed.
    pub fn set(&self, field: SettingsField, value: &str) -> Result<bool> {
        let mut error = None;
        let changed = self.update(field, |s| {
            s.assign(field, value).unwrap_or_else(|e| {
                error = Some(e);
                false
            })
        });
        match error {
            Some(e) => Err(e),
            None => Ok(changed),
        }
    }

    /// Read the persisted group, applying defaults for missing keys.
    ///
    /// The whole field set is replaced under one lock, so readers see either
    /// the previous settings or the loaded ones.
    pub fn load(&self) -> Result<()> {
        let group = match self.backend.read_group(storage::SETTINGS_GROUP) {
            Ok(group) => group,
            Err(e) => {
                self.lock().revalidate();
                return Err(e);
            }
        };

        let mut loaded = Settings::default();
        for field in SettingsField::ALL {
            let Some(raw) = group.get(field.key()) else {
                continue;
            };
            if let Err(e) = loaded.assign(field, raw) {
                tracing::warn!("Ignoring persisted {}: {}", field, e);
            }
        }

        let changed: Vec<SettingsField> = {
            let mut inner = self.lock();
            let changed = SettingsField::ALL
                .into_iter()
                .filter(|field| field.read(&inner.settings) != field.read(&loaded))
                .collect();
            inner.settings = loaded;
            inner.revalidate();
            changed
        };

        for field in &changed {
            let _ = self.events.send(SettingsEvent::FieldChanged(*field));
        }
        if !changed.is_empty() {
            let _ = self.events.send(SettingsEvent::Changed);
        }
        tracing::debug!("Settings loaded: {:?}", self.get());
        Ok(())
    }

    /// Persist the full field set and broadcast a change notification.
    pub fn save(&self) -> Result<()> {
        let group = {
            let inner = self.lock();
            inner.settings.to_group()
        };
        self.backend.write_group(storage::SETTINGS_GROUP, &group)?;
        self.lock().revalidate();
        let _ = self.events.send(SettingsEvent::Changed);
        Ok(())
    }

    fn update(&self, field: SettingsField, mutate: impl FnOnce(&mut Settings) -> bool) -> bool {
        {
            let mut inner = self.lock();
            if !mutate(&mut inner.settings) {
                return false;
            }
            inner.revalidate();
        }
        // Receivers may not exist yet; a failed send is not an error.
        let _ = self.events.send(SettingsEvent::FieldChanged(field));
        let _ = self.events.send(SettingsEvent::Changed);
        true
    }
}

fn replace_if_changed(slot: &mut String, value: &str) -> bool {
    if slot.as_str() == value {
        return false;
    }
    *slot = value.to_string();
    true
}

fn fuzzy_eq(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-12 * a.abs().max(b.abs()).max(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SettingsStore {
        SettingsStore::new(MemoryBackend::new())
    }

    #[test]
    fn test_defaults_are_invalid_without_key() {
        let store = store();
        assert!(!store.is_valid());
        assert_eq!(store.validation_error(), "API Key is required");
        assert_eq!(store.endpoint(), "https://api.deepseek.com/v1");
        assert_eq!(store.model(), "Without Model");
        assert_eq!(store.temperature(), 0.7);
        assert_eq!(store.max_tokens(), 2048);
    }

    #[test]
    fn test_validation_order_key_url_model() {
        let store = store();
        store.set_endpoint("not a url");
        store.set_model("");
        assert_eq!(store.validation_error(), "API Key is required");

        store.set_api_key("sk-test");
        assert_eq!(store.validation_error(), "Invalid API URL");

        store.set_endpoint("https://api.deepseek.com/v1");
        assert_eq!(store.validation_error(), "Model is required");

        store.set_model("deepseek-chat");
        assert!(store.is_valid());
        assert_eq!(store.validation_error(), "");
        assert!(store.validity().is_ok());
    }

    #[test]
    fn test_placeholder_model_is_not_a_model() {
        let store = store();
        store.set_api_key("sk-test");
        assert_eq!(store.validation_error(), "Model is required");
    }

    #[test]
    fn test_setter_only_notifies_on_change() {
        let store = store();
        let mut rx = store.subscribe();

        assert!(store.set_model("deepseek-chat"));
        assert_eq!(
            rx.try_recv().unwrap(),
            SettingsEvent::FieldChanged(SettingsField::Model)
        );
        assert_eq!(rx.try_recv().unwrap(), SettingsEvent::Changed);

        assert!(!store.set_model("deepseek-chat"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_numeric_fields_are_clamped() {
        let store = store();
        store.set_temperature(5.0);
        assert_eq!(store.temperature(), 2.0);
        store.set_temperature(0.0);
        assert_eq!(store.temperature(), 0.01);
        assert!(!store.set_temperature(f64::NAN));

        store.set_max_tokens(1);
        assert_eq!(store.max_tokens(), 16);
        store.set_max_tokens(100_000);
        assert_eq!(store.max_tokens(), 32_000);
    }

    #[test]
    fn test_set_by_field_parses_numbers() {
        let store = store();
        assert!(store.set(SettingsField::Temperature, "1.25").unwrap());
        assert_eq!(store.temperature(), 1.25);
        assert!(store.set(SettingsField::MaxTokens, " 4096 ").unwrap());
        assert_eq!(store.max_tokens(), 4096);
        assert!(store.set(SettingsField::MaxTokens, "lots").is_err());
        assert_eq!(store.max_tokens(), 4096);
    }

    #[test]
    fn test_field_key_lookup() {
        assert_eq!(SettingsField::from_key("apikey"), Some(SettingsField::ApiKey));
        assert_eq!(SettingsField::from_key("MaxTokens"), Some(SettingsField::MaxTokens));
        assert_eq!(SettingsField::from_key("Theme"), None);
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let settings = Settings {
            api_key: "sk-secret".to_string(),
            ..Settings::default()
        };
        let text = format!("{:?}", settings);
        assert!(!text.contains("sk-secret"));
        assert!(text.contains("<redacted>"));
    }

    #[test]
    fn test_save_then_load_in_fresh_store() {
        let backend = MemoryBackend::new();
        let first = SettingsStore::new(backend.clone());
        first.set_api_key("sk-roundtrip");
        first.set_endpoint("https://example.com/api");
        first.set_model("deepseek-reasoner");
        first.set_system_prompt("Be terse.");
        first.set_temperature(1.3);
        first.set_max_tokens(777);
        first.save().unwrap();

        let second = SettingsStore::new(backend);
        second.load().unwrap();
        assert_eq!(second.get(), first.get());
        assert!(second.is_valid());
    }

    #[test]
    fn test_load_falls_back_on_bad_numbers() {
        let backend = MemoryBackend::new();
        let mut group = SettingsGroup::new();
        group.insert("ApiKey".to_string(), "sk".to_string());
        group.insert("Temperature".to_string(), "hot".to_string());
        backend.write_group("DeepSeek", &group).unwrap();

        let store = SettingsStore::new(backend);
        store.load().unwrap();
        assert_eq!(store.api_key(), "sk");
        assert_eq!(store.temperature(), 0.7);
    }

    fn group(key: &str, model: &str) -> SettingsGroup {
        let mut group = SettingsGroup::new();
        group.insert("ApiKey".to_string(), key.to_string());
        group.insert("Model".to_string(), model.to_string());
        group
    }

    #[test]
    fn test_load_replaces_fields_together() {
        use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
        use std::sync::Arc;

        let backend = MemoryBackend::new();
        let store = Arc::new(SettingsStore::new(backend.clone()));
        let done = Arc::new(AtomicBool::new(false));
        let torn = Arc::new(AtomicUsize::new(0));

        let reader = {
            let (store, done, torn) = (store.clone(), done.clone(), torn.clone());
            std::thread::spawn(move || {
                while !done.load(Ordering::SeqCst) {
                    let settings = store.get();
                    if (settings.api_key == "sk-a") != (settings.model == "model-a") {
                        torn.fetch_add(1, Ordering::SeqCst);
                    }
                }
            })
        };

        for i in 0..2000 {
            let next = if i % 2 == 0 {
                group("sk-a", "model-a")
            } else {
                group("sk-b", "model-b")
            };
            backend.write_group("DeepSeek", &next).unwrap();
            store.load().unwrap();
        }
        done.store(true, Ordering::SeqCst);
        reader.join().unwrap();

        assert_eq!(torn.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_load_sends_one_change_notice() {
        let backend = MemoryBackend::new();
        let mut persisted = group("sk-new", "new-model");
        persisted.insert("MaxTokens".to_string(), "512".to_string());
        backend.write_group("DeepSeek", &persisted).unwrap();

        let store = SettingsStore::new(backend);
        let mut rx = store.subscribe();
        store.load().unwrap();

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(
            events,
            vec![
                SettingsEvent::FieldChanged(SettingsField::ApiKey),
                SettingsEvent::FieldChanged(SettingsField::Model),
                SettingsEvent::FieldChanged(SettingsField::MaxTokens),
                SettingsEvent::Changed,
            ]
        );
        assert!(store.is_valid());

        store.load().unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_padded_values_round_trip() {
        let backend = MemoryBackend::new();
        let first = SettingsStore::new(backend.clone());
        first.set_api_key(" sk-pad ");
        first.set_endpoint(" https://example.com/v1 ");
        first.set_model(" deepseek-chat\n");
        first.set_system_prompt("  keep my spacing  ");
        assert_eq!(first.api_key(), "sk-pad");
        first.save().unwrap();

        let second = SettingsStore::new(backend);
        second.load().unwrap();
        assert_eq!(second.get(), first.get());
        assert_eq!(second.system_prompt(), "  keep my spacing  ");
    }
}

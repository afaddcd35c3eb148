//! Persisted numeric preferences.
//!
//! Every setting has a camelCase name (the storage key), an inclusive range
//! and a default. Out-of-range or non-numeric input is rejected and reported
//! through the notifier; it is never clamped and never stored.

use std::collections::BTreeMap;

use log::warn;

use crate::error::{Error, Result};
use crate::timers::Millis;
use crate::toast::{rate_label, Notifier};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SettingKey {
    DefaultRate,
    TargetRate,
    QuickRateStep,
    TargetRateStep,
    HoldDelayMs,
    SeekStep,
    VolumeStep,
}

impl SettingKey {
    pub const ALL: [SettingKey; 7] = [
        SettingKey::DefaultRate,
        SettingKey::TargetRate,
        SettingKey::QuickRateStep,
        SettingKey::TargetRateStep,
        SettingKey::HoldDelayMs,
        SettingKey::SeekStep,
        SettingKey::VolumeStep,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SettingKey::DefaultRate => "defaultRate",
            SettingKey::TargetRate => "targetRate",
            SettingKey::QuickRateStep => "quickRateStep",
            SettingKey::TargetRateStep => "targetRateStep",
            SettingKey::HoldDelayMs => "holdDelayMs",
            SettingKey::SeekStep => "seekStep",
            SettingKey::VolumeStep => "volumeStep",
        }
    }

    /// Inclusive bounds.
    pub fn range(&self) -> (f64, f64) {
        match self {
            SettingKey::DefaultRate | SettingKey::TargetRate => (0.1, 16.0),
            SettingKey::QuickRateStep => (0.1, 3.0),
            SettingKey::TargetRateStep => (0.1, 16.0),
            SettingKey::HoldDelayMs => (50.0, 2000.0),
            SettingKey::SeekStep => (0.5, 120.0),
            SettingKey::VolumeStep => (0.01, 0.5),
        }
    }

    pub fn default_value(&self) -> f64 {
        match self {
            SettingKey::DefaultRate => 1.0,
            SettingKey::TargetRate => 2.5,
            SettingKey::QuickRateStep => 0.5,
            SettingKey::TargetRateStep => 0.5,
            SettingKey::HoldDelayMs => 200.0,
            SettingKey::SeekStep => 5.0,
            SettingKey::VolumeStep => 0.1,
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| Error::UnknownSetting(name.to_string()))
    }

    fn confirmation(&self, value: f64) -> String {
        match self {
            SettingKey::DefaultRate => format!("Default speed set to {}", rate_label(value)),
            SettingKey::TargetRate => format!("Hold speed set to {}", rate_label(value)),
            SettingKey::QuickRateStep => format!("Quick speed step set to {}", value),
            SettingKey::TargetRateStep => format!("Hold speed step set to {}", value),
            SettingKey::HoldDelayMs => format!("Hold delay set to {} ms", value),
            SettingKey::SeekStep => format!("Seek step set to {} s", value),
            SettingKey::VolumeStep => format!("Volume step set to {}%", (value * 100.0).round()),
        }
    }
}

/// Key/value persistence for settings.
pub trait SettingsStore {
    /// Stored value for `name`, or `default` when absent or unreadable.
    fn get_setting(&self, name: &str, default: f64) -> f64;
    fn set_setting(&mut self, name: &str, value: f64) -> Result<()>;
    /// Forget every stored value.
    fn clear_settings(&mut self) -> Result<()>;
}

/// Volatile store for tests and scenario replay.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    values: BTreeMap<String, f64>,
}

impl MemoryStore {
    pub fn with(mut self, name: &str, value: f64) -> Self {
        self.values.insert(name.to_string(), value);
        self
    }
}

impl SettingsStore for MemoryStore {
    fn get_setting(&self, name: &str, default: f64) -> f64 {
        self.values.get(name).copied().unwrap_or(default)
    }

    fn set_setting(&mut self, name: &str, value: f64) -> Result<()> {
        self.values.insert(name.to_string(), value);
        Ok(())
    }

    fn clear_settings(&mut self) -> Result<()> {
        self.values.clear();
        Ok(())
    }
}

/// Snapshot of all settings, read once per controller.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Settings {
    pub default_rate: f64,
    pub target_rate: f64,
    pub quick_rate_step: f64,
    pub target_rate_step: f64,
    pub hold_delay_ms: f64,
    pub seek_step: f64,
    pub volume_step: f64,
}

impl Default for Settings {
    fn default() -> Self {
        let mut s = Settings {
            default_rate: 0.0,
            target_rate: 0.0,
            quick_rate_step: 0.0,
            target_rate_step: 0.0,
            hold_delay_ms: 0.0,
            seek_step: 0.0,
            volume_step: 0.0,
        };
        for key in SettingKey::ALL {
            *s.slot(key) = key.default_value();
        }
        s
    }
}

impl Settings {
    /// Reads every key from `store`. Stored values that no longer validate
    /// fall back to the default.
    pub fn load(store: &dyn SettingsStore) -> Self {
        let mut s = Settings::default();
        for key in SettingKey::ALL {
            let raw = store.get_setting(key.name(), key.default_value());
            *s.slot(key) = match Settings::validate(key, raw) {
                Ok(v) => v,
                Err(e) => {
                    warn!("settings: ignoring stored value: {}", e);
                    key.default_value()
                }
            };
        }
        s
    }

    pub fn get(&self, key: SettingKey) -> f64 {
        match key {
            SettingKey::DefaultRate => self.default_rate,
            SettingKey::TargetRate => self.target_rate,
            SettingKey::QuickRateStep => self.quick_rate_step,
            SettingKey::TargetRateStep => self.target_rate_step,
            SettingKey::HoldDelayMs => self.hold_delay_ms,
            SettingKey::SeekStep => self.seek_step,
            SettingKey::VolumeStep => self.volume_step,
        }
    }

    fn slot(&mut self, key: SettingKey) -> &mut f64 {
        match key {
            SettingKey::DefaultRate => &mut self.default_rate,
            SettingKey::TargetRate => &mut self.target_rate,
            SettingKey::QuickRateStep => &mut self.quick_rate_step,
            SettingKey::TargetRateStep => &mut self.target_rate_step,
            SettingKey::HoldDelayMs => &mut self.hold_delay_ms,
            SettingKey::SeekStep => &mut self.seek_step,
            SettingKey::VolumeStep => &mut self.volume_step,
        }
    }

    pub fn hold_delay(&self) -> Millis {
        self.hold_delay_ms.round() as Millis
    }

    pub fn validate(key: SettingKey, value: f64) -> Result<f64> {
        let (min, max) = key.range();
        if value.is_finite() && value >= min && value <= max {
            Ok(value)
        } else {
            Err(Error::InvalidSettingValue {
                name: key.name(),
                value: value.to_string(),
                min,
                max,
            })
        }
    }

    /// Validates and persists `value`. On error nothing changes.
    pub fn update(&mut self, store: &mut dyn SettingsStore, key: SettingKey, value: f64) -> Result<()> {
        let value = Settings::validate(key, value)?;
        store.set_setting(key.name(), value)?;
        *self.slot(key) = value;
        Ok(())
    }

    /// Parses user text and applies it, reporting the outcome through
    /// `notifier` either way.
    pub fn parse_and_update(
        &mut self,
        store: &mut dyn SettingsStore,
        notifier: &mut dyn Notifier,
        key: SettingKey,
        text: &str,
    ) -> Result<f64> {
        let (min, max) = key.range();
        let result = match text.trim().parse::<f64>() {
            Ok(value) => self.update(store, key, value).map(|_| value),
            Err(_) => Err(Error::InvalidSettingValue {
                name: key.name(),
                value: text.to_string(),
                min,
                max,
            }),
        };
        match &result {
            Ok(value) => notifier.notify(&key.confirmation(*value)),
            Err(_) => notifier.notify(&format!("Enter a value between {} and {}", min, max)),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toast::ToastQueue;

    #[test]
    fn defaults() {
        let s = Settings::default();
        assert_eq!(s.default_rate, 1.0);
        assert_eq!(s.target_rate, 2.5);
        assert_eq!(s.quick_rate_step, 0.5);
        assert_eq!(s.target_rate_step, 0.5);
        assert_eq!(s.hold_delay(), 200);
        assert_eq!(s.seek_step, 5.0);
        assert_eq!(s.volume_step, 0.1);
        for key in SettingKey::ALL {
            assert!(Settings::validate(key, key.default_value()).is_ok());
        }
    }

    #[test]
    fn names_resolve() {
        assert_eq!(SettingKey::from_name("targetRate").unwrap(), SettingKey::TargetRate);
        assert_eq!(SettingKey::from_name("holddelayms").unwrap(), SettingKey::HoldDelayMs);
        assert!(matches!(
            SettingKey::from_name("speed"),
            Err(Error::UnknownSetting(_))
        ));
    }

    #[test]
    fn load_prefers_stored_values_and_ignores_bad_ones() {
        let store = MemoryStore::default()
            .with("targetRate", 3.0)
            .with("quickRateStep", 9.0);
        let s = Settings::load(&store);
        assert_eq!(s.target_rate, 3.0);
        assert_eq!(s.quick_rate_step, 0.5);
    }

    #[test]
    fn out_of_range_is_rejected_without_mutation() {
        let mut store = MemoryStore::default();
        let mut s = Settings::default();
        let err = s.update(&mut store, SettingKey::TargetRate, 20.0).unwrap_err();
        assert!(matches!(err, Error::InvalidSettingValue { name: "targetRate", .. }));
        assert_eq!(s.target_rate, 2.5);
        assert_eq!(store.get_setting("targetRate", -1.0), -1.0);

        assert!(s.update(&mut store, SettingKey::QuickRateStep, 0.05).is_err());
        assert!(s.update(&mut store, SettingKey::DefaultRate, f64::NAN).is_err());
    }

    #[test]
    fn bounds_are_inclusive() {
        let mut store = MemoryStore::default();
        let mut s = Settings::default();
        s.update(&mut store, SettingKey::TargetRate, 16.0).unwrap();
        s.update(&mut store, SettingKey::DefaultRate, 0.1).unwrap();
        assert_eq!(Settings::load(&store).target_rate, 16.0);
        assert_eq!(Settings::load(&store).default_rate, 0.1);
    }

    #[test]
    fn parse_and_update_notifies() {
        let mut store = MemoryStore::default();
        let mut toasts = ToastQueue::default();
        let mut s = Settings::default();

        assert_eq!(
            s.parse_and_update(&mut store, &mut toasts, SettingKey::DefaultRate, " 1.5 ")
                .unwrap(),
            1.5
        );
        assert_eq!(toasts.last(), Some("Default speed set to 1.5x"));

        assert!(s
            .parse_and_update(&mut store, &mut toasts, SettingKey::DefaultRate, "fast")
            .is_err());
        assert_eq!(toasts.last(), Some("Enter a value between 0.1 and 16"));
        assert_eq!(s.default_rate, 1.5);
    }
}

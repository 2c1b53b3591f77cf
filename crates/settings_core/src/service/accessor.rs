//! Convenience accessors that never fail.
//!
//! These are the only functions in the crate that swallow store/cache
//! errors; everything else propagates them.

use crate::cache::SettingsCache;
use crate::model::value::SettingValue;
use crate::repo::entry_repo::EntryRepository;
use crate::service::settings_service::ScopedSettings;
use log::error;

/// Reads `key`, falling back to `default` when it is absent or when the
/// lookup fails.
pub fn setting_or_default<R, C>(
    settings: &ScopedSettings<'_, R, C>,
    key: &str,
    default: impl Into<SettingValue>,
) -> SettingValue
where
    R: EntryRepository,
    C: SettingsCache,
{
    let default = default.into();
    match settings.get(key, default.clone()) {
        Ok(value) => value,
        Err(err) => {
            error!(
                "event=settings_accessor module=service status=error op=get name={key} error={err}"
            );
            default
        }
    }
}

/// Writes every pair and returns the first key's resolved value.
///
/// Returns `None` for empty input or when the write fails.
pub fn store_settings<R, C, I, K, V>(
    settings: &ScopedSettings<'_, R, C>,
    pairs: I,
) -> Option<SettingValue>
where
    R: EntryRepository,
    C: SettingsCache,
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<SettingValue>,
{
    match settings.set_many(pairs) {
        Ok(first) => first,
        Err(err) => {
            error!("event=settings_accessor module=service status=error op=set error={err}");
            None
        }
    }
}

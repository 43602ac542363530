use crate::settings::{ClientSettings, CoreConfig, SettingKey, SettingValue};
use log::warn;
use std::sync::RwLock;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    pub core: CoreConfig,
    pub client: ClientSettings,
}

/// Local observable settings state.
///
/// Every setting holds either the confirmed remote value or a pending
/// optimistic value written by the patcher; locks are never held across
/// await points.
#[derive(Debug, Default)]
pub struct SettingsState {
    inner: RwLock<Snapshot>,
}

impl SettingsState {
    pub fn new(core: CoreConfig, client: ClientSettings) -> Self {
        Self {
            inner: RwLock::new(Snapshot { core, client }),
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        self.inner.read().unwrap().clone()
    }

    /// Replaces the core part wholesale, used by the delayed reconciliation
    /// re-fetch.
    pub fn replace_core(&self, core: CoreConfig) {
        self.inner.write().unwrap().core = core;
    }

    pub fn get(&self, key: SettingKey) -> SettingValue {
        let snapshot = self.inner.read().unwrap();
        match key {
            SettingKey::AllowLan => snapshot.core.allow_lan.into(),
            SettingKey::Ipv6 => snapshot.core.ipv6.into(),
            SettingKey::DnsOverride => snapshot.client.dns_override.into(),
            SettingKey::StartPage => snapshot.client.start_page.clone().into(),
            SettingKey::SystemProxy => snapshot.client.system_proxy.into(),
        }
    }

    pub fn set(&self, key: SettingKey, value: &SettingValue) {
        let mut snapshot = self.inner.write().unwrap();
        match (key, value) {
            (SettingKey::AllowLan, SettingValue::Bool(v)) => snapshot.core.allow_lan = *v,
            (SettingKey::Ipv6, SettingValue::Bool(v)) => snapshot.core.ipv6 = *v,
            (SettingKey::DnsOverride, SettingValue::Bool(v)) => snapshot.client.dns_override = *v,
            (SettingKey::StartPage, SettingValue::Text(page)) => {
                snapshot.client.start_page = page.clone()
            }
            (SettingKey::SystemProxy, SettingValue::Bool(v)) => snapshot.client.system_proxy = *v,
            // the patcher validates value kinds before writing
            _ => warn!("ignoring mismatched value kind for {key}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_and_set_round_trip_each_key() {
        let state = SettingsState::default();

        state.set(SettingKey::AllowLan, &true.into());
        state.set(SettingKey::StartPage, &"/easy".into());

        assert_eq!(state.get(SettingKey::AllowLan), true.into());
        assert_eq!(state.get(SettingKey::StartPage), "/easy".into());
        assert_eq!(state.get(SettingKey::Ipv6), false.into());
    }

    #[test]
    fn mismatched_value_kind_leaves_state_untouched() {
        let state = SettingsState::default();

        state.set(SettingKey::AllowLan, &"oops".into());

        assert_eq!(state.get(SettingKey::AllowLan), false.into());
    }
}

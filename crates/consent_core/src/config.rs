use std::{fs, path::Path};

use serde::Deserialize;
use tracing::warn;

pub const DEFAULT_SETTINGS_FILE: &str = "consent.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConsentSettings {
    pub detection_action: String,
    pub exported_receiver: bool,
    pub approval_request_code: i32,
    pub event_capacity: usize,
}

impl Default for ConsentSettings {
    fn default() -> Self {
        Self {
            detection_action: "com.google.android.gms.auth.api.phone.SMS_RETRIEVED".into(),
            exported_receiver: true,
            approval_request_code: 1001,
            event_capacity: 64,
        }
    }
}

pub fn load_settings() -> ConsentSettings {
    load_settings_with(Path::new(DEFAULT_SETTINGS_FILE), |key| std::env::var(key).ok())
}

/// File values override defaults; environment values override both. For each field
/// the `APP__` spelling wins over the `CONSENT_` one.
pub fn load_settings_with(
    path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> ConsentSettings {
    let mut settings = read_settings_file(path).unwrap_or_default();

    if let Some(v) = lookup(&env, "CONSENT_DETECTION_ACTION", "APP__DETECTION_ACTION") {
        settings.detection_action = v;
    }
    if let Some(v) = lookup(&env, "CONSENT_EXPORTED_RECEIVER", "APP__EXPORTED_RECEIVER") {
        if let Some(parsed) = parse_flag(&v) {
            settings.exported_receiver = parsed;
        }
    }
    if let Some(v) = lookup(
        &env,
        "CONSENT_APPROVAL_REQUEST_CODE",
        "APP__APPROVAL_REQUEST_CODE",
    ) {
        if let Ok(parsed) = v.trim().parse::<i32>() {
            settings.approval_request_code = parsed;
        }
    }
    if let Some(v) = lookup(&env, "CONSENT_EVENT_CAPACITY", "APP__EVENT_CAPACITY") {
        if let Ok(parsed) = v.trim().parse::<usize>() {
            settings.event_capacity = parsed;
        }
    }

    settings
}

fn read_settings_file(path: &Path) -> Option<ConsentSettings> {
    let raw = fs::read_to_string(path).ok()?;
    match toml::from_str::<ConsentSettings>(&raw) {
        Ok(settings) => Some(settings),
        Err(err) => {
            warn!(
                "consent: ignoring malformed settings file '{}': {err}",
                path.display()
            );
            None
        }
    }
}

fn lookup(env: &impl Fn(&str) -> Option<String>, primary: &str, app: &str) -> Option<String> {
    env(app).or_else(|| env(primary))
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;

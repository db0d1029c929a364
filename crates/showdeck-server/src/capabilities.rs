//! Feature switches for the optional parts of the server.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tracing::info;

use crate::error::ServerError;

pub const SETTINGS: &str = "settings";
pub const EVENTS: &str = "events";
pub const PLAYBACK: &str = "playback";
pub const MESSAGING: &str = "messaging";
pub const OSC: &str = "osc";
pub const NDI: &str = "ndi";

struct Capability {
    id: &'static str,
    name: &'static str,
    required: bool,
    enabled: AtomicBool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapabilityView {
    pub id: &'static str,
    pub name: &'static str,
    pub required: bool,
    pub enabled: bool,
}

pub struct Capabilities {
    table: Vec<Capability>,
}

impl Capabilities {
    pub fn new(osc_enabled: bool, ndi_enabled: bool) -> Self {
        Self {
            table: vec![
                entry(SETTINGS, "Settings", true, true),
                entry(EVENTS, "Event catalog", true, true),
                entry(PLAYBACK, "Playback", true, true),
                entry(MESSAGING, "Messaging", true, true),
                entry(OSC, "OSC control", false, osc_enabled),
                entry(NDI, "NDI output", false, ndi_enabled),
            ],
        }
    }

    fn find(&self, id: &str) -> Option<&Capability> {
        self.table.iter().find(|c| c.id == id)
    }

    pub fn is_enabled(&self, id: &str) -> bool {
        self.find(id)
            .map(|c| c.enabled.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    pub fn list(&self) -> Vec<CapabilityView> {
        self.table.iter().map(view).collect()
    }

    pub fn set_enabled(&self, id: &str, enabled: bool) -> Result<CapabilityView, ServerError> {
        let capability = self
            .find(id)
            .ok_or_else(|| ServerError::not_found("Capability", id))?;
        if capability.required && !enabled {
            return Err(ServerError::Validation(format!(
                "capability {id} is required and cannot be disabled"
            )));
        }
        let previous = capability.enabled.swap(enabled, Ordering::AcqRel);
        if previous != enabled {
            info!(capability = id, enabled, "Capability toggled");
        }
        Ok(view(capability))
    }
}

fn entry(id: &'static str, name: &'static str, required: bool, enabled: bool) -> Capability {
    Capability {
        id,
        name,
        required,
        enabled: AtomicBool::new(enabled),
    }
}

fn view(c: &Capability) -> CapabilityView {
    CapabilityView {
        id: c.id,
        name: c.name,
        required: c.required,
        enabled: c.enabled.load(Ordering::Acquire),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_capabilities_toggle() {
        let caps = Capabilities::new(true, false);
        assert!(caps.is_enabled(OSC));
        assert!(!caps.is_enabled(NDI));

        assert!(!caps.set_enabled(OSC, false).unwrap().enabled);
        assert!(!caps.is_enabled(OSC));
        assert!(caps.set_enabled(NDI, true).unwrap().enabled);
    }

    #[test]
    fn required_capabilities_stay_on() {
        let caps = Capabilities::new(true, false);
        assert!(matches!(
            caps.set_enabled(PLAYBACK, false),
            Err(ServerError::Validation(_))
        ));
        assert!(caps.is_enabled(PLAYBACK));
        assert!(caps.set_enabled(PLAYBACK, true).is_ok());
    }

    #[test]
    fn unknown_capability() {
        let caps = Capabilities::new(true, false);
        assert!(!caps.is_enabled("teleport"));
        assert!(matches!(
            caps.set_enabled("teleport", true),
            Err(ServerError::NotFound { .. })
        ));
        assert_eq!(caps.list().len(), 6);
    }
}

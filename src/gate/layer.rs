//! Optional content groups and their naming-convention roles.

use serde::{Deserialize, Serialize};

/// Prefix of the "this document has not expired" indicator layers.
pub const EXPIRY_NOTICE_PREFIX: &str = "text_";

/// Prefix of the layers that cover the expiry message until it is revealed.
pub const EXPIRY_MASK_PREFIX: &str = "expired_mask_";

/// Role of a layer, derived solely from its name prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LayerRole {
    ProtectedContent,
    ExpiryNotice,
    ExpiryMask,
}

impl LayerRole {
    pub fn classify(name: &str) -> Self {
        if name.starts_with(EXPIRY_NOTICE_PREFIX) {
            LayerRole::ExpiryNotice
        } else if name.starts_with(EXPIRY_MASK_PREFIX) {
            LayerRole::ExpiryMask
        } else {
            LayerRole::ProtectedContent
        }
    }

    /// Expiry-UI layers are only ever hidden by the gate, never shown.
    pub fn is_expiry_ui(self) -> bool {
        matches!(self, LayerRole::ExpiryNotice | LayerRole::ExpiryMask)
    }
}

/// A named, independently hideable layer owned by the host document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionalContentGroup {
    pub name: String,
    pub visible: bool,
}

impl OptionalContentGroup {
    pub fn new(name: impl Into<String>, visible: bool) -> Self {
        Self {
            name: name.into(),
            visible,
        }
    }

    pub fn role(&self) -> LayerRole {
        LayerRole::classify(&self.name)
    }

    pub fn hide(&mut self) {
        self.visible = false;
    }
}

//! Well-known preference keys.

/// `Settings` JSON document.
pub const CONNECTION_SETTINGS: &str = "connection-settings";

/// Boolean, serialized as `true`/`false`.
pub const SOUND_ENABLED: &str = "sound-enabled";

/// Boolean, serialized as `true`/`false`.
pub const NOTIFICATIONS_ENABLED: &str = "notifications-enabled";

/// Integer 0-100.
pub const SOUND_VOLUME: &str = "sound-volume";

/// Bounded wait for the session `end` event during a restart (seconds).
pub const SESSION_END_WAIT_SECS: f64 = 1.2;

/// Object storage host whose bucket root anchors `surfaces/` palette paths.
pub const OBJECT_STORAGE_HOST: &str = "storage.googleapis.com";

/// Remediation links offered by the host when AR cannot start.
pub const ARCORE_INSTALL_URL: &str =
    "https://play.google.com/store/apps/details?id=com.google.ar.core";

/// Android package used for the "open in Chrome" intent.
pub const CHROME_PACKAGE: &str = "com.android.chrome";

/// Minimum Chrome major version for requesting depth sensing.
pub const DEPTH_SENSING_MIN_CHROME: u32 = 90;

//! Decides whether an AR session may be requested on this browser and
//! classifies failures for the host's remediation dialog.
//!
//! The engine never renders the dialog. It emits an `ArEntryFailure` code,
//! a user-facing message and the remediation links the host can offer.

use constants::xr::{ARCORE_INSTALL_URL, CHROME_PACKAGE, DEPTH_SENSING_MIN_CHROME};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ArEntryFailure {
    #[serde(rename = "NEED_CHROME")]
    NeedChrome,
    #[serde(rename = "NO_WEBXR")]
    NoWebXr,
    #[serde(rename = "AR_NOT_SUPPORTED")]
    ArNotSupported,
    #[serde(rename = "CAMERA_DENIED")]
    CameraDenied,
    #[serde(rename = "AR_START_FAILED")]
    ArStartFailed,
}

impl ArEntryFailure {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NeedChrome => "NEED_CHROME",
            Self::NoWebXr => "NO_WEBXR",
            Self::ArNotSupported => "AR_NOT_SUPPORTED",
            Self::CameraDenied => "CAMERA_DENIED",
            Self::ArStartFailed => "AR_START_FAILED",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::NeedChrome => "AR needs Chrome on an Android phone. Open this page in Chrome to continue.",
            Self::NoWebXr => "This version of Chrome does not expose WebXR. Update Chrome and try again.",
            Self::ArNotSupported => {
                "AR is not available on this device. Install or update Google Play Services for AR."
            }
            Self::CameraDenied => "Camera access was blocked. Allow the camera for this site and try again.",
            Self::ArStartFailed => "The AR session could not be started. Please try again.",
        }
    }
}

/// Map the DOMException name of a failed `requestSession` call.
pub fn classify_start_error(name: &str) -> ArEntryFailure {
    match name {
        "NotAllowedError" | "SecurityError" => ArEntryFailure::CameraDenied,
        "NotSupportedError" => ArEntryFailure::ArNotSupported,
        _ => ArEntryFailure::ArStartFailed,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemediationAction {
    pub label: String,
    pub url: String,
}

pub fn remediation_actions(failure: ArEntryFailure, page_url: &str) -> Vec<RemediationAction> {
    match failure {
        ArEntryFailure::NeedChrome => vec![
            RemediationAction {
                label: "Open in Chrome".to_string(),
                url: chrome_intent_url(page_url),
            },
            RemediationAction {
                label: "Install ARCore".to_string(),
                url: ARCORE_INSTALL_URL.to_string(),
            },
        ],
        ArEntryFailure::NoWebXr => vec![RemediationAction {
            label: "Update Chrome".to_string(),
            url: format!("https://play.google.com/store/apps/details?id={CHROME_PACKAGE}"),
        }],
        ArEntryFailure::ArNotSupported => vec![RemediationAction {
            label: "Install ARCore".to_string(),
            url: ARCORE_INSTALL_URL.to_string(),
        }],
        ArEntryFailure::CameraDenied | ArEntryFailure::ArStartFailed => Vec::new(),
    }
}

/// Android intent that reopens `page_url` in Chrome.
pub fn chrome_intent_url(page_url: &str) -> String {
    let (scheme, rest) = match page_url.split_once("://") {
        Some((scheme, rest)) => (scheme, rest),
        None => ("https", page_url),
    };
    format!("intent://{rest}#Intent;scheme={scheme};package={CHROME_PACKAGE};end")
}

pub fn is_android(user_agent: &str) -> bool {
    user_agent.contains("Android")
}

/// Real Chrome on Android, excluding WebViews and Chromium-based browsers
/// that do not ship WebXR AR.
pub fn is_android_chrome(user_agent: &str) -> bool {
    const OTHER_CHROMIUMS: [&str; 7] = [
        "; wv)",
        "SamsungBrowser",
        "EdgA",
        "OPR",
        "YaBrowser",
        "UCBrowser",
        "Firefox",
    ];
    is_android(user_agent)
        && user_agent.contains("Chrome/")
        && !OTHER_CHROMIUMS.iter().any(|marker| user_agent.contains(marker))
}

pub fn chrome_major_version(user_agent: &str) -> Option<u32> {
    let after = user_agent.split("Chrome/").nth(1)?;
    after.split('.').next()?.parse().ok()
}

pub fn supports_depth_sensing(user_agent: &str) -> bool {
    chrome_major_version(user_agent).is_some_and(|major| major >= DEPTH_SENSING_MIN_CHROME)
}

/// Synchronous gate run before the asynchronous `isSessionSupported` check.
pub fn check_browser(user_agent: &str, has_webxr: bool) -> Result<(), ArEntryFailure> {
    if !is_android_chrome(user_agent) {
        return Err(ArEntryFailure::NeedChrome);
    }
    if !has_webxr {
        return Err(ArEntryFailure::NoWebXr);
    }
    Ok(())
}

/// Outcome of the `isSessionSupported("immersive-ar")` check.
pub fn check_support(immersive_ar: bool) -> Result<(), ArEntryFailure> {
    if immersive_ar { Ok(()) } else { Err(ArEntryFailure::ArNotSupported) }
}

/// Feature lists passed to `requestSession`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionFeatures {
    pub required_features: Vec<&'static str>,
    pub optional_features: Vec<&'static str>,
}

pub fn session_features(user_agent: &str) -> SessionFeatures {
    let mut optional_features = vec!["anchors"];
    if supports_depth_sensing(user_agent) {
        optional_features.push("depth-sensing");
    }
    SessionFeatures {
        required_features: vec!["hit-test", "dom-overlay"],
        optional_features,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANDROID_CHROME: &str = "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 \
         (KHTML, like Gecko) Chrome/126.0.6478.71 Mobile Safari/537.36";
    const ANDROID_WEBVIEW: &str = "Mozilla/5.0 (Linux; Android 14; Pixel 8; wv) AppleWebKit/537.36 \
         (KHTML, like Gecko) Version/4.0 Chrome/126.0.6478.71 Mobile Safari/537.36";
    const SAMSUNG: &str = "Mozilla/5.0 (Linux; Android 13; SM-S911B) AppleWebKit/537.36 \
         (KHTML, like Gecko) SamsungBrowser/24.0 Chrome/117.0.0.0 Mobile Safari/537.36";
    const DESKTOP: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
         (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";
    const OLD_CHROME: &str = "Mozilla/5.0 (Linux; Android 9; SM-G960F) AppleWebKit/537.36 \
         (KHTML, like Gecko) Chrome/88.0.4324.93 Mobile Safari/537.36";

    #[test]
    fn desktop_needs_chrome_on_android() {
        assert_eq!(check_browser(DESKTOP, true), Err(ArEntryFailure::NeedChrome));
        assert_eq!(check_browser(ANDROID_WEBVIEW, true), Err(ArEntryFailure::NeedChrome));
        assert_eq!(check_browser(SAMSUNG, true), Err(ArEntryFailure::NeedChrome));
    }

    #[test]
    fn android_chrome_without_xr() {
        assert_eq!(check_browser(ANDROID_CHROME, false), Err(ArEntryFailure::NoWebXr));
        assert_eq!(check_browser(ANDROID_CHROME, true), Ok(()));
        assert_eq!(check_support(false), Err(ArEntryFailure::ArNotSupported));
    }

    #[test]
    fn request_failures_are_classified() {
        assert_eq!(classify_start_error("NotAllowedError"), ArEntryFailure::CameraDenied);
        assert_eq!(classify_start_error("SecurityError"), ArEntryFailure::CameraDenied);
        assert_eq!(classify_start_error("NotSupportedError"), ArEntryFailure::ArNotSupported);
        assert_eq!(classify_start_error("InvalidStateError"), ArEntryFailure::ArStartFailed);
        assert_ne!(
            ArEntryFailure::CameraDenied.message(),
            ArEntryFailure::ArStartFailed.message()
        );
    }

    #[test]
    fn depth_sensing_only_on_recent_chrome() {
        assert_eq!(chrome_major_version(ANDROID_CHROME), Some(126));
        assert!(session_features(ANDROID_CHROME).optional_features.contains(&"depth-sensing"));
        assert!(!session_features(OLD_CHROME).optional_features.contains(&"depth-sensing"));
        assert_eq!(session_features(OLD_CHROME).required_features, ["hit-test", "dom-overlay"]);
    }

    #[test]
    fn chrome_intent_preserves_page() {
        assert_eq!(
            chrome_intent_url("https://tiles.example.com/ar?shape=hex"),
            "intent://tiles.example.com/ar?shape=hex#Intent;scheme=https;package=com.android.chrome;end"
        );
        let actions = remediation_actions(ArEntryFailure::NeedChrome, "https://a.b/c");
        assert_eq!(actions.len(), 2);
        assert!(remediation_actions(ArEntryFailure::CameraDenied, "https://a.b/c").is_empty());
    }

    #[test]
    fn failure_codes_serialize_as_reason_strings() {
        let json = serde_json::to_value(ArEntryFailure::CameraDenied).unwrap();
        assert_eq!(json, "CAMERA_DENIED");
    }
}

//! Theme selection. Public pages are always dark; everything else follows the user setting.

use crate::model::ThemeId;

/// Theme used for public pages and fallbacks.
pub const PUBLIC_THEME: ThemeId = ThemeId::Dark;

const PUBLIC_PREFIXES: &[&str] = &["/integrations/", "/shared/", "/desktop/"];

const PUBLIC_PATHS: &[&str] = &[
    "/",
    "/features",
    "/pricing",
    "/integrations",
    "/signin",
    "/signup",
    "/terms",
    "/policy",
    "/gdpr-policy",
    "/shared",
    "/desktop",
];

/// Marketing, shared and desktop pages, which users cannot theme.
pub fn is_public_pathname(pathname: &str) -> bool {
    PUBLIC_PREFIXES.iter().any(|p| pathname.starts_with(p)) || PUBLIC_PATHS.contains(&pathname)
}

/// Map the `general.theme` setting. Anything unrecognized is light.
pub fn theme_from_preference(preference: Option<&str>) -> ThemeId {
    match preference {
        Some("dark") => ThemeId::Dark,
        _ => ThemeId::Light,
    }
}

/// Route-forced theme overrides the user preference.
pub fn select_theme(pathname: &str, preference: Option<&str>) -> ThemeId {
    if is_public_pathname(pathname) {
        PUBLIC_THEME
    } else {
        theme_from_preference(preference)
    }
}

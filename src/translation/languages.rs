// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Supported caption translation targets

use serde::Serialize;

/// A translation target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Language {
    /// Code sent to the provider (ISO 639-1, plus region for Chinese)
    pub code: &'static str,
    /// English display name
    pub name: &'static str,
}

/// Language captions are generated in
pub const SOURCE_LANGUAGE: &str = "en";

const fn lang(code: &'static str, name: &'static str) -> Language {
    Language { code, name }
}

/// Ordered table of supported targets
pub static SUPPORTED_LANGUAGES: &[Language] = &[
    lang("en", "English"),
    lang("es", "Spanish"),
    lang("fr", "French"),
    lang("de", "German"),
    lang("it", "Italian"),
    lang("pt", "Portuguese"),
    lang("ru", "Russian"),
    lang("ja", "Japanese"),
    lang("ko", "Korean"),
    lang("zh-CN", "Chinese (Simplified)"),
    lang("zh-TW", "Chinese (Traditional)"),
    lang("ar", "Arabic"),
    lang("hi", "Hindi"),
    lang("bn", "Bengali"),
    lang("nl", "Dutch"),
    lang("pl", "Polish"),
    lang("tr", "Turkish"),
    lang("vi", "Vietnamese"),
    lang("th", "Thai"),
    lang("sv", "Swedish"),
    lang("da", "Danish"),
    lang("fi", "Finnish"),
    lang("no", "Norwegian"),
    lang("cs", "Czech"),
    lang("el", "Greek"),
    lang("he", "Hebrew"),
    lang("id", "Indonesian"),
    lang("ms", "Malay"),
    lang("ro", "Romanian"),
    lang("uk", "Ukrainian"),
    lang("hu", "Hungarian"),
    lang("sk", "Slovak"),
    lang("bg", "Bulgarian"),
    lang("hr", "Croatian"),
    lang("sr", "Serbian"),
    lang("sl", "Slovenian"),
    lang("lt", "Lithuanian"),
    lang("lv", "Latvian"),
    lang("et", "Estonian"),
    lang("fa", "Persian"),
    lang("ur", "Urdu"),
    lang("sw", "Swahili"),
    lang("ta", "Tamil"),
    lang("te", "Telugu"),
    lang("kn", "Kannada"),
    lang("ml", "Malayalam"),
    lang("mr", "Marathi"),
    lang("gu", "Gujarati"),
    lang("ca", "Catalan"),
    lang("af", "Afrikaans"),
    lang("is", "Icelandic"),
    lang("tl", "Filipino"),
    lang("ga", "Irish"),
    lang("cy", "Welsh"),
];

/// Look up a target by code, ignoring case and surrounding whitespace
pub fn find_language(code: &str) -> Option<&'static Language> {
    let code = code.trim();
    SUPPORTED_LANGUAGES
        .iter()
        .find(|l| l.code.eq_ignore_ascii_case(code))
}

/// Display name for a code, if supported
pub fn language_name(code: &str) -> Option<&'static str> {
    find_language(code).map(|l| l.name)
}

// crates/catalog-cli/src/i18n.rs
// ============================================================================
// Module: CLI Internationalization Helpers
// Description: Provides message catalog and translation utilities for the CLI.
// Purpose: Centralize user-facing strings for future localization support.
// Dependencies: Standard library collections and formatting utilities.
// ============================================================================

//! ## Overview
//! The catalog CLI stores user-facing strings in a small translation catalog
//! to enforce consistent messaging and to prepare for future locales. All
//! runtime output should be routed through the [`t!`](crate::t) macro.
//!
//! ## Invariants
//! - The catalog is initialized once and read-only thereafter.
//! - Missing keys fall back to English and then to the key itself.
//! - Placeholder substitutions preserve deterministic order.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::OnceLock;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Supported CLI locales.
///
/// # Invariants
/// - Variants are stable for CLI parsing and catalog lookup.
/// - [`Locale::En`] is the default fallback locale.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Locale {
    /// English (default).
    En,
    /// Catalan.
    Ca,
}

impl Locale {
    /// Returns the canonical locale label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Ca => "ca",
        }
    }

    /// Attempts to parse a locale value (case-insensitive, tolerant of region tags).
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        let normalized = value.to_ascii_lowercase();
        let lang = normalized.split(['-', '_']).next().unwrap_or("");
        match lang {
            "en" => Some(Self::En),
            "ca" => Some(Self::Ca),
            _ => None,
        }
    }
}

/// Ordered list of supported CLI locales.
///
/// # Invariants
/// - Ordering is stable for deterministic presentation.
pub const SUPPORTED_LOCALES: &[Locale] = &[Locale::En, Locale::Ca];

/// A formatted message argument captured by the [`macro@crate::t`] macro.
///
/// # Invariants
/// - `key` matches a placeholder name without braces (for example, `path`).
/// - `value` is preformatted and should be safe for display.
#[derive(Clone)]
pub struct MessageArg {
    /// The placeholder name used in message templates (e.g., `"path"`).
    pub key: &'static str,
    /// The formatted string value to substitute for this placeholder.
    pub value: String,
}

impl MessageArg {
    /// Constructs a new [`MessageArg`] from a key and displayable value.
    pub fn new(key: &'static str, value: impl Into<String>) -> Self {
        Self { key, value: value.into() }
    }
}

// ============================================================================
// SECTION: Locale Selection
// ============================================================================

/// Global locale selection for CLI output.
static CURRENT_LOCALE: OnceLock<Locale> = OnceLock::new();

/// Sets the CLI locale. Only the first call wins.
pub fn set_locale(locale: Locale) {
    let _ = CURRENT_LOCALE.set(locale);
}

/// Returns the current CLI locale (defaults to English).
#[must_use]
pub fn current_locale() -> Locale {
    CURRENT_LOCALE.get().copied().unwrap_or(Locale::En)
}

// ============================================================================
// SECTION: Catalog
// ============================================================================

/// Static English catalog entries loaded into the localized message bundle.
const CATALOG_EN: &[(&str, &str)] = &[
    ("main.version", "catalog-cli {version}"),
    ("output.stream.stdout", "stdout"),
    ("output.stream.stderr", "stderr"),
    ("output.stream.unknown", "output"),
    ("output.write_failed", "Failed to write to {stream}: {error}"),
    ("input.read_too_large", "Refusing to read {kind} at {path} because it is {size} bytes (limit {limit})."),
    ("i18n.lang.invalid_env", "Invalid value for {env}: {value}. Expected 'en' or 'ca'."),
    ("i18n.disclaimer.machine_translated", "Note: non-English output is machine-translated and may be inaccurate."),
    ("config.load_failed", "Failed to load config at {path}: {error}"),
    ("config.validate.ok", "Config at {path} is valid."),
    ("config.validate.no_ai_key", "Config valid; AI features are disabled (no ai_api_key configured)."),
    ("serve.starting", "catalog-service listening on port {port}"),
    ("serve.failed", "catalog-service failed: {error}"),
    ("store.open_failed", "Failed to open store: {error}"),
    ("normalize.run.start", "Starting normalization over table {table}"),
    ("normalize.run.done", "Normalization finished: {success} succeeded, {errors} errors, {groups} groups"),
    ("normalize.run.failed", "Normalization failed: {error}"),
    ("classify.run.start", "Starting IC classification (limit={limit})"),
    ("classify.run.done", "{message}"),
    ("classify.run.failed", "IC classification failed: {error}"),
    ("classifier_tree.load.read_failed", "Failed to read classifier tree file at {path}: {error}"),
    ("classifier_tree.load.parse_failed", "Failed to parse classifier tree file at {path}: {error}"),
    ("classifier_tree.load.store_failed", "Failed to write classifier tree: {error}"),
    ("classifier_tree.load.ok", "Loaded {count} classifier nodes from {path}"),
    ("snapshot.create.failed", "Failed to create snapshot: {error}"),
    ("snapshot.list.failed", "Failed to list snapshots: {error}"),
    ("snapshot.get.failed", "Failed to read snapshot: {error}"),
    ("snapshot.get.not_found", "No snapshot with id {id}"),
    ("snapshot.text.header", "Snapshots:"),
    ("snapshot.text.entry", "- {id}: {name} ({kind}, {count} uploads)"),
    ("snapshot.kind.manual", "manual"),
    ("snapshot.kind.auto_latest", "auto_latest"),
    ("quality.show.failed", "Failed to run quality analysis: {error}"),
    ("quality.show.invalid_uuid", "Invalid upload uuid {uuid}: {error}"),
    ("quality.show.text", "constants: reported {reported_constants} / actual {actual_constants}; items: reported {reported_items} / actual {actual_items}; mismatch: {mismatch}"),
];

/// Static Catalan catalog entries loaded into the localized message bundle.
const CATALOG_CA: &[(&str, &str)] = &[
    ("main.version", "catalog-cli {version}"),
    ("output.stream.stdout", "sortida estàndard"),
    ("output.stream.stderr", "sortida d'error"),
    ("output.stream.unknown", "sortida"),
    ("output.write_failed", "No s'ha pogut escriure a {stream}: {error}"),
    ("input.read_too_large", "Es rebutja llegir {kind} a {path} perquè té {size} bytes (límit {limit})."),
    ("i18n.lang.invalid_env", "Valor no vàlid per a {env}: {value}. S'esperava 'en' o 'ca'."),
    ("i18n.disclaimer.machine_translated", "Nota: la sortida que no és en anglès està traduïda automàticament i pot ser inexacta."),
    ("config.load_failed", "No s'ha pogut carregar la configuració a {path}: {error}"),
    ("config.validate.ok", "La configuració a {path} és vàlida."),
    ("config.validate.no_ai_key", "Configuració vàlida; les funcions d'IA estan desactivades (no hi ha ai_api_key configurada)."),
    ("serve.starting", "catalog-service escoltant al port {port}"),
    ("serve.failed", "catalog-service ha fallat: {error}"),
    ("store.open_failed", "No s'ha pogut obrir l'emmagatzematge: {error}"),
    ("normalize.run.start", "S'inicia la normalització de la taula {table}"),
    ("normalize.run.done", "Normalització finalitzada: {success} correctes, {errors} errors, {groups} grups"),
    ("normalize.run.failed", "La normalització ha fallat: {error}"),
    ("classify.run.start", "S'inicia la classificació IC (límit={limit})"),
    ("classify.run.done", "{message}"),
    ("classify.run.failed", "La classificació IC ha fallat: {error}"),
    ("classifier_tree.load.read_failed", "No s'ha pogut llegir l'arbre classificador a {path}: {error}"),
    ("classifier_tree.load.parse_failed", "No s'ha pogut analitzar l'arbre classificador a {path}: {error}"),
    ("classifier_tree.load.store_failed", "No s'ha pogut desar l'arbre classificador: {error}"),
    ("classifier_tree.load.ok", "S'han carregat {count} nodes classificadors des de {path}"),
    ("snapshot.create.failed", "No s'ha pogut crear l'instantània: {error}"),
    ("snapshot.list.failed", "No s'han pogut llistar les instantànies: {error}"),
    ("snapshot.get.failed", "No s'ha pogut llegir l'instantània: {error}"),
    ("snapshot.get.not_found", "No hi ha cap instantània amb id {id}"),
    ("snapshot.text.header", "Instantànies:"),
    ("snapshot.text.entry", "- {id}: {name} ({kind}, {count} càrregues)"),
    ("snapshot.kind.manual", "manual"),
    ("snapshot.kind.auto_latest", "auto_latest"),
    ("quality.show.failed", "No s'ha pogut executar l'anàlisi de qualitat: {error}"),
    ("quality.show.invalid_uuid", "Uuid de càrrega no vàlid {uuid}: {error}"),
    ("quality.show.text", "constants: informades {reported_constants} / reals {actual_constants}; elements: informats {reported_items} / reals {actual_items}; desajust: {mismatch}"),
];

/// Returns the message catalog for the requested locale.
pub(crate) fn catalog_for(locale: Locale) -> &'static HashMap<&'static str, &'static str> {
    static CATALOG_EN_MAP: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();
    static CATALOG_CA_MAP: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();
    match locale {
        Locale::En => CATALOG_EN_MAP.get_or_init(|| CATALOG_EN.iter().copied().collect()),
        Locale::Ca => CATALOG_CA_MAP.get_or_init(|| CATALOG_CA.iter().copied().collect()),
    }
}

// ============================================================================
// SECTION: Translation
// ============================================================================

/// Translates `key` using the selected locale while substituting `args`.
#[must_use]
pub fn translate(key: &str, args: Vec<MessageArg>) -> String {
    let locale = current_locale();
    let template = catalog_for(locale).get(key).copied().or_else(|| catalog_for(Locale::En).get(key).copied()).unwrap_or(key);
    if args.is_empty() {
        return template.to_string();
    }

    let mut result = template.to_string();
    for arg in args {
        let placeholder = format!("{{{}}}", arg.key);
        result = result.replace(&placeholder, &arg.value);
    }
    result
}

// ============================================================================
// SECTION: Macro
// ============================================================================

/// Formats a localized message from a key and named arguments.
///
/// # Arguments
///
/// - `$key` must match a catalog entry.
/// - Named arguments are substituted into `{placeholder}` positions.
///
/// # Returns
///
/// A localized [`String`] with placeholders substituted.
#[macro_export]
macro_rules! t {
    ($key:literal $(, $name:ident = $value:expr )* $(,)?) => {{
        let args = ::std::vec![
            $(
                $crate::i18n::MessageArg::new(stringify!($name), $value.to_string()),
            )*
        ];
        $crate::i18n::translate($key, args)
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_locale_tags() {
        assert_eq!(Locale::parse("en"), Some(Locale::En));
        assert_eq!(Locale::parse("en-US"), Some(Locale::En));
        assert_eq!(Locale::parse("ca_ES"), Some(Locale::Ca));
    }

    #[test]
    fn parse_rejects_unknown_locale() {
        assert_eq!(Locale::parse("fr"), None);
        assert_eq!(Locale::parse(""), None);
    }

    #[test]
    fn every_catalog_key_exists_in_both_locales() {
        let en = catalog_for(Locale::En);
        let ca = catalog_for(Locale::Ca);
        for key in en.keys() {
            assert!(ca.contains_key(key), "missing Catalan translation for {key}");
        }
    }

    #[test]
    fn translate_substitutes_named_placeholders() {
        set_locale(Locale::En);
        let message = translate("snapshot.get.not_found", vec![MessageArg::new("id", "7")]);
        assert_eq!(message, "No snapshot with id 7");
    }

    #[test]
    fn translate_falls_back_to_key_when_missing() {
        let message = translate("does.not.exist", vec![]);
        assert_eq!(message, "does.not.exist");
    }
}

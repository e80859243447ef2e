// crates/catalog-normalize/src/categorizer.rs
// ============================================================================
// Module: Categorizer (CAT)
// Description: Deterministic keyword -> category mapping over a closed
// category set (spec §4.3).
// Purpose: Give NRM a cheap, network-free first pass at categorization
// before AIN decides whether the name needs AI enrichment.
// Dependencies: none (pure function over a static keyword table)
// ============================================================================

//! ## Overview
//! The category set is closed: eighteen named categories plus `"other"`.
//! Keywords are matched case-insensitively against the raw (not yet
//! normalized) name; the first category whose keyword list contains a match
//! wins (spec §4.3 "first matching keyword wins"), so the table's iteration
//! order is itself part of the contract and must stay stable.

/// Category assigned when no keyword matches (spec §4.3).
pub const OTHER: &str = "other";

/// Keyword table, most-specific categories first so a name that could match
/// more than one keyword list resolves to the first (most specific) table
/// entry, matching spec §4.3's "first matching keyword wins" contract.
const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    ("tools", &["молоток", "отвертка", "дрель", "перфоратор", "ключ гаечный", "hammer", "drill", "screwdriver", "wrench"]),
    ("electronics", &["кабель", "розетка", "выключатель", "провод", "cable", "socket", "switch", "wire"]),
    ("construction_materials", &["цемент", "кирпич", "бетон", "гипсокартон", "cement", "brick", "concrete", "drywall"]),
    ("plumbing", &["труба", "фитинг", "кран водопроводный", "сантехника", "pipe", "fitting", "faucet"]),
    ("fasteners", &["болт", "гайка", "шуруп", "саморез", "дюбель", "bolt", "nut", "screw", "dowel"]),
    ("paint_and_coatings", &["краска", "лак", "грунтовка", "эмаль", "paint", "varnish", "primer", "enamel"]),
    ("lighting", &["лампа", "светильник", "прожектор", "led", "lamp", "luminaire"]),
    ("furniture", &["стол", "стул", "шкаф", "полка", "table", "chair", "cabinet", "shelf"]),
    ("office_supplies", &["бумага", "ручка", "степлер", "папка", "paper", "pen", "stapler", "folder"]),
    ("safety_equipment", &["каска", "перчатки защитные", "респиратор", "helmet", "gloves", "respirator"]),
    ("electrical_equipment", &["автомат защитный", "щиток", "трансформатор", "breaker", "transformer"]),
    ("heating_and_ventilation", &["радиатор", "котел", "вентилятор", "кондиционер", "radiator", "boiler", "fan", "conditioner"]),
    ("hardware", &["петля", "замок", "ручка дверная", "hinge", "lock", "door handle"]),
    ("chemicals", &["растворитель", "клей", "герметик", "solvent", "adhesive", "sealant"]),
    ("textiles", &["ткань", "нить", "fabric", "thread"]),
    ("packaging", &["коробка", "пленка упаковочная", "box", "wrap"]),
    ("transport_equipment", &["тележка", "поддон", "cart", "pallet"]),
    ("measuring_instruments", &["рулетка", "уровень строительный", "штангенциркуль", "tape measure", "level", "caliper"]),
];

/// Assigns a category to `raw_name` by first-match keyword lookup (spec
/// §4.3).
///
/// # Invariants
/// - Always returns a non-empty category; absence of any match yields
///   [`OTHER`].
#[must_use]
pub fn categorize(raw_name: &str) -> &'static str {
    let lowered = raw_name.to_lowercase();
    for (category, keywords) in CATEGORY_KEYWORDS {
        if keywords.iter().any(|keyword| lowered.contains(keyword)) {
            return category;
        }
    }
    OTHER
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_first_keyword_category() {
        assert_eq!(categorize("Молоток строительный 500г"), "tools");
        assert_eq!(categorize("Кабель ВВГнг 3х2.5"), "electronics");
    }

    #[test]
    fn unmatched_name_falls_back_to_other() {
        assert_eq!(categorize("Неизвестный предмет xyz"), OTHER);
    }

    #[test]
    fn matching_is_case_insensitive() {
        assert_eq!(categorize("МОЛОТОК"), "tools");
    }

    #[test]
    fn every_category_table_entry_has_keywords() {
        for (category, keywords) in CATEGORY_KEYWORDS {
            assert!(!keywords.is_empty(), "{category} has no keywords");
        }
    }
}

//! Fixed domain vocabulary for beauty-salon price lists.
//!
//! Terms are lowercase; matching is a case-insensitive substring search over
//! service names and descriptions.

pub const VOCABULARY: &[&str] = &[
    // Hair
    "strzyżenie",
    "koloryzacja",
    "farbowanie",
    "balayage",
    "baleyage",
    "ombre",
    "pasemka",
    "refleksy",
    "dekoloryzacja",
    "keratynowe",
    "prostowanie",
    "trwała",
    "modelowanie",
    "upięcie",
    "fryzura",
    "botox na włosy",
    "olaplex",
    "regeneracja",
    "włosy",
    "broda",
    // Nails
    "manicure",
    "pedicure",
    "hybryda",
    "hybrydowy",
    "żel",
    "żelowe",
    "przedłużanie",
    "paznokci",
    "zdobienie",
    "french",
    "uzupełnienie",
    "tytanowy",
    // Brows and lashes
    "brwi",
    "rzęs",
    "henna",
    "laminacja",
    "regulacja",
    "lifting",
    "przedłużanie rzęs",
    "microblading",
    "makijaż permanentny",
    // Face and skin
    "oczyszczanie",
    "peeling",
    "mezoterapia",
    "mikrodermabrazja",
    "kwasy",
    "nawilżanie",
    "zabieg na twarz",
    "twarz",
    "makijaż",
    "radiofrekwencja",
    "hydrafacial",
    // Body
    "masaż",
    "depilacja",
    "wosk",
    "laser",
    "endermologia",
    "drenaż",
    "ciało",
    "spa",
];

/// Vocabulary terms occurring in `text`, in vocabulary order.
pub fn terms_in(text: &str) -> Vec<&'static str> {
    let lower = text.to_lowercase();
    VOCABULARY
        .iter()
        .copied()
        .filter(|term| lower.contains(term))
        .collect()
}

/// Non-overlapping occurrences of `term` in `text`, case-insensitive.
pub fn occurrences(text: &str, term: &str) -> usize {
    if term.is_empty() {
        return 0;
    }
    text.to_lowercase().matches(&term.to_lowercase()).count()
}

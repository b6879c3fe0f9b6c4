//! Query text normalisation.

/// Characters dropped entirely when folding (Hebrew geresh/gershayim and quotes).
const DROPPED: &[char] = &['״', '׳', '"', '\'', '`', '’', '‘', '”', '“', '\u{05BE}'];

/// Characters treated as word separators.
const SEPARATORS: &[char] = &['?', '!', ';', ':', '(', ')', '[', ']', '-', '–', '—', '/', '\\'];

/// Hebrew final letters and their regular forms.
const FINAL_LETTERS: &[(char, char)] = &[('ך', 'כ'), ('ם', 'מ'), ('ן', 'נ'), ('ף', 'פ'), ('ץ', 'צ')];

fn regular_form(c: char) -> char {
    FINAL_LETTERS
        .iter()
        .find(|(final_form, _)| *final_form == c)
        .map_or(c, |(_, regular)| *regular)
}

/// Fold text for matching: lower-case, drop quote marks, write Hebrew final
/// letters in their regular form, turn punctuation into spaces, collapse
/// whitespace. Digit separators (`,` and `.`) survive so amounts keep their
/// shape.
pub fn fold(text: &str) -> String {
    let mapped: String = text
        .chars()
        .filter(|c| !DROPPED.contains(c))
        .map(|c| if SEPARATORS.contains(&c) { ' ' } else { regular_form(c) })
        .collect::<String>()
        .to_lowercase();
    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// A question in raw and folded form.
#[derive(Debug, Clone)]
pub struct QueryText {
    raw: String,
    folded: String,
}

impl QueryText {
    pub fn new(raw: &str) -> Self {
        let raw = raw.trim().to_string();
        let folded = fold(&raw);
        Self { raw, folded }
    }

    /// Trimmed original text.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Folded text used by every matcher.
    pub fn folded(&self) -> &str {
        &self.folded
    }

    /// Whether the folded text contains an already-folded term.
    pub fn contains(&self, folded_term: &str) -> bool {
        !folded_term.is_empty() && self.folded.contains(folded_term)
    }

    /// Word tokens with trailing digit separators removed.
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.folded
            .split(' ')
            .map(|t| t.trim_matches(|c| c == ',' || c == '.'))
            .filter(|t| !t.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_gershayim() {
        assert_eq!(fold("תב״ר 2211"), "תבר 2211");
        assert_eq!(fold("תב\"ר 2211"), "תבר 2211");
        assert_eq!(fold("סה\"כ"), "סהכ");
    }

    #[test]
    fn test_fold_keeps_amount_separators() {
        assert_eq!(fold("חשבוניות מעל 10,000 שקל?"), "חשבוניות מעל 10,000 שקל");
    }

    #[test]
    fn test_fold_lowercases_and_collapses() {
        assert_eq!(fold("  Show   ALL-Projects "), "show all projects");
    }

    #[test]
    fn test_fold_final_letters() {
        assert_eq!(fold("ממתין"), "ממתינ");
        assert!(fold("פרויקטים ממתינים").contains(&fold("ממתין")));
        assert_eq!(fold("חינוך סך מיליון אלף קבוץ"), "חינוכ סכ מיליונ אלפ קבוצ");
        assert_eq!(fold("תב״ר"), fold("תבר"));
    }

    #[test]
    fn test_tokens() {
        let text = QueryText::new("פרויקטים, בשנת 2024.");
        let tokens: Vec<_> = text.tokens().collect();
        assert_eq!(tokens, vec!["פרויקטימ", "בשנת", "2024"]);
    }
}

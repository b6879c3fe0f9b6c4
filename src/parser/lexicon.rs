//! Fixed vocabularies used by the rule-based parser.
//!
//! Every table is ordered: earlier entries win. Phrases are written in
//! plain Hebrew and folded with [`super::text::fold`] before matching, so
//! final letters match their inflected forms.

use super::text::fold;

/// Municipal departments: (canonical value, variants).
pub const DEPARTMENTS: &[(&str, &[&str])] = &[
    ("חינוך", &["חינוך"]),
    ("רווחה", &["רווחה", "שירותים חברתיים"]),
    ("הנדסה", &["הנדסה"]),
    ("תרבות", &["תרבות"]),
    ("ספורט", &["ספורט"]),
    ("תברואה", &["תברואה", "ניקיון"]),
    ("ביטחון", &["ביטחון", "בטחון"]),
    ("גזברות", &["גזברות"]),
    ("תשתיות", &["תשתיות"]),
    ("איכות הסביבה", &["איכות הסביבה"]),
];

/// Funding ministries: (canonical value, variants). Checked before
/// departments so "משרד החינוך" is not read as the education department.
pub const MINISTRIES: &[(&str, &[&str])] = &[
    ("משרד החינוך", &["משרד החינוך"]),
    ("משרד הפנים", &["משרד הפנים"]),
    ("משרד התחבורה", &["משרד התחבורה"]),
    ("משרד הרווחה", &["משרד הרווחה"]),
    ("משרד התרבות והספורט", &["משרד התרבות", "משרד הספורט"]),
    ("משרד הבריאות", &["משרד הבריאות"]),
    ("משרד הבינוי והשיכון", &["משרד הבינוי", "משרד השיכון"]),
    ("משרד להגנת הסביבה", &["הגנת הסביבה"]),
];

/// Phrases removed before status matching because they contain a status
/// word without meaning a status.
pub const STATUS_EXCLUSIONS: &[&str] = &["תקציב מאושר", "בתוקף עד"];

/// Phrases where "עד" bounds a date, removed before amount matching.
pub const DATE_BOUNDS: &[&str] = &["בתוקף עד", "תוקף עד", "עד תאריך", "עד שנת", "עד סוף"];

/// Status phrases: (phrase, canonical enum value). Negated and
/// longer phrases come before the forms they contain.
pub const STATUS_PHRASES: &[(&str, &str)] = &[
    ("לא שולמו", "לא שולם"),
    ("לא שולם", "לא שולם"),
    ("טרם שולם", "לא שולם"),
    ("לא פעיל", "סגור"),
    ("לא אושר", "ממתין לאישור"),
    ("לא מאושר", "ממתין לאישור"),
    ("ממתין לאישור", "ממתין לאישור"),
    ("ממתינים לאישור", "ממתין לאישור"),
    ("ממתינים לתשלום", "ממתין"),
    ("פג תוקף", "פגה"),
    ("שולמו", "שולם"),
    ("שולם", "שולם"),
    ("בתוקף", "בתוקף"),
    ("פגה", "פגה"),
    ("פגו", "פגה"),
    ("מומשה", "מומשה"),
    ("מומשו", "מומשה"),
    ("בביצוע", "בביצוע"),
    ("סגור", "סגור"),
    ("נסגר", "סגור"),
    ("מאושר", "מאושר"),
    ("אושר", "מאושר"),
    ("פעיל", "פעיל"),
    ("ממתין", "ממתין"),
];

/// Transaction types: (phrase, canonical enum value).
pub const TRANSACTION_TYPES: &[(&str, &str)] = &[
    ("הכנסות", "הכנסה"),
    ("הכנסה", "הכנסה"),
    ("תקבולים", "הכנסה"),
    ("income", "הכנסה"),
    ("הוצאות", "הוצאה"),
    ("הוצאה", "הוצאה"),
    ("expense", "הוצאה"),
];

/// Words that ask for a report without narrowing it.
pub const REPORT_WORDS: &[&str] = &[
    "הצג", "הראה", "תראה", "תציג", "תן", "תני", "רשימה", "רשימת", "כל", "הכל", "דוח", "דוחות",
    "נתונים", "פירוט", "מידע", "show", "list", "all", "report", "give", "display",
];

/// Stop words ignored by the report-phrase check.
pub const STOP_WORDS: &[&str] = &[
    "של", "את", "יש", "על", "עם", "מה", "לי", "לנו", "אני", "אנא", "בבקשה", "הם", "זה", "the",
    "of", "a", "an", "me", "for", "in", "please", "are", "there", "what",
];

/// Single-letter Hebrew prefixes stripped when matching vocabulary tokens.
pub const HEBREW_PREFIXES: &[char] = &['ה', 'ו', 'ב', 'ל', 'מ', 'ש', 'כ'];

/// Look up the first entry with a variant in the already-folded `text`.
pub fn lookup<'a>(table: &'a [(&'a str, &'a [&'a str])], text: &str) -> Option<&'a str> {
    table
        .iter()
        .find(|(_, variants)| variants.iter().any(|v| text.contains(&fold(v))))
        .map(|(canonical, _)| *canonical)
}

//! Deterministic rule-based intent parsing.
//!
//! Domain scoring, filter extraction and action detection are each driven by
//! an ordered table. Earlier entries take priority; nothing depends on map
//! iteration order.
//!
//! Every matcher runs against folded text (see [`fold`]), so Hebrew literals
//! in the patterns below are written without final letters.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::debug;

use super::lexicon::{
    lookup, DATE_BOUNDS, DEPARTMENTS, HEBREW_PREFIXES, MINISTRIES, REPORT_WORDS,
    STATUS_EXCLUSIONS, STATUS_PHRASES, STOP_WORDS, TRANSACTION_TYPES,
};
use super::text::{fold, QueryText};
use crate::intent::{Action, FilterValue, Filters, Intent, IntentSource, SEARCH_KEY};
use crate::schema::{Domain, SchemaRegistry};

/// Scores below this send the query to the fallback domain.
pub const MIN_DOMAIN_SCORE: f64 = 0.3;

/// Upper bound for rule-based confidence.
pub const MAX_RULE_CONFIDENCE: f64 = 0.95;

const PRIMARY_WEIGHT: f64 = 0.5;
const SECONDARY_WEIGHT: f64 = 0.3;
const LABEL_WEIGHT: f64 = 0.2;
const FILTER_BONUS: f64 = 0.1;

// ============================================================================
// Patterns
// ============================================================================

static TABAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:תבר|פרויקט|פרוייקט|project)\S*\s*(?:מס(?:פר)?\.?\s*)?#?(\d[\d,]*)")
        .expect("Invalid regex")
});

static YEAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|\s)(?:שנת|בשנת|לשנת|משנת|שנה|year|in|ב|ל)\s*((?:19|20)\d{2})(?:[^\d,]|$)")
        .expect("Invalid regex")
});

static AMOUNT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?:^|\s)(?:",
        r"(?P<gt>מעל|יותר\s*מ|גבוה\s*מ|גדול\s*מ|לפחות|מינימומ|above|over|more\s+than|greater\s+than)",
        r"|(?P<lt>מתחת|פחות\s*מ|נמוכ\s*מ|קטנ\s*מ|עד|מקסימומ|below|under|less\s+than)",
        r")\s*(?:ל|מ)?\s*(?P<number>\d[\d,]*(?:\.\d+)?)",
        r"(?:\s*(?P<unit>אלפימ|אלפ|מיליארד|מיליונ|מליונ|thousand|million|k\b|m\b))?",
    ))
    .expect("Invalid regex")
});

static ORDER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:הזמנה|הזמנת|order)\S*\s*(?:רכש\s*)?(?:מס(?:פר)?\.?\s*)?#?\s*(\d{4,10})(?:\D|$)")
        .expect("Invalid regex")
});

// ============================================================================
// Filter Rules
// ============================================================================

/// Extracts at most one filter from the query for a domain.
pub type Extractor = fn(&QueryText, &Domain) -> Option<(String, FilterValue)>;

/// A named entry of the filter rule table.
pub struct FilterRule {
    pub name: &'static str,
    pub extract: Extractor,
}

/// Filter rules in priority order.
pub const FILTER_RULES: &[FilterRule] = &[
    FilterRule {
        name: "tabar_number",
        extract: extract_tabar_number,
    },
    FilterRule {
        name: "year",
        extract: extract_year,
    },
    FilterRule {
        name: "department",
        extract: extract_department,
    },
    FilterRule {
        name: "amount",
        extract: extract_amount,
    },
    FilterRule {
        name: "status",
        extract: extract_status,
    },
    FilterRule {
        name: "transaction_type",
        extract: extract_transaction_type,
    },
    FilterRule {
        name: "order_number",
        extract: extract_order_number,
    },
];

fn extract_tabar_number(text: &QueryText, _domain: &Domain) -> Option<(String, FilterValue)> {
    TABAR_PATTERN
        .captures_iter(text.folded())
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim_end_matches(['.', ',']))
        .find(|digits| !digits.contains(',') && (3..=4).contains(&digits.len()))
        .map(|digits| ("tabar_number".to_string(), FilterValue::from(digits)))
}

/// A year never comes from the number of an amount comparison
/// ("מתחת ל-2000").
fn extract_year(text: &QueryText, _domain: &Domain) -> Option<(String, FilterValue)> {
    let amount_starts: Vec<usize> = AMOUNT_PATTERN
        .captures_iter(text.folded())
        .filter_map(|caps| caps.name("number"))
        .map(|m| m.start())
        .collect();

    let year = YEAR_PATTERN
        .captures_iter(text.folded())
        .filter_map(|caps| caps.get(1))
        .find(|m| !amount_starts.contains(&m.start()))?;
    let year: i64 = year.as_str().parse().ok()?;
    Some(("year".to_string(), FilterValue::Integer(year)))
}

fn extract_department(text: &QueryText, domain: &Domain) -> Option<(String, FilterValue)> {
    if let Some(ministry) = lookup(MINISTRIES, text.folded()) {
        return ["ministry", "ministries"]
            .into_iter()
            .find(|key| domain.accepts_filter(key))
            .map(|key| (key.to_string(), FilterValue::from(ministry)));
    }
    lookup(DEPARTMENTS, text.folded())
        .map(|department| ("department".to_string(), FilterValue::from(department)))
}

fn extract_amount(text: &QueryText, domain: &Domain) -> Option<(String, FilterValue)> {
    let field = domain.amount_field()?;
    let mut remaining = text.folded().to_string();
    for phrase in DATE_BOUNDS {
        remaining = remaining.replace(&fold(phrase), " ");
    }
    let caps = AMOUNT_PATTERN.captures(&remaining)?;
    let direction = if caps.name("gt").is_some() { "gt" } else { "lt" };

    let number: f64 = caps
        .name("number")?
        .as_str()
        .trim_end_matches(['.', ','])
        .replace(',', "")
        .parse()
        .ok()?;
    let multiplier = match caps.name("unit").map(|m| m.as_str()) {
        Some("אלפ" | "אלפימ" | "thousand" | "k") => 1_000.0,
        Some("מיליונ" | "מליונ" | "million" | "m") => 1_000_000.0,
        Some("מיליארד") => 1_000_000_000.0,
        _ => 1.0,
    };

    Some((
        format!("{}_{}", field.key, direction),
        FilterValue::number(number * multiplier),
    ))
}

fn extract_status(text: &QueryText, domain: &Domain) -> Option<(String, FilterValue)> {
    let field = domain.field("status")?;
    let mut remaining = text.folded().to_string();
    for phrase in STATUS_EXCLUSIONS {
        remaining = remaining.replace(&fold(phrase), " ");
    }

    for (phrase, status) in STATUS_PHRASES {
        let phrase = fold(phrase);
        if !remaining.contains(&phrase) {
            continue;
        }
        if field.allows_value(status) {
            return Some(("status".to_string(), FilterValue::from(*status)));
        }
        // A matched phrase is consumed so its shorter forms cannot match.
        remaining = remaining.replace(&phrase, " ");
    }
    None
}

fn extract_transaction_type(text: &QueryText, domain: &Domain) -> Option<(String, FilterValue)> {
    let field = domain.field("transaction_type")?;
    TRANSACTION_TYPES
        .iter()
        .find(|(phrase, value)| text.contains(&fold(phrase)) && field.allows_value(value))
        .map(|(_, value)| ("transaction_type".to_string(), FilterValue::from(*value)))
}

fn extract_order_number(text: &QueryText, _domain: &Domain) -> Option<(String, FilterValue)> {
    let caps = ORDER_PATTERN.captures(text.folded())?;
    Some((
        "order_number".to_string(),
        FilterValue::from(caps.get(1)?.as_str()),
    ))
}

/// Run the filter rule table against a domain.
pub fn extract_filters(text: &QueryText, domain: &Domain) -> Filters {
    let mut filters = Filters::new();
    for rule in FILTER_RULES {
        let Some((key, value)) = (rule.extract)(text, domain) else {
            continue;
        };
        if !domain.accepts_filter(&key) {
            debug!(rule = rule.name, key = %key, domain = %domain.key, "Filter not accepted by domain");
            continue;
        }
        if filters.contains_key(&key) {
            continue;
        }
        debug!(rule = rule.name, key = %key, value = %value, "Filter extracted");
        filters.insert(key, value);
    }
    filters
}

// ============================================================================
// Action Rules
// ============================================================================

/// A trigger pattern for one action, with an optional veto pattern.
pub struct ActionRule {
    pub action: Action,
    pattern: Regex,
    unless: Option<Regex>,
}

impl ActionRule {
    fn new(action: Action, pattern: &str, unless: Option<&str>) -> Self {
        Self {
            action,
            pattern: Regex::new(pattern).expect("Invalid regex"),
            unless: unless.map(|u| Regex::new(u).expect("Invalid regex")),
        }
    }

    pub fn matches(&self, folded: &str) -> bool {
        self.pattern.is_match(folded) && !self.unless.as_ref().is_some_and(|u| u.is_match(folded))
    }
}

/// Action rules in priority order: count, sum, average, group.
pub static ACTION_RULES: LazyLock<Vec<ActionRule>> = LazyLock::new(|| {
    vec![
        ActionRule::new(
            Action::Count,
            r"(?:^|\s)(?:כמה|ספירת|ספירה|מספר\s+ה\S+(?:ימ|ות))(?:\s|$)|how\s+many|\bcount\b",
            None,
        ),
        ActionRule::new(
            Action::Sum,
            r"(?:^|\s)(?:סכומ|סכומי|סהכ|סכ)(?:\s|$)|\btotal\b|\bsum\b",
            Some(r"(?:^|\s)סכומ\s+(?:של\s+)?(?:מעל|מתחת|יותר|פחות|עד|גבוה|נמוכ)"),
        ),
        ActionRule::new(Action::Average, r"ממוצע|average|\bavg\b|\bmean\b", None),
        ActionRule::new(
            Action::Group,
            r"(?:^|\s)(?:לפי|פילוח|מקובצ|מקובצימ|בחלוקה)(?:\s|$)|group\s+by|\bper\b|\bby\b",
            None,
        ),
    ]
});

/// Words that belong to action triggers, for the report-phrase check.
const ACTION_WORDS: &[&str] = &[
    "כמה", "ספירת", "ספירה", "מספר", "סכום", "סכומי", "סהכ", "סך", "ממוצע", "לפי", "פילוח", "מקובץ",
    "מקובצים", "בחלוקה", "how", "many", "count", "total", "sum", "average", "avg", "group", "by",
];

/// First matching action, `list` when none matches.
pub fn detect_action(text: &QueryText) -> Action {
    ACTION_RULES
        .iter()
        .find(|rule| rule.matches(text.folded()))
        .map_or(Action::List, |rule| rule.action)
}

// ============================================================================
// Domain Scoring
// ============================================================================

/// A domain with its keyword score.
#[derive(Debug, Clone)]
pub struct DomainScore<'a> {
    pub domain: &'a Domain,
    pub score: f64,
}

fn count_present<'a>(text: &QueryText, terms: impl Iterator<Item = &'a str>) -> f64 {
    terms.filter(|term| text.contains(&fold(term))).count() as f64
}

/// Score one domain against the query.
pub fn score_domain(text: &QueryText, domain: &Domain) -> f64 {
    let primary = count_present(text, domain.keywords.primary.iter().map(String::as_str));
    let secondary = count_present(text, domain.keywords.secondary.iter().map(String::as_str));
    let labels = count_present(text, domain.fields.iter().map(|f| f.label.as_str()));
    round2(PRIMARY_WEIGHT * primary + SECONDARY_WEIGHT * secondary + LABEL_WEIGHT * labels)
}

/// Score every domain in registry order.
pub fn score_domains<'a>(schema: &'a SchemaRegistry, text: &QueryText) -> Vec<DomainScore<'a>> {
    schema
        .domains()
        .iter()
        .map(|domain| DomainScore {
            domain,
            score: score_domain(text, domain),
        })
        .collect()
}

/// Highest score; ties keep the domain declared first.
pub fn best_domain<'a, 'b>(scores: &'b [DomainScore<'a>]) -> Option<&'b DomainScore<'a>> {
    let mut best: Option<&'b DomainScore<'a>> = None;
    for candidate in scores {
        if best.map_or(true, |b| candidate.score > b.score) {
            best = Some(candidate);
        }
    }
    best
}

/// Rule confidence: domain score plus a bonus per filter, capped.
pub fn confidence(score: f64, filter_count: usize) -> f64 {
    round2((score + FILTER_BONUS * filter_count as f64).min(MAX_RULE_CONFIDENCE))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ============================================================================
// Rule Parser
// ============================================================================

/// The deterministic step of the parse chain.
#[derive(Debug, Clone)]
pub struct RuleParser {
    schema: Arc<SchemaRegistry>,
    vocabulary: Vec<String>,
    known_words: Vec<String>,
    status_phrases: Vec<String>,
}

impl RuleParser {
    pub fn new(schema: Arc<SchemaRegistry>) -> Self {
        let mut vocabulary: Vec<String> = schema
            .domains()
            .iter()
            .flat_map(|d| {
                d.keywords
                    .primary
                    .iter()
                    .chain(&d.keywords.secondary)
                    .chain(std::iter::once(&d.label))
            })
            .flat_map(|term| {
                fold(term)
                    .split(' ')
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .filter(|word| !word.is_empty())
            .collect();
        vocabulary.sort();
        vocabulary.dedup();

        let known_words = REPORT_WORDS
            .iter()
            .chain(STOP_WORDS)
            .chain(ACTION_WORDS)
            .map(|word| fold(word))
            .collect();
        let status_phrases = STATUS_PHRASES.iter().map(|(phrase, _)| fold(phrase)).collect();

        Self {
            schema,
            vocabulary,
            known_words,
            status_phrases,
        }
    }

    /// Parse with rules only. Returns `None` when no domain scores high
    /// enough.
    pub fn parse(&self, text: &QueryText) -> Option<Intent> {
        let scores = score_domains(&self.schema, text);
        let best = best_domain(&scores)?;
        debug!(
            scores = ?scores.iter().map(|s| (s.domain.key.as_str(), s.score)).collect::<Vec<_>>(),
            "Domain scores"
        );

        if best.score < MIN_DOMAIN_SCORE {
            debug!(best = best.score, "No domain scored high enough");
            return None;
        }

        let domain = best.domain;
        let action = detect_action(text);
        let mut filters = extract_filters(text, domain);
        let confidence = confidence(best.score, filters.len());

        if filters.is_empty() && !self.is_report_phrase(text) && !self.is_status_phrase(text) {
            debug!("No filters extracted, using full-text search");
            filters.insert(SEARCH_KEY.to_string(), FilterValue::from(text.raw()));
        }

        let explanation = explain(domain, action, &filters);
        Some(
            Intent::new(domain.key.clone(), action, IntentSource::Rules)
                .with_filters(filters)
                .with_confidence(confidence)
                .with_explanation(explanation),
        )
    }

    /// Whether every token is domain, action or report vocabulary.
    pub fn is_report_phrase(&self, text: &QueryText) -> bool {
        text.tokens().all(|token| self.is_known_token(token))
    }

    /// Whether the query names a status and nothing the vocabulary does not
    /// cover.
    pub fn is_status_phrase(&self, text: &QueryText) -> bool {
        let has_status = self.status_phrases.iter().any(|phrase| text.contains(phrase));
        has_status
            && text.tokens().all(|token| {
                self.is_known_token(token)
                    || self
                        .status_phrases
                        .iter()
                        .flat_map(|phrase| phrase.split(' '))
                        .any(|word| word.chars().count() > 1 && token.contains(word))
            })
    }

    fn is_known_token(&self, token: &str) -> bool {
        if token.chars().count() <= 1 || !token.chars().any(char::is_alphanumeric) {
            return true;
        }
        let stripped = token
            .strip_prefix(HEBREW_PREFIXES)
            .filter(|s| s.chars().count() > 1)
            .unwrap_or(token);
        self.known_words
            .iter()
            .any(|word| word == token || word == stripped)
            || self
                .vocabulary
                .iter()
                .any(|word| word == token || (word.chars().count() > 2 && token.contains(word.as_str())))
    }
}

fn explain(domain: &Domain, action: Action, filters: &Filters) -> String {
    let filters = if filters.is_empty() {
        "ללא".to_string()
    } else {
        filters
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(", ")
    };
    format!(
        "תחום: {}, פעולה: {}, מסננים: {}",
        domain.label,
        action.display_name(),
        filters
    )
}

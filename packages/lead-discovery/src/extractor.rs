//! Text heuristics that turn a candidate's title and snippet into lead fields.
//!
//! Every heuristic is a pure function returning [`Field::Unknown`] when it finds
//! no signal. Nothing here can fail.

use std::sync::LazyLock;

use regex::Regex;

use crate::types::{Budget, CandidateResult, Contact, Field, LeadDraft, LeadFields, ProjectType};

// =============================================================================
// Patterns
// =============================================================================

const NAME_WORD: &str = r"[A-Z][A-Za-z&'\-]*";

static RE_COMPANY_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"\b((?:{w}\s+){{0,3}}{w}\s+(?:Inc\.?|LLC|Ltd\.?|Group|Corp\.?|Corporation|Holdings|Partners|Development|Developers|Properties|Hospitality|Hotels|Resorts|Construction|Capital|Companies|Company|Co\.))",
        w = NAME_WORD
    ))
    .unwrap()
});

static RE_COMPANY_ACTOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"\b((?:{w}\s+){{0,3}}{w})\s+(?:announces|announced|plans|planned|unveils|unveiled|breaks ground|broke ground|opens|opened|acquires|acquired|files|filed|is developing|will develop|to develop)\b",
        w = NAME_WORD
    ))
    .unwrap()
});

static RE_COMPANY_BY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"\b(?:by|from)\s+((?:{w}\s?){{1,4}})", w = NAME_WORD)).unwrap()
});

static RE_CITY_STATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Z][a-z]+(?:\s[A-Z][a-z]+){0,2}),\s([A-Z]{2})\b").unwrap()
});

static RE_PREPOSITION_PLACE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:in|at|near)\s+(?:downtown\s+)?([A-Z][a-z]+(?:\s[A-Z][a-z]+){0,2})(?:,\s*([A-Z][a-z]+(?:\s[A-Z][a-z]+)?))?",
    )
    .unwrap()
});

const AMOUNT: &str = r"(\d{1,3}(?:,\d{3})+|\d+(?:\.\d+)?)";
const MAGNITUDE: &str = r"(?i:\s*(billion|million|thousand|bn|mn|b|m|k))?";

static RE_BUDGET_SYMBOL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"([$€£])\s?{AMOUNT}{MAGNITUDE}\b")).unwrap()
});

static RE_BUDGET_CODE_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"\b(USD|EUR|GBP|CAD|AUD)\s?{AMOUNT}{MAGNITUDE}\b")).unwrap()
});

static RE_BUDGET_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"\b{AMOUNT}{MAGNITUDE}\s*(?i:(USD|EUR|GBP|dollars|euros|pounds))\b"
    ))
    .unwrap()
});

static RE_ROOM_COUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d[\d,]*)\s*-?\s*(?:guest\s*)?(?:rooms?|keys?|suites?|units?)\b").unwrap()
});

static RE_EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}\b").unwrap()
});

static RE_PHONE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\+?1[-.\s]?)?\(?[0-9]{3}\)?[-.\s]?[0-9]{3}[-.\s]?[0-9]{4}").unwrap()
});

const TITLES: &str = r"(Chief [A-Z][a-z]+ Officer|CEO|COO|CFO|Managing Director|Director of [A-Z][a-z]+|Director|Vice President|President|Founder|Project Manager|Development Manager|Managing Partner|Principal|Partner|Owner|Chairman)";

static RE_NAME_TITLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"\b([A-Z][a-z]+ [A-Z][a-z]+),\s+(?:the\s+)?{TITLES}\b")).unwrap()
});

static RE_TITLE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"\b{TITLES}\s+([A-Z][a-z]+ [A-Z][a-z]+)\b")).unwrap()
});

/// Project-type keywords, checked in priority order.
static PROJECT_TYPES: LazyLock<Vec<(ProjectType, Regex)>> = LazyLock::new(|| {
    [
        (ProjectType::Resort, r"\bresorts?\b"),
        (ProjectType::Hotel, r"\b(?:hotels?|motels?|inns?|lodging|hospitality)\b"),
        (ProjectType::MixedUse, r"\bmixed[- ]use\b"),
        (
            ProjectType::Healthcare,
            r"\b(?:hospitals?|medical (?:center|office)|clinics?|healthcare|senior living)\b",
        ),
        (ProjectType::Education, r"\b(?:schools?|university|campus|college)\b"),
        (
            ProjectType::Residential,
            r"\b(?:apartments?|condominiums?|condos?|residential|multifamily|multi-family|housing|townhomes?)\b",
        ),
        (ProjectType::Office, r"\b(?:office|headquarters)\b"),
        (ProjectType::Retail, r"\b(?:retail|shopping center|mall)\b"),
        (
            ProjectType::Industrial,
            r"\b(?:warehouse|industrial|distribution center|manufacturing|logistics)\b",
        ),
        (
            ProjectType::Infrastructure,
            r"\b(?:bridge|highway|airport|transit|railway|infrastructure)\b",
        ),
    ]
    .into_iter()
    .map(|(kind, pattern)| (kind, Regex::new(&format!("(?i){}", pattern)).unwrap()))
    .collect()
});

const US_STATES: &[&str] = &[
    "AL", "AK", "AZ", "AR", "CA", "CO", "CT", "DE", "FL", "GA", "HI", "ID", "IL", "IN", "IA", "KS",
    "KY", "LA", "ME", "MD", "MA", "MI", "MN", "MS", "MO", "MT", "NE", "NV", "NH", "NJ", "NM", "NY",
    "NC", "ND", "OH", "OK", "OR", "PA", "RI", "SC", "SD", "TN", "TX", "UT", "VT", "VA", "WA", "WV",
    "WI", "WY", "DC",
];

/// Capitalized words that follow "in"/"at" but are never places.
const PLACE_STOPWORDS: &[&str] = &[
    "January", "February", "March", "April", "May", "June", "July", "August", "September",
    "October", "November", "December", "Monday", "Tuesday", "Wednesday", "Thursday", "Friday",
    "Saturday", "Sunday", "The", "This", "That", "Phase", "Partnership",
];

const MAX_ROOM_COUNT: u32 = 10_000;
const DESCRIPTION_SNIPPET_CHARS: usize = 280;

// =============================================================================
// Heuristics
// =============================================================================

/// Company name: "<Name> <Suffix>", then "<Name> announces/plans/...", then "by <Name>".
pub fn extract_company(text: &str) -> Field<String> {
    let from_suffix = RE_COMPANY_SUFFIX
        .captures_iter(text)
        .filter_map(|c| clean_company(&c[1]))
        .next();
    let from_actor = || {
        RE_COMPANY_ACTOR
            .captures_iter(text)
            .filter_map(|c| clean_company(&c[1]))
            .next()
    };
    let from_by = || {
        RE_COMPANY_BY
            .captures_iter(text)
            .filter_map(|c| clean_company(&c[1]))
            .next()
    };

    from_suffix.or_else(from_actor).or_else(from_by).into()
}

fn clean_company(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix("The ").unwrap_or(trimmed).trim();
    if trimmed.is_empty() || PLACE_STOPWORDS.contains(&trimmed) {
        return None;
    }
    Some(trimmed.to_string())
}

/// Location: "City, ST" with a known state code, else "in/at/near City[, Region]".
pub fn extract_location(text: &str) -> Field<String> {
    let city_state = RE_CITY_STATE
        .captures_iter(text)
        .find(|c| US_STATES.contains(&&c[2]))
        .map(|c| format!("{}, {}", &c[1], &c[2]));
    if let Some(location) = city_state {
        return Field::Known(location);
    }

    RE_PREPOSITION_PLACE
        .captures_iter(text)
        .find(|c| {
            let first_word = c[1].split_whitespace().next().unwrap_or_default();
            !PLACE_STOPWORDS.contains(&first_word)
        })
        .map(|c| match c.get(2) {
            Some(region) => format!("{}, {}", &c[1], region.as_str()),
            None => c[1].to_string(),
        })
        .into()
}

pub fn extract_project_type(text: &str) -> Field<ProjectType> {
    PROJECT_TYPES
        .iter()
        .find(|(_, re)| re.is_match(text))
        .map(|(kind, _)| *kind)
        .into()
}

/// First currency amount in the text, with magnitude words applied.
pub fn extract_budget(text: &str) -> Field<Budget> {
    if let Some(c) = RE_BUDGET_SYMBOL.captures(text) {
        let currency = match &c[1] {
            "€" => "EUR",
            "£" => "GBP",
            _ => "USD",
        };
        return budget(&c[0], &c[2], c.get(3).map(|m| m.as_str()), currency);
    }
    if let Some(c) = RE_BUDGET_CODE_PREFIX.captures(text) {
        return budget(&c[0], &c[2], c.get(3).map(|m| m.as_str()), &c[1]);
    }
    if let Some(c) = RE_BUDGET_SUFFIX.captures(text) {
        let currency = match c[3].to_ascii_lowercase().as_str() {
            "eur" | "euros" => "EUR",
            "gbp" | "pounds" => "GBP",
            _ => "USD",
        };
        return budget(&c[0], &c[1], c.get(2).map(|m| m.as_str()), currency);
    }
    Field::Unknown
}

fn budget(raw: &str, amount: &str, magnitude: Option<&str>, currency: &str) -> Field<Budget> {
    let Ok(base) = amount.replace(',', "").parse::<f64>() else {
        return Field::Unknown;
    };
    let multiplier = match magnitude.map(str::to_ascii_lowercase).as_deref() {
        Some("billion" | "bn" | "b") => 1_000_000_000.0,
        Some("million" | "mn" | "m") => 1_000_000.0,
        Some("thousand" | "k") => 1_000.0,
        _ => 1.0,
    };
    let amount = base * multiplier;
    if amount <= 0.0 {
        return Field::Unknown;
    }
    Field::Known(Budget {
        amount,
        currency: currency.to_ascii_uppercase(),
        raw: raw.trim().to_string(),
    })
}

/// Room or unit count. Only meaningful for lodging, so callers gate it on the project type.
pub fn extract_room_count(text: &str) -> Field<u32> {
    RE_ROOM_COUNT
        .captures_iter(text)
        .filter_map(|c| c[1].replace(',', "").parse::<u32>().ok())
        .find(|n| (1..=MAX_ROOM_COUNT).contains(n))
        .into()
}

pub fn extract_contact(text: &str) -> Field<Contact> {
    let mut contact = Contact {
        email: RE_EMAIL.find(text).map(|m| m.as_str().to_string()),
        phone: RE_PHONE.find(text).map(|m| m.as_str().trim().to_string()),
        ..Contact::default()
    };

    if let Some(c) = RE_NAME_TITLE.captures(text) {
        contact.name = Some(c[1].to_string());
        contact.title = Some(c[2].to_string());
    } else if let Some(c) = RE_TITLE_NAME.captures(text) {
        contact.title = Some(c[1].to_string());
        contact.name = Some(c[2].to_string());
    }

    if contact.is_empty() {
        Field::Unknown
    } else {
        Field::Known(contact)
    }
}

/// Run every heuristic over `text`.
pub fn extract_fields(text: &str) -> LeadFields {
    let project_type = extract_project_type(text);
    let room_count = match project_type.as_known() {
        Some(kind) if kind.is_lodging() => extract_room_count(text),
        _ => Field::Unknown,
    };

    LeadFields {
        company: extract_company(text),
        location: extract_location(text),
        project_type,
        budget: extract_budget(text),
        room_count,
        contact: extract_contact(text),
    }
}

/// Extract fields from a candidate and pair them with a generated description.
pub fn extract(candidate: CandidateResult) -> LeadDraft {
    let fields = extract_fields(&candidate.text());
    let description = generate_description(&candidate, &fields);
    LeadDraft {
        candidate,
        fields,
        description,
    }
}

/// One-line summary of the known fields followed by the start of the snippet.
pub fn generate_description(candidate: &CandidateResult, fields: &LeadFields) -> String {
    let mut headline = match fields.project_type.as_known() {
        Some(kind) => format!("{} project", kind.label()),
        None => "Project".to_string(),
    };
    if let Some(company) = fields.company.as_known() {
        headline.push_str(&format!(" by {}", company));
    }
    if let Some(location) = fields.location.as_known() {
        headline.push_str(&format!(" in {}", location));
    }
    headline.push('.');
    if let Some(budget) = fields.budget.as_known() {
        headline.push_str(&format!(" Budget: {}.", budget.raw));
    }
    if let Some(rooms) = fields.room_count.as_known() {
        headline.push_str(&format!(" {} rooms.", rooms));
    }

    let body = if candidate.snippet.trim().is_empty() {
        candidate.title.trim()
    } else {
        candidate.snippet.trim()
    };
    let mut snippet: String = body.chars().take(DESCRIPTION_SNIPPET_CHARS).collect();
    if body.chars().count() > DESCRIPTION_SNIPPET_CHARS {
        snippet.push_str("...");
    }

    format!("{} {}", headline, snippet).trim().to_string()
}

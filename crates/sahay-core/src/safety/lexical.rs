use std::sync::LazyLock;

use regex::Regex;

use crate::models::CrisisCategory;

/// First term that matched, with the category it belongs to. A lexical hit
/// is a hard block; no downstream source can soften it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexicalMatch {
    pub category: CrisisCategory,
    pub term: String,
}

/// Everyday idioms that contain crisis vocabulary without crisis meaning.
/// Any one of these suppresses the suicidal-ideation check for the whole
/// message; the other categories are unaffected.
const FALSE_POSITIVES: &[&str] = &[
    "deadline",
    "deadlines",
    "deadly serious",
    "dead tired",
    "dead sure",
    "dead end",
    "dead on",
    "dead heat",
    "dead weight",
    "dead ringer",
    "dead center",
    "drop dead gorgeous",
    "killed it",
    "killing time",
    "killer deal",
    "killer workout",
    "die hard",
    "to die for",
    "dying to know",
    "dying laughing",
];

// English plus the Hindi/Hinglish phrasings seen most often in intake logs.
const SUICIDE_TERMS: &[&str] = &[
    "suicide",
    "kill myself",
    "want to die",
    "end my life",
    "kms",
    "want to end it",
    "better off dead",
    "no reason to live",
    "can't take it anymore",
    "life is not worth living",
    "thinking of ending it",
    "planning to die",
    "ready to die",
    "tired of living",
    "life is meaningless",
    "death would be better",
    "give up on life",
    "going to jump",
    "gonna jump",
    "i don't want to live",
    "meri zindagi khatam",
    "marna chahta",
    "khudkushi",
    "nahi jeena",
    "mar jaaun",
];

const ABUSE_TERMS: &[&str] = &[
    "hit me",
    "beat me",
    "got slapped",
    "punched me",
    "kicked me",
    "hurt me physically",
    "physically hurt me",
    "domestic violence",
    "violence at home",
    "raped me",
    "molested me",
    "abused me",
    "sexual abuse",
    "groped me",
    "inappropriate touching",
    "harassed me",
    "gaslighting",
    "emotionally abusive",
    "mentally torturing",
    "i feel unsafe",
    "i can't go home",
    "i'm in danger",
    "stalking me",
    "won't let me leave",
    "usne mujhe maara",
    "usne thappad maara",
    "ghar mein hinsa",
    "jabardasti ki",
    "uska darr lagta hai",
    "main safe nahi hoon",
];

const HARM_TO_OTHERS_TERMS: &[&str] = &[
    "want to kill someone",
    "going to hurt someone",
    "kill them",
    "hurt others",
    "planning to hurt",
    "make them pay",
    "going to attack",
    "want to murder",
];

const SELF_HARM_TERMS: &[&str] = &[
    "cut myself",
    "cutting myself",
    "self harm",
    "self-harm",
    "hurt myself",
    "burning myself",
    "scratching myself",
    "hitting myself",
];

static SUICIDE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile_patterns(&[
        r"\b(want to die|going to die|wish i was dead|better off dead)\b",
        r"\b(kill(ing)? myself)\b",
        r"\b(suicide|suicidal)\b",
        r"\b(end(ing)? my life)\b",
        r"\b(tak(e|ing) my life)\b",
        r"\bmar\s+jaa\w*\b",
        r"\bkhatam\s+karna\b",
    ])
});

static ABUSE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile_patterns(&[
        r"\b(he|she|they)\s+(hit|beat|slapped|punched|kicked)\s+me\b",
        r"\b(he|she|they|someone)\s+(hurt|hurting)\s+me\b",
        r"\b(rape[ds]?|molest(ed)?)\b",
        r"\b(physically|mentally|emotionally)\s+(hurt|abused|harmed)\b",
        r"\b(maara|maari|thappad)\b",
    ])
});

static HARM_TO_OTHERS_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile_patterns(&[
        r"\b(kill|murder|hurt)\s+(someone|others|them|him|her)\b",
        r"\b(violent|revenge)\s+(thoughts|plans)\b",
        r"\b(planning|going)\s+to\s+(hurt|kill|attack)\b",
    ])
});

static SELF_HARM_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile_patterns(&[
        r"\b(cut|cutting|burn|burning|scratch|scratching)\s+(myself|my)\b",
        r"\bself[\-\s]?(harm|hurt)\b",
        r"\b(hit|hitting|punch|punching)\s+myself\b",
    ])
});

fn compile_patterns(sources: &[&str]) -> Vec<Regex> {
    sources
        .iter()
        .map(|source| Regex::new(source).expect("lexical pattern should compile"))
        .collect()
}

/// Scan one inbound message for crisis vocabulary. Categories are checked in
/// triage order: suicidal ideation, then abuse, then harm to others, then
/// non-suicidal self-harm. Returns the first hit.
pub fn scan(text: &str) -> Option<LexicalMatch> {
    let lowered = text.to_lowercase();

    let suppress_suicide_check = FALSE_POSITIVES.iter().any(|idiom| lowered.contains(idiom));
    if !suppress_suicide_check
        && let Some(term) = match_category(&lowered, SUICIDE_TERMS, &SUICIDE_PATTERNS)
    {
        return Some(LexicalMatch {
            category: CrisisCategory::SuicidalIdeation,
            term,
        });
    }

    if let Some(term) = match_category(&lowered, ABUSE_TERMS, &ABUSE_PATTERNS) {
        return Some(LexicalMatch {
            category: CrisisCategory::Abuse,
            term,
        });
    }

    if let Some(term) = match_category(&lowered, HARM_TO_OTHERS_TERMS, &HARM_TO_OTHERS_PATTERNS) {
        return Some(LexicalMatch {
            category: CrisisCategory::HarmToOthers,
            term,
        });
    }

    if let Some(term) = match_category(&lowered, SELF_HARM_TERMS, &SELF_HARM_PATTERNS) {
        return Some(LexicalMatch {
            category: CrisisCategory::SelfHarm,
            term,
        });
    }

    None
}

fn match_category(lowered: &str, terms: &[&str], patterns: &[Regex]) -> Option<String> {
    if let Some(term) = terms.iter().find(|term| lowered.contains(*term)) {
        return Some((*term).to_string());
    }

    patterns
        .iter()
        .find_map(|pattern| pattern.find(lowered))
        .map(|found| found.as_str().to_string())
}

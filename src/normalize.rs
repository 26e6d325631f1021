use std::sync::LazyLock;

use regex::Regex;

use crate::domain::NameKey;

pub const DEFAULT_PREFIXES: &[&str] = &[
    "super typhoon",
    "severe tropical storm",
    "tropical storm",
    "tropical depression",
    "tropical cyclone",
    "hurricane",
    "typhoon",
    "cyclone",
    "ts",
    "ty",
    "tc",
    "td",
];

static PARENTHESISED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\([^)]*\)").expect("parenthesis pattern is valid"));

#[derive(Debug, Clone)]
pub struct NameNormalizer {
    prefixes: Vec<Vec<String>>,
}

impl Default for NameNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIXES.iter().copied())
    }
}

impl NameNormalizer {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut prefixes = prefixes
            .into_iter()
            .map(|prefix| tokenize(&prefix.as_ref().to_lowercase()))
            .filter(|tokens| !tokens.is_empty())
            .collect::<Vec<_>>();
        prefixes.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        prefixes.dedup();
        Self { prefixes }
    }

    pub fn normalize(&self, title: &str) -> NameKey {
        let lowered = title.to_lowercase();
        let without_parens = PARENTHESISED.replace_all(&lowered, " ");

        let mut tokens = tokenize(&without_parens)
            .into_iter()
            .filter(|token| !is_basin_designator(token))
            .collect::<Vec<_>>();
        self.strip_leading_prefixes(&mut tokens);

        if tokens.is_empty() {
            return NameKey::new(tokenize(&lowered).join("-"));
        }
        NameKey::new(tokens.join("-"))
    }

    fn strip_leading_prefixes(&self, tokens: &mut Vec<String>) {
        loop {
            let matched = self
                .prefixes
                .iter()
                .find(|prefix| tokens.len() >= prefix.len() && tokens[..prefix.len()] == prefix[..]);
            match matched {
                Some(prefix) => {
                    tokens.drain(..prefix.len());
                }
                None => break,
            }
        }
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|ch: char| !ch.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

fn is_basin_designator(token: &str) -> bool {
    let bytes = token.as_bytes();
    let (digits, suffix) = bytes.split_at(bytes.len().saturating_sub(1));
    (1..=2).contains(&digits.len())
        && digits.iter().all(u8::is_ascii_digit)
        && suffix.first().is_some_and(u8::is_ascii_lowercase)
}

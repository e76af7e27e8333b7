//! Locale tags used to select rule shards.
//!
//! Tags follow the `language[-Script][-REGION]` shape (`en`, `de-CH`,
//! `zh-Hant-TW`). A `*` language acts as a wildcard. Matching is one-sided: a
//! shard locale supports a text locale when every part the shard locale
//! specifies agrees with the text locale.

use crate::error::LocaleError;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locale {
    language: String,
    script: Option<String>,
    region: Option<String>,
}

impl Locale {
    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn script(&self) -> Option<&str> {
        self.script.as_deref()
    }

    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    pub fn is_wildcard(&self) -> bool {
        self.language == "*"
    }

    /// True when a shard tagged with `self` may run on text in `text_locale`.
    pub fn supports(&self, text_locale: &Locale) -> bool {
        if !self.is_wildcard() && self.language != text_locale.language {
            return false;
        }
        if self.script.is_some() && self.script != text_locale.script {
            return false;
        }
        if self.region.is_some() && self.region != text_locale.region {
            return false;
        }
        true
    }

    /// Parse a comma separated list such as `"en,de-CH"`.
    pub fn parse_list(tags: &str) -> Result<Vec<Locale>, LocaleError> {
        tags.split(',').map(str::trim).filter(|t| !t.is_empty()).map(str::parse).collect()
    }
}

impl FromStr for Locale {
    type Err = LocaleError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        let tag = tag.trim();
        if tag.is_empty() {
            return Err(LocaleError::Empty);
        }

        let mut parts = tag.split(['-', '_']);
        let language = match parts.next() {
            Some("*") => "*".to_string(),
            Some(l) if (2..=3).contains(&l.len()) && l.chars().all(|c| c.is_ascii_alphabetic()) => {
                l.to_ascii_lowercase()
            }
            _ => return Err(LocaleError::Invalid(tag.to_string())),
        };

        let mut script = None;
        let mut region = None;
        for part in parts {
            if script.is_none() && region.is_none() && part.len() == 4 && part.chars().all(|c| c.is_ascii_alphabetic())
            {
                let mut chars = part.chars();
                let titled: String = chars
                    .next()
                    .map(|c| c.to_ascii_uppercase())
                    .into_iter()
                    .chain(chars.map(|c| c.to_ascii_lowercase()))
                    .collect();
                script = Some(titled);
            } else if region.is_none()
                && ((part.len() == 2 && part.chars().all(|c| c.is_ascii_alphabetic()))
                    || (part.len() == 3 && part.chars().all(|c| c.is_ascii_digit())))
            {
                region = Some(part.to_ascii_uppercase());
            } else {
                return Err(LocaleError::Invalid(tag.to_string()));
            }
        }

        Ok(Locale { language, script, region })
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.language)?;
        if let Some(script) = &self.script {
            write!(f, "-{script}")?;
        }
        if let Some(region) = &self.region {
            write!(f, "-{region}")?;
        }
        Ok(())
    }
}

/// Decide whether a shard tagged with `shard_locales` participates for a text
/// declared in `text_locales`.
///
/// Untagged shards always participate. Tagged shards need at least one of
/// their locales to support at least one text locale, so a text without any
/// declared locale only sees untagged shards.
pub fn is_locale_supported(shard_locales: &[Locale], text_locales: &[Locale]) -> bool {
    if shard_locales.is_empty() {
        return true;
    }
    shard_locales.iter().any(|shard| text_locales.iter().any(|text| shard.supports(text)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(tag: &str) -> Locale {
        tag.parse().unwrap()
    }

    #[test]
    fn parses_language_script_and_region() {
        let l = loc("zh_hant_tw");
        assert_eq!(l.language(), "zh");
        assert_eq!(l.script(), Some("Hant"));
        assert_eq!(l.region(), Some("TW"));
        assert_eq!(l.to_string(), "zh-Hant-TW");

        assert_eq!(loc("es-419").region(), Some("419"));
        assert!(loc("*").is_wildcard());
    }

    #[test]
    fn rejects_malformed_tags() {
        assert_eq!("".parse::<Locale>(), Err(LocaleError::Empty));
        assert!("english".parse::<Locale>().is_err());
        assert!("en-US-extra".parse::<Locale>().is_err());
        assert!("e1".parse::<Locale>().is_err());
    }

    #[test]
    fn shard_locale_matching() {
        let text = vec![loc("de-CH")];
        assert!(is_locale_supported(&[], &text));
        assert!(is_locale_supported(&[], &[]));
        assert!(is_locale_supported(&[loc("de")], &text));
        assert!(is_locale_supported(&[loc("*")], &text));
        assert!(is_locale_supported(&[loc("en"), loc("de-CH")], &text));
        assert!(!is_locale_supported(&[loc("de-DE")], &text));
        assert!(!is_locale_supported(&[loc("en")], &text));
        assert!(!is_locale_supported(&[loc("en")], &[]));
    }

    #[test]
    fn parses_lists() {
        let list = Locale::parse_list("en, de-CH,,fr").unwrap();
        assert_eq!(list.len(), 3);
        assert_eq!(list[1], loc("de-CH"));
    }
}

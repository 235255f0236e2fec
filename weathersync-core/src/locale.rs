use std::fmt;

/// Language and country of the user, used to pick provider language codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locale {
    language: String,
    country: String,
}

impl Default for Locale {
    fn default() -> Self {
        Self {
            language: "en".into(),
            country: "US".into(),
        }
    }
}

impl Locale {
    /// Parse tags such as `de-DE`, `pt_BR.UTF-8` or `fr`.
    /// Returns `None` for `C`, `POSIX` and empty values.
    pub fn parse(tag: &str) -> Option<Self> {
        let tag = tag.split(['.', '@']).next()?.trim();
        if tag.is_empty() || tag.eq_ignore_ascii_case("c") || tag.eq_ignore_ascii_case("posix") {
            return None;
        }

        let mut parts = tag.split(['-', '_']);
        let language = parts.next()?.to_ascii_lowercase();
        if language.len() < 2 || !language.chars().all(|c| c.is_ascii_alphabetic()) {
            return None;
        }
        let country = parts.next().unwrap_or_default().to_ascii_uppercase();

        Some(Self { language, country })
    }

    /// Locale from `LC_ALL`, `LC_MESSAGES` or `LANG`, in that order.
    pub fn from_env() -> Self {
        ["LC_ALL", "LC_MESSAGES", "LANG"]
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .find_map(|value| Self::parse(&value))
            .unwrap_or_default()
    }

    /// Locale from an explicit setting, falling back to the environment.
    pub fn resolve(setting: Option<&str>) -> Self {
        setting
            .and_then(Self::parse)
            .unwrap_or_else(Self::from_env)
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn country(&self) -> &str {
        &self.country
    }

    /// `language-COUNTRY`, or just the language when no country is known.
    pub fn tag(&self) -> String {
        if self.country.is_empty() {
            self.language.clone()
        } else {
            format!("{}-{}", self.language, self.country)
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_posix_and_bcp47_forms() {
        let de = Locale::parse("de_DE.UTF-8").unwrap();
        assert_eq!(de.language(), "de");
        assert_eq!(de.country(), "DE");
        assert_eq!(de.tag(), "de-DE");

        let zh = Locale::parse("zh-tw").unwrap();
        assert_eq!(zh.tag(), "zh-TW");

        let fr = Locale::parse("fr").unwrap();
        assert_eq!(fr.tag(), "fr");
    }

    #[test]
    fn rejects_neutral_locales() {
        assert_eq!(Locale::parse("C"), None);
        assert_eq!(Locale::parse("POSIX"), None);
        assert_eq!(Locale::parse(""), None);
    }

    #[test]
    fn explicit_setting_wins() {
        let locale = Locale::resolve(Some("uk-UA"));
        assert_eq!(locale.language(), "uk");
    }
}

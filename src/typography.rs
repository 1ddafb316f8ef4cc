//! French typographic spacing for rendered text.
use once_cell::sync::Lazy;
use regex::Regex;

pub const NBSP: char = '\u{00A0}';
pub const NNBSP: char = '\u{202F}';

static BEFORE_COLON: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s\u{00A0}\u{202F}]:").unwrap());
static BEFORE_TALL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\s\u{00A0}\u{202F}]([;?!])").unwrap());
static BEFORE_PERCENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s\u{00A0}\u{202F}]%").unwrap());
static AFTER_OPEN_QUOTE: Lazy<Regex> = Lazy::new(|| Regex::new(r"«[\s\u{00A0}\u{202F}]?").unwrap());
static BEFORE_CLOSE_QUOTE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\s\u{00A0}\u{202F}]?»").unwrap());

/// Apply French non-breaking space rules.
///
/// Existing spaces before `:` and `%` become NBSP, before `;` `?` `!` they
/// become NNBSP. Guillemets always get an NBSP on their inner side, inserted
/// when missing. Only existing spaces are converted for `:;?!%` so URLs and
/// times are left alone. Applying it twice changes nothing.
pub fn apply_french_typography(text: &str) -> String {
    let text = BEFORE_COLON.replace_all(text, format!("{NBSP}:").as_str());
    let text = BEFORE_TALL.replace_all(&text, format!("{NNBSP}${{1}}").as_str());
    let text = BEFORE_PERCENT.replace_all(&text, format!("{NBSP}%").as_str());
    let text = AFTER_OPEN_QUOTE.replace_all(&text, format!("«{NBSP}").as_str());
    let text = BEFORE_CLOSE_QUOTE.replace_all(&text, format!("{NBSP}»").as_str());
    text.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_existing_spaces() {
        assert_eq!(
            apply_french_typography("Note : 50 % ; vraiment ? oui !"),
            "Note\u{a0}: 50\u{a0}%\u{202f}; vraiment\u{202f}? oui\u{202f}!"
        );
    }

    #[test]
    fn leaves_urls_and_times_alone() {
        let s = "https://example.org à 12:30";
        assert_eq!(apply_french_typography(s), s);
    }

    #[test]
    fn guillemets_get_inner_spaces() {
        assert_eq!(apply_french_typography("«Bonjour»"), "«\u{a0}Bonjour\u{a0}»");
        assert_eq!(apply_french_typography("« Bonjour »"), "«\u{a0}Bonjour\u{a0}»");
    }

    #[test]
    fn idempotent() {
        let once = apply_french_typography("« Quoi ? » : 10 % !");
        assert_eq!(apply_french_typography(&once), once);
    }
}

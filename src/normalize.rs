use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Boilerplate removal patterns, applied in order. Unmatched
    /// patterns are a no-op, never an error.
    static ref BOILERPLATE_PATTERNS: Vec<Regex> = vec![
        Regex::new(
            r"Welcome to the Fox News Politics newsletter, with the latest updates.*?\.\.\."
        )
        .unwrap(),
        Regex::new(
            r"Fox News Flash top headlines are here\. Check out what's clicking on Foxnews\.com\."
        )
        .unwrap(),
        Regex::new(
            r"A version of this story appeared in CNN’s What Matters newsletter\. To get it in your inbox, sign up for free here\."
        )
        .unwrap(),
        Regex::new(r"(?m)^[A-Za-z\s]+ joins '[A-Za-z\s&]+' to discuss.*?\.").unwrap(),
        Regex::new(r"(?m)^[A-Za-z\s]+ told Fox News Digital.*?\.").unwrap(),
    ];
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// Strips known boilerplate phrases (newsletter footers, syndicated
/// intros, attribution lines) and collapses whitespace. Collapsing can
/// expose a new match (a phrase straddling a line break only matches
/// once its newline becomes a space), so strip-and-collapse repeats
/// until the text stops changing. Idempotent:
/// `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(text: &str) -> String {
    let mut current = collapse(text);
    loop {
        let mut stripped = current.clone();
        for pattern in BOILERPLATE_PATTERNS.iter() {
            stripped = pattern.replace_all(&stripped, "").into_owned();
        }
        let next = collapse(&stripped);
        if next == current {
            return next;
        }
        current = next;
    }
}

fn collapse(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_newsletter_footer() {
        let text = "Real reporting here. Fox News Flash top headlines are here. Check out what's clicking on Foxnews.com.";
        assert_eq!(normalize(text), "Real reporting here.");
    }

    #[test]
    fn test_collapses_whitespace() {
        assert_eq!(normalize("a   b\n\n  c\t d"), "a b c d");
    }

    #[test]
    fn test_unmatched_patterns_are_noop() {
        let text = "An article with no boilerplate at all.";
        assert_eq!(normalize(text), text);
    }

    #[test]
    fn test_strips_pattern_straddling_a_line_break() {
        // The attribution line only matches after its newline collapses.
        let text = "John Smith told Fox News\nDigital the vote was close.";
        assert_eq!(normalize(text), "");
    }

    #[test]
    fn test_idempotent() {
        let samples = [
            "Welcome to the Fox News Politics newsletter, with the latest updates on the budget...and more.",
            "Plain   text \n with   noise.",
            "John Smith told Fox News\nDigital the vote was close.",
            "Jane Doe joins 'Fox\n& Friends' to discuss the ruling.",
            "",
        ];
        for sample in samples {
            let once = normalize(sample);
            assert_eq!(normalize(&once), once);
        }
    }
}

use regex::{Regex, RegexBuilder};

/// Case-insensitive matcher for the dashboard search term, treated literally.
///
/// Mirrors the list filter: a blank term highlights nothing, any other term is
/// matched as typed (surrounding spaces included).
pub fn search_highlighter(term: &str) -> Option<Regex> {
    if term.trim().is_empty() {
        return None;
    }
    RegexBuilder::new(&regex::escape(term))
        .case_insensitive(true)
        .build()
        .ok()
}

/// Splits `text` into runs, flagging the ones that matched.
pub fn split_matches<'t>(text: &'t str, regex: Option<&Regex>) -> Vec<(&'t str, bool)> {
    let Some(re) = regex else {
        return vec![(text, false)];
    };
    let mut runs = Vec::new();
    let mut last = 0;
    for mat in re.find_iter(text) {
        if mat.start() > last {
            runs.push((&text[last..mat.start()], false));
        }
        runs.push((mat.as_str(), true));
        last = mat.end();
    }
    if last < text.len() || runs.is_empty() {
        runs.push((&text[last..], false));
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_terms_highlight_nothing() {
        assert!(search_highlighter("").is_none());
        assert!(search_highlighter("   ").is_none());
    }

    #[test]
    fn terms_are_literal_and_case_insensitive() {
        let regex = search_highlighter("a.b").expect("regex");
        assert!(regex.is_match("xA.By"));
        assert!(!regex.is_match("axb"));
    }

    #[test]
    fn splits_around_every_match() {
        let regex = search_highlighter("milk").expect("regex");
        assert_eq!(
            split_matches("Milk and more milk!", Some(&regex)),
            vec![("Milk", true), (" and more ", false), ("milk", true), ("!", false)]
        );
        assert_eq!(split_matches("bread", Some(&regex)), vec![("bread", false)]);
        assert_eq!(split_matches("", None), vec![("", false)]);
    }
}

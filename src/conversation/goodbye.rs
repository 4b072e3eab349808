use regex::Regex;
use std::sync::LazyLock;

static GOODBYE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?-u:\b)(bye|goodbye|exit|quit|see you|farewell)(?-u:\b)")
        .expect("goodbye pattern is a valid regex")
});

/// True when `text` contains a session-ending phrase as a whole word.
/// Word boundaries are ASCII: accented letters do not join a word.
pub fn is_goodbye(text: &str) -> bool {
    GOODBYE.is_match(text)
}

//! Speakable text cleanup
//!
//! Chat replies often carry stage directions such as `*laughs*` or
//! `(whispering)`. Synthesis would read them aloud, so they are removed
//! before any text reaches the TTS collaborator.

use std::sync::LazyLock;

use regex::Regex;

/// `*...*`, `(...)` and `[...]` spans without nesting
static DIRECTIONS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\*[^*]*\*|\([^()]*\)|\[[^\[\]]*\]").expect("valid regex")
});

/// Inline descriptions of non-verbal behavior
static ACTIONS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:laugh(?:s|ing|ed)?|chuckl(?:e|es|ing|ed)|giggl(?:e|es|ing|ed)|sigh(?:s|ing|ed)?|whisper(?:s|ing|ed)|gasp(?:s|ing|ed)?|sob(?:s|bing|bed)|sniff(?:s|les|ling)|clears? (?:her|his|my) throat|smirk(?:s|ing)|grin(?:s|ning))\b",
    )
    .expect("valid regex")
});

/// Laughter spelled out as words
static LAUGHTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:ha(?:ha)+h?|he(?:he)+|hah|lol)\b[!.,]?").expect("valid regex")
});

static SPACE_BEFORE_PUNCT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+([,.!?;:])").expect("valid regex"));

static REPEATED_PUNCT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([,;:])(?:\s*[,;:])+").expect("valid regex"));

static LEADING_PUNCT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\s,;:.!?]+").expect("valid regex"));

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Sanitizer options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SanitizeOptions {
    /// Replace each removed span with a single space rather than nothing
    pub keep_pauses: bool,
}

/// Strip stage directions and non-speakable tokens from `text`
#[must_use]
pub fn sanitize(text: &str, options: SanitizeOptions) -> String {
    let filler = if options.keep_pauses { " " } else { "" };

    // Nested spans peel from the inside out
    let mut out = text.to_string();
    loop {
        let next = DIRECTIONS.replace_all(&out, filler).into_owned();
        if next == out {
            break;
        }
        out = next;
    }

    // Unbalanced asterisks never make it to synthesis
    out = out.replace('*', filler);
    out = ACTIONS.replace_all(&out, filler).into_owned();
    out = LAUGHTER.replace_all(&out, filler).into_owned();

    out = WHITESPACE.replace_all(&out, " ").into_owned();
    out = SPACE_BEFORE_PUNCT.replace_all(&out, "$1").into_owned();
    out = REPEATED_PUNCT.replace_all(&out, "$1").into_owned();
    out = LEADING_PUNCT.replace(&out, "").into_owned();

    out.trim().to_string()
}

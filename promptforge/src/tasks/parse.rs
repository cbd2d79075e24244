//! Response parsers for generated text.

const THINK_OPEN: &str = "<think>";
const THINK_CLOSE: &str = "</think>";

/// Line prefixes that mark reasoning chatter rather than an answer.
const SKIPPED_PREFIXES: [&str; 3] = ["<", "思考", "接下来"];

/// Answer labels some models put in front of the description.
const LABELS: [&str; 3] = ["描述：", "输出：", "答案："];

/// Shortest acceptable description, in characters.
pub const MIN_LINE_CHARS: usize = 5;

/// Longest acceptable description, in characters.
pub const MAX_LINE_CHARS: usize = 60;

/// Most variants kept from one augment response.
pub const MAX_VARIANTS: usize = 2;

/// Removes `<think>...</think>` spans and any unterminated `<think>` tail.
#[must_use]
pub fn strip_reasoning(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(THINK_OPEN) {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + THINK_OPEN.len()..];
        match after_open.find(THINK_CLOSE) {
            Some(end) => rest = &after_open[end + THINK_CLOSE.len()..],
            None => return out,
        }
    }
    out.push_str(rest);
    out
}

/// Strips surrounding quotes and a leading answer label.
fn clean_line(line: &str) -> &str {
    let mut line = line.trim();
    for label in LABELS {
        if let Some(stripped) = line.strip_prefix(label) {
            line = stripped.trim();
            break;
        }
    }
    line.trim_matches(|c| matches!(c, '"' | '\'' | '“' | '”' | '‘' | '’' | '「' | '」'))
        .trim()
}

/// Picks the first line of a local-model response that looks like a
/// description.
///
/// Returns `None` when nothing survives the filters.
#[must_use]
pub fn first_acceptable_line(text: &str) -> Option<String> {
    let stripped = strip_reasoning(text);
    stripped
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !SKIPPED_PREFIXES.iter().any(|p| line.starts_with(p)))
        .map(clean_line)
        .find(|line| (MIN_LINE_CHARS..=MAX_LINE_CHARS).contains(&line.chars().count()))
        .map(str::to_string)
}

/// Splits an augment response into at most [`MAX_VARIANTS`] variants.
#[must_use]
pub fn split_variants(text: &str) -> Vec<String> {
    strip_reasoning(text)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(MAX_VARIANTS)
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_strip_reasoning_spans_and_tail() {
        assert_eq!(strip_reasoning("a<think>x</think>b"), "ab");
        assert_eq!(strip_reasoning("<think>one</think>mid<think>two</think>end"), "midend");
        assert_eq!(strip_reasoning("keep<think>never closed"), "keep");
        assert_eq!(strip_reasoning("plain"), "plain");
    }

    #[test]
    fn test_first_acceptable_line_skips_chatter() {
        let raw = "<think>用户想要描述</think>\n思考一下\n接下来输出\n描述：“霓虹街头的赛博朋克女孩”\n多余";
        assert_eq!(
            first_acceptable_line(raw).as_deref(),
            Some("霓虹街头的赛博朋克女孩")
        );
    }

    #[test]
    fn test_first_acceptable_line_length_window() {
        assert_eq!(first_acceptable_line("猫\n咖啡馆里看书的文艺女生").as_deref(), Some("咖啡馆里看书的文艺女生"));
        let long = "长".repeat(61);
        assert_eq!(first_acceptable_line(&long), None);
        assert_eq!(first_acceptable_line("<think>only reasoning"), None);
        assert_eq!(first_acceptable_line(""), None);
    }

    #[test]
    fn test_split_variants_caps_and_trims() {
        assert_eq!(
            split_variants("  霓虹夜色中的少女 \n\n都市夜景赛博女孩\n第三个"),
            vec!["霓虹夜色中的少女".to_string(), "都市夜景赛博女孩".to_string()]
        );
        assert!(split_variants(" \n ").is_empty());
    }
}

use std::sync::OnceLock;

use regex::Regex;

/// Characters that must not survive in an extracted ID.
const REJECTED: &[char] = &['?', '&', '/', '<', '%', '='];

/// Characters that mark the input as something other than a bare ID.
const URL_MARKERS: &[char] = &['"', '?', '&', '/', '<', '%', '='];

const MIN_ID_LEN: usize = 10;

fn id_patterns() -> &'static [Regex; 3] {
    static PATTERNS: OnceLock<[Regex; 3]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r#"(?:v|embed|watch\?v)(?:=|/)([^"&?/=%]{11})"#,
            r#"(?:=|/)([^"&?/=%]{11})"#,
            r#"([^"&?/=%]{11})"#,
        ]
        .map(|p| Regex::new(p).expect("video id pattern should compile"))
    })
}

/// Normalize a watch URL, embed URL, short link or bare token to an
/// 11-character broadcast ID. Returns an empty string when nothing usable
/// is found.
///
/// Patterns are applied in order, each one against the output of the
/// previous successful match.
pub fn extract_video_id(input: &str) -> String {
    let mut id = input.to_string();

    if id.contains("youtu") || id.contains(URL_MARKERS) {
        for re in id_patterns() {
            if let Some(m) = re.captures(&id).and_then(|caps| caps.get(1)) {
                id = m.as_str().to_string();
            }
        }
    }

    if id.contains(REJECTED) || id.len() < MIN_ID_LEN {
        return String::new();
    }

    id
}

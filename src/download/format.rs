//! Candidate stream selection.

use super::MediaCandidate;

/// Preferred format used when none is configured.
pub const DEFAULT_PREFERRED_FORMAT: &str = "mp4";

/// Containers recognized when deriving a file extension from a format tag.
const KNOWN_EXTENSIONS: [&str; 7] = ["mp4", "webm", "mkv", "mov", "flv", "m4a", "mp3"];

/// Picks the candidate whose format tag contains `preferred` (case-insensitive).
///
/// Falls back to the first candidate in list order when nothing matches.
/// Returns `None` only for an empty list.
#[must_use]
pub fn select_format<'a>(
    candidates: &'a [MediaCandidate],
    preferred: &str,
) -> Option<&'a MediaCandidate> {
    let preferred = preferred.trim().to_lowercase();
    if !preferred.is_empty()
        && let Some(matched) = candidates
            .iter()
            .find(|c| c.format_tag.to_lowercase().contains(&preferred))
    {
        return Some(matched);
    }
    candidates.first()
}

/// Derives a file extension (without dot) from a free-form format tag.
///
/// `"video/webm"` gives `webm`; unrecognized tags give `mp4`.
#[must_use]
pub fn extension_for_format(format_tag: &str) -> &'static str {
    let tag = format_tag.to_lowercase();
    KNOWN_EXTENSIONS
        .iter()
        .find(|ext| tag.contains(*ext))
        .copied()
        .unwrap_or(DEFAULT_PREFERRED_FORMAT)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn candidate(tag: &str) -> MediaCandidate {
        MediaCandidate::new(tag, format!("https://cdn.example.com/{tag}"), "")
    }

    #[test]
    fn test_select_format_prefers_mp4_over_earlier_webm() {
        let candidates = vec![candidate("webm"), candidate("mp4")];
        assert_eq!(select_format(&candidates, "mp4").unwrap().format_tag, "mp4");
    }

    #[test]
    fn test_select_format_falls_back_to_first() {
        let candidates = vec![candidate("webm")];
        assert_eq!(select_format(&candidates, "mp4").unwrap().format_tag, "webm");

        let candidates = vec![candidate("flv"), candidate("webm")];
        assert_eq!(select_format(&candidates, "mp4").unwrap().format_tag, "flv");
    }

    #[test]
    fn test_select_format_case_insensitive_substring() {
        let candidates = vec![candidate("audio/m4a"), candidate("VIDEO/MP4; codecs=avc1")];
        assert_eq!(
            select_format(&candidates, "Mp4").unwrap().format_tag,
            "VIDEO/MP4; codecs=avc1"
        );
    }

    #[test]
    fn test_select_format_first_match_wins() {
        let candidates = vec![candidate("mp4-720"), candidate("mp4-1080")];
        assert_eq!(
            select_format(&candidates, "mp4").unwrap().format_tag,
            "mp4-720"
        );
    }

    #[test]
    fn test_select_format_blank_preference_uses_first() {
        let candidates = vec![candidate("webm"), candidate("mp4")];
        assert_eq!(select_format(&candidates, "  ").unwrap().format_tag, "webm");
    }

    #[test]
    fn test_select_format_empty_list_is_none() {
        assert!(select_format(&[], "mp4").is_none());
    }

    #[test]
    fn test_extension_for_format() {
        assert_eq!(extension_for_format("mp4"), "mp4");
        assert_eq!(extension_for_format("video/webm"), "webm");
        assert_eq!(extension_for_format("MKV"), "mkv");
        assert_eq!(extension_for_format("dash"), "mp4");
        assert_eq!(extension_for_format(""), "mp4");
    }
}

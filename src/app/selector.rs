//! Candidate selection
//!
//! Picks the single best search result for a track. The policy is a fixed
//! heuristic evaluated in order, first match wins:
//!
//! 1. candidates without a known duration are dropped
//! 2. candidates whose title contains a denylisted word are dropped
//! 3. the first remaining candidate that looks official and has a plausible
//!    duration is returned
//! 4. otherwise the first remaining candidate with a plausible duration
//! 5. otherwise the first candidate of the unfiltered input
//!
//! Only an empty input fails.

use crate::app::models::Candidate;
use crate::constants::selector::{
    DENYLIST, DURATION_TOLERANCE_SECS, OFFICIAL_TITLE_KEYWORDS, OFFICIAL_UPLOADER_KEYWORDS,
};
use crate::errors::SelectionError;

/// Choose the best candidate for a track
///
/// # Arguments
///
/// * `candidates` - Search results in provider relevance order
/// * `expected_duration` - Expected track length in seconds, if known
///
/// # Errors
///
/// Returns `SelectionError::EmptyInput` when `candidates` is empty
pub fn select_best(
    candidates: &[Candidate],
    expected_duration: Option<f64>,
) -> Result<&Candidate, SelectionError> {
    let first = candidates.first().ok_or(SelectionError::EmptyInput)?;

    let mut fallback: Option<&Candidate> = None;

    for candidate in candidates {
        let Some(duration) = known_duration(candidate) else {
            continue;
        };

        let title = candidate.title.to_lowercase();
        if DENYLIST.iter().any(|word| title.contains(word)) {
            continue;
        }

        let plausible = is_duration_plausible(duration, expected_duration);
        if plausible && is_official(&title, &candidate.uploader.to_lowercase()) {
            return Ok(candidate);
        }

        if plausible && fallback.is_none() {
            fallback = Some(candidate);
        }
    }

    Ok(fallback.unwrap_or(first))
}

/// True if `duration` is within tolerance of `expected` (or nothing is expected)
pub fn is_duration_plausible(duration: f64, expected: Option<f64>) -> bool {
    match expected {
        None => true,
        Some(expected) => (duration - expected).abs() <= DURATION_TOLERANCE_SECS,
    }
}

// A zero duration counts as unknown; providers report 0 for streams and
// unprocessed uploads.
fn known_duration(candidate: &Candidate) -> Option<f64> {
    candidate.duration_seconds.filter(|d| *d > 0.0)
}

fn is_official(title: &str, uploader: &str) -> bool {
    OFFICIAL_TITLE_KEYWORDS.iter().any(|kw| title.contains(kw))
        || OFFICIAL_UPLOADER_KEYWORDS.iter().any(|kw| uploader.contains(kw))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, title: &str, uploader: &str, duration: Option<f64>) -> Candidate {
        Candidate::new(id, title, uploader, duration)
    }

    #[test]
    fn test_empty_input_fails() {
        assert_eq!(select_best(&[], Some(200.0)), Err(SelectionError::EmptyInput));
    }

    #[test]
    fn test_official_plausible_wins_over_earlier_fallback() {
        let candidates = vec![
            candidate("a", "Song", "someone", Some(200.0)),
            candidate("b", "Song (Official Audio)", "someone", Some(201.0)),
        ];
        assert_eq!(select_best(&candidates, Some(200.0)).unwrap().id, "b");
    }

    #[test]
    fn test_uploader_makes_candidate_official() {
        let candidates = vec![
            candidate("a", "Song", "random", Some(200.0)),
            candidate("b", "Song", "Artist - Topic", Some(200.0)),
            candidate("c", "Song", "ArtistVEVO", Some(200.0)),
        ];
        assert_eq!(select_best(&candidates, Some(200.0)).unwrap().id, "b");
    }

    #[test]
    fn test_denylist_is_case_insensitive() {
        let candidates = vec![
            candidate("a", "Song (LIVE at Wembley) Official Video", "vevo", Some(200.0)),
            candidate("b", "Song - Sped Up", "topic", Some(200.0)),
            candidate("c", "Song official", "x", Some(200.0)),
        ];
        assert_eq!(select_best(&candidates, Some(200.0)).unwrap().id, "c");
    }

    #[test]
    fn test_official_with_bad_duration_falls_back_to_plausible() {
        let candidates = vec![
            candidate("a", "Song (Official Video)", "x", Some(260.0)),
            candidate("b", "Song", "x", Some(199.0)),
            candidate("c", "Song", "x", Some(200.0)),
        ];
        assert_eq!(select_best(&candidates, Some(200.0)).unwrap().id, "b");
    }

    #[test]
    fn test_nothing_plausible_returns_first_input() {
        let candidates = vec![
            candidate("a", "Song (Live)", "x", Some(200.0)),
            candidate("b", "Song", "x", Some(500.0)),
        ];
        assert_eq!(select_best(&candidates, Some(200.0)).unwrap().id, "a");
    }

    #[test]
    fn test_all_durations_unknown_returns_first_input() {
        let candidates = vec![
            candidate("a", "Song (Official)", "vevo", None),
            candidate("b", "Song", "x", Some(0.0)),
            candidate("c", "Song", "x", None),
        ];
        assert_eq!(select_best(&candidates, Some(200.0)).unwrap().id, "a");
        assert_eq!(select_best(&candidates, None).unwrap().id, "a");
    }

    #[test]
    fn test_no_expected_duration_accepts_any_known_duration() {
        let candidates = vec![
            candidate("a", "Song", "x", None),
            candidate("b", "Song", "x", Some(1000.0)),
            candidate("c", "Song Official", "x", Some(10.0)),
        ];
        assert_eq!(select_best(&candidates, None).unwrap().id, "c");
    }

    #[test]
    fn test_duration_tolerance_boundary() {
        assert!(is_duration_plausible(203.0, Some(200.0)));
        assert!(is_duration_plausible(197.0, Some(200.0)));
        assert!(!is_duration_plausible(203.01, Some(200.0)));
        assert!(is_duration_plausible(5.0, None));
    }

    #[test]
    fn test_surviving_plausible_candidate_is_returned_when_one_exists() {
        // Whenever a filtered, duration-plausible candidate exists the
        // result must itself be duration-plausible.
        let sets = vec![
            vec![
                candidate("a", "Song cover", "x", Some(200.0)),
                candidate("b", "Song", "x", Some(150.0)),
                candidate("c", "Song", "x", Some(202.5)),
            ],
            vec![
                candidate("a", "Song", "x", None),
                candidate("b", "Song video", "x", Some(400.0)),
                candidate("c", "Song", "vevo", Some(198.0)),
            ],
        ];
        for set in sets {
            let chosen = select_best(&set, Some(200.0)).unwrap();
            assert!(is_duration_plausible(chosen.duration_seconds.unwrap(), Some(200.0)));
        }
    }
}

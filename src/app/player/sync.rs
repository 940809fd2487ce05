use super::super::episode::TranscriptSegment;

/// Index of the segment playing at `position`, if any.
///
/// The first segment with `start <= position <= end` wins, except that when
/// `position` sits exactly on the boundary shared with the following segment,
/// the later segment is preferred.
pub(crate) fn active_segment_index(segments: &[TranscriptSegment], position: f64) -> Option<usize> {
    if !position.is_finite() {
        return None;
    }
    let idx = segments.iter().position(|segment| segment.contains(position))?;
    let on_shared_boundary = segments[idx].end == position
        && segments
            .get(idx + 1)
            .is_some_and(|next| next.contains(position));
    if on_shared_boundary {
        Some(idx + 1)
    } else {
        Some(idx)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ScrollRequest {
    pub(crate) segment_index: usize,
}

/// Tracks the active segment across position ticks and asks for a scroll only
/// when playback enters a different segment.
#[derive(Debug, Default)]
pub(crate) struct TranscriptFollower {
    active: Option<usize>,
}

impl TranscriptFollower {
    pub(crate) fn active(&self) -> Option<usize> {
        self.active
    }

    pub(crate) fn update(
        &mut self,
        segments: &[TranscriptSegment],
        position: f64,
    ) -> Option<ScrollRequest> {
        let next = active_segment_index(segments, position);
        if next == self.active {
            return None;
        }
        self.active = next;
        next.map(|segment_index| ScrollRequest { segment_index })
    }

    pub(crate) fn reset(&mut self) {
        self.active = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<TranscriptSegment> {
        vec![
            TranscriptSegment::new(0.0, 5.0, "a"),
            TranscriptSegment::new(5.0, 10.0, "b"),
            TranscriptSegment::new(12.0, 15.0, "c"),
        ]
    }

    fn active_text(segments: &[TranscriptSegment], position: f64) -> Option<&str> {
        active_segment_index(segments, position).map(|idx| segments[idx].text.as_str())
    }

    #[test]
    fn selects_segment_containing_position() {
        let segments = sample();
        assert_eq!(active_text(&segments, 3.0), Some("a"));
        assert_eq!(active_text(&segments, 0.0), Some("a"));
        assert_eq!(active_text(&segments, 13.5), Some("c"));
        assert_eq!(active_text(&segments, 15.0), Some("c"));
    }

    #[test]
    fn shared_boundary_belongs_to_later_segment() {
        assert_eq!(active_text(&sample(), 5.0), Some("b"));
    }

    #[test]
    fn gaps_and_out_of_range_positions_have_no_active_segment() {
        let segments = sample();
        assert_eq!(active_text(&segments, 11.0), None);
        assert_eq!(active_text(&segments, 20.0), None);
        assert_eq!(active_text(&segments, -1.0), None);
        assert_eq!(active_text(&segments, f64::NAN), None);
        assert_eq!(active_text(&[], 1.0), None);
    }

    #[test]
    fn overlapping_segments_prefer_first_match() {
        let segments = vec![
            TranscriptSegment::new(0.0, 6.0, "first"),
            TranscriptSegment::new(4.0, 8.0, "second"),
        ];
        assert_eq!(active_text(&segments, 5.0), Some("first"));
    }

    #[test]
    fn follower_scrolls_once_per_segment_entry() {
        let segments = sample();
        let mut follower = TranscriptFollower::default();
        let requests: Vec<ScrollRequest> = [0.1, 0.9, 1.7, 2.2, 3.0, 4.9]
            .into_iter()
            .filter_map(|pos| follower.update(&segments, pos))
            .collect();
        assert_eq!(requests, vec![ScrollRequest { segment_index: 0 }]);
        assert_eq!(follower.active(), Some(0));
    }

    #[test]
    fn follower_does_not_scroll_into_gaps_but_rescrolls_after_them() {
        let segments = sample();
        let mut follower = TranscriptFollower::default();
        assert!(follower.update(&segments, 9.0).is_some());
        assert!(follower.update(&segments, 11.0).is_none());
        assert_eq!(follower.active(), None);
        assert_eq!(
            follower.update(&segments, 12.5),
            Some(ScrollRequest { segment_index: 2 })
        );
    }

    #[test]
    fn reset_forgets_the_active_segment() {
        let segments = sample();
        let mut follower = TranscriptFollower::default();
        follower.update(&segments, 1.0);
        follower.reset();
        assert_eq!(
            follower.update(&segments, 1.0),
            Some(ScrollRequest { segment_index: 0 })
        );
    }
}

//! Local peak and valley detection for chart annotations.
//!
//! Uses a strict three-point comparison over interior samples. The first and
//! last samples are never candidates, and plateaus (two equal neighbouring
//! heights) are never flagged.

/// Whether an extremum is a high or a low.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExtremumKind {
    Peak,
    Valley,
}

/// A local extremum at `index` into the height sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Extremum {
    pub index: usize,
    pub kind: ExtremumKind,
}

/// Find strict local maxima and minima in `heights`.
///
/// ```
/// use tide_panel::extrema::{find_extrema, ExtremumKind};
///
/// let found = find_extrema(&[1.0, 3.0, 2.0]);
/// assert_eq!(found.len(), 1);
/// assert_eq!(found[0].index, 1);
/// assert_eq!(found[0].kind, ExtremumKind::Peak);
/// ```
pub fn find_extrema(heights: &[f64]) -> Vec<Extremum> {
    heights
        .windows(3)
        .enumerate()
        .filter_map(|(offset, w)| {
            let kind = if w[0] < w[1] && w[1] > w[2] {
                ExtremumKind::Peak
            } else if w[0] > w[1] && w[1] < w[2] {
                ExtremumKind::Valley
            } else {
                return None;
            };
            Some(Extremum {
                index: offset + 1,
                kind,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_single_peak_and_valley() {
        let found = find_extrema(&[1.0, 2.0, 3.0, 2.0, 1.0, 2.0, 3.0]);
        assert_eq!(
            found,
            vec![
                Extremum {
                    index: 2,
                    kind: ExtremumKind::Peak
                },
                Extremum {
                    index: 4,
                    kind: ExtremumKind::Valley
                },
            ]
        );
        // The trailing 3.0 is a boundary sample and never a candidate
        assert!(found.iter().all(|e| e.index != 6));
    }

    #[test]
    fn plateaus_are_not_extrema() {
        assert!(find_extrema(&[1.0, 3.0, 3.0, 1.0]).is_empty());
        assert!(find_extrema(&[2.0, 2.0, 2.0]).is_empty());
    }

    #[test]
    fn short_sequences_have_no_extrema() {
        assert!(find_extrema(&[]).is_empty());
        assert!(find_extrema(&[1.0]).is_empty());
        assert!(find_extrema(&[1.0, 5.0]).is_empty());
    }

    #[test]
    fn semidiurnal_day_has_alternating_extrema() {
        let heights: Vec<f64> = (0..25)
            .map(|h| 5.0 + 4.5 * (h as f64 * std::f64::consts::TAU / 12.42).sin())
            .collect();
        let found = find_extrema(&heights);
        assert!(found.len() >= 3);
        for pair in found.windows(2) {
            assert_ne!(pair[0].kind, pair[1].kind);
        }
    }
}

use crate::stubs::{AlctStub, ClctStub, LctSource};

/// Quality of an LCT that no valid input contributed to.
pub const INVALID_QUALITY: u8 = 0;

/// Cathode pattern ids the multi-layer decision table recognizes.
pub fn known_pattern(pattern: u8) -> bool {
    (2..=10).contains(&pattern)
}

/// How the "anode high quality" bit is computed in the [`QualityScheme::Run2`]
/// table.
///
/// Inner chambers require anode quality >= 1 unconditionally. The
/// pad-augmented region accepts any anode quality when at least one
/// auxiliary layer corroborates the match; the two rules are kept as
/// distinct named variants because the hardware implements them separately.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnodeRule {
    Strict,
    PadRelaxed,
}

/// Selectable quality-assignment strategy.
///
/// The three strategies are independent; a motherboard is configured with
/// exactly one of them for the lifetime of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QualityScheme {
    /// The full per-pattern decision table.
    Run2 { anode_rule: AnodeRule },
    /// Coarse {Low, Medium, High} buckets from per-side layer counts,
    /// used in the compact trigger-primitive mode.
    Run3Compact,
    /// Ranks by which detector combination produced the match.
    SourceRanked,
}

impl Default for QualityScheme {
    fn default() -> Self {
        QualityScheme::Run2 {
            anode_rule: AnodeRule::Strict,
        }
    }
}

/// Coarse quality buckets of the compact trigger-primitive mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Run3Quality {
    Invalid = 0,
    Low = 1,
    Medium = 2,
    High = 3,
}

// Layer-count thresholds of the compact mode. An anode stub's quality code
// encodes (layers - 3); a cathode stub's quality code is its layer count.
const HIGH_LAYERS: u8 = 5;
const MEDIUM_LAYERS: u8 = 4;

/// Assign a quality code to the combination `(alct, clct, source)` under the
/// given scheme. Pure and total: every input maps to a code, with
/// [`INVALID_QUALITY`] covering the no-valid-input and anomalous cases.
pub fn assign(scheme: QualityScheme, alct: &AlctStub, clct: &ClctStub, source: LctSource) -> u8 {
    match scheme {
        QualityScheme::Run2 { anode_rule } => run2(anode_rule, alct, clct, source.aux_layers()),
        QualityScheme::Run3Compact => run3_compact(alct, clct) as u8,
        QualityScheme::SourceRanked => source_ranked(source),
    }
}

/// The per-pattern decision table. First matching row wins:
///
/// | anode | cathode | result |
/// |-------|---------|--------|
/// | -     | -       | 0      |
/// | valid | -       | 1      |
/// | -     | valid   | 2      |
/// | valid | pattern 1 | 3    |
/// | valid | valid   | 5..8, 11..15 by the `a4`/`c4` bits |
fn run2(anode_rule: AnodeRule, alct: &AlctStub, clct: &ClctStub, aux_layers: u8) -> u8 {
    match (alct.valid, clct.valid) {
        (false, false) => INVALID_QUALITY,
        (true, false) => 1,
        (false, true) => 2,
        (true, true) => {
            // The layer-OR trigger pattern never reaches the high-quality rows.
            if clct.pattern == 1 {
                return 3;
            }
            let a4 = match anode_rule {
                AnodeRule::Strict => alct.quality >= 1,
                AnodeRule::PadRelaxed => alct.quality >= 1 || aux_layers >= 1,
            };
            let c4 = clct.quality >= 4 || (aux_layers >= 1 && clct.quality >= 3);
            match (a4, c4) {
                (false, false) => 5,
                (true, false) => 6,
                (false, true) => 7,
                (true, true) => {
                    if alct.accelerator {
                        return 8;
                    }
                    match clct.pattern {
                        2 | 3 => 11,
                        4 | 5 => 12,
                        6 | 7 => 13,
                        8 | 9 => 14,
                        10 => 15,
                        p => {
                            log::warn!("unrecognized cathode pattern id {p}");
                            INVALID_QUALITY
                        }
                    }
                }
            }
        }
    }
}

fn run3_compact(alct: &AlctStub, clct: &ClctStub) -> Run3Quality {
    let anode_layers = if alct.valid { alct.quality + 3 } else { 0 };
    let cathode_layers = if clct.valid { clct.quality } else { 0 };

    if anode_layers == 0 && cathode_layers == 0 {
        Run3Quality::Invalid
    } else if anode_layers >= HIGH_LAYERS || cathode_layers >= HIGH_LAYERS {
        Run3Quality::High
    } else if anode_layers >= MEDIUM_LAYERS || cathode_layers >= MEDIUM_LAYERS {
        Run3Quality::Medium
    } else {
        Run3Quality::Low
    }
}

fn source_ranked(source: LctSource) -> u8 {
    match source {
        LctSource::AlctClctCoPad => 5,
        LctSource::AlctClctPad => 4,
        LctSource::AlctClct => 3,
        LctSource::ClctCoPad => 2,
        LctSource::AlctCoPad => 1,
        _ => INVALID_QUALITY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STRICT: QualityScheme = QualityScheme::Run2 {
        anode_rule: AnodeRule::Strict,
    };
    const RELAXED: QualityScheme = QualityScheme::Run2 {
        anode_rule: AnodeRule::PadRelaxed,
    };

    fn alct(quality: u8) -> AlctStub {
        AlctStub::new(quality, 20, 6)
    }

    fn clct(quality: u8, pattern: u8) -> ClctStub {
        ClctStub::new(quality, 77, pattern, 6)
    }

    #[test]
    fn invalid_iff_no_input() {
        let q = assign(STRICT, &AlctStub::default(), &ClctStub::default(), LctSource::Invalid);
        assert_eq!(q, INVALID_QUALITY);
        assert_ne!(
            assign(STRICT, &alct(0), &ClctStub::default(), LctSource::AlctOnly),
            INVALID_QUALITY
        );
        assert_ne!(
            assign(STRICT, &AlctStub::default(), &clct(3, 5), LctSource::ClctOnly),
            INVALID_QUALITY
        );
    }

    #[test]
    fn single_detector_codes() {
        assert_eq!(assign(STRICT, &alct(3), &ClctStub::default(), LctSource::AlctOnly), 1);
        assert_eq!(assign(STRICT, &AlctStub::default(), &clct(6, 8), LctSource::ClctOnly), 2);
    }

    #[test]
    fn layer_or_pattern() {
        assert_eq!(assign(STRICT, &alct(3), &clct(6, 1), LctSource::AlctClct), 3);
    }

    #[test]
    fn marginal_combinations() {
        assert_eq!(assign(STRICT, &alct(0), &clct(3, 8), LctSource::AlctClct), 5);
        assert_eq!(assign(STRICT, &alct(1), &clct(3, 8), LctSource::AlctClct), 6);
        assert_eq!(assign(STRICT, &alct(0), &clct(4, 8), LctSource::AlctClct), 7);
    }

    #[test]
    fn accelerator_pattern() {
        let halo = alct(1).accelerator();
        assert_eq!(assign(STRICT, &halo, &clct(4, 8), LctSource::AlctClct), 8);
    }

    #[test]
    fn pattern_buckets() {
        for (pattern, expected) in [(2, 11), (3, 11), (4, 12), (5, 12), (6, 13), (7, 13), (8, 14), (9, 14), (10, 15)] {
            assert_eq!(
                assign(STRICT, &alct(1), &clct(4, pattern), LctSource::AlctClct),
                expected,
                "pattern {pattern}"
            );
        }
    }

    #[test]
    fn unknown_pattern_is_anomalous_not_fatal() {
        assert!(!known_pattern(11));
        assert_eq!(assign(STRICT, &alct(1), &clct(4, 11), LctSource::AlctClct), INVALID_QUALITY);
    }

    #[test]
    fn pad_relaxation() {
        // One auxiliary layer lifts a marginal anode into a4 in the relaxed
        // region only.
        assert_eq!(assign(STRICT, &alct(0), &clct(4, 8), LctSource::AlctClctPad), 7);
        assert_eq!(assign(RELAXED, &alct(0), &clct(4, 8), LctSource::AlctClctPad), 14);
        // And a quality-3 cathode into c4 in both.
        assert_eq!(assign(STRICT, &alct(1), &clct(3, 8), LctSource::AlctClctPad), 14);
        assert_eq!(assign(STRICT, &alct(1), &clct(3, 8), LctSource::AlctClct), 6);
    }

    #[test]
    fn run3_buckets() {
        let s = QualityScheme::Run3Compact;
        assert_eq!(
            assign(s, &AlctStub::default(), &ClctStub::default(), LctSource::Invalid),
            Run3Quality::Invalid as u8
        );
        // Anode quality 2 encodes five layers.
        assert_eq!(assign(s, &alct(2), &clct(3, 8), LctSource::AlctClct), Run3Quality::High as u8);
        assert_eq!(assign(s, &alct(0), &clct(4, 8), LctSource::AlctClct), Run3Quality::Medium as u8);
        assert_eq!(assign(s, &alct(0), &clct(3, 8), LctSource::AlctClct), Run3Quality::Low as u8);
        // Either side qualifying is enough.
        assert_eq!(
            assign(s, &AlctStub::default(), &clct(6, 8), LctSource::ClctOnly),
            Run3Quality::High as u8
        );
    }

    #[test]
    fn source_ranking_is_strictly_decreasing() {
        let ranked = [
            LctSource::AlctClctCoPad,
            LctSource::AlctClctPad,
            LctSource::AlctClct,
            LctSource::ClctCoPad,
            LctSource::AlctCoPad,
        ];
        let a = alct(1);
        let c = clct(4, 8);
        let qualities: Vec<u8> = ranked
            .iter()
            .map(|&source| assign(QualityScheme::SourceRanked, &a, &c, source))
            .collect();
        for pair in qualities.windows(2) {
            assert!(pair[0] > pair[1], "{qualities:?}");
        }
        assert_eq!(
            assign(QualityScheme::SourceRanked, &a, &c, LctSource::ClctPad),
            INVALID_QUALITY
        );
    }
}

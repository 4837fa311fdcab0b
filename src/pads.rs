use crate::lut::{distance, RegionLut};
use crate::stubs::{AlctStub, ClctStub, ChamberPart, Parity, CENTRAL_BX, MAX_TIME_BINS};

/// A declustered auxiliary-detector pad candidate.
///
/// `channel` is the detector-channel (eta partition) the cluster sits on,
/// `pad` its local position index. The bunch crossing is relative to the
/// auxiliary detector's own clock, centered at zero; [`Pad::shifted_bx`]
/// moves it onto the stub timeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pad {
    pub channel: u8,
    pub pad: u16,
    pub bx: i32,
}

impl Pad {
    pub fn new(channel: u8, pad: u16, bx: i32) -> Self {
        Self { channel, pad, bx }
    }

    /// The pad's bunch crossing shifted to the common stub reference.
    pub fn shifted_bx(&self) -> i32 {
        self.bx + CENTRAL_BX
    }
}

/// A two-layer coincidence of auxiliary pads.
///
/// Carries both layers' pad indices and channel spans; the spans are kept
/// for position averaging when the coincidence stands in for a missing
/// cathode stub.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CoPad {
    pub channel: u8,
    pub pad: u16,
    pub second_pad: u16,
    pub bx: i32,
    pub layer_spans: [(u16, u16); 2],
}

impl CoPad {
    pub fn new(channel: u8, pad: u16, second_pad: u16, bx: i32) -> Self {
        Self {
            channel,
            pad,
            second_pad,
            bx,
            layer_spans: [(pad, pad), (second_pad, second_pad)],
        }
    }

    /// Attach the declusterer's per-layer cluster spans. `new` seeds them
    /// with the single-pad degenerate spans.
    pub fn with_spans(mut self, first: (u16, u16), second: (u16, u16)) -> Self {
        self.layer_spans = [first, second];
        self
    }

    pub fn shifted_bx(&self) -> i32 {
        self.bx + CENTRAL_BX
    }

    /// Position average over the two layers' cluster spans.
    pub fn mean_pad(&self) -> u16 {
        let mid = |(lo, hi): (u16, u16)| lo + (hi - lo) / 2;
        (mid(self.layer_spans[0]) + mid(self.layer_spans[1])) / 2
    }
}

/// A pad or coincidence-pad candidate, as seen by the correlator.
///
/// The matching routine is written once over this tagged type; the two
/// detector families differ only in the bunch-crossing window applied and
/// in the layer count they contribute to quality assignment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuxCandidate {
    Pad(Pad),
    CoPad(CoPad),
}

impl AuxCandidate {
    pub fn channel(&self) -> u8 {
        match self {
            AuxCandidate::Pad(p) => p.channel,
            AuxCandidate::CoPad(c) => c.channel,
        }
    }

    pub fn pad(&self) -> u16 {
        match self {
            AuxCandidate::Pad(p) => p.pad,
            AuxCandidate::CoPad(c) => c.pad,
        }
    }

    pub fn shifted_bx(&self) -> i32 {
        match self {
            AuxCandidate::Pad(p) => p.shifted_bx(),
            AuxCandidate::CoPad(c) => c.shifted_bx(),
        }
    }

    /// Position used when the candidate stands in for a missing stub: a
    /// coincidence averages its two layers.
    pub fn position(&self) -> u16 {
        match self {
            AuxCandidate::Pad(p) => p.pad,
            AuxCandidate::CoPad(c) => c.mean_pad(),
        }
    }

    /// Auxiliary layers this candidate spans: 1 for a pad, 2 for a
    /// coincidence.
    pub fn layers(&self) -> u8 {
        match self {
            AuxCandidate::Pad(_) => 1,
            AuxCandidate::CoPad(_) => 2,
        }
    }
}

/// Per-bunch-crossing index of auxiliary candidates, built once per event.
///
/// Items are binned by their shifted bunch crossing; out-of-range items are
/// dropped at insertion, matching the bounded hardware buffer.
#[derive(Clone, Debug, Default)]
pub struct PadStore<T> {
    bins: [Vec<T>; MAX_TIME_BINS],
}

impl<T: Copy> PadStore<T> {
    pub fn new() -> Self {
        Self {
            bins: Default::default(),
        }
    }

    fn push_at(&mut self, shifted_bx: i32, item: T) {
        if let Ok(bin) = usize::try_from(shifted_bx) {
            if bin < MAX_TIME_BINS {
                self.bins[bin].push(item);
            }
        }
    }

    pub fn at(&self, shifted_bx: i32) -> &[T] {
        usize::try_from(shifted_bx)
            .ok()
            .filter(|&bin| bin < MAX_TIME_BINS)
            .map(|bin| self.bins[bin].as_slice())
            .unwrap_or(&[])
    }

    pub fn clear(&mut self) {
        for bin in &mut self.bins {
            bin.clear();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bins.iter().all(Vec::is_empty)
    }
}

impl PadStore<Pad> {
    pub fn push(&mut self, pad: Pad) {
        self.push_at(pad.shifted_bx(), pad);
    }
}

impl PadStore<CoPad> {
    pub fn push(&mut self, copad: CoPad) {
        self.push_at(copad.shifted_bx(), copad);
    }
}

/// Matching-window parameters of the pad matcher.
#[derive(Clone, Copy, Debug)]
pub struct PadMatchConfig {
    /// Half-width of the stub-pad bunch-crossing window.
    pub bx_half_width_pad: i32,
    /// Half-width for coincidence pads; coincidences are cleaner and get a
    /// tighter window.
    pub bx_half_width_copad: i32,
    /// Cathode-side pad-distance tolerance, even-parity chambers.
    pub max_delta_pad_even: u16,
    /// Cathode-side pad-distance tolerance, odd-parity chambers.
    pub max_delta_pad_odd: u16,
}

impl Default for PadMatchConfig {
    fn default() -> Self {
        Self {
            bx_half_width_pad: 1,
            bx_half_width_copad: 0,
            max_delta_pad_even: 6,
            max_delta_pad_odd: 12,
        }
    }
}

/// Strategy interface the correlator uses to fold auxiliary candidates into
/// a match. Implementations are pure queries over per-event containers.
pub trait AuxMatcher {
    /// Candidates geometrically and temporally compatible with an anode
    /// stub, coincidences first, bunch crossings ascending.
    fn match_alct(&self, alct: &AlctStub) -> Vec<AuxCandidate>;

    /// Candidates compatible with a cathode stub, same ordering.
    fn match_clct(&self, clct: &ClctStub) -> Vec<AuxCandidate>;

    /// First candidate sharing the anode's projected channel.
    fn best_for_alct(&self, alct: &AlctStub, set: &[AuxCandidate]) -> Option<AuxCandidate>;

    /// Candidate minimizing pad distance to the cathode's expected
    /// position; first found wins ties.
    fn best_for_clct(&self, clct: &ClctStub, set: &[AuxCandidate]) -> Option<AuxCandidate>;

    /// Candidate minimizing pad distance that also sits inside the anode's
    /// channel span; first found wins ties.
    fn best_for_pair(
        &self,
        alct: &AlctStub,
        clct: &ClctStub,
        set: &[AuxCandidate],
    ) -> Option<AuxCandidate>;
}

/// The pad matcher for chambers without an auxiliary detector.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullAux;

impl AuxMatcher for NullAux {
    fn match_alct(&self, _alct: &AlctStub) -> Vec<AuxCandidate> {
        Vec::new()
    }

    fn match_clct(&self, _clct: &ClctStub) -> Vec<AuxCandidate> {
        Vec::new()
    }

    fn best_for_alct(&self, _alct: &AlctStub, _set: &[AuxCandidate]) -> Option<AuxCandidate> {
        None
    }

    fn best_for_clct(&self, _clct: &ClctStub, _set: &[AuxCandidate]) -> Option<AuxCandidate> {
        None
    }

    fn best_for_pair(
        &self,
        _alct: &AlctStub,
        _clct: &ClctStub,
        _set: &[AuxCandidate],
    ) -> Option<AuxCandidate> {
        None
    }
}

/// The auxiliary pad matcher for one chamber-event.
///
/// Borrows the injected region LUT and the per-event pad/coincidence
/// stores; all queries are pure.
pub struct PadMatcher<'a> {
    lut: &'a RegionLut,
    part: ChamberPart,
    parity: Parity,
    cfg: PadMatchConfig,
    pads: &'a PadStore<Pad>,
    copads: &'a PadStore<CoPad>,
}

impl<'a> PadMatcher<'a> {
    pub fn new(
        lut: &'a RegionLut,
        part: ChamberPart,
        parity: Parity,
        cfg: PadMatchConfig,
        pads: &'a PadStore<Pad>,
        copads: &'a PadStore<CoPad>,
    ) -> Self {
        Self {
            lut,
            part,
            parity,
            cfg,
            pads,
            copads,
        }
    }

    fn max_delta_pad(&self) -> u16 {
        match self.parity {
            Parity::Even => self.cfg.max_delta_pad_even,
            Parity::Odd => self.cfg.max_delta_pad_odd,
        }
    }

    /// Collect candidates around `stub_bx` passing `keep`, coincidences
    /// first, bunch crossings ascending within each family.
    fn collect(
        &self,
        stub_bx: i32,
        keep: impl Fn(&AuxCandidate) -> bool,
    ) -> Vec<AuxCandidate> {
        let mut out = Vec::new();
        for bx in stub_bx - self.cfg.bx_half_width_copad..=stub_bx + self.cfg.bx_half_width_copad {
            for &copad in self.copads.at(bx) {
                let candidate = AuxCandidate::CoPad(copad);
                if keep(&candidate) {
                    out.push(candidate);
                }
            }
        }
        for bx in stub_bx - self.cfg.bx_half_width_pad..=stub_bx + self.cfg.bx_half_width_pad {
            for &pad in self.pads.at(bx) {
                let candidate = AuxCandidate::Pad(pad);
                if keep(&candidate) {
                    out.push(candidate);
                }
            }
        }
        out
    }

    /// The single channel an anode wire group projects onto: the midpoint of
    /// a closed span, or the closed bound of a half-open one.
    fn projected_channel(&self, alct: &AlctStub) -> Option<u8> {
        use crate::lut::Bound;
        let span = self.lut.wg_span(self.part, alct.key_wire_group)?;
        match (span.lo, span.hi) {
            (Bound::At(lo), Bound::At(hi)) => Some(lo + (hi - lo) / 2),
            (Bound::At(lo), Bound::Open) => Some(lo),
            (Bound::Open, Bound::At(hi)) => Some(hi),
            (Bound::Open, Bound::Open) => None,
        }
    }
}

impl AuxMatcher for PadMatcher<'_> {
    fn match_alct(&self, alct: &AlctStub) -> Vec<AuxCandidate> {
        if !alct.valid {
            return Vec::new();
        }
        let Some(span) = self.lut.wg_span(self.part, alct.key_wire_group) else {
            return Vec::new();
        };
        self.collect(alct.bx, |candidate| span.contains(candidate.channel()))
    }

    fn match_clct(&self, clct: &ClctStub) -> Vec<AuxCandidate> {
        if !clct.valid {
            return Vec::new();
        }
        let Some(expected) = self.lut.expected_pad(self.part, clct.key_strip) else {
            return Vec::new();
        };
        let tolerance = self.max_delta_pad();
        self.collect(clct.bx, |candidate| {
            distance(candidate.pad(), expected) <= tolerance
        })
    }

    fn best_for_alct(&self, alct: &AlctStub, set: &[AuxCandidate]) -> Option<AuxCandidate> {
        let projected = self.projected_channel(alct)?;
        set.iter().copied().find(|c| c.channel() == projected)
    }

    fn best_for_clct(&self, clct: &ClctStub, set: &[AuxCandidate]) -> Option<AuxCandidate> {
        let expected = self.lut.expected_pad(self.part, clct.key_strip)?;
        let mut best: Option<(u16, AuxCandidate)> = None;
        for &candidate in set {
            let delta = distance(candidate.pad(), expected);
            // Strict comparison keeps the first of equally distant pads.
            if best.is_none_or(|(d, _)| delta < d) {
                best = Some((delta, candidate));
            }
        }
        best.map(|(_, c)| c)
    }

    fn best_for_pair(
        &self,
        alct: &AlctStub,
        clct: &ClctStub,
        set: &[AuxCandidate],
    ) -> Option<AuxCandidate> {
        let span = self.lut.wg_span(self.part, alct.key_wire_group)?;
        let expected = self.lut.expected_pad(self.part, clct.key_strip)?;
        let mut best: Option<(u16, AuxCandidate)> = None;
        for &candidate in set {
            if !span.contains(candidate.channel()) {
                continue;
            }
            let delta = distance(candidate.pad(), expected);
            if best.is_none_or(|(d, _)| delta < d) {
                best = Some((delta, candidate));
            }
        }
        best.map(|(_, c)| c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lut::ChannelSpan;

    fn lut() -> RegionLut {
        let mut lut = RegionLut::new();
        lut.insert_wg_span(ChamberPart::InnerB, 20, ChannelSpan::closed(3, 7));
        lut.insert_strip_bounds(ChamberPart::InnerB, 77, 150, 158);
        lut
    }

    fn matcher<'a>(
        lut: &'a RegionLut,
        pads: &'a PadStore<Pad>,
        copads: &'a PadStore<CoPad>,
    ) -> PadMatcher<'a> {
        PadMatcher::new(
            lut,
            ChamberPart::InnerB,
            Parity::Even,
            PadMatchConfig::default(),
            pads,
            copads,
        )
    }

    #[test]
    fn store_bins_by_shifted_bx() {
        let mut pads: PadStore<Pad> = PadStore::new();
        pads.push(Pad::new(5, 100, -2));
        assert_eq!(pads.at(CENTRAL_BX - 2).len(), 1);
        assert!(pads.at(CENTRAL_BX).is_empty());
        // Out of range is dropped, not an error.
        pads.push(Pad::new(5, 100, 40));
        pads.push(Pad::new(5, 100, -40));
        assert!(!pads.is_empty());
        pads.clear();
        assert!(pads.is_empty());
    }

    #[test]
    fn alct_matching_respects_span_and_window() {
        let lut = lut();
        let mut pads: PadStore<Pad> = PadStore::new();
        pads.push(Pad::new(5, 100, -2)); // shifted bx 6, in span
        pads.push(Pad::new(9, 100, -2)); // out of span
        pads.push(Pad::new(5, 100, 2)); // shifted bx 10, out of window
        let copads = PadStore::new();
        let m = matcher(&lut, &pads, &copads);

        let alct = AlctStub::new(3, 20, 6);
        let set = m.match_alct(&alct);
        assert_eq!(set, vec![AuxCandidate::Pad(Pad::new(5, 100, -2))]);

        // No span entry for this wire group.
        assert!(m.match_alct(&AlctStub::new(3, 21, 6)).is_empty());
        assert!(m.match_alct(&AlctStub::default()).is_empty());
    }

    #[test]
    fn clct_matching_uses_midpoint_tolerance() {
        let lut = lut();
        let mut pads: PadStore<Pad> = PadStore::new();
        // Expected pad for strip 77 is 154.
        pads.push(Pad::new(5, 158, -2)); // delta 4, kept
        pads.push(Pad::new(5, 161, -2)); // delta 7 > 6 (even parity), dropped
        let copads = PadStore::new();
        let m = matcher(&lut, &pads, &copads);

        let clct = ClctStub::new(6, 77, 8, 6);
        assert_eq!(m.match_clct(&clct).len(), 1);

        // The odd-parity tolerance is wider.
        let odd = PadMatcher::new(
            &lut,
            ChamberPart::InnerB,
            Parity::Odd,
            PadMatchConfig::default(),
            &pads,
            &copads,
        );
        assert_eq!(odd.match_clct(&clct).len(), 2);
    }

    #[test]
    fn copads_come_first_with_tighter_window() {
        let lut = lut();
        let mut pads: PadStore<Pad> = PadStore::new();
        pads.push(Pad::new(5, 152, -3)); // shifted bx 5, |d|=1, inside pad window
        let mut copads: PadStore<CoPad> = PadStore::new();
        copads.push(CoPad::new(5, 154, 155, -3)); // shifted bx 5, outside copad window
        copads.push(CoPad::new(5, 154, 155, -2)); // shifted bx 6, inside
        let m = matcher(&lut, &pads, &copads);

        let alct = AlctStub::new(3, 20, 6);
        let set = m.match_alct(&alct);
        assert_eq!(set.len(), 2);
        assert_eq!(set[0].layers(), 2);
        assert_eq!(set[1].layers(), 1);
    }

    #[test]
    fn best_for_alct_takes_first_on_projected_channel() {
        let lut = lut();
        let mut pads: PadStore<Pad> = PadStore::new();
        pads.push(Pad::new(4, 100, -2));
        pads.push(Pad::new(5, 101, -2)); // projected channel of wg 20 span 3..7
        pads.push(Pad::new(5, 102, -2));
        let copads = PadStore::new();
        let m = matcher(&lut, &pads, &copads);

        let alct = AlctStub::new(3, 20, 6);
        let set = m.match_alct(&alct);
        let best = m.best_for_alct(&alct, &set).unwrap();
        assert_eq!(best.pad(), 101);
    }

    #[test]
    fn best_for_clct_minimizes_distance_first_found_wins() {
        let lut = lut();
        let mut pads: PadStore<Pad> = PadStore::new();
        pads.push(Pad::new(5, 152, -2)); // delta 2
        pads.push(Pad::new(5, 156, -2)); // delta 2, later: loses the tie
        pads.push(Pad::new(5, 153, -2)); // delta 1
        let copads = PadStore::new();
        let m = matcher(&lut, &pads, &copads);

        let clct = ClctStub::new(6, 77, 8, 6);
        let set = m.match_clct(&clct);
        assert_eq!(m.best_for_clct(&clct, &set).unwrap().pad(), 153);

        let tied: Vec<AuxCandidate> = set
            .iter()
            .copied()
            .filter(|c| c.pad() != 153)
            .collect();
        assert_eq!(m.best_for_clct(&clct, &tied).unwrap().pad(), 152);
    }

    #[test]
    fn best_for_pair_requires_span_membership() {
        let lut = lut();
        let mut pads: PadStore<Pad> = PadStore::new();
        pads.push(Pad::new(9, 154, -2)); // perfect distance, wrong channel
        pads.push(Pad::new(5, 151, -2)); // delta 3, in span
        let copads = PadStore::new();
        let m = matcher(&lut, &pads, &copads);

        let alct = AlctStub::new(3, 20, 6);
        let clct = ClctStub::new(6, 77, 8, 6);
        let set: Vec<AuxCandidate> = pads.at(6).iter().copied().map(AuxCandidate::Pad).collect();
        assert_eq!(m.best_for_pair(&alct, &clct, &set).unwrap().pad(), 151);
    }

    #[test]
    fn copad_position_averages_layer_spans() {
        let copad = CoPad::new(5, 154, 156, 0);
        assert_eq!(copad.mean_pad(), 155);
        let wide = copad.with_spans((150, 158), (152, 160));
        assert_eq!(wide.mean_pad(), 155);
        let skewed = copad.with_spans((150, 150), (160, 160));
        assert_eq!(skewed.mean_pad(), 155);
    }

    #[test]
    fn null_matcher_matches_nothing() {
        let alct = AlctStub::new(3, 20, 6);
        let clct = ClctStub::new(6, 77, 8, 6);
        assert!(NullAux.match_alct(&alct).is_empty());
        assert!(NullAux.match_clct(&clct).is_empty());
        assert!(NullAux.best_for_pair(&alct, &clct, &[]).is_none());
    }
}

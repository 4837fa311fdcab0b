use crate::pads::{AuxCandidate, AuxMatcher};
use crate::quality::{self, QualityScheme};
use crate::stubs::{
    AlctStub, AlctStore, ChamberId, ChamberPart, ClctStub, ClctStore, Lct, LctSource, Ranked,
    MAX_LCTS_PER_BX, MAX_MATCH_OFFSETS, MAX_TIME_BINS,
};
use crate::{Config, Observer};

/// Which timeline drives the matching scan.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Driving {
    #[default]
    Cathode,
    Anode,
}

/// The fixed pairing priority table.
///
/// Indexed by the 4-bit crossing-consistency code
/// `(ok11 << 3) | (ok12 << 2) | (ok21 << 1) | ok22`, where `okXY` is the
/// crossing predicate for anode rank X and cathode rank Y (1 = best,
/// 2 = second). Each row lists up to two winning pairings as two-digit
/// rank codes; 0 is "no pairing". The table is hardware priority encoding
/// (best-best over best-second over second-best over second-second) and is
/// reproduced verbatim; it is data, not derived.
pub const PRIORITY_TABLE: [[u8; 2]; 16] = [
    // ok:  11 12 21 22
    [0, 0],   //  0  0  0  0
    [22, 0],  //  0  0  0  1
    [21, 0],  //  0  0  1  0
    [21, 22], //  0  0  1  1
    [12, 0],  //  0  1  0  0
    [12, 22], //  0  1  0  1
    [12, 21], //  0  1  1  0
    [12, 21], //  0  1  1  1
    [11, 0],  //  1  0  0  0
    [11, 22], //  1  0  0  1
    [11, 21], //  1  0  1  0
    [11, 21], //  1  0  1  1
    [11, 12], //  1  1  0  0
    [11, 22], //  1  1  0  1
    [11, 12], //  1  1  1  0
    [11, 22], //  1  1  1  1
];

/// Pattern encoding of the LCT word. Half-strip pattern ids pass through
/// the low bank; ids outside it are masked.
pub fn encode_pattern(pattern: u8) -> u8 {
    pattern & 0xf
}

/// Fixed-shape per-event grid of candidate correlated stubs, indexed by
/// bunch crossing, match offset within the scan window, and track slot.
///
/// The shape never changes: ghost cancellation invalidates entries in
/// place so downstream indexing stays stable.
#[derive(Clone, Copy, Debug)]
pub struct LctGrid {
    slots: [[[Lct; MAX_LCTS_PER_BX]; MAX_MATCH_OFFSETS]; MAX_TIME_BINS],
}

impl LctGrid {
    pub fn new() -> Self {
        Self {
            slots: [[[Lct::default(); MAX_LCTS_PER_BX]; MAX_MATCH_OFFSETS]; MAX_TIME_BINS],
        }
    }

    fn bin(bx: i32) -> Option<usize> {
        usize::try_from(bx).ok().filter(|&b| b < MAX_TIME_BINS)
    }

    /// File an LCT under its own bunch crossing. Occupied slots are kept:
    /// the earlier writer wins, as in the hardware FIFO.
    pub fn place(&mut self, offset: usize, lct: Lct) -> bool {
        let Some(bin) = Self::bin(lct.bx) else {
            return false;
        };
        if offset >= MAX_MATCH_OFFSETS || !lct.valid {
            return false;
        }
        let rank = usize::from(lct.track_number.saturating_sub(1)).min(MAX_LCTS_PER_BX - 1);
        let slot = &mut self.slots[bin][offset][rank];
        if slot.valid {
            return false;
        }
        *slot = lct;
        true
    }

    pub fn get(&self, bx: i32, offset: usize, rank: usize) -> Lct {
        Self::bin(bx)
            .map(|bin| self.slots[bin][offset][rank])
            .unwrap_or_default()
    }

    pub(crate) fn slot_mut(&mut self, bin: usize, offset: usize, rank: usize) -> &mut Lct {
        &mut self.slots[bin][offset][rank]
    }

    /// Valid LCTs of one bunch crossing, offset-major then track order.
    pub fn at_bx(&self, bx: i32) -> impl Iterator<Item = &Lct> + '_ {
        let bin = Self::bin(bx);
        bin.into_iter()
            .flat_map(move |b| self.slots[b].iter().flatten())
            .filter(|lct| lct.valid)
    }

    /// All valid LCTs, bunch crossing ascending.
    pub fn all(&self) -> impl Iterator<Item = &Lct> + '_ {
        self.slots
            .iter()
            .flat_map(|bx| bx.iter().flatten())
            .filter(|lct| lct.valid)
    }
}

impl Default for LctGrid {
    fn default() -> Self {
        Self::new()
    }
}

/// The matching state machine for one chamber-event.
///
/// Scans the driving timeline, pairs candidates through the priority
/// table, folds in auxiliary candidates, and fills an [`LctGrid`]. All
/// scratch state (the consumed-flags) lives here and dies with the event.
pub(crate) struct Correlator<'a, O> {
    cfg: &'a Config,
    lut: &'a crate::lut::RegionLut,
    part: ChamberPart,
    chamber: ChamberId,
    observer: &'a mut O,
    used: [bool; MAX_TIME_BINS],
}

impl<'a, O: Observer> Correlator<'a, O> {
    pub(crate) fn new(
        cfg: &'a Config,
        lut: &'a crate::lut::RegionLut,
        part: ChamberPart,
        chamber: ChamberId,
        observer: &'a mut O,
    ) -> Self {
        Self {
            cfg,
            lut,
            part,
            chamber,
            observer,
            used: [false; MAX_TIME_BINS],
        }
    }

    fn center_offset(&self) -> usize {
        (self.cfg.match_half_width.max(0) as usize).min(MAX_MATCH_OFFSETS - 1)
    }

    fn mark_used(&mut self, bx: i32) {
        if let Some(bin) = usize::try_from(bx).ok().filter(|&b| b < MAX_TIME_BINS) {
            self.used[bin] = true;
        }
    }

    fn is_used(&self, bx: i32) -> bool {
        usize::try_from(bx)
            .ok()
            .filter(|&b| b < MAX_TIME_BINS)
            .is_some_and(|bin| self.used[bin])
    }

    pub(crate) fn run(
        &mut self,
        alcts: &AlctStore,
        clcts: &ClctStore,
        aux: &dyn AuxMatcher,
    ) -> LctGrid {
        let mut grid = LctGrid::new();
        self.used = [false; MAX_TIME_BINS];
        match self.cfg.driving {
            Driving::Cathode => self.run_cathode_centric(alcts, clcts, aux, &mut grid),
            Driving::Anode => self.run_anode_centric(alcts, clcts, aux, &mut grid),
        }
        grid
    }

    fn run_cathode_centric(
        &mut self,
        alcts: &AlctStore,
        clcts: &ClctStore,
        aux: &dyn AuxMatcher,
        grid: &mut LctGrid,
    ) {
        for bx_c in 0..MAX_TIME_BINS as i32 {
            let cathode = clcts.at(bx_c);
            if !cathode.best.valid {
                continue;
            }
            let lo = bx_c - self.cfg.match_half_width + self.cfg.match_offset;
            let hi = bx_c + self.cfg.match_half_width + self.cfg.match_offset;
            let mut matched = false;
            for bx_a in lo..=hi {
                let anode = alcts.at(bx_a);
                if !anode.best.valid {
                    continue;
                }
                if self.cfg.drop_used && self.is_used(bx_a) {
                    continue;
                }
                let pair = self.correlate_pair(anode, cathode, aux);
                let offset = (bx_a - lo) as usize;
                for lct in pair.iter().filter(|l| l.valid) {
                    self.observer.on_lct(lct);
                    grid.place(offset, *lct);
                }
                if pair[0].valid {
                    self.mark_used(bx_a);
                    matched = true;
                    if self.cfg.earliest_only {
                        break;
                    }
                }
            }
            if !matched {
                self.unmatched_cathode(&cathode.best, aux, grid);
            }
        }
        self.sweep_leftover_alcts(alcts, aux, grid);
    }

    fn run_anode_centric(
        &mut self,
        alcts: &AlctStore,
        clcts: &ClctStore,
        aux: &dyn AuxMatcher,
        grid: &mut LctGrid,
    ) {
        for bx_a in 0..MAX_TIME_BINS as i32 {
            let anode = alcts.at(bx_a);
            if !anode.best.valid {
                continue;
            }
            let lo = bx_a - self.cfg.match_half_width + self.cfg.match_offset;
            let hi = bx_a + self.cfg.match_half_width + self.cfg.match_offset;
            let mut matched = false;
            for bx_c in lo..=hi {
                let cathode = clcts.at(bx_c);
                if !cathode.best.valid {
                    continue;
                }
                if self.cfg.drop_used && self.is_used(bx_c) {
                    continue;
                }
                let pair = self.correlate_pair(anode, cathode, aux);
                let offset = (bx_c - lo) as usize;
                for lct in pair.iter().filter(|l| l.valid) {
                    self.observer.on_lct(lct);
                    grid.place(offset, *lct);
                }
                if pair[0].valid {
                    self.mark_used(bx_c);
                    matched = true;
                    if self.cfg.earliest_only {
                        break;
                    }
                }
            }
            if !matched {
                self.unmatched_anode(&anode.best, aux, grid);
            }
        }
        self.sweep_leftover_clcts(clcts, aux, grid);
    }

    /// The pairing sub-routine: up to two LCTs from the best/second stubs of
    /// one anode bin and one cathode bin.
    fn correlate_pair(
        &mut self,
        anode: Ranked<AlctStub>,
        cathode: Ranked<ClctStub>,
        aux: &dyn AuxMatcher,
    ) -> [Lct; 2] {
        let best_a = anode.best;
        let best_c = cathode.best;
        // One physical stub reported twice must not count as two candidates.
        let second_a = if anode.second == best_a {
            AlctStub::default()
        } else {
            anode.second
        };
        let second_c = if cathode.second == best_c {
            ClctStub::default()
        } else {
            cathode.second
        };

        if !self.cfg.crossing_check {
            // Degenerate regions with no crossing geometry fall back to the
            // per-rank trigger-enable logic.
            return [
                self.enable_logic(&best_a, &best_c, aux, 1),
                self.enable_logic(&second_a, &second_c, aux, 2),
            ];
        }

        let cross = |a: &AlctStub, c: &ClctStub| {
            a.valid
                && c.valid
                && self
                    .lut
                    .wg_crosses_strip(self.part, a.key_wire_group, c.key_strip)
        };
        let code = ((cross(&best_a, &best_c) as usize) << 3)
            | ((cross(&best_a, &second_c) as usize) << 2)
            | ((cross(&second_a, &best_c) as usize) << 1)
            | (cross(&second_a, &second_c) as usize);

        let mut out = [Lct::default(); 2];
        for (slot, &entry) in PRIORITY_TABLE[code].iter().enumerate() {
            if entry == 0 {
                continue;
            }
            let a = if entry / 10 == 1 { &best_a } else { &second_a };
            let c = if entry % 10 == 1 { &best_c } else { &second_c };
            out[slot] = self.build_combined(a, c, aux, slot as u8 + 1);
        }
        out
    }

    /// Trigger-enable-bit logic for one rank pair, used when the crossing
    /// check is administratively disabled.
    fn enable_logic(
        &mut self,
        a: &AlctStub,
        c: &ClctStub,
        aux: &dyn AuxMatcher,
        track: u8,
    ) -> Lct {
        if a.valid && c.valid && self.cfg.match_trig_enable {
            self.build_combined(a, c, aux, track)
        } else if a.valid && self.cfg.alct_trig_enable {
            self.build_alct_only(a, track)
        } else if c.valid && self.cfg.clct_trig_enable {
            self.build_clct_only(c, track)
        } else {
            Lct::default()
        }
    }

    /// Best auxiliary candidate corroborating an anode-cathode pair:
    /// coincidences first, single pads as the fallback.
    fn best_aux_for_pair(
        &self,
        aux: &dyn AuxMatcher,
        a: &AlctStub,
        c: &ClctStub,
    ) -> Option<AuxCandidate> {
        let set = aux.match_clct(c);
        let copads: Vec<AuxCandidate> =
            set.iter().copied().filter(|x| x.layers() == 2).collect();
        if let Some(best) = aux.best_for_pair(a, c, &copads) {
            return Some(best);
        }
        let pads: Vec<AuxCandidate> = set.iter().copied().filter(|x| x.layers() == 1).collect();
        aux.best_for_pair(a, c, &pads)
    }

    /// Stand-in candidate for a missing stub: a coincidence pad, or a
    /// single pad when the relaxed policy allows it.
    fn standin<F>(&self, set: &[AuxCandidate], best: F) -> Option<AuxCandidate>
    where
        F: Fn(&[AuxCandidate]) -> Option<AuxCandidate>,
    {
        let copads: Vec<AuxCandidate> =
            set.iter().copied().filter(|x| x.layers() == 2).collect();
        if let Some(found) = best(&copads) {
            return Some(found);
        }
        if !self.cfg.single_pad_standin {
            return None;
        }
        let pads: Vec<AuxCandidate> = set.iter().copied().filter(|x| x.layers() == 1).collect();
        best(&pads)
    }

    fn unmatched_cathode(&mut self, c: &ClctStub, aux: &dyn AuxMatcher, grid: &mut LctGrid) {
        if self.cfg.build_from_clct_pad {
            let set = aux.match_clct(c);
            if let Some(found) = self.standin(&set, |subset| aux.best_for_clct(c, subset)) {
                let lct = self.build_clct_aux(c, &found, 1);
                self.observer.on_single_detector(&lct);
                grid.place(self.center_offset(), lct);
                return;
            }
        }
        if self.cfg.clct_trig_enable {
            let lct = self.build_clct_only(c, 1);
            self.observer.on_single_detector(&lct);
            grid.place(self.center_offset(), lct);
        }
    }

    fn unmatched_anode(&mut self, a: &AlctStub, aux: &dyn AuxMatcher, grid: &mut LctGrid) {
        if self.cfg.build_from_alct_pad {
            let set = aux.match_alct(a);
            if let Some(found) = self.standin(&set, |subset| aux.best_for_alct(a, subset)) {
                let lct = self.build_alct_aux(a, &found, 1);
                self.observer.on_single_detector(&lct);
                grid.place(self.center_offset(), lct);
                return;
            }
        }
        if self.cfg.alct_trig_enable {
            let lct = self.build_alct_only(a, 1);
            self.observer.on_single_detector(&lct);
            grid.place(self.center_offset(), lct);
        }
    }

    /// Unconsumed anode bins may still trigger through an auxiliary
    /// coincidence (cathode-centric mode only; the mirror sweeps cathodes).
    fn sweep_leftover_alcts(
        &mut self,
        alcts: &AlctStore,
        aux: &dyn AuxMatcher,
        grid: &mut LctGrid,
    ) {
        if !self.cfg.build_from_alct_pad {
            return;
        }
        for bx_a in 0..MAX_TIME_BINS as i32 {
            if self.is_used(bx_a) {
                continue;
            }
            let a = alcts.at(bx_a).best;
            if !a.valid {
                continue;
            }
            let set = aux.match_alct(&a);
            if let Some(found) = self.standin(&set, |subset| aux.best_for_alct(&a, subset)) {
                let lct = self.build_alct_aux(&a, &found, 1);
                self.observer.on_single_detector(&lct);
                grid.place(self.center_offset(), lct);
                self.mark_used(bx_a);
            }
        }
    }

    fn sweep_leftover_clcts(
        &mut self,
        clcts: &ClctStore,
        aux: &dyn AuxMatcher,
        grid: &mut LctGrid,
    ) {
        if !self.cfg.build_from_clct_pad {
            return;
        }
        for bx_c in 0..MAX_TIME_BINS as i32 {
            if self.is_used(bx_c) {
                continue;
            }
            let c = clcts.at(bx_c).best;
            if !c.valid {
                continue;
            }
            let set = aux.match_clct(&c);
            if let Some(found) = self.standin(&set, |subset| aux.best_for_clct(&c, subset)) {
                let lct = self.build_clct_aux(&c, &found, 1);
                self.observer.on_single_detector(&lct);
                grid.place(self.center_offset(), lct);
                self.mark_used(bx_c);
            }
        }
    }

    fn build_combined(
        &mut self,
        a: &AlctStub,
        c: &ClctStub,
        aux: &dyn AuxMatcher,
        track: u8,
    ) -> Lct {
        let corroborating = self.best_aux_for_pair(aux, a, c);
        let source = match corroborating {
            None => LctSource::AlctClct,
            Some(x) if x.layers() == 2 => LctSource::AlctClctCoPad,
            Some(_) => LctSource::AlctClctPad,
        };
        let q = quality::assign(self.cfg.scheme, a, c, source);
        if matches!(self.cfg.scheme, QualityScheme::Run2 { .. })
            && q == quality::INVALID_QUALITY
            && a.valid
            && c.valid
        {
            self.observer.on_quality_anomaly(self.chamber, c.pattern);
        }
        Lct {
            track_number: track,
            valid: true,
            quality: q,
            key_wire_group: a.key_wire_group,
            key_strip: c.key_strip,
            pattern: encode_pattern(c.pattern),
            bx: a.bx,
            source,
            chamber: self.chamber,
        }
    }

    fn build_alct_only(&self, a: &AlctStub, track: u8) -> Lct {
        Lct {
            track_number: track,
            valid: true,
            quality: quality::assign(self.cfg.scheme, a, &ClctStub::default(), LctSource::AlctOnly),
            key_wire_group: a.key_wire_group,
            key_strip: 0,
            pattern: 0,
            bx: a.bx,
            source: LctSource::AlctOnly,
            chamber: self.chamber,
        }
    }

    fn build_clct_only(&self, c: &ClctStub, track: u8) -> Lct {
        Lct {
            track_number: track,
            valid: true,
            quality: quality::assign(self.cfg.scheme, &AlctStub::default(), c, LctSource::ClctOnly),
            key_wire_group: 0,
            key_strip: c.key_strip,
            pattern: encode_pattern(c.pattern),
            bx: c.bx,
            source: LctSource::ClctOnly,
            chamber: self.chamber,
        }
    }

    fn build_alct_aux(&self, a: &AlctStub, found: &AuxCandidate, track: u8) -> Lct {
        let source = if found.layers() == 2 {
            LctSource::AlctCoPad
        } else {
            LctSource::AlctPad
        };
        let quality = if self.cfg.promote_alct_quality {
            self.cfg.promoted_alct_quality
        } else {
            quality::assign(self.cfg.scheme, a, &ClctStub::default(), source)
        };
        let pattern = if self.cfg.promote_alct_pattern {
            self.cfg.promoted_pattern
        } else {
            0
        };
        Lct {
            track_number: track,
            valid: true,
            quality,
            key_wire_group: a.key_wire_group,
            key_strip: self
                .lut
                .pad_to_key_strip(self.part, found.position())
                .unwrap_or(0),
            pattern,
            bx: a.bx,
            source,
            chamber: self.chamber,
        }
    }

    fn build_clct_aux(&self, c: &ClctStub, found: &AuxCandidate, track: u8) -> Lct {
        let source = if found.layers() == 2 {
            LctSource::ClctCoPad
        } else {
            LctSource::ClctPad
        };
        let quality = if self.cfg.promote_clct_quality {
            self.cfg.promoted_clct_quality
        } else {
            quality::assign(self.cfg.scheme, &AlctStub::default(), c, source)
        };
        Lct {
            track_number: track,
            valid: true,
            quality,
            key_wire_group: self
                .lut
                .channel_to_wire_group(self.part, found.channel())
                .unwrap_or(0),
            key_strip: c.key_strip,
            pattern: encode_pattern(c.pattern),
            bx: found.shifted_bx(),
            source,
            chamber: self.chamber,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_table_shape() {
        // Code 0 yields nothing; every nonzero code yields at least one
        // pairing, led by the highest-priority rank the code allows.
        assert_eq!(PRIORITY_TABLE[0], [0, 0]);
        for (code, row) in PRIORITY_TABLE.iter().enumerate().skip(1) {
            assert_ne!(row[0], 0, "code {code}");
            if code >= 0b1000 {
                assert_eq!(row[0], 11, "code {code} must prefer best-best");
            }
            for &entry in row {
                assert!(matches!(entry, 0 | 11 | 12 | 21 | 22), "code {code}");
            }
        }
    }

    #[test]
    fn grid_places_by_own_bx() {
        let mut grid = LctGrid::new();
        let lct = Lct {
            track_number: 1,
            valid: true,
            bx: 6,
            ..Default::default()
        };
        assert!(grid.place(3, lct));
        assert_eq!(grid.get(6, 3, 0), lct);
        assert_eq!(grid.at_bx(6).count(), 1);
        // Occupied slots keep the earlier writer.
        let other = Lct { quality: 9, ..lct };
        assert!(!grid.place(3, other));
        assert_eq!(grid.get(6, 3, 0), lct);
        // Invalid and out-of-range are dropped.
        assert!(!grid.place(3, Lct::default()));
        assert!(!grid.place(3, Lct { bx: 99, ..lct }));
    }

    #[test]
    fn encode_pattern_masks_to_word_width() {
        assert_eq!(encode_pattern(10), 10);
        assert_eq!(encode_pattern(0x1f), 0xf);
    }
}

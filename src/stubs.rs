use std::fmt;

/// Depth of every per-bunch-crossing array in the motherboard.
///
/// The hardware pipelines are 16 time bins deep; every candidate store and
/// the correlated-LCT grid share this bound.
pub const MAX_TIME_BINS: usize = 16;

/// Widest supported anode-cathode matching window, in bunch crossings.
pub const MAX_MATCH_OFFSETS: usize = 7;

/// Hard shape bound on the number of LCT slots per bunch crossing.
///
/// The configurable cap can be 1 or 2, never more; the grid is always
/// allocated at this width.
pub const MAX_LCTS_PER_BX: usize = 2;

/// The reference bin all auxiliary-pad bunch crossings are shifted to.
pub const CENTRAL_BX: i32 = 8;

/// An identifier for the physical chamber a motherboard serves.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChamberId(pub u32);

impl fmt::Display for ChamberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CH{}", self.0)
    }
}

/// Sub-region of a chamber, as seen by the trigger electronics.
///
/// Inner chambers are split into two strip regions (`InnerA` far from the
/// beamline, `InnerB` near it); the far region also exists in a ganged
/// electronics variant where three physical strips share one channel.
/// Outer chambers are unsplit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChamberPart {
    InnerA,
    InnerAGanged,
    InnerB,
    Outer,
}

/// Even/odd chamber parity. Neighbouring chambers alternate in their
/// projective distance to the auxiliary detector, so pad-matching
/// tolerances are configured per parity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Parity {
    Even,
    Odd,
}

/// An anode-derived candidate stub (ALCT) for one bunch crossing.
///
/// The default value is the invalid stub. Equality compares every field;
/// the best/second rank is a property of the slot a stub sits in, not of
/// the stub itself.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AlctStub {
    pub valid: bool,
    pub quality: u8,
    pub key_wire_group: u8,
    pub bx: i32,
    /// Marks beam-halo-like (accelerator muon) patterns.
    pub accelerator: bool,
}

impl AlctStub {
    pub fn new(quality: u8, key_wire_group: u8, bx: i32) -> Self {
        Self {
            valid: true,
            quality,
            key_wire_group,
            bx,
            accelerator: false,
        }
    }

    pub fn accelerator(mut self) -> Self {
        self.accelerator = true;
        self
    }
}

/// A cathode-derived candidate stub (CLCT) for one bunch crossing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClctStub {
    pub valid: bool,
    pub quality: u8,
    pub key_strip: u16,
    /// Comparator pattern id, 1 (layer-OR) through 10 (straightest).
    pub pattern: u8,
    pub bx: i32,
}

impl ClctStub {
    pub fn new(quality: u8, key_strip: u16, pattern: u8, bx: i32) -> Self {
        Self {
            valid: true,
            quality,
            key_strip,
            pattern,
            bx,
        }
    }
}

/// The best and second-best candidate of one bunch crossing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Ranked<S> {
    pub best: S,
    pub second: S,
}

/// Per-bunch-crossing candidate store for one timeline (anode or cathode).
///
/// Out-of-range bunch crossings read as invalid candidates and writes to
/// them are dropped, mirroring the bounded hardware pipeline.
#[derive(Clone, Copy, Debug)]
pub struct CandidateStore<S> {
    bins: [Ranked<S>; MAX_TIME_BINS],
}

impl<S: Copy + Default> CandidateStore<S> {
    pub fn new() -> Self {
        Self {
            bins: [Ranked::default(); MAX_TIME_BINS],
        }
    }

    fn bin(bx: i32) -> Option<usize> {
        (0..MAX_TIME_BINS as i32)
            .contains(&bx)
            .then_some(bx as usize)
    }

    pub fn at(&self, bx: i32) -> Ranked<S> {
        Self::bin(bx).map(|b| self.bins[b]).unwrap_or_default()
    }

    pub fn set_best(&mut self, bx: i32, stub: S) {
        if let Some(b) = Self::bin(bx) {
            self.bins[b].best = stub;
        }
    }

    pub fn set_second(&mut self, bx: i32, stub: S) {
        if let Some(b) = Self::bin(bx) {
            self.bins[b].second = stub;
        }
    }

    pub fn clear(&mut self) {
        self.bins = [Ranked::default(); MAX_TIME_BINS];
    }
}

impl<S: Copy + Default> Default for CandidateStore<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// Anode timeline: best/second ALCT per bunch crossing.
pub type AlctStore = CandidateStore<AlctStub>;
/// Cathode timeline: best/second CLCT per bunch crossing.
pub type ClctStore = CandidateStore<ClctStub>;

/// Which detector combination produced a correlated LCT.
///
/// Pad and coincidence-pad contributions are distinct cases; they carry
/// different layer counts into quality assignment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LctSource {
    #[default]
    Invalid,
    AlctOnly,
    ClctOnly,
    AlctClct,
    AlctPad,
    AlctCoPad,
    ClctPad,
    ClctCoPad,
    AlctClctPad,
    AlctClctCoPad,
}

impl LctSource {
    /// Number of auxiliary detector layers that contributed.
    pub fn aux_layers(self) -> u8 {
        match self {
            LctSource::AlctPad | LctSource::ClctPad | LctSource::AlctClctPad => 1,
            LctSource::AlctCoPad | LctSource::ClctCoPad | LctSource::AlctClctCoPad => 2,
            _ => 0,
        }
    }

    pub fn has_alct(self) -> bool {
        matches!(
            self,
            LctSource::AlctOnly
                | LctSource::AlctClct
                | LctSource::AlctPad
                | LctSource::AlctCoPad
                | LctSource::AlctClctPad
                | LctSource::AlctClctCoPad
        )
    }

    pub fn has_clct(self) -> bool {
        matches!(
            self,
            LctSource::ClctOnly
                | LctSource::AlctClct
                | LctSource::ClctPad
                | LctSource::ClctCoPad
                | LctSource::AlctClctPad
                | LctSource::AlctClctCoPad
        )
    }
}

/// A correlated local charged track, the motherboard's output stub.
///
/// Constructed only by the correlator and never mutated afterwards; the
/// default value is the invalid LCT that fills empty grid slots.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Lct {
    /// 1 or 2, assigned by pairing-table order, not by quality.
    pub track_number: u8,
    pub valid: bool,
    pub quality: u8,
    pub key_wire_group: u8,
    pub key_strip: u16,
    pub pattern: u8,
    pub bx: i32,
    pub source: LctSource,
    pub chamber: ChamberId,
}

impl fmt::Display for Lct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.valid {
            return write!(f, "{} LCT#{}: invalid", self.chamber, self.track_number);
        }
        write!(
            f,
            "{} LCT#{}: q{} wg{} hs{} pat{} bx{} {:?}",
            self.chamber,
            self.track_number,
            self.quality,
            self.key_wire_group,
            self.key_strip,
            self.pattern,
            self.bx,
            self.source,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_stubs_are_invalid() {
        assert!(!AlctStub::default().valid);
        assert!(!ClctStub::default().valid);
        assert!(!Lct::default().valid);
        assert_eq!(LctSource::default(), LctSource::Invalid);
    }

    #[test]
    fn store_out_of_range_reads_invalid() {
        let mut store = AlctStore::new();
        store.set_best(-1, AlctStub::new(3, 10, -1));
        store.set_best(MAX_TIME_BINS as i32, AlctStub::new(3, 10, 16));
        for bx in -2..MAX_TIME_BINS as i32 + 2 {
            assert!(!store.at(bx).best.valid);
        }
    }

    #[test]
    fn store_round_trip() {
        let mut store = ClctStore::new();
        let best = ClctStub::new(6, 77, 8, 6);
        let second = ClctStub::new(4, 80, 5, 6);
        store.set_best(6, best);
        store.set_second(6, second);
        assert_eq!(store.at(6).best, best);
        assert_eq!(store.at(6).second, second);
        store.clear();
        assert!(!store.at(6).best.valid);
        assert!(!store.at(6).second.valid);
    }

    #[test]
    fn stub_equality_ignores_nothing_but_rank() {
        let a = AlctStub::new(3, 20, 6);
        let b = AlctStub::new(3, 20, 6);
        assert_eq!(a, b);
        assert_ne!(a, b.accelerator());
    }

    #[test]
    fn source_layer_counts() {
        assert_eq!(LctSource::AlctClct.aux_layers(), 0);
        assert_eq!(LctSource::AlctClctPad.aux_layers(), 1);
        assert_eq!(LctSource::AlctClctCoPad.aux_layers(), 2);
        assert!(LctSource::AlctCoPad.has_alct());
        assert!(!LctSource::AlctCoPad.has_clct());
        assert!(LctSource::ClctPad.has_clct());
    }
}

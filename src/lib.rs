use crate::correlate::Correlator;
use crate::lut::RegionLut;
use crate::pads::AuxMatcher;
use crate::quality::QualityScheme;
use crate::stubs::{AlctStore, ChamberId, ChamberPart, ClctStore, Lct, CENTRAL_BX};
use bon::bon;

/// The correlator state machine and its pairing priority table.
pub mod correlate;
/// Utilities to generate input timelines for the motherboard.
pub mod gen;
/// Region lookup tables mapping detector channels between planes.
pub mod lut;
/// Auxiliary-detector pad candidates and the pad matcher.
pub mod pads;
/// Quality assignment for correlated stubs.
pub mod quality;
/// Ghost cancellation and the readout window.
pub mod reduce;
/// Candidate and correlated stub data model.
pub mod stubs;

pub use correlate::Driving;

/// A trait that defines the interface for an observer of the motherboard.
///
/// The default implementation of all methods is a no-op. Users are expected
/// to override the methods they are interested in.
#[allow(unused_variables)]
pub trait Observer {
    /// Called when the correlator produces a candidate correlated stub.
    fn on_lct(&mut self, lct: &Lct) {}
    /// Called when an unmatched candidate is reported through a
    /// single-detector or pad-stand-in path.
    fn on_single_detector(&mut self, lct: &Lct) {}
    /// Called when quality assignment meets an unrecognized cathode
    /// pattern id.
    fn on_quality_anomaly(&mut self, chamber: ChamberId, pattern: u8) {}
    /// Called when ghost cancellation clears a stub over the per-crossing
    /// cap.
    fn on_ghost_cancelled(&mut self, lct: &Lct) {}
    /// Called for every stub surviving the readout window.
    fn on_readout(&mut self, lct: &Lct) {}
}

impl Observer for () {}

/// Motherboard configuration, injected at construction and immutable for
/// the lifetime of a run.
#[derive(Clone, Debug, bon::Builder)]
pub struct Config {
    /// Which timeline drives the matching scan.
    #[builder(default)]
    pub driving: Driving,
    /// Half-width of the anode-cathode matching window.
    #[builder(default = 3)]
    pub match_half_width: i32,
    /// Offset added to the window center, for chambers with a known timing
    /// skew between the two timelines.
    #[builder(default = 0)]
    pub match_offset: i32,
    /// Exclude already-consumed candidates from later windows.
    #[builder(default = true)]
    pub drop_used: bool,
    /// Stop scanning a window at the first qualifying candidate.
    #[builder(default = true)]
    pub earliest_only: bool,
    /// Report unmatched anode stubs on their own.
    #[builder(default = false)]
    pub alct_trig_enable: bool,
    /// Report unmatched cathode stubs on their own.
    #[builder(default = false)]
    pub clct_trig_enable: bool,
    /// Allow correlated stubs at all (the normal running mode).
    #[builder(default = true)]
    pub match_trig_enable: bool,
    /// Evaluate the wire-group/strip crossing predicate. Disabled for
    /// degenerate regions with no crossing geometry.
    #[builder(default = true)]
    pub crossing_check: bool,
    #[builder(default)]
    pub scheme: QualityScheme,
    /// Let an auxiliary coincidence stand in for a missing cathode when an
    /// anode is left unmatched.
    #[builder(default = false)]
    pub build_from_alct_pad: bool,
    /// Let an auxiliary coincidence stand in for a missing anode when a
    /// cathode is left unmatched.
    #[builder(default = false)]
    pub build_from_clct_pad: bool,
    /// Accept a single-layer pad, not just a coincidence, as the stand-in.
    #[builder(default = false)]
    pub single_pad_standin: bool,
    /// Give pad-stand-in stubs the promoted pattern id instead of none.
    #[builder(default = true)]
    pub promote_alct_pattern: bool,
    #[builder(default = 10)]
    pub promoted_pattern: u8,
    /// Give anode+pad stubs the promoted quality instead of the assigned one.
    #[builder(default = true)]
    pub promote_alct_quality: bool,
    #[builder(default = 15)]
    pub promoted_alct_quality: u8,
    /// Same, cathode side.
    #[builder(default = true)]
    pub promote_clct_quality: bool,
    #[builder(default = 15)]
    pub promoted_clct_quality: u8,
    /// Ghost-cancellation cap per bunch crossing.
    #[builder(default = 2)]
    pub max_lcts_per_bx: usize,
    /// Cancel ghosts by descending quality instead of offset preference.
    #[builder(default = false)]
    pub sort_by_quality: bool,
    /// Reference bin of the readout coincidence window.
    #[builder(default = CENTRAL_BX)]
    pub trigger_accept: i32,
    /// Bins before the reference included in readout (exclusive bound).
    #[builder(default = 5)]
    pub early_margin: i32,
    /// Bins after the reference included in readout (inclusive bound).
    #[builder(default = 2)]
    pub late_margin: i32,
    /// Read out only the earliest populated in-window crossing.
    #[builder(default = true)]
    pub readout_earliest_only: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config::builder().build()
    }
}

/// The trigger motherboard for one chamber.
///
/// Holds configuration, the injected region LUT, and an observer; all
/// per-event state is scratch, cleared at the start of [`Self::process`].
/// Chambers are independent: parallelism across chambers is one
/// `Motherboard` per chamber, scheduled externally.
pub struct Motherboard<O> {
    chamber: ChamberId,
    part: ChamberPart,
    lut: RegionLut,
    config: Config,
    observer: O,
}

#[bon]
impl<O> Motherboard<O> {
    #[builder]
    pub fn new(
        chamber: ChamberId,
        part: ChamberPart,
        #[builder(default)] lut: RegionLut,
        #[builder(default)] config: Config,
        observer: O,
    ) -> Self {
        Self {
            chamber,
            part,
            lut,
            config,
            observer,
        }
    }
}

impl<O: Observer> Motherboard<O> {
    /// Process one event's candidate timelines to completion and return the
    /// readout-ordered stub sequence.
    pub fn process(
        &mut self,
        alcts: &AlctStore,
        clcts: &ClctStore,
        aux: &dyn AuxMatcher,
    ) -> Vec<Lct> {
        let mut grid = {
            let mut correlator = Correlator::new(
                &self.config,
                &self.lut,
                self.part,
                self.chamber,
                &mut self.observer,
            );
            correlator.run(alcts, clcts, aux)
        };
        reduce::reduce(&mut grid, &self.config, &mut self.observer);
        reduce::readout(&grid, &self.config, &mut self.observer)
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn into_observer(self) -> O {
        self.observer
    }
}

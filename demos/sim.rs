/// This is a general example of how you would typically wire up a single
/// chamber's trigger motherboard.
use anyhow::Result;
use tmb::gen::{AlctTrain, ClctTrain};
use tmb::lut::RegionLut;
use tmb::pads::NullAux;
use tmb::stubs::{ChamberId, ChamberPart, Lct};
use tmb::{Config, Motherboard, Observer};
use uom::si::f64::Time;
use uom::si::time::nanosecond;

/// One bunch crossing of beam time.
fn bx_period() -> Time {
    Time::new::<nanosecond>(25.0)
}

#[derive(Default)]
struct Counting {
    correlated: u32,
    ghosts: u32,
    read_out: u32,
}

impl Observer for Counting {
    fn on_lct(&mut self, _lct: &Lct) {
        self.correlated += 1;
    }

    fn on_ghost_cancelled(&mut self, _lct: &Lct) {
        self.ghosts += 1;
    }

    fn on_readout(&mut self, lct: &Lct) {
        self.read_out += 1;
        println!("{lct}");
    }
}

fn main() -> Result<()> {
    // ===========================================
    // These come from the configuration database. The LUT export is inlined
    // here; in production it is read from a file.
    let lut: RegionLut = "wg2ch innerB 0x14 3 7\nwg2st innerB 0x14 60 90".parse()?;
    let config = Config::builder()
        .match_half_width(3)
        .clct_trig_enable(true)
        .build();
    // ===========================================

    let bins = (config.early_margin + config.late_margin) as f64;
    let window: Time = bx_period() * bins;
    println!(
        "readout window: {:.0} ns around trigger accept",
        window.get::<nanosecond>()
    );

    let mut board = Motherboard::builder()
        .chamber(ChamberId(101))
        .part(ChamberPart::InnerB)
        .lut(lut)
        .config(config)
        .observer(Counting::default())
        .build();

    // One event's worth of candidates.
    let alcts = AlctTrain::builder()
        .quality(2)
        .key_wire_group(20)
        .bxs(vec![6])
        .build()
        .store();
    let clcts = ClctTrain::builder()
        .quality(5)
        .key_strip(75)
        .pattern(9)
        .bxs(vec![6, 7])
        .build()
        .store();

    board.process(&alcts, &clcts, &NullAux);

    let counts = board.into_observer();
    println!(
        "correlated {}, ghost-cancelled {}, read out {}",
        counts.correlated, counts.ghosts, counts.read_out
    );

    Ok(())
}

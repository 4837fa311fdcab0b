use crate::pads::{CoPad, Pad, PadStore};
use crate::stubs::{AlctStore, AlctStub, ClctStore, ClctStub};
use bon::bon;

/// A deterministic train of anode candidates, one per listed bunch
/// crossing, sharing quality and position.
#[derive(Clone, Debug)]
pub struct AlctTrain {
    quality: u8,
    key_wire_group: u8,
    accelerator: bool,
    bxs: Vec<i32>,
}

#[bon]
impl AlctTrain {
    #[builder]
    pub fn new(
        #[builder(default = 3)] quality: u8,
        key_wire_group: u8,
        #[builder(default = false)] accelerator: bool,
        bxs: Vec<i32>,
    ) -> Self {
        Self {
            quality,
            key_wire_group,
            accelerator,
            bxs,
        }
    }
}

impl AlctTrain {
    pub fn fill(&self, store: &mut AlctStore) {
        for &bx in &self.bxs {
            let mut stub = AlctStub::new(self.quality, self.key_wire_group, bx);
            if self.accelerator {
                stub = stub.accelerator();
            }
            store.set_best(bx, stub);
        }
    }

    pub fn store(&self) -> AlctStore {
        let mut store = AlctStore::new();
        self.fill(&mut store);
        store
    }
}

/// A deterministic train of cathode candidates.
#[derive(Clone, Debug)]
pub struct ClctTrain {
    quality: u8,
    key_strip: u16,
    pattern: u8,
    bxs: Vec<i32>,
}

#[bon]
impl ClctTrain {
    #[builder]
    pub fn new(
        #[builder(default = 6)] quality: u8,
        key_strip: u16,
        #[builder(default = 8)] pattern: u8,
        bxs: Vec<i32>,
    ) -> Self {
        Self {
            quality,
            key_strip,
            pattern,
            bxs,
        }
    }
}

impl ClctTrain {
    pub fn fill(&self, store: &mut ClctStore) {
        for &bx in &self.bxs {
            store.set_best(bx, ClctStub::new(self.quality, self.key_strip, self.pattern, bx));
        }
    }

    pub fn store(&self) -> ClctStore {
        let mut store = ClctStore::new();
        self.fill(&mut store);
        store
    }
}

/// A train of auxiliary pads on one channel. Bunch crossings are in the
/// pad detector's own clock (central bin zero).
#[derive(Clone, Debug)]
pub struct PadTrain {
    channel: u8,
    pad: u16,
    bxs: Vec<i32>,
}

#[bon]
impl PadTrain {
    #[builder]
    pub fn new(channel: u8, pad: u16, bxs: Vec<i32>) -> Self {
        Self { channel, pad, bxs }
    }
}

impl PadTrain {
    pub fn fill(&self, store: &mut PadStore<Pad>) {
        for &bx in &self.bxs {
            store.push(Pad::new(self.channel, self.pad, bx));
        }
    }

    pub fn store(&self) -> PadStore<Pad> {
        let mut store = PadStore::new();
        self.fill(&mut store);
        store
    }
}

/// A train of two-layer coincidence pads on one channel.
#[derive(Clone, Debug)]
pub struct CoPadTrain {
    channel: u8,
    pad: u16,
    second_pad: u16,
    bxs: Vec<i32>,
}

#[bon]
impl CoPadTrain {
    #[builder]
    pub fn new(channel: u8, pad: u16, second_pad: u16, bxs: Vec<i32>) -> Self {
        Self {
            channel,
            pad,
            second_pad,
            bxs,
        }
    }
}

impl CoPadTrain {
    pub fn fill(&self, store: &mut PadStore<CoPad>) {
        for &bx in &self.bxs {
            store.push(CoPad::new(self.channel, self.pad, self.second_pad, bx));
        }
    }

    pub fn store(&self) -> PadStore<CoPad> {
        let mut store = PadStore::new();
        self.fill(&mut store);
        store
    }
}

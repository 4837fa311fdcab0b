use crate::stubs::ChamberPart;
use num_traits::PrimInt;
use std::collections::BTreeMap;
use std::fmt;
use winnow::ascii::{dec_uint, hex_uint, newline};
use winnow::combinator::{alt, delimited, opt, preceded, separated, terminated};
use winnow::error::ContextError;
use winnow::Parser;

/// Ganged inner-region electronics share one channel between three physical
/// strips; strip numbers fold modulo this width before any table lookup.
pub const GANGED_STRIP_FOLD: u16 = 48;

fn midpoint<T: PrimInt>(lo: T, hi: T) -> T {
    lo + (hi - lo) / (T::one() + T::one())
}

pub(crate) fn distance<T: PrimInt>(a: T, b: T) -> T {
    if a > b {
        a - b
    } else {
        b - a
    }
}

/// One end of an auxiliary-channel span.
///
/// `Open` is the top/bottom-of-chamber sentinel: a wire group at the edge of
/// the chamber projects past the last auxiliary channel, so its span has no
/// bound on that side.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Bound {
    At(u8),
    Open,
}

/// Inclusive auxiliary-channel span associated with an anode wire group.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelSpan {
    pub lo: Bound,
    pub hi: Bound,
}

impl ChannelSpan {
    pub fn closed(lo: u8, hi: u8) -> Self {
        Self {
            lo: Bound::At(lo),
            hi: Bound::At(hi),
        }
    }

    /// Whether a pad channel falls inside the span. An open bound matches
    /// every channel on its side of the remaining closed bound.
    ///
    /// # Examples
    ///
    /// ```
    /// use tmb::lut::{Bound, ChannelSpan};
    ///
    /// let edge = ChannelSpan { lo: Bound::At(14), hi: Bound::Open };
    /// assert!(edge.contains(14));
    /// assert!(edge.contains(200));
    /// assert!(!edge.contains(13));
    /// ```
    pub fn contains(&self, channel: u8) -> bool {
        let lo_ok = match self.lo {
            Bound::At(lo) => channel >= lo,
            Bound::Open => true,
        };
        let hi_ok = match self.hi {
            Bound::At(hi) => channel <= hi,
            Bound::Open => true,
        };
        lo_ok && hi_ok
    }
}

/// Region lookup tables injected into the motherboard.
///
/// Five tables, each keyed by chamber part and channel number:
///
/// - wire group -> auxiliary-channel span (`wg2ch`)
/// - wire group -> crossed-strip range (`wg2st`)
/// - cathode strip -> auxiliary pad-index bounds (`st2ch`)
/// - auxiliary channel -> key wire group (`ch2wg`)
/// - auxiliary pad index -> key strip (`pad2st`)
///
/// Tables are loaded once at startup (typically via [`FromStr`] from the
/// configuration-database export) and are read-only afterwards. A missing
/// entry means "no match" for the query, never an error.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RegionLut {
    wg_span: BTreeMap<(ChamberPart, u8), ChannelSpan>,
    wg_strip: BTreeMap<(ChamberPart, u8), (u16, u16)>,
    strip_bounds: BTreeMap<(ChamberPart, u16), (u16, u16)>,
    channel_wg: BTreeMap<(ChamberPart, u8), u8>,
    pad_strip: BTreeMap<(ChamberPart, u16), u16>,
}

impl RegionLut {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_wg_span(&mut self, part: ChamberPart, wg: u8, span: ChannelSpan) {
        self.wg_span.insert((part, wg), span);
    }

    pub fn insert_wg_strip(&mut self, part: ChamberPart, wg: u8, lo: u16, hi: u16) {
        self.wg_strip.insert((part, wg), (lo, hi));
    }

    pub fn insert_strip_bounds(&mut self, part: ChamberPart, strip: u16, lo: u16, hi: u16) {
        self.strip_bounds.insert((part, strip), (lo, hi));
    }

    pub fn insert_channel_wg(&mut self, part: ChamberPart, channel: u8, wg: u8) {
        self.channel_wg.insert((part, channel), wg);
    }

    pub fn insert_pad_strip(&mut self, part: ChamberPart, pad: u16, strip: u16) {
        self.pad_strip.insert((part, pad), strip);
    }

    /// Auxiliary-channel span a wire group projects onto.
    pub fn wg_span(&self, part: ChamberPart, wg: u8) -> Option<ChannelSpan> {
        self.wg_span.get(&(part, wg)).copied()
    }

    fn fold_strip(part: ChamberPart, strip: u16) -> u16 {
        match part {
            ChamberPart::InnerAGanged => strip % GANGED_STRIP_FOLD,
            _ => strip,
        }
    }

    /// Pad-index bounds a cathode strip projects onto. Ganged inner-region
    /// strips fold modulo [`GANGED_STRIP_FOLD`] before lookup.
    pub fn strip_bounds(&self, part: ChamberPart, strip: u16) -> Option<(u16, u16)> {
        self.strip_bounds
            .get(&(part, Self::fold_strip(part, strip)))
            .copied()
    }

    /// Expected pad position of a cathode strip: the midpoint of its bounds.
    pub fn expected_pad(&self, part: ChamberPart, strip: u16) -> Option<u16> {
        self.strip_bounds(part, strip).map(|(lo, hi)| midpoint(lo, hi))
    }

    /// Key wire group standing in for an auxiliary channel when no anode
    /// stub contributed to an LCT.
    pub fn channel_to_wire_group(&self, part: ChamberPart, channel: u8) -> Option<u8> {
        self.channel_wg.get(&(part, channel)).copied()
    }

    /// Key strip standing in for an auxiliary pad when no cathode stub
    /// contributed to an LCT.
    pub fn pad_to_key_strip(&self, part: ChamberPart, pad: u16) -> Option<u16> {
        self.pad_strip.get(&(part, pad)).copied()
    }

    /// Geometric crossing-consistency predicate: does this wire group cross
    /// this strip anywhere in the chamber gas volume?
    ///
    /// Unsplit outer chambers always cross. Split inner regions consult the
    /// wire group's crossed-strip range; a missing table entry does not
    /// cross.
    pub fn wg_crosses_strip(&self, part: ChamberPart, wg: u8, strip: u16) -> bool {
        if part == ChamberPart::Outer {
            return true;
        }
        let folded = Self::fold_strip(part, strip);
        self.wg_strip
            .get(&(part, wg))
            .is_some_and(|&(lo, hi)| (lo..=hi).contains(&folded))
    }
}

fn part_keyword(part: ChamberPart) -> &'static str {
    match part {
        ChamberPart::InnerA => "innerA",
        ChamberPart::InnerAGanged => "innerAg",
        ChamberPart::InnerB => "innerB",
        ChamberPart::Outer => "outer",
    }
}

fn bound_string(b: Bound) -> String {
    match b {
        Bound::At(v) => v.to_string(),
        Bound::Open => "*".to_string(),
    }
}

impl fmt::Display for RegionLut {
    /// Emits the configuration-database export format, one record per line,
    /// sorted by table, part, and key.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut lines = Vec::new();
        for (&(part, wg), span) in &self.wg_span {
            lines.push(format!(
                "wg2ch {} 0x{wg:02x} {} {}",
                part_keyword(part),
                bound_string(span.lo),
                bound_string(span.hi),
            ));
        }
        for (&(part, wg), &(lo, hi)) in &self.wg_strip {
            lines.push(format!("wg2st {} 0x{wg:02x} {lo} {hi}", part_keyword(part)));
        }
        for (&(part, strip), &(lo, hi)) in &self.strip_bounds {
            lines.push(format!("st2ch {} 0x{strip:03x} {lo} {hi}", part_keyword(part)));
        }
        for (&(part, ch), &wg) in &self.channel_wg {
            lines.push(format!("ch2wg {} 0x{ch:02x} {wg}", part_keyword(part)));
        }
        for (&(part, pad), &strip) in &self.pad_strip {
            lines.push(format!("pad2st {} 0x{pad:03x} {strip}", part_keyword(part)));
        }
        write!(f, "{}", lines.join("\n"))
    }
}

fn parse_part(input: &mut &str) -> winnow::Result<ChamberPart> {
    // "innerAg" must be tried before "innerA".
    alt((
        "innerAg".value(ChamberPart::InnerAGanged),
        "innerA".value(ChamberPart::InnerA),
        "innerB".value(ChamberPart::InnerB),
        "outer".value(ChamberPart::Outer),
    ))
    .parse_next(input)
}

fn parse_bound(input: &mut &str) -> winnow::Result<Bound> {
    alt(("*".value(Bound::Open), dec_uint.map(Bound::At))).parse_next(input)
}

enum Record {
    WgSpan(ChamberPart, u8, ChannelSpan),
    WgStrip(ChamberPart, u8, u16, u16),
    StripBounds(ChamberPart, u16, u16, u16),
    ChannelWg(ChamberPart, u8, u8),
    PadStrip(ChamberPart, u16, u16),
}

fn parse_record(input: &mut &str) -> winnow::Result<Record> {
    alt((
        (
            delimited("wg2ch ", parse_part, " 0x"),
            hex_uint,
            delimited(' ', parse_bound, ' '),
            parse_bound,
        )
            .map(|(part, wg, lo, hi)| Record::WgSpan(part, wg, ChannelSpan { lo, hi })),
        (
            delimited("wg2st ", parse_part, " 0x"),
            hex_uint,
            delimited(' ', dec_uint, ' '),
            dec_uint,
        )
            .map(|(part, wg, lo, hi)| Record::WgStrip(part, wg, lo, hi)),
        (
            delimited("st2ch ", parse_part, " 0x"),
            hex_uint,
            delimited(' ', dec_uint, ' '),
            dec_uint,
        )
            .map(|(part, strip, lo, hi)| Record::StripBounds(part, strip, lo, hi)),
        (
            delimited("ch2wg ", parse_part, " 0x"),
            hex_uint,
            preceded(' ', dec_uint),
        )
            .map(|(part, ch, wg)| Record::ChannelWg(part, ch, wg)),
        (
            delimited("pad2st ", parse_part, " 0x"),
            hex_uint,
            preceded(' ', dec_uint),
        )
            .map(|(part, pad, strip)| Record::PadStrip(part, pad, strip)),
    ))
    .parse_next(input)
}

/// The error type returned when parsing a [`RegionLut`] fails.
#[derive(Debug)]
pub struct ParseError {
    input: String,
    span: std::ops::Range<usize>,
}

impl ParseError {
    fn from_parse(error: winnow::error::ParseError<&str, ContextError>) -> Self {
        let input = error.input().to_string();
        let span = error.char_span();
        Self { input, span }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = annotate_snippets::Level::Error
            .title("invalid record starting here")
            .snippet(
                annotate_snippets::Snippet::source(&self.input)
                    .fold(true)
                    .annotation(annotate_snippets::Level::Error.span(self.span.clone())),
            );
        let renderer = annotate_snippets::Renderer::plain();
        let rendered = renderer.render(message);
        rendered.fmt(f)
    }
}

impl std::error::Error for ParseError {}

impl std::str::FromStr for RegionLut {
    type Err = ParseError;

    /// Parse a [`RegionLut`] from the configuration-database export format.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use tmb::lut::RegionLut;
    /// # use std::str::FromStr;
    /// let string = std::fs::read_to_string("region_lut.txt")?;
    /// let lut = RegionLut::from_str(&string)?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let mut lut = RegionLut::new();

        let () = terminated(
            separated(
                0..,
                parse_record.map(|record| match record {
                    Record::WgSpan(part, wg, span) => lut.insert_wg_span(part, wg, span),
                    Record::WgStrip(part, wg, lo, hi) => lut.insert_wg_strip(part, wg, lo, hi),
                    Record::StripBounds(part, strip, lo, hi) => {
                        lut.insert_strip_bounds(part, strip, lo, hi)
                    }
                    Record::ChannelWg(part, ch, wg) => lut.insert_channel_wg(part, ch, wg),
                    Record::PadStrip(part, pad, strip) => lut.insert_pad_strip(part, pad, strip),
                }),
                newline,
            ),
            opt(newline),
        )
        .parse(input)
        .map_err(ParseError::from_parse)?;

        Ok(lut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn span_contains() {
        let span = ChannelSpan::closed(3, 7);
        assert!(!span.contains(2));
        assert!(span.contains(3));
        assert!(span.contains(7));
        assert!(!span.contains(8));
    }

    #[test]
    fn span_open_bounds() {
        let top = ChannelSpan {
            lo: Bound::At(14),
            hi: Bound::Open,
        };
        assert!(top.contains(14));
        assert!(top.contains(u8::MAX));
        assert!(!top.contains(13));

        let bottom = ChannelSpan {
            lo: Bound::Open,
            hi: Bound::At(2),
        };
        assert!(bottom.contains(0));
        assert!(bottom.contains(2));
        assert!(!bottom.contains(3));
    }

    #[test]
    fn expected_pad_is_midpoint() {
        let mut lut = RegionLut::new();
        lut.insert_strip_bounds(ChamberPart::Outer, 80, 152, 159);
        assert_eq!(lut.expected_pad(ChamberPart::Outer, 80), Some(155));
        assert_eq!(lut.expected_pad(ChamberPart::Outer, 81), None);
    }

    #[test]
    fn ganged_strips_fold() {
        let mut lut = RegionLut::new();
        lut.insert_strip_bounds(ChamberPart::InnerAGanged, 5, 10, 13);
        assert_eq!(
            lut.strip_bounds(ChamberPart::InnerAGanged, 5),
            lut.strip_bounds(ChamberPart::InnerAGanged, 5 + GANGED_STRIP_FOLD),
        );
        // The unganged variant does not fold.
        let mut unganged = RegionLut::new();
        unganged.insert_strip_bounds(ChamberPart::InnerA, 5, 10, 13);
        assert_eq!(unganged.strip_bounds(ChamberPart::InnerA, 53), None);
    }

    #[test]
    fn crossing_predicate() {
        let mut lut = RegionLut::new();
        lut.insert_wg_strip(ChamberPart::InnerB, 12, 30, 60);

        assert!(lut.wg_crosses_strip(ChamberPart::InnerB, 12, 30));
        assert!(lut.wg_crosses_strip(ChamberPart::InnerB, 12, 45));
        assert!(lut.wg_crosses_strip(ChamberPart::InnerB, 12, 60));
        assert!(!lut.wg_crosses_strip(ChamberPart::InnerB, 12, 61));
        // Missing entries never cross.
        assert!(!lut.wg_crosses_strip(ChamberPart::InnerB, 13, 45));
        // Unsplit chambers always cross.
        assert!(lut.wg_crosses_strip(ChamberPart::Outer, 99, 999));
    }

    #[test]
    fn crossing_predicate_folds_ganged_strips() {
        let mut lut = RegionLut::new();
        lut.insert_wg_strip(ChamberPart::InnerAGanged, 4, 10, 20);
        assert!(lut.wg_crosses_strip(ChamberPart::InnerAGanged, 4, 15));
        assert!(lut.wg_crosses_strip(ChamberPart::InnerAGanged, 4, 15 + GANGED_STRIP_FOLD));
        assert!(!lut.wg_crosses_strip(ChamberPart::InnerAGanged, 4, 25));
    }

    #[test]
    fn lut_to_string() {
        let mut lut = RegionLut::new();
        assert_eq!(lut.to_string(), "");

        lut.insert_wg_span(ChamberPart::InnerB, 47, ChannelSpan {
            lo: Bound::At(14),
            hi: Bound::Open,
        });
        assert_eq!(lut.to_string(), "wg2ch innerB 0x2f 14 *");

        lut.insert_wg_strip(ChamberPart::InnerB, 47, 96, 127);
        lut.insert_strip_bounds(ChamberPart::Outer, 80, 152, 159);
        lut.insert_channel_wg(ChamberPart::Outer, 7, 31);
        lut.insert_pad_strip(ChamberPart::Outer, 152, 77);
        assert_eq!(
            lut.to_string(),
            "wg2ch innerB 0x2f 14 *
wg2st innerB 0x2f 96 127
st2ch outer 0x050 152 159
ch2wg outer 0x07 31
pad2st outer 0x098 77"
        );
    }

    #[test]
    fn lut_from_str() {
        let mut lut = RegionLut::new();
        assert_eq!(lut, RegionLut::from_str("").unwrap());

        lut.insert_wg_span(ChamberPart::InnerA, 0, ChannelSpan {
            lo: Bound::Open,
            hi: Bound::At(2),
        });
        lut.insert_wg_span(ChamberPart::InnerAGanged, 3, ChannelSpan::closed(1, 4));
        lut.insert_wg_strip(ChamberPart::InnerA, 0, 0, 15);
        lut.insert_strip_bounds(ChamberPart::InnerB, 10, 20, 25);
        lut.insert_channel_wg(ChamberPart::InnerB, 2, 9);
        lut.insert_pad_strip(ChamberPart::InnerB, 22, 11);

        assert_eq!(lut, RegionLut::from_str(&lut.to_string()).unwrap());
    }

    #[test]
    fn lut_from_str_rejects_garbage() {
        assert!(RegionLut::from_str("wg2ch nowhere 0x01 1 2").is_err());
        assert!(RegionLut::from_str("wg2ch outer 0x01 1").is_err());
        assert!(RegionLut::from_str("st2ch outer 0x010 5 *").is_err());
    }
}

use crate::correlate::LctGrid;
use crate::stubs::{Lct, MAX_LCTS_PER_BX, MAX_MATCH_OFFSETS, MAX_TIME_BINS};
use crate::{Config, Observer};
use std::cmp::Reverse;

/// The preferred match-offset order used to break over-cap bunch crossings:
/// center first, then the nearest earlier offset, then the nearest later
/// one, continuing outward.
///
/// # Examples
///
/// ```
/// assert_eq!(tmb::reduce::preferred_offsets(7), vec![3, 2, 4, 1, 5, 0, 6]);
/// assert_eq!(tmb::reduce::preferred_offsets(1), vec![0]);
/// ```
pub fn preferred_offsets(window: usize) -> Vec<usize> {
    let center = window / 2;
    let mut order = Vec::with_capacity(window);
    order.push(center);
    for step in 1..=center.max(window - 1 - center) {
        if step <= center {
            order.push(center - step);
        }
        if center + step < window {
            order.push(center + step);
        }
    }
    order
}

fn offset_preference(window: usize) -> [usize; MAX_MATCH_OFFSETS] {
    let order = preferred_offsets(window.clamp(1, MAX_MATCH_OFFSETS));
    let mut rank = [usize::MAX; MAX_MATCH_OFFSETS];
    for (position, &offset) in order.iter().enumerate() {
        rank[offset] = position;
    }
    // Offsets outside the configured window sort last, in offset order.
    for (offset, slot) in rank.iter_mut().enumerate() {
        if *slot == usize::MAX {
            *slot = MAX_MATCH_OFFSETS + offset;
        }
    }
    rank
}

/// Enforce the per-bunch-crossing cap over the full candidate grid.
///
/// Over-cap crossings are re-ordered by the preferred-offset sequence (or
/// by descending quality with offset preference as tie-break, under the
/// quality-sort flag) and truncated. Truncation clears slots in place; the
/// grid keeps its shape.
pub(crate) fn reduce<O: Observer>(grid: &mut LctGrid, cfg: &Config, observer: &mut O) {
    let window = (2 * cfg.match_half_width.max(0) as usize + 1).min(MAX_MATCH_OFFSETS);
    let preference = offset_preference(window);
    let cap = cfg.max_lcts_per_bx.min(MAX_LCTS_PER_BX);

    for bin in 0..MAX_TIME_BINS {
        let mut candidates: Vec<(usize, usize, Lct)> = Vec::new();
        for offset in 0..MAX_MATCH_OFFSETS {
            for rank in 0..MAX_LCTS_PER_BX {
                let lct = grid.get(bin as i32, offset, rank);
                if lct.valid {
                    candidates.push((offset, rank, lct));
                }
            }
        }
        if candidates.len() <= cap {
            continue;
        }

        if cfg.sort_by_quality {
            candidates
                .sort_by_key(|&(offset, rank, lct)| (Reverse(lct.quality), preference[offset], rank));
        } else {
            candidates.sort_by_key(|&(offset, rank, _)| (preference[offset], rank));
        }

        for &(offset, rank, ref lct) in &candidates[cap..] {
            observer.on_ghost_cancelled(lct);
            *grid.slot_mut(bin, offset, rank) = Lct::default();
        }
    }
}

/// Select the LCTs whose bunch crossing falls in the readout coincidence
/// window `(trigger_accept - early, trigger_accept + late]`.
///
/// Under the earliest-only policy, once a populated in-window crossing is
/// found only that crossing is read out; later ones are dropped even if
/// otherwise in-window. That models a readout slot limitation, not a
/// logical requirement.
pub(crate) fn readout<O: Observer>(grid: &LctGrid, cfg: &Config, observer: &mut O) -> Vec<Lct> {
    let lo = cfg.trigger_accept - cfg.early_margin;
    let hi = cfg.trigger_accept + cfg.late_margin;

    let mut out = Vec::new();
    let mut earliest: Option<i32> = None;
    for bx in 0..MAX_TIME_BINS as i32 {
        if !(bx > lo && bx <= hi) {
            continue;
        }
        let stubs: Vec<Lct> = grid.at_bx(bx).copied().collect();
        if stubs.is_empty() {
            continue;
        }
        if cfg.readout_earliest_only {
            match earliest {
                None => earliest = Some(bx),
                Some(first) if bx != first => break,
                Some(_) => {}
            }
        }
        for lct in stubs {
            observer.on_readout(&lct);
            out.push(lct);
        }
    }
    out
}

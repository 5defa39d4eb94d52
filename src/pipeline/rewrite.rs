//! Canonical-set scan: decide which images stay and which become references.
//!
//! Images are offered in document order. Each one is compared against the
//! images kept so far; the first match wins and the newcomer is recorded as
//! a clone of that slot. A newcomer that matches but carries strictly more
//! pixels takes over the slot (promotion) and the previous holder is
//! demoted to a clone. Clones remember the *slot*, not the element, so
//! every reference resolves to whichever image finally holds the slot.

use crate::pipeline::extract::DecodedImage;
use crate::pipeline::matcher::{self, MatchVerdict};
use tracing::{debug, info};

/// An image that survives as a canonical copy.
#[derive(Debug)]
pub struct KeptImage {
    /// Index into the document's image-element list.
    pub element_index: usize,
    pub image: DecodedImage,
}

/// An image that will be rewritten into a `<use>` reference.
#[derive(Debug, Clone, Copy)]
pub struct CloneAssignment {
    /// Index into the document's image-element list.
    pub element_index: usize,
    /// Slot in [`RewritePlan::kept`] this clone points at.
    pub kept_slot: usize,
    /// Match score that established the duplicate.
    pub score: f32,
}

/// Outcome of scanning every image in a document.
#[derive(Debug)]
pub struct RewritePlan {
    pub kept: Vec<KeptImage>,
    pub clones: Vec<CloneAssignment>,
    pub promotions: usize,
    pub incomparable_pairs: usize,
}

/// Incremental scan state.
#[derive(Debug)]
pub struct CanonicalScan {
    threshold: f32,
    kept: Vec<KeptImage>,
    clones: Vec<CloneAssignment>,
    promotions: usize,
    incomparable_pairs: usize,
}

impl CanonicalScan {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            kept: Vec::new(),
            clones: Vec::new(),
            promotions: 0,
            incomparable_pairs: 0,
        }
    }

    /// Offer the next image in document order. Returns `true` when it was
    /// recognised as a duplicate of an already-kept image.
    pub fn offer(&mut self, element_index: usize, image: DecodedImage) -> bool {
        for slot in 0..self.kept.len() {
            match matcher::compare(&image, &self.kept[slot].image, self.threshold) {
                MatchVerdict::Match { score } => {
                    if image.pixel_count() > self.kept[slot].image.pixel_count() {
                        // Same picture at higher resolution: the newcomer
                        // takes the slot and the old holder becomes a clone.
                        let demoted = std::mem::replace(
                            &mut self.kept[slot],
                            KeptImage {
                                element_index,
                                image,
                            },
                        );
                        self.clones.push(CloneAssignment {
                            element_index: demoted.element_index,
                            kept_slot: slot,
                            score,
                        });
                        self.promotions += 1;
                        debug!(slot, score, "promoted larger duplicate to canonical copy");
                    } else {
                        debug!(slot, score, "image is a duplicate of a kept copy");
                        self.clones.push(CloneAssignment {
                            element_index,
                            kept_slot: slot,
                            score,
                        });
                    }
                    return true;
                }
                MatchVerdict::Incomparable => {
                    self.incomparable_pairs += 1;
                }
                MatchVerdict::NoMatch { .. } => {}
            }
        }
        self.kept.push(KeptImage {
            element_index,
            image,
        });
        false
    }

    pub fn into_plan(self) -> RewritePlan {
        info!(
            kept = self.kept.len(),
            clones = self.clones.len(),
            promotions = self.promotions,
            "image scan complete"
        );
        RewritePlan {
            kept: self.kept,
            clones: self.clones,
            promotions: self.promotions,
            incomparable_pairs: self.incomparable_pairs,
        }
    }
}

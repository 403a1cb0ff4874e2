//! Per-frame association of no-helmet detections with riders and plates.
//!
//! Association is deliberately greedy: a rider containing the no-helmet
//! centroid wins on first match in detector emission order, and a plate is
//! the first one whose centroid falls inside the selected rider. The
//! first-match plate policy is preserved from the deployed behavior rather
//! than refined to best-match.

use crate::detect::{Detection, FrameDetections};

/// Annotation state for a candidate, mirroring what the frame overlay used to
/// render. `PlateDetected` means the stride gate was not reached this frame;
/// the dedup gate was never consulted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CandidateStatus {
    /// Plate crop handed to the recognition dispatcher.
    Processing,
    /// Dedup cache saw a recent submission near this plate.
    SkippedRecent,
    /// Plate associated, gates not evaluated on this frame.
    PlateDetected,
}

/// One no-helmet detection with whatever the correlator could attach to it.
/// At most one per no-helmet detection per frame; never persisted.
#[derive(Clone, Debug)]
pub struct ViolationCandidate {
    pub no_helmet: Detection,
    pub rider: Option<Detection>,
    pub plate: Option<Detection>,
}

/// Build violation candidates for one frame.
///
/// Rider selection per no-helmet box: the first rider (emission order) whose
/// box contains the no-helmet centroid is taken immediately; later riders are
/// never considered even with higher overlap. If no rider contains the
/// centroid, the rider with strictly maximal IoU wins, ties keeping the
/// first-seen maximum; an all-zero IoU field yields no rider.
pub fn correlate_frame(detections: &FrameDetections) -> Vec<ViolationCandidate> {
    detections
        .no_helmets
        .iter()
        .map(|no_helmet| {
            let rider = associate_rider(no_helmet, &detections.riders);
            let plate = rider
                .as_ref()
                .and_then(|r| associate_plate(r, &detections.plates));
            ViolationCandidate {
                no_helmet: no_helmet.clone(),
                rider,
                plate,
            }
        })
        .collect()
}

fn associate_rider(no_helmet: &Detection, riders: &[Detection]) -> Option<Detection> {
    let centroid = no_helmet.bbox.centroid();
    let mut best: Option<&Detection> = None;
    let mut best_iou = 0.0f32;

    for rider in riders {
        if rider.bbox.contains(centroid) {
            return Some(rider.clone());
        }
        let iou = no_helmet.bbox.iou(&rider.bbox);
        if iou > best_iou {
            best_iou = iou;
            best = Some(rider);
        }
    }
    best.cloned()
}

fn associate_plate(rider: &Detection, plates: &[Detection]) -> Option<Detection> {
    plates
        .iter()
        .find(|plate| rider.bbox.contains(plate.bbox.centroid()))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::ObjectClass;
    use crate::geometry::BoundingBox;

    fn det(class: ObjectClass, x1: f32, y1: f32, x2: f32, y2: f32) -> Detection {
        Detection {
            class,
            bbox: BoundingBox::new(x1, y1, x2, y2),
            confidence: 0.9,
        }
    }

    fn frame(no_helmets: Vec<Detection>, riders: Vec<Detection>, plates: Vec<Detection>) -> FrameDetections {
        FrameDetections {
            helmets: vec![],
            no_helmets,
            riders,
            plates,
        }
    }

    #[test]
    fn containing_rider_beats_higher_iou_rider() {
        let no_helmet = det(ObjectClass::NoHelmet, 40.0, 40.0, 60.0, 60.0);
        // First rider barely contains the centroid (50, 50); second overlaps
        // the no-helmet box far more but comes later.
        let tight = det(ObjectClass::Rider, 45.0, 45.0, 55.0, 200.0);
        let generous = det(ObjectClass::Rider, 38.0, 38.0, 62.0, 62.0);
        let out = correlate_frame(&frame(vec![no_helmet], vec![tight.clone(), generous], vec![]));
        assert_eq!(out[0].rider.as_ref().unwrap().bbox, tight.bbox);
    }

    #[test]
    fn first_containing_rider_wins_in_emission_order() {
        let no_helmet = det(ObjectClass::NoHelmet, 40.0, 40.0, 60.0, 60.0);
        let first = det(ObjectClass::Rider, 0.0, 0.0, 100.0, 100.0);
        let second = det(ObjectClass::Rider, 30.0, 30.0, 70.0, 70.0);
        let out = correlate_frame(&frame(vec![no_helmet], vec![first.clone(), second], vec![]));
        assert_eq!(out[0].rider.as_ref().unwrap().bbox, first.bbox);
    }

    #[test]
    fn iou_fallback_picks_strict_maximum() {
        // Centroid (50, 15) outside both riders.
        let no_helmet = det(ObjectClass::NoHelmet, 40.0, 10.0, 60.0, 20.0);
        let slim = det(ObjectClass::Rider, 40.0, 20.0, 60.0, 40.0);
        let touching = det(ObjectClass::Rider, 40.0, 18.0, 60.0, 40.0);
        let out = correlate_frame(&frame(vec![no_helmet], vec![slim, touching.clone()], vec![]));
        assert_eq!(out[0].rider.as_ref().unwrap().bbox, touching.bbox);
    }

    #[test]
    fn zero_iou_and_no_containment_means_no_rider() {
        let no_helmet = det(ObjectClass::NoHelmet, 0.0, 0.0, 10.0, 10.0);
        let far = det(ObjectClass::Rider, 500.0, 500.0, 600.0, 600.0);
        let out = correlate_frame(&frame(vec![no_helmet], vec![far], vec![]));
        assert!(out[0].rider.is_none());
        assert!(out[0].plate.is_none());
    }

    #[test]
    fn no_riders_no_association() {
        let no_helmet = det(ObjectClass::NoHelmet, 0.0, 0.0, 10.0, 10.0);
        let plate = det(ObjectClass::Plate, 2.0, 2.0, 8.0, 6.0);
        let out = correlate_frame(&frame(vec![no_helmet], vec![], vec![plate]));
        assert!(out[0].rider.is_none());
        // A plate without a rider is never associated.
        assert!(out[0].plate.is_none());
    }

    #[test]
    fn plate_is_first_match_not_best_match() {
        let no_helmet = det(ObjectClass::NoHelmet, 40.0, 0.0, 60.0, 20.0);
        let rider = det(ObjectClass::Rider, 0.0, 0.0, 100.0, 200.0);
        // Both plates sit inside the rider; emission order decides.
        let first = det(ObjectClass::Plate, 10.0, 150.0, 30.0, 160.0);
        let centered = det(ObjectClass::Plate, 45.0, 150.0, 55.0, 160.0);
        let out = correlate_frame(&frame(
            vec![no_helmet],
            vec![rider],
            vec![first.clone(), centered],
        ));
        assert_eq!(out[0].plate.as_ref().unwrap().bbox, first.bbox);
    }

    #[test]
    fn one_candidate_per_no_helmet_detection() {
        let a = det(ObjectClass::NoHelmet, 0.0, 0.0, 10.0, 10.0);
        let b = det(ObjectClass::NoHelmet, 100.0, 100.0, 120.0, 120.0);
        let out = correlate_frame(&frame(vec![a, b], vec![], vec![]));
        assert_eq!(out.len(), 2);
    }
}

//! Frame processing loop.
//!
//! `FrameProcessor` owns the registry. For each frame it:
//! 1. Validates every raw observation (the whole frame, before counting)
//! 2. Applies the invalid-input policy when validation fails
//! 3. Dispatches observations to their class counters in frame order
//! 4. Advances the baseline expiry clock
//!
//! Frames are handled strictly one after another. To move counting off the
//! capture thread, move the whole processor into a worker and feed it frames
//! in order; counters are never shared.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::geometry::Direction;
use crate::ingest::ObservationSource;
use crate::observation::{Identity, Observation, TrackedFrame};
use crate::registry::{ClassCounterRegistry, ClassLabel, ClassTotals};

/// What to do with a frame that carries a malformed bounding box.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidInputPolicy {
    /// Stop processing and return the validation error.
    #[default]
    Halt,
    /// Drop the whole frame and keep going.
    SkipFrame,
}

impl std::str::FromStr for InvalidInputPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "halt" => Ok(Self::Halt),
            "skip_frame" | "skip" => Ok(Self::SkipFrame),
            other => Err(anyhow!(
                "invalid input policy must be 'halt' or 'skip_frame', got '{}'",
                other
            )),
        }
    }
}

/// One completed crossing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossingEvent {
    pub frame: u64,
    pub class: ClassLabel,
    /// Index of the counter within its class, in registration order.
    pub counter: usize,
    pub direction: Direction,
    pub identity: Identity,
    pub centroid: i64,
}

/// Outcome of one frame.
#[derive(Clone, Debug, Default)]
pub struct FrameReport {
    pub frame: u64,
    pub crossings: Vec<CrossingEvent>,
    /// Observations not forwarded to any counter (class not registered).
    pub ignored: usize,
    /// True when the frame was dropped by `InvalidInputPolicy::SkipFrame`.
    pub skipped: bool,
    pub evicted: usize,
}

impl FrameReport {
    /// Classes with at least one crossing on this frame, first-seen order.
    pub fn counted_classes(&self) -> Vec<&ClassLabel> {
        let mut classes: Vec<&ClassLabel> = Vec::new();
        for event in &self.crossings {
            if !classes.contains(&&event.class) {
                classes.push(&event.class);
            }
        }
        classes
    }
}

pub struct FrameProcessor {
    registry: ClassCounterRegistry,
    on_invalid: InvalidInputPolicy,
    next_frame: u64,
    frames_processed: u64,
    frames_skipped: u64,
}

impl FrameProcessor {
    pub fn new(registry: ClassCounterRegistry, on_invalid: InvalidInputPolicy) -> Self {
        Self {
            registry,
            on_invalid,
            next_frame: 0,
            frames_processed: 0,
            frames_skipped: 0,
        }
    }

    pub fn registry(&self) -> &ClassCounterRegistry {
        &self.registry
    }

    pub fn into_registry(self) -> ClassCounterRegistry {
        self.registry
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    pub fn frames_skipped(&self) -> u64 {
        self.frames_skipped
    }

    pub fn summary(&self) -> Vec<ClassTotals> {
        self.registry.class_totals()
    }

    pub fn process_frame(&mut self, tracked: &TrackedFrame) -> Result<FrameReport> {
        let frame = tracked.frame.unwrap_or(self.next_frame);
        self.next_frame = frame.wrapping_add(1);

        let mut observations = Vec::with_capacity(tracked.objects.len());
        for raw in &tracked.objects {
            match Observation::try_from(raw) {
                Ok(obs) => observations.push(obs),
                Err(e) => match self.on_invalid {
                    InvalidInputPolicy::Halt => {
                        return Err(anyhow!("frame {}: {}", frame, e));
                    }
                    InvalidInputPolicy::SkipFrame => {
                        log::warn!("frame {} skipped: {}", frame, e);
                        self.frames_skipped += 1;
                        return Ok(FrameReport {
                            frame,
                            skipped: true,
                            ..FrameReport::default()
                        });
                    }
                },
            }
        }

        let mut report = FrameReport {
            frame,
            ..FrameReport::default()
        };
        for obs in &observations {
            let Some((class, fired)) =
                self.registry
                    .dispatch_fired(&obs.class_label, &obs.bbox, obs.identity)
            else {
                report.ignored += 1;
                continue;
            };
            for (idx, config) in fired {
                let event = CrossingEvent {
                    frame,
                    class: class.clone(),
                    counter: idx,
                    direction: config.direction,
                    identity: obs.identity,
                    centroid: obs.bbox.centroid(config.axis),
                };
                log::info!(
                    "crossing frame={} class={} direction={} id={} centroid={}",
                    event.frame,
                    event.class,
                    event.direction.as_str(),
                    event.identity,
                    event.centroid
                );
                report.crossings.push(event);
            }
        }

        report.evicted = self.registry.advance_frame();
        if report.evicted > 0 {
            log::debug!("frame {}: evicted {} stale baselines", frame, report.evicted);
        }
        self.frames_processed += 1;
        Ok(report)
    }

    /// Drive `source` until it is exhausted, handing each report to
    /// `on_report`. Returns the number of frames read.
    pub fn run<S, F>(&mut self, source: &mut S, mut on_report: F) -> Result<u64>
    where
        S: ObservationSource + ?Sized,
        F: FnMut(&FrameReport) -> Result<()>,
    {
        let mut frames = 0u64;
        while let Some(tracked) = source.next_frame()? {
            let report = self.process_frame(&tracked)?;
            on_report(&report)?;
            frames += 1;
        }
        log::info!(
            "source {} exhausted after {} frames ({} skipped)",
            source.name(),
            frames,
            self.frames_skipped
        );
        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::{CrossingCounter, LineConfig};
    use crate::geometry::Axis;
    use crate::ingest::ScriptedSource;
    use crate::observation::RawObservation;

    fn processor(on_invalid: InvalidInputPolicy) -> FrameProcessor {
        let mut registry = ClassCounterRegistry::new();
        for direction in [Direction::Positive, Direction::Negative] {
            registry
                .register(
                    "car",
                    CrossingCounter::new(LineConfig::new(Axis::Vertical, direction, 500)),
                )
                .unwrap();
        }
        FrameProcessor::new(registry, on_invalid)
    }

    fn obj(class: &str, id: i64, bbox: [f64; 4]) -> RawObservation {
        RawObservation {
            bbox,
            id: Identity::from(id),
            class_label: class.to_string(),
        }
    }

    fn frame(objects: Vec<RawObservation>) -> TrackedFrame {
        TrackedFrame {
            frame: None,
            objects,
        }
    }

    #[test]
    fn emits_crossing_events() {
        let mut proc = processor(InvalidInputPolicy::Halt);
        let first = proc
            .process_frame(&frame(vec![obj("car", 7, [380.0, 100.0, 420.0, 140.0])]))
            .unwrap();
        assert!(first.crossings.is_empty());
        assert_eq!(first.frame, 0);

        let second = proc
            .process_frame(&frame(vec![
                obj("car", 7, [580.0, 100.0, 620.0, 140.0]),
                obj("boat", 8, [580.0, 100.0, 620.0, 140.0]),
            ]))
            .unwrap();
        assert_eq!(second.frame, 1);
        assert_eq!(second.ignored, 1);
        assert_eq!(
            second.crossings,
            vec![CrossingEvent {
                frame: 1,
                class: ClassLabel::new("car").unwrap(),
                counter: 0,
                direction: Direction::Positive,
                identity: Identity::Tracked(7),
                centroid: 600,
            }]
        );
        assert_eq!(second.counted_classes().len(), 1);
        assert_eq!(proc.frames_processed(), 2);
    }

    #[test]
    fn producer_frame_numbers_are_kept() {
        let mut proc = processor(InvalidInputPolicy::Halt);
        let report = proc
            .process_frame(&TrackedFrame {
                frame: Some(41),
                objects: vec![],
            })
            .unwrap();
        assert_eq!(report.frame, 41);
        let next = proc.process_frame(&frame(vec![])).unwrap();
        assert_eq!(next.frame, 42);
    }

    #[test]
    fn last_frame_number_wraps_the_implicit_counter() {
        let mut proc = processor(InvalidInputPolicy::Halt);
        let report = proc
            .process_frame(&TrackedFrame {
                frame: Some(u64::MAX),
                objects: vec![],
            })
            .unwrap();
        assert_eq!(report.frame, u64::MAX);
        let next = proc.process_frame(&frame(vec![])).unwrap();
        assert_eq!(next.frame, 0);
    }

    #[test]
    fn huge_coordinates_fail_as_invalid_geometry() {
        let mut proc = processor(InvalidInputPolicy::Halt);
        let mut source = crate::ingest::JsonLinesSource::new(
            "fixture",
            std::io::Cursor::new(
                "{\"objects\":[{\"bbox\":[10,0,1e30,10],\"id\":1,\"class\":\"car\"}]}\n",
            ),
        );
        let err = proc.run(&mut source, |_| Ok(())).unwrap_err();
        assert!(err.to_string().contains("invalid geometry"));
        assert_eq!(proc.frames_processed(), 0);
    }

    #[test]
    fn multi_word_classes_reach_their_counters() {
        let mut registry = ClassCounterRegistry::new();
        registry
            .register(
                "traffic light",
                CrossingCounter::new(LineConfig::new(Axis::Vertical, Direction::Positive, 500)),
            )
            .unwrap();
        let mut proc = FrameProcessor::new(registry, InvalidInputPolicy::Halt);
        proc.process_frame(&frame(vec![obj("Traffic Light", 3, [380.0, 0.0, 420.0, 10.0])]))
            .unwrap();
        let report = proc
            .process_frame(&frame(vec![obj("traffic light", 3, [580.0, 0.0, 620.0, 10.0])]))
            .unwrap();
        assert_eq!(report.ignored, 0);
        assert_eq!(report.crossings.len(), 1);
        assert_eq!(report.crossings[0].class.as_str(), "traffic_light");
    }

    #[test]
    fn halt_policy_returns_error_and_touches_nothing() {
        let mut proc = processor(InvalidInputPolicy::Halt);
        let err = proc
            .process_frame(&frame(vec![
                obj("car", 1, [380.0, 100.0, 420.0, 140.0]),
                obj("car", 2, [420.0, 100.0, 380.0, 140.0]),
            ]))
            .unwrap_err();
        assert!(err.to_string().contains("invalid geometry"));
        let counters = proc.registry().counters("car").unwrap();
        assert_eq!(counters[0].tracked_identities(), 0);
    }

    #[test]
    fn skip_policy_drops_whole_frame() {
        let mut proc = processor(InvalidInputPolicy::SkipFrame);
        let report = proc
            .process_frame(&frame(vec![
                obj("car", 1, [380.0, 100.0, 420.0, 140.0]),
                obj("car", 2, [0.0, f64::NAN, 10.0, 10.0]),
            ]))
            .unwrap();
        assert!(report.skipped);
        assert_eq!(proc.frames_skipped(), 1);
        assert_eq!(proc.registry().counters("car").unwrap()[0].tracked_identities(), 0);
    }

    #[test]
    fn run_drains_source_and_summarizes() {
        let mut proc = processor(InvalidInputPolicy::Halt);
        let mut source = ScriptedSource::new(vec![
            frame(vec![obj("car", 1, [380.0, 0.0, 420.0, 10.0])]),
            frame(vec![obj("car", 1, [580.0, 0.0, 620.0, 10.0])]),
            frame(vec![obj("car", 1, [380.0, 0.0, 420.0, 10.0])]),
        ]);
        let mut events = Vec::new();
        let frames = proc
            .run(&mut source, |report| {
                events.extend(report.crossings.iter().cloned());
                Ok(())
            })
            .unwrap();
        assert_eq!(frames, 3);
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].direction, Direction::Negative);

        let summary = proc.summary();
        assert_eq!(summary[0].positive, 1);
        assert_eq!(summary[0].negative, 1);
        assert_eq!(summary[0].total, 2);
    }
}

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

use crate::counter::{CrossingCounter, LineConfig};
use crate::geometry::{Axis, Direction};
use crate::pipeline::{FrameProcessor, InvalidInputPolicy};
use crate::registry::{ClassCounterRegistry, ClassLabel, UnknownIdentityPolicy};

const DEFAULT_LINE_POSITION: i64 = 500;
const DEFAULT_TOLERANCE_OFFSET: u32 = 0;
const DEFAULT_EVICT_AFTER_FRAMES: u64 = 300;
const DEFAULT_CLASSES: &[&str] = &["car", "truck", "motorbike", "bicycle", "person", "dog"];
const DEFAULT_DIRECTIONS: &[Direction] = &[Direction::Positive, Direction::Negative];

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CounterdConfigFile {
    line: Option<LineConfigFile>,
    identity: Option<IdentityConfigFile>,
    pipeline: Option<PipelineConfigFile>,
    classes: Option<Vec<ClassConfigFile>>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct LineConfigFile {
    axis: Option<Axis>,
    position: Option<i64>,
    tolerance_offset: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct IdentityConfigFile {
    unknown: Option<UnknownIdentityPolicy>,
    evict_after_frames: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PipelineConfigFile {
    on_invalid: Option<InvalidInputPolicy>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ClassConfigFile {
    label: String,
    counters: Option<Vec<CounterConfigFile>>,
}

/// Per-counter overrides; unset fields inherit from `[line]`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CounterConfigFile {
    direction: Direction,
    axis: Option<Axis>,
    position: Option<i64>,
    tolerance_offset: Option<u32>,
}

/// Fully resolved configuration for `crosscountd`.
#[derive(Debug, Clone)]
pub struct CounterdConfig {
    pub line: LineSettings,
    pub classes: Vec<ClassSettings>,
    pub unknown_identity: UnknownIdentityPolicy,
    /// Baseline expiry in frames of absence; 0 disables expiry.
    pub evict_after_frames: u64,
    pub on_invalid: InvalidInputPolicy,
}

/// Default line geometry shared by every counter without overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSettings {
    pub axis: Axis,
    pub position: i64,
    pub tolerance_offset: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassSettings {
    pub label: ClassLabel,
    pub counters: Vec<CounterSettings>,
}

/// A counter as configured. Line fields left `None` follow the `[line]`
/// section, so environment overrides of the line reach them too.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSettings {
    pub direction: Direction,
    pub axis: Option<Axis>,
    pub position: Option<i64>,
    pub tolerance_offset: Option<u32>,
}

impl CounterSettings {
    fn inherit(direction: Direction) -> Self {
        Self {
            direction,
            axis: None,
            position: None,
            tolerance_offset: None,
        }
    }

    pub fn resolve(&self, line: &LineSettings) -> LineConfig {
        LineConfig::new(
            self.axis.unwrap_or(line.axis),
            self.direction,
            self.position.unwrap_or(line.position),
        )
        .with_tolerance(self.tolerance_offset.unwrap_or(line.tolerance_offset))
    }
}

impl CounterdConfig {
    /// Load from the file named by `CROSSCOUNT_CONFIG` (if set), then apply
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("CROSSCOUNT_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Load from an explicit file (or defaults), then apply environment
    /// overrides.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: CounterdConfigFile) -> Result<Self> {
        let line_file = file.line.unwrap_or_default();
        let line = LineSettings {
            axis: line_file.axis.unwrap_or(Axis::Vertical),
            position: line_file.position.unwrap_or(DEFAULT_LINE_POSITION),
            tolerance_offset: line_file
                .tolerance_offset
                .unwrap_or(DEFAULT_TOLERANCE_OFFSET),
        };

        let classes = match file.classes {
            Some(classes) => classes
                .into_iter()
                .map(|class| -> Result<ClassSettings> {
                    let counters = match class.counters {
                        Some(counters) => counters
                            .into_iter()
                            .map(|c| CounterSettings {
                                direction: c.direction,
                                axis: c.axis,
                                position: c.position,
                                tolerance_offset: c.tolerance_offset,
                            })
                            .collect(),
                        None => default_counters(),
                    };
                    Ok(ClassSettings {
                        label: ClassLabel::new(&class.label)?,
                        counters,
                    })
                })
                .collect::<Result<Vec<_>>>()?,
            None => default_classes()?,
        };

        let identity = file.identity.unwrap_or_default();
        Ok(Self {
            line,
            classes,
            unknown_identity: identity.unknown.unwrap_or_default(),
            evict_after_frames: identity
                .evict_after_frames
                .unwrap_or(DEFAULT_EVICT_AFTER_FRAMES),
            on_invalid: file
                .pipeline
                .and_then(|pipeline| pipeline.on_invalid)
                .unwrap_or_default(),
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(position) = std::env::var("CROSSCOUNT_LINE_POSITION") {
            self.line.position = position
                .trim()
                .parse()
                .map_err(|_| anyhow!("CROSSCOUNT_LINE_POSITION must be an integer pixel coordinate"))?;
        }
        if let Ok(axis) = std::env::var("CROSSCOUNT_AXIS") {
            if !axis.trim().is_empty() {
                self.line.axis = axis.parse()?;
            }
        }
        if let Ok(offset) = std::env::var("CROSSCOUNT_TOLERANCE") {
            self.line.tolerance_offset = offset.trim().parse().map_err(|_| {
                anyhow!("CROSSCOUNT_TOLERANCE must be a non-negative integer")
            })?;
        }
        if let Ok(classes) = std::env::var("CROSSCOUNT_CLASSES") {
            let parsed = split_csv(&classes);
            if !parsed.is_empty() {
                self.classes = parsed
                    .iter()
                    .map(|label| -> Result<ClassSettings> {
                        Ok(ClassSettings {
                            label: ClassLabel::new(label)?,
                            counters: default_counters(),
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
            }
        }
        if let Ok(frames) = std::env::var("CROSSCOUNT_EVICT_FRAMES") {
            self.evict_after_frames = frames.trim().parse().map_err(|_| {
                anyhow!("CROSSCOUNT_EVICT_FRAMES must be an integer number of frames")
            })?;
        }
        if let Ok(policy) = std::env::var("CROSSCOUNT_UNKNOWN_IDENTITY") {
            if !policy.trim().is_empty() {
                self.unknown_identity = policy.parse()?;
            }
        }
        if let Ok(policy) = std::env::var("CROSSCOUNT_ON_INVALID") {
            if !policy.trim().is_empty() {
                self.on_invalid = policy.parse()?;
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.classes.is_empty() {
            return Err(anyhow!("at least one class must be configured"));
        }
        let mut seen = HashSet::new();
        for class in &self.classes {
            if !seen.insert(class.label.clone()) {
                return Err(anyhow!("class '{}' configured more than once", class.label));
            }
            if class.counters.is_empty() {
                return Err(anyhow!("class '{}' has no counters", class.label));
            }
        }
        if self.line.position < 0 {
            return Err(anyhow!("line position must be a non-negative pixel coordinate"));
        }
        if self
            .classes
            .iter()
            .flat_map(|class| &class.counters)
            .any(|counter| counter.position.is_some_and(|p| p < 0))
        {
            return Err(anyhow!("counter line position must be a non-negative pixel coordinate"));
        }
        Ok(())
    }

    /// Build the registry described by this configuration.
    pub fn build_registry(&self) -> Result<ClassCounterRegistry> {
        let mut registry =
            ClassCounterRegistry::new().with_unknown_identity(self.unknown_identity);
        for class in &self.classes {
            for counter in &class.counters {
                let mut built = CrossingCounter::new(counter.resolve(&self.line));
                if self.evict_after_frames > 0 {
                    built = built.with_expiry(self.evict_after_frames);
                }
                registry.register(class.label.as_str(), built)?;
            }
        }
        log::debug!(
            "registry built: {} classes, unknown identities {:?}",
            self.classes.len(),
            self.unknown_identity
        );
        Ok(registry)
    }

    pub fn build_processor(&self) -> Result<FrameProcessor> {
        Ok(FrameProcessor::new(self.build_registry()?, self.on_invalid))
    }
}

fn default_counters() -> Vec<CounterSettings> {
    DEFAULT_DIRECTIONS
        .iter()
        .map(|&direction| CounterSettings::inherit(direction))
        .collect()
}

fn default_classes() -> Result<Vec<ClassSettings>> {
    DEFAULT_CLASSES
        .iter()
        .map(|label| -> Result<ClassSettings> {
            Ok(ClassSettings {
                label: ClassLabel::new(label)?,
                counters: default_counters(),
            })
        })
        .collect()
}

fn read_config_file(path: &Path) -> Result<CounterdConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let cfg = if is_json {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_stock_classes_with_both_directions() {
        let cfg = CounterdConfig::from_file(CounterdConfigFile::default()).unwrap();
        cfg.validate().unwrap();
        let labels: Vec<&str> = cfg.classes.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, DEFAULT_CLASSES);
        assert_eq!(cfg.line.position, 500);
        assert_eq!(cfg.line.axis, Axis::Vertical);
        assert_eq!(cfg.line.tolerance_offset, 0);

        let registry = cfg.build_registry().unwrap();
        let car = registry.counters("car").unwrap();
        assert_eq!(car.len(), 2);
        assert_eq!(car[0].config().direction, Direction::Positive);
        assert_eq!(car[1].config().direction, Direction::Negative);
    }

    #[test]
    fn parses_toml_with_per_counter_overrides() {
        let raw = r#"
            [line]
            axis = "horizontal"
            position = 320
            tolerance_offset = 4

            [identity]
            unknown = "count"
            evict_after_frames = 0

            [pipeline]
            on_invalid = "skip_frame"

            [[classes]]
            label = "person"
            counters = [
                { direction = "positive" },
                { direction = "negative", position = 340, tolerance_offset = 0 },
            ]

            [[classes]]
            label = "Bicycle"
        "#;
        let file: CounterdConfigFile = toml::from_str(raw).unwrap();
        let cfg = CounterdConfig::from_file(file).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.unknown_identity, UnknownIdentityPolicy::Count);
        assert_eq!(cfg.on_invalid, InvalidInputPolicy::SkipFrame);
        assert_eq!(cfg.classes[1].label.as_str(), "bicycle");
        assert_eq!(cfg.classes[1].counters.len(), 2);

        let person = &cfg.classes[0].counters;
        assert_eq!(
            person[0].resolve(&cfg.line),
            LineConfig::new(Axis::Horizontal, Direction::Positive, 320).with_tolerance(4)
        );
        assert_eq!(
            person[1].resolve(&cfg.line),
            LineConfig::new(Axis::Horizontal, Direction::Negative, 340)
        );
    }

    #[test]
    fn rejects_typos_at_load() {
        let bad_label: CounterdConfigFile =
            toml::from_str("[[classes]]\nlabel = \"motor.bike\"\n").unwrap();
        assert!(CounterdConfig::from_file(bad_label).is_err());

        assert!(toml::from_str::<CounterdConfigFile>("[line]\nposition = 5\naxsi = \"vertical\"\n").is_err());
        assert!(toml::from_str::<CounterdConfigFile>("[line]\naxis = \"diagonal\"\n").is_err());
    }

    #[test]
    fn validation_rejects_duplicate_and_empty_classes() {
        let dup: CounterdConfigFile =
            toml::from_str("[[classes]]\nlabel = \"car\"\n[[classes]]\nlabel = \"CAR\"\n").unwrap();
        let cfg = CounterdConfig::from_file(dup).unwrap();
        assert!(cfg.validate().is_err());

        let empty: CounterdConfigFile =
            toml::from_str("[[classes]]\nlabel = \"car\"\ncounters = []\n").unwrap();
        let cfg = CounterdConfig::from_file(empty).unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_eviction_disables_expiry() {
        let mut cfg = CounterdConfig::from_file(CounterdConfigFile::default()).unwrap();
        cfg.evict_after_frames = 0;
        let mut registry = cfg.build_registry().unwrap();
        let bbox = crate::BoundingBox::new(380, 0, 420, 10).unwrap();
        registry.dispatch("car", &bbox, crate::Identity::Tracked(1));
        for _ in 0..10_000 {
            assert_eq!(registry.advance_frame(), 0);
        }
    }
}

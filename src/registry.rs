use std::collections::HashMap;
use std::sync::OnceLock;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::counter::{CrossingCounter, LineConfig};
use crate::geometry::{BoundingBox, Direction};
use crate::observation::Identity;

// -------------------- Class Labels --------------------

/// Validated object class label.
///
/// Labels are lowercased, inner whitespace runs become `_` (detector names
/// like `"traffic light"` map to `traffic_light`), and the result must match
/// `^[a-z][a-z0-9_-]{0,63}$`. A typo such as `"motor.bike"` is rejected when
/// the registry is configured instead of silently never matching tracker
/// output.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClassLabel(String);

impl ClassLabel {
    pub fn new(label: &str) -> Result<Self> {
        static CLASS_LABEL_RE: OnceLock<regex::Regex> = OnceLock::new();
        let re = CLASS_LABEL_RE
            .get_or_init(|| regex::Regex::new(r"^[a-z][a-z0-9_-]{0,63}$").unwrap());

        let normalized = label
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("_")
            .to_lowercase();
        if !re.is_match(&normalized) {
            return Err(anyhow!(
                "class label '{}' must match ^[a-z][a-z0-9_-]{{0,63}}$",
                label
            ));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ClassLabel {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(&value)
    }
}

impl From<ClassLabel> for String {
    fn from(label: ClassLabel) -> Self {
        label.0
    }
}

impl std::fmt::Display for ClassLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// -------------------- Identity Policy --------------------

/// How observations carrying the unknown identity are counted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownIdentityPolicy {
    /// Ignore them entirely. Untracked detections share one sentinel, so
    /// counting them would let unrelated objects form a single trajectory.
    #[default]
    Skip,
    /// Treat the sentinel as an ordinary identity.
    Count,
}

impl std::str::FromStr for UnknownIdentityPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "count" => Ok(Self::Count),
            other => Err(anyhow!(
                "unknown identity policy must be 'skip' or 'count', got '{}'",
                other
            )),
        }
    }
}

// -------------------- Registry --------------------

/// Per-class totals split by crossing direction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassTotals {
    pub class: ClassLabel,
    pub positive: u64,
    pub negative: u64,
    pub total: u64,
}

#[derive(Clone, Debug)]
struct ClassEntry {
    label: ClassLabel,
    counters: Vec<CrossingCounter>,
}

/// Class label → ordered counters.
///
/// Classes and counters keep registration order, so dispatch results and
/// totals are reproducible.
#[derive(Clone, Debug, Default)]
pub struct ClassCounterRegistry {
    entries: Vec<ClassEntry>,
    index: HashMap<ClassLabel, usize>,
    unknown_identity: UnknownIdentityPolicy,
}

impl ClassCounterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_unknown_identity(mut self, policy: UnknownIdentityPolicy) -> Self {
        self.unknown_identity = policy;
        self
    }

    pub fn unknown_identity(&self) -> UnknownIdentityPolicy {
        self.unknown_identity
    }

    /// Append a counter to `label`, creating the class on first use.
    pub fn register(&mut self, label: &str, counter: CrossingCounter) -> Result<()> {
        let label = ClassLabel::new(label)?;
        let slot = match self.index.get(&label) {
            Some(&slot) => slot,
            None => {
                self.entries.push(ClassEntry {
                    label: label.clone(),
                    counters: Vec::new(),
                });
                self.index.insert(label, self.entries.len() - 1);
                self.entries.len() - 1
            }
        };
        self.entries[slot].counters.push(counter);
        Ok(())
    }

    fn slot(&self, class_label: &str) -> Option<usize> {
        let label = ClassLabel::new(class_label).ok()?;
        self.index.get(&label).copied()
    }

    pub fn contains(&self, class_label: &str) -> bool {
        self.slot(class_label).is_some()
    }

    /// Feed one observation to every counter of its class.
    ///
    /// Returns the registration indices of the counters that fired. Classes
    /// that are not registered, and unknown identities under
    /// [`UnknownIdentityPolicy::Skip`], leave all state untouched.
    pub fn dispatch(
        &mut self,
        class_label: &str,
        bbox: &BoundingBox,
        identity: Identity,
    ) -> Vec<usize> {
        match self.slot(class_label) {
            Some(slot) => self.dispatch_slot(slot, bbox, identity),
            None => {
                log::trace!("ignoring observation for unregistered class '{}'", class_label);
                Vec::new()
            }
        }
    }

    /// Like [`dispatch`](Self::dispatch), resolving the label once and
    /// returning the canonical class with the line of every counter that
    /// fired. `None` means the class is not registered.
    pub fn dispatch_fired(
        &mut self,
        class_label: &str,
        bbox: &BoundingBox,
        identity: Identity,
    ) -> Option<(&ClassLabel, Vec<(usize, LineConfig)>)> {
        let slot = self.slot(class_label)?;
        let fired = self.dispatch_slot(slot, bbox, identity);
        let entry = &self.entries[slot];
        let fired = fired
            .into_iter()
            .map(|idx| (idx, *entry.counters[idx].config()))
            .collect();
        Some((&entry.label, fired))
    }

    fn dispatch_slot(
        &mut self,
        slot: usize,
        bbox: &BoundingBox,
        identity: Identity,
    ) -> Vec<usize> {
        let entry = &mut self.entries[slot];
        if identity.is_unknown() && self.unknown_identity == UnknownIdentityPolicy::Skip {
            log::trace!("ignoring untracked '{}' observation", entry.label);
            return Vec::new();
        }

        entry
            .counters
            .iter_mut()
            .enumerate()
            .filter_map(|(idx, counter)| counter.count(bbox, identity).then_some(idx))
            .collect()
    }

    /// Sum of totals across every counter registered for `class_label`.
    ///
    /// Unregistered labels are an error rather than zero, so a misspelled
    /// lookup does not read as "nothing crossed".
    pub fn aggregate(&self, class_label: &str) -> Result<u64> {
        let slot = self
            .slot(class_label)
            .ok_or_else(|| anyhow!("class '{}' is not registered", class_label))?;
        Ok(self.entries[slot].counters.iter().map(|c| c.total()).sum())
    }

    pub fn class_totals(&self) -> Vec<ClassTotals> {
        self.entries
            .iter()
            .map(|entry| {
                let (mut positive, mut negative) = (0, 0);
                for counter in &entry.counters {
                    match counter.config().direction {
                        Direction::Positive => positive += counter.total(),
                        Direction::Negative => negative += counter.total(),
                    }
                }
                ClassTotals {
                    class: entry.label.clone(),
                    positive,
                    negative,
                    total: positive + negative,
                }
            })
            .collect()
    }

    pub fn labels(&self) -> impl Iterator<Item = &ClassLabel> {
        self.entries.iter().map(|entry| &entry.label)
    }

    pub fn counters(&self, class_label: &str) -> Option<&[CrossingCounter]> {
        self.slot(class_label)
            .map(|slot| self.entries[slot].counters.as_slice())
    }

    /// Advance every counter's frame clock. Returns evicted baselines.
    pub fn advance_frame(&mut self) -> usize {
        self.entries
            .iter_mut()
            .flat_map(|entry| entry.counters.iter_mut())
            .map(|counter| counter.advance_frame())
            .sum()
    }
}

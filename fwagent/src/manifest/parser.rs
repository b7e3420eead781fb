//! Streaming update manifest parser.
//!
//! The manifest is read token by token through `serde_json`'s deserializer
//! with hand-written seeds, so nothing but the recognized fields is
//! materialized. Extracted strings are copied once into the caller's
//! [`ScratchArena`]; unknown keys and nested values are skipped structurally.
//!
//! Steps and files beyond the configured capacity are parsed, discarded and
//! counted, never stored.

use std::fmt;

use serde::de::{self, DeserializeSeed, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};
use tracing::{debug, warn};

use super::arena::{ScratchArena, Span};
use super::model::{
    Compatibility, FileEntry, ManifestCapacity, Step, UpdateId, UpdateManifestContent,
};
use crate::error::{AgentError, AgentResult};

/// Parse an update manifest.
///
/// # Arguments
///
/// * `manifest` - Raw manifest JSON
/// * `arena` - Scratch arena receiving every extracted string
/// * `capacity` - Maximum steps and files to keep
///
/// # Errors
///
/// * [`AgentError::Malformed`] on any structurally unexpected token
/// * [`AgentError::BufferExhausted`] when the arena cannot hold the strings
pub fn parse(
    manifest: &[u8],
    arena: ScratchArena,
    capacity: ManifestCapacity,
) -> AgentResult<UpdateManifestContent> {
    let mut arena = arena;
    let mut deserializer = serde_json::Deserializer::from_slice(manifest);

    let outcome = ManifestSeed {
        arena: &mut arena,
        capacity,
    }
    .deserialize(&mut deserializer)
    .and_then(|parts| deserializer.end().map(|()| parts));

    let parts = match outcome {
        Ok(parts) => parts,
        Err(_) if arena.is_exhausted() => {
            return Err(AgentError::BufferExhausted("manifest scratch buffer"));
        }
        Err(e) => return Err(AgentError::malformed("update manifest", e.to_string())),
    };

    if parts.dropped_steps > 0 || parts.dropped_files > 0 {
        warn!(
            dropped_steps = parts.dropped_steps,
            dropped_files = parts.dropped_files,
            max_steps = capacity.steps,
            max_files = capacity.files,
            "manifest exceeds capacity, extra entries dropped"
        );
    }
    debug!(
        steps = parts.steps.len(),
        files = parts.files.len(),
        scratch_used = arena.used(),
        "manifest parsed"
    );

    Ok(UpdateManifestContent {
        arena,
        manifest_version: parts.manifest_version,
        update_id: parts.update_id,
        compatibility: parts.compatibility,
        steps: parts.steps,
        files: parts.files,
        dropped_steps: parts.dropped_steps,
        dropped_files: parts.dropped_files,
    })
}

#[derive(Default)]
struct ManifestParts {
    manifest_version: Span,
    update_id: UpdateId,
    compatibility: Compatibility,
    steps: Vec<Step>,
    files: Vec<FileEntry>,
    dropped_steps: usize,
    dropped_files: usize,
}

fn stash<E: de::Error>(arena: &mut ScratchArena, value: &str) -> Result<Span, E> {
    arena.push(value.as_bytes()).map_err(E::custom)
}

// ============================================================================
// Top level
// ============================================================================

struct ManifestSeed<'a> {
    arena: &'a mut ScratchArena,
    capacity: ManifestCapacity,
}

impl<'de, 'a> DeserializeSeed<'de> for ManifestSeed<'a> {
    type Value = ManifestParts;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de, 'a> Visitor<'de> for ManifestSeed<'a> {
    type Value = ManifestParts;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an update manifest object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let ManifestSeed { arena, capacity } = self;
        let mut parts = ManifestParts::default();

        while let Some(key) = map.next_key::<String>()? {
            match key.as_str() {
                "manifestVersion" => {
                    parts.manifest_version = map.next_value_seed(Text(&mut *arena))?;
                }
                "updateId" => {
                    parts.update_id = map.next_value_seed(UpdateIdSeed(&mut *arena))?;
                }
                "compatibility" => {
                    parts.compatibility = map.next_value_seed(CompatibilitySeed(&mut *arena))?;
                }
                "instructions" => {
                    let (steps, dropped) = map.next_value_seed(InstructionsSeed {
                        arena: &mut *arena,
                        max: capacity.steps,
                    })?;
                    parts.steps = steps;
                    parts.dropped_steps = dropped;
                }
                "files" => {
                    let (files, dropped) = map.next_value_seed(FilesSeed {
                        arena: &mut *arena,
                        max: capacity.files,
                    })?;
                    parts.files = files;
                    parts.dropped_files = dropped;
                }
                _ => {
                    map.next_value::<IgnoredAny>()?;
                }
            }
        }

        Ok(parts)
    }
}

// ============================================================================
// Strings
// ============================================================================

struct Text<'a>(&'a mut ScratchArena);

impl<'de, 'a> DeserializeSeed<'de> for Text<'a> {
    type Value = Span;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_str(self)
    }
}

impl<'de, 'a> Visitor<'de> for Text<'a> {
    type Value = Span;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a string")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
        stash(self.0, value)
    }
}

// ============================================================================
// updateId / compatibility
// ============================================================================

struct UpdateIdSeed<'a>(&'a mut ScratchArena);

impl<'de, 'a> DeserializeSeed<'de> for UpdateIdSeed<'a> {
    type Value = UpdateId;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de, 'a> Visitor<'de> for UpdateIdSeed<'a> {
    type Value = UpdateId;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an updateId object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let arena = self.0;
        let mut id = UpdateId::default();
        while let Some(key) = map.next_key::<String>()? {
            match key.as_str() {
                "provider" => id.provider = map.next_value_seed(Text(&mut *arena))?,
                "name" => id.name = map.next_value_seed(Text(&mut *arena))?,
                "version" => id.version = map.next_value_seed(Text(&mut *arena))?,
                _ => {
                    map.next_value::<IgnoredAny>()?;
                }
            }
        }
        Ok(id)
    }
}

struct CompatibilitySeed<'a>(&'a mut ScratchArena);

impl<'de, 'a> DeserializeSeed<'de> for CompatibilitySeed<'a> {
    type Value = Compatibility;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_seq(self)
    }
}

impl<'de, 'a> Visitor<'de> for CompatibilitySeed<'a> {
    type Value = Compatibility;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a compatibility array with one entry")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let compatibility = seq
            .next_element_seed(CompatibilityEntrySeed(&mut *self.0))?
            .ok_or_else(|| de::Error::custom("compatibility array is empty"))?;

        if seq.next_element::<IgnoredAny>()?.is_some() {
            return Err(de::Error::custom(
                "only one compatibility entry is supported",
            ));
        }
        Ok(compatibility)
    }
}

struct CompatibilityEntrySeed<'a>(&'a mut ScratchArena);

impl<'de, 'a> DeserializeSeed<'de> for CompatibilityEntrySeed<'a> {
    type Value = Compatibility;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de, 'a> Visitor<'de> for CompatibilityEntrySeed<'a> {
    type Value = Compatibility;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a compatibility object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let arena = self.0;
        let mut compatibility = Compatibility::default();
        while let Some(key) = map.next_key::<String>()? {
            match key.as_str() {
                "deviceManufacturer" => {
                    compatibility.manufacturer = map.next_value_seed(Text(&mut *arena))?;
                }
                "deviceModel" => compatibility.model = map.next_value_seed(Text(&mut *arena))?,
                "group" => compatibility.group = map.next_value_seed(Text(&mut *arena))?,
                _ => {
                    map.next_value::<IgnoredAny>()?;
                }
            }
        }
        Ok(compatibility)
    }
}

// ============================================================================
// instructions.steps
// ============================================================================

struct InstructionsSeed<'a> {
    arena: &'a mut ScratchArena,
    max: usize,
}

impl<'de, 'a> DeserializeSeed<'de> for InstructionsSeed<'a> {
    type Value = (Vec<Step>, usize);

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de, 'a> Visitor<'de> for InstructionsSeed<'a> {
    type Value = (Vec<Step>, usize);

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an instructions object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let InstructionsSeed { arena, max } = self;
        let mut steps = (Vec::new(), 0);
        while let Some(key) = map.next_key::<String>()? {
            if key == "steps" {
                steps = map.next_value_seed(StepsSeed {
                    arena: &mut *arena,
                    max,
                })?;
            } else {
                map.next_value::<IgnoredAny>()?;
            }
        }
        Ok(steps)
    }
}

struct StepsSeed<'a> {
    arena: &'a mut ScratchArena,
    max: usize,
}

impl<'de, 'a> DeserializeSeed<'de> for StepsSeed<'a> {
    type Value = (Vec<Step>, usize);

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_seq(self)
    }
}

impl<'de, 'a> Visitor<'de> for StepsSeed<'a> {
    type Value = (Vec<Step>, usize);

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an array of steps")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let StepsSeed { arena, max } = self;
        let mut steps = Vec::new();
        let mut dropped = 0;

        loop {
            if steps.len() < max {
                match seq.next_element_seed(StepSeed(&mut *arena))? {
                    Some(step) => steps.push(step),
                    None => break,
                }
            } else {
                match seq.next_element::<IgnoredAny>()? {
                    Some(_) => dropped += 1,
                    None => break,
                }
            }
        }

        Ok((steps, dropped))
    }
}

struct StepSeed<'a>(&'a mut ScratchArena);

impl<'de, 'a> DeserializeSeed<'de> for StepSeed<'a> {
    type Value = Step;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de, 'a> Visitor<'de> for StepSeed<'a> {
    type Value = Step;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a step object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let arena = self.0;
        let mut step = Step::default();
        while let Some(key) = map.next_key::<String>()? {
            match key.as_str() {
                "type" => step.step_type = map.next_value_seed(Text(&mut *arena))?,
                "handler" => step.handler = map.next_value_seed(Text(&mut *arena))?,
                "handlerProperties" => {
                    step.installed_criteria =
                        map.next_value_seed(HandlerPropertiesSeed(&mut *arena))?;
                }
                "files" => step.file_id = map.next_value_seed(FileIdsSeed(&mut *arena))?,
                "detachedManifestFileId" => {
                    step.detached_manifest_file_id = map.next_value_seed(Text(&mut *arena))?;
                }
                _ => {
                    map.next_value::<IgnoredAny>()?;
                }
            }
        }
        Ok(step)
    }
}

/// Extracts `installedCriteria` from `handlerProperties`.
struct HandlerPropertiesSeed<'a>(&'a mut ScratchArena);

impl<'de, 'a> DeserializeSeed<'de> for HandlerPropertiesSeed<'a> {
    type Value = Span;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de, 'a> Visitor<'de> for HandlerPropertiesSeed<'a> {
    type Value = Span;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a handlerProperties object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let arena = self.0;
        let mut criteria = Span::default();
        while let Some(key) = map.next_key::<String>()? {
            if key == "installedCriteria" {
                criteria = map.next_value_seed(Text(&mut *arena))?;
            } else {
                map.next_value::<IgnoredAny>()?;
            }
        }
        Ok(criteria)
    }
}

/// Keeps the first id of a step's `files` list.
struct FileIdsSeed<'a>(&'a mut ScratchArena);

impl<'de, 'a> DeserializeSeed<'de> for FileIdsSeed<'a> {
    type Value = Span;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_seq(self)
    }
}

impl<'de, 'a> Visitor<'de> for FileIdsSeed<'a> {
    type Value = Span;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an array of file ids")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let first = seq
            .next_element_seed(Text(&mut *self.0))?
            .unwrap_or_default();
        while seq.next_element::<IgnoredAny>()?.is_some() {}
        Ok(first)
    }
}

// ============================================================================
// files
// ============================================================================

struct FilesSeed<'a> {
    arena: &'a mut ScratchArena,
    max: usize,
}

impl<'de, 'a> DeserializeSeed<'de> for FilesSeed<'a> {
    type Value = (Vec<FileEntry>, usize);

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de, 'a> Visitor<'de> for FilesSeed<'a> {
    type Value = (Vec<FileEntry>, usize);

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a files object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let FilesSeed { arena, max } = self;
        let mut files = Vec::new();
        let mut dropped = 0;

        while let Some(id) = map.next_key::<String>()? {
            if files.len() < max {
                let id = stash(arena, &id)?;
                let mut entry = map.next_value_seed(FileEntrySeed(&mut *arena))?;
                entry.id = id;
                files.push(entry);
            } else {
                map.next_value::<IgnoredAny>()?;
                dropped += 1;
            }
        }

        Ok((files, dropped))
    }
}

struct FileEntrySeed<'a>(&'a mut ScratchArena);

impl<'de, 'a> DeserializeSeed<'de> for FileEntrySeed<'a> {
    type Value = FileEntry;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de, 'a> Visitor<'de> for FileEntrySeed<'a> {
    type Value = FileEntry;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a file object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let arena = self.0;
        let mut entry = FileEntry::default();
        while let Some(key) = map.next_key::<String>()? {
            match key.as_str() {
                "fileName" => entry.name = map.next_value_seed(Text(&mut *arena))?,
                "sizeInBytes" => entry.size_in_bytes = map.next_value::<u32>()?,
                "hashes" => entry.sha256 = map.next_value_seed(HashesSeed(&mut *arena))?,
                _ => {
                    map.next_value::<IgnoredAny>()?;
                }
            }
        }
        Ok(entry)
    }
}

/// Extracts the `sha256` member of a `hashes` object.
struct HashesSeed<'a>(&'a mut ScratchArena);

impl<'de, 'a> DeserializeSeed<'de> for HashesSeed<'a> {
    type Value = Span;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de, 'a> Visitor<'de> for HashesSeed<'a> {
    type Value = Span;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a hashes object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let arena = self.0;
        let mut sha256 = Span::default();
        while let Some(key) = map.next_key::<String>()? {
            if key == "sha256" {
                sha256 = map.next_value_seed(Text(&mut *arena))?;
            } else {
                map.next_value::<IgnoredAny>()?;
            }
        }
        Ok(sha256)
    }
}

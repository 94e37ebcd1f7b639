//! The persistence collaborator as seen from the map.

use std::collections::HashSet;
use std::sync::Mutex;

use anyhow::{bail, Context};
use waymark_protocol::{MapMeta, Marker, MarkerFilter, Scope, SetDone};

/// Query/command interface over marker records and done flags.
pub trait MarkerStore {
    fn list_markers(&self, filter: &MarkerFilter) -> anyhow::Result<Vec<Marker>>;

    /// Map metadata sorted by catalog order, then name.
    fn list_map_meta(&self) -> anyhow::Result<Vec<MapMeta>>;

    /// Idempotent: setting the current state again succeeds without change.
    fn set_done(&self, cmd: &SetDone) -> anyhow::Result<()>;
}

impl<S: MarkerStore + ?Sized> MarkerStore for &S {
    fn list_markers(&self, filter: &MarkerFilter) -> anyhow::Result<Vec<Marker>> {
        (**self).list_markers(filter)
    }

    fn list_map_meta(&self) -> anyhow::Result<Vec<MapMeta>> {
        (**self).list_map_meta()
    }

    fn set_done(&self, cmd: &SetDone) -> anyhow::Result<()> {
        (**self).set_done(cmd)
    }
}

type ProgressKey = (Scope, Option<String>, String);

/// In-process store, mostly for tests and headless tooling.
#[derive(Debug, Default)]
pub struct MemoryStore {
    markers: Vec<Marker>,
    maps: Vec<MapMeta>,
    progress: Mutex<HashSet<ProgressKey>>,
    fail_writes: bool,
    fail_reads: bool,
}

impl MemoryStore {
    pub fn new(maps: Vec<MapMeta>, markers: Vec<Marker>) -> Self {
        let mut maps = maps;
        maps.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.name.cmp(&b.name)));
        let progress = markers
            .iter()
            .filter(|m| m.done)
            .map(|m| (Scope::Account, None, m.id.clone()))
            .collect();
        Self {
            markers,
            maps,
            progress: Mutex::new(progress),
            fail_writes: false,
            fail_reads: false,
        }
    }

    /// Makes every `set_done` fail, to exercise error paths.
    pub fn failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    /// Makes every listing fail.
    pub fn failing_reads(mut self) -> Self {
        self.fail_reads = true;
        self
    }

    fn is_done(progress: &HashSet<ProgressKey>, filter: &MarkerFilter, id: &str) -> bool {
        let owner = match filter.scope {
            Scope::Account => None,
            Scope::Character => filter.character_id.clone(),
        };
        progress.contains(&(filter.scope, owner, id.to_string()))
    }
}

fn matches_filter(m: &Marker, filter: &MarkerFilter) -> bool {
    if filter.map.as_deref().is_some_and(|map| map != m.map) {
        return false;
    }
    if filter.kind.is_some_and(|k| k != m.kind) {
        return false;
    }
    if let Some(f) = filter.faction {
        if !matches!(m.faction, None | Some(waymark_protocol::Faction::Both)) && m.faction != Some(f)
        {
            return false;
        }
    }
    let q = filter.q.as_deref().map(str::trim).unwrap_or("");
    if !q.is_empty() {
        let q = q.to_lowercase();
        let hit = |s: &str| s.to_lowercase().contains(&q);
        if !(hit(&m.name) || m.region.as_deref().is_some_and(hit) || hit(&m.map)) {
            return false;
        }
    }
    true
}

impl MarkerStore for MemoryStore {
    fn list_markers(&self, filter: &MarkerFilter) -> anyhow::Result<Vec<Marker>> {
        if self.fail_reads {
            bail!("store is unavailable");
        }
        if filter.scope == Scope::Character && filter.character_id.is_none() {
            bail!("character scope requires a character id");
        }
        let progress = self
            .progress
            .lock()
            .map_err(|_| anyhow::anyhow!("progress lock poisoned"))?;
        Ok(self
            .markers
            .iter()
            .filter(|m| matches_filter(m, filter))
            .map(|m| Marker {
                done: Self::is_done(&progress, filter, &m.id),
                ..m.clone()
            })
            .filter(|m| !(filter.only_remaining && m.done))
            .collect())
    }

    fn list_map_meta(&self) -> anyhow::Result<Vec<MapMeta>> {
        if self.fail_reads {
            bail!("store is unavailable");
        }
        Ok(self.maps.clone())
    }

    fn set_done(&self, cmd: &SetDone) -> anyhow::Result<()> {
        if self.fail_writes {
            bail!("store is read-only");
        }
        if cmd.scope == Scope::Character && cmd.character_id.is_none() {
            bail!("character scope requires a character id");
        }
        self.markers
            .iter()
            .find(|m| m.id == cmd.marker_id)
            .with_context(|| format!("unknown marker {}", cmd.marker_id))?;

        let owner = match cmd.scope {
            Scope::Account => None,
            Scope::Character => cmd.character_id.clone(),
        };
        let key = (cmd.scope, owner, cmd.marker_id.clone());
        let mut progress = self
            .progress
            .lock()
            .map_err(|_| anyhow::anyhow!("progress lock poisoned"))?;
        if cmd.done {
            progress.insert(key);
        } else {
            progress.remove(&key);
        }
        Ok(())
    }
}

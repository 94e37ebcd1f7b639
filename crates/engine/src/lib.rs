use anyhow::{bail, Context};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use waymark_map::MarkerStore;
use waymark_protocol::{
    Faction, ImportInput, ImportReport, MapMeta, Marker, MarkerFilter, MarkerKind,
    ProgressImportInput, ProgressRecord, Scope, SetDone,
};

pub mod catalog;


fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .try_into()
        .unwrap_or(i64::MAX)
}

/// A write named a marker the store does not hold.
#[derive(Debug, thiserror::Error)]
#[error("unknown marker: {0}")]
pub struct UnknownMarker(pub String);

#[derive(Debug, Clone)]
pub struct Engine {
    db_path: PathBuf,
}

impl Engine {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn open(&self) -> anyhow::Result<Connection> {
        let path = self.db_path.clone();
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create db dir: {}", dir.display()))?;
        }

        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("open sqlite db: {}", path.display()))?;

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        migrate(&conn)?;
        Ok(conn)
    }

    /// Markers matching `filter`, with done flags for its scope.
    pub fn list_markers(&self, filter: &MarkerFilter) -> anyhow::Result<Vec<Marker>> {
        let owner = progress_owner(filter.scope, filter.character_id.as_deref())?;
        let q = filter
            .q
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(|q| format!("%{}%", escape_like(q)));

        let conn = self.open()?;
        let mut stmt = conn.prepare(
            r#"
SELECT m.id, m.kind, m.faction, m.map, m.region, m.name, m.note, m.x, m.y, m.source,
       CASE WHEN p.marker_id IS NULL THEN 0 ELSE 1 END AS done
FROM markers m
LEFT JOIN marker_progress p
  ON p.marker_id = m.id AND p.scope = ?1 AND p.character_id = ?2
WHERE (?3 IS NULL OR m.map = ?3)
  AND (?4 IS NULL OR m.kind = ?4)
  AND (?5 IS NULL OR m.faction IS NULL OR m.faction = 'BOTH' OR m.faction = ?5)
  AND (?6 IS NULL
       OR m.name LIKE ?6 ESCAPE '\'
       OR m.region LIKE ?6 ESCAPE '\'
       OR m.map LIKE ?6 ESCAPE '\')
  AND (?7 = 0 OR p.marker_id IS NULL)
ORDER BY m.map ASC, COALESCE(m.region, '') ASC, m.name ASC, m.id ASC
"#,
        )?;
        let rows = stmt.query_map(
            params![
                filter.scope.as_str(),
                owner,
                filter.map.as_deref(),
                filter.kind.map(MarkerKind::as_str),
                filter.faction.map(Faction::as_str),
                q,
                filter.only_remaining,
            ],
            |row| {
                let kind: String = row.get(1)?;
                let faction: Option<String> = row.get(2)?;
                let Some(kind) = MarkerKind::parse(&kind) else {
                    return Ok(None);
                };
                Ok(Some(Marker {
                    id: row.get(0)?,
                    kind,
                    faction: faction.as_deref().and_then(Faction::normalize),
                    map: row.get(3)?,
                    region: row.get(4)?,
                    name: row.get(5)?,
                    note: row.get(6)?,
                    x: row.get(7)?,
                    y: row.get(8)?,
                    source: row.get(9)?,
                    done: row.get::<_, i64>(10)? != 0,
                }))
            },
        )?;
        Ok(rows.filter_map(Result::ok).flatten().collect())
    }

    /// Sets or clears a done flag. Re-applying the current state is a no-op.
    pub fn set_done(&self, cmd: &SetDone) -> anyhow::Result<()> {
        let owner = progress_owner(cmd.scope, cmd.character_id.as_deref())?;
        let mut conn = self.open()?;
        let tx = conn.transaction()?;

        let known: Option<i64> = tx
            .query_row("SELECT 1 FROM markers WHERE id = ?1", [&cmd.marker_id], |row| {
                row.get(0)
            })
            .optional()?;
        if known.is_none() {
            return Err(UnknownMarker(cmd.marker_id.clone()).into());
        }

        let n = if cmd.done {
            tx.execute(
                "INSERT INTO marker_progress (scope, character_id, marker_id, done_at_ms)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(scope, character_id, marker_id) DO NOTHING",
                params![cmd.scope.as_str(), owner, cmd.marker_id, now_ms()],
            )?
        } else {
            tx.execute(
                "DELETE FROM marker_progress WHERE scope = ?1 AND character_id = ?2 AND marker_id = ?3",
                params![cmd.scope.as_str(), owner, cmd.marker_id],
            )?
        };
        if n > 0 {
            append_event_tx(
                &tx,
                if cmd.done { "marker.done" } else { "marker.undone" },
                Some(&cmd.marker_id),
                serde_json::json!({
                    "scope": cmd.scope.as_str(),
                    "characterId": cmd.character_id,
                    "markerId": cmd.marker_id,
                }),
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Upserts loosely typed marker rows. Rows without a kind, map or name
    /// are skipped.
    pub fn import_markers(&self, input: &ImportInput) -> anyhow::Result<ImportReport> {
        let default_source = input
            .default_source
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or("import");

        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        let ts = now_ms();
        let mut report = ImportReport::default();

        for raw in &input.items {
            let Some(row) = ImportRow::from_value(raw, default_source) else {
                continue;
            };
            let exists: Option<i64> = tx
                .query_row("SELECT 1 FROM markers WHERE id = ?1", [&row.id], |r| r.get(0))
                .optional()?;
            tx.execute(
                r#"
INSERT INTO markers (id, kind, map, faction, region, name, note, x, y, source, created_at_ms, updated_at_ms)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
ON CONFLICT(id) DO UPDATE SET
  kind = excluded.kind,
  map = excluded.map,
  faction = excluded.faction,
  region = excluded.region,
  name = excluded.name,
  note = excluded.note,
  x = excluded.x,
  y = excluded.y,
  source = excluded.source,
  updated_at_ms = excluded.updated_at_ms
"#,
                params![
                    row.id,
                    row.kind.as_str(),
                    row.map,
                    row.faction.map(Faction::as_str),
                    row.region,
                    row.name,
                    row.note,
                    row.x,
                    row.y,
                    row.source,
                    ts,
                ],
            )
            .with_context(|| format!("upsert marker {}", row.id))?;
            if exists.is_some() {
                report.updated += 1;
            } else {
                report.inserted += 1;
            }
        }
        report.total = report.inserted + report.updated;

        if report.total > 0 {
            append_event_tx(
                &tx,
                "markers.imported",
                None,
                serde_json::to_value(report)?,
            )?;
        }
        tx.commit()?;
        Ok(report)
    }

    /// Every stored marker, in listing order, for backups.
    pub fn export_markers(&self) -> anyhow::Result<Vec<Marker>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            r#"
SELECT id, kind, faction, map, region, name, note, x, y, source
FROM markers
ORDER BY map ASC, COALESCE(region, '') ASC, name ASC, id ASC
"#,
        )?;
        let rows = stmt.query_map([], |row| {
            let kind: String = row.get(1)?;
            let faction: Option<String> = row.get(2)?;
            let Some(kind) = MarkerKind::parse(&kind) else {
                return Ok(None);
            };
            Ok(Some(Marker {
                id: row.get(0)?,
                kind,
                faction: faction.as_deref().and_then(Faction::normalize),
                map: row.get(3)?,
                region: row.get(4)?,
                name: row.get(5)?,
                note: row.get(6)?,
                x: row.get(7)?,
                y: row.get(8)?,
                source: row.get(9)?,
                done: false,
            }))
        })?;
        Ok(rows.filter_map(Result::ok).flatten().collect())
    }

    /// Every done flag, account rows first.
    pub fn export_progress(&self) -> anyhow::Result<Vec<ProgressRecord>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            r#"
SELECT scope, character_id, marker_id, done_at_ms
FROM marker_progress
ORDER BY scope ASC, character_id ASC, marker_id ASC, id ASC
"#,
        )?;
        let rows = stmt.query_map([], |row| {
            let scope: String = row.get(0)?;
            let owner: String = row.get(1)?;
            let marker_id: String = row.get(2)?;
            let done_at_ms: i64 = row.get(3)?;
            Ok(Scope::parse(&scope).map(|scope| ProgressRecord {
                scope,
                character_id: (scope == Scope::Character).then_some(owner),
                marker_id,
                done_at_ms,
            }))
        })?;
        Ok(rows.filter_map(Result::ok).flatten().collect())
    }

    /// Restores done flags from a backup. Rows with an unknown scope, a
    /// missing owner, `done: false` or a marker not in the store are skipped.
    pub fn import_progress(&self, input: &ProgressImportInput) -> anyhow::Result<ImportReport> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        let ts = now_ms();
        let mut report = ImportReport::default();

        for raw in &input.progress {
            let Some(row) = ProgressRow::from_value(raw, ts) else {
                continue;
            };
            let known: Option<i64> = tx
                .query_row("SELECT 1 FROM markers WHERE id = ?1", [&row.marker_id], |r| {
                    r.get(0)
                })
                .optional()?;
            if known.is_none() {
                continue;
            }
            let exists: Option<i64> = tx
                .query_row(
                    "SELECT 1 FROM marker_progress WHERE scope = ?1 AND character_id = ?2 AND marker_id = ?3",
                    params![row.scope.as_str(), row.owner, row.marker_id],
                    |r| r.get(0),
                )
                .optional()?;
            tx.execute(
                "INSERT INTO marker_progress (scope, character_id, marker_id, done_at_ms)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(scope, character_id, marker_id) DO UPDATE SET done_at_ms = excluded.done_at_ms",
                params![row.scope.as_str(), row.owner, row.marker_id, row.done_at_ms],
            )
            .with_context(|| format!("restore progress for {}", row.marker_id))?;
            if exists.is_some() {
                report.updated += 1;
            } else {
                report.inserted += 1;
            }
        }
        report.total = report.inserted + report.updated;

        if report.total > 0 {
            append_event_tx(
                &tx,
                "progress.imported",
                None,
                serde_json::to_value(report)?,
            )?;
        }
        tx.commit()?;
        Ok(report)
    }

    /// Metadata for every map that has markers, catalog order first.
    pub fn list_map_meta(&self) -> anyhow::Result<Vec<MapMeta>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT map, MAX(COALESCE(x, 0)), MAX(COALESCE(y, 0)) FROM markers GROUP BY map ORDER BY map ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<f64>>(1)?.unwrap_or(0.0),
                row.get::<_, Option<f64>>(2)?.unwrap_or(0.0),
            ))
        })?;

        let mut out: Vec<MapMeta> = rows
            .filter_map(Result::ok)
            .map(|(name, max_x, max_y)| {
                catalog::find_builtin_map(&name)
                    .unwrap_or_else(|| catalog::fallback_map(&name, max_x, max_y))
            })
            .collect();
        out.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.name.cmp(&b.name)));
        Ok(out)
    }

    pub fn get_rev(&self) -> anyhow::Result<i64> {
        let conn = self.open()?;
        let rev: Option<i64> =
            conn.query_row("SELECT MAX(seq) FROM event_log", [], |row| row.get(0))?;
        Ok(rev.unwrap_or(0))
    }
}

impl MarkerStore for Engine {
    fn list_markers(&self, filter: &MarkerFilter) -> anyhow::Result<Vec<Marker>> {
        Engine::list_markers(self, filter)
    }

    fn list_map_meta(&self) -> anyhow::Result<Vec<MapMeta>> {
        Engine::list_map_meta(self)
    }

    fn set_done(&self, cmd: &SetDone) -> anyhow::Result<()> {
        Engine::set_done(self, cmd)
    }
}

/// Account progress is stored under the empty owner.
fn progress_owner(scope: Scope, character_id: Option<&str>) -> anyhow::Result<String> {
    match scope {
        Scope::Account => Ok(String::new()),
        Scope::Character => match character_id.map(str::trim) {
            Some(id) if !id.is_empty() => Ok(id.to_string()),
            _ => bail!("character scope requires a character id"),
        },
    }
}

fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Fields that identify an imported marker when it carries no id.
#[derive(Serialize)]
struct IdentityKey<'a> {
    kind: &'a str,
    map: &'a str,
    name: &'a str,
    region: Option<&'a str>,
    x: Option<f64>,
    y: Option<f64>,
    faction: Option<&'a str>,
}

struct ImportRow {
    id: String,
    kind: MarkerKind,
    map: String,
    faction: Option<Faction>,
    region: Option<String>,
    name: String,
    note: Option<String>,
    x: Option<f64>,
    y: Option<f64>,
    source: String,
}

impl ImportRow {
    fn from_value(raw: &serde_json::Value, default_source: &str) -> Option<Self> {
        let obj = raw.as_object()?;
        let text = |key: &str| {
            obj.get(key)
                .and_then(|v| v.as_str())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let kind = obj.get("kind").and_then(|v| v.as_str()).and_then(MarkerKind::parse)?;
        let map = text("map")?;
        let name = text("name")?;
        let region = obj.get("region").and_then(|v| v.as_str()).map(str::to_string);
        let note = obj.get("note").and_then(|v| v.as_str()).map(str::to_string);
        let x = obj.get("x").and_then(|v| v.as_f64());
        let y = obj.get("y").and_then(|v| v.as_f64());
        let faction = obj.get("faction").and_then(|v| v.as_str()).and_then(Faction::normalize);
        let source = text("source").unwrap_or_else(|| default_source.to_string());

        let id = text("id").unwrap_or_else(|| {
            derive_import_id(&IdentityKey {
                kind: kind.as_str(),
                map: &map,
                name: &name,
                region: region.as_deref(),
                x,
                y,
                faction: faction.map(Faction::as_str),
            })
        });

        Some(Self {
            id,
            kind,
            map,
            faction,
            region,
            name,
            note,
            x,
            y,
            source,
        })
    }
}

struct ProgressRow {
    scope: Scope,
    owner: String,
    marker_id: String,
    done_at_ms: i64,
}

impl ProgressRow {
    fn from_value(raw: &serde_json::Value, now: i64) -> Option<Self> {
        let obj = raw.as_object()?;
        let scope = obj.get("scope").and_then(|v| v.as_str()).and_then(Scope::parse)?;
        let marker_id = obj
            .get("markerId")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())?
            .to_string();
        if !obj.get("done").and_then(|v| v.as_bool()).unwrap_or(true) {
            return None;
        }
        let character_id = obj.get("characterId").and_then(|v| v.as_str());
        let owner = progress_owner(scope, character_id).ok()?;
        let done_at_ms = obj.get("doneAtMs").and_then(|v| v.as_i64()).unwrap_or(now);
        Some(Self {
            scope,
            owner,
            marker_id,
            done_at_ms,
        })
    }
}

fn derive_import_id(key: &IdentityKey<'_>) -> String {
    let json = serde_json::to_string(key).unwrap_or_default();
    let digest = Sha256::digest(json.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    format!("import:{}", &hex[..24])
}

fn migrate(conn: &Connection) -> anyhow::Result<()> {
    let v: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if v < 1 {
        conn.execute_batch(
            r#"
-- Monotonic revision source for UI sync.
CREATE TABLE IF NOT EXISTS event_log (
  seq INTEGER PRIMARY KEY AUTOINCREMENT,
  ts_ms INTEGER NOT NULL,
  kind TEXT NOT NULL,
  entity_id TEXT,
  payload_json TEXT NOT NULL DEFAULT '{}'
);

CREATE INDEX IF NOT EXISTS idx_event_log_ts ON event_log(ts_ms);
CREATE INDEX IF NOT EXISTS idx_event_log_kind ON event_log(kind);

CREATE TABLE IF NOT EXISTS markers (
  id TEXT PRIMARY KEY,
  kind TEXT NOT NULL,
  map TEXT NOT NULL,
  faction TEXT,
  region TEXT,
  name TEXT NOT NULL,
  note TEXT,
  x REAL,
  y REAL,
  source TEXT,
  created_at_ms INTEGER NOT NULL,
  updated_at_ms INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_markers_map ON markers(map);

-- Account-scope rows use character_id = ''.
CREATE TABLE IF NOT EXISTS marker_progress (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  scope TEXT NOT NULL,
  character_id TEXT NOT NULL DEFAULT '',
  marker_id TEXT NOT NULL REFERENCES markers(id) ON DELETE CASCADE,
  done_at_ms INTEGER NOT NULL,
  UNIQUE(scope, character_id, marker_id)
);

CREATE INDEX IF NOT EXISTS idx_marker_progress_marker ON marker_progress(marker_id);
"#,
        )?;

        conn.pragma_update(None, "user_version", 1_i64)?;
    }

    Ok(())
}

fn append_event_tx(
    tx: &rusqlite::Transaction<'_>,
    kind: &str,
    entity_id: Option<&str>,
    payload: serde_json::Value,
) -> anyhow::Result<i64> {
    let ts = now_ms();
    let payload_json = payload.to_string();
    tx.execute(
        "INSERT INTO event_log (ts_ms, kind, entity_id, payload_json) VALUES (?1, ?2, ?3, ?4)",
        (ts, kind, entity_id, payload_json),
    )?;
    Ok(tx.last_insert_rowid())
}

//! Asset records and catalog queries.
//!
//! An asset is one tracked media file. Identity is keyed by the
//! root-relative path: upserts for an existing path preserve the row id,
//! creation time, status and tags, and only refresh file-derived fields.

use anyhow::Result;
use rusqlite::{params, Connection, ToSql};
use serde::{Deserialize, Serialize};

use super::Database;

/// Classification of an asset, derived from its file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Image,
    Video,
    Other,
}

impl AssetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Image => "image",
            AssetKind::Video => "video",
            AssetKind::Other => "other",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "image" => Some(AssetKind::Image),
            "video" => Some(AssetKind::Video),
            "other" => Some(AssetKind::Other),
            _ => None,
        }
    }
}

/// Workflow status of an asset. New assets start as `Unsorted`; only
/// explicit status-change operations move them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetStatus {
    Unsorted,
    ReviewRequested,
    Pending,
    Approved,
    Archived,
    Offline,
    Tagged,
}

impl AssetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetStatus::Unsorted => "unsorted",
            AssetStatus::ReviewRequested => "review_requested",
            AssetStatus::Pending => "pending",
            AssetStatus::Approved => "approved",
            AssetStatus::Archived => "archived",
            AssetStatus::Offline => "offline",
            AssetStatus::Tagged => "tagged",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "unsorted" => Some(AssetStatus::Unsorted),
            "review_requested" => Some(AssetStatus::ReviewRequested),
            "pending" => Some(AssetStatus::Pending),
            "approved" => Some(AssetStatus::Approved),
            "archived" => Some(AssetStatus::Archived),
            "offline" => Some(AssetStatus::Offline),
            "tagged" => Some(AssetStatus::Tagged),
            _ => None,
        }
    }
}

/// A comment left on an asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub created_at: i64,
}

/// Open metadata document stored as JSON alongside each asset.
///
/// Absence of a field means "unknown". Fields this crate does not know
/// about survive round-trips through the flattened `extra` map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AssetMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scene: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shot: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liked: Option<bool>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<Comment>,
    /// Ids of the assets this one was derived from (lineage parents).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<i64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// One catalogued media file with hydrated relations.
///
/// `tags` and `distance` are filled in by the search layer; the raw
/// catalog queries leave them empty.
#[derive(Debug, Clone)]
pub struct Asset {
    pub id: i64,
    pub path: String,
    pub kind: AssetKind,
    pub status: AssetStatus,
    pub created_at: i64,
    pub updated_at: i64,
    pub metadata: AssetMetadata,
    pub tags: Vec<super::Tag>,
    pub distance: Option<f32>,
}

/// Structural filter set recognized by catalog queries and search.
/// Every field is optional; absence means "no constraint".
#[derive(Debug, Clone, Default)]
pub struct AssetFilters {
    pub kind: Option<AssetKind>,
    /// Single-status legacy mode; ignored when `statuses` is non-empty.
    pub status: Option<AssetStatus>,
    pub statuses: Option<Vec<AssetStatus>>,
    /// OR semantics: asset has any of these tags.
    pub tag_ids: Option<Vec<i64>>,
    pub ids: Option<Vec<i64>>,
    pub date_from: Option<i64>,
    pub date_to: Option<i64>,
    pub author_id: Option<String>,
    pub project: Option<String>,
    pub scene: Option<String>,
    pub shot: Option<String>,
    pub platform: Option<String>,
    /// Substring match against the platform URL.
    pub platform_url: Option<String>,
    pub model: Option<String>,
    pub related_to: Option<i64>,
    /// When set with `related_to`, relatedness is resolved by vector
    /// similarity instead of the exact `inputs` relation.
    pub semantic: bool,
}

impl AssetFilters {
    /// Effective status constraint: the multi-status list when present,
    /// otherwise the legacy single status.
    pub(crate) fn status_set(&self) -> Option<Vec<AssetStatus>> {
        if let Some(list) = &self.statuses {
            if !list.is_empty() {
                return Some(list.clone());
            }
        }
        self.status.map(|s| vec![s])
    }

    /// The narrow structural re-check applied to vector hits before they
    /// are admitted into a hybrid result set (kind and status only).
    pub(crate) fn admits_kind_status(&self, asset: &Asset) -> bool {
        if let Some(kind) = self.kind {
            if asset.kind != kind {
                return false;
            }
        }
        if let Some(statuses) = self.status_set() {
            if !statuses.contains(&asset.status) {
                return false;
            }
        }
        true
    }
}

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

const ASSET_COLUMNS: &str = "a.id, a.path, a.kind, a.status, a.created_at, a.updated_at, a.metadata";

pub(crate) fn asset_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Asset> {
    let kind: String = row.get(2)?;
    let status: String = row.get(3)?;
    let metadata: String = row.get(6)?;
    Ok(Asset {
        id: row.get(0)?,
        path: row.get(1)?,
        kind: AssetKind::from_str(&kind).unwrap_or(AssetKind::Other),
        status: AssetStatus::from_str(&status).unwrap_or(AssetStatus::Unsorted),
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
        metadata: serde_json::from_str(&metadata).unwrap_or_default(),
        tags: Vec::new(),
        distance: None,
    })
}

/// Rewrite the full-text shadow row for an asset.
fn refresh_fts(conn: &Connection, id: i64, path: &str, meta: &AssetMetadata) -> Result<()> {
    conn.execute("DELETE FROM assets_fts WHERE rowid = ?", [id])?;
    let comments = meta
        .comments
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    conn.execute(
        r#"
        INSERT INTO assets_fts (rowid, path, prompt, author, project, scene, shot, model, comments)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        params![
            id,
            path,
            meta.prompt,
            meta.author_id,
            meta.project,
            meta.scene,
            meta.shot,
            meta.model,
            comments,
        ],
    )?;
    Ok(())
}

impl Database {
    /// Insert or refresh the catalog row for a file, keyed by relative path.
    ///
    /// On first sight the row is created with `status = unsorted`; on
    /// conflict only `updated_at`, `kind` and file-derived metadata are
    /// refreshed; id, `created_at`, status and tags are preserved.
    /// Returns the row id and whether the row was newly inserted.
    pub fn upsert_file(
        &self,
        path: &str,
        kind: AssetKind,
        created_at: i64,
        updated_at: i64,
        width: Option<u32>,
        height: Option<u32>,
    ) -> Result<(i64, bool)> {
        let conn = self.conn();

        let existing = conn.query_row(
            "SELECT id, metadata FROM assets WHERE path = ?",
            [path],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
        );

        match existing {
            Ok((id, metadata_json)) => {
                let mut metadata: AssetMetadata =
                    serde_json::from_str(&metadata_json).unwrap_or_default();
                if width.is_some() {
                    metadata.width = width;
                }
                if height.is_some() {
                    metadata.height = height;
                }
                conn.execute(
                    "UPDATE assets SET kind = ?, updated_at = ?, metadata = ? WHERE id = ?",
                    params![kind.as_str(), updated_at, serde_json::to_string(&metadata)?, id],
                )?;
                refresh_fts(&conn, id, path, &metadata)?;
                Ok((id, false))
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                let metadata = AssetMetadata {
                    width,
                    height,
                    ..AssetMetadata::default()
                };
                conn.execute(
                    r#"
                    INSERT INTO assets (path, kind, status, created_at, updated_at, metadata)
                    VALUES (?, ?, ?, ?, ?, ?)
                    "#,
                    params![
                        path,
                        kind.as_str(),
                        AssetStatus::Unsorted.as_str(),
                        created_at,
                        updated_at,
                        serde_json::to_string(&metadata)?,
                    ],
                )?;
                let id = conn.last_insert_rowid();
                refresh_fts(&conn, id, path, &metadata)?;
                Ok((id, true))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_asset(&self, id: i64) -> Result<Option<Asset>> {
        let conn = self.conn();
        let result = conn.query_row(
            &format!("SELECT {ASSET_COLUMNS} FROM assets a WHERE a.id = ?"),
            [id],
            asset_from_row,
        );
        match result {
            Ok(asset) => Ok(Some(asset)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_asset_by_path(&self, path: &str) -> Result<Option<Asset>> {
        let conn = self.conn();
        let result = conn.query_row(
            &format!("SELECT {ASSET_COLUMNS} FROM assets a WHERE a.path = ?"),
            [path],
            asset_from_row,
        );
        match result {
            Ok(asset) => Ok(Some(asset)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn all_assets(&self) -> Result<Vec<Asset>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {ASSET_COLUMNS} FROM assets a ORDER BY a.created_at DESC"
        ))?;
        let assets = stmt
            .query_map([], asset_from_row)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(assets)
    }

    pub fn count_assets(&self) -> Result<i64> {
        let conn = self.conn();
        let count = conn.query_row("SELECT COUNT(*) FROM assets", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Remove the catalog row for a path. Tag associations and the
    /// embedding row cascade; the FTS shadow row is cleared explicitly.
    /// Returns whether a row was removed.
    pub fn remove_asset_by_path(&self, path: &str) -> Result<bool> {
        let conn = self.conn();
        let id = conn.query_row("SELECT id FROM assets WHERE path = ?", [path], |row| {
            row.get::<_, i64>(0)
        });
        match id {
            Ok(id) => {
                conn.execute("DELETE FROM assets_fts WHERE rowid = ?", [id])?;
                conn.execute("DELETE FROM assets WHERE id = ?", [id])?;
                Ok(true)
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove every catalog row at or under a path prefix (directory
    /// removal). Returns the number of rows removed.
    pub fn remove_assets_under(&self, prefix: &str) -> Result<usize> {
        let conn = self.conn();
        let pattern = format!("{}/%", prefix.trim_end_matches('/'));
        let mut stmt = conn.prepare("SELECT id FROM assets WHERE path = ? OR path LIKE ?")?;
        let ids: Vec<i64> = stmt
            .query_map(params![prefix, pattern], |row| row.get(0))?
            .filter_map(|r| r.ok())
            .collect();
        for id in &ids {
            conn.execute("DELETE FROM assets_fts WHERE rowid = ?", [id])?;
            conn.execute("DELETE FROM assets WHERE id = ?", [id])?;
        }
        Ok(ids.len())
    }

    /// Explicit status change; the only mutator of `status`.
    pub fn set_status(&self, id: i64, status: AssetStatus) -> Result<()> {
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE assets SET status = ?, updated_at = ? WHERE id = ?",
            params![status.as_str(), now_millis(), id],
        )?;
        if changed == 0 {
            anyhow::bail!("no such asset: {id}");
        }
        Ok(())
    }

    /// Apply an in-place edit to an asset's metadata document, bump
    /// `updated_at` and refresh the full-text shadow row.
    pub fn update_metadata(&self, id: i64, edit: impl FnOnce(&mut AssetMetadata)) -> Result<()> {
        let conn = self.conn();
        let row = conn.query_row(
            "SELECT path, metadata FROM assets WHERE id = ?",
            [id],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        );
        let (path, metadata_json) = match row {
            Ok(r) => r,
            Err(rusqlite::Error::QueryReturnedNoRows) => anyhow::bail!("no such asset: {id}"),
            Err(e) => return Err(e.into()),
        };

        let mut metadata: AssetMetadata = serde_json::from_str(&metadata_json).unwrap_or_default();
        edit(&mut metadata);

        conn.execute(
            "UPDATE assets SET metadata = ?, updated_at = ? WHERE id = ?",
            params![serde_json::to_string(&metadata)?, now_millis(), id],
        )?;
        refresh_fts(&conn, id, &path, &metadata)?;
        Ok(())
    }

    pub fn set_liked(&self, id: i64, liked: bool) -> Result<()> {
        self.update_metadata(id, |meta| meta.liked = Some(liked))
    }

    pub fn add_comment(&self, id: i64, text: &str, author: Option<&str>) -> Result<()> {
        let comment = Comment {
            text: text.to_string(),
            author: author.map(|a| a.to_string()),
            created_at: now_millis(),
        };
        self.update_metadata(id, move |meta| meta.comments.push(comment))
    }

    /// Catalog query combining the structural filter conjunction, the
    /// exact lineage restriction and an optional FTS5 match.
    ///
    /// With a match query, ordering is text-relevance rank then creation
    /// time descending; otherwise creation time descending.
    pub fn query_assets(
        &self,
        filters: &AssetFilters,
        match_query: Option<&str>,
    ) -> Result<Vec<Asset>> {
        let mut sql = format!("SELECT {ASSET_COLUMNS} FROM assets a");
        let mut clauses: Vec<String> = Vec::new();
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(query) = match_query {
            sql.push_str(" JOIN assets_fts ON assets_fts.rowid = a.id");
            clauses.push("assets_fts MATCH ?".to_string());
            values.push(Box::new(query.to_string()));
        }

        if let Some(kind) = filters.kind {
            clauses.push("a.kind = ?".to_string());
            values.push(Box::new(kind.as_str()));
        }

        if let Some(statuses) = filters.status_set() {
            let marks = vec!["?"; statuses.len()].join(", ");
            clauses.push(format!("a.status IN ({marks})"));
            for status in statuses {
                values.push(Box::new(status.as_str()));
            }
        }

        if let Some(tag_ids) = &filters.tag_ids {
            if !tag_ids.is_empty() {
                let marks = vec!["?"; tag_ids.len()].join(", ");
                clauses.push(format!(
                    "a.id IN (SELECT asset_id FROM asset_tags WHERE tag_id IN ({marks}))"
                ));
                for tag_id in tag_ids {
                    values.push(Box::new(*tag_id));
                }
            }
        }

        if let Some(ids) = &filters.ids {
            if !ids.is_empty() {
                let marks = vec!["?"; ids.len()].join(", ");
                clauses.push(format!("a.id IN ({marks})"));
                for id in ids {
                    values.push(Box::new(*id));
                }
            }
        }

        if let Some(from) = filters.date_from {
            clauses.push("a.created_at >= ?".to_string());
            values.push(Box::new(from));
        }
        if let Some(to) = filters.date_to {
            clauses.push("a.created_at <= ?".to_string());
            values.push(Box::new(to));
        }

        let field_filters = [
            ("authorId", &filters.author_id),
            ("project", &filters.project),
            ("scene", &filters.scene),
            ("shot", &filters.shot),
            ("platform", &filters.platform),
            ("model", &filters.model),
        ];
        for (field, value) in field_filters {
            if let Some(value) = value {
                clauses.push(format!("json_extract(a.metadata, '$.{field}') = ?"));
                values.push(Box::new(value.clone()));
            }
        }

        if let Some(fragment) = &filters.platform_url {
            clauses.push("json_extract(a.metadata, '$.platformUrl') LIKE ?".to_string());
            values.push(Box::new(format!("%{fragment}%")));
        }

        // Exact-lineage mode: direct children of the related asset.
        // Semantic mode is resolved by the search executor instead.
        if let Some(related_id) = filters.related_to {
            if !filters.semantic {
                clauses.push(
                    "EXISTS (SELECT 1 FROM json_each(COALESCE(json_extract(a.metadata, '$.inputs'), '[]')) \
                     WHERE json_each.value = ?)"
                        .to_string(),
                );
                values.push(Box::new(related_id));
            }
        }

        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        if match_query.is_some() {
            sql.push_str(" ORDER BY bm25(assets_fts), a.created_at DESC");
        } else {
            sql.push_str(" ORDER BY a.created_at DESC");
        }

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let refs: Vec<&dyn ToSql> = values.iter().map(|v| v.as_ref()).collect();
        let assets = stmt
            .query_map(&refs[..], asset_from_row)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(assets)
    }
}

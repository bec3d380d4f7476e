//! User tags and their asset associations.

use anyhow::Result;
use rusqlite::{params, params_from_iter};
use std::collections::HashMap;

use super::Database;

/// A user-defined tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub color: String,
}

impl Database {
    pub fn create_tag(&self, name: &str, color: &str) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO tags (name, color) VALUES (?, ?)",
            params![name, color],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn rename_tag(&self, tag_id: i64, new_name: &str) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "UPDATE tags SET name = ? WHERE id = ?",
            params![new_name, tag_id],
        )?;
        Ok(())
    }

    /// Delete a tag; associations cascade.
    pub fn delete_tag(&self, tag_id: i64) -> Result<()> {
        let conn = self.conn();
        conn.execute("DELETE FROM tags WHERE id = ?", [tag_id])?;
        Ok(())
    }

    pub fn all_tags(&self) -> Result<Vec<Tag>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT id, name, color FROM tags ORDER BY name")?;
        let tags = stmt
            .query_map([], |row| {
                Ok(Tag {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    color: row.get(2)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(tags)
    }

    pub fn tag_asset(&self, asset_id: i64, tag_id: i64) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT OR IGNORE INTO asset_tags (asset_id, tag_id) VALUES (?, ?)",
            params![asset_id, tag_id],
        )?;
        Ok(())
    }

    pub fn untag_asset(&self, asset_id: i64, tag_id: i64) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "DELETE FROM asset_tags WHERE asset_id = ? AND tag_id = ?",
            params![asset_id, tag_id],
        )?;
        Ok(())
    }

    pub fn tags_for_asset(&self, asset_id: i64) -> Result<Vec<Tag>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            r#"
            SELECT t.id, t.name, t.color
            FROM asset_tags at
            JOIN tags t ON t.id = at.tag_id
            WHERE at.asset_id = ?
            ORDER BY t.name
            "#,
        )?;
        let tags = stmt
            .query_map([asset_id], |row| {
                Ok(Tag {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    color: row.get(2)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(tags)
    }

    /// Batch tag hydration for a result set: one query, grouped by asset.
    /// Assets without tags are simply absent from the returned map.
    pub fn tags_for_assets(&self, asset_ids: &[i64]) -> Result<HashMap<i64, Vec<Tag>>> {
        let mut grouped: HashMap<i64, Vec<Tag>> = HashMap::new();
        if asset_ids.is_empty() {
            return Ok(grouped);
        }

        let conn = self.conn();
        let marks = vec!["?"; asset_ids.len()].join(", ");
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT at.asset_id, t.id, t.name, t.color
            FROM asset_tags at
            JOIN tags t ON t.id = at.tag_id
            WHERE at.asset_id IN ({marks})
            ORDER BY t.name
            "#
        ))?;
        let rows = stmt
            .query_map(params_from_iter(asset_ids.iter()), |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    Tag {
                        id: row.get(1)?,
                        name: row.get(2)?,
                        color: row.get(3)?,
                    },
                ))
            })?
            .filter_map(|r| r.ok());

        for (asset_id, tag) in rows {
            grouped.entry(asset_id).or_default().push(tag);
        }
        Ok(grouped)
    }
}

pub const SCHEMA: &str = r#"
-- Assets table: one row per tracked media file
CREATE TABLE IF NOT EXISTS assets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL UNIQUE,          -- relative to the watched root
    kind TEXT NOT NULL,                 -- 'image', 'video' or 'other'
    status TEXT NOT NULL DEFAULT 'unsorted',
    created_at INTEGER NOT NULL,        -- milliseconds, filesystem birth time when available
    updated_at INTEGER NOT NULL,        -- milliseconds, bumped on every mutation
    metadata TEXT NOT NULL DEFAULT '{}' -- open JSON document
);

CREATE INDEX IF NOT EXISTS idx_assets_kind ON assets(kind);
CREATE INDEX IF NOT EXISTS idx_assets_status ON assets(status);
CREATE INDEX IF NOT EXISTS idx_assets_created_at ON assets(created_at);

-- User-defined tags
CREATE TABLE IF NOT EXISTS tags (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    color TEXT NOT NULL DEFAULT '#808080'
);

-- Asset to tag mapping
CREATE TABLE IF NOT EXISTS asset_tags (
    asset_id INTEGER NOT NULL,
    tag_id INTEGER NOT NULL,
    PRIMARY KEY (asset_id, tag_id),
    FOREIGN KEY (asset_id) REFERENCES assets(id) ON DELETE CASCADE,
    FOREIGN KEY (tag_id) REFERENCES tags(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_asset_tags_tag ON asset_tags(tag_id);

-- Full-text shadow index over path and searchable metadata fields.
-- rowid mirrors assets.id; refreshed on every asset write.
CREATE VIRTUAL TABLE IF NOT EXISTS assets_fts USING fts5(
    path, prompt, author, project, scene, shot, model, comments
);

-- Embeddings for semantic search
CREATE TABLE IF NOT EXISTS embeddings (
    asset_id INTEGER PRIMARY KEY,
    embedding BLOB NOT NULL,        -- float32 array stored as bytes
    embedding_dim INTEGER NOT NULL,
    model_name TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (asset_id) REFERENCES assets(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_embeddings_model ON embeddings(model_name);
"#;

/// Idempotent schema migrations applied after the base schema.
/// Failures are ignored (column may already exist).
pub const MIGRATIONS: &[&str] = &[];

//! Hybrid search executor.
//!
//! One query surface blending three retrieval mechanisms: the exact
//! filter conjunction and full-text match run as a single catalog
//! query, lineage relatedness restricts the set (by the `inputs`
//! relation or by vector distance to the source asset), and a
//! best-effort vector pass augments text queries with semantic
//! neighbors. Results come back deduplicated, ordered, and hydrated
//! with tags. The executor keeps no state between calls.

pub mod lineage;

use anyhow::Result;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::db::{Asset, AssetFilters, Database};
use crate::embed::EmbeddingProvider;

/// Bound on vector neighbor fetches, for both semantic lineage
/// restriction and hybrid augmentation.
const VECTOR_NEIGHBOR_LIMIT: usize = 50;

pub struct SearchExecutor {
    db: Arc<Database>,
    provider: Arc<dyn EmbeddingProvider>,
}

impl SearchExecutor {
    pub fn new(db: Arc<Database>, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self { db, provider }
    }

    /// Ranked, deduplicated, tag-hydrated assets matching free text and
    /// a structural filter set.
    ///
    /// Only the catalog query itself can fail the call; the embedding
    /// and vector phases degrade silently to a narrower result set.
    pub fn search(&self, query: &str, filters: &AssetFilters) -> Result<Vec<Asset>> {
        let text = query.trim();
        let match_query = fts_match_query(text);

        // Exact filters, exact lineage and full-text in one query.
        // Ordering: text-relevance rank when text is present, creation
        // time descending otherwise.
        let mut results = self.db.query_assets(filters, match_query.as_deref())?;

        let semantic_related = filters.semantic && filters.related_to.is_some();

        // Semantic lineage: restrict to the source asset's nearest
        // neighbors and attach their distances.
        let mut source_distances: HashMap<i64, f32> = HashMap::new();
        if semantic_related {
            if let Some(source_id) = filters.related_to {
                source_distances = self.source_neighbors(source_id);
                results.retain(|a| source_distances.contains_key(&a.id));
                for asset in &mut results {
                    asset.distance = source_distances.get(&asset.id).copied();
                }
            }
        }

        // Hybrid augmentation: neighbors of the query text, appended
        // after the primary result set. Best-effort by contract.
        if !text.is_empty() {
            if let Err(e) =
                self.augment_with_text_neighbors(text, filters, &source_distances, semantic_related, &mut results)
            {
                tracing::warn!("vector augmentation degraded: {:#}", e);
            }
        }

        // The related asset itself is always present and pinned to the
        // front with self-distance 0, wherever it landed naturally.
        if let Some(source_id) = filters.related_to {
            results.retain(|a| a.id != source_id);
            if let Some(mut source) = self.db.get_asset(source_id)? {
                source.distance = Some(0.0);
                results.insert(0, source);
            }
        }

        if semantic_related {
            let source_id = filters.related_to;
            // anything that could not be scored is not a similarity match
            results.retain(|a| Some(a.id) == source_id || a.distance.is_some());
            let tail_start = usize::from(matches!(
                results.first(),
                Some(first) if Some(first.id) == source_id
            ));
            results[tail_start..].sort_by(|a, b| {
                a.distance
                    .partial_cmp(&b.distance)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }

        self.hydrate_tags(&mut results)?;
        Ok(results)
    }

    /// Assets most similar to the given one, ascending by distance,
    /// excluding the asset itself. No embedding or unknown id yields an
    /// empty list, not an error.
    pub fn find_similar(&self, asset_id: i64, limit: usize) -> Result<Vec<Asset>> {
        let embedding = match self.db.get_embedding(asset_id)? {
            Some(embedding) => embedding,
            None => return Ok(Vec::new()),
        };

        let neighbors = self.db.nearest_neighbors(&embedding, limit, Some(asset_id))?;
        let mut results = Vec::with_capacity(neighbors.len());
        for (id, distance) in neighbors {
            if let Some(mut asset) = self.db.get_asset(id)? {
                asset.distance = Some(distance);
                results.push(asset);
            }
        }

        self.hydrate_tags(&mut results)?;
        Ok(results)
    }

    /// Connected lineage subgraph around an asset.
    pub fn ancestors_and_descendants(&self, root_id: i64) -> Result<Vec<Asset>> {
        let assets = self.db.all_assets()?;
        Ok(lineage::ancestors_and_descendants(&assets, root_id))
    }

    /// Neighbor distances of an asset's own embedding, for semantic
    /// lineage mode. A missing embedding or an unavailable vector store
    /// degrades to an empty set.
    fn source_neighbors(&self, source_id: i64) -> HashMap<i64, f32> {
        let embedding = match self.db.get_embedding(source_id) {
            Ok(Some(embedding)) => embedding,
            Ok(None) => return HashMap::new(),
            Err(e) => {
                tracing::warn!("embedding lookup failed: {:#}", e);
                return HashMap::new();
            }
        };
        match self
            .db
            .nearest_neighbors(&embedding, VECTOR_NEIGHBOR_LIMIT, Some(source_id))
        {
            Ok(pairs) => pairs.into_iter().collect(),
            Err(e) => {
                tracing::warn!("neighbor query failed: {:#}", e);
                HashMap::new()
            }
        }
    }

    /// Embed the query text and append its nearest neighbors that are
    /// not already in the result set. Vector hits must still satisfy
    /// the structural kind/status filters before being admitted.
    fn augment_with_text_neighbors(
        &self,
        text: &str,
        filters: &AssetFilters,
        source_distances: &HashMap<i64, f32>,
        semantic_related: bool,
        results: &mut Vec<Asset>,
    ) -> Result<()> {
        let vector = match self.provider.embed(text) {
            Ok(Some(vector)) => vector,
            Ok(None) => return Ok(()),
            Err(e) => {
                tracing::warn!("embedding unavailable: {}", e);
                return Ok(());
            }
        };

        let neighbors = self
            .db
            .nearest_neighbors(&vector, VECTOR_NEIGHBOR_LIMIT, None)?;
        let present: HashSet<i64> = results.iter().map(|a| a.id).collect();

        for (id, distance) in neighbors {
            if present.contains(&id) {
                continue;
            }
            let mut asset = match self.db.get_asset(id)? {
                Some(asset) => asset,
                None => continue,
            };
            if !filters.admits_kind_status(&asset) {
                continue;
            }
            // in semantic lineage mode distance always means "distance
            // to the source asset"
            asset.distance = if semantic_related {
                source_distances.get(&id).copied()
            } else {
                Some(distance)
            };
            results.push(asset);
        }
        Ok(())
    }

    /// Attach tags to every result in one batched query; assets without
    /// tags get an empty list.
    fn hydrate_tags(&self, results: &mut [Asset]) -> Result<()> {
        let ids: Vec<i64> = results.iter().map(|a| a.id).collect();
        let mut grouped = self.db.tags_for_assets(&ids)?;
        for asset in results.iter_mut() {
            asset.tags = grouped.remove(&asset.id).unwrap_or_default();
        }
        Ok(())
    }
}

/// Build an FTS5 match expression from free text: whitespace tokens,
/// punctuation stripped, each quoted with a prefix wildcard, joined
/// with implicit AND.
fn fts_match_query(text: &str) -> Option<String> {
    let terms: Vec<String> = text
        .split_whitespace()
        .filter_map(|term| {
            let cleaned: String = term
                .chars()
                .filter(|c| c.is_alphanumeric() || *c == '_')
                .collect();
            if cleaned.is_empty() {
                None
            } else {
                Some(format!("\"{cleaned}\"*"))
            }
        })
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{AssetKind, AssetStatus};
    use crate::embed::EmbedError;

    struct FixedProvider(Option<Vec<f32>>);

    impl EmbeddingProvider for FixedProvider {
        fn embed(&self, _text: &str) -> Result<Option<Vec<f32>>, EmbedError> {
            Ok(self.0.clone())
        }
    }

    struct FailingProvider;

    impl EmbeddingProvider for FailingProvider {
        fn embed(&self, _text: &str) -> Result<Option<Vec<f32>>, EmbedError> {
            Err(EmbedError::Malformed("backend down".to_string()))
        }
    }

    fn test_db() -> Arc<Database> {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        Arc::new(db)
    }

    fn executor(db: Arc<Database>, provider: impl EmbeddingProvider + 'static) -> SearchExecutor {
        SearchExecutor::new(db, Arc::new(provider))
    }

    #[test]
    fn test_fts_match_query() {
        assert_eq!(
            fts_match_query("dragon castle").as_deref(),
            Some("\"dragon\"* \"castle\"*")
        );
        assert_eq!(
            fts_match_query("  mid-journey!  ").as_deref(),
            Some("\"midjourney\"*")
        );
        assert_eq!(fts_match_query(""), None);
        assert_eq!(fts_match_query("!!!"), None);
    }

    #[test]
    fn test_exact_lineage_pins_source_first() {
        let db = test_db();
        let (parent, _) = db
            .upsert_file("a.png", AssetKind::Image, 1, 1, None, None)
            .unwrap();
        let (child, _) = db
            .upsert_file("b.png", AssetKind::Image, 2, 2, None, None)
            .unwrap();
        db.update_metadata(child, |meta| meta.inputs = vec![parent])
            .unwrap();

        let exec = executor(db, FixedProvider(None));
        let results = exec
            .search(
                "",
                &AssetFilters {
                    related_to: Some(parent),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, parent);
        assert_eq!(results[0].distance, Some(0.0));
        assert_eq!(results[1].id, child);
    }

    #[test]
    fn test_source_pinned_even_when_it_fails_filters() {
        let db = test_db();
        let (source, _) = db
            .upsert_file("still.png", AssetKind::Image, 1, 1, None, None)
            .unwrap();
        let (clip, _) = db
            .upsert_file("clip.mp4", AssetKind::Video, 2, 2, None, None)
            .unwrap();
        db.update_metadata(clip, |meta| meta.inputs = vec![source])
            .unwrap();

        let exec = executor(db, FixedProvider(None));
        let results = exec
            .search(
                "",
                &AssetFilters {
                    kind: Some(AssetKind::Video),
                    related_to: Some(source),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(results[0].id, source, "source ignores its own predicates");
        assert_eq!(results[0].distance, Some(0.0));
        assert!(results.iter().any(|a| a.id == clip));
    }

    #[test]
    fn test_embedding_failure_degrades_silently() {
        let db = test_db();
        let (a, _) = db
            .upsert_file("sunset.png", AssetKind::Image, 1, 1, None, None)
            .unwrap();
        db.update_metadata(a, |meta| meta.prompt = Some("sunset over water".to_string()))
            .unwrap();

        let exec = executor(db, FailingProvider);
        let results = exec.search("sunset", &AssetFilters::default()).unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, a);
    }

    #[test]
    fn test_null_embedding_degrades_silently() {
        let db = test_db();
        let (a, _) = db
            .upsert_file("sunset.png", AssetKind::Image, 1, 1, None, None)
            .unwrap();
        db.update_metadata(a, |meta| meta.prompt = Some("sunset over water".to_string()))
            .unwrap();

        // the gateway has nothing to offer for the input
        let exec = executor(db, FixedProvider(None));
        let results = exec.search("sunset", &AssetFilters::default()).unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, a);
    }

    #[test]
    fn test_deleted_tag_gone_from_next_search() {
        let db = test_db();
        let (a, _) = db
            .upsert_file("a.png", AssetKind::Image, 1, 1, None, None)
            .unwrap();
        let tag = db.create_tag("temp", "#123456").unwrap();
        db.tag_asset(a, tag).unwrap();

        let exec = executor(db.clone(), FixedProvider(None));
        let before = exec.search("", &AssetFilters::default()).unwrap();
        assert_eq!(before[0].tags.len(), 1);

        db.delete_tag(tag).unwrap();
        let after = exec.search("", &AssetFilters::default()).unwrap();
        assert_eq!(after.len(), 1, "the asset itself survives");
        assert!(after[0].tags.is_empty());
    }

    #[test]
    fn test_semantic_related_orders_by_distance_and_drops_unscored() {
        let db = test_db();
        let (source, _) = db
            .upsert_file("src.png", AssetKind::Image, 1, 1, None, None)
            .unwrap();
        let (near, _) = db
            .upsert_file("near.png", AssetKind::Image, 2, 2, None, None)
            .unwrap();
        let (far, _) = db
            .upsert_file("far.png", AssetKind::Image, 3, 3, None, None)
            .unwrap();
        // in the catalog but never embedded: cannot be scored
        db.upsert_file("unscored.png", AssetKind::Image, 4, 4, None, None)
            .unwrap();

        db.store_embedding(source, &[1.0, 0.0], "clip").unwrap();
        db.store_embedding(far, &[0.0, 1.0], "clip").unwrap();
        db.store_embedding(near, &[0.9, 0.1], "clip").unwrap();

        let exec = executor(db, FixedProvider(None));
        let results = exec
            .search(
                "",
                &AssetFilters {
                    related_to: Some(source),
                    semantic: true,
                    ..Default::default()
                },
            )
            .unwrap();

        let ids: Vec<i64> = results.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![source, near, far]);
        assert_eq!(results[0].distance, Some(0.0));
        assert!(results[1].distance.unwrap() < results[2].distance.unwrap());
        assert!(
            results.iter().skip(1).all(|a| a.distance.is_some()),
            "every non-source result carries a distance"
        );
    }

    #[test]
    fn test_semantic_related_without_embedding_returns_only_source() {
        let db = test_db();
        let (source, _) = db
            .upsert_file("src.png", AssetKind::Image, 1, 1, None, None)
            .unwrap();
        db.upsert_file("other.png", AssetKind::Image, 2, 2, None, None)
            .unwrap();

        let exec = executor(db, FixedProvider(None));
        let results = exec
            .search(
                "",
                &AssetFilters {
                    related_to: Some(source),
                    semantic: true,
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, source);
    }

    #[test]
    fn test_hybrid_augmentation_respects_kind_and_status() {
        let db = test_db();
        let (match_hit, _) = db
            .upsert_file("hit.png", AssetKind::Image, 1, 1, None, None)
            .unwrap();
        let (wrong_kind, _) = db
            .upsert_file("hit.mp4", AssetKind::Video, 2, 2, None, None)
            .unwrap();
        let (archived, _) = db
            .upsert_file("old.png", AssetKind::Image, 3, 3, None, None)
            .unwrap();
        db.set_status(archived, AssetStatus::Archived).unwrap();

        db.store_embedding(match_hit, &[1.0, 0.0], "clip").unwrap();
        db.store_embedding(wrong_kind, &[1.0, 0.0], "clip").unwrap();
        db.store_embedding(archived, &[1.0, 0.0], "clip").unwrap();

        let exec = executor(db, FixedProvider(Some(vec![1.0, 0.0])));
        let results = exec
            .search(
                "nothing matches this text",
                &AssetFilters {
                    kind: Some(AssetKind::Image),
                    status: Some(AssetStatus::Unsorted),
                    ..Default::default()
                },
            )
            .unwrap();

        let ids: Vec<i64> = results.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![match_hit], "vector hits pass the kind/status check");
        assert!(results[0].distance.is_some());
    }

    #[test]
    fn test_search_hydrates_tags() {
        let db = test_db();
        let (a, _) = db
            .upsert_file("a.png", AssetKind::Image, 1, 1, None, None)
            .unwrap();
        db.upsert_file("b.png", AssetKind::Image, 2, 2, None, None)
            .unwrap();
        let tag = db.create_tag("hero", "#ff0000").unwrap();
        db.tag_asset(a, tag).unwrap();

        let exec = executor(db, FixedProvider(None));
        let results = exec.search("", &AssetFilters::default()).unwrap();

        let tagged = results.iter().find(|r| r.id == a).unwrap();
        assert_eq!(tagged.tags.len(), 1);
        assert_eq!(tagged.tags[0].name, "hero");
        let untagged = results.iter().find(|r| r.id != a).unwrap();
        assert!(untagged.tags.is_empty());
    }

    #[test]
    fn test_tag_filter_has_or_semantics() {
        let db = test_db();
        let (a, _) = db
            .upsert_file("a.png", AssetKind::Image, 1, 1, None, None)
            .unwrap();
        let (b, _) = db
            .upsert_file("b.png", AssetKind::Image, 2, 2, None, None)
            .unwrap();
        db.upsert_file("c.png", AssetKind::Image, 3, 3, None, None)
            .unwrap();
        let hero = db.create_tag("hero", "#f00").unwrap();
        let draft = db.create_tag("draft", "#0f0").unwrap();
        db.tag_asset(a, hero).unwrap();
        db.tag_asset(b, draft).unwrap();

        let exec = executor(db, FixedProvider(None));
        let results = exec
            .search(
                "",
                &AssetFilters {
                    tag_ids: Some(vec![hero, draft]),
                    ..Default::default()
                },
            )
            .unwrap();

        let mut ids: Vec<i64> = results.iter().map(|a| a.id).collect();
        ids.sort();
        assert_eq!(ids, vec![a, b]);
    }

    #[test]
    fn test_find_similar() {
        let db = test_db();
        let (a, _) = db
            .upsert_file("a.png", AssetKind::Image, 1, 1, None, None)
            .unwrap();
        let (b, _) = db
            .upsert_file("b.png", AssetKind::Image, 2, 2, None, None)
            .unwrap();
        let (c, _) = db
            .upsert_file("c.png", AssetKind::Image, 3, 3, None, None)
            .unwrap();
        db.store_embedding(a, &[1.0, 0.0], "clip").unwrap();
        db.store_embedding(b, &[0.9, 0.1], "clip").unwrap();
        db.store_embedding(c, &[0.0, 1.0], "clip").unwrap();

        let exec = executor(db, FixedProvider(None));
        let results = exec.find_similar(a, 10).unwrap();

        let ids: Vec<i64> = results.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![b, c], "self excluded, closest first");
        assert!(results[0].distance.unwrap() < results[1].distance.unwrap());
    }

    #[test]
    fn test_find_similar_without_embedding_is_empty() {
        let db = test_db();
        let (a, _) = db
            .upsert_file("a.png", AssetKind::Image, 1, 1, None, None)
            .unwrap();
        let exec = executor(db, FixedProvider(None));
        assert!(exec.find_similar(a, 10).unwrap().is_empty());
        assert!(exec.find_similar(999, 10).unwrap().is_empty());
    }

    #[test]
    fn test_lineage_surface() {
        let db = test_db();
        let (parent, _) = db
            .upsert_file("p.png", AssetKind::Image, 1, 1, None, None)
            .unwrap();
        let (child, _) = db
            .upsert_file("c.png", AssetKind::Image, 2, 2, None, None)
            .unwrap();
        db.update_metadata(child, |meta| meta.inputs = vec![parent])
            .unwrap();

        let exec = executor(db, FixedProvider(None));
        let graph = exec.ancestors_and_descendants(parent).unwrap();
        let mut ids: Vec<i64> = graph.iter().map(|a| a.id).collect();
        ids.sort();
        assert_eq!(ids, vec![parent, child]);
    }
}

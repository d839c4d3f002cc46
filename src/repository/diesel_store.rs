//! Diesel-backed [`VideoStore`].

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Text};
use diesel_async::{AsyncConnection, RunQueryDsl};

use super::error::StoreError;
use super::pool::{DbError, DbPool};
use super::store::{StoreCounts, VideoStore};
use crate::models::{FileRef, PendingStage, VideoRecord};
use crate::schema::{
    video_ids, yt_localized, yt_metadata, yt_tags, yt_thumbnails, yt_topic_categories,
    yt_video_files,
};
use crate::with_conn;

/// Rows per multi-row insert; keeps well under SQLite's bound parameter limit.
const INSERT_CHUNK: usize = 200;

#[derive(Insertable, Debug)]
#[diesel(table_name = video_ids)]
struct NewVideoId<'a> {
    video_id: &'a str,
    discovered_at: &'a str,
    failed_metadata: bool,
    failed_file: bool,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = yt_metadata)]
struct MetadataRow {
    video_id: String,
    kind: Option<String>,
    etag: Option<String>,
    title: Option<String>,
    description: Option<String>,
    published_at: Option<String>,
    channel_id: Option<String>,
    channel_title: Option<String>,
    category_id: Option<String>,
    live_broadcast_content: Option<String>,
    default_language: Option<String>,
    default_audio_language: Option<String>,
    duration: Option<String>,
    dimension: Option<String>,
    definition: Option<String>,
    caption: Option<String>,
    licensed_content: Option<bool>,
    projection: Option<String>,
    upload_status: Option<String>,
    privacy_status: Option<String>,
    license: Option<String>,
    embeddable: Option<bool>,
    public_stats_viewable: Option<bool>,
    made_for_kids: Option<bool>,
    view_count: Option<i64>,
    like_count: Option<i64>,
    dislike_count: i64,
    favorite_count: Option<i64>,
    comment_count: Option<i64>,
    event_date: Option<String>,
    updated_at: String,
}

impl From<&VideoRecord> for MetadataRow {
    fn from(r: &VideoRecord) -> Self {
        Self {
            video_id: r.video_id.clone(),
            kind: r.kind.clone(),
            etag: r.etag.clone(),
            title: r.title.clone(),
            description: r.description.clone(),
            published_at: r.published_at.map(|dt| dt.to_rfc3339()),
            channel_id: r.channel_id.clone(),
            channel_title: r.channel_title.clone(),
            category_id: r.category_id.clone(),
            live_broadcast_content: r.live_broadcast_content.clone(),
            default_language: r.default_language.clone(),
            default_audio_language: r.default_audio_language.clone(),
            duration: r.duration.clone(),
            dimension: r.dimension.clone(),
            definition: r.definition.clone(),
            caption: r.caption.clone(),
            licensed_content: r.licensed_content,
            projection: r.projection.clone(),
            upload_status: r.upload_status.clone(),
            privacy_status: r.privacy_status.clone(),
            license: r.license.clone(),
            embeddable: r.embeddable,
            public_stats_viewable: r.public_stats_viewable,
            made_for_kids: r.made_for_kids,
            view_count: r.view_count,
            like_count: r.like_count,
            dislike_count: r.dislike_count,
            favorite_count: r.favorite_count,
            comment_count: r.comment_count,
            event_date: r.event_date.map(|d| d.format("%Y-%m-%d").to_string()),
            updated_at: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = yt_tags)]
struct TagRow {
    video_id: String,
    tag: String,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = yt_thumbnails)]
struct ThumbnailRow {
    video_id: String,
    thumbnail_size: String,
    url: String,
    width: Option<i32>,
    height: Option<i32>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = yt_localized)]
struct LocalizedRow {
    video_id: String,
    language: String,
    title: Option<String>,
    description: Option<String>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = yt_topic_categories)]
struct TopicRow {
    video_id: String,
    category: String,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = yt_video_files)]
struct FileRow {
    video_id: String,
    format_id: Option<String>,
    file_size: i64,
    local_path: String,
    downloaded_at: String,
}

#[derive(QueryableByName)]
struct PendingId {
    #[diesel(sql_type = Text)]
    video_id: String,
}

#[derive(QueryableByName)]
struct CountsRow {
    #[diesel(sql_type = BigInt)]
    ids: i64,
    #[diesel(sql_type = BigInt)]
    with_metadata: i64,
    #[diesel(sql_type = BigInt)]
    failed_metadata: i64,
    #[diesel(sql_type = BigInt)]
    with_file: i64,
    #[diesel(sql_type = BigInt)]
    failed_file: i64,
}

/// Child rows of one metadata record, built before opening a transaction.
struct RecordRows {
    metadata: MetadataRow,
    tags: Vec<TagRow>,
    thumbnails: Vec<ThumbnailRow>,
    localized: Vec<LocalizedRow>,
    topics: Vec<TopicRow>,
}

impl From<&VideoRecord> for RecordRows {
    fn from(record: &VideoRecord) -> Self {
        let id = &record.video_id;
        Self {
            metadata: MetadataRow::from(record),
            tags: record
                .tags
                .iter()
                .map(|tag| TagRow {
                    video_id: id.clone(),
                    tag: tag.clone(),
                })
                .collect(),
            thumbnails: record
                .thumbnails
                .iter()
                .map(|t| ThumbnailRow {
                    video_id: id.clone(),
                    thumbnail_size: t.size.clone(),
                    url: t.url.clone(),
                    width: t.width,
                    height: t.height,
                })
                .collect(),
            localized: record
                .localized
                .iter()
                .map(|l| LocalizedRow {
                    video_id: id.clone(),
                    language: l.language.clone(),
                    title: l.title.clone(),
                    description: l.description.clone(),
                })
                .collect(),
            topics: record
                .topic_categories
                .iter()
                .map(|c| TopicRow {
                    video_id: id.clone(),
                    category: c.clone(),
                })
                .collect(),
        }
    }
}

/// SQLite store over a [`DbPool`].
#[derive(Clone)]
pub struct DieselVideoStore {
    pool: DbPool,
}

impl DieselVideoStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load_pending(&self, sql: &'static str, limit: usize) -> Result<Vec<String>, DbError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        with_conn!(self.pool, conn => {
            diesel::sql_query(sql)
                .bind::<BigInt, _>(limit)
                .load::<PendingId>(&mut conn)
                .await
                .map(|rows| rows.into_iter().map(|r| r.video_id).collect())
        })
    }
}

#[async_trait]
impl VideoStore for DieselVideoStore {
    async fn seed_pending(&self, ids: &[String]) -> Result<usize, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let now = Utc::now().to_rfc3339();
        let mut inserted = 0;
        with_conn!(self.pool, conn => {
            for id in ids {
                let row = NewVideoId {
                    video_id: id,
                    discovered_at: &now,
                    failed_metadata: false,
                    failed_file: false,
                };
                inserted += diesel::insert_or_ignore_into(video_ids::table)
                    .values(&row)
                    .execute(&mut conn)
                    .await?;
            }
        });
        Ok(inserted)
    }

    async fn fetch_pending(
        &self,
        stage: PendingStage,
        limit: usize,
    ) -> Result<Vec<String>, StoreError> {
        // Random order spreads concurrent metadata runs over different ids.
        let sql = match stage {
            PendingStage::Metadata => {
                "SELECT v.video_id FROM video_ids v \
                 WHERE v.failed_metadata = 0 \
                 AND NOT EXISTS (SELECT 1 FROM yt_metadata m WHERE m.video_id = v.video_id) \
                 ORDER BY RANDOM() LIMIT ?"
            }
            PendingStage::File => {
                "SELECT v.video_id FROM video_ids v \
                 WHERE v.failed_file = 0 \
                 AND EXISTS (SELECT 1 FROM yt_metadata m WHERE m.video_id = v.video_id) \
                 AND NOT EXISTS (SELECT 1 FROM yt_video_files f WHERE f.video_id = v.video_id) \
                 ORDER BY v.discovered_at, v.video_id LIMIT ?"
            }
        };
        Ok(self.load_pending(sql, limit).await?)
    }

    async fn mark_failed(&self, stage: PendingStage, ids: &[String]) -> Result<usize, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut updated = 0;
        with_conn!(self.pool, conn => {
            for chunk in ids.chunks(INSERT_CHUNK) {
                let target = video_ids::table.filter(video_ids::video_id.eq_any(chunk));
                updated += match stage {
                    PendingStage::Metadata => {
                        diesel::update(target)
                            .set(video_ids::failed_metadata.eq(true))
                            .execute(&mut conn)
                            .await?
                    }
                    PendingStage::File => {
                        diesel::update(target)
                            .set(video_ids::failed_file.eq(true))
                            .execute(&mut conn)
                            .await?
                    }
                };
            }
        });
        Ok(updated)
    }

    async fn reset_failed(&self, stage: PendingStage) -> Result<usize, StoreError> {
        let updated = with_conn!(self.pool, conn => {
            match stage {
                PendingStage::Metadata => {
                    diesel::update(video_ids::table.filter(video_ids::failed_metadata.eq(true)))
                        .set(video_ids::failed_metadata.eq(false))
                        .execute(&mut conn)
                        .await?
                }
                PendingStage::File => {
                    diesel::update(video_ids::table.filter(video_ids::failed_file.eq(true)))
                        .set(video_ids::failed_file.eq(false))
                        .execute(&mut conn)
                        .await?
                }
            }
        });
        Ok(updated)
    }

    async fn upsert_record(&self, record: &VideoRecord) -> Result<(), StoreError> {
        let rows = RecordRows::from(record);
        with_conn!(self.pool, conn => {
            conn.transaction(|conn| {
                Box::pin(async move {
                    let id = rows.metadata.video_id.clone();

                    diesel::replace_into(yt_metadata::table)
                        .values(&rows.metadata)
                        .execute(conn)
                        .await?;

                    diesel::delete(yt_tags::table.filter(yt_tags::video_id.eq(&id)))
                        .execute(conn)
                        .await?;
                    diesel::delete(yt_thumbnails::table.filter(yt_thumbnails::video_id.eq(&id)))
                        .execute(conn)
                        .await?;
                    diesel::delete(yt_localized::table.filter(yt_localized::video_id.eq(&id)))
                        .execute(conn)
                        .await?;
                    diesel::delete(
                        yt_topic_categories::table.filter(yt_topic_categories::video_id.eq(&id)),
                    )
                    .execute(conn)
                    .await?;

                    // Duplicate tags or categories from the API collapse onto
                    // the composite primary key.
                    for row in &rows.tags {
                        diesel::insert_or_ignore_into(yt_tags::table)
                            .values(row)
                            .execute(conn)
                            .await?;
                    }
                    for row in &rows.thumbnails {
                        diesel::insert_or_ignore_into(yt_thumbnails::table)
                            .values(row)
                            .execute(conn)
                            .await?;
                    }
                    for row in &rows.localized {
                        diesel::insert_or_ignore_into(yt_localized::table)
                            .values(row)
                            .execute(conn)
                            .await?;
                    }
                    for row in &rows.topics {
                        diesel::insert_or_ignore_into(yt_topic_categories::table)
                            .values(row)
                            .execute(conn)
                            .await?;
                    }

                    Ok::<_, DbError>(())
                })
            })
            .await
        })?;
        Ok(())
    }

    async fn upsert_file_ref(&self, file: &FileRef) -> Result<(), StoreError> {
        let row = FileRow {
            video_id: file.video_id.clone(),
            format_id: file.format_id.clone(),
            file_size: i64::try_from(file.file_size).unwrap_or(i64::MAX),
            local_path: file.local_path.display().to_string(),
            downloaded_at: Utc::now().to_rfc3339(),
        };
        with_conn!(self.pool, conn => {
            diesel::replace_into(yt_video_files::table)
                .values(&row)
                .execute(&mut conn)
                .await
        })?;
        Ok(())
    }

    async fn counts(&self) -> Result<StoreCounts, StoreError> {
        let row = with_conn!(self.pool, conn => {
            diesel::sql_query(
                "SELECT \
                 (SELECT COUNT(*) FROM video_ids) AS ids, \
                 (SELECT COUNT(*) FROM yt_metadata) AS with_metadata, \
                 (SELECT COUNT(*) FROM video_ids WHERE failed_metadata = 1) AS failed_metadata, \
                 (SELECT COUNT(*) FROM yt_video_files) AS with_file, \
                 (SELECT COUNT(*) FROM video_ids WHERE failed_file = 1) AS failed_file",
            )
            .get_result::<CountsRow>(&mut conn)
            .await
        })?;
        Ok(StoreCounts {
            ids: row.ids.max(0) as u64,
            with_metadata: row.with_metadata.max(0) as u64,
            failed_metadata: row.failed_metadata.max(0) as u64,
            with_file: row.with_file.max(0) as u64,
            failed_file: row.failed_file.max(0) as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Localization, Thumbnail};
    use crate::repository::DbContext;
    use std::path::PathBuf;
    use tempfile::tempdir;

    async fn setup_test_db() -> (DieselVideoStore, DbContext, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let ctx = DbContext::new(&dir.path().join("test.db"));
        ctx.init_schema().await.unwrap();
        (ctx.videos(), ctx, dir)
    }

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn sample_record(id: &str) -> VideoRecord {
        let mut record = VideoRecord::new(id);
        record.title = Some("Game recap 04.12.2024".to_string());
        record.tags = ids(&["baseball", "recap", "baseball"]);
        record.thumbnails = vec![Thumbnail {
            size: "default".to_string(),
            url: format!("https://i.ytimg.com/vi/{}/default.jpg", id),
            width: Some(120),
            height: Some(90),
        }];
        record.localized = Some(Localization {
            language: "en".to_string(),
            title: Some("Game recap".to_string()),
            description: None,
        });
        record.topic_categories = ids(&["https://en.wikipedia.org/wiki/Baseball"]);
        record
    }

    async fn tag_count(ctx: &DbContext, id: &str) -> i64 {
        let mut conn = ctx.pool().get().await.unwrap();
        yt_tags::table
            .filter(yt_tags::video_id.eq(id))
            .count()
            .get_result::<i64>(&mut conn)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_seed_pending_is_idempotent() {
        let (store, _ctx, _dir) = setup_test_db().await;

        let first = store.seed_pending(&ids(&["a", "b", "c"])).await.unwrap();
        assert_eq!(first, 3);
        let second = store.seed_pending(&ids(&["b", "c", "d"])).await.unwrap();
        assert_eq!(second, 1);

        let counts = store.counts().await.unwrap();
        assert_eq!(counts.ids, 4);
    }

    #[tokio::test]
    async fn test_seed_pending_large_batch_with_repeats() {
        let (store, _ctx, _dir) = setup_test_db().await;

        let mut batch: Vec<String> = (0..450).map(|i| format!("id{:09}", i)).collect();
        batch.extend((0..50).map(|i| format!("id{:09}", i)));

        let inserted = store.seed_pending(&batch).await.unwrap();
        assert_eq!(inserted, 450);
        assert_eq!(store.counts().await.unwrap().ids, 450);
    }

    #[tokio::test]
    async fn test_fetch_pending_metadata_skips_resolved_and_failed() {
        let (store, _ctx, _dir) = setup_test_db().await;
        store
            .seed_pending(&ids(&["a", "b", "c", "d"]))
            .await
            .unwrap();

        store.upsert_record(&sample_record("a")).await.unwrap();
        store
            .mark_failed(PendingStage::Metadata, &ids(&["b"]))
            .await
            .unwrap();

        let mut pending = store
            .fetch_pending(PendingStage::Metadata, 10)
            .await
            .unwrap();
        pending.sort();
        assert_eq!(pending, ids(&["c", "d"]));

        let limited = store
            .fetch_pending(PendingStage::Metadata, 1)
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_pending_files_requires_metadata() {
        let (store, _ctx, _dir) = setup_test_db().await;
        store.seed_pending(&ids(&["a", "b", "c"])).await.unwrap();
        store.upsert_record(&sample_record("a")).await.unwrap();
        store.upsert_record(&sample_record("b")).await.unwrap();
        store
            .upsert_file_ref(&FileRef {
                video_id: "b".to_string(),
                format_id: Some("140".to_string()),
                file_size: 1024,
                local_path: PathBuf::from("/tmp/b.m4a"),
            })
            .await
            .unwrap();

        let pending = store.fetch_pending(PendingStage::File, 10).await.unwrap();
        assert_eq!(pending, ids(&["a"]));

        store
            .mark_failed(PendingStage::File, &ids(&["a"]))
            .await
            .unwrap();
        assert!(store
            .fetch_pending(PendingStage::File, 10)
            .await
            .unwrap()
            .is_empty());

        let cleared = store.reset_failed(PendingStage::File).await.unwrap();
        assert_eq!(cleared, 1);
        assert_eq!(
            store.fetch_pending(PendingStage::File, 10).await.unwrap(),
            ids(&["a"])
        );
    }

    #[tokio::test]
    async fn test_upsert_record_replaces_children() {
        let (store, ctx, _dir) = setup_test_db().await;
        let mut record = sample_record("vid00000001");

        store.upsert_record(&record).await.unwrap();
        store.upsert_record(&record).await.unwrap();
        // Duplicate "baseball" collapses onto the primary key.
        assert_eq!(tag_count(&ctx, "vid00000001").await, 2);

        record.tags = ids(&["only"]);
        store.upsert_record(&record).await.unwrap();
        assert_eq!(tag_count(&ctx, "vid00000001").await, 1);

        let counts = store.counts().await.unwrap();
        assert_eq!(counts.with_metadata, 1);
    }

    #[tokio::test]
    async fn test_mark_failed_is_idempotent() {
        let (store, _ctx, _dir) = setup_test_db().await;
        store.seed_pending(&ids(&["a", "b"])).await.unwrap();

        store
            .mark_failed(PendingStage::Metadata, &ids(&["a", "missing"]))
            .await
            .unwrap();
        store
            .mark_failed(PendingStage::Metadata, &ids(&["a"]))
            .await
            .unwrap();

        let counts = store.counts().await.unwrap();
        assert_eq!(counts.failed_metadata, 1);
        assert_eq!(counts.failed_file, 0);
    }
}

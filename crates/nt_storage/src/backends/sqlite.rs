use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use nt_core::{
    ArticleCluster, Category, ClusterAttachment, ContentStore, Error, ProcessedArticle, RawArticle,
    Result,
};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePool, SqliteRow};
use sqlx::Row;
use uuid::Uuid;

use crate::StorageBackend;

const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS raw_articles (
        id TEXT PRIMARY KEY,
        source_id TEXT NOT NULL,
        source_name TEXT NOT NULL,
        title TEXT NOT NULL,
        content TEXT NOT NULL,
        url TEXT NOT NULL,
        published_at TEXT NOT NULL,
        ingested_at TEXT NOT NULL,
        image_url TEXT,
        author TEXT,
        content_hash TEXT NOT NULL,
        processed INTEGER NOT NULL DEFAULT 0,
        skipped INTEGER NOT NULL DEFAULT 0
    )
    "#,
    "CREATE INDEX IF NOT EXISTS raw_articles_hash ON raw_articles (content_hash, ingested_at)",
    "CREATE INDEX IF NOT EXISTS raw_articles_url ON raw_articles (url)",
    r#"
    CREATE TABLE IF NOT EXISTS processed_articles (
        id TEXT PRIMARY KEY,
        processed_at TEXT NOT NULL,
        data TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS clusters (
        id TEXT PRIMARY KEY,
        category TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        synthesized_article_id TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS cluster_members (
        cluster_id TEXT NOT NULL,
        raw_article_id TEXT NOT NULL,
        PRIMARY KEY (cluster_id, raw_article_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS cluster_members_article ON cluster_members (raw_article_id)",
];

// Fixed-width timestamps so that text comparison matches time order.
fn ts(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| Error::Database(format!("Failed to parse date '{}': {}", value, e)))
}

fn parse_id(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| Error::Database(format!("Invalid id '{}': {}", value, e)))
}

fn read_err(context: &'static str) -> impl FnOnce(sqlx::Error) -> Error {
    move |e| Error::Database(format!("{}: {}", context, e))
}

fn write_err(context: &'static str) -> impl FnOnce(sqlx::Error) -> Error {
    move |e| Error::Persistence(format!("{}: {}", context, e))
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn raw_from_row(row: &SqliteRow) -> Result<RawArticle> {
    Ok(RawArticle {
        id: parse_id(row.get("id"))?,
        source_id: row.get("source_id"),
        source_name: row.get("source_name"),
        title: row.get("title"),
        content: row.get("content"),
        url: row.get("url"),
        published_at: parse_ts(row.get("published_at"))?,
        ingested_at: parse_ts(row.get("ingested_at"))?,
        image_url: row.get("image_url"),
        author: row.get("author"),
        content_hash: row.get("content_hash"),
        processed: row.get::<i64, _>("processed") != 0,
        skipped: row.get::<i64, _>("skipped") != 0,
    })
}

fn raws_from_rows(rows: &[SqliteRow]) -> Result<Vec<RawArticle>> {
    rows.iter().map(raw_from_row).collect()
}

pub struct SQLiteStorage {
    pool: SqlitePool,
    db_path: PathBuf,
}

#[async_trait]
impl StorageBackend for SQLiteStorage {
    fn get_error_message() -> &'static str {
        "SQLite database should be available at ./articles.db"
    }

    async fn new() -> Result<Self> {
        Self::new_with_path(Path::new("articles.db")).await
    }
}

impl SQLiteStorage {
    pub async fn new_with_path(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(read_err("Failed to connect to database"))?;

        for (i, migration) in MIGRATIONS.iter().enumerate() {
            sqlx::query(migration)
                .execute(&pool)
                .await
                .map_err(|e| Error::Database(format!("Failed to run migration {}: {}", i, e)))?;
        }

        tracing::debug!(path = %db_path.display(), "SQLite content store ready");
        Ok(Self {
            pool,
            db_path: db_path.to_path_buf(),
        })
    }

    pub fn get_db_path(&self) -> &Path {
        &self.db_path
    }

    async fn cluster_members(conn: &mut SqliteConnection, cluster_id: &str) -> Result<BTreeSet<Uuid>> {
        let rows = sqlx::query("SELECT raw_article_id FROM cluster_members WHERE cluster_id = ?")
            .bind(cluster_id)
            .fetch_all(&mut *conn)
            .await
            .map_err(read_err("Failed to load cluster members"))?;
        rows.iter().map(|r| parse_id(r.get("raw_article_id"))).collect()
    }

    async fn attach_in_transaction(
        conn: &mut SqliteConnection,
        article_id: Uuid,
        lookup: &BTreeSet<Uuid>,
        category: Category,
    ) -> Result<ClusterAttachment> {
        let now = ts(Utc::now());
        let sql = format!(
            "SELECT c.id, c.synthesized_article_id FROM clusters c \
             JOIN cluster_members m ON m.cluster_id = c.id \
             WHERE m.raw_article_id IN ({}) ORDER BY c.created_at LIMIT 1",
            placeholders(lookup.len())
        );
        let mut query = sqlx::query(&sql);
        for id in lookup {
            query = query.bind(id.to_string());
        }
        let existing = query
            .fetch_optional(&mut *conn)
            .await
            .map_err(read_err("Failed to look up cluster"))?;

        let (cluster_id, created, synthesized, new_members) = match existing {
            Some(row) => {
                let synthesized: Option<String> = row.get("synthesized_article_id");
                let synthesized = synthesized.as_deref().map(parse_id).transpose()?;
                (row.get::<String, _>("id"), false, synthesized, vec![article_id])
            }
            None => {
                let cluster_id = Uuid::new_v4().to_string();
                sqlx::query(
                    "INSERT INTO clusters (id, category, created_at, updated_at) VALUES (?, ?, ?, ?)",
                )
                .bind(&cluster_id)
                .bind(category.as_str())
                .bind(&now)
                .bind(&now)
                .execute(&mut *conn)
                .await
                .map_err(write_err("Failed to create cluster"))?;
                (cluster_id, true, None, lookup.iter().copied().collect())
            }
        };

        for member in new_members {
            sqlx::query("INSERT OR IGNORE INTO cluster_members (cluster_id, raw_article_id) VALUES (?, ?)")
                .bind(&cluster_id)
                .bind(member.to_string())
                .execute(&mut *conn)
                .await
                .map_err(write_err("Failed to add cluster member"))?;
        }
        sqlx::query("UPDATE clusters SET updated_at = ? WHERE id = ?")
            .bind(&now)
            .bind(&cluster_id)
            .execute(&mut *conn)
            .await
            .map_err(write_err("Failed to touch cluster"))?;

        let member_count = Self::cluster_members(conn, &cluster_id).await?.len();
        Ok(ClusterAttachment {
            cluster_id: parse_id(&cluster_id)?,
            created,
            member_count,
            synthesized_article_id: synthesized,
        })
    }
}

#[async_trait]
impl ContentStore for SQLiteStorage {
    async fn insert_raw(&self, article: &RawArticle) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO raw_articles
            (id, source_id, source_name, title, content, url, published_at, ingested_at,
             image_url, author, content_hash, processed, skipped)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(article.id.to_string())
        .bind(&article.source_id)
        .bind(&article.source_name)
        .bind(&article.title)
        .bind(&article.content)
        .bind(&article.url)
        .bind(ts(article.published_at))
        .bind(ts(article.ingested_at))
        .bind(article.image_url.as_deref())
        .bind(article.author.as_deref())
        .bind(&article.content_hash)
        .bind(article.processed as i64)
        .bind(article.skipped as i64)
        .execute(&self.pool)
        .await
        .map_err(write_err("Failed to store raw article"))?;
        Ok(())
    }

    async fn get_raw(&self, id: Uuid) -> Result<Option<RawArticle>> {
        let row = sqlx::query("SELECT * FROM raw_articles WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(read_err("Failed to load raw article"))?;
        row.as_ref().map(raw_from_row).transpose()
    }

    async fn get_raw_many(&self, ids: &[Uuid]) -> Result<Vec<RawArticle>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!("SELECT * FROM raw_articles WHERE id IN ({})", placeholders(ids.len()));
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id.to_string());
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(read_err("Failed to load raw articles"))?;
        raws_from_rows(&rows)
    }

    async fn find_raw_by_url(&self, url: &str) -> Result<Option<RawArticle>> {
        let row = sqlx::query("SELECT * FROM raw_articles WHERE url = ? LIMIT 1")
            .bind(url)
            .fetch_optional(&self.pool)
            .await
            .map_err(read_err("Failed to look up raw article by url"))?;
        row.as_ref().map(raw_from_row).transpose()
    }

    async fn find_processed_by_hash(&self, hash: &str, since: DateTime<Utc>) -> Result<Vec<RawArticle>> {
        let rows = sqlx::query(
            "SELECT * FROM raw_articles WHERE processed = 1 AND content_hash = ? AND ingested_at >= ?",
        )
        .bind(hash)
        .bind(ts(since))
        .fetch_all(&self.pool)
        .await
        .map_err(read_err("Failed to find articles by hash"))?;
        raws_from_rows(&rows)
    }

    async fn recent_processed(&self, since: DateTime<Utc>, limit: usize) -> Result<Vec<RawArticle>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM raw_articles
            WHERE processed = 1 AND ingested_at >= ?
            ORDER BY ingested_at DESC
            LIMIT ?
            "#,
        )
        .bind(ts(since))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(read_err("Failed to load recent articles"))?;
        raws_from_rows(&rows)
    }

    async fn unprocessed(&self, limit: usize) -> Result<Vec<RawArticle>> {
        let rows = sqlx::query(
            "SELECT * FROM raw_articles WHERE processed = 0 ORDER BY ingested_at ASC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(read_err("Failed to load unprocessed articles"))?;
        raws_from_rows(&rows)
    }

    async fn mark_processed(&self, id: Uuid, skipped: bool) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE raw_articles SET processed = 1, skipped = ? WHERE id = ? AND processed = 0",
        )
        .bind(skipped as i64)
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(write_err("Failed to mark article processed"))?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }
        match self.get_raw(id).await? {
            Some(_) => Ok(false),
            None => Err(Error::not_found("raw article", id)),
        }
    }

    async fn insert_processed(&self, article: &ProcessedArticle) -> Result<bool> {
        let data = serde_json::to_string(article)?;
        let result = sqlx::query("INSERT OR IGNORE INTO processed_articles (id, processed_at, data) VALUES (?, ?, ?)")
            .bind(article.id.to_string())
            .bind(ts(article.processed_at))
            .bind(data)
            .execute(&self.pool)
            .await
            .map_err(write_err("Failed to store processed article"))?;
        Ok(result.rows_affected() == 1)
    }

    async fn get_processed(&self, id: Uuid) -> Result<Option<ProcessedArticle>> {
        let row = sqlx::query("SELECT data FROM processed_articles WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(read_err("Failed to load processed article"))?;
        match row {
            Some(row) => Ok(Some(serde_json::from_str(row.get("data"))?)),
            None => Ok(None),
        }
    }

    async fn list_processed(&self, limit: usize) -> Result<Vec<ProcessedArticle>> {
        let rows = sqlx::query("SELECT data FROM processed_articles ORDER BY processed_at DESC LIMIT ?")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(read_err("Failed to list processed articles"))?;
        rows.iter()
            .map(|row| serde_json::from_str(row.get("data")).map_err(Error::from))
            .collect()
    }

    async fn attach_to_cluster(
        &self,
        article_id: Uuid,
        matching_ids: &BTreeSet<Uuid>,
        category: Category,
    ) -> Result<ClusterAttachment> {
        let mut lookup = matching_ids.clone();
        lookup.insert(article_id);

        let mut conn = self.pool.acquire().await.map_err(read_err("Failed to acquire connection"))?;
        // IMMEDIATE takes the write lock up front so two runs cannot both
        // miss the cluster and create one each.
        sqlx::query("BEGIN IMMEDIATE")
            .execute(&mut *conn)
            .await
            .map_err(write_err("Failed to begin cluster transaction"))?;

        match Self::attach_in_transaction(&mut conn, article_id, &lookup, category).await {
            Ok(attachment) => {
                sqlx::query("COMMIT")
                    .execute(&mut *conn)
                    .await
                    .map_err(write_err("Failed to commit cluster attach"))?;
                Ok(attachment)
            }
            Err(e) => {
                if let Err(rollback) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
                    tracing::warn!(error = %rollback, "Cluster attach rollback failed");
                }
                Err(e)
            }
        }
    }

    async fn get_cluster(&self, id: Uuid) -> Result<Option<ArticleCluster>> {
        let mut conn = self.pool.acquire().await.map_err(read_err("Failed to acquire connection"))?;
        let row = sqlx::query("SELECT * FROM clusters WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&mut *conn)
            .await
            .map_err(read_err("Failed to load cluster"))?;
        let Some(row) = row else {
            return Ok(None);
        };

        let synthesized: Option<String> = row.get("synthesized_article_id");
        let member_ids = Self::cluster_members(&mut conn, &id.to_string()).await?;
        Ok(Some(ArticleCluster {
            id,
            member_ids,
            category: Category::from_label_or_default(row.get("category")),
            created_at: parse_ts(row.get("created_at"))?,
            updated_at: parse_ts(row.get("updated_at"))?,
            synthesized_article_id: synthesized.as_deref().map(parse_id).transpose()?,
        }))
    }

    async fn set_cluster_synthesis(&self, cluster_id: Uuid, article_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE clusters SET synthesized_article_id = ?, updated_at = ? WHERE id = ? AND synthesized_article_id IS NULL",
        )
        .bind(article_id.to_string())
        .bind(ts(Utc::now()))
        .bind(cluster_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(write_err("Failed to record cluster synthesis"))?;
        if result.rows_affected() == 1 {
            return Ok(true);
        }

        let exists = sqlx::query("SELECT 1 FROM clusters WHERE id = ?")
            .bind(cluster_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(read_err("Failed to load cluster"))?;
        match exists {
            Some(_) => Ok(false),
            None => Err(Error::not_found("cluster", cluster_id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use nt_core::{Entities, RawItem, SourceConfig, Urgency};
    use tempfile::tempdir;

    fn raw(title: &str) -> RawArticle {
        let source = SourceConfig {
            id: "union".to_string(),
            name: "L'Union".to_string(),
            url: None,
            reliability: nt_core::Reliability::High,
        };
        let item = RawItem {
            title: title.to_string(),
            content: "Libreville, le conseil des ministres s'est réuni.".to_string(),
            url: format!("https://www.union.sonapresse.com/{}", title.len()),
            published_at: Utc::now(),
            image_url: Some("https://www.union.sonapresse.com/img.jpg".to_string()),
            author: None,
        };
        let url = item.url.clone();
        RawArticle::from_item(&source, item, url, 200)
    }

    #[tokio::test]
    async fn test_sqlite_raw_articles() {
        let temp_dir = tempdir().unwrap();
        let storage = SQLiteStorage::new_with_path(&temp_dir.path().join("test.db")).await.unwrap();

        let article = raw("Conseil des ministres");
        storage.insert_raw(&article).await.unwrap();

        let loaded = storage.get_raw(article.id).await.unwrap().unwrap();
        assert_eq!(loaded.title, article.title);
        assert_eq!(loaded.content_hash, article.content_hash);
        assert!(!loaded.processed);

        assert_eq!(storage.unprocessed(5).await.unwrap().len(), 1);
        assert!(storage.mark_processed(article.id, true).await.unwrap());
        assert!(!storage.mark_processed(article.id, true).await.unwrap());
        assert!(storage.mark_processed(Uuid::new_v4(), false).await.unwrap_err().is_not_found());

        let since = Utc::now() - Duration::hours(48);
        let by_hash = storage.find_processed_by_hash(&article.content_hash, since).await.unwrap();
        assert_eq!(by_hash.len(), 1);
        assert!(by_hash[0].skipped);
        assert_eq!(storage.recent_processed(since, 10).await.unwrap().len(), 1);
        assert!(storage.find_raw_by_url(&article.url).await.unwrap().is_some());
        assert_eq!(storage.get_raw_many(&[article.id, Uuid::new_v4()]).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sqlite_clusters_and_processed() {
        let temp_dir = tempdir().unwrap();
        let storage = SQLiteStorage::new_with_path(&temp_dir.path().join("test.db")).await.unwrap();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        let first = storage.attach_to_cluster(b, &BTreeSet::from([a]), Category::Economy).await.unwrap();
        assert!(first.created);
        assert_eq!(first.member_count, 2);

        let second = storage.attach_to_cluster(c, &BTreeSet::from([a]), Category::Economy).await.unwrap();
        assert_eq!(second.cluster_id, first.cluster_id);
        assert_eq!(second.member_count, 3);

        let processed = ProcessedArticle {
            id: Uuid::new_v4(),
            title: "Synthèse".to_string(),
            summary_short: "court".to_string(),
            summary_medium: "moyen".to_string(),
            summary_long: "long".to_string(),
            categories: vec![Category::Economy],
            category_confidence: 0.8,
            entities: Entities::default(),
            key_quotes: vec![],
            tags: vec![],
            source_article_ids: vec![a, b, c],
            sources: vec![],
            image_url: None,
            published_at: Utc::now(),
            processed_at: Utc::now(),
            is_trending: false,
            is_breaking_news: false,
            breaking_news_level: Urgency::Normal,
            notification: None,
            synthesis: None,
        };
        assert!(storage.insert_processed(&processed).await.unwrap());
        assert!(!storage.insert_processed(&processed).await.unwrap());
        assert!(storage.set_cluster_synthesis(first.cluster_id, processed.id).await.unwrap());
        assert!(!storage.set_cluster_synthesis(first.cluster_id, Uuid::new_v4()).await.unwrap());
        assert!(storage.set_cluster_synthesis(Uuid::new_v4(), processed.id).await.unwrap_err().is_not_found());

        let cluster = storage.get_cluster(first.cluster_id).await.unwrap().unwrap();
        assert_eq!(cluster.member_ids.len(), 3);
        assert_eq!(cluster.synthesized_article_id, Some(processed.id));

        let loaded = storage.get_processed(processed.id).await.unwrap().unwrap();
        assert_eq!(loaded, processed);
        assert_eq!(storage.list_processed(10).await.unwrap().len(), 1);
    }
}

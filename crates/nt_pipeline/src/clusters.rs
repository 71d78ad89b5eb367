use std::collections::BTreeSet;
use std::sync::Arc;

use nt_core::{ArticleCluster, Category, ClusterAttachment, ContentStore, RawArticle, Result};
use uuid::Uuid;

/// Lifecycle of article clusters. Membership only ever grows.
pub struct ClusterManager {
    store: Arc<dyn ContentStore>,
}

impl ClusterManager {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self { store }
    }

    /// Adds `article_id` to the cluster overlapping `matching_ids`, or
    /// creates one seeded with both. The store does the lookup and the write
    /// as one step.
    pub async fn attach_or_create(
        &self,
        article_id: Uuid,
        matching_ids: &[Uuid],
        category: Category,
    ) -> Result<ClusterAttachment> {
        let matching: BTreeSet<Uuid> = matching_ids.iter().copied().collect();
        let attachment = self.store.attach_to_cluster(article_id, &matching, category).await?;
        tracing::debug!(
            raw_article_id = %article_id,
            cluster_id = %attachment.cluster_id,
            created = attachment.created,
            members = attachment.member_count,
            "Attached article to cluster"
        );
        Ok(attachment)
    }

    pub async fn cluster(&self, cluster_id: Uuid) -> Result<Option<ArticleCluster>> {
        self.store.get_cluster(cluster_id).await
    }

    /// Resolved members of a cluster. Ids that no longer resolve are
    /// dropped; an unknown cluster has no members.
    pub async fn members_of(&self, cluster_id: Uuid) -> Result<Vec<RawArticle>> {
        let Some(cluster) = self.store.get_cluster(cluster_id).await? else {
            tracing::warn!(cluster_id = %cluster_id, "Unknown cluster, no members");
            return Ok(Vec::new());
        };
        let ids: Vec<Uuid> = cluster.member_ids.iter().copied().collect();
        let members = self.store.get_raw_many(&ids).await?;
        if members.len() < ids.len() {
            tracing::warn!(
                cluster_id = %cluster_id,
                missing = ids.len() - members.len(),
                "Cluster references articles that no longer resolve"
            );
        }
        Ok(members)
    }
}

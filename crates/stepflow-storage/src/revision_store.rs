// Revision store: versioned workflow documents with lifecycle operations.
//
// Every operation is a single transaction. saveNext serializes concurrent
// writers by locking the current max-version row; setActive is a conditional
// update keyed on the updated_at optimistic-lock token.

use anyhow::Context;
use chrono::Utc;
use serde_json::Value;
use sqlx::PgPool;
use std::sync::Arc;

use stepflow_core::source_patch::{apply_metadata, MetadataPatch};
use stepflow_core::{
    Result, Step, StepTypeRegistry, StepflowError, WorkflowId, WorkflowRevision,
    WorkflowRevisionId, WorkflowRevisionWithSource,
};

use crate::models::WorkflowRevisionRow;

const REVISION_COLUMNS: &str = "namespace, id, version, name, description, parameters, steps, active, source, created_at, updated_at";

#[derive(Clone)]
pub struct RevisionStore {
    pool: PgPool,
    steps: Arc<StepTypeRegistry>,
}

impl RevisionStore {
    pub fn new(pool: PgPool, steps: Arc<StepTypeRegistry>) -> Self {
        Self { pool, steps }
    }

    // ============================================
    // Creation
    // ============================================

    /// Insert version 1 of a new workflow. Fails with `AlreadyExists` when any
    /// revision of `(namespace, id)` is already stored.
    pub async fn save_first(
        &self,
        incoming: &WorkflowRevisionWithSource,
    ) -> Result<WorkflowRevisionWithSource> {
        let revision = &incoming.revision;
        let now = Utc::now();
        let source = apply_metadata(
            &incoming.source,
            &MetadataPatch {
                version: Some(1),
                created_at: Some(now),
                updated_at: Some(now),
                active: Some(false),
            },
        );

        let mut tx = self.pool.begin().await.context("starting transaction")?;

        // Any surviving revision counts as existing, even if version 1 was
        // deleted. Concurrent creates race to the version-1 unique key.
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM workflow_revisions WHERE namespace = $1 AND id = $2)",
        )
        .bind(&revision.namespace)
        .bind(&revision.id)
        .fetch_one(&mut *tx)
        .await
        .context("checking workflow existence")?;

        if exists {
            return Err(StepflowError::AlreadyExists {
                namespace: revision.namespace.clone(),
                id: revision.id.clone(),
            });
        }

        let result = sqlx::query(
            r#"
            INSERT INTO workflow_revisions (namespace, id, version, name, description, parameters, steps, active, source, created_at, updated_at)
            VALUES ($1, $2, 1, $3, $4, $5, $6, FALSE, $7, $8, $8)
            "#,
        )
        .bind(&revision.namespace)
        .bind(&revision.id)
        .bind(&revision.name)
        .bind(&revision.description)
        .bind(parameters_json(revision)?)
        .bind(steps_json(&revision.steps))
        .bind(&source)
        .bind(now)
        .execute(&mut *tx)
        .await;

        match result {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(StepflowError::AlreadyExists {
                    namespace: revision.namespace.clone(),
                    id: revision.id.clone(),
                })
            }
            Err(e) => {
                return Err(StepflowError::Internal(
                    anyhow::Error::new(e).context("inserting first revision"),
                ))
            }
        }

        tx.commit().await.context("committing first revision")?;

        tracing::info!(
            workflow = %revision.workflow_id(),
            "stored first revision"
        );
        Ok(stored(revision, 1, now, source))
    }

    /// Atomically assign `maxVersion + 1` and store the revision under it.
    /// Fails with `NotFound` when the workflow has no revisions at all.
    pub async fn save_next(
        &self,
        workflow: &WorkflowId,
        incoming: &WorkflowRevisionWithSource,
    ) -> Result<WorkflowRevisionWithSource> {
        let revision = &incoming.revision;
        let mut tx = self.pool.begin().await.context("starting transaction")?;

        // Lock the current max-version row so concurrent creates serialize
        let max_version: Option<i32> = sqlx::query_scalar(
            r#"
            SELECT version FROM workflow_revisions
            WHERE namespace = $1 AND id = $2
            ORDER BY version DESC
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(&workflow.namespace)
        .bind(&workflow.id)
        .fetch_optional(&mut *tx)
        .await
        .context("selecting current version")?;

        let Some(max_version) = max_version else {
            return Err(StepflowError::not_found(format!(
                "workflow {workflow} does not exist"
            )));
        };

        let next_version = max_version + 1;
        let now = Utc::now();
        let source = apply_metadata(
            &incoming.source,
            &MetadataPatch {
                version: Some(next_version),
                created_at: Some(now),
                updated_at: Some(now),
                active: Some(false),
            },
        );

        sqlx::query(
            r#"
            INSERT INTO workflow_revisions (namespace, id, version, name, description, parameters, steps, active, source, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, FALSE, $8, $9, $9)
            "#,
        )
        .bind(&workflow.namespace)
        .bind(&workflow.id)
        .bind(next_version)
        .bind(&revision.name)
        .bind(&revision.description)
        .bind(parameters_json(revision)?)
        .bind(steps_json(&revision.steps))
        .bind(&source)
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("inserting next revision")?;

        tx.commit().await.context("committing next revision")?;

        tracing::info!(workflow = %workflow, version = next_version, "stored next revision");
        let mut stored_revision = revision.clone();
        stored_revision.namespace = workflow.namespace.clone();
        stored_revision.id = workflow.id.clone();
        Ok(stored(&stored_revision, next_version, now, source))
    }

    // ============================================
    // Mutation
    // ============================================

    /// Replace the mutable content of an inactive revision: name, description,
    /// parameters, steps, and source text. The immutable identity fields must
    /// match the stored row.
    pub async fn update_inactive(
        &self,
        incoming: &WorkflowRevisionWithSource,
    ) -> Result<WorkflowRevisionWithSource> {
        let revision = &incoming.revision;
        let key = revision.revision_id().ok_or_else(|| {
            StepflowError::MalformedIdentifier(
                "revision to update must carry an assigned version".to_string(),
            )
        })?;

        let mut tx = self.pool.begin().await.context("starting transaction")?;

        let current = sqlx::query_as::<_, WorkflowRevisionRow>(&format!(
            "SELECT {REVISION_COLUMNS} FROM workflow_revisions \
             WHERE namespace = $1 AND id = $2 AND version = $3 FOR UPDATE"
        ))
        .bind(&key.namespace)
        .bind(&key.id)
        .bind(key.version)
        .fetch_optional(&mut *tx)
        .await
        .context("selecting revision for update")?
        .ok_or_else(|| StepflowError::not_found(format!("revision {key} does not exist")))?;

        if current.active {
            return Err(StepflowError::ActiveConflict(format!(
                "revision {key} is active and cannot be updated"
            )));
        }
        if let Some(created_at) = revision.created_at {
            if created_at != current.created_at {
                return Err(StepflowError::InvalidRevision(vec![
                    "createdAt is immutable".to_string(),
                ]));
            }
        }

        let now = Utc::now();
        let source = apply_metadata(
            &incoming.source,
            &MetadataPatch {
                version: Some(key.version),
                created_at: Some(current.created_at),
                updated_at: Some(now),
                active: Some(false),
            },
        );

        sqlx::query(
            r#"
            UPDATE workflow_revisions
            SET name = $4, description = $5, parameters = $6, steps = $7, source = $8, updated_at = $9
            WHERE namespace = $1 AND id = $2 AND version = $3
            "#,
        )
        .bind(&key.namespace)
        .bind(&key.id)
        .bind(key.version)
        .bind(&revision.name)
        .bind(&revision.description)
        .bind(parameters_json(revision)?)
        .bind(steps_json(&revision.steps))
        .bind(&source)
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("updating revision")?;

        tx.commit().await.context("committing revision update")?;

        let mut updated = revision.clone();
        updated.active = false;
        updated.created_at = Some(current.created_at);
        updated.updated_at = Some(now);
        Ok(WorkflowRevisionWithSource {
            revision: updated,
            source,
        })
    }

    /// Flip the active flag under optimistic locking. The caller presents the
    /// `updated_at` it last read; a mismatch yields `OptimisticLockConflict`
    /// carrying both stamps.
    pub async fn set_active(
        &self,
        key: &WorkflowRevisionId,
        expected_updated_at: chrono::DateTime<Utc>,
        new_active: bool,
    ) -> Result<WorkflowRevisionWithSource> {
        let current: Option<(String, chrono::DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT source, updated_at FROM workflow_revisions
            WHERE namespace = $1 AND id = $2 AND version = $3
            "#,
        )
        .bind(&key.namespace)
        .bind(&key.id)
        .bind(key.version)
        .fetch_optional(&self.pool)
        .await
        .context("reading revision source")?;

        let Some((source, _)) = current else {
            return Err(StepflowError::not_found(format!(
                "revision {key} does not exist"
            )));
        };

        let now = Utc::now();
        let patched = apply_metadata(
            &source,
            &MetadataPatch {
                updated_at: Some(now),
                active: Some(new_active),
                ..Default::default()
            },
        );

        let row = sqlx::query_as::<_, WorkflowRevisionRow>(&format!(
            "UPDATE workflow_revisions
             SET active = $4, updated_at = $5, source = $6
             WHERE namespace = $1 AND id = $2 AND version = $3 AND updated_at = $7
             RETURNING {REVISION_COLUMNS}"
        ))
        .bind(&key.namespace)
        .bind(&key.id)
        .bind(key.version)
        .bind(new_active)
        .bind(now)
        .bind(&patched)
        .bind(expected_updated_at)
        .fetch_optional(&self.pool)
        .await
        .context("updating active flag")?;

        match row {
            Some(row) => {
                tracing::info!(revision = %key, active = new_active, "active flag updated");
                row.into_revision_with_source(&self.steps)
            }
            None => {
                let actual: Option<chrono::DateTime<Utc>> = sqlx::query_scalar(
                    r#"
                    SELECT updated_at FROM workflow_revisions
                    WHERE namespace = $1 AND id = $2 AND version = $3
                    "#,
                )
                .bind(&key.namespace)
                .bind(&key.id)
                .bind(key.version)
                .fetch_optional(&self.pool)
                .await
                .context("re-reading revision stamp")?;

                match actual {
                    Some(actual) => Err(StepflowError::OptimisticLockConflict {
                        expected: expected_updated_at,
                        actual,
                    }),
                    None => Err(StepflowError::not_found(format!(
                        "revision {key} does not exist"
                    ))),
                }
            }
        }
    }

    // ============================================
    // Reads
    // ============================================

    pub async fn get(&self, key: &WorkflowRevisionId) -> Result<WorkflowRevision> {
        self.fetch(key).await?.into_revision(&self.steps)
    }

    pub async fn get_with_source(
        &self,
        key: &WorkflowRevisionId,
    ) -> Result<WorkflowRevisionWithSource> {
        self.fetch(key).await?.into_revision_with_source(&self.steps)
    }

    async fn fetch(&self, key: &WorkflowRevisionId) -> Result<WorkflowRevisionRow> {
        sqlx::query_as::<_, WorkflowRevisionRow>(&format!(
            "SELECT {REVISION_COLUMNS} FROM workflow_revisions \
             WHERE namespace = $1 AND id = $2 AND version = $3"
        ))
        .bind(&key.namespace)
        .bind(&key.id)
        .bind(key.version)
        .fetch_optional(&self.pool)
        .await
        .context("reading revision")?
        .ok_or_else(|| StepflowError::not_found(format!("revision {key} does not exist")))
    }

    /// All revisions of a workflow ordered by version, optionally filtered on
    /// the active flag. Filtering for active revisions of a workflow that has
    /// none is `NotFound`.
    pub async fn list_by_workflow(
        &self,
        workflow: &WorkflowId,
        active_filter: Option<bool>,
    ) -> Result<Vec<WorkflowRevision>> {
        let rows = sqlx::query_as::<_, WorkflowRevisionRow>(&format!(
            "SELECT {REVISION_COLUMNS} FROM workflow_revisions \
             WHERE namespace = $1 AND id = $2 AND ($3::boolean IS NULL OR active = $3) \
             ORDER BY version ASC"
        ))
        .bind(&workflow.namespace)
        .bind(&workflow.id)
        .bind(active_filter)
        .fetch_all(&self.pool)
        .await
        .context("listing revisions")?;

        if rows.is_empty() && active_filter == Some(true) {
            return Err(StepflowError::not_found(format!(
                "workflow {workflow} has no active revisions"
            )));
        }

        rows.into_iter()
            .map(|row| row.into_revision(&self.steps))
            .collect()
    }

    /// Distinct workflows in a namespace
    pub async fn list_workflows(&self, namespace: &str) -> Result<Vec<WorkflowId>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT DISTINCT namespace, id FROM workflow_revisions
            WHERE namespace = $1
            ORDER BY id ASC
            "#,
        )
        .bind(namespace)
        .fetch_all(&self.pool)
        .await
        .context("listing workflows")?;

        Ok(rows
            .into_iter()
            .map(|(namespace, id)| WorkflowId { namespace, id })
            .collect())
    }

    // ============================================
    // Deletion
    // ============================================

    /// Delete a single revision; active revisions are protected.
    pub async fn delete_revision(&self, key: &WorkflowRevisionId) -> Result<()> {
        let mut tx = self.pool.begin().await.context("starting transaction")?;

        let active: Option<bool> = sqlx::query_scalar(
            r#"
            SELECT active FROM workflow_revisions
            WHERE namespace = $1 AND id = $2 AND version = $3
            FOR UPDATE
            "#,
        )
        .bind(&key.namespace)
        .bind(&key.id)
        .bind(key.version)
        .fetch_optional(&mut *tx)
        .await
        .context("selecting revision for delete")?;

        match active {
            None => {
                return Err(StepflowError::not_found(format!(
                    "revision {key} does not exist"
                )))
            }
            Some(true) => {
                return Err(StepflowError::ActiveConflict(format!(
                    "revision {key} is active and cannot be deleted"
                )))
            }
            Some(false) => {}
        }

        sqlx::query(
            "DELETE FROM workflow_revisions WHERE namespace = $1 AND id = $2 AND version = $3",
        )
        .bind(&key.namespace)
        .bind(&key.id)
        .bind(key.version)
        .execute(&mut *tx)
        .await
        .context("deleting revision")?;

        tx.commit().await.context("committing revision delete")?;
        tracing::info!(revision = %key, "revision deleted");
        Ok(())
    }

    /// Delete a whole workflow. Rejected while any revision is active;
    /// deleting a workflow that does not exist succeeds (idempotent).
    pub async fn delete_workflow(&self, workflow: &WorkflowId) -> Result<()> {
        let mut tx = self.pool.begin().await.context("starting transaction")?;

        let any_active: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM workflow_revisions
                WHERE namespace = $1 AND id = $2 AND active
            )
            "#,
        )
        .bind(&workflow.namespace)
        .bind(&workflow.id)
        .fetch_one(&mut *tx)
        .await
        .context("checking for active revisions")?;

        if any_active {
            return Err(StepflowError::ActiveConflict(format!(
                "workflow {workflow} has active revisions and cannot be deleted"
            )));
        }

        let result =
            sqlx::query("DELETE FROM workflow_revisions WHERE namespace = $1 AND id = $2")
                .bind(&workflow.namespace)
                .bind(&workflow.id)
                .execute(&mut *tx)
                .await
                .context("deleting workflow")?;

        tx.commit().await.context("committing workflow delete")?;
        tracing::info!(
            workflow = %workflow,
            revisions = result.rows_affected(),
            "workflow deleted"
        );
        Ok(())
    }
}

// ============================================
// Helpers
// ============================================

fn parameters_json(revision: &WorkflowRevision) -> Result<Value> {
    Ok(serde_json::to_value(&revision.parameters).context("encoding parameters")?)
}

fn steps_json(steps: &[Step]) -> Value {
    Value::Array(steps.iter().map(Step::to_value).collect())
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn stored(
    revision: &WorkflowRevision,
    version: i32,
    now: chrono::DateTime<Utc>,
    source: String,
) -> WorkflowRevisionWithSource {
    let mut stored = revision.clone();
    stored.version = version;
    stored.active = false;
    stored.created_at = Some(now);
    stored.updated_at = Some(now);
    WorkflowRevisionWithSource {
        revision: stored,
        source,
    }
}

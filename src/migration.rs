// ABOUTME: Startup pass rewriting legacy untyped session foreign keys into typed references
// ABOUTME: Idempotent, per-record all-or-nothing, with orphans logged and left untouched
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use crate::store::SessionStore;
use fitpro_core::errors::{MigrationFatalError, MigrationRecordError, StoreError};
use fitpro_core::models::{ForeignKey, ReferencePatch, SessionDocument, SessionId, UserId};
use std::sync::Arc;
use tracing::{info, warn};

/// What one migration pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Documents examined
    pub scanned: usize,
    /// Documents rewritten to typed references
    pub migrated: usize,
    /// Documents that needed nothing
    pub already_typed: usize,
    /// Documents that could not be fixed
    pub orphaned: Vec<SessionId>,
}

/// Normalizes legacy session references before the scheduler starts
pub struct ReferenceMigration {
    store: Arc<dyn SessionStore>,
}

enum RecordFailure {
    Record(MigrationRecordError),
    Fatal(MigrationFatalError),
}

impl From<MigrationRecordError> for RecordFailure {
    fn from(error: MigrationRecordError) -> Self {
        Self::Record(error)
    }
}

impl ReferenceMigration {
    /// Create a pass over `store`
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    /// Migrate every document with legacy references
    ///
    /// # Errors
    ///
    /// Returns `MigrationFatalError::StoreUnreachable` if the store cannot be
    /// read or becomes unavailable mid-pass; per-record problems only land in
    /// the report
    pub async fn run(&self) -> Result<MigrationReport, MigrationFatalError> {
        let documents = self
            .store
            .list_session_documents()
            .await
            .map_err(MigrationFatalError::StoreUnreachable)?;

        let mut report = MigrationReport {
            scanned: documents.len(),
            ..MigrationReport::default()
        };

        for document in &documents {
            if !document.has_legacy_references() {
                report.already_typed += 1;
                continue;
            }
            match self.migrate_document(document).await {
                Ok(()) => {
                    info!(session_id = %document.id, "Migrated legacy session references");
                    report.migrated += 1;
                }
                Err(RecordFailure::Record(e)) => {
                    warn!(session_id = %document.id, error = %e, "Orphaned session record left unmigrated");
                    report.orphaned.push(document.id.clone());
                }
                Err(RecordFailure::Fatal(e)) => return Err(e),
            }
        }

        info!(
            scanned = report.scanned,
            migrated = report.migrated,
            already_typed = report.already_typed,
            orphaned = report.orphaned.len(),
            "Reference migration pass complete"
        );
        Ok(report)
    }

    async fn migrate_document(&self, document: &SessionDocument) -> Result<(), RecordFailure> {
        let trainer = self.resolve(document, "trainer", &document.trainer).await?;
        let mut participants = Vec::with_capacity(document.participants.len());
        for key in &document.participants {
            participants.push(self.resolve(document, "participants", key).await?);
        }

        let patch = ReferencePatch {
            trainer,
            participants,
        };
        self.store
            .update_session_references(&document.id, &patch)
            .await
            .map_err(|e| store_failure(&document.id, e))
    }

    async fn resolve(
        &self,
        document: &SessionDocument,
        field: &'static str,
        key: &ForeignKey,
    ) -> Result<UserId, RecordFailure> {
        let raw = match key {
            ForeignKey::Typed(user_id) => return Ok(user_id.clone()),
            ForeignKey::Legacy(raw) => raw,
        };

        let user_id = UserId::parse_object_ref(raw).map_err(|source| {
            MigrationRecordError::UnresolvableReference {
                session_id: document.id.to_string(),
                field,
                source,
            }
        })?;

        let exists = self
            .store
            .user_exists(&user_id)
            .await
            .map_err(|e| store_failure(&document.id, e))?;
        if !exists {
            return Err(MigrationRecordError::UnknownUser {
                session_id: document.id.to_string(),
                field,
                user_id: user_id.to_string(),
            }
            .into());
        }
        Ok(user_id)
    }
}

fn store_failure(session_id: &SessionId, error: StoreError) -> RecordFailure {
    if error.is_unavailable() {
        RecordFailure::Fatal(MigrationFatalError::StoreUnreachable(error))
    } else {
        RecordFailure::Record(MigrationRecordError::UpdateRejected {
            session_id: session_id.to_string(),
            source: error,
        })
    }
}

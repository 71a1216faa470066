//! Reconciliation engine
//!
//! The single writer of the transaction <-> ticket relationship. All
//! classifier calls happen before any database transaction opens, so no
//! lock is held across an await.

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::classify::{Classifier, ClassifierClient};
use crate::db::Database;
use crate::error::Result;
use crate::models::{
    NewTransaction, Ticket, TicketAttachment, Transaction, TransactionDraft, TransactionKind,
    TransactionPatch,
};

/// Drives transaction creation, classification, and ticket linkage
#[derive(Clone)]
pub struct Reconciler {
    db: Database,
    classifier: ClassifierClient,
}

impl Reconciler {
    pub fn new(db: Database, classifier: ClassifierClient) -> Self {
        Self { db, classifier }
    }

    /// Create a transaction, resolving a missing category through the
    /// classifier and attaching tickets in the same atomic unit
    ///
    /// Classifier failures never block creation; the fallback category
    /// applies. A lost link race rolls back the whole unit.
    pub async fn create_transaction(
        &self,
        owner_id: i64,
        draft: TransactionDraft,
        attachments: &[TicketAttachment],
    ) -> Result<Transaction> {
        let tx = self.resolve_draft(draft).await;
        let id = self
            .db
            .create_transaction_with_attachments(owner_id, &tx, attachments)?;
        self.db.get_owned_transaction(owner_id, id)
    }

    /// Create a batch of transactions as one all-or-nothing insert
    ///
    /// Each draft gets its own fallback-tolerant classification; one
    /// classifier failure never aborts the batch.
    pub async fn create_transactions_bulk(
        &self,
        owner_id: i64,
        drafts: Vec<TransactionDraft>,
    ) -> Result<Vec<Transaction>> {
        let mut txs = Vec::with_capacity(drafts.len());
        for draft in drafts {
            txs.push(self.resolve_draft(draft).await);
        }

        let ids = self.db.insert_transactions_bulk(owner_id, &txs)?;
        info!(count = ids.len(), "Bulk transaction insert committed");

        ids.into_iter()
            .map(|id| self.db.get_owned_transaction(owner_id, id))
            .collect()
    }

    /// Apply a partial update
    ///
    /// A new description without an explicit category triggers
    /// reclassification; if the classifier fails, the stored category
    /// is kept rather than falling back.
    pub async fn update_transaction(
        &self,
        owner_id: i64,
        id: i64,
        mut patch: TransactionPatch,
    ) -> Result<Transaction> {
        if patch.category.is_none() {
            if let Some(description) = &patch.description {
                match self.classifier.classify(description).await {
                    Ok(category) => patch.category = Some(category),
                    Err(e) => {
                        warn!(error = %e, id, "Reclassification failed, keeping stored category");
                    }
                }
            }
        }

        self.db.update_transaction_fields(owner_id, id, &patch)
    }

    /// Delete a transaction and its attached tickets
    pub fn delete_transaction(&self, owner_id: i64, id: i64) -> Result<()> {
        self.db.delete_transaction(owner_id, id)
    }

    /// Re-run classification on a stored transaction's description
    ///
    /// Unlike creation, a classifier failure here surfaces to the
    /// caller: the point of the call is the classification itself.
    pub async fn reclassify(&self, owner_id: i64, id: i64) -> Result<Transaction> {
        let tx = self.db.get_owned_transaction(owner_id, id)?;
        let category = self.classifier.classify(&tx.description).await?;
        self.db.set_transaction_category(owner_id, id, &category)?;
        self.db.get_owned_transaction(owner_id, id)
    }

    /// Link an already ingested ticket to an existing transaction
    ///
    /// Missing, foreign, and already-linked tickets all answer
    /// `NotFound`.
    pub fn link_existing(
        &self,
        owner_id: i64,
        ticket_id: i64,
        transaction_id: i64,
    ) -> Result<Ticket> {
        // The transaction must exist and be owned before touching the ticket
        self.db.get_owned_transaction(owner_id, transaction_id)?;
        self.db.link_ticket(owner_id, ticket_id, transaction_id)?;
        self.db.get_owned_ticket(owner_id, ticket_id)
    }

    /// Turn every unconsumed ticket item into an expense transaction
    ///
    /// Strictly opt-in. Each item is classified with the fallback
    /// discipline, then the inserts and the ledger update commit as one
    /// SQL transaction; consumption is re-checked inside it, so a
    /// retried call cannot double-create.
    pub async fn materialize_remaining(
        &self,
        owner_id: i64,
        ticket_id: i64,
        date: NaiveDate,
    ) -> Result<Vec<Transaction>> {
        let ticket = self.db.get_owned_ticket(owner_id, ticket_id)?;
        let remaining = ticket.payload.remaining_indices();

        let mut items = Vec::with_capacity(remaining.len());
        for index in remaining {
            let item = &ticket.payload.items[index];
            let category = self
                .classifier
                .classify_or_fallback(&item.label)
                .await
                .into_category();
            items.push((
                index,
                NewTransaction {
                    description: item.label.clone(),
                    amount: item.amount,
                    kind: TransactionKind::Expense,
                    category,
                    date,
                },
            ));
        }

        let ids = self.db.materialize_ticket_items(owner_id, ticket_id, &items)?;
        info!(ticket_id, count = ids.len(), "Materialized ticket items");

        ids.into_iter()
            .map(|id| self.db.get_owned_transaction(owner_id, id))
            .collect()
    }

    async fn resolve_draft(&self, draft: TransactionDraft) -> NewTransaction {
        let category = match draft.category {
            Some(category) => category,
            None => {
                self.classifier
                    .classify_or_fallback(&draft.description)
                    .await
                    .into_category()
            }
        };

        NewTransaction {
            description: draft.description,
            amount: draft.amount,
            kind: draft.kind,
            category,
            date: draft.date,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::MockClassifier;
    use crate::error::Error;
    use crate::models::{LineItem, NewTicket, TicketPayload, FALLBACK_CATEGORY};

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn draft(description: &str, category: Option<&str>) -> TransactionDraft {
        TransactionDraft {
            description: description.to_string(),
            amount: 10.0,
            kind: TransactionKind::Expense,
            category: category.map(str::to_string),
            date: date("2024-02-10"),
        }
    }

    fn reconciler(classifier: MockClassifier) -> Reconciler {
        Reconciler::new(
            Database::in_memory().unwrap(),
            ClassifierClient::Mock(classifier),
        )
    }

    fn seed_ticket(db: &Database, owner: i64) -> i64 {
        db.insert_ticket(
            owner,
            &NewTicket {
                transaction_id: None,
                mime_type: "image/jpeg".to_string(),
                storage_ref: "abc".to_string(),
                size_bytes: 100,
                payload: TicketPayload {
                    raw_lines: vec!["Pain 2.50".to_string(), "Essence 40.00".to_string()],
                    items: vec![
                        LineItem {
                            label: "Pain".to_string(),
                            amount: 2.5,
                        },
                        LineItem {
                            label: "Essence".to_string(),
                            amount: 40.0,
                        },
                    ],
                    filename: None,
                    processed: true,
                    consumed: Default::default(),
                },
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_classifies_missing_category() {
        let r = reconciler(MockClassifier::new());
        let tx = r.create_transaction(1, draft("Pain complet", None), &[]).await.unwrap();
        assert_eq!(tx.category, "Nourriture");
    }

    #[tokio::test]
    async fn test_create_keeps_explicit_category() {
        let r = reconciler(MockClassifier::new());
        let tx = r
            .create_transaction(1, draft("Pain complet", Some("Cadeaux")), &[])
            .await
            .unwrap();
        assert_eq!(tx.category, "Cadeaux");
    }

    #[tokio::test]
    async fn test_create_falls_back_on_classifier_failure() {
        let r = reconciler(MockClassifier::failing());
        let tx = r.create_transaction(1, draft("Pain complet", None), &[]).await.unwrap();
        assert_eq!(tx.category, FALLBACK_CATEGORY);
    }

    #[tokio::test]
    async fn test_create_links_existing_ticket_atomically() {
        let r = reconciler(MockClassifier::new());
        let ticket_id = seed_ticket(&r.db, 1);

        let tx = r
            .create_transaction(
                1,
                draft("Courses", None),
                &[TicketAttachment::Existing { ticket_id }],
            )
            .await
            .unwrap();

        let ticket = r.db.get_owned_ticket(1, ticket_id).unwrap();
        assert_eq!(ticket.transaction_id, Some(tx.id));
    }

    #[tokio::test]
    async fn test_bulk_classifier_failure_never_aborts_batch() {
        let r = reconciler(MockClassifier::failing());
        let txs = r
            .create_transactions_bulk(1, vec![draft("Pain", None), draft("Essence", None)])
            .await
            .unwrap();
        assert_eq!(txs.len(), 2);
        assert!(txs.iter().all(|t| t.category == FALLBACK_CATEGORY));
    }

    #[tokio::test]
    async fn test_update_reclassifies_on_new_description() {
        let r = reconciler(MockClassifier::new());
        let tx = r.create_transaction(1, draft("Pain", None), &[]).await.unwrap();
        assert_eq!(tx.category, "Nourriture");

        let updated = r
            .update_transaction(
                1,
                tx.id,
                TransactionPatch {
                    description: Some("Essence SP95".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.category, "Transport");
    }

    #[tokio::test]
    async fn test_update_keeps_stored_category_on_classifier_failure() {
        let r = reconciler(MockClassifier::new());
        let tx = r.create_transaction(1, draft("Pain", None), &[]).await.unwrap();

        let r_failing = Reconciler::new(r.db.clone(), ClassifierClient::Mock(MockClassifier::failing()));
        let updated = r_failing
            .update_transaction(
                1,
                tx.id,
                TransactionPatch {
                    description: Some("Essence SP95".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        // Not the fallback: the previously stored category survives
        assert_eq!(updated.category, "Nourriture");
        assert_eq!(updated.description, "Essence SP95");
    }

    #[tokio::test]
    async fn test_update_explicit_category_skips_classifier() {
        let r = reconciler(MockClassifier::failing());
        let tx = r
            .create_transaction(1, draft("Pain", Some("Nourriture")), &[])
            .await
            .unwrap();

        let updated = r
            .update_transaction(
                1,
                tx.id,
                TransactionPatch {
                    description: Some("Essence".to_string()),
                    category: Some("Transport".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.category, "Transport");
    }

    #[tokio::test]
    async fn test_reclassify_surfaces_classifier_failure() {
        let r = reconciler(MockClassifier::new());
        let tx = r.create_transaction(1, draft("Pain", None), &[]).await.unwrap();

        let r_failing = Reconciler::new(r.db.clone(), ClassifierClient::Mock(MockClassifier::failing()));
        let err = r_failing.reclassify(1, tx.id).await.unwrap_err();
        assert!(matches!(err, Error::External(_)));

        // The stored category is untouched
        let stored = r.db.get_owned_transaction(1, tx.id).unwrap();
        assert_eq!(stored.category, "Nourriture");
    }

    #[tokio::test]
    async fn test_reclassify_updates_category() {
        let r = reconciler(MockClassifier::new());
        let tx = r
            .create_transaction(1, draft("Essence SP95", Some("Autres")), &[])
            .await
            .unwrap();

        let reclassified = r.reclassify(1, tx.id).await.unwrap();
        assert_eq!(reclassified.category, "Transport");
    }

    #[tokio::test]
    async fn test_link_existing_requires_owned_transaction() {
        let r = reconciler(MockClassifier::new());
        let ticket_id = seed_ticket(&r.db, 1);

        let err = r.link_existing(1, ticket_id, 999).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        // The ticket stays unlinked
        let ticket = r.db.get_owned_ticket(1, ticket_id).unwrap();
        assert_eq!(ticket.transaction_id, None);
    }

    #[tokio::test]
    async fn test_materialize_remaining_classifies_each_item() {
        let r = reconciler(MockClassifier::new());
        let ticket_id = seed_ticket(&r.db, 1);

        let txs = r
            .materialize_remaining(1, ticket_id, date("2024-02-10"))
            .await
            .unwrap();
        assert_eq!(txs.len(), 2);
        assert_eq!(txs[0].category, "Nourriture");
        assert_eq!(txs[1].category, "Transport");
        assert!(txs.iter().all(|t| t.kind == TransactionKind::Expense));

        let ticket = r.db.get_owned_ticket(1, ticket_id).unwrap();
        assert!(ticket.payload.is_fully_consumed());
    }

    #[tokio::test]
    async fn test_materialize_skips_consumed_items() {
        let r = reconciler(MockClassifier::new());
        let ticket_id = seed_ticket(&r.db, 1);
        r.db.consume_ticket_items(1, ticket_id, &[0]).unwrap();

        let txs = r
            .materialize_remaining(1, ticket_id, date("2024-02-10"))
            .await
            .unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].description, "Essence");
    }

    #[tokio::test]
    async fn test_materialize_fully_consumed_creates_nothing() {
        let r = reconciler(MockClassifier::new());
        let ticket_id = seed_ticket(&r.db, 1);
        r.db.consume_ticket_items(1, ticket_id, &[0, 1]).unwrap();

        let txs = r
            .materialize_remaining(1, ticket_id, date("2024-02-10"))
            .await
            .unwrap();
        assert!(txs.is_empty());
    }
}

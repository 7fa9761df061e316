//! Confirmation state machine for pending expense records.
//!
//! A record is created pending as soon as a candidate is extracted. From
//! there it is either confirmed (optionally stamped with a payment method)
//! or discarded; a category edit loops back to the pending state. Every
//! transition names the record id explicitly, so several proposals can be
//! resolved independently and out of order.
//!
//! Terminal transitions delete the pending confirmation; the category edit
//! never does. A second terminal action on the same id reports
//! [`Transition::NotFound`] instead of failing.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::store::{now_utc, Expense, PaymentMethod, Store, StoreError};

/// Result of applying a user action to a pending record.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Still pending and unchanged; returned by [`ConfirmationMachine::pending`].
    Proposed(Expense),
    /// Confirmed; the pending confirmation is gone.
    Confirmed(Expense),
    /// Hard-deleted together with its pending confirmation.
    Discarded,
    /// Category updated, still pending. The caller re-presents the proposal.
    CategoryChanged(Expense),
    /// No pending record with that id belongs to the user.
    NotFound,
    /// The confirmation window closed; the record has been purged.
    Expired,
}

/// Applies confirmation actions against the store.
#[derive(Debug, Clone)]
pub struct ConfirmationMachine {
    store: Store,
    ttl: chrono::Duration,
}

impl ConfirmationMachine {
    /// Create a machine whose confirmations live for `ttl`.
    pub fn new(store: Store, ttl: chrono::Duration) -> Self {
        Self { store, ttl }
    }

    /// Purge the record when its confirmation has expired.
    async fn expire_if_stale(
        &self,
        user_id: i64,
        expense_id: i64,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let Some(confirmation) = self.store.confirmation_for_expense(expense_id).await? else {
            return Ok(false);
        };
        if confirmation.user_id != user_id || !confirmation.is_expired(now) {
            return Ok(false);
        }
        self.store.discard_pending(user_id, expense_id).await?;
        info!(user_id, expense_id, "pending expense expired on access");
        Ok(true)
    }

    /// Look up a still-pending record without changing it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on storage failure.
    pub async fn pending(&self, user_id: i64, expense_id: i64) -> Result<Transition, StoreError> {
        if self.expire_if_stale(user_id, expense_id, now_utc()).await? {
            return Ok(Transition::Expired);
        }
        match self.store.user_expense(user_id, expense_id).await? {
            Some(expense) if expense.is_pending => Ok(Transition::Proposed(expense)),
            _ => Ok(Transition::NotFound),
        }
    }

    /// Confirm without a payment method.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on storage failure.
    pub async fn confirm(&self, user_id: i64, expense_id: i64) -> Result<Transition, StoreError> {
        self.finish(user_id, expense_id, None).await
    }

    /// Confirm and stamp a payment method. Unknown method names are stored
    /// verbatim.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on storage failure.
    pub async fn confirm_with_payment(
        &self,
        user_id: i64,
        expense_id: i64,
        method: &str,
    ) -> Result<Transition, StoreError> {
        let method = PaymentMethod::parse_lenient(method);
        self.finish(user_id, expense_id, Some(&method)).await
    }

    async fn finish(
        &self,
        user_id: i64,
        expense_id: i64,
        method: Option<&PaymentMethod>,
    ) -> Result<Transition, StoreError> {
        if self.expire_if_stale(user_id, expense_id, now_utc()).await? {
            return Ok(Transition::Expired);
        }
        if !self.store.confirm_pending(user_id, expense_id, method).await? {
            debug!(user_id, expense_id, "confirm on a record that is no longer pending");
            return Ok(Transition::NotFound);
        }
        info!(
            user_id,
            expense_id,
            payment_method = method.map(PaymentMethod::as_str),
            "expense confirmed"
        );
        match self.store.expense(expense_id).await? {
            Some(expense) => Ok(Transition::Confirmed(expense)),
            None => Ok(Transition::NotFound),
        }
    }

    /// Delete a pending record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on storage failure.
    pub async fn discard(&self, user_id: i64, expense_id: i64) -> Result<Transition, StoreError> {
        if self.expire_if_stale(user_id, expense_id, now_utc()).await? {
            return Ok(Transition::Expired);
        }
        if self.store.discard_pending(user_id, expense_id).await? {
            info!(user_id, expense_id, "pending expense discarded");
            Ok(Transition::Discarded)
        } else {
            Ok(Transition::NotFound)
        }
    }

    /// Move a pending record to another category. The record inherits the
    /// category's income flag and stays pending.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on storage failure.
    pub async fn set_category(
        &self,
        user_id: i64,
        expense_id: i64,
        category_id: i64,
    ) -> Result<Transition, StoreError> {
        if self.expire_if_stale(user_id, expense_id, now_utc()).await? {
            return Ok(Transition::Expired);
        }
        let Some(category) = self.store.category(category_id).await? else {
            return Ok(Transition::NotFound);
        };
        if !self
            .store
            .set_pending_category(user_id, expense_id, category.id, category.is_income)
            .await?
        {
            return Ok(Transition::NotFound);
        }
        debug!(user_id, expense_id, category = %category.name, "pending expense recategorized");
        match self.store.expense(expense_id).await? {
            Some(expense) => Ok(Transition::CategoryChanged(expense)),
            None => Ok(Transition::NotFound),
        }
    }

    /// Purge pending records whose confirmation window closed before `now`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on storage failure.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        self.store.sweep_expired(now, self.ttl).await
    }
}

//! Pending confirmations and the expiry sweep.

use chrono::Duration;
use gastos::store::now_utc;
use rust_decimal_macros::dec;

use crate::support::{confirmed_expense, pending_expense, register, seeded_store};

#[tokio::test]
async fn confirmation_is_replaced_not_duplicated() {
    let (store, _) = seeded_store().await;
    let user = register(&store, 1).await;
    let expense = pending_expense(&store, user.id, "Alimentación", dec!(150), "2024-05-02").await;

    let first = store
        .create_confirmation(user.id, expense.id, 10, 100, Duration::hours(24))
        .await
        .expect("first confirmation");
    let second = store
        .create_confirmation(user.id, expense.id, 10, 101, Duration::hours(24))
        .await
        .expect("replacement");

    assert_eq!(first.id, second.id);
    assert_eq!(second.message_id, 101);
    assert!(second.expires_at > second.created_at);
}

#[tokio::test]
async fn confirming_drops_the_confirmation() {
    let (store, _) = seeded_store().await;
    let user = register(&store, 1).await;
    let expense = pending_expense(&store, user.id, "Alimentación", dec!(150), "2024-05-02").await;
    store
        .create_confirmation(user.id, expense.id, 10, 100, Duration::hours(24))
        .await
        .expect("confirmation");

    store
        .confirm_pending(user.id, expense.id, None)
        .await
        .expect("confirm");
    assert!(store
        .confirmation_for_expense(expense.id)
        .await
        .expect("lookup")
        .is_none());
}

#[tokio::test]
async fn sweep_purges_expired_and_orphaned_pending_records() {
    let (store, _) = seeded_store().await;
    let user = register(&store, 1).await;
    let ttl = Duration::hours(24);

    let expired = pending_expense(&store, user.id, "Transporte", dec!(40), "2024-05-02").await;
    store
        .create_confirmation(user.id, expired.id, 10, 1, Duration::seconds(-1))
        .await
        .expect("expired confirmation");

    let live = pending_expense(&store, user.id, "Transporte", dec!(41), "2024-05-02").await;
    store
        .create_confirmation(user.id, live.id, 10, 2, ttl)
        .await
        .expect("live confirmation");

    let orphan = pending_expense(&store, user.id, "Transporte", dec!(42), "2024-05-02").await;
    let confirmed = confirmed_expense(&store, user.id, "Transporte", dec!(43), "2024-05-02").await;

    let removed = store.sweep_expired(now_utc(), ttl).await.expect("sweep");
    assert_eq!(removed, 1, "only the expired record goes; the orphan is still young");
    assert!(store.expense(expired.id).await.expect("lookup").is_none());
    assert!(store
        .confirmation_for_expense(expired.id)
        .await
        .expect("lookup")
        .is_none());
    assert!(store.expense(orphan.id).await.expect("lookup").is_some());

    let later = now_utc()
        .checked_add_signed(Duration::hours(25))
        .expect("time arithmetic");
    let removed = store.sweep_expired(later, ttl).await.expect("later sweep");
    assert_eq!(removed, 2, "the live confirmation and the orphan have both aged out");
    assert!(store.expense(live.id).await.expect("lookup").is_none());
    assert!(store.expense(orphan.id).await.expect("lookup").is_none());
    assert!(
        store.expense(confirmed.id).await.expect("lookup").is_some(),
        "confirmed records are never swept"
    );
}

#[tokio::test]
async fn expiry_is_inclusive() {
    let (store, _) = seeded_store().await;
    let user = register(&store, 1).await;
    let expense = pending_expense(&store, user.id, "Salud", dec!(99), "2024-05-02").await;
    let confirmation = store
        .create_confirmation(user.id, expense.id, 10, 1, Duration::minutes(5))
        .await
        .expect("confirmation");

    assert!(!confirmation.is_expired(confirmation.created_at));
    assert!(confirmation.is_expired(confirmation.expires_at));
}

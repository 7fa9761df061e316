//! User registration and mailbox settings.

use chrono::Duration;
use gastos::store::{now_utc, UserProfile};

use crate::support::{register, seeded_store};

#[tokio::test]
async fn upsert_refreshes_profile_but_keeps_id() {
    let (store, _) = seeded_store().await;
    let first = register(&store, 7).await;
    let refreshed = store
        .upsert_user(
            &UserProfile {
                telegram_id: 7,
                username: Some("ana_mx".to_owned()),
                first_name: Some("Ana".to_owned()),
                last_name: Some("López".to_owned()),
            },
            "USD",
        )
        .await
        .expect("upsert");

    assert_eq!(first.id, refreshed.id);
    assert_eq!(refreshed.username.as_deref(), Some("ana_mx"));
    assert_eq!(refreshed.last_name.as_deref(), Some("López"));
    assert_eq!(refreshed.default_currency, "MXN", "currency is set on first contact only");
    assert!(refreshed.is_active);
    assert!(!refreshed.email_auto_check);
}

#[tokio::test]
async fn email_account_enables_auto_check() {
    let (store, _) = seeded_store().await;
    let user = register(&store, 7).await;
    let idle = register(&store, 8).await;

    store
        .set_email_account(user.id, "ana@gmail.com", "abcd efgh ijkl mnop", 30)
        .await
        .expect("set account");

    let due = store.users_with_auto_check().await.expect("users");
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].id, user.id);
    assert_ne!(due[0].id, idle.id);
    assert_eq!(due[0].email_check_interval, 30);

    let account = due[0].mail_account().expect("account configured");
    assert_eq!(account.address, "ana@gmail.com");
    assert!(!format!("{:?}", due[0]).contains("abcd"));

    store
        .set_email_auto_check(user.id, false)
        .await
        .expect("toggle");
    assert!(store
        .users_with_auto_check()
        .await
        .expect("users")
        .is_empty());
}

#[tokio::test]
async fn clearing_the_account_forgets_the_password() {
    let (store, _) = seeded_store().await;
    let user = register(&store, 7).await;
    store
        .set_email_account(user.id, "ana@gmail.com", "secret", 60)
        .await
        .expect("set account");
    store.clear_email_account(user.id).await.expect("clear");

    let user = store.user(user.id).await.expect("lookup").expect("exists");
    assert!(user.mail_account().is_none());
    assert!(!user.email_auto_check);
}

#[tokio::test]
async fn check_due_follows_the_interval() {
    let (store, _) = seeded_store().await;
    let user = register(&store, 7).await;
    store
        .set_email_account(user.id, "ana@gmail.com", "secret", 60)
        .await
        .expect("set account");
    store.set_email_interval(user.id, 15).await.expect("interval");

    let now = now_utc();
    let fresh = store.user(user.id).await.expect("lookup").expect("exists");
    assert!(fresh.email_check_due(now), "never checked");

    store.touch_email_checked(user.id, now).await.expect("touch");
    let checked = store.user(user.id).await.expect("lookup").expect("exists");
    assert_eq!(checked.email_last_checked, Some(now));
    assert!(!checked.email_check_due(now));
    let later = now
        .checked_add_signed(Duration::minutes(15))
        .expect("time arithmetic");
    assert!(checked.email_check_due(later));
}

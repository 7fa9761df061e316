//! Mailbox scanning against an in-memory mailbox and a recording sender.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use gastos::mailbox::{MailAccount, MailMessage, Mailbox, MailboxConnector};
use gastos::parsing::invoice::InvoiceInterpreter;
use gastos::parsing::model::ModelLimits;
use gastos::scanner::{MailScanner, ProposalSender, ScanReport, ScanSettings};
use gastos::store::{now_utc, Expense, ExpenseFilter, Store, User};
use rust_decimal_macros::dec;

use crate::support::{email, intake, register, seeded_store, ScriptedProvider, TZ};

const INVOICE_REPLY: &str = r#"{"is_invoice": true, "amount": 1299, "currency": "MXN",
    "merchant": "Tienda MX", "description": "Pedido de audífonos", "category": "Compras",
    "date": "2024-05-02", "confidence": 0.9}"#;

#[derive(Default)]
struct MailLog {
    opens: usize,
    listed: usize,
    marked: Vec<String>,
    disconnects: usize,
}

struct FakeMailbox {
    inbox: Vec<MailMessage>,
    accepts_login: bool,
    log: Arc<Mutex<MailLog>>,
}

#[async_trait]
impl Mailbox for FakeMailbox {
    async fn connect(&mut self) -> bool {
        self.accepts_login
    }

    async fn list_unread(&mut self, limit: usize) -> Vec<MailMessage> {
        self.log.lock().expect("log lock").listed += 1;
        self.inbox.iter().take(limit).cloned().collect()
    }

    async fn mark_read(&mut self, id: &str) -> bool {
        self.log.lock().expect("log lock").marked.push(id.to_owned());
        true
    }

    async fn disconnect(&mut self) {
        self.log.lock().expect("log lock").disconnects += 1;
    }
}

struct FakeConnector {
    inbox: Vec<MailMessage>,
    accepts_login: bool,
    log: Arc<Mutex<MailLog>>,
}

impl MailboxConnector for FakeConnector {
    fn open(&self, account: MailAccount) -> Box<dyn Mailbox> {
        assert_eq!(account.address, "ana@gmail.com");
        self.log.lock().expect("log lock").opens += 1;
        Box::new(FakeMailbox {
            inbox: self.inbox.clone(),
            accepts_login: self.accepts_login,
            log: Arc::clone(&self.log),
        })
    }
}

#[derive(Default)]
struct RecordingSender {
    fail: bool,
    sent: Mutex<Vec<(i64, i64)>>,
    next_message_id: AtomicI64,
}

#[async_trait]
impl ProposalSender for RecordingSender {
    async fn send_proposal(&self, chat_id: i64, expense: &Expense) -> anyhow::Result<i64> {
        if self.fail {
            anyhow::bail!("chat unreachable");
        }
        self.sent.lock().expect("sent lock").push((chat_id, expense.id));
        Ok(self.next_message_id.fetch_add(1, Ordering::SeqCst).saturating_add(100))
    }
}

struct Harness {
    store: Store,
    user: User,
    provider: Arc<ScriptedProvider>,
    log: Arc<Mutex<MailLog>>,
    sender: Arc<RecordingSender>,
    scanner: MailScanner,
}

fn inbox() -> Vec<MailMessage> {
    vec![
        email(
            "1",
            "Tu factura de mayo",
            "facturas@tienda.mx",
            "Total a pagar: $1,299.00 MXN",
        ),
        email(
            "2",
            "Fotos del fin de semana",
            "mama@example.com",
            "¡Mira qué bonito!",
        ),
    ]
}

async fn harness(reply: &str, accepts_login: bool, sender: RecordingSender) -> Harness {
    let (store, taxonomy) = seeded_store().await;
    let user = register(&store, 321).await;
    store
        .set_email_account(user.id, "ana@gmail.com", "app-password", 60)
        .await
        .expect("mail account");
    let user = store.user(user.id).await.expect("lookup").expect("exists");

    let provider = ScriptedProvider::replying(reply);
    let interpreter = InvoiceInterpreter::new(
        Arc::clone(&provider) as Arc<dyn gastos::providers::LlmProvider>,
        Arc::clone(&taxonomy),
        "MXN".to_owned(),
        ModelLimits::default(),
    );
    let log = Arc::new(Mutex::new(MailLog::default()));
    let connector = FakeConnector {
        inbox: inbox(),
        accepts_login,
        log: Arc::clone(&log),
    };
    let sender = Arc::new(sender);
    let scanner = MailScanner::new(
        store.clone(),
        Arc::new(intake(&store, Arc::clone(&provider), &taxonomy)),
        Arc::new(interpreter),
        Arc::new(connector),
        Arc::clone(&sender) as Arc<dyn ProposalSender>,
        ScanSettings {
            tick: Duration::from_secs(60),
            max_messages: 10,
            timezone: TZ,
        },
    );
    Harness {
        store,
        user,
        provider,
        log,
        sender,
        scanner,
    }
}

#[tokio::test]
async fn invoice_is_proposed_and_marked_read() {
    let h = harness(INVOICE_REPLY, true, RecordingSender::default()).await;

    let report = h.scanner.check_user(&h.user).await.expect("check");
    assert_eq!(
        report,
        ScanReport {
            connected: true,
            fetched: 2,
            candidates: 1,
            duplicates: 0,
            proposed: 1,
        }
    );
    assert_eq!(h.provider.calls(), 1, "the personal email never reaches the model");

    let log = h.log.lock().expect("log lock");
    assert_eq!(log.marked, vec!["1".to_owned()]);
    assert_eq!(log.disconnects, 1);
    drop(log);

    let sent = h.sender.sent.lock().expect("sent lock").clone();
    assert_eq!(sent.len(), 1);
    let (chat_id, expense_id) = sent[0];
    assert_eq!(chat_id, 321);

    let expense = h
        .store
        .expense(expense_id)
        .await
        .expect("lookup")
        .expect("stored");
    assert!(expense.is_pending);
    assert_eq!(expense.amount, dec!(1299));
    assert_eq!(expense.source_ref.as_deref(), Some("<1@mail.example>"));
    assert_eq!(expense.category_name.as_deref(), Some("Compras"));

    let confirmation = h
        .store
        .confirmation_for_expense(expense_id)
        .await
        .expect("lookup")
        .expect("attached");
    assert_eq!(confirmation.message_id, 100);

    let user = h.store.user(h.user.id).await.expect("lookup").expect("exists");
    assert!(user.email_last_checked.is_some());
}

#[tokio::test]
async fn same_message_is_never_proposed_twice() {
    let h = harness(INVOICE_REPLY, true, RecordingSender::default()).await;

    h.scanner.check_user(&h.user).await.expect("first check");
    let second = h.scanner.check_user(&h.user).await.expect("second check");

    assert_eq!(second.duplicates, 1);
    assert_eq!(second.proposed, 0);
    assert_eq!(h.provider.calls(), 1);
    assert_eq!(h.sender.sent.lock().expect("sent lock").len(), 1);
}

#[tokio::test]
async fn non_invoice_reply_stores_nothing() {
    let h = harness(r#"{"is_invoice": false}"#, true, RecordingSender::default()).await;

    let report = h.scanner.check_user(&h.user).await.expect("check");
    assert_eq!(report.candidates, 1);
    assert_eq!(report.proposed, 0);
    assert_eq!(h.log.lock().expect("log lock").marked, vec!["1".to_owned()]);
    let stored = h
        .store
        .list_expenses(h.user.id, &ExpenseFilter::default())
        .await
        .expect("list");
    assert!(stored.is_empty());
}

#[tokio::test]
async fn failed_delivery_leaves_an_orphan_for_the_sweep() {
    let sender = RecordingSender {
        fail: true,
        ..RecordingSender::default()
    };
    let h = harness(INVOICE_REPLY, true, sender).await;

    let report = h.scanner.check_user(&h.user).await.expect("check");
    assert_eq!(report.proposed, 0);

    let stored = h
        .store
        .list_expenses(h.user.id, &ExpenseFilter::default())
        .await
        .expect("list");
    assert_eq!(stored.len(), 1);
    assert!(stored[0].is_pending);
    assert!(h
        .store
        .confirmation_for_expense(stored[0].id)
        .await
        .expect("lookup")
        .is_none());
}

#[tokio::test]
async fn rejected_login_skips_the_mailbox() {
    let h = harness(INVOICE_REPLY, false, RecordingSender::default()).await;

    let report = h.scanner.check_user(&h.user).await.expect("check");
    assert_eq!(report, ScanReport::default());
    let log = h.log.lock().expect("log lock");
    assert_eq!(log.opens, 1);
    assert_eq!(log.listed, 0);
    drop(log);
    assert_eq!(h.provider.calls(), 0);
    let user = h.store.user(h.user.id).await.expect("lookup").expect("exists");
    assert!(user.email_last_checked.is_none());
}

#[tokio::test]
async fn due_users_respect_their_interval() {
    let h = harness(INVOICE_REPLY, true, RecordingSender::default()).await;
    let now = now_utc();

    assert_eq!(h.scanner.scan_due_users(now).await.expect("first scan"), 1);
    assert_eq!(h.log.lock().expect("log lock").opens, 1);

    let soon = now
        .checked_add_signed(chrono::Duration::minutes(10))
        .expect("time arithmetic");
    assert_eq!(h.scanner.scan_due_users(soon).await.expect("early scan"), 0);
    assert_eq!(h.log.lock().expect("log lock").opens, 1, "not due yet");

    let later = now
        .checked_add_signed(chrono::Duration::minutes(61))
        .expect("time arithmetic");
    assert_eq!(h.scanner.scan_due_users(later).await.expect("later scan"), 0);
    assert_eq!(h.log.lock().expect("log lock").opens, 2);
}

#[tokio::test]
async fn users_without_auto_check_are_skipped() {
    let h = harness(INVOICE_REPLY, true, RecordingSender::default()).await;
    h.store
        .set_email_auto_check(h.user.id, false)
        .await
        .expect("toggle");

    assert_eq!(h.scanner.scan_due_users(now_utc()).await.expect("scan"), 0);
    assert_eq!(h.log.lock().expect("log lock").opens, 0);
    assert!(h.sender.sent.lock().expect("sent lock").is_empty());
}

#[tokio::test]
async fn storage_failure_still_closes_the_session() {
    let h = harness(INVOICE_REPLY, true, RecordingSender::default()).await;
    sqlx::query("ALTER TABLE expenses RENAME TO expenses_unavailable")
        .execute(h.store.pool())
        .await
        .expect("rename table");

    assert!(h.scanner.check_user(&h.user).await.is_err());
    let log = h.log.lock().expect("log lock");
    assert_eq!(log.listed, 1);
    assert_eq!(log.disconnects, 1);
    drop(log);
    assert_eq!(h.provider.calls(), 0);
}

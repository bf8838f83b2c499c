//! Integration tests for Postbox
//!
//! These tests drive the mailbox engine end to end against both storage
//! backends, reopening the store from disk wherever durability matters.

use chrono::{Duration as ChronoDuration, Utc};
use postbox::config::{validate_config, PostboxConfig};
use postbox::mailbox::{Compose, DeleteBatch, DeletePrompt, Mailbox, MailboxRules, View};
use postbox::model::{CopyId, Email, EmailStatus, MessageId, User};
use postbox::store::{self, attachment_display_name, BackendKind, MailStore};
use postbox::PostboxError;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const ALICE: &str = "alice@mail.cm";
const BOB: &str = "bob@mail.cm";
const CAROL: &str = "carol@mail.cm";
const BACKENDS: [BackendKind; 2] = [BackendKind::FlatFile, BackendKind::Sqlite];

/// Helper to open a mailbox with three registered users
fn create_test_mailbox(kind: BackendKind, data_dir: &Path) -> Mailbox {
    postbox::logging::init_test();
    let mailbox = reopen(kind, data_dir);
    for (name, address) in [("Alice Liddell", ALICE), ("Bob", BOB), ("Carol", CAROL)] {
        mailbox.register(name, address, "secret1").unwrap();
    }
    mailbox
}

/// Helper to open a fresh engine over whatever is already on disk
fn reopen(kind: BackendKind, data_dir: &Path) -> Mailbox {
    let store = store::open(kind, data_dir).unwrap();
    Mailbox::new(store, MailboxRules::default())
}

fn ids_in(mailbox: &Mailbox, user: &str, view: View) -> Vec<CopyId> {
    let mut ids: Vec<CopyId> = mailbox
        .list(user, view)
        .into_iter()
        .filter_map(|e| e.id)
        .collect();
    ids.sort();
    ids
}

fn say(mailbox: &Mailbox, from: &str, to: &[&str], subject: &str) -> MessageId {
    let to = to.iter().map(|s| s.to_string()).collect();
    mailbox
        .send(from, Compose::new(to, subject, "body"), None)
        .unwrap()
}

fn age_message(store: &Arc<dyn MailStore>, message_id: &MessageId, secs: i64) {
    let stamp = (Utc::now() - ChronoDuration::seconds(secs)).timestamp_millis();
    store.with_emails_mut(&mut |emails: &mut Vec<Email>| {
        for e in emails.iter_mut().filter(|e| &e.message_id == message_id) {
            e.timestamp = stamp;
        }
    });
    store.save_all().unwrap();
}

mod config_tests {
    use super::*;

    #[test]
    fn test_config_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut config = PostboxConfig::with_data_dir(temp_dir.path().join("data"));
        config.backend = BackendKind::FlatFile;
        config.unsend_window_secs = 30;
        config.save(&config_path).unwrap();

        let loaded = PostboxConfig::load(&config_path).unwrap();
        assert_eq!(loaded, config);
        assert!(validate_config(&loaded).is_ok());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(&config_path, "backend: flat_file\n").unwrap();

        let loaded = PostboxConfig::load(&config_path).unwrap();
        assert_eq!(loaded.backend, BackendKind::FlatFile);
        assert_eq!(loaded.domain, "@mail.cm");
        assert_eq!(loaded.unsend_window_secs, 60);
    }

    #[test]
    fn test_missing_config_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let result = PostboxConfig::load(temp_dir.path().join("nope.yaml"));
        assert!(matches!(result, Err(PostboxError::Config(msg)) if msg.contains("not found")));
    }

    #[test]
    fn test_config_rules_reach_mailbox() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = PostboxConfig::with_data_dir(temp_dir.path());
        config.min_password_len = 10;

        let store = store::open(config.backend, &config.data_dir).unwrap();
        let mailbox = Mailbox::from_config(store, &config);
        assert!(matches!(
            mailbox.register("Dave", "dave@mail.cm", "short123"),
            Err(PostboxError::Validation(_))
        ));
        assert!(mailbox.register("Dave", "dave@mail.cm", "longenough1").is_ok());
    }
}

mod store_tests {
    use super::*;

    #[test]
    fn test_round_trip_survives_reopen() {
        for kind in BACKENDS {
            let temp_dir = TempDir::new().unwrap();
            let mailbox = create_test_mailbox(kind, temp_dir.path());
            say(&mailbox, ALICE, &[BOB, CAROL], "Lunch");
            let draft = mailbox
                .save_draft(BOB, Compose::new(vec![], "Notes", "todo"), None)
                .unwrap();

            let before_users = mailbox.store().users();
            let before_emails = mailbox.store().emails();
            drop(mailbox);

            let reopened = reopen(kind, temp_dir.path());
            assert_eq!(reopened.store().users(), before_users, "{}", kind);
            assert_eq!(reopened.store().emails(), before_emails, "{}", kind);
            assert_eq!(ids_in(&reopened, BOB, View::Drafts), vec![draft]);
        }
    }

    #[test]
    fn test_in_place_edits_persist() {
        for kind in BACKENDS {
            let temp_dir = TempDir::new().unwrap();
            let mailbox = create_test_mailbox(kind, temp_dir.path());
            say(&mailbox, ALICE, &[BOB], "Hi");
            let inbox = ids_in(&mailbox, BOB, View::Inbox);

            mailbox.open(BOB, inbox[0]).unwrap();
            mailbox.archive(BOB, &inbox).unwrap();
            drop(mailbox);

            let reopened = reopen(kind, temp_dir.path());
            let archived = reopened.list(BOB, View::Archive);
            assert_eq!(archived.len(), 1, "{}", kind);
            assert!(archived[0].is_read);
            assert_eq!(archived[0].status, EmailStatus::Archived);
        }
    }

    #[test]
    fn test_missing_files_load_empty() {
        for kind in BACKENDS {
            let temp_dir = TempDir::new().unwrap();
            let store = store::open(kind, &temp_dir.path().join("fresh")).unwrap();
            assert!(store.users().is_empty());
            assert!(store.emails().is_empty());
        }
    }

    #[test]
    fn test_corrupt_flat_file_loads_empty() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("emails.db"), b"\x00\x01 not a document").unwrap();
        fs::write(temp_dir.path().join("users.db"), b"   ").unwrap();

        let store = store::open(BackendKind::FlatFile, temp_dir.path()).unwrap();
        assert!(store.users().is_empty());
        assert!(store.emails().is_empty());
    }

    #[test]
    fn test_attachment_round_trip() {
        for kind in BACKENDS {
            let temp_dir = TempDir::new().unwrap();
            let mailbox = create_test_mailbox(kind, temp_dir.path());
            let source = temp_dir.path().join("report-final.pdf");
            let bytes: Vec<u8> = (0..=255).collect();
            fs::write(&source, &bytes).unwrap();

            let compose = Compose::new(vec![BOB.to_string()], "Report", "").with_file(&source);
            mailbox.send(ALICE, compose, None).unwrap();
            fs::remove_file(&source).unwrap();
            drop(mailbox);

            let reopened = reopen(kind, temp_dir.path());
            let inbox = reopened.list(BOB, View::Inbox);
            let reference = &inbox[0].attachments[0];
            assert_eq!(attachment_display_name(reference), "report-final.pdf");

            let stored = reopened.store().attachment(reference).unwrap();
            assert_eq!(fs::read(stored).unwrap(), bytes, "{}", kind);
        }
    }

    #[test]
    fn test_unresolvable_attachment() {
        let temp_dir = TempDir::new().unwrap();
        let store = store::open(BackendKind::Sqlite, temp_dir.path()).unwrap();
        assert!(store.attachment("missing-file.txt").is_none());
        assert!(store.attachment("../users.db").is_none());
    }

    #[test]
    fn test_sqlite_recipient_encoding_is_lossy_on_commas() {
        let temp_dir = TempDir::new().unwrap();
        let store = store::open(BackendKind::Sqlite, temp_dir.path()).unwrap();
        store
            .add_email(Email::new(
                MessageId::new(),
                ALICE,
                vec!["odd,name@mail.cm".to_string()],
                "s",
                "b",
                Vec::new(),
                EmailStatus::Sent,
            ))
            .unwrap();
        drop(store);

        let reopened = store::open(BackendKind::Sqlite, temp_dir.path()).unwrap();
        assert_eq!(
            reopened.emails()[0].to,
            vec!["odd".to_string(), "name@mail.cm".to_string()]
        );
    }

    fn sqlite_count(data_dir: &Path, table: &str) -> i64 {
        let conn = rusqlite::Connection::open(data_dir.join("mail.db")).unwrap();
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_sqlite_bad_row_does_not_wipe_mailbox() {
        let temp_dir = TempDir::new().unwrap();
        let mailbox = create_test_mailbox(BackendKind::Sqlite, temp_dir.path());
        say(&mailbox, ALICE, &[BOB], "One");
        say(&mailbox, BOB, &[ALICE], "Two");
        drop(mailbox);
        {
            let conn = rusqlite::Connection::open(temp_dir.path().join("mail.db")).unwrap();
            conn.execute_batch(
                "INSERT INTO emails (messageId, sender, recipients, timestamp, status)
                     VALUES ('x', 'carol@mail.cm', 'bob@mail.cm', 'yesterday', 'INBOX');
                 INSERT INTO emails (messageId, sender, recipients, timestamp, status)
                     VALUES ('y', 'carol@mail.cm', 'bob@mail.cm', 0, 'inbox');",
            )
            .unwrap();
        }

        let reopened = reopen(BackendKind::Sqlite, temp_dir.path());
        assert_eq!(reopened.store().emails().len(), 4);
        let inbox = ids_in(&reopened, BOB, View::Inbox);
        reopened.archive(BOB, &inbox).unwrap();

        assert_eq!(sqlite_count(temp_dir.path(), "users"), 3);
        assert_eq!(sqlite_count(temp_dir.path(), "emails"), 6);
        let again = reopen(BackendKind::Sqlite, temp_dir.path());
        assert_eq!(ids_in(&again, BOB, View::Archive), inbox);
    }

    #[test]
    fn test_sqlite_failed_send_stores_neither_copy() {
        let temp_dir = TempDir::new().unwrap();
        let mailbox = create_test_mailbox(BackendKind::Sqlite, temp_dir.path());
        {
            let conn = rusqlite::Connection::open(temp_dir.path().join("mail.db")).unwrap();
            conn.execute_batch(
                "CREATE TRIGGER reject_sent BEFORE INSERT ON emails WHEN NEW.status = 'SENT'
                 BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
            )
            .unwrap();
        }
        let source = temp_dir.path().join("notes.txt");
        fs::write(&source, b"notes").unwrap();

        let compose = Compose::new(vec![BOB.to_string()], "Notes", "see file").with_file(&source);
        let result = mailbox.send(ALICE, compose, None);
        assert!(result.unwrap_err().is_storage_failure());
        assert!(mailbox.store().emails().is_empty());
        assert_eq!(sqlite_count(temp_dir.path(), "emails"), 0);
        assert_eq!(fs::read_dir(temp_dir.path().join("attachments")).unwrap().count(), 0);
    }
}

mod mailbox_tests {
    use super::*;

    #[test]
    fn test_send_produces_one_pair() {
        for kind in BACKENDS {
            let temp_dir = TempDir::new().unwrap();
            let mailbox = create_test_mailbox(kind, temp_dir.path());
            let message_id = say(&mailbox, ALICE, &[BOB, CAROL], "Team");

            let copies: Vec<Email> = mailbox
                .store()
                .emails()
                .into_iter()
                .filter(|e| e.message_id == message_id)
                .collect();
            let statuses: HashSet<EmailStatus> = copies.iter().map(|e| e.status).collect();
            assert_eq!(copies.len(), 2, "{}", kind);
            assert_eq!(
                statuses,
                HashSet::from([EmailStatus::Inbox, EmailStatus::Sent])
            );

            // Both recipients share the single inbox copy
            assert_eq!(mailbox.list(BOB, View::Inbox).len(), 1);
            assert_eq!(mailbox.list(CAROL, View::Inbox).len(), 1);
            assert_eq!(mailbox.list(ALICE, View::Sent).len(), 1);
        }
    }

    #[test]
    fn test_views_partition_each_users_mail() {
        let temp_dir = TempDir::new().unwrap();
        let mailbox = create_test_mailbox(BackendKind::Sqlite, temp_dir.path());

        say(&mailbox, ALICE, &[BOB], "one");
        say(&mailbox, BOB, &[ALICE, CAROL], "two");
        say(&mailbox, CAROL, &[ALICE], "three");
        mailbox
            .save_draft(ALICE, Compose::new(vec![BOB.to_string()], "four", ""), None)
            .unwrap();
        let alice_inbox = ids_in(&mailbox, ALICE, View::Inbox);
        mailbox.archive(ALICE, &alice_inbox[..1]).unwrap();
        mailbox.trash(ALICE, &alice_inbox[1..]).unwrap();
        let bob_inbox = ids_in(&mailbox, BOB, View::Inbox);
        mailbox.trash(BOB, &bob_inbox).unwrap();

        let all = mailbox.store().emails();
        for user in [ALICE, BOB, CAROL] {
            let mut seen = HashSet::new();
            for view in View::ALL {
                for id in ids_in(&mailbox, user, view) {
                    assert!(seen.insert(id), "{} sees {} in two views", user, id);
                }
            }

            let visible: HashSet<CopyId> = all
                .iter()
                .filter(|e| {
                    let as_recipient = e.is_recipient(user) && !matches!(e.status, EmailStatus::Draft | EmailStatus::Sent);
                    let as_sender = e.is_from(user) && e.status != EmailStatus::Inbox;
                    as_recipient || as_sender
                })
                .filter_map(|e| e.id)
                .collect();
            assert_eq!(seen, visible, "{}", user);
        }
    }

    #[test]
    fn test_views_sorted_newest_first() {
        let temp_dir = TempDir::new().unwrap();
        let mailbox = create_test_mailbox(BackendKind::FlatFile, temp_dir.path());
        let old = say(&mailbox, ALICE, &[BOB], "old");
        say(&mailbox, CAROL, &[BOB], "new");
        age_message(mailbox.store(), &old, 3600);

        let subjects: Vec<String> = mailbox
            .list(BOB, View::Inbox)
            .into_iter()
            .map(|e| e.subject)
            .collect();
        assert_eq!(subjects, vec!["new".to_string(), "old".to_string()]);
    }

    #[test]
    fn test_batch_is_all_or_nothing() {
        for kind in BACKENDS {
            let temp_dir = TempDir::new().unwrap();
            let mailbox = create_test_mailbox(kind, temp_dir.path());
            say(&mailbox, ALICE, &[BOB], "a");
            say(&mailbox, CAROL, &[BOB], "b");
            let inbox = ids_in(&mailbox, BOB, View::Inbox);

            let result = mailbox.archive(BOB, &[inbox[0], inbox[1], CopyId::new(9999)]);
            assert!(matches!(result, Err(PostboxError::UnknownEmail(_))));
            drop(mailbox);

            let reopened = reopen(kind, temp_dir.path());
            assert_eq!(ids_in(&reopened, BOB, View::Inbox), inbox, "{}", kind);
        }
    }
}

mod unsend_tests {
    use super::*;

    fn yes(_: &DeletePrompt) -> bool {
        true
    }

    #[test]
    fn test_unsend_inside_window() {
        for kind in BACKENDS {
            let temp_dir = TempDir::new().unwrap();
            let mailbox = create_test_mailbox(kind, temp_dir.path());
            let message_id = say(&mailbox, ALICE, &[BOB], "oops");
            age_message(mailbox.store(), &message_id, 30);

            let sent = ids_in(&mailbox, ALICE, View::Sent);
            let outcome = mailbox
                .delete_sent(ALICE, &sent, Utc::now(), &mut yes)
                .unwrap();
            assert_eq!((outcome.unsent, outcome.recalled), (1, 1));
            drop(mailbox);

            let reopened = reopen(kind, temp_dir.path());
            assert!(
                reopened
                    .store()
                    .emails()
                    .iter()
                    .all(|e| e.message_id != message_id),
                "{}",
                kind
            );
        }
    }

    #[test]
    fn test_plain_delete_after_window() {
        for kind in BACKENDS {
            let temp_dir = TempDir::new().unwrap();
            let mailbox = create_test_mailbox(kind, temp_dir.path());
            let message_id = say(&mailbox, ALICE, &[BOB], "fine");
            age_message(mailbox.store(), &message_id, 90);

            let sent = ids_in(&mailbox, ALICE, View::Sent);
            let outcome = mailbox
                .delete_sent(ALICE, &sent, Utc::now(), &mut yes)
                .unwrap();
            assert_eq!(outcome.deleted, 1);
            drop(mailbox);

            let reopened = reopen(kind, temp_dir.path());
            assert!(reopened.list(ALICE, View::Sent).is_empty(), "{}", kind);
            let inbox = reopened.list(BOB, View::Inbox);
            assert_eq!(inbox.len(), 1);
            assert_eq!(inbox[0].message_id, message_id);
        }
    }

    #[test]
    fn test_unsend_spares_other_messages() {
        let temp_dir = TempDir::new().unwrap();
        let mailbox = create_test_mailbox(BackendKind::Sqlite, temp_dir.path());
        let recalled = say(&mailbox, ALICE, &[BOB], "recall me");
        let kept = say(&mailbox, ALICE, &[BOB], "keep me");
        age_message(mailbox.store(), &kept, 600);

        let recall_id = mailbox
            .list(ALICE, View::Sent)
            .into_iter()
            .find(|e| e.message_id == recalled)
            .and_then(|e| e.id)
            .unwrap();
        mailbox
            .delete_sent(ALICE, &[recall_id], Utc::now(), &mut yes)
            .unwrap();

        let inbox = mailbox.list(BOB, View::Inbox);
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].message_id, kept);
        assert_eq!(mailbox.list(ALICE, View::Sent).len(), 1);
    }

    #[test]
    fn test_declining_both_batches() {
        let temp_dir = TempDir::new().unwrap();
        let mailbox = create_test_mailbox(BackendKind::FlatFile, temp_dir.path());
        let old = say(&mailbox, ALICE, &[BOB], "old");
        age_message(mailbox.store(), &old, 120);
        say(&mailbox, ALICE, &[CAROL], "new");
        let before = mailbox.store().emails();

        let sent = ids_in(&mailbox, ALICE, View::Sent);
        let outcome = mailbox
            .delete_sent(ALICE, &sent, Utc::now(), &mut |_: &DeletePrompt| false)
            .unwrap();

        assert_eq!(
            outcome.declined,
            vec![DeleteBatch::PlainDelete, DeleteBatch::Unsend]
        );
        assert_eq!(mailbox.store().emails(), before);
    }
}

mod account_tests {
    use super::*;

    #[test]
    fn test_account_deletion_asymmetry() {
        for kind in BACKENDS {
            let temp_dir = TempDir::new().unwrap();
            let mailbox = create_test_mailbox(kind, temp_dir.path());
            say(&mailbox, ALICE, &[BOB], "from alice");
            let to_alice = say(&mailbox, BOB, &[ALICE], "to alice");

            mailbox.delete_account(ALICE, "secret1").unwrap();
            drop(mailbox);

            let reopened = reopen(kind, temp_dir.path());
            let emails = reopened.store().emails();
            assert!(emails.iter().all(|e| !e.is_from(ALICE)), "{}", kind);
            // Copies addressed to the removed user are not cleaned up
            assert!(emails
                .iter()
                .any(|e| e.message_id == to_alice && e.status == EmailStatus::Inbox));
            assert!(reopened.find_user(ALICE).is_none());
            assert!(matches!(
                reopened.authenticate(ALICE, "secret1"),
                Err(PostboxError::UnknownUser(_))
            ));
        }
    }

    #[test]
    fn test_duplicate_registration_across_reopen() {
        let temp_dir = TempDir::new().unwrap();
        drop(create_test_mailbox(BackendKind::Sqlite, temp_dir.path()));

        let reopened = reopen(BackendKind::Sqlite, temp_dir.path());
        assert!(matches!(
            reopened.register("Impostor", "Alice@Mail.cm", "secret1"),
            Err(PostboxError::Validation(_))
        ));
        assert_eq!(reopened.store().users().len(), 3);
    }

    #[test]
    fn test_direct_user_insert_rejects_duplicate() {
        let temp_dir = TempDir::new().unwrap();
        let store = store::open(BackendKind::FlatFile, temp_dir.path()).unwrap();
        store.add_user(User::new("A", ALICE, "secret1")).unwrap();
        assert!(store.add_user(User::new("A2", ALICE, "secret2")).is_err());
        assert_eq!(store.users().len(), 1);
    }
}

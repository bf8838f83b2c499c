//! Postbox - single-machine mailbox manager
//!
//! Main entry point for the Postbox CLI.

mod commands;

use chrono::Local;
use clap::Parser;
use commands::{Cli, Commands, Credentials, Message, Selection};
use dialoguer::{theme::ColorfulTheme, Confirm};
use postbox::config::{validate_config_result, PostboxConfig};
use postbox::mailbox::{parse_recipients, Compose, DeletePrompt, Mailbox, View};
use postbox::model::{CopyId, Email, User};
use postbox::store::{self, attachment_display_name};
use postbox::{PostboxError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

fn main() {
    // Initialize logging
    if let Err(e) = postbox::logging::init() {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        if e.is_storage_failure() {
            tracing::error!(error = %e, "Storage failure");
            eprintln!("Storage error: {}", e);
            eprintln!("Check that the data directory exists and is writable.");
        } else {
            eprintln!("Error: {}", e);
        }
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    if let Commands::Init { force } = cli.command {
        return handle_init(&cli, force);
    }

    let config = load_config(&cli)?;
    validate_config_result(&config)?;

    let store = store::open(config.backend, &config.data_dir)?;
    let mailbox = Mailbox::from_config(store, &config);

    match cli.command {
        // Written before any store is opened
        Commands::Init { .. } => {}

        Commands::Register {
            name,
            email,
            password,
        } => {
            let user = mailbox.register(&name, &email, &password)?;
            println!("Created account {} for {}", user.email_id, user.name);
        }

        Commands::Login(credentials) => {
            let user = sign_in(&mailbox, &credentials)?;
            let unread = mailbox.unread_count(&user.email_id);
            println!("Welcome, {}", user.first_name());
            println!("{} unread in inbox", unread);
        }

        Commands::Profile {
            credentials,
            name,
            new_password,
        } => {
            let user = sign_in(&mailbox, &credentials)?;
            let name = name.unwrap_or_else(|| user.name.clone());
            let updated =
                mailbox.update_profile(&user.email_id, &name, new_password.as_deref())?;
            println!("Settings saved for {}", updated.email_id);
        }

        Commands::DeleteAccount { credentials, yes } => {
            let user = sign_in(&mailbox, &credentials)?;
            let prompt = format!(
                "Delete account {} and every email it sent? This cannot be undone.",
                user.email_id
            );
            if !confirm(&prompt, yes) {
                println!("Account deletion cancelled");
                return Ok(());
            }
            mailbox.delete_account(&user.email_id, &credentials.password)?;
            println!("Deleted account {}", user.email_id);
        }

        Commands::Send {
            credentials,
            message,
        } => {
            let user = sign_in(&mailbox, &credentials)?;
            let draft = message.draft.map(CopyId::new);
            let message_id = mailbox.send(&user.email_id, compose(message), draft)?;
            println!("Sent message {}", message_id);
        }

        Commands::Draft {
            credentials,
            message,
        } => {
            let user = sign_in(&mailbox, &credentials)?;
            let draft = message.draft.map(CopyId::new);
            let id = mailbox.save_draft(&user.email_id, compose(message), draft)?;
            println!("Saved draft {}", id);
        }

        Commands::Reply {
            credentials,
            id,
            body,
            attachments,
        } => {
            let user = sign_in(&mailbox, &credentials)?;
            let original = mailbox.email(&user.email_id, CopyId::new(id))?;
            let reply = attachments.into_iter().fold(
                Compose::reply_to(&original).with_note(&body),
                Compose::with_file,
            );
            let message_id = mailbox.send(&user.email_id, reply, None)?;
            println!("Replied to {} ({})", original.from, message_id);
        }

        Commands::Forward {
            credentials,
            id,
            to,
            body,
        } => {
            let user = sign_in(&mailbox, &credentials)?;
            let original = mailbox.email(&user.email_id, CopyId::new(id))?;
            let forward = Compose::forward(&original)
                .with_recipients(parse_recipients(&to))
                .with_note(&body);
            let message_id = mailbox.send(&user.email_id, forward, None)?;
            println!("Forwarded message {}", message_id);
        }

        Commands::List { credentials, view } => {
            let user = sign_in(&mailbox, &credentials)?;
            let emails = mailbox.list(&user.email_id, view);
            println!("{} ({})", view, emails.len());
            println!();
            for email in &emails {
                print_email_summary(email, view);
            }
        }

        Commands::Read { credentials, id } => {
            let user = sign_in(&mailbox, &credentials)?;
            let email = mailbox.open(&user.email_id, CopyId::new(id))?;
            print_email_detailed(&email);
        }

        Commands::Unread(selection) => {
            let user = sign_in(&mailbox, &selection.credentials)?;
            let count = mailbox.mark_unread(&user.email_id, &selection.copy_ids())?;
            println!("Marked {} email(s) unread", count);
        }

        Commands::Archive(selection) => {
            let user = sign_in(&mailbox, &selection.credentials)?;
            let count = mailbox.archive(&user.email_id, &selection.copy_ids())?;
            println!("Archived {} email(s)", count);
        }

        Commands::Trash(selection) => {
            let user = sign_in(&mailbox, &selection.credentials)?;
            let count = mailbox.trash(&user.email_id, &selection.copy_ids())?;
            println!("Moved {} email(s) to trash", count);
        }

        Commands::Restore(selection) => {
            let user = sign_in(&mailbox, &selection.credentials)?;
            let count = mailbox.restore(&user.email_id, &selection.copy_ids())?;
            println!("Restored {} email(s)", count);
        }

        Commands::Purge { selection, yes } => {
            let user = sign_in(&mailbox, &selection.credentials)?;
            if !confirm_selection("Permanently delete", &selection, yes) {
                return Ok(());
            }
            let count = mailbox.purge(&user.email_id, &selection.copy_ids())?;
            println!("Permanently deleted {} email(s)", count);
        }

        Commands::Discard { selection, yes } => {
            let user = sign_in(&mailbox, &selection.credentials)?;
            if !confirm_selection("Discard", &selection, yes) {
                return Ok(());
            }
            let count = mailbox.discard_drafts(&user.email_id, &selection.copy_ids())?;
            println!("Discarded {} draft(s)", count);
        }

        Commands::DeleteSent { selection, yes } => {
            let user = sign_in(&mailbox, &selection.credentials)?;
            let outcome = mailbox.delete_sent(
                &user.email_id,
                &selection.copy_ids(),
                chrono::Utc::now(),
                &mut |prompt: &DeletePrompt| confirm(&prompt.to_string(), yes),
            )?;

            if outcome.deleted > 0 {
                println!("Deleted {} sent email(s)", outcome.deleted);
            }
            if outcome.unsent > 0 {
                println!(
                    "Unsent {} email(s), removed from {} inbox copy(ies)",
                    outcome.unsent, outcome.recalled
                );
            }
            for batch in &outcome.declined {
                println!("Skipped {:?} batch", batch);
            }
        }

        Commands::Attachment {
            credentials,
            id,
            output,
        } => {
            let user = sign_in(&mailbox, &credentials)?;
            let email = mailbox.email(&user.email_id, CopyId::new(id))?;
            if email.attachments.is_empty() {
                println!("Email {} has no attachments", id);
            }
            for reference in &email.attachments {
                let name = attachment_display_name(reference);
                match &output {
                    Some(dir) => {
                        let target = export_attachment(&mailbox, reference, dir)?;
                        println!("Saved {} to {}", name, target.display());
                    }
                    None => println!("  {}", name),
                }
            }
        }

        Commands::Reload => {
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(postbox::reload::reload_in_background(mailbox.store().clone()))?;
            println!(
                "Reloaded {} store: {} user(s), {} email(s)",
                mailbox.store().kind(),
                mailbox.store().users().len(),
                mailbox.store().emails().len()
            );
        }
    }

    Ok(())
}

fn handle_init(cli: &Cli, force: bool) -> Result<()> {
    let path = cli
        .config
        .clone()
        .unwrap_or_else(PostboxConfig::default_path);

    if path.exists() && !force {
        return Err(PostboxError::Config(format!(
            "Configuration already exists at {}. Use --force to overwrite.",
            path.display()
        )));
    }

    let mut config = PostboxConfig::new();
    apply_overrides(cli, &mut config);
    validate_config_result(&config)?;
    config.save(&path)?;
    fs::create_dir_all(&config.data_dir)?;

    println!("Wrote configuration to {}", path.display());
    println!("  backend:  {}", config.backend);
    println!("  data dir: {}", config.data_dir.display());
    Ok(())
}

/// Load the config file, falling back to defaults when none exists
fn load_config(cli: &Cli) -> Result<PostboxConfig> {
    let mut config = match &cli.config {
        Some(path) => PostboxConfig::load(path)?,
        None => match PostboxConfig::load_default() {
            Ok(config) => config,
            Err(PostboxError::Config(msg)) if msg.contains("Config file not found") => {
                tracing::info!("No configuration file, using defaults");
                PostboxConfig::new()
            }
            Err(e) => return Err(e),
        },
    };
    apply_overrides(cli, &mut config);
    Ok(config)
}

fn apply_overrides(cli: &Cli, config: &mut PostboxConfig) {
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }
    if let Some(data_dir) = &cli.data_dir {
        config.data_dir = data_dir.clone();
    }
}

fn sign_in(mailbox: &Mailbox, credentials: &Credentials) -> Result<User> {
    mailbox.authenticate(&credentials.user, &credentials.password)
}

fn compose(message: Message) -> Compose {
    message.attachments.into_iter().fold(
        Compose::new(parse_recipients(&message.to), message.subject, message.body),
        Compose::with_file,
    )
}

fn confirm(prompt: &str, assume_yes: bool) -> bool {
    if assume_yes {
        return true;
    }
    Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .default(false)
        .interact()
        .unwrap_or(false)
}

fn confirm_selection(verb: &str, selection: &Selection, assume_yes: bool) -> bool {
    let prompt = format!(
        "{} {} email(s)? This cannot be undone.",
        verb,
        selection.ids.len()
    );
    confirm(&prompt, assume_yes)
}

fn export_attachment(mailbox: &Mailbox, reference: &str, dir: &Path) -> Result<PathBuf> {
    let source = mailbox
        .store()
        .attachment(reference)
        .ok_or_else(|| store::StoreError::NotFound(reference.to_string()))?;
    fs::create_dir_all(dir)?;
    let target = dir.join(attachment_display_name(reference));
    fs::copy(&source, &target)?;
    Ok(target)
}

fn format_time(email: &Email) -> String {
    email
        .sent_at()
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M")
        .to_string()
}

fn print_email_summary(email: &Email, view: View) {
    let id = email.id.map(|id| id.to_string()).unwrap_or_default();
    let marker = if email.is_read { " " } else { "*" };
    let party = match view {
        View::Drafts | View::Sent => format!("To: {}", email.to.join(", ")),
        _ => email.from.clone(),
    };
    let clip = if email.attachments.is_empty() { "" } else { " [+]" };
    println!(
        "{}{:>5}  {}  {:<28}  {}{}",
        marker,
        id,
        format_time(email),
        party,
        email.subject,
        clip
    );
}

fn print_email_detailed(email: &Email) {
    println!("From:    {}", email.from);
    println!("To:      {}", email.to.join(", "));
    println!("Date:    {}", format_time(email));
    println!("Subject: {}", email.subject);
    println!("Status:  {}", email.status);
    println!();
    println!("{}", email.body);
    if !email.attachments.is_empty() {
        println!();
        println!("Attachments:");
        for reference in &email.attachments {
            println!("  {}", attachment_display_name(reference));
        }
    }
}

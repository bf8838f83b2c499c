//! CLI command definitions
//!
//! All CLI structs and subcommand enums are defined here.

use clap::{Args, Parser, Subcommand};
use postbox::mailbox::View;
use postbox::model::CopyId;
use postbox::store::BackendKind;
use std::path::PathBuf;

/// Postbox - single-machine mailbox manager
#[derive(Parser, Debug)]
#[command(name = "postbox")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (default: ~/.config/postbox/config.yaml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Storage backend (flat_file or sqlite), overrides the config file
    #[arg(long, global = true)]
    pub backend: Option<BackendKind>,

    /// Data directory, overrides the config file
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Sign-in for commands that act as a user
#[derive(Args, Debug, Clone)]
pub struct Credentials {
    /// Account address (e.g. alice@mail.cm)
    #[arg(short, long, env = "POSTBOX_USER")]
    pub user: String,

    /// Account password
    #[arg(short, long, env = "POSTBOX_PASSWORD", hide_env_values = true)]
    pub password: String,
}

/// A set of stored emails to act on
#[derive(Args, Debug, Clone)]
pub struct Selection {
    #[command(flatten)]
    pub credentials: Credentials,

    /// Email ids, as shown by `postbox list`
    #[arg(required = true, num_args = 1..)]
    pub ids: Vec<i64>,
}

impl Selection {
    pub fn copy_ids(&self) -> Vec<CopyId> {
        self.ids.iter().copied().map(CopyId::new).collect()
    }
}

/// Message content for send and draft
#[derive(Args, Debug, Clone)]
pub struct Message {
    /// Recipients, comma-separated
    #[arg(short, long, default_value = "")]
    pub to: String,

    /// Subject line
    #[arg(short, long, default_value = "")]
    pub subject: String,

    /// Message body
    #[arg(short, long, default_value = "")]
    pub body: String,

    /// File to attach (repeatable)
    #[arg(short, long = "attach")]
    pub attachments: Vec<PathBuf>,

    /// Existing draft to send or update
    #[arg(long)]
    pub draft: Option<i64>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing configuration
        #[arg(long)]
        force: bool,
    },

    /// Create an account
    Register {
        /// Display name
        #[arg(long)]
        name: String,

        /// Address in the configured domain
        #[arg(long)]
        email: String,

        /// Password
        #[arg(long)]
        password: String,
    },

    /// Check credentials and show the unread count
    Login(Credentials),

    /// Change display name or password
    Profile {
        #[command(flatten)]
        credentials: Credentials,

        /// New display name (default: keep current)
        #[arg(long)]
        name: Option<String>,

        /// New password
        #[arg(long)]
        new_password: Option<String>,
    },

    /// Delete the account and every email it sent
    DeleteAccount {
        #[command(flatten)]
        credentials: Credentials,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Send a message
    Send {
        #[command(flatten)]
        credentials: Credentials,

        #[command(flatten)]
        message: Message,
    },

    /// Save or update a draft
    Draft {
        #[command(flatten)]
        credentials: Credentials,

        #[command(flatten)]
        message: Message,
    },

    /// Reply to the sender of an email, quoting it
    Reply {
        #[command(flatten)]
        credentials: Credentials,

        /// Email id to reply to
        id: i64,

        /// Text to put above the quote
        #[arg(short, long, default_value = "")]
        body: String,

        /// File to attach (repeatable)
        #[arg(short, long = "attach")]
        attachments: Vec<PathBuf>,
    },

    /// Forward an email with its attachments
    Forward {
        #[command(flatten)]
        credentials: Credentials,

        /// Email id to forward
        id: i64,

        /// Recipients, comma-separated
        #[arg(short, long)]
        to: String,

        /// Text to put above the forwarded message
        #[arg(short, long, default_value = "")]
        body: String,
    },

    /// List a mailbox view (inbox, drafts, sent, archive, trash)
    List {
        #[command(flatten)]
        credentials: Credentials,

        /// View to show
        #[arg(default_value = "inbox")]
        view: View,
    },

    /// Show one email and mark it read
    Read {
        #[command(flatten)]
        credentials: Credentials,

        /// Email id
        id: i64,
    },

    /// Mark emails unread
    Unread(Selection),

    /// Move inbox emails to the archive
    Archive(Selection),

    /// Move emails to the trash
    Trash(Selection),

    /// Restore archived or trashed emails
    Restore(Selection),

    /// Permanently delete trashed emails
    Purge {
        #[command(flatten)]
        selection: Selection,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Permanently delete drafts
    Discard {
        #[command(flatten)]
        selection: Selection,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Delete sent emails, unsending recent ones for all recipients
    DeleteSent {
        #[command(flatten)]
        selection: Selection,

        /// Answer yes to every batch
        #[arg(short, long)]
        yes: bool,
    },

    /// List or export the attachments of an email
    Attachment {
        #[command(flatten)]
        credentials: Credentials,

        /// Email id
        id: i64,

        /// Directory to copy the attachments into
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Re-read the store from disk
    Reload,
}

use std::num::NonZeroUsize;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use mailsift_core::StatusFilter;

#[derive(Parser, Debug)]
#[command(
    name = "mailsift",
    version,
    about = "Fetch, filter and summarize messages from an IMAP mailbox"
)]
pub(crate) struct Cli {
    /// Config file to use instead of ./mailsift.toml or ~/.config/mailsift/mailsift.toml
    #[arg(long, global = true)]
    pub(crate) config: Option<PathBuf>,
    #[command(subcommand)]
    pub(crate) command: CliCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum CliCommand {
    /// Fetch, filter and summarize messages
    Fetch(FetchCmd),
    /// Log in, select the mailbox and report its message count
    Check(CheckCmd),
}

#[derive(Args, Debug)]
pub(crate) struct FetchCmd {
    #[arg(long)]
    pub(crate) account: Option<String>,
    #[arg(long)]
    pub(crate) mailbox: Option<String>,
    /// Case-insensitive text to look for in the subject or body
    #[arg(long)]
    pub(crate) keyword: Option<String>,
    /// all, read or unread
    #[arg(long)]
    pub(crate) status: Option<StatusFilter>,
    /// Examine at most N messages from the start of the listing
    #[arg(long)]
    pub(crate) limit: Option<NonZeroUsize>,
    /// Also write the result JSON to this file
    #[arg(long)]
    pub(crate) out: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub(crate) struct CheckCmd {
    #[arg(long)]
    pub(crate) account: Option<String>,
    #[arg(long)]
    pub(crate) mailbox: Option<String>,
}

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use log::{debug, warn};
use mailsift_core::{
    ConnectionParams, DEFAULT_IMAP_HOST, DEFAULT_IMAP_PORT, DEFAULT_MAILBOX, DEFAULT_TIMEOUT,
    StatusFilter,
};
use secrecy::{ExposeSecret, SecretString};

const CONFIG_FILE_NAME: &str = "mailsift.toml";
const PASSWORD_ENV: &str = "MAILSIFT_PASSWORD";
const MAILBOX_ENV: &str = "MAILSIFT_MAILBOX";

#[derive(Debug)]
pub(crate) struct ImapSettings {
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) username: String,
    pub(crate) password: Option<SecretString>,
    pub(crate) mailbox: String,
    pub(crate) timeout: Duration,
    pub(crate) skip_tls_verify: bool,
}

#[derive(Debug)]
pub(crate) struct AccountConfig {
    pub(crate) name: String,
    pub(crate) imap: ImapSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct FetchDefaults {
    pub(crate) status: StatusFilter,
    pub(crate) limit: Option<NonZeroUsize>,
}

#[derive(Debug, Default)]
pub(crate) struct CliConfig {
    pub(crate) default_account: Option<String>,
    pub(crate) fetch: FetchDefaults,
    pub(crate) accounts: Vec<AccountConfig>,
}

impl AccountConfig {
    /// Connection parameters for this account. `MAILSIFT_PASSWORD` and `MAILSIFT_MAILBOX`
    /// override the file, and `mailbox` overrides both.
    pub(crate) fn connection_params(&self, mailbox: Option<&str>) -> Result<ConnectionParams> {
        let password = match std::env::var(PASSWORD_ENV) {
            Ok(value) if !value.is_empty() => SecretString::from(value),
            _ => self
                .imap
                .password
                .as_ref()
                .map(|p| SecretString::from(p.expose_secret().to_string()))
                .ok_or_else(|| {
                    anyhow!(
                        "No password configured for account '{}' (set imap.password or {})",
                        self.name,
                        PASSWORD_ENV
                    )
                })?,
        };
        let mailbox = mailbox
            .map(str::to_string)
            .or_else(|| std::env::var(MAILBOX_ENV).ok().filter(|v| !v.trim().is_empty()))
            .unwrap_or_else(|| self.imap.mailbox.clone());
        let mut params = ConnectionParams::new(self.imap.username.clone(), password)
            .with_mailbox(mailbox);
        params.host = self.imap.host.clone();
        params.port = self.imap.port;
        params.timeout = self.imap.timeout;
        params.skip_tls_verify = self.imap.skip_tls_verify;
        Ok(params)
    }
}

fn xdg_config_dir() -> PathBuf {
    std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))
        .unwrap_or_else(|| PathBuf::from("/tmp"))
}

fn config_path_candidates() -> Vec<PathBuf> {
    vec![
        PathBuf::from(CONFIG_FILE_NAME),
        xdg_config_dir().join("mailsift").join(CONFIG_FILE_NAME),
    ]
}

/// Loads the config from `explicit` or the first candidate path that exists. A missing file
/// yields an empty config; an unreadable or invalid explicit file is an error.
pub(crate) fn load_cli_config(explicit: Option<&Path>) -> Result<CliConfig> {
    if let Some(path) = explicit {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read config {}", path.display()))?;
        return parse_config(&content).with_context(|| format!("Invalid {}", path.display()));
    }
    for path in config_path_candidates() {
        if let Ok(content) = std::fs::read_to_string(&path) {
            debug!("config loaded path={}", path.display());
            return parse_config(&content).with_context(|| format!("Invalid {}", path.display()));
        }
    }
    debug!("config not found, using defaults");
    Ok(CliConfig::default())
}

pub(crate) fn parse_config(content: &str) -> Result<CliConfig> {
    let value: toml::Value = toml::from_str(content)?;
    let default_account = value
        .get("cli")
        .and_then(|cli| cli.get("default_account"))
        .and_then(|v| v.as_str())
        .map(str::to_string);
    let fetch = value
        .get("fetch")
        .map(parse_fetch_defaults)
        .transpose()?
        .unwrap_or_default();

    let mut accounts = Vec::new();
    if let Some(list) = value.get("accounts").and_then(|v| v.as_array()) {
        for (idx, acct) in list.iter().enumerate() {
            match parse_account_config(acct, idx) {
                Some(account) => accounts.push(account),
                None => warn!("config skipping account #{} without imap.username", idx + 1),
            }
        }
    } else if let Some(imap) = value.get("imap").and_then(parse_imap_table) {
        accounts.push(AccountConfig {
            name: imap.username.clone(),
            imap,
        });
    }

    Ok(CliConfig {
        default_account,
        fetch,
        accounts,
    })
}

fn parse_fetch_defaults(fetch: &toml::Value) -> Result<FetchDefaults> {
    let status = match fetch.get("status").and_then(|v| v.as_str()) {
        Some(raw) => raw.parse::<StatusFilter>()?,
        None => StatusFilter::All,
    };
    let limit = match fetch.get("limit") {
        Some(v) => {
            let raw = v
                .as_integer()
                .ok_or_else(|| anyhow!("fetch.limit must be an integer"))?;
            let limit = usize::try_from(raw)
                .ok()
                .and_then(NonZeroUsize::new)
                .ok_or_else(|| anyhow!("fetch.limit must be a positive integer"))?;
            Some(limit)
        }
        None => None,
    };
    Ok(FetchDefaults { status, limit })
}

fn parse_account_config(value: &toml::Value, index: usize) -> Option<AccountConfig> {
    let imap = value.get("imap").and_then(parse_imap_table)?;
    let name = value
        .get("name")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| {
            if imap.username.is_empty() {
                format!("account-{}", index + 1)
            } else {
                imap.username.clone()
            }
        });
    Some(AccountConfig { name, imap })
}

fn parse_imap_table(imap: &toml::Value) -> Option<ImapSettings> {
    Some(ImapSettings {
        host: imap
            .get("host")
            .and_then(|v| v.as_str())
            .unwrap_or(DEFAULT_IMAP_HOST)
            .to_string(),
        port: imap
            .get("port")
            .and_then(|v| v.as_integer())
            .and_then(|v| u16::try_from(v).ok())
            .unwrap_or(DEFAULT_IMAP_PORT),
        username: imap.get("username")?.as_str()?.to_string(),
        password: imap
            .get("password")
            .and_then(|v| v.as_str())
            .map(|s| SecretString::from(s.to_string())),
        mailbox: imap
            .get("mailbox")
            .and_then(|v| v.as_str())
            .unwrap_or(DEFAULT_MAILBOX)
            .to_string(),
        timeout: imap
            .get("timeout_secs")
            .and_then(|v| v.as_integer())
            .map(|v| Duration::from_secs(v.clamp(1, 600) as u64))
            .unwrap_or(DEFAULT_TIMEOUT),
        skip_tls_verify: imap
            .get("skip_tls_verify")
            .and_then(parse_bool)
            .unwrap_or(false),
    })
}

fn parse_bool(value: &toml::Value) -> Option<bool> {
    value.as_bool().or_else(|| {
        value
            .as_str()
            .map(|s| s == "1" || s.eq_ignore_ascii_case("true"))
    })
}

pub(crate) fn resolve_account<'a>(
    config: &'a CliConfig,
    requested: Option<&str>,
) -> Result<&'a AccountConfig> {
    if config.accounts.is_empty() {
        return Err(anyhow!(
            "No accounts configured (create {} with an [imap] table)",
            CONFIG_FILE_NAME
        ));
    }
    let selected = if let Some(name) = requested {
        config.accounts.iter().find(|acct| acct.name == name)
    } else if let Some(default_name) = config.default_account.as_deref() {
        config.accounts.iter().find(|acct| acct.name == default_name)
    } else if config.accounts.len() == 1 {
        config.accounts.first()
    } else {
        None
    };
    selected.ok_or_else(|| anyhow!("Account not found or not specified"))
}

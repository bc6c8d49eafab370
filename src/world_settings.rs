//! Reading and writing `PalWorldSettings.ini`.
//!
//! The file carries a single `OptionSettings=(...)` line holding a comma
//! separated `key=value` list. Values may be quoted strings (which can
//! contain commas) or parenthesized sub-lists, so the list is scanned rather
//! than split.

use crate::error::{Error, ErrorKind, Result};
use crate::rest_api::Connection;
use crate::storage::write_replacing;
use rand::{distributions::Alphanumeric, Rng};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{info, warn};

pub const SETTINGS_HEADER: &str = "[/Script/Pal.PalGameWorldSettings]";
pub const OPTION_SETTINGS_MARKER: &str = "OptionSettings=";
pub const DEFAULT_SETTINGS_FILE: &str = "DefaultPalWorldSettings.ini";
/// Files smaller than this were never written by the server.
pub const MIN_INITIALIZED_SIZE: u64 = 10;
/// `DefaultPalWorldSettings.ini` sits next to the server binary, five
/// levels above `Pal/Saved/Config/WindowsServer/PalWorldSettings.ini`.
const DEFAULTS_DEPTH: usize = 5;
const IDENTITY_KEYS: [&str; 2] = ["ServerName", "ServerDescription"];
const DEFAULT_REST_API_PORT: &str = "8211";
const DEFAULT_RCON_PORT: &str = "25575";
const GENERATED_PASSWORD_LEN: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingEntry {
    pub key: String,
    pub value: String,
    /// Value was written inside double quotes and is re-quoted on save.
    pub quoted: bool,
}

/// Ordered `OptionSettings` entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsDocument {
    entries: Vec<SettingEntry>,
}

impl SettingsDocument {
    pub fn entries(&self) -> &[SettingEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, key: &str) -> Option<&SettingEntry> {
        self.entries.iter().find(|entry| entry.key == key)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entry(key).map(|entry| entry.value.as_str())
    }

    /// Replaces the value in place, or appends a new key at the end. Values
    /// that would not survive a render/parse cycle are rejected.
    pub fn set(&mut self, key: &str, value: impl Into<String>, quoted: bool) -> Result<()> {
        let value = value.into();
        validate_entry(key, &value, quoted)?;
        self.upsert(key, value, quoted);
        Ok(())
    }

    pub fn set_string(&mut self, key: &str, value: impl Into<String>) -> Result<()> {
        self.set(key, value, true)
    }

    pub fn set_raw(&mut self, key: &str, value: impl Into<String>) -> Result<()> {
        self.set(key, value, false)
    }

    pub fn remove(&mut self, key: &str) -> Option<SettingEntry> {
        let index = self.entries.iter().position(|entry| entry.key == key)?;
        Some(self.entries.remove(index))
    }

    fn upsert(&mut self, key: &str, value: String, quoted: bool) {
        match self.entries.iter_mut().find(|entry| entry.key == key) {
            Some(entry) => {
                entry.value = value;
                entry.quoted = quoted;
            }
            None => self.entries.push(SettingEntry {
                key: key.to_string(),
                value,
                quoted,
            }),
        }
    }
}

fn validate_entry(key: &str, value: &str, quoted: bool) -> Result<()> {
    if key.is_empty() || !key.bytes().all(is_key_byte) {
        return Err(Error::new(
            ErrorKind::InvalidArgument,
            format!("invalid setting key: {key:?}"),
        ));
    }
    let reject = |reason: &str| {
        Err(Error::new(
            ErrorKind::InvalidArgument,
            format!("value for {key} {reason}"),
        ))
    };
    if value.contains(['\n', '\r']) {
        return reject("must not contain line breaks");
    }
    if quoted {
        if value.contains('"') {
            return reject("must not contain double quotes");
        }
        return Ok(());
    }

    if value.contains('"') {
        return reject("must be quoted to contain double quotes");
    }
    if value.trim() != value {
        return reject("must not have surrounding whitespace unless quoted");
    }
    if value.contains([',', '(', ')']) && !is_sub_list(value) {
        return reject("must be quoted or a single ( ... ) list to contain commas or parentheses");
    }
    Ok(())
}

fn is_sub_list(value: &str) -> bool {
    value.starts_with('(') && find_matching_paren(value, 0) == Some(value.len() - 1)
}

pub fn parse(text: &str) -> SettingsDocument {
    let Some(blob) = extract_blob(text) else {
        return SettingsDocument::default();
    };

    let mut masked = blob.to_string();
    let mut located: Vec<(usize, SettingEntry)> = Vec::new();
    let mut extracted: Vec<&str> = Vec::new();
    for (index, key) in IDENTITY_KEYS.into_iter().enumerate() {
        if let Some((span, entry)) = extract_identity(blob, index) {
            masked.replace_range(span.clone(), &" ".repeat(span.len()));
            located.push((span.start, entry));
            extracted.push(key);
        }
    }

    // A missed identity key is still picked up by the generic scan.
    located.extend(
        scan_entries(&masked)
            .into_iter()
            .filter(|(_, entry)| !extracted.contains(&entry.key.as_str())),
    );
    located.sort_by_key(|(offset, _)| *offset);

    let mut document = SettingsDocument::default();
    for (_, entry) in located {
        document.upsert(&entry.key, entry.value, entry.quoted);
    }
    document
}

pub fn render(document: &SettingsDocument) -> String {
    let body = document
        .entries
        .iter()
        .map(|entry| {
            if entry.quoted {
                format!("{}=\"{}\"", entry.key, entry.value)
            } else {
                format!("{}={}", entry.key, entry.value)
            }
        })
        .collect::<Vec<_>>()
        .join(",");
    format!("{SETTINGS_HEADER}\n{OPTION_SETTINGS_MARKER}({body})\n")
}

fn extract_blob(text: &str) -> Option<&str> {
    if let Some(open) = text.find('(') {
        if let Some(close) = find_matching_paren(text, open) {
            return Some(&text[open + 1..close]);
        }
    }

    let option_line = text.split(OPTION_SETTINGS_MARKER).nth(1)?.trim();
    Some(
        option_line
            .strip_prefix('(')
            .and_then(|rest| rest.strip_suffix(')'))
            .unwrap_or(option_line),
    )
}

/// Index of the `)` closing the `(` at `open`. Parentheses inside double
/// quotes do not count.
fn find_matching_paren(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_quotes = false;
    for (index, byte) in text.bytes().enumerate().skip(open) {
        match byte {
            b'"' => in_quotes = !in_quotes,
            b'(' if !in_quotes => depth += 1,
            b')' if !in_quotes => {
                depth -= 1;
                if depth == 0 {
                    return Some(index);
                }
            }
            _ => {}
        }
    }
    None
}

/// Quoted and bare patterns for each of `IDENTITY_KEYS`, compiled once.
fn identity_patterns() -> &'static [(Regex, Regex)] {
    static PATTERNS: OnceLock<Vec<(Regex, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        IDENTITY_KEYS
            .iter()
            .map(|key| {
                let quoted = Regex::new(&format!(
                    r#"(?s)(?:^|[,\n])\s*({key})\s*=\s*"(.*?)"\s*(?:[,\n]|$)"#
                ))
                .expect("quoted identity pattern");
                let bare = Regex::new(&format!(r"(?:^|[,\n])\s*({key})\s*=\s*([^,\n]*)"))
                    .expect("bare identity pattern");
                (quoted, bare)
            })
            .collect()
    })
}

/// Finds the identity key at `index` and its value, where a quoted value
/// runs to the closing quote that precedes a separator or the end of the
/// blob. Matches that start inside another entry's quoted value are skipped.
fn extract_identity(blob: &str, index: usize) -> Option<(Range<usize>, SettingEntry)> {
    let (quoted, bare) = identity_patterns().get(index)?;
    let key = IDENTITY_KEYS[index];

    let outside_quotes = |caps: &regex::Captures<'_>| {
        caps.get(1)
            .map(|name| blob[..name.start()].matches('"').count() % 2 == 0)
            .unwrap_or(false)
    };

    if let Some(caps) = quoted.captures_iter(blob).find(|caps| outside_quotes(caps)) {
        let name = caps.get(1)?;
        let value = caps.get(2)?;
        return Some((
            name.start()..value.end() + 1,
            SettingEntry {
                key: key.to_string(),
                value: value.as_str().to_string(),
                quoted: true,
            },
        ));
    }

    let caps = bare.captures_iter(blob).find(|caps| outside_quotes(caps))?;
    let name = caps.get(1)?;
    let value = caps.get(2)?;
    let trimmed = value.as_str().trim();
    let unwrapped = trimmed
        .strip_prefix('\'')
        .and_then(|rest| rest.strip_suffix('\''))
        .unwrap_or(trimmed);
    Some((
        name.start()..value.end(),
        SettingEntry {
            key: key.to_string(),
            value: unwrapped.to_string(),
            quoted: false,
        },
    ))
}

fn scan_entries(blob: &str) -> Vec<(usize, SettingEntry)> {
    let bytes = blob.as_bytes();
    let mut entries = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        if bytes[pos] == b',' || bytes[pos].is_ascii_whitespace() {
            pos += 1;
            continue;
        }

        let key_start = pos;
        while pos < bytes.len() && is_key_byte(bytes[pos]) {
            pos += 1;
        }
        if pos == key_start {
            pos += 1;
            continue;
        }
        let key = &blob[key_start..pos];

        let cursor = skip_blanks(bytes, pos);
        if cursor >= bytes.len() || bytes[cursor] != b'=' {
            pos = skip_past_separator(bytes, cursor);
            continue;
        }

        let (value, quoted, end) = read_value(blob, skip_blanks(bytes, cursor + 1));
        entries.push((
            key_start,
            SettingEntry {
                key: key.to_string(),
                value,
                quoted,
            },
        ));
        pos = end;
    }

    entries
}

fn read_value(blob: &str, start: usize) -> (String, bool, usize) {
    let bytes = blob.as_bytes();
    match bytes.get(start) {
        Some(b'"') => {
            if let Some(offset) = blob[start + 1..].find('"') {
                let close = start + 1 + offset;
                return (blob[start + 1..close].to_string(), true, close + 1);
            }
        }
        Some(b'(') => {
            if let Some(close) = find_matching_paren(blob, start) {
                return (blob[start..=close].to_string(), false, close + 1);
            }
        }
        _ => {}
    }

    let end = blob[start..]
        .find(|c| c == ',' || c == '\n')
        .map(|offset| start + offset)
        .unwrap_or(blob.len());
    (blob[start..end].trim().to_string(), false, end)
}

fn is_key_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}

fn skip_blanks(bytes: &[u8], mut pos: usize) -> usize {
    while pos < bytes.len() && (bytes[pos] == b' ' || bytes[pos] == b'\t') {
        pos += 1;
    }
    pos
}

fn skip_past_separator(bytes: &[u8], mut pos: usize) -> usize {
    while pos < bytes.len() && bytes[pos] != b',' && bytes[pos] != b'\n' {
        pos += 1;
    }
    pos
}

/// Missing file loads as an empty document.
pub async fn load(path: &Path) -> Result<SettingsDocument> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "world settings file missing, using empty document");
            return Ok(SettingsDocument::default());
        }
        Err(err) => return Err(Error::io("failed to read world settings", err)),
    };

    let text = String::from_utf8(bytes).unwrap_or_else(|err| {
        warn!(path = %path.display(), "world settings are not valid utf-8, decoding lossily");
        String::from_utf8_lossy(err.as_bytes()).into_owned()
    });
    let document = parse(&text);
    if document.is_empty() {
        warn!(path = %path.display(), "no OptionSettings found in world settings");
    }
    Ok(document)
}

/// Replaces the whole file through a temporary sibling.
pub async fn save(path: &Path, document: &SettingsDocument) -> Result<()> {
    write_replacing(path, render(document))
        .await
        .map_err(|err| Error::io("failed to write world settings", err))?;
    info!(path = %path.display(), entries = document.len(), "world settings saved");
    Ok(())
}

pub fn default_settings_path(settings_path: &Path) -> Option<PathBuf> {
    settings_path
        .ancestors()
        .nth(DEFAULTS_DEPTH)
        .map(|dir| dir.join(DEFAULT_SETTINGS_FILE))
}

/// Copies the server's bundled defaults over `settings_path`.
pub async fn restore_defaults(settings_path: &Path) -> Result<PathBuf> {
    let source = default_settings_path(settings_path).ok_or_else(|| {
        Error::new(
            ErrorKind::NotFound,
            format!("no server directory above {}", settings_path.display()),
        )
    })?;
    if tokio::fs::metadata(&source).await.is_err() {
        return Err(Error::new(
            ErrorKind::NotFound,
            format!("official default settings not found at {}", source.display()),
        ));
    }
    tokio::fs::copy(&source, settings_path)
        .await
        .map_err(|err| Error::io("failed to copy default settings", err))?;
    info!(from = %source.display(), to = %settings_path.display(), "world settings restored to defaults");
    Ok(source)
}

/// Restores defaults when the file is too small to hold real settings.
pub async fn ensure_initialized(settings_path: &Path) -> Result<bool> {
    let metadata = tokio::fs::metadata(settings_path)
        .await
        .map_err(|err| Error::io("failed to inspect world settings", err))?;
    if metadata.len() >= MIN_INITIALIZED_SIZE {
        return Ok(false);
    }
    warn!(path = %settings_path.display(), size = metadata.len(), "world settings look uninitialized");
    restore_defaults(settings_path).await?;
    Ok(true)
}

pub fn settings_path_for(server_exe: &Path) -> PathBuf {
    server_exe
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join("Pal")
        .join("Saved")
        .join("Config")
        .join("WindowsServer")
        .join("PalWorldSettings.ini")
}

/// REST API connection described by the settings file.
pub fn rest_connection(document: &SettingsDocument, host: &str) -> Result<Connection> {
    let enabled = document.get("RESTAPIEnabled").ok_or_else(|| {
        Error::new(ErrorKind::NotFound, "RESTAPIEnabled is not configured")
    })?;
    if !enabled.eq_ignore_ascii_case("true") {
        return Err(Error::new(ErrorKind::InvalidArgument, "RESTAPIEnabled is not set to True"));
    }

    let password = document
        .get("AdminPassword")
        .ok_or_else(|| Error::new(ErrorKind::NotFound, "AdminPassword is not configured"))?
        .replace('"', "");
    if password.is_empty() {
        return Err(Error::new(ErrorKind::InvalidArgument, "AdminPassword is empty"));
    }

    let port = document
        .get("RESTAPIPort")
        .or_else(|| document.get("RCONPort"))
        .ok_or_else(|| Error::new(ErrorKind::NotFound, "RESTAPIPort is not configured"))?;
    let port: u16 = port.trim().parse().map_err(|_| {
        Error::new(ErrorKind::ParseFailed, format!("invalid REST API port: {port}"))
    })?;

    Connection::new(host, port, password)
}

/// Turns on RCON and the REST API with a fresh admin password, returned to
/// the caller. An existing `RESTAPIPort` is kept.
pub fn enable_rest_api(document: &mut SettingsDocument) -> Result<String> {
    document.set_raw("RCONEnabled", "True")?;
    document.set_raw("RCONPort", DEFAULT_RCON_PORT)?;
    document.set_raw("RESTAPIEnabled", "True")?;
    if document.get("RESTAPIPort").is_none() {
        document.set_raw("RESTAPIPort", DEFAULT_REST_API_PORT)?;
    }
    let password = random_token(GENERATED_PASSWORD_LEN);
    document.set_string("AdminPassword", password.clone())?;
    Ok(password)
}

pub fn set_server_identity(
    document: &mut SettingsDocument,
    name: &str,
    description: &str,
) -> Result<()> {
    document.set_string("ServerName", sanitize_quoted(name))?;
    document.set_string("ServerDescription", sanitize_quoted(description))
}

fn sanitize_quoted(value: &str) -> String {
    value.chars().filter(|c| !matches!(c, '\n' | '\r' | '"')).collect()
}

fn random_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

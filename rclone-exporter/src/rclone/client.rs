//! rclone command-line client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::cache::RemoteTypeCache;
use super::remote::RemoteIdentifier;
use super::size::{ProbeResult, parse_size_output};
use crate::probe::{ProbeError, SizeProbe};
use crate::{Error, Result};

/// Default rclone binary, resolved against `PATH`.
pub const DEFAULT_RCLONE_PATH: &str = "rclone";

/// Default deadline for `rclone size`.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Deadline for the short housekeeping commands (version, config, listremotes).
const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Placeholder used when a remote's backend type cannot be determined.
pub const UNKNOWN_TYPE: &str = "unknown";

/// A configured rclone remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteInfo {
    pub name: String,
    #[serde(rename = "type", default)]
    pub remote_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

/// `listremotes --json` prints plain names; `--long` adds details.
#[derive(Deserialize)]
#[serde(untagged)]
enum ListRemotesOutput {
    Detailed(Vec<RemoteInfo>),
    Names(Vec<String>),
}

/// Client for the rclone binary.
pub struct RcloneClient {
    binary_path: String,
    timeout: Duration,
    type_cache: RemoteTypeCache,
}

impl RcloneClient {
    /// Create a client. An empty path or a zero timeout fall back to the defaults.
    pub fn new(binary_path: impl Into<String>, timeout: Duration) -> Self {
        let binary_path = binary_path.into();
        Self {
            binary_path: if binary_path.trim().is_empty() {
                DEFAULT_RCLONE_PATH.to_string()
            } else {
                binary_path
            },
            timeout: if timeout.is_zero() {
                DEFAULT_TIMEOUT
            } else {
                timeout
            },
            type_cache: RemoteTypeCache::new(),
        }
    }

    pub fn binary_path(&self) -> &str {
        &self.binary_path
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Resolve the binary against `PATH` and make sure it runs.
    ///
    /// On success the client keeps the resolved absolute path and the version
    /// line is returned.
    pub async fn check_binary_available(&mut self) -> Result<String> {
        let resolved = process_utils::resolve_program(&self.binary_path).ok_or_else(|| {
            Error::BinaryUnavailable(format!("'{}' not found in PATH", self.binary_path))
        })?;
        self.binary_path = resolved.to_string_lossy().into_owned();

        let version = self.version().await.map_err(|e| {
            Error::BinaryUnavailable(format!(
                "rclone not executable at '{}': {}",
                self.binary_path, e
            ))
        })?;

        info!(version = %version, path = %self.binary_path, "rclone binary is available");
        Ok(version)
    }

    /// First line of `rclone version`.
    pub async fn version(&self) -> Result<String> {
        let out = process_utils::run_captured(&self.binary_path, ["version"], COMMAND_TIMEOUT)
            .await?;
        Ok(first_line(&String::from_utf8_lossy(&out.stdout)))
    }

    /// Run `rclone size --json --fast-list -- <remote>` and validate the report.
    ///
    /// The remote follows `--` so that a name starting with `-` is never read
    /// as a flag.
    pub async fn size(&self, remote: &RemoteIdentifier) -> std::result::Result<ProbeResult, ProbeError> {
        debug!(
            remote = %remote,
            path = %self.binary_path,
            timeout = ?self.timeout,
            "Executing rclone size command"
        );

        let args = ["size", "--json", "--fast-list", "--", remote.as_str()];
        let out = process_utils::run_captured(&self.binary_path, args, self.timeout)
            .await
            .inspect_err(|e| debug!(remote = %remote, error = %e, "rclone size command failed"))?;

        if !out.stderr.is_empty() {
            debug!(
                remote = %remote,
                stderr = %String::from_utf8_lossy(&out.stderr).trim(),
                "rclone wrote to stderr"
            );
        }

        let result = parse_size_output(&out.stdout).inspect_err(|e| {
            warn!(
                remote = %remote,
                error = %e,
                raw_output = %String::from_utf8_lossy(&out.stdout).trim(),
                "Rejected rclone size output"
            )
        })?;

        debug!(
            remote = %remote,
            bytes = result.total_bytes,
            objects = result.object_count,
            duration = ?out.elapsed,
            "rclone size succeeded"
        );
        Ok(result)
    }

    /// List configured remotes, enriching missing types from the type cache.
    pub async fn list_remotes(&self) -> Result<Vec<RemoteInfo>> {
        let output = match process_utils::run_captured(
            &self.binary_path,
            ["listremotes", "--long", "--json"],
            COMMAND_TIMEOUT,
        )
        .await
        {
            Ok(out) => out,
            Err(e) => {
                debug!(error = %e, "Falling back to basic listremotes (--long not supported)");
                process_utils::run_captured(
                    &self.binary_path,
                    ["listremotes", "--json"],
                    COMMAND_TIMEOUT,
                )
                .await?
            }
        };

        let mut remotes = parse_list_remotes(&output.stdout)?;
        if remotes.is_empty() {
            self.type_cache.clear();
        }

        for remote in &mut remotes {
            if remote.remote_type.is_empty() || remote.remote_type == UNKNOWN_TYPE {
                remote.remote_type = match self.remote_type(&remote.name).await {
                    Ok(remote_type) => remote_type,
                    Err(e) => {
                        debug!(remote = %remote.name, error = %e, "Could not detect remote type");
                        self.type_cache.invalidate(&remote.name);
                        UNKNOWN_TYPE.to_string()
                    }
                };
            } else {
                self.type_cache.insert(&remote.name, remote.remote_type.clone());
            }
        }

        debug!(count = remotes.len(), "Listed rclone remotes");
        Ok(remotes)
    }

    /// Backend type of a remote, from `rclone config dump`. Cached for a few minutes.
    pub async fn remote_type(&self, remote: &str) -> Result<String> {
        let name = remote.trim_end_matches(':');
        if let Some(cached) = self.type_cache.get(name) {
            debug!(remote = name, remote_type = %cached, "Using cached remote type");
            return Ok(cached);
        }

        let out =
            process_utils::run_captured(&self.binary_path, ["config", "dump"], COMMAND_TIMEOUT)
                .await?;
        let remote_type = parse_config_dump(&out.stdout, name)?;

        self.type_cache.insert(name, remote_type.clone());
        debug!(remote = name, remote_type = %remote_type, "Detected remote type");
        Ok(remote_type)
    }
}

#[async_trait]
impl SizeProbe for RcloneClient {
    async fn probe(&self, remote: &RemoteIdentifier) -> std::result::Result<ProbeResult, ProbeError> {
        self.size(remote).await
    }
}

fn first_line(s: &str) -> String {
    s.trim().lines().next().unwrap_or_default().trim().to_string()
}

fn parse_list_remotes(raw: &[u8]) -> Result<Vec<RemoteInfo>> {
    if raw.trim_ascii().is_empty() {
        return Ok(Vec::new());
    }

    let remotes = match serde_json::from_slice::<ListRemotesOutput>(raw)? {
        ListRemotesOutput::Detailed(remotes) => remotes
            .into_iter()
            .map(|r| RemoteInfo {
                name: r.name.trim_end_matches(':').to_string(),
                ..r
            })
            .collect(),
        ListRemotesOutput::Names(names) => names
            .into_iter()
            .map(|name| RemoteInfo {
                name: name.trim_end_matches(':').to_string(),
                remote_type: UNKNOWN_TYPE.to_string(),
                source: String::new(),
                description: String::new(),
            })
            .collect(),
    };

    Ok(remotes)
}

fn parse_config_dump(raw: &[u8], name: &str) -> Result<String> {
    if raw.trim_ascii().is_empty() {
        return Err(Error::Other("rclone config is empty".to_string()));
    }

    let configs: HashMap<String, serde_json::Map<String, serde_json::Value>> =
        serde_json::from_slice(raw)?;
    if configs.is_empty() {
        return Err(Error::Other("rclone config is empty".to_string()));
    }

    let config = configs
        .get(name)
        .ok_or_else(|| Error::Other(format!("remote '{}' not found in config", name)))?;

    match config.get("type") {
        Some(serde_json::Value::String(t)) => Ok(t.clone()),
        Some(_) => Err(Error::Other(format!("remote '{}' type is not a string", name))),
        None => Err(Error::Other(format!("remote '{}' has no type field", name))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_for_empty_settings() {
        let client = RcloneClient::new("", Duration::ZERO);
        assert_eq!(client.binary_path(), DEFAULT_RCLONE_PATH);
        assert_eq!(client.timeout(), DEFAULT_TIMEOUT);
    }

    #[test]
    fn first_line_of_version_output() {
        let out = "rclone v1.66.0\n- os/version: debian 12\n- go/version: go1.22\n";
        assert_eq!(first_line(out), "rclone v1.66.0");
        assert_eq!(first_line(""), "");
    }

    #[test]
    fn list_remotes_accepts_detailed_output() {
        let raw = br#"[{"name":"gdrive:","type":"drive","source":"file","description":""},{"name":"s3","type":"s3"}]"#;
        let remotes = parse_list_remotes(raw).unwrap();
        assert_eq!(remotes.len(), 2);
        assert_eq!(remotes[0].name, "gdrive");
        assert_eq!(remotes[0].remote_type, "drive");
        assert_eq!(remotes[0].source, "file");
        assert_eq!(remotes[1].remote_type, "s3");
    }

    #[test]
    fn list_remotes_accepts_plain_names() {
        let remotes = parse_list_remotes(br#"["a:","b:"]"#).unwrap();
        let names: Vec<_> = remotes.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
        assert!(remotes.iter().all(|r| r.remote_type == UNKNOWN_TYPE));
    }

    #[test]
    fn list_remotes_handles_empty_output() {
        assert!(parse_list_remotes(b"").unwrap().is_empty());
        assert!(parse_list_remotes(b"[]\n").unwrap().is_empty());
        assert!(parse_list_remotes(b"garbage").is_err());
    }

    #[test]
    fn config_dump_lookup() {
        let raw = br#"{"gdrive":{"type":"drive","scope":"drive"},"odd":{"type":1},"bare":{}}"#;
        assert_eq!(parse_config_dump(raw, "gdrive").unwrap(), "drive");
        assert!(parse_config_dump(raw, "missing").is_err());
        assert!(parse_config_dump(raw, "odd").is_err());
        assert!(parse_config_dump(raw, "bare").is_err());
        assert!(parse_config_dump(b"{}", "gdrive").is_err());
        assert!(parse_config_dump(b"", "gdrive").is_err());
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use std::path::{Path, PathBuf};
        use std::sync::OnceLock;
        use tempfile::TempDir;

        /// Stand-ins for rclone, keyed by name.
        ///
        /// All of them are written before any test in this binary spawns one:
        /// a script still open for writing while another thread forks cannot
        /// be executed (ETXTBSY).
        const SCRIPTS: &[(&str, &str)] = &[
            (
                "size-args",
                r#"[ "$1" = size ] && [ "$2" = --json ] && [ "$3" = --fast-list ] && [ "$4" = -- ] || exit 9
printf '{"count":42,"bytes":1000,"args":"%s"}' "$5""#,
            ),
            ("size-fails", "echo 'directory not found' >&2; exit 3"),
            ("size-negative", r#"printf '{"count":-1,"bytes":500}'"#),
            ("version", "echo 'rclone v1.66.0'; echo '- os/type: linux'"),
            (
                "listremotes-basic",
                r#"case "$1 $2" in
  "listremotes --long") exit 1 ;;
  "listremotes --json") echo '["gdrive:","s3:"]' ;;
  "config dump") echo '{"gdrive":{"type":"drive"},"s3":{"type":"s3"}}' ;;
  *) exit 2 ;;
esac"#,
            ),
            (
                "listremotes-long",
                r#"case "$1 $2" in
  "listremotes --long") echo '[{"name":"s3:","type":"s3"},{"name":"gone:","type":""}]' ;;
  "config dump") echo '{"s3":{"type":"s3"}}' ;;
  *) exit 2 ;;
esac"#,
            ),
            ("listremotes-empty", "echo '[]'"),
            (
                "config-dump-counted",
                r#"echo x >> "$(dirname "$0")/config-dump-counted.calls"
echo '{"gdrive":{"type":"drive"}}'"#,
            ),
        ];

        fn scripts_dir() -> &'static Path {
            static DIR: OnceLock<TempDir> = OnceLock::new();
            DIR.get_or_init(|| {
                let dir = tempfile::tempdir().unwrap();
                for (name, body) in SCRIPTS {
                    let path = dir.path().join(name);
                    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
                    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
                        .unwrap();
                }
                dir
            })
            .path()
        }

        fn fake_rclone(name: &str) -> String {
            scripts_dir().join(name).to_string_lossy().into_owned()
        }

        fn calls(name: &str) -> usize {
            let marker: PathBuf = scripts_dir().join(format!("{name}.calls"));
            std::fs::read_to_string(marker)
                .map(|calls| calls.lines().count())
                .unwrap_or(0)
        }

        #[tokio::test]
        async fn size_passes_the_remote_after_end_of_flags() {
            let client = RcloneClient::new(fake_rclone("size-args"), Duration::from_secs(10));
            let remote = RemoteIdentifier::parse("s3:bucket").unwrap();
            let result = client.size(&remote).await.unwrap();
            assert_eq!(result.object_count, 42);
            assert_eq!(result.total_bytes, 1000);
        }

        #[tokio::test]
        async fn remote_that_looks_like_a_flag_stays_positional() {
            let client = RcloneClient::new(fake_rclone("size-args"), Duration::from_secs(10));
            let remote = RemoteIdentifier::parse("--log-file").unwrap();
            let result = client.size(&remote).await.unwrap();
            assert_eq!(result.object_count, 42);
        }

        #[tokio::test]
        async fn size_reports_exit_code_and_output() {
            let client = RcloneClient::new(fake_rclone("size-fails"), Duration::from_secs(10));
            let remote = RemoteIdentifier::parse("gdrive:").unwrap();
            match client.size(&remote).await.unwrap_err() {
                ProbeError::ExecutionFailure { code, detail } => {
                    assert_eq!(code, Some(3));
                    assert!(detail.contains("directory not found"));
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }

        #[tokio::test]
        async fn size_rejects_negative_values() {
            let client = RcloneClient::new(fake_rclone("size-negative"), Duration::from_secs(10));
            let remote = RemoteIdentifier::parse("gdrive:").unwrap();
            assert!(matches!(
                client.size(&remote).await,
                Err(ProbeError::DataError(_))
            ));
        }

        #[tokio::test]
        async fn version_and_binary_check() {
            let mut client = RcloneClient::new(fake_rclone("version"), Duration::from_secs(10));
            assert_eq!(client.version().await.unwrap(), "rclone v1.66.0");
            assert_eq!(client.check_binary_available().await.unwrap(), "rclone v1.66.0");
        }

        #[tokio::test]
        async fn missing_binary_fails_the_check() {
            let mut client = RcloneClient::new("/nonexistent/rclone", Duration::from_secs(10));
            assert!(matches!(
                client.check_binary_available().await,
                Err(Error::BinaryUnavailable(_))
            ));
        }

        #[tokio::test]
        async fn list_remotes_falls_back_and_enriches_types() {
            let client =
                RcloneClient::new(fake_rclone("listremotes-basic"), Duration::from_secs(10));
            let remotes = client.list_remotes().await.unwrap();
            assert_eq!(remotes.len(), 2);
            assert_eq!(remotes[0].remote_type, "drive");
            assert_eq!(remotes[1].remote_type, "s3");
        }

        #[tokio::test]
        async fn list_remotes_refreshes_the_type_cache() {
            let client =
                RcloneClient::new(fake_rclone("listremotes-long"), Duration::from_secs(10));
            let remotes = client.list_remotes().await.unwrap();
            assert_eq!(remotes[0].remote_type, "s3");
            assert_eq!(remotes[1].remote_type, UNKNOWN_TYPE);
            assert_eq!(client.type_cache.get("s3").as_deref(), Some("s3"));
            assert_eq!(client.type_cache.get("gone"), None);
        }

        #[tokio::test]
        async fn empty_listing_clears_the_type_cache() {
            let client =
                RcloneClient::new(fake_rclone("listremotes-empty"), Duration::from_secs(10));
            client.type_cache.insert("gdrive", "drive");

            assert!(client.list_remotes().await.unwrap().is_empty());
            assert!(client.type_cache.is_empty());
        }

        #[tokio::test]
        async fn remote_type_is_cached() {
            let client =
                RcloneClient::new(fake_rclone("config-dump-counted"), Duration::from_secs(10));

            assert_eq!(client.remote_type("gdrive:").await.unwrap(), "drive");
            assert_eq!(client.remote_type("gdrive").await.unwrap(), "drive");
            assert_eq!(calls("config-dump-counted"), 1);

            client.type_cache.invalidate("gdrive");
            assert_eq!(client.remote_type("gdrive").await.unwrap(), "drive");
            assert_eq!(calls("config-dump-counted"), 2);
        }
    }
}

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser};
use fieldsync_core::models::{DeviceInfo, Fields, TableStatus};
use fieldsync_core::{ConflictPolicy, CycleState, SyncConfig, SyncStatus, SyncTable};
use pretty_assertions::assert_eq;
use serde_json::json;

use crate::cli::{AdminCommands, Cli, Commands, CompletionShell};
use crate::commands::common::{
    format_device_lines, format_status_lines, format_timestamp, open_coordinator, CliContext,
};
use crate::commands::completions::render_completions;
use crate::commands::sync::{run_pull, run_push, run_sync};
use crate::config_file::{resolve_db_path, resolve_sync_config, ConfigOverrides, ENV_DB_PATH};
use crate::error::CliError;

fn no_env(_: &str) -> Option<String> {
    None
}

fn fields(value: serde_json::Value) -> Fields {
    value.as_object().cloned().unwrap()
}

fn write_config(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("config.json");
    std::fs::write(&path, body).unwrap();
    path
}

fn context(db_path: PathBuf, central: Option<&Path>) -> CliContext {
    CliContext {
        db_path,
        config: SyncConfig {
            central_url: central.map(|path| path.display().to_string()),
            ..SyncConfig::default()
        },
    }
}

#[test]
fn cli_definition_is_consistent() {
    Cli::command().debug_assert();
}

#[test]
fn global_flags_parse_after_subcommand() {
    let cli = Cli::try_parse_from([
        "fieldsync",
        "admin",
        "reset",
        "--json",
        "--conflict-policy",
        "newest-wins",
        "--db-path",
        "/tmp/device.db",
    ])
    .unwrap();

    assert_eq!(cli.conflict_policy, Some(ConflictPolicy::NewestWins));
    assert_eq!(cli.db_path, Some(PathBuf::from("/tmp/device.db")));
    assert!(matches!(
        cli.command,
        Commands::Admin {
            command: AdminCommands::Reset { json: true }
        }
    ));
}

#[test]
fn unknown_conflict_policy_is_rejected_by_parser() {
    let result = Cli::try_parse_from(["fieldsync", "sync", "--conflict-policy", "remote-wins"]);
    assert!(result.is_err());
}

#[test]
fn completions_name_the_binary() {
    let script = String::from_utf8(render_completions(CompletionShell::Bash)).unwrap();
    assert!(script.contains("fieldsync"));
}

#[test]
fn db_path_prefers_flag_then_env() {
    let env = |key: &str| (key == ENV_DB_PATH).then(|| "/data/env.db".to_string());

    assert_eq!(
        resolve_db_path(Some(PathBuf::from("/data/flag.db")), env),
        PathBuf::from("/data/flag.db")
    );
    assert_eq!(resolve_db_path(None, env), PathBuf::from("/data/env.db"));
    assert!(resolve_db_path(None, no_env).ends_with("fieldsync.db"));
}

#[test]
fn config_layers_file_then_env_then_flags() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        dir.path(),
        r#"{
            "central_url": "file:/srv/central.db",
            "auth_token": "file-token",
            "table_timeout_secs": 45,
            "tables": ["nodes", "cabinets"]
        }"#,
    );
    let env = |key: &str| match key {
        "FIELDSYNC_AUTH_TOKEN" => Some("env-token".to_string()),
        "FIELDSYNC_CONFLICT_POLICY" => Some("newest_wins".to_string()),
        _ => None,
    };
    let overrides = ConfigOverrides {
        central_url: Some("libsql://fleet.example.turso.io".to_string()),
        conflict_policy: None,
    };

    let config = resolve_sync_config(Some(&path), &overrides, env).unwrap();

    assert_eq!(
        config.central_url().as_deref(),
        Some("libsql://fleet.example.turso.io")
    );
    assert_eq!(config.auth_token().as_deref(), Some("env-token"));
    assert_eq!(config.conflict_policy, ConflictPolicy::NewestWins);
    assert_eq!(config.table_timeout_secs, 45);
    assert_eq!(
        config.ordered_tables(),
        vec![SyncTable::Cabinets, SyncTable::Nodes]
    );
}

#[test]
fn flag_policy_beats_env_policy() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), "{}");
    let env = |key: &str| (key == "FIELDSYNC_CONFLICT_POLICY").then(|| "newest-wins".to_string());
    let overrides = ConfigOverrides {
        central_url: None,
        conflict_policy: Some(ConflictPolicy::LocalWins),
    };

    let config = resolve_sync_config(Some(&path), &overrides, env).unwrap();
    assert_eq!(config.conflict_policy, ConflictPolicy::LocalWins);
}

#[test]
fn explicit_config_path_must_exist() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.json");

    let error = resolve_sync_config(Some(&missing), &ConfigOverrides::default(), no_env)
        .unwrap_err();
    assert!(matches!(error, CliError::Config(_)));
}

#[test]
fn malformed_and_invalid_configs_are_errors() {
    let dir = tempfile::tempdir().unwrap();

    let path = write_config(dir.path(), r#"{"central": "typo"}"#);
    let error =
        resolve_sync_config(Some(&path), &ConfigOverrides::default(), no_env).unwrap_err();
    assert!(matches!(error, CliError::Config(_)));

    let path = write_config(dir.path(), r#"{"tables": []}"#);
    let error =
        resolve_sync_config(Some(&path), &ConfigOverrides::default(), no_env).unwrap_err();
    assert!(matches!(error, CliError::Core(fieldsync_core::Error::Config(_))));
}

#[test]
fn status_lines_show_reachability_and_cursor() {
    let mut per_table = BTreeMap::new();
    per_table.insert(
        SyncTable::Cabinets,
        TableStatus {
            local_count: 3,
            unsynced_count: 1,
            last_sync_time: None,
        },
    );
    let status = SyncStatus {
        device_id: "tablet-a-0123456789ab".to_string(),
        identity_durable: false,
        connected: false,
        state: CycleState::Idle,
        per_table,
    };

    assert_eq!(
        format_status_lines(&status),
        vec![
            "Device: tablet-a-0123456789ab (not persisted)".to_string(),
            "Central: unreachable".to_string(),
            "State: Idle".to_string(),
            "  cabinets: 3 rows, 1 unsynced, last sync never".to_string(),
        ]
    );
}

#[test]
fn device_lines_list_tables_in_order() {
    let info = DeviceInfo {
        device_id: "tablet-a-0123456789ab".to_string(),
        identity_durable: true,
        hostname: "tablet-a".to_string(),
        platform: "linux-x86_64".to_string(),
        sync_tables: vec![SyncTable::Cabinets, SyncTable::Nodes],
    };

    let lines = format_device_lines(&info);
    assert_eq!(lines[0], "Device ID: tablet-a-0123456789ab");
    assert_eq!(lines[3], "Tables: cabinets, nodes");
}

#[test]
fn timestamps_render_as_rfc3339() {
    assert_eq!(format_timestamp(None), "never");
    assert!(format_timestamp(Some(1_714_557_600_000)).starts_with("2024-05-01T10:00:00"));
}

#[tokio::test(flavor = "multi_thread")]
async fn sync_requires_a_central_store() {
    let dir = tempfile::tempdir().unwrap();
    let context = context(dir.path().join("device.db"), None);

    let error = run_sync(&context, false).await.unwrap_err();
    assert!(matches!(error, CliError::SyncNotConfigured));
}

#[tokio::test(flavor = "multi_thread")]
async fn status_works_without_a_central_store() {
    let dir = tempfile::tempdir().unwrap();
    let context = context(dir.path().join("device.db"), None);

    let coordinator = open_coordinator(&context).await.unwrap();
    let status = coordinator.get_status().await.unwrap();

    assert!(!status.connected);
    assert_eq!(status.per_table.len(), SyncTable::ALL.len());
}

#[tokio::test(flavor = "multi_thread")]
async fn push_then_pull_moves_rows_between_device_files() {
    let dir = tempfile::tempdir().unwrap();
    let central = dir.path().join("central.db");
    let device_a = context(dir.path().join("a.db"), Some(&central));
    let device_b = context(dir.path().join("b.db"), Some(&central));

    {
        let coordinator = open_coordinator(&device_a).await.unwrap();
        coordinator
            .tracker()
            .await
            .unwrap()
            .insert(SyncTable::Cabinets, &fields(json!({"name": "C-7"})))
            .await
            .unwrap();
    }

    run_push(&device_a, true).await.unwrap();
    run_pull(&device_b, true).await.unwrap();

    let coordinator = open_coordinator(&device_b).await.unwrap();
    let rows = coordinator
        .tracker()
        .await
        .unwrap()
        .list_all(SyncTable::Cabinets)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].fields["name"], json!("C-7"));
    assert!(!rows[0].is_dirty());
}

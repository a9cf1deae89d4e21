#![allow(deprecated)] // cargo_bin は cargo_bin_cmd! へ移行予定

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// AWS にも利用者の設定にも触れない実行環境を用意する
fn isolated(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("lambdaflow").unwrap();
    cmd.current_dir(dir.path())
        .env("HOME", dir.path())
        .env("XDG_CONFIG_HOME", dir.path().join(".config"))
        .env_remove("LAMBDAFLOW_CONFIG_PATH")
        .env_remove("LAMBDAFLOW_STAGE");
    cmd
}

fn project(content: &str) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("lambdaflow.yml"), content).unwrap();
    dir
}

/// CLIヘルプが正しく表示されることを確認
#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("lambdaflow").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("deploy"))
        .stdout(predicate::str::contains("plan"))
        .stdout(predicate::str::contains("info"))
        .stdout(predicate::str::contains("remove"))
        .stdout(predicate::str::contains("metrics"));
}

/// バージョン表示が正しく動作することを確認
#[test]
fn test_cli_version() {
    let mut cmd = Command::cargo_bin("lambdaflow").unwrap();
    cmd.arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("lambdaflow"));
}

/// removeコマンドのヘルプが正しく表示されることを確認
#[test]
fn test_remove_help() {
    let mut cmd = Command::cargo_bin("lambdaflow").unwrap();
    cmd.arg("remove")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--yes"))
        .stdout(predicate::str::contains("--stage"));
}

/// 設定ファイルがない場合はエラーになることを確認
#[test]
fn test_missing_project_file() {
    let dir = tempfile::tempdir().unwrap();
    isolated(&dir)
        .arg("plan")
        .assert()
        .failure()
        .stderr(predicate::str::contains("設定ファイルが見つかりません"));
}

/// 不正なステージ名はエラーになることを確認
#[test]
fn test_invalid_stage_name() {
    let dir = project("name: api\n");
    isolated(&dir)
        .args(["info", "--stage", "prod:eu"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("prod:eu"));
}

/// --yes なしの remove は何も削除しないことを確認
#[test]
fn test_remove_requires_yes() {
    let dir = project("name: api\ninputs:\n  name: fn1\n");
    isolated(&dir)
        .arg("remove")
        .assert()
        .success()
        .stdout(predicate::str::contains("--yes"));
    assert!(!dir.path().join(".lambdaflow").exists());
}

/// 未デプロイの info は状態ファイルのみを参照することを確認
#[test]
fn test_info_before_deploy() {
    let dir = project("name: api\nstage: prod\n");
    isolated(&dir)
        .arg("info")
        .assert()
        .success()
        .stdout(predicate::str::contains("api (prod)"))
        .stdout(predicate::str::contains("デプロイされていません"));
}

/// metrics の期間指定が検証されることを確認
#[test]
fn test_metrics_rejects_invalid_since() {
    let dir = project("name: api\n");
    isolated(&dir)
        .args(["metrics", "--since", "forever"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("期間の形式が不正です"));
}

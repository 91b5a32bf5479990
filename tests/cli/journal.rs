use anyhow::Result;

use crate::{CliTest, GO_FIXTURE, stdout_of};

fn apply_delete(test: &CliTest, pattern: &str) -> Result<()> {
    let output = test
        .command()
        .args(["delete", pattern, "main.go"])
        .output()?;
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    Ok(())
}

#[test]
fn test_checkpoint_then_rollback_by_name() -> Result<()> {
    let test = CliTest::with_file("main.go", GO_FIXTURE)?;
    apply_delete(&test, "func:other")?;

    let output = test.command().args(["checkpoint", "after-cleanup"]).output()?;
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(stdout_of(&output).contains("after-cleanup"));

    // Nothing started after the checkpoint in its run, so the rollback
    // reverts nothing.
    let output = test
        .command()
        .args(["rollback", "after-cleanup"])
        .output()?;
    assert!(output.status.success());
    assert!(stdout_of(&output).contains("nothing to roll back"));
    Ok(())
}

#[test]
fn test_checkpoint_without_runs_fails() -> Result<()> {
    let test = CliTest::with_file("main.go", GO_FIXTURE)?;
    let output = test.command().args(["checkpoint", "early"]).output()?;
    assert_eq!(output.status.code(), Some(2));
    Ok(())
}

#[test]
fn test_history_lists_runs_newest_first() -> Result<()> {
    let test = CliTest::with_file("main.go", GO_FIXTURE)?;
    apply_delete(&test, "func:other")?;
    apply_delete(&test, "func:Test_A")?;

    let output = test.command().args(["history"]).output()?;
    assert!(output.status.success());
    let stdout = stdout_of(&output);
    let runs: Vec<&str> = stdout.lines().collect();
    assert_eq!(runs.len(), 2, "{stdout}");
    assert!(runs.iter().all(|l| l.contains("completed")), "{stdout}");
    // Lexicographic public ids: newest first.
    assert!(runs[0] > runs[1], "{stdout}");
    Ok(())
}

#[test]
fn test_summary_reports_operations() -> Result<()> {
    let test = CliTest::with_file("main.go", GO_FIXTURE)?;
    apply_delete(&test, "func:other")?;

    let history = test.command().args(["history"]).output()?;
    let binding = stdout_of(&history);
    let public_id = binding
        .lines()
        .next()
        .and_then(|l| l.split_whitespace().next())
        .unwrap()
        .to_string();

    let output = test.command().args(["summary", &public_id]).output()?;
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = stdout_of(&output);
    assert!(stdout.contains("operations: 1"), "{stdout}");
    assert!(stdout.contains("1 delete"), "{stdout}");
    Ok(())
}

#[test]
fn test_keys_rotate_and_list() -> Result<()> {
    let test = CliTest::with_file("main.go", GO_FIXTURE)?;
    let key = "ef".repeat(32);

    let output = test
        .command()
        .env("MORFX_MASTER_KEY", &key)
        .args(["keys", "rotate"])
        .output()?;
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(stdout_of(&output).contains("key version 2"));

    let output = test
        .command()
        .env("MORFX_MASTER_KEY", &key)
        .args(["keys", "list"])
        .output()?;
    let stdout = stdout_of(&output);
    assert!(stdout.contains("v1"), "{stdout}");
    assert!(stdout.contains("v2"), "{stdout}");
    // The newest version is the active one.
    let active: Vec<&str> = stdout.lines().filter(|l| l.contains("active")).collect();
    assert_eq!(active.len(), 1, "{stdout}");
    assert!(active[0].starts_with("v2"), "{stdout}");
    Ok(())
}

#[test]
fn test_keys_list_without_encryption() -> Result<()> {
    let test = CliTest::with_file("main.go", GO_FIXTURE)?;
    let output = test.command().args(["keys", "list"]).output()?;
    assert!(output.status.success());
    assert!(stdout_of(&output).contains("no keys"));
    Ok(())
}

#[test]
fn test_logs_record_and_search_transforms() -> Result<()> {
    let test = CliTest::with_file("main.go", GO_FIXTURE)?;
    apply_delete(&test, "func:other")?;

    let output = test.command().args(["logs", "delete"]).output()?;
    assert!(output.status.success());
    let stdout = stdout_of(&output);
    assert!(stdout.contains("main.go"), "{stdout}");

    let output = test.command().args(["logs", "zzz-not-there"]).output()?;
    assert!(stdout_of(&output).contains("no log entries"));
    Ok(())
}

#[test]
fn test_retention_archives_old_runs() -> Result<()> {
    let test = CliTest::with_file("main.go", GO_FIXTURE)?;
    // Each mutating invocation begins its own run.
    apply_delete(&test, "func:other")?;
    apply_delete(&test, "func:Test_A")?;
    apply_delete(&test, "func:TestHelper")?;

    // The next mutating run under MORFX_RETAIN_RUNS=2 first archives
    // everything beyond the two most recent, then begins its own run.
    let output = test
        .command()
        .env("MORFX_RETAIN_RUNS", "2")
        .args([
            "append",
            "func:Nope",
            "main.go",
            "--content",
            "func Fresh() {\n}",
        ])
        .output()?;
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let history = test.command().args(["history", "--limit", "10"]).output()?;
    let stdout = stdout_of(&history);
    let archived = stdout.lines().filter(|l| l.contains("archived")).count();
    let live = stdout.lines().filter(|l| !l.contains("archived")).count();
    assert_eq!(archived, 1, "{stdout}");
    assert_eq!(live, 3, "{stdout}");
    Ok(())
}

use anyhow::Result;

use crate::{CliTest, GO_FIXTURE, parse_op_id, stdout_of};

fn apply_replace(test: &CliTest) -> Result<String> {
    let output = test
        .command()
        .args([
            "replace",
            "func:TestHelper",
            "main.go",
            "--content",
            "func TestHelper() {\n\tprintln(\"patched\")\n}",
        ])
        .output()?;
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    Ok(parse_op_id(&stdout_of(&output)))
}

#[test]
fn test_rollback_restores_original_and_is_idempotent() -> Result<()> {
    let test = CliTest::with_file("main.go", GO_FIXTURE)?;
    let op_id = apply_replace(&test)?;
    assert_ne!(test.read_file("main.go")?, GO_FIXTURE);

    let output = test.command().args(["rollback", &op_id]).output()?;
    assert!(output.status.success());
    assert!(stdout_of(&output).contains("reverted 1 operation(s)"));
    assert_eq!(test.read_file("main.go")?, GO_FIXTURE);

    // A second rollback of the same id is a no-op.
    let output = test.command().args(["rollback", &op_id]).output()?;
    assert!(output.status.success());
    assert!(stdout_of(&output).contains("nothing to roll back"));
    assert_eq!(test.read_file("main.go")?, GO_FIXTURE);
    Ok(())
}

#[test]
fn test_rollback_unknown_target_fails() -> Result<()> {
    let test = CliTest::with_file("main.go", GO_FIXTURE)?;
    let output = test.command().args(["rollback", "no-such-op"]).output()?;
    assert_eq!(output.status.code(), Some(2));
    Ok(())
}

#[test]
fn test_rollback_dry_run_reports_without_reverting() -> Result<()> {
    let test = CliTest::with_file("main.go", GO_FIXTURE)?;
    let op_id = apply_replace(&test)?;
    let modified = test.read_file("main.go")?;

    let output = test
        .command()
        .args(["rollback", &op_id, "--dry-run"])
        .output()?;
    assert!(output.status.success());
    assert!(stdout_of(&output).contains("would revert 1 operation(s)"));
    assert_eq!(test.read_file("main.go")?, modified);
    Ok(())
}

#[test]
fn test_crash_point_a_then_resume() -> Result<()> {
    let test = CliTest::with_file("main.go", GO_FIXTURE)?;
    let op_id = apply_replace(&test)?;
    let modified = test.read_file("main.go")?;

    // Killed before any filesystem change: file keeps the modification.
    let output = test
        .command()
        .env("MORFX_CRASH_POINT", "CP-A")
        .args(["rollback", &op_id])
        .output()?;
    assert_eq!(output.status.code(), Some(2));
    assert_eq!(test.read_file("main.go")?, modified);

    // A fresh rollback produces the same state as if no crash occurred.
    let output = test.command().args(["rollback", &op_id]).output()?;
    assert!(output.status.success());
    assert!(stdout_of(&output).contains("reverted 1 operation(s)"));
    assert_eq!(test.read_file("main.go")?, GO_FIXTURE);
    Ok(())
}

#[test]
fn test_crash_point_b_then_resume() -> Result<()> {
    let test = CliTest::with_file("main.go", GO_FIXTURE)?;
    let op_id = apply_replace(&test)?;

    // Killed after the file write but before the journal update: the file
    // is already reverted.
    let output = test
        .command()
        .env("MORFX_CRASH_POINT", "CP-B")
        .args(["rollback", &op_id])
        .output()?;
    assert_eq!(output.status.code(), Some(2));
    assert_eq!(test.read_file("main.go")?, GO_FIXTURE);

    // The next rollback re-writes the same bytes and completes the
    // journal update.
    let output = test.command().args(["rollback", &op_id]).output()?;
    assert!(output.status.success());
    assert!(stdout_of(&output).contains("reverted 1 operation(s)"));
    assert_eq!(test.read_file("main.go")?, GO_FIXTURE);

    // Now fully rolled back: nothing left to do.
    let output = test.command().args(["rollback", &op_id]).output()?;
    assert!(stdout_of(&output).contains("nothing to roll back"));
    Ok(())
}

#[test]
fn test_rollback_with_encryption() -> Result<()> {
    let test = CliTest::with_file("main.go", GO_FIXTURE)?;
    let key = "ab".repeat(32);

    let output = test
        .command()
        .env("MORFX_MASTER_KEY", &key)
        .args([
            "replace",
            "func:Test_A",
            "main.go",
            "--content",
            "func Test_A() {\n\tprintln(\"patched\")\n}",
        ])
        .output()?;
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let op_id = parse_op_id(&stdout_of(&output));

    let output = test
        .command()
        .env("MORFX_MASTER_KEY", &key)
        .args(["rollback", &op_id])
        .output()?;
    assert!(output.status.success());
    assert_eq!(test.read_file("main.go")?, GO_FIXTURE);
    Ok(())
}

#[test]
fn test_rollback_without_key_is_crypto_failure() -> Result<()> {
    let test = CliTest::with_file("main.go", GO_FIXTURE)?;
    let key = "cd".repeat(32);

    let output = test
        .command()
        .env("MORFX_MASTER_KEY", &key)
        .args([
            "replace",
            "func:Test_A",
            "main.go",
            "--content",
            "func Test_A() {\n\tprintln(\"patched\")\n}",
        ])
        .output()?;
    assert!(output.status.success());
    let op_id = parse_op_id(&stdout_of(&output));
    let modified = test.read_file("main.go")?;

    // No key in the environment: the reverse blob cannot be decrypted and
    // the tracked file is not modified.
    let output = test.command().args(["rollback", &op_id]).output()?;
    assert_eq!(output.status.code(), Some(2));
    assert!(
        String::from_utf8_lossy(&output.stderr).contains("crypto failure"),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert_eq!(test.read_file("main.go")?, modified);
    Ok(())
}

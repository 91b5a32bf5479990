use anyhow::Result;

use crate::{CliTest, GO_FIXTURE, PHP_FIXTURE, stdout_of};

#[test]
fn test_replace_rewrites_target() -> Result<()> {
    let test = CliTest::with_file("main.go", GO_FIXTURE)?;
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

    let content = test.read_file("main.go")?;
    assert!(content.contains("patched"));
    assert!(!content.contains("\"helper\""));
    // The rest of the file is untouched.
    assert!(content.contains("func Test_A() {"));
    assert!(content.contains("func other() {"));
    Ok(())
}

#[test]
fn test_replace_php_method_prints_diff_and_confidence() -> Result<()> {
    let test = CliTest::with_file("User.php", PHP_FIXTURE)?;
    let replacement = "public function updateEmail($email) {\n        if (!filter_var($email, FILTER_VALIDATE_EMAIL)) {\n            throw new InvalidArgumentException('bad email');\n        }\n        $this->email = $email;\n    }";
    let output = test
        .command()
        .args([
            "replace",
            "method:updateEmail",
            "User.php",
            "--content",
            replacement,
        ])
        .output()?;
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = stdout_of(&output);
    // One removed line per old body line, one added per new body line.
    assert!(stdout.contains("-        $this->email = $email;"), "{stdout}");
    assert!(stdout.contains("+        if (!filter_var($email, FILTER_VALIDATE_EMAIL)) {"));
    // Public method matched exactly once: unambiguous but exported.
    assert!(stdout.contains("confidence: 0.90"), "{stdout}");
    assert!(stdout.contains("exported API"), "{stdout}");

    let content = test.read_file("User.php")?;
    assert!(content.contains("filter_var"));
    Ok(())
}

#[test]
fn test_delete_removes_target() -> Result<()> {
    let test = CliTest::with_file("main.go", GO_FIXTURE)?;
    let output = test
        .command()
        .args(["delete", "func:Test_A", "main.go"])
        .output()?;
    assert!(output.status.success());

    let content = test.read_file("main.go")?;
    assert!(!content.contains("Test_A"));
    assert!(content.contains("TestHelper"));

    // Destructive verb scores lower.
    let stdout = stdout_of(&output);
    assert!(stdout.contains("destructive"), "{stdout}");
    Ok(())
}

#[test]
fn test_insert_before_preserves_indentation() -> Result<()> {
    let source = "package main\n\nfunc outer() {\n\tx := 1\n\t_ = x\n}\n";
    let test = CliTest::with_file("main.go", source)?;
    let output = test
        .command()
        .args([
            "insert-before",
            "func:outer",
            "main.go",
            "--content",
            "// outer does nothing useful",
        ])
        .output()?;
    assert!(output.status.success());

    let content = test.read_file("main.go")?;
    let lines: Vec<&str> = content.lines().collect();
    let target = lines.iter().position(|l| l.starts_with("func outer")).unwrap();
    assert_eq!(lines[target - 1], "// outer does nothing useful");
    Ok(())
}

#[test]
fn test_dry_run_leaves_file_untouched() -> Result<()> {
    let test = CliTest::with_file("main.go", GO_FIXTURE)?;
    let output = test
        .command()
        .args(["delete", "func:Test_A", "main.go", "--dry-run"])
        .output()?;
    assert!(output.status.success());
    assert!(stdout_of(&output).contains("dry run"));
    assert_eq!(test.read_file("main.go")?, GO_FIXTURE);

    // Nothing was journaled either.
    let history = test.command().args(["history"]).output()?;
    assert!(stdout_of(&history).contains("no runs recorded"));
    Ok(())
}

#[test]
fn test_no_matches_exits_one_without_changes() -> Result<()> {
    let test = CliTest::with_file("main.go", GO_FIXTURE)?;
    let output = test
        .command()
        .args(["delete", "func:DoesNotExist", "main.go"])
        .output()?;
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(test.read_file("main.go")?, GO_FIXTURE);
    Ok(())
}

#[test]
fn test_missing_content_is_an_error() -> Result<()> {
    let test = CliTest::with_file("main.go", GO_FIXTURE)?;
    let output = test
        .command()
        .args(["replace", "func:TestHelper", "main.go"])
        .output()?;
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("--content"));
    Ok(())
}

#[test]
fn test_append_lands_after_last_function() -> Result<()> {
    let test = CliTest::with_file("main.go", GO_FIXTURE)?;
    let output = test
        .command()
        .args([
            "append",
            "func:NoSuchName",
            "main.go",
            "--content",
            "func TestNew() {\n\tprintln(\"new\")\n}",
        ])
        .output()?;
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let content = test.read_file("main.go")?;
    let new_pos = content.find("func TestNew").unwrap();
    let other_pos = content.find("func other").unwrap();
    assert!(new_pos > other_pos, "appended before last function:\n{content}");
    Ok(())
}

#[test]
fn test_invalid_replacement_rejected() -> Result<()> {
    let test = CliTest::with_file("main.go", GO_FIXTURE)?;
    let output = test
        .command()
        .args([
            "replace",
            "func:TestHelper",
            "main.go",
            "--content",
            "func broken(((",
        ])
        .output()?;
    assert_eq!(output.status.code(), Some(2));
    assert_eq!(test.read_file("main.go")?, GO_FIXTURE);
    Ok(())
}

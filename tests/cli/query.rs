use anyhow::Result;
use pretty_assertions::assert_eq;

use crate::{CliTest, GO_FIXTURE, PHP_FIXTURE, stdout_of};

#[test]
fn test_query_lists_matches_with_locations() -> Result<()> {
    let test = CliTest::with_file("main.go", GO_FIXTURE)?;
    let output = test
        .command()
        .args(["query", "func:Test*", "main.go"])
        .output()?;
    assert!(output.status.success());

    let stdout = stdout_of(&output);
    assert_eq!(
        stdout.lines().collect::<Vec<_>>(),
        vec![
            "1. function 'TestHelper' at line 3:1",
            "2. function 'Test_A' at line 7:1",
        ]
    );
    Ok(())
}

#[test]
fn test_query_compound_difference() -> Result<()> {
    let test = CliTest::with_file("main.go", GO_FIXTURE)?;
    let output = test
        .command()
        .args(["query", "func:Test* & !func:TestHelper", "main.go"])
        .output()?;
    assert!(output.status.success());

    let stdout = stdout_of(&output);
    assert!(stdout.contains("'Test_A'"), "{stdout}");
    assert!(!stdout.contains("'TestHelper'"), "{stdout}");
    Ok(())
}

#[test]
fn test_query_word_operators_match_symbols() -> Result<()> {
    let test = CliTest::with_file("main.go", GO_FIXTURE)?;
    let symbols = test
        .command()
        .args(["query", "func:Test* & !func:TestHelper", "main.go"])
        .output()?;
    let words = test
        .command()
        .args(["query", "func:Test* and !func:TestHelper", "main.go"])
        .output()?;
    assert_eq!(stdout_of(&symbols), stdout_of(&words));
    Ok(())
}

#[test]
fn test_query_no_matches_reports_and_succeeds() -> Result<()> {
    let test = CliTest::with_file("main.go", GO_FIXTURE)?;
    let output = test
        .command()
        .args(["query", "func:Nope*", "main.go"])
        .output()?;
    assert!(output.status.success());
    assert!(stdout_of(&output).contains("no matches"));
    Ok(())
}

#[test]
fn test_query_multiple_files_continues_numbering() -> Result<()> {
    let test = CliTest::with_file("a.go", GO_FIXTURE)?;
    test.write_file("b.go", "package main\n\nfunc TestB() {\n}\n")?;
    let output = test
        .command()
        .args(["query", "func:Test*", "a.go", "b.go"])
        .output()?;
    assert!(output.status.success());
    let stdout = stdout_of(&output);
    assert!(stdout.contains("1. function"), "{stdout}");
    assert!(stdout.contains("3. function 'TestB'"), "{stdout}");
    Ok(())
}

#[test]
fn test_query_php_methods() -> Result<()> {
    let test = CliTest::with_file("User.php", PHP_FIXTURE)?;
    let output = test
        .command()
        .args(["query", "method:update*", "User.php"])
        .output()?;
    assert!(output.status.success());
    assert!(stdout_of(&output).contains("method 'updateEmail'"));
    Ok(())
}

#[test]
fn test_query_unknown_language_fails() -> Result<()> {
    let test = CliTest::with_file("main.cob", "IDENTIFICATION DIVISION.")?;
    let output = test
        .command()
        .args(["query", "func:*", "main.cob"])
        .output()?;
    assert_eq!(output.status.code(), Some(2));
    Ok(())
}

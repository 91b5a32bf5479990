use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use assert_cmd::Command;
use tempfile::TempDir;

mod journal;
mod query;
mod rollback;
mod transform;

const BIN_NAME: &str = "morfx";

pub const GO_FIXTURE: &str = "package main\n\nfunc TestHelper() {\n\tprintln(\"helper\")\n}\n\nfunc Test_A() {\n\tprintln(\"a\")\n}\n\nfunc other() {\n\tprintln(\"other\")\n}\n";

pub const PHP_FIXTURE: &str = "<?php\nclass User {\n    private $email;\n    public function updateEmail($email) {\n        $this->email = $email;\n    }\n}\n";

pub struct CliTest {
    _temp_dir: TempDir,
    project_dir: PathBuf,
}

impl CliTest {
    pub fn new() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let project_dir = temp_dir.path().canonicalize()?;
        Ok(Self {
            _temp_dir: temp_dir,
            project_dir,
        })
    }

    pub fn with_file(path: &str, content: &str) -> Result<Self> {
        let test = Self::new()?;
        test.write_file(path, content)?;
        Ok(test)
    }

    pub fn write_file(&self, path: &str, content: &str) -> Result<()> {
        let file_path = self.project_dir.join(path);

        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        fs::write(&file_path, content)
            .with_context(|| format!("Failed to write file: {}", file_path.display()))?;

        Ok(())
    }

    pub fn read_file(&self, path: &str) -> Result<String> {
        let file_path = self.project_dir.join(path);
        fs::read_to_string(&file_path)
            .with_context(|| format!("Failed to read file: {}", file_path.display()))
    }

    pub fn root(&self) -> &Path {
        &self.project_dir
    }

    pub fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin(BIN_NAME).expect("morfx binary");
        cmd.current_dir(&self.project_dir);
        cmd.env_clear();
        cmd.env("NO_COLOR", "1"); // Disable colors for consistent test output
        cmd
    }
}

/// Extract the operation id from transform output
/// (`✓ <path> modified (operation <uuid>)`).
pub fn parse_op_id(stdout: &str) -> String {
    let line = stdout
        .lines()
        .find(|l| l.contains("(operation "))
        .unwrap_or_else(|| panic!("no operation id in output:\n{stdout}"));
    let start = line.find("(operation ").unwrap() + "(operation ".len();
    let end = line[start..].find(')').unwrap() + start;
    line[start..end].to_string()
}

pub fn stdout_of(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

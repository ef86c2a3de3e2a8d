//! Test doubles.

use async_trait::async_trait;
use shipwright_core::CancellationToken;
use shipwright_core::executor::{CommandExecutor, CommandOutput, CommandSpec};

/// Answers the git queries the loader makes.
pub struct FakeGit {
    commit: String,
    branch: String,
    tag_lines: Vec<String>,
    program: String,
}

impl FakeGit {
    pub fn new(commit: &str, branch: &str) -> Self {
        Self {
            commit: commit.to_string(),
            branch: branch.to_string(),
            tag_lines: Vec::new(),
            program: "git".to_string(),
        }
    }

    /// Only answer commands run with `program`.
    pub fn with_program(mut self, program: &str) -> Self {
        self.program = program.to_string();
        self
    }

    /// Add a `for-each-ref` output line, e.g. `tag app/v1.0.0`.
    pub fn with_tag_line(mut self, line: &str) -> Self {
        self.tag_lines.push(line.to_string());
        self
    }
}

#[async_trait]
impl CommandExecutor for FakeGit {
    async fn execute(
        &self,
        spec: CommandSpec,
        _cancel: &CancellationToken,
    ) -> shipwright_core::Result<CommandOutput> {
        if spec.program != self.program {
            return Ok(CommandOutput::failed(127, format!("{}: not found", spec.program)));
        }
        let args: Vec<&str> = spec.args.iter().map(String::as_str).collect();
        let stdout = match args.as_slice() {
            ["rev-parse", "HEAD"] => self.commit.clone(),
            ["rev-parse", "--abbrev-ref", "HEAD"] => self.branch.clone(),
            ["for-each-ref", ..] => self.tag_lines.join("\n"),
            _ => return Ok(CommandOutput::failed(128, format!("unexpected: {}", spec))),
        };
        Ok(CommandOutput {
            exit_code: Some(0),
            stdout,
            stderr: String::new(),
        })
    }
}

/// A project decoded from a single blueprint, with default git and CI state.
pub fn project_from_kdl(source: &str) -> crate::Project {
    use shipwright_config::{apply_default_setters, decode_blueprint, merge_documents, parse_document};

    let mut document = merge_documents(None, Some(parse_document(source).unwrap())).unwrap();
    apply_default_setters(&mut document).unwrap();
    let blueprint = decode_blueprint(&document).unwrap();
    let config = blueprint.project.unwrap();
    crate::Project {
        name: config.name.clone(),
        path: std::path::PathBuf::from("/repo").join(&config.name),
        repo_root: "/repo".into(),
        rel_path: config.name.clone(),
        global: blueprint.global,
        config,
        document,
        build_file: None,
        tag: None,
        git: Default::default(),
        ci: Default::default(),
    }
}

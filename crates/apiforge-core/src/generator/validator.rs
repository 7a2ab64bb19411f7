//! Validation of a generated artifact set.
//!
//! Three checks run in order:
//!
//! 1. Python syntax of every non-empty `.py` artifact. The configured
//!    interpreter compiles every file; when it cannot be launched the
//!    built-in tree-sitter check is used instead.
//! 2. YAML well-formedness of every `.yaml`/`.yml` artifact, all documents.
//! 3. Test discovery: only when 1 and 2 found nothing. The whole set is
//!    written to a temporary tree and the discovery command is run on it.
//!    A non-zero outcome is attributed to the artifacts the output mentions;
//!    anything that cannot be attributed goes under [`COLLECT_SENTINEL`].
//!
//! Validation never fails. Every problem, including a broken runner, ends
//! up as a diagnostic or as a logged skip.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tree_sitter::{Node, Parser};

use crate::artifacts::{
    is_safe_relative_path, ArtifactKind, ArtifactSet, ValidationReport, COLLECT_SENTINEL,
};
use crate::config::ValidationConfig;

/// pytest exit status for "no tests collected"
const NO_TESTS_COLLECTED: i32 = 5;

/// Output markers meaning the test framework itself is not installed
const RUNNER_MISSING_MARKERS: &[&str] = &[
    "No module named pytest",
    "No module named 'pytest'",
    "pytest: command not found",
];

const OUTPUT_TAIL_CHARS: usize = 500;
const MAX_ATTRIBUTED_LINES: usize = 20;
const MAX_MENTION_LINES: usize = 5;

/// Reads `{path: source}` JSON on stdin, writes `{path: diagnostic}` JSON
const COMPILE_SCRIPT: &str = r#"import json, sys
report = {}
for path, source in json.load(sys.stdin).items():
    try:
        compile(source, path, "exec", dont_inherit=True)
    except SyntaxError as e:
        report[path] = "%s: %s (line %s)" % (type(e).__name__, e.msg, e.lineno)
    except ValueError as e:
        report[path] = "ValueError: %s" % e
json.dump(report, sys.stdout)
"#;

/// Something that can judge an artifact set
#[async_trait]
pub trait ArtifactValidator: Send + Sync {
    /// Empty report means the set is acceptable
    async fn validate(&self, artifacts: &ArtifactSet) -> ValidationReport;
}

/// Syntax error of a Python source, as `SyntaxError: ... (line N)`.
///
/// Grammar check without an interpreter. On top of tree-sitter's parse
/// errors it rejects what the tree-sitter grammar accepts but CPython does
/// not: empty suites, Python 2 `print`/`exec` statements, `return` outside
/// a function and duplicate parameter names.
pub fn python_syntax_error(source: &str) -> Option<String> {
    let mut parser = Parser::new();
    if let Err(e) = parser.set_language(&tree_sitter_python::LANGUAGE.into()) {
        log::error!("Python grammar could not be loaded: {}", e);
        return Some(format!("SyntaxCheckError: grammar unavailable: {}", e));
    }

    let Some(tree) = parser.parse(source, None) else {
        return Some("SyntaxError: source could not be parsed (line 1)".to_string());
    };

    let root = tree.root_node();
    if !root.has_error() {
        return first_rule_violation(root, source);
    }

    let node = first_error_node(root).unwrap_or(root);
    let line = node.start_position().row + 1;
    if node.is_missing() {
        return Some(format!("SyntaxError: missing '{}' (line {})", node.kind(), line));
    }

    let snippet: String = source
        .get(node.byte_range())
        .and_then(|text| text.lines().next())
        .unwrap_or_default()
        .trim()
        .chars()
        .take(40)
        .collect();
    if snippet.is_empty() {
        Some(format!("SyntaxError: invalid syntax (line {})", line))
    } else {
        Some(format!(
            "SyntaxError: invalid syntax near '{}' (line {})",
            snippet, line
        ))
    }
}

/// First `ERROR` or missing node in document order
fn first_error_node(root: Node<'_>) -> Option<Node<'_>> {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_error() || node.is_missing() {
            return Some(node);
        }
        if !node.has_error() {
            continue;
        }
        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }
    None
}

/// First construct in document order that parses but does not compile
fn first_rule_violation(root: Node<'_>, source: &str) -> Option<String> {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if let Some(message) = rule_violation(node, source) {
            return Some(format!("{} (line {})", message, node.start_position().row + 1));
        }
        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }
    None
}

fn rule_violation(node: Node<'_>, source: &str) -> Option<String> {
    match node.kind() {
        "print_statement" => Some("SyntaxError: Python 2 print statement".to_string()),
        "exec_statement" => Some("SyntaxError: Python 2 exec statement".to_string()),
        "block" if is_empty_block(node) => {
            Some("IndentationError: expected an indented block".to_string())
        }
        "return_statement" if !inside_function(node) => {
            Some("SyntaxError: 'return' outside function".to_string())
        }
        "parameters" | "lambda_parameters" => duplicate_parameter(node, source).map(|name| {
            format!(
                "SyntaxError: duplicate argument '{}' in function definition",
                name
            )
        }),
        _ => None,
    }
}

/// A suite holding nothing but comments; tree-sitter accepts a bare newline
fn is_empty_block(block: Node<'_>) -> bool {
    let mut cursor = block.walk();
    let empty = block
        .named_children(&mut cursor)
        .all(|child| child.kind() == "comment");
    empty
}

fn inside_function(node: Node<'_>) -> bool {
    let mut current = node.parent();
    while let Some(parent) = current {
        match parent.kind() {
            "function_definition" => return true,
            "class_definition" => return false,
            _ => current = parent.parent(),
        }
    }
    false
}

fn duplicate_parameter<'s>(parameters: Node<'_>, source: &'s str) -> Option<&'s str> {
    let mut seen = HashSet::new();
    let mut cursor = parameters.walk();
    let names: Vec<Node<'_>> = parameters
        .named_children(&mut cursor)
        .filter_map(parameter_name)
        .collect();
    names
        .into_iter()
        .filter_map(|name| source.get(name.byte_range()))
        .find(|name| !seen.insert(*name))
}

fn parameter_name(parameter: Node<'_>) -> Option<Node<'_>> {
    match parameter.kind() {
        "identifier" => Some(parameter),
        "default_parameter" | "typed_default_parameter" => {
            parameter.child_by_field_name("name")
        }
        "typed_parameter" | "list_splat_pattern" | "dictionary_splat_pattern" => {
            let mut cursor = parameter.walk();
            let first = parameter.named_children(&mut cursor).next();
            first.and_then(parameter_name)
        }
        _ => None,
    }
}

/// Parse error of a YAML file, checking every document
pub fn yaml_error(content: &str) -> Option<String> {
    if content.trim().is_empty() {
        return None;
    }
    for document in serde_yaml::Deserializer::from_str(content) {
        if let Err(e) = serde_yaml::Value::deserialize(document) {
            return Some(format!("YAMLError: {}", e));
        }
    }
    None
}

/// Syntax check of every non-empty Python artifact
pub fn check_python(artifacts: &ArtifactSet) -> ValidationReport {
    artifacts
        .iter()
        .filter(|(path, content)| is_python_source(path, content))
        .filter_map(|(path, content)| python_syntax_error(content).map(|e| (path, e)))
        .collect()
}

fn is_python_source(path: &str, content: &str) -> bool {
    ArtifactKind::of(path) == ArtifactKind::Code && !content.trim().is_empty()
}

/// Parse check of every YAML artifact
pub fn check_yaml(artifacts: &ArtifactSet) -> ValidationReport {
    artifacts
        .iter()
        .filter(|(path, _)| ArtifactKind::of(path) == ArtifactKind::Data)
        .filter_map(|(path, content)| yaml_error(content).map(|e| (path, e)))
        .collect()
}

/// Compiles Python artifacts with a real interpreter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PythonCompileCheck {
    command: Vec<String>,
    timeout: Duration,
}

impl PythonCompileCheck {
    /// `command` is the interpreter, e.g. `["python3"]`
    pub fn new(command: Vec<String>, timeout: Duration) -> Self {
        Self { command, timeout }
    }

    /// Compile every non-empty Python artifact in one interpreter run.
    ///
    /// Returns `None` when the interpreter cannot be used, so the caller can
    /// fall back to [`check_python`].
    pub async fn run(&self, artifacts: &ArtifactSet) -> Option<ValidationReport> {
        let sources: BTreeMap<&str, &str> = artifacts
            .iter()
            .filter(|(path, content)| is_python_source(path, content))
            .collect();
        if sources.is_empty() {
            return Some(ValidationReport::new());
        }

        let Some((program, args)) = self.command.split_first() else {
            return None;
        };
        let input = match serde_json::to_vec(&sources) {
            Ok(input) => input,
            Err(e) => {
                log::warn!("Could not encode sources for '{}': {}", program, e);
                return None;
            }
        };

        let mut child = match tokio::process::Command::new(program)
            .args(args)
            .arg("-c")
            .arg(COMPILE_SCRIPT)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                log::warn!(
                    "Could not launch '{}' ({}), using the built-in Python grammar check",
                    program,
                    e
                );
                return None;
            }
        };
        let mut stdin = child.stdin.take()?;

        let compiled = tokio::time::timeout(self.timeout, async move {
            stdin.write_all(&input).await?;
            drop(stdin);
            child.wait_with_output().await
        })
        .await;

        let output = match compiled {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                log::warn!("Python compile check failed to run: {}", e);
                return None;
            }
            Err(_) => {
                log::warn!("Python compile check timed out after {:?}", self.timeout);
                return None;
            }
        };
        if !output.status.success() {
            log::warn!(
                "Python compile check exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return None;
        }

        match serde_json::from_slice::<BTreeMap<String, String>>(&output.stdout) {
            Ok(errors) => Some(errors.into_iter().collect()),
            Err(e) => {
                log::warn!("Unreadable Python compile check output: {}", e);
                None
            }
        }
    }
}

/// Runs a test-discovery command over a materialized copy of the artifacts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryCheck {
    command: Vec<String>,
    timeout: Duration,
}

impl DiscoveryCheck {
    /// `command` gets the project directory appended as its last argument
    pub fn new(command: Vec<String>, timeout: Duration) -> Self {
        Self { command, timeout }
    }

    pub async fn run(&self, artifacts: &ArtifactSet) -> ValidationReport {
        let mut report = ValidationReport::new();

        if !artifacts
            .iter()
            .any(|(path, content)| is_python_source(path, content))
        {
            return report;
        }

        let Some((program, args)) = self.command.split_first() else {
            log::warn!("Discovery command is empty, skipping test discovery");
            return report;
        };

        let dir = match tempfile::tempdir() {
            Ok(dir) => dir,
            Err(e) => {
                report.insert(
                    COLLECT_SENTINEL,
                    format!("Failed to create a temporary project tree: {}", e),
                );
                return report;
            }
        };

        materialize(artifacts, dir.path(), &mut report).await;
        if !report.is_empty() {
            return report;
        }

        log::debug!(
            "Running test discovery: {} in {}",
            self.command.join(" "),
            dir.path().display()
        );
        let mut command = tokio::process::Command::new(program);
        command
            .args(args)
            .arg(dir.path())
            .current_dir(dir.path())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                log::warn!("Could not launch '{}' ({}), skipping test discovery", program, e);
                return report;
            }
            Err(_) => {
                report.insert(
                    COLLECT_SENTINEL,
                    format!("Test discovery timed out after {:?}", self.timeout),
                );
                return report;
            }
        };

        let status = output.status.code();
        if output.status.success() || status == Some(NO_TESTS_COLLECTED) {
            return report;
        }

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&stderr);
        }

        if RUNNER_MISSING_MARKERS.iter().any(|m| text.contains(m)) {
            log::warn!("Test runner is not installed, skipping test discovery");
            return report;
        }

        let status_text = status
            .map(|c| format!("exit status {}", c))
            .unwrap_or_else(|| "terminated by signal".to_string());
        attribute(&text, &status_text, artifacts)
    }
}

/// Write every artifact under `root`; problems become diagnostics
async fn materialize(artifacts: &ArtifactSet, root: &Path, report: &mut ValidationReport) {
    for (path, content) in artifacts.iter() {
        if !is_safe_relative_path(path) {
            report.insert(path, "Artifact path escapes the project tree");
            continue;
        }
        let target = root.join(path);
        if let Some(parent) = target.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                report.insert(path, format!("Failed to materialize: {}", e));
                continue;
            }
        }
        if let Err(e) = tokio::fs::write(&target, content).await {
            report.insert(path, format!("Failed to materialize: {}", e));
        }
    }
}

/// Split discovery output into per-artifact diagnostics
fn attribute(output: &str, status: &str, artifacts: &ArtifactSet) -> ValidationReport {
    let lines: Vec<&str> = output.lines().collect();
    let mut report = ValidationReport::new();

    for path in artifacts.paths() {
        if !output.contains(path) {
            continue;
        }
        let mut diagnostic = collection_block(&lines, path);
        if diagnostic.is_empty() {
            diagnostic = lines
                .iter()
                .filter(|l| l.contains(path) || l.contains("Error") || l.contains("ERROR"))
                .take(MAX_MENTION_LINES)
                .copied()
                .collect();
        }
        report.insert(path, diagnostic.join("\n"));
    }

    if report.is_empty() {
        let trimmed = output.trim();
        let tail = if trimmed.is_empty() {
            format!("Test discovery failed with {} and no output", status)
        } else {
            tail_chars(trimmed, OUTPUT_TAIL_CHARS).to_string()
        };
        report.insert(COLLECT_SENTINEL, tail);
    }
    report
}

/// Lines of pytest's `ERROR collecting <path>` block, header included
fn collection_block<'a>(lines: &[&'a str], path: &str) -> Vec<&'a str> {
    let Some(start) = lines
        .iter()
        .position(|l| l.contains("ERROR collecting") && l.contains(path))
    else {
        return Vec::new();
    };

    let mut block = vec![lines[start].trim_matches(|c| c == '_' || c == ' ')];
    block.extend(
        lines[start + 1..]
            .iter()
            .take_while(|l| !l.starts_with("___") && !l.starts_with("==="))
            .take(MAX_ATTRIBUTED_LINES)
            .copied(),
    );
    block
}

fn tail_chars(text: &str, n: usize) -> &str {
    let count = text.chars().count();
    if count <= n {
        return text;
    }
    let skip = count - n;
    let start = text.char_indices().nth(skip).map(|(i, _)| i).unwrap_or(0);
    &text[start..]
}

/// Syntax, data and discovery checks composed
#[derive(Debug, Clone)]
pub struct Validator {
    compiler: Option<PythonCompileCheck>,
    discovery: Option<DiscoveryCheck>,
}

impl Validator {
    /// Built-in Python grammar check, YAML check and optional discovery
    pub fn new(discovery: Option<DiscoveryCheck>) -> Self {
        Self {
            compiler: None,
            discovery,
        }
    }

    /// Built-in static checks only
    pub fn syntax_only() -> Self {
        Self::new(None)
    }

    /// Compile Python with an interpreter instead of the built-in check
    pub fn with_compiler(mut self, compiler: PythonCompileCheck) -> Self {
        self.compiler = Some(compiler);
        self
    }

    pub fn from_config(config: &ValidationConfig) -> Self {
        let discovery = config
            .discovery_enabled
            .then(|| DiscoveryCheck::new(config.discovery.clone(), config.discovery_timeout()));
        let validator = Self::new(discovery);
        if config.python.is_empty() {
            validator
        } else {
            validator.with_compiler(PythonCompileCheck::new(
                config.python.clone(),
                config.discovery_timeout(),
            ))
        }
    }

    async fn python_report(&self, artifacts: &ArtifactSet) -> ValidationReport {
        if let Some(compiler) = &self.compiler {
            if let Some(report) = compiler.run(artifacts).await {
                return report;
            }
        }
        check_python(artifacts)
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::from_config(&ValidationConfig::default())
    }
}

#[async_trait]
impl ArtifactValidator for Validator {
    async fn validate(&self, artifacts: &ArtifactSet) -> ValidationReport {
        let mut report = self.python_report(artifacts).await;
        report.merge(check_yaml(artifacts));

        if report.is_empty() {
            if let Some(discovery) = &self.discovery {
                report = discovery.run(artifacts).await;
            }
        }

        log::info!(
            "Validated {} artifacts: {} with problems",
            artifacts.len(),
            report.len()
        );
        report
    }
}

/// Validate with the default checks
pub async fn validate_files(artifacts: &ArtifactSet) -> ValidationReport {
    Validator::default().validate(artifacts).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(files: &[(&str, &str)]) -> ArtifactSet {
        files.iter().copied().collect()
    }

    fn sh(script: &str) -> DiscoveryCheck {
        DiscoveryCheck::new(
            vec!["sh".into(), "-c".into(), script.into()],
            Duration::from_secs(10),
        )
    }

    #[tokio::test]
    async fn test_syntax_error_is_reported_with_line() {
        let report = Validator::syntax_only()
            .validate(&set(&[("x.py", "def f(:\n")]))
            .await;
        let diagnostic = report.get("x.py").unwrap();
        assert!(diagnostic.starts_with("SyntaxError"), "{}", diagnostic);
        assert!(diagnostic.contains("(line 1)"), "{}", diagnostic);
    }

    #[tokio::test]
    async fn test_valid_python_passes() {
        let report = Validator::syntax_only()
            .validate(&set(&[("x.py", "x = 1\n")]))
            .await;
        assert!(report.is_empty());
    }

    #[test]
    fn test_multiline_sources() {
        let good = "import os\n\n\nclass A:\n    def f(self):\n        return os.sep\n";
        assert_eq!(python_syntax_error(good), None);

        let bad = "import os\n\n\nclass A:\n    def f(self:\n        pass\n";
        let diagnostic = python_syntax_error(bad).unwrap();
        assert!(diagnostic.starts_with("SyntaxError"), "{}", diagnostic);
        assert!(diagnostic.contains("(line "), "{}", diagnostic);
    }

    #[test]
    fn test_missing_indented_block() {
        let diagnostic = python_syntax_error("def f():\nreturn 1\n").unwrap();
        assert!(diagnostic.starts_with("IndentationError"), "{}", diagnostic);

        let comment_only = "class A:\n    # nothing yet\n\nx = 1\n";
        assert!(python_syntax_error(comment_only).is_some());
    }

    #[test]
    fn test_python2_statements_are_rejected() {
        let diagnostic = python_syntax_error("print 'hi'\n").unwrap();
        assert!(diagnostic.contains("print statement"), "{}", diagnostic);
        let diagnostic = python_syntax_error("exec 'x = 1'\n").unwrap();
        assert!(diagnostic.contains("exec statement"), "{}", diagnostic);

        assert_eq!(python_syntax_error("print('hi')\nexec('x = 1')\n"), None);
    }

    #[test]
    fn test_return_outside_function() {
        let diagnostic = python_syntax_error("x = 1\nreturn 5\n").unwrap();
        assert!(diagnostic.contains("'return' outside function"), "{}", diagnostic);
        assert!(diagnostic.contains("(line 2)"), "{}", diagnostic);

        let in_class = "class A:\n    return 1\n";
        assert!(python_syntax_error(in_class).is_some());

        let in_method = "class A:\n    def f(self):\n        if self:\n            return 1\n";
        assert_eq!(python_syntax_error(in_method), None);
    }

    #[test]
    fn test_duplicate_parameters() {
        let diagnostic = python_syntax_error("def f(a, a): pass\n").unwrap();
        assert!(diagnostic.contains("duplicate argument 'a'"), "{}", diagnostic);
        assert!(python_syntax_error("def f(a, *, b=1, **a): pass\n").is_some());
        assert!(python_syntax_error("g = lambda x, x: x\n").is_some());

        let distinct = "def f(self, a: int, b=2, *args, c: str = '', **kwargs):\n    pass\n";
        assert_eq!(python_syntax_error(distinct), None);
    }

    fn interpreter(script: &str) -> PythonCompileCheck {
        PythonCompileCheck::new(
            vec!["sh".into(), "-c".into(), script.into(), "sh".into()],
            Duration::from_secs(10),
        )
    }

    #[tokio::test]
    async fn test_compiler_report_is_read_from_stdout() {
        let check = interpreter(
            r#"cat > /dev/null; echo '{"api/users_api.py": "SyntaxError: bad (line 3)"}'"#,
        );
        let report = check
            .run(&set(&[("api/users_api.py", "x = (\n"), ("data/users.yaml", "a: 1\n")]))
            .await
            .unwrap();
        assert_eq!(report.get("api/users_api.py"), Some("SyntaxError: bad (line 3)"));
        assert_eq!(report.len(), 1);
    }

    #[tokio::test]
    async fn test_compiler_without_python_sources_does_not_run() {
        let check = interpreter("exit 1");
        let report = check.run(&set(&[("data/users.yaml", "a: 1\n")])).await;
        assert_eq!(report, Some(ValidationReport::new()));
    }

    #[tokio::test]
    async fn test_unusable_interpreter_falls_back_to_grammar_check() {
        let missing = PythonCompileCheck::new(
            vec!["apiforge-no-such-python".into()],
            Duration::from_secs(5),
        );
        let files = set(&[("x.py", "print 'hi'\n")]);
        assert_eq!(missing.run(&files).await, None);
        assert_eq!(interpreter("cat > /dev/null; exit 2").run(&files).await, None);
        assert_eq!(interpreter("cat > /dev/null; echo oops").run(&files).await, None);

        let report = Validator::syntax_only()
            .with_compiler(missing)
            .validate(&files)
            .await;
        assert!(report.get("x.py").unwrap().contains("print statement"));
    }

    #[tokio::test]
    async fn test_python3_rejects_what_the_grammar_accepts() {
        let available = std::process::Command::new("python3")
            .arg("--version")
            .output()
            .map(|output| output.status.success())
            .unwrap_or(false);
        if !available {
            return;
        }

        let check = PythonCompileCheck::new(vec!["python3".into()], Duration::from_secs(30));
        let report = check
            .run(&set(&[
                ("indent.py", "def f():\nreturn 1\n"),
                ("print.py", "print 'hi'\n"),
                ("exec.py", "exec 'x = 1'\n"),
                ("outside.py", "return 5\n"),
                ("dup.py", "def f(a, a): pass\n"),
                ("genexp.py", "f(x for x in y, 1)\n"),
                ("ok.py", "def f(a, b=1):\n    return [x for x in (a, b)]\n"),
            ]))
            .await
            .unwrap();

        assert_eq!(report.len(), 6, "{:?}", report);
        assert!(!report.contains("ok.py"));
        assert!(report.get("indent.py").unwrap().starts_with("IndentationError"));
        assert!(report.get("outside.py").unwrap().contains("(line 1)"));
    }

    #[test]
    fn test_empty_python_is_skipped() {
        let report = check_python(&set(&[("api/__init__.py", ""), ("a.py", "  \n")]));
        assert!(report.is_empty());
    }

    #[test]
    fn test_yaml_errors() {
        assert!(yaml_error("create_user:\n  ok:\n    status: 201\n").is_none());
        assert!(yaml_error("a: 1\n---\nb: 2\n").is_none());
        assert!(yaml_error("").is_none());

        let diagnostic = yaml_error("key: [unclosed\n").unwrap();
        assert!(diagnostic.starts_with("YAMLError"));
        assert!(yaml_error("a: 1\n---\nb: [\n").is_some());
    }

    #[tokio::test]
    async fn test_static_failures_skip_discovery() {
        let validator = Validator::new(Some(sh("echo should-not-run; exit 1")));
        let report = validator
            .validate(&set(&[("bad.py", "def f(:\n"), ("tests/test_a.py", "x = 1\n")]))
            .await;
        assert_eq!(report.paths().collect::<Vec<_>>(), vec!["bad.py"]);
    }

    #[tokio::test]
    async fn test_no_tests_collected_is_success() {
        let validator = Validator::new(Some(sh("exit 5")));
        let report = validator.validate(&set(&[("x.py", "x = 1\n")])).await;
        assert!(report.is_empty());
    }

    #[tokio::test]
    async fn test_discovery_sees_materialized_tree() {
        let check = sh(r#"test -f "$0/tests/conftest.py" && test -f "$0/api/users_api.py""#);
        let report = check
            .run(&set(&[
                ("tests/conftest.py", "import pytest\n"),
                ("api/users_api.py", "class UsersApi: ...\n"),
            ]))
            .await;
        assert!(report.is_empty(), "{:?}", report);
    }

    #[tokio::test]
    async fn test_discovery_failure_is_attributed_to_mentioned_file() {
        let check = sh(
            "echo '___ ERROR collecting tests/test_users.py ___'; \
             echo \"E   ModuleNotFoundError: No module named 'api.user_api'\"; \
             echo '=== short test summary info ==='; exit 2",
        );
        let report = check
            .run(&set(&[
                ("tests/test_users.py", "from api.user_api import UsersApi\n"),
                ("api/users_api.py", "class UsersApi: ...\n"),
            ]))
            .await;

        assert_eq!(report.paths().collect::<Vec<_>>(), vec!["tests/test_users.py"]);
        let diagnostic = report.get("tests/test_users.py").unwrap();
        assert!(diagnostic.contains("ModuleNotFoundError"), "{}", diagnostic);
        assert!(!diagnostic.contains("short test summary"));
    }

    #[tokio::test]
    async fn test_unattributed_failure_goes_to_sentinel() {
        let check = sh("echo 'internal error' >&2; exit 3");
        let report = check.run(&set(&[("tests/test_a.py", "x = 1\n")])).await;
        assert_eq!(report.get(COLLECT_SENTINEL), Some("internal error"));

        let silent = sh("exit 4").run(&set(&[("tests/test_a.py", "x = 1\n")])).await;
        assert!(silent.get(COLLECT_SENTINEL).unwrap().contains("exit status 4"));
    }

    #[tokio::test]
    async fn test_missing_runner_is_skipped() {
        let missing = DiscoveryCheck::new(
            vec!["apiforge-no-such-runner".into()],
            Duration::from_secs(5),
        );
        assert!(missing.run(&set(&[("x.py", "x = 1\n")])).await.is_empty());

        let no_pytest = sh("echo 'python: No module named pytest' >&2; exit 1");
        assert!(no_pytest.run(&set(&[("x.py", "x = 1\n")])).await.is_empty());
    }

    #[tokio::test]
    async fn test_discovery_timeout_is_a_diagnostic() {
        let check = DiscoveryCheck::new(
            vec!["sh".into(), "-c".into(), "sleep 5".into()],
            Duration::from_millis(200),
        );
        let report = check.run(&set(&[("x.py", "x = 1\n")])).await;
        assert!(report.get(COLLECT_SENTINEL).unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_unsafe_paths_are_reported() {
        let report = sh("exit 0")
            .run(&set(&[("../escape.py", "x = 1\n")]))
            .await;
        assert!(report.contains("../escape.py"));
    }

    #[test]
    fn test_tail_chars_respects_char_boundaries() {
        assert_eq!(tail_chars("héllo", 3), "llo");
        assert_eq!(tail_chars("abc", 10), "abc");
    }
}

use std::fs;
#[cfg(unix)]
use std::{os::unix::fs::PermissionsExt, path::PathBuf};

use assert_cmd::Command;
use predicates::str::contains;
use tempfile::TempDir;

const CIRCLE: &str = r"\draw (0,0) circle (1);";

fn tikzmagic(cwd: &TempDir) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("tikzmagic"));
    cmd.current_dir(cwd.path())
        .env_remove("RUST_LOG")
        .env_remove("TIKZMAGIC_CONFIG_FILE");
    cmd
}

#[cfg(unix)]
struct FakeTools {
    dir: TempDir,
    work: TempDir,
}

#[cfg(unix)]
impl FakeTools {
    const LATEX: &'static str = r#"#!/bin/sh
base=$(basename "$3" .tex)
printf '%s' '%PDF-1.5 fake' > "$2/$base.pdf"
"#;

    const CONVERT: &'static str = r#"#!/bin/sh
printf 'png@%s' "$2" > "$4"
"#;

    fn new() -> Self {
        Self::with_latex(Self::LATEX)
    }

    fn with_latex(latex: &str) -> Self {
        let tools = Self {
            dir: TempDir::new().expect("tools dir"),
            work: TempDir::new().expect("work dir"),
        };
        tools.write("fake-latex", latex);
        tools.write("fake-convert", Self::CONVERT);
        tools
    }

    fn write(&self, name: &str, body: &str) {
        let path = self.dir.path().join(name);
        fs::write(&path, body).expect("write script");
        let mut perms = fs::metadata(&path).expect("metadata").permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).expect("set perms");
    }

    fn latex(&self) -> PathBuf {
        self.dir.path().join("fake-latex")
    }

    fn convert(&self) -> PathBuf {
        self.dir.path().join("fake-convert")
    }

    fn apply(&self, cmd: &mut Command) {
        cmd.arg("--latex-program")
            .arg(self.latex())
            .arg("--convert-program")
            .arg(self.convert())
            .arg("--work-dir")
            .arg(self.work.path());
    }

    fn work_dir_is_empty(&self) -> bool {
        fs::read_dir(self.work.path())
            .expect("read work dir")
            .next()
            .is_none()
    }
}

#[test]
fn template_prints_assembled_document() {
    let cwd = TempDir::new().expect("cwd");
    let assert = tikzmagic(&cwd)
        .arg("template")
        .write_stdin(CIRCLE)
        .assert()
        .success();

    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).into_owned();
    assert_eq!(
        stdout,
        "\n\\documentclass[tikz,border=4]{standalone}\n\\usepackage{tikz,}\n\\usetikzlibrary{}\n\n\\begin{document}\n\\begin{tikzpicture}\\draw (0,0) circle (1);\\end{tikzpicture}\n\\end{document}\n"
    );
}

#[test]
fn template_with_no_wrap_keeps_raw_body() {
    let cwd = TempDir::new().expect("cwd");
    tikzmagic(&cwd)
        .args(["template", "--no-wrap", "-l", "calc"])
        .write_stdin(CIRCLE)
        .assert()
        .success()
        .stdout(contains(format!("\\begin{{document}}\n{CIRCLE}\n\\end{{document}}")))
        .stdout(contains(r"\usetikzlibrary{calc}"));
}

#[test]
fn missing_input_file_fails_before_rendering() {
    let cwd = TempDir::new().expect("cwd");
    tikzmagic(&cwd)
        .args(["render", "-i", "nope.tex", "--latex-program", "/nonexistent/latex"])
        .write_stdin("")
        .assert()
        .failure()
        .stderr(contains("does not exist"));
}

#[cfg(unix)]
#[test]
fn missing_input_file_creates_no_workspace() {
    let cwd = TempDir::new().expect("cwd");
    let tools = FakeTools::new();

    let mut cmd = tikzmagic(&cwd);
    cmd.args(["render", "-i", "nope.tex"]);
    tools.apply(&mut cmd);
    cmd.write_stdin(CIRCLE)
        .assert()
        .failure()
        .stderr(contains("does not exist"));

    assert!(tools.work_dir_is_empty(), "workspace created before validation");
}

#[test]
fn invalid_magic_line_is_rejected() {
    let cwd = TempDir::new().expect("cwd");
    tikzmagic(&cwd)
        .args(["magic", "--line", "-s 'unterminated"])
        .write_stdin(CIRCLE)
        .assert()
        .failure()
        .stderr(contains("unbalanced quotes"));
}

#[cfg(unix)]
#[test]
fn render_writes_png_to_stdout() {
    let cwd = TempDir::new().expect("cwd");
    let tools = FakeTools::new();

    let mut cmd = tikzmagic(&cwd);
    cmd.args(["render", "-s", "2"]);
    tools.apply(&mut cmd);
    let assert = cmd.write_stdin(CIRCLE).assert().success();

    assert_eq!(assert.get_output().stdout, b"png@600");
    assert!(tools.work_dir_is_empty(), "workspace left behind");
}

#[cfg(unix)]
#[test]
fn render_reads_cell_file_and_exports_pdf() {
    let cwd = TempDir::new().expect("cwd");
    let tools = FakeTools::new();
    fs::write(cwd.path().join("cell.tex"), CIRCLE).expect("write cell");

    let mut cmd = tikzmagic(&cwd);
    cmd.args([
        "render",
        "--cell",
        "cell.tex",
        "--output",
        "figure.png",
        "-e",
        "figure.pdf",
    ]);
    tools.apply(&mut cmd);
    cmd.assert().success();

    assert_eq!(
        fs::read(cwd.path().join("figure.png")).expect("png"),
        b"png@300"
    );
    assert_eq!(
        fs::read(cwd.path().join("figure.pdf")).expect("pdf"),
        b"%PDF-1.5 fake"
    );
}

#[cfg(unix)]
#[test]
fn magic_line_emits_display_data_with_env_configured_tools() {
    use base64::{Engine as _, engine::general_purpose::STANDARD};

    let cwd = TempDir::new().expect("cwd");
    let tools = FakeTools::new();

    let assert = tikzmagic(&cwd)
        .env("TIKZMAGIC__TOOLCHAIN__LATEX_PROGRAM", tools.latex())
        .env("TIKZMAGIC__TOOLCHAIN__CONVERT_PROGRAM", tools.convert())
        .env("TIKZMAGIC__TOOLCHAIN__WORK_DIR", tools.work.path())
        .args(["magic", "--line", "--no-wrap -s 1.5", "--format", "display-data"])
        .write_stdin(CIRCLE)
        .assert()
        .success();

    let json: serde_json::Value =
        serde_json::from_slice(&assert.get_output().stdout).expect("display data json");
    let encoded = json["data"]["image/png"].as_str().expect("base64 payload");
    assert_eq!(STANDARD.decode(encoded).expect("valid base64"), b"png@450");
    assert!(tools.work_dir_is_empty());
}

#[cfg(unix)]
#[test]
fn compilation_failure_is_reported_and_cleaned_up() {
    let cwd = TempDir::new().expect("cwd");
    let tools = FakeTools::with_latex("#!/bin/sh\necho '! Undefined control sequence.'\nexit 1\n");

    let mut cmd = tikzmagic(&cwd);
    cmd.arg("render");
    tools.apply(&mut cmd);
    cmd.write_stdin(r"\undefined")
        .assert()
        .failure()
        .stderr(contains("didn't produce a PDF"));

    assert!(tools.work_dir_is_empty(), "workspace left behind");
}

#[cfg(unix)]
#[test]
fn strict_exit_status_rejects_unsuccessful_compiler() {
    let cwd = TempDir::new().expect("cwd");
    let tools = FakeTools::with_latex(&format!("{}exit 1\n", FakeTools::LATEX));

    let mut lenient = tikzmagic(&cwd);
    lenient.arg("render");
    tools.apply(&mut lenient);
    lenient.write_stdin(CIRCLE).assert().success();

    let mut strict = tikzmagic(&cwd);
    strict.args(["render", "--strict-exit-status", "true"]);
    tools.apply(&mut strict);
    strict
        .write_stdin(CIRCLE)
        .assert()
        .failure()
        .stderr(contains("failed with exit code 1"));
}

#[cfg(unix)]
#[test]
fn debug_echoes_document_and_commands() {
    let cwd = TempDir::new().expect("cwd");
    let tools = FakeTools::new();

    let mut cmd = tikzmagic(&cwd);
    cmd.args(["render", "--debug"]);
    tools.apply(&mut cmd);
    cmd.write_stdin(CIRCLE)
        .assert()
        .success()
        .stderr(contains(r"\documentclass[tikz,border=4]{standalone}"))
        .stderr(contains("-output-directory"))
        .stderr(contains("-density 300"));
}

//! CLI argument parsing and end-to-end command tests

use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;

fn vedit() -> Command {
    Command::cargo_bin("vedit").unwrap()
}

const PAGE: &str = r#"<html><body>
    <div class="toolbar"><button class="open">Open</button><button class="save">Save</button></div>
    <p id="intro">Hello</p>
</body></html>"#;

fn page_file(dir: &tempfile::TempDir) -> std::path::PathBuf {
    let path = dir.path().join("page.html");
    fs::write(&path, PAGE).unwrap();
    path
}

mod help {
    use super::*;

    #[test]
    fn shows_help() {
        vedit()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("vedit"))
            .stdout(predicate::str::contains("point-and-click"));
    }

    #[test]
    fn shows_version() {
        vedit()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("vedit"));
    }

    #[test]
    fn requires_a_subcommand() {
        vedit().assert().failure();
    }
}

mod inspect {
    use super::*;

    #[test]
    fn lists_addressable_elements() {
        let dir = tempfile::tempdir().unwrap();
        vedit()
            .arg("inspect")
            .arg(page_file(&dir))
            .assert()
            .success()
            .stdout(predicate::str::contains("/html/body"))
            .stdout(predicate::str::contains("/button[2]"))
            .stdout(predicate::str::contains("//*[@id=\"intro\"]"));
    }

    #[test]
    fn json_output_wraps_elements() {
        let dir = tempfile::tempdir().unwrap();
        vedit()
            .arg("inspect")
            .arg(page_file(&dir))
            .arg("--json")
            .assert()
            .success()
            .stdout(predicate::str::contains("\"elements\""))
            .stdout(predicate::str::contains("\"tag\": \"button\""));
    }

    #[test]
    fn fails_on_missing_file() {
        vedit().arg("inspect").arg("no-such-file.html").assert().failure();
    }
}

mod resolve {
    use super::*;

    #[test]
    fn resolves_an_id_address() {
        let dir = tempfile::tempdir().unwrap();
        vedit()
            .arg("resolve")
            .arg(page_file(&dir))
            .arg("//*[@id=\"intro\"]")
            .assert()
            .success()
            .stdout(predicate::str::contains("<p>"))
            .stdout(predicate::str::contains("Hello"));
    }

    #[test]
    fn fails_on_a_stale_address() {
        let dir = tempfile::tempdir().unwrap();
        vedit()
            .arg("resolve")
            .arg(page_file(&dir))
            .arg("/html/body/article[4]")
            .assert()
            .failure();
    }
}

mod edit {
    use super::*;

    #[test]
    fn text_edit_writes_the_output_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = page_file(&dir);
        let output = dir.path().join("out.html");

        vedit()
            .arg("edit")
            .arg(&input)
            .arg("--address")
            .arg("//*[@id=\"intro\"]")
            .arg("--text")
            .arg("Goodbye")
            .arg("--output")
            .arg(&output)
            .assert()
            .success()
            .stdout(predicate::str::contains("Applied edit"));

        let edited = fs::read_to_string(&output).unwrap();
        assert!(edited.contains("Goodbye"));
        assert!(!edited.contains("Hello"));
        // the input file is untouched when --output is given
        assert!(fs::read_to_string(&input).unwrap().contains("Hello"));
    }

    #[test]
    fn attribute_edit_writes_back_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let input = page_file(&dir);

        vedit()
            .arg("edit")
            .arg(&input)
            .arg("--address")
            .arg("//*[@id=\"intro\"]")
            .arg("--attr")
            .arg("class=lede")
            .assert()
            .success();

        let edited = fs::read_to_string(&input).unwrap();
        assert!(edited.contains("class=\"lede\""));
    }

    #[test]
    fn stale_address_fails_without_touching_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = page_file(&dir);

        vedit()
            .arg("edit")
            .arg(&input)
            .arg("--address")
            .arg("/html/body/article[4]")
            .arg("--text")
            .arg("x")
            .assert()
            .failure()
            .stderr(predicate::str::contains("article"));

        assert_eq!(fs::read_to_string(&input).unwrap(), PAGE);
    }

    #[test]
    fn text_and_attr_are_mutually_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        vedit()
            .arg("edit")
            .arg(page_file(&dir))
            .arg("--address")
            .arg("//*[@id=\"intro\"]")
            .arg("--text")
            .arg("x")
            .arg("--attr")
            .arg("class=y")
            .assert()
            .failure();
    }

    #[test]
    fn one_of_text_or_attr_is_required() {
        let dir = tempfile::tempdir().unwrap();
        vedit()
            .arg("edit")
            .arg(page_file(&dir))
            .arg("--address")
            .arg("//*[@id=\"intro\"]")
            .assert()
            .failure();
    }
}

mod config {
    use super::*;

    #[test]
    fn path_prints_the_config_location() {
        vedit()
            .arg("config")
            .arg("path")
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn show_prints_editor_defaults() {
        vedit()
            .arg("config")
            .arg("show")
            .assert()
            .success()
            .stdout(predicate::str::contains("hover_debounce_ms"));
    }
}

//! CLI integration tests for the schema-walker binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn cmd() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("schema-walker"))
}

// Helper to create a temp schema file
fn write_temp_file(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

mod resolve_command {
    use super::*;

    #[test]
    fn resolve_property_path() {
        let dir = TempDir::new().unwrap();
        let schema = write_temp_file(
            &dir,
            "schema.json",
            r#"{
                "type": "object",
                "properties": {
                    "id": { "type": "string" },
                    "name": { "type": "string" }
                }
            }"#,
        );

        cmd()
            .args(["resolve", schema.to_str().unwrap(), "--path", "/name"])
            .assert()
            .success()
            .stdout(predicate::str::contains("/properties/name"));
    }

    #[test]
    fn resolve_empty_path_yields_root() {
        let dir = TempDir::new().unwrap();
        let schema = write_temp_file(&dir, "schema.json", r#"{"type":"object"}"#);

        cmd()
            .args(["resolve", schema.to_str().unwrap()])
            .assert()
            .success()
            .stdout(predicate::str::contains(r#""type":"object""#));
    }

    #[test]
    fn resolve_one_of_reports_exclusion_groups() {
        let dir = TempDir::new().unwrap();
        let schema = write_temp_file(
            &dir,
            "schema.json",
            r#"{"oneOf":[{"type":"string"},{"type":"number"}]}"#,
        );

        cmd()
            .args(["resolve", schema.to_str().unwrap()])
            .assert()
            .success()
            .stdout(predicate::str::contains("exclusionGroup"));
    }

    #[test]
    fn resolve_unknown_property_of_closed_object() {
        let dir = TempDir::new().unwrap();
        let schema = write_temp_file(
            &dir,
            "schema.json",
            r#"{"properties":{"a":{}},"additionalProperties":false}"#,
        );

        cmd()
            .args(["resolve", schema.to_str().unwrap(), "--path", "/b"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[]"));
    }

    #[test]
    fn resolve_unconstrained_property() {
        let dir = TempDir::new().unwrap();
        let schema = write_temp_file(&dir, "schema.json", r#"{"type":"object"}"#);

        cmd()
            .args(["resolve", schema.to_str().unwrap(), "--path", "/anything"])
            .assert()
            .success()
            .stdout(predicate::str::contains("unconstrained"));
    }

    #[test]
    fn resolve_with_pretty() {
        let dir = TempDir::new().unwrap();
        let schema = write_temp_file(
            &dir,
            "schema.json",
            r#"{"type":"object","properties":{"id":{"type":"string"}}}"#,
        );

        cmd()
            .args([
                "resolve",
                schema.to_str().unwrap(),
                "--path",
                "/id",
                "--pretty",
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains("  "));
    }

    #[test]
    fn resolve_to_output_file() {
        let dir = TempDir::new().unwrap();
        let schema = write_temp_file(
            &dir,
            "schema.json",
            r#"{"properties":{"id":{"type":"string"}}}"#,
        );
        let output = dir.path().join("out.json");

        cmd()
            .args([
                "resolve",
                schema.to_str().unwrap(),
                "--path",
                "/id",
                "--output",
                output.to_str().unwrap(),
            ])
            .assert()
            .success();

        let written = fs::read_to_string(&output).unwrap();
        assert!(written.contains("/properties/id"));
    }

    #[test]
    fn resolve_cross_file_ref() {
        let dir = TempDir::new().unwrap();
        write_temp_file(
            &dir,
            "types.json",
            r#"{"$defs":{"id":{"type":"string","minLength":1}}}"#,
        );
        let schema = write_temp_file(
            &dir,
            "main.json",
            r#"{"properties":{"id":{"$ref":"types.json#/$defs/id"}}}"#,
        );

        cmd()
            .args(["resolve", schema.to_str().unwrap(), "--path", "/id"])
            .assert()
            .success()
            .stdout(predicate::str::contains("minLength"));
    }

    #[test]
    fn resolve_broken_ref_warns_on_stderr() {
        let dir = TempDir::new().unwrap();
        let schema = write_temp_file(
            &dir,
            "schema.json",
            r##"{"properties":{"id":{"$ref":"#/$defs/gone"}}}"##,
        );

        cmd()
            .args(["resolve", schema.to_str().unwrap(), "--path", "/id"])
            .assert()
            .success()
            .stderr(predicate::str::contains("unresolved reference"));
    }

    #[test]
    fn resolve_invalid_pointer_exits_2() {
        let dir = TempDir::new().unwrap();
        let schema = write_temp_file(&dir, "schema.json", r#"{"type":"object"}"#);

        cmd()
            .args(["resolve", schema.to_str().unwrap(), "--path", "no-slash"])
            .assert()
            .failure()
            .code(2);
    }

    #[test]
    fn resolve_missing_schema_exits_3() {
        cmd()
            .args(["resolve", "/nonexistent/schema.json"])
            .assert()
            .failure()
            .code(3);
    }
}

mod check_command {
    use super::*;

    #[test]
    fn check_valid_value() {
        let dir = TempDir::new().unwrap();
        let schema = write_temp_file(
            &dir,
            "schema.json",
            r#"{"properties":{"name":{"type":"string"}}}"#,
        );
        let instance = write_temp_file(&dir, "instance.json", r#"{"name":"widget"}"#);

        cmd()
            .args([
                "check",
                schema.to_str().unwrap(),
                instance.to_str().unwrap(),
                "--path",
                "/name",
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains("Valid"));
    }

    #[test]
    fn check_invalid_value_exits_1() {
        let dir = TempDir::new().unwrap();
        let schema = write_temp_file(
            &dir,
            "schema.json",
            r#"{"properties":{"name":{"type":"string"}}}"#,
        );
        let instance = write_temp_file(&dir, "instance.json", r#"{"name":42}"#);

        cmd()
            .args([
                "check",
                schema.to_str().unwrap(),
                instance.to_str().unwrap(),
                "--path",
                "/name",
            ])
            .assert()
            .failure()
            .code(1)
            .stderr(predicate::str::contains("Validation failed"));
    }

    #[test]
    fn check_json_output() {
        let dir = TempDir::new().unwrap();
        let schema = write_temp_file(
            &dir,
            "schema.json",
            r#"{"properties":{"name":{"type":"string"}}}"#,
        );
        let instance = write_temp_file(&dir, "instance.json", r#"{"name":"ok"}"#);

        cmd()
            .args([
                "check",
                schema.to_str().unwrap(),
                instance.to_str().unwrap(),
                "--path",
                "/name",
                "--json",
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains(r#"{"valid":true}"#));
    }

    #[test]
    fn check_json_reports_errors() {
        let dir = TempDir::new().unwrap();
        let schema = write_temp_file(
            &dir,
            "schema.json",
            r#"{"properties":{"count":{"type":"number"}}}"#,
        );
        let instance = write_temp_file(&dir, "instance.json", r#"{"count":"many"}"#);

        cmd()
            .args([
                "check",
                schema.to_str().unwrap(),
                instance.to_str().unwrap(),
                "--path",
                "/count",
                "--json",
            ])
            .assert()
            .failure()
            .code(1)
            .stdout(predicate::str::contains(r#""valid":false"#));
    }

    #[test]
    fn check_missing_value_exits_2() {
        let dir = TempDir::new().unwrap();
        let schema = write_temp_file(
            &dir,
            "schema.json",
            r#"{"properties":{"name":{"type":"string"}}}"#,
        );
        let instance = write_temp_file(&dir, "instance.json", r#"{}"#);

        cmd()
            .args([
                "check",
                schema.to_str().unwrap(),
                instance.to_str().unwrap(),
                "--path",
                "/name",
            ])
            .assert()
            .failure()
            .code(2);
    }

    #[test]
    fn check_one_of_alternatives() {
        let dir = TempDir::new().unwrap();
        let schema = write_temp_file(
            &dir,
            "schema.json",
            r#"{"properties":{"value":{"oneOf":[{"type":"string"},{"type":"number"}]}}}"#,
        );

        let good = write_temp_file(&dir, "good.json", r#"{"value":"text"}"#);
        cmd()
            .args([
                "check",
                schema.to_str().unwrap(),
                good.to_str().unwrap(),
                "--path",
                "/value",
            ])
            .assert()
            .success();

        let bad = write_temp_file(&dir, "bad.json", r#"{"value":true}"#);
        cmd()
            .args([
                "check",
                schema.to_str().unwrap(),
                bad.to_str().unwrap(),
                "--path",
                "/value",
            ])
            .assert()
            .failure()
            .code(1);
    }
}

mod lint_command {
    use super::*;

    #[test]
    fn lint_valid_file() {
        let dir = TempDir::new().unwrap();
        let schema = write_temp_file(
            &dir,
            "schema.json",
            r#"{"$schema":"https://json-schema.org/draft/2020-12/schema","type":"object"}"#,
        );

        cmd()
            .args(["lint", schema.to_str().unwrap()])
            .assert()
            .success()
            .stdout(predicate::str::contains("all passed"));
    }

    #[test]
    fn lint_broken_ref_fails() {
        let dir = TempDir::new().unwrap();
        let schema = write_temp_file(
            &dir,
            "schema.json",
            r##"{"$schema":"https://json-schema.org/draft/2020-12/schema","properties":{"x":{"$ref":"#/$defs/gone"}}}"##,
        );

        cmd()
            .args(["lint", schema.to_str().unwrap()])
            .assert()
            .failure()
            .code(1)
            .stdout(predicate::str::contains("E003"));
    }

    #[test]
    fn lint_warning_passes_unless_strict() {
        let dir = TempDir::new().unwrap();
        // Missing $schema declaration is a warning
        let schema = write_temp_file(&dir, "schema.json", r#"{"type":"object"}"#);

        cmd()
            .args(["lint", schema.to_str().unwrap()])
            .assert()
            .success();

        cmd()
            .args(["lint", schema.to_str().unwrap(), "--strict"])
            .assert()
            .failure()
            .code(1);
    }

    #[test]
    fn lint_json_format() {
        let dir = TempDir::new().unwrap();
        let schema = write_temp_file(
            &dir,
            "schema.json",
            r#"{"$schema":"https://json-schema.org/draft/2020-12/schema","type":"object"}"#,
        );

        cmd()
            .args(["lint", schema.to_str().unwrap(), "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains(r#""files_checked": 1"#));
    }

    #[test]
    fn lint_missing_path_exits_2() {
        cmd()
            .args(["lint", "/nonexistent/dir"])
            .assert()
            .failure()
            .code(2);
    }

    #[test]
    fn lint_directory_mixed_results() {
        let dir = TempDir::new().unwrap();
        write_temp_file(
            &dir,
            "ok.json",
            r#"{"$schema":"https://json-schema.org/draft/2020-12/schema","type":"object"}"#,
        );
        write_temp_file(&dir, "bad.json", "{ not json }");

        cmd()
            .args(["lint", dir.path().to_str().unwrap()])
            .assert()
            .failure()
            .code(1)
            .stdout(predicate::str::contains("E001"));
    }
}

use std::process::Command;

fn helpme() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("helpme"));
    cmd.env("HELPME_LOG_DIR", "off").env_remove("HELPME_ENV_FILE");
    cmd
}

fn call_json(args: &[&str]) -> serde_json::Value {
    let out = helpme().arg("call").args(args).output().expect("run helpme call");
    assert!(out.status.success(), "helpme call failed: {out:?}");
    serde_json::from_slice(&out.stdout).expect("parse call json")
}

#[test]
fn highlighted_text_is_a_fixed_success() {
    let v = call_json(&["get_highlighted_text"]);
    assert_eq!(v["kind"], "get_highlighted_text");
    assert_eq!(v["ok"], true);
    assert_eq!(v["envelope"]["status"], "success");
    assert_eq!(
        v["envelope"]["value"],
        "Highlighted text functionality not implemented yet."
    );
}

#[test]
fn listing_with_no_search_is_a_spoken_failure() {
    let out = helpme()
        .args(["call", "list_search_results", "--output", "text"])
        .output()
        .expect("run helpme call");
    assert!(out.status.success());
    let s = String::from_utf8_lossy(&out.stdout);
    assert_eq!(
        s.trim(),
        "I don't have any recent search results to show. Please perform a search first."
    );
}

#[test]
fn unknown_capability_and_bad_args_are_invalid_arguments() {
    let v = call_json(&["fly_to_the_moon"]);
    assert_eq!(v["ok"], false);
    assert!(v["envelope"]["cause"]
        .as_str()
        .unwrap_or("")
        .starts_with("invalid argument"));
    assert_eq!(v["error"]["kind"], "invalid_argument");
    assert_eq!(v["error"]["retryable"], false);

    let v = call_json(&["read_search_result", "--args", "{not json"]);
    assert_eq!(v["ok"], false);
    assert_eq!(v["envelope"]["status"], "failure");
}

#[test]
fn args_can_come_from_a_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let p = dir.path().join("args.json");
    std::fs::write(&p, r#"{"result_number": 1}"#).expect("write args");
    let v = call_json(&[
        "read_search_result",
        "--args",
        &format!("@{}", p.display()),
    ]);
    assert_eq!(
        v["envelope"]["message"],
        "I don't have any recent search results to reference. Please perform a search first."
    );
}

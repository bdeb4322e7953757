#[test]
fn helpme_doctor_reports_booleans_only() {
    let bin = assert_cmd::cargo::cargo_bin!("helpme");
    let out = std::process::Command::new(bin)
        .args(["doctor"])
        .env("HELPME_MAPQUEST_API_KEY", "secret-mapquest-value")
        .env_remove("MAPQUEST_API_KEY")
        .env_remove("HELPME_BRAVE_API_KEY")
        .env_remove("BRAVE_SEARCH_API_KEY")
        .env_remove("HELPME_ENV_FILE")
        .env_remove("HELPME_TZ")
        .env_remove("HELPME_UTC_OFFSET")
        .output()
        .expect("run helpme doctor");

    assert!(out.status.success(), "helpme doctor failed");
    let s = String::from_utf8_lossy(&out.stdout);
    assert!(!s.contains("secret-mapquest-value"), "doctor leaked a secret");
    let v: serde_json::Value = serde_json::from_str(&s).expect("parse doctor json");

    assert_eq!(v["schema_version"].as_u64(), Some(1));
    assert_eq!(v["kind"].as_str(), Some("doctor"));
    assert_eq!(v["name"].as_str(), Some("helpme"));
    assert!(v.get("elapsed_ms").is_some());
    assert_eq!(
        v["features"]["stdio"].as_bool(),
        Some(cfg!(feature = "stdio"))
    );

    let services = &v["configured"]["services"];
    assert_eq!(services["mapquest"].as_bool(), Some(true));
    assert_eq!(services["brave"].as_bool(), Some(false));
    assert!(services["openai"].is_boolean());
    assert!(services["google_cse"].is_boolean());
    assert_eq!(v["configured"]["timezone"].as_str(), Some("America/Chicago"));
    assert!(!v["configured"]["lock_file"].as_str().unwrap_or("").is_empty());

    let checks = v["checks"].as_array().expect("checks array");
    for name in ["screen_capture", "headless_browser"] {
        let c = checks
            .iter()
            .find(|c| c["name"].as_str() == Some(name))
            .unwrap_or_else(|| panic!("missing check {name}"));
        assert!(c["ok"].is_boolean());
    }
}

#[test]
fn helpme_doctor_reports_zone_and_logs_bad_settings() {
    let bin = assert_cmd::cargo::cargo_bin!("helpme");
    let out = std::process::Command::new(&bin)
        .args(["doctor"])
        .env("HELPME_TZ", "Europe/Berlin")
        .env_remove("HELPME_UTC_OFFSET")
        .env_remove("HELPME_ENV_FILE")
        .output()
        .expect("run helpme doctor");
    assert!(out.status.success());
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).expect("parse doctor json");
    assert_eq!(v["configured"]["timezone"].as_str(), Some("Europe/Berlin"));

    let out = std::process::Command::new(&bin)
        .args(["doctor"])
        .env("HELPME_TZ", "Europe/Berlin")
        .env("HELPME_UTC_OFFSET", "sometime")
        .env_remove("HELPME_ENV_FILE")
        .env_remove("RUST_LOG")
        .output()
        .expect("run helpme doctor");
    assert!(out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("HELPME_UTC_OFFSET"), "{stderr}");
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).expect("parse doctor json");
    assert_eq!(v["configured"]["timezone"].as_str(), Some("Europe/Berlin"));
}

#[test]
fn helpme_capabilities_lists_every_tool_with_triggers() {
    let bin = assert_cmd::cargo::cargo_bin!("helpme");
    let out = std::process::Command::new(bin)
        .args(["capabilities"])
        .output()
        .expect("run helpme capabilities");

    assert!(out.status.success());
    let v: serde_json::Value =
        serde_json::from_slice(&out.stdout).expect("parse capabilities json");
    let caps = v["capabilities"].as_array().expect("capabilities array");
    assert_eq!(caps.len(), 9);
    for c in caps {
        assert!(!c["name"].as_str().unwrap_or("").is_empty());
        assert!(!c["triggers"].as_array().expect("triggers").is_empty());
    }
}

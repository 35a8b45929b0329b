use std::path::Path;
use std::process::Command;
use std::process::Output;

fn idlewarden(home: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_idlewarden"))
        .arg("--home")
        .arg(home)
        .args(args)
        .env_remove("DISPLAY")
        .output()
        .unwrap()
}

#[test]
fn test_print_config_leaves_home_untouched() {
    let home = tempfile::tempdir().unwrap();

    let output = idlewarden(home.path(), &["--print-config"]);

    assert!(output.status.success(), "{output:?}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("action = \"sleep\""), "{stdout}");
    assert!(!home.path().join(".idlewarden").exists());
}

#[test]
fn test_numeric_action_type() {
    let home = tempfile::tempdir().unwrap();

    let output = idlewarden(home.path(), &["--print-config", "--action-type", "1"]);
    assert!(output.status.success(), "{output:?}");
    assert!(String::from_utf8_lossy(&output.stdout).contains("action = \"shutdown\""));

    let output = idlewarden(home.path(), &["--print-config", "--action-type", "0"]);
    assert!(output.status.success(), "{output:?}");
    assert!(String::from_utf8_lossy(&output.stdout).contains("action = \"sleep\""));
}

#[test]
fn test_unknown_action_type_rejected() {
    let home = tempfile::tempdir().unwrap();

    let output = idlewarden(home.path(), &["--print-config", "--action-type", "2"]);

    assert!(!output.status.success());
}

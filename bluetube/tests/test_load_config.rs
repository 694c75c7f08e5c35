use bluetube::load_config::{bluetube_home, ensure_home, load_config, CONFIG_FILE, HOME_ENV};
use bluetube_core::profiles::Profiles;
use serial_test::serial;
use std::env;
use std::fs::write;
use tempfile::tempdir;

#[test]
#[serial]
fn home_comes_from_the_environment() {
    let dir = tempdir().unwrap();
    env::set_var(HOME_ENV, dir.path());
    assert_eq!(bluetube_home().unwrap(), dir.path());
    env::remove_var(HOME_ENV);

    let fallback = bluetube_home().unwrap();
    assert!(fallback.ends_with(".bluetube"));
}

#[test]
#[serial]
fn templates_load_as_valid_config_and_profiles() {
    let dir = tempdir().unwrap();
    env::remove_var("EDITOR");
    ensure_home(dir.path()).unwrap();

    let config = load_config(dir.path()).expect("Config should load");
    assert_eq!(config.editor, "vi");
    assert_eq!(config.max_attempts, 5);
    assert!(config.media_player.is_none());
    assert!(config.staging_dir.ends_with("bluetube"));

    let profiles = Profiles::load(&config.profiles_path()).expect("Template profiles are valid");
    assert!(profiles.check_profile("profile_1"));
}

#[test]
#[serial]
fn ensure_home_keeps_existing_files() {
    let dir = tempdir().unwrap();
    write(dir.path().join(CONFIG_FILE), "max_attempts = 2\n").unwrap();
    ensure_home(dir.path()).unwrap();

    let config = load_config(dir.path()).unwrap();
    assert_eq!(config.max_attempts, 2);
}

#[test]
#[serial]
fn editor_variable_wins_over_config() {
    let dir = tempdir().unwrap();
    write(
        dir.path().join(CONFIG_FILE),
        "editor = \"nano\"\nmedia_player = \"mpv\"\nstaging_dir = \"/var/tmp/bt\"\n",
    )
    .unwrap();

    env::set_var("EDITOR", "emacs");
    let config = load_config(dir.path()).unwrap();
    env::remove_var("EDITOR");

    assert_eq!(config.editor, "emacs");
    assert_eq!(config.media_player.as_deref(), Some("mpv"));
    assert_eq!(config.pipeline_settings().staging_dir, std::path::PathBuf::from("/var/tmp/bt"));
}

#[test]
#[serial]
fn invalid_config_is_reported() {
    let dir = tempdir().unwrap();
    write(dir.path().join(CONFIG_FILE), "max_attempts = \"many\"\n").unwrap();
    let err = load_config(dir.path()).unwrap_err();
    assert!(err.to_string().contains("cannot parse"));

    write(dir.path().join(CONFIG_FILE), "max_attempts = 0\n").unwrap();
    assert!(load_config(dir.path()).is_err());
}

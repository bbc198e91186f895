use std::path::PathBuf;

use slidemark::config::{ConfigFlags, load_config_flags, parse_flag_tokens, save_config_flags};

#[test]
fn test_config_file_parsing_ignores_comments_and_blank_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(".slidemarkrc");
    let content = r"
# comment
--linked-diagrams

--port 4100

--diagrams-dir=docs/diagrams
";
    std::fs::write(&path, content).unwrap();

    let flags = load_config_flags(&path).unwrap();
    assert!(flags.linked_diagrams);
    assert_eq!(flags.port, Some(4100));
    assert_eq!(flags.diagrams_dir, Some(PathBuf::from("docs/diagrams")));
}

#[test]
fn test_cli_flags_override_file_flags() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(".slidemarkrc");
    let content = "--linked-diagrams\n--port 4100\n--render-endpoint http://kroki.file\n";
    std::fs::write(&path, content).unwrap();

    let file_flags = load_config_flags(&path).unwrap();
    let cli_args = vec![
        "slidemark".to_string(),
        "export".to_string(),
        "--port".to_string(),
        "5000".to_string(),
        "--no-diagram-wait".to_string(),
    ];
    let cli_flags = parse_flag_tokens(&cli_args);

    let effective = file_flags.union(&cli_flags);
    assert!(effective.linked_diagrams, "file flags should remain enabled");
    assert!(effective.no_diagram_wait, "cli flags should be applied");
    assert_eq!(effective.port, Some(5000), "cli should override port");
    assert_eq!(
        effective.render_endpoint.as_deref(),
        Some("http://kroki.file"),
        "file config should be preserved when CLI does not override"
    );
}

#[test]
fn test_saved_cli_flags_become_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("slidemark").join("config");
    let cli_flags = parse_flag_tokens(&[
        "slidemark".to_string(),
        "serve".to_string(),
        "--plantuml-server=http://puml.local/plantuml".to_string(),
        "--save".to_string(),
    ]);

    save_config_flags(&path, &cli_flags).unwrap();
    let loaded = load_config_flags(&path).unwrap();
    assert_eq!(
        loaded.plantuml_server.as_deref(),
        Some("http://puml.local/plantuml")
    );
    assert_eq!(loaded, cli_flags);
}

#[test]
fn test_local_overrides_global() {
    let global = ConfigFlags {
        diagrams_dir: Some(PathBuf::from("global")),
        ..ConfigFlags::default()
    };
    let local = ConfigFlags {
        diagrams_dir: Some(PathBuf::from("local")),
        ..ConfigFlags::default()
    };
    assert_eq!(
        global.union(&local).diagrams_dir,
        Some(PathBuf::from("local"))
    );
}

//! Launch description loading, graph validation and resolution

mod common;

use common::{install_prefix, prepare, write_file};
use launch_graph::config::PackageIndex;
use launch_graph::runtime::ResolvedParameter;
use launch_graph::{ConfigurationError, LaunchFile, LaunchGraph};
use std::path::PathBuf;

fn mapping_launch_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../launch/mapping_mid360.launch.yaml")
}

fn mapping_launch_yaml() -> String {
    std::fs::read_to_string(mapping_launch_path()).unwrap()
}

#[test]
fn test_mapping_launch_file_builds() {
    let launch_file = LaunchFile::from_file(mapping_launch_path().to_str().unwrap()).unwrap();
    let graph = LaunchGraph::from_launch_file(launch_file).unwrap();

    let names: Vec<_> = graph.declarations().iter().map(|d| d.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["use_rviz", "avia_params_file", "camera_params_file", "use_respawn"]
    );
    let labels: Vec<_> = graph.actions().map(|(_, a)| a.label().to_string()).collect();
    assert_eq!(labels, vec!["laserMapping", "republish", "rviz2"]);
}

#[test]
fn test_mapping_launch_plan() {
    let prefix = install_prefix(&[("fast_livo", "fastlivo_mapping"), ("rviz2", "rviz2")]);
    let config = prefix.path().join("share/fast_livo/config");
    write_file(&config.join("mid360.yaml"), "laserMapping: {}\n");
    write_file(&config.join("camera_d435i.yaml"), "laserMapping: {}\n");

    let prepared = prepare(
        &mapping_launch_yaml(),
        &[],
        PackageIndex::new().with_prefix(prefix.path()),
    )
    .unwrap();
    let plan = prepared.plan();

    assert_eq!(plan.skipped, vec!["republish"]);
    let labels: Vec<_> = plan.nodes.iter().map(|n| n.name.as_str()).collect();
    assert_eq!(labels, vec!["laserMapping", "rviz2"]);
    assert!(plan.nodes.iter().all(|n| n.error.is_none()));
    assert!(plan.nodes[0].respawn);
    assert!(!plan.nodes[1].respawn);

    assert_eq!(
        plan.nodes[0].parameters,
        vec![
            ResolvedParameter::File(config.join("mid360.yaml").to_string_lossy().into_owned()),
            ResolvedParameter::File(
                config
                    .join("camera_d435i.yaml")
                    .to_string_lossy()
                    .into_owned()
            ),
        ]
    );
    let rviz_cfg = prefix.path().join("share/fast_livo/rviz_cfg/fast_livo2.rviz");
    assert!(plan.nodes[1]
        .command
        .contains(&format!("-d {}", rviz_cfg.display())));

    let json = serde_json::to_value(&plan).unwrap();
    assert_eq!(json["args"]["use_rviz"], "True");
    assert_eq!(json["nodes"][0]["output"], "screen");
}

#[test]
fn test_mapping_launch_without_rviz() {
    let prefix = install_prefix(&[("fast_livo", "fastlivo_mapping")]);
    let prepared = prepare(
        &mapping_launch_yaml(),
        &[("use_rviz", "False")],
        PackageIndex::new().with_prefix(prefix.path()),
    )
    .unwrap();
    assert_eq!(prepared.skipped, vec!["republish", "rviz2"]);
    assert_eq!(prepared.actions.len(), 1);
}

#[test]
fn test_mapping_launch_reports_missing_package() {
    let empty = tempfile::tempdir().unwrap();
    let err = prepare(
        &mapping_launch_yaml(),
        &[],
        PackageIndex::new().with_prefix(empty.path()),
    )
    .unwrap_err();
    assert!(matches!(err, ConfigurationError::PackageNotFound(p) if p == "fast_livo"));
}

#[test]
fn test_undeclared_reference_fails_before_launch() {
    let yaml = r#"
args:
  use_rviz:
    default: "True"
nodes:
  mapper:
    executable: /opt/bin/mapper
    arguments: ["--config", "$(arg foo_bar)"]
"#;
    let err = prepare(yaml, &[], PackageIndex::new()).unwrap_err();
    match err {
        ConfigurationError::UndeclaredReference { name, .. } => assert_eq!(name, "foo_bar"),
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_cyclic_defaults_rejected() {
    let yaml = r#"
args:
  a:
    default: "$(arg b)"
  b:
    default: "prefix-$(arg a)"
nodes: {}
"#;
    let err = prepare(yaml, &[], PackageIndex::new()).unwrap_err();
    assert!(matches!(err, ConfigurationError::CyclicReference(_)));
}

#[test]
fn test_override_breaks_nothing_downstream() {
    let yaml = r#"
args:
  robot:
    default: "mid360"
  params:
    default: "/etc/$(arg robot)/params.yaml"
nodes:
  mapper:
    executable: /opt/bin/mapper
    arguments: ["$(arg params)"]
"#;
    let prepared = prepare(yaml, &[("robot", "avia")], PackageIndex::new()).unwrap();
    assert_eq!(prepared.arguments["params"], "/etc/avia/params.yaml");
    assert_eq!(prepared.actions[0].arguments, vec!["/etc/avia/params.yaml"]);
}

#[test]
fn test_unknown_override_rejected() {
    let err = prepare(&mapping_launch_yaml(), &[("use_rvis", "False")], PackageIndex::new())
        .unwrap_err();
    assert!(matches!(err, ConfigurationError::UnknownArgument(n) if n == "use_rvis"));
}

#[test]
fn test_launch_env_feeds_substitutions_and_children() {
    let yaml = r#"
env:
  ROBOT_NAME: scout
nodes:
  mapper:
    executable: /opt/bin/mapper
    arguments: ["$(env ROBOT_NAME)", "$(optenv LAUNCH_GRAPH_TEST_UNSET fallback)"]
    env:
      LOG_TAG: "$(env ROBOT_NAME)-mapper"
"#;
    let prepared = prepare(yaml, &[], PackageIndex::new()).unwrap();
    let mapper = &prepared.actions[0];
    assert_eq!(mapper.arguments, vec!["scout", "fallback"]);
    assert_eq!(mapper.env["ROBOT_NAME"], "scout");
    assert_eq!(mapper.env["LOG_TAG"], "scout-mapper");
}

#[test]
fn test_missing_environment_variable() {
    let yaml = r#"
nodes:
  mapper:
    executable: /opt/bin/mapper
    arguments: ["$(env LAUNCH_GRAPH_TEST_UNSET)"]
"#;
    let err = prepare(yaml, &[], PackageIndex::new()).unwrap_err();
    assert!(
        matches!(err, ConfigurationError::MissingEnvironmentVariable(v) if v == "LAUNCH_GRAPH_TEST_UNSET")
    );
}

#[test]
fn test_plain_executable_cannot_take_parameters() {
    let yaml = r#"
nodes:
  mapper:
    executable: /opt/bin/mapper
    parameters:
      - /etc/mapper.yaml
"#;
    let err = LaunchFile::from_yaml(yaml).unwrap_err();
    assert!(matches!(err, ConfigurationError::InvalidLaunchFile(_)));
}

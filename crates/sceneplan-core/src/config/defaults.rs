//! Default configuration values

use super::types::Config;

/// Default configuration file name (YAML)
pub const DEFAULT_CONFIG_YAML: &str = "sceneplan.yaml";

/// Default configuration file name (TOML)
pub const DEFAULT_CONFIG_TOML: &str = "sceneplan.toml";

/// Alternative configuration file name
pub const ALT_CONFIG_FILE: &str = ".sceneplan.yaml";

/// Get list of config file names to search for
pub fn config_file_names() -> Vec<&'static str> {
    vec![
        DEFAULT_CONFIG_YAML,
        DEFAULT_CONFIG_TOML,
        ALT_CONFIG_FILE,
        ".sceneplan.toml",
    ]
}

/// Generate default configuration YAML
pub fn default_config_yaml() -> String {
    let config = Config::default();
    serde_yaml::to_string(&config).unwrap_or_else(|_| DEFAULT_CONFIG_TEMPLATE.to_string())
}

/// Starter configuration written by `sceneplan init`
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# sceneplan configuration

tasks:
  stop_on_failure: false
  default_task: build

pipeline:
  fetch:
    command: echo "fetching $SCENEPLAN_RECIPE"
  compile:
    depends_on: [fetch]
    recipe_depends_on: [populate_sysroot]
    command: echo "compiling $SCENEPLAN_RECIPE"
  populate_sysroot:
    depends_on: [compile]
    coverable: true
    recipe_scene_depends_on: [populate_sysroot]
    command: echo "installing $SCENEPLAN_RECIPE into the sysroot"
    scene_command: echo "restoring $SCENEPLAN_RECIPE sysroot"
  package:
    depends_on: [compile]
    coverable: true
    command: echo "packaging $SCENEPLAN_RECIPE"
    scene_command: echo "restoring $SCENEPLAN_RECIPE packages"
  build:
    depends_on: [package, populate_sysroot]

recipes:
  - name: base
  - name: app
    depends: [base]

multiconfig:
  namespaces: []

cache:
  enabled: true
  dir: .sceneplan/stamps
  valid: []

enforcement:
  enabled: false
  allow: []
"#;

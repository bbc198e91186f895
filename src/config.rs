//! Persistent defaults stored as CLI flag tokens.
//!
//! A global file and a local `.slidemarkrc` each hold flags exactly as they
//! would be typed on the command line. Effective settings are
//! global ∪ local ∪ CLI, with later sources winning for valued options.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

const APP_DIR: &str = "slidemark";
const LOCAL_FILE: &str = ".slidemarkrc";

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConfigFlags {
    pub diagrams_dir: Option<PathBuf>,
    pub render_endpoint: Option<String>,
    pub plantuml_server: Option<String>,
    pub port: Option<u16>,
    pub linked_diagrams: bool,
    pub no_diagram_wait: bool,
}

impl ConfigFlags {
    /// Merge `other` over `self`: switches are or-ed, options from `other` win.
    pub fn union(&self, other: &Self) -> Self {
        Self {
            diagrams_dir: other
                .diagrams_dir
                .clone()
                .or_else(|| self.diagrams_dir.clone()),
            render_endpoint: other
                .render_endpoint
                .clone()
                .or_else(|| self.render_endpoint.clone()),
            plantuml_server: other
                .plantuml_server
                .clone()
                .or_else(|| self.plantuml_server.clone()),
            port: other.port.or(self.port),
            linked_diagrams: self.linked_diagrams || other.linked_diagrams,
            no_diagram_wait: self.no_diagram_wait || other.no_diagram_wait,
        }
    }

    /// Flags as tokens, in the form `parse_flag_tokens` reads back.
    pub fn to_tokens(&self) -> Vec<String> {
        let mut tokens = Vec::new();
        if let Some(dir) = &self.diagrams_dir {
            tokens.push(format!("--diagrams-dir={}", dir.display()));
        }
        if let Some(endpoint) = &self.render_endpoint {
            tokens.push(format!("--render-endpoint={endpoint}"));
        }
        if let Some(server) = &self.plantuml_server {
            tokens.push(format!("--plantuml-server={server}"));
        }
        if let Some(port) = self.port {
            tokens.push(format!("--port={port}"));
        }
        if self.linked_diagrams {
            tokens.push("--linked-diagrams".to_string());
        }
        if self.no_diagram_wait {
            tokens.push("--no-diagram-wait".to_string());
        }
        tokens
    }
}

pub fn global_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return PathBuf::from(appdata).join(APP_DIR).join("config");
        }
    }

    #[cfg(target_os = "macos")]
    {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join(APP_DIR)
                .join("config");
        }
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
            return PathBuf::from(xdg).join(APP_DIR).join("config");
        }
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home)
                .join(".config")
                .join(APP_DIR)
                .join("config");
        }
    }

    PathBuf::from(LOCAL_FILE)
}

pub fn local_override_path() -> PathBuf {
    PathBuf::from(LOCAL_FILE)
}

/// Read flags from `path`; a missing file yields no flags.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read.
pub fn load_config_flags(path: &Path) -> Result<ConfigFlags> {
    if !path.exists() {
        return Ok(ConfigFlags::default());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let tokens = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .flat_map(|line| line.split_whitespace().map(ToOwned::to_owned))
        .collect::<Vec<_>>();
    Ok(parse_flag_tokens(&tokens))
}

/// Write `flags` to `path`, one flag per line.
///
/// # Errors
///
/// Returns an error if the directory or file cannot be written.
pub fn save_config_flags(path: &Path, flags: &ConfigFlags) -> Result<()> {
    let mut lines = vec!["# slidemark defaults (saved with --save)".to_string()];
    lines.extend(flags.to_tokens());
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config dir {}", parent.display()))?;
    }
    fs::write(path, format!("{}\n", lines.join("\n")))
        .with_context(|| format!("Failed to write config {}", path.display()))
}

/// # Errors
///
/// Returns an error if the file exists but cannot be removed.
pub fn clear_config_flags(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_file(path).with_context(|| format!("Failed to remove {}", path.display()))?;
    }
    Ok(())
}

/// Pick the known flags out of raw arguments. Unknown tokens are skipped.
pub fn parse_flag_tokens(tokens: &[String]) -> ConfigFlags {
    let mut flags = ConfigFlags::default();
    let mut i = 0;
    while i < tokens.len() {
        let token = tokens[i].as_str();
        match token {
            "--linked-diagrams" => flags.linked_diagrams = true,
            "--no-diagram-wait" => flags.no_diagram_wait = true,
            _ => {
                if let Some(value) = option_value(tokens, &mut i, "--diagrams-dir") {
                    flags.diagrams_dir = Some(PathBuf::from(value));
                } else if let Some(value) = option_value(tokens, &mut i, "--render-endpoint") {
                    flags.render_endpoint = Some(value.to_string());
                } else if let Some(value) = option_value(tokens, &mut i, "--plantuml-server") {
                    flags.plantuml_server = Some(value.to_string());
                } else if let Some(value) = option_value(tokens, &mut i, "--port") {
                    flags.port = value.parse().ok().or(flags.port);
                }
            }
        }
        i += 1;
    }
    flags
}

/// Value of `--name value` or `--name=value` at `tokens[*i]`; advances `i`
/// past a separate value token.
fn option_value<'a>(tokens: &'a [String], i: &mut usize, name: &str) -> Option<&'a str> {
    let token = tokens[*i].as_str();
    if token == name {
        let value = tokens.get(*i + 1)?;
        *i += 1;
        return Some(value.as_str());
    }
    token.strip_prefix(name)?.strip_prefix('=')
}
